use log::debug;
use nix::errno::Errno;
use nix::sys::wait::{waitpid, WaitPidFlag, WaitStatus};
use nix::unistd::Pid;
use popen_core::{BufferMode, Lifecycle, OsErrorKind, PopenError, Result};
use std::fmt;

use crate::handle::{self, ChildStderr, ChildStdin, ChildStdout};
use crate::plan::ParentEnds;

/// How a reaped child ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitStatus {
    Exited(i32),
    /// Killed by this signal number.
    Signaled(i32),
}

impl ExitStatus {
    pub fn success(self) -> bool {
        self == Self::Exited(0)
    }

    pub fn code(self) -> Option<i32> {
        match self {
            Self::Exited(code) => Some(code),
            Self::Signaled(_) => None,
        }
    }

    fn from_wait(status: WaitStatus) -> Option<Self> {
        match status {
            WaitStatus::Exited(_, code) => Some(Self::Exited(code)),
            WaitStatus::Signaled(_, signal, _) => Some(Self::Signaled(signal as i32)),
            _ => None,
        }
    }
}

impl fmt::Display for ExitStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exited(code) => write!(f, "exit code {code}"),
            Self::Signaled(sig) => write!(f, "killed by signal {sig}"),
        }
    }
}

/// A child known to have replaced its image.
///
/// The stream handles are public so they can be taken and dropped
/// independently; dropping `stdin` is how the child sees end-of-input.
#[derive(Debug)]
pub struct RunningProcess {
    pid: Pid,
    pub stdin: Option<ChildStdin>,
    pub stdout: Option<ChildStdout>,
    pub stderr: Option<ChildStderr>,
    status: Option<ExitStatus>,
}

impl RunningProcess {
    pub(crate) fn new(pid: Pid, ends: ParentEnds, mode: BufferMode) -> Self {
        let (stdin, stdout, stderr) = handle::wrap(ends, mode);
        Self {
            pid,
            stdin,
            stdout,
            stderr,
            status: None,
        }
    }

    pub fn pid(&self) -> i32 {
        self.pid.as_raw()
    }

    pub fn lifecycle(&self) -> Lifecycle {
        if self.status.is_some() {
            Lifecycle::Reaped
        } else {
            Lifecycle::Running
        }
    }

    /// Block until the child exits. Closes our end of its stdin first so a
    /// child reading to end-of-input can finish.
    pub fn wait(&mut self) -> Result<ExitStatus> {
        if let Some(status) = self.status {
            return Ok(status);
        }
        drop(self.stdin.take());
        loop {
            match waitpid(self.pid, None) {
                Ok(status) => {
                    if let Some(status) = ExitStatus::from_wait(status) {
                        return Ok(self.record(status));
                    }
                }
                Err(Errno::EINTR) => {}
                Err(errno) => return Err(PopenError::os(OsErrorKind::WaitFailed, errno.into())),
            }
        }
    }

    /// Collect the exit status if the child has already exited.
    pub fn try_wait(&mut self) -> Result<Option<ExitStatus>> {
        if let Some(status) = self.status {
            return Ok(Some(status));
        }
        match waitpid(self.pid, Some(WaitPidFlag::WNOHANG)) {
            Ok(status) => Ok(ExitStatus::from_wait(status).map(|s| self.record(s))),
            Err(errno) => Err(PopenError::os(OsErrorKind::WaitFailed, errno.into())),
        }
    }

    fn record(&mut self, status: ExitStatus) -> ExitStatus {
        debug!("child {} reaped: {status}", self.pid);
        self.status = Some(status);
        status
    }
}
