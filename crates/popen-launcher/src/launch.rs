use log::{debug, warn};
use nix::unistd::{fork, ForkResult, Pid};
use popen_core::{OsErrorKind, PopenError, ProcessConfig, Result};
use popen_ipc::ExecReport;
use std::io;

use crate::channel::ErrorChannel;
use crate::child::{self, ChildContext};
use crate::exec::ExecImage;
use crate::fd::reap;
use crate::plan::StreamPlan;
use crate::process::RunningProcess;

/// Fork and exec one child as described by `config`.
///
/// Returns only once the outcome is known: either the child replaced its
/// image, or it failed before exec and has already been reaped. Every
/// descriptor opened here is closed on the error paths.
pub fn launch(config: &ProcessConfig) -> Result<RunningProcess> {
    let image = ExecImage::prepare(config)?;
    let plan = StreamPlan::resolve(&config.streams)?;
    let channel = ErrorChannel::open()?;

    let ctx = ChildContext {
        sources: plan.child_fds(),
        parent_ends: plan.parent_fds(),
        err_read: channel.read_fd(),
        err_write: channel.write_fd(),
        close_fds: config.close_fds,
        image: &image,
    };
    debug!(
        "launching {:?} (stdin {}, stdout {}, stderr {}, close_fds {})",
        config.effective_argv()?,
        config.streams.stdin,
        config.streams.stdout,
        config.streams.stderr,
        config.close_fds
    );

    // SAFETY: the child branch only makes async-signal-safe calls on data
    // prepared above, and always ends in execve or _exit.
    match unsafe { fork() } {
        Err(errno) => Err(PopenError::os(OsErrorKind::ForkFailed, errno.into())),
        Ok(ForkResult::Child) => child::run(ctx),
        Ok(ForkResult::Parent { child }) => {
            let ends = plan.into_parent_ends();
            match channel.into_report()? {
                ExecReport::Replaced => {
                    debug!("child {child} running");
                    Ok(RunningProcess::new(child, ends, config.buffer_mode()))
                }
                ExecReport::Failed(diagnostic) => {
                    drop(ends);
                    Err(failed_launch(child, diagnostic))
                }
            }
        }
    }
}

/// Reap a child that failed before exec and build the error for it. If the
/// reap itself fails, the diagnostic rides along in the wait error.
fn failed_launch(child: Pid, diagnostic: String) -> PopenError {
    match reap(child) {
        Ok(_) => {
            warn!("child {child} failed before exec: {diagnostic}");
            PopenError::Launch {
                pid: child.as_raw(),
                diagnostic,
            }
        }
        Err(PopenError::Os { kind, source }) => {
            warn!("child {child} failed before exec ({diagnostic}) and was not reaped: {source}");
            PopenError::os(
                kind,
                io::Error::new(
                    source.kind(),
                    format!("{source} (child {child} diagnostic: {diagnostic})"),
                ),
            )
        }
        Err(other) => other,
    }
}
