use popen_core::Result;
use popen_ipc::{ExecReport, DIAGNOSTIC_CAP};
use std::os::fd::{AsFd, AsRawFd, OwnedFd, RawFd};

use crate::fd::{make_cloexec_pipe, read_bounded};

/// Pipe the child uses to say it failed before exec.
///
/// Both ends are close-on-exec. A successful exec closes the child's write
/// end, so the parent reads end-of-stream with no data. A child that fails
/// writes a diagnostic and exits, so the parent reads that instead.
pub(crate) struct ErrorChannel {
    read: OwnedFd,
    write: OwnedFd,
}

impl ErrorChannel {
    pub(crate) fn open() -> Result<Self> {
        let (read, write) = make_cloexec_pipe()?;
        Ok(Self { read, write })
    }

    pub(crate) fn read_fd(&self) -> RawFd {
        self.read.as_raw_fd()
    }

    pub(crate) fn write_fd(&self) -> RawFd {
        self.write.as_raw_fd()
    }

    /// Parent half. Drops the write end first, or the read below would
    /// never see end-of-stream.
    pub(crate) fn into_report(self) -> Result<ExecReport> {
        let Self { read, write } = self;
        drop(write);
        let mut buf = [0u8; DIAGNOSTIC_CAP];
        let n = read_bounded(read.as_fd(), &mut buf)?;
        Ok(ExecReport::from_bytes(&buf[..n]))
    }
}
