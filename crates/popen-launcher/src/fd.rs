//! Small descriptor helpers shared by the parent and the child branch.

use nix::errno::Errno;
use nix::sys::wait::waitpid;
use nix::unistd::Pid;
use popen_core::{OsErrorKind, PopenError, Result};
use rustix::io::FdFlags;
#[cfg(not(any(target_os = "macos", target_os = "ios")))]
use rustix::pipe::PipeFlags;
use std::io;
use std::os::fd::{AsFd, BorrowedFd, OwnedFd};

/// How many EINTRs `read_bounded` swallows before giving up.
pub const MAX_EINTR_RETRIES: u32 = 50;

fn rustix_err(kind: OsErrorKind, err: rustix::io::Errno) -> PopenError {
    PopenError::os(kind, io::Error::from_raw_os_error(err.raw_os_error()))
}

/// Pipe with both ends close-on-exec, returned as `(read, write)`.
///
/// The flag is set by the same syscall that creates the pipe, so a fork on
/// another thread can never inherit an end without it.
pub fn make_cloexec_pipe() -> Result<(OwnedFd, OwnedFd)> {
    pipe_cloexec().map_err(|e| rustix_err(OsErrorKind::PipeCreationFailed, e))
}

#[cfg(not(any(target_os = "macos", target_os = "ios")))]
fn pipe_cloexec() -> rustix::io::Result<(OwnedFd, OwnedFd)> {
    rustix::pipe::pipe_with(PipeFlags::CLOEXEC)
}

// No pipe2 here; the window between pipe and fcntl stays open.
#[cfg(any(target_os = "macos", target_os = "ios"))]
fn pipe_cloexec() -> rustix::io::Result<(OwnedFd, OwnedFd)> {
    let (read, write) = rustix::pipe::pipe()?;
    set_cloexec(&read, true)?;
    set_cloexec(&write, true)?;
    Ok((read, write))
}

pub fn set_cloexec<Fd: AsFd>(fd: Fd, on: bool) -> rustix::io::Result<()> {
    let flags = rustix::io::fcntl_getfd(&fd)?;
    let flags = if on {
        flags | FdFlags::CLOEXEC
    } else {
        flags.difference(FdFlags::CLOEXEC)
    };
    rustix::io::fcntl_setfd(&fd, flags)
}

pub fn is_cloexec<Fd: AsFd>(fd: Fd) -> rustix::io::Result<bool> {
    Ok(rustix::io::fcntl_getfd(fd)?.contains(FdFlags::CLOEXEC))
}

/// Write the whole buffer, looping over short writes.
///
/// Does not allocate, so the child may call it after fork.
pub fn write_all(fd: BorrowedFd<'_>, mut bytes: &[u8]) -> Result<()> {
    while !bytes.is_empty() {
        match rustix::io::write(fd, bytes) {
            Ok(0) => {
                return Err(PopenError::os(
                    OsErrorKind::IoFailed,
                    io::ErrorKind::WriteZero.into(),
                ))
            }
            Ok(n) => bytes = &bytes[n..],
            Err(e) => return Err(rustix_err(OsErrorKind::IoFailed, e)),
        }
    }
    Ok(())
}

/// Fill `buf` from `fd` until end of stream or until `buf` is full.
///
/// Returns the number of bytes read; 0 means the stream was already at its
/// end. Interrupted reads are retried up to [`MAX_EINTR_RETRIES`] times.
pub fn read_bounded(fd: BorrowedFd<'_>, buf: &mut [u8]) -> Result<usize> {
    let mut filled = 0;
    let mut interrupted = 0;
    while filled < buf.len() {
        match rustix::io::read(fd, &mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e == rustix::io::Errno::INTR && interrupted < MAX_EINTR_RETRIES => {
                interrupted += 1
            }
            Err(e) => return Err(rustix_err(OsErrorKind::IoFailed, e)),
        }
    }
    Ok(filled)
}

/// Collect the exit status of `pid` so it does not linger as a zombie.
pub fn reap(pid: Pid) -> Result<Pid> {
    loop {
        match waitpid(pid, None) {
            Ok(_) => return Ok(pid),
            Err(Errno::EINTR) => continue,
            Err(errno) => return Err(PopenError::os(OsErrorKind::WaitFailed, errno.into())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nix::sys::wait::WaitPidFlag;
    use nix::unistd::{fork, ForkResult};

    #[test]
    fn pipe_ends_are_cloexec() {
        let (r, w) = make_cloexec_pipe().unwrap();
        assert!(is_cloexec(&r).unwrap());
        assert!(is_cloexec(&w).unwrap());
    }

    #[test]
    fn set_cloexec_toggles_the_flag() {
        let (r, _w) = make_cloexec_pipe().unwrap();
        set_cloexec(&r, false).unwrap();
        assert!(!is_cloexec(&r).unwrap());
        set_cloexec(&r, true).unwrap();
        assert!(is_cloexec(&r).unwrap());
    }

    #[test]
    fn write_all_then_read_bounded_until_eof() {
        let (r, w) = make_cloexec_pipe().unwrap();
        write_all(w.as_fd(), b"hello\0world").unwrap();
        drop(w);
        let mut buf = [0u8; 64];
        let n = read_bounded(r.as_fd(), &mut buf).unwrap();
        assert_eq!(&buf[..n], b"hello\0world");
    }

    #[test]
    fn read_bounded_stops_at_capacity() {
        let (r, w) = make_cloexec_pipe().unwrap();
        write_all(w.as_fd(), &[7u8; 100]).unwrap();
        let mut buf = [0u8; 10];
        // Writer still open: the read must return once the buffer is full.
        assert_eq!(read_bounded(r.as_fd(), &mut buf).unwrap(), 10);
        assert_eq!(buf, [7u8; 10]);
    }

    #[test]
    fn read_bounded_reports_clean_eof_as_zero() {
        let (r, w) = make_cloexec_pipe().unwrap();
        drop(w);
        let mut buf = [0u8; 8];
        assert_eq!(read_bounded(r.as_fd(), &mut buf).unwrap(), 0);
    }

    #[test]
    fn write_to_closed_pipe_is_io_failed() {
        // SIGPIPE is ignored by the test harness's Rust runtime, so EPIPE surfaces.
        let (r, w) = make_cloexec_pipe().unwrap();
        drop(r);
        let err = write_all(w.as_fd(), b"x").unwrap_err();
        assert_eq!(err.os_kind(), Some(OsErrorKind::IoFailed));
    }

    #[test]
    fn reap_collects_child_and_leaves_no_zombie() {
        // SAFETY: the child only calls _exit.
        let child = match unsafe { fork() }.unwrap() {
            ForkResult::Child => unsafe { nix::libc::_exit(3) },
            ForkResult::Parent { child } => child,
        };
        assert_eq!(reap(child).unwrap(), child);
        assert_eq!(
            waitpid(child, Some(WaitPidFlag::WNOHANG)).unwrap_err(),
            Errno::ECHILD
        );
    }

    #[test]
    fn reap_of_unknown_child_is_wait_failed() {
        let err = reap(Pid::from_raw(i32::MAX)).unwrap_err();
        assert_eq!(err.os_kind(), Some(OsErrorKind::WaitFailed));
    }
}
