//! Everything that runs between fork and exec.
//!
//! Only raw syscalls on data the parent prepared: no allocation, no locks,
//! no logging. Each step either succeeds or short-circuits into writing a
//! diagnostic to the error channel followed by `_exit`. Nothing here ever
//! returns to the caller.

use nix::errno::Errno;
use nix::libc;
use popen_core::OsErrorKind;
use popen_ipc::Diagnostic;
use std::convert::Infallible;
use std::ffi::CStr;
use std::os::fd::{BorrowedFd, RawFd};

use crate::exec::ExecImage;
use crate::fd::write_all;

/// Lowest descriptor number outside the standard slots.
const FIRST_FREE_FD: RawFd = 3;

/// Raw descriptor numbers as they are at the fork instant.
pub(crate) struct ChildContext<'a> {
    /// Source descriptor per standard slot, `None` for inherit.
    pub(crate) sources: [Option<RawFd>; 3],
    /// Parent-held pipe ends; closed first thing in the child.
    pub(crate) parent_ends: [Option<RawFd>; 3],
    pub(crate) err_read: RawFd,
    pub(crate) err_write: RawFd,
    pub(crate) close_fds: bool,
    pub(crate) image: &'a ExecImage,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Fault {
    kind: OsErrorKind,
    errno: Errno,
}

impl Fault {
    fn last(kind: OsErrorKind) -> Self {
        let errno = match Errno::last() {
            // sysconf can fail without touching errno
            Errno::UnknownErrno => Errno::EINVAL,
            errno => errno,
        };
        Self { kind, errno }
    }
}

type Step = Result<(), Fault>;

/// Child branch of the launch. Execs or exits.
pub(crate) fn run(mut ctx: ChildContext<'_>) -> ! {
    // SAFETY: these descriptors belong to the parent from here on.
    unsafe {
        libc::close(ctx.err_read);
        for fd in ctx.parent_ends.into_iter().flatten() {
            libc::close(fd);
        }
    }
    let fault = match setup(&mut ctx) {
        Ok(never) => match never {},
        Err(fault) => fault,
    };
    report(ctx.err_write, fault);
    // SAFETY: _exit skips the atexit handlers and stdio buffers copied from the parent.
    unsafe { libc::_exit(libc::EXIT_FAILURE) }
}

fn setup(ctx: &mut ChildContext<'_>) -> Result<Infallible, Fault> {
    ctx.err_write = lift_error_channel(ctx.err_write)?;
    relocate_collisions(&mut ctx.sources)?;
    install_stdio(&ctx.sources)?;
    close_sources(&ctx.sources);
    if ctx.close_fds {
        close_unlisted(ctx.err_write)?;
    }
    if let Some(dir) = ctx.image.cwd() {
        chdir(dir)?;
    }
    Err(exec(ctx.image))
}

/// The channel's write end may sit on 0-2 when the parent had closed its own
/// standard streams. Move it up before the installs overwrite it.
fn lift_error_channel(fd: RawFd) -> Result<RawFd, Fault> {
    if fd >= FIRST_FREE_FD {
        return Ok(fd);
    }
    // SAFETY: plain fcntl on an open descriptor.
    let moved = unsafe { libc::fcntl(fd, libc::F_DUPFD_CLOEXEC, FIRST_FREE_FD) };
    if moved < 0 {
        return Err(Fault::last(OsErrorKind::DupFailed));
    }
    Ok(moved)
}

/// Slots whose source descriptor has the number of a different standard
/// slot. Installing any slot first could clobber such a source.
pub(crate) fn collisions(sources: &[Option<RawFd>; 3]) -> [bool; 3] {
    let mut hit = [false; 3];
    for (slot, source) in sources.iter().enumerate() {
        if let Some(fd) = *source {
            hit[slot] = (0..FIRST_FREE_FD).contains(&fd) && fd as usize != slot;
        }
    }
    hit
}

fn relocate_collisions(sources: &mut [Option<RawFd>; 3]) -> Step {
    let hits = collisions(sources);
    for (slot, hit) in hits.into_iter().enumerate() {
        let Some(fd) = sources[slot].filter(|_| hit) else {
            continue;
        };
        // F_DUPFD leaves the copy without close-on-exec.
        // SAFETY: plain fcntl on an open descriptor.
        let moved = unsafe { libc::fcntl(fd, libc::F_DUPFD, FIRST_FREE_FD) };
        if moved < 0 {
            return Err(Fault::last(OsErrorKind::DupFailed));
        }
        sources[slot] = Some(moved);
    }
    Ok(())
}

fn install_stdio(sources: &[Option<RawFd>; 3]) -> Step {
    for (target, source) in (0..).zip(sources) {
        let Some(fd) = *source else {
            continue;
        };
        if fd == target {
            // dup2 onto itself keeps FD_CLOEXEC, so clear it by hand.
            clear_cloexec(fd)?;
        } else {
            dup2(fd, target)?;
        }
    }
    Ok(())
}

fn clear_cloexec(fd: RawFd) -> Step {
    // SAFETY: plain fcntl on an open descriptor.
    unsafe {
        let flags = libc::fcntl(fd, libc::F_GETFD);
        if flags < 0 || libc::fcntl(fd, libc::F_SETFD, flags & !libc::FD_CLOEXEC) < 0 {
            return Err(Fault::last(OsErrorKind::DupFailed));
        }
    }
    Ok(())
}

fn dup2(fd: RawFd, target: RawFd) -> Step {
    loop {
        // SAFETY: both are plain descriptor numbers.
        if unsafe { libc::dup2(fd, target) } >= 0 {
            return Ok(());
        }
        let fault = Fault::last(OsErrorKind::DupFailed);
        if fault.errno != Errno::EINTR {
            return Err(fault);
        }
    }
}

/// Close the originals now that they live on 0-2.
fn close_sources(sources: &[Option<RawFd>; 3]) {
    for fd in sources.iter().flatten().copied() {
        if fd >= FIRST_FREE_FD {
            // SAFETY: the copy on the standard slot keeps the file open.
            unsafe { libc::close(fd) };
        }
    }
}

fn close_unlisted(keep: RawFd) -> Step {
    // SAFETY: sysconf has no memory-safety preconditions.
    let limit = unsafe { libc::sysconf(libc::_SC_OPEN_MAX) };
    if limit < 0 {
        return Err(Fault::last(OsErrorKind::SysconfFailed));
    }
    let limit = RawFd::try_from(limit).unwrap_or(RawFd::MAX);
    for fd in FIRST_FREE_FD..limit {
        if fd != keep {
            // SAFETY: EBADF on descriptors that are not open is harmless.
            unsafe { libc::close(fd) };
        }
    }
    Ok(())
}

fn chdir(dir: &CStr) -> Step {
    // SAFETY: `dir` is NUL-terminated.
    if unsafe { libc::chdir(dir.as_ptr()) } < 0 {
        return Err(Fault::last(OsErrorKind::ChdirFailed));
    }
    Ok(())
}

/// Only ever returns on failure.
fn exec(image: &ExecImage) -> Fault {
    // SAFETY: the program string and both pointer tables are NUL-terminated
    // and owned by `image`, which outlives the call.
    unsafe {
        libc::execve(image.program().as_ptr(), image.argv_ptr(), image.envp_ptr());
    }
    Fault::last(OsErrorKind::ExecFailed)
}

/// Best effort: if the channel is broken the parent still sees the exit.
fn report(err_write: RawFd, fault: Fault) {
    let msg = Diagnostic::child_failure(
        fault.kind.describe(),
        fault.errno.desc(),
        fault.errno as i32,
    );
    // SAFETY: the write end stays open until _exit.
    let fd = unsafe { BorrowedFd::borrow_raw(err_write) };
    let _ = write_all(fd, msg.as_bytes());
}
