//! Fork-based fixture for tests that need to own a whole descriptor table.

use nix::libc;
use nix::sys::wait::{waitpid, WaitStatus};
use nix::unistd::{fork, ForkResult};
use std::panic::{self, AssertUnwindSafe};

/// Run `body` in a forked copy of the test process and return its exit
/// code: 0 when `body` returned true, 1 when it returned false or panicked.
///
/// The copy can rewire its own 0-2 and count its own children without
/// disturbing the other test threads.
pub(crate) fn in_helper(body: impl FnOnce() -> bool) -> i32 {
    // SAFETY: the helper runs the body and leaves through _exit, never
    // returning into the test harness.
    match unsafe { fork() }.unwrap() {
        ForkResult::Child => {
            let ok = panic::catch_unwind(AssertUnwindSafe(body)).unwrap_or(false);
            unsafe { libc::_exit(if ok { 0 } else { 1 }) }
        }
        ForkResult::Parent { child } => match waitpid(child, None).unwrap() {
            WaitStatus::Exited(_, code) => code,
            other => panic!("helper ended with {other:?}"),
        },
    }
}
