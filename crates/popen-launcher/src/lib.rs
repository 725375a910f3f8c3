//! Fork/exec launcher with stream redirection and an error channel.
//!
//! [`launch`] returns only once it knows whether the child replaced its
//! image. A child that fails anywhere between fork and exec writes a short
//! diagnostic to a close-on-exec pipe before exiting, and the parent turns it
//! into [`PopenError::Launch`](popen_core::PopenError::Launch) after reaping
//! the child.

mod channel;
mod child;
mod exec;
pub mod fd;
mod handle;
mod launch;
mod plan;
mod popen;
mod process;
#[cfg(test)]
mod testing;

pub use exec::DEFAULT_PATH;
pub use handle::{ChildStderr, ChildStdin, ChildStdout, PipeReader, PipeWriter};
pub use launch::launch;
pub use popen::Popen;
pub use process::{ExitStatus, RunningProcess};
