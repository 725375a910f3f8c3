//! Data model shared by the launcher and the `popen` CLI.
//!
//! Nothing in here touches the OS: a [`ProcessConfig`] is a plain value that
//! describes what to run and where its standard streams go. Turning it into a
//! running child is the launcher's job.

mod cmdline;
mod config;
mod error;
mod stream;

pub use cmdline::{DEFAULT_DELIMS, join, split};
pub use config::{BufferMode, Lifecycle, ProcessConfig};
pub use error::{OsErrorKind, PopenError, Result};
pub use stream::{FileMode, StdStream, StreamIntent, Streams};
