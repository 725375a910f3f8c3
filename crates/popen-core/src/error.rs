use std::fmt;
use std::io;

/// Which syscall-level step of a launch went wrong.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OsErrorKind {
    PipeCreationFailed,
    ForkFailed,
    DupFailed,
    ChdirFailed,
    ExecFailed,
    SysconfFailed,
    WaitFailed,
    FileOpenFailed,
    IoFailed,
}

impl OsErrorKind {
    pub const fn describe(self) -> &'static str {
        match self {
            Self::PipeCreationFailed => "pipe creation failed",
            Self::ForkFailed => "fork failed",
            Self::DupFailed => "dup2 failed",
            Self::ChdirFailed => "chdir failed",
            Self::ExecFailed => "execve failed",
            Self::SysconfFailed => "sysconf failed",
            Self::WaitFailed => "waitpid failed",
            Self::FileOpenFailed => "file open failed",
            Self::IoFailed => "i/o failed",
        }
    }
}

impl fmt::Display for OsErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.describe())
    }
}

#[derive(thiserror::Error, Debug)]
pub enum PopenError {
    /// A syscall failed in the parent.
    #[error("{kind}: {source}")]
    Os {
        kind: OsErrorKind,
        #[source]
        source: io::Error,
    },
    /// The child reported a failure before it could exec. It has already
    /// been reaped when this is returned.
    #[error("child {pid} failed before exec: {diagnostic}")]
    Launch { pid: i32, diagnostic: String },
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("invalid stream intent {0:?}")]
    InvalidIntent(String),
}

impl PopenError {
    pub fn os(kind: OsErrorKind, source: io::Error) -> Self {
        Self::Os { kind, source }
    }

    pub fn os_kind(&self) -> Option<OsErrorKind> {
        match self {
            Self::Os { kind, .. } => Some(*kind),
            _ => None,
        }
    }

    pub fn is_launch_failure(&self) -> bool {
        matches!(self, Self::Launch { .. })
    }
}

pub type Result<T> = std::result::Result<T, PopenError>;
