use serde::{Deserialize, Serialize};
use std::fmt;
use std::os::fd::RawFd;
use std::path::PathBuf;
use std::str::FromStr;

use crate::error::PopenError;

/// One of the child's three standard slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StdStream {
    Stdin,
    Stdout,
    Stderr,
}

impl StdStream {
    pub const ALL: [StdStream; 3] = [Self::Stdin, Self::Stdout, Self::Stderr];

    /// Descriptor number the slot occupies in the child.
    pub const fn fileno(self) -> RawFd {
        match self {
            Self::Stdin => 0,
            Self::Stdout => 1,
            Self::Stderr => 2,
        }
    }

    pub const fn is_input(self) -> bool {
        matches!(self, Self::Stdin)
    }

    pub const fn name(self) -> &'static str {
        match self {
            Self::Stdin => "stdin",
            Self::Stdout => "stdout",
            Self::Stderr => "stderr",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileMode {
    Read,
    /// Create if missing, append otherwise.
    Append,
    /// Create if missing, truncate otherwise.
    Truncate,
}

impl FileMode {
    /// Read-only for stdin, create+append for the output streams.
    pub const fn default_for(stream: StdStream) -> Self {
        if stream.is_input() {
            Self::Read
        } else {
            Self::Append
        }
    }
}

/// Where a standard stream of the child should come from.
///
/// Textual form (CLI flags and plan files): `inherit`, `pipe`, `null`,
/// `fd:N`, `file:PATH`, `read:PATH`, `append:PATH`, `truncate:PATH`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum StreamIntent {
    /// Leave the slot as the parent has it.
    #[default]
    Inherit,
    /// Install an already-open descriptor owned by the caller.
    Descriptor(RawFd),
    /// Open `path` before fork. `mode: None` picks [`FileMode::default_for`].
    File {
        path: PathBuf,
        mode: Option<FileMode>,
    },
    /// Fresh pipe; the parent keeps the opposite end as a stream handle.
    Pipe,
}

impl StreamIntent {
    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self::File {
            path: path.into(),
            mode: None,
        }
    }

    pub fn file_with(path: impl Into<PathBuf>, mode: FileMode) -> Self {
        Self::File {
            path: path.into(),
            mode: Some(mode),
        }
    }

    pub fn null() -> Self {
        Self::file("/dev/null")
    }

    pub fn is_pipe(&self) -> bool {
        matches!(self, Self::Pipe)
    }
}

impl fmt::Display for StreamIntent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Inherit => f.write_str("inherit"),
            Self::Pipe => f.write_str("pipe"),
            Self::Descriptor(fd) => write!(f, "fd:{fd}"),
            Self::File { path, mode } => {
                let prefix = match mode {
                    None => "file",
                    Some(FileMode::Read) => "read",
                    Some(FileMode::Append) => "append",
                    Some(FileMode::Truncate) => "truncate",
                };
                write!(f, "{prefix}:{}", path.display())
            }
        }
    }
}

impl FromStr for StreamIntent {
    type Err = PopenError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || PopenError::InvalidIntent(s.to_owned());
        match s.trim() {
            "inherit" => return Ok(Self::Inherit),
            "pipe" => return Ok(Self::Pipe),
            "null" => return Ok(Self::null()),
            _ => {}
        }
        let (kind, rest) = s.trim().split_once(':').ok_or_else(invalid)?;
        if rest.is_empty() {
            return Err(invalid());
        }
        match kind {
            "fd" => {
                let fd: RawFd = rest.parse().map_err(|_| invalid())?;
                if fd < 0 {
                    return Err(invalid());
                }
                Ok(Self::Descriptor(fd))
            }
            "file" => Ok(Self::file(rest)),
            "read" => Ok(Self::file_with(rest, FileMode::Read)),
            "append" => Ok(Self::file_with(rest, FileMode::Append)),
            "truncate" => Ok(Self::file_with(rest, FileMode::Truncate)),
            _ => Err(invalid()),
        }
    }
}

impl TryFrom<String> for StreamIntent {
    type Error = PopenError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<StreamIntent> for String {
    fn from(intent: StreamIntent) -> Self {
        intent.to_string()
    }
}

/// Intents for all three standard slots.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Streams {
    pub stdin: StreamIntent,
    pub stdout: StreamIntent,
    pub stderr: StreamIntent,
}

impl Streams {
    /// Pipes on all three slots.
    pub fn piped() -> Self {
        Self {
            stdin: StreamIntent::Pipe,
            stdout: StreamIntent::Pipe,
            stderr: StreamIntent::Pipe,
        }
    }

    pub fn get(&self, stream: StdStream) -> &StreamIntent {
        match stream {
            StdStream::Stdin => &self.stdin,
            StdStream::Stdout => &self.stdout,
            StdStream::Stderr => &self.stderr,
        }
    }

    pub fn set(&mut self, stream: StdStream, intent: StreamIntent) {
        match stream {
            StdStream::Stdin => self.stdin = intent,
            StdStream::Stdout => self.stdout = intent,
            StdStream::Stderr => self.stderr = intent,
        }
    }

    pub fn any_pipe(&self) -> bool {
        StdStream::ALL.iter().any(|s| self.get(*s).is_pipe())
    }
}
