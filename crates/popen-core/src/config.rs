use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::cmdline::{DEFAULT_DELIMS, split};
use crate::error::{PopenError, Result};
use crate::stream::{StreamIntent, Streams};

/// Buffering applied to the parent-side stream handles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferMode {
    Unbuffered,
    /// What a size of 1 asks for. Behaves exactly like `Unbuffered`.
    LineUnbuffered,
    Full(usize),
}

impl BufferMode {
    pub const fn from_size(size: usize) -> Self {
        match size {
            0 => Self::Unbuffered,
            1 => Self::LineUnbuffered,
            n => Self::Full(n),
        }
    }

    /// Capacity of the buffer, `None` when every call goes straight to the fd.
    pub const fn capacity(self) -> Option<usize> {
        match self {
            Self::Full(n) => Some(n),
            Self::Unbuffered | Self::LineUnbuffered => None,
        }
    }
}

/// Launch state of a child, as seen from the parent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    /// Configured but not forked yet, or between fork and the exec report.
    Launching,
    /// The child replaced its image.
    Running,
    /// Exit status collected.
    Reaped,
}

/// Everything needed to launch one child.
///
/// Scalar fields come first so the value serializes to valid TOML.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProcessConfig {
    /// Program to exec. Defaults to `argv[0]`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub executable: Option<PathBuf>,
    #[serde(default)]
    pub argv: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cwd: Option<PathBuf>,
    /// Close every inherited descriptor above 2 in the child.
    #[serde(default)]
    pub close_fds: bool,
    /// See [`BufferMode::from_size`].
    #[serde(default)]
    pub bufsize: usize,
    /// Wait for an explicit start instead of launching on construction.
    #[serde(default)]
    pub defer_start: bool,
    /// Merged over the inherited environment.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub env: BTreeMap<String, String>,
    #[serde(default)]
    pub streams: Streams,
}

impl ProcessConfig {
    pub fn new<I, S>(argv: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            argv: argv.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    /// Build from a whitespace-separated command line. No quoting rules apply.
    pub fn from_command_line(line: &str) -> Self {
        Self::new(split(line, DEFAULT_DELIMS))
    }

    pub fn executable(mut self, path: impl Into<PathBuf>) -> Self {
        self.executable = Some(path.into());
        self
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.argv.push(arg.into());
        self
    }

    pub fn cwd(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn envs<I, K, V>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.env
            .extend(vars.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    pub fn stdin(mut self, intent: StreamIntent) -> Self {
        self.streams.stdin = intent;
        self
    }

    pub fn stdout(mut self, intent: StreamIntent) -> Self {
        self.streams.stdout = intent;
        self
    }

    pub fn stderr(mut self, intent: StreamIntent) -> Self {
        self.streams.stderr = intent;
        self
    }

    pub fn close_fds(mut self, close: bool) -> Self {
        self.close_fds = close;
        self
    }

    pub fn bufsize(mut self, size: usize) -> Self {
        self.bufsize = size;
        self
    }

    pub fn defer_start(mut self, defer: bool) -> Self {
        self.defer_start = defer;
        self
    }

    pub fn buffer_mode(&self) -> BufferMode {
        BufferMode::from_size(self.bufsize)
    }

    /// The program that will be exec'd: `executable` if set, else `argv[0]`.
    pub fn program(&self) -> Result<&Path> {
        let program = match (&self.executable, self.argv.first()) {
            (Some(exe), _) => exe.as_path(),
            (None, Some(first)) => Path::new(first.as_str()),
            (None, None) => {
                return Err(PopenError::InvalidConfig(
                    "no executable and an empty argument vector".into(),
                ));
            }
        };
        if program.as_os_str().is_empty() {
            return Err(PopenError::InvalidConfig("executable name is empty".into()));
        }
        Ok(program)
    }

    /// Argument vector handed to the program. `argv[0]` falls back to the
    /// executable name when no arguments were given.
    pub fn effective_argv(&self) -> Result<Vec<String>> {
        if !self.argv.is_empty() {
            return Ok(self.argv.clone());
        }
        let program = self.program()?;
        Ok(vec![program.to_string_lossy().into_owned()])
    }

    pub fn validate(&self) -> Result<()> {
        self.program()?;
        for key in self.env.keys() {
            if key.is_empty() || key.contains('=') {
                return Err(PopenError::InvalidConfig(format!(
                    "environment key {key:?} is empty or contains '='"
                )));
            }
        }
        if let Some(dir) = &self.cwd {
            if dir.as_os_str().is_empty() {
                return Err(PopenError::InvalidConfig("cwd is empty".into()));
            }
        }
        Ok(())
    }
}
