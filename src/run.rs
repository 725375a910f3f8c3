use anyhow::{Context, Result, anyhow, bail};
use log::debug;
use popen_core::{ProcessConfig, StdStream, StreamIntent};
use popen_launcher::{ExitStatus, Popen};
use std::path::PathBuf;

/// Exit code when the child could not be exec'd, as shells do.
pub const LAUNCH_FAILURE_EXIT: i32 = 127;

/// Offset added to the signal number when the child was killed.
const SIGNAL_EXIT_BASE: i32 = 128;

/// Flags of `popen run`, before they become a [`ProcessConfig`].
#[derive(Debug, Default)]
pub struct RunOptions {
    pub cwd: Option<PathBuf>,
    /// `KEY=VALUE` pairs.
    pub env: Vec<String>,
    pub stdin: StreamIntent,
    pub stdout: StreamIntent,
    pub stderr: StreamIntent,
    pub close_fds: bool,
    pub bufsize: usize,
    pub command: Vec<String>,
}

impl RunOptions {
    pub fn into_config(self) -> Result<ProcessConfig> {
        if self.command.is_empty() {
            bail!("no command given");
        }
        let mut config = ProcessConfig::new(self.command)
            .stdin(self.stdin)
            .stdout(self.stdout)
            .stderr(self.stderr)
            .close_fds(self.close_fds)
            .bufsize(self.bufsize);
        if let Some(dir) = self.cwd {
            config = config.cwd(dir);
        }
        for pair in &self.env {
            let (key, value) = parse_env_pair(pair)?;
            config = config.env(key, value);
        }
        Ok(config)
    }
}

fn parse_env_pair(pair: &str) -> Result<(&str, &str)> {
    match pair.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key, value)),
        _ => bail!("--env expects KEY=VALUE, got {pair:?}"),
    }
}

/// Launch `config`, wait for it and return the code this process should
/// exit with.
pub fn run(config: ProcessConfig) -> Result<i32> {
    for stream in StdStream::ALL {
        if config.streams.get(stream).is_pipe() {
            bail!("{}: 'pipe' has no reader here; use a file or fd", stream.name());
        }
    }

    let deferred = config.defer_start;
    let launched = Popen::new(config).and_then(|mut popen| {
        if deferred {
            popen.start()?;
        }
        Ok(popen)
    });
    let popen = match launched {
        Ok(popen) => popen,
        Err(e) if e.is_launch_failure() => {
            eprintln!("popen: {e}");
            return Ok(LAUNCH_FAILURE_EXIT);
        }
        Err(e) => return Err(e).context("launching child"),
    };

    let mut process = popen
        .into_process()
        .ok_or_else(|| anyhow!("child was not launched"))?;
    let pid = process.pid();
    let status = process
        .wait()
        .with_context(|| format!("waiting for child {pid}"))?;
    debug!("child {pid} finished: {status}");
    Ok(exit_code(status))
}

pub fn exit_code(status: ExitStatus) -> i32 {
    match status {
        ExitStatus::Exited(code) => code,
        ExitStatus::Signaled(signal) => SIGNAL_EXIT_BASE + signal,
    }
}
