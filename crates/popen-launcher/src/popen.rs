use popen_core::{Lifecycle, ProcessConfig, Result};

use crate::launch::launch;
use crate::process::RunningProcess;

#[derive(Debug)]
enum State {
    Pending,
    /// A launch was attempted and returned an error. `reaped` is set when
    /// a child was forked and collected before the error came back.
    Failed { reaped: bool },
    Launched(RunningProcess),
}

/// A configured child plus its launch state.
///
/// Construction launches immediately unless the config asks for a deferred
/// start, in which case [`Popen::start`] must be called exactly once.
#[derive(Debug)]
pub struct Popen {
    config: ProcessConfig,
    state: State,
}

impl Popen {
    pub fn new(config: ProcessConfig) -> Result<Self> {
        let mut popen = Self {
            config,
            state: State::Pending,
        };
        if !popen.config.defer_start {
            popen.launch()?;
        }
        Ok(popen)
    }

    /// Launch a deferred child.
    ///
    /// # Panics
    ///
    /// If the config was not built with `defer_start`, or if `start` was
    /// already called. Both are caller bugs, not runtime conditions.
    pub fn start(&mut self) -> Result<()> {
        assert!(
            self.config.defer_start,
            "Popen::start called on a child that was launched on construction"
        );
        assert!(
            matches!(self.state, State::Pending),
            "Popen::start called twice"
        );
        self.launch()
    }

    fn launch(&mut self) -> Result<()> {
        match launch(&self.config) {
            Ok(process) => {
                self.state = State::Launched(process);
                Ok(())
            }
            Err(e) => {
                self.state = State::Failed {
                    reaped: e.is_launch_failure(),
                };
                Err(e)
            }
        }
    }

    pub fn config(&self) -> &ProcessConfig {
        &self.config
    }

    pub fn lifecycle(&self) -> Lifecycle {
        match &self.state {
            State::Pending | State::Failed { reaped: false } => Lifecycle::Launching,
            State::Failed { reaped: true } => Lifecycle::Reaped,
            State::Launched(process) => process.lifecycle(),
        }
    }

    pub fn pid(&self) -> Option<i32> {
        self.process().map(RunningProcess::pid)
    }

    pub fn process(&self) -> Option<&RunningProcess> {
        match &self.state {
            State::Launched(process) => Some(process),
            _ => None,
        }
    }

    pub fn process_mut(&mut self) -> Option<&mut RunningProcess> {
        match &mut self.state {
            State::Launched(process) => Some(process),
            _ => None,
        }
    }

    pub fn into_process(self) -> Option<RunningProcess> {
        match self.state {
            State::Launched(process) => Some(process),
            _ => None,
        }
    }
}
