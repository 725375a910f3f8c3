//! Library side of the `popen` command: plan files and the run loop.

pub mod plan;
pub mod run;
