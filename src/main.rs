#![forbid(unsafe_code)]
use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use log::LevelFilter;
use popen::plan::{load_plan, render_plan};
use popen::run::{RunOptions, run};
use popen_core::StreamIntent;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "popen", version, author)]
struct Cli {
    /// Log launch milestones (RUST_LOG still overrides)
    #[arg(short, long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a command with redirected streams and exit with its status
    Run(RunArgs),
    /// Run the process described by a TOML plan file
    Exec {
        #[arg(short, long)]
        plan: PathBuf,
    },
    /// Print a plan file as it was understood
    Show {
        #[arg(short, long)]
        plan: PathBuf,
    },
}

#[derive(Args)]
struct RunArgs {
    #[arg(long)]
    cwd: Option<PathBuf>,
    /// KEY=VALUE, merged over the inherited environment
    #[arg(short, long)]
    env: Vec<String>,
    /// inherit | null | fd:N | file:PATH | read:PATH | append:PATH | truncate:PATH
    #[arg(long, default_value = "inherit")]
    stdin: StreamIntent,
    #[arg(long, default_value = "inherit")]
    stdout: StreamIntent,
    #[arg(long, default_value = "inherit")]
    stderr: StreamIntent,
    /// Close every inherited descriptor above 2 in the child
    #[arg(long)]
    close_fds: bool,
    #[arg(long, default_value_t = 0)]
    bufsize: usize,
    #[arg(last = true, required = true)]
    command: Vec<String>,
}

impl From<RunArgs> for RunOptions {
    fn from(args: RunArgs) -> Self {
        Self {
            cwd: args.cwd,
            env: args.env,
            stdin: args.stdin,
            stdout: args.stdout,
            stderr: args.stderr,
            close_fds: args.close_fds,
            bufsize: args.bufsize,
            command: args.command,
        }
    }
}

fn init_logger(verbose: bool) {
    let level = if verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Warn
    };
    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .try_init()
        .ok();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logger(cli.verbose);

    let code = match cli.command {
        Commands::Run(args) => run(RunOptions::from(args).into_config()?)?,
        Commands::Exec { plan } => run(load_plan(&plan)?)?,
        Commands::Show { plan } => {
            print!("{}", render_plan(&load_plan(&plan)?)?);
            return Ok(());
        }
    };

    std::process::exit(code)
}
