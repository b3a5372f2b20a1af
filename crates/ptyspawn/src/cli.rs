//! ptyspawn command line

use crate::relay;
use crate::terminal_guard::TerminalGuard;
use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use ptyspawn_pty::{ExitStatus, Pid, ProcessTable, Signal, SpawnOptions, Spawner, WindowSize};
use std::ffi::OsString;
use std::io;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    fn as_str(self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Run a program on a fresh pseudo-terminal")]
pub struct Args {
    /// Skip the initial "sane" terminal mode setup
    #[arg(long)]
    pub no_tty_init: bool,

    /// Do not copy this terminal's modes and size onto the new pty
    #[arg(long)]
    pub no_tty_copy: bool,

    /// Log the command line before spawning
    #[arg(long)]
    pub echo: bool,

    /// Signal the program starts with ignored (repeatable), e.g. INT or SIGHUP
    #[arg(long = "ignore", value_name = "SIGNAL", value_parser = parse_signal)]
    pub ignore: Vec<Signal>,

    /// Initial pty rows
    #[arg(long, requires = "cols")]
    pub rows: Option<u16>,

    /// Initial pty columns
    #[arg(long, requires = "rows")]
    pub cols: Option<u16>,

    /// Do not forward stdin to the program
    #[arg(long)]
    pub no_stdin: bool,

    /// Log level
    #[arg(long, value_enum, default_value = "warn")]
    pub log_level: LogLevel,

    /// Path to log file (stderr if not specified)
    #[arg(long)]
    pub log_file: Option<PathBuf>,

    /// Program to run, followed by its arguments
    #[arg(
        required = true,
        trailing_var_arg = true,
        allow_hyphen_values = true,
        value_name = "COMMAND"
    )]
    pub command: Vec<OsString>,
}

impl Args {
    pub fn spawn_options(&self) -> SpawnOptions {
        let mut options = SpawnOptions::new()
            .no_tty_init(self.no_tty_init)
            .no_tty_copy(self.no_tty_copy)
            .echo(self.echo);
        for sig in &self.ignore {
            options = options.ignore_signal(*sig);
        }
        if let (Some(rows), Some(cols)) = (self.rows, self.cols) {
            options = options.window_size(WindowSize::new(rows, cols));
        }
        options
    }
}

/// Accepts `SIGINT`, `INT` or `int`.
pub fn parse_signal(name: &str) -> Result<Signal, String> {
    let upper = name.trim().to_ascii_uppercase();
    let full = if upper.starts_with("SIG") {
        upper
    } else {
        format!("SIG{upper}")
    };
    Signal::from_str(&full).map_err(|_| format!("unknown signal: {name}"))
}

pub async fn run() -> Result<i32> {
    let args = Args::parse();
    init_logging(args.log_level, args.echo, args.log_file.as_deref())?;
    execute(&args).await
}

fn init_logging(level: LogLevel, echo: bool, log_file: Option<&Path>) -> Result<()> {
    let mut directives = level.as_str().to_string();
    if echo && level < LogLevel::Info {
        directives.push_str(",ptyspawn_pty=info");
    }
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(directives));

    match log_file {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file: {}", path.display()))?;
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(file)
                .with_ansi(false)
                .init();
        }
        None => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(io::stderr)
                .init();
        }
    }
    Ok(())
}

/// Spawn the command, relay its pty until hangup and return the exit code
/// to report.
pub async fn execute(args: &Args) -> Result<i32> {
    let options = args.spawn_options();
    let mut table = ProcessTable::new();
    let program = args.command[0].to_string_lossy().into_owned();

    let mut record = Spawner::new()
        .spawn(&mut table, &args.command, &options)
        .with_context(|| format!("Failed to spawn {program}"))?;
    let pid = record.pid();
    let pty = record.take_pty().context("Spawned process has no pty")?;

    let mut guard = TerminalGuard::for_stdin(!args.no_stdin)?;
    let input = (!args.no_stdin).then(relay::stdin_channel);
    let copied = relay::relay(pty, tokio::io::stdout(), input)
        .await
        .context("PTY relay failed")?;
    guard.disable_raw_mode()?;
    debug!(pid = %pid, bytes = copied, "pty hung up");

    let status = tokio::task::spawn_blocking(move || {
        let mut table = table;
        wait_for_exit(&mut table, pid)
    })
    .await??;
    record.observe(status);
    info!(pid = %pid, %status, "{program} finished");

    Ok(status.code().unwrap_or(1))
}

fn wait_for_exit(table: &mut ProcessTable, pid: Pid) -> Result<ExitStatus> {
    loop {
        let status = table.wait(pid)?;
        if status.is_terminated() {
            return Ok(status);
        }
        debug!(pid = %pid, %status, "still waiting");
    }
}
