// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! svd: the stevedore supervisor daemon
//!
//! Runs the supervisor engine: state restore, the single-writer loop, the
//! process monitor, and the event journal. An RPC façade (shipped
//! separately) feeds tasks through [`sv_daemon::Daemon::tasks`].

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use sv_daemon::{startup, Config, LifecycleError, StartDefaults};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "svd", version, about = "stevedore container supervisor")]
struct Args {
    /// Root state directory (defaults to $XDG_STATE_HOME/stevedore)
    #[arg(long)]
    state_dir: Option<PathBuf>,

    /// Default OCI runtime binary for containers that don't name one
    #[arg(long, default_value = "runc")]
    runtime: String,

    /// Prefix argument passed on every default-runtime invocation
    /// (repeatable, e.g. --runtime-arg=--root=/run/runc)
    #[arg(long = "runtime-arg")]
    runtime_args: Vec<String>,

    /// Default shim binary for containers that don't name one
    #[arg(long, default_value = "stevedore-shim")]
    shim: String,

    /// Seconds to wait for a shim to report started
    #[arg(long, default_value_t = 15)]
    start_timeout: u64,

    /// Journaled events retained before rollover; 0 keeps everything
    #[arg(long, default_value_t = 0)]
    retention: usize,

    /// Log filter, e.g. "info" or "sv_daemon=debug"
    #[arg(long, default_value = "info")]
    log: String,

    /// Shorthand for --log debug
    #[arg(long)]
    debug: bool,

    /// Append logs to this file instead of stderr
    #[arg(long)]
    log_file: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    let _guard = match init_tracing(&args) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("svd: {e}");
            return ExitCode::FAILURE;
        }
    };
    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "daemon failed");
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> Result<(), LifecycleError> {
    let mut config = Config::load(args.state_dir, args.retention)?;
    config.defaults = StartDefaults {
        runtime: args.runtime,
        runtime_args: args.runtime_args,
        shim: args.shim,
        timeout: std::time::Duration::from_secs(args.start_timeout),
    };
    let daemon = startup(config).await?;
    wait_for_signal().await?;
    daemon.shutdown().await
}

/// Block until SIGTERM or SIGINT.
async fn wait_for_signal() -> Result<(), LifecycleError> {
    use tokio::signal::unix::{signal, SignalKind};
    let mut term = signal(SignalKind::terminate())?;
    let mut int = signal(SignalKind::interrupt())?;
    tokio::select! {
        _ = term.recv() => {}
        _ = int.recv() => {}
    }
    Ok(())
}

fn init_tracing(
    args: &Args,
) -> Result<Option<tracing_appender::non_blocking::WorkerGuard>, String> {
    let filter_spec = if args.debug { "debug" } else { args.log.as_str() };
    let filter = EnvFilter::try_new(filter_spec).map_err(|e| format!("bad --log filter: {e}"))?;
    match &args.log_file {
        Some(path) => {
            let dir = path.parent().unwrap_or_else(|| std::path::Path::new("."));
            let file = path.file_name().unwrap_or_else(|| std::ffi::OsStr::new("svd.log"));
            let appender = tracing_appender::rolling::never(dir, file);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(writer)
                .with_ansi(false)
                .init();
            Ok(Some(guard))
        }
        None => {
            tracing_subscriber::fmt().with_env_filter(filter).init();
            Ok(None)
        }
    }
}
