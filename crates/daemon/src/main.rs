// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! fxd — function execution agent daemon.
//!
//! Exit codes: 0 clean shutdown, 1 fatal startup failure, 2 unrecoverable
//! runtime failure (container daemon lost while serving).

use clap::Parser;
use fx_daemon::config::AgentConfig;
use fx_daemon::dispatch::FatalError;
use fx_daemon::lifecycle::startup;
use std::path::PathBuf;
use tracing_subscriber::fmt::writer::MakeWriterExt;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "fxd", about = "Function execution agent", version)]
struct Args {
    /// Path to the agent config file
    #[arg(long, default_value = "fxd.toml")]
    config: PathBuf,

    /// Log filter override (e.g. "debug", "fx_daemon=trace")
    #[arg(long)]
    log_level: Option<String>,
}

fn main() {
    let code = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map(|runtime| runtime.block_on(run()))
        .unwrap_or_else(|e| {
            eprintln!("fxd: failed to start runtime: {}", e);
            1
        });
    std::process::exit(code);
}

async fn run() -> i32 {
    let args = Args::parse();

    let config = match AgentConfig::load(&args.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("fxd: {}", e);
            return 1;
        }
    };

    let _log_guard = init_tracing(&config, args.log_level.as_deref());

    let agent = match startup(config).await {
        Ok(agent) => agent,
        Err(e) => {
            tracing::error!(error = %e, "startup failed");
            return 1;
        }
    };

    spawn_signal_handler(agent.shutdown.clone());

    let result = agent.dispatcher.run().await;
    agent.stop_actors().await;

    match result {
        Ok(()) => {
            tracing::info!("clean shutdown");
            0
        }
        Err(FatalError::DaemonLost) => {
            tracing::error!("container daemon lost, exiting");
            2
        }
    }
}

/// SIGINT/SIGTERM stop intake; in-flight jobs get the drain grace.
fn spawn_signal_handler(shutdown: tokio_util::sync::CancellationToken) {
    tokio::spawn(async move {
        use tokio::signal::unix::{signal, SignalKind};
        let term = signal(SignalKind::terminate());
        let int = signal(SignalKind::interrupt());
        match (term, int) {
            (Ok(mut term), Ok(mut int)) => {
                tokio::select! {
                    _ = term.recv() => {}
                    _ = int.recv() => {}
                }
                tracing::info!("shutdown signal received");
                shutdown.cancel();
            }
            _ => tracing::warn!("failed to install signal handlers"),
        }
    });
}

/// Stderr logging, plus a daily-rolling file when `log.dir` is set.
fn init_tracing(
    config: &AgentConfig,
    override_level: Option<&str>,
) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let level = override_level.unwrap_or(&config.log.level);
    let filter = EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info"));

    match config.log.dir {
        Some(ref dir) => {
            let appender = tracing_appender::rolling::daily(dir, "fxd.log");
            let (file_writer, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(file_writer.and(std::io::stderr))
                .with_ansi(false)
                .init();
            Some(guard)
        }
        None => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .init();
            None
        }
    }
}
