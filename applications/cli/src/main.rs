/// Shelf - album import orchestrator
use anyhow::anyhow;
use clap::Parser;
use shelf_core::ShelfConfig;
use shelf_importer::{ImportCoordinator, StatusReader};
use std::process::ExitCode;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod cli;

use cli::{Cli, Command};

#[tokio::main]
async fn main() -> ExitCode {
    // Logs go to stderr so stdout stays clean for stats and the tool's own output
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "shelf=info,shelf_importer=info,shelf_storage=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) if !e.use_stderr() => {
            let _ = e.print();
            return ExitCode::SUCCESS;
        }
        Err(e) => {
            let message = e.to_string();
            let message = message.strip_prefix("error: ").unwrap_or(&message);
            eprintln!("Error: {}", message.trim_end());
            return ExitCode::FAILURE;
        }
    };

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let command = cli
        .command
        .clone()
        .ok_or_else(|| anyhow!("no command given (see --help)"))?;
    let config = cli.load_config()?;

    if command == Command::Stats {
        return stats(&config).await;
    }

    let cancel = CancellationToken::new();
    tokio::spawn(cancel_on_signal(cancel.clone()));

    let coordinator = ImportCoordinator::open(&config).await?;
    let result = match command {
        Command::Setup {
            cutoff_time,
            previous_log,
        } => {
            coordinator
                .setup(cutoff_time, previous_log.as_deref(), &cancel)
                .await
        }
        Command::Import => coordinator.import(&cancel).await,
        Command::RetrySkips => coordinator.retry_skips(&cancel).await,
        Command::HandleSkips => coordinator.handle_skips(&cancel).await,
        Command::HandleSkip { terms } => coordinator.handle_skip(&terms, &cancel).await,
        Command::HandleErrors => coordinator.handle_errors(&cancel).await,
        Command::Stats => Ok(()),
    };

    let closed = coordinator.close().await;
    result?;
    closed?;
    Ok(())
}

async fn stats(config: &ShelfConfig) -> anyhow::Result<()> {
    let reader = StatusReader::open(config).await?;
    let counts = reader.stats().await;
    reader.close().await;

    println!("Album Stats:");
    for (status, count) in counts?.iter() {
        println!("{status}: {count}");
    }
    Ok(())
}

/// Cancel on the first Ctrl+C or SIGTERM, exit on the second
async fn cancel_on_signal(cancel: CancellationToken) {
    wait_for_signal().await;
    tracing::warn!("Interrupted, stopping after the current batch (interrupt again to quit)");
    cancel.cancel();

    wait_for_signal().await;
    tracing::warn!("Interrupted again, exiting");
    std::process::exit(130);
}

async fn wait_for_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::warn!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
}
