use anyhow::Context;
use clap::Parser;
use tracing::{error, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use vigil::cli::{self, Cli, Commands};
use vigil::config::LoggingConfig;
use vigil::coordination::shutdown_signal;
use vigil::{App, AppConfig, HeuristicEngine, Manifest};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Cli::parse();

    match args.command {
        Commands::Run { bootstrap } => {
            let config = AppConfig::load_from(&args.config_dir)
                .with_context(|| format!("loading config from {}", args.config_dir.display()))?;
            let _guard = init_logging(&config.logging)?;
            run(config, bootstrap).await
        }
        Commands::Validate { manifest, json } => {
            init_logging_simple();
            let config = AppConfig::load_from(&args.config_dir).unwrap_or_default();
            let manifest = Manifest::load(&manifest)?;
            let rows = cli::validate_manifest(&HeuristicEngine::with_defaults(), &config, &manifest);
            cli::print_rows(&rows, json)?;

            let failed = rows.iter().filter(|r| !r.is_ok()).count();
            if failed > 0 {
                anyhow::bail!("{} of {} manifest entries are invalid", failed, rows.len());
            }
            Ok(())
        }
        Commands::Heuristics { json } => {
            init_logging_simple();
            cli::print_rows(&cli::heuristic_rows(&HeuristicEngine::with_defaults()), json)
        }
    }
}

async fn run(config: AppConfig, bootstrap: Option<std::path::PathBuf>) -> anyhow::Result<()> {
    info!("Starting vigil {}", env!("CARGO_PKG_VERSION"));

    let manifest_path = bootstrap.or_else(|| config.bootstrap_path.clone().map(Into::into));
    let mut app = App::new(config).await.context("failed to initialize")?;
    app.start().await?;

    if let Some(path) = manifest_path {
        let report = app
            .bootstrap_from_path(&path)
            .await
            .with_context(|| format!("bootstrap manifest {}", path.display()))?;
        info!(
            "Bootstrap created {}/{} sessions from {}",
            report.created.len(),
            report.total(),
            path.display()
        );
        if !report.is_complete() {
            warn!("{} manifest entries were rejected", report.failures.len());
        }
    }

    let report = app.listen_for_shutdown(shutdown_signal()).await;
    if report.is_clean() {
        info!("Stopped {} sessions cleanly", report.stopped.len());
    } else {
        error!(
            "Shutdown deadline passed: {} stopped, {} abandoned",
            report.stopped.len(),
            report.abandoned.len()
        );
    }
    Ok(())
}

/// Console plus optional daily rolling file. The returned guard must live
/// until exit or buffered file lines are lost.
fn init_logging(config: &LoggingConfig) -> anyhow::Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!("{},vigil=debug,sqlx=warn", config.level))
    });

    let (file_layer, guard) = match &config.directory {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "vigil.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer().with_writer(writer).with_ansi(false).json();
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    let console = if config.json {
        fmt::layer().json().with_target(true).boxed()
    } else {
        fmt::layer()
            .with_target(true)
            .with_thread_ids(false)
            .with_file(false)
            .with_line_number(false)
            .boxed()
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(console)
        .with(file_layer)
        .try_init()
        .context("installing tracing subscriber")?;

    Ok(guard)
}

fn init_logging_simple() {
    // Minimal logging for one-shot commands
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::WARN)
        .try_init();
}
