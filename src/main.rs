use anyhow::{Context, Result};
use clap::Parser;
use guardian::cli::{check_once, Cli, Commands};
use guardian::config::{GuardianConfig, LoggingConfig};
use guardian::coordination::{listen_for_signals, shutdown_channel};
use guardian::supervisor::{HttpHealthProbe, Supervisor};
use guardian::GuardianError;
use std::path::Path;
use std::process::ExitCode;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let config = GuardianConfig::load_from(&cli.config)
        .with_context(|| format!("failed to load configuration from {}", cli.config.display()))?;

    if let Err(errors) = config.validate() {
        return Err(GuardianError::Validation(errors.join("; ")).into());
    }

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => {
            run_guardian(config).await?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Check => run_check(config).await,
        Commands::Config => {
            println!("{}", toml::to_string_pretty(&config)?);
            Ok(ExitCode::SUCCESS)
        }
    }
}

async fn run_guardian(config: GuardianConfig) -> Result<()> {
    // Held until exit so buffered file logs are flushed
    let _log_guard = init_logging(&config.logging)?;

    info!(
        "Supervising `{}` in {} (health: {})",
        config.launch_spec().command_line(),
        config.worker.working_dir.display(),
        config.health.url
    );

    let supervisor = Supervisor::from_config(&config)?;
    let (handle, token) = shutdown_channel();
    tokio::spawn(listen_for_signals(handle));

    let stats = supervisor.run(token).await;
    info!(
        "Guardian exiting: {} launches, {} restarts, {} spawn failures, {}/{} failed probes",
        stats.launches, stats.restarts, stats.spawn_failures, stats.probe_failures, stats.probes
    );
    Ok(())
}

/// Exit code reflects the probe; the failure is reported once, here
async fn run_check(config: GuardianConfig) -> Result<ExitCode> {
    init_logging_simple();

    let probe = HttpHealthProbe::from_config(&config.health)?;
    match check_once(&probe).await {
        Ok(result) => {
            println!("\x1b[32m✓ {} is {}\x1b[0m", probe.url(), result.status);
            Ok(ExitCode::SUCCESS)
        }
        Err(e) => {
            println!("\x1b[31m✗ {}\x1b[0m", e);
            Ok(ExitCode::FAILURE)
        }
    }
}

fn init_logging(config: &LoggingConfig) -> Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("{},guardian={}", config.level, config.level)));

    let (file_writer, guard) = match &config.file {
        Some(path) => {
            let (writer, guard) = tracing_appender::non_blocking(log_file_appender(path)?);
            (Some(writer), Some(guard))
        }
        None => (None, None),
    };

    let registry = tracing_subscriber::registry().with(filter);
    if config.json {
        registry
            .with(fmt::layer().json().with_target(true))
            .with(file_writer.map(|w| fmt::layer().json().with_ansi(false).with_writer(w)))
            .try_init()?;
    } else {
        registry
            .with(fmt::layer().with_target(true))
            .with(file_writer.map(|w| fmt::layer().with_ansi(false).with_writer(w)))
            .try_init()?;
    }

    if let Some(path) = &config.file {
        info!("Guardian log also written to {}", path.display());
    }
    Ok(guard)
}

/// Single append-only log file, never rotated
fn log_file_appender(path: &Path) -> Result<tracing_appender::rolling::RollingFileAppender> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let file_name = path
        .file_name()
        .with_context(|| format!("logging.file has no file name: {}", path.display()))?;

    std::fs::create_dir_all(dir)
        .with_context(|| format!("cannot create log directory {}", dir.display()))?;
    Ok(tracing_appender::rolling::never(dir, file_name))
}

fn init_logging_simple() {
    // Minimal logging for one-shot commands
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::WARN)
        .try_init();
}
