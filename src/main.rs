use anyhow::{bail, Result};
use clap::{Parser, ValueEnum};
use cloudscan::config::Config;
use cloudscan::{create_driver, DiscoveryFilter, Driver, DriverInput, ListOptions};
use futures::StreamExt;
use serde_json::json;
use std::io::{self, Write};
use std::path::PathBuf;
use tracing::Level;
use tracing_subscriber::fmt::writer::MakeWriterExt;

/// Discover cloud resources and print them as NDJSON
#[derive(Parser, Debug)]
#[command(name = "cloudscan", version, about, long_about = None)]
struct Args {
    /// Config file (default: <config dir>/cloudscan/config.yaml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Only run the configured driver with this id
    #[arg(short, long)]
    driver: Option<String>,

    /// Run one driver for this provider key with ambient credentials
    #[arg(short, long)]
    provider: Option<String>,

    /// Only collect these services (repeatable)
    #[arg(long)]
    include: Vec<String>,

    /// Never collect these services (repeatable, wins over --include)
    #[arg(long)]
    exclude: Vec<String>,

    /// Log level for debugging
    #[arg(long, value_enum, default_value = "off")]
    log_level: LogLevel,

    /// Probe each driver instead of listing resources
    #[arg(long)]
    health: bool,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    fn to_tracing_level(self) -> Option<Level> {
        match self {
            LogLevel::Off => None,
            LogLevel::Error => Some(Level::ERROR),
            LogLevel::Warn => Some(Level::WARN),
            LogLevel::Info => Some(Level::INFO),
            LogLevel::Debug => Some(Level::DEBUG),
            LogLevel::Trace => Some(Level::TRACE),
        }
    }
}

fn setup_logging(level: LogLevel) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let tracing_level = level.to_tracing_level()?;

    let log_path = get_log_path();

    if let Some(parent) = log_path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }

    let file = match std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
    {
        Ok(file) => file,
        Err(e) => {
            eprintln!("Cannot open log file {}: {}", log_path.display(), e);
            return None;
        },
    };

    let (non_blocking, guard) = tracing_appender::non_blocking(file);

    tracing_subscriber::fmt()
        .with_max_level(tracing_level)
        .with_writer(non_blocking.with_max_level(tracing_level))
        .with_ansi(false)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true)
        .init();

    tracing::info!("cloudscan started with log level: {:?}", level);
    tracing::info!("Log file: {:?}", log_path);

    Some(guard)
}

fn get_log_path() -> PathBuf {
    if let Some(app_dir) = Config::app_dir() {
        return app_dir.join("cloudscan.log");
    }
    if let Some(home) = dirs::home_dir() {
        return home.join(".cloudscan").join("cloudscan.log");
    }
    PathBuf::from("cloudscan.log")
}

/// Per-driver outcome for the stderr summary
struct RunSummary {
    label: String,
    resources: usize,
    error: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let _log_guard = setup_logging(args.log_level);

    let config = Config::load(args.config.as_deref())?;
    let mut inputs = match (&args.provider, &args.driver) {
        (Some(_), None) => Vec::new(),
        _ => config.selected_drivers(args.driver.as_deref())?,
    };
    if let Some(provider) = &args.provider {
        inputs.push(DriverInput::new(provider.as_str()).with_id(provider.as_str()));
    }
    if inputs.is_empty() {
        bail!(
            "No drivers configured. Add them to {} or pass --provider",
            Config::config_path()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| "config.yaml".to_string())
        );
    }

    let filter = if args.include.is_empty() && args.exclude.is_empty() {
        config.discovery.clone()
    } else {
        DiscoveryFilter::default()
            .include(args.include.iter().cloned())
            .exclude(args.exclude.iter().cloned())
    };

    let mut summaries = Vec::new();
    for input in inputs {
        let label = input
            .id
            .clone()
            .or_else(|| input.driver.clone())
            .unwrap_or_else(|| "<unnamed>".to_string());

        let driver = match create_driver(input) {
            Ok(driver) => driver,
            Err(e) => {
                summaries.push(RunSummary {
                    label,
                    resources: 0,
                    error: Some(e.to_string()),
                });
                continue;
            },
        };

        let summary = if args.health {
            check_health(driver.as_ref(), label).await
        } else {
            run_driver(driver.as_ref(), label, filter.clone()).await
        };
        driver.destroy().await;
        summaries.push(summary);
    }

    let mut failed = 0;
    for summary in &summaries {
        match &summary.error {
            None if args.health => eprintln!("{}: ok", summary.label),
            None => eprintln!("{}: {} resources", summary.label, summary.resources),
            Some(err) => {
                failed += 1;
                eprintln!("{}: failed after {} resources: {}", summary.label, summary.resources, err);
            },
        }
    }

    if failed > 0 {
        bail!("{} of {} drivers failed", failed, summaries.len());
    }
    Ok(())
}

async fn run_driver(driver: &dyn Driver, label: String, filter: DiscoveryFilter) -> RunSummary {
    let mut summary = RunSummary {
        label,
        resources: 0,
        error: None,
    };

    if let Err(e) = driver.initialize().await {
        summary.error = Some(e.to_string());
        return summary;
    }

    let stdout = io::stdout();
    let mut resources = driver.list_resources(ListOptions::default().with_filter(filter));
    while let Some(item) = resources.next().await {
        let resource = match item {
            Ok(resource) => resource,
            Err(e) => {
                summary.error = Some(e.to_string());
                break;
            },
        };

        let line = match serde_json::to_string(&resource) {
            Ok(line) => line,
            Err(e) => {
                tracing::warn!(resource_id = %resource.resource_id, error = %e, "Unserializable resource");
                continue;
            },
        };
        if let Err(e) = writeln!(stdout.lock(), "{}", line) {
            // Closed pipe: stop pulling
            tracing::debug!(error = %e, "stdout closed");
            break;
        }
        summary.resources += 1;
    }

    summary
}

async fn check_health(driver: &dyn Driver, label: String) -> RunSummary {
    let (status, error) = match driver.health_check().await {
        Ok(status) => {
            let error = (!status.healthy)
                .then(|| status.message.clone().unwrap_or_else(|| "unhealthy".to_string()));
            (json!({ "healthy": status.healthy, "message": status.message }), error)
        },
        Err(e) => (json!({ "healthy": false, "message": e.to_string() }), Some(e.to_string())),
    };

    println!(
        "{}",
        json!({
            "driver": label,
            "provider": driver.provider(),
            "health": status,
        })
    );

    RunSummary {
        label,
        resources: 0,
        error,
    }
}
