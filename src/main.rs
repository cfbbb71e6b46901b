use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_appender::rolling::{InitError, RollingFileAppender, Rotation};
use peerscout::config::{self, Config};
use peerscout::error::{AppError, SearchError};
use peerscout::network::{IpInfoResolver, PolkachuDirectory, TcpProber};
use peerscout::output::{self, OutputFormat};
use peerscout::PeerScout;

#[derive(Parser, Debug)]
#[command(name = "peerscout")]
#[command(about = "Scout for peers based on latency and location", long_about = None)]
#[command(version = concat!(
    env!("CARGO_PKG_VERSION"),
    " (",
    env!("GIT_HASH"),
    ", built ",
    env!("BUILD_DATE"),
    ")"
))]
struct Args {
    /// The network to scout peers for (e.g. "dydx", "osmosis")
    #[arg(long, required_unless_present = "generate_config")]
    network: Option<String>,

    /// Comma-separated list of target countries (e.g. "CA,US" or "DE")
    #[arg(long, alias = "target_country")]
    target_country: Option<String>,

    /// The desired number of peers to find
    #[arg(long, alias = "desired_count")]
    desired_count: Option<usize>,

    /// The maximum latency in milliseconds
    #[arg(long, alias = "max_latency")]
    max_latency: Option<u64>,

    /// The maximum number of attempts to find peers
    #[arg(long, alias = "max_attempts")]
    max_attempts: Option<u32>,

    /// Pause between attempts in milliseconds
    #[arg(long)]
    attempt_delay: Option<u64>,

    #[arg(long, value_enum, default_value_t = OutputFormat::List)]
    output: OutputFormat,

    /// Config file (default: the user config directory)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Write a default config file and exit
    #[arg(long)]
    generate_config: bool,

    /// Enable debug logging
    #[arg(long)]
    debug: bool,
}

impl Args {
    fn apply_overrides(&self, config: &mut Config) {
        if let Some(countries) = &self.target_country {
            config.search.target_countries = countries.clone();
        }
        if let Some(count) = self.desired_count {
            config.search.desired_count = count;
        }
        if let Some(latency) = self.max_latency {
            config.search.max_latency_ms = latency;
        }
        if let Some(attempts) = self.max_attempts {
            config.search.max_attempts = attempts;
        }
        if let Some(delay) = self.attempt_delay {
            config.search.attempt_delay_ms = delay;
        }
    }
}

/// Exit status when the network name is rejected by the directory
const EXIT_INVALID_NETWORK: u8 = 2;

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    if args.generate_config {
        let path = args.config.clone().unwrap_or_else(config::default_config_path);
        return match Config::default().save_to_file(&path) {
            Ok(()) => {
                println!("✅ Generated default config at: {}", path.display());
                ExitCode::SUCCESS
            }
            Err(e) => {
                eprintln!("❌ Failed to generate config: {}", e);
                ExitCode::FAILURE
            }
        };
    }

    let mut config = match Config::load_or_default(args.config.as_deref()) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("❌ Failed to load config: {}", e);
            return ExitCode::FAILURE;
        }
    };
    args.apply_overrides(&mut config);

    if let Err(e) = config.validate() {
        eprintln!("❌ {}", e);
        return ExitCode::FAILURE;
    }

    let _log_guard = match setup_logging(&config.logging, args.debug) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("❌ Failed to initialize logging: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let Some(network) = args.network.as_deref() else {
        return ExitCode::FAILURE;
    };

    tokio::select! {
        code = run(network, args.output, &config) => code,
        _ = tokio::signal::ctrl_c() => {
            tracing::warn!("🛑 Interrupted, search aborted");
            ExitCode::from(130)
        }
    }
}

async fn run(network: &str, format: OutputFormat, config: &Config) -> ExitCode {
    match scout(network, format, config).await {
        Ok(code) => code,
        Err(AppError::Search(e @ SearchError::InvalidNetwork { .. })) => {
            tracing::error!("{}", e);
            ExitCode::from(EXIT_INVALID_NETWORK)
        }
        Err(e) => {
            tracing::error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

async fn scout(network: &str, format: OutputFormat, config: &Config) -> Result<ExitCode, AppError> {
    let criteria = config.criteria()?;

    let directory = PolkachuDirectory::new(&config.directory.base_url, config.directory_timeout())?;
    let geo = IpInfoResolver::new(
        &config.geolocation.base_url,
        config.geolocation.resolved_access_token(),
        config.geolocation_timeout(),
    )?;
    if !geo.has_access_token() {
        tracing::warn!(
            "No ipinfo access token configured; lookups use the anonymous rate limit. Set {} to raise it.",
            peerscout::network::geolocation::ACCESS_TOKEN_ENV
        );
    }

    let scout = PeerScout::new(
        Arc::new(directory),
        Arc::new(geo),
        Arc::new(TcpProber),
        config.scout_settings(),
    );

    let result = scout.search(network, &criteria).await?;

    if result.is_empty() {
        tracing::error!("No qualified peers found based on the given criteria.");
        return Ok(ExitCode::FAILURE);
    }

    if format == OutputFormat::List {
        if result.target_reached() {
            tracing::info!("Found {} peers that meet the criteria:", result.peers.len());
        } else {
            tracing::warn!(
                "Only {} out of {} peers were found.",
                result.peers.len(),
                criteria.desired_count()
            );
        }
    }

    println!("{}", output::render(&result, format)?);
    Ok(ExitCode::SUCCESS)
}

fn setup_logging(
    config: &config::LoggingConfig,
    debug: bool,
) -> Result<WorkerGuard, InitError> {
    use tracing_subscriber::{fmt, EnvFilter};

    let level: &str = if debug { "debug" } else { &config.level };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!("{level},reqwest=warn,hyper=warn,hyper_util=warn"))
    });

    let (writer, guard) = log_writer(config)?;

    // Detect if running under systemd/journald
    let is_systemd =
        std::env::var("JOURNAL_STREAM").is_ok() || std::env::var("INVOCATION_ID").is_ok();

    // Get hostname - shorten to first part before dot
    let hostname = hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .unwrap_or_else(|| "unknown".to_string());
    let short_hostname = hostname.split('.').next().unwrap_or(&hostname).to_string();

    match config.format.as_str() {
        "json" => {
            fmt()
                .json()
                .with_env_filter(filter)
                .with_writer(writer)
                .with_thread_ids(false)
                .init();
        }
        _ => {
            if is_systemd {
                // journald already adds timestamp and hostname
                fmt()
                    .with_env_filter(filter)
                    .with_writer(writer)
                    .with_target(false)
                    .with_thread_ids(false)
                    .with_thread_names(false)
                    .without_time()
                    .compact()
                    .init();
            } else {
                fmt()
                    .with_env_filter(filter)
                    .with_writer(writer)
                    .with_target(false)
                    .with_thread_ids(false)
                    .with_thread_names(false)
                    .with_timer(CustomTimer {
                        hostname: short_hostname,
                    })
                    .compact()
                    .init();
            }
        }
    }

    Ok(guard)
}

/// Output goes to stderr so stdout carries only the peer list
fn log_writer(config: &config::LoggingConfig) -> Result<(NonBlocking, WorkerGuard), InitError> {
    if config.output != "file" {
        return Ok(tracing_appender::non_blocking(std::io::stderr()));
    }

    let path = Path::new(&config.file_path);
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "peerscout.log".to_string());

    let appender = RollingFileAppender::builder()
        .rotation(Rotation::NEVER)
        .filename_prefix(file_name)
        .build(dir)?;
    Ok(tracing_appender::non_blocking(appender))
}

// Custom timer that shows UTC time and hostname
struct CustomTimer {
    hostname: String,
}

impl tracing_subscriber::fmt::time::FormatTime for CustomTimer {
    fn format_time(&self, w: &mut tracing_subscriber::fmt::format::Writer<'_>) -> std::fmt::Result {
        use chrono::Utc;
        let now = Utc::now();

        // Format: "YYYY-MM-DD HH:MM:SS.mmm [hostname]"
        write!(
            w,
            "{}.{:03} [{}]",
            now.format("%Y-%m-%d %H:%M:%S"),
            now.timestamp_subsec_millis(),
            self.hostname
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_writer_reports_unusable_directory() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("not-a-dir");
        std::fs::write(&blocker, b"").unwrap();

        let config = config::LoggingConfig {
            output: "file".to_string(),
            file_path: blocker.join("peerscout.log").display().to_string(),
            ..Default::default()
        };

        assert!(log_writer(&config).is_err());
    }

    #[test]
    fn test_log_writer_creates_file_directory() {
        let dir = tempfile::tempdir().unwrap();
        let log_dir = dir.path().join("logs");

        let config = config::LoggingConfig {
            output: "file".to_string(),
            file_path: log_dir.join("peerscout.log").display().to_string(),
            ..Default::default()
        };

        let (_writer, _guard) = log_writer(&config).unwrap();
        assert!(log_dir.is_dir());
    }
}
