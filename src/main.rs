use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info, warn};

use portscan_exporter::logging::{self, LogFormat};
use portscan_exporter::metrics::GaugeListener;
use portscan_exporter::{ports, server, targets};
use portscan_exporter::{Dispatcher, Portscanner, ScanConfig};

/// portscan-exporter — periodic TCP connect scan of public IP addresses, exported as gauges.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "portscan-exporter",
    version,
    about = "Periodic TCP connect scan of public IP addresses, exported as gauges.",
    long_about = None
)]
struct Cli {
    /// Comma-separated IPs/CIDRs, or @path to a file with one entry per line (re-read every cycle).
    #[arg(long)]
    targets: String,

    /// Port set, e.g. `1-1024,8080` or `common`, or @path to a ports file.
    #[arg(long, default_value = "1-65535")]
    ports: String,

    /// Number of hosts scanned in parallel.
    #[arg(long, default_value_t = 2)]
    parallel: usize,

    /// Number of concurrent probes per host.
    #[arg(long, default_value_t = 1000)]
    threads: usize,

    /// Connect timeout per probe in milliseconds.
    #[arg(long = "timeout-ms", default_value_t = 5000)]
    timeout_ms: u64,

    /// Cache file used to persist results across restarts.
    #[arg(long = "cache-path")]
    cache_path: Option<PathBuf>,

    /// Seconds between the end of one cycle and the start of the next.
    #[arg(long = "interval-secs", default_value_t = 3 * 60 * 60)]
    interval_secs: u64,

    /// Run a single cycle and exit.
    #[arg(long, default_value_t = false)]
    once: bool,

    /// Serve `/metrics` and `/api/status` on this address, e.g. 0.0.0.0:8080.
    #[arg(long)]
    bind: Option<String>,

    /// Default log filter when RUST_LOG is unset.
    #[arg(long = "log-level", default_value = "info")]
    log_level: String,

    #[arg(long = "log-format", value_enum, default_value_t = LogFormat::Compact)]
    log_format: LogFormat,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init_logging(&cli.log_level, cli.log_format)?;

    let port_set = match cli.ports.strip_prefix('@') {
        Some(path) => ports::load_port_set_from_path(path)?,
        None => ports::parse_port_set(&cli.ports).context("invalid --ports")?,
    };
    let config = ScanConfig::builder()
        .parallel(cli.parallel)
        .threads(cli.threads)
        .timeout(Duration::from_millis(cli.timeout_ms))
        .ports(port_set)
        .build()
        .context("invalid scan configuration")?;

    let mut gauges = GaugeListener::new();
    if let Some(path) = &cli.cache_path {
        gauges = gauges.with_cache_path(path);
    }
    let gauges = Arc::new(gauges);
    let mut scanner = Portscanner::new(config, Dispatcher::new().with_listener(gauges.clone()));

    if let Some(path) = cli.cache_path.as_deref().filter(|p| p.exists()) {
        info!(path = %path.display(), "load from cache");
        match scanner.load_cache(path) {
            Ok(hosts) => {
                info!(hosts, "restored previous portscan results");
                scanner.replay_cache();
            }
            Err(e) => warn!(error = %e, "starting with empty portscan cache"),
        }
    }

    if let Some(bind) = cli.bind.clone() {
        let gauges = gauges.clone();
        tokio::spawn(async move {
            if let Err(e) = server::spawn_server(&bind, gauges).await {
                error!(error = %format!("{e:#}"), "metrics endpoint failed");
            }
        });
    }

    let interval = Duration::from_secs(cli.interval_secs);
    loop {
        // A failing target source keeps the previous list.
        match read_targets(&cli.targets) {
            Ok(list) => scanner.set_targets(list),
            Err(e) => error!(error = %format!("{e:#}"), "failed to collect targets"),
        }

        let mut cycle = scanner.start();
        tokio::select! {
            res = &mut cycle => {
                if let Err(e) = res {
                    error!(error = %e, "portscan cycle aborted");
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("interrupted, stopping");
                return Ok(());
            }
        }

        if cli.once {
            break;
        }

        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            _ = tokio::signal::ctrl_c() => {
                info!("interrupted, stopping");
                break;
            }
        }
    }

    Ok(())
}

fn read_targets(source: &str) -> Result<Vec<String>> {
    let list = match source.strip_prefix('@') {
        Some(path) => targets::load_targets_from_path(path)?,
        None => targets::parse_targets(source)?,
    };
    Ok(list)
}
