use std::io;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use ::time::OffsetDateTime;
use tokio::net::TcpStream;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::{self, Instant};
use tracing::{debug, trace, warn};

use crate::cache::ResultCache;
use crate::config::ScanConfig;
use crate::listener::ScanListener;
use crate::services;
use crate::types::{HostScanRecord, HostStatus, PortProbeResult, PortSpec, PortState};

/// Performs a single outbound connection attempt.
///
/// The scanner bounds every call with the configured timeout and classifies
/// the outcome, so implementations only report what the connect did.
#[async_trait]
pub trait Prober: Send + Sync {
    async fn connect(&self, addr: SocketAddr) -> io::Result<()>;
}

/// Plain TCP connect probing. The connection is dropped as soon as it is established.
#[derive(Debug, Clone, Copy, Default)]
pub struct TcpConnectProber;

#[async_trait]
impl Prober for TcpConnectProber {
    async fn connect(&self, addr: SocketAddr) -> io::Result<()> {
        TcpStream::connect(addr).await.map(drop)
    }
}

/// Probe one port once, bounded by `timeout`.
///
/// - connect succeeded: [`PortState::Open`]
/// - connection refused: [`PortState::Closed`]
/// - timeout or any other error: [`PortState::Filtered`]
pub async fn probe_port(
    prober: &dyn Prober,
    ip: IpAddr,
    spec: PortSpec,
    timeout: Duration,
) -> PortProbeResult {
    let addr = SocketAddr::new(ip, spec.port);
    let state = match time::timeout(timeout, prober.connect(addr)).await {
        Ok(Ok(())) => PortState::Open,
        Ok(Err(e)) if e.kind() == io::ErrorKind::ConnectionRefused => PortState::Closed,
        Ok(Err(e)) => {
            trace!(%addr, error = %e, "probe failed");
            PortState::Filtered
        }
        Err(_elapsed) => PortState::Filtered,
    };

    PortProbeResult {
        protocol: spec.protocol,
        port: spec.port,
        state,
        description: services::description_for(spec.protocol, spec.port),
    }
}

/// Scans every configured port of a single address.
#[derive(Clone)]
pub struct HostScanner {
    config: Arc<ScanConfig>,
    prober: Arc<dyn Prober>,
}

impl HostScanner {
    pub fn new(config: Arc<ScanConfig>, prober: Arc<dyn Prober>) -> Self {
        Self { config, prober }
    }

    /// Probe the whole port set of `ip`, at most `threads` probes at a time.
    ///
    /// Returns exactly one result per configured port, in port-set order.
    pub async fn probe_all(&self, ip: &str) -> Vec<PortProbeResult> {
        let ports = self.config.ports();
        let mut results: Vec<PortProbeResult> = ports
            .iter()
            .map(|spec| PortProbeResult {
                protocol: spec.protocol,
                port: spec.port,
                state: PortState::Filtered,
                description: services::description_for(spec.protocol, spec.port),
            })
            .collect();

        let addr: IpAddr = match ip.parse() {
            Ok(addr) => addr,
            Err(_) => {
                warn!(ip, "target is not an IP address, reporting all ports filtered");
                return results;
            }
        };

        let sem = Arc::new(Semaphore::new(self.config.threads()));
        let timeout = self.config.timeout();
        let mut set = JoinSet::new();

        for (idx, &spec) in ports.iter().enumerate() {
            let Ok(permit) = sem.clone().acquire_owned().await else {
                break;
            };
            let prober = self.prober.clone();

            set.spawn(async move {
                let _permit = permit; // keep permit until the probe completes
                (idx, probe_port(prober.as_ref(), addr, spec, timeout).await)
            });
        }

        while let Some(res) = set.join_next().await {
            match res {
                Ok((idx, result)) => results[idx] = result,
                Err(e) => warn!(ip, error = %e, "probe task failed, port left filtered"),
            }
        }

        results
    }

    /// Run the complete host scan: fire start, probe, publish, fire finish.
    pub async fn run(
        &self,
        ip: &str,
        cache: &ResultCache,
        listener: &dyn ScanListener,
    ) -> HostScanRecord {
        listener.on_host_scan_start(ip);

        let mut record = HostScanRecord::scanning();
        let start = Instant::now();
        let results = self.probe_all(ip).await;
        let elapsed = start.elapsed();

        record.status = HostStatus::Finished;
        record.elapsed = elapsed;
        record.updated = OffsetDateTime::now_utc();
        record.open_ports = results
            .into_iter()
            .filter(|r| r.state == PortState::Open)
            .collect();

        debug!(
            ip,
            open = record.open_ports.len(),
            elapsed = elapsed.as_secs_f64(),
            "host scan finished"
        );

        cache.publish(ip, record.clone(), listener);
        listener.on_host_scan_finish(ip, elapsed.as_secs_f64());
        record
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Protocol;

    struct Fixed(io::ErrorKind);

    #[async_trait]
    impl Prober for Fixed {
        async fn connect(&self, _addr: SocketAddr) -> io::Result<()> {
            Err(io::Error::from(self.0))
        }
    }

    struct Hanging;

    #[async_trait]
    impl Prober for Hanging {
        async fn connect(&self, _addr: SocketAddr) -> io::Result<()> {
            time::sleep(Duration::from_secs(30)).await;
            Ok(())
        }
    }

    const LOCALHOST: IpAddr = IpAddr::V4(std::net::Ipv4Addr::LOCALHOST);

    #[tokio::test]
    async fn refused_is_closed_other_errors_filtered() {
        let timeout = Duration::from_millis(200);
        let refused = probe_port(
            &Fixed(io::ErrorKind::ConnectionRefused),
            LOCALHOST,
            PortSpec::tcp(22),
            timeout,
        )
        .await;
        assert_eq!(refused.state, PortState::Closed);
        assert_eq!(refused.description, "ssh");
        assert_eq!(refused.protocol, Protocol::Tcp);

        let unreachable = probe_port(
            &Fixed(io::ErrorKind::AddrNotAvailable),
            LOCALHOST,
            PortSpec::tcp(22),
            timeout,
        )
        .await;
        assert_eq!(unreachable.state, PortState::Filtered);
    }

    #[tokio::test]
    async fn slow_connect_is_filtered_not_open() {
        let result = probe_port(
            &Hanging,
            LOCALHOST,
            PortSpec::tcp(443),
            Duration::from_millis(50),
        )
        .await;
        assert_eq!(result.state, PortState::Filtered);
    }

    #[tokio::test]
    async fn run_publishes_a_finished_record() {
        let config = ScanConfig::builder()
            .ports(vec![PortSpec::tcp(22), PortSpec::tcp(80)])
            .build()
            .unwrap();
        let scanner = HostScanner::new(
            Arc::new(config),
            Arc::new(Fixed(io::ErrorKind::ConnectionRefused)),
        );
        let cache = ResultCache::new();
        let before = OffsetDateTime::now_utc();

        struct Quiet;
        impl ScanListener for Quiet {}
        let record = scanner.run("127.0.0.1", &cache, &Quiet).await;

        assert_eq!(record.status, HostStatus::Finished);
        assert!(record.updated >= before);
        assert!(record.open_ports.is_empty());
        assert_eq!(cache.get("127.0.0.1"), Some(record));
    }

    #[tokio::test]
    async fn unparsable_target_reports_every_port_filtered() {
        let config = ScanConfig::builder()
            .ports(vec![PortSpec::tcp(80), PortSpec::tcp(443)])
            .build()
            .unwrap();
        let scanner = HostScanner::new(Arc::new(config), Arc::new(TcpConnectProber));
        let results = scanner.probe_all("not-an-ip").await;
        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|r| r.state == PortState::Filtered));
    }
}
