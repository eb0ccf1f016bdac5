//! Scan configuration.

use std::time::Duration;

use tokio::sync::Semaphore;

use crate::error::ConfigError;
use crate::ports::default_port_set;
use crate::types::PortSpec;

pub const DEFAULT_PARALLEL: usize = 2;
pub const DEFAULT_THREADS: usize = 1000;
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);
/// Largest `parallel` or `threads` value; both become semaphore permits.
pub const MAX_CONCURRENCY: usize = Semaphore::MAX_PERMITS;

/// Parameters of one scan cycle. Immutable once handed to the scanner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanConfig {
    /// Maximum number of hosts scanned at the same time.
    parallel: usize,
    /// Maximum number of concurrent probes within one host scan.
    threads: usize,
    /// Upper bound of a single connect attempt.
    timeout: Duration,
    ports: Vec<PortSpec>,
}

impl ScanConfig {
    pub fn builder() -> ScanConfigBuilder {
        ScanConfigBuilder::default()
    }

    pub fn parallel(&self) -> usize {
        self.parallel
    }

    pub fn threads(&self) -> usize {
        self.threads
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn ports(&self) -> &[PortSpec] {
        &self.ports
    }

    /// Compact port set rendering for log lines, e.g. `tcp/1-1024,tcp/8080`.
    pub fn port_ranges(&self) -> String {
        let mut parts: Vec<String> = Vec::new();
        let mut iter = self.ports.iter().peekable();
        while let Some(first) = iter.next() {
            let mut last = *first;
            while let Some(next) = iter.peek() {
                if next.protocol == last.protocol && Some(next.port) == last.port.checked_add(1) {
                    last = **next;
                    iter.next();
                } else {
                    break;
                }
            }
            if last.port == first.port {
                parts.push(first.to_string());
            } else {
                parts.push(format!("{}-{}", first, last.port));
            }
        }
        parts.join(",")
    }
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            parallel: DEFAULT_PARALLEL,
            threads: DEFAULT_THREADS,
            timeout: DEFAULT_TIMEOUT,
            ports: default_port_set(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ScanConfigBuilder {
    parallel: Option<usize>,
    threads: Option<usize>,
    timeout: Option<Duration>,
    ports: Option<Vec<PortSpec>>,
}

impl ScanConfigBuilder {
    pub fn parallel(mut self, parallel: usize) -> Self {
        self.parallel = Some(parallel);
        self
    }

    pub fn threads(mut self, threads: usize) -> Self {
        self.threads = Some(threads);
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn ports(mut self, ports: Vec<PortSpec>) -> Self {
        self.ports = Some(ports);
        self
    }

    pub fn build(self) -> Result<ScanConfig, ConfigError> {
        let parallel = self.parallel.unwrap_or(DEFAULT_PARALLEL);
        let threads = self.threads.unwrap_or(DEFAULT_THREADS);
        let timeout = self.timeout.unwrap_or(DEFAULT_TIMEOUT);
        if parallel == 0 {
            return Err(ConfigError::ZeroParallel);
        }
        if threads == 0 {
            return Err(ConfigError::ZeroThreads);
        }
        if parallel > MAX_CONCURRENCY {
            return Err(ConfigError::TooManyParallel {
                value: parallel,
                max: MAX_CONCURRENCY,
            });
        }
        if threads > MAX_CONCURRENCY {
            return Err(ConfigError::TooManyThreads {
                value: threads,
                max: MAX_CONCURRENCY,
            });
        }
        if timeout.is_zero() {
            return Err(ConfigError::ZeroTimeout);
        }

        let mut ports = self.ports.unwrap_or_else(default_port_set);
        let mut seen = std::collections::HashSet::new();
        ports.retain(|p| p.port != 0 && seen.insert(*p));

        Ok(ScanConfig {
            parallel,
            threads,
            timeout,
            ports,
        })
    }
}
