//! Scan cycle orchestration.
//!
//! [`Portscanner`] owns the target list and configuration. Each cycle fans out
//! one host scan per target, at most `parallel` at a time, and reports through
//! the [`Dispatcher`]:
//!
//! ```text
//! on_startup_scan
//!   on_host_scan_start(ip)            per target, concurrently
//!   on_result_cleanup                 once, before the first entry
//!   on_result_entry(labels, 1.0)      per open port
//!   on_host_scan_finish(ip, elapsed)  after all probes of ip
//! on_scan_finish
//! ```

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::{JoinHandle, JoinSet};
use tracing::{info, warn, Instrument};

use crate::cache::ResultCache;
use crate::config::ScanConfig;
use crate::error::CacheError;
use crate::listener::{Dispatcher, ScanListener};
use crate::scanner::{HostScanner, Prober, TcpConnectProber};

pub struct Portscanner {
    config: Arc<ScanConfig>,
    targets: Vec<String>,
    cache: Arc<ResultCache>,
    dispatcher: Arc<Dispatcher>,
    prober: Arc<dyn Prober>,
}

impl Portscanner {
    pub fn new(config: ScanConfig, dispatcher: Dispatcher) -> Self {
        Self {
            config: Arc::new(config),
            targets: Vec::new(),
            cache: Arc::new(ResultCache::new()),
            dispatcher: Arc::new(dispatcher),
            prober: Arc::new(TcpConnectProber),
        }
    }

    /// Replace the connect implementation, e.g. with an instrumented one.
    pub fn with_prober(mut self, prober: Arc<dyn Prober>) -> Self {
        self.prober = prober;
        self
    }

    /// Replace the target list wholesale.
    ///
    /// Must not be called while a cycle is running; a running cycle keeps
    /// scanning the list it was started with.
    pub fn set_targets<I, S>(&mut self, ips: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.targets = ips.into_iter().map(Into::into).collect();
    }

    pub fn targets(&self) -> &[String] {
        &self.targets
    }

    pub fn config(&self) -> &ScanConfig {
        &self.config
    }

    pub fn cache(&self) -> &Arc<ResultCache> {
        &self.cache
    }

    /// Restore results saved by a previous process. On error the cache is left empty.
    pub fn load_cache(&self, path: impl AsRef<Path>) -> Result<usize, CacheError> {
        self.cache.try_load(path)
    }

    /// Emit the cached results to the listeners without scanning.
    pub fn replay_cache(&self) {
        self.cache.replay(&*self.dispatcher);
    }

    /// Launch one scan cycle in the background and return immediately.
    ///
    /// Completion is signaled through `on_scan_finish`; the returned handle may
    /// be awaited or dropped. Requires a tokio runtime.
    pub fn start(&self) -> JoinHandle<()> {
        let cycle = self.cycle();
        tokio::spawn(cycle.run())
    }

    /// Run one scan cycle to completion.
    pub async fn run_cycle(&self) {
        self.cycle().run().await
    }

    fn cycle(&self) -> Cycle {
        Cycle {
            targets: self.targets.clone(),
            config: self.config.clone(),
            cache: self.cache.clone(),
            dispatcher: self.dispatcher.clone(),
            scanner: HostScanner::new(self.config.clone(), self.prober.clone()),
        }
    }
}

impl fmt::Debug for Portscanner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Portscanner")
            .field("config", &self.config)
            .field("targets", &self.targets.len())
            .field("dispatcher", &self.dispatcher)
            .finish_non_exhaustive()
    }
}

struct Cycle {
    targets: Vec<String>,
    config: Arc<ScanConfig>,
    cache: Arc<ResultCache>,
    dispatcher: Arc<Dispatcher>,
    scanner: HostScanner,
}

impl Cycle {
    async fn run(self) {
        let Cycle {
            targets,
            config,
            cache,
            dispatcher,
            scanner,
        } = self;

        info!(
            targets = targets.len(),
            parallel = config.parallel(),
            threads = config.threads(),
            timeout_ms = config.timeout().as_millis() as u64,
            ports = config.ports().len(),
            "starting portscan cycle"
        );
        dispatcher.on_startup_scan(targets.len(), &config);
        cache.begin_cycle();

        let sem = Arc::new(Semaphore::new(config.parallel()));
        let mut set = JoinSet::new();

        for ip in targets {
            let Ok(permit) = sem.clone().acquire_owned().await else {
                break;
            };
            let scanner = scanner.clone();
            let cache = cache.clone();
            let dispatcher = dispatcher.clone();
            let span = tracing::debug_span!("host_scan", ip = %ip);

            set.spawn(
                async move {
                    let _permit = permit; // keep permit until the host scan completes
                    scanner.run(&ip, &cache, &*dispatcher).await;
                }
                .instrument(span),
            );
        }

        while let Some(res) = set.join_next().await {
            if let Err(e) = res {
                warn!(error = %e, "host scan task failed");
            }
        }

        info!(hosts = cache.len(), "portscan cycle finished");
        dispatcher.on_scan_finish(&cache);
    }
}
