//! Scan lifecycle events.
//!
//! A [`ScanListener`] receives six events. Every method has a no-op default so a
//! listener only implements what it consumes. Host and result events are fired
//! from concurrently running host scans; implementations synchronize internally.

use std::fmt;
use std::sync::Arc;

use crate::cache::ResultCache;
use crate::config::ScanConfig;
use crate::types::ResultLabels;

pub trait ScanListener: Send + Sync {
    /// A cycle is starting for `target_count` addresses.
    fn on_startup_scan(&self, _target_count: usize, _config: &ScanConfig) {}

    fn on_host_scan_start(&self, _ip: &str) {}

    /// All probes of `ip` completed and its results were published.
    fn on_host_scan_finish(&self, _ip: &str, _elapsed_secs: f64) {}

    /// Every host scan of the cycle finished. The cache holds the cycle's results.
    fn on_scan_finish(&self, _cache: &ResultCache) {}

    /// Previously exported results are stale; fired once before the first entry of a cycle.
    fn on_result_cleanup(&self) {}

    fn on_result_entry(&self, _labels: &ResultLabels, _value: f64) {}
}

/// Fans each event out to every registered listener, in registration order.
#[derive(Clone, Default)]
pub struct Dispatcher {
    listeners: Vec<Arc<dyn ScanListener>>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_listener(mut self, listener: Arc<dyn ScanListener>) -> Self {
        self.listeners.push(listener);
        self
    }

    pub fn add_listener(&mut self, listener: Arc<dyn ScanListener>) {
        self.listeners.push(listener);
    }

    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

impl ScanListener for Dispatcher {
    fn on_startup_scan(&self, target_count: usize, config: &ScanConfig) {
        for l in &self.listeners {
            l.on_startup_scan(target_count, config);
        }
    }

    fn on_host_scan_start(&self, ip: &str) {
        for l in &self.listeners {
            l.on_host_scan_start(ip);
        }
    }

    fn on_host_scan_finish(&self, ip: &str, elapsed_secs: f64) {
        for l in &self.listeners {
            l.on_host_scan_finish(ip, elapsed_secs);
        }
    }

    fn on_scan_finish(&self, cache: &ResultCache) {
        for l in &self.listeners {
            l.on_scan_finish(cache);
        }
    }

    fn on_result_cleanup(&self) {
        for l in &self.listeners {
            l.on_result_cleanup();
        }
    }

    fn on_result_entry(&self, labels: &ResultLabels, value: f64) {
        for l in &self.listeners {
            l.on_result_entry(labels, value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct Counting {
        starts: AtomicUsize,
        cleanups: AtomicUsize,
    }

    impl ScanListener for Counting {
        fn on_host_scan_start(&self, _ip: &str) {
            self.starts.fetch_add(1, Ordering::SeqCst);
        }

        fn on_result_cleanup(&self) {
            self.cleanups.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct Silent;
    impl ScanListener for Silent {}

    #[test]
    fn events_reach_every_listener() {
        let a = Arc::new(Counting::default());
        let b = Arc::new(Counting::default());
        let dispatcher = Dispatcher::new()
            .with_listener(a.clone())
            .with_listener(Arc::new(Silent))
            .with_listener(b.clone());
        assert_eq!(dispatcher.len(), 3);

        dispatcher.on_host_scan_start("10.0.0.1");
        dispatcher.on_result_cleanup();
        dispatcher.on_host_scan_finish("10.0.0.1", 0.5);

        for l in [&a, &b] {
            assert_eq!(l.starts.load(Ordering::SeqCst), 1);
            assert_eq!(l.cleanups.load(Ordering::SeqCst), 1);
        }
    }

    #[test]
    fn empty_dispatcher_is_noop() {
        let dispatcher = Dispatcher::new();
        assert!(dispatcher.is_empty());
        dispatcher.on_result_cleanup();
        dispatcher.on_scan_finish(&ResultCache::new());
    }
}
