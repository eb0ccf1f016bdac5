//! Gauge-style consumer of scan events.
//!
//! Maintains the two exported families:
//! - `portscan_status{ipAddress, type}` with `type` one of `finished`, `elapsed`, `updated`
//! - `portscan_port{ipAddress, protocol, port, description}`, 1 per open port

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};

use serde::Serialize;
use time::OffsetDateTime;
use tokio::runtime::{Handle, RuntimeFlavor};
use tokio::task;
use tracing::{error, info};

use crate::cache::ResultCache;
use crate::config::ScanConfig;
use crate::error::CacheError;
use crate::listener::ScanListener;
use crate::types::ResultLabels;

pub const STATUS_METRIC: &str = "portscan_status";
pub const PORT_METRIC: &str = "portscan_port";

type StatusKey = (String, &'static str);

#[derive(Debug, Default)]
pub struct GaugeListener {
    status: Mutex<BTreeMap<StatusKey, f64>>,
    ports: Mutex<BTreeMap<ResultLabels, f64>>,
    cache_path: Option<PathBuf>,
    targets: AtomicUsize,
    running: AtomicBool,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct ExporterStatus {
    pub state: String, // "idle" | "running"
    pub targets: usize,
    pub finished_hosts: usize,
    pub open_ports: usize,
}

fn guard<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

impl GaugeListener {
    pub fn new() -> Self {
        Self::default()
    }

    /// Persist the result cache to `path` whenever a cycle finishes.
    pub fn with_cache_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.cache_path = Some(path.into());
        self
    }

    pub fn status_value(&self, ip: &str, kind: &'static str) -> Option<f64> {
        guard(&self.status).get(&(ip.to_string(), kind)).copied()
    }

    pub fn port_series(&self) -> Vec<ResultLabels> {
        guard(&self.ports).keys().cloned().collect()
    }

    pub fn status(&self) -> ExporterStatus {
        let finished_hosts = guard(&self.status)
            .iter()
            .filter(|((_, kind), v)| *kind == "finished" && **v == 1.0)
            .count();
        ExporterStatus {
            state: if self.running.load(Ordering::Relaxed) {
                "running".into()
            } else {
                "idle".into()
            },
            targets: self.targets.load(Ordering::Relaxed),
            finished_hosts,
            open_ports: guard(&self.ports).len(),
        }
    }

    /// Render both families in the Prometheus text exposition format.
    pub fn render(&self) -> String {
        let mut out = String::new();

        let _ = writeln!(out, "# HELP {STATUS_METRIC} Public IP portscan status");
        let _ = writeln!(out, "# TYPE {STATUS_METRIC} gauge");
        for ((ip, kind), value) in guard(&self.status).iter() {
            let _ = writeln!(
                out,
                "{STATUS_METRIC}{{ipAddress=\"{}\",type=\"{}\"}} {}",
                escape_label(ip),
                kind,
                value
            );
        }

        let _ = writeln!(out, "# HELP {PORT_METRIC} Public IP open port");
        let _ = writeln!(out, "# TYPE {PORT_METRIC} gauge");
        for (labels, value) in guard(&self.ports).iter() {
            let rendered: Vec<String> = labels
                .pairs()
                .iter()
                .map(|(k, v)| format!("{k}=\"{}\"", escape_label(v)))
                .collect();
            let _ = writeln!(out, "{PORT_METRIC}{{{}}} {}", rendered.join(","), value);
        }

        out
    }
}

/// `on_scan_finish` runs on the cycle task. On a multi-thread runtime the
/// blocking save is moved off the async worker; elsewhere it runs inline.
fn save_off_worker(cache: &ResultCache, path: &Path) -> Result<(), CacheError> {
    match Handle::try_current() {
        Ok(handle) if handle.runtime_flavor() == RuntimeFlavor::MultiThread => {
            task::block_in_place(|| cache.save(path))
        }
        _ => cache.save(path),
    }
}

fn escape_label(v: &str) -> String {
    v.replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('\n', "\\n")
}

impl ScanListener for GaugeListener {
    fn on_startup_scan(&self, target_count: usize, config: &ScanConfig) {
        info!(
            "starting for {} IPs (parallel:{}, threads per run:{}, timeout:{}s, portranges:{})",
            target_count,
            config.parallel(),
            config.threads(),
            config.timeout().as_secs_f64(),
            config.port_ranges()
        );
        self.targets.store(target_count, Ordering::Relaxed);
        self.running.store(true, Ordering::Relaxed);
        guard(&self.status).clear();
    }

    fn on_host_scan_start(&self, ip: &str) {
        info!(ip, "start port scanning");
        guard(&self.status).insert((ip.to_string(), "finished"), 0.0);
    }

    fn on_host_scan_finish(&self, ip: &str, elapsed_secs: f64) {
        let now = OffsetDateTime::now_utc().unix_timestamp() as f64;
        let mut status = guard(&self.status);
        status.insert((ip.to_string(), "finished"), 1.0);
        status.insert((ip.to_string(), "elapsed"), elapsed_secs);
        status.insert((ip.to_string(), "updated"), now);
    }

    fn on_scan_finish(&self, cache: &ResultCache) {
        info!("finished for {} IPs", self.targets.load(Ordering::Relaxed));
        self.running.store(false, Ordering::Relaxed);

        if let Some(path) = &self.cache_path {
            match save_off_worker(cache, path) {
                Ok(()) => info!(path = %path.display(), "saved to cache"),
                Err(e) => error!(error = %e, "failed to save portscan cache"),
            }
        }
    }

    fn on_result_cleanup(&self) {
        guard(&self.ports).clear();
    }

    fn on_result_entry(&self, labels: &ResultLabels, value: f64) {
        guard(&self.ports).insert(labels.clone(), value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels(ip: &str, port: &str, description: &str) -> ResultLabels {
        ResultLabels {
            ip_address: ip.into(),
            protocol: "tcp".into(),
            port: port.into(),
            description: description.into(),
        }
    }

    #[test]
    fn host_lifecycle_updates_status_family() {
        let gauges = GaugeListener::new();
        gauges.on_startup_scan(1, &ScanConfig::default());
        gauges.on_host_scan_start("10.0.0.1");
        assert_eq!(gauges.status_value("10.0.0.1", "finished"), Some(0.0));

        gauges.on_host_scan_finish("10.0.0.1", 2.5);
        assert_eq!(gauges.status_value("10.0.0.1", "finished"), Some(1.0));
        assert_eq!(gauges.status_value("10.0.0.1", "elapsed"), Some(2.5));
        assert!(gauges.status_value("10.0.0.1", "updated").unwrap() > 0.0);

        gauges.on_startup_scan(0, &ScanConfig::default());
        assert_eq!(gauges.status_value("10.0.0.1", "finished"), None);
    }

    #[test]
    fn cleanup_resets_port_family() {
        let gauges = GaugeListener::new();
        gauges.on_result_entry(&labels("10.0.0.1", "80", "http"), 1.0);
        gauges.on_result_entry(&labels("10.0.0.1", "22", "ssh"), 1.0);
        assert_eq!(gauges.port_series().len(), 2);

        gauges.on_result_cleanup();
        assert!(gauges.port_series().is_empty());
    }

    #[test]
    fn render_uses_exposition_format() {
        let gauges = GaugeListener::new();
        gauges.on_host_scan_finish("10.0.0.1", 1.5);
        gauges.on_result_entry(&labels("10.0.0.1", "80", "http"), 1.0);

        let text = gauges.render();
        assert!(text.contains("# TYPE portscan_status gauge"));
        assert!(text.contains("portscan_status{ipAddress=\"10.0.0.1\",type=\"elapsed\"} 1.5"));
        assert!(text.contains(
            "portscan_port{ipAddress=\"10.0.0.1\",protocol=\"tcp\",port=\"80\",description=\"http\"} 1"
        ));
    }

    fn finished_cache() -> ResultCache {
        let cache = ResultCache::new();
        let mut record = crate::types::HostScanRecord::scanning();
        record.status = crate::types::HostStatus::Finished;
        cache.publish("10.0.0.1", record, &GaugeListener::new());
        cache
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn scan_finish_saves_from_a_runtime_worker() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("portscan.json");
        let gauges = std::sync::Arc::new(GaugeListener::new().with_cache_path(&path));
        let cache = std::sync::Arc::new(finished_cache());

        let (g, c) = (gauges.clone(), cache.clone());
        tokio::spawn(async move { g.on_scan_finish(&c) })
            .await
            .unwrap();

        let restored = ResultCache::new();
        assert_eq!(restored.try_load(&path).unwrap(), 1);
        assert_eq!(gauges.status().state, "idle");
    }

    #[tokio::test]
    async fn scan_finish_saves_on_a_current_thread_runtime() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("portscan.json");
        GaugeListener::new()
            .with_cache_path(&path)
            .on_scan_finish(&finished_cache());
        assert!(path.exists());
    }

    #[test]
    fn label_values_are_escaped() {
        assert_eq!(escape_label("a\"b\\c\nd"), "a\\\"b\\\\c\\nd");
    }
}
