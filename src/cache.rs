//! Latest per-host scan results, in memory and on disk.

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::CacheError;
use crate::listener::ScanListener;
use crate::types::{HostScanRecord, ResultLabels};

const CACHE_FORMAT_VERSION: u32 = 1;

#[derive(Debug, Default)]
struct CacheState {
    hosts: BTreeMap<String, HostScanRecord>,
    /// Set once the current cycle has cleared previously published results.
    cleaned: bool,
}

/// Mapping from IP address to its latest [`HostScanRecord`].
///
/// Publishing and saving take the same lock, so a snapshot never observes a
/// half-published host.
///
/// Only finished host scans are stored. A record loaded from a file that
/// lacks a `status` reads as [`HostStatus::Pending`](crate::types::HostStatus::Pending).
#[derive(Debug, Default)]
pub struct ResultCache {
    inner: Mutex<CacheState>,
}

#[derive(Serialize)]
struct CacheFileRef<'a> {
    version: u32,
    hosts: &'a BTreeMap<String, HostScanRecord>,
}

#[derive(Deserialize)]
struct CacheFile {
    #[serde(default)]
    #[allow(dead_code)]
    version: u32,
    #[serde(default)]
    hosts: BTreeMap<String, HostScanRecord>,
}

impl ResultCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, CacheState> {
        // A listener panicking mid-publish must not wedge the exporter.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Re-arm the cleanup so the next publish replaces the cache instead of merging.
    pub fn begin_cycle(&self) {
        self.state().cleaned = false;
    }

    /// Store the record of a finished host scan and emit its open ports.
    ///
    /// The first publish of a cycle fires `on_result_cleanup` and drops every
    /// previously stored host before anything else is emitted.
    pub fn publish(&self, ip: &str, record: HostScanRecord, listener: &dyn ScanListener) {
        let mut state = self.state();
        if !state.cleaned {
            listener.on_result_cleanup();
            state.hosts.clear();
            state.cleaned = true;
        }

        for result in &record.open_ports {
            listener.on_result_entry(&ResultLabels::new(ip, result), 1.0);
        }
        state.hosts.insert(ip.to_string(), record);
    }

    /// Emit the currently stored results, e.g. right after loading a snapshot.
    pub fn replay(&self, listener: &dyn ScanListener) {
        let state = self.state();
        listener.on_result_cleanup();
        for (ip, record) in &state.hosts {
            for result in &record.open_ports {
                listener.on_result_entry(&ResultLabels::new(ip, result), 1.0);
            }
        }
    }

    pub fn get(&self, ip: &str) -> Option<HostScanRecord> {
        self.state().hosts.get(ip).cloned()
    }

    pub fn snapshot(&self) -> BTreeMap<String, HostScanRecord> {
        self.state().hosts.clone()
    }

    pub fn len(&self) -> usize {
        self.state().hosts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state().hosts.is_empty()
    }

    /// Number of open ports across all stored hosts.
    pub fn open_port_count(&self) -> usize {
        self.state()
            .hosts
            .values()
            .map(|r| r.open_ports.len())
            .sum()
    }

    /// Write the whole cache to `path` atomically (temp file, fsync, rename).
    ///
    /// The snapshot is encoded under the lock; the file system work happens
    /// after it is released. This is blocking I/O.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), CacheError> {
        let path = path.as_ref();
        let (bytes, hosts) = {
            let state = self.state();
            let bytes = serde_json::to_vec_pretty(&CacheFileRef {
                version: CACHE_FORMAT_VERSION,
                hosts: &state.hosts,
            })
            .map_err(CacheError::Encode)?;
            (bytes, state.hosts.len())
        };

        write_atomic(path, &bytes).map_err(|source| CacheError::Write {
            path: path.to_path_buf(),
            source,
        })?;
        debug!(path = %path.display(), hosts, "saved portscan cache");
        Ok(())
    }

    /// Replace the cache contents with the snapshot at `path`.
    ///
    /// On any error the cache ends up empty and the error is returned for the
    /// caller to report.
    pub fn try_load(&self, path: impl AsRef<Path>) -> Result<usize, CacheError> {
        let path = path.as_ref();
        let mut state = self.state();
        state.hosts.clear();

        let bytes = fs::read(path).map_err(|source| CacheError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let file: CacheFile =
            serde_json::from_slice(&bytes).map_err(|source| CacheError::Decode {
                path: path.to_path_buf(),
                source,
            })?;

        state.hosts = file.hosts;
        Ok(state.hosts.len())
    }

    /// Like [`ResultCache::try_load`], but a missing or corrupt file just yields an empty cache.
    pub fn load(&self, path: impl AsRef<Path>) -> usize {
        match self.try_load(path) {
            Ok(n) => n,
            Err(CacheError::Read { source, .. })
                if source.kind() == std::io::ErrorKind::NotFound =>
            {
                0
            }
            Err(e) => {
                warn!(error = %e, "ignoring unusable portscan cache");
                0
            }
        }
    }
}

fn temp_path_for(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| "portscan-cache".into());
    name.push(format!(".tmp.{}", std::process::id()));
    path.with_file_name(name)
}

fn write_atomic(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }

    let tmp_path = temp_path_for(path);
    let written = (|| {
        let mut file = File::create(&tmp_path)?;
        file.write_all(bytes)?;
        file.flush()?;
        file.sync_all()
    })();
    if let Err(e) = written.and_then(|_| fs::rename(&tmp_path, path)) {
        let _ = fs::remove_file(&tmp_path);
        return Err(e);
    }

    // Best-effort fsync of the parent directory to persist the rename.
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        if let Ok(dir) = File::open(parent) {
            let _ = dir.sync_all();
        }
    }
    Ok(())
}
