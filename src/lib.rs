//! Library crate for portscan-exporter: a bounded TCP connect scanning engine
//! with lifecycle callbacks and a persisted result cache.
pub mod cache;
pub mod config;
pub mod error;
pub mod listener;
pub mod logging;
pub mod metrics;
pub mod orchestrator;
pub mod ports;
pub mod scanner;
pub mod server;
pub mod services;
pub mod targets;
pub mod types;

pub use cache::ResultCache;
pub use config::ScanConfig;
pub use listener::{Dispatcher, ScanListener};
pub use orchestrator::Portscanner;
pub use scanner::{HostScanner, Prober, TcpConnectProber};
