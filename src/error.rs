//! Error types for portscan-exporter.
//!
//! Probe failures are never errors; they are classified into [`crate::types::PortState`].

use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("parallel must be at least 1")]
    ZeroParallel,

    #[error("threads must be at least 1")]
    ZeroThreads,

    #[error("parallel {value} exceeds the maximum of {max}")]
    TooManyParallel { value: usize, max: usize },

    #[error("threads {value} exceeds the maximum of {max}")]
    TooManyThreads { value: usize, max: usize },

    #[error("timeout must be greater than zero")]
    ZeroTimeout,
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum PortSpecError {
    #[error("line {line}: invalid port value: {value}")]
    InvalidPort { line: usize, value: String },

    #[error("line {line}: port out of range: {value}")]
    OutOfRange { line: usize, value: u32 },

    #[error("line {line}: invalid range {start}-{end} (start > end)")]
    ReversedRange { line: usize, start: u16, end: u16 },

    #[error("line {line}: unsupported protocol: {protocol}")]
    UnsupportedProtocol { line: usize, protocol: String },
}

#[derive(Error, Debug)]
pub enum TargetError {
    #[error("invalid target address: {0}")]
    InvalidAddress(String),

    #[error("invalid target network {network}: {reason}")]
    InvalidNetwork { network: String, reason: String },

    #[error("failed to read targets file {path}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("failed to read cache file {path}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write cache file {path}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cache file {path} is not valid")]
    Decode {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to encode cache snapshot")]
    Encode(#[source] serde_json::Error),
}
