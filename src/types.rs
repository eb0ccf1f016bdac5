use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// Transport protocol of a probed port. Only plain TCP connect probing is performed.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Tcp,
}

impl Protocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::Tcp => "tcp",
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single entry of the configured port set.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PortSpec {
    pub protocol: Protocol,
    pub port: u16,
}

impl PortSpec {
    pub fn tcp(port: u16) -> Self {
        Self {
            protocol: Protocol::Tcp,
            port,
        }
    }
}

impl fmt::Display for PortSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.protocol, self.port)
    }
}

/// Classification of one probe.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PortState {
    /// Connect succeeded.
    Open,
    /// Connect was actively refused.
    Closed,
    /// Timed out or failed for any other reason.
    Filtered,
}

impl PortState {
    pub fn as_str(&self) -> &'static str {
        match self {
            PortState::Open => "open",
            PortState::Closed => "closed",
            PortState::Filtered => "filtered",
        }
    }
}

/// Outcome of probing one (protocol, port) on one address.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct PortProbeResult {
    pub protocol: Protocol,
    pub port: u16,
    pub state: PortState,
    #[serde(default)]
    pub description: String,
}

/// Progress of a host scan.
///
/// `Scanning` marks a record still being built by its worker; the cache only
/// ever stores `Finished` records. `Pending` is what a cache file entry
/// without a status decodes to.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum HostStatus {
    #[default]
    Pending,
    Scanning,
    Finished,
}

/// Aggregate scan state of one IP address.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct HostScanRecord {
    #[serde(default)]
    pub status: HostStatus,
    #[serde(default)]
    pub elapsed: Duration,
    #[serde(with = "time::serde::rfc3339")]
    pub updated: OffsetDateTime,
    /// Open ports only, in port-set order.
    #[serde(default)]
    pub open_ports: Vec<PortProbeResult>,
}

impl HostScanRecord {
    pub fn scanning() -> Self {
        Self {
            status: HostStatus::Scanning,
            elapsed: Duration::ZERO,
            updated: OffsetDateTime::now_utc(),
            open_ports: Vec::new(),
        }
    }
}

/// Label set attached to every result entry event.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "camelCase")]
pub struct ResultLabels {
    pub ip_address: String,
    pub protocol: String,
    pub port: String,
    pub description: String,
}

impl ResultLabels {
    pub fn new(ip_address: &str, result: &PortProbeResult) -> Self {
        Self {
            ip_address: ip_address.to_string(),
            protocol: result.protocol.as_str().to_string(),
            port: result.port.to_string(),
            description: result.description.clone(),
        }
    }

    /// Label names and values in their exported order.
    pub fn pairs(&self) -> [(&'static str, &str); 4] {
        [
            ("ipAddress", self.ip_address.as_str()),
            ("protocol", self.protocol.as_str()),
            ("port", self.port.as_str()),
            ("description", self.description.as_str()),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn labels_follow_probe_result() {
        let result = PortProbeResult {
            protocol: Protocol::Tcp,
            port: 80,
            state: PortState::Open,
            description: "http".into(),
        };
        let labels = ResultLabels::new("10.0.0.1", &result);
        assert_eq!(
            labels.pairs(),
            [
                ("ipAddress", "10.0.0.1"),
                ("protocol", "tcp"),
                ("port", "80"),
                ("description", "http"),
            ]
        );
    }

    #[test]
    fn record_ignores_unknown_fields() {
        let json = r#"{
            "status": "finished",
            "elapsed": {"secs": 2, "nanos": 0},
            "updated": "2026-01-02T03:04:05Z",
            "open_ports": [{"protocol": "tcp", "port": 22, "state": "open", "banner": "x"}],
            "region": "westeurope"
        }"#;
        let record: HostScanRecord = serde_json::from_str(json).unwrap();
        assert_eq!(record.status, HostStatus::Finished);
        assert_eq!(record.elapsed, Duration::from_secs(2));
        assert_eq!(record.open_ports[0].port, 22);
        assert_eq!(record.open_ports[0].description, "");
    }
}
