use std::collections::HashSet;
use std::fs;
use std::net::{IpAddr, Ipv4Addr};
use std::path::Path;

use ipnet::{IpNet, Ipv4Net};

use crate::error::TargetError;

/// Smallest IPv4 prefix that is still expanded host by host.
const MIN_V4_PREFIX: u8 = 16;
/// Smallest IPv6 prefix that is still expanded host by host.
const MIN_V6_PREFIX: u8 = 120;

/// Parse a target list into de-duplicated IP address strings, preserving order.
///
/// Entries are separated by commas, whitespace or newlines; `#` starts a comment.
/// Each entry is a single address (`203.0.113.7`) or a network (`203.0.113.0/28`).
pub fn parse_targets(s: &str) -> Result<Vec<String>, TargetError> {
    let mut out = Vec::new();
    let mut seen = HashSet::new();

    for raw_line in s.lines() {
        let line = raw_line.split('#').next().unwrap_or("");
        for token in line
            .split(|c: char| c == ',' || c.is_whitespace())
            .filter(|t| !t.is_empty())
        {
            let ips = if token.contains('/') {
                let net: IpNet = token.parse().map_err(|e: ipnet::AddrParseError| {
                    TargetError::InvalidNetwork {
                        network: token.to_string(),
                        reason: e.to_string(),
                    }
                })?;
                let (family, min_prefix) = match net {
                    IpNet::V4(_) => ("IPv4", MIN_V4_PREFIX),
                    IpNet::V6(_) => ("IPv6", MIN_V6_PREFIX),
                };
                if net.prefix_len() < min_prefix {
                    return Err(TargetError::InvalidNetwork {
                        network: token.to_string(),
                        reason: format!("{family} prefix shorter than /{min_prefix}"),
                    });
                }
                expand_cidr_to_ips(net)
            } else {
                let ip: IpAddr = token
                    .parse()
                    .map_err(|_| TargetError::InvalidAddress(token.to_string()))?;
                vec![ip]
            };

            for ip in ips {
                if seen.insert(ip) {
                    out.push(ip.to_string());
                }
            }
        }
    }

    Ok(out)
}

/// Read and parse a targets file.
pub fn load_targets_from_path(path: impl AsRef<Path>) -> Result<Vec<String>, TargetError> {
    let path = path.as_ref();
    let content = fs::read_to_string(path).map_err(|source| TargetError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    parse_targets(&content)
}

/// Expand a CIDR into individual host addresses.
///
/// For IPv4, excludes the network and broadcast addresses unless the network is
/// a /31 or /32. IPv6 networks use `Ipv6Net::hosts`.
pub fn expand_cidr_to_ips(cidr: IpNet) -> Vec<IpAddr> {
    match cidr {
        IpNet::V4(n4) => expand_ipv4net_hosts(n4)
            .into_iter()
            .map(IpAddr::V4)
            .collect(),
        IpNet::V6(n6) => n6.hosts().map(IpAddr::V6).collect(),
    }
}

fn expand_ipv4net_hosts(net: Ipv4Net) -> Vec<Ipv4Addr> {
    let start = u32::from(net.network());
    let end = u32::from(net.broadcast());
    if net.prefix_len() >= 31 {
        return (start..=end).map(Ipv4Addr::from).collect();
    }
    (start + 1..end).map(Ipv4Addr::from).collect()
}
