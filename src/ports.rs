use std::collections::HashSet;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};

use crate::error::PortSpecError;
use crate::types::{PortSpec, Protocol};

/// Parse a port set description into an ordered, de-duplicated list of port specs.
///
/// Supported tokens, separated by commas, whitespace or newlines:
/// - single port number: `80`
/// - inclusive range: `8000-8010`
/// - protocol prefix: `tcp/443`, `tcp/1-1024`
/// - the keyword `common`, expanding to [`common_ports`]
/// - comments: everything after `#` on a line is ignored
pub fn parse_port_set(s: &str) -> std::result::Result<Vec<PortSpec>, PortSpecError> {
    let mut out: Vec<PortSpec> = Vec::new();
    let mut seen = HashSet::new();
    let mut push = |spec: PortSpec| {
        if seen.insert(spec) {
            out.push(spec);
        }
    };

    for (idx, raw_line) in s.lines().enumerate() {
        let line = idx + 1;
        let content = raw_line.split('#').next().unwrap_or("");

        for token in content
            .split(|c: char| c == ',' || c.is_whitespace())
            .filter(|t| !t.is_empty())
        {
            if token.eq_ignore_ascii_case("common") {
                common_ports().into_iter().for_each(&mut push);
                continue;
            }

            let (protocol, body) = split_protocol(token, line)?;

            if let Some((a, b)) = body.split_once('-') {
                let start = parse_port_str(a.trim(), line)?;
                let end = parse_port_str(b.trim(), line)?;
                if start > end {
                    return Err(PortSpecError::ReversedRange { line, start, end });
                }
                for port in start..=end {
                    push(PortSpec { protocol, port });
                }
                continue;
            }

            let port = parse_port_str(body, line)?;
            push(PortSpec { protocol, port });
        }
    }

    Ok(out)
}

/// Load a port set from a file path. Errors if the file cannot be read or parsed.
pub fn load_port_set_from_path(path: impl AsRef<Path>) -> Result<Vec<PortSpec>> {
    let content = fs::read_to_string(path.as_ref())
        .with_context(|| format!("failed to read ports file: {}", path.as_ref().display()))?;
    parse_port_set(&content)
        .with_context(|| format!("failed to parse ports file: {}", path.as_ref().display()))
}

/// The full TCP range, matching the exporter's default scan range.
pub fn default_port_set() -> Vec<PortSpec> {
    (1..=u16::MAX).map(PortSpec::tcp).collect()
}

/// A conservative list of commonly exposed TCP ports.
pub fn common_ports() -> Vec<PortSpec> {
    const COMMON: &[u16] = &[
        21, 22, 23, 25, 53, 80, 110, 111, 135, 139, 143, 389, 443, 445, 465, 587, 636, 993, 995,
        1433, 1521, 1723, 1883, 2049, 2375, 2376, 2379, 3000, 3128, 3306, 3389, 5000, 5432, 5672,
        5900, 5984, 5985, 5986, 6379, 6443, 8000, 8008, 8080, 8443, 8888, 9000, 9090, 9092, 9200,
        9300, 10250, 11211, 27017,
    ];
    COMMON.iter().copied().map(PortSpec::tcp).collect()
}

fn split_protocol(
    token: &str,
    line: usize,
) -> std::result::Result<(Protocol, &str), PortSpecError> {
    match token.split_once('/') {
        Some((proto, body)) if proto.eq_ignore_ascii_case("tcp") => Ok((Protocol::Tcp, body)),
        Some((proto, _)) => Err(PortSpecError::UnsupportedProtocol {
            line,
            protocol: proto.to_string(),
        }),
        None => Ok((Protocol::Tcp, token)),
    }
}

fn parse_port_str(s: &str, line: usize) -> std::result::Result<u16, PortSpecError> {
    let val: u32 = s.parse::<u32>().map_err(|_| PortSpecError::InvalidPort {
        line,
        value: s.to_string(),
    })?;
    if val == 0 || val > 65535 {
        return Err(PortSpecError::OutOfRange { line, value: val });
    }
    Ok(val as u16)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ports(specs: &[PortSpec]) -> Vec<u16> {
        specs.iter().map(|s| s.port).collect()
    }

    #[test]
    fn parse_single_ports() {
        let specs = parse_port_set("80\n22\n   443  \n").unwrap();
        assert_eq!(ports(&specs), vec![80, 22, 443]);
    }

    #[test]
    fn parse_comma_list_with_ranges_and_dedup() {
        let specs = parse_port_set("8000-8002,80, 8001").unwrap();
        assert_eq!(ports(&specs), vec![8000, 8001, 8002, 80]);
    }

    #[test]
    fn parse_protocol_prefix() {
        let specs = parse_port_set("tcp/22,TCP/80-81").unwrap();
        assert!(specs.iter().all(|s| s.protocol == Protocol::Tcp));
        assert_eq!(ports(&specs), vec![22, 80, 81]);
    }

    #[test]
    fn udp_is_rejected() {
        let err = parse_port_set("udp/53").unwrap_err();
        assert_eq!(
            err,
            PortSpecError::UnsupportedProtocol {
                line: 1,
                protocol: "udp".into()
            }
        );
    }

    #[test]
    fn parse_with_comments_and_whitespace() {
        let input = r#"
            # common web ports
            80  # http
            443 # https
            8000-8002   # dev servers

            # blank lines and spaces should be fine
        "#;
        let specs = parse_port_set(input).unwrap();
        assert_eq!(ports(&specs), vec![80, 443, 8000, 8001, 8002]);
    }

    #[test]
    fn invalid_values_error() {
        assert_eq!(
            parse_port_set("70000\n").unwrap_err(),
            PortSpecError::OutOfRange {
                line: 1,
                value: 70000
            }
        );
        assert!(matches!(
            parse_port_set("22\n90-80").unwrap_err(),
            PortSpecError::ReversedRange { line: 2, .. }
        ));
        assert!(parse_port_set("ssh").is_err());
    }

    #[test]
    fn common_keyword_expands() {
        let specs = parse_port_set("common").unwrap();
        assert_eq!(specs, common_ports());
        assert!(ports(&specs).contains(&80) && ports(&specs).contains(&443));
    }

    #[test]
    fn default_covers_full_range() {
        let d = default_port_set();
        assert_eq!(d.len(), 65535);
        assert_eq!(d.first(), Some(&PortSpec::tcp(1)));
        assert_eq!(d.last(), Some(&PortSpec::tcp(65535)));
    }
}
