use portscan_exporter::ports::{load_port_set_from_path, parse_port_set};
use portscan_exporter::types::PortSpec;
use std::io::Write;

#[test]
fn parse_single_and_ranges_and_comments() {
    let input = r#"
        # common ports
        22
        80  # http
        tcp/443 # https
        8000-8002
        8001  # duplicate
        # blank line follows

    "#;

    let specs = parse_port_set(input).expect("parse ok");
    // Dedup, preserve insertion order of first appearance in each range/line
    let ports: Vec<u16> = specs.iter().map(|s| s.port).collect();
    assert_eq!(ports, vec![22, 80, 443, 8000, 8001, 8002]);
}

#[test]
fn invalid_port_rejected() {
    let input = "0\n"; // invalid: out of range
    assert!(parse_port_set(input).is_err());
}

#[test]
fn ports_file_is_loaded() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "22,80\n# web\n8080").unwrap();

    let specs = load_port_set_from_path(file.path()).expect("load ok");
    assert_eq!(
        specs,
        vec![PortSpec::tcp(22), PortSpec::tcp(80), PortSpec::tcp(8080)]
    );
}

#[test]
fn missing_ports_file_errors() {
    let dir = tempfile::tempdir().unwrap();
    let err = load_port_set_from_path(dir.path().join("absent.txt")).unwrap_err();
    assert!(err.to_string().contains("failed to read ports file"));
}
