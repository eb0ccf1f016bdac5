use crate::types::Protocol;

/// Resolve a human-readable service label for a well-known (protocol, port) pair.
///
/// Returns `None` for ports without a registered label; callers export an empty
/// description in that case.
pub fn describe(protocol: Protocol, port: u16) -> Option<&'static str> {
    match protocol {
        Protocol::Tcp => tcp_service(port),
    }
}

/// Same as [`describe`] but yields an owned label, empty when unknown.
pub fn description_for(protocol: Protocol, port: u16) -> String {
    describe(protocol, port).unwrap_or_default().to_string()
}

fn tcp_service(port: u16) -> Option<&'static str> {
    let name = match port {
        7 => "echo",
        20 => "ftp-data",
        21 => "ftp",
        22 => "ssh",
        23 => "telnet",
        25 => "smtp",
        37 => "time",
        43 => "whois",
        53 => "domain",
        70 => "gopher",
        79 => "finger",
        80 => "http",
        88 => "kerberos",
        110 => "pop3",
        111 => "sunrpc",
        113 => "ident",
        119 => "nntp",
        135 => "msrpc",
        139 => "netbios-ssn",
        143 => "imap",
        179 => "bgp",
        389 => "ldap",
        443 => "https",
        445 => "microsoft-ds",
        465 => "smtps",
        514 => "shell",
        515 => "printer",
        548 => "afp",
        554 => "rtsp",
        587 => "submission",
        631 => "ipp",
        636 => "ldaps",
        873 => "rsync",
        902 => "vmware-auth",
        989 => "ftps-data",
        990 => "ftps",
        993 => "imaps",
        995 => "pop3s",
        1080 => "socks",
        1194 => "openvpn",
        1433 => "ms-sql-s",
        1434 => "ms-sql-m",
        1521 => "oracle",
        1723 => "pptp",
        1883 => "mqtt",
        2049 => "nfs",
        2181 => "zookeeper",
        2375 => "docker",
        2376 => "docker-tls",
        2379 => "etcd-client",
        2380 => "etcd-server",
        3000 => "ppp",
        3128 => "squid-http",
        3268 => "globalcatLDAP",
        3306 => "mysql",
        3389 => "ms-wbt-server",
        4369 => "epmd",
        5000 => "upnp",
        5432 => "postgresql",
        5671 => "amqps",
        5672 => "amqp",
        5900 => "vnc",
        5984 => "couchdb",
        5985 => "wsman",
        5986 => "wsmans",
        6379 => "redis",
        6443 => "kubernetes-api",
        6667 => "irc",
        7001 => "afs3-callback",
        8000 => "http-alt",
        8008 => "http",
        8080 => "http-proxy",
        8443 => "https-alt",
        8883 => "secure-mqtt",
        8888 => "sun-answerbook",
        9000 => "cslistener",
        9090 => "zeus-admin",
        9092 => "kafka",
        9100 => "jetdirect",
        9200 => "elasticsearch",
        9300 => "elasticsearch-transport",
        9418 => "git",
        10250 => "kubelet",
        11211 => "memcache",
        15672 => "rabbitmq-management",
        27017 => "mongod",
        _ => return None,
    };
    Some(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn well_known_ports_resolve() {
        assert_eq!(describe(Protocol::Tcp, 22), Some("ssh"));
        assert_eq!(describe(Protocol::Tcp, 80), Some("http"));
        assert_eq!(describe(Protocol::Tcp, 443), Some("https"));
    }

    #[test]
    fn unknown_port_has_empty_description() {
        assert_eq!(describe(Protocol::Tcp, 40_000), None);
        assert_eq!(description_for(Protocol::Tcp, 40_000), "");
    }
}
