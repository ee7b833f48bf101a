//! Host names this instance answers for.

/// `<domain>`, `ipv4.<domain>` and `ipv6.<domain>`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ServedHosts {
    names: [String; 3],
}

impl ServedHosts {
    pub fn new(domain: &str) -> Self {
        let domain = normalize(domain);
        Self {
            names: [
                format!("ipv4.{domain}"),
                format!("ipv6.{domain}"),
                domain,
            ],
        }
    }

    pub fn domain(&self) -> &str {
        &self.names[2]
    }

    /// Case-insensitive, ignores a trailing dot.
    pub fn contains(&self, host: &str) -> bool {
        let host = normalize(host);
        self.names.iter().any(|name| *name == host)
    }
}

/// Lowercases and drops the trailing root dot.
pub fn normalize(host: &str) -> String {
    host.trim().trim_end_matches('.').to_ascii_lowercase()
}

/// Host part of an HTTP authority (`host[:port]` or `[v6]:port`).
pub fn strip_port(authority: &str) -> &str {
    if authority.starts_with('[') {
        return match authority.find(']') {
            Some(end) => &authority[..=end],
            None => authority,
        };
    }
    match authority.rsplit_once(':') {
        Some((host, port)) if port.bytes().all(|b| b.is_ascii_digit()) => host,
        _ => authority,
    }
}
