//! DNS engine configuration.

use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DnsConfig {
    /// Bind address for both the UDP and TCP listeners.
    #[serde(default = "default_listen_addr")]
    pub listen_addr: SocketAddr,

    /// Address answered for blocked `A` queries.
    #[serde(default = "default_block_ipv4")]
    pub block_ipv4: Ipv4Addr,

    /// Address answered for blocked `AAAA` queries.
    #[serde(default = "default_block_ipv6")]
    pub block_ipv6: Ipv6Addr,

    /// Upstream resolvers tried in order; first success wins.
    #[serde(default = "default_upstreams")]
    pub upstreams: Vec<SocketAddr>,

    /// Per-upstream exchange deadline in seconds.
    #[serde(default = "default_upstream_timeout_secs")]
    pub upstream_timeout_secs: u64,

    /// Install NAT OUTPUT redirect rules on startup. Requires root.
    #[serde(default)]
    pub redirect: bool,
}

fn default_listen_addr() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 53))
}

const fn default_block_ipv4() -> Ipv4Addr {
    Ipv4Addr::UNSPECIFIED
}

const fn default_block_ipv6() -> Ipv6Addr {
    Ipv6Addr::UNSPECIFIED
}

fn default_upstreams() -> Vec<SocketAddr> {
    vec![
        SocketAddr::from(([8, 8, 8, 8], 53)),
        SocketAddr::from(([1, 1, 1, 1], 53)),
    ]
}

const fn default_upstream_timeout_secs() -> u64 {
    2
}

impl Default for DnsConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            block_ipv4: default_block_ipv4(),
            block_ipv6: default_block_ipv6(),
            upstreams: default_upstreams(),
            upstream_timeout_secs: default_upstream_timeout_secs(),
            redirect: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_documented_table() {
        let config = DnsConfig::default();
        assert_eq!(config.listen_addr.port(), 53);
        assert_eq!(config.block_ipv4, Ipv4Addr::UNSPECIFIED);
        assert_eq!(config.block_ipv6, Ipv6Addr::UNSPECIFIED);
        assert_eq!(config.upstreams.len(), 2);
        assert_eq!(config.upstream_timeout_secs, 2);
        assert!(!config.redirect);
    }
}
