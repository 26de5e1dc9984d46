//! Client identity for admission control
//!
//! The peer address is the identity, unless the peer is a trusted reverse
//! proxy; only then are `X-Real-IP` and `X-Forwarded-For` believed.

use std::net::IpAddr;
use std::str::FromStr;

use axum::http::HeaderMap;
use thiserror::Error;

use crate::config::RateLimitConfig;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CidrParseError {
    #[error("invalid IP address '{0}'")]
    InvalidAddress(String),

    #[error("invalid prefix length '{0}'")]
    InvalidPrefix(String),
}

/// An IPv4 or IPv6 network; a bare address is a single-host network
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IpCidr {
    network: IpAddr,
    prefix: u8,
}

impl IpCidr {
    pub fn new(network: IpAddr, prefix: u8) -> Result<Self, CidrParseError> {
        let max = match network {
            IpAddr::V4(_) => 32,
            IpAddr::V6(_) => 128,
        };
        if prefix > max {
            return Err(CidrParseError::InvalidPrefix(prefix.to_string()));
        }
        Ok(Self { network, prefix })
    }

    pub fn contains(&self, ip: IpAddr) -> bool {
        match (self.network, ip.to_canonical()) {
            (IpAddr::V4(net), IpAddr::V4(ip)) => {
                let mask = u32::MAX.checked_shl(32 - self.prefix as u32).unwrap_or(0);
                u32::from(net) & mask == u32::from(ip) & mask
            }
            (IpAddr::V6(net), IpAddr::V6(ip)) => {
                let mask = u128::MAX.checked_shl(128 - self.prefix as u32).unwrap_or(0);
                u128::from(net) & mask == u128::from(ip) & mask
            }
            _ => false,
        }
    }
}

impl FromStr for IpCidr {
    type Err = CidrParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (addr, prefix) = match s.split_once('/') {
            Some((addr, prefix)) => (addr, Some(prefix)),
            None => (s, None),
        };

        let network: IpAddr = addr
            .parse()
            .map_err(|_| CidrParseError::InvalidAddress(addr.to_string()))?;

        let prefix = match prefix {
            Some(p) => p
                .parse::<u8>()
                .map_err(|_| CidrParseError::InvalidPrefix(p.to_string()))?,
            None if network.is_ipv4() => 32,
            None => 128,
        };

        Self::new(network, prefix)
    }
}

/// Container bridge networks (172.16.0.0/12)
const CONTAINER_BRIDGE: IpCidr = IpCidr {
    network: IpAddr::V4(std::net::Ipv4Addr::new(172, 16, 0, 0)),
    prefix: 12,
};

/// Peers whose forwarding headers are believed
#[derive(Debug, Clone, Default)]
pub struct TrustedProxies {
    networks: Vec<IpCidr>,
    trust_container_bridge: bool,
}

impl TrustedProxies {
    pub fn new(networks: Vec<IpCidr>, trust_container_bridge: bool) -> Self {
        Self {
            networks,
            trust_container_bridge,
        }
    }

    pub fn from_config(config: &RateLimitConfig) -> Result<Self, CidrParseError> {
        let networks = config
            .trusted_proxies
            .iter()
            .map(|entry| entry.parse())
            .collect::<Result<Vec<IpCidr>, _>>()?;
        Ok(Self::new(networks, config.trust_container_bridge))
    }

    pub fn is_trusted(&self, peer: IpAddr) -> bool {
        let peer = peer.to_canonical();
        peer.is_loopback()
            || self.networks.iter().any(|net| net.contains(peer))
            || (self.trust_container_bridge && CONTAINER_BRIDGE.contains(peer))
    }
}

/// Rate limiting key for a request from `peer`
pub fn resolve_client_ip(peer: IpAddr, headers: &HeaderMap, trusted: &TrustedProxies) -> String {
    if trusted.is_trusted(peer) {
        let header = |name: &str| {
            headers
                .get(name)
                .and_then(|value| value.to_str().ok())
                .map(str::trim)
                .filter(|value| !value.is_empty())
        };

        if let Some(real_ip) = header("x-real-ip") {
            return real_ip.to_string();
        }

        if let Some(first) = header("x-forwarded-for")
            .and_then(|list| list.split(',').next())
            .map(str::trim)
            .filter(|value| !value.is_empty())
        {
            return first.to_string();
        }
    }

    peer.to_canonical().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn ip(s: &str) -> IpAddr {
        s.parse().unwrap()
    }

    fn forwarded(real_ip: Option<&str>, xff: Option<&str>) -> HeaderMap {
        let mut headers = HeaderMap::new();
        if let Some(value) = real_ip {
            headers.insert("x-real-ip", HeaderValue::from_str(value).unwrap());
        }
        if let Some(value) = xff {
            headers.insert("x-forwarded-for", HeaderValue::from_str(value).unwrap());
        }
        headers
    }

    #[test]
    fn test_parse_cidr() {
        let net: IpCidr = "192.168.0.0/16".parse().unwrap();
        assert!(net.contains(ip("192.168.44.1")));
        assert!(!net.contains(ip("192.169.0.1")));

        let host: IpCidr = "10.0.0.5".parse().unwrap();
        assert!(host.contains(ip("10.0.0.5")));
        assert!(!host.contains(ip("10.0.0.6")));

        let v6: IpCidr = "fd00::/8".parse().unwrap();
        assert!(v6.contains(ip("fd12::1")));
        assert!(!v6.contains(ip("10.0.0.5")));

        let any: IpCidr = "0.0.0.0/0".parse().unwrap();
        assert!(any.contains(ip("8.8.8.8")));

        assert_eq!(
            "10.0.0.0/33".parse::<IpCidr>(),
            Err(CidrParseError::InvalidPrefix("33".into()))
        );
        assert!(matches!(
            "proxy.local".parse::<IpCidr>(),
            Err(CidrParseError::InvalidAddress(_))
        ));
    }

    #[test]
    fn test_untrusted_peer_ignores_headers() {
        let trusted = TrustedProxies::default();
        let headers = forwarded(Some("1.1.1.1"), Some("2.2.2.2"));

        assert_eq!(resolve_client_ip(ip("203.0.113.9"), &headers, &trusted), "203.0.113.9");
    }

    #[test]
    fn test_loopback_proxy_is_trusted() {
        let trusted = TrustedProxies::default();

        let headers = forwarded(Some("1.1.1.1"), Some("2.2.2.2"));
        assert_eq!(resolve_client_ip(ip("127.0.0.1"), &headers, &trusted), "1.1.1.1");

        let headers = forwarded(None, Some(" 2.2.2.2 , 10.0.0.1"));
        assert_eq!(resolve_client_ip(ip("::1"), &headers, &trusted), "2.2.2.2");

        let headers = forwarded(None, None);
        assert_eq!(resolve_client_ip(ip("127.0.0.1"), &headers, &trusted), "127.0.0.1");
    }

    #[test]
    fn test_configured_and_bridge_proxies() {
        let configured = TrustedProxies::new(vec!["10.1.0.0/16".parse().unwrap()], false);
        assert!(configured.is_trusted(ip("10.1.2.3")));
        assert!(!configured.is_trusted(ip("172.17.0.2")));

        let bridge = TrustedProxies::new(Vec::new(), true);
        assert!(bridge.is_trusted(ip("172.17.0.2")));
        assert!(bridge.is_trusted(ip("::ffff:172.20.0.1")));
        assert!(!bridge.is_trusted(ip("172.32.0.1")));

        let headers = forwarded(Some("198.51.100.4"), None);
        assert_eq!(resolve_client_ip(ip("172.17.0.2"), &headers, &bridge), "198.51.100.4");
    }
}
