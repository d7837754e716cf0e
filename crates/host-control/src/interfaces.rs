//! Network interface enumeration

use crate::error::Result;
use nix::ifaddrs::getifaddrs;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::{IpAddr, SocketAddrV4, SocketAddrV6};

/// Address family of an interface address
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IpFamily {
    /// IPv4
    Ipv4,
    /// IPv6
    Ipv6,
}

impl fmt::Display for IpFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IpFamily::Ipv4 => write!(f, "IPv4"),
            IpFamily::Ipv6 => write!(f, "IPv6"),
        }
    }
}

/// One address of one network interface, as seen at enumeration time
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Interface {
    /// Interface name, e.g. `en1` or `wg0`
    pub name: String,
    /// Textual address
    pub address: String,
    /// Address family
    pub family: IpFamily,
}

impl Interface {
    /// Create an interface entry from a parsed address
    pub fn new(name: impl Into<String>, address: IpAddr) -> Self {
        let family = match address {
            IpAddr::V4(_) => IpFamily::Ipv4,
            IpAddr::V6(_) => IpFamily::Ipv6,
        };
        Self {
            name: name.into(),
            address: address.to_string(),
            family,
        }
    }

    /// The parsed address, if it is well formed
    pub fn ip(&self) -> Option<IpAddr> {
        self.address.parse().ok()
    }

    /// Whether this is a loopback address
    pub fn is_loopback(&self) -> bool {
        self.ip().is_some_and(|ip| ip.is_loopback())
    }
}

/// Enumerate every IPv4 and IPv6 address on the host, one entry per address
///
/// Link-layer and other non-IP entries are skipped. Loopback is included;
/// filtering is the caller's policy.
pub fn enumerate() -> Result<Vec<Interface>> {
    let mut interfaces = Vec::new();

    for ifaddr in getifaddrs()? {
        let Some(address) = ifaddr.address else {
            continue;
        };

        let ip = if let Some(sin) = address.as_sockaddr_in() {
            IpAddr::V4(*SocketAddrV4::from(*sin).ip())
        } else if let Some(sin6) = address.as_sockaddr_in6() {
            IpAddr::V6(*SocketAddrV6::from(*sin6).ip())
        } else {
            continue;
        };

        interfaces.push(Interface::new(ifaddr.interface_name, ip));
    }

    Ok(interfaces)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interface_family_and_loopback() {
        let en1 = Interface::new("en1", "10.0.0.5".parse().unwrap());
        assert_eq!(en1.family, IpFamily::Ipv4);
        assert!(!en1.is_loopback());

        let lo = Interface::new("lo", "::1".parse().unwrap());
        assert_eq!(lo.family, IpFamily::Ipv6);
        assert!(lo.is_loopback());
    }

    #[test]
    fn test_malformed_address_is_not_loopback() {
        let odd = Interface {
            name: "odd0".to_string(),
            address: "not-an-address".to_string(),
            family: IpFamily::Ipv4,
        };
        assert!(odd.ip().is_none());
        assert!(!odd.is_loopback());
    }

    #[test]
    fn test_enumerate_includes_loopback() {
        let interfaces = enumerate().unwrap();
        assert!(
            interfaces.iter().any(Interface::is_loopback),
            "expected a loopback address in {:?}",
            interfaces
        );
    }

    #[test]
    fn test_family_serialization() {
        let json = serde_json::to_string(&IpFamily::Ipv6).unwrap();
        assert_eq!(json, "\"ipv6\"");
    }
}
