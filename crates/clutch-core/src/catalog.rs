//! Network interface catalog

use crate::Result;
use async_trait::async_trait;
use host_control::{Interface, IpFamily};

/// Source of the host's network interfaces
#[async_trait]
pub trait InterfaceCatalog: Send + Sync {
    /// Every address of every interface, loopback included
    async fn interfaces(&self) -> Result<Vec<Interface>>;
}

/// Catalog backed by `getifaddrs`
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemCatalog;

#[async_trait]
impl InterfaceCatalog for SystemCatalog {
    async fn interfaces(&self) -> Result<Vec<Interface>> {
        Ok(smol::unblock(host_control::interfaces::enumerate).await?)
    }
}

/// Pick the entry for `name`, preferring its IPv4 address
pub fn resolve(interfaces: &[Interface], name: &str) -> Option<Interface> {
    interfaces
        .iter()
        .filter(|interface| interface.name == name)
        .min_by_key(|interface| interface.family != IpFamily::Ipv4)
        .cloned()
}
