use std::net::Ipv4Addr;
use std::time::Duration;

use async_trait::async_trait;
use cloudsync_core::{CloudNetwork, CloudProvider, CloudResource, RemoteLister};
use ipnet::Ipv4Net;
use serde::{Deserialize, Serialize};

use crate::error::{Result, SyncError};
use crate::reconciler::ResourceKind;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkAttributes {
    pub ip_start: Ipv4Addr,
    pub ip_end: Ipv4Addr,
    /// Prefix containing the whole address range
    pub prefix: Ipv4Net,
    pub gateway: Option<Ipv4Addr>,
    pub is_public: bool,
    pub server_type: String,
    #[serde(with = "humantime_serde")]
    pub alloc_timeout: Duration,
}

impl NetworkAttributes {
    /// Number of addresses in the allocatable range, bounds included
    pub fn capacity(&self) -> u64 {
        u64::from(u32::from(self.ip_end)) - u64::from(u32::from(self.ip_start)) + 1
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NetworkKind;

fn parse_addr(external_id: &str, field: &str, value: &str) -> Result<Ipv4Addr> {
    value
        .trim()
        .parse()
        .map_err(|_| SyncError::invalid_observation(external_id, format!("{} '{}' is not an IPv4 address", field, value)))
}

#[async_trait]
impl ResourceKind for NetworkKind {
    type Observation = Box<dyn CloudNetwork>;
    type Attributes = NetworkAttributes;

    fn name(&self) -> &'static str {
        "network"
    }

    fn lister<'p>(&self, provider: &'p dyn CloudProvider) -> Option<&'p dyn RemoteLister<Self::Observation>> {
        provider.networks()
    }

    async fn construct(&self, network: &Self::Observation) -> Result<NetworkAttributes> {
        let external_id = network.global_id();
        let ip_start = parse_addr(&external_id, "ip start", &network.ip_start())?;
        let ip_end = parse_addr(&external_id, "ip end", &network.ip_end())?;

        if ip_start > ip_end {
            return Err(SyncError::invalid_observation(
                &external_id,
                format!("inverted range {} - {}", ip_start, ip_end),
            ));
        }

        let mask = network.ip_mask();
        let prefix = Ipv4Net::new(ip_start, mask)
            .map_err(|_| SyncError::invalid_observation(&external_id, format!("invalid mask /{}", mask)))?
            .trunc();
        if !prefix.contains(&ip_end) {
            return Err(SyncError::invalid_observation(
                &external_id,
                format!("range {} - {} does not fit in {}", ip_start, ip_end, prefix),
            ));
        }

        let gateway = match network.gateway().trim() {
            "" => None,
            raw => Some(parse_addr(&external_id, "gateway", raw)?),
        };

        Ok(NetworkAttributes {
            ip_start,
            ip_end,
            prefix,
            gateway,
            is_public: network.is_public(),
            server_type: network.server_type(),
            alloc_timeout: network.alloc_timeout(),
        })
    }
}
