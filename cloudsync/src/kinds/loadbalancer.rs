use std::time::Duration;

use async_trait::async_trait;
use cloudsync_core::cloudprovider::Result as CloudResult;
use cloudsync_core::{
    wait, wait_deleted, CloudError, CloudListener, CloudLoadbalancer, CloudProvider, CloudResource, ListenerProtocol,
    ListenerSpec, PollStatus, RemoteLister, ResourceStatus, VirtualResource,
};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::Result;
use crate::reconciler::ResourceKind;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListenerSummary {
    pub id: String,
    pub name: String,
    pub protocol: ListenerProtocol,
    pub port: u16,
    pub backend_port: u16,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendGroupSummary {
    pub id: String,
    pub name: String,
    pub group_type: String,
    pub is_default: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoadbalancerAttributes {
    pub address: String,
    pub address_type: String,
    pub network_type: String,
    pub vpc_id: Option<String>,
    pub zone_id: Option<String>,
    pub charge_type: String,
    pub egress_mbps: u32,
    pub vendor_status: ResourceStatus,
    pub metadata: Option<serde_json::Value>,
    /// Ordered by port
    pub listeners: Vec<ListenerSummary>,
    /// Ordered by id; empty when the vendor has no backend groups
    #[serde(default)]
    pub backend_groups: Vec<BackendGroupSummary>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct LoadbalancerKind;

#[async_trait]
impl ResourceKind for LoadbalancerKind {
    type Observation = Box<dyn CloudLoadbalancer>;
    type Attributes = LoadbalancerAttributes;

    fn name(&self) -> &'static str {
        "loadbalancer"
    }

    fn lister<'p>(&self, provider: &'p dyn CloudProvider) -> Option<&'p dyn RemoteLister<Self::Observation>> {
        provider.loadbalancers()
    }

    async fn construct(&self, lb: &Self::Observation) -> Result<LoadbalancerAttributes> {
        let mut listeners: Vec<ListenerSummary> = lb
            .listeners()
            .await?
            .iter()
            .map(|listener| ListenerSummary {
                id: listener.id(),
                name: listener.name(),
                protocol: listener.protocol(),
                port: listener.port(),
                backend_port: listener.backend_port(),
            })
            .collect();
        listeners.sort_by(|a, b| a.port.cmp(&b.port).then_with(|| a.id.cmp(&b.id)));

        let mut backend_groups: Vec<BackendGroupSummary> = match lb.backend_groups().await {
            Ok(groups) => groups
                .iter()
                .map(|group| BackendGroupSummary {
                    id: group.id(),
                    name: group.name(),
                    group_type: group.group_type(),
                    is_default: group.is_default(),
                })
                .collect(),
            Err(CloudError::NotSupported(_)) => Vec::new(),
            Err(err) => return Err(err.into()),
        };
        backend_groups.sort_by(|a, b| a.id.cmp(&b.id));

        Ok(LoadbalancerAttributes {
            address: lb.address(),
            address_type: lb.address_type(),
            network_type: lb.network_type(),
            vpc_id: lb.vpc_id(),
            zone_id: lb.zone_id(),
            charge_type: lb.charge_type(),
            egress_mbps: lb.egress_mbps(),
            vendor_status: lb.status(),
            metadata: lb.metadata(),
            listeners,
            backend_groups,
        })
    }

    async fn refresh(&self, lb: &mut Self::Observation) -> CloudResult<()> {
        lb.refresh().await
    }

    async fn remove_remote(&self, lb: &mut Self::Observation, interval: Duration, timeout: Duration) -> CloudResult<()> {
        match lb.delete().await {
            Ok(()) => {}
            Err(err) if err.is_not_found() => return Ok(()),
            Err(err) => return Err(err),
        }
        wait_deleted(lb, interval, timeout).await
    }
}

/// Create a listener and wait until the load balancer reports it.
///
/// Vendors acknowledge listener creation before the listener is queryable,
/// so the handle returned here is the one read back through `listener_by_id`.
pub async fn create_listener(
    lb: &dyn CloudLoadbalancer,
    spec: &ListenerSpec,
    interval: Duration,
    timeout: Duration,
) -> CloudResult<Box<dyn CloudListener>> {
    let listener_id = lb.create_listener(spec).await?.id();
    debug!(lb = %lb.id(), listener = %listener_id, port = spec.port, "Listener submitted");

    let probe_id = listener_id.clone();
    wait(
        move || {
            let id = probe_id.clone();
            async move {
                match lb.listener_by_id(&id).await {
                    Ok(_) => Ok(PollStatus::Succeeded),
                    Err(err) if err.is_not_found() => Ok(PollStatus::Pending),
                    Err(err) => Err(err),
                }
            }
        },
        interval,
        timeout,
    )
    .await?;

    lb.listener_by_id(&listener_id).await
}
