//! Vendor capability traits
//!
//! Every vendor adapter implements the traits for the resource kinds it
//! supports. Reconcilers only ever see these traits, never a concrete vendor.

mod error;
pub mod wait;

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::model::ResourceStatus;

pub use error::{CloudError, Result};
pub use wait::{wait, wait_deleted, OperationProbe, PollStatus};

/// Minimal view of any vendor-side resource
pub trait CloudResource: Send + Sync {
    /// Vendor-local identifier
    fn id(&self) -> String;

    fn name(&self) -> String;

    /// Identifier used to correlate with local records.
    ///
    /// Defaults to `id()`; vendors whose ids are case-insensitive or only
    /// unique per region override this.
    fn global_id(&self) -> String {
        self.id()
    }

    fn status(&self) -> ResourceStatus;

    fn metadata(&self) -> Option<serde_json::Value> {
        None
    }

    fn project_id(&self) -> Option<String> {
        None
    }
}

/// A vendor resource that can be re-read and deleted through its handle
#[async_trait]
pub trait VirtualResource: CloudResource {
    /// Re-read vendor state; `CloudError::NotFound` once the resource is gone
    async fn refresh(&mut self) -> Result<()>;

    async fn delete(&self) -> Result<()>;
}

impl<T: CloudResource + ?Sized> CloudResource for Box<T> {
    fn id(&self) -> String {
        (**self).id()
    }

    fn name(&self) -> String {
        (**self).name()
    }

    fn global_id(&self) -> String {
        (**self).global_id()
    }

    fn status(&self) -> ResourceStatus {
        (**self).status()
    }

    fn metadata(&self) -> Option<serde_json::Value> {
        (**self).metadata()
    }

    fn project_id(&self) -> Option<String> {
        (**self).project_id()
    }
}

#[async_trait]
impl<T: VirtualResource + ?Sized> VirtualResource for Box<T> {
    async fn refresh(&mut self) -> Result<()> {
        (**self).refresh().await
    }

    async fn delete(&self) -> Result<()> {
        (**self).delete().await
    }
}

/// Lists every remote resource of one kind visible to an owning scope.
///
/// Implementations must drain vendor pagination before returning; callers
/// always diff against a complete snapshot.
#[async_trait]
pub trait RemoteLister<O>: Send + Sync {
    async fn list(&self, owner_scope: &str) -> Result<Vec<O>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ListenerProtocol {
    Tcp,
    Udp,
    Http,
    Https,
}

impl fmt::Display for ListenerProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ListenerProtocol::Tcp => write!(f, "tcp"),
            ListenerProtocol::Udp => write!(f, "udp"),
            ListenerProtocol::Http => write!(f, "http"),
            ListenerProtocol::Https => write!(f, "https"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthCheckSpec {
    pub interval_secs: u32,
    pub timeout_secs: u32,
    pub healthy_threshold: u32,
    pub unhealthy_threshold: u32,
    /// HTTP path, ignored for tcp/udp listeners
    pub path: Option<String>,
}

/// Request for a new load balancer listener
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListenerSpec {
    pub name: String,
    pub protocol: ListenerProtocol,
    pub port: u16,
    pub backend_port: u16,
    pub scheduler: Option<String>,
    pub sticky_session_timeout_secs: u32,
    pub health_check: Option<HealthCheckSpec>,
}

/// Request for a new backend server group
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendGroupSpec {
    pub name: String,
    pub group_type: String,
}

/// Set of backend servers a listener or forwarding rule sends traffic to
pub trait CloudBackendGroup: CloudResource {
    fn group_type(&self) -> String;

    fn is_default(&self) -> bool {
        false
    }
}

pub trait CloudListener: CloudResource {
    fn protocol(&self) -> ListenerProtocol;

    fn port(&self) -> u16;

    fn backend_port(&self) -> u16;
}

#[async_trait]
pub trait CloudLoadbalancer: VirtualResource {
    fn address(&self) -> String;

    fn address_type(&self) -> String;

    fn network_type(&self) -> String;

    fn vpc_id(&self) -> Option<String> {
        None
    }

    fn zone_id(&self) -> Option<String> {
        None
    }

    fn charge_type(&self) -> String;

    fn egress_mbps(&self) -> u32 {
        0
    }

    async fn start(&self) -> Result<()> {
        Err(CloudError::NotSupported(format!("start load balancer {}", self.id())))
    }

    async fn stop(&self) -> Result<()> {
        Err(CloudError::NotSupported(format!("stop load balancer {}", self.id())))
    }

    /// Submit a listener; the vendor may only return its id before it is visible
    async fn create_listener(&self, spec: &ListenerSpec) -> Result<Box<dyn CloudListener>>;

    async fn listeners(&self) -> Result<Vec<Box<dyn CloudListener>>>;

    async fn listener_by_id(&self, listener_id: &str) -> Result<Box<dyn CloudListener>> {
        self.listeners()
            .await?
            .into_iter()
            .find(|listener| listener.id() == listener_id)
            .ok_or_else(|| CloudError::NotFound(format!("listener {}", listener_id)))
    }

    async fn create_backend_group(&self, spec: &BackendGroupSpec) -> Result<Box<dyn CloudBackendGroup>> {
        Err(CloudError::NotSupported(format!(
            "create backend group {} on load balancer {}",
            spec.name,
            self.id()
        )))
    }

    /// Vendors without first-class groups may derive them from listeners
    async fn backend_groups(&self) -> Result<Vec<Box<dyn CloudBackendGroup>>> {
        Err(CloudError::NotSupported(format!("backend groups of load balancer {}", self.id())))
    }

    async fn backend_group_by_id(&self, group_id: &str) -> Result<Box<dyn CloudBackendGroup>> {
        self.backend_groups()
            .await?
            .into_iter()
            .find(|group| group.id() == group_id)
            .ok_or_else(|| CloudError::NotFound(format!("backend group {}", group_id)))
    }
}

pub trait CloudNetwork: CloudResource {
    fn ip_start(&self) -> String;

    fn ip_end(&self) -> String;

    fn ip_mask(&self) -> u8;

    fn gateway(&self) -> String;

    fn is_public(&self) -> bool {
        false
    }

    fn server_type(&self) -> String;

    /// How long an address allocation may take on this vendor
    fn alloc_timeout(&self) -> Duration {
        Duration::from_secs(120)
    }
}

pub trait CloudPolicyDefinition: CloudResource {
    fn category(&self) -> String;

    fn condition(&self) -> String;

    fn parameters(&self) -> Option<serde_json::Value>;
}

/// Resource kinds a vendor variant can expose
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    Loadbalancer,
    Network,
    PolicyDefinition,
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Capability::Loadbalancer => write!(f, "loadbalancer"),
            Capability::Network => write!(f, "network"),
            Capability::PolicyDefinition => write!(f, "policy_definition"),
        }
    }
}

/// One vendor variant, selected by the caller.
///
/// Accessors return `None` for kinds the vendor does not support.
pub trait CloudProvider: Send + Sync {
    fn provider(&self) -> &str;

    fn capabilities(&self) -> Vec<Capability>;

    fn supports(&self, capability: Capability) -> bool {
        self.capabilities().contains(&capability)
    }

    fn loadbalancers(&self) -> Option<&dyn RemoteLister<Box<dyn CloudLoadbalancer>>> {
        None
    }

    fn networks(&self) -> Option<&dyn RemoteLister<Box<dyn CloudNetwork>>> {
        None
    }

    fn policy_definitions(&self) -> Option<&dyn RemoteLister<Box<dyn CloudPolicyDefinition>>> {
        None
    }
}
