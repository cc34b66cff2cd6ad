//! Concrete resource kinds

pub mod loadbalancer;
pub mod network;
pub mod policy_definition;

pub use loadbalancer::{create_listener, BackendGroupSummary, ListenerSummary, LoadbalancerAttributes, LoadbalancerKind};
pub use network::{NetworkAttributes, NetworkKind};
pub use policy_definition::{
    AssignmentTable, PolicyAssigner, PolicyCategory, PolicyDefinitionAttributes, PolicyDefinitionKind, PolicyParameters, RegionRef,
    RegionResolver, RegionTable,
};
