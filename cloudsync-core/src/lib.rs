//! Core types for cloud resource reconciliation
//!
//! This crate provides the pieces every reconciler and vendor adapter shares:
//! - The resource descriptor model mirrored into the local store
//! - Capability traits that vendor adapters implement per resource kind
//! - The bounded poller for asynchronous vendor operations
//! - The store contract, an in-memory store and unique name generation

pub mod cloudprovider;
pub mod model;
pub mod store;

pub use cloudprovider::{
    wait, wait_deleted, BackendGroupSpec, Capability, CloudBackendGroup, CloudError, CloudListener,
    CloudLoadbalancer, CloudNetwork, CloudPolicyDefinition, CloudProvider, CloudResource, ListenerProtocol, ListenerSpec,
    OperationProbe, PollStatus, RemoteLister, VirtualResource,
};
pub use model::{CloudAccount, ResourceDescriptor, ResourceStatus};
pub use store::{
    MemoryStore, NameGenerator, ResourceStore, StoreError, StoreNameGenerator, StoreResult,
};
