use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use cloudsync_core::{
    CloudAccount, CloudPolicyDefinition, CloudProvider, CloudResource, RemoteLister, ResourceDescriptor,
};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;
use uuid::Uuid;

use crate::error::{Result, SyncError};
use crate::reconciler::ResourceKind;

const CONDITION_IN: &str = "in";
const CONDITION_NOT_IN: &str = "not_in";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PolicyCategory {
    /// Allow or deny a set of cloud regions
    Cloudregion,
    Tag,
}

/// Local identity of a cloud region
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegionRef {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyParameters {
    Cloudregions(Vec<RegionRef>),
    /// Copied verbatim from the vendor
    Tag(Option<Value>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyDefinitionAttributes {
    pub category: PolicyCategory,
    pub condition: String,
    pub parameters: PolicyParameters,
}

/// Maps vendor region ids onto locally known regions
#[async_trait]
pub trait RegionResolver: Send + Sync {
    async fn resolve(&self, external_id: &str) -> Result<Option<RegionRef>>;
}

/// Fixed region lookup table
#[derive(Debug, Default)]
pub struct RegionTable {
    regions: HashMap<String, RegionRef>,
}

impl RegionTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, external_id: impl Into<String>, region: RegionRef) {
        self.regions.insert(external_id.into(), region);
    }
}

#[async_trait]
impl RegionResolver for RegionTable {
    async fn resolve(&self, external_id: &str) -> Result<Option<RegionRef>> {
        Ok(self.regions.get(external_id).cloned())
    }
}

/// Binds synced policy definitions to the domain owning the vendor account
#[async_trait]
pub trait PolicyAssigner: Send + Sync {
    /// Create the assignment if it is missing; returns whether one was created
    async fn ensure_assignment(&self, definition_id: Uuid, domain_id: &str) -> Result<bool>;
}

/// In-process assignment set
#[derive(Debug, Default)]
pub struct AssignmentTable {
    assignments: Mutex<HashSet<(Uuid, String)>>,
}

impl AssignmentTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, definition_id: Uuid, domain_id: &str) -> bool {
        self.assignments.lock().contains(&(definition_id, domain_id.to_string()))
    }

    pub fn len(&self) -> usize {
        self.assignments.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.assignments.lock().is_empty()
    }
}

#[async_trait]
impl PolicyAssigner for AssignmentTable {
    async fn ensure_assignment(&self, definition_id: Uuid, domain_id: &str) -> Result<bool> {
        Ok(self.assignments.lock().insert((definition_id, domain_id.to_string())))
    }
}

pub struct PolicyDefinitionKind {
    regions: Arc<dyn RegionResolver>,
    assigner: Option<Arc<dyn PolicyAssigner>>,
}

impl PolicyDefinitionKind {
    pub fn new(regions: Arc<dyn RegionResolver>) -> Self {
        Self { regions, assigner: None }
    }

    /// Assign every added or merged definition to the account's domain
    pub fn with_assigner(mut self, assigner: Arc<dyn PolicyAssigner>) -> Self {
        self.assigner = Some(assigner);
        self
    }

    async fn resolve_regions(&self, external_id: &str, parameters: Option<Value>) -> Result<Vec<RegionRef>> {
        let parameters =
            parameters.ok_or_else(|| SyncError::invalid_observation(external_id, "missing parameters"))?;
        let region_ids: Vec<String> = parameters
            .get("cloudregions")
            .cloned()
            .map(serde_json::from_value::<Vec<String>>)
            .transpose()
            .map_err(|err| SyncError::invalid_observation(external_id, format!("cloudregions: {}", err)))?
            .ok_or_else(|| SyncError::invalid_observation(external_id, "parameters lack cloudregions"))?;

        let mut regions = Vec::with_capacity(region_ids.len());
        for region_id in &region_ids {
            let region = self.regions.resolve(region_id).await?.ok_or_else(|| {
                SyncError::invalid_observation(external_id, format!("unknown cloudregion '{}'", region_id))
            })?;
            regions.push(region);
        }
        Ok(regions)
    }
}

#[async_trait]
impl ResourceKind for PolicyDefinitionKind {
    type Observation = Box<dyn CloudPolicyDefinition>;
    type Attributes = PolicyDefinitionAttributes;

    fn name(&self) -> &'static str {
        "policy_definition"
    }

    fn lister<'p>(&self, provider: &'p dyn CloudProvider) -> Option<&'p dyn RemoteLister<Self::Observation>> {
        provider.policy_definitions()
    }

    async fn construct(&self, definition: &Self::Observation) -> Result<PolicyDefinitionAttributes> {
        let external_id = definition.global_id();
        let category = definition.category();
        let condition = definition.condition();

        let (category, parameters) = match category.as_str() {
            "cloudregion" => {
                if condition != CONDITION_IN && condition != CONDITION_NOT_IN {
                    return Err(SyncError::invalid_observation(
                        &external_id,
                        format!("category cloudregion does not support condition '{}'", condition),
                    ));
                }
                let regions = self.resolve_regions(&external_id, definition.parameters()).await?;
                (PolicyCategory::Cloudregion, PolicyParameters::Cloudregions(regions))
            }
            "tag" => (PolicyCategory::Tag, PolicyParameters::Tag(definition.parameters())),
            other => {
                return Err(SyncError::invalid_observation(
                    &external_id,
                    format!("unsupported category '{}'", other),
                ))
            }
        };

        Ok(PolicyDefinitionAttributes {
            category,
            condition,
            parameters,
        })
    }

    async fn after_apply(
        &self,
        descriptor: &ResourceDescriptor<PolicyDefinitionAttributes>,
        account: &CloudAccount,
    ) -> Result<()> {
        let Some(assigner) = &self.assigner else {
            return Ok(());
        };
        if account.domain_id.is_empty() {
            debug!(definition = %descriptor.id, account = %account.id, "Account has no domain, skipping assignment");
            return Ok(());
        }

        if assigner.ensure_assignment(descriptor.id, &account.domain_id).await? {
            debug!(definition = %descriptor.id, domain = %account.domain_id, "Assigned policy definition");
        }
        Ok(())
    }
}
