//! The managed-resource capability
//!
//! Every kind a job owns goes through the same three steps:
//! - `desired_state`: build the full object from a `JobSpec`
//! - `current_state`: look it up by name and namespace
//! - `apply` / `remove`: create-or-get, or delete
//!
//! `Manager<K>` implements these once for any kind with a `DesiredState`;
//! `ManagedResource` erases the kind so the engine can walk a fixed ordered list.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info};
use traincrd_core::JobSpec;

use crate::api::{ManagedObject, ResourceApi};
use crate::config::ReconcileConfig;
use crate::error::Result;

/// The four kinds owned by a job, in creation order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    Deployment,
    Service,
    Ingress,
    VolumeClaim,
}

impl ResourceKind {
    /// Order used for both creation and teardown
    pub const ORDER: [ResourceKind; 4] = [
        ResourceKind::Deployment,
        ResourceKind::Service,
        ResourceKind::Ingress,
        ResourceKind::VolumeClaim,
    ];

    /// Kubernetes kind name
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Deployment => "Deployment",
            ResourceKind::Service => "Service",
            ResourceKind::Ingress => "Ingress",
            ResourceKind::VolumeClaim => "PersistentVolumeClaim",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A kind whose full desired object can be derived from a job
pub trait DesiredState: ManagedObject {
    const KIND: ResourceKind;

    /// Build the object the cluster should hold for `spec`
    fn desired_state(spec: &JobSpec, config: &ReconcileConfig) -> Result<Self>;
}

/// Result of create-or-get
#[derive(Debug, Clone)]
pub struct Applied<K> {
    /// The object as returned by the API
    pub object: K,
    /// Whether it was created (true) or already existed (false)
    pub created: bool,
}

/// Result of applying one managed resource, without its object
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApplyResult {
    pub kind: ResourceKind,
    pub created: bool,
}

/// Lifecycle operations for one managed kind
pub struct Manager<K: ManagedObject> {
    api: Arc<dyn ResourceApi<K>>,
    config: Arc<ReconcileConfig>,
}

impl<K: ManagedObject> Clone for Manager<K> {
    fn clone(&self) -> Self {
        Self {
            api: self.api.clone(),
            config: self.config.clone(),
        }
    }
}

impl<K: DesiredState> Manager<K> {
    pub fn new(api: Arc<dyn ResourceApi<K>>, config: Arc<ReconcileConfig>) -> Self {
        Self { api, config }
    }

    pub fn config(&self) -> &ReconcileConfig {
        &self.config
    }

    pub(crate) fn api(&self) -> &dyn ResourceApi<K> {
        self.api.as_ref()
    }

    /// Look the object up; absence is `Ok(None)`, any other error propagates
    pub async fn current_state(&self, name: &str, namespace: &str) -> Result<Option<K>> {
        match self.api.get(namespace, name).await {
            Ok(object) => Ok(Some(object)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Return the existing object unchanged, or build and create it
    ///
    /// An existing object is left as-is even if it differs from the desired
    /// state; this is what makes a restarted controller replaying Add events safe.
    pub async fn create_or_get(&self, spec: &JobSpec) -> Result<Applied<K>> {
        if let Some(existing) = self.current_state(&spec.name, &spec.namespace).await? {
            debug!(kind = %K::KIND, job = %spec.key(), "already exists, leaving untouched");
            return Ok(Applied {
                object: existing,
                created: false,
            });
        }

        let desired = K::desired_state(spec, &self.config)?;
        let created = self.api.create(&spec.namespace, &desired).await?;
        info!(kind = %K::KIND, job = %spec.key(), "created");
        Ok(Applied {
            object: created,
            created: true,
        })
    }

    /// Delete the object; a missing object is returned as the not-found error
    pub async fn delete(&self, name: &str, namespace: &str) -> Result<()> {
        self.api.get(namespace, name).await?;
        self.api.delete(namespace, name).await?;
        info!(kind = %K::KIND, job = %format!("{namespace}/{name}"), "deleted");
        Ok(())
    }
}

/// Kind-erased view of a `Manager`
#[async_trait]
pub trait ManagedResource: Send + Sync {
    fn kind(&self) -> ResourceKind;

    /// Create-or-get the resource for `spec`
    async fn apply(&self, spec: &JobSpec) -> Result<ApplyResult>;

    /// Delete the resource; not-found is reported as an error
    async fn remove(&self, name: &str, namespace: &str) -> Result<()>;
}

#[async_trait]
impl<K: DesiredState> ManagedResource for Manager<K> {
    fn kind(&self) -> ResourceKind {
        K::KIND
    }

    async fn apply(&self, spec: &JobSpec) -> Result<ApplyResult> {
        let applied = self.create_or_get(spec).await?;
        Ok(ApplyResult {
            kind: K::KIND,
            created: applied.created,
        })
    }

    async fn remove(&self, name: &str, namespace: &str) -> Result<()> {
        self.delete(name, namespace).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockOperation, MockResourceApi};
    use k8s_openapi::api::core::v1::Service;

    fn spec() -> JobSpec {
        JobSpec {
            name: "alice-nlp".to_string(),
            namespace: "ns1".to_string(),
            username: "alice".to_string(),
            channel: "research".to_string(),
            image: "reg/img:v1".to_string(),
            cpu: "2".to_string(),
            req_cpu: "500m".to_string(),
            memory: "4Gi".to_string(),
            req_memory: "1Gi".to_string(),
            replicas: 2,
            capacity: Some("20Gi".to_string()),
        }
    }

    fn manager(api: &MockResourceApi<Service>) -> Manager<Service> {
        Manager::new(Arc::new(api.clone()), Arc::new(ReconcileConfig::default()))
    }

    #[test]
    fn test_kind_order() {
        let names: Vec<&str> = ResourceKind::ORDER.iter().map(|k| k.as_str()).collect();
        assert_eq!(names, vec!["Deployment", "Service", "Ingress", "PersistentVolumeClaim"]);
    }

    #[tokio::test]
    async fn test_create_or_get_is_idempotent() {
        let api = MockResourceApi::<Service>::new();
        let manager = manager(&api);

        let first = manager.create_or_get(&spec()).await.unwrap();
        let second = manager.create_or_get(&spec()).await.unwrap();

        assert!(first.created);
        assert!(!second.created);
        assert_eq!(first.object.metadata.resource_version, second.object.metadata.resource_version);
        assert_eq!(api.operation_counts().creates, 1);
        assert_eq!(api.len(), 1);
    }

    #[tokio::test]
    async fn test_create_or_get_propagates_lookup_error() {
        let api = MockResourceApi::<Service>::new();
        api.fail_on(MockOperation::Get, 500);

        let err = manager(&api).create_or_get(&spec()).await.unwrap_err();
        assert!(!err.is_not_found());
        assert_eq!(api.operation_counts().creates, 0);
    }

    #[tokio::test]
    async fn test_current_state_maps_not_found_to_none() {
        let api = MockResourceApi::<Service>::new();
        let manager = manager(&api);

        assert!(manager.current_state("alice-nlp", "ns1").await.unwrap().is_none());
        manager.create_or_get(&spec()).await.unwrap();
        assert!(manager.current_state("alice-nlp", "ns1").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_delete_missing_returns_not_found() {
        let api = MockResourceApi::<Service>::new();

        let err = manager(&api).delete("alice-nlp", "ns1").await.unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(api.operation_counts().deletes, 0);
    }

    #[tokio::test]
    async fn test_remove_through_trait_object() {
        let api = MockResourceApi::<Service>::new();
        let manager = manager(&api);
        manager.create_or_get(&spec()).await.unwrap();

        let erased: &dyn ManagedResource = &manager;
        assert_eq!(erased.kind(), ResourceKind::Service);
        erased.remove("alice-nlp", "ns1").await.unwrap();
        assert!(api.is_empty());
    }
}
