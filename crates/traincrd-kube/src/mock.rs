//! In-memory API for testing
//!
//! `MockResourceApi` stores objects in memory and answers with the same
//! status errors the API server would (404 on absence, 409 on duplicate
//! create), useful for unit tests without requiring a Kubernetes cluster.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{PersistentVolumeClaim, Service};
use k8s_openapi::api::networking::v1::Ingress;
use kube::core::ErrorResponse;

use crate::api::{ClusterApis, ManagedObject, ResourceApi};
use crate::error::{KubeError, Result};

/// Operation kinds recorded by the mock
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MockOperation {
    Get,
    Create,
    Replace,
    Delete,
}

/// A call made against a mock, in the order it was made
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockCall {
    pub kind: String,
    pub operation: MockOperation,
    pub namespace: String,
    pub name: String,
}

/// Counts of operations performed for testing assertions
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct OperationCounts {
    pub gets: usize,
    pub creates: usize,
    pub replaces: usize,
    pub deletes: usize,
}

impl OperationCounts {
    /// Calls that change cluster state
    pub fn writes(&self) -> usize {
        self.creates + self.replaces + self.deletes
    }

    pub fn total(&self) -> usize {
        self.gets + self.writes()
    }
}

type Journal = Arc<Mutex<Vec<MockCall>>>;

/// In-memory `ResourceApi` for one kind
#[derive(Clone)]
pub struct MockResourceApi<K> {
    /// Storage: (namespace, name) -> object
    store: Arc<RwLock<HashMap<(String, String), K>>>,
    /// Track operation counts for assertions
    operations: Arc<RwLock<OperationCounts>>,
    /// Status code returned for an operation instead of performing it
    failures: Arc<RwLock<HashMap<MockOperation, u16>>>,
    /// Calls across every mock sharing this journal
    journal: Journal,
    next_version: Arc<RwLock<u64>>,
}

impl<K: ManagedObject> MockResourceApi<K> {
    /// Create a new empty mock
    pub fn new() -> Self {
        Self::with_journal(Arc::new(Mutex::new(Vec::new())))
    }

    fn with_journal(journal: Journal) -> Self {
        Self {
            store: Arc::new(RwLock::new(HashMap::new())),
            operations: Arc::new(RwLock::new(OperationCounts::default())),
            failures: Arc::new(RwLock::new(HashMap::new())),
            journal,
            next_version: Arc::new(RwLock::new(1)),
        }
    }

    /// Store an object directly, bypassing counters and the journal
    pub fn insert(&self, namespace: &str, mut object: K) {
        let name = object.meta().name.clone().unwrap_or_default();
        object.meta_mut().namespace = Some(namespace.to_string());
        object.meta_mut().resource_version = Some(self.bump_version());
        self.store
            .write()
            .unwrap()
            .insert((namespace.to_string(), name), object);
    }

    /// Remove an object out of band, as if deleted by hand
    pub fn remove(&self, namespace: &str, name: &str) -> Option<K> {
        self.store
            .write()
            .unwrap()
            .remove(&(namespace.to_string(), name.to_string()))
    }

    /// Current stored object
    pub fn object(&self, namespace: &str, name: &str) -> Option<K> {
        self.store
            .read()
            .unwrap()
            .get(&(namespace.to_string(), name.to_string()))
            .cloned()
    }

    pub fn contains(&self, namespace: &str, name: &str) -> bool {
        self.object(namespace, name).is_some()
    }

    /// Count stored objects
    pub fn len(&self) -> usize {
        self.store.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Get operation counts for assertions
    pub fn operation_counts(&self) -> OperationCounts {
        self.operations.read().unwrap().clone()
    }

    /// Make every subsequent `operation` fail with HTTP status `code`
    pub fn fail_on(&self, operation: MockOperation, code: u16) {
        self.failures.write().unwrap().insert(operation, code);
    }

    pub fn clear_failures(&self) {
        self.failures.write().unwrap().clear();
    }

    fn bump_version(&self) -> String {
        let mut next = self.next_version.write().unwrap();
        let version = *next;
        *next += 1;
        version.to_string()
    }

    fn record(&self, operation: MockOperation, namespace: &str, name: &str) -> Result<()> {
        {
            let mut ops = self.operations.write().unwrap();
            match operation {
                MockOperation::Get => ops.gets += 1,
                MockOperation::Create => ops.creates += 1,
                MockOperation::Replace => ops.replaces += 1,
                MockOperation::Delete => ops.deletes += 1,
            }
        }
        self.journal.lock().unwrap().push(MockCall {
            kind: K::kind(&()).to_string(),
            operation,
            namespace: namespace.to_string(),
            name: name.to_string(),
        });

        match self.failures.read().unwrap().get(&operation) {
            Some(code) => Err(status_error(*code, "InjectedFailure", "injected failure")),
            None => Ok(()),
        }
    }

    fn not_found(name: &str) -> KubeError {
        status_error(
            404,
            "NotFound",
            &format!("{} \"{}\" not found", K::kind(&()), name),
        )
    }
}

impl<K: ManagedObject> Default for MockResourceApi<K> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<K: ManagedObject> ResourceApi<K> for MockResourceApi<K> {
    async fn get(&self, namespace: &str, name: &str) -> Result<K> {
        self.record(MockOperation::Get, namespace, name)?;
        self.object(namespace, name)
            .ok_or_else(|| Self::not_found(name))
    }

    async fn create(&self, namespace: &str, object: &K) -> Result<K> {
        let name = object.meta().name.clone().unwrap_or_default();
        self.record(MockOperation::Create, namespace, &name)?;

        let key = (namespace.to_string(), name.clone());
        if self.store.read().unwrap().contains_key(&key) {
            return Err(status_error(
                409,
                "AlreadyExists",
                &format!("{} \"{}\" already exists", K::kind(&()), name),
            ));
        }

        let mut created = object.clone();
        created.meta_mut().namespace = Some(namespace.to_string());
        created.meta_mut().resource_version = Some(self.bump_version());
        self.store.write().unwrap().insert(key, created.clone());
        Ok(created)
    }

    async fn replace(&self, namespace: &str, name: &str, object: &K) -> Result<K> {
        self.record(MockOperation::Replace, namespace, name)?;

        let key = (namespace.to_string(), name.to_string());
        if !self.store.read().unwrap().contains_key(&key) {
            return Err(Self::not_found(name));
        }

        let mut replaced = object.clone();
        replaced.meta_mut().namespace = Some(namespace.to_string());
        replaced.meta_mut().resource_version = Some(self.bump_version());
        self.store.write().unwrap().insert(key, replaced.clone());
        Ok(replaced)
    }

    async fn delete(&self, namespace: &str, name: &str) -> Result<()> {
        self.record(MockOperation::Delete, namespace, name)?;
        self.remove(namespace, name)
            .map(|_| ())
            .ok_or_else(|| Self::not_found(name))
    }
}

/// API status error as the server would return it
pub fn status_error(code: u16, reason: &str, message: &str) -> KubeError {
    KubeError::Api(kube::Error::Api(ErrorResponse {
        status: "Failure".to_string(),
        message: message.to_string(),
        reason: reason.to_string(),
        code,
    }))
}

/// Mocks for all four managed kinds sharing one call journal
#[derive(Clone)]
pub struct MockCluster {
    pub deployments: MockResourceApi<Deployment>,
    pub services: MockResourceApi<Service>,
    pub ingresses: MockResourceApi<Ingress>,
    pub volume_claims: MockResourceApi<PersistentVolumeClaim>,
    journal: Journal,
}

impl MockCluster {
    pub fn new() -> Self {
        let journal: Journal = Arc::new(Mutex::new(Vec::new()));
        Self {
            deployments: MockResourceApi::with_journal(journal.clone()),
            services: MockResourceApi::with_journal(journal.clone()),
            ingresses: MockResourceApi::with_journal(journal.clone()),
            volume_claims: MockResourceApi::with_journal(journal.clone()),
            journal,
        }
    }

    /// `ClusterApis` handing out these mocks
    pub fn apis(&self) -> ClusterApis {
        ClusterApis {
            deployments: Arc::new(self.deployments.clone()),
            services: Arc::new(self.services.clone()),
            ingresses: Arc::new(self.ingresses.clone()),
            volume_claims: Arc::new(self.volume_claims.clone()),
        }
    }

    /// Every call made so far, in order
    pub fn calls(&self) -> Vec<MockCall> {
        self.journal.lock().unwrap().clone()
    }

    /// Calls that change cluster state, as `(kind, operation)`
    pub fn writes(&self) -> Vec<(String, MockOperation)> {
        self.calls()
            .into_iter()
            .filter(|c| c.operation != MockOperation::Get)
            .map(|c| (c.kind, c.operation))
            .collect()
    }

    pub fn clear_calls(&self) {
        self.journal.lock().unwrap().clear();
    }

    /// Total stored objects across all kinds
    pub fn object_count(&self) -> usize {
        self.deployments.len()
            + self.services.len()
            + self.ingresses.len()
            + self.volume_claims.len()
    }
}

impl Default for MockCluster {
    fn default() -> Self {
        Self::new()
    }
}
