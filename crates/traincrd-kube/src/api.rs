//! Typed access to the managed resource kinds
//!
//! `ResourceApi` is the seam between reconciliation and the cluster: the
//! engine only ever talks to it, so tests can swap in `MockResourceApi`.

use std::fmt::Debug;
use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;
use k8s_openapi::NamespaceResourceScope;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{PersistentVolumeClaim, Service};
use k8s_openapi::api::networking::v1::Ingress;
use kube::api::{Api, DeleteParams, PostParams};
use kube::{Client, Resource};
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::Result;

/// Field manager recorded on objects written by the controller
pub const FIELD_MANAGER: &str = "traincrd";

/// Bounds shared by every namespaced kind the controller manages
pub trait ManagedObject:
    Resource<Scope = NamespaceResourceScope, DynamicType = ()>
    + Clone
    + Debug
    + Serialize
    + DeserializeOwned
    + Send
    + Sync
    + 'static
{
}

impl<K> ManagedObject for K where
    K: Resource<Scope = NamespaceResourceScope, DynamicType = ()>
        + Clone
        + Debug
        + Serialize
        + DeserializeOwned
        + Send
        + Sync
        + 'static
{
}

/// get/create/replace/delete by name and namespace for one kind
///
/// Implementations must report absence as a 404 `kube::Error::Api`, so
/// `KubeError::is_not_found` works the same against every backend.
#[async_trait]
pub trait ResourceApi<K: ManagedObject>: Send + Sync {
    /// Fetch the current object
    async fn get(&self, namespace: &str, name: &str) -> Result<K>;

    /// Create a new object
    async fn create(&self, namespace: &str, object: &K) -> Result<K>;

    /// Replace an existing object wholesale
    async fn replace(&self, namespace: &str, name: &str, object: &K) -> Result<K>;

    /// Delete an object
    async fn delete(&self, namespace: &str, name: &str) -> Result<()>;
}

/// `ResourceApi` backed by the Kubernetes API server
pub struct KubeResourceApi<K> {
    client: Client,
    _kind: PhantomData<fn() -> K>,
}

impl<K: ManagedObject> KubeResourceApi<K> {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            _kind: PhantomData,
        }
    }

    fn api(&self, namespace: &str) -> Api<K> {
        Api::namespaced(self.client.clone(), namespace)
    }

    fn post_params() -> PostParams {
        PostParams {
            dry_run: false,
            field_manager: Some(FIELD_MANAGER.to_string()),
        }
    }
}

#[async_trait]
impl<K: ManagedObject> ResourceApi<K> for KubeResourceApi<K> {
    async fn get(&self, namespace: &str, name: &str) -> Result<K> {
        Ok(self.api(namespace).get(name).await?)
    }

    async fn create(&self, namespace: &str, object: &K) -> Result<K> {
        Ok(self.api(namespace).create(&Self::post_params(), object).await?)
    }

    async fn replace(&self, namespace: &str, name: &str, object: &K) -> Result<K> {
        Ok(self
            .api(namespace)
            .replace(name, &Self::post_params(), object)
            .await?)
    }

    async fn delete(&self, namespace: &str, name: &str) -> Result<()> {
        self.api(namespace)
            .delete(name, &DeleteParams::default())
            .await?;
        Ok(())
    }
}

/// One `ResourceApi` per managed kind
#[derive(Clone)]
pub struct ClusterApis {
    pub deployments: Arc<dyn ResourceApi<Deployment>>,
    pub services: Arc<dyn ResourceApi<Service>>,
    pub ingresses: Arc<dyn ResourceApi<Ingress>>,
    pub volume_claims: Arc<dyn ResourceApi<PersistentVolumeClaim>>,
}

impl ClusterApis {
    /// APIs talking to the cluster through `client`
    pub fn from_client(client: Client) -> Self {
        Self {
            deployments: Arc::new(KubeResourceApi::new(client.clone())),
            services: Arc::new(KubeResourceApi::new(client.clone())),
            ingresses: Arc::new(KubeResourceApi::new(client.clone())),
            volume_claims: Arc::new(KubeResourceApi::new(client)),
        }
    }
}
