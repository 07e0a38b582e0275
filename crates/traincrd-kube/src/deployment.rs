//! Workload for a training job
//!
//! One Deployment per job, named after it, running the job image with its
//! own claim mounted at the job's work directory and the two shared claims
//! mounted next to it.

use std::collections::BTreeMap;

use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec};
use k8s_openapi::api::core::v1::{
    Container, ContainerPort, EnvVar, PersistentVolumeClaimVolumeSource, PodSpec,
    PodTemplateSpec, ResourceRequirements, Volume, VolumeMount,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;
use kube::api::ObjectMeta;
use tracing::info;
use traincrd_core::{JobSpec, parse_quantity};

use crate::config::{HTTP_PORT, ReconcileConfig};
use crate::error::{KubeError, Result};
use crate::managed::{Applied, DesiredState, Manager, ResourceKind};

/// Name of the container port
pub const PORT_NAME: &str = "http-env";

/// Image pull policy of the job container
pub const PULL_POLICY: &str = "Always";

const WORK_DIR_VOLUME: &str = "work-dir";
const PUBLIC_VOLUME: &str = "public";
const LIBRARIES_VOLUME: &str = "libraries";

impl DesiredState for Deployment {
    const KIND: ResourceKind = ResourceKind::Deployment;

    fn desired_state(spec: &JobSpec, config: &ReconcileConfig) -> Result<Self> {
        let labels = spec.labels();
        let resources = container_resources(spec)?;
        let work_dir = spec.work_dir();
        let grace_period = i64::try_from(config.termination_grace_period.as_secs()).map_err(|_| {
            KubeError::InvalidConfig("terminationGracePeriod is too large".to_string())
        })?;

        let container = Container {
            name: spec.name.clone(),
            image: Some(spec.image.clone()),
            image_pull_policy: Some(PULL_POLICY.to_string()),
            resources: Some(resources),
            env: Some(vec![
                env("NAME", &spec.name),
                env("BASE_DIR", &spec.name),
                env("WORK_DIR", &work_dir),
            ]),
            ports: Some(vec![ContainerPort {
                name: Some(PORT_NAME.to_string()),
                container_port: HTTP_PORT,
                ..Default::default()
            }]),
            volume_mounts: Some(vec![
                mount(WORK_DIR_VOLUME, &work_dir),
                mount(PUBLIC_VOLUME, &config.public_claim.mount_path),
                mount(LIBRARIES_VOLUME, &config.libraries_claim.mount_path),
            ]),
            ..Default::default()
        };

        Ok(Deployment {
            metadata: ObjectMeta {
                name: Some(spec.name.clone()),
                namespace: Some(spec.namespace.clone()),
                labels: Some(labels.clone()),
                ..Default::default()
            },
            spec: Some(DeploymentSpec {
                replicas: Some(spec.replicas),
                selector: LabelSelector {
                    match_labels: Some(labels.clone()),
                    ..Default::default()
                },
                template: PodTemplateSpec {
                    metadata: Some(ObjectMeta {
                        labels: Some(labels),
                        ..Default::default()
                    }),
                    spec: Some(PodSpec {
                        containers: vec![container],
                        volumes: Some(vec![
                            claim_volume(WORK_DIR_VOLUME, &spec.name),
                            claim_volume(PUBLIC_VOLUME, &config.public_claim.claim_name),
                            claim_volume(LIBRARIES_VOLUME, &config.libraries_claim.claim_name),
                        ]),
                        service_account_name: Some(config.service_account.clone()),
                        termination_grace_period_seconds: Some(grace_period),
                        ..Default::default()
                    }),
                },
                ..Default::default()
            }),
            ..Default::default()
        })
    }
}

/// Requests and limits from the job's cpu/memory strings
///
/// Any malformed value aborts construction of the whole object.
fn container_resources(spec: &JobSpec) -> Result<ResourceRequirements> {
    let requests = BTreeMap::from([
        ("cpu".to_string(), parse_quantity("reqCpu", &spec.req_cpu)?),
        ("memory".to_string(), parse_quantity("reqMemory", &spec.req_memory)?),
    ]);
    let limits = BTreeMap::from([
        ("cpu".to_string(), parse_quantity("cpu", &spec.cpu)?),
        ("memory".to_string(), parse_quantity("memory", &spec.memory)?),
    ]);

    Ok(ResourceRequirements {
        requests: Some(requests),
        limits: Some(limits),
        ..Default::default()
    })
}

fn env(name: &str, value: &str) -> EnvVar {
    EnvVar {
        name: name.to_string(),
        value: Some(value.to_string()),
        ..Default::default()
    }
}

fn mount(volume: &str, path: &str) -> VolumeMount {
    VolumeMount {
        name: volume.to_string(),
        mount_path: path.to_string(),
        ..Default::default()
    }
}

fn claim_volume(volume: &str, claim: &str) -> Volume {
    Volume {
        name: volume.to_string(),
        persistent_volume_claim: Some(PersistentVolumeClaimVolumeSource {
            claim_name: claim.to_string(),
            ..Default::default()
        }),
        ..Default::default()
    }
}

impl Manager<Deployment> {
    /// Replace the workload with one built from `new`
    ///
    /// The object is rebuilt entirely from `new`; nothing is merged from the
    /// live object except its resourceVersion. A workload that was deleted by
    /// hand is recreated instead.
    pub async fn update(&self, old: &JobSpec, new: &JobSpec) -> Result<Applied<Deployment>> {
        let Some(existing) = self.current_state(&old.name, &old.namespace).await? else {
            info!(job = %new.key(), "deployment missing on update, recreating");
            return self.create_or_get(new).await;
        };

        let mut desired = Deployment::desired_state(new, self.config())?;
        desired.metadata.resource_version = existing.metadata.resource_version;

        let replaced = self
            .api()
            .replace(&new.namespace, &new.name, &desired)
            .await?;
        info!(job = %new.key(), image = %new.image, "deployment replaced");
        Ok(Applied {
            object: replaced,
            created: false,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockOperation, MockResourceApi};
    use std::sync::Arc;
    use std::time::Duration;
    use traincrd_core::CoreError;

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

    fn pod_spec(deployment: &Deployment) -> &PodSpec {
        deployment.spec.as_ref().unwrap().template.spec.as_ref().unwrap()
    }

    fn env_value<'a>(container: &'a Container, name: &str) -> Option<&'a str> {
        container
            .env
            .as_ref()?
            .iter()
            .find(|e| e.name == name)
            .and_then(|e| e.value.as_deref())
    }

    #[test]
    fn test_desired_state_shape() {
        let deployment = Deployment::desired_state(&spec(), &ReconcileConfig::default()).unwrap();
        let dep_spec = deployment.spec.as_ref().unwrap();

        assert_eq!(deployment.metadata.name.as_deref(), Some("alice-nlp"));
        assert_eq!(deployment.metadata.namespace.as_deref(), Some("ns1"));
        assert_eq!(dep_spec.replicas, Some(2));
        assert_eq!(dep_spec.selector.match_labels, Some(spec().labels()));
        assert_eq!(
            dep_spec.template.metadata.as_ref().unwrap().labels,
            Some(spec().labels())
        );

        let pod = pod_spec(&deployment);
        assert_eq!(pod.service_account_name.as_deref(), Some("fission-fetcher"));
        assert_eq!(pod.termination_grace_period_seconds, Some(60));
        assert_eq!(pod.containers.len(), 1);

        let container = &pod.containers[0];
        assert_eq!(container.name, "alice-nlp");
        assert_eq!(container.image.as_deref(), Some("reg/img:v1"));
        assert_eq!(container.image_pull_policy.as_deref(), Some("Always"));

        let port = &container.ports.as_ref().unwrap()[0];
        assert_eq!(port.container_port, 8888);
        assert_eq!(port.name.as_deref(), Some("http-env"));
    }

    #[test]
    fn test_environment() {
        let deployment = Deployment::desired_state(&spec(), &ReconcileConfig::default()).unwrap();
        let container = &pod_spec(&deployment).containers[0];

        assert_eq!(container.env.as_ref().unwrap().len(), 3);
        assert_eq!(env_value(container, "NAME"), Some("alice-nlp"));
        assert_eq!(env_value(container, "BASE_DIR"), Some("alice-nlp"));
        assert_eq!(env_value(container, "WORK_DIR"), Some("/research/alice/alice-nlp/"));
    }

    #[test]
    fn test_resources() {
        let deployment = Deployment::desired_state(&spec(), &ReconcileConfig::default()).unwrap();
        let resources = pod_spec(&deployment).containers[0].resources.clone().unwrap();

        let requests = resources.requests.unwrap();
        let limits = resources.limits.unwrap();
        assert_eq!(requests["cpu"].0, "500m");
        assert_eq!(requests["memory"].0, "1Gi");
        assert_eq!(limits["cpu"].0, "2");
        assert_eq!(limits["memory"].0, "4Gi");
    }

    #[test]
    fn test_volumes_and_mounts() {
        let deployment = Deployment::desired_state(&spec(), &ReconcileConfig::default()).unwrap();
        let pod = pod_spec(&deployment);

        let mounts: Vec<(&str, &str)> = pod.containers[0]
            .volume_mounts
            .as_ref()
            .unwrap()
            .iter()
            .map(|m| (m.name.as_str(), m.mount_path.as_str()))
            .collect();
        assert_eq!(
            mounts,
            vec![
                ("work-dir", "/research/alice/alice-nlp/"),
                ("public", "/public"),
                ("libraries", "/libraries"),
            ]
        );

        let claims: Vec<(&str, &str)> = pod
            .volumes
            .as_ref()
            .unwrap()
            .iter()
            .map(|v| {
                let claim = v.persistent_volume_claim.as_ref().unwrap();
                (v.name.as_str(), claim.claim_name.as_str())
            })
            .collect();
        assert_eq!(
            claims,
            vec![("work-dir", "alice-nlp"), ("public", "public"), ("libraries", "libraries")]
        );
    }

    #[test]
    fn test_malformed_quantity_aborts() {
        let bad = JobSpec {
            req_memory: "1 gig".to_string(),
            ..spec()
        };

        let err = Deployment::desired_state(&bad, &ReconcileConfig::default()).unwrap_err();
        assert!(matches!(
            err,
            KubeError::Core(CoreError::InvalidQuantity { ref field, .. }) if field == "reqMemory"
        ));
    }

    #[test]
    fn test_oversized_grace_period_is_rejected() {
        let config = ReconcileConfig {
            termination_grace_period: Duration::from_secs(u64::MAX),
            ..Default::default()
        };

        let err = Deployment::desired_state(&spec(), &config).unwrap_err();
        assert!(matches!(err, KubeError::InvalidConfig(_)));
    }

    fn manager(api: &MockResourceApi<Deployment>) -> Manager<Deployment> {
        Manager::new(Arc::new(api.clone()), Arc::new(ReconcileConfig::default()))
    }

    #[tokio::test]
    async fn test_update_replaces_whole_object() {
        let api = MockResourceApi::<Deployment>::new();
        let manager = manager(&api);
        manager.create_or_get(&spec()).await.unwrap();

        let new = JobSpec {
            image: "reg/img:v2".to_string(),
            replicas: 3,
            ..spec()
        };
        let updated = manager.update(&spec(), &new).await.unwrap();
        assert!(!updated.created);

        let stored = api.object("ns1", "alice-nlp").unwrap();
        let container = &pod_spec(&stored).containers[0];
        assert_eq!(container.image.as_deref(), Some("reg/img:v2"));
        assert_eq!(stored.spec.as_ref().unwrap().replicas, Some(3));
        assert_eq!(stored.metadata.labels, Some(spec().labels()));
        assert_eq!(api.operation_counts().replaces, 1);
    }

    #[tokio::test]
    async fn test_update_recreates_missing_deployment() {
        let api = MockResourceApi::<Deployment>::new();
        let new = JobSpec {
            image: "reg/img:v2".to_string(),
            ..spec()
        };

        let updated = manager(&api).update(&spec(), &new).await.unwrap();
        assert!(updated.created);
        assert_eq!(api.operation_counts().replaces, 0);
        assert_eq!(api.operation_counts().creates, 1);
    }

    #[tokio::test]
    async fn test_update_with_bad_quantity_leaves_object() {
        let api = MockResourceApi::<Deployment>::new();
        let manager = manager(&api);
        manager.create_or_get(&spec()).await.unwrap();

        let bad = JobSpec {
            cpu: "two".to_string(),
            ..spec()
        };
        assert!(manager.update(&spec(), &bad).await.is_err());
        assert_eq!(api.operation_counts().replaces, 0);
    }

    #[tokio::test]
    async fn test_update_propagates_replace_error() {
        let api = MockResourceApi::<Deployment>::new();
        let manager = manager(&api);
        manager.create_or_get(&spec()).await.unwrap();
        api.fail_on(MockOperation::Replace, 409);

        let err = manager.update(&spec(), &spec()).await.unwrap_err();
        assert!(err.is_conflict());
    }
}
