//! Translation from a `TrainJob` snapshot to the `JobSpec` used by reconciliation

use std::collections::BTreeMap;
use std::fmt;

use kube::ResourceExt;
use serde::{Deserialize, Serialize};

use crate::crd::{CHANNEL_LABEL, TrainJob, USERNAME_LABEL};
use crate::error::{CoreError, Result};

/// Replica count used when the resource does not specify one
pub const DEFAULT_REPLICAS: i32 = 1;

/// Identity of a job: the namespace and name shared by all of its managed resources
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct JobKey {
    pub namespace: String,
    pub name: String,
}

impl JobKey {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// Key of a resource snapshot, if it carries both name and namespace
    pub fn of(job: &TrainJob) -> Option<Self> {
        Some(Self::new(job.metadata.namespace.clone()?, job.metadata.name.clone()?))
    }
}

impl fmt::Display for JobKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// Immutable view of a training job for one reconciliation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobSpec {
    /// Shared name of the job and of every managed resource
    pub name: String,
    pub namespace: String,
    pub username: String,
    pub channel: String,
    pub image: String,
    /// CPU limit
    pub cpu: String,
    /// CPU request
    pub req_cpu: String,
    /// Memory limit
    pub memory: String,
    /// Memory request
    pub req_memory: String,
    pub replicas: i32,
    /// Volume claim size; the claim builder falls back to its configured default
    pub capacity: Option<String>,
}

impl JobSpec {
    /// Translate a resource snapshot
    ///
    /// Only name and namespace are required. Missing `username`/`channel`
    /// labels translate to empty strings.
    pub fn from_resource(job: &TrainJob) -> Result<Self> {
        let name = job
            .metadata
            .name
            .clone()
            .ok_or_else(|| CoreError::MissingField {
                field: "metadata.name".to_string(),
            })?;
        let namespace = job
            .metadata
            .namespace
            .clone()
            .ok_or_else(|| CoreError::MissingField {
                field: "metadata.namespace".to_string(),
            })?;
        let labels = job.labels();
        let label = |key: &str| labels.get(key).cloned().unwrap_or_default();

        Ok(Self {
            name,
            namespace,
            username: label(USERNAME_LABEL),
            channel: label(CHANNEL_LABEL),
            image: job.spec.image.clone(),
            cpu: job.spec.cpu.clone(),
            req_cpu: job.spec.req_cpu.clone(),
            memory: job.spec.memory.clone(),
            req_memory: job.spec.req_memory.clone(),
            replicas: job.spec.replicas.unwrap_or(DEFAULT_REPLICAS),
            capacity: job.spec.capacity.clone(),
        })
    }

    pub fn key(&self) -> JobKey {
        JobKey::new(&self.namespace, &self.name)
    }

    /// Working directory of the job inside its volume: `/{channel}/{username}/{name}/`
    pub fn work_dir(&self) -> String {
        format!("/{}/{}/{}/", self.channel, self.username, self.name)
    }

    /// Labels shared by every managed resource; also the service selector
    pub fn labels(&self) -> BTreeMap<String, String> {
        BTreeMap::from([
            ("app".to_string(), self.name.clone()),
            (USERNAME_LABEL.to_string(), self.username.clone()),
            (CHANNEL_LABEL.to_string(), self.channel.clone()),
        ])
    }

    /// Whether moving from `self` to `newer` requires the workload to be replaced
    ///
    /// Only image and resource limits/requests are watched. Replica count,
    /// capacity, username and channel changes do not trigger an update.
    pub fn deployment_changed(&self, newer: &JobSpec) -> bool {
        self.image != newer.image
            || self.cpu != newer.cpu
            || self.req_cpu != newer.req_cpu
            || self.memory != newer.memory
            || self.req_memory != newer.req_memory
    }
}

impl fmt::Display for JobSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "name: {}, username: {}, channel: {}, ns: {}, image: {}, cpu: {}, reqcpu: {}, mem: {}, reqmem: {}",
            self.name,
            self.username,
            self.channel,
            self.namespace,
            self.image,
            self.cpu,
            self.req_cpu,
            self.memory,
            self.req_memory
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::TrainJobSpec;

    fn train_job() -> TrainJob {
        let mut job = TrainJob::new(
            "alice-nlp",
            TrainJobSpec {
                image: "reg/img:v1".to_string(),
                cpu: "2".to_string(),
                memory: "4Gi".to_string(),
                req_cpu: "500m".to_string(),
                req_memory: "1Gi".to_string(),
                replicas: Some(2),
                capacity: Some("20Gi".to_string()),
            },
        );
        job.metadata.namespace = Some("ns1".to_string());
        job.metadata.labels = Some(BTreeMap::from([
            ("username".to_string(), "alice".to_string()),
            ("channel".to_string(), "research".to_string()),
        ]));
        job
    }

    #[test]
    fn test_from_resource() {
        let spec = JobSpec::from_resource(&train_job()).unwrap();

        assert_eq!(spec.name, "alice-nlp");
        assert_eq!(spec.namespace, "ns1");
        assert_eq!(spec.username, "alice");
        assert_eq!(spec.channel, "research");
        assert_eq!(spec.image, "reg/img:v1");
        assert_eq!(spec.cpu, "2");
        assert_eq!(spec.req_cpu, "500m");
        assert_eq!(spec.memory, "4Gi");
        assert_eq!(spec.req_memory, "1Gi");
        assert_eq!(spec.replicas, 2);
        assert_eq!(spec.capacity.as_deref(), Some("20Gi"));
        assert_eq!(spec.key(), JobKey::new("ns1", "alice-nlp"));
    }

    #[test]
    fn test_work_dir() {
        let spec = JobSpec::from_resource(&train_job()).unwrap();
        assert_eq!(spec.work_dir(), "/research/alice/alice-nlp/");

        let cases = [("a", "b", "c"), ("prod", "bob", "bob-cv"), ("x-1", "u_2", "n.3")];
        for (channel, username, name) in cases {
            let spec = JobSpec {
                channel: channel.to_string(),
                username: username.to_string(),
                name: name.to_string(),
                ..spec.clone()
            };
            assert_eq!(spec.work_dir(), format!("/{channel}/{username}/{name}/"));
        }
    }

    #[test]
    fn test_labels() {
        let spec = JobSpec::from_resource(&train_job()).unwrap();
        let labels = spec.labels();

        assert_eq!(labels.len(), 3);
        assert_eq!(labels.get("app"), Some(&"alice-nlp".to_string()));
        assert_eq!(labels.get("username"), Some(&"alice".to_string()));
        assert_eq!(labels.get("channel"), Some(&"research".to_string()));
    }

    #[test]
    fn test_missing_labels_are_empty() {
        let mut job = train_job();
        job.metadata.labels = None;

        let spec = JobSpec::from_resource(&job).unwrap();
        assert_eq!(spec.username, "");
        assert_eq!(spec.channel, "");
    }

    #[test]
    fn test_defaults_replicas() {
        let mut job = train_job();
        job.spec.replicas = None;
        job.spec.capacity = None;

        let spec = JobSpec::from_resource(&job).unwrap();
        assert_eq!(spec.replicas, DEFAULT_REPLICAS);
        assert_eq!(spec.capacity, None);
    }

    #[test]
    fn test_missing_namespace() {
        let mut job = train_job();
        job.metadata.namespace = None;

        let result = JobSpec::from_resource(&job);
        assert!(matches!(
            result,
            Err(CoreError::MissingField { field }) if field == "metadata.namespace"
        ));
        assert_eq!(JobKey::of(&job), None);
    }

    #[test]
    fn test_deployment_changed_ignores_replicas_and_capacity() {
        let old = JobSpec::from_resource(&train_job()).unwrap();

        let new = JobSpec {
            replicas: 4,
            capacity: Some("50Gi".to_string()),
            username: "bob".to_string(),
            channel: "prod".to_string(),
            ..old.clone()
        };
        assert!(!old.deployment_changed(&new));
        assert!(!old.deployment_changed(&old));
    }

    #[test]
    fn test_deployment_changed_on_watched_fields() {
        let old = JobSpec::from_resource(&train_job()).unwrap();

        let changes = [
            JobSpec {
                image: "reg/img:v2".to_string(),
                ..old.clone()
            },
            JobSpec {
                cpu: "4".to_string(),
                ..old.clone()
            },
            JobSpec {
                req_cpu: "1".to_string(),
                ..old.clone()
            },
            JobSpec {
                memory: "8Gi".to_string(),
                ..old.clone()
            },
            JobSpec {
                req_memory: "2Gi".to_string(),
                ..old.clone()
            },
        ];
        for new in &changes {
            assert!(old.deployment_changed(new), "expected change for {new}");
        }
    }

    #[test]
    fn test_display() {
        let spec = JobSpec::from_resource(&train_job()).unwrap();
        insta::assert_snapshot!(
            spec.to_string(),
            @"name: alice-nlp, username: alice, channel: research, ns: ns1, image: reg/img:v1, cpu: 2, reqcpu: 500m, mem: 4Gi, reqmem: 1Gi"
        );
        assert_eq!(spec.key().to_string(), "ns1/alice-nlp");
    }
}
