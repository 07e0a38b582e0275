//! The `TrainJob` custom resource

use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
use kube::{CustomResource, CustomResourceExt};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Desired state of a training job
///
/// Resource strings follow the Kubernetes quantity grammar (`"500m"`, `"4Gi"`).
/// They are validated when the workload is built, not when the resource is read.
#[derive(CustomResource, Debug, Clone, Default, Serialize, Deserialize, JsonSchema, PartialEq)]
#[kube(
    group = "train.decision.io",
    version = "v1",
    kind = "TrainJob",
    plural = "trainjobs",
    shortname = "tj",
    namespaced,
    printcolumn = r#"{"name":"Image", "type":"string", "jsonPath":".spec.image"}"#,
    printcolumn = r#"{"name":"Replicas", "type":"integer", "jsonPath":".spec.replicas"}"#,
    printcolumn = r#"{"name":"Age", "type":"date", "jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct TrainJobSpec {
    /// Container image
    pub image: String,

    /// CPU limit
    pub cpu: String,

    /// Memory limit
    pub memory: String,

    /// CPU request
    pub req_cpu: String,

    /// Memory request
    pub req_memory: String,

    /// Number of pods (defaults to 1)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replicas: Option<i32>,

    /// Size of the job's volume claim
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capacity: Option<String>,
}

/// Label carrying the owning user of a job
pub const USERNAME_LABEL: &str = "username";

/// Label carrying the channel a job belongs to
pub const CHANNEL_LABEL: &str = "channel";

/// CustomResourceDefinition to install before starting the controller
pub fn crd_manifest() -> CustomResourceDefinition {
    TrainJob::crd()
}
