//! ClusterIP service in front of a job's workload

use k8s_openapi::api::core::v1::{Service, ServicePort, ServiceSpec};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use kube::api::ObjectMeta;
use traincrd_core::JobSpec;

use crate::config::{HTTP_PORT, ReconcileConfig};
use crate::error::Result;
use crate::managed::{DesiredState, ResourceKind};

/// Name of the service port
pub const PORT_NAME: &str = "http";

impl DesiredState for Service {
    const KIND: ResourceKind = ResourceKind::Service;

    fn desired_state(spec: &JobSpec, _config: &ReconcileConfig) -> Result<Self> {
        let labels = spec.labels();

        Ok(Service {
            metadata: ObjectMeta {
                name: Some(spec.name.clone()),
                namespace: Some(spec.namespace.clone()),
                labels: Some(labels.clone()),
                ..Default::default()
            },
            spec: Some(ServiceSpec {
                type_: Some("ClusterIP".to_string()),
                selector: Some(labels),
                ports: Some(vec![ServicePort {
                    name: Some(PORT_NAME.to_string()),
                    port: HTTP_PORT,
                    target_port: Some(IntOrString::Int(HTTP_PORT)),
                    ..Default::default()
                }]),
                ..Default::default()
            }),
            ..Default::default()
        })
    }
}
