//! Ingress route `/{job name}` on the shared host

use k8s_openapi::api::networking::v1::{
    HTTPIngressPath, HTTPIngressRuleValue, Ingress, IngressBackend, IngressRule,
    IngressServiceBackend, IngressSpec, ServiceBackendPort,
};
use kube::api::ObjectMeta;
use traincrd_core::JobSpec;

use crate::config::{HTTP_PORT, ReconcileConfig};
use crate::error::Result;
use crate::managed::{DesiredState, ResourceKind};

/// Path matching used for the job route
pub const PATH_TYPE: &str = "Prefix";

impl DesiredState for Ingress {
    const KIND: ResourceKind = ResourceKind::Ingress;

    // The namespace comes from the API the object is created through, not from
    // its metadata.
    fn desired_state(spec: &JobSpec, config: &ReconcileConfig) -> Result<Self> {
        let path = HTTPIngressPath {
            path: Some(format!("/{}", spec.name)),
            path_type: PATH_TYPE.to_string(),
            backend: IngressBackend {
                service: Some(IngressServiceBackend {
                    name: spec.name.clone(),
                    port: Some(ServiceBackendPort {
                        number: Some(HTTP_PORT),
                        ..Default::default()
                    }),
                }),
                ..Default::default()
            },
        };

        Ok(Ingress {
            metadata: ObjectMeta {
                name: Some(spec.name.clone()),
                labels: Some(spec.labels()),
                ..Default::default()
            },
            spec: Some(IngressSpec {
                rules: Some(vec![IngressRule {
                    host: Some(config.ingress_host.clone()),
                    http: Some(HTTPIngressRuleValue { paths: vec![path] }),
                }]),
                ..Default::default()
            }),
            ..Default::default()
        })
    }
}
