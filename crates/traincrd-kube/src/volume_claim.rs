//! Per-job persistent volume claim

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::{
    PersistentVolumeClaim, PersistentVolumeClaimSpec, VolumeResourceRequirements,
};
use kube::api::ObjectMeta;
use traincrd_core::{JobSpec, parse_quantity};

use crate::config::ReconcileConfig;
use crate::error::Result;
use crate::managed::{DesiredState, ResourceKind};

/// Legacy storage class annotation, set alongside `storageClassName`
pub const STORAGE_CLASS_ANNOTATION: &str = "volume.beta.kubernetes.io/storage-class";

/// Claims are shared by every replica of the job
pub const ACCESS_MODE: &str = "ReadWriteMany";

impl DesiredState for PersistentVolumeClaim {
    const KIND: ResourceKind = ResourceKind::VolumeClaim;

    fn desired_state(spec: &JobSpec, config: &ReconcileConfig) -> Result<Self> {
        let capacity = match spec.capacity.as_deref() {
            Some(capacity) if !capacity.is_empty() => capacity,
            _ => config.default_capacity.as_str(),
        };
        let storage = parse_quantity("capacity", capacity)?;

        Ok(PersistentVolumeClaim {
            metadata: ObjectMeta {
                name: Some(spec.name.clone()),
                namespace: Some(spec.namespace.clone()),
                labels: Some(spec.labels()),
                annotations: Some(BTreeMap::from([(
                    STORAGE_CLASS_ANNOTATION.to_string(),
                    config.storage_class.clone(),
                )])),
                ..Default::default()
            },
            spec: Some(PersistentVolumeClaimSpec {
                access_modes: Some(vec![ACCESS_MODE.to_string()]),
                storage_class_name: Some(config.storage_class.clone()),
                resources: Some(VolumeResourceRequirements {
                    requests: Some(BTreeMap::from([("storage".to_string(), storage)])),
                    ..Default::default()
                }),
                ..Default::default()
            }),
            ..Default::default()
        })
    }
}
