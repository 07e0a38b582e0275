//! Reconciliation of a training job against its four managed resources
//!
//! - **Add**: create-or-get Deployment, Service, Ingress, VolumeClaim in that
//!   order, stopping at the first error. Nothing already created is rolled back.
//! - **Update**: only the Deployment is touched, and only when image or
//!   cpu/memory limits/requests changed.
//! - **Delete**: delete in the same order. A resource that is already gone is
//!   recorded as `Absent` and teardown continues; any other error stops it.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{PersistentVolumeClaim, Service};
use k8s_openapi::api::networking::v1::Ingress;
use kube::ResourceExt;
use tracing::{debug, info, instrument};
use traincrd_core::{JobKey, JobSpec, TrainJob};

use crate::api::ClusterApis;
use crate::config::ReconcileConfig;
use crate::dispatcher::Reconciler;
use crate::error::{KubeError, Operation, ReconcileError};
use crate::event::JobEvent;
use crate::managed::{ManagedResource, Manager, ResourceKind};

/// What happened to one managed resource
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepStatus {
    /// Did not exist and was created
    Created,
    /// Already existed and was left untouched
    Existing,
    /// Replaced from the new spec
    Updated,
    Deleted,
    /// Already gone at teardown
    Absent,
}

impl fmt::Display for StepStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            StepStatus::Created => "created",
            StepStatus::Existing => "existing",
            StepStatus::Updated => "updated",
            StepStatus::Deleted => "deleted",
            StepStatus::Absent => "absent",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepResult {
    pub kind: ResourceKind,
    pub status: StepStatus,
}

/// Successful reconciliation of one event
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcileOutcome {
    pub key: JobKey,
    /// Steps in the order they ran; empty when nothing had to be done
    pub steps: Vec<StepResult>,
}

impl ReconcileOutcome {
    pub fn new(key: JobKey) -> Self {
        Self {
            key,
            steps: Vec::new(),
        }
    }

    fn push(&mut self, kind: ResourceKind, status: StepStatus) {
        self.steps.push(StepResult { kind, status });
    }

    /// Whether the event required no action
    pub fn is_noop(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn status_of(&self, kind: ResourceKind) -> Option<StepStatus> {
        self.steps.iter().find(|s| s.kind == kind).map(|s| s.status)
    }

    /// Format as human-readable summary
    pub fn summary(&self) -> String {
        if self.steps.is_empty() {
            return "no changes".to_string();
        }
        self.steps
            .iter()
            .map(|s| format!("{} {}", s.kind, s.status))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// Drives the four managers for add, update and delete events
#[derive(Clone)]
pub struct ReconcileEngine {
    deployments: Manager<Deployment>,
    services: Manager<Service>,
    ingresses: Manager<Ingress>,
    volume_claims: Manager<PersistentVolumeClaim>,
}

impl ReconcileEngine {
    pub fn new(apis: ClusterApis, config: ReconcileConfig) -> Self {
        let config = Arc::new(config);
        Self {
            deployments: Manager::new(apis.deployments, config.clone()),
            services: Manager::new(apis.services, config.clone()),
            ingresses: Manager::new(apis.ingresses, config.clone()),
            volume_claims: Manager::new(apis.volume_claims, config),
        }
    }

    /// Engine talking to the cluster through `client`
    pub fn with_client(client: kube::Client, config: ReconcileConfig) -> Self {
        Self::new(ClusterApis::from_client(client), config)
    }

    /// Managers in creation/teardown order
    fn ordered(&self) -> [&dyn ManagedResource; 4] {
        [
            &self.deployments,
            &self.services,
            &self.ingresses,
            &self.volume_claims,
        ]
    }

    #[instrument(skip(self, job), fields(job = %job.name_any()))]
    pub async fn on_add(&self, job: &TrainJob) -> Result<ReconcileOutcome, ReconcileError> {
        let spec = JobSpec::from_resource(job)?;
        info!(%spec, "adding training job");
        self.create(&spec).await
    }

    #[instrument(skip(self, old, new), fields(job = %new.name_any()))]
    pub async fn on_update(
        &self,
        old: &TrainJob,
        new: &TrainJob,
    ) -> Result<ReconcileOutcome, ReconcileError> {
        let old = JobSpec::from_resource(old)?;
        let new = JobSpec::from_resource(new)?;
        self.update(&old, &new).await
    }

    #[instrument(skip(self, job), fields(job = %job.name_any()))]
    pub async fn on_delete(&self, job: &TrainJob) -> Result<ReconcileOutcome, ReconcileError> {
        let spec = JobSpec::from_resource(job)?;
        info!(%spec, "deleting training job");
        self.teardown(&spec).await
    }

    /// Create-or-get every managed resource, stopping at the first error
    pub async fn create(&self, spec: &JobSpec) -> Result<ReconcileOutcome, ReconcileError> {
        let mut outcome = ReconcileOutcome::new(spec.key());

        for resource in self.ordered() {
            let applied = resource
                .apply(spec)
                .await
                .map_err(|source| step_error(Operation::Create, resource.kind(), spec, source))?;
            let status = if applied.created {
                StepStatus::Created
            } else {
                StepStatus::Existing
            };
            outcome.push(resource.kind(), status);
        }

        Ok(outcome)
    }

    /// Replace the Deployment if a watched field changed between `old` and `new`
    ///
    /// Service, Ingress and VolumeClaim are never touched on update.
    pub async fn update(
        &self,
        old: &JobSpec,
        new: &JobSpec,
    ) -> Result<ReconcileOutcome, ReconcileError> {
        let mut outcome = ReconcileOutcome::new(new.key());

        if !old.deployment_changed(new) {
            debug!(job = %new.key(), "no watched field changed, skipping update");
            return Ok(outcome);
        }

        info!(from = %old, to = %new, "updating training job");
        let applied = self
            .deployments
            .update(old, new)
            .await
            .map_err(|source| {
                step_error(Operation::Update, ResourceKind::Deployment, new, source)
            })?;
        let status = if applied.created {
            StepStatus::Created
        } else {
            StepStatus::Updated
        };
        outcome.push(ResourceKind::Deployment, status);

        Ok(outcome)
    }

    /// Delete every managed resource, continuing past ones already gone
    pub async fn teardown(&self, spec: &JobSpec) -> Result<ReconcileOutcome, ReconcileError> {
        let mut outcome = ReconcileOutcome::new(spec.key());

        for resource in self.ordered() {
            match resource.remove(&spec.name, &spec.namespace).await {
                Ok(()) => outcome.push(resource.kind(), StepStatus::Deleted),
                Err(e) if e.is_not_found() => {
                    debug!(kind = %resource.kind(), job = %spec.key(), "already gone");
                    outcome.push(resource.kind(), StepStatus::Absent);
                }
                Err(source) => {
                    return Err(step_error(Operation::Delete, resource.kind(), spec, source));
                }
            }
        }

        Ok(outcome)
    }
}

fn step_error(
    operation: Operation,
    kind: ResourceKind,
    spec: &JobSpec,
    source: KubeError,
) -> ReconcileError {
    ReconcileError::Step {
        operation,
        kind,
        name: spec.name.clone(),
        namespace: spec.namespace.clone(),
        source,
    }
}

#[async_trait]
impl Reconciler for ReconcileEngine {
    async fn reconcile(&self, event: &JobEvent) -> Result<ReconcileOutcome, ReconcileError> {
        match event {
            JobEvent::Added(job) => self.on_add(job).await,
            JobEvent::Updated { old, new } => self.on_update(old, new).await,
            JobEvent::Deleted(job) => self.on_delete(job).await,
        }
    }
}
