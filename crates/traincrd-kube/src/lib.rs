//! Traincrd Kube - Kubernetes reconciliation for training jobs
//!
//! This crate provides:
//! - **Managed resources**: Deployment, Service, Ingress and VolumeClaim built from a `JobSpec`
//! - **Reconcile engine**: ordered create, gated update and teardown for each job event
//! - **Informer**: the `TrainJob` watch turned into add/update/delete events
//! - **Dispatcher**: per-job ordered work queue with bounded concurrency and retries
//! - **Mock cluster**: in-memory `ResourceApi` for tests

pub mod api;
pub mod config;
pub mod deployment;
pub mod dispatcher;
pub mod engine;
pub mod error;
pub mod event;
pub mod informer;
pub mod ingress;
pub mod managed;
pub mod mock;
pub mod retry;
pub mod service;
pub mod volume_claim;

pub use api::{ClusterApis, FIELD_MANAGER, KubeResourceApi, ManagedObject, ResourceApi};
pub use config::{DispatcherConfig, ReconcileConfig, RetryConfig, SharedClaim};
pub use dispatcher::{DispatchStats, EventDispatcher, Reconciler};
pub use engine::{ReconcileEngine, ReconcileOutcome, StepResult, StepStatus};
pub use error::{KubeError, Operation, ReconcileError, Result};
pub use event::JobEvent;
pub use informer::{InformerCache, job_events};
pub use managed::{Applied, ApplyResult, DesiredState, ManagedResource, Manager, ResourceKind};
pub use mock::{MockCluster, MockOperation, MockResourceApi, OperationCounts};
pub use retry::retry_with_backoff;
