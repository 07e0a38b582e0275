//! Traincrd Core - Core types for the training job controller
//!
//! This crate provides the foundational types used throughout the controller:
//! - `TrainJob`: The custom resource watched by the controller
//! - `JobSpec`: The translated, immutable view of a job used by reconciliation
//! - `JobKey`: Namespace/name identity of a job
//! - `quantity`: Kubernetes quantity grammar validation

pub mod crd;
pub mod error;
pub mod job;
pub mod quantity;

pub use crd::{CHANNEL_LABEL, TrainJob, TrainJobSpec, USERNAME_LABEL, crd_manifest};
pub use error::{CoreError, Result};
pub use job::{DEFAULT_REPLICAS, JobKey, JobSpec};
pub use quantity::parse_quantity;
