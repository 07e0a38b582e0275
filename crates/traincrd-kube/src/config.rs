//! Reconciliation and dispatch configuration
//!
//! Every field has a default, so an empty configuration document is valid.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{KubeError, Result};

/// Hostname of the single ingress rule created for every job
pub const DEFAULT_INGRESS_HOST: &str = "mt.10.10.184.25.nip.io";

/// Storage class of job volume claims
pub const DEFAULT_STORAGE_CLASS: &str = "cephfs";

/// Claim size used when a job does not declare a capacity
pub const DEFAULT_CAPACITY: &str = "1Gi";

/// Service account the workload pods run as
pub const DEFAULT_SERVICE_ACCOUNT: &str = "fission-fetcher";

/// Port exposed by the workload container, the service and the ingress backend
pub const HTTP_PORT: i32 = 8888;

/// Longest delay allowed between two reconcile attempts
pub const MAX_RETRY_DELAY: Duration = Duration::from_secs(3600);

/// Settings that shape the desired state of managed resources
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ReconcileConfig {
    /// Host of the ingress rule
    pub ingress_host: String,

    /// Storage class name for job volume claims
    pub storage_class: String,

    /// Claim size when the job has none
    pub default_capacity: String,

    /// Pod service account
    pub service_account: String,

    /// Shared claim mounted into every workload
    pub public_claim: SharedClaim,

    /// Shared library claim mounted into every workload
    pub libraries_claim: SharedClaim,

    /// Pod termination grace period
    #[serde(with = "humantime_serde")]
    pub termination_grace_period: Duration,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            ingress_host: DEFAULT_INGRESS_HOST.to_string(),
            storage_class: DEFAULT_STORAGE_CLASS.to_string(),
            default_capacity: DEFAULT_CAPACITY.to_string(),
            service_account: DEFAULT_SERVICE_ACCOUNT.to_string(),
            public_claim: SharedClaim::new("public", "/public"),
            libraries_claim: SharedClaim::new("libraries", "/libraries"),
            termination_grace_period: Duration::from_secs(60),
        }
    }
}

impl ReconcileConfig {
    /// Reject settings that would produce unusable objects
    pub fn validate(&self) -> Result<()> {
        if self.ingress_host.is_empty() {
            return Err(KubeError::InvalidConfig("ingressHost must not be empty".to_string()));
        }
        if self.storage_class.is_empty() {
            return Err(KubeError::InvalidConfig("storageClass must not be empty".to_string()));
        }
        traincrd_core::parse_quantity("defaultCapacity", &self.default_capacity)?;
        if i64::try_from(self.termination_grace_period.as_secs()).is_err() {
            return Err(KubeError::InvalidConfig("terminationGracePeriod is too large".to_string()));
        }
        for claim in [&self.public_claim, &self.libraries_claim] {
            if claim.claim_name.is_empty() || !claim.mount_path.starts_with('/') {
                return Err(KubeError::InvalidConfig(format!(
                    "shared claim '{}' needs a name and an absolute mount path",
                    claim.claim_name
                )));
            }
        }
        Ok(())
    }
}

/// A pre-existing claim shared between all jobs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SharedClaim {
    pub claim_name: String,
    pub mount_path: String,
}

impl SharedClaim {
    pub fn new(claim_name: impl Into<String>, mount_path: impl Into<String>) -> Self {
        Self {
            claim_name: claim_name.into(),
            mount_path: mount_path.into(),
        }
    }
}

/// Work queue settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DispatcherConfig {
    /// Maximum number of jobs reconciled concurrently
    pub workers: usize,

    /// Retry policy for a failed reconcile
    pub retry: RetryConfig,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            retry: RetryConfig::default(),
        }
    }
}

/// Exponential backoff policy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RetryConfig {
    /// Maximum number of attempts per event, including the first one
    pub max_attempts: u32,

    /// Delay before the first retry
    #[serde(with = "humantime_serde")]
    pub initial_delay: Duration,

    /// Upper bound for a single delay
    #[serde(with = "humantime_serde")]
    pub max_delay: Duration,

    /// Multiplier applied to the delay after each failure
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
        }
    }
}

impl DispatcherConfig {
    pub fn validate(&self) -> Result<()> {
        if self.workers == 0 {
            return Err(KubeError::InvalidConfig("workers must be at least 1".to_string()));
        }
        self.retry.validate()
    }
}

impl RetryConfig {
    /// Config that gives up after the first failure
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Default::default()
        }
    }

    /// Delays must fit under `MAX_RETRY_DELAY` and never shrink between attempts
    pub fn validate(&self) -> Result<()> {
        if self.max_delay > MAX_RETRY_DELAY {
            return Err(KubeError::InvalidConfig(format!(
                "retry.maxDelay must not exceed {}s",
                MAX_RETRY_DELAY.as_secs()
            )));
        }
        if self.initial_delay > self.max_delay {
            return Err(KubeError::InvalidConfig(
                "retry.initialDelay must not exceed retry.maxDelay".to_string(),
            ));
        }
        if !self.backoff_multiplier.is_finite() || self.backoff_multiplier < 1.0 {
            return Err(KubeError::InvalidConfig(
                "retry.backoffMultiplier must be a finite number of at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
