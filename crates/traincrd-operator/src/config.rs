//! Operator configuration file
//!
//! Every field is optional; an absent or empty file yields the defaults.
//!
//! ```yaml
//! namespace: research
//! reconcile:
//!   ingressHost: jobs.example.com
//!   terminationGracePeriod: 2m
//! dispatcher:
//!   workers: 8
//!   retry:
//!     maxAttempts: 3
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};
use traincrd_kube::{DispatcherConfig, ReconcileConfig};

use crate::error::{OperatorError, Result};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct OperatorConfig {
    /// Namespace to watch; all namespaces when unset
    pub namespace: Option<String>,

    pub reconcile: ReconcileConfig,

    pub dispatcher: DispatcherConfig,
}

impl OperatorConfig {
    /// Load from a YAML file
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| OperatorError::ConfigRead {
            path: path.to_path_buf(),
            source,
        })?;
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(&content).map_err(|source| OperatorError::ConfigParse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Command-line flags take precedence over the file
    pub fn with_overrides(mut self, namespace: Option<String>, workers: Option<usize>) -> Self {
        if namespace.is_some() {
            self.namespace = namespace;
        }
        if let Some(workers) = workers {
            self.dispatcher.workers = workers;
        }
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.dispatcher.workers == 0 {
            return Err(OperatorError::InvalidConfig {
                message: "dispatcher.workers must be at least 1".to_string(),
            });
        }
        if matches!(self.namespace.as_deref(), Some("")) {
            return Err(OperatorError::InvalidConfig {
                message: "namespace must not be empty".to_string(),
            });
        }
        self.reconcile
            .validate()
            .and_then(|()| self.dispatcher.validate())
            .map_err(|e| OperatorError::InvalidConfig {
                message: e.to_string(),
            })
    }
}
