//! Operator error types

use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

/// Errors that stop the operator before or while it runs
#[derive(Error, Debug, Diagnostic)]
pub enum OperatorError {
    /// Configuration file could not be read
    #[error("Failed to read configuration file {}", path.display())]
    #[diagnostic(code(traincrd::config::read))]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Configuration file is not valid YAML for `OperatorConfig`
    #[error("Failed to parse configuration file {}", path.display())]
    #[diagnostic(
        code(traincrd::config::parse),
        help("keys are camelCase, e.g. `dispatcher.workers` or `reconcile.ingressHost`")
    )]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// Configuration parsed but holds unusable values
    #[error("Invalid configuration: {message}")]
    #[diagnostic(code(traincrd::config::invalid))]
    InvalidConfig { message: String },

    /// Log filter could not be built
    #[error("Invalid log filter '{filter}'")]
    #[diagnostic(
        code(traincrd::logging),
        help("use a level such as `info` or a directive such as `traincrd_kube=debug`")
    )]
    Logging { filter: String },

    /// No usable kubeconfig or in-cluster service account
    #[error("Failed to create Kubernetes client")]
    #[diagnostic(
        code(traincrd::client),
        help("set KUBECONFIG or run inside a pod with a service account")
    )]
    Client(#[source] kube::Error),

    /// The TrainJob resource cannot be listed
    #[error("Cannot list TrainJob resources")]
    #[diagnostic(
        code(traincrd::crd),
        help("install the CRD with `traincrd-operator --crd | kubectl apply -f -` and check RBAC")
    )]
    CrdUnavailable(#[source] kube::Error),

    /// CRD manifest could not be rendered
    #[error("Failed to render CRD manifest")]
    #[diagnostic(code(traincrd::crd::render))]
    Render(#[source] serde_yaml::Error),
}

pub type Result<T> = std::result::Result<T, OperatorError>;
