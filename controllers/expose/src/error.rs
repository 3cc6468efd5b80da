//! Controller-specific error types.
//!
//! This module defines error types specific to the expose controller
//! that are not covered by upstream library errors.

use thiserror::Error;

/// Errors that can occur in the expose controller.
#[derive(Debug, Error)]
pub enum ControllerError {
    /// Kubernetes API error
    #[error("Kubernetes error: {0}")]
    Kube(#[from] kube::Error),

    /// Kubernetes API error carrying the object it concerns
    #[error("{context}: {source}")]
    Api {
        /// What was being attempted, including namespace/name
        context: String,
        #[source]
        source: kube::Error,
    },

    /// Queue key that cannot name a namespaced object
    #[error("malformed object key: {0}")]
    MalformedKey(String),

    /// Invalid configuration
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Resource watch failed
    #[error("resource watch failed: {0}")]
    Watch(String),
}

impl ControllerError {
    /// Wrap a Kubernetes API error with namespace/name context.
    pub(crate) fn api(context: impl Into<String>, source: kube::Error) -> Self {
        Self::Api {
            context: context.into(),
            source,
        }
    }
}

/// True when the error is the API's not-found response.
pub(crate) fn is_not_found(err: &kube::Error) -> bool {
    matches!(err, kube::Error::Api(resp) if resp.code == 404)
}
