//! Read access to the watch-fed local object caches.
//!
//! The reconciler never lists or gets through the API server directly; it
//! reads the reflector stores that the watch streams keep fresh. The trait
//! seam lets unit tests substitute an in-memory cluster.

use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::Service;
use kube_runtime::reflector::{ObjectRef, Store};

use crate::error::ControllerError;

/// Read-only view of the cached cluster state.
pub trait ClusterCache: Send + Sync {
    /// Look up a deployment; `Ok(None)` means not found.
    fn get_deployment(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<Deployment>, ControllerError>;

    /// Look up a service; `Ok(None)` means not found.
    fn get_service(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<Service>, ControllerError>;
}

/// Reflector store pair for the two object kinds the controller reads.
#[derive(Clone)]
pub struct Stores {
    deployments: Store<Deployment>,
    services: Store<Service>,
}

impl Stores {
    pub fn new(deployments: Store<Deployment>, services: Store<Service>) -> Self {
        Self {
            deployments,
            services,
        }
    }

    /// Block until both stores have completed their initial listing.
    ///
    /// Fails only when a watch task dropped its writer, which means the
    /// initial sync can never complete.
    pub async fn wait_until_ready(&self) -> Result<(), ControllerError> {
        self.deployments
            .wait_until_ready()
            .await
            .map_err(|e| ControllerError::Watch(format!("deployment cache failed to sync: {e}")))?;
        self.services
            .wait_until_ready()
            .await
            .map_err(|e| ControllerError::Watch(format!("service cache failed to sync: {e}")))?;
        Ok(())
    }
}

impl ClusterCache for Stores {
    fn get_deployment(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<Deployment>, ControllerError> {
        let key = ObjectRef::new(name).within(namespace);
        Ok(self.deployments.get(&key).map(|obj| (*obj).clone()))
    }

    fn get_service(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<Service>, ControllerError> {
        let key = ObjectRef::new(name).within(namespace);
        Ok(self.services.get(&key).map(|obj| (*obj).clone()))
    }
}
