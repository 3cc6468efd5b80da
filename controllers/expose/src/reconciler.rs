//! Reconciliation logic for deployment exposure.
//!
//! One `sync` pass per queue key: read current state from the caches, decide
//! whether the exposure Service must be created, updated, or deleted, and
//! issue exactly the mutations needed. Every step is idempotent, so a pass
//! interrupted at any point is simply repeated from scratch on retry.

use std::collections::BTreeMap;

use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{Service, ServicePort, ServiceSpec};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use tracing::{debug, info, warn};

use crate::client::ServiceClient;
use crate::error::{is_not_found, ControllerError};
use crate::key::ObjectKey;
use crate::store::ClusterCache;

/// Suffix appended to a deployment name to form its exposure service name.
pub const EXPOSE_SUFFIX: &str = "-expose";

const PORT_NAME: &str = "http";
const PORT: i32 = 80;

/// Converges one exposure Service per deployment.
pub struct Reconciler<C, S> {
    cache: C,
    services: S,
}

impl<C, S> Reconciler<C, S>
where
    C: ClusterCache,
    S: ServiceClient,
{
    pub fn new(cache: C, services: S) -> Self {
        Self { cache, services }
    }

    /// Converge the exposure service for one deployment key.
    ///
    /// Reads go through the cache, so a pass always acts on the current
    /// observed state rather than on whatever event triggered it.
    pub async fn sync(&self, key: &ObjectKey) -> Result<(), ControllerError> {
        if !key.is_well_formed() {
            return Err(ControllerError::MalformedKey(key.to_string()));
        }
        let namespace = &key.namespace;
        let service_name = format!("{}{}", key.name, EXPOSE_SUFFIX);

        let Some(deployment) = self.cache.get_deployment(namespace, &key.name)? else {
            info!(
                "Deployment {} deleted, cleaning up service {}/{}",
                key, namespace, service_name
            );
            return self.remove_service(namespace, &service_name).await;
        };

        let existing = self.cache.get_service(namespace, &service_name)?;

        let Some(desired) = desired_service(namespace, &service_name, &deployment) else {
            warn!("Deployment {} has no pod template labels, cannot expose it", key);
            return Ok(());
        };

        match existing {
            None => self.create_service(namespace, &service_name, &desired).await,
            Some(current) => {
                if specs_match(&current, &desired) {
                    debug!("Service {}/{} already up to date", namespace, service_name);
                    Ok(())
                } else {
                    info!("Service {}/{} requires update", namespace, service_name);
                    self.update_service(namespace, &service_name, current, desired)
                        .await
                }
            }
        }
    }

    async fn create_service(
        &self,
        namespace: &str,
        name: &str,
        desired: &Service,
    ) -> Result<(), ControllerError> {
        info!("Service {}/{} missing, creating", namespace, name);
        self.services
            .create_service(namespace, desired)
            .await
            .map_err(|e| ControllerError::api(format!("failed to create service {namespace}/{name}"), e))?;
        info!("Service {}/{} created", namespace, name);
        Ok(())
    }

    /// Carry over the existing object's metadata and overwrite only the
    /// fields this controller manages.
    async fn update_service(
        &self,
        namespace: &str,
        name: &str,
        current: Service,
        desired: Service,
    ) -> Result<(), ControllerError> {
        let mut updated = current;
        let desired_spec = desired.spec.unwrap_or_default();
        let spec = updated.spec.get_or_insert_with(ServiceSpec::default);
        spec.selector = desired_spec.selector;
        spec.ports = desired_spec.ports;

        self.services
            .update_service(namespace, name, &updated)
            .await
            .map_err(|e| ControllerError::api(format!("failed to update service {namespace}/{name}"), e))?;
        info!("Service {}/{} updated", namespace, name);
        Ok(())
    }

    async fn remove_service(&self, namespace: &str, name: &str) -> Result<(), ControllerError> {
        match self.services.delete_service(namespace, name).await {
            Ok(()) => {
                info!("Service {}/{} deleted", namespace, name);
                Ok(())
            }
            Err(err) if is_not_found(&err) => {
                debug!("Service {}/{} already absent", namespace, name);
                Ok(())
            }
            Err(err) => Err(ControllerError::api(
                format!("failed to delete service {namespace}/{name}"),
                err,
            )),
        }
    }
}

/// Desired exposure service for a deployment, or `None` when the pod template
/// carries no labels and there is nothing to route to.
fn desired_service(namespace: &str, name: &str, deployment: &Deployment) -> Option<Service> {
    let selector = pod_template_labels(deployment)?;
    if selector.is_empty() {
        return None;
    }
    Some(Service {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            ..ObjectMeta::default()
        },
        spec: Some(ServiceSpec {
            type_: Some("NodePort".to_string()),
            selector: Some(selector.clone()),
            ports: Some(vec![ServicePort {
                name: Some(PORT_NAME.to_string()),
                port: PORT,
                target_port: Some(IntOrString::Int(PORT)),
                ..ServicePort::default()
            }]),
            ..ServiceSpec::default()
        }),
        ..Service::default()
    })
}

fn pod_template_labels(deployment: &Deployment) -> Option<&BTreeMap<String, String>> {
    deployment.spec.as_ref()?.template.metadata.as_ref()?.labels.as_ref()
}

/// Current and desired specs agree on the fields this controller manages.
fn specs_match(current: &Service, desired: &Service) -> bool {
    let current_spec = current.spec.as_ref();
    let desired_spec = desired.spec.as_ref();
    selectors_equal(
        current_spec.and_then(|s| s.selector.as_ref()),
        desired_spec.and_then(|s| s.selector.as_ref()),
    ) && ports_equal(
        current_spec.and_then(|s| s.ports.as_deref()).unwrap_or(&[]),
        desired_spec.and_then(|s| s.ports.as_deref()).unwrap_or(&[]),
    )
}

/// Label maps are equal as sets of key/value pairs; a missing map counts as
/// empty.
fn selectors_equal(
    current: Option<&BTreeMap<String, String>>,
    desired: Option<&BTreeMap<String, String>>,
) -> bool {
    match (current, desired) {
        (Some(a), Some(b)) => a == b,
        (Some(m), None) | (None, Some(m)) => m.is_empty(),
        (None, None) => true,
    }
}

/// Port lists are equal only when the full ordered sequence matches on the
/// fields the controller sets. Cluster-assigned fields such as nodePort and
/// the defaulted protocol are ignored.
fn ports_equal(current: &[ServicePort], desired: &[ServicePort]) -> bool {
    current.len() == desired.len()
        && current
            .iter()
            .zip(desired)
            .all(|(a, b)| a.name == b.name && a.port == b.port && a.target_port == b.target_port)
}
