//! Test utilities for unit testing the reconciler and worker loop.
//!
//! Provides builders for test objects and an in-memory mock cluster that
//! implements both the cache-read and service-write seams.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec};
use k8s_openapi::api::core::v1::{PodTemplateSpec, Service, ServicePort, ServiceSpec};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use kube::core::ErrorResponse;

use crate::client::ServiceClient;
use crate::error::ControllerError;
use crate::store::ClusterCache;

/// Build a deployment whose pod template carries the given labels.
pub fn make_deployment(namespace: &str, name: &str, labels: &[(&str, &str)]) -> Deployment {
    let labels: BTreeMap<String, String> = labels
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    Deployment {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            ..ObjectMeta::default()
        },
        spec: Some(DeploymentSpec {
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    labels: Some(labels),
                    ..ObjectMeta::default()
                }),
                ..PodTemplateSpec::default()
            },
            ..DeploymentSpec::default()
        }),
        ..Deployment::default()
    }
}

/// Build a NodePort service shaped like the ones the controller creates.
pub fn make_service(namespace: &str, name: &str, selector: &[(&str, &str)]) -> Service {
    let selector: BTreeMap<String, String> = selector
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    Service {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            ..ObjectMeta::default()
        },
        spec: Some(ServiceSpec {
            type_: Some("NodePort".to_string()),
            selector: Some(selector),
            ports: Some(vec![ServicePort {
                name: Some("http".to_string()),
                port: 80,
                target_port: Some(IntOrString::Int(80)),
                ..ServicePort::default()
            }]),
            ..ServiceSpec::default()
        }),
        ..Service::default()
    }
}

/// A kube API error with the given status code, as the API server returns it.
pub fn api_error(code: u16, reason: &str) -> kube::Error {
    kube::Error::Api(ErrorResponse {
        status: "Failure".to_string(),
        message: format!("{reason} ({code})"),
        reason: reason.to_string(),
        code,
    })
}

/// In-memory cluster stand-in.
///
/// One services map backs both the cache reads and the API writes, which
/// models a cache that has already caught up with the controller's own
/// mutations. Writes are also recorded so tests can assert on exactly which
/// mutations a pass issued.
#[derive(Clone, Default)]
pub struct MockCluster {
    deployments: Arc<Mutex<HashMap<(String, String), Deployment>>>,
    services: Arc<Mutex<HashMap<(String, String), Service>>>,
    pub created: Arc<Mutex<Vec<Service>>>,
    pub updated: Arc<Mutex<Vec<Service>>>,
    pub deleted: Arc<Mutex<Vec<String>>>,
    fail_next_write: Arc<Mutex<Option<kube::Error>>>,
    fail_reads: Arc<Mutex<bool>>,
}

impl MockCluster {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put_deployment(&self, deployment: Deployment) {
        let key = object_key(&deployment.metadata);
        self.deployments.lock().unwrap().insert(key, deployment);
    }

    pub fn remove_deployment(&self, namespace: &str, name: &str) {
        self.deployments
            .lock()
            .unwrap()
            .remove(&(namespace.to_string(), name.to_string()));
    }

    pub fn put_service(&self, service: Service) {
        let key = object_key(&service.metadata);
        self.services.lock().unwrap().insert(key, service);
    }

    pub fn service(&self, namespace: &str, name: &str) -> Option<Service> {
        self.services
            .lock()
            .unwrap()
            .get(&(namespace.to_string(), name.to_string()))
            .cloned()
    }

    /// All service keys, as `namespace/name`, sorted.
    pub fn service_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self
            .services
            .lock()
            .unwrap()
            .keys()
            .map(|(namespace, name)| format!("{namespace}/{name}"))
            .collect();
        keys.sort();
        keys
    }

    /// Fail the next write call with the given error, then recover.
    pub fn fail_next_write(&self, err: kube::Error) {
        *self.fail_next_write.lock().unwrap() = Some(err);
    }

    pub fn set_fail_reads(&self, fail: bool) {
        *self.fail_reads.lock().unwrap() = fail;
    }

    fn take_write_failure(&self) -> Option<kube::Error> {
        self.fail_next_write.lock().unwrap().take()
    }
}

fn object_key(meta: &ObjectMeta) -> (String, String) {
    (
        meta.namespace.clone().unwrap_or_default(),
        meta.name.clone().unwrap_or_default(),
    )
}

impl ClusterCache for MockCluster {
    fn get_deployment(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<Deployment>, ControllerError> {
        if *self.fail_reads.lock().unwrap() {
            return Err(ControllerError::Watch("cache read failed".to_string()));
        }
        Ok(self
            .deployments
            .lock()
            .unwrap()
            .get(&(namespace.to_string(), name.to_string()))
            .cloned())
    }

    fn get_service(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<Service>, ControllerError> {
        if *self.fail_reads.lock().unwrap() {
            return Err(ControllerError::Watch("cache read failed".to_string()));
        }
        Ok(self.service(namespace, name))
    }
}

#[async_trait]
impl ServiceClient for MockCluster {
    async fn create_service(&self, namespace: &str, service: &Service) -> Result<(), kube::Error> {
        if let Some(err) = self.take_write_failure() {
            return Err(err);
        }
        self.created.lock().unwrap().push(service.clone());
        let name = service.metadata.name.clone().unwrap_or_default();
        self.services
            .lock()
            .unwrap()
            .insert((namespace.to_string(), name), service.clone());
        Ok(())
    }

    async fn update_service(
        &self,
        namespace: &str,
        name: &str,
        service: &Service,
    ) -> Result<(), kube::Error> {
        if let Some(err) = self.take_write_failure() {
            return Err(err);
        }
        self.updated.lock().unwrap().push(service.clone());
        self.services
            .lock()
            .unwrap()
            .insert((namespace.to_string(), name.to_string()), service.clone());
        Ok(())
    }

    async fn delete_service(&self, namespace: &str, name: &str) -> Result<(), kube::Error> {
        if let Some(err) = self.take_write_failure() {
            return Err(err);
        }
        let removed = self
            .services
            .lock()
            .unwrap()
            .remove(&(namespace.to_string(), name.to_string()));
        match removed {
            Some(_) => {
                self.deleted
                    .lock()
                    .unwrap()
                    .push(format!("{namespace}/{name}"));
                Ok(())
            }
            None => Err(api_error(404, "NotFound")),
        }
    }
}
