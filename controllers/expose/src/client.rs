//! Mutating access to Services through the cluster API.

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Service;
use kube::api::{Api, DeleteParams, PostParams};
use kube::Client;

/// The three mutations the reconciler issues against the cluster.
///
/// This trait enables mocking of the API calls for unit testing.
/// All async methods must be `Send` to work with Tokio's work-stealing runtime.
#[async_trait]
pub trait ServiceClient: Send + Sync {
    async fn create_service(&self, namespace: &str, service: &Service) -> Result<(), kube::Error>;

    async fn update_service(
        &self,
        namespace: &str,
        name: &str,
        service: &Service,
    ) -> Result<(), kube::Error>;

    async fn delete_service(&self, namespace: &str, name: &str) -> Result<(), kube::Error>;
}

/// Production implementation backed by `kube::Api`.
#[derive(Clone)]
pub struct KubeServiceClient {
    client: Client,
}

impl KubeServiceClient {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn services(&self, namespace: &str) -> Api<Service> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

#[async_trait]
impl ServiceClient for KubeServiceClient {
    async fn create_service(&self, namespace: &str, service: &Service) -> Result<(), kube::Error> {
        self.services(namespace)
            .create(&PostParams::default(), service)
            .await
            .map(|_| ())
    }

    async fn update_service(
        &self,
        namespace: &str,
        name: &str,
        service: &Service,
    ) -> Result<(), kube::Error> {
        self.services(namespace)
            .replace(name, &PostParams::default(), service)
            .await
            .map(|_| ())
    }

    async fn delete_service(&self, namespace: &str, name: &str) -> Result<(), kube::Error> {
        self.services(namespace)
            .delete(name, &DeleteParams::default())
            .await
            .map(|_| ())
    }
}
