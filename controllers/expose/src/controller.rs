//! Main controller implementation.
//!
//! This module wires the queue, reconciler, caches, and watch tasks together
//! and owns the worker pool and shutdown propagation.

use std::future::Future;
use std::sync::Arc;

use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::Service;
use kube::{Api, Client};
use kube_runtime::reflector;
use tracing::{debug, error, info};
use workqueue::KeyQueue;

use crate::client::{KubeServiceClient, ServiceClient};
use crate::error::ControllerError;
use crate::key::ObjectKey;
use crate::reconciler::Reconciler;
use crate::store::{ClusterCache, Stores};
use crate::watcher;

/// Default number of concurrent reconcile workers.
pub const DEFAULT_WORKERS: usize = 2;

/// Controller converging one exposure service per deployment.
pub struct Controller {
    queue: Arc<KeyQueue<ObjectKey>>,
    reconciler: Arc<Reconciler<Stores, KubeServiceClient>>,
    stores: Stores,
    deployments: Api<Deployment>,
    services: Api<Service>,
    deployment_writer: reflector::store::Writer<Deployment>,
    service_writer: reflector::store::Writer<Service>,
    workers: usize,
}

impl Controller {
    /// Wires up stores, queue, and reconciler against the given client.
    #[must_use]
    pub fn new(client: Client, workers: usize) -> Self {
        let (deployment_store, deployment_writer) = reflector::store::<Deployment>();
        let (service_store, service_writer) = reflector::store::<Service>();
        let stores = Stores::new(deployment_store, service_store);
        let reconciler = Arc::new(Reconciler::new(
            stores.clone(),
            KubeServiceClient::new(client.clone()),
        ));
        Self {
            queue: Arc::new(KeyQueue::new()),
            reconciler,
            stores,
            deployments: Api::all(client.clone()),
            services: Api::all(client),
            deployment_writer,
            service_writer,
            workers,
        }
    }

    /// Runs the controller until the shutdown future resolves.
    ///
    /// Startup order: watch tasks, then the cache-sync gate, then the
    /// workers. Shutdown stops dequeues and aborts the watch tasks without
    /// waiting for in-flight reconcile passes to finish.
    pub async fn run(self, shutdown: impl Future<Output = ()>) -> Result<(), ControllerError> {
        info!("Starting deployment and service watchers");
        let deployment_watch = tokio::spawn(watcher::watch_deployments(
            self.deployments,
            self.deployment_writer,
            Arc::clone(&self.queue),
        ));
        let service_watch = tokio::spawn(watcher::watch_services(
            self.services,
            self.service_writer,
        ));

        tokio::pin!(shutdown);

        info!("Waiting for caches to sync");
        tokio::select! {
            result = self.stores.wait_until_ready() => result?,
            () = &mut shutdown => {
                info!("Shutdown requested before caches synced");
                deployment_watch.abort();
                service_watch.abort();
                return Ok(());
            }
        }
        info!("Caches synced, starting {} workers", self.workers);

        for id in 0..self.workers {
            tokio::spawn(worker(
                id,
                Arc::clone(&self.queue),
                Arc::clone(&self.reconciler),
            ));
        }

        shutdown.await;
        info!("Shutdown signal received, stopping controller");
        self.queue.shut_down();
        deployment_watch.abort();
        service_watch.abort();
        Ok(())
    }
}

/// One queue-driven reconcile loop.
///
/// Errors re-enqueue the key with backoff; the pass is always marked done so
/// coalesced adds can surface.
async fn worker<C, S>(id: usize, queue: Arc<KeyQueue<ObjectKey>>, reconciler: Arc<Reconciler<C, S>>)
where
    C: ClusterCache + 'static,
    S: ServiceClient + 'static,
{
    while let Some(key) = queue.get().await {
        debug!("Worker {} processing {}", id, key);
        if let Err(err) = reconciler.sync(&key).await {
            error!("Error syncing {}: {}", key, err);
            queue.add_rate_limited(key.clone());
        }
        queue.done(&key);
    }
    debug!("Worker {} stopped", id);
}
