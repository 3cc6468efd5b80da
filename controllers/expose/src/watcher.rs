//! Watch-stream intake.
//!
//! Keeps the local stores fresh through reflectors and translates deployment
//! change notifications into queue keys. Services are cached for the
//! reconciler's reads but carry no handlers: the controller is not
//! self-reconciling on its own writes and relies on the next deployment
//! notification or watch restart to observe drift.

use std::sync::Arc;

use futures::StreamExt;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::Service;
use kube::Api;
use kube_runtime::reflector::store::Writer;
use kube_runtime::{reflector, watcher, WatchStreamExt};
use tracing::{debug, warn};
use workqueue::KeyQueue;

use crate::error::ControllerError;
use crate::key::ObjectKey;

/// Watch deployments, keep their store fresh, and enqueue a key for every
/// add, update, delete, and initial-listing notification.
pub async fn watch_deployments(
    api: Api<Deployment>,
    writer: Writer<Deployment>,
    queue: Arc<KeyQueue<ObjectKey>>,
) -> Result<(), ControllerError> {
    let stream = reflector(
        writer,
        watcher(api, watcher::Config::default()).default_backoff(),
    );
    futures::pin_mut!(stream);
    while let Some(event) = stream.next().await {
        match event {
            Ok(event) => handle_deployment_event(&event, &queue),
            Err(err) => warn!("Deployment watch error: {}", err),
        }
    }
    Err(ControllerError::Watch(
        "deployment watch stream ended".to_string(),
    ))
}

/// Keep the service store fresh; service events feed the cache only.
pub async fn watch_services(
    api: Api<Service>,
    writer: Writer<Service>,
) -> Result<(), ControllerError> {
    let stream = reflector(
        writer,
        watcher(api, watcher::Config::default()).default_backoff(),
    );
    futures::pin_mut!(stream);
    while let Some(event) = stream.next().await {
        if let Err(err) = event {
            warn!("Service watch error: {}", err);
        }
    }
    Err(ControllerError::Watch(
        "service watch stream ended".to_string(),
    ))
}

fn handle_deployment_event(event: &watcher::Event<Deployment>, queue: &KeyQueue<ObjectKey>) {
    match event {
        watcher::Event::Apply(deployment)
        | watcher::Event::InitApply(deployment)
        | watcher::Event::Delete(deployment) => enqueue(deployment, queue),
        watcher::Event::Init | watcher::Event::InitDone => {}
    }
}

fn enqueue(deployment: &Deployment, queue: &KeyQueue<ObjectKey>) {
    match ObjectKey::from_meta(&deployment.metadata) {
        Some(key) => {
            debug!("Enqueuing {}", key);
            queue.add(key);
        }
        None => warn!("Deployment notification without namespace/name, skipping"),
    }
}
