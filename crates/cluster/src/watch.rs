//! Watch forwarding from the Kubernetes API into controller channels.

use futures::{StreamExt, TryStreamExt};
use k8s_openapi::api::core::v1::{Node, Pod};
use kube::api::Api;
use kube::runtime::watcher::{watcher, Config, Event};
use kube::Client;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Forward pod apply/delete events to the channel until cancelled. Restarts
/// replay the full list, which reconcilers absorb as ordinary events.
pub async fn run_pod_watch(
    client: Client,
    tx: mpsc::UnboundedSender<Pod>,
    token: CancellationToken,
) {
    let api: Api<Pod> = Api::all(client);
    let mut stream = watcher(api, Config::default()).boxed();
    loop {
        tokio::select! {
            _ = token.cancelled() => {
                debug!("pod watch shutting down");
                return;
            }
            event = stream.try_next() => match event {
                Ok(Some(Event::Apply(pod) | Event::Delete(pod) | Event::InitApply(pod))) => {
                    if tx.send(pod).is_err() {
                        return;
                    }
                }
                Ok(Some(Event::Init | Event::InitDone)) => {}
                Ok(None) => return,
                Err(e) => warn!(error = %e, "pod watch error"),
            }
        }
    }
}

/// Forward node apply/delete events to the channel until cancelled.
pub async fn run_node_watch(
    client: Client,
    tx: mpsc::UnboundedSender<Node>,
    token: CancellationToken,
) {
    let api: Api<Node> = Api::all(client);
    let mut stream = watcher(api, Config::default()).boxed();
    loop {
        tokio::select! {
            _ = token.cancelled() => {
                debug!("node watch shutting down");
                return;
            }
            event = stream.try_next() => match event {
                Ok(Some(Event::Apply(node) | Event::Delete(node) | Event::InitApply(node))) => {
                    if tx.send(node).is_err() {
                        return;
                    }
                }
                Ok(Some(Event::Init | Event::InitDone)) => {}
                Ok(None) => return,
                Err(e) => warn!(error = %e, "node watch error"),
            }
        }
    }
}
