//! Poll-based informers over the Slurm REST API.
//!
//! slurmrestd has no watch endpoint, so the informers list on an interval,
//! diff against the previous snapshot and emit add/update/delete events on
//! a channel. Consumers filter the events they care about.

use std::collections::BTreeMap;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::client::SlurmClient;
use crate::types::{JobInfo, Node};

#[derive(Debug, Clone, PartialEq)]
pub enum JobEvent {
    Added(JobInfo),
    Updated { old: JobInfo, new: JobInfo },
    Deleted(JobInfo),
}

#[derive(Debug, Clone, PartialEq)]
pub enum NodeEvent {
    Added(Node),
    Updated { old: Node, new: Node },
    Deleted(Node),
}

/// Diff two job snapshots keyed by job id.
pub fn diff_jobs(old: &BTreeMap<i32, JobInfo>, new: &BTreeMap<i32, JobInfo>) -> Vec<JobEvent> {
    let mut events = Vec::new();
    for (id, job) in new {
        match old.get(id) {
            None => events.push(JobEvent::Added(job.clone())),
            Some(prev) if prev != job => events.push(JobEvent::Updated {
                old: prev.clone(),
                new: job.clone(),
            }),
            Some(_) => {}
        }
    }
    for (id, job) in old {
        if !new.contains_key(id) {
            events.push(JobEvent::Deleted(job.clone()));
        }
    }
    events
}

/// Diff two node snapshots keyed by node name.
pub fn diff_nodes(old: &BTreeMap<String, Node>, new: &BTreeMap<String, Node>) -> Vec<NodeEvent> {
    let mut events = Vec::new();
    for (name, node) in new {
        match old.get(name) {
            None => events.push(NodeEvent::Added(node.clone())),
            Some(prev) if prev != node => events.push(NodeEvent::Updated {
                old: prev.clone(),
                new: node.clone(),
            }),
            Some(_) => {}
        }
    }
    for (name, node) in old {
        if !new.contains_key(name) {
            events.push(NodeEvent::Deleted(node.clone()));
        }
    }
    events
}

pub struct JobInformer {
    client: SlurmClient,
    interval: Duration,
    tx: mpsc::UnboundedSender<JobEvent>,
}

impl JobInformer {
    pub fn new(
        client: SlurmClient,
        interval: Duration,
        tx: mpsc::UnboundedSender<JobEvent>,
    ) -> Self {
        Self {
            client,
            interval,
            tx,
        }
    }

    pub async fn run(self, token: CancellationToken) {
        let mut snapshot: BTreeMap<i32, JobInfo> = BTreeMap::new();
        let mut first = true;
        loop {
            tokio::select! {
                _ = token.cancelled() => {
                    debug!("job informer shutting down");
                    return;
                }
                _ = tokio::time::sleep(if first { Duration::ZERO } else { self.interval }) => {}
            }
            first = false;

            let jobs = match self.client.list_jobs().await {
                Ok(jobs) => jobs,
                Err(e) => {
                    warn!(error = %e, "job informer failed to list jobs");
                    continue;
                }
            };
            let next: BTreeMap<i32, JobInfo> = jobs
                .into_iter()
                .filter_map(|j| j.job_id.map(|id| (id, j)))
                .collect();
            for event in diff_jobs(&snapshot, &next) {
                if self.tx.send(event).is_err() {
                    return;
                }
            }
            snapshot = next;
        }
    }
}

pub struct NodeInformer {
    client: SlurmClient,
    interval: Duration,
    tx: mpsc::UnboundedSender<NodeEvent>,
}

impl NodeInformer {
    pub fn new(
        client: SlurmClient,
        interval: Duration,
        tx: mpsc::UnboundedSender<NodeEvent>,
    ) -> Self {
        Self {
            client,
            interval,
            tx,
        }
    }

    pub async fn run(self, token: CancellationToken) {
        let mut snapshot: BTreeMap<String, Node> = BTreeMap::new();
        let mut first = true;
        loop {
            tokio::select! {
                _ = token.cancelled() => {
                    debug!("node informer shutting down");
                    return;
                }
                _ = tokio::time::sleep(if first { Duration::ZERO } else { self.interval }) => {}
            }
            first = false;

            let nodes = match self.client.list_nodes().await {
                Ok(nodes) => nodes,
                Err(e) => {
                    warn!(error = %e, "node informer failed to list nodes");
                    continue;
                }
            };
            let next: BTreeMap<String, Node> = nodes
                .into_iter()
                .filter_map(|n| n.name.clone().map(|name| (name, n)))
                .collect();
            for event in diff_nodes(&snapshot, &next) {
                if self.tx.send(event).is_err() {
                    return;
                }
            }
            snapshot = next;
        }
    }
}
