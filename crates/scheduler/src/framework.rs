//! Scheduling-framework surface consumed by the plugin.
//!
//! Mirrors the host framework's status codes and pre-filter result so the
//! plugin's contract is expressed independently of the driving loop.

use std::collections::BTreeSet;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Pod;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Code {
    Success,
    /// Transient infrastructure failure; the host retries next cycle.
    Error,
    /// Decision not ready; requeue and try again later.
    Pending,
    /// This node does not fit; others may.
    Unschedulable,
    /// No node can ever fit without outside intervention.
    UnschedulableAndUnresolvable,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Status {
    code: Code,
    reasons: Vec<String>,
}

impl Status {
    pub fn new(code: Code) -> Self {
        Self {
            code,
            reasons: Vec::new(),
        }
    }

    pub fn success() -> Self {
        Self::new(Code::Success)
    }

    pub fn with_reason(code: Code, reason: impl Into<String>) -> Self {
        Self {
            code,
            reasons: vec![reason.into()],
        }
    }

    pub fn code(&self) -> Code {
        self.code
    }

    pub fn is_success(&self) -> bool {
        self.code == Code::Success
    }

    pub fn reasons(&self) -> &[String] {
        &self.reasons
    }

    pub fn has_reason(&self, reason: &str) -> bool {
        self.reasons.iter().any(|r| r == reason)
    }

    pub fn message(&self) -> String {
        self.reasons.join("; ")
    }
}

/// A successful pre-filter narrows scheduling to this node set; for the
/// bridge it is always a singleton.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PreFilterResult {
    pub node_names: BTreeSet<String>,
}

impl PreFilterResult {
    pub fn singleton(node: impl Into<String>) -> Self {
        Self {
            node_names: [node.into()].into(),
        }
    }
}

#[async_trait]
pub trait PreFilterPlugin: Send + Sync {
    fn name(&self) -> &str;
    async fn pre_filter(&self, pod: &Pod) -> (Option<PreFilterResult>, Status);
}

#[async_trait]
pub trait FilterPlugin: Send + Sync {
    async fn filter(&self, pod: &Pod, node_name: &str) -> Status;
}
