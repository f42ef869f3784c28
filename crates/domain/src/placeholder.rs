//! The placeholder job's adminComment payload.
//!
//! A placeholder job carries a JSON object in its adminComment naming the
//! pods it was submitted for. It is the authoritative link from a Slurm job
//! back to the pod group; a job whose adminComment does not parse is not
//! ours.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaceholderInfo {
    /// Pod keys as `namespace/name`, the exact set the job IR produced.
    pub pods: Vec<String>,
}

impl PlaceholderInfo {
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }

    /// Parse an adminComment. Empty or absent comments fail like any other
    /// non-placeholder payload.
    pub fn parse(comment: Option<&str>) -> Result<Self, serde_json::Error> {
        serde_json::from_str(comment.unwrap_or_default())
    }
}

/// Canonical pod key used throughout the bridge.
pub fn pod_key(namespace: &str, name: &str) -> String {
    format!("{namespace}/{name}")
}
