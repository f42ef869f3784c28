//! Wire types for the v0.0.43 Slurm REST API, limited to the fields the
//! bridge reads and writes.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobState {
    Pending,
    Running,
    Suspended,
    Completed,
    Cancelled,
    Failed,
    Timeout,
    NodeFail,
    Preempted,
    BootFail,
    Deadline,
    OutOfMemory,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JobInfo {
    pub job_id: Option<i32>,
    pub job_state: Vec<JobState>,
    pub name: Option<String>,
    /// Host-list expression of allocated nodes; empty while queued.
    pub nodes: Option<String>,
    pub partition: Option<String>,
    pub admin_comment: Option<String>,
}

impl JobInfo {
    pub fn state_set(&self) -> BTreeSet<JobState> {
        self.job_state.iter().copied().collect()
    }

    pub fn has_any_state(&self, states: &[JobState]) -> bool {
        self.job_state.iter().any(|s| states.contains(s))
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NodeState {
    Idle,
    Allocated,
    Mixed,
    Down,
    Drain,
    Undrain,
    Error,
    Future,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Node {
    pub name: Option<String>,
    pub state: Vec<NodeState>,
    pub reason: Option<String>,
    pub address: Option<String>,
    pub hostname: Option<String>,
}

impl Node {
    pub fn state_set(&self) -> BTreeSet<NodeState> {
        self.state.iter().copied().collect()
    }

    pub fn has_state(&self, state: NodeState) -> bool {
        self.state.contains(&state)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UpdateNodeMsg {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<Vec<NodeState>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Slurm "no value" sentinel for 32-bit numbers. `set=false` asks Slurm to
/// apply its default.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Uint32NoVal {
    pub set: bool,
    pub infinite: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub number: Option<i64>,
}

impl Uint32NoVal {
    pub fn some(number: i64) -> Self {
        Self {
            set: true,
            infinite: false,
            number: Some(number),
        }
    }

    pub fn unset() -> Self {
        Self::default()
    }
}

/// Slurm "no value" sentinel for 64-bit numbers.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Uint64NoVal {
    pub set: bool,
    pub infinite: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub number: Option<i64>,
}

impl Uint64NoVal {
    pub fn some(number: i64) -> Self {
        Self {
            set: true,
            infinite: false,
            number: Some(number),
        }
    }

    pub fn unset() -> Self {
        Self::default()
    }
}

/// Job description for submit and update requests. Absent fields are left
/// to Slurm.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JobDescMsg {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub account: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub admin_comment: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub constraints: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cpus_per_task: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_working_directory: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub environment: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub flags: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub licenses: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub maximum_nodes: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mcs_label: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memory_per_node: Option<Uint64NoVal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub minimum_nodes: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub partition: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub qos: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reservation: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shared: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tasks_per_node: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_limit: Option<Uint32NoVal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wckey: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobSubmitReq {
    pub job: JobDescMsg,
}

// Response envelopes.

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct JobsResponse {
    pub jobs: Vec<JobInfo>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct NodesResponse {
    pub nodes: Vec<Node>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct JobSubmitResponse {
    pub job_id: Option<i32>,
    pub errors: Vec<ApiError>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ApiResponse {
    pub errors: Vec<ApiError>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ApiError {
    pub error: Option<String>,
    pub error_number: Option<i32>,
    pub description: Option<String>,
    pub source: Option<String>,
}

impl ApiError {
    pub fn message(&self) -> String {
        self.error
            .clone()
            .or_else(|| self.description.clone())
            .unwrap_or_else(|| "unknown slurm error".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn job_state_round_trips() {
        let json = r#"["RUNNING","OUT_OF_MEMORY"]"#;
        let states: Vec<JobState> = serde_json::from_str(json).unwrap();
        assert_eq!(states, vec![JobState::Running, JobState::OutOfMemory]);
    }

    #[test]
    fn unknown_states_do_not_fail_decoding() {
        let states: Vec<JobState> = serde_json::from_str(r#"["SOMETHING_NEW"]"#).unwrap();
        assert_eq!(states, vec![JobState::Unknown]);
    }

    #[test]
    fn job_info_decodes_with_missing_fields() {
        let job: JobInfo = serde_json::from_str(r#"{"job_id": 7}"#).unwrap();
        assert_eq!(job.job_id, Some(7));
        assert!(job.job_state.is_empty());
        assert!(!job.has_any_state(&[JobState::Running]));
    }

    #[test]
    fn job_desc_skips_absent_fields() {
        let desc = JobDescMsg {
            minimum_nodes: Some(1),
            ..Default::default()
        };
        let json = serde_json::to_value(&desc).unwrap();
        assert_eq!(json, serde_json::json!({"minimum_nodes": 1}));
    }

    #[test]
    fn noval_sentinels_serialize_set_flag() {
        let set = serde_json::to_value(Uint64NoVal::some(500)).unwrap();
        assert_eq!(
            set,
            serde_json::json!({"set": true, "infinite": false, "number": 500})
        );
        let unset = serde_json::to_value(Uint64NoVal::unset()).unwrap();
        assert_eq!(unset, serde_json::json!({"set": false, "infinite": false}));
    }

    #[test]
    fn node_state_detection() {
        let node: Node =
            serde_json::from_str(r#"{"name":"n1","state":["IDLE","DRAIN"]}"#).unwrap();
        assert!(node.has_state(NodeState::Drain));
        assert!(!node.has_state(NodeState::Down));
    }
}
