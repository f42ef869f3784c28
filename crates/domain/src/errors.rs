//! Shared error type for the bridge.

use thiserror::Error;

/// Errors raised across the scheduler plugin, translators and reconcilers.
///
/// The policy variants carry fixed messages that callers match on to map a
/// failure to a scheduling status, so their `Display` text is part of the
/// contract.
#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("no more placeholder nodes to annotate pods")]
    NoKubeNode,

    #[error("failed to update pod")]
    PodUpdateFailed,

    #[error("requested node configuration is not available")]
    NodeConfigInvalid,

    #[error("could not get podgroup")]
    PodGroupGet,

    #[error("not enough pending pods to satisfy MinMember")]
    InsufficientPods,

    #[error("not enough pending pods to satisfy MinMembers for Placeholder job")]
    PlaceholderJobInvalid,

    #[error("PodGroup status is Running")]
    PodGroupRunning,

    #[error("PodGroup status is Unknown")]
    PodGroupUnknown,

    #[error("PodGroup status is Failed")]
    PodGroupFailed,

    #[error("PodGroup status is Finished")]
    PodGroupFinished,

    #[error("could not get leaderworkerset")]
    LwsGet,

    #[error("no pods for LWS group found")]
    LwsNoPods,

    #[error("invalid annotation {key}: {value}")]
    InvalidAnnotation { key: String, value: String },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("duplicate slurm node name {slurm_node} for nodes {first} and {second}")]
    NodeNameCollision {
        slurm_node: String,
        first: String,
        second: String,
    },

    #[error("kubernetes api: {0}")]
    Kube(String),

    #[error("slurm api: {0}")]
    Slurm(String),

    #[error("{}", join_errors(.0))]
    Aggregate(Vec<BridgeError>),
}

impl BridgeError {
    /// Collapse a list of errors the way reconcilers aggregate their
    /// subroutine results: no errors is Ok, one error is itself, more
    /// become an aggregate.
    pub fn aggregate(errs: Vec<BridgeError>) -> Result<()> {
        match errs.len() {
            0 => Ok(()),
            1 => Err(errs.into_iter().next().unwrap()),
            _ => Err(BridgeError::Aggregate(errs)),
        }
    }
}

fn join_errors(errs: &[BridgeError]) -> String {
    errs.iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

pub type Result<T> = std::result::Result<T, BridgeError>;
