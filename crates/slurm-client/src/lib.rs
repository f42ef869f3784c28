//! Typed client for the Slurm REST API surface the bridge consumes:
//! job get/list/submit/update/delete and node get/list/update, plus
//! poll-based informers that turn list diffs into job and node events.

pub mod client;
pub mod error;
pub mod informer;
pub mod types;

pub use client::{SlurmClient, SlurmClientConfig};
pub use error::SlurmError;
pub use informer::{JobEvent, JobInformer, NodeEvent, NodeInformer};
