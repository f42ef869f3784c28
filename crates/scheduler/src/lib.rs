//! Slurm Bridge scheduler.
//!
//! Implements the pre-filter and filter scheduling hooks: a pod's placement
//! is delegated to Slurm by submitting a placeholder job, and the pod is
//! pinned to exactly the node Slurm allocates. The runner drives the hooks
//! for every pod that names this scheduler.

pub mod framework;
pub mod jobir;
pub mod plugin;
pub mod runner;
pub mod slurmcontrol;

pub use framework::{Code, PreFilterResult, Status};
pub use plugin::SlurmBridge;
pub use runner::SchedulerRunner;
pub use slurmcontrol::{PlaceholderJob, RealSlurmControl, SlurmControl};
