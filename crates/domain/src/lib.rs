//! Slurm Bridge - Domain Layer
//!
//! Pure types and helpers shared by the scheduler plugin, the reconcilers
//! and the admission webhook:
//! - wellknown: reserved label, annotation, finalizer and taint keys
//! - placeholder: the adminComment payload linking Slurm jobs to pods
//! - jobir: the kind-agnostic Slurm job intermediate representation
//! - hostlist: Slurm host-list expression expansion
//! - config: the bridge configuration file

pub mod config;
pub mod errors;
pub mod hostlist;
pub mod jobir;
pub mod nodemap;
pub mod placeholder;
pub mod podutil;
pub mod quantity;
pub mod taints;
pub mod wellknown;

pub use config::Config;
pub use errors::{BridgeError, Result};
pub use jobir::{JobInfo, JobIr, RootHandle, RootKind};
pub use placeholder::PlaceholderInfo;
