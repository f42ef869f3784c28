//! Reconcilers keeping Kubernetes and Slurm consistent.
//!
//! The pod reconciler pairs pod lifecycle with placeholder job lifecycle;
//! the node reconciler pairs node sharing with the bridged taint and
//! cordon state with Slurm DRAIN. Both run over a per-key serialized work
//! queue with exponential backoff for failing keys.

pub mod backoff;
pub mod node;
pub mod pod;
pub mod queue;

pub use backoff::Backoff;
pub use queue::KeyedQueue;
