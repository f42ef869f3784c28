//! Kubernetes access layer.
//!
//! The scheduler plugin, reconcilers and webhook consume the cluster
//! through small trait seams so their logic can be exercised against an
//! in-memory implementation. The kube-rs implementation is the production
//! path.

pub mod api;
pub mod crds;
pub mod kube_impl;
pub mod memory;
pub mod watch;

pub use api::{NamespaceApi, NodeApi, OwnerMeta, PodApi, WorkloadApi};
pub use kube_impl::KubeCluster;
pub use memory::MemoryCluster;
