//! Node reconciler: bridged taint and cordon/drain state propagation.

mod controller;
mod slurmcontrol;
mod sync;

pub use controller::NodeController;
pub use slurmcontrol::{NodeSlurmControl, RealNodeSlurmControl};
pub use sync::NodeReconciler;
