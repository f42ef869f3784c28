//! Pod reconciler: pairs pod lifecycle with placeholder job lifecycle.

mod controller;
mod slurmcontrol;
mod sync;

pub use controller::PodController;
pub use slurmcontrol::{PodSlurmControl, RealPodSlurmControl};
pub use sync::PodReconciler;
