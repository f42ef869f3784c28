//! Pod phase helpers used by the plugin and the pod reconciler.

use k8s_openapi::api::core::v1::Pod;

fn phase(pod: &Pod) -> &str {
    pod.status
        .as_ref()
        .and_then(|s| s.phase.as_deref())
        .unwrap_or("")
}

/// Succeeded or Failed.
pub fn is_terminal(pod: &Pod) -> bool {
    matches!(phase(pod), "Succeeded" | "Failed")
}

/// Running with the Ready condition true.
pub fn is_running_ready(pod: &Pod) -> bool {
    if phase(pod) != "Running" {
        return false;
    }
    pod.status
        .as_ref()
        .and_then(|s| s.conditions.as_ref())
        .map(|conds| {
            conds
                .iter()
                .any(|c| c.type_ == "Ready" && c.status == "True")
        })
        .unwrap_or(false)
}

/// Not deleting and not terminal: the pod still counts against its
/// placeholder job's group.
pub fn is_active(pod: &Pod) -> bool {
    pod.metadata.deletion_timestamp.is_none() && !is_terminal(pod)
}

/// Terminal or carrying a deletion timestamp: cleanup may proceed.
pub fn is_terminating_or_terminal(pod: &Pod) -> bool {
    pod.metadata.deletion_timestamp.is_some() || is_terminal(pod)
}
