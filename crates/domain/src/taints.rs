//! Bridged-node taint and the paired pod toleration.

use k8s_openapi::api::core::v1::{Taint, Toleration};

use crate::wellknown::TAINT_KEY_BRIDGED_NODE;

/// Taint marking a node as managed by the named bridge scheduler. NoExecute
/// so already-running pods without the toleration are evicted.
pub fn new_taint_node_bridged(scheduler_name: &str) -> Taint {
    Taint {
        key: TAINT_KEY_BRIDGED_NODE.to_string(),
        value: Some(scheduler_name.to_string()),
        effect: "NoExecute".to_string(),
        ..Default::default()
    }
}

/// Toleration letting placed pods run on bridged nodes.
pub fn new_toleration_node_bridged(scheduler_name: &str) -> Toleration {
    Toleration {
        key: Some(TAINT_KEY_BRIDGED_NODE.to_string()),
        operator: Some("Equal".to_string()),
        value: Some(scheduler_name.to_string()),
        effect: Some("NoExecute".to_string()),
        ..Default::default()
    }
}

/// Append a toleration unless an equivalent one is already present.
pub fn merge_tolerations(
    tolerations: Vec<Toleration>,
    toleration: Toleration,
) -> Vec<Toleration> {
    let mut merged = tolerations;
    let found = merged.iter().any(|t| matches(t, &toleration));
    if !found {
        merged.push(toleration);
    }
    merged
}

fn matches(a: &Toleration, b: &Toleration) -> bool {
    a.key == b.key && a.operator == b.operator && a.value == b.value && a.effect == b.effect
}

/// True when the node taint was authored for the given scheduler.
pub fn has_bridged_taint(taints: &[Taint], scheduler_name: &str) -> bool {
    taints.iter().any(|t| {
        t.key == TAINT_KEY_BRIDGED_NODE
            && t.effect == "NoExecute"
            && t.value.as_deref() == Some(scheduler_name)
    })
}

/// Remove every bridged taint regardless of the scheduler name it carries.
pub fn remove_bridged_taint(taints: Vec<Taint>) -> Vec<Taint> {
    taints
        .into_iter()
        .filter(|t| t.key != TAINT_KEY_BRIDGED_NODE)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn taint_and_toleration_pair() {
        let taint = new_taint_node_bridged("slurm-bridge-scheduler");
        assert_eq!(taint.key, TAINT_KEY_BRIDGED_NODE);
        assert_eq!(taint.effect, "NoExecute");
        assert_eq!(taint.value.as_deref(), Some("slurm-bridge-scheduler"));

        let toleration = new_toleration_node_bridged("slurm-bridge-scheduler");
        assert_eq!(toleration.key.as_deref(), Some(TAINT_KEY_BRIDGED_NODE));
        assert_eq!(toleration.operator.as_deref(), Some("Equal"));
    }

    #[test]
    fn merge_is_idempotent() {
        let toleration = new_toleration_node_bridged("sched");
        let once = merge_tolerations(vec![], toleration.clone());
        let twice = merge_tolerations(once.clone(), toleration);
        assert_eq!(once.len(), 1);
        assert_eq!(twice.len(), 1);
    }

    #[test]
    fn merge_keeps_unrelated_tolerations() {
        let other = Toleration {
            key: Some("node.kubernetes.io/not-ready".into()),
            ..Default::default()
        };
        let merged = merge_tolerations(vec![other], new_toleration_node_bridged("sched"));
        assert_eq!(merged.len(), 2);
    }

    #[test]
    fn detects_and_removes_bridged_taint() {
        let taints = vec![
            new_taint_node_bridged("sched"),
            Taint {
                key: "other".into(),
                effect: "NoSchedule".into(),
                ..Default::default()
            },
        ];
        assert!(has_bridged_taint(&taints, "sched"));
        assert!(!has_bridged_taint(&taints, "someone-else"));
        let remaining = remove_bridged_taint(taints);
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].key, "other");
    }
}
