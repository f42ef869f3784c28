//! Pod admission webhook.
//!
//! Enforces the invariants the placement code depends on: pods in managed
//! namespaces are assigned to the bridge scheduler, users may not supply
//! the reserved placeholder fields, and those fields freeze once a pod is
//! Running. Failures are fatal to admission; the webhook is fail-closed.

pub mod server;

use std::sync::Arc;

use k8s_openapi::api::core::v1::Pod;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;
use kube::core::Selector;
use kube::core::SelectorExt;
use thiserror::Error;
use tracing::debug;

use slurm_bridge_cluster::NamespaceApi;
use slurm_bridge_domain::jobir::{pod_job_id_label, pod_node_annotation};
use slurm_bridge_domain::{wellknown, BridgeError};

#[derive(Debug, Error)]
pub enum AdmissionError {
    /// Policy rejection surfaced to the API client.
    #[error("{0}")]
    Denied(String),

    /// Infrastructure failure; also rejects, since admission fails closed.
    #[error(transparent)]
    Internal(#[from] BridgeError),
}

pub struct PodAdmission {
    namespaces: Arc<dyn NamespaceApi>,
    scheduler_name: String,
    managed_namespaces: Vec<String>,
    managed_namespace_selector: Option<LabelSelector>,
}

impl PodAdmission {
    pub fn new(
        namespaces: Arc<dyn NamespaceApi>,
        scheduler_name: String,
        managed_namespaces: Vec<String>,
        managed_namespace_selector: Option<LabelSelector>,
    ) -> Self {
        Self {
            namespaces,
            scheduler_name,
            managed_namespaces,
            managed_namespace_selector,
        }
    }

    /// Route pods in managed namespaces to the bridge scheduler, unless
    /// they already request a specific one.
    pub async fn default(&self, pod: &mut Pod) -> Result<(), BridgeError> {
        let namespace = pod.metadata.namespace.clone().unwrap_or_default();
        if !self.is_managed_namespace(&namespace).await? {
            return Ok(());
        }
        let spec = pod.spec.get_or_insert_with(Default::default);
        if spec.scheduler_name.as_deref() == Some(wellknown::DEFAULT_SCHEDULER_NAME)
            || spec.scheduler_name.is_none()
        {
            debug!(
                pod = %pod.metadata.name.as_deref().unwrap_or_default(),
                scheduler = %self.scheduler_name,
                "defaulting pod scheduler name"
            );
            spec.scheduler_name = Some(self.scheduler_name.clone());
        }
        Ok(())
    }

    /// Creation may not carry the reserved placement fields.
    pub async fn validate_create(&self, pod: &Pod) -> Result<(), AdmissionError> {
        let namespace = pod.metadata.namespace.clone().unwrap_or_default();
        if !self.is_managed_namespace(&namespace).await? {
            return Ok(());
        }
        if !pod_job_id_label(pod).is_empty() {
            return Err(AdmissionError::Denied(
                "can't create a pod with a slurm placeholder jobid label".to_string(),
            ));
        }
        if !pod_node_annotation(pod).is_empty() {
            return Err(AdmissionError::Denied(
                "can't create a pod with a slurm placeholder node annotation".to_string(),
            ));
        }
        Ok(())
    }

    /// Once a pod is Running its placement fields are frozen.
    pub async fn validate_update(&self, old: &Pod, new: &Pod) -> Result<(), AdmissionError> {
        let namespace = new.metadata.namespace.clone().unwrap_or_default();
        if !self.is_managed_namespace(&namespace).await? {
            return Ok(());
        }
        let running = new
            .status
            .as_ref()
            .and_then(|s| s.phase.as_deref())
            == Some("Running");
        if !running {
            return Ok(());
        }
        if pod_job_id_label(new) != pod_job_id_label(old) {
            return Err(AdmissionError::Denied(
                "can't update a running pod's placeholder jobid label".to_string(),
            ));
        }
        if pod_node_annotation(new) != pod_node_annotation(old) {
            return Err(AdmissionError::Denied(
                "can't update a running pod's placeholder node annotation".to_string(),
            ));
        }
        Ok(())
    }

    pub async fn validate_delete(&self, _pod: &Pod) -> Result<(), AdmissionError> {
        Ok(())
    }

    /// The explicit namespace list wins when set; otherwise the selector is
    /// evaluated against the live namespace list. Selector failures are
    /// webhook errors.
    pub async fn is_managed_namespace(&self, namespace: &str) -> Result<bool, BridgeError> {
        if !self.managed_namespaces.is_empty() {
            return Ok(self.managed_namespaces.iter().any(|ns| ns == namespace));
        }
        let Some(label_selector) = self.managed_namespace_selector.clone() else {
            return Ok(false);
        };
        let selector = Selector::try_from(label_selector).map_err(|e| {
            BridgeError::InvalidConfig(format!("error creating label selector: {e}"))
        })?;
        let namespaces = self.namespaces.list().await?;
        Ok(namespaces.iter().any(|ns| {
            ns.metadata.name.as_deref() == Some(namespace)
                && selector.matches(&ns.metadata.labels.clone().unwrap_or_default())
        }))
    }
}
