//! Bridge configuration.
//!
//! Loaded from a fixed YAML path. Unknown fields are ignored and an empty
//! file parses to all-defaults.

use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;
use serde::{Deserialize, Serialize};

use crate::errors::{BridgeError, Result};

pub const CONFIG_FILE: &str = "/etc/slurm-bridge/config.yaml";
/// Fallback path when the deployed config is unreadable, for local debug.
pub const DEBUG_CONFIG_FILE: &str = "/tmp/config.yaml.debug";

pub const DEFAULT_SCHEDULER_NAME: &str = "slurm-bridge-scheduler";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct Config {
    /// Name this scheduler registers under; the webhook rewrites
    /// `default-scheduler` to it in managed namespaces.
    pub scheduler_name: String,
    /// Base URL of the Slurm REST API.
    pub slurm_rest_api: String,
    /// Explicit managed namespace list. Wins over the selector when set.
    pub managed_namespaces: Vec<String>,
    /// Label selector evaluated against the live namespace list.
    pub managed_namespace_selector: Option<LabelSelector>,
    /// MCS label injected into every placeholder submission.
    pub mcs_label: String,
    /// Partition used when a workload does not name one.
    pub partition: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            scheduler_name: DEFAULT_SCHEDULER_NAME.to_string(),
            slurm_rest_api: String::new(),
            managed_namespaces: Vec::new(),
            managed_namespace_selector: None,
            mcs_label: String::new(),
            partition: String::new(),
        }
    }
}

impl Config {
    pub fn unmarshal(input: &str) -> Result<Self> {
        if input.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(input).map_err(|e| BridgeError::InvalidConfig(e.to_string()))
    }

    /// Read the config file, falling back to the debug path when the fixed
    /// path is unreadable.
    pub fn load() -> Result<Self> {
        let data = std::fs::read_to_string(CONFIG_FILE)
            .or_else(|_| std::fs::read_to_string(DEBUG_CONFIG_FILE))
            .map_err(|e| BridgeError::InvalidConfig(format!("read {CONFIG_FILE}: {e}")))?;
        Self::unmarshal(&data)
    }

    pub fn validate(&self) -> Result<()> {
        if self.scheduler_name.is_empty() {
            return Err(BridgeError::InvalidConfig(
                "schedulerName cannot be empty".to_string(),
            ));
        }
        if self.slurm_rest_api.is_empty() {
            return Err(BridgeError::InvalidConfig(
                "slurmRestApi cannot be empty".to_string(),
            ));
        }
        Ok(())
    }
}
