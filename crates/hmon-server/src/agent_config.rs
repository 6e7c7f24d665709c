use crate::catalog::load_catalog;
use anyhow::Result;
use hmon_storage::MonitorStore;
use hmon_template::{ConfigResolver, EffectiveConfig, ResolveError};
use serde::Serialize;

/// Collection configuration handed to a device's agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AgentConfig {
    pub device_id: String,
    pub hostname: String,
    pub templates: Vec<String>,
    pub items: Vec<AgentItem>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AgentItem {
    pub key: String,
    pub value_kind: String,
    pub interval_secs: u64,
}

impl From<EffectiveConfig> for AgentConfig {
    fn from(config: EffectiveConfig) -> Self {
        Self {
            device_id: config.device_id,
            hostname: config.hostname,
            templates: config.templates,
            items: config
                .items
                .into_iter()
                .map(|item| AgentItem {
                    key: item.key,
                    value_kind: item.value_kind,
                    interval_secs: item.interval_secs,
                })
                .collect(),
        }
    }
}

/// Resolves the agent configuration of `device_id`. Returns `None` for an
/// unknown device.
pub fn agent_config(store: &dyn MonitorStore, device_id: &str) -> Result<Option<AgentConfig>> {
    let catalog = load_catalog(store)?;
    match ConfigResolver::new(&catalog).effective_config(device_id) {
        Ok(config) => {
            for error in &config.errors {
                tracing::warn!(device_id, error = %error, "Template skipped in agent config");
            }
            Ok(Some(config.into()))
        }
        Err(ResolveError::DeviceNotFound(_)) => Ok(None),
        Err(e) => Err(e.into()),
    }
}
