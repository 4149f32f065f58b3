//! Dual-gate enablement for discovery.
//!
//! Discovery runs only when the persisted config flag AND the runtime
//! environment flag both allow it. The gate is evaluated fresh on every call.
use crate::workspace::DiscoveryConfig;
use std::env;

/// Runtime half of the gate.
pub const DISCOVERY_ENV: &str = "IPACK_DISCOVERY";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Gate {
    pub config_enabled: bool,
    pub env_enabled: bool,
}

impl Gate {
    /// Read both signals now.
    pub fn evaluate(config: &DiscoveryConfig) -> Self {
        let env_value = env::var(DISCOVERY_ENV).ok();
        Self::from_sources(config.enabled, env_value.as_deref())
    }

    pub fn from_sources(config_enabled: bool, env_value: Option<&str>) -> Self {
        Self {
            config_enabled,
            env_enabled: env_value.is_some_and(is_truthy),
        }
    }

    pub fn is_open(&self) -> bool {
        self.config_enabled && self.env_enabled
    }

    /// Human-readable reason the gate is closed, if it is.
    pub fn skip_reason(&self) -> Option<String> {
        if self.is_open() {
            return None;
        }
        let reason = match (self.config_enabled, self.env_enabled) {
            (false, false) => format!(
                "discovery.enabled is false in config.json and {DISCOVERY_ENV} is not set"
            ),
            (false, true) => "discovery.enabled is false in config.json".to_string(),
            _ => format!("{DISCOVERY_ENV} is not set to a truthy value"),
        };
        Some(reason)
    }
}

fn is_truthy(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}
