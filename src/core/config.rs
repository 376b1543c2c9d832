use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::{info, warn};

use crate::core::errors::{BridgeError, Result};

/// Environment variable naming the engine config file.
pub const CONFIG_ENV: &str = "BRIDGE_CONFIG";
pub const DEFAULT_CONFIG_PATH: &str = "bridge.toml";

/// Fixed-delay polling of one kind of chain observation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollPolicy {
    /// Delay between two looks at the chain, roughly one block
    pub interval_ms: u64,
    /// Looks before the step gives up with a timeout
    pub max_attempts: usize,
}

impl PollPolicy {
    pub fn new(interval: Duration, max_attempts: usize) -> Self {
        Self { interval_ms: interval.as_millis() as u64, max_attempts }
    }

    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    /// Upper bound on the time spent polling.
    pub fn ceiling(&self) -> Duration {
        self.interval() * self.max_attempts.saturating_sub(1) as u32
    }
}

/// Polling configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollingConfig {
    /// SORA extrinsic inclusion and finality
    #[serde(default = "PollingConfig::default_sora")]
    pub sora: PollPolicy,

    /// External transaction mined and confirmed
    #[serde(default = "PollingConfig::default_external")]
    pub external: PollPolicy,

    /// Other chain's leg (request approval, relay, crediting)
    #[serde(default = "PollingConfig::default_counterpart")]
    pub counterpart: PollPolicy,
}

impl PollingConfig {
    fn default_sora() -> PollPolicy {
        PollPolicy { interval_ms: 6_000, max_attempts: 100 }
    }
    fn default_external() -> PollPolicy {
        PollPolicy { interval_ms: 15_000, max_attempts: 240 }
    }
    fn default_counterpart() -> PollPolicy {
        PollPolicy { interval_ms: 6_000, max_attempts: 600 }
    }

    /// Same policy for every kind of observation.
    pub fn uniform(policy: PollPolicy) -> Self {
        Self { sora: policy, external: policy, counterpart: policy }
    }

    /// Every policy must allow at least one observation.
    pub fn validate(&self) -> Result<()> {
        for (name, policy) in [
            ("polling.sora", &self.sora),
            ("polling.external", &self.external),
            ("polling.counterpart", &self.counterpart),
        ] {
            if policy.max_attempts == 0 {
                return Err(BridgeError::Configuration(format!(
                    "{}.max_attempts must be at least 1",
                    name
                )));
            }
        }
        Ok(())
    }
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            sora: Self::default_sora(),
            external: Self::default_external(),
            counterpart: Self::default_counterpart(),
        }
    }
}

/// Storage configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "StoreConfig::default_url")]
    pub url: String,
}

impl StoreConfig {
    fn default_url() -> String {
        "sqlite://./data/bridge.db".to_string()
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self { url: Self::default_url() }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventsConfig {
    /// Recent events kept in memory
    #[serde(default = "EventsConfig::default_buffer_size")]
    pub buffer_size: usize,
}

impl EventsConfig {
    fn default_buffer_size() -> usize {
        1000
    }
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self { buffer_size: Self::default_buffer_size() }
    }
}

/// Simulated chain backends used by the CLI
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimulationConfig {
    /// Pending observations before a leg confirms
    #[serde(default = "SimulationConfig::default_confirm_after")]
    pub confirm_after: usize,

    /// Network name the simulated EVM adapter reports
    #[serde(default = "SimulationConfig::default_evm_network")]
    pub evm_network: String,
}

impl SimulationConfig {
    fn default_confirm_after() -> usize {
        2
    }
    fn default_evm_network() -> String {
        "ethereum".to_string()
    }
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            confirm_after: Self::default_confirm_after(),
            evm_network: Self::default_evm_network(),
        }
    }
}

/// Engine configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub polling: PollingConfig,
    #[serde(default)]
    pub events: EventsConfig,
    #[serde(default)]
    pub simulation: SimulationConfig,
}

impl EngineConfig {
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: EngineConfig = toml::from_str(content)
            .map_err(|e| BridgeError::Configuration(format!("Invalid engine config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            BridgeError::Configuration(format!("Failed to read {}: {}", path.display(), e))
        })?;
        let config = Self::from_toml_str(&content)?;
        info!(path = %path.display(), "Loaded engine config");
        Ok(config)
    }

    /// Reads `$BRIDGE_CONFIG` (or `bridge.toml`), falling back to defaults.
    pub fn load_or_default() -> Self {
        let path = std::env::var(CONFIG_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        Self::load(&path).unwrap_or_else(|e| {
            warn!("Failed to load {}: {}. Using default configuration", path, e);
            Self::default()
        })
    }

    pub fn validate(&self) -> Result<()> {
        self.polling.validate()?;
        if self.store.url.trim().is_empty() {
            return Err(BridgeError::Configuration("store.url is empty".to_string()));
        }
        Ok(())
    }
}
