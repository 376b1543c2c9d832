pub mod config;
pub mod errors;
pub mod validation;

pub use config::{EngineConfig, PollPolicy, PollingConfig};
pub use errors::{BridgeError, Result};
