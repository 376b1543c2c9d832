// src/blockchain/bridge/mod.rs

pub mod boundary;
pub mod events;
pub mod evm;
pub mod hashi;
pub mod hooks;
pub mod orchestrator;
pub mod polling;
pub mod reducer;
pub mod simulated;
pub mod substrate;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::core::errors::BridgeError;

pub use boundary::{BoundaryStates, BoundaryTable};
pub use events::{BridgeEvent, EventBus, EventSubscriber, LoggingSubscriber, StatisticsSubscriber};
pub use hooks::{BridgeHooks, NoopHooks, TracingHooks};
pub use orchestrator::{Bridge, BridgeBuilder, ProcessOutcome};
pub use reducer::{BridgeReducer, ReducerContext, ReducerFactory, ReducerRun, Step, Transition};

/// Bridge family a transaction belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BridgeFamily {
    /// SORA <-> Ethereum (HASHI bridge, peers approve each request)
    Hashi,
    /// SORA <-> EVM network, relayed
    Evm,
    /// SORA <-> parachain through the relay chain
    Substrate,
}

/// Direction relative to SORA.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransferDirection {
    /// Leaves SORA
    Outgoing,
    /// Arrives on SORA
    Incoming,
}

/// Closed set of bridge transaction types. The reducer registry is keyed by it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransactionType {
    EthBridgeOutgoing,
    EthBridgeIncoming,
    EvmOutgoing,
    EvmIncoming,
    SubstrateOutgoing,
    SubstrateIncoming,
}

impl TransactionType {
    pub const ALL: [TransactionType; 6] = [
        TransactionType::EthBridgeOutgoing,
        TransactionType::EthBridgeIncoming,
        TransactionType::EvmOutgoing,
        TransactionType::EvmIncoming,
        TransactionType::SubstrateOutgoing,
        TransactionType::SubstrateIncoming,
    ];

    pub fn family(&self) -> BridgeFamily {
        match self {
            Self::EthBridgeOutgoing | Self::EthBridgeIncoming => BridgeFamily::Hashi,
            Self::EvmOutgoing | Self::EvmIncoming => BridgeFamily::Evm,
            Self::SubstrateOutgoing | Self::SubstrateIncoming => BridgeFamily::Substrate,
        }
    }

    pub fn direction(&self) -> TransferDirection {
        match self {
            Self::EthBridgeOutgoing | Self::EvmOutgoing | Self::SubstrateOutgoing => {
                TransferDirection::Outgoing
            }
            Self::EthBridgeIncoming | Self::EvmIncoming | Self::SubstrateIncoming => {
                TransferDirection::Incoming
            }
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::EthBridgeOutgoing => "EthBridgeOutgoing",
            Self::EthBridgeIncoming => "EthBridgeIncoming",
            Self::EvmOutgoing => "EvmOutgoing",
            Self::EvmIncoming => "EvmIncoming",
            Self::SubstrateOutgoing => "SubstrateOutgoing",
            Self::SubstrateIncoming => "SubstrateIncoming",
        }
    }
}

impl fmt::Display for TransactionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransactionType {
    type Err = BridgeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TransactionType::ALL
            .into_iter()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| BridgeError::InvalidInput(format!("Unknown transaction type: {}", s)))
    }
}

/// Position of a transaction in its type's state chain.
///
/// The same variants are shared by every family; which ones are reachable,
/// and which are terminal, depends on the transaction type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BridgeState {
    Initial,
    SoraSubmitted,
    SoraPending,
    SoraCommitted,
    SoraRejected,
    ExternalSubmitted,
    ExternalPending,
    ExternalCommitted,
    ExternalRejected,
}

impl BridgeState {
    pub const ALL: [BridgeState; 9] = [
        BridgeState::Initial,
        BridgeState::SoraSubmitted,
        BridgeState::SoraPending,
        BridgeState::SoraCommitted,
        BridgeState::SoraRejected,
        BridgeState::ExternalSubmitted,
        BridgeState::ExternalPending,
        BridgeState::ExternalCommitted,
        BridgeState::ExternalRejected,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Initial => "Initial",
            Self::SoraSubmitted => "SoraSubmitted",
            Self::SoraPending => "SoraPending",
            Self::SoraCommitted => "SoraCommitted",
            Self::SoraRejected => "SoraRejected",
            Self::ExternalSubmitted => "ExternalSubmitted",
            Self::ExternalPending => "ExternalPending",
            Self::ExternalCommitted => "ExternalCommitted",
            Self::ExternalRejected => "ExternalRejected",
        }
    }
}

impl fmt::Display for BridgeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BridgeState {
    type Err = BridgeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        BridgeState::ALL
            .into_iter()
            .find(|state| state.as_str() == s)
            .ok_or_else(|| BridgeError::Storage(format!("Unknown bridge state: {}", s)))
    }
}

/// Persisted bridge transaction record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BridgeTransaction {
    pub id: String,
    pub kind: TransactionType,
    pub state: BridgeState,
    pub asset_address: String,
    pub amount: String,
    pub from: String,
    pub to: String,
    /// External network label (chain id or parachain name)
    #[serde(default)]
    pub network: Option<String>,
    /// SORA block containing the submitted extrinsic
    #[serde(default)]
    pub block_id: Option<String>,
    /// SORA extrinsic id
    #[serde(default)]
    pub tx_id: Option<String>,
    /// SORA extrinsic hash or bridge request hash, once observed
    #[serde(default)]
    pub hash: Option<String>,
    #[serde(default)]
    pub external_hash: Option<String>,
    #[serde(default)]
    pub external_block_id: Option<String>,
    pub start_time: DateTime<Utc>,
    #[serde(default)]
    pub end_time: Option<DateTime<Utc>>,
    /// Error marker of the last rejected step
    #[serde(default)]
    pub error: Option<String>,
}

impl BridgeTransaction {
    /// Fresh record at the initial (unsigned) state.
    pub fn new(request: &NewTransfer) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            kind: request.kind,
            state: BridgeState::Initial,
            asset_address: request.asset_address.clone(),
            amount: request.amount.clone(),
            from: request.from.clone(),
            to: request.to.clone(),
            network: request.network.clone(),
            block_id: None,
            tx_id: None,
            hash: None,
            external_hash: None,
            external_block_id: None,
            start_time: Utc::now(),
            end_time: None,
            error: None,
        }
    }

    /// Applies the `Some` fields of a patch.
    pub fn apply(&mut self, patch: &TransactionPatch) {
        if let Some(state) = patch.state {
            self.state = state;
        }
        merge(&mut self.block_id, &patch.block_id);
        merge(&mut self.tx_id, &patch.tx_id);
        merge(&mut self.hash, &patch.hash);
        merge(&mut self.external_hash, &patch.external_hash);
        merge(&mut self.external_block_id, &patch.external_block_id);
        if patch.end_time.is_some() {
            self.end_time = patch.end_time;
        }
        merge(&mut self.error, &patch.error);
    }
}

fn merge(field: &mut Option<String>, value: &Option<String>) {
    if let Some(v) = value {
        *field = Some(v.clone());
    }
}

/// Partial update merged into a stored transaction.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TransactionPatch {
    pub state: Option<BridgeState>,
    pub block_id: Option<String>,
    pub tx_id: Option<String>,
    pub hash: Option<String>,
    pub external_hash: Option<String>,
    pub external_block_id: Option<String>,
    pub end_time: Option<DateTime<Utc>>,
    pub error: Option<String>,
}

impl TransactionPatch {
    pub fn state(state: BridgeState) -> Self {
        Self { state: Some(state), ..Default::default() }
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    pub fn with_state(mut self, state: BridgeState) -> Self {
        self.state = Some(state);
        self
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    /// Field-wise merge; values already set in `self` win.
    pub fn or(mut self, other: TransactionPatch) -> Self {
        self.state = self.state.or(other.state);
        self.block_id = self.block_id.or(other.block_id);
        self.tx_id = self.tx_id.or(other.tx_id);
        self.hash = self.hash.or(other.hash);
        self.external_hash = self.external_hash.or(other.external_hash);
        self.external_block_id = self.external_block_id.or(other.external_block_id);
        self.end_time = self.end_time.or(other.end_time);
        self.error = self.error.or(other.error);
        self
    }
}

/// User request for a new bridge transfer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewTransfer {
    pub kind: TransactionType,
    pub asset_address: String,
    pub amount: String,
    pub from: String,
    pub to: String,
    #[serde(default)]
    pub network: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> NewTransfer {
        NewTransfer {
            kind: TransactionType::EvmOutgoing,
            asset_address: "0x0200000000000000000000000000000000000000000000000000000000000000"
                .to_string(),
            amount: "1.5".to_string(),
            from: "cnVkoGs3rEMqLqY27c2nfVXJRGdzNJk2ns78DcqtppaSRe8qm".to_string(),
            to: "0x742d35Cc6634C0532925a3b844Bc454e4438f44e".to_string(),
            network: Some("1".to_string()),
        }
    }

    #[test]
    fn test_new_transaction_starts_initial() {
        let tx = BridgeTransaction::new(&request());
        assert_eq!(tx.state, BridgeState::Initial);
        assert!(tx.tx_id.is_none());
        assert!(uuid::Uuid::parse_str(&tx.id).is_ok());
    }

    #[test]
    fn test_apply_patch_merges_only_set_fields() {
        let mut tx = BridgeTransaction::new(&request());
        tx.hash = Some("0xold".to_string());
        let patch = TransactionPatch {
            state: Some(BridgeState::SoraSubmitted),
            tx_id: Some("t1".to_string()),
            ..Default::default()
        };
        tx.apply(&patch);
        assert_eq!(tx.state, BridgeState::SoraSubmitted);
        assert_eq!(tx.tx_id.as_deref(), Some("t1"));
        assert_eq!(tx.hash.as_deref(), Some("0xold"));
    }

    #[test]
    fn test_patch_or_prefers_self() {
        let a = TransactionPatch::state(BridgeState::SoraPending);
        let b = TransactionPatch {
            state: Some(BridgeState::SoraRejected),
            hash: Some("0xabc".to_string()),
            ..Default::default()
        };
        let merged = a.or(b);
        assert_eq!(merged.state, Some(BridgeState::SoraPending));
        assert_eq!(merged.hash.as_deref(), Some("0xabc"));
    }

    #[test]
    fn test_transaction_type_roundtrip_str() {
        for kind in TransactionType::ALL {
            assert_eq!(kind.as_str().parse::<TransactionType>().unwrap(), kind);
        }
        assert!("Unknown".parse::<TransactionType>().is_err());
    }

    #[test]
    fn test_family_and_direction() {
        assert_eq!(TransactionType::SubstrateIncoming.family(), BridgeFamily::Substrate);
        assert_eq!(TransactionType::EthBridgeOutgoing.direction(), TransferDirection::Outgoing);
    }
}
