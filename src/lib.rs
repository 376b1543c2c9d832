// src/lib.rs
//! Lifecycle engine for SORA cross-chain bridge transfers.
//!
//! A [`Bridge`](blockchain::bridge::Bridge) routes each stored transaction to
//! the reducer of its type and drives it, one persisted step at a time, to
//! the done or a failed state declared in the boundary table.

pub mod blockchain;
pub mod core;
pub mod storage;

pub use blockchain::bridge::{
    Bridge, BridgeBuilder, BridgeState, BridgeTransaction, NewTransfer, ProcessOutcome,
    TransactionType,
};
pub use crate::core::errors::{BridgeError, Result};
