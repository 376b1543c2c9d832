pub mod bridge;
pub mod traits;

pub use bridge::{BridgeState, BridgeTransaction, TransactionType};
pub use traits::{AssetRegistry, Counterpart, ExternalChain, LegReceipt, Observation, SoraChain};
