pub mod account;
pub mod calldata;
pub mod chain;
pub mod config;
pub mod encoding;
pub mod error;
pub mod events;
pub mod fraud;
pub mod logic_abi;
pub mod merkle;
pub mod observer;
pub mod operator;
pub mod queue;
pub mod verifier;

pub use account::{Account, Fingerprint};
pub use chain::{ChainAdapter, JsonRpcChainAdapter};
pub use config::EngineConfig;
pub use error::{EngineError, Result};
pub use fraud::{FraudTracker, Fraudster};
pub use logic_abi::{FunctionDescriptor, LogicAbi, Mutability};
pub use merkle::{AppendProof, CallDataTree, MerkleCapability, MultiProof, SingleProof, SizeProof};
pub use observer::{Observer, VerifyOutcome};
pub use operator::{CallOptions, Operator};
pub use queue::{Queue, QueuedTransition};
pub use verifier::Verifier;

/// Engine version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::account::{Account, Fingerprint};
    pub use crate::chain::{ChainAdapter, JsonRpcChainAdapter};
    pub use crate::config::EngineConfig;
    pub use crate::error::{EngineError, Result};
    pub use crate::fraud::{FraudTracker, Fraudster};
    pub use crate::merkle::{CallDataTree, MerkleCapability};
    pub use crate::observer::{Observer, VerifyOutcome};
    pub use crate::operator::{CallOptions, Operator};
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }
}
