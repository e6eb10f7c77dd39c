//! Engine configuration: the fixed parameter set from spec §6.4. Most
//! fields mirror `ouro_sdk::types::MicrochainConfig`'s shape (plain
//! struct, `Default` impl, a couple of mandatory fields the caller must
//! override).

use crate::logic_abi::FunctionDescriptor;
use std::collections::HashMap;

pub type PureVerifierFn = std::sync::Arc<dyn Fn(&[u8], &[u8; 32]) -> bool + Send + Sync>;

/// `proof_options` is fixed by the protocol, not user-configurable; kept
/// as a marker type so call sites that pass it read as documentation.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProofOptions {
    pub compact: bool,
    pub simple: bool,
}

impl ProofOptions {
    pub const FIXED: ProofOptions = ProofOptions { compact: true, simple: true };
}

#[derive(Debug, Clone, Copy)]
pub struct TreeOptions {
    pub unbalanced: bool,
    pub sorted_hash: bool,
    pub element_prefix: u8,
}

impl TreeOptions {
    pub fn fixed(element_prefix: u8) -> Self {
        TreeOptions { unbalanced: true, sorted_hash: false, element_prefix }
    }
}

#[derive(Clone)]
pub struct EngineConfig {
    pub element_prefix: u8,
    pub lock_time_seconds: u64,
    pub required_bond_wei: u128,
    pub source_address: Option<[u8; 20]>,
    pub pure_verifiers: HashMap<[u8; 4], PureVerifierFn>,
    pub logic_abi_functions: Vec<FunctionDescriptor>,
}

impl EngineConfig {
    pub fn new(lock_time_seconds: u64, required_bond_wei: u128) -> Self {
        Self {
            element_prefix: 0x00,
            lock_time_seconds,
            required_bond_wei,
            source_address: None,
            pure_verifiers: HashMap::new(),
            logic_abi_functions: Vec::new(),
        }
    }

    pub fn tree_options(&self) -> TreeOptions {
        TreeOptions::fixed(self.element_prefix)
    }

    pub fn proof_options(&self) -> ProofOptions {
        ProofOptions::FIXED
    }

    pub fn with_source_address(mut self, addr: [u8; 20]) -> Self {
        self.source_address = Some(addr);
        self
    }

    pub fn with_element_prefix(mut self, prefix: u8) -> Self {
        self.element_prefix = prefix;
        self
    }

    pub fn with_pure_verifier(mut self, sighash: [u8; 4], f: PureVerifierFn) -> Self {
        self.pure_verifiers.insert(sighash, f);
        self
    }
}

impl std::fmt::Debug for EngineConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineConfig")
            .field("element_prefix", &self.element_prefix)
            .field("lock_time_seconds", &self.lock_time_seconds)
            .field("required_bond_wei", &self.required_bond_wei)
            .field("source_address", &self.source_address)
            .field("pure_verifiers", &self.pure_verifiers.keys().collect::<Vec<_>>())
            .finish()
    }
}
