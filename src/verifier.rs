//! The transition verifier: local pure-verifier registry with a remote
//! `eth_call` fallback (spec §4.4). Grounded on
//! `ouro_dag::subchain::fraud::FraudProofManager`'s per-type dispatch
//! table pattern, generalized from fraud-type keys to calldata
//! sighashes.

use crate::calldata::decode_logic_call;
use crate::chain::ChainAdapter;
use crate::config::PureVerifierFn;
use crate::encoding::Address;
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};

pub struct Verifier<'a> {
    pure_verifiers: &'a HashMap<[u8; 4], PureVerifierFn>,
    chain: &'a dyn ChainAdapter,
}

impl<'a> Verifier<'a> {
    pub fn new(pure_verifiers: &'a HashMap<[u8; 4], PureVerifierFn>, chain: &'a dyn ChainAdapter) -> Self {
        Self { pure_verifiers, chain }
    }

    /// §4.4: decode, check embedded user, try a local pure verifier,
    /// otherwise delegate to chain. Any error becomes `false` — nothing
    /// escapes this boundary except via `log::warn!`/`log::debug!`.
    pub async fn is_valid(&self, suspect: &Address, calldata_blob: &[u8], proposed_new_state: &[u8; 32]) -> bool {
        let decoded = match decode_logic_call(calldata_blob) {
            Ok(d) => d,
            Err(e) => {
                log::warn!("verifier: decode failure for suspect {}: {e}", crate::encoding::lowercase_address(suspect));
                return false;
            }
        };

        if &decoded.user != suspect {
            log::debug!("verifier: embedded user does not match suspect, rejecting");
            return false;
        }

        if let Some(verifier_fn) = self.pure_verifiers.get(&decoded.sighash) {
            let outcome = catch_unwind(AssertUnwindSafe(|| verifier_fn(calldata_blob, proposed_new_state)));
            return match outcome {
                Ok(result) => result,
                Err(_) => {
                    log::debug!("verifier: pure verifier panicked for sighash {:?}", decoded.sighash);
                    false
                }
            };
        }

        match self.chain.eth_call(suspect, calldata_blob).await {
            Ok(returned) => &returned == proposed_new_state,
            Err(e) => {
                log::warn!("verifier: eth_call fallback failed: {e}");
                false
            }
        }
    }

    /// §4.4 batch verification. `state_0` is the account's current state
    /// before the batch; `state_i` for `i>0` is decoded from blob `i`;
    /// the state after the last blob is `final_state`. Returns the index
    /// of the first failing transition, or `None` if the whole batch is
    /// valid.
    pub async fn verify_batch(
        &self,
        suspect: &Address,
        blobs: &[Vec<u8>],
        state_0: [u8; 32],
        final_state: [u8; 32],
    ) -> Option<usize> {
        if let Some(first) = blobs.first() {
            match decode_logic_call(first) {
                Ok(d) if d.current_state == state_0 => {}
                _ => return Some(0),
            }
        }

        for i in 0..blobs.len() {
            let expected_next = if i + 1 < blobs.len() {
                match decode_logic_call(&blobs[i + 1]) {
                    Ok(d) => d.current_state,
                    Err(_) => return Some(i),
                }
            } else {
                final_state
            };
            if !self.is_valid(suspect, &blobs[i], &expected_next).await {
                return Some(i);
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calldata::encode_logic_call;
    use crate::error::Result;
    use crate::events::LogEntry;
    use async_trait::async_trait;
    use std::sync::Arc;

    struct NullChain;

    #[async_trait]
    impl ChainAdapter for NullChain {
        async fn get_transaction_input(&self, _tx_id: &str) -> Result<Vec<u8>> {
            unimplemented!()
        }
        async fn get_receipt_logs(&self, _tx_id: &str) -> Result<Vec<LogEntry>> {
            unimplemented!()
        }
        async fn eth_call(&self, _to: &Address, _data: &[u8]) -> Result<[u8; 32]> {
            Ok([0u8; 32])
        }
        async fn account_state(&self, _user: &Address) -> Result<[u8; 32]> {
            unimplemented!()
        }
        async fn block_timestamp(&self) -> Result<u64> {
            unimplemented!()
        }
        async fn balance(&self, _user: &Address) -> Result<u128> {
            unimplemented!()
        }
        async fn locker(&self, _user: &Address) -> Result<Address> {
            unimplemented!()
        }
        async fn locked_timestamp(&self, _user: &Address) -> Result<u64> {
            unimplemented!()
        }
        async fn rollback_size(&self, _user: &Address) -> Result<u64> {
            unimplemented!()
        }
        async fn send_transaction(&self, _to: &Address, _data: &[u8], _value_wei: u128) -> Result<String> {
            unimplemented!()
        }
    }

    #[tokio::test]
    async fn rejects_when_embedded_user_mismatches_suspect() {
        let verifiers = HashMap::new();
        let chain = NullChain;
        let verifier = Verifier::new(&verifiers, &chain);
        let blob = encode_logic_call([1, 2, 3, 4], &[0xAA; 20], &[0u8; 32], &[]);
        assert!(!verifier.is_valid(&[0xBB; 20], &blob, &[0u8; 32]).await);
    }

    #[tokio::test]
    async fn local_pure_verifier_is_preferred_over_chain() {
        let mut verifiers: HashMap<[u8; 4], PureVerifierFn> = HashMap::new();
        verifiers.insert([1, 2, 3, 4], Arc::new(|_blob, expected| expected == &[0x42u8; 32]));
        let chain = NullChain;
        let verifier = Verifier::new(&verifiers, &chain);
        let suspect = [0xAAu8; 20];
        let blob = encode_logic_call([1, 2, 3, 4], &suspect, &[0u8; 32], &[]);
        assert!(verifier.is_valid(&suspect, &blob, &[0x42u8; 32]).await);
        assert!(!verifier.is_valid(&suspect, &blob, &[0x01u8; 32]).await);
    }

    #[tokio::test]
    async fn pure_verifier_panic_becomes_false() {
        let mut verifiers: HashMap<[u8; 4], PureVerifierFn> = HashMap::new();
        verifiers.insert([1, 2, 3, 4], Arc::new(|_blob, _expected| panic!("boom")));
        let chain = NullChain;
        let verifier = Verifier::new(&verifiers, &chain);
        let suspect = [0xAAu8; 20];
        let blob = encode_logic_call([1, 2, 3, 4], &suspect, &[0u8; 32], &[]);
        assert!(!verifier.is_valid(&suspect, &blob, &[0x42u8; 32]).await);
    }
}
