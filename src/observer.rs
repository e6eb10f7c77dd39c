//! The semantic decoder/observer (spec §4.7): given a transaction id,
//! decode inputs and receipt logs, classify the transaction, and
//! dispatch to the verifier or the fraud tracker. Grounded on
//! `ouro_sdk::client`'s typed-response-decode style and
//! `ouro_dag::indexer`'s tx-id driven lookups.

use crate::calldata::{decode_arbiter_call, is_batch_sighash};
use crate::chain::ChainAdapter;
use crate::config::PureVerifierFn;
use crate::encoding::Address;
use crate::error::Result;
use crate::events::find_optimistic_log;
use crate::fraud::FraudTracker;
use crate::verifier::Verifier;
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifyOutcome {
    pub valid: bool,
    pub user: Option<Address>,
}

pub struct Observer<'a> {
    chain: &'a dyn ChainAdapter,
    pure_verifiers: &'a HashMap<[u8; 4], PureVerifierFn>,
    element_prefix: u8,
}

impl<'a> Observer<'a> {
    pub fn new(chain: &'a dyn ChainAdapter, pure_verifiers: &'a HashMap<[u8; 4], PureVerifierFn>, element_prefix: u8) -> Self {
        Self { chain, pure_verifiers, element_prefix }
    }

    /// §4.7 steps 1-5.
    pub async fn verify_transaction(&self, tx_id: &str, fraud_tracker: &mut FraudTracker) -> Result<VerifyOutcome> {
        let input = self.chain.get_transaction_input(tx_id).await?;
        let logs = self.chain.get_receipt_logs(tx_id).await?;

        let Some(call) = decode_arbiter_call(&input)? else {
            return Ok(VerifyOutcome { valid: true, user: None });
        };

        let Some((suspect, last_time)) = find_optimistic_log(&logs)? else {
            return Ok(VerifyOutcome { valid: true, user: None });
        };

        let verifier = Verifier::new(self.pure_verifiers, self.chain);

        let failing_index = if is_batch_sighash(call.sighash) {
            let first_state = crate::calldata::decode_logic_call(
                call.blobs.first().ok_or_else(|| crate::error::EngineError::DecodeError("empty batch".into()))?,
            )?
            .current_state;
            verifier.verify_batch(&suspect, &call.blobs, first_state, call.new_state).await
        } else {
            let blob = &call.blobs[0];
            if verifier.is_valid(&suspect, blob, &call.new_state).await {
                None
            } else {
                Some(0)
            }
        };

        match failing_index {
            None => Ok(VerifyOutcome { valid: true, user: Some(suspect) }),
            Some(idx) => {
                log::warn!(
                    "observer: fraud detected for suspect {} at local index {idx}",
                    crate::encoding::lowercase_address(&suspect)
                );
                fraud_tracker.record_fraud(
                    suspect,
                    self.element_prefix,
                    call.blobs,
                    &call.proof,
                    idx as u64,
                    call.new_state,
                    last_time,
                )?;
                Ok(VerifyOutcome { valid: false, user: Some(suspect) })
            }
        }
    }

    /// §4.7 "update": same fetch/decode, but against an already-tracked
    /// fraudster — checks preconditions and appends.
    pub async fn update(&self, tx_id: &str, fraud_tracker: &mut FraudTracker) -> Result<()> {
        let input = self.chain.get_transaction_input(tx_id).await?;
        let logs = self.chain.get_receipt_logs(tx_id).await?;

        let call = decode_arbiter_call(&input)?
            .ok_or_else(|| crate::error::EngineError::DecodeError("transaction is not an optimistic record".into()))?;
        let (suspect, last_time) = find_optimistic_log(&logs)?
            .ok_or_else(|| crate::error::EngineError::DecodeError("no optimistic-state log in receipt".into()))?;

        let declared_prior_root = call.previous_root.unwrap_or([0u8; 32]);
        let declared_prior_last_time = call.previous_last_time.unwrap_or(0);

        let fraudster = fraud_tracker
            .get_mut(&suspect)
            .ok_or(crate::error::EngineError::NotFraudulent)?;

        fraudster.apply_update(&suspect, declared_prior_root, declared_prior_last_time, call.blobs, call.new_state, last_time)
    }
}
