//! Fraud tracking (spec §4.5): per-suspect partial-tree fraudster
//! objects, their record/update/delete lifecycle, and fraud-proof
//! construction. Grounded on `ouro_dag::subchain::fraud::FraudProofManager`
//! and `ouro_dag::microchain::challenges`'s challenge/status framing.

use crate::account::Account;
use crate::encoding::{lowercase_address, Address};
use crate::error::{EngineError, Result};
use crate::merkle::{AppendProof, CallDataTree, MerkleCapability, MultiProof};
use std::collections::HashMap;

/// An Account built from a partial tree, with a `fraud_index` pointing
/// at the first invalid transition (invariant 3, §3). A fraudster's own
/// fraud map is always empty — it cannot itself track fraud.
pub struct Fraudster {
    pub account: Account,
}

impl Fraudster {
    pub fn fraud_index(&self) -> u64 {
        self.account.fraud_index.expect("fraudster always has a fraud_index")
    }

    /// §4.5 "update": extend the partial tree by the newly observed
    /// blob(s) after checking all four hard preconditions.
    pub fn apply_update(
        &mut self,
        observed_user: &Address,
        declared_prior_root: [u8; 32],
        declared_prior_last_time: u64,
        new_blobs: Vec<Vec<u8>>,
        new_state: [u8; 32],
        new_last_time: u64,
    ) -> Result<()> {
        if observed_user != &self.account.user {
            return Err(EngineError::PreconditionFailed("observed user does not match fraudster's user".into()));
        }
        if declared_prior_root != self.account.tree.root() {
            return Err(EngineError::InvalidRoots("declared prior root does not match fraudster's partial root".into()));
        }
        if declared_prior_last_time != self.account.last_time {
            return Err(EngineError::InvalidRoots("declared prior last_time does not match fraudster's last_time".into()));
        }
        let first_blob = new_blobs.first().ok_or_else(|| EngineError::PreconditionFailed("update with no blobs".into()))?;
        let decoded = crate::calldata::decode_logic_call(first_blob)?;
        if decoded.current_state != self.account.current_state {
            return Err(EngineError::StateMismatch("first blob's embedded current_state differs from fraudster's".into()));
        }

        self.account.tree.append_many(new_blobs);
        self.account.current_state = new_state;
        self.account.last_time = new_last_time;
        Ok(())
    }

    /// §4.5 fraud-proof construction: multi-proof of `{fraud_index,
    /// fraud_index+1}` on the partial tree.
    pub fn build_fraud_proof(&self) -> Result<MultiProof> {
        let idx = self.fraud_index();
        self.account.tree.multi_proof(&[idx, idx + 1])
    }

    /// Idempotence guard: once the fraud proof is submitted, clear the
    /// index so a second `prove_fraud` fails with `NotFraudulent`.
    pub fn clear_fraud_index(&mut self) {
        self.account.fraud_index = None;
    }
}

/// Owns the map of lower-cased suspect address -> fraudster. Deletion is
/// by value: callers remove a fraudster after awaiting a successful
/// proof submission, rather than the fraudster reaching back into its
/// owner (design note: no cyclic shared ownership).
#[derive(Default)]
pub struct FraudTracker {
    fraudsters: HashMap<String, Fraudster>,
}

impl FraudTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a new fraudster from an observed append proof and the
    /// local index of the invalid transition within the appended blobs.
    pub fn record_fraud(
        &mut self,
        suspect: Address,
        element_prefix: u8,
        blobs: Vec<Vec<u8>>,
        proof: &AppendProof,
        local_fraud_index: u64,
        current_state: [u8; 32],
        last_time: u64,
    ) -> Result<()> {
        let appended_count = blobs.len() as u64;
        let partial_tree = CallDataTree::from_append_proof(element_prefix, blobs, proof);
        let fraud_index = partial_tree.len() - appended_count + local_fraud_index;
        let account = Account::from_partial_tree(suspect, partial_tree, current_state, last_time, fraud_index);
        self.fraudsters.insert(lowercase_address(&suspect), Fraudster { account });
        Ok(())
    }

    pub fn get(&self, suspect: &Address) -> Option<&Fraudster> {
        self.fraudsters.get(&lowercase_address(suspect))
    }

    pub fn get_mut(&mut self, suspect: &Address) -> Option<&mut Fraudster> {
        self.fraudsters.get_mut(&lowercase_address(suspect))
    }

    pub fn delete(&mut self, suspect: &Address) -> Option<Fraudster> {
        self.fraudsters.remove(&lowercase_address(suspect))
    }

    pub fn len(&self) -> usize {
        self.fraudsters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fraudsters.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calldata::encode_logic_call;

    fn blob_for(user: Address, state: [u8; 32]) -> Vec<u8> {
        encode_logic_call([1, 2, 3, 4], &user, &state, &[])
    }

    #[test]
    fn record_and_retrieve_fraudster() {
        let mut full = CallDataTree::new(0x00);
        let suspect = [0xAAu8; 20];
        full.append_many(vec![blob_for(suspect, [0u8; 32]), blob_for(suspect, [1u8; 32])]);
        let proof = full.append_many(vec![blob_for(suspect, [2u8; 32])]);

        let mut tracker = FraudTracker::new();
        tracker
            .record_fraud(suspect, 0x00, vec![blob_for(suspect, [2u8; 32])], &proof, 0, [9u8; 32], 100)
            .unwrap();

        let fraudster = tracker.get(&suspect).unwrap();
        assert_eq!(fraudster.fraud_index(), 2);
        assert_eq!(tracker.len(), 1);
    }

    #[test]
    fn update_rejects_mismatched_prior_root() {
        let mut full = CallDataTree::new(0x00);
        let suspect = [0xAAu8; 20];
        let proof = full.append_many(vec![blob_for(suspect, [0u8; 32])]);

        let mut tracker = FraudTracker::new();
        tracker.record_fraud(suspect, 0x00, vec![blob_for(suspect, [0u8; 32])], &proof, 0, [1u8; 32], 50).unwrap();

        let fraudster = tracker.get_mut(&suspect).unwrap();
        let result = fraudster.apply_update(&suspect, [0xffu8; 32], 50, vec![blob_for(suspect, [1u8; 32])], [2u8; 32], 60);
        assert!(result.is_err());
    }

    #[test]
    fn successful_update_then_delete() {
        let mut full = CallDataTree::new(0x00);
        let suspect = [0xAAu8; 20];
        let proof = full.append_many(vec![blob_for(suspect, [0u8; 32])]);

        let mut tracker = FraudTracker::new();
        tracker.record_fraud(suspect, 0x00, vec![blob_for(suspect, [0u8; 32])], &proof, 0, [1u8; 32], 50).unwrap();

        let prior_root = tracker.get(&suspect).unwrap().account.tree.root();
        let fraudster = tracker.get_mut(&suspect).unwrap();
        fraudster.apply_update(&suspect, prior_root, 50, vec![blob_for(suspect, [1u8; 32])], [2u8; 32], 60).unwrap();
        assert_eq!(fraudster.account.current_state, [2u8; 32]);

        assert!(tracker.delete(&suspect).is_some());
        assert!(tracker.is_empty());
    }
}
