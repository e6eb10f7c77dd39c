//! The account commitment model: tree + current state + last-time,
//! folded into a fingerprint (spec §3). Grounded on
//! `ouro_sdk::types::MicrochainState`'s plain-field-struct style.

use crate::encoding::{keccak256, u256_be, Address};
use crate::error::{EngineError, Result};
use crate::merkle::{CallDataTree, MerkleCapability};

/// 32-byte account fingerprint, newtyped so it can't be mixed up with a
/// bare state hash at call boundaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fingerprint(pub [u8; 32]);

impl std::fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", crate::encoding::encode_hex(&self.0))
    }
}

/// A tracked account: either a self-owned operator account or a
/// fraudster built from a partial tree (invariant 3, §3). `fraud_index`
/// is only ever set on a fraudster.
#[derive(Debug, Clone)]
pub struct Account {
    pub user: Address,
    pub tree: CallDataTree,
    pub current_state: [u8; 32],
    pub last_time: u64,
    pub fraud_index: Option<u64>,
}

impl Account {
    pub fn new(user: Address, element_prefix: u8) -> Self {
        Self {
            user,
            tree: CallDataTree::new(element_prefix),
            current_state: [0u8; 32],
            last_time: 0,
            fraud_index: None,
        }
    }

    pub fn from_partial_tree(user: Address, tree: CallDataTree, current_state: [u8; 32], last_time: u64, fraud_index: u64) -> Self {
        Self { user, tree, current_state, last_time, fraud_index: Some(fraud_index) }
    }

    /// Fingerprint is always recomputed, never cached (§4.1).
    pub fn fingerprint(&self) -> Fingerprint {
        let word = keccak256(&[&self.tree.root(), &self.current_state, &u256_be(self.last_time)]);
        Fingerprint(word)
    }

    pub fn is_optimistic(&self) -> bool {
        self.last_time > 0
    }

    /// Pessimistic update: tree resets to empty, state and time follow.
    pub fn apply_pessimistic(&mut self, new_state: [u8; 32]) {
        self.tree = CallDataTree::new(self.tree.prefix());
        self.current_state = new_state;
        self.last_time = 0;
    }

    /// Optimistic update: `block_time` must be strictly increasing while
    /// the account is already optimistic.
    pub fn apply_optimistic(&mut self, new_tree: CallDataTree, new_state: [u8; 32], block_time: u64) -> Result<()> {
        if self.is_optimistic() && block_time <= self.last_time {
            return Err(EngineError::InvalidRoots(format!(
                "block_time {block_time} does not strictly exceed previous last_time {}",
                self.last_time
            )));
        }
        self.tree = new_tree;
        self.current_state = new_state;
        self.last_time = block_time;
        Ok(())
    }

    pub fn transition_count(&self) -> u64 {
        self.tree.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_account_is_pessimistic_with_null_state() {
        let a = Account::new([1u8; 20], 0x00);
        assert!(!a.is_optimistic());
        assert_eq!(a.current_state, [0u8; 32]);
        assert_eq!(a.transition_count(), 0);
    }

    #[test]
    fn pessimistic_update_resets_tree_and_time() {
        let mut a = Account::new([1u8; 20], 0x00);
        a.apply_optimistic(CallDataTree::from_elements(0x00, vec![vec![1, 2, 3]]), [9u8; 32], 100).unwrap();
        assert!(a.is_optimistic());

        a.apply_pessimistic([5u8; 32]);
        assert_eq!(a.last_time, 0);
        assert_eq!(a.current_state, [5u8; 32]);
        assert_eq!(a.transition_count(), 0);
    }

    #[test]
    fn optimistic_update_rejects_non_increasing_time() {
        let mut a = Account::new([1u8; 20], 0x00);
        a.apply_optimistic(CallDataTree::new(0x00), [1u8; 32], 100).unwrap();
        let err = a.apply_optimistic(CallDataTree::new(0x00), [2u8; 32], 100);
        assert!(err.is_err());
        let err = a.apply_optimistic(CallDataTree::new(0x00), [2u8; 32], 50);
        assert!(err.is_err());
    }

    #[test]
    fn fingerprint_matches_formula() {
        let a = Account::new([1u8; 20], 0x00);
        let expected = keccak256(&[&a.tree.root(), &a.current_state, &u256_be(a.last_time)]);
        assert_eq!(a.fingerprint().0, expected);
    }
}
