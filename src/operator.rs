//! The operator facade (spec §4.8): the externally visible surface a
//! user drives to bond, initialize, transition pessimistically or
//! optimistically, queue and flush batches, lock/prove/rollback a
//! suspect, and export/import state. Grounded on
//! `ouro_sdk::microchain::Microchain` (a facade wrapping a client with
//! typed operations) and `ouro_sdk::transaction::TransactionBuilder`.

use crate::account::Account;
use crate::calldata::{self, decode_logic_call, encode_logic_call};
use crate::chain::ChainAdapter;
use crate::config::EngineConfig;
use crate::encoding::{decode_hex, Address};
use crate::error::{EngineError, Result};
use crate::fraud::{FraudTracker, Fraudster};
use crate::logic_abi::LogicAbi;
use crate::merkle::{CallDataTree, MerkleCapability};
use crate::queue::{Queue, QueuedTransition};
use std::future::Future;

/// Options accepted by chain-touching operations: nothing today beyond
/// an optional value to attach, kept as a struct so new knobs (gas
/// price override, nonce override) can be added without breaking call
/// sites — every field the source threads through as a generic "options
/// bag" actually maps to this one use.
#[derive(Debug, Clone, Default)]
pub struct CallOptions {
    pub value_wei: u128,
}

pub struct Operator<'a> {
    pub account: Account,
    config: EngineConfig,
    chain: &'a dyn ChainAdapter,
    arbiter_address: Address,
    logic_address: Address,
    logic_abi: LogicAbi,
    queue: Queue,
    fraud_tracker: FraudTracker,
    bonded: bool,
    initialized: bool,
}

impl<'a> Operator<'a> {
    pub fn new(user: Address, config: EngineConfig, chain: &'a dyn ChainAdapter, arbiter_address: Address, logic_address: Address, logic_abi: LogicAbi) -> Self {
        let element_prefix = config.element_prefix;
        Self {
            account: Account::new(user, element_prefix),
            config,
            chain,
            arbiter_address,
            logic_address,
            logic_abi,
            queue: Queue::new(),
            fraud_tracker: FraudTracker::new(),
            bonded: false,
            initialized: false,
        }
    }

    fn source_address(&self) -> Address {
        self.config.source_address.unwrap_or(self.account.user)
    }

    fn require_pure_or_view(&self, function_name: &str) -> Result<[u8; 4]> {
        let f = self
            .logic_abi
            .get(function_name)
            .ok_or_else(|| EngineError::PreconditionFailed(format!("unknown logic function {function_name}")))?;
        if !f.mutability.allows_optimistic() {
            return Err(EngineError::PreconditionFailed(format!(
                "{function_name} is not pure/view; cannot be used optimistically or queued"
            )));
        }
        Ok(f.sighash)
    }

    fn require_sighash(&self, function_name: &str) -> Result<[u8; 4]> {
        self.logic_abi
            .get(function_name)
            .map(|f| f.sighash)
            .ok_or_else(|| EngineError::PreconditionFailed(format!("unknown logic function {function_name}")))
    }

    // ---- bonding / lifecycle ------------------------------------------------

    pub async fn bond(&mut self) -> Result<String> {
        let tx_id = self.chain.send_transaction(&self.arbiter_address, &calldata::encode_bond(), self.config.required_bond_wei).await?;
        self.bonded = true;
        Ok(tx_id)
    }

    pub async fn initialize(&mut self, deposit_wei: u128) -> Result<String> {
        if self.initialized {
            return Err(EngineError::PreconditionFailed("initialize called more than once".into()));
        }
        let tx_id = self.chain.send_transaction(&self.arbiter_address, &calldata::encode_initialize(), deposit_wei).await?;
        let new_state = self.chain.account_state(&self.account.user).await?;
        self.account.apply_pessimistic(new_state);
        self.initialized = true;
        Ok(tx_id)
    }

    // ---- transitions ----------------------------------------------------

    /// Pessimistic path; also the exit path out of optimism (§4.8 state
    /// machine). Fails with `StillInLock` if still inside the lock
    /// window.
    pub async fn normal(&mut self, function_name: &str, args: &[[u8; 32]], options: CallOptions) -> Result<String> {
        let sighash = self.require_sighash(function_name)?;
        let call_data = encode_logic_call(sighash, &self.account.user, &self.account.current_state, args);

        let tx_id = if self.account.is_optimistic() {
            let now = self.chain.block_timestamp().await?;
            let unlock_at = self.account.last_time + self.config.lock_time_seconds;
            if now < unlock_at {
                log::debug!("operator: normal() blocked, {}s left in lock window", unlock_at - now);
                return Err(EngineError::StillInLock { remaining_secs: unlock_at - now });
            }
            let root = self.account.tree.root();
            let last_time = self.account.last_time;
            let encoded = calldata::encode_perform_and_exit(&call_data, &root, last_time);
            self.chain.send_transaction(&self.arbiter_address, &encoded, options.value_wei).await?
        } else {
            let encoded = calldata::encode_perform(&call_data);
            self.chain.send_transaction(&self.arbiter_address, &encoded, options.value_wei).await?
        };

        let new_state = self.chain.account_state(&self.account.user).await?;
        self.account.apply_pessimistic(new_state);
        Ok(tx_id)
    }

    /// Pure/view functions only. Appends to the calldata tree and
    /// submits immediately (no queueing).
    pub async fn optimistic(&mut self, function_name: &str, args: &[[u8; 32]], predicted_new_state: [u8; 32], options: CallOptions) -> Result<String> {
        let sighash = self.require_pure_or_view(function_name)?;
        let call_data = encode_logic_call(sighash, &self.account.user, &self.account.current_state, args);

        let was_optimistic = self.account.is_optimistic();
        let mut new_tree = self.account.tree.clone();
        let proof = new_tree.append(call_data.clone());

        let encoded = if was_optimistic {
            calldata::encode_perform_optimistically(&call_data, &predicted_new_state, &self.account.tree.root(), &proof, self.account.last_time)
        } else {
            calldata::encode_perform_optimistically_and_enter(&call_data, &predicted_new_state, &proof)
        };
        let tx_id = self.chain.send_transaction(&self.arbiter_address, &encoded, options.value_wei).await?;

        let block_time = self.chain.block_timestamp().await?;
        self.account.apply_optimistic(new_tree, predicted_new_state, block_time)?;
        Ok(tx_id)
    }

    /// Pure/view functions only; appends to the local queue without
    /// touching the chain.
    pub fn queue(&mut self, function_name: &str, args: &[String], predicted_new_state: [u8; 32]) -> Result<()> {
        self.require_pure_or_view(function_name)?;
        self.queue.push(QueuedTransition { function_name: function_name.to_string(), args: args.to_vec(), predicted_new_state });
        Ok(())
    }

    fn queued_blob(&self, index: usize, state_before: [u8; 32]) -> Result<Vec<u8>> {
        let item = &self.queue.items()[index];
        let sighash = self.require_sighash(&item.function_name)?;
        let words: Vec<[u8; 32]> = item
            .args
            .iter()
            .map(|hex_arg| {
                let bytes = decode_hex(hex_arg)?;
                crate::encoding::word_from_slice(&bytes)
            })
            .collect::<Result<_>>()?;
        Ok(encode_logic_call(sighash, &self.account.user, &state_before, &words))
    }

    fn queued_blobs_for_prefix(&self, prefix_len: usize) -> Result<(Vec<Vec<u8>>, [u8; 32])> {
        let mut state = self.account.current_state;
        let mut blobs = Vec::with_capacity(prefix_len);
        for i in 0..prefix_len {
            let blob = self.queued_blob(i, state)?;
            state = self.queue.items()[i].predicted_new_state;
            blobs.push(blob);
        }
        Ok((blobs, state))
    }

    /// Cost of submitting the first `prefix_len` queued items, per the
    /// application-supplied estimator. Used by [`Self::send_queue`]'s
    /// binary search; kept as a plain async method (rather than routed
    /// through [`crate::queue::select_prefix`]'s generic closure) so it
    /// can borrow `self` directly instead of threading captures through
    /// a boxed future.
    async fn cost_of_prefix<F, Fut>(&self, prefix_len: usize, estimator: &mut F) -> Result<u64>
    where
        F: FnMut(Vec<Vec<u8>>, [u8; 32], crate::merkle::AppendProof) -> Fut,
        Fut: Future<Output = Result<u64>>,
    {
        let (blobs, final_state) = self.queued_blobs_for_prefix(prefix_len)?;
        let mut tree_clone = self.account.tree.clone();
        let proof = tree_clone.append_many(blobs.clone());
        estimator(blobs, final_state, proof).await
    }

    /// Gas-bounded batcher (§4.6): selects the longest prefix of the
    /// queue fitting within `ceiling` per `estimator`, submits it, and
    /// drops the submitted elements from the queue. Binary search is
    /// inlined here (rather than calling [`crate::queue::select_prefix`])
    /// because each candidate's cost depends on `self.account`, not just
    /// the prefix length; memoization of estimator calls is preserved
    /// via a local cache keyed by prefix length.
    pub async fn send_queue<F, Fut>(&mut self, ceiling: u64, mut estimator: F, options: CallOptions) -> Result<String>
    where
        F: FnMut(Vec<Vec<u8>>, [u8; 32], crate::merkle::AppendProof) -> Fut,
        Fut: Future<Output = Result<u64>>,
    {
        if self.queue.is_empty() {
            return Err(EngineError::PreconditionFailed("send_queue called on an empty queue".into()));
        }
        let queue_len = self.queue.len();
        let was_optimistic = self.account.is_optimistic();

        let mut cache: std::collections::HashMap<usize, u64> = std::collections::HashMap::new();
        let smallest_cost = self.cost_of_prefix(1, &mut estimator).await?;
        if smallest_cost > ceiling {
            log::warn!("operator: send_queue cannot fit even a single transition under ceiling {ceiling}");
            return Err(EngineError::BudgetExceeded { prefix_len: 1, cost: smallest_cost, ceiling });
        }
        cache.insert(1, smallest_cost);

        let mut lo = 1usize;
        let mut hi = queue_len;
        while lo < hi {
            let mid = lo + (hi - lo + 1) / 2;
            let cost = match cache.get(&mid) {
                Some(&c) => c,
                None => {
                    let c = self.cost_of_prefix(mid, &mut estimator).await?;
                    cache.insert(mid, c);
                    c
                }
            };
            if cost <= ceiling {
                lo = mid;
            } else {
                hi = mid - 1;
            }
        }
        let k = lo;

        let (blobs, final_state) = self.queued_blobs_for_prefix(k)?;
        let mut new_tree = self.account.tree.clone();
        let proof = new_tree.append_many(blobs.clone());

        let encoded = if was_optimistic {
            calldata::encode_perform_many_optimistically(&blobs, &final_state, &self.account.tree.root(), &proof, self.account.last_time)
        } else {
            calldata::encode_perform_many_optimistically_and_enter(&blobs, &final_state, &proof)
        };
        let tx_id = self.chain.send_transaction(&self.arbiter_address, &encoded, options.value_wei).await?;

        let block_time = self.chain.block_timestamp().await?;
        self.account.apply_optimistic(new_tree, final_state, block_time)?;
        self.queue.drain_prefix(k);
        Ok(tx_id)
    }

    // ---- locking / fraud --------------------------------------------------

    pub async fn lock(&self, suspect: &Address, bond_wei: u128) -> Result<String> {
        self.chain.send_transaction(&self.arbiter_address, &calldata::encode_lock(suspect), bond_wei).await
    }

    /// Treated as payable-0 per the open-question resolution (§9): the
    /// source's `unlock()` references an undefined `value` local.
    pub async fn unlock(&self, suspect: &Address, current_state: &[u8; 32], call_data_root: &[u8; 32], last_time: u64) -> Result<String> {
        let encoded = calldata::encode_unlock(suspect, current_state, call_data_root, last_time);
        self.chain.send_transaction(&self.arbiter_address, &encoded, 0).await
    }

    pub async fn prove_fraud(&mut self, suspect: &Address) -> Result<String> {
        let fraudster: &Fraudster = self.fraud_tracker.get(suspect).ok_or(EngineError::NotFraudulent)?;
        if fraudster.account.fraud_index.is_none() {
            return Err(EngineError::NotFraudulent);
        }
        let proof = fraudster.build_fraud_proof()?;
        let current_state = fraudster.account.current_state;
        let root = fraudster.account.tree.root();
        let last_time = fraudster.account.last_time;

        let encoded = calldata::encode_prove_fraud(suspect, &current_state, &root, &proof, last_time);
        let tx_id = self.chain.send_transaction(&self.arbiter_address, &encoded, 0).await?;

        if let Some(f) = self.fraud_tracker.get_mut(suspect) {
            f.clear_fraud_index();
        }
        self.fraud_tracker.delete(suspect);
        Ok(tx_id)
    }

    /// Rollback the operator's own (non-partial) tree to `target_index`,
    /// matching P8: elements before `target_index` are unchanged,
    /// `current_state` becomes the rolled-back element's embedded state.
    pub async fn rollback(&mut self, target_index: u64) -> Result<String> {
        let target = target_index as usize;
        let elements = self.account.tree.elements();
        if target > elements.len() {
            return Err(EngineError::PreconditionFailed("rollback target beyond tree length".into()));
        }
        let kept: Vec<Vec<u8>> = elements[..target].to_vec();
        let rolled_back: Vec<Vec<u8>> = elements[target..].to_vec();
        let first_rolled_back = rolled_back
            .first()
            .ok_or_else(|| EngineError::PreconditionFailed("rollback target equals current tree length".into()))?;
        let new_current_state = decode_logic_call(first_rolled_back)?.current_state;

        let old_root = self.account.tree.root();
        let prefix = self.account.tree.prefix();
        let mut shrunk_tree = CallDataTree::from_elements(prefix, kept);
        let append_proof = shrunk_tree.append_many(rolled_back.clone());
        if shrunk_tree.root() != old_root {
            return Err(EngineError::InvalidRoots("rollback reconstruction does not match current root".into()));
        }
        let size_proof = {
            let mut t = CallDataTree::from_elements(prefix, self.account.tree.elements()[..target].to_vec());
            t.size_proof()
        };
        let current_root = CallDataTree::from_elements(prefix, self.account.tree.elements()[..target].to_vec()).root();

        let encoded = calldata::encode_rollback(
            &old_root,
            &rolled_back,
            &append_proof,
            target as u64,
            &size_proof,
            &current_root,
            &new_current_state,
            self.account.last_time,
        );
        let tx_id = self.chain.send_transaction(&self.arbiter_address, &encoded, 0).await?;

        let block_time = self.chain.block_timestamp().await?;
        self.account.tree = CallDataTree::from_elements(prefix, self.account.tree.elements()[..target].to_vec());
        self.account.current_state = new_current_state;
        self.account.last_time = block_time;
        Ok(tx_id)
    }

    pub async fn unbond(&mut self, destination: &Address) -> Result<String> {
        let tx_id = self.chain.send_transaction(&self.arbiter_address, &calldata::encode_unbond(destination), 0).await?;
        self.bonded = false;
        Ok(tx_id)
    }

    // ---- export / import (§6.5) -------------------------------------------

    pub fn export_state(&self) -> Vec<u8> {
        let mut out = Vec::new();
        out.push(1u8); // format version
        out.extend_from_slice(&self.account.user);
        let elements = self.account.tree.elements();
        out.extend_from_slice(&(elements.len() as u32).to_be_bytes());
        for blob in elements {
            out.extend_from_slice(&(blob.len() as u32).to_be_bytes());
            out.extend_from_slice(blob);
        }
        out.extend_from_slice(&self.account.current_state);
        out.extend_from_slice(&self.account.last_time.to_be_bytes());
        match self.account.fraud_index {
            None => out.push(0),
            Some(idx) => {
                out.push(1);
                out.extend_from_slice(&(idx as u32).to_be_bytes());
            }
        }
        out
    }

    pub fn import_state(element_prefix: u8, blob: &[u8]) -> Result<Account> {
        let mut offset = 0usize;
        let take = |o: &mut usize, n: usize| -> Result<std::ops::Range<usize>> {
            if blob.len() < *o + n {
                return Err(EngineError::DecodeError("exported state blob truncated".into()));
            }
            let r = *o..*o + n;
            *o += n;
            Ok(r)
        };

        let version = blob[take(&mut offset, 1)?.start];
        if version != 1 {
            return Err(EngineError::DecodeError(format!("unsupported exported state version {version}")));
        }
        let user: Address = blob[take(&mut offset, 20)?].try_into().unwrap();
        let blob_count = u32::from_be_bytes(blob[take(&mut offset, 4)?].try_into().unwrap()) as usize;
        let mut elements = Vec::with_capacity(blob_count);
        for _ in 0..blob_count {
            let len = u32::from_be_bytes(blob[take(&mut offset, 4)?].try_into().unwrap()) as usize;
            elements.push(blob[take(&mut offset, len)?].to_vec());
        }
        let current_state: [u8; 32] = blob[take(&mut offset, 32)?].try_into().unwrap();
        let last_time = u64::from_be_bytes(blob[take(&mut offset, 8)?].try_into().unwrap());
        let has_fraud_index = blob[take(&mut offset, 1)?.start];
        let fraud_index = if has_fraud_index == 1 {
            Some(u32::from_be_bytes(blob[take(&mut offset, 4)?].try_into().unwrap()) as u64)
        } else {
            None
        };

        let tree = CallDataTree::from_elements(element_prefix, elements);
        Ok(Account { user, tree, current_state, last_time, fraud_index })
    }

    // ---- read-only queries --------------------------------------------------

    pub fn account_state(&self) -> [u8; 32] {
        self.account.fingerprint().0
    }

    pub fn current_state(&self) -> [u8; 32] {
        self.account.current_state
    }

    pub fn last_time(&self) -> u64 {
        self.account.last_time
    }

    pub fn transition_count(&self) -> u64 {
        self.account.transition_count()
    }

    pub fn transitions_queued(&self) -> usize {
        self.queue.len()
    }

    pub fn queued_state(&self) -> [u8; 32] {
        self.queue.queued_state(self.account.current_state)
    }

    pub fn is_in_optimistic_state(&self) -> bool {
        self.account.is_optimistic()
    }

    pub fn is_bonded(&self) -> bool {
        self.bonded
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// §4.8 `LockState`: lives on the arbiter, not the local commitment
    /// structure, so this is a chain read rather than a cached field.
    pub async fn get_locker(&self) -> Result<Option<Address>> {
        let locker = self.chain.locker(&self.account.user).await?;
        Ok((locker != [0u8; 20]).then_some(locker))
    }

    pub async fn get_lock_timestamp(&self) -> Result<Option<u64>> {
        let ts = self.chain.locked_timestamp(&self.account.user).await?;
        Ok((ts != 0).then_some(ts))
    }

    pub async fn get_rollback_size(&self) -> Result<Option<u64>> {
        let size = self.chain.rollback_size(&self.account.user).await?;
        Ok((size != 0).then_some(size))
    }

    pub async fn get_balance(&self) -> Result<u128> {
        self.chain.balance(&self.account.user).await
    }

    pub async fn get_lock_time_remaining(&self) -> Result<u64> {
        if self.account.last_time == 0 {
            return Ok(0);
        }
        let now = self.chain.block_timestamp().await?;
        let unlock_at = self.account.last_time + self.config.lock_time_seconds;
        Ok(unlock_at.saturating_sub(now))
    }

    pub fn get_fraudster(&self, user: &Address) -> Option<&Fraudster> {
        self.fraud_tracker.get(user)
    }

    pub fn fraud_tracker(&self) -> &FraudTracker {
        &self.fraud_tracker
    }

    pub fn fraud_tracker_mut(&mut self) -> &mut FraudTracker {
        &mut self.fraud_tracker
    }

    pub fn arbiter_address(&self) -> Address {
        self.arbiter_address
    }

    pub fn logic_address(&self) -> Address {
        self.logic_address
    }
}
