//! End-to-end scenarios against an in-memory chain adapter double.
//! Exercises the operator facade, the observer, and the fraud tracker
//! together; the per-module unit tests cover the remaining properties
//! (P1-P8) and scenarios (S4, S6) in isolation.

use rollin_engine::{
    chain::ChainAdapter,
    config::EngineConfig,
    encoding::{u256_be, u64_from_u256_be, word_from_slice, Address},
    events::{LogEntry, NEW_OPTIMISTIC_STATE},
    logic_abi::{FunctionDescriptor, LogicAbi, Mutability},
    observer::Observer,
    operator::{CallOptions, Operator},
};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

const INCREMENT_SIGHASH: [u8; 4] = [0x11, 0x22, 0x33, 0x44];

/// Deterministic "pure" transition: new_state = current_state + args[0],
/// both interpreted as little integers packed via `u256_be`. Used so
/// fraud in the test scenarios is genuinely detectable by independent
/// recomputation rather than by trusting the embedded `current_state`
/// field (which a dishonest caller controls).
fn increment_verifier(blob: &[u8], proposed_new_state: &[u8; 32]) -> bool {
    let Ok(decoded) = rollin_engine::calldata::decode_logic_call(blob) else {
        return false;
    };
    let Some(delta_word) = decoded.args.first() else {
        return false;
    };
    let Ok(current) = u64_from_u256_be(&decoded.current_state) else {
        return false;
    };
    let Ok(delta) = u64_from_u256_be(delta_word) else {
        return false;
    };
    let expected = u256_be(current + delta);
    &expected == proposed_new_state
}

#[derive(Default)]
struct TestChainInner {
    tx_counter: u64,
    inputs: HashMap<String, Vec<u8>>,
    logs: HashMap<String, Vec<LogEntry>>,
    timestamp: u64,
    account_state: [u8; 32],
}

/// An in-memory `ChainAdapter`: `send_transaction` decodes whatever the
/// operator submitted well enough to synthesize the one receipt log the
/// observer actually needs (§4.7 step 3), keyed to a single fixed
/// operator address since these scenarios only ever have one sender.
struct TestChain {
    inner: Mutex<TestChainInner>,
    operator: Address,
}

impl TestChain {
    fn new(operator: Address) -> Self {
        Self { inner: Mutex::new(TestChainInner::default()), operator }
    }

    fn set_account_state(&self, state: [u8; 32]) {
        self.inner.lock().unwrap().account_state = state;
    }
}

fn topic_word(bytes: &[u8]) -> [u8; 32] {
    let mut w = [0u8; 32];
    w[32 - bytes.len()..].copy_from_slice(bytes);
    w
}

#[async_trait::async_trait]
impl ChainAdapter for TestChain {
    async fn get_transaction_input(&self, tx_id: &str) -> rollin_engine::error::Result<Vec<u8>> {
        Ok(self.inner.lock().unwrap().inputs.get(tx_id).cloned().unwrap_or_default())
    }

    async fn get_receipt_logs(&self, tx_id: &str) -> rollin_engine::error::Result<Vec<LogEntry>> {
        Ok(self.inner.lock().unwrap().logs.get(tx_id).cloned().unwrap_or_default())
    }

    async fn eth_call(&self, _to: &Address, _data: &[u8]) -> rollin_engine::error::Result<[u8; 32]> {
        Ok([0u8; 32])
    }

    async fn account_state(&self, _user: &Address) -> rollin_engine::error::Result<[u8; 32]> {
        Ok(self.inner.lock().unwrap().account_state)
    }

    async fn block_timestamp(&self) -> rollin_engine::error::Result<u64> {
        let mut inner = self.inner.lock().unwrap();
        inner.timestamp += 1;
        Ok(inner.timestamp)
    }

    async fn balance(&self, _user: &Address) -> rollin_engine::error::Result<u128> {
        Ok(0)
    }

    async fn locker(&self, _user: &Address) -> rollin_engine::error::Result<Address> {
        Ok([0u8; 20])
    }

    async fn locked_timestamp(&self, _user: &Address) -> rollin_engine::error::Result<u64> {
        Ok(0)
    }

    async fn rollback_size(&self, _user: &Address) -> rollin_engine::error::Result<u64> {
        Ok(0)
    }

    async fn send_transaction(&self, _to: &Address, data: &[u8], _value_wei: u128) -> rollin_engine::error::Result<String> {
        let mut inner = self.inner.lock().unwrap();
        inner.tx_counter += 1;
        let tx_id = format!("tx-{}", inner.tx_counter);
        inner.inputs.insert(tx_id.clone(), data.to_vec());

        if let Ok(Some(call)) = rollin_engine::calldata::decode_arbiter_call(data) {
            let _ = call;
            let logs = vec![LogEntry {
                topics: vec![NEW_OPTIMISTIC_STATE, topic_word(&self.operator), topic_word(&inner.timestamp.to_be_bytes())],
                data: vec![],
            }];
            inner.logs.insert(tx_id.clone(), logs);
        }
        Ok(tx_id)
    }
}

fn config_with_increment() -> EngineConfig {
    let mut pure_verifiers: HashMap<[u8; 4], rollin_engine::config::PureVerifierFn> = HashMap::new();
    pure_verifiers.insert(INCREMENT_SIGHASH, Arc::new(increment_verifier));
    EngineConfig { pure_verifiers, ..EngineConfig::new(600, 1_000_000_000_000_000_000) }
}

fn increment_abi() -> LogicAbi {
    LogicAbi::new(vec![FunctionDescriptor {
        name: "increment".into(),
        sighash: INCREMENT_SIGHASH,
        mutability: Mutability::Pure,
    }])
}

#[tokio::test]
async fn s1_pessimistic_round() {
    let user = [0x01u8; 20];
    let chain = TestChain::new(user);
    let final_state = [0x55u8; 32];
    chain.set_account_state(final_state);

    let mut op = Operator::new(user, config_with_increment(), &chain, [0xAAu8; 20], [0xBBu8; 20], increment_abi());
    op.normal("increment", &[u256_be(1)], CallOptions::default()).await.unwrap();

    assert_eq!(op.current_state(), final_state);
    assert_eq!(op.last_time(), 0);
    assert_eq!(op.transition_count(), 0);
    assert!(!op.is_in_optimistic_state());
}

#[tokio::test]
async fn s2_enter_optimism_single_valid() {
    let user = [0x02u8; 20];
    let chain = TestChain::new(user);
    let mut op = Operator::new(user, config_with_increment(), &chain, [0xAAu8; 20], [0xBBu8; 20], increment_abi());

    let predicted = u256_be(1);
    let tx_id = op.optimistic("increment", &[u256_be(1)], predicted, CallOptions::default()).await.unwrap();

    assert!(op.last_time() > 0);
    assert_eq!(op.transition_count(), 1);
    assert!(op.is_in_optimistic_state());

    let verify_config = config_with_increment();
    let observer = Observer::new(&chain, &verify_config.pure_verifiers, 0x00);
    let mut tracker = rollin_engine::FraudTracker::new();
    // A fresh observer doesn't share the operator's pure-verifier map
    // instance, but the sighash registration is identical, so the
    // local-verifier path still fires deterministically.
    let outcome = observer.verify_transaction(&tx_id, &mut tracker).await.unwrap();
    assert!(outcome.valid);
    assert_eq!(outcome.user, Some(user));
}

#[tokio::test]
async fn s3_batch_then_fraud_at_offset_twenty() {
    let suspect = [0x03u8; 20];
    let chain = TestChain::new(suspect);
    let config = config_with_increment();
    let mut op = Operator::new(suspect, config, &chain, [0xAAu8; 20], [0xBBu8; 20], increment_abi());

    const BATCH_SIZE: u64 = 30;
    const FRAUD_LOCAL_INDEX: u64 = 20;

    for i in 0..BATCH_SIZE {
        let correct_next = u256_be(i + 1);
        let predicted = if i == FRAUD_LOCAL_INDEX { u256_be(1337) } else { correct_next };
        op.queue("increment", &[hex::encode(u256_be(1))], predicted).unwrap();
    }
    // queue() above passes a bare hex string without 0x; encode_hex/decode_hex
    // in this crate accept both forms, so this matches what queued_blob expects.

    let tx_id = op
        .send_queue(10_000, |blobs, _final_state, _proof| async move { Ok(blobs.len() as u64) }, CallOptions::default())
        .await
        .unwrap();

    assert!(op.transitions_queued() == 0);

    let pure_verifiers = {
        let mut m: HashMap<[u8; 4], rollin_engine::config::PureVerifierFn> = HashMap::new();
        m.insert(INCREMENT_SIGHASH, Arc::new(increment_verifier));
        m
    };
    let observer = Observer::new(&chain, &pure_verifiers, 0x00);
    let mut tracker = rollin_engine::FraudTracker::new();
    let outcome = observer.verify_transaction(&tx_id, &mut tracker).await.unwrap();

    assert!(!outcome.valid);
    assert_eq!(outcome.user, Some(suspect));
    let fraudster = tracker.get(&suspect).expect("fraudster should be recorded");
    assert_eq!(fraudster.fraud_index(), FRAUD_LOCAL_INDEX);
}

#[tokio::test]
async fn lock_state_reads_come_from_the_chain_not_a_cached_field() {
    let user = [0x04u8; 20];
    let chain = TestChain::new(user);
    let op = Operator::new(user, config_with_increment(), &chain, [0xAAu8; 20], [0xBBu8; 20], increment_abi());

    assert_eq!(op.get_locker().await.unwrap(), None);
    assert_eq!(op.get_lock_timestamp().await.unwrap(), None);
    assert_eq!(op.get_rollback_size().await.unwrap(), None);
    assert_eq!(op.get_balance().await.unwrap(), 0);
}

#[test]
fn topic_word_pads_left() {
    let addr = [0xABu8; 20];
    let word = topic_word(&addr);
    assert_eq!(word_from_slice(&word).unwrap()[12..], addr);
}
