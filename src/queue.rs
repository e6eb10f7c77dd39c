//! Transition queue and gas-bounded batcher (spec §4.6). The queue
//! itself is a plain insertion-ordered `Vec`, generalized from
//! `ouro_dag::mempool`'s queue-of-pending-items shape; the batcher is a
//! memoized binary search over an application-supplied, assumed-
//! monotonic cost estimator.

use crate::error::{EngineError, Result};
use std::collections::HashMap;
use std::future::Future;

/// One queued transition: a pure/view function call plus the state it
/// is predicted to produce. Args are hex-encoded scalars per §3, kept
/// as opaque strings since the queue never interprets them.
#[derive(Debug, Clone)]
pub struct QueuedTransition {
    pub function_name: String,
    pub args: Vec<String>,
    pub predicted_new_state: [u8; 32],
}

#[derive(Debug, Default)]
pub struct Queue {
    items: Vec<QueuedTransition>,
}

impl Queue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, item: QueuedTransition) {
        self.items.push(item);
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn items(&self) -> &[QueuedTransition] {
        &self.items
    }

    /// Last queued new-state, or `current_state` if the queue is empty.
    pub fn queued_state(&self, current_state: [u8; 32]) -> [u8; 32] {
        self.items.last().map(|i| i.predicted_new_state).unwrap_or(current_state)
    }

    /// Drop the first `count` items after a successful `send_queue`.
    pub fn drain_prefix(&mut self, count: usize) -> Vec<QueuedTransition> {
        self.items.drain(..count).collect()
    }
}

/// Binary search for the longest prefix (1-indexed length) whose cost,
/// as reported by `cost_for_prefix`, stays within `ceiling`. Assumes
/// `cost_for_prefix` is monotonic non-decreasing in prefix length;
/// results are memoized per prefix length so each length is estimated
/// at most once.
pub async fn select_prefix<F, Fut>(queue_len: usize, ceiling: u64, mut cost_for_prefix: F) -> Result<usize>
where
    F: FnMut(usize) -> Fut,
    Fut: Future<Output = Result<u64>>,
{
    if queue_len == 0 {
        return Err(EngineError::PreconditionFailed("cannot select a prefix of an empty queue".into()));
    }

    let mut cache: HashMap<usize, u64> = HashMap::new();
    async fn cost<F, Fut>(cache: &mut HashMap<usize, u64>, cost_for_prefix: &mut F, len: usize) -> Result<u64>
    where
        F: FnMut(usize) -> Fut,
        Fut: Future<Output = Result<u64>>,
    {
        if let Some(&c) = cache.get(&len) {
            return Ok(c);
        }
        let c = cost_for_prefix(len).await?;
        cache.insert(len, c);
        Ok(c)
    }

    let smallest_cost = cost(&mut cache, &mut cost_for_prefix, 1).await?;
    if smallest_cost > ceiling {
        return Err(EngineError::BudgetExceeded { prefix_len: 1, cost: smallest_cost, ceiling });
    }

    let mut lo = 1usize;
    let mut hi = queue_len;
    while lo < hi {
        let mid = lo + (hi - lo + 1) / 2;
        let c = cost(&mut cache, &mut cost_for_prefix, mid).await?;
        if c <= ceiling {
            lo = mid;
        } else {
            hi = mid - 1;
        }
    }
    Ok(lo)
}
