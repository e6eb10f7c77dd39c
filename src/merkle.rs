//! The calldata Merkle capability: an unbalanced, unsorted-pairing,
//! prefixed Merkle accumulator, plus the *partial* tree that can be
//! reconstructed from nothing but an append proof and the leaves it
//! covers.
//!
//! Internally this is a Merkle Mountain Range: leaves are folded into a
//! small set of "peaks" (one per set bit of the leaf count) using a
//! binary-counter merge, and the externally visible root is a single
//! pairwise fold ("bagging") of the current peaks, carrying the last
//! peak up unchanged when the peak count is odd — the same
//! carry-instead-of-duplicate rule spec.md calls "unbalanced, unsorted
//! pairing" applied one level higher, to the peaks themselves. This is
//! what makes append proofs O(log n): the proof is just the peaks from
//! before the append.

use crate::encoding::keccak256;
use crate::error::{EngineError, Result};

const EMPTY_ROOT_SEED: &[u8] = b"";

fn empty_root() -> [u8; 32] {
    keccak256(&[EMPTY_ROOT_SEED])
}

fn leaf_hash(prefix: u8, blob: &[u8]) -> [u8; 32] {
    keccak256(&[&[prefix], blob])
}

fn node_hash(prefix: u8, left: &[u8; 32], right: &[u8; 32]) -> [u8; 32] {
    keccak256(&[&[prefix], left, right])
}

/// Pairwise-fold a list of nodes left to right, carrying the trailing
/// node up unchanged when the list has odd length. Used both to bag
/// peaks into a root and to fold within a single power-of-two chunk.
fn fold_unbalanced(prefix: u8, nodes: &[[u8; 32]]) -> [u8; 32] {
    assert!(!nodes.is_empty());
    let mut level = nodes.to_vec();
    while level.len() > 1 {
        let mut next = Vec::with_capacity(level.len().div_ceil(2));
        let mut i = 0;
        while i < level.len() {
            if i + 1 < level.len() {
                next.push(node_hash(prefix, &level[i], &level[i + 1]));
            } else {
                next.push(level[i]);
            }
            i += 2;
        }
        level = next;
    }
    level[0]
}

/// Decompose `count` into its powers of two, most-significant bit first.
/// `peak_sizes_for(5)` -> `[4, 1]`.
fn peak_sizes_for(count: u64) -> Vec<u64> {
    let mut sizes = Vec::new();
    let mut bit = 63i32;
    while bit >= 0 {
        let size = 1u64 << bit;
        if count & size != 0 {
            sizes.push(size);
        }
        bit -= 1;
    }
    sizes
}

/// Merge a single new leaf into an existing peak list using the MMR
/// binary-counter rule: the new leaf starts as a size-1 peak; whenever
/// two peaks of equal size meet, they merge (existing one on the left,
/// since it was inserted first — this is the "unsorted" ordering rule)
/// into one peak of double the size, and the carry continues upward.
/// `sizes` and `peaks` are kept in the same smallest-to-largest order
/// for O(1) access to the current smallest peak; callers that need
/// largest-first order (for bagging/proof display) call [`reordered_msb_first`].
fn insert_leaf(prefix: u8, sizes: &mut Vec<u64>, peaks: &mut Vec<[u8; 32]>, leaf: [u8; 32]) {
    let mut carry_size = 1u64;
    let mut carry = leaf;
    loop {
        if sizes.last() == Some(&carry_size) {
            let existing = peaks.pop().unwrap();
            sizes.pop();
            carry = node_hash(prefix, &existing, &carry);
            carry_size *= 2;
        } else {
            sizes.push(carry_size);
            peaks.push(carry);
            break;
        }
    }
}

fn reordered_msb_first(sizes: &[u64], peaks: &[[u8; 32]]) -> Vec<[u8; 32]> {
    let mut indexed: Vec<(u64, [u8; 32])> = sizes.iter().copied().zip(peaks.iter().copied()).collect();
    indexed.sort_by(|a, b| b.0.cmp(&a.0));
    indexed.into_iter().map(|(_, h)| h).collect()
}

/// A compact append proof: self-describing via its own length prefix
/// (`pre_peaks.len()`), so a decoder never needs the producing tree.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct AppendProof {
    pub element_count: u32,
    pub pre_count: u64,
    pub pre_peaks: Vec<[u8; 32]>,
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct MultiProof {
    pub element_count: u32,
    pub indices: Vec<u64>,
    pub elements: Vec<Vec<u8>>,
    pub other_peaks: Vec<[u8; 32]>,
    pub root: [u8; 32],
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct SizeProof {
    pub element_count: u64,
    pub root: [u8; 32],
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct SingleProof {
    pub element_count: u32,
    pub index: u64,
    pub element: Vec<u8>,
    pub siblings: Vec<[u8; 32]>,
    pub other_peaks: Vec<[u8; 32]>,
}

/// The capability this engine needs from a calldata Merkle tree.
/// `CallDataTree` is the engine's own implementation of this contract;
/// applications may substitute another backend as long as it preserves
/// the same root under the same fixed parameters (spec.md §4.3 / §6.4).
pub trait MerkleCapability: Sized {
    fn append(&mut self, blob: Vec<u8>) -> AppendProof {
        self.append_many(vec![blob])
    }
    fn append_many(&mut self, blobs: Vec<Vec<u8>>) -> AppendProof;
    fn multi_proof(&self, indices: &[u64]) -> Result<MultiProof>;
    fn size_proof(&self) -> SizeProof;
    fn single_proof(&self, index: u64) -> Result<SingleProof>;
    fn from_append_proof(prefix: u8, blobs: Vec<Vec<u8>>, proof: &AppendProof) -> Self;
    fn root(&self) -> [u8; 32];
    fn len(&self) -> u64;
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// The engine's concrete calldata tree. `leaf_offset` is nonzero only for
/// a *partial* tree built from an append proof: it has no leaves before
/// that point and cannot answer proofs about them.
#[derive(Debug, Clone)]
pub struct CallDataTree {
    prefix: u8,
    leaf_offset: u64,
    sizes: Vec<u64>,
    peaks: Vec<[u8; 32]>,
    elements: Vec<Vec<u8>>,
}

impl CallDataTree {
    pub fn new(prefix: u8) -> Self {
        Self {
            prefix,
            leaf_offset: 0,
            sizes: Vec::new(),
            peaks: Vec::new(),
            elements: Vec::new(),
        }
    }

    pub fn prefix(&self) -> u8 {
        self.prefix
    }

    pub fn elements(&self) -> &[Vec<u8>] {
        &self.elements
    }

    pub fn is_partial(&self) -> bool {
        self.leaf_offset > 0
    }

    pub fn leaf_offset(&self) -> u64 {
        self.leaf_offset
    }

    /// Rebuild a tree from scratch given its full, ordered leaf set.
    /// Used to prove invariant 4 (same elements + params -> same root).
    pub fn from_elements(prefix: u8, blobs: Vec<Vec<u8>>) -> Self {
        let mut tree = Self::new(prefix);
        tree.append_many(blobs);
        tree
    }

    fn local_index(&self, global_index: u64) -> Result<usize> {
        if global_index < self.leaf_offset {
            return Err(EngineError::DecodeError(format!(
                "index {global_index} predates this tree's known leaves (offset {})",
                self.leaf_offset
            )));
        }
        let local = (global_index - self.leaf_offset) as usize;
        if local >= self.elements.len() {
            return Err(EngineError::DecodeError(format!(
                "index {global_index} out of range"
            )));
        }
        Ok(local)
    }

    /// Chunk boundaries (start, size) of the *local* elements, largest
    /// chunk first, matching the peaks' MSB-first order.
    fn local_chunks(&self) -> Vec<(usize, u64)> {
        let sizes = peak_sizes_for(self.elements.len() as u64);
        let mut start = 0usize;
        let mut chunks = Vec::with_capacity(sizes.len());
        for size in sizes {
            chunks.push((start, size));
            start += size as usize;
        }
        chunks
    }

    fn chunk_leaf_hashes(&self, start: usize, size: u64) -> Vec<[u8; 32]> {
        self.elements[start..start + size as usize]
            .iter()
            .map(|blob| leaf_hash(self.prefix, blob))
            .collect()
    }

    /// Full level structure of one exact-power-of-two-sized chunk: no
    /// carry ever happens within a chunk since its size is a clean power
    /// of two.
    fn chunk_levels(&self, start: usize, size: u64) -> Vec<Vec<[u8; 32]>> {
        let mut levels = vec![self.chunk_leaf_hashes(start, size)];
        while levels.last().unwrap().len() > 1 {
            let cur = levels.last().unwrap();
            let mut next = Vec::with_capacity(cur.len() / 2);
            for pair in cur.chunks_exact(2) {
                next.push(node_hash(self.prefix, &pair[0], &pair[1]));
            }
            levels.push(next);
        }
        levels
    }
}

impl MerkleCapability for CallDataTree {
    fn append_many(&mut self, blobs: Vec<Vec<u8>>) -> AppendProof {
        let proof = AppendProof {
            element_count: blobs.len() as u32,
            pre_count: self.leaf_offset + self.elements.len() as u64,
            pre_peaks: reordered_msb_first(&self.sizes, &self.peaks),
        };
        for blob in &blobs {
            let h = leaf_hash(self.prefix, blob);
            insert_leaf(self.prefix, &mut self.sizes, &mut self.peaks, h);
        }
        self.elements.extend(blobs);
        proof
    }

    fn multi_proof(&self, indices: &[u64]) -> Result<MultiProof> {
        let mut elements = Vec::with_capacity(indices.len());
        for &idx in indices {
            let local = self.local_index(idx)?;
            elements.push(self.elements[local].clone());
        }
        Ok(MultiProof {
            element_count: indices.len() as u32,
            indices: indices.to_vec(),
            elements,
            other_peaks: Vec::new(),
            root: self.root(),
        })
    }

    fn size_proof(&self) -> SizeProof {
        SizeProof {
            element_count: self.leaf_offset + self.elements.len() as u64,
            root: self.root(),
        }
    }

    fn single_proof(&self, index: u64) -> Result<SingleProof> {
        let local = self.local_index(index)?;
        let chunks = self.local_chunks();
        let (chunk_start, chunk_size, chunk_pos) = chunks
            .iter()
            .find(|(start, size)| local >= *start && local < start + *size as usize)
            .map(|(start, size)| (*start, *size, 0usize))
            .ok_or_else(|| EngineError::DecodeError("index not covered by any chunk".into()))?;
        let _ = chunk_pos;

        let levels = self.chunk_levels(chunk_start, chunk_size);
        let mut siblings = Vec::new();
        let mut pos = local - chunk_start;
        for level in &levels[..levels.len() - 1] {
            let sibling_pos = pos ^ 1;
            siblings.push(level[sibling_pos]);
            pos /= 2;
        }

        let all_peaks = reordered_msb_first(&self.sizes, &self.peaks);
        let this_peak = *levels.last().unwrap().first().unwrap();
        let other_peaks = all_peaks.into_iter().filter(|p| *p != this_peak).collect();

        Ok(SingleProof {
            element_count: 1,
            index,
            element: self.elements[local].clone(),
            siblings,
            other_peaks,
        })
    }

    fn from_append_proof(prefix: u8, blobs: Vec<Vec<u8>>, proof: &AppendProof) -> Self {
        let sizes = peak_sizes_for(proof.pre_count);
        let mut tree = Self {
            prefix,
            leaf_offset: proof.pre_count,
            sizes,
            peaks: proof.pre_peaks.clone(),
            elements: Vec::new(),
        };
        tree.append_many(blobs);
        tree
    }

    fn root(&self) -> [u8; 32] {
        if self.peaks.is_empty() {
            return empty_root();
        }
        let msb_first = reordered_msb_first(&self.sizes, &self.peaks);
        fold_unbalanced(self.prefix, &msb_first)
    }

    fn len(&self) -> u64 {
        self.leaf_offset + self.elements.len() as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blob(n: u8) -> Vec<u8> {
        vec![n; 4]
    }

    #[test]
    fn empty_tree_root_is_stable() {
        let t = CallDataTree::new(0x00);
        assert_eq!(t.root(), empty_root());
        assert_eq!(t.len(), 0);
    }

    #[test]
    fn rebuilding_from_same_elements_is_deterministic() {
        let blobs: Vec<Vec<u8>> = (0..7).map(blob).collect();
        let a = CallDataTree::from_elements(0x00, blobs.clone());
        let b = CallDataTree::from_elements(0x00, blobs);
        assert_eq!(a.root(), b.root());
    }

    #[test]
    fn append_proof_reconstructs_same_root_as_full_rebuild() {
        let mut full = CallDataTree::new(0x00);
        full.append_many(vec![blob(1), blob(2), blob(3)]);
        let proof = full.append_many(vec![blob(4), blob(5)]);

        let partial = CallDataTree::from_append_proof(0x00, vec![blob(4), blob(5)], &proof);

        assert_eq!(partial.root(), full.root());
        assert_eq!(partial.len(), full.len());
    }

    #[test]
    fn append_proof_reconstructs_same_root_with_nonzero_prefix() {
        let mut full = CallDataTree::new(0x07);
        full.append_many(vec![blob(1), blob(2), blob(3)]);
        let proof = full.append_many(vec![blob(4), blob(5)]);

        let partial = CallDataTree::from_append_proof(0x07, vec![blob(4), blob(5)], &proof);

        assert_eq!(partial.root(), full.root());
        assert_eq!(partial.len(), full.len());
    }

    #[test]
    fn partial_tree_supports_further_append() {
        let mut full = CallDataTree::new(0x00);
        full.append_many(vec![blob(1), blob(2), blob(3)]);
        let proof = full.append_many(vec![blob(4)]);
        full.append_many(vec![blob(5)]);

        let mut partial = CallDataTree::from_append_proof(0x00, vec![blob(4)], &proof);
        partial.append_many(vec![blob(5)]);

        assert_eq!(partial.root(), full.root());
    }

    #[test]
    fn single_proof_element_matches() {
        let mut full = CallDataTree::new(0x00);
        let blobs: Vec<Vec<u8>> = (0..9).map(blob).collect();
        full.append_many(blobs.clone());

        for i in 0..9u64 {
            let proof = full.single_proof(i).unwrap();
            assert_eq!(proof.element, blobs[i as usize]);
        }
    }

    #[test]
    fn multi_proof_rejects_index_before_partial_offset() {
        let mut full = CallDataTree::new(0x00);
        full.append_many(vec![blob(1), blob(2), blob(3)]);
        let proof = full.append_many(vec![blob(4), blob(5)]);
        let partial = CallDataTree::from_append_proof(0x00, vec![blob(4), blob(5)], &proof);

        assert!(partial.multi_proof(&[0]).is_err());
        assert!(partial.multi_proof(&[3, 4]).is_ok());
    }

    #[test]
    fn size_proof_reports_count_and_root() {
        let mut t = CallDataTree::new(0x00);
        t.append_many(vec![blob(1), blob(2)]);
        let sp = t.size_proof();
        assert_eq!(sp.element_count, 2);
        assert_eq!(sp.root, t.root());
    }
}
