//! Calldata decoders for the arbiter and logic contracts (spec §4.2).
//!
//! ABI heads here are hand-decoded fixed-width layouts rather than
//! routed through a general ABI crate, matching `ouro_sdk::transaction`'s
//! style of building/parsing its own wire layout rather than depending
//! on an external codec for a small, fixed interface surface.

use crate::encoding::{address_from_slice, word_from_slice, Address};
use crate::error::{EngineError, Result};
use crate::merkle::AppendProof;

pub type Sighash = [u8; 4];

pub const PERFORM_MANY_OPTIMISTICALLY_AND_ENTER: Sighash = [0xb2, 0x34, 0xff, 0x20];
pub const PERFORM_MANY_OPTIMISTICALLY: Sighash = [0xc9, 0x30, 0x33, 0xd8];
pub const PERFORM_OPTIMISTICALLY_AND_ENTER: Sighash = [0xc1, 0xe8, 0x7b, 0xf1];
pub const PERFORM_OPTIMISTICALLY: Sighash = [0x10, 0x87, 0xbc, 0x9e];

// Remaining arbiter operations (§6.1) that never carry a Merkle proof,
// used only by the operator facade to build outbound calldata.
pub const BOND: Sighash = [0x24, 0x7c, 0xe8, 0x5b];
pub const INITIALIZE: Sighash = [0x81, 0x29, 0xfc, 0x1c];
pub const PERFORM: Sighash = [0xbb, 0x6a, 0xe2, 0xcb];
pub const PERFORM_AND_EXIT: Sighash = [0x9e, 0x79, 0x42, 0xec];
pub const LOCK: Sighash = [0xf4, 0x35, 0xf5, 0xa7];
pub const UNLOCK: Sighash = [0x0c, 0xfc, 0x93, 0x52];
pub const PROVE_FRAUD: Sighash = [0xad, 0xb0, 0x73, 0x9a];
pub const ROLLBACK: Sighash = [0x20, 0xc4, 0x9f, 0x55];
pub const UNBOND: Sighash = [0xe4, 0xda, 0x61, 0xab];

/// The four sighashes §4.2 calls "optimistic-mode commitments". Any
/// other sighash observed in arbiter calldata is not an optimistic
/// record.
pub fn is_optimistic_sighash(sighash: Sighash) -> bool {
    matches!(
        sighash,
        PERFORM_MANY_OPTIMISTICALLY_AND_ENTER
            | PERFORM_MANY_OPTIMISTICALLY
            | PERFORM_OPTIMISTICALLY_AND_ENTER
            | PERFORM_OPTIMISTICALLY
    )
}

pub fn is_batch_sighash(sighash: Sighash) -> bool {
    matches!(sighash, PERFORM_MANY_OPTIMISTICALLY_AND_ENTER | PERFORM_MANY_OPTIMISTICALLY)
}

/// Decoded arbiter calldata for one of the four optimistic sighashes.
/// `blobs` has exactly one element for the single-variant sighashes.
#[derive(Debug, Clone)]
pub struct ArbiterCall {
    pub sighash: Sighash,
    pub blobs: Vec<Vec<u8>>,
    pub new_state: [u8; 32],
    pub proof: AppendProof,
    /// `None` for the *AndEnter variants (they imply previous last_time == 0).
    pub previous_root: Option<[u8; 32]>,
    pub previous_last_time: Option<u64>,
}

impl ArbiterCall {
    pub fn implies_enter(&self) -> bool {
        matches!(
            self.sighash,
            PERFORM_MANY_OPTIMISTICALLY_AND_ENTER | PERFORM_OPTIMISTICALLY_AND_ENTER
        )
    }
}

fn read_word(buf: &[u8], offset: &mut usize) -> Result<[u8; 32]> {
    if buf.len() < *offset + 32 {
        return Err(EngineError::DecodeError("calldata truncated reading word".into()));
    }
    let word = word_from_slice(&buf[*offset..*offset + 32])?;
    *offset += 32;
    Ok(word)
}

fn read_u64(buf: &[u8], offset: &mut usize) -> Result<u64> {
    use crate::encoding::u64_from_u256_be;
    u64_from_u256_be(&read_word(buf, offset)?)
}

fn read_bytes(buf: &[u8], offset: &mut usize) -> Result<Vec<u8>> {
    let len = crate::encoding::u64_from_u256_be(&read_word(buf, offset)?)? as usize;
    if buf.len() < *offset + len {
        return Err(EngineError::DecodeError("calldata truncated reading bytes".into()));
    }
    let out = buf[*offset..*offset + len].to_vec();
    *offset += len;
    Ok(out)
}

fn read_append_proof(buf: &[u8], offset: &mut usize) -> Result<AppendProof> {
    let element_count = crate::encoding::u64_from_u256_be(&read_word(buf, offset)?)? as u32;
    let pre_count = crate::encoding::u64_from_u256_be(&read_word(buf, offset)?)?;
    let peak_count = crate::encoding::u64_from_u256_be(&read_word(buf, offset)?)? as usize;
    let mut pre_peaks = Vec::with_capacity(peak_count);
    for _ in 0..peak_count {
        pre_peaks.push(read_word(buf, offset)?);
    }
    Ok(AppendProof { element_count, pre_count, pre_peaks })
}

/// Decode raw arbiter calldata (sighash + ABI-encoded args) into an
/// [`ArbiterCall`], or `None` if the sighash is not one of the four
/// optimistic variants.
pub fn decode_arbiter_call(calldata: &[u8]) -> Result<Option<ArbiterCall>> {
    if calldata.len() < 4 {
        return Err(EngineError::DecodeError("calldata shorter than a sighash".into()));
    }
    let mut sighash = [0u8; 4];
    sighash.copy_from_slice(&calldata[..4]);
    if !is_optimistic_sighash(sighash) {
        return Ok(None);
    }
    let body = &calldata[4..];
    let mut offset = 0usize;

    let batch = is_batch_sighash(sighash);
    let blobs = if batch {
        let count = crate::encoding::u64_from_u256_be(&read_word(body, &mut offset)?)? as usize;
        let mut blobs = Vec::with_capacity(count);
        for _ in 0..count {
            blobs.push(read_bytes(body, &mut offset)?);
        }
        blobs
    } else {
        vec![read_bytes(body, &mut offset)?]
    };

    let new_state = read_word(body, &mut offset)?;

    let enters = matches!(sighash, PERFORM_MANY_OPTIMISTICALLY_AND_ENTER | PERFORM_OPTIMISTICALLY_AND_ENTER);
    let previous_root = if enters { None } else { Some(read_word(body, &mut offset)?) };

    let proof = read_append_proof(body, &mut offset)?;

    let previous_last_time = if enters { None } else { Some(read_u64(body, &mut offset)?) };

    Ok(Some(ArbiterCall { sighash, blobs, new_state, proof, previous_root, previous_last_time }))
}

/// Decoded logic calldata: the mandatory positional `user` and
/// `current_state`, plus whatever function-specific words follow.
#[derive(Debug, Clone)]
pub struct LogicCall {
    pub sighash: Sighash,
    pub user: Address,
    pub current_state: [u8; 32],
    pub args: Vec<[u8; 32]>,
}

/// Decode a logic calldata blob: `sighash ‖ user ‖ current_state ‖ args...`.
pub fn decode_logic_call(blob: &[u8]) -> Result<LogicCall> {
    if blob.len() < 4 {
        return Err(EngineError::DecodeError("logic calldata shorter than a sighash".into()));
    }
    let mut sighash = [0u8; 4];
    sighash.copy_from_slice(&blob[..4]);
    let mut offset = 4usize;
    let user = address_from_slice(&read_word(blob, &mut offset)?[12..])?;
    let current_state = read_word(blob, &mut offset)?;
    let mut args = Vec::new();
    while offset + 32 <= blob.len() {
        args.push(read_word(blob, &mut offset)?);
    }
    Ok(LogicCall { sighash, user, current_state, args })
}

/// Encode a logic calldata blob in the layout [`decode_logic_call`]
/// expects. Used by the operator facade to build the blobs it appends
/// to the calldata tree.
pub fn encode_logic_call(sighash: Sighash, user: &Address, current_state: &[u8; 32], args: &[[u8; 32]]) -> Vec<u8> {
    let mut out = Vec::with_capacity(4 + 32 + 32 + args.len() * 32);
    out.extend_from_slice(&sighash);
    let mut user_word = [0u8; 32];
    user_word[12..].copy_from_slice(user);
    out.extend_from_slice(&user_word);
    out.extend_from_slice(current_state);
    for arg in args {
        out.extend_from_slice(arg);
    }
    out
}

fn write_word(out: &mut Vec<u8>, word: &[u8; 32]) {
    out.extend_from_slice(word);
}

fn write_u64_word(out: &mut Vec<u8>, value: u64) {
    write_word(out, &crate::encoding::u256_be(value));
}

fn write_address_word(out: &mut Vec<u8>, addr: &Address) {
    let mut word = [0u8; 32];
    word[12..].copy_from_slice(addr);
    write_word(out, &word);
}

fn write_bytes(out: &mut Vec<u8>, bytes: &[u8]) {
    write_u64_word(out, bytes.len() as u64);
    out.extend_from_slice(bytes);
}

fn write_append_proof(out: &mut Vec<u8>, proof: &AppendProof) {
    write_u64_word(out, proof.element_count as u64);
    write_u64_word(out, proof.pre_count);
    write_u64_word(out, proof.pre_peaks.len() as u64);
    for peak in &proof.pre_peaks {
        write_word(out, peak);
    }
}

fn write_size_proof(out: &mut Vec<u8>, proof: &crate::merkle::SizeProof) {
    write_u64_word(out, proof.element_count);
    write_word(out, &proof.root);
}

fn write_multi_proof(out: &mut Vec<u8>, proof: &crate::merkle::MultiProof) {
    write_u64_word(out, proof.elements.len() as u64);
    for el in &proof.elements {
        write_bytes(out, el);
    }
    write_u64_word(out, proof.other_peaks.len() as u64);
    for peak in &proof.other_peaks {
        write_word(out, peak);
    }
}

/// Encode `perform(call_data)`.
pub fn encode_perform(call_data: &[u8]) -> Vec<u8> {
    let mut out = PERFORM.to_vec();
    write_bytes(&mut out, call_data);
    out
}

/// Encode `perform_and_exit(call_data, call_data_root, last_time)`.
pub fn encode_perform_and_exit(call_data: &[u8], call_data_root: &[u8; 32], last_time: u64) -> Vec<u8> {
    let mut out = PERFORM_AND_EXIT.to_vec();
    write_bytes(&mut out, call_data);
    write_word(&mut out, call_data_root);
    write_u64_word(&mut out, last_time);
    out
}

pub fn encode_bond() -> Vec<u8> {
    BOND.to_vec()
}

pub fn encode_initialize() -> Vec<u8> {
    INITIALIZE.to_vec()
}

pub fn encode_lock(suspect: &Address) -> Vec<u8> {
    let mut out = LOCK.to_vec();
    write_address_word(&mut out, suspect);
    out
}

pub fn encode_unlock(suspect: &Address, current_state: &[u8; 32], call_data_root: &[u8; 32], last_time: u64) -> Vec<u8> {
    let mut out = UNLOCK.to_vec();
    write_address_word(&mut out, suspect);
    write_word(&mut out, current_state);
    write_word(&mut out, call_data_root);
    write_u64_word(&mut out, last_time);
    out
}

pub fn encode_prove_fraud(
    suspect: &Address,
    current_state: &[u8; 32],
    call_data_root: &[u8; 32],
    proof: &crate::merkle::MultiProof,
    last_time: u64,
) -> Vec<u8> {
    let mut out = PROVE_FRAUD.to_vec();
    write_address_word(&mut out, suspect);
    write_multi_proof(&mut out, proof);
    write_word(&mut out, current_state);
    write_word(&mut out, call_data_root);
    write_u64_word(&mut out, last_time);
    out
}

#[allow(clippy::too_many_arguments)]
pub fn encode_rollback(
    old_root: &[u8; 32],
    rolled_back_blobs: &[Vec<u8>],
    append_proof: &AppendProof,
    current_size: u64,
    size_proof: &crate::merkle::SizeProof,
    current_root: &[u8; 32],
    current_state: &[u8; 32],
    last_time: u64,
) -> Vec<u8> {
    let mut out = ROLLBACK.to_vec();
    write_word(&mut out, old_root);
    write_u64_word(&mut out, rolled_back_blobs.len() as u64);
    for blob in rolled_back_blobs {
        write_bytes(&mut out, blob);
    }
    write_append_proof(&mut out, append_proof);
    write_u64_word(&mut out, current_size);
    write_size_proof(&mut out, size_proof);
    write_word(&mut out, current_root);
    write_word(&mut out, current_state);
    write_u64_word(&mut out, last_time);
    out
}

pub fn encode_unbond(destination: &Address) -> Vec<u8> {
    let mut out = UNBOND.to_vec();
    write_address_word(&mut out, destination);
    out
}

pub fn encode_perform_optimistically_and_enter(call_data: &[u8], new_state: &[u8; 32], proof: &AppendProof) -> Vec<u8> {
    let mut out = PERFORM_OPTIMISTICALLY_AND_ENTER.to_vec();
    write_bytes(&mut out, call_data);
    write_word(&mut out, new_state);
    write_append_proof(&mut out, proof);
    out
}

pub fn encode_perform_optimistically(
    call_data: &[u8],
    new_state: &[u8; 32],
    call_data_root: &[u8; 32],
    proof: &AppendProof,
    last_time: u64,
) -> Vec<u8> {
    let mut out = PERFORM_OPTIMISTICALLY.to_vec();
    write_bytes(&mut out, call_data);
    write_word(&mut out, new_state);
    write_word(&mut out, call_data_root);
    write_append_proof(&mut out, proof);
    write_u64_word(&mut out, last_time);
    out
}

pub fn encode_perform_many_optimistically_and_enter(call_data_array: &[Vec<u8>], new_state: &[u8; 32], proof: &AppendProof) -> Vec<u8> {
    let mut out = PERFORM_MANY_OPTIMISTICALLY_AND_ENTER.to_vec();
    write_u64_word(&mut out, call_data_array.len() as u64);
    for blob in call_data_array {
        write_bytes(&mut out, blob);
    }
    write_word(&mut out, new_state);
    write_append_proof(&mut out, proof);
    out
}

pub fn encode_perform_many_optimistically(
    call_data_array: &[Vec<u8>],
    new_state: &[u8; 32],
    call_data_root: &[u8; 32],
    proof: &AppendProof,
    last_time: u64,
) -> Vec<u8> {
    let mut out = PERFORM_MANY_OPTIMISTICALLY.to_vec();
    write_u64_word(&mut out, call_data_array.len() as u64);
    for blob in call_data_array {
        write_bytes(&mut out, blob);
    }
    write_word(&mut out, new_state);
    write_word(&mut out, call_data_root);
    write_append_proof(&mut out, proof);
    write_u64_word(&mut out, last_time);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_then_decode_logic_call_roundtrips() {
        let user = [0x42u8; 20];
        let state = [0x07u8; 32];
        let args = vec![[0x01u8; 32], [0x02u8; 32]];
        let blob = encode_logic_call([0xaa, 0xbb, 0xcc, 0xdd], &user, &state, &args);
        let decoded = decode_logic_call(&blob).unwrap();
        assert_eq!(decoded.user, user);
        assert_eq!(decoded.current_state, state);
        assert_eq!(decoded.args, args);
    }

    #[test]
    fn encode_then_decode_perform_optimistically_and_enter_roundtrips() {
        let call_data = vec![1, 2, 3, 4, 5];
        let new_state = [0x09u8; 32];
        let proof = AppendProof { element_count: 1, pre_count: 3, pre_peaks: vec![[0x11u8; 32], [0x22u8; 32]] };
        let encoded = encode_perform_optimistically_and_enter(&call_data, &new_state, &proof);
        let decoded = decode_arbiter_call(&encoded).unwrap().unwrap();
        assert_eq!(decoded.blobs, vec![call_data]);
        assert_eq!(decoded.new_state, new_state);
        assert_eq!(decoded.proof, proof);
        assert!(decoded.implies_enter());
    }

    #[test]
    fn encode_then_decode_perform_many_optimistically_roundtrips() {
        let blobs = vec![vec![1, 2], vec![3, 4, 5]];
        let new_state = [0x0au8; 32];
        let root = [0x0bu8; 32];
        let proof = AppendProof { element_count: 2, pre_count: 0, pre_peaks: vec![] };
        let encoded = encode_perform_many_optimistically(&blobs, &new_state, &root, &proof, 77);
        let decoded = decode_arbiter_call(&encoded).unwrap().unwrap();
        assert_eq!(decoded.blobs, blobs);
        assert_eq!(decoded.previous_root, Some(root));
        assert_eq!(decoded.previous_last_time, Some(77));
        assert!(!decoded.implies_enter());
    }

    #[test]
    fn non_optimistic_sighash_decodes_to_none() {
        let calldata = vec![0x00, 0x01, 0x02, 0x03, 0xff, 0xff];
        assert!(decode_arbiter_call(&calldata).unwrap().is_none());
    }

    #[test]
    fn single_and_enter_variant_has_no_previous_fields() {
        let mut body = Vec::new();
        // bytes offset not used by our flat reader, blob length then bytes
        let blob = vec![0xde, 0xad, 0xbe, 0xef];
        let mut len_word = [0u8; 32];
        len_word[24..].copy_from_slice(&(blob.len() as u64).to_be_bytes());
        body.extend_from_slice(&len_word);
        body.extend_from_slice(&blob);
        body.extend_from_slice(&[0x11u8; 32]); // new_state
        // append proof: element_count=1, pre_count=0, peak_count=0
        let mut ec = [0u8; 32];
        ec[28..].copy_from_slice(&1u32.to_be_bytes());
        body.extend_from_slice(&ec);
        body.extend_from_slice(&[0u8; 32]); // pre_count
        body.extend_from_slice(&[0u8; 32]); // peak_count = 0

        let mut calldata = PERFORM_OPTIMISTICALLY_AND_ENTER.to_vec();
        calldata.extend_from_slice(&body);

        let decoded = decode_arbiter_call(&calldata).unwrap().unwrap();
        assert!(decoded.previous_root.is_none());
        assert!(decoded.previous_last_time.is_none());
        assert_eq!(decoded.blobs, vec![blob]);
        assert!(decoded.implies_enter());
    }
}
