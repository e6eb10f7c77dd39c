//! Encoding primitives: fixed-width integers, hex, and the Keccak-256
//! packed hash used for every commitment in this crate.

use crate::error::{EngineError, Result};
use tiny_keccak::{Hasher, Keccak};

/// 20-byte account / contract address.
pub type Address = [u8; 20];

/// Keccak-256 over the concatenation of all given byte slices.
pub fn keccak256(parts: &[&[u8]]) -> [u8; 32] {
    let mut hasher = Keccak::v256();
    for part in parts {
        hasher.update(part);
    }
    let mut out = [0u8; 32];
    hasher.finalize(&mut out);
    out
}

/// Big-endian encoding of a `u64` into the low 8 bytes of a 32-byte word,
/// matching Solidity's `uint256` ABI encoding of a small integer.
pub fn u256_be(value: u64) -> [u8; 32] {
    let mut out = [0u8; 32];
    out[24..].copy_from_slice(&value.to_be_bytes());
    out
}

/// Inverse of [`u256_be`]: only valid if the high 24 bytes are zero.
pub fn u64_from_u256_be(word: &[u8; 32]) -> Result<u64> {
    if word[..24].iter().any(|b| *b != 0) {
        return Err(EngineError::DecodeError(
            "u256 value does not fit in u64".into(),
        ));
    }
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&word[24..]);
    Ok(u64::from_be_bytes(buf))
}

/// Lower-cased `0x`-prefixed hex of an address, used as a stable map key
/// regardless of the caller's casing convention.
pub fn lowercase_address(addr: &Address) -> String {
    format!("0x{}", hex::encode(addr))
}

pub fn decode_hex(s: &str) -> Result<Vec<u8>> {
    let s = s.strip_prefix("0x").unwrap_or(s);
    Ok(hex::decode(s)?)
}

pub fn encode_hex(bytes: &[u8]) -> String {
    format!("0x{}", hex::encode(bytes))
}

pub fn address_from_slice(bytes: &[u8]) -> Result<Address> {
    bytes
        .try_into()
        .map_err(|_| EngineError::DecodeError(format!("expected 20-byte address, got {} bytes", bytes.len())))
}

pub fn word_from_slice(bytes: &[u8]) -> Result<[u8; 32]> {
    bytes
        .try_into()
        .map_err(|_| EngineError::DecodeError(format!("expected 32-byte word, got {} bytes", bytes.len())))
}

/// An address right-aligned in a storage word, per Solidity's layout for
/// an `address`-typed slot.
pub fn address_from_word(word: &[u8; 32]) -> Address {
    word[12..].try_into().expect("slice of 20 is an Address")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn u256_roundtrip() {
        let word = u256_be(1_700_000_000);
        assert_eq!(u64_from_u256_be(&word).unwrap(), 1_700_000_000);
    }

    #[test]
    fn u256_rejects_overflow() {
        let mut word = [0u8; 32];
        word[0] = 1;
        assert!(u64_from_u256_be(&word).is_err());
    }

    #[test]
    fn keccak_is_deterministic() {
        let a = keccak256(&[b"hello", b"world"]);
        let b = keccak256(&[b"hello", b"world"]);
        assert_eq!(a, b);
        let c = keccak256(&[b"helloworld"]);
        assert_eq!(a, c, "keccak256 must hash the concatenation, not the parts separately");
    }

    #[test]
    fn lowercase_address_is_stable() {
        let addr: Address = [0xABu8; 20];
        assert_eq!(lowercase_address(&addr), format!("0x{}", "ab".repeat(20)));
    }

    #[test]
    fn address_from_word_takes_the_low_twenty_bytes() {
        let mut word = [0u8; 32];
        word[12..].copy_from_slice(&[0xCDu8; 20]);
        assert_eq!(address_from_word(&word), [0xCDu8; 20]);
    }
}
