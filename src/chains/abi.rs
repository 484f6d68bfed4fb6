//! Minimal Solidity ABI encoding/decoding for the escrow view functions.
//!
//! Only the shapes the escrow read path needs are supported: 32-byte words,
//! dynamic arrays, `bytes`/`string`, and nested tuples addressed by offset.

use anyhow::{Context, Result};
use ethereum_types::U256;
use sha3::{Digest, Keccak256};

const WORD: usize = 32;

/// Computes the 4-byte function selector for a Solidity signature.
pub fn selector(signature: &str) -> [u8; 4] {
    let mut hasher = Keccak256::new();
    hasher.update(signature.as_bytes());
    let hash = hasher.finalize();
    let mut out = [0u8; 4];
    out.copy_from_slice(&hash[..4]);
    out
}

/// Left-pads a u64 into a 32-byte word.
pub fn encode_u64(value: u64) -> [u8; WORD] {
    let mut word = [0u8; WORD];
    word[WORD - 8..].copy_from_slice(&value.to_be_bytes());
    word
}

/// Left-pads a `0x`-prefixed 20-byte address into a 32-byte word.
pub fn encode_address(addr: &str) -> Result<[u8; WORD]> {
    let bytes = decode_hex(addr).context("Invalid address")?;
    if bytes.len() != 20 {
        anyhow::bail!("Invalid address length: expected 20 bytes, got {}", bytes.len());
    }
    let mut word = [0u8; WORD];
    word[WORD - 20..].copy_from_slice(&bytes);
    Ok(word)
}

/// Encodes a `bytes32` value, right-padding shorter input.
pub fn encode_bytes32(value: &str) -> Result<[u8; WORD]> {
    let bytes = decode_hex(value).context("Invalid bytes32")?;
    if bytes.len() > WORD {
        anyhow::bail!("bytes32 value is {} bytes long", bytes.len());
    }
    let mut word = [0u8; WORD];
    word[..bytes.len()].copy_from_slice(&bytes);
    Ok(word)
}

/// Encodes a call with a single dynamic array argument of 32-byte words.
pub fn encode_call_with_array(signature: &str, items: &[[u8; WORD]]) -> String {
    let mut data = Vec::with_capacity(4 + WORD * (2 + items.len()));
    data.extend_from_slice(&selector(signature));
    data.extend_from_slice(&encode_u64(WORD as u64));
    data.extend_from_slice(&encode_u64(items.len() as u64));
    for item in items {
        data.extend_from_slice(item);
    }
    format!("0x{}", hex::encode(data))
}

/// Encodes a call whose arguments are all static words.
pub fn encode_call(signature: &str, words: &[[u8; WORD]]) -> String {
    let mut data = Vec::with_capacity(4 + WORD * words.len());
    data.extend_from_slice(&selector(signature));
    for word in words {
        data.extend_from_slice(word);
    }
    format!("0x{}", hex::encode(data))
}

pub fn decode_hex(value: &str) -> Result<Vec<u8>> {
    let stripped = value.strip_prefix("0x").unwrap_or(value);
    hex::decode(stripped).map_err(|e| anyhow::anyhow!("Invalid hex '{}': {}", value, e))
}

/// A cursor over ABI-encoded return data.
///
/// `base` is the byte position the current tuple or array body starts at;
/// head slots are indexed relative to it and offsets resolve against it.
#[derive(Debug, Clone, Copy)]
pub struct AbiSlice<'a> {
    data: &'a [u8],
    base: usize,
}

impl<'a> AbiSlice<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, base: 0 }
    }

    fn word(&self, index: usize) -> Result<&'a [u8]> {
        let start = self.base + index * WORD;
        self.data.get(start..start + WORD).ok_or_else(|| {
            anyhow::anyhow!(
                "ABI data too short: need word at byte {}, have {} bytes",
                start,
                self.data.len()
            )
        })
    }

    pub fn uint(&self, index: usize) -> Result<U256> {
        Ok(U256::from_big_endian(self.word(index)?))
    }

    /// Reads a word as a length or offset.
    pub fn usize(&self, index: usize) -> Result<usize> {
        let value = self.uint(index)?;
        if value > U256::from(self.data.len()) {
            anyhow::bail!("ABI offset/length {} exceeds data length {}", value, self.data.len());
        }
        Ok(value.as_usize())
    }

    /// Renders a uint word as `0x` hex text.
    pub fn uint_hex(&self, index: usize) -> Result<String> {
        Ok(format!("0x{:x}", self.uint(index)?))
    }

    /// Address in slot `index`. A word with dirty upper bytes is returned whole
    /// and left for the parser to reject.
    pub fn address(&self, index: usize) -> Result<String> {
        let word = self.word(index)?;
        if word[..WORD - 20].iter().any(|b| *b != 0) {
            return Ok(format!("0x{}", hex::encode(word)));
        }
        Ok(format!("0x{}", hex::encode(&word[WORD - 20..])))
    }

    pub fn bytes32(&self, index: usize) -> Result<String> {
        Ok(format!("0x{}", hex::encode(self.word(index)?)))
    }

    pub fn bool(&self, index: usize) -> Result<bool> {
        Ok(!self.uint(index)?.is_zero())
    }

    /// Follows the offset stored in head slot `index`.
    pub fn tail(&self, index: usize) -> Result<AbiSlice<'a>> {
        let offset = self.usize(index)?;
        Ok(AbiSlice {
            data: self.data,
            base: self.base + offset,
        })
    }

    /// Resolves the dynamic array referenced by head slot `index`.
    ///
    /// Returns the element count and a slice whose word 0 is the first element.
    pub fn array(&self, index: usize) -> Result<(usize, AbiSlice<'a>)> {
        let body = self.tail(index)?;
        let len = body.usize(0)?;
        Ok((
            len,
            AbiSlice {
                data: self.data,
                base: body.base + WORD,
            },
        ))
    }

    /// Element `i` of an array of static tuples `width` words wide.
    pub fn static_element(&self, i: usize, width: usize) -> AbiSlice<'a> {
        AbiSlice {
            data: self.data,
            base: self.base + i * width * WORD,
        }
    }

    /// Resolves `bytes` / `string` referenced by head slot `index`.
    pub fn bytes(&self, index: usize) -> Result<Vec<u8>> {
        let body = self.tail(index)?;
        let len = body.usize(0)?;
        let start = body.base + WORD;
        self.data
            .get(start..start + len)
            .map(|b| b.to_vec())
            .ok_or_else(|| anyhow::anyhow!("ABI bytes out of range at byte {}", start))
    }
}
