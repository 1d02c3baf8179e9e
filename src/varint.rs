// Copyright 2019-2023 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! Varint encode/decode for the epoch and size scalars persisted to the
//! metadata store (`baseEpoch`, `warmupEpoch`, `markSetSize`).

use unsigned_varint::{decode, encode};

use crate::error::{Error, Result};

/// Buffer large enough to hold the varint encoding of a zigzag-mapped i64,
/// or of a u64, with room to spare.
pub const METADATA_BUF_LEN: usize = 16;

pub fn encode_epoch(epoch: i64) -> Vec<u8> {
    let zigzag = zigzag_encode(epoch);
    let mut buf = encode::u64_buffer();
    encode::u64(zigzag, &mut buf).to_vec()
}

pub fn decode_epoch(bytes: &[u8]) -> Result<i64> {
    let (value, _) = decode::u64(bytes).map_err(|e| Error::Codec(e.to_string()))?;
    Ok(zigzag_decode(value))
}

pub fn encode_size(size: u64) -> Vec<u8> {
    let mut buf = encode::u64_buffer();
    encode::u64(size, &mut buf).to_vec()
}

pub fn decode_size(bytes: &[u8]) -> Result<u64> {
    let (value, _) = decode::u64(bytes).map_err(|e| Error::Codec(e.to_string()))?;
    Ok(value)
}

fn zigzag_encode(v: i64) -> u64 {
    ((v << 1) ^ (v >> 63)) as u64
}

fn zigzag_decode(v: u64) -> i64 {
    ((v >> 1) as i64) ^ -((v & 1) as i64)
}
