// Copyright 2019-2023 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! Hand-rolled bloom-filter mark-set: the default `live` backend. Sized by
//! the caller with the 25% headroom policy (see `markSetSize` bookkeeping in
//! the warmup and compaction modules) to keep the false-positive rate
//! stable as the set fills.

use std::hash::BuildHasher;
use std::sync::atomic::{AtomicU64, Ordering};

use ahash::RandomState;
use cid::Cid;

use crate::error::Result;
use crate::traits::{MarkSet, MarkSetEnv};

pub const DEFAULT_FALSE_POSITIVE_RATE: f64 = 0.001;

pub struct BloomMarkSetEnv {
    false_positive_rate: f64,
}

impl BloomMarkSetEnv {
    pub fn new(false_positive_rate: f64) -> Self {
        Self { false_positive_rate }
    }
}

impl Default for BloomMarkSetEnv {
    fn default() -> Self {
        Self::new(DEFAULT_FALSE_POSITIVE_RATE)
    }
}

impl MarkSetEnv for BloomMarkSetEnv {
    fn create(&self, _name: &str, size_hint: usize) -> Result<Box<dyn MarkSet>> {
        Ok(Box::new(BloomFilter::new(size_hint.max(1), self.false_positive_rate)))
    }
}

struct BloomFilter {
    bits: Vec<AtomicU64>,
    num_bits: u64,
    num_hashes: u32,
    hashers: [RandomState; 2],
}

impl BloomFilter {
    fn new(expected_items: usize, false_positive_rate: f64) -> Self {
        let num_bits = optimal_num_bits(expected_items, false_positive_rate).max(64);
        let num_hashes = optimal_num_hashes(expected_items, num_bits).max(1);
        let words = (num_bits as usize + 63) / 64;
        Self {
            bits: (0..words).map(|_| AtomicU64::new(0)).collect(),
            num_bits,
            num_hashes,
            // Fixed seeds: a mark-set only needs to be internally
            // consistent for the lifetime of one compaction, not
            // resistant to adversarial input.
            hashers: [
                RandomState::with_seeds(0x5150_4944, 0x4f52_4553, 0x5441, 0x4b45),
                RandomState::with_seeds(0x464f, 0x5245, 0x5354, 0x3132),
            ],
        }
    }

    fn bit_indices(&self, cid: &Cid) -> impl Iterator<Item = u64> + '_ {
        let bytes = cid.to_bytes();
        let h1 = self.hashers[0].hash_one(&bytes);
        let h2 = self.hashers[1].hash_one(&bytes);
        let num_bits = self.num_bits;
        (0..self.num_hashes).map(move |i| {
            let combined = h1.wrapping_add((i as u64).wrapping_mul(h2));
            combined % num_bits
        })
    }

    fn set_bit(&self, index: u64) {
        let word = (index / 64) as usize;
        let bit = index % 64;
        self.bits[word].fetch_or(1 << bit, Ordering::Relaxed);
    }

    fn get_bit(&self, index: u64) -> bool {
        let word = (index / 64) as usize;
        let bit = index % 64;
        self.bits[word].load(Ordering::Relaxed) & (1 << bit) != 0
    }
}

impl MarkSet for BloomFilter {
    fn mark(&self, cid: &Cid) -> Result<()> {
        for idx in self.bit_indices(cid) {
            self.set_bit(idx);
        }
        Ok(())
    }

    fn has(&self, cid: &Cid) -> Result<bool> {
        Ok(self.bit_indices(cid).all(|idx| self.get_bit(idx)))
    }

    fn close(&self) -> Result<()> {
        Ok(())
    }
}

fn optimal_num_bits(n: usize, p: f64) -> u64 {
    if n == 0 {
        return 64;
    }
    let n = n as f64;
    let m = -(n * p.ln()) / std::f64::consts::LN_2.powi(2);
    m.ceil() as u64
}

fn optimal_num_hashes(n: usize, m: u64) -> u32 {
    if n == 0 {
        return 1;
    }
    let k = (m as f64 / n as f64) * std::f64::consts::LN_2;
    k.round().max(1.0) as u32
}

#[cfg(test)]
mod tests {
    use multihash_codetable::{Code, MultihashDigest};

    use super::*;

    fn cid(n: u8) -> Cid {
        Cid::new_v1(0x55, Code::Sha2_256.digest(&[n]))
    }

    #[test]
    fn marked_cids_are_always_found() {
        let env = BloomMarkSetEnv::default();
        let set = env.create("live", 1000).unwrap();
        let marked: Vec<Cid> = (0..200).map(cid).collect();
        for c in &marked {
            set.mark(c).unwrap();
        }
        for c in &marked {
            assert!(set.has(c).unwrap());
        }
    }

    #[test]
    fn false_positive_rate_is_reasonably_bounded() {
        let env = BloomMarkSetEnv::new(0.01);
        let set = env.create("live", 500).unwrap();
        for n in 0..500u16 {
            let c = Cid::new_v1(0x55, Code::Sha2_256.digest(&n.to_le_bytes()));
            set.mark(&c).unwrap();
        }
        let mut false_positives = 0;
        let trials = 2000u16;
        for n in 500..500 + trials {
            let c = Cid::new_v1(0x55, Code::Sha2_256.digest(&n.to_le_bytes()));
            if set.has(&c).unwrap() {
                false_positives += 1;
            }
        }
        // Generous bound: configured for 1% but tolerate noise from the
        // small sample size.
        assert!(
            (false_positives as f64 / trials as f64) < 0.05,
            "false positive rate too high: {false_positives}/{trials}"
        );
    }
}
