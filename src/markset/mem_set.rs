// Copyright 2019-2023 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use std::collections::HashSet;

use cid::Cid;
use parking_lot::RwLock;

use crate::error::Result;
use crate::traits::{MarkSet, MarkSetEnv};

/// Exact, in-memory mark-set environment. Used for the transactional
/// "mapts" set (`protected`), whose lifetime never outlives one compaction,
/// and as the `MarkSetType::Bloom` alternative in tests.
#[derive(Default)]
pub struct MemMarkSetEnv;

impl MemMarkSetEnv {
    pub fn new() -> Self {
        Self
    }
}

impl MarkSetEnv for MemMarkSetEnv {
    fn create(&self, _name: &str, size_hint: usize) -> Result<Box<dyn MarkSet>> {
        Ok(Box::new(MemMarkSet {
            inner: RwLock::new(HashSet::with_capacity(size_hint)),
        }))
    }
}

struct MemMarkSet {
    inner: RwLock<HashSet<Cid>>,
}

impl MarkSet for MemMarkSet {
    fn mark(&self, cid: &Cid) -> Result<()> {
        self.inner.write().insert(*cid);
        Ok(())
    }

    fn has(&self, cid: &Cid) -> Result<bool> {
        Ok(self.inner.read().contains(cid))
    }

    fn close(&self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use multihash_codetable::{Code, MultihashDigest};

    use super::*;

    fn cid(n: u8) -> Cid {
        Cid::new_v1(0x55, Code::Sha2_256.digest(&[n]))
    }

    #[test]
    fn mark_and_has() {
        let env = MemMarkSetEnv::new();
        let set = env.create("protected", 0).unwrap();
        assert!(!set.has(&cid(1)).unwrap());
        set.mark(&cid(1)).unwrap();
        assert!(set.has(&cid(1)).unwrap());
        assert!(!set.has(&cid(2)).unwrap());
    }
}
