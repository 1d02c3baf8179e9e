// Copyright 2019-2023 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use std::collections::HashMap;

use cid::Cid;
use parking_lot::RwLock;

use crate::error::Result;
use crate::traits::TrackingStore;
use crate::types::ChainEpoch;

/// In-memory tracking store, selected by `TrackingStoreType::Mem`.
#[derive(Default)]
pub struct MemTrackingStore {
    inner: RwLock<HashMap<Cid, ChainEpoch>>,
}

impl MemTrackingStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl TrackingStore for MemTrackingStore {
    fn put_batch(&self, cids: &[Cid], epoch: ChainEpoch) -> Result<()> {
        let mut guard = self.inner.write();
        for cid in cids {
            guard.insert(*cid, epoch);
        }
        Ok(())
    }

    fn delete_batch(&self, cids: &[Cid]) -> Result<()> {
        let mut guard = self.inner.write();
        for cid in cids {
            guard.remove(cid);
        }
        Ok(())
    }

    fn delete(&self, cid: &Cid) -> Result<()> {
        self.inner.write().remove(cid);
        Ok(())
    }

    fn for_each(&self, f: &mut dyn FnMut(Cid, ChainEpoch) -> Result<()>) -> Result<()> {
        for (cid, epoch) in self.inner.read().iter() {
            f(*cid, *epoch)?;
        }
        Ok(())
    }

    fn sync(&self) -> Result<()> {
        Ok(())
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
    fn put_batch_and_iterate() {
        let store = MemTrackingStore::new();
        store.put_batch(&[cid(1), cid(2)], 42).unwrap();
        let mut seen = Vec::new();
        store
            .for_each(&mut |c, e| {
                seen.push((c, e));
                Ok(())
            })
            .unwrap();
        seen.sort_by_key(|(c, _)| *c);
        let mut expected = vec![(cid(1), 42), (cid(2), 42)];
        expected.sort_by_key(|(c, _)| *c);
        assert_eq!(seen, expected);
    }

    #[test]
    fn last_writer_wins_on_epoch() {
        let store = MemTrackingStore::new();
        store.put_batch(&[cid(1)], 1).unwrap();
        store.put_batch(&[cid(1)], 2).unwrap();
        let mut seen = Vec::new();
        store
            .for_each(&mut |c, e| {
                seen.push((c, e));
                Ok(())
            })
            .unwrap();
        assert_eq!(seen, vec![(cid(1), 2)]);
    }

    #[test]
    fn delete_removes_entry() {
        let store = MemTrackingStore::new();
        store.put_batch(&[cid(1), cid(2)], 1).unwrap();
        store.delete(&cid(1)).unwrap();
        store.delete_batch(&[cid(2)]).unwrap();
        assert!(store.is_empty());
    }
}
