// Copyright 2019-2023 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! Persisted metadata: `baseEpoch`, `warmupEpoch`, `markSetSize`, keyed under
//! `/splitstore/...` in an opaque [`MetadataDatastore`] so this crate does
//! not dictate its storage engine to embedding applications.

use crate::error::Result;
use crate::traits::MetadataDatastore;
use crate::types::ChainEpoch;
use crate::varint;

const BASE_EPOCH_KEY: &str = "/splitstore/baseEpoch";
const WARMUP_EPOCH_KEY: &str = "/splitstore/warmupEpoch";
const MARK_SET_SIZE_KEY: &str = "/splitstore/markSetSize";

pub struct MetadataStore<'a> {
    ds: &'a dyn MetadataDatastore,
}

impl<'a> MetadataStore<'a> {
    pub fn new(ds: &'a dyn MetadataDatastore) -> Self {
        Self { ds }
    }

    pub fn get_base_epoch(&self) -> Result<Option<ChainEpoch>> {
        self.get_epoch(BASE_EPOCH_KEY)
    }

    pub fn set_base_epoch(&self, epoch: ChainEpoch) -> Result<()> {
        self.put_epoch(BASE_EPOCH_KEY, epoch)
    }

    pub fn get_warmup_epoch(&self) -> Result<Option<ChainEpoch>> {
        self.get_epoch(WARMUP_EPOCH_KEY)
    }

    pub fn set_warmup_epoch(&self, epoch: ChainEpoch) -> Result<()> {
        self.put_epoch(WARMUP_EPOCH_KEY, epoch)
    }

    pub fn get_mark_set_size(&self) -> Result<Option<u64>> {
        match self.ds.get(MARK_SET_SIZE_KEY)? {
            Some(bytes) => Ok(Some(varint::decode_size(&bytes)?)),
            None => Ok(None),
        }
    }

    pub fn set_mark_set_size(&self, size: u64) -> Result<()> {
        self.ds.put(MARK_SET_SIZE_KEY, &varint::encode_size(size))
    }

    fn get_epoch(&self, key: &str) -> Result<Option<ChainEpoch>> {
        match self.ds.get(key)? {
            Some(bytes) => Ok(Some(varint::decode_epoch(&bytes)?)),
            None => Ok(None),
        }
    }

    fn put_epoch(&self, key: &str, epoch: ChainEpoch) -> Result<()> {
        self.ds.put(key, &varint::encode_epoch(epoch))
    }
}

/// `sled`-backed [`MetadataDatastore`], used when no embedding-application
/// datastore is supplied to [`crate::splitstore::SplitStore::open`].
pub struct SledMetadataDatastore {
    tree: sled::Tree,
}

impl SledMetadataDatastore {
    pub fn open(db: &sled::Db, tree_name: &str) -> Result<Self> {
        let tree = db.open_tree(tree_name)?;
        Ok(Self { tree })
    }
}

impl MetadataDatastore for SledMetadataDatastore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.tree.get(key)?.map(|v| v.to_vec()))
    }

    fn put(&self, key: &str, value: &[u8]) -> Result<()> {
        self.tree.insert(key, value)?;
        Ok(())
    }
}

/// Applies the 25% headroom policy used both by warmup and by the
/// compaction mark/collect steps when a fresh size estimate exceeds the
/// persisted one.
pub fn with_headroom(count: u64) -> u64 {
    count + count / 4
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use parking_lot::Mutex;

    use super::*;

    #[derive(Default)]
    struct MemDatastore(Mutex<HashMap<String, Vec<u8>>>);

    impl MetadataDatastore for MemDatastore {
        fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
            Ok(self.0.lock().get(key).cloned())
        }

        fn put(&self, key: &str, value: &[u8]) -> Result<()> {
            self.0.lock().insert(key.to_string(), value.to_vec());
            Ok(())
        }
    }

    #[test]
    fn round_trips_all_three_keys() {
        let ds = MemDatastore::default();
        let store = MetadataStore::new(&ds);

        assert_eq!(store.get_base_epoch().unwrap(), None);
        store.set_base_epoch(123).unwrap();
        assert_eq!(store.get_base_epoch().unwrap(), Some(123));

        store.set_warmup_epoch(0).unwrap();
        assert_eq!(store.get_warmup_epoch().unwrap(), Some(0));

        store.set_mark_set_size(1000).unwrap();
        assert_eq!(store.get_mark_set_size().unwrap(), Some(1000));
    }

    #[test]
    fn headroom_is_25_percent() {
        assert_eq!(with_headroom(100), 125);
        assert_eq!(with_headroom(0), 0);
    }
}
