// Copyright 2019-2023 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use cid::Cid;

use crate::error::{Error, Result};
use crate::traits::TrackingStore;
use crate::types::ChainEpoch;
use crate::varint;

/// `sled`-backed tracking store, selected by `TrackingStoreType::Bolt`.
/// Keys are the CID's binary encoding; values are the write-epoch, varint
/// encoded.
pub struct SledTrackingStore {
    tree: sled::Tree,
}

impl SledTrackingStore {
    pub fn open(db: &sled::Db, tree_name: &str) -> Result<Self> {
        let tree = db.open_tree(tree_name)?;
        Ok(Self { tree })
    }
}

impl TrackingStore for SledTrackingStore {
    fn put_batch(&self, cids: &[Cid], epoch: ChainEpoch) -> Result<()> {
        let value = varint::encode_epoch(epoch);
        let mut batch = sled::Batch::default();
        for cid in cids {
            batch.insert(cid.to_bytes(), value.as_slice());
        }
        self.tree.apply_batch(batch)?;
        Ok(())
    }

    fn delete_batch(&self, cids: &[Cid]) -> Result<()> {
        let mut batch = sled::Batch::default();
        for cid in cids {
            batch.remove(cid.to_bytes());
        }
        self.tree.apply_batch(batch)?;
        Ok(())
    }

    fn delete(&self, cid: &Cid) -> Result<()> {
        self.tree.remove(cid.to_bytes())?;
        Ok(())
    }

    fn for_each(&self, f: &mut dyn FnMut(Cid, ChainEpoch) -> Result<()>) -> Result<()> {
        for entry in self.tree.iter() {
            let (key, value) = entry?;
            let cid = Cid::try_from(key.as_ref()).map_err(|e| Error::Corruption {
                cid: Cid::default(),
                reason: format!("invalid tracking-store key: {e}"),
            })?;
            let epoch = varint::decode_epoch(&value)?;
            f(cid, epoch)?;
        }
        Ok(())
    }

    fn sync(&self) -> Result<()> {
        self.tree.flush()?;
        Ok(())
    }

    fn close(&self) -> Result<()> {
        self.tree.flush()?;
        Ok(())
    }
}
