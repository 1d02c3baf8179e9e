// Copyright 2019-2023 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! Trait contracts for the external collaborators this crate consumes: the
//! hot/cold blockstores, the tracking store, the mark-set environment, the
//! metadata datastore, and the chain accessor. `Blockstore` is object-safe
//! so hot and cold can be stored as `Arc<dyn Blockstore>`, with the optional
//! extension capability (`compact`/`collect_garbage`) split into its own
//! trait and probed once at startup rather than per call.

use cid::Cid;
use flume::Receiver;

use crate::error::Result;
use crate::types::{ChainEpoch, Tipset};

/// Core capability every hot/cold backend must provide.
pub trait Blockstore: Send + Sync {
    fn has(&self, cid: &Cid) -> Result<bool>;
    fn get(&self, cid: &Cid) -> Result<Option<Vec<u8>>>;

    fn get_size(&self, cid: &Cid) -> Result<Option<usize>> {
        Ok(self.get(cid)?.map(|b| b.len()))
    }

    fn put_keyed(&self, cid: &Cid, bytes: &[u8]) -> Result<()>;

    fn put_many_keyed(&self, blocks: &[(Cid, Vec<u8>)]) -> Result<()> {
        for (cid, bytes) in blocks {
            self.put_keyed(cid, bytes)?;
        }
        Ok(())
    }

    fn delete_many(&self, cids: &[Cid]) -> Result<()>;

    fn all_keys(&self) -> Result<Vec<Cid>>;

    /// Runs `f` against the stored bytes for `cid`, returning `false`
    /// without calling it if absent. The default just delegates to `get`;
    /// a backend that can hand back a direct reference into its own buffers
    /// (e.g. an mmap'd page or an `Arc`-shared block) should override this
    /// to avoid the extra clone `get` otherwise requires.
    fn view(&self, cid: &Cid, f: &mut dyn FnMut(&[u8])) -> Result<bool> {
        match self.get(cid)? {
            Some(bytes) => {
                f(&bytes);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Enables or disables verifying a block's hash against its CID on
    /// every read. No-op by default; backends that support it override.
    fn hash_on_read(&self, _enabled: bool) {}
}

/// Optional extension capability, probed once at startup rather than on
/// every call (`Open` checks whether the concrete backend happens to expose
/// it, see [`crate::splitstore::SplitStore::open`]).
pub trait BlockstoreExt: Send + Sync {
    fn compact(&self) -> Result<()> {
        Ok(())
    }

    fn collect_garbage(&self) -> Result<()> {
        Ok(())
    }
}

/// Durable CID -> write-epoch map.
pub trait TrackingStore: Send + Sync {
    fn put_batch(&self, cids: &[Cid], epoch: ChainEpoch) -> Result<()>;
    fn delete_batch(&self, cids: &[Cid]) -> Result<()>;
    fn delete(&self, cid: &Cid) -> Result<()>;

    /// Invokes `f` exactly once for every live record. Iteration order is
    /// unspecified.
    fn for_each(&self, f: &mut dyn FnMut(Cid, ChainEpoch) -> Result<()>) -> Result<()>;

    fn sync(&self) -> Result<()>;
    fn close(&self) -> Result<()>;
}

/// A single mark-set instance, scoped to one compaction run (`live`) or to
/// one transactional protection window (`protected`).
pub trait MarkSet: Send + Sync {
    fn mark(&self, cid: &Cid) -> Result<()>;
    fn has(&self, cid: &Cid) -> Result<bool>;
    fn close(&self) -> Result<()>;
}

/// Factory for mark-sets. Two environments are expected in practice: a
/// primary one (bloom or sled-backed) for `live`, and an exact in-memory
/// one ("mapts") for `protected`.
pub trait MarkSetEnv: Send + Sync {
    fn create(&self, name: &str, size_hint: usize) -> Result<Box<dyn MarkSet>>;
}

/// Opaque key/value datastore backing the persisted metadata keys
/// (`baseEpoch`, `warmupEpoch`, `markSetSize`).
pub trait MetadataDatastore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;
    fn put(&self, key: &str, value: &[u8]) -> Result<()>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HeadChange {
    Apply(Tipset),
    Revert(Tipset),
}

/// Supplies chain data to the warmup, chain walker, and compactor. The
/// concrete chain implementation lives outside this crate; callers provide
/// their own `ChainAccessor` backed by their chain store rather than this
/// crate embedding one.
pub trait ChainAccessor: Send + Sync {
    fn get_genesis(&self) -> Result<Tipset>;
    fn get_tipset_by_height(&self, epoch: ChainEpoch, anchor: &Tipset, prev: bool) -> Result<Tipset>;
    fn heaviest_tipset(&self) -> Result<Tipset>;

    /// Subscribes to head changes; the returned receiver is expected to
    /// live for the lifetime of the splitstore.
    fn subscribe_head_changes(&self) -> Receiver<HeadChange>;
}

/// Fetches a block's raw bytes, hot-first, without going through the
/// façade's transaction lock. Used internally by the link and chain
/// walkers, which are invoked from contexts (warmup, compaction) that
/// already govern their own locking.
pub trait InternalGetter: Send + Sync {
    fn get(&self, cid: &Cid) -> Result<Option<Vec<u8>>>;
}
