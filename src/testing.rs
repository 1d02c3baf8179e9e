// Copyright 2019-2023 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! In-memory doubles for every external collaborator this crate consumes:
//! a blockstore, a metadata datastore, and a chain accessor. Used by this
//! crate's own unit tests and exposed (behind the `test-util` feature,
//! mirroring `tokio`'s own pattern) to the integration tests under
//! `tests/`.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use cid::Cid;
use flume::{Receiver, Sender};
use multihash_codetable::{Code, MultihashDigest};
use parking_lot::RwLock;
use serde::Serialize;

use crate::error::Result;
use crate::traits::{Blockstore, BlockstoreExt, ChainAccessor, HeadChange, MetadataDatastore};
use crate::types::{BlockHeader, ChainEpoch, Tipset, DAG_CBOR};

/// Deterministic CID for a raw (non-DAG-CBOR) payload, keyed by a small
/// integer so fixtures are easy to read in assertions.
pub fn raw_cid(seed: u64) -> Cid {
    Cid::new_v1(0x55, Code::Sha2_256.digest(&seed.to_le_bytes()))
}

/// Encodes `value` as DAG-CBOR and returns its CID alongside the bytes, for
/// fixtures that need a CID whose codec the link walker will actually
/// descend into.
pub fn dag_cbor_block<T: Serialize>(value: &T) -> (Cid, Vec<u8>) {
    let bytes = serde_ipld_dagcbor::to_vec(value).expect("fixture value must encode");
    let cid = Cid::new_v1(DAG_CBOR, Code::Blake2b256.digest(&bytes));
    (cid, bytes)
}

/// In-memory blockstore double standing in for hot or cold. Tracks whether
/// `compact`/`collect_garbage` were invoked so tests can assert the
/// optional-extension probe actually reaches the backend.
#[derive(Default)]
pub struct MemBlockstore {
    blocks: RwLock<HashMap<Cid, Vec<u8>>>,
    pub compact_calls: AtomicUsize,
    pub collect_garbage_calls: AtomicUsize,
}

impl MemBlockstore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_blocks(blocks: impl IntoIterator<Item = (Cid, Vec<u8>)>) -> Self {
        let store = Self::new();
        for (cid, bytes) in blocks {
            store.blocks.write().insert(cid, bytes);
        }
        store
    }

    pub fn len(&self) -> usize {
        self.blocks.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Blockstore for MemBlockstore {
    fn has(&self, cid: &Cid) -> Result<bool> {
        Ok(self.blocks.read().contains_key(cid))
    }

    fn get(&self, cid: &Cid) -> Result<Option<Vec<u8>>> {
        Ok(self.blocks.read().get(cid).cloned())
    }

    fn put_keyed(&self, cid: &Cid, bytes: &[u8]) -> Result<()> {
        self.blocks.write().insert(*cid, bytes.to_vec());
        Ok(())
    }

    fn delete_many(&self, cids: &[Cid]) -> Result<()> {
        let mut guard = self.blocks.write();
        for cid in cids {
            guard.remove(cid);
        }
        Ok(())
    }

    fn all_keys(&self) -> Result<Vec<Cid>> {
        Ok(self.blocks.read().keys().copied().collect())
    }
}

impl BlockstoreExt for MemBlockstore {
    fn compact(&self) -> Result<()> {
        self.compact_calls.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn collect_garbage(&self) -> Result<()> {
        self.collect_garbage_calls.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

/// In-memory metadata datastore double.
#[derive(Default)]
pub struct MemMetadataDatastore {
    inner: RwLock<HashMap<String, Vec<u8>>>,
}

impl MemMetadataDatastore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl MetadataDatastore for MemMetadataDatastore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.inner.read().get(key).cloned())
    }

    fn put(&self, key: &str, value: &[u8]) -> Result<()> {
        self.inner.write().insert(key.to_string(), value.to_vec());
        Ok(())
    }
}

/// In-memory chain accessor double: a fixed header DAG keyed by height,
/// plus a channel callers can push [`HeadChange`] events into to simulate
/// new tipsets arriving.
pub struct FixtureChainAccessor {
    genesis: Tipset,
    by_height: RwLock<HashMap<ChainEpoch, Tipset>>,
    heaviest: RwLock<Tipset>,
    head_tx: Sender<HeadChange>,
    head_rx: Receiver<HeadChange>,
}

impl FixtureChainAccessor {
    pub fn new(genesis: Tipset) -> Arc<Self> {
        let (head_tx, head_rx) = flume::unbounded();
        let mut by_height = HashMap::new();
        by_height.insert(genesis.height, genesis.clone());
        Arc::new(Self {
            heaviest: RwLock::new(genesis.clone()),
            genesis,
            by_height: RwLock::new(by_height),
            head_tx,
            head_rx,
        })
    }

    pub fn insert_tipset(&self, ts: Tipset) {
        self.by_height.write().insert(ts.height, ts);
    }

    pub fn set_heaviest(&self, ts: Tipset) {
        self.insert_tipset(ts.clone());
        *self.heaviest.write() = ts.clone();
        let _ = self.head_tx.send(HeadChange::Apply(ts));
    }
}

impl ChainAccessor for FixtureChainAccessor {
    fn get_genesis(&self) -> Result<Tipset> {
        Ok(self.genesis.clone())
    }

    fn get_tipset_by_height(&self, epoch: ChainEpoch, _anchor: &Tipset, _prev: bool) -> Result<Tipset> {
        self.by_height
            .read()
            .get(&epoch)
            .cloned()
            .ok_or_else(|| crate::error::Error::NotFound(Cid::default()))
    }

    fn heaviest_tipset(&self) -> Result<Tipset> {
        Ok(self.heaviest.read().clone())
    }

    fn subscribe_head_changes(&self) -> Receiver<HeadChange> {
        self.head_rx.clone()
    }
}

/// Builds a small linear chain of `count` headers above height 0, each
/// linking to a distinct (fixture) state root / messages / receipts CID,
/// and registers every header block plus its linked CIDs into `store`.
/// Returns the tipset at the tip.
pub fn build_linear_chain(store: &MemBlockstore, count: u64) -> Tipset {
    let mut parent: Vec<Cid> = Vec::new();
    let mut tip = None;
    for height in 0..count {
        let (state_root, state_bytes) = dag_cbor_block(&format!("state-root-{height}"));
        let (messages, msg_bytes) = dag_cbor_block(&format!("messages-{height}"));
        let (receipts, receipt_bytes) = dag_cbor_block(&format!("receipts-{height}"));
        store.put_keyed(&state_root, &state_bytes).unwrap();
        store.put_keyed(&messages, &msg_bytes).unwrap();
        store.put_keyed(&receipts, &receipt_bytes).unwrap();

        let header = BlockHeader {
            height: height as ChainEpoch,
            parents: parent.clone(),
            parent_state_root: state_root,
            messages,
            parent_message_receipts: receipts,
        };
        let (header_cid, header_bytes) = dag_cbor_block(&header);
        store.put_keyed(&header_cid, &header_bytes).unwrap();

        parent = vec![header_cid];
        tip = Some(Tipset::new(vec![header_cid], height as ChainEpoch, height * 30));
    }
    tip.expect("count must be > 0")
}
