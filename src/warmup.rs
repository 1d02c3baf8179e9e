// Copyright 2019-2023 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! One-time warmup: on first start against a cold store that already holds
//! chain history, populates the hotstore by walking back from genesis so
//! reads don't all fall through to cold before the first compaction has run.

use std::sync::atomic::Ordering;

use cid::Cid;
use tracing::{info, warn};

use crate::chain_walker::ChainWalker;
use crate::error::Result;
use crate::metadata::{with_headroom, MetadataStore};
use crate::splitstore::{IDLE, RUNNING};
use crate::types::ChainEpoch;

const WARMUP_BATCH_SIZE: usize = 16_384;

impl crate::splitstore::SplitStore {
    /// Runs warmup exactly once; a second caller (there should be none, but
    /// `start` only spawns this conditionally) is turned away by the CAS.
    pub(crate) async fn run_warmup(self: std::sync::Arc<Self>) -> Result<()> {
        if self
            .compacting
            .compare_exchange(IDLE, RUNNING, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Ok(());
        }

        let result = self.run_warmup_inner();
        self.compacting.store(IDLE, Ordering::SeqCst);
        result
    }

    fn run_warmup_inner(&self) -> Result<()> {
        let Some(ts) = self.cur_ts.lock().clone() else {
            return Ok(());
        };
        info!(height = ts.height, "starting warmup");

        let mut batch: Vec<Cid> = Vec::with_capacity(WARMUP_BATCH_SIZE);
        let mut total: u64 = 0;

        // Step 1: genesis seeding, independent of the current tip.
        let genesis = {
            let chain = self.chain.read();
            match chain.as_ref() {
                Some(chain) => chain.get_genesis()?,
                None => return Ok(()),
            }
        };
        let getter = self.getter();
        let genesis_walker = ChainWalker::new(&getter, 0, true, true);
        genesis_walker.walk(&genesis, |cid| {
            if self.hot.has(cid)? {
                return Ok(());
            }
            batch.push(*cid);
            if batch.len() >= WARMUP_BATCH_SIZE {
                self.flush_warmup_batch(&mut batch, ts.height)?;
                total += WARMUP_BATCH_SIZE as u64;
            }
            Ok(())
        })?;

        // Step 2: the current tipset down to its own height, state roots
        // only (no messages), headers past the boundary only if configured
        // to keep them hot.
        let walker = ChainWalker::new(&getter, ts.height, false, self.config.hot_headers);
        walker.walk(&ts, |cid| {
            if self.hot.has(cid)? {
                return Ok(());
            }
            batch.push(*cid);
            if batch.len() >= WARMUP_BATCH_SIZE {
                self.flush_warmup_batch(&mut batch, ts.height)?;
                total += WARMUP_BATCH_SIZE as u64;
            }
            Ok(())
        })?;

        if !batch.is_empty() {
            total += batch.len() as u64;
            self.flush_warmup_batch(&mut batch, ts.height)?;
        }

        let new_size = with_headroom(total);
        if new_size > *self.mark_set_size.lock() {
            *self.mark_set_size.lock() = new_size;
        }

        let meta = MetadataStore::new(self.metadata_ds.as_ref());
        meta.set_warmup_epoch(ts.height)?;
        meta.set_mark_set_size(*self.mark_set_size.lock())?;

        self.warmed_up.store(true, Ordering::SeqCst);
        info!(moved = total, "warmup complete");
        Ok(())
    }

    /// Fetches every batched CID from cold, stamps the survivors into the
    /// tracker at `epoch`, then writes them into hot — matching the order
    /// compaction's collect step relies on to see warmed-up CIDs at all.
    fn flush_warmup_batch(&self, batch: &mut Vec<Cid>, epoch: ChainEpoch) -> Result<()> {
        let mut errors = crate::error::ErrorList::default();
        let mut blocks: Vec<(Cid, Vec<u8>)> = Vec::with_capacity(batch.len());
        for cid in batch.iter() {
            match self.cold.get(cid)? {
                Some(bytes) => blocks.push((*cid, bytes)),
                None => warn!("warmup: {cid} reachable from chain but absent from cold store"),
            }
        }
        if !blocks.is_empty() {
            let cids: Vec<Cid> = blocks.iter().map(|(cid, _)| *cid).collect();
            if let Err(e) = self.tracker.put_batch(&cids, epoch) {
                errors.push(e);
            }
            if let Err(e) = self.hot.put_many_keyed(&blocks) {
                errors.push(e);
            }
        }
        batch.clear();
        if !errors.0.is_empty() {
            warn!("{errors}");
        }
        Ok(())
    }
}
