// Copyright 2019-2023 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! Online compaction: marks everything reachable from the current chain
//! down to a boundary epoch, classifies every tracked CID written before
//! that boundary and not marked as garbage, then moves the garbage to cold
//! and purges it from hot under a short critical section.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Instant;

use cid::Cid;
use tracing::{info, instrument, warn};

use crate::chain_walker::ChainWalker;
use crate::debug_log::DebugLogEvent;
use crate::error::{ErrorList, Result};
use crate::metadata::{with_headroom, MetadataStore};
use crate::splitstore::{SplitStore, TxnState, IDLE, RUNNING};
use crate::types::{ChainEpoch, Tipset};

impl SplitStore {
    /// Called on every head change; decides whether the gap between the
    /// tipset's height and `baseEpoch` has crossed the configured
    /// threshold, and if so spawns `run_compaction` in the background.
    pub(crate) fn maybe_trigger_compaction(self: &Arc<Self>, ts: &Tipset) {
        if self.closing.load(Ordering::SeqCst) == RUNNING {
            return;
        }

        let now = chrono::Utc::now().timestamp();
        let sync_gap = now - ts.min_timestamp as i64;
        if sync_gap > self.config.sync_gap_time_secs as i64 {
            return;
        }

        let base_epoch = *self.base_epoch.lock();
        if ts.height - base_epoch <= self.config.compaction_threshold() {
            return;
        }
        if self.compacting.load(Ordering::SeqCst) == RUNNING {
            return;
        }

        let this = Arc::clone(self);
        let ts = ts.clone();
        tokio::spawn(async move {
            if let Err(e) = this.run_compaction(&ts).await {
                warn!("compaction failed: {e}");
            }
        });
    }

    /// Runs one full compaction pass against `cur_ts`. Bails out cleanly
    /// (without error) if another compaction is already in flight or the
    /// store is closing; everything past the CAS is the actual pass.
    #[instrument(skip_all, fields(height = cur_ts.height))]
    pub(crate) async fn run_compaction(&self, cur_ts: &Tipset) -> Result<()> {
        if self
            .compacting
            .compare_exchange(IDLE, RUNNING, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Ok(());
        }
        let start = Instant::now();
        let result = self.run_compaction_inner(cur_ts);
        self.compacting.store(IDLE, Ordering::SeqCst);
        self.metrics.compaction_duration_seconds.observe(start.elapsed().as_secs_f64());
        result
    }

    fn run_compaction_inner(&self, cur_ts: &Tipset) -> Result<()> {
        let boundary_epoch = cur_ts.height - self.config.compaction_boundary();
        let cold_epoch = boundary_epoch - self.config.compaction_slack();
        info!(boundary_epoch, cold_epoch, "starting compaction");

        // Step 0: if no size estimate is persisted yet, perform a dry walk
        // (no messages, boundary = current height) to seed one.
        if *self.mark_set_size.lock() == 0 {
            let getter = self.getter();
            let walker = ChainWalker::new(&getter, cur_ts.height, false, self.config.hot_headers);
            let mut count: u64 = 0;
            walker.walk(cur_ts, |_| {
                count += 1;
                Ok(())
            })?;
            *self.mark_set_size.lock() = with_headroom(count);
        }

        // Step 1: size the mark-set and protected-set from the persisted
        // estimate.
        let mark_set_size_hint = *self.mark_set_size.lock();
        let live = self.mark_set_env.create("live", mark_set_size_hint as usize)?;
        let protected = self.mapts_env.create("protected", 1024)?;

        // Step 1 (cont.): install the protection set under the exclusive
        // lock so every in-flight and subsequent hot hit marks into it
        // instead of racing the mark walk below.
        {
            let mut txn = self.txn.write();
            *txn = TxnState {
                protected: Some(protected),
            };
        }

        // Step 2: flush pending writes so the tracker reflects everything
        // written up to this point before the tracker is read.
        self.write_tracker.flush(&self.getter(), self.tracker.as_ref())?;

        // Step 3: mark everything reachable from `cur_ts` down to the
        // boundary (full header chain past the boundary, state roots and
        // messages/receipts at or above it).
        let getter = self.getter();
        let walker = ChainWalker::new(&getter, boundary_epoch, true, self.config.hot_headers);
        let mut marked: u64 = 0;
        walker.walk(cur_ts, |cid| {
            live.mark(cid)?;
            marked += 1;
            Ok(())
        })?;
        if marked > mark_set_size_hint {
            *self.mark_set_size.lock() = with_headroom(marked);
        }
        info!(marked, "mark phase complete");

        // Step 4: classify every tracked CID. Recent writes (epoch above
        // coldEpoch) and anything reachable or protected stay hot; the
        // remainder is enqueued for the move to cold.
        let cold_purge_hint = *self.cold_purge_size.lock();
        let mut cold_list: Vec<Cid> = Vec::with_capacity(cold_purge_hint);
        {
            let txn = self.txn.read();
            let protected = txn.protected.as_deref();
            self.tracker.for_each(&mut |cid, epoch| {
                if epoch > cold_epoch {
                    return Ok(());
                }
                if live.has(&cid)? {
                    return Ok(());
                }
                if let Some(protected) = protected {
                    if protected.has(&cid)? {
                        return Ok(());
                    }
                }
                cold_list.push(cid);
                Ok(())
            })?;
        }
        info!(garbage = cold_list.len(), "collect phase complete");

        *self.cold_purge_size.lock() = with_headroom(cold_list.len() as u64) as usize;

        // Step 5 + 6: critical section covering Move, Purge, and Finalize.
        // `critsection` is held for the whole span so `Close()`'s wait loop
        // can't return while any of the three is still in flight.
        self.critsection.store(RUNNING, Ordering::SeqCst);
        let outcome = self.finish_compaction(cold_epoch, &cold_list);
        self.critsection.store(IDLE, Ordering::SeqCst);

        {
            let mut txn = self.txn.write();
            if let Some(protected) = txn.protected.take() {
                protected.close()?;
            }
        }
        live.close()?;

        let (moved, purged) = outcome?;
        self.metrics.compaction_moved_blocks.set(moved as i64);
        self.metrics.compaction_purged_blocks.set(purged as i64);
        info!(moved, purged, "compaction complete");
        Ok(())
    }

    /// Move, Purge, and Finalize, run entirely under the critical section
    /// the caller has already entered. Checks `closing` exactly once at
    /// entry, per the state machine's "set critsection, then check
    /// closing" ordering.
    fn finish_compaction(&self, cold_epoch: ChainEpoch, cold_list: &[Cid]) -> Result<(u64, u64)> {
        if self.closing.load(Ordering::SeqCst) == RUNNING {
            return Err(crate::error::Error::ShuttingDown);
        }

        let (moved, purged) = self.move_and_purge(cold_list, cold_epoch)?;

        self.tracker.sync()?;
        if let Some(cold_ext) = &self.cold_ext {
            cold_ext.compact()?;
        }
        if let Some(hot_ext) = &self.hot_ext {
            hot_ext.collect_garbage()?;
        }

        *self.base_epoch.lock() = cold_epoch;
        let meta = MetadataStore::new(self.metadata_ds.as_ref());
        meta.set_base_epoch(cold_epoch)?;
        meta.set_mark_set_size(*self.mark_set_size.lock())?;

        Ok((moved, purged))
    }

    /// Moves each CID in `cold_list` from hot to cold, then purges it from
    /// hot, re-checking the protected set under the *exclusive* transaction
    /// lock at purge time — held across both the check and the deletes, so
    /// a concurrent façade hit can't mark a CID protected in the gap between
    /// "decided to discard" and "actually discarded" (§4.6 Step 5's safety
    /// proof).
    fn move_and_purge(&self, cold_list: &[Cid], log_epoch: ChainEpoch) -> Result<(u64, u64)> {
        let batch_size = self.config.batch_size;
        let mut to_move: Vec<Cid> = Vec::with_capacity(cold_list.len());
        let mut moved: u64 = 0;

        for chunk in cold_list.chunks(batch_size) {
            let mut payload = Vec::with_capacity(chunk.len());
            for cid in chunk {
                match self.hot.get(cid)? {
                    Some(bytes) => payload.push((*cid, bytes)),
                    None => {
                        // Dangling tracker entry: the block was already
                        // purged by a previous compaction that crashed
                        // after Purge but before the tracker delete.
                        self.tracker.delete(cid)?;
                        continue;
                    }
                }
            }
            self.cold.put_many_keyed(&payload)?;
            for (cid, _) in &payload {
                self.debug_log.read().record(DebugLogEvent::Move { cid: *cid, epoch: log_epoch });
            }
            moved += payload.len() as u64;
            to_move.extend(payload.into_iter().map(|(cid, _)| cid));
        }

        let mut purged: u64 = 0;
        let mut errors = ErrorList::default();
        for chunk in to_move.chunks(batch_size) {
            let mut purge_now = Vec::with_capacity(chunk.len());
            let txn = self.txn.write();
            let protected = txn.protected.as_deref();
            for cid in chunk {
                if let Some(protected) = protected {
                    if protected.has(cid)? {
                        continue;
                    }
                }
                purge_now.push(*cid);
            }
            if let Err(e) = self.tracker.delete_batch(&purge_now) {
                errors.push(e);
            }
            if let Err(e) = self.hot.delete_many(&purge_now) {
                errors.push(e);
            }
            drop(txn);
            purged += purge_now.len() as u64;
        }

        if !errors.0.is_empty() {
            warn!("{errors}");
        }
        Ok((moved, purged))
    }
}
