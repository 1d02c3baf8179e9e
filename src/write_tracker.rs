// Copyright 2019-2023 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! Pending-write accumulation and the write-epoch clock. Flushing expands
//! the pending set through the link walker before stamping the tracking
//! store, so objects implicitly written by a payload's author (anything the
//! payload links to) are tracked without a separate API call.

use std::collections::HashSet;

use cid::Cid;
use parking_lot::Mutex;

use crate::error::Result;
use crate::link_walker;
use crate::traits::{InternalGetter, TrackingStore};
use crate::types::ChainEpoch;

struct Inner {
    pending: HashSet<Cid>,
    write_epoch: ChainEpoch,
}

pub struct WriteTracker {
    inner: Mutex<Inner>,
}

impl WriteTracker {
    pub fn new(initial_epoch: ChainEpoch) -> Self {
        Self {
            inner: Mutex::new(Inner {
                pending: HashSet::new(),
                write_epoch: initial_epoch,
            }),
        }
    }

    pub fn record(&self, cid: Cid) {
        self.inner.lock().pending.insert(cid);
    }

    pub fn write_epoch(&self) -> ChainEpoch {
        self.inner.lock().write_epoch
    }

    pub fn pending_len(&self) -> usize {
        self.inner.lock().pending.len()
    }

    /// Raises the write-epoch to `epoch` if it is currently lower, without
    /// touching the pending set. Used once at `Start` to align the clock
    /// with the adopted tipset's height before any ticks have occurred.
    pub fn prime(&self, epoch: ChainEpoch) {
        let mut guard = self.inner.lock();
        if epoch > guard.write_epoch {
            guard.write_epoch = epoch;
        }
    }

    /// Expands and flushes the pending set to `tracker`, stamped with the
    /// write-epoch in force at the moment this call takes the pending set.
    pub fn flush<G: InternalGetter>(&self, getter: &G, tracker: &dyn TrackingStore) -> Result<()> {
        let (pending, epoch) = {
            let mut guard = self.inner.lock();
            if guard.pending.is_empty() {
                return Ok(());
            }
            (std::mem::take(&mut guard.pending), guard.write_epoch)
        };

        let visited: Mutex<HashSet<Cid>> = Mutex::new(HashSet::new());
        let mut expanded = Vec::new();
        for cid in &pending {
            link_walker::walk_links(cid, &visited, getter, &mut |c| {
                expanded.push(*c);
                Ok(())
            })?;
        }

        tracker.put_batch(&expanded, epoch)
    }

    /// Called once per clock tick (every second) and on every head change.
    /// If the candidate write-epoch derived from `tipset_height`/`dt_secs`
    /// exceeds the current one, pending writes are flushed *at the old
    /// epoch* before the clock advances, so every flushed CID carries the
    /// epoch in force at its write time.
    pub fn tick<G: InternalGetter>(
        &self,
        tipset_height: ChainEpoch,
        dt_secs: i64,
        epoch_duration_secs: i64,
        getter: &G,
        tracker: &dyn TrackingStore,
    ) -> Result<()> {
        let candidate = if dt_secs < 0 {
            tipset_height + 1
        } else {
            tipset_height + dt_secs / epoch_duration_secs + 1
        };

        let should_advance = candidate > self.inner.lock().write_epoch;
        if !should_advance {
            return Ok(());
        }

        self.flush(getter, tracker)?;

        let mut guard = self.inner.lock();
        if candidate > guard.write_epoch {
            guard.write_epoch = candidate;
        }
        Ok(())
    }
}
