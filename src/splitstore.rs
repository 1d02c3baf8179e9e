// Copyright 2019-2023 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! The unified blockstore façade and its lifecycle (`open`/`start`/`close`).
//! Reads and writes route hot-first with fall-through to cold; a shared
//! transaction lock lets compaction install a transactional protection set
//! that concurrent callers mark into without blocking each other.

use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use cid::Cid;
use parking_lot::{Mutex, RwLock, RwLockReadGuard};
use tokio_stream::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::config::Config;
use crate::debug_log::{DebugLog, DebugLogEvent, DebugLogSink, NullDebugLog};
use crate::error::{Error, ErrorList, Result};
use crate::metadata::MetadataStore;
use crate::metrics::Metrics;
use crate::traits::{
    Blockstore, BlockstoreExt, ChainAccessor, HeadChange, InternalGetter, MarkSet, MarkSetEnv, MetadataDatastore,
    TrackingStore,
};
use crate::types::Tipset;
use crate::write_tracker::WriteTracker;

pub(crate) const IDLE: u8 = 0;
pub(crate) const RUNNING: u8 = 1;

/// Hot-first, lock-free getter used internally by the chain and link
/// walkers (invoked from warmup/compaction, which already govern their own
/// locking): going through the façade's `get` here would cause spurious
/// protection marks and self-deadlock on `txn`.
pub(crate) struct HotColdGetter<'a> {
    hot: &'a dyn Blockstore,
    cold: &'a dyn Blockstore,
}

impl InternalGetter for HotColdGetter<'_> {
    fn get(&self, cid: &Cid) -> Result<Option<Vec<u8>>> {
        if let Some(bytes) = self.hot.get(cid)? {
            return Ok(Some(bytes));
        }
        self.cold.get(cid)
    }
}

/// Whether a `has`/`get` hot hit should be treated as an implicit write
/// witness (refreshing the CID's write-epoch and protecting it during a
/// compaction). `Refresh` is the legacy default; `NoRefresh` is the
/// escape hatch resolving the design's open question (see DESIGN.md).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RefreshPolicy {
    #[default]
    Refresh,
    NoRefresh,
}

pub(crate) struct TxnState {
    pub(crate) protected: Option<Box<dyn MarkSet>>,
}

/// Unified, content-addressed blockstore façade splitting storage into a
/// hotstore and a coldstore, with online compaction migrating unreachable
/// blocks from hot to cold while the node keeps serving traffic.
pub struct SplitStore {
    pub(crate) hot: Arc<dyn Blockstore>,
    pub(crate) hot_ext: Option<Arc<dyn BlockstoreExt>>,
    pub(crate) cold: Arc<dyn Blockstore>,
    pub(crate) cold_ext: Option<Arc<dyn BlockstoreExt>>,
    pub(crate) tracker: Arc<dyn TrackingStore>,
    pub(crate) mark_set_env: Arc<dyn MarkSetEnv>,
    pub(crate) mapts_env: Arc<dyn MarkSetEnv>,
    pub(crate) metadata_ds: Arc<dyn MetadataDatastore>,
    pub(crate) chain: RwLock<Option<Arc<dyn ChainAccessor>>>,
    pub(crate) config: Config,
    pub(crate) metrics: Metrics,
    pub(crate) debug_log: RwLock<Arc<dyn DebugLogSink>>,
    pub(crate) hash_on_read: AtomicBool,
    pub(crate) warmed_up: AtomicBool,

    pub(crate) txn: RwLock<TxnState>,
    pub(crate) cur_ts: Mutex<Option<Tipset>>,
    pub(crate) write_tracker: WriteTracker,
    pub(crate) base_epoch: Mutex<crate::types::ChainEpoch>,
    pub(crate) mark_set_size: Mutex<u64>,
    pub(crate) cold_purge_size: Mutex<usize>,

    pub(crate) compacting: AtomicU8,
    pub(crate) critsection: AtomicU8,
    pub(crate) closing: AtomicU8,

    pub(crate) cancel: CancellationToken,
}

#[allow(clippy::too_many_arguments)]
impl SplitStore {
    /// Opens the splitstore over already-opened hot/cold stores, tracking
    /// store, mark-set environments, and metadata datastore. Resource
    /// teardown on a later error is the caller's responsibility, since
    /// this crate borrows rather than owns hot and cold (see DESIGN.md).
    pub fn open(
        hot: Arc<dyn Blockstore>,
        hot_ext: Option<Arc<dyn BlockstoreExt>>,
        cold: Arc<dyn Blockstore>,
        cold_ext: Option<Arc<dyn BlockstoreExt>>,
        tracker: Arc<dyn TrackingStore>,
        mark_set_env: Arc<dyn MarkSetEnv>,
        mapts_env: Arc<dyn MarkSetEnv>,
        metadata_ds: Arc<dyn MetadataDatastore>,
        config: Config,
        registry: &mut prometheus_client::registry::Registry,
    ) -> Result<Self> {
        info!("opening splitstore");
        let default_cold_purge_size = config.default_cold_purge_size;
        Ok(Self {
            hot,
            hot_ext,
            cold,
            cold_ext,
            tracker,
            mark_set_env,
            mapts_env,
            metadata_ds,
            chain: RwLock::new(None),
            metrics: Metrics::new(registry),
            debug_log: RwLock::new(Arc::new(NullDebugLog)),
            hash_on_read: AtomicBool::new(false),
            warmed_up: AtomicBool::new(false),
            txn: RwLock::new(TxnState { protected: None }),
            cur_ts: Mutex::new(None),
            write_tracker: WriteTracker::new(0),
            base_epoch: Mutex::new(0),
            mark_set_size: Mutex::new(0),
            cold_purge_size: Mutex::new(default_cold_purge_size),
            compacting: AtomicU8::new(IDLE),
            critsection: AtomicU8::new(IDLE),
            closing: AtomicU8::new(IDLE),
            cancel: CancellationToken::new(),
            config,
        })
    }

    /// Enables the append-only debug log, returning the receiver side for
    /// the caller to drain (or forward to disk). A no-op before this is
    /// called.
    pub fn enable_debug_log(&self) -> flume::Receiver<DebugLogEvent> {
        let (log, rx) = DebugLog::spawn();
        *self.debug_log.write() = Arc::new(log);
        rx
    }

    pub(crate) fn getter(&self) -> HotColdGetter<'_> {
        HotColdGetter {
            hot: self.hot.as_ref(),
            cold: self.cold.as_ref(),
        }
    }

    /// Adopts the chain's heaviest tipset, loads persisted metadata
    /// (initializing `baseEpoch` on first start), launches warmup if
    /// needed, and starts the write-epoch clock and head-change dispatch.
    #[instrument(skip_all)]
    pub async fn start(self: &Arc<Self>, chain: Arc<dyn ChainAccessor>) -> Result<()> {
        *self.chain.write() = Some(chain.clone());

        let heaviest = chain.heaviest_tipset()?;
        *self.cur_ts.lock() = Some(heaviest.clone());
        self.write_tracker.prime(heaviest.height);

        let meta = MetadataStore::new(self.metadata_ds.as_ref());
        let base_epoch = match meta.get_base_epoch()? {
            Some(epoch) => epoch,
            None => {
                meta.set_base_epoch(heaviest.height)?;
                heaviest.height
            }
        };
        *self.base_epoch.lock() = base_epoch;

        if let Some(size) = meta.get_mark_set_size()? {
            *self.mark_set_size.lock() = size;
        }

        let needs_warmup = meta.get_warmup_epoch()?.is_none();
        self.warmed_up.store(!needs_warmup, Ordering::SeqCst);

        let clock_handle = Arc::clone(self);
        tokio::spawn(async move { clock_handle.run_write_epoch_clock().await });

        let head_handle = Arc::clone(self);
        let head_rx = chain.subscribe_head_changes();
        tokio::spawn(async move { head_handle.run_head_change_loop(head_rx).await });

        if needs_warmup {
            let warmup_handle = Arc::clone(self);
            tokio::spawn(async move {
                if let Err(e) = warmup_handle.run_warmup().await {
                    warn!("warmup failed: {e}");
                }
            });
        }

        Ok(())
    }

    /// Signals shutdown, waits for any in-progress critical section to
    /// exit, flushes pending writes, cancels background workers, and
    /// closes the tracking store and protection set, aggregating every
    /// failure rather than stopping at the first.
    pub async fn close(&self) -> Result<()> {
        self.closing.store(RUNNING, Ordering::SeqCst);

        while self.critsection.load(Ordering::SeqCst) == RUNNING {
            tokio::time::sleep(Duration::from_secs(1)).await;
        }

        let mut errors = ErrorList::default();

        if let Err(e) = self.write_tracker.flush(&self.getter(), self.tracker.as_ref()) {
            errors.push(e);
        }

        self.cancel.cancel();

        if let Err(e) = self.tracker.close() {
            errors.push(e);
        }

        {
            let mut txn = self.txn.write();
            if let Some(protected) = txn.protected.take() {
                if let Err(e) = protected.close() {
                    errors.push(e);
                }
            }
        }

        errors.into_result().map_err(|list| Error::Other(list.to_string()))
    }

    async fn run_write_epoch_clock(self: Arc<Self>) {
        let mut interval = tokio::time::interval(Duration::from_secs(1));
        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    debug!("write-epoch clock exiting");
                    return;
                }
                _ = interval.tick() => {
                    if let Err(e) = self.tick_write_epoch() {
                        warn!("write-epoch tick failed: {e}");
                    }
                }
            }
        }
    }

    fn tick_write_epoch(&self) -> Result<()> {
        let Some(ts) = self.cur_ts.lock().clone() else {
            return Ok(());
        };
        let now = chrono::Utc::now().timestamp();
        let dt = now - ts.min_timestamp as i64;
        self.write_tracker
            .tick(ts.height, dt, self.config.epoch_duration_secs, &self.getter(), self.tracker.as_ref())?;
        self.metrics.write_epoch.set(self.write_tracker.write_epoch());
        Ok(())
    }

    async fn run_head_change_loop(self: Arc<Self>, rx: flume::Receiver<HeadChange>) {
        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    debug!("head-change loop exiting");
                    return;
                }
                event = rx.recv_async() => {
                    match event {
                        Ok(HeadChange::Apply(ts)) => {
                            *self.cur_ts.lock() = Some(ts.clone());
                            if let Err(e) = self.tick_write_epoch() {
                                warn!("write-epoch tick on head change failed: {e}");
                            }
                            self.maybe_trigger_compaction(&ts);
                        }
                        Ok(HeadChange::Revert(_)) => {}
                        Err(_) => {
                            debug!("head-change channel closed");
                            return;
                        }
                    }
                }
            }
        }
    }

    fn note_hot_hit(&self, cid: &Cid, txn: &RwLockReadGuard<'_, TxnState>) {
        self.write_tracker.record(*cid);
        self.protect_if_compacting(cid, txn);
    }

    fn protect_if_compacting(&self, cid: &Cid, txn: &RwLockReadGuard<'_, TxnState>) {
        if self.compacting.load(Ordering::Acquire) != RUNNING {
            return;
        }
        if let Some(protected) = &txn.protected {
            if let Err(e) = protected.mark(cid) {
                warn!("protection mark failed for {cid}: {e}");
            }
        }
    }

    fn try_protect(&self, cid: &Cid, txn: &RwLockReadGuard<'_, TxnState>) -> Result<()> {
        if self.compacting.load(Ordering::Acquire) != RUNNING {
            return Ok(());
        }
        if let Some(protected) = &txn.protected {
            return protected
                .mark(cid)
                .map_err(|e| Error::ProtectionMark { cid: *cid, reason: e.to_string() });
        }
        Ok(())
    }

    pub(crate) fn is_warmed_up(&self) -> bool {
        self.warmed_up.load(Ordering::SeqCst)
    }

    // -- Unified blockstore façade -----------------------------------

    pub fn has(&self, cid: &Cid) -> Result<bool> {
        self.has_opts(cid, RefreshPolicy::Refresh)
    }

    pub fn has_opts(&self, cid: &Cid, policy: RefreshPolicy) -> Result<bool> {
        let txn = self.txn.read();
        if self.hot.has(cid)? {
            if policy == RefreshPolicy::Refresh {
                self.note_hot_hit(cid, &txn);
            }
            return Ok(true);
        }
        drop(txn);
        self.cold.has(cid)
    }

    pub fn get(&self, cid: &Cid) -> Result<Vec<u8>> {
        self.get_opts(cid, RefreshPolicy::Refresh)
    }

    pub fn get_opts(&self, cid: &Cid, policy: RefreshPolicy) -> Result<Vec<u8>> {
        let txn = self.txn.read();
        if let Some(bytes) = self.hot.get(cid)? {
            if policy == RefreshPolicy::Refresh {
                self.note_hot_hit(cid, &txn);
            }
            return Ok(bytes);
        }
        drop(txn);
        match self.cold.get(cid)? {
            Some(bytes) => {
                if self.is_warmed_up() {
                    self.debug_log.read().record(DebugLogEvent::ReadMiss {
                        cid: *cid,
                        epoch: self.write_tracker.write_epoch(),
                    });
                    self.metrics.read_miss_total.inc();
                }
                Ok(bytes)
            }
            None => Err(Error::NotFound(*cid)),
        }
    }

    pub fn get_size(&self, cid: &Cid) -> Result<usize> {
        let txn = self.txn.read();
        if let Some(size) = self.hot.get_size(cid)? {
            self.note_hot_hit(cid, &txn);
            return Ok(size);
        }
        drop(txn);
        self.cold.get_size(cid)?.ok_or(Error::NotFound(*cid))
    }

    /// Zero-copy variant of `get`: runs `f` directly against hot's backing
    /// buffer via [`Blockstore::view`] when the CID is hot, falling through
    /// to an owned cold fetch only on a hot miss.
    pub fn view<F, R>(&self, cid: &Cid, f: F) -> Result<R>
    where
        F: FnOnce(&[u8]) -> R,
    {
        let txn = self.txn.read();
        let mut f = Some(f);
        let mut out = None;
        let hit = self.hot.view(cid, &mut |bytes| {
            out = Some((f.take().expect("view callback invoked at most once"))(bytes));
        })?;
        if hit {
            self.note_hot_hit(cid, &txn);
            return Ok(out.expect("view callback ran on a hit"));
        }
        drop(txn);
        match self.cold.get(cid)? {
            Some(bytes) => Ok(f.take().expect("view callback invoked at most once")(&bytes)),
            None => Err(Error::NotFound(*cid)),
        }
    }

    pub fn put(&self, cid: &Cid, bytes: &[u8]) -> Result<()> {
        let txn = self.txn.read();
        self.write_tracker.record(*cid);
        self.hot.put_keyed(cid, bytes)?;
        self.debug_log
            .read()
            .record(DebugLogEvent::Write { cid: *cid, epoch: self.write_tracker.write_epoch() });
        self.protect_if_compacting(cid, &txn);
        Ok(())
    }

    pub fn put_many(&self, blocks: &[(Cid, Vec<u8>)]) -> Result<()> {
        let txn = self.txn.read();
        for (cid, _) in blocks {
            self.write_tracker.record(*cid);
        }
        self.hot.put_many_keyed(blocks)?;

        let epoch = self.write_tracker.write_epoch();
        let mut errors = ErrorList::default();
        for (cid, _) in blocks {
            self.debug_log.read().record(DebugLogEvent::Write { cid: *cid, epoch });
            if let Err(e) = self.try_protect(cid, &txn) {
                errors.push(e);
            }
        }
        if !errors.0.is_empty() {
            warn!("{errors}");
        }
        Ok(())
    }

    /// Concatenation of hot then cold, as a cooperatively cancellable
    /// stream rather than one big materialized `Vec`.
    pub fn all_keys(&self, cancel: CancellationToken) -> impl futures::Stream<Item = Cid> {
        let hot_keys = self.hot.all_keys().unwrap_or_default();
        let cold_keys = self.cold.all_keys().unwrap_or_default();
        let chained = tokio_stream::iter(hot_keys.into_iter().chain(cold_keys));
        chained.take_until(async move { cancel.cancelled().await })
    }

    pub fn delete_block(&self, _cid: &Cid) -> Result<()> {
        Err(Error::Unsupported("delete_block: deletion is owned by compaction"))
    }

    pub fn delete_many(&self, _cids: &[Cid]) -> Result<()> {
        Err(Error::Unsupported("delete_many: deletion is owned by compaction"))
    }

    pub fn hash_on_read(&self, enabled: bool) {
        self.hash_on_read.store(enabled, Ordering::Relaxed);
        self.hot.hash_on_read(enabled);
        self.cold.hash_on_read(enabled);
    }
}
