// Copyright 2019-2023 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! `prometheus-client` registry for the splitstore's read-miss, write-epoch,
//! and compaction metrics. One registry is created per `SplitStore` and
//! handed to the caller to merge into their own exporter.

use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::gauge::Gauge;
use prometheus_client::metrics::histogram::Histogram;
use prometheus_client::registry::Registry;

pub struct Metrics {
    pub read_miss_total: Counter,
    pub write_epoch: Gauge,
    pub compaction_duration_seconds: Histogram,
    pub compaction_moved_blocks: Gauge,
    pub compaction_purged_blocks: Gauge,
}

impl Metrics {
    pub fn new(registry: &mut Registry) -> Self {
        let read_miss_total = Counter::default();
        registry.register(
            "splitstore_read_miss",
            "Hotstore misses for CIDs expected hot after warmup completed",
            read_miss_total.clone(),
        );

        let write_epoch = Gauge::default();
        registry.register("splitstore_write_epoch", "Current write-epoch", write_epoch.clone());

        let compaction_duration_seconds = Histogram::new(exponential_buckets(1.0, 2.0, 10));
        registry.register(
            "splitstore_compaction_duration_seconds",
            "Wall-clock duration of each compaction run",
            compaction_duration_seconds.clone(),
        );

        let compaction_moved_blocks = Gauge::default();
        registry.register(
            "splitstore_compaction_moved_blocks",
            "Blocks moved from hot to cold in the most recent compaction",
            compaction_moved_blocks.clone(),
        );

        let compaction_purged_blocks = Gauge::default();
        registry.register(
            "splitstore_compaction_purged_blocks",
            "Blocks purged from hot in the most recent compaction",
            compaction_purged_blocks.clone(),
        );

        Metrics {
            read_miss_total,
            write_epoch,
            compaction_duration_seconds,
            compaction_moved_blocks,
            compaction_purged_blocks,
        }
    }
}

fn exponential_buckets(start: f64, factor: f64, count: usize) -> impl Iterator<Item = f64> {
    std::iter::successors(Some(start), move |&x| Some(x * factor)).take(count)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registers_without_panicking() {
        let mut registry = Registry::default();
        let metrics = Metrics::new(&mut registry);
        metrics.read_miss_total.inc();
        metrics.write_epoch.set(42);
        assert_eq!(metrics.write_epoch.get(), 42);
    }
}
