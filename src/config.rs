// Copyright 2019-2023 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! Deserializable configuration surface for the splitstore's tunables and
//! backend selection, loadable from TOML like any other store config in
//! this node: this crate owns the struct and its defaults, not the
//! file-path resolution or CLI merging around it.

use serde::{Deserialize, Serialize};

use crate::types::ChainEpoch;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackingStoreType {
    Bolt,
    Mem,
}

impl Default for TrackingStoreType {
    fn default() -> Self {
        TrackingStoreType::Bolt
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarkSetType {
    Bloom,
    Bolt,
}

impl Default for MarkSetType {
    fn default() -> Self {
        MarkSetType::Bloom
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub tracking_store_type: TrackingStoreType,
    pub mark_set_type: MarkSetType,
    /// When true, the chain walker descends past `boundary` for header
    /// linkage, required if the cold store is a no-op.
    pub hot_headers: bool,
    /// Network-supplied finality, threaded through rather than hardcoded
    /// to Filecoin mainnet's value, matching how `forest_networks`/
    /// `ChainConfig` parameterize consensus constants.
    pub finality_epochs: ChainEpoch,
    pub compaction_threshold_finalities: ChainEpoch,
    pub compaction_boundary_finalities: ChainEpoch,
    pub compaction_slack_finalities: ChainEpoch,
    pub sync_gap_time_secs: u64,
    pub epoch_duration_secs: i64,
    pub batch_size: usize,
    pub default_cold_purge_size: usize,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            tracking_store_type: TrackingStoreType::default(),
            mark_set_type: MarkSetType::default(),
            hot_headers: false,
            finality_epochs: 900,
            compaction_threshold_finalities: 7,
            compaction_boundary_finalities: 4,
            compaction_slack_finalities: 2,
            sync_gap_time_secs: 60,
            epoch_duration_secs: 30,
            batch_size: 16_384,
            default_cold_purge_size: 7_000_000,
        }
    }
}

impl Config {
    pub fn compaction_threshold(&self) -> ChainEpoch {
        self.compaction_threshold_finalities * self.finality_epochs
    }

    pub fn compaction_boundary(&self) -> ChainEpoch {
        self.compaction_boundary_finalities * self.finality_epochs
    }

    pub fn compaction_slack(&self) -> ChainEpoch {
        self.compaction_slack_finalities * self.finality_epochs
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_matches_documented_tunables() {
        let cfg = Config::default();
        assert_eq!(cfg.compaction_threshold(), 7 * 900);
        assert_eq!(cfg.compaction_boundary(), 4 * 900);
        assert_eq!(cfg.compaction_slack(), 2 * 900);
        assert_eq!(cfg.batch_size, 16_384);
        assert_eq!(cfg.default_cold_purge_size, 7_000_000);
    }

    #[test]
    fn round_trips_through_serde() {
        let mut cfg = Config::default();
        cfg.hot_headers = true;
        cfg.finality_epochs = 10;

        let bytes = serde_ipld_dagcbor::to_vec(&cfg).unwrap();
        let decoded: Config = serde_ipld_dagcbor::from_slice(&bytes).unwrap();
        assert_eq!(cfg, decoded);
    }
}
