// Copyright 2019-2023 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! Two-tier, content-addressed block store with online hot/cold
//! compaction: a hotstore serving recent chain traffic, a coldstore
//! holding everything else, and a background compactor that migrates
//! blocks no longer reachable from the live chain out of hot without
//! taking the store offline.

pub mod chain_walker;
pub mod config;
pub mod debug_log;
pub mod error;
pub mod link_walker;
pub mod markset;
pub mod metadata;
pub mod metrics;
pub mod splitstore;
pub mod tracking;
pub mod traits;
pub mod types;
pub mod varint;

mod compactor;
mod warmup;
mod write_tracker;

#[cfg(any(test, feature = "test-util"))]
pub mod testing;

pub use config::{Config, MarkSetType, TrackingStoreType};
pub use error::{Error, ErrorList, Result};
pub use splitstore::{RefreshPolicy, SplitStore};
pub use traits::{
    Blockstore, BlockstoreExt, ChainAccessor, HeadChange, InternalGetter, MarkSet, MarkSetEnv, MetadataDatastore,
    TrackingStore,
};
pub use types::{BlockHeader, ChainEpoch, Tipset, DAG_CBOR};
