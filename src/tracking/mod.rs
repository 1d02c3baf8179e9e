// Copyright 2019-2023 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! Tracking-store backends. `"mem"` is an in-memory double used by tests and
//! read-only setups; `"bolt"` is backed by `sled`, an embedded, ordered,
//! durable single-file store.

mod mem_store;
mod sled_store;

pub use mem_store::MemTrackingStore;
pub use sled_store::SledTrackingStore;
