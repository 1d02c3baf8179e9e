// Copyright 2019-2023 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! Mark-set backends. `bloom` is the default probabilistic primary
//! environment for `live`; `mem` is the exact, in-memory "mapts"
//! environment used for `protected`; `bolt` reuses the same `sled`
//! backend as the tracking store's `"bolt"` mode for either role.

mod bloom;
mod mem_set;
mod sled_set;

pub use bloom::{BloomMarkSetEnv, DEFAULT_FALSE_POSITIVE_RATE};
pub use mem_set::MemMarkSetEnv;
pub use sled_set::SledMarkSetEnv;
