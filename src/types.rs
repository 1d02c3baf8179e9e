// Copyright 2019-2023 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! Core data types: the CID-keyed block, the chain epoch, tipsets and block
//! headers. Tipsets and headers are modeled as concrete, serializable
//! structs so this crate's own tests and its chain/link walkers have
//! something real to traverse; production callers supply their own chain
//! types behind the [`crate::traits::ChainAccessor`] trait.

use cid::Cid;
use serde::{Deserialize, Serialize};

/// Chain height / derived time slot.
pub type ChainEpoch = i64;

/// The DAG-CBOR multicodec code. A block whose CID carries this codec has a
/// CBOR payload that may itself embed further CIDs.
pub const DAG_CBOR: u64 = 0x71;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tipset {
    pub cids: Vec<Cid>,
    pub height: ChainEpoch,
    pub min_timestamp: u64,
}

impl Tipset {
    pub fn new(cids: Vec<Cid>, height: ChainEpoch, min_timestamp: u64) -> Self {
        Self {
            cids,
            height,
            min_timestamp,
        }
    }

    pub fn cids(&self) -> &[Cid] {
        &self.cids
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockHeader {
    pub height: ChainEpoch,
    pub parents: Vec<Cid>,
    pub parent_state_root: Cid,
    pub messages: Cid,
    pub parent_message_receipts: Cid,
}
