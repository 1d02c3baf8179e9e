// Copyright 2019-2023 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! Traversal of a tipset's ancestor chain, bounded by an epoch boundary,
//! with optional inclusion of message/receipt DAGs.

use std::collections::{HashSet, VecDeque};

use cid::Cid;
use parking_lot::Mutex;

use crate::error::{Error, Result};
use crate::link_walker;
use crate::traits::InternalGetter;
use crate::types::{BlockHeader, ChainEpoch, Tipset};

pub struct ChainWalker<'a, G> {
    getter: &'a G,
    boundary: ChainEpoch,
    include_messages: bool,
    full_chain: bool,
}

impl<'a, G: InternalGetter> ChainWalker<'a, G> {
    pub fn new(getter: &'a G, boundary: ChainEpoch, include_messages: bool, full_chain: bool) -> Self {
        Self {
            getter,
            boundary,
            include_messages,
            full_chain,
        }
    }

    /// Walks header-reachable block CIDs starting from `start`, descending
    /// into state-root (and, if requested, message/receipt) DAGs for every
    /// header at or above `boundary`. `f` is called once per visited CID,
    /// headers and links alike.
    pub fn walk<F>(&self, start: &Tipset, mut f: F) -> Result<()>
    where
        F: FnMut(&Cid) -> Result<()>,
    {
        let mut header_visited: HashSet<Cid> = HashSet::new();
        let payload_visited: Mutex<HashSet<Cid>> = Mutex::new(HashSet::new());
        let mut queue: VecDeque<Cid> = start.cids().iter().copied().collect();

        while let Some(cid) = queue.pop_front() {
            if !header_visited.insert(cid) {
                continue;
            }
            f(&cid)?;

            let Some(bytes) = self.getter.get(&cid)? else {
                continue;
            };
            let header: BlockHeader = serde_ipld_dagcbor::from_slice(&bytes).map_err(|e| Error::Corruption {
                cid,
                reason: e.to_string(),
            })?;

            if header.height < self.boundary && !self.full_chain {
                continue;
            }

            if header.height >= self.boundary {
                if self.include_messages {
                    link_walker::walk_links(&header.messages, &payload_visited, self.getter, &mut f)?;
                    link_walker::walk_links(&header.parent_message_receipts, &payload_visited, self.getter, &mut f)?;
                }
                link_walker::walk_links(&header.parent_state_root, &payload_visited, self.getter, &mut f)?;
            }

            if header.height > 0 {
                queue.extend(header.parents.iter().copied());
            }
        }

        Ok(())
    }
}
