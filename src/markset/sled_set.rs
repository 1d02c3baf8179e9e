// Copyright 2019-2023 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use cid::Cid;

use crate::error::Result;
use crate::traits::{MarkSet, MarkSetEnv};

/// `sled`-backed, exact mark-set environment, selected by `MarkSetType::Bolt`.
/// Each `create` call opens a fresh tree so concurrent or sequential
/// compactions never collide on state from a previous run.
pub struct SledMarkSetEnv {
    db: sled::Db,
}

impl SledMarkSetEnv {
    pub fn new(db: sled::Db) -> Self {
        Self { db }
    }
}

impl MarkSetEnv for SledMarkSetEnv {
    fn create(&self, name: &str, _size_hint: usize) -> Result<Box<dyn MarkSet>> {
        let tree_name = format!("markset-{name}-{}", self.db.generate_id()?);
        let tree = self.db.open_tree(tree_name)?;
        Ok(Box::new(SledMarkSet { tree }))
    }
}

struct SledMarkSet {
    tree: sled::Tree,
}

impl MarkSet for SledMarkSet {
    fn mark(&self, cid: &Cid) -> Result<()> {
        self.tree.insert(cid.to_bytes(), &[])?;
        Ok(())
    }

    fn has(&self, cid: &Cid) -> Result<bool> {
        Ok(self.tree.contains_key(cid.to_bytes())?)
    }

    fn close(&self) -> Result<()> {
        self.tree.flush()?;
        self.tree.clear()?;
        Ok(())
    }
}
