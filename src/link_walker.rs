// Copyright 2019-2023 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! Recursive, visited-guarded traversal of DAG-CBOR payload links, grounded
//! on the reference FVM blockstore's buffered-flush recursion, reimplemented
//! over `ipld-core`'s `Ipld` rather than `libipld`, which this crate does not
//! depend on.

use std::collections::HashSet;

use cid::Cid;
use ipld_core::ipld::Ipld;
use parking_lot::Mutex;

use crate::error::{Error, Result};
use crate::traits::InternalGetter;
use crate::types::DAG_CBOR;

/// Walks the DAG rooted at `root`, invoking `f` once per unvisited CID.
/// `visited` is shared across sibling calls so that overlapping state-root
/// DAGs from adjacent epochs only get scanned once.
pub fn walk_links<G, F>(root: &Cid, visited: &Mutex<HashSet<Cid>>, getter: &G, f: &mut F) -> Result<()>
where
    G: InternalGetter,
    F: FnMut(&Cid) -> Result<()>,
{
    {
        let mut guard = visited.lock();
        if !guard.insert(*root) {
            return Ok(());
        }
    }

    f(root)?;

    if root.codec() != DAG_CBOR {
        return Ok(());
    }

    let Some(bytes) = getter.get(root)? else {
        return Ok(());
    };

    let ipld: Ipld = serde_ipld_dagcbor::from_slice(&bytes).map_err(|e| Error::Corruption {
        cid: *root,
        reason: e.to_string(),
    })?;

    let mut links = Vec::new();
    collect_links(&ipld, &mut links);

    for link in links {
        walk_links(&link, visited, getter, f)?;
    }

    Ok(())
}

fn collect_links(ipld: &Ipld, out: &mut Vec<Cid>) {
    match ipld {
        Ipld::Link(cid) => out.push(*cid),
        Ipld::List(items) => items.iter().for_each(|item| collect_links(item, out)),
        Ipld::Map(map) => map.values().for_each(|v| collect_links(v, out)),
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use multihash_codetable::{Code, MultihashDigest};

    use super::*;

    struct FixtureStore(HashMap<Cid, Vec<u8>>);

    impl InternalGetter for FixtureStore {
        fn get(&self, cid: &Cid) -> Result<Option<Vec<u8>>> {
            Ok(self.0.get(cid).cloned())
        }
    }

    fn dag_cbor_cid(bytes: &[u8]) -> Cid {
        Cid::new_v1(DAG_CBOR, Code::Blake2b256.digest(bytes))
    }

    #[test]
    fn walks_nested_links_once_each() {
        let leaf_bytes = serde_ipld_dagcbor::to_vec(&Ipld::Integer(1)).unwrap();
        let leaf_cid = dag_cbor_cid(&leaf_bytes);

        let mid = Ipld::List(vec![Ipld::Link(leaf_cid), Ipld::Link(leaf_cid)]);
        let mid_bytes = serde_ipld_dagcbor::to_vec(&mid).unwrap();
        let mid_cid = dag_cbor_cid(&mid_bytes);

        let root = Ipld::Link(mid_cid);
        let root_bytes = serde_ipld_dagcbor::to_vec(&root).unwrap();
        let root_cid = dag_cbor_cid(&root_bytes);

        let mut store = HashMap::new();
        store.insert(leaf_cid, leaf_bytes);
        store.insert(mid_cid, mid_bytes);
        store.insert(root_cid, root_bytes);
        let store = FixtureStore(store);

        let visited = Mutex::new(HashSet::new());
        let mut seen = Vec::new();
        walk_links(&root_cid, &visited, &store, &mut |cid| {
            seen.push(*cid);
            Ok(())
        })
        .unwrap();

        assert_eq!(seen, vec![root_cid, mid_cid, leaf_cid]);
    }

    #[test]
    fn non_dag_cbor_root_is_reported_but_not_scanned() {
        let raw_cid = Cid::new_v1(0x55, Code::Sha2_256.digest(b"raw"));
        let store = FixtureStore(HashMap::new());
        let visited = Mutex::new(HashSet::new());
        let mut seen = Vec::new();
        walk_links(&raw_cid, &visited, &store, &mut |cid| {
            seen.push(*cid);
            Ok(())
        })
        .unwrap();
        assert_eq!(seen, vec![raw_cid]);
    }
}
