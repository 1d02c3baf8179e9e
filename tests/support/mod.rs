use std::sync::Arc;

use prometheus_client::registry::Registry;
use splitstore::markset::{BloomMarkSetEnv, MemMarkSetEnv};
use splitstore::testing::{FixtureChainAccessor, MemBlockstore, MemMetadataDatastore};
use splitstore::tracking::MemTrackingStore;
use splitstore::types::Tipset;
use splitstore::{Config, SplitStore};

/// Wires a fresh `SplitStore` over in-memory doubles for every collaborator,
/// with `cfg` applied on top of `Config::default()`.
pub fn new_store(cfg: impl FnOnce(&mut Config)) -> (Arc<SplitStore>, Arc<MemBlockstore>, Arc<MemBlockstore>) {
    let hot = Arc::new(MemBlockstore::new());
    let cold = Arc::new(MemBlockstore::new());
    let tracker = Arc::new(MemTrackingStore::new());
    let mark_set_env = Arc::new(BloomMarkSetEnv::default());
    let mapts_env = Arc::new(MemMarkSetEnv::new());
    let metadata_ds = Arc::new(MemMetadataDatastore::new());

    let mut config = Config::default();
    cfg(&mut config);

    let mut registry = Registry::default();
    let store = SplitStore::open(
        hot.clone(),
        Some(hot.clone()),
        cold.clone(),
        Some(cold.clone()),
        tracker,
        mark_set_env,
        mapts_env,
        metadata_ds,
        config,
        &mut registry,
    )
    .expect("open must succeed over in-memory doubles");

    (Arc::new(store), hot, cold)
}

pub fn genesis() -> Tipset {
    Tipset::new(vec![], 0, 0)
}
