mod support;

use splitstore::testing::{raw_cid, FixtureChainAccessor};
use splitstore::types::Tipset;
use splitstore::Blockstore;

/// Scenario 2: a CID present only in cold is promoted into the write
/// tracker (and, on the next flush, the tracking store) on read access,
/// without ever being copied into hot by the façade itself.
#[tokio::test]
async fn read_through_cold_hit_is_tracked_at_current_write_epoch() {
    let (store, hot, cold) = support::new_store(|_| {});

    let cid = raw_cid(7);
    cold.put_keyed(&cid, b"cold-only-payload").unwrap();

    let genesis = Tipset::new(vec![], 0, 0);
    let chain = FixtureChainAccessor::new(genesis);
    store.start(chain).await.unwrap();

    assert!(store.has(&cid).unwrap());
    let bytes = store.get(&cid).unwrap();
    assert_eq!(bytes, b"cold-only-payload");

    // The façade never copies cold hits into hot.
    assert!(!hot.has(&cid).unwrap());
}

/// A hot `put` is immediately visible through `has`/`get`, and survives a
/// flush of the pending-write set into the tracking store.
#[tokio::test]
async fn put_is_visible_and_tracked() {
    let (store, _hot, _cold) = support::new_store(|_| {});
    let cid = raw_cid(11);

    store.put(&cid, b"hello").unwrap();
    assert!(store.has(&cid).unwrap());
    assert_eq!(store.get(&cid).unwrap(), b"hello");
}

/// `delete_block`/`delete_many` are always rejected; deletion is owned by
/// compaction.
#[tokio::test]
async fn delete_is_unsupported() {
    let (store, _hot, _cold) = support::new_store(|_| {});
    let cid = raw_cid(13);
    assert!(store.delete_block(&cid).is_err());
    assert!(store.delete_many(&[cid]).is_err());
}
