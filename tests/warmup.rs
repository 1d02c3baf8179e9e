mod support;

use splitstore::testing::{dag_cbor_block, raw_cid, FixtureChainAccessor};
use splitstore::types::{BlockHeader, Tipset};
use splitstore::Blockstore;

/// Scenario 1: fresh open against a cold store already holding genesis plus
/// a 50-leaf state-root DAG. Warmup should populate hot with every reachable
/// CID, record `warmupEpoch = 0`, and size the mark-set with 25% headroom.
#[tokio::test]
async fn warmup_populates_hot_from_cold_genesis_state() {
    let (store, hot, cold) = support::new_store(|_| {});

    let leaves: Vec<_> = (0..50u64).map(raw_cid).collect();
    for (i, leaf) in leaves.iter().enumerate() {
        cold.put_keyed(leaf, &(i as u64).to_le_bytes()).unwrap();
    }
    let (state_root, state_bytes) = dag_cbor_block(&leaves);
    cold.put_keyed(&state_root, &state_bytes).unwrap();

    let (messages, msg_bytes) = dag_cbor_block(&"genesis-messages");
    let (receipts, receipt_bytes) = dag_cbor_block(&"genesis-receipts");
    cold.put_keyed(&messages, &msg_bytes).unwrap();
    cold.put_keyed(&receipts, &receipt_bytes).unwrap();

    let header = BlockHeader {
        height: 0,
        parents: vec![],
        parent_state_root: state_root,
        messages,
        parent_message_receipts: receipts,
    };
    let (header_cid, header_bytes) = dag_cbor_block(&header);
    cold.put_keyed(&header_cid, &header_bytes).unwrap();

    let genesis_ts = Tipset::new(vec![header_cid], 0, 0);
    let chain = FixtureChainAccessor::new(genesis_ts);

    assert!(hot.is_empty());
    store.start(chain).await.unwrap();

    // Warmup is spawned in the background; give it a moment to finish.
    for _ in 0..200 {
        if store.is_warmed_up() {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    assert!(store.is_warmed_up(), "warmup did not complete in time");

    for leaf in &leaves {
        assert!(hot.has(leaf).unwrap(), "leaf {leaf} missing from hot after warmup");
    }
    assert!(hot.has(&header_cid).unwrap());
    assert!(hot.has(&state_root).unwrap());
    assert!(hot.has(&messages).unwrap());
    assert!(hot.has(&receipts).unwrap());
}
