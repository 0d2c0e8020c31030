//! End-to-end wiring: registries, the RocksDB stable store, the sled log
//! store and the replication engine in one process, with the consensus
//! node scripted by the test.

use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam_channel::unbounded;
use raft::eraftpb::Snapshot;
use raft::{GetEntriesContext, Storage};
use tempfile::TempDir;

use palisade::{
    open_log_store, open_store, Command, Commit, ConsensusStorage, KvCommandHandler, NodeChannels,
    NodeError, ReplicationEngine, Snapshotter, StableStore,
};

struct NoSnapshot;

impl Snapshotter for NoSnapshot {
    fn load(&self) -> Result<Option<Snapshot>, NodeError> {
        Ok(None)
    }
}

fn wait_until(what: &str, condition: impl Fn() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(10);
    while Instant::now() < deadline {
        if condition() {
            return;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    panic!("timed out waiting for {what}");
}

#[test]
fn registries_drive_a_full_peer() {
    palisade::register_store_driver("rocksdb", Arc::new(palisade::RocksStoreDriver::new()));
    palisade::register_log_driver("sled", Arc::new(palisade::SledLogStoreDriver));

    let data = TempDir::new().unwrap();
    let stable_path = data.path().join("stable-store-1");
    let log_path = data.path().join("log-store-1");

    // The log store goes to the consensus node through the adapter.
    let log_store = open_log_store("sled", &log_path).unwrap();
    let storage = ConsensusStorage::new(Arc::from(log_store));
    assert_eq!(storage.first_index().unwrap(), 1);
    assert!(storage
        .entries(1, 1, u64::MAX, GetEntriesContext::empty(false))
        .unwrap()
        .is_empty());

    // The stable store goes to the engine.
    let store: Arc<dyn StableStore> = Arc::from(open_store("rocksdb", &stable_path).unwrap());

    let (propose_tx, propose_rx) = unbounded();
    let (conf_change_tx, _conf_change_rx) = unbounded();
    let (commit_tx, commit_rx) = unbounded();
    let (_error_tx, error_rx) = unbounded::<NodeError>();
    commit_tx.send(Commit::LoadSnapshot).unwrap(); // nothing to replay

    let engine = ReplicationEngine::new(
        "kv",
        Arc::new(NoSnapshot),
        NodeChannels {
            propose_tx,
            conf_change_tx,
            commit_rx,
            error_rx,
        },
        Arc::clone(&store),
        Arc::new(KvCommandHandler),
    )
    .unwrap();

    // Propose; "the cluster" commits whatever was proposed.
    engine
        .propose(&Command::put([(b"foo".to_vec(), b"bar".to_vec())]))
        .unwrap();
    let payload = propose_rx.recv_timeout(Duration::from_secs(5)).unwrap();
    commit_tx.send(Commit::Command(payload)).unwrap();

    wait_until("commit to apply", || engine.get(b"foo").is_ok());
    assert_eq!(engine.get(b"foo").unwrap(), b"bar");

    // The engine's checkpoint callback feeds consensus snapshots.
    let checkpoint = engine.create_checkpoint().unwrap();
    assert!(!checkpoint.is_empty());

    drop(commit_tx);
    engine.close();
}
