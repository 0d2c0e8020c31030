//! Replication-engine pipeline tests against a scripted consensus node.
//!
//! The "node" here is just the channel bundle, driven by the test: commits
//! are fed in by hand and proposals are read back out, which exercises the
//! replay, live-apply, snapshot-load and shutdown paths without a live
//! consensus transport.

use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::Mutex;
use raft::eraftpb::{ConfChange, Snapshot};

use palisade_core::{Command, MemoryStore, StableStore};
use palisade_engine::{
    Commit, CommandHandler, EngineState, KvCommandHandler, NodeChannels, NodeError,
    ReplicationEngine, Snapshotter,
};

struct TestNode {
    propose_rx: Receiver<Vec<u8>>,
    conf_change_rx: Receiver<ConfChange>,
    commit_tx: Sender<Commit>,
    #[allow(dead_code)]
    error_tx: Sender<NodeError>,
}

fn node_channels() -> (NodeChannels, TestNode) {
    let (propose_tx, propose_rx) = unbounded();
    let (conf_change_tx, conf_change_rx) = unbounded();
    let (commit_tx, commit_rx) = unbounded();
    let (error_tx, error_rx) = unbounded();
    (
        NodeChannels {
            propose_tx,
            conf_change_tx,
            commit_rx,
            error_rx,
        },
        TestNode {
            propose_rx,
            conf_change_rx,
            commit_tx,
            error_tx,
        },
    )
}

struct NoSnapshot;

impl Snapshotter for NoSnapshot {
    fn load(&self) -> Result<Option<Snapshot>, NodeError> {
        Ok(None)
    }
}

struct FakeSnapshotter {
    snapshot: Mutex<Option<Snapshot>>,
}

impl FakeSnapshotter {
    fn new(snapshot: Option<Snapshot>) -> FakeSnapshotter {
        FakeSnapshotter {
            snapshot: Mutex::new(snapshot),
        }
    }

    fn set(&self, snapshot: Snapshot) {
        *self.snapshot.lock() = Some(snapshot);
    }
}

impl Snapshotter for FakeSnapshotter {
    fn load(&self) -> Result<Option<Snapshot>, NodeError> {
        Ok(self.snapshot.lock().clone())
    }
}

fn wait_until(what: &str, condition: impl Fn() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if condition() {
            return;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    panic!("timed out waiting for {what}");
}

fn encoded_put(key: &[u8], value: &[u8]) -> Commit {
    Commit::Command(Command::put([(key.to_vec(), value.to_vec())]).encode_to_bytes())
}

#[test]
fn propose_apply_get() {
    let (channels, node) = node_channels();
    node.commit_tx.send(Commit::LoadSnapshot).unwrap(); // empty replay

    let store = Arc::new(MemoryStore::new());
    let engine = ReplicationEngine::new(
        "kv",
        Arc::new(NoSnapshot),
        channels,
        store,
        Arc::new(KvCommandHandler),
    )
    .unwrap();
    assert_eq!(engine.state(), EngineState::Live);
    assert_eq!(engine.region(), "kv");

    // A proposal goes out as wire bytes, unchanged.
    let command = Command::put([(b"foo".to_vec(), b"bar".to_vec())]);
    engine.propose(&command).unwrap();
    let payload = node.propose_rx.recv_timeout(Duration::from_secs(5)).unwrap();
    assert_eq!(Command::decode_from_bytes(&payload).unwrap(), command);

    // The cluster commits it; the engine applies it.
    node.commit_tx.send(Commit::Command(payload)).unwrap();
    wait_until("committed key to become readable", || {
        engine.get(b"foo").is_ok()
    });
    assert_eq!(engine.get(b"foo").unwrap(), b"bar");
    assert!(engine.get(b"missing").unwrap_err().is_key_not_found());

    drop(node);
    engine.close();
    assert_eq!(engine.state(), EngineState::Closed);
}

#[test]
fn replay_runs_before_construction_returns() {
    let (channels, node) = node_channels();
    node.commit_tx.send(encoded_put(b"k1", b"v1")).unwrap();
    node.commit_tx.send(encoded_put(b"k2", b"v2")).unwrap();
    node.commit_tx.send(Commit::LoadSnapshot).unwrap();

    let store = Arc::new(MemoryStore::new());
    let engine = ReplicationEngine::new(
        "kv",
        Arc::new(NoSnapshot),
        channels,
        store,
        Arc::new(KvCommandHandler),
    )
    .unwrap();

    // No polling: replay completed synchronously during construction.
    assert_eq!(engine.get(b"k1").unwrap(), b"v1");
    assert_eq!(engine.get(b"k2").unwrap(), b"v2");

    drop(node);
}

#[test]
fn construction_fails_if_node_dies_during_replay() {
    let (channels, node) = node_channels();
    drop(node); // commit channel closes before the replay marker arrives

    let result = ReplicationEngine::new(
        "kv",
        Arc::new(NoSnapshot),
        channels,
        Arc::new(MemoryStore::new()),
        Arc::new(KvCommandHandler),
    );
    assert!(result.is_err());
}

#[test]
#[should_panic(expected = "undecodable committed entry")]
fn undecodable_replayed_entry_is_fatal() {
    let (channels, node) = node_channels();
    node.commit_tx
        .send(Commit::Command(vec![0xFF, 0x00, 0xBE, 0xEF]))
        .unwrap();
    node.commit_tx.send(Commit::LoadSnapshot).unwrap();

    let _ = ReplicationEngine::new(
        "kv",
        Arc::new(NoSnapshot),
        channels,
        Arc::new(MemoryStore::new()),
        Arc::new(KvCommandHandler),
    );
}

fn region_snapshot(store: &MemoryStore, region: &str, index: u64, term: u64) -> Snapshot {
    let mut snapshot = Snapshot::new();
    snapshot.set_data(store.create_checkpoint(region).unwrap());
    snapshot.mut_metadata().set_index(index);
    snapshot.mut_metadata().set_term(term);
    snapshot
}

#[test]
fn snapshot_restores_region_on_construction() {
    // A populated peer produces a consensus snapshot...
    let source = MemoryStore::new();
    source.create_region("kv").unwrap();
    let mut batch = source.create_batch();
    for i in 0..500u32 {
        batch.put("kv", format!("key-{i:04}").as_bytes(), &i.to_be_bytes());
    }
    source.write(&batch).unwrap();
    let snapshot = region_snapshot(&source, "kv", 500, 3);

    // ...and a fresh peer recovers purely from it.
    let (channels, node) = node_channels();
    node.commit_tx.send(Commit::LoadSnapshot).unwrap();

    let store = Arc::new(MemoryStore::new());
    let engine = ReplicationEngine::new(
        "kv",
        Arc::new(FakeSnapshotter::new(Some(snapshot))),
        channels,
        Arc::clone(&store) as Arc<dyn StableStore>,
        Arc::new(KvCommandHandler),
    )
    .unwrap();

    assert_eq!(engine.get(b"key-0000").unwrap(), 0u32.to_be_bytes());
    assert_eq!(engine.get(b"key-0499").unwrap(), 499u32.to_be_bytes());
    assert_eq!(
        engine.create_checkpoint().unwrap(),
        source.create_checkpoint("kv").unwrap()
    );

    drop(node);
}

#[test]
fn live_snapshot_signal_replaces_region_contents() {
    let (channels, node) = node_channels();
    node.commit_tx.send(Commit::LoadSnapshot).unwrap();

    let snapshotter = Arc::new(FakeSnapshotter::new(None));
    let engine = ReplicationEngine::new(
        "kv",
        Arc::clone(&snapshotter) as Arc<dyn Snapshotter>,
        channels,
        Arc::new(MemoryStore::new()),
        Arc::new(KvCommandHandler),
    )
    .unwrap();

    node.commit_tx.send(encoded_put(b"stale", b"1")).unwrap();
    wait_until("stale key to apply", || engine.get(b"stale").is_ok());

    // The consensus layer installs a snapshot with different contents.
    let source = MemoryStore::new();
    source.create_region("kv").unwrap();
    let mut batch = source.create_batch();
    batch.put("kv", b"fresh", b"2");
    source.write(&batch).unwrap();
    snapshotter.set(region_snapshot(&source, "kv", 10, 2));
    node.commit_tx.send(Commit::LoadSnapshot).unwrap();

    wait_until("snapshot contents to replace region", || {
        engine.get(b"fresh").is_ok() && engine.get(b"stale").is_err()
    });

    drop(node);
}

#[test]
fn conf_changes_pass_through() {
    let (channels, node) = node_channels();
    node.commit_tx.send(Commit::LoadSnapshot).unwrap();

    let engine = ReplicationEngine::new(
        "kv",
        Arc::new(NoSnapshot),
        channels,
        Arc::new(MemoryStore::new()),
        Arc::new(KvCommandHandler),
    )
    .unwrap();

    let mut conf_change = ConfChange::new();
    conf_change.set_node_id(7);
    engine.propose_conf_change(conf_change.clone()).unwrap();
    let received = node
        .conf_change_rx
        .recv_timeout(Duration::from_secs(5))
        .unwrap();
    assert_eq!(received.get_node_id(), 7);

    drop(node);
}

#[test]
fn propose_after_close_is_rejected() {
    let (channels, node) = node_channels();
    node.commit_tx.send(Commit::LoadSnapshot).unwrap();

    let engine = ReplicationEngine::new(
        "kv",
        Arc::new(NoSnapshot),
        channels,
        Arc::new(MemoryStore::new()),
        Arc::new(KvCommandHandler),
    )
    .unwrap();

    drop(node);
    engine.close();
    let err = engine
        .propose(&Command::put([(b"k".to_vec(), b"v".to_vec())]))
        .unwrap_err();
    assert!(matches!(err, palisade_core::Error::Closed));
}

#[test]
fn identical_commit_sequences_converge() {
    let commits: Vec<Commit> = (0..40u32)
        .map(|i| {
            if i % 5 == 4 {
                Commit::Command(
                    Command::delete([format!("key-{}", i % 3).into_bytes()]).encode_to_bytes(),
                )
            } else {
                encoded_put(
                    format!("key-{}", i % 3).as_bytes(),
                    format!("value-{i}").as_bytes(),
                )
            }
        })
        .collect();

    let run = |commits: &[Commit]| -> Vec<u8> {
        let (channels, node) = node_channels();
        for commit in commits {
            node.commit_tx.send(commit.clone()).unwrap();
        }
        node.commit_tx.send(Commit::LoadSnapshot).unwrap();
        let engine = ReplicationEngine::new(
            "kv",
            Arc::new(NoSnapshot),
            channels,
            Arc::new(MemoryStore::new()),
            Arc::new(KvCommandHandler),
        )
        .unwrap();
        let checkpoint = engine.create_checkpoint().unwrap();
        drop(node);
        checkpoint
    };

    assert_eq!(run(&commits), run(&commits));
}

/// A handler that panics on everything; used to prove replay order matters
/// only when commands actually arrive.
struct RejectingHandler;

impl CommandHandler for RejectingHandler {
    fn apply(&self, region: &str, command: &Command, _store: &dyn StableStore) {
        panic!(
            "unexpected command '{}' in region '{region}'",
            command.command
        );
    }
}

#[test]
fn empty_replay_applies_nothing() {
    let (channels, node) = node_channels();
    node.commit_tx.send(Commit::LoadSnapshot).unwrap();

    let engine = ReplicationEngine::new(
        "kv",
        Arc::new(NoSnapshot),
        channels,
        Arc::new(MemoryStore::new()),
        Arc::new(RejectingHandler),
    )
    .unwrap();
    assert_eq!(engine.state(), EngineState::Live);
    drop(node);
}
