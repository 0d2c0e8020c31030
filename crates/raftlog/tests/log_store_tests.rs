//! Log-store contract tests against the sled driver.

use raft::eraftpb::{ConfState, Entry, HardState, Snapshot};
use raft::{GetEntriesContext, Storage, StorageError};
use tempfile::TempDir;

use palisade_raftlog::{ConsensusStorage, LogStore, SledLogStore};

fn entry(index: u64, term: u64) -> Entry {
    let mut e = Entry::new();
    e.set_index(index);
    e.set_term(term);
    e.set_data(format!("payload-{index}").into_bytes());
    e
}

fn entries(range: std::ops::RangeInclusive<u64>, term: u64) -> Vec<Entry> {
    range.map(|index| entry(index, term)).collect()
}

fn open(dir: &TempDir) -> SledLogStore {
    SledLogStore::open(dir.path()).unwrap()
}

fn is_compacted(err: &raft::Error) -> bool {
    matches!(err, raft::Error::Store(StorageError::Compacted))
}

fn is_unavailable(err: &raft::Error) -> bool {
    matches!(err, raft::Error::Store(StorageError::Unavailable))
}

fn is_out_of_date(err: &raft::Error) -> bool {
    matches!(err, raft::Error::Store(StorageError::SnapshotOutOfDate))
}

#[test]
fn fresh_store_matches_empty_log() {
    let dir = TempDir::new().unwrap();
    let store = open(&dir);

    assert_eq!(store.first_index().unwrap(), 1);
    assert_eq!(store.last_index().unwrap(), 0);
    // The dummy entry answers term queries at the compaction point.
    assert_eq!(store.term(0).unwrap(), 0);
    assert_eq!(store.snapshot().unwrap().get_metadata().get_index(), 0);
}

#[test]
fn append_and_read_back() {
    let dir = TempDir::new().unwrap();
    let store = open(&dir);
    store.append(&entries(1..=5, 1)).unwrap();

    assert_eq!(store.first_index().unwrap(), 1);
    assert_eq!(store.last_index().unwrap(), 5);

    let read = store.entries(1, 6, None).unwrap();
    assert_eq!(read.len(), 5);
    assert_eq!(read[0].get_index(), 1);
    assert_eq!(read[4].get_index(), 5);
    assert_eq!(read[2].get_data(), b"payload-3");
    assert_eq!(store.term(5).unwrap(), 1);

    // Reads below the dummy index are compacted, above the last are
    // unavailable.
    assert!(is_compacted(&store.entries(0, 3, None).unwrap_err()));
    assert!(is_unavailable(&store.term(6).unwrap_err()));
}

#[test]
fn entries_respects_max_size() {
    let dir = TempDir::new().unwrap();
    let store = open(&dir);
    store.append(&entries(1..=5, 1)).unwrap();

    // At least one entry comes back even under an impossible budget.
    let read = store.entries(1, 6, Some(0)).unwrap();
    assert_eq!(read.len(), 1);

    use protobuf::Message;
    let budget: u64 = store.entries(1, 6, None).unwrap()[..2]
        .iter()
        .map(|e| u64::from(e.compute_size()))
        .sum();
    let read = store.entries(1, 6, Some(budget)).unwrap();
    assert_eq!(read.len(), 2);
}

#[test]
#[should_panic(expected = "out of bound")]
fn entries_beyond_last_index_panics() {
    let dir = TempDir::new().unwrap();
    let store = open(&dir);
    store.append(&entries(1..=5, 1)).unwrap();
    let _ = store.entries(1, 100, None);
}

#[test]
fn append_overwrites_suffix_and_drops_stale_tail() {
    let dir = TempDir::new().unwrap();
    let store = open(&dir);
    store.append(&entries(1..=10, 1)).unwrap();

    // Overwrite 8..=9 with a newer term; the old entry 10 must go away.
    store.append(&entries(8..=9, 2)).unwrap();

    assert_eq!(store.last_index().unwrap(), 9);
    let read = store
        .entries(5, store.last_index().unwrap() + 1, None)
        .unwrap();
    let indexes: Vec<u64> = read.iter().map(Entry::get_index).collect();
    assert_eq!(indexes, vec![5, 6, 7, 8, 9]);
    assert_eq!(read[3].get_term(), 2);
    assert_eq!(read[4].get_term(), 2);
    assert!(is_unavailable(&store.term(10).unwrap_err()));
}

#[test]
fn append_drops_already_compacted_entries() {
    let dir = TempDir::new().unwrap();
    let store = open(&dir);
    store.append(&entries(1..=10, 1)).unwrap();
    store.compact(5).unwrap();

    // Entries at or below the compaction point are silently dropped.
    store.append(&entries(3..=7, 2)).unwrap();
    assert_eq!(store.first_index().unwrap(), 6);
    assert_eq!(store.term(6).unwrap(), 2);
    assert_eq!(store.term(5).unwrap(), 1);
}

#[test]
fn compact_discards_prefix_and_keeps_terms_answerable() {
    let dir = TempDir::new().unwrap();
    let store = open(&dir);
    store.append(&entries(1..=10, 1)).unwrap();

    store.compact(4).unwrap();
    assert_eq!(store.first_index().unwrap(), 5);
    assert_eq!(store.last_index().unwrap(), 10);
    // The entry at the compaction point anchors term queries.
    assert_eq!(store.term(4).unwrap(), 1);
    assert!(is_compacted(&store.term(3).unwrap_err()));
    assert!(is_compacted(&store.entries(4, 6, None).unwrap_err()));
    assert_eq!(store.entries(5, 11, None).unwrap().len(), 6);

    // Monotonicity after the whole sequence.
    assert!(store.first_index().unwrap() <= store.last_index().unwrap() + 1);

    // Compacting at or below the current point is rejected.
    assert!(is_compacted(&store.compact(4).unwrap_err()));
}

#[test]
#[should_panic(expected = "out of bound")]
fn compact_beyond_last_index_panics() {
    let dir = TempDir::new().unwrap();
    let store = open(&dir);
    store.append(&entries(1..=5, 1)).unwrap();
    let _ = store.compact(50);
}

#[test]
fn apply_snapshot_resets_the_log() {
    let dir = TempDir::new().unwrap();
    let store = open(&dir);
    store.append(&entries(1..=5, 1)).unwrap();

    let mut snapshot = Snapshot::new();
    snapshot.mut_metadata().set_index(10);
    snapshot.mut_metadata().set_term(3);
    snapshot.set_data(b"region-checkpoint".to_vec());
    store.apply_snapshot(&snapshot).unwrap();

    assert_eq!(store.first_index().unwrap(), 11);
    assert_eq!(store.last_index().unwrap(), 10);
    assert_eq!(store.term(10).unwrap(), 3);
    assert!(is_compacted(&store.term(5).unwrap_err()));
    assert_eq!(store.snapshot().unwrap().get_data(), b"region-checkpoint");

    // Installing an older or equal snapshot has no effect.
    let mut stale = Snapshot::new();
    stale.mut_metadata().set_index(10);
    assert!(is_out_of_date(&store.apply_snapshot(&stale).unwrap_err()));
    assert_eq!(store.term(10).unwrap(), 3);
}

#[test]
fn create_snapshot_records_applied_state() {
    let dir = TempDir::new().unwrap();
    let store = open(&dir);
    store.append(&entries(1..=3, 1)).unwrap();
    store.append(&entries(4..=5, 2)).unwrap();

    let mut conf_state = ConfState::new();
    conf_state.set_voters(vec![1, 2, 3]);
    let snapshot = store
        .create_snapshot(4, Some(conf_state), b"data-at-4".to_vec())
        .unwrap();
    assert_eq!(snapshot.get_metadata().get_index(), 4);
    assert_eq!(snapshot.get_metadata().get_term(), 2);

    let stored = store.snapshot().unwrap();
    assert_eq!(stored.get_data(), b"data-at-4");
    assert_eq!(stored.get_metadata().get_conf_state().get_voters(), &[1, 2, 3]);

    // The log itself is untouched; compaction is a separate decision.
    assert_eq!(store.first_index().unwrap(), 1);

    // An equal-or-older snapshot index is rejected.
    assert!(is_out_of_date(
        &store.create_snapshot(4, None, Vec::new()).unwrap_err()
    ));
}

#[test]
#[should_panic(expected = "out of bound")]
fn create_snapshot_beyond_last_index_panics() {
    let dir = TempDir::new().unwrap();
    let store = open(&dir);
    store.append(&entries(1..=5, 1)).unwrap();
    let _ = store.create_snapshot(9, None, Vec::new());
}

#[test]
fn hard_state_and_log_survive_reopen() {
    let dir = TempDir::new().unwrap();
    {
        let store = open(&dir);
        store.append(&entries(1..=7, 2)).unwrap();

        let mut hs = HardState::new();
        hs.set_term(2);
        hs.set_vote(3);
        hs.set_commit(7);
        store.set_hard_state(&hs).unwrap();
    }

    let store = open(&dir);
    let state = store.initial_state().unwrap();
    assert_eq!(state.hard_state.get_term(), 2);
    assert_eq!(state.hard_state.get_vote(), 3);
    assert_eq!(state.hard_state.get_commit(), 7);
    assert_eq!(store.last_index().unwrap(), 7);
    assert_eq!(store.term(7).unwrap(), 2);
}

#[test]
fn initial_state_takes_conf_state_from_snapshot() {
    let dir = TempDir::new().unwrap();
    let store = open(&dir);
    store.append(&entries(1..=2, 1)).unwrap();

    let mut conf_state = ConfState::new();
    conf_state.set_voters(vec![4, 5]);
    store
        .create_snapshot(2, Some(conf_state), Vec::new())
        .unwrap();

    let state = store.initial_state().unwrap();
    assert_eq!(state.conf_state.get_voters(), &[4, 5]);
}

#[test]
fn consensus_storage_adapter() {
    let dir = TempDir::new().unwrap();
    let store = open(&dir);
    store.append(&entries(1..=5, 1)).unwrap();
    store.create_snapshot(4, None, b"snap".to_vec()).unwrap();

    let storage = ConsensusStorage::new(std::sync::Arc::new(store));
    assert_eq!(storage.first_index().unwrap(), 1);
    assert_eq!(storage.last_index().unwrap(), 5);
    assert_eq!(storage.term(4).unwrap(), 1);

    let read = storage
        .entries(2, 5, u64::MAX, GetEntriesContext::empty(false))
        .unwrap();
    assert_eq!(read.len(), 3);

    // Serves the stored snapshot when fresh enough, defers when not.
    assert_eq!(storage.snapshot(3, 0).unwrap().get_data(), b"snap");
    assert!(matches!(
        storage.snapshot(9, 0).unwrap_err(),
        raft::Error::Store(StorageError::SnapshotTemporarilyUnavailable)
    ));
}
