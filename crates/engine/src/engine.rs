//! The replication engine.
//!
//! One engine binds one consensus node to one region of a stable store. It
//! is the sole writer for that region: committed commands are applied on a
//! single long-running thread, in consensus index order, while reads may
//! run on any caller's thread against store snapshots.

use std::sync::Arc;
use std::thread::JoinHandle;

use crossbeam_channel::{Receiver, Sender};
use parking_lot::Mutex;
use raft::eraftpb::ConfChange;
use tracing::{debug, error, info};

use palisade_core::{Command, Error, Result, StableStore};

use crate::handler::CommandHandler;
use crate::node::{Commit, NodeChannels, NodeError, Snapshotter};

/// Lifecycle of a [`ReplicationEngine`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    /// Being constructed; no commits consumed yet.
    Constructing,
    /// Draining the commit backlog left from before the last restart.
    Replaying,
    /// Restoring the region from a consensus-layer snapshot.
    SnapshotLoading,
    /// Applying commits as the cluster produces them.
    Live,
    /// Shutting down; no further proposals are accepted.
    Closing,
    /// The apply thread has terminated.
    Closed,
}

/// Binds a consensus node to a [`StableStore`] region.
///
/// Construction replays the commit backlog synchronously, loads any
/// persisted snapshot, then hands the commit channel to a background apply
/// thread. [`propose`] enqueues commands without waiting for commit;
/// [`get`] serves the locally-applied (eventually consistent) state.
///
/// [`propose`]: ReplicationEngine::propose
/// [`get`]: ReplicationEngine::get
pub struct ReplicationEngine {
    region: String,
    store: Arc<dyn StableStore>,
    propose_tx: Mutex<Option<Sender<Vec<u8>>>>,
    conf_change_tx: Mutex<Option<Sender<ConfChange>>>,
    state: Arc<Mutex<EngineState>>,
    apply_thread: Mutex<Option<JoinHandle<()>>>,
}

impl ReplicationEngine {
    /// Construct an engine for `region`.
    ///
    /// Synchronously drains `channels.commit_rx` until the first
    /// [`Commit::LoadSnapshot`] marker (the node's "replay complete"
    /// signal), applying each replayed command; then loads the persisted
    /// snapshot, if any, and spawns the live apply thread. The region is
    /// created if the store does not have it yet.
    ///
    /// # Panics
    ///
    /// Panics if a replayed command cannot be decoded or a snapshot cannot
    /// be restored: both would leave this replica behind the cluster.
    pub fn new(
        region: impl Into<String>,
        snapshotter: Arc<dyn Snapshotter>,
        channels: NodeChannels,
        store: Arc<dyn StableStore>,
        handler: Arc<dyn CommandHandler>,
    ) -> Result<ReplicationEngine> {
        let region = region.into();
        let NodeChannels {
            propose_tx,
            conf_change_tx,
            commit_rx,
            error_rx,
        } = channels;

        let state = Arc::new(Mutex::new(EngineState::Constructing));
        if !store.has_region(&region) {
            store.create_region(&region)?;
        }

        *state.lock() = EngineState::Replaying;
        info!(region = %region, "replaying committed log");
        let mut replayed = 0u64;
        loop {
            match commit_rx.recv() {
                Ok(Commit::Command(payload)) => {
                    apply_payload(&region, &payload, store.as_ref(), handler.as_ref());
                    replayed += 1;
                }
                Ok(Commit::LoadSnapshot) => break,
                Err(_) => {
                    return Err(Error::Storage(
                        "consensus node closed its commit channel during replay".to_string(),
                    ));
                }
            }
        }
        info!(region = %region, replayed, "replay complete");

        *state.lock() = EngineState::SnapshotLoading;
        load_snapshot(&region, snapshotter.as_ref(), store.as_ref());
        *state.lock() = EngineState::Live;

        let apply_thread = spawn_apply_thread(
            region.clone(),
            snapshotter,
            commit_rx,
            error_rx,
            Arc::clone(&store),
            handler,
            Arc::clone(&state),
        )?;

        Ok(ReplicationEngine {
            region,
            store,
            propose_tx: Mutex::new(Some(propose_tx)),
            conf_change_tx: Mutex::new(Some(conf_change_tx)),
            state,
            apply_thread: Mutex::new(Some(apply_thread)),
        })
    }

    /// The region this engine replicates.
    pub fn region(&self) -> &str {
        &self.region
    }

    /// Current lifecycle state.
    pub fn state(&self) -> EngineState {
        *self.state.lock()
    }

    /// Serialize `command` and enqueue it on the consensus node.
    ///
    /// Returns once the proposal is queued — it does not wait for commit.
    /// A full propose queue blocks the caller; the engine adds no buffering
    /// of its own.
    pub fn propose(&self, command: &Command) -> Result<()> {
        let payload = command.encode_to_bytes();
        let guard = self.propose_tx.lock();
        let tx = guard.as_ref().ok_or(Error::Closed)?;
        tx.send(payload).map_err(|_| Error::Closed)
    }

    /// Enqueue a cluster-membership change on the consensus node.
    pub fn propose_conf_change(&self, conf_change: ConfChange) -> Result<()> {
        let guard = self.conf_change_tx.lock();
        let tx = guard.as_ref().ok_or(Error::Closed)?;
        tx.send(conf_change).map_err(|_| Error::Closed)
    }

    /// Read `key` from the locally-applied state of this region.
    ///
    /// Eventually consistent with respect to the cluster: a command is
    /// visible here once this peer has applied it, which may lag the
    /// leader.
    pub fn get(&self, key: &[u8]) -> Result<Vec<u8>> {
        let snapshot = self.store.snapshot()?;
        snapshot.get(&self.region, key)
    }

    /// Serialize the region for the consensus layer's periodic snapshots.
    ///
    /// Runs against a store snapshot acquired before iteration begins, so
    /// commit application is never blocked behind it.
    pub fn create_checkpoint(&self) -> Result<Vec<u8>> {
        self.store.create_checkpoint(&self.region)
    }

    /// Shut down: stop accepting proposals, signal the node by dropping the
    /// propose channel, and wait for the apply thread to drain remaining
    /// commits and exit.
    pub fn close(&self) {
        let handle = self.apply_thread.lock().take();
        if let Some(handle) = handle {
            *self.state.lock() = EngineState::Closing;
            info!(region = %self.region, "closing replication engine");
            *self.propose_tx.lock() = None;
            *self.conf_change_tx.lock() = None;
            let _ = handle.join();
        }
        *self.state.lock() = EngineState::Closed;
    }
}

impl Drop for ReplicationEngine {
    fn drop(&mut self) {
        self.close();
    }
}

#[allow(clippy::too_many_arguments)]
fn spawn_apply_thread(
    region: String,
    snapshotter: Arc<dyn Snapshotter>,
    commit_rx: Receiver<Commit>,
    error_rx: Receiver<NodeError>,
    store: Arc<dyn StableStore>,
    handler: Arc<dyn CommandHandler>,
    state: Arc<Mutex<EngineState>>,
) -> Result<JoinHandle<()>> {
    std::thread::Builder::new()
        .name(format!("palisade-apply-{region}"))
        .spawn(move || {
            for commit in commit_rx.iter() {
                match commit {
                    Commit::Command(payload) => {
                        debug!(region = %region, bytes = payload.len(), "applying commit");
                        apply_payload(&region, &payload, store.as_ref(), handler.as_ref());
                    }
                    Commit::LoadSnapshot => {
                        *state.lock() = EngineState::SnapshotLoading;
                        load_snapshot(&region, snapshotter.as_ref(), store.as_ref());
                        *state.lock() = EngineState::Live;
                    }
                }
            }
            // The node closed the commit channel: orderly shutdown, or a
            // terminal consensus error it reported alongside.
            *state.lock() = EngineState::Closing;
            if let Ok(err) = error_rx.try_recv() {
                error!(region = %region, error = %err, "consensus node failed");
            }
            *state.lock() = EngineState::Closed;
            info!(region = %region, "apply thread terminated");
        })
        .map_err(Error::Io)
}

/// Decode and apply one committed payload.
///
/// A payload that fails to decode is fatal: surfacing it and skipping the
/// entry would be observably non-deterministic across peers.
fn apply_payload(region: &str, payload: &[u8], store: &dyn StableStore, handler: &dyn CommandHandler) {
    let command = match Command::decode_from_bytes(payload) {
        Ok(command) => command,
        Err(err) => panic!("undecodable committed entry in region '{region}': {err}"),
    };
    handler.apply(region, &command, store);
}

/// Restore the region from the consensus layer's persisted snapshot, if
/// one exists.
fn load_snapshot(region: &str, snapshotter: &dyn Snapshotter, store: &dyn StableStore) {
    match snapshotter.load() {
        Ok(None) => debug!(region = %region, "no snapshot to load"),
        Ok(Some(snapshot)) => {
            let meta = snapshot.get_metadata();
            info!(
                region,
                index = meta.get_index(),
                term = meta.get_term(),
                "loading snapshot"
            );
            if let Err(err) = store.restore_to_checkpoint(region, snapshot.get_data()) {
                panic!("failed to restore region '{region}' from snapshot: {err}");
            }
        }
        Err(err) => panic!("failed to load snapshot for region '{region}': {err}"),
    }
}
