//! The boundary between the replication engine and its consensus node.
//!
//! The consensus node — the caller-owned driver loop around the consensus
//! library — feeds the engine committed entries and accepts proposals over
//! channels. The commit channel carries a typed event rather than a nil
//! sentinel: data and control do not share an encoding.

use crossbeam_channel::{Receiver, Sender};
use raft::eraftpb::{ConfChange, Snapshot};

/// One delivery on the commit channel.
#[derive(Debug, Clone)]
pub enum Commit {
    /// A committed, wire-encoded command to apply.
    Command(Vec<u8>),
    /// The consensus layer has a snapshot for the engine to load.
    ///
    /// Sent once when log replay finishes (construction-time recovery) and
    /// again whenever a snapshot is installed during live operation.
    LoadSnapshot,
}

/// Terminal error delivered by the consensus node.
pub type NodeError = Box<dyn std::error::Error + Send + Sync>;

/// The channel bundle a consensus node exposes to one engine.
pub struct NodeChannels {
    /// Outgoing wire-encoded mutation proposals.
    pub propose_tx: Sender<Vec<u8>>,
    /// Outgoing configuration-change proposals.
    pub conf_change_tx: Sender<ConfChange>,
    /// Incoming committed entries and snapshot signals.
    pub commit_rx: Receiver<Commit>,
    /// Incoming terminal consensus errors.
    pub error_rx: Receiver<NodeError>,
}

/// Access to the snapshot the consensus layer has most recently persisted.
pub trait Snapshotter: Send + Sync {
    /// Load the persisted snapshot, or `None` if there is none yet.
    fn load(&self) -> Result<Option<Snapshot>, NodeError>;
}
