//! State-machine replication engine.
//!
//! Wires a consensus node to a [`StableStore`] region: proposals go out
//! through the node, committed commands come back in index order and are
//! applied through a [`CommandHandler`], snapshots flow both ways as region
//! checkpoints. See [`ReplicationEngine`] for the pipeline, including
//! replay-on-restart.
//!
//! [`StableStore`]: palisade_core::StableStore

#![warn(missing_docs)]
#![warn(clippy::all)]

mod engine;
mod handler;
mod node;

pub use engine::{EngineState, ReplicationEngine};
pub use handler::{CommandHandler, KvCommandHandler};
pub use node::{Commit, NodeChannels, NodeError, Snapshotter};
