//! Command interpretation.

use palisade_core::{Command, StableStore};

/// Interprets committed commands and mutates the stable store.
///
/// Called sequentially, in consensus index order, for every committed
/// command of a region. Implementations MUST be deterministic: every peer
/// applies the same command sequence, and any divergence here diverges the
/// replicas. For the same reason a handler that encounters a malformed or
/// unknown command must fail the process rather than skip the entry.
pub trait CommandHandler: Send + Sync {
    /// Apply one committed command to `region` of `store`.
    fn apply(&self, region: &str, command: &Command, store: &dyn StableStore);
}

/// The reference handler: `PUT` stores each pair, `DELETE` removes each
/// named key, both as one atomic batch.
pub struct KvCommandHandler;

impl CommandHandler for KvCommandHandler {
    fn apply(&self, region: &str, command: &Command, store: &dyn StableStore) {
        match command.command.as_str() {
            Command::PUT => {
                let mut batch = store.create_batch();
                for kv in &command.key_values {
                    batch.put(region, &kv.key, &kv.value);
                }
                if let Err(err) = store.write(&batch) {
                    panic!("failed to apply PUT to region '{region}': {err}");
                }
            }
            Command::DELETE => {
                let mut batch = store.create_batch();
                for kv in &command.key_values {
                    batch.delete(region, &kv.key);
                }
                if let Err(err) = store.write(&batch) {
                    panic!("failed to apply DELETE to region '{region}': {err}");
                }
            }
            other => panic!("undefined command '{other}' in region '{region}'"),
        }
    }
}
