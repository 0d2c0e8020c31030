//! The replicated command wire format.
//!
//! Commands travel through the consensus log, so the encoding must stay
//! stable across versions: protobuf messages with explicit tags, evolved
//! only by appending new fields. The messages are hand-derived with `prost`
//! rather than generated from a schema file; the tags below are the schema.

use prost::Message;

use crate::error::{Error, Result};

/// One key/value pair carried by a command.
#[derive(Clone, PartialEq, Message)]
pub struct KeyValue {
    /// Key bytes.
    #[prost(bytes = "vec", tag = "1")]
    pub key: Vec<u8>,
    /// Value bytes; empty for commands that only name keys.
    #[prost(bytes = "vec", tag = "2")]
    pub value: Vec<u8>,
}

/// A mutation command proposed to the cluster and applied on commit.
///
/// `command` selects the operation; the reference handler understands
/// [`Command::PUT`] and [`Command::DELETE`]. New fields must be appended
/// with fresh tags, never renumbered.
#[derive(Clone, PartialEq, Message)]
pub struct Command {
    /// Operation kind.
    #[prost(string, tag = "1")]
    pub command: String,
    /// The key/value pairs the operation touches.
    #[prost(message, repeated, tag = "2")]
    pub key_values: Vec<KeyValue>,
}

impl Command {
    /// Store each pair.
    pub const PUT: &'static str = "PUT";
    /// Remove each named key; pair values are ignored.
    pub const DELETE: &'static str = "DELETE";

    /// Build a PUT command from key/value pairs.
    pub fn put<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Command
    where
        K: Into<Vec<u8>>,
        V: Into<Vec<u8>>,
    {
        Command {
            command: Self::PUT.to_string(),
            key_values: pairs
                .into_iter()
                .map(|(key, value)| KeyValue {
                    key: key.into(),
                    value: value.into(),
                })
                .collect(),
        }
    }

    /// Build a DELETE command from keys.
    pub fn delete<K>(keys: impl IntoIterator<Item = K>) -> Command
    where
        K: Into<Vec<u8>>,
    {
        Command {
            command: Self::DELETE.to_string(),
            key_values: keys
                .into_iter()
                .map(|key| KeyValue {
                    key: key.into(),
                    value: Vec::new(),
                })
                .collect(),
        }
    }

    /// Serialize for the wire.
    pub fn encode_to_bytes(&self) -> Vec<u8> {
        self.encode_to_vec()
    }

    /// Deserialize from a committed log entry's payload.
    pub fn decode_from_bytes(buf: &[u8]) -> Result<Command> {
        Command::decode(buf).map_err(|err| Error::Codec(err.to_string()))
    }
}
