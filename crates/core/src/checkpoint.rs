//! Checkpoint codec: a self-describing, framed, compressed record stream.
//!
//! A checkpoint serializes every `(key, value)` pair of one region. Records
//! are MessagePack maps with named fields, so a decoder needs no schema
//! beyond the stream itself, and the `value` field distinguishes a missing
//! value (nil) from a zero-length one. Records are grouped into blocks of up
//! to [`BLOCK_RECORDS`] records; each block is zstd-compressed at a fast
//! level and framed with a crc32 checksum.
//!
//! Stream layout:
//!
//! ```text
//! ┌──────────┬─────────────┬─────────┬─────────┬───┐
//! │ Magic (4)│ Version (1) │ Block 1 │ Block 2 │ … │
//! └──────────┴─────────────┴─────────┴─────────┴───┘
//!
//! Block:
//! ┌───────────────┬──────────────────┬────────────────┬──────────────┬──────────┐
//! │ Records (4 LE)│ Raw len (4 LE)   │ Comp len (4 LE)│ zstd payload │ CRC32 (4)│
//! └───────────────┴──────────────────┴────────────────┴──────────────┴──────────┘
//! ```
//!
//! The payload is a sequence of `[record len (4 LE)][record]` frames. The
//! checksum covers the compressed payload.

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use serde::{Deserialize, Serialize};
use serde_bytes::ByteBuf;

use crate::error::{Error, Result};
use crate::range::Range;
use crate::store::{StableStore, StoreSnapshot};

/// Magic bytes identifying a checkpoint stream.
pub const CHECKPOINT_MAGIC: [u8; 4] = *b"PCKP";

/// Current stream format version.
pub const CHECKPOINT_FORMAT_VERSION: u8 = 1;

/// Maximum records per block; a partial final block is flushed.
pub const BLOCK_RECORDS: usize = 256;

// zstd's fastest setting; checkpoints favor throughput over ratio.
const COMPRESSION_LEVEL: i32 = 1;

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
struct Record {
    key: ByteBuf,
    value: Option<ByteBuf>,
}

fn codec_err(err: impl std::fmt::Display) -> Error {
    Error::Codec(err.to_string())
}

/// Streaming checkpoint encoder.
///
/// Key and value bytes are copied as they are appended, so slices returned
/// by an iterator may be handed in directly even though the iterator
/// invalidates them on its next movement.
pub struct CheckpointWriter {
    out: Vec<u8>,
    block: Vec<u8>,
    block_records: u32,
}

impl CheckpointWriter {
    /// Start a new checkpoint stream.
    pub fn new() -> CheckpointWriter {
        let mut out = Vec::new();
        out.extend_from_slice(&CHECKPOINT_MAGIC);
        out.push(CHECKPOINT_FORMAT_VERSION);
        CheckpointWriter {
            out,
            block: Vec::new(),
            block_records: 0,
        }
    }

    /// Append one record. `None` is an absent value, distinct from `Some(&[])`.
    pub fn append(&mut self, key: &[u8], value: Option<&[u8]>) -> Result<()> {
        let record = Record {
            key: ByteBuf::from(key.to_vec()),
            value: value.map(|v| ByteBuf::from(v.to_vec())),
        };
        let encoded = rmp_serde::to_vec_named(&record).map_err(codec_err)?;
        self.block
            .write_u32::<LittleEndian>(encoded.len() as u32)?;
        self.block.extend_from_slice(&encoded);
        self.block_records += 1;
        if self.block_records as usize >= BLOCK_RECORDS {
            self.flush_block()?;
        }
        Ok(())
    }

    fn flush_block(&mut self) -> Result<()> {
        if self.block_records == 0 {
            return Ok(());
        }
        let compressed = zstd::bulk::compress(&self.block, COMPRESSION_LEVEL)?;
        let mut hasher = crc32fast::Hasher::new();
        hasher.update(&compressed);
        let checksum = hasher.finalize();

        self.out.write_u32::<LittleEndian>(self.block_records)?;
        self.out.write_u32::<LittleEndian>(self.block.len() as u32)?;
        self.out
            .write_u32::<LittleEndian>(compressed.len() as u32)?;
        self.out.extend_from_slice(&compressed);
        self.out.write_u32::<LittleEndian>(checksum)?;

        self.block.clear();
        self.block_records = 0;
        Ok(())
    }

    /// Flush the final partial block and return the stream.
    pub fn finish(mut self) -> Result<Vec<u8>> {
        self.flush_block()?;
        Ok(self.out)
    }
}

impl Default for CheckpointWriter {
    fn default() -> Self {
        CheckpointWriter::new()
    }
}

/// Streaming checkpoint decoder.
///
/// Yields `(key, value)` records in stream order. The first malformed block
/// or record yields its error and exhausts the reader.
pub struct CheckpointReader<'a> {
    input: &'a [u8],
    block: Vec<u8>,
    block_pos: usize,
    remaining_in_block: u32,
    failed: bool,
}

impl<'a> CheckpointReader<'a> {
    /// Open a checkpoint stream, validating its header.
    pub fn new(bytes: &'a [u8]) -> Result<CheckpointReader<'a>> {
        if bytes.len() < 5 || bytes[..4] != CHECKPOINT_MAGIC {
            return Err(Error::Codec("not a checkpoint stream".to_string()));
        }
        if bytes[4] != CHECKPOINT_FORMAT_VERSION {
            return Err(Error::Codec(format!(
                "unsupported checkpoint format version {}",
                bytes[4]
            )));
        }
        Ok(CheckpointReader {
            input: &bytes[5..],
            block: Vec::new(),
            block_pos: 0,
            remaining_in_block: 0,
            failed: false,
        })
    }

    /// Load the next block into the decode buffer. `Ok(false)` means the
    /// stream is cleanly exhausted.
    fn next_block(&mut self) -> Result<bool> {
        if self.input.is_empty() {
            return Ok(false);
        }
        let mut header = self.input;
        let records = header
            .read_u32::<LittleEndian>()
            .map_err(|_| Error::Codec("truncated block header".to_string()))?;
        let raw_len = header
            .read_u32::<LittleEndian>()
            .map_err(|_| Error::Codec("truncated block header".to_string()))?;
        let comp_len = header
            .read_u32::<LittleEndian>()
            .map_err(|_| Error::Codec("truncated block header".to_string()))?;
        self.input = header;

        if self.input.len() < comp_len as usize + 4 {
            return Err(Error::Codec("truncated block payload".to_string()));
        }
        let compressed = &self.input[..comp_len as usize];
        let mut tail = &self.input[comp_len as usize..];
        let expected = tail
            .read_u32::<LittleEndian>()
            .map_err(|_| Error::Codec("truncated block checksum".to_string()))?;
        self.input = tail;

        let mut hasher = crc32fast::Hasher::new();
        hasher.update(compressed);
        if hasher.finalize() != expected {
            return Err(Error::Codec("block checksum mismatch".to_string()));
        }

        self.block = zstd::bulk::decompress(compressed, raw_len as usize)?;
        if self.block.len() != raw_len as usize {
            return Err(Error::Codec("block length mismatch".to_string()));
        }
        self.block_pos = 0;
        self.remaining_in_block = records;
        Ok(true)
    }

    fn next_record(&mut self) -> Result<Option<(Vec<u8>, Option<Vec<u8>>)>> {
        while self.remaining_in_block == 0 {
            if !self.next_block()? {
                return Ok(None);
            }
        }
        let mut frame = &self.block[self.block_pos..];
        let len = frame
            .read_u32::<LittleEndian>()
            .map_err(|_| Error::Codec("truncated record frame".to_string()))?
            as usize;
        if frame.len() < len {
            return Err(Error::Codec("truncated record".to_string()));
        }
        let record: Record = rmp_serde::from_slice(&frame[..len]).map_err(codec_err)?;
        self.block_pos += 4 + len;
        self.remaining_in_block -= 1;
        Ok(Some((
            record.key.into_vec(),
            record.value.map(ByteBuf::into_vec),
        )))
    }
}

impl Iterator for CheckpointReader<'_> {
    type Item = Result<(Vec<u8>, Option<Vec<u8>>)>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        match self.next_record() {
            Ok(Some(record)) => Some(Ok(record)),
            Ok(None) => None,
            Err(err) => {
                self.failed = true;
                Some(Err(err))
            }
        }
    }
}

/// Encode the full contents of `region`, scanned through `snapshot`.
///
/// Shared by every driver's `create_checkpoint`: a full-range iterator with
/// cache-fill disabled feeds the [`CheckpointWriter`].
pub fn write_region_checkpoint(snapshot: &dyn StoreSnapshot, region: &str) -> Result<Vec<u8>> {
    let mut writer = CheckpointWriter::new();
    let mut iter = snapshot.iter(region, Range::all())?;
    let mut valid = iter.first();
    while valid {
        writer.append(iter.key(), Some(iter.value()))?;
        valid = iter.next();
    }
    iter.status()?;
    writer.finish()
}

/// Replace the contents of `region` with `checkpoint`.
///
/// Shared by every driver's `restore_to_checkpoint`: creates the region if
/// absent, deletes all existing keys, then writes the decoded records, all
/// in batches of at most [`BLOCK_RECORDS`] operations. An absent value
/// restores as a zero-length one.
pub fn restore_region_checkpoint(
    store: &dyn StableStore,
    region: &str,
    checkpoint: &[u8],
) -> Result<()> {
    if !store.has_region(region) {
        store.create_region(region)?;
    }

    let mut batch = store.create_batch();
    {
        let snapshot = store.snapshot()?;
        let mut iter = snapshot.iter(region, Range::all())?;
        let mut valid = iter.first();
        while valid {
            batch.delete(region, iter.key());
            if batch.len() >= BLOCK_RECORDS {
                store.write(&batch)?;
                batch.reset();
            }
            valid = iter.next();
        }
        iter.status()?;
    }
    if !batch.is_empty() {
        store.write(&batch)?;
        batch.reset();
    }

    for record in CheckpointReader::new(checkpoint)? {
        let (key, value) = record?;
        batch.put(region, &key, value.as_deref().unwrap_or(&[]));
        if batch.len() >= BLOCK_RECORDS {
            store.write(&batch)?;
            batch.reset();
        }
    }
    if !batch.is_empty() {
        store.write(&batch)?;
    }
    Ok(())
}
