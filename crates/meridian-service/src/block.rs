// Copyright (c) Meridian Contributors
// SPDX-License-Identifier: Apache-2.0

//! Series identifiers and data blocks.
//!
//! A block fetched during bootstrap is either resident in memory as an encoded
//! [`Segment`], or a lightweight retrievable stub left behind once the segment
//! has been durably flushed. The stub keeps only the length, the checksum, and
//! a handle to the lazy block retriever, which bounds bootstrap memory to the
//! data still in flight rather than the full bootstrapped range.

use std::{collections::BTreeMap, fmt, sync::Arc};

use bytes::Bytes;

use meridian_core::UnixMillis;

use crate::errors::RetrieveError;

/// The identifier of a single time series.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct SeriesId(pub Bytes);

impl SeriesId {
    /// Creates an identifier from a string label.
    pub fn from_label(label: &str) -> Self {
        Self(Bytes::copy_from_slice(label.as_bytes()))
    }
}

impl fmt::Display for SeriesId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match std::str::from_utf8(&self.0) {
            Ok(label) => f.write_str(label),
            Err(_) => write!(f, "{:02x?}", &self.0[..]),
        }
    }
}

/// An encoded block payload together with the codec's checksum.
///
/// The encoding itself is opaque to the bootstrap core; the checksum travels
/// with the payload from whichever codec produced it (disk or wire).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    /// The encoded payload.
    pub data: Bytes,
    /// Checksum over the payload, computed by the producing codec.
    pub checksum: u32,
}

impl Segment {
    /// Creates a segment.
    pub fn new(data: Bytes, checksum: u32) -> Self {
        Self { data, checksum }
    }

    /// The payload length in bytes.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// True iff the payload is empty.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Lazily reloads persisted block segments.
///
/// The bootstrap core never calls this itself; it only hands the retriever out
/// inside [retrievable stubs](RetrievableBlock) so that flushed blocks stay
/// servable without staying resident.
pub trait BlockRetriever: fmt::Debug + Send + Sync {
    /// Streams the persisted segment for `series` at `block_start` back into
    /// memory.
    fn stream_block(
        &self,
        series: &SeriesId,
        block_start: UnixMillis,
    ) -> Result<Segment, RetrieveError>;
}

/// A stub standing in for a durably persisted block.
#[derive(Debug, Clone)]
pub struct RetrievableBlock {
    /// Length of the persisted segment in bytes.
    pub len: usize,
    /// Checksum of the persisted segment.
    pub checksum: u32,
    /// Handle for lazily reloading the segment.
    pub retriever: Arc<dyn BlockRetriever>,
}

/// A single block of series data covering one block-size interval.
#[derive(Debug, Clone)]
pub enum DataBlock {
    /// The encoded segment is resident in memory.
    InMemory(Segment),
    /// The segment has been persisted and replaced by a stub.
    Retrievable(RetrievableBlock),
}

impl DataBlock {
    /// True iff the block has been replaced by a retrievable stub.
    pub fn is_retrievable(&self) -> bool {
        matches!(self, DataBlock::Retrievable(_))
    }

    /// The encoded length in bytes.
    pub fn len(&self) -> usize {
        match self {
            DataBlock::InMemory(segment) => segment.len(),
            DataBlock::Retrievable(block) => block.len,
        }
    }

    /// True iff the block holds no data.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The codec checksum of the block payload.
    pub fn checksum(&self) -> u32 {
        match self {
            DataBlock::InMemory(segment) => segment.checksum,
            DataBlock::Retrievable(block) => block.checksum,
        }
    }

    /// Returns the resident segment, if the block has not been flushed.
    pub fn segment(&self) -> Option<&Segment> {
        match self {
            DataBlock::InMemory(segment) => Some(segment),
            DataBlock::Retrievable(_) => None,
        }
    }
}

/// All bootstrapped blocks of one series, keyed by block start.
#[derive(Debug, Clone, Default)]
pub struct SeriesBlocks {
    blocks: BTreeMap<UnixMillis, DataBlock>,
}

impl SeriesBlocks {
    /// Inserts `block` at `block_start`, replacing any previous block there.
    pub fn insert(&mut self, block_start: UnixMillis, block: DataBlock) {
        self.blocks.insert(block_start, block);
    }

    /// Returns the block at `block_start`, if any.
    pub fn get(&self, block_start: UnixMillis) -> Option<&DataBlock> {
        self.blocks.get(&block_start)
    }

    /// Returns a mutable reference to the block at `block_start`, if any.
    pub fn get_mut(&mut self, block_start: UnixMillis) -> Option<&mut DataBlock> {
        self.blocks.get_mut(&block_start)
    }

    /// Iterates `(block_start, block)` pairs in time order.
    pub fn iter(&self) -> impl Iterator<Item = (UnixMillis, &DataBlock)> {
        self.blocks.iter().map(|(start, block)| (*start, block))
    }

    /// Merges another series' blocks into this one; `other` wins on conflict.
    pub fn merge(&mut self, other: SeriesBlocks) {
        self.blocks.extend(other.blocks);
    }

    /// The number of blocks held.
    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    /// True iff no blocks are held.
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }
}

impl FromIterator<(UnixMillis, DataBlock)> for SeriesBlocks {
    fn from_iter<I: IntoIterator<Item = (UnixMillis, DataBlock)>>(iter: I) -> Self {
        Self {
            blocks: iter.into_iter().collect(),
        }
    }
}
