// Copyright (c) Meridian Contributors
// SPDX-License-Identifier: Apache-2.0

//! Narrow contract over the local fileset store.
//!
//! A fileset is the immutable on-disk artifact holding one shard's data for
//! one block-size interval. Its binary format, reader, and writer live in the
//! storage layer; the bootstrap core only needs to know whether a fileset
//! looks complete and to stream its entries back.

use meridian_core::{metadata::NamespaceId, ShardIndex, UnixMillis};

use crate::{
    block::{Segment, SeriesId},
    errors::FilesetError,
};

/// Reads the entries of one opened fileset.
pub trait FilesetReader: Send {
    /// Reads the next `(series, segment)` entry, or `None` once exhausted.
    fn read_entry(&mut self) -> Result<Option<(SeriesId, Segment)>, FilesetError>;

    /// Validates the digest over everything read so far.
    ///
    /// Validation can fail even when every individual entry read cleanly,
    /// which is why the filesystem source must attempt a full read even for
    /// filesets that looked complete on inspection.
    fn validate(&self) -> Result<(), FilesetError>;

    /// Closes the reader, releasing any underlying file handles.
    fn close(&mut self) -> Result<(), FilesetError>;
}

/// Inspects and opens local filesets.
pub trait FilesetStore: std::fmt::Debug + Send + Sync {
    /// True iff the fileset for `(namespace, shard, block_start)` is
    /// structurally complete: checkpoint, digest, and info files present with
    /// self-consistent checksums. Does not read series data, and a `true` here
    /// is a prediction only; the fileset may still fail validation on read.
    fn fileset_complete(
        &self,
        namespace: &NamespaceId,
        shard: ShardIndex,
        block_start: UnixMillis,
    ) -> bool;

    /// Opens the fileset for reading.
    fn open(
        &self,
        namespace: &NamespaceId,
        shard: ShardIndex,
        block_start: UnixMillis,
    ) -> Result<Box<dyn FilesetReader>, FilesetError>;
}
