// Copyright (c) Meridian Contributors
// SPDX-License-Identifier: Apache-2.0

//! Error taxonomies for the bootstrap pipeline.
//!
//! Errors returned from these types are fatal: they abort the whole bootstrap
//! attempt. Partial failures (a corrupt fileset, one failed peer fetch) are
//! never surfaced as errors; they are accounted as unfulfilled ranges on the
//! bootstrap result instead.

use meridian_core::{metadata::NamespaceId, ranges::TimeRange, ShardIndex, UnixMillis};

/// Type used for internal errors.
pub type InternalError = anyhow::Error;

/// Errors from the local fileset store.
#[derive(Debug, thiserror::Error)]
pub enum FilesetError {
    /// The store root itself cannot be accessed. Fatal: no fileset can be
    /// attempted at all.
    #[error("the local fileset store is unavailable: {0}")]
    Unavailable(String),
    /// A single fileset failed digest validation. Recoverable per fileset.
    #[error("fileset for {shard} at {block_start} failed validation: {reason}")]
    Corrupt {
        shard: ShardIndex,
        block_start: UnixMillis,
        reason: String,
    },
    /// An I/O error on a single fileset. Recoverable per fileset.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl FilesetError {
    /// True iff the error aborts the whole read rather than a single fileset.
    pub fn is_fatal(&self) -> bool {
        matches!(self, FilesetError::Unavailable(_))
    }
}

/// Errors from the admin RPC session used for peer fetches.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// No peer replica could serve the requested shard range.
    #[error("no peer available for {shard} over {range}")]
    NoAvailablePeer { shard: ShardIndex, range: TimeRange },
    /// The session has been closed and cannot issue further fetches.
    #[error("the admin session is closed")]
    SessionClosed,
    #[error(transparent)]
    Internal(#[from] InternalError),
}

/// Errors from the persistence manager.
#[derive(Debug, thiserror::Error)]
pub enum PersistError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Internal(#[from] InternalError),
}

/// Errors from the block-retriever manager.
#[derive(Debug, thiserror::Error)]
pub enum RetrieveError {
    /// The manager has no retriever registered for the namespace.
    #[error("no block retriever registered for namespace {0}")]
    UnknownNamespace(NamespaceId),
    #[error(transparent)]
    Internal(#[from] InternalError),
}

/// Fatal errors that abort an entire bootstrap attempt.
#[derive(Debug, thiserror::Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Fileset(#[from] FilesetError),
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error(transparent)]
    Retrieve(#[from] RetrieveError),
    /// A spawned bootstrap task panicked or was aborted.
    #[error("bootstrap task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
    #[error(transparent)]
    Internal(#[from] InternalError),
}
