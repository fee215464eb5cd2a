// Copyright (c) Meridian Contributors
// SPDX-License-Identifier: Apache-2.0

//! Namespace metadata and retention configuration.

use std::{fmt, time::Duration};

use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DurationSeconds};

/// The identifier of a namespace.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(transparent)]
pub struct NamespaceId(pub String);

impl NamespaceId {
    /// Returns the identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NamespaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NamespaceId {
    fn from(id: &str) -> Self {
        Self(id.to_owned())
    }
}

/// Retention configuration of a namespace.
///
/// The retention period and the past/future write buffers determine the target
/// ranges of a bootstrap attempt; the block size determines fileset and
/// persistence granularity.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetentionOptions {
    /// How far into the past data is kept.
    #[serde_as(as = "DurationSeconds<u64>")]
    pub retention_period: Duration,
    /// The size of a single storage block.
    #[serde_as(as = "DurationSeconds<u64>")]
    pub block_size: Duration,
    /// How far in the past of "now" writes are still accepted into the
    /// mutable buffer.
    #[serde_as(as = "DurationSeconds<u64>")]
    pub buffer_past: Duration,
    /// How far in the future of "now" writes are accepted.
    #[serde_as(as = "DurationSeconds<u64>")]
    pub buffer_future: Duration,
}

impl Default for RetentionOptions {
    fn default() -> Self {
        Self {
            retention_period: Duration::from_secs(48 * 60 * 60),
            block_size: Duration::from_secs(2 * 60 * 60),
            buffer_past: Duration::from_secs(10 * 60),
            buffer_future: Duration::from_secs(2 * 60),
        }
    }
}

/// Metadata describing a namespace to bootstrap.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamespaceMetadata {
    /// The namespace identifier.
    pub id: NamespaceId,
    /// Retention configuration.
    #[serde(default)]
    pub retention: RetentionOptions,
    /// Whether the namespace maintains a reverse index.
    #[serde(default)]
    pub index_enabled: bool,
}

impl NamespaceMetadata {
    /// Creates metadata with default retention and no index.
    pub fn new(id: impl Into<NamespaceId>) -> Self {
        Self {
            id: id.into(),
            retention: RetentionOptions::default(),
            index_enabled: false,
        }
    }
}
