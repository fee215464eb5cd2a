// Copyright (c) Meridian Contributors
// SPDX-License-Identifier: Apache-2.0

//! Core value types for Meridian.
//!
//! Everything in this crate is a pure value: shard indices, instants, time-range
//! sets, and namespace metadata. There is no I/O and no async code here; the
//! bootstrap pipeline in `meridian-service` builds on these types and relies on
//! the range algebra being exact.

use std::{
    fmt,
    ops::{Add, Sub},
    time::{Duration, SystemTime, UNIX_EPOCH},
};

use serde::{Deserialize, Serialize};

pub mod metadata;
pub mod ranges;

/// Utility constructors for tests.
///
/// These are available with the "test-utils" feature.
#[cfg(feature = "test-utils")]
pub mod test_utils;

/// The index of a shard.
///
/// Shards are fixed partitions of the keyspace; a node owns zero or more of
/// them and bootstraps each owned shard independently.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(transparent)]
pub struct ShardIndex(pub u32);

impl fmt::Display for ShardIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "shard-{}", self.0)
    }
}

impl From<u32> for ShardIndex {
    fn from(index: u32) -> Self {
        Self(index)
    }
}

/// An instant expressed as milliseconds since the Unix epoch.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[repr(transparent)]
pub struct UnixMillis(pub i64);

impl UnixMillis {
    /// Returns the current instant.
    pub fn now() -> Self {
        let since_epoch = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("system clock is set after the Unix epoch");
        Self(i64::try_from(since_epoch.as_millis()).expect("system clock fits in i64 millis"))
    }

    /// Creates an instant from a raw millisecond count.
    pub const fn from_millis(millis: i64) -> Self {
        Self(millis)
    }

    /// Returns the raw millisecond count.
    pub const fn as_millis(self) -> i64 {
        self.0
    }

    /// Rounds the instant down to the nearest multiple of `block_size`.
    ///
    /// Uses euclidean division so that instants before the epoch are still
    /// rounded towards negative infinity.
    pub fn truncate_to(self, block_size: Duration) -> Self {
        let size = block_size.as_millis() as i64;
        assert!(size > 0, "block size must be non-zero");
        Self(self.0.div_euclid(size) * size)
    }
}

impl Add<Duration> for UnixMillis {
    type Output = Self;

    fn add(self, rhs: Duration) -> Self {
        Self(self.0 + rhs.as_millis() as i64)
    }
}

impl Sub<Duration> for UnixMillis {
    type Output = Self;

    fn sub(self, rhs: Duration) -> Self {
        Self(self.0 - rhs.as_millis() as i64)
    }
}

impl fmt::Display for UnixMillis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}ms", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_rounds_down() {
        let block = Duration::from_millis(100);
        assert_eq!(UnixMillis(250).truncate_to(block), UnixMillis(200));
        assert_eq!(UnixMillis(200).truncate_to(block), UnixMillis(200));
        assert_eq!(UnixMillis(-50).truncate_to(block), UnixMillis(-100));
    }

    #[test]
    fn instant_arithmetic() {
        let ts = UnixMillis(1_000);
        assert_eq!(ts + Duration::from_millis(500), UnixMillis(1_500));
        assert_eq!(ts - Duration::from_millis(500), UnixMillis(500));
    }

    #[test]
    fn shard_index_display() {
        assert_eq!(ShardIndex(7).to_string(), "shard-7");
    }
}
