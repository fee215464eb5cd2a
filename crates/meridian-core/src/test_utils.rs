// Copyright (c) Meridian Contributors
// SPDX-License-Identifier: Apache-2.0

//! Test helpers shared by the workspace's unit tests.

use std::time::Duration;

use crate::{
    metadata::{NamespaceMetadata, RetentionOptions},
    ranges::{RangeSet, ShardTimeRanges, TimeRange},
    ShardIndex, UnixMillis,
};

/// A fixed "now" used by deterministic target-range tests.
pub fn fixed_now() -> UnixMillis {
    UnixMillis(1_700_000_000_000)
}

/// Shorthand for a range over raw millisecond bounds.
pub fn range(start: i64, end: i64) -> TimeRange {
    TimeRange::new(UnixMillis(start), UnixMillis(end))
}

/// Builds a [`RangeSet`] from raw millisecond bounds.
pub fn range_set(ranges: &[(i64, i64)]) -> RangeSet {
    ranges.iter().map(|&(s, e)| range(s, e)).collect()
}

/// Builds a [`ShardTimeRanges`] from per-shard raw millisecond bounds.
pub fn shard_ranges(shards: &[(u32, &[(i64, i64)])]) -> ShardTimeRanges {
    let mut map = ShardTimeRanges::new();
    for &(shard, ranges) in shards {
        for &(start, end) in ranges {
            map.add_shard_range(ShardIndex(shard), range(start, end));
        }
    }
    map
}

/// A namespace with small, round retention numbers for readable tests: 10s
/// blocks, 60s retention.
pub fn test_namespace() -> NamespaceMetadata {
    NamespaceMetadata {
        id: "test-ns".into(),
        retention: RetentionOptions {
            retention_period: Duration::from_secs(60),
            block_size: Duration::from_secs(10),
            buffer_past: Duration::from_secs(5),
            buffer_future: Duration::from_secs(2),
        },
        index_enabled: false,
    }
}
