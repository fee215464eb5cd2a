// Copyright (c) Meridian Contributors
// SPDX-License-Identifier: Apache-2.0

//! The bootstrapper chain and its waterfall reconciliation.
//!
//! Each chain node wraps one [`Source`] and the next [`Bootstrapper`]. A node
//! asks its source what it claims to cover, optionally bootstraps the
//! remainder through the next link in parallel, reads from its own source, and
//! then makes one sequential fallback call for whatever the source claimed but
//! failed to deliver. The parallel and sequential fallback request sets are
//! disjoint by construction; their unfulfilled outcomes are unioned, never
//! re-attempted against each other.

use std::{fmt, sync::Arc};

use async_trait::async_trait;
use meridian_core::ranges::ShardTimeRanges;

use super::{result::BootstrapResult, RunOptions, Strategy};
use crate::errors::BootstrapError;

/// A capability-gated provider of bootstrap data from one origin.
///
/// Sources are stateless across calls: instances may be reused across many
/// bootstrap attempts.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Source: fmt::Debug + Send + Sync {
    /// A short name for logs.
    fn name(&self) -> &'static str;

    /// Whether the source supports `strategy`.
    fn can(&self, strategy: Strategy) -> bool;

    /// The sub-ranges of `requested` this source believes it can supply.
    ///
    /// This is a prediction, not a guarantee: a range reported available may
    /// still fail at read time and come back unfulfilled.
    async fn available(&self, requested: &ShardTimeRanges) -> ShardTimeRanges;

    /// Reads the data for `available`. Per-range failures are accounted on
    /// the result's unfulfilled set; an error aborts the whole attempt.
    async fn read(
        &self,
        available: ShardTimeRanges,
        opts: &RunOptions,
    ) -> Result<BootstrapResult, BootstrapError>;
}

/// One node of the bootstrap chain.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Bootstrapper: fmt::Debug + Send + Sync {
    /// A short name for logs.
    fn name(&self) -> &'static str;

    /// Whether this node's own source supports `strategy`. Neighboring
    /// capabilities are checked explicitly at call sites.
    fn can(&self, strategy: Strategy) -> bool;

    /// Bootstraps `requested`, falling back to the next link for anything
    /// this node's source cannot supply.
    async fn bootstrap(
        &self,
        requested: ShardTimeRanges,
        opts: &RunOptions,
    ) -> Result<BootstrapResult, BootstrapError>;
}

/// The terminal chain node: claims nothing and reports everything it is asked
/// for as unfulfilled.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpBootstrapper;

#[async_trait]
impl Bootstrapper for NoOpBootstrapper {
    fn name(&self) -> &'static str {
        "noop"
    }

    fn can(&self, _strategy: Strategy) -> bool {
        true
    }

    async fn bootstrap(
        &self,
        requested: ShardTimeRanges,
        _opts: &RunOptions,
    ) -> Result<BootstrapResult, BootstrapError> {
        let mut result = BootstrapResult::new();
        result.set_unfulfilled(requested);
        Ok(result)
    }
}

/// A chain node combining a [`Source`] with its fallback.
#[derive(Debug, Clone)]
pub struct SourceBootstrapper {
    source: Arc<dyn Source>,
    next: Arc<dyn Bootstrapper>,
}

impl SourceBootstrapper {
    /// Creates a chain node over `source` falling back to `next`.
    pub fn new(source: Arc<dyn Source>, next: Arc<dyn Bootstrapper>) -> Self {
        Self { source, next }
    }
}

#[async_trait]
impl Bootstrapper for SourceBootstrapper {
    fn name(&self) -> &'static str {
        self.source.name()
    }

    fn can(&self, strategy: Strategy) -> bool {
        self.source.can(strategy)
    }

    async fn bootstrap(
        &self,
        requested: ShardTimeRanges,
        opts: &RunOptions,
    ) -> Result<BootstrapResult, BootstrapError> {
        if requested.is_empty() {
            return Ok(BootstrapResult::new());
        }

        let available = self.source.available(&requested).await;
        let remaining = requested.remove_ranges(&available);
        tracing::debug!(
            source = self.name(),
            available = %available,
            remaining = %remaining,
            "source reported availability"
        );

        // Ranges the source does not claim at all can safely be bootstrapped
        // by the rest of the chain while this source reads, when both sides
        // support it.
        let parallel_next = if !remaining.is_empty()
            && self.can(Strategy::Parallel)
            && self.next.can(Strategy::Parallel)
        {
            let next = Arc::clone(&self.next);
            let next_requested = remaining.clone();
            let next_opts = *opts;
            Some(tokio::spawn(async move {
                next.bootstrap(next_requested, &next_opts).await
            }))
        } else {
            None
        };
        let launched_parallel = parallel_next.is_some();

        let current = self.source.read(available, opts).await;

        // Join the parallel attempt before inspecting errors, so it never
        // outlives this call.
        let parallel_result = match parallel_next {
            Some(handle) => Some(handle.await??),
            None => None,
        };
        let mut merged = current?;

        let mut unfulfilled = merged.take_unfulfilled();
        let first_next_unfulfilled = match parallel_result {
            Some(next_result) => {
                let (shard_results, next_unfulfilled) = next_result.into_parts();
                merged.add_shard_results(shard_results);
                next_unfulfilled
            }
            None => {
                // Nobody has attempted `remaining` yet; it joins the ranges
                // the source claimed but failed to deliver.
                unfulfilled.add_ranges(&remaining);
                ShardTimeRanges::new()
            }
        };

        if unfulfilled.is_empty() {
            merged.set_unfulfilled(first_next_unfulfilled);
            return Ok(merged);
        }

        // Ranges the source claimed but did not deliver are only attempted
        // once the read has actually completed, hence sequentially.
        tracing::debug!(
            source = self.name(),
            unfulfilled = %unfulfilled,
            launched_parallel,
            "falling back to next bootstrapper for unfulfilled ranges"
        );
        let sequential_result = self.next.bootstrap(unfulfilled, opts).await?;
        let (shard_results, mut final_unfulfilled) = sequential_result.into_parts();
        merged.add_shard_results(shard_results);
        // Ranges the parallel attempt already tried and failed on are unioned
        // in, not re-attempted.
        final_unfulfilled.add_ranges(&first_next_unfulfilled);
        merged.set_unfulfilled(final_unfulfilled);
        Ok(merged)
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use meridian_core::{test_utils::shard_ranges, ShardIndex, UnixMillis};

    use super::*;
    use crate::{
        block::{DataBlock, Segment, SeriesId},
        bootstrap::result::ShardResult,
    };

    fn result_with_unfulfilled(unfulfilled: ShardTimeRanges) -> BootstrapResult {
        let mut result = BootstrapResult::new();
        result.set_unfulfilled(unfulfilled);
        result
    }

    fn result_with_data(shard: u32) -> BootstrapResult {
        let mut shard_result = ShardResult::new();
        shard_result.add_series_block(
            SeriesId::from_label("cpu.user"),
            UnixMillis(0),
            DataBlock::InMemory(Segment::new(Bytes::from_static(b"payload"), 7)),
        );
        let mut result = BootstrapResult::new();
        result.add_shard_result(ShardIndex(shard), shard_result);
        result
    }

    fn mock_source(parallel: bool) -> MockSource {
        let mut source = MockSource::new();
        source.expect_name().return_const("mock-source");
        source
            .expect_can()
            .returning(move |strategy| strategy == Strategy::Sequential || parallel);
        source
    }

    #[tokio::test]
    async fn empty_request_short_circuits_without_touching_the_source() {
        // No expectations are set: any source call panics the test.
        let source = MockSource::new();
        let node = SourceBootstrapper::new(Arc::new(source), Arc::new(NoOpBootstrapper));

        let result = node
            .bootstrap(ShardTimeRanges::new(), &RunOptions::default())
            .await
            .expect("empty bootstrap succeeds");
        assert!(result.unfulfilled().is_empty());
        assert!(result.shard_results().is_empty());
    }

    #[tokio::test]
    async fn noop_reports_everything_unfulfilled() {
        let requested = shard_ranges(&[(5, &[(0, 100)])]);
        let result = NoOpBootstrapper
            .bootstrap(requested.clone(), &RunOptions::default())
            .await
            .expect("noop bootstrap succeeds");
        assert_eq!(result.unfulfilled(), &requested);
    }

    // Scenario: the source claims [0, 60) of a requested [0, 100) and reads it
    // fully; the remainder goes to the next link sequentially because the
    // source does not support parallelism.
    #[tokio::test]
    async fn unclaimed_remainder_falls_back_sequentially() {
        let requested = shard_ranges(&[(5, &[(0, 100)])]);
        let available = shard_ranges(&[(5, &[(0, 60)])]);
        let remainder = shard_ranges(&[(5, &[(60, 100)])]);

        let mut source = mock_source(false);
        source
            .expect_available()
            .times(1)
            .returning(move |_| available.clone());
        source
            .expect_read()
            .times(1)
            .returning(|_, _| Ok(result_with_data(5)));

        let mut next = MockBootstrapper::new();
        let expected = remainder.clone();
        let returned = remainder.clone();
        next.expect_bootstrap()
            .withf(move |req, _| *req == expected)
            .times(1)
            .returning(move |_, _| Ok(result_with_unfulfilled(returned.clone())));

        let node = SourceBootstrapper::new(Arc::new(source), Arc::new(next));
        let result = node
            .bootstrap(requested, &RunOptions::default())
            .await
            .expect("bootstrap succeeds");

        assert_eq!(result.unfulfilled(), &remainder);
        assert!(result.shard_results().contains_key(&ShardIndex(5)));
    }

    // Scenario: the source claims [0, 60) but fails on [20, 40) at read time;
    // the next link sees the union of the failed sub-range and the unclaimed
    // remainder in a single sequential call, and fulfills all of it.
    #[tokio::test]
    async fn read_failures_join_the_sequential_fallback() {
        let requested = shard_ranges(&[(5, &[(0, 100)])]);
        let available = shard_ranges(&[(5, &[(0, 60)])]);
        let expected_fallback = shard_ranges(&[(5, &[(20, 40), (60, 100)])]);

        let mut source = mock_source(false);
        source
            .expect_available()
            .times(1)
            .returning(move |_| available.clone());
        source.expect_read().times(1).returning(|_, _| {
            Ok(result_with_unfulfilled(shard_ranges(&[(5, &[(20, 40)])])))
        });

        let mut next = MockBootstrapper::new();
        next.expect_bootstrap()
            .withf(move |req, _| *req == expected_fallback)
            .times(1)
            .returning(|_, _| Ok(BootstrapResult::new()));

        let node = SourceBootstrapper::new(Arc::new(source), Arc::new(next));
        let result = node
            .bootstrap(requested, &RunOptions::default())
            .await
            .expect("bootstrap succeeds");

        assert!(result.unfulfilled().is_empty());
    }

    // Scenario: both sides support parallelism. The unclaimed remainder is
    // bootstrapped concurrently with the source's read; the read's own failed
    // sub-range triggers a second, sequential call; the final unfulfilled set
    // is the union of both attempts' failures.
    #[tokio::test]
    async fn parallel_and_sequential_attempts_are_disjoint_and_unioned() {
        let requested = shard_ranges(&[(5, &[(0, 100)])]);
        let available = shard_ranges(&[(5, &[(0, 60)])]);

        let mut source = mock_source(true);
        source
            .expect_available()
            .times(1)
            .returning(move |_| available.clone());
        source.expect_read().times(1).returning(|_, _| {
            Ok(result_with_unfulfilled(shard_ranges(&[(5, &[(10, 20)])])))
        });

        let mut next = MockBootstrapper::new();
        next.expect_can().return_const(true);
        // Parallel attempt: exactly the unclaimed remainder, failing on
        // [90, 100).
        let parallel_requested = shard_ranges(&[(5, &[(60, 100)])]);
        next.expect_bootstrap()
            .withf(move |req, _| *req == parallel_requested)
            .times(1)
            .returning(|_, _| {
                Ok(result_with_unfulfilled(shard_ranges(&[(5, &[(90, 100)])])))
            });
        // Sequential attempt: exactly the source's failed sub-range, failing
        // on [10, 12).
        let sequential_requested = shard_ranges(&[(5, &[(10, 20)])]);
        next.expect_bootstrap()
            .withf(move |req, _| *req == sequential_requested)
            .times(1)
            .returning(|_, _| {
                Ok(result_with_unfulfilled(shard_ranges(&[(5, &[(10, 12)])])))
            });

        let node = SourceBootstrapper::new(Arc::new(source), Arc::new(next));
        let result = node
            .bootstrap(requested, &RunOptions::default())
            .await
            .expect("bootstrap succeeds");

        assert_eq!(
            result.unfulfilled(),
            &shard_ranges(&[(5, &[(10, 12), (90, 100)])]),
        );
    }

    // When the source claims nothing, the whole request flows to the next
    // link and the final unfulfilled set is whatever the chain could not
    // deliver: conservativeness.
    #[tokio::test]
    async fn unclaimed_request_is_never_dropped() {
        let requested = shard_ranges(&[(1, &[(0, 50)]), (2, &[(0, 50)])]);

        let mut source = mock_source(false);
        source
            .expect_available()
            .times(1)
            .returning(|_| ShardTimeRanges::new());
        source
            .expect_read()
            .times(1)
            .returning(|_, _| Ok(BootstrapResult::new()));

        let node = SourceBootstrapper::new(Arc::new(source), Arc::new(NoOpBootstrapper));
        let result = node
            .bootstrap(requested.clone(), &RunOptions::default())
            .await
            .expect("bootstrap succeeds");

        assert_eq!(result.unfulfilled(), &requested);
    }

    #[tokio::test]
    async fn fatal_read_error_aborts_the_attempt() {
        let requested = shard_ranges(&[(5, &[(0, 100)])]);

        let mut source = mock_source(false);
        source
            .expect_available()
            .returning(|requested| requested.clone());
        source.expect_read().returning(|_, _| {
            Err(BootstrapError::Internal(anyhow::anyhow!(
                "cannot open filesystem root"
            )))
        });

        let node = SourceBootstrapper::new(Arc::new(source), Arc::new(NoOpBootstrapper));
        let error = node
            .bootstrap(requested, &RunOptions::default())
            .await
            .expect_err("read error is fatal");
        assert!(matches!(error, BootstrapError::Internal(_)));
    }

    #[tokio::test]
    async fn fatal_error_from_parallel_attempt_aborts_the_attempt() {
        let requested = shard_ranges(&[(5, &[(0, 100)])]);
        let available = shard_ranges(&[(5, &[(0, 60)])]);

        let mut source = mock_source(true);
        source
            .expect_available()
            .returning(move |_| available.clone());
        source
            .expect_read()
            .returning(|_, _| Ok(BootstrapResult::new()));

        let mut next = MockBootstrapper::new();
        next.expect_can().return_const(true);
        next.expect_bootstrap().returning(|_, _| {
            Err(BootstrapError::Internal(anyhow::anyhow!(
                "no admin session"
            )))
        });

        let node = SourceBootstrapper::new(Arc::new(source), Arc::new(next));
        let error = node
            .bootstrap(requested, &RunOptions::default())
            .await
            .expect_err("next error is fatal");
        assert!(matches!(error, BootstrapError::Internal(_)));
    }
}
