// Copyright (c) Meridian Contributors
// SPDX-License-Identifier: Apache-2.0

//! The peer bootstrap source.
//!
//! Fetches shard data from replica peers over the admin session, one unit per
//! `(shard, contiguous range)`, through a bounded worker pool. In incremental
//! mode every fetched unit is handed to a single flush consumer over a bounded
//! channel: the pool bounds fetch concurrency, the channel bounds resident
//! fetched-but-unflushed data, and the single consumer serializes durable
//! writes. Once a unit's blocks are durably persisted they are replaced by
//! retrievable stubs, so peak memory is roughly one block of data per
//! in-flight shard rather than the full bootstrapped range.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures::{stream, StreamExt};
use meridian_core::{
    metadata::NamespaceMetadata,
    ranges::{ShardTimeRanges, TimeRange},
    ShardIndex, UnixMillis,
};
use tokio::sync::mpsc;

use super::{
    bootstrapper::Source,
    result::{BootstrapResult, ShardResult},
    RunOptions, Strategy,
};
use crate::{
    block::{BlockRetriever, DataBlock, RetrievableBlock, SeriesId},
    config::BootstrapConfig,
    errors::{BootstrapError, PersistError},
    metrics::BootstrapMetricSet,
    persist::PersistManager,
    retriever::{BlockRetrieverManager, DatabaseBlockRetriever},
    session::AdminSession,
};

/// Bootstrap source over the cluster's replica peers.
#[derive(Debug)]
pub struct PeersSource {
    session: Arc<dyn AdminSession>,
    persist: Arc<dyn PersistManager>,
    retrievers: Arc<dyn BlockRetrieverManager>,
    namespace: NamespaceMetadata,
    config: BootstrapConfig,
    metrics: BootstrapMetricSet,
}

/// A fetched unit in flight between the worker pool and the flush consumer.
///
/// Ownership transfers exactly once: the fetch worker enqueues, the consumer
/// dequeues, flushes, and merges into the shared result.
struct FetchedUnit {
    shard: ShardIndex,
    range: TimeRange,
    result: ShardResult,
}

impl PeersSource {
    /// Creates a peer source for `namespace`.
    pub fn new(
        session: Arc<dyn AdminSession>,
        persist: Arc<dyn PersistManager>,
        retrievers: Arc<dyn BlockRetrieverManager>,
        namespace: NamespaceMetadata,
        config: BootstrapConfig,
        metrics: BootstrapMetricSet,
    ) -> Self {
        Self {
            session,
            persist,
            retrievers,
            namespace,
            config,
            metrics,
        }
    }
}

#[async_trait]
impl Source for PeersSource {
    fn name(&self) -> &'static str {
        "peers"
    }

    fn can(&self, _strategy: Strategy) -> bool {
        // Peer fetches and a neighboring source's local disk reads touch
        // disjoint resources.
        true
    }

    async fn available(&self, requested: &ShardTimeRanges) -> ShardTimeRanges {
        // Peers are assumed able to serve any range; the chain's
        // reconciliation discovers otherwise.
        requested.clone()
    }

    async fn read(
        &self,
        available: ShardTimeRanges,
        opts: &RunOptions,
    ) -> Result<BootstrapResult, BootstrapError> {
        let units: Vec<(ShardIndex, TimeRange)> = available
            .iter()
            .flat_map(|(shard, ranges)| ranges.iter().map(move |range| (shard, *range)))
            .collect();
        if units.is_empty() {
            return Ok(BootstrapResult::new());
        }

        let concurrency = if opts.incremental {
            self.config.incremental_fetch_concurrency
        } else {
            self.config.fetch_concurrency
        }
        .get();
        tracing::info!(
            meridian.namespace = %self.namespace.id,
            units = units.len(),
            concurrency,
            incremental = opts.incremental,
            "fetching bootstrap blocks from peers"
        );

        let shared = Arc::new(Mutex::new(BootstrapResult::new()));

        // In incremental mode the retriever is resolved up front: it is
        // embedded in every stub the flush consumer leaves behind.
        let (flush_tx, flush_task, retriever) = if opts.incremental {
            let retriever = self.retrievers.retriever(&self.namespace)?;
            let (tx, rx) = mpsc::channel::<FetchedUnit>(self.config.flush_queue_depth.get());
            let worker = FlushWorker {
                persist: Arc::clone(&self.persist),
                retriever: Arc::clone(&retriever),
                namespace: self.namespace.clone(),
                shared: Arc::clone(&shared),
                metrics: self.metrics.clone(),
            };
            (
                Some(tx),
                Some(tokio::spawn(worker.run(rx))),
                Some(retriever),
            )
        } else {
            (None, None, None)
        };

        stream::iter(units)
            .for_each_concurrent(concurrency, |(shard, range)| {
                let shared = Arc::clone(&shared);
                let flush_tx = flush_tx.clone();
                async move {
                    match self
                        .session
                        .fetch_bootstrap_blocks(&self.namespace.id, shard, range)
                        .await
                    {
                        Ok(result) => {
                            if let Some(tx) = flush_tx {
                                // Bounded enqueue: blocks here when the flush
                                // consumer falls behind.
                                if tx
                                    .send(FetchedUnit {
                                        shard,
                                        range,
                                        result,
                                    })
                                    .await
                                    .is_err()
                                {
                                    tracing::error!(
                                        meridian.shard = %shard,
                                        "flush consumer exited before fetches completed"
                                    );
                                }
                            } else {
                                shared
                                    .lock()
                                    .expect("result lock is not poisoned")
                                    .add_shard_result(shard, result);
                            }
                        }
                        Err(error) => {
                            tracing::warn!(
                                meridian.namespace = %self.namespace.id,
                                meridian.shard = %shard,
                                range = %range,
                                ?error,
                                "peer fetch failed; marking range unfulfilled"
                            );
                            self.metrics.peer_fetch_errors_total.inc();
                            shared
                                .lock()
                                .expect("result lock is not poisoned")
                                .unfulfilled_mut()
                                .add_shard_range(shard, range);
                        }
                    }
                }
            })
            .await;

        // Close the channel so the consumer drains its backlog and exits.
        drop(flush_tx);
        if let Some(task) = flush_task {
            task.await?;
        }

        let result = Arc::try_unwrap(shared)
            .map_err(|_| {
                BootstrapError::Internal(anyhow::anyhow!(
                    "bootstrap result still shared after all workers finished"
                ))
            })?
            .into_inner()
            .expect("result lock is not poisoned");

        if let Some(retriever) = retriever {
            let shards: Vec<ShardIndex> = result.shards().collect();
            if !shards.is_empty() {
                // Warm the shard indices so the first read of a retrievable
                // block does not pay a cold-cache penalty.
                retriever.cache_shard_indices(&shards)?;
            }
        }
        Ok(result)
    }
}

/// The single flush consumer of an incremental peer read.
struct FlushWorker {
    persist: Arc<dyn PersistManager>,
    retriever: Arc<dyn DatabaseBlockRetriever>,
    namespace: NamespaceMetadata,
    shared: Arc<Mutex<BootstrapResult>>,
    metrics: BootstrapMetricSet,
}

impl FlushWorker {
    async fn run(self, mut queue: mpsc::Receiver<FetchedUnit>) {
        while let Some(unit) = queue.recv().await {
            let FetchedUnit {
                shard,
                range,
                mut result,
            } = unit;
            for block_start in range.block_starts(self.namespace.retention.block_size) {
                self.flush_block(shard, block_start, &mut result);
            }
            self.shared
                .lock()
                .expect("result lock is not poisoned")
                .add_shard_result(shard, result);
        }
    }

    /// Persists every series' block at `block_start` through one prepared
    /// persist, replacing flushed blocks with retrievable stubs.
    ///
    /// A flush failure is logged and counted but not marked unfulfilled: the
    /// data was fetched and remains in the in-memory result for this run, it
    /// just was not made durable. See DESIGN.md for why this asymmetry is
    /// kept.
    fn flush_block(&self, shard: ShardIndex, block_start: UnixMillis, result: &mut ShardResult) {
        let to_flush: Vec<SeriesId> = result
            .series()
            .iter()
            .filter(|(_, blocks)| {
                blocks
                    .get(block_start)
                    .is_some_and(|block| !block.is_retrievable())
            })
            .map(|(series, _)| series.clone())
            .collect();
        if to_flush.is_empty() {
            return;
        }

        let flushed = (|| -> Result<(), PersistError> {
            let mut prepared = self
                .persist
                .prepare(&self.namespace.id, shard, block_start)?;
            for series in &to_flush {
                let segment = result.series()[series]
                    .get(block_start)
                    .and_then(DataBlock::segment)
                    .expect("series was selected for holding an in-memory block");
                prepared.persist(series, segment)?;
            }
            prepared.close()
        })();

        match flushed {
            Ok(()) => {
                for series in to_flush {
                    let blocks = result
                        .series_mut()
                        .get_mut(&series)
                        .expect("series still present after flush");
                    let Some(block) = blocks.get_mut(block_start) else {
                        continue;
                    };
                    *block = DataBlock::Retrievable(RetrievableBlock {
                        len: block.len(),
                        checksum: block.checksum(),
                        retriever: Arc::clone(&self.retriever) as Arc<dyn BlockRetriever>,
                    });
                }
            }
            Err(error) => {
                tracing::error!(
                    meridian.namespace = %self.namespace.id,
                    meridian.shard = %shard,
                    meridian.block_start = %block_start,
                    ?error,
                    "incremental flush failed; block stays in memory and was not made durable"
                );
                self.metrics.flush_errors_total.inc();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use bytes::Bytes;
    use meridian_core::{
        metadata::NamespaceId,
        test_utils::{range, shard_ranges, test_namespace},
    };

    use super::*;
    use crate::{
        block::Segment,
        errors::{RetrieveError, SessionError},
        persist::PreparedPersist,
        session::MockAdminSession,
    };

    fn segment(payload: &'static [u8]) -> Segment {
        Segment::new(Bytes::from_static(payload), 0xfeed)
    }

    /// Shard result with one series holding in-memory blocks at the given
    /// block starts.
    fn fetched_result(series: &str, block_starts: &[i64]) -> ShardResult {
        let mut result = ShardResult::new();
        for &start in block_starts {
            result.add_series_block(
                SeriesId::from_label(series),
                UnixMillis(start),
                DataBlock::InMemory(segment(b"encoded-block")),
            );
        }
        result
    }

    /// Persistence manager recording prepare/persist/close cycles, with
    /// optional injected failure per block start.
    #[derive(Debug, Default)]
    struct RecordingPersistManager {
        prepares: Mutex<Vec<(ShardIndex, UnixMillis)>>,
        closes: Arc<AtomicUsize>,
        persists: Arc<AtomicUsize>,
        fail_block_starts: Vec<UnixMillis>,
    }

    impl PersistManager for RecordingPersistManager {
        fn prepare(
            &self,
            _namespace: &NamespaceId,
            shard: ShardIndex,
            block_start: UnixMillis,
        ) -> Result<Box<dyn PreparedPersist>, PersistError> {
            if self.fail_block_starts.contains(&block_start) {
                return Err(PersistError::Internal(anyhow::anyhow!(
                    "disk full while preparing"
                )));
            }
            self.prepares
                .lock()
                .expect("lock is not poisoned")
                .push((shard, block_start));
            Ok(Box::new(RecordingPersist {
                closes: Arc::clone(&self.closes),
                persists: Arc::clone(&self.persists),
            }))
        }
    }

    struct RecordingPersist {
        closes: Arc<AtomicUsize>,
        persists: Arc<AtomicUsize>,
    }

    impl PreparedPersist for RecordingPersist {
        fn persist(&mut self, _series: &SeriesId, _segment: &Segment) -> Result<(), PersistError> {
            self.persists.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn close(&mut self) -> Result<(), PersistError> {
            self.closes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[derive(Debug, Default)]
    struct FakeRetriever {
        cached: Mutex<Vec<Vec<ShardIndex>>>,
    }

    impl BlockRetriever for FakeRetriever {
        fn stream_block(
            &self,
            _series: &SeriesId,
            _block_start: UnixMillis,
        ) -> Result<Segment, RetrieveError> {
            Ok(segment(b"reloaded"))
        }
    }

    impl DatabaseBlockRetriever for FakeRetriever {
        fn cache_shard_indices(&self, shards: &[ShardIndex]) -> Result<(), RetrieveError> {
            self.cached
                .lock()
                .expect("lock is not poisoned")
                .push(shards.to_vec());
            Ok(())
        }
    }

    #[derive(Debug)]
    struct FakeRetrieverManager {
        retriever: Arc<FakeRetriever>,
    }

    impl BlockRetrieverManager for FakeRetrieverManager {
        fn retriever(
            &self,
            _namespace: &NamespaceMetadata,
        ) -> Result<Arc<dyn DatabaseBlockRetriever>, RetrieveError> {
            Ok(Arc::clone(&self.retriever) as Arc<dyn DatabaseBlockRetriever>)
        }
    }

    struct Fixture {
        source: PeersSource,
        persist: Arc<RecordingPersistManager>,
        retriever: Arc<FakeRetriever>,
    }

    fn fixture(session: MockAdminSession, persist: RecordingPersistManager) -> Fixture {
        let persist = Arc::new(persist);
        let retriever = Arc::new(FakeRetriever::default());
        let source = PeersSource::new(
            Arc::new(session),
            Arc::clone(&persist) as Arc<dyn PersistManager>,
            Arc::new(FakeRetrieverManager {
                retriever: Arc::clone(&retriever),
            }),
            test_namespace(),
            BootstrapConfig::default(),
            BootstrapMetricSet::new_unregistered(),
        );
        Fixture {
            source,
            persist,
            retriever,
        }
    }

    #[tokio::test]
    async fn available_claims_the_full_request() {
        let session = MockAdminSession::new();
        let fixture = fixture(session, RecordingPersistManager::default());
        let requested = shard_ranges(&[(1, &[(0, 10_000)]), (9, &[(0, 30_000)])]);
        assert_eq!(fixture.source.available(&requested).await, requested);
    }

    #[tokio::test]
    async fn failed_units_are_unfulfilled_without_failing_siblings() {
        let mut session = MockAdminSession::new();
        session
            .expect_fetch_bootstrap_blocks()
            .withf(|_, shard, _| *shard == ShardIndex(1))
            .returning(|_, _, _| Ok(fetched_result("cpu.user", &[0])));
        session
            .expect_fetch_bootstrap_blocks()
            .withf(|_, shard, _| *shard == ShardIndex(2))
            .returning(|_, shard, range| Err(SessionError::NoAvailablePeer { shard, range }));

        let fixture = fixture(session, RecordingPersistManager::default());
        let requested = shard_ranges(&[(1, &[(0, 10_000)]), (2, &[(0, 10_000)])]);
        let result = fixture
            .source
            .read(requested, &RunOptions { incremental: false })
            .await
            .expect("read succeeds with partial failures");

        assert_eq!(result.unfulfilled(), &shard_ranges(&[(2, &[(0, 10_000)])]));
        assert!(result.shard_results().contains_key(&ShardIndex(1)));
        assert!(!result.shard_results().contains_key(&ShardIndex(2)));
    }

    // Incremental fetch of one shard over two block-sized intervals: one
    // prepare/persist/close cycle per block start, blocks replaced by
    // retrievable stubs, and the shard indices cached exactly once.
    #[tokio::test]
    async fn incremental_flush_persists_each_block_start_once() {
        let mut session = MockAdminSession::new();
        session
            .expect_fetch_bootstrap_blocks()
            .withf(|_, shard, r| *shard == ShardIndex(7) && *r == range(0, 20_000))
            .times(1)
            .returning(|_, _, _| Ok(fetched_result("cpu.user", &[0, 10_000])));

        let fixture = fixture(session, RecordingPersistManager::default());
        let requested = shard_ranges(&[(7, &[(0, 20_000)])]);
        let result = fixture
            .source
            .read(requested, &RunOptions { incremental: true })
            .await
            .expect("incremental read succeeds");

        let prepares = fixture
            .persist
            .prepares
            .lock()
            .expect("lock is not poisoned")
            .clone();
        assert_eq!(
            prepares,
            vec![(ShardIndex(7), UnixMillis(0)), (ShardIndex(7), UnixMillis(10_000))],
        );
        assert_eq!(fixture.persist.closes.load(Ordering::SeqCst), 2);
        assert_eq!(fixture.persist.persists.load(Ordering::SeqCst), 2);

        let cached = fixture
            .retriever
            .cached
            .lock()
            .expect("lock is not poisoned")
            .clone();
        assert_eq!(cached, vec![vec![ShardIndex(7)]]);

        let shard_result = &result.shard_results()[&ShardIndex(7)];
        let blocks = &shard_result.series()[&SeriesId::from_label("cpu.user")];
        assert!(blocks.get(UnixMillis(0)).expect("block present").is_retrievable());
        assert!(
            blocks
                .get(UnixMillis(10_000))
                .expect("block present")
                .is_retrievable()
        );
        assert!(result.unfulfilled().is_empty());
    }

    // A flush failure keeps the block in memory and does not mark the range
    // unfulfilled: the data was fetched, it just was not made durable.
    #[tokio::test]
    async fn flush_failure_keeps_block_resident_and_fulfilled() {
        let mut session = MockAdminSession::new();
        session
            .expect_fetch_bootstrap_blocks()
            .times(1)
            .returning(|_, _, _| Ok(fetched_result("cpu.user", &[0, 10_000])));

        let persist = RecordingPersistManager {
            fail_block_starts: vec![UnixMillis(0)],
            ..RecordingPersistManager::default()
        };
        let fixture = fixture(session, persist);
        let requested = shard_ranges(&[(7, &[(0, 20_000)])]);
        let result = fixture
            .source
            .read(requested, &RunOptions { incremental: true })
            .await
            .expect("read succeeds despite flush failure");

        assert!(result.unfulfilled().is_empty());
        let blocks =
            &result.shard_results()[&ShardIndex(7)].series()[&SeriesId::from_label("cpu.user")];
        assert!(!blocks.get(UnixMillis(0)).expect("block present").is_retrievable());
        assert!(
            blocks
                .get(UnixMillis(10_000))
                .expect("block present")
                .is_retrievable()
        );
        assert_eq!(fixture.source.metrics.flush_errors_total.get(), 1);
    }

    #[tokio::test]
    async fn non_incremental_read_never_touches_persistence() {
        let mut session = MockAdminSession::new();
        session
            .expect_fetch_bootstrap_blocks()
            .returning(|_, _, _| Ok(fetched_result("cpu.user", &[0])));

        let fixture = fixture(session, RecordingPersistManager::default());
        let requested = shard_ranges(&[(3, &[(0, 10_000)])]);
        let result = fixture
            .source
            .read(requested, &RunOptions { incremental: false })
            .await
            .expect("read succeeds");

        assert!(fixture
            .persist
            .prepares
            .lock()
            .expect("lock is not poisoned")
            .is_empty());
        assert!(fixture
            .retriever
            .cached
            .lock()
            .expect("lock is not poisoned")
            .is_empty());
        let blocks =
            &result.shard_results()[&ShardIndex(3)].series()[&SeriesId::from_label("cpu.user")];
        assert!(!blocks.get(UnixMillis(0)).expect("block present").is_retrievable());
    }
}
