use std::sync::Arc;
use std::time;

use bridge_common::batch;
use bridge_common::client::{FetchQuery, RemoteClient, SourceItem};
use bridge_common::fingerprint::FingerprintTracker;
use bridge_common::hook::PostProcessingHook;
use bridge_common::liveness::Liveness;
use bridge_common::pipeline::ProcessingPipeline;
use tokio::sync::{watch, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, error, info};

use crate::error::ConsumerError;

/// Phases of one poll cycle. Exactly one cycle is active per consumer
/// instance; the state is owned and mutated only by the poll loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleState {
    Idle,
    Fetching,
    Assembling,
    Dispatching,
    Draining,
}

/// Tunables for a `BatchPollConsumer`.
#[derive(Debug, Clone)]
pub struct ConsumerOptions {
    /// The interval between poll cycles.
    pub poll_interval: time::Duration,
    /// Cap on the number of items requested per fetch.
    pub batch_limit: usize,
    /// Maximum number of work units being processed concurrently.
    pub max_in_flight: usize,
    /// Suppress items whose key was already consumed successfully.
    pub deduplicate: bool,
    /// Delete items from the remote store after successful processing.
    pub cleanup_on_success: bool,
    /// Bound on the number of fingerprints retained for deduplication.
    pub fingerprint_capacity: usize,
}

impl Default for ConsumerOptions {
    fn default() -> Self {
        Self {
            poll_interval: time::Duration::from_secs(1),
            batch_limit: 100,
            max_in_flight: 10,
            deduplicate: true,
            cleanup_on_success: true,
            fingerprint_capacity: bridge_common::fingerprint::DEFAULT_FINGERPRINT_CAPACITY,
        }
    }
}

/// A consumer that polls a remote store on a timer and dispatches fetched
/// items as numbered work units to a processing pipeline.
///
/// Each cycle: fetch a result set, drop items already consumed (by
/// fingerprint), wrap the survivors into work units with eagerly computed
/// batch metadata, dispatch them in index order with at most
/// `max_in_flight` being processed at once, and fire each unit's
/// post-processing hook on completion. Completion order is unconstrained;
/// index assignment is not.
pub struct BatchPollConsumer<C, P>
where
    C: RemoteClient,
{
    /// An identifier for this consumer, used in logs.
    name: String,
    /// The remote store we poll. Shared with the cleanup hooks.
    client: Arc<C>,
    /// The injected processing pipeline work units are submitted to.
    pipeline: Arc<P>,
    options: ConsumerOptions,
    /// Keys of successfully consumed items, for duplicate suppression.
    tracker: FingerprintTracker,
    state: CycleState,
    /// The liveness probe, pinged on every tick.
    liveness: Liveness,
    /// Stop signal. When it flips, dispatching halts after in-flight units.
    shutdown: watch::Receiver<bool>,
}

impl<C, P> BatchPollConsumer<C, P>
where
    C: RemoteClient + 'static,
    P: ProcessingPipeline<C::Item> + 'static,
{
    pub fn new(
        name: &str,
        client: Arc<C>,
        pipeline: Arc<P>,
        options: ConsumerOptions,
        liveness: Liveness,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        let tracker = FingerprintTracker::new(options.fingerprint_capacity);

        Self {
            name: name.to_owned(),
            client,
            pipeline,
            options,
            tracker,
            state: CycleState::Idle,
            liveness,
            shutdown,
        }
    }

    pub fn state(&self) -> CycleState {
        self.state
    }

    fn stopping(&self) -> bool {
        *self.shutdown.borrow()
    }

    /// Run poll cycles on the timer until the stop signal flips.
    /// A fetch failure aborts its cycle and is reported; the loop then waits
    /// for the next tick (backoff belongs to whoever schedules this process).
    /// The fingerprint tracker is reset on the way out so a restart does not
    /// inherit stale dedup state.
    pub async fn run(&mut self) -> Result<(), ConsumerError> {
        let mut interval = tokio::time::interval(self.options.poll_interval);
        info!("{} starting to poll", self.name);

        loop {
            tokio::select! {
                _ = interval.tick() => {}
                _ = self.shutdown.changed() => {}
            }

            if self.stopping() {
                break;
            }

            self.liveness.report_healthy();

            match self.poll_cycle().await {
                Ok(count) => debug!("{} processed {} work units this cycle", self.name, count),
                Err(e) => {
                    error!("{} poll cycle aborted: {}", self.name, e);
                    metrics::counter!("poll_failures_total").increment(1);
                }
            }
        }

        self.tracker.reset();
        info!("{} stopped", self.name);

        Ok(())
    }

    /// Execute one poll cycle, returning the number of work units dispatched.
    pub async fn poll_cycle(&mut self) -> Result<usize, ConsumerError> {
        self.state = CycleState::Fetching;
        let query = FetchQuery::with_limit(self.options.batch_limit);
        let fetched = match self.client.fetch(&query).await {
            Ok(items) => items,
            Err(e) => {
                // Nothing was created yet; the next tick starts fresh.
                self.state = CycleState::Idle;
                return Err(ConsumerError::PollFailure(e));
            }
        };

        self.state = CycleState::Assembling;
        let mut survivors = Vec::with_capacity(fetched.len());
        for item in fetched {
            if self.options.deduplicate && self.tracker.seen(item.key()) {
                metrics::counter!("fingerprint_suppressed_total").increment(1);
                continue;
            }
            survivors.push(item);
        }

        let units = batch::assemble(survivors);
        metrics::histogram!("poll_cycle_items").record(units.len() as f64);

        if units.is_empty() {
            self.state = CycleState::Idle;
            metrics::counter!("poll_cycles_total").increment(1);
            return Ok(0);
        }

        self.state = CycleState::Dispatching;
        let total = units.len();
        let semaphore = Arc::new(Semaphore::new(self.options.max_in_flight));
        let mut tasks: JoinSet<(String, bool)> = JoinSet::new();
        let mut dispatched = 0;

        for unit in units {
            if self.stopping() {
                info!(
                    "{} stopping mid-batch, {} of {} units dispatched",
                    self.name, dispatched, total
                );
                break;
            }

            let permit = semaphore
                .clone()
                .acquire_owned()
                .await
                .expect("semaphore has been closed");
            // pending = total - dispatched - 1: the unit in hand is no longer
            // waiting, and its batch index equals the dispatch count here.
            metrics::gauge!("dispatch_pending").set(unit.metadata.pending() as f64);

            let key = unit.item.key().to_owned();
            let hook = PostProcessingHook::new(
                self.client.clone(),
                &key,
                self.options.cleanup_on_success,
            );
            let pipeline = self.pipeline.clone();

            tasks.spawn(async move {
                let now = tokio::time::Instant::now();
                let result = pipeline.process(unit).await;
                drop(permit);

                metrics::histogram!("work_unit_processing_duration_seconds")
                    .record(now.elapsed().as_secs_f64());

                match result {
                    Ok(()) => {
                        hook.on_complete().await;
                        metrics::counter!("work_units_completed").increment(1);
                        (key, true)
                    }
                    Err(e) => {
                        error!("failed to process work unit {}: {}", key, e);
                        hook.on_failure().await;
                        metrics::counter!("work_units_failed").increment(1);
                        (key, false)
                    }
                }
            });
            dispatched += 1;
        }

        self.state = CycleState::Draining;
        while let Some(joined) = tasks.join_next().await {
            match joined {
                // Only successfully consumed keys are remembered; a failed
                // item may reappear on a later poll.
                Ok((key, true)) => {
                    if self.options.deduplicate {
                        self.tracker.remember(&key);
                    }
                }
                Ok((_, false)) => {}
                Err(e) => error!("work unit task panicked: {}", e),
            }
        }
        metrics::gauge!("dispatch_pending").set(0.0);

        self.state = CycleState::Idle;
        metrics::counter!("poll_cycles_total").increment(1);

        Ok(dispatched)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use bridge_common::batch::BatchMetadata;
    use bridge_common::client::ClientError;
    use bridge_common::pipeline::PipelineError;
    use bridge_common::remote::SourceRecord;

    use super::*;

    fn record(key: &str) -> SourceRecord {
        SourceRecord {
            key: key.to_owned(),
            payload: serde_json::json!({ "origin": key }),
        }
    }

    /// A remote store serving one canned batch per fetch call.
    struct MockClient {
        batches: Mutex<VecDeque<Result<Vec<SourceRecord>, ClientError>>>,
        deleted: Mutex<Vec<String>>,
    }

    impl MockClient {
        fn new(batches: Vec<Result<Vec<SourceRecord>, ClientError>>) -> Arc<Self> {
            Arc::new(Self {
                batches: Mutex::new(batches.into()),
                deleted: Mutex::new(Vec::new()),
            })
        }

        fn deleted(&self) -> Vec<String> {
            self.deleted.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl RemoteClient for MockClient {
        type Item = SourceRecord;

        async fn fetch(&self, _query: &FetchQuery) -> Result<Vec<SourceRecord>, ClientError> {
            self.batches
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(Vec::new()))
        }

        async fn delete(&self, key: &str) -> Result<(), ClientError> {
            self.deleted.lock().unwrap().push(key.to_owned());
            Ok(())
        }

        async fn put(&self, _item: SourceRecord) -> Result<(), ClientError> {
            Ok(())
        }
    }

    /// A pipeline that records what it processed and fails chosen keys.
    struct MockPipeline {
        processed: Mutex<Vec<(String, BatchMetadata)>>,
        fail_keys: HashSet<String>,
    }

    impl MockPipeline {
        fn new() -> Arc<Self> {
            Self::failing(&[])
        }

        fn failing(keys: &[&str]) -> Arc<Self> {
            Arc::new(Self {
                processed: Mutex::new(Vec::new()),
                fail_keys: keys.iter().map(|k| (*k).to_owned()).collect(),
            })
        }

        fn processed(&self) -> Vec<(String, BatchMetadata)> {
            self.processed.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ProcessingPipeline<SourceRecord> for MockPipeline {
        async fn process(
            &self,
            unit: bridge_common::batch::WorkUnit<SourceRecord>,
        ) -> Result<(), PipelineError> {
            self.processed
                .lock()
                .unwrap()
                .push((unit.item.key.clone(), unit.metadata.clone()));

            if self.fail_keys.contains(&unit.item.key) {
                return Err(PipelineError::NonRetryable {
                    reason: "the sink rejected it".to_owned(),
                });
            }
            Ok(())
        }
    }

    fn consumer(
        client: Arc<MockClient>,
        pipeline: Arc<MockPipeline>,
        options: ConsumerOptions,
    ) -> (
        BatchPollConsumer<MockClient, MockPipeline>,
        watch::Sender<bool>,
    ) {
        let (tx, rx) = watch::channel(false);
        let liveness = Liveness::new("consumer", ::time::Duration::seconds(30));
        let consumer = BatchPollConsumer::new("consumer", client, pipeline, options, liveness, rx);
        (consumer, tx)
    }

    #[tokio::test]
    async fn test_cycle_dispatches_every_fetched_item() {
        let client = MockClient::new(vec![Ok(vec![record("a"), record("b"), record("c")])]);
        let pipeline = MockPipeline::new();
        let (mut consumer, _tx) =
            consumer(client.clone(), pipeline.clone(), ConsumerOptions::default());

        let count = consumer.poll_cycle().await.unwrap();

        assert_eq!(count, 3);
        assert_eq!(consumer.state(), CycleState::Idle);

        let processed = pipeline.processed();
        assert_eq!(processed.len(), 3);

        // Metadata was assigned eagerly in fetch order, whatever the
        // completion order was.
        let mut indices: Vec<usize> = processed.iter().map(|(_, m)| m.index).collect();
        indices.sort_unstable();
        assert_eq!(indices, vec![0, 1, 2]);
        for (_, metadata) in &processed {
            assert_eq!(metadata.size, 3);
            assert_eq!(metadata.is_last, metadata.index == 2);
        }
    }

    #[tokio::test]
    async fn test_pending_count_steps_down_as_the_batch_dispatches() {
        let client = MockClient::new(vec![Ok(vec![
            record("a"),
            record("b"),
            record("c"),
            record("d"),
        ])]);
        let pipeline = MockPipeline::new();
        let (mut consumer, _tx) =
            consumer(client.clone(), pipeline.clone(), ConsumerOptions::default());

        let count = consumer.poll_cycle().await.unwrap();
        assert_eq!(count, 4);

        // Each unit carries the count of units still waiting behind it at
        // hand-off; in dispatch order that steps down to zero on the last.
        let mut processed = pipeline.processed();
        processed.sort_by_key(|(_, metadata)| metadata.index);

        let pending: Vec<usize> = processed
            .iter()
            .map(|(_, metadata)| metadata.pending())
            .collect();
        assert_eq!(pending, vec![3, 2, 1, 0]);

        let (_, last) = processed.last().unwrap();
        assert!(last.is_last);
        assert_eq!(last.pending(), 0);
    }

    #[tokio::test]
    async fn test_empty_fetch_yields_count_zero() {
        let client = MockClient::new(vec![Ok(Vec::new())]);
        let pipeline = MockPipeline::new();
        let (mut consumer, _tx) =
            consumer(client.clone(), pipeline.clone(), ConsumerOptions::default());

        let count = consumer.poll_cycle().await.unwrap();

        assert_eq!(count, 0);
        assert!(pipeline.processed().is_empty());
        assert!(client.deleted().is_empty());
    }

    #[tokio::test]
    async fn test_fetch_failure_aborts_the_cycle() {
        let client = MockClient::new(vec![Err(ClientError::Fetch {
            reason: "connection refused".to_owned(),
        })]);
        let pipeline = MockPipeline::new();
        let (mut consumer, _tx) =
            consumer(client.clone(), pipeline.clone(), ConsumerOptions::default());

        let result = consumer.poll_cycle().await;

        assert!(matches!(result, Err(ConsumerError::PollFailure(_))));
        assert_eq!(consumer.state(), CycleState::Idle);
        assert!(pipeline.processed().is_empty());

        // No partial state carried over: the next cycle runs normally.
        let count = consumer.poll_cycle().await.unwrap();
        assert_eq!(count, 0);
    }

    #[tokio::test]
    async fn test_successfully_consumed_items_are_suppressed_next_cycle() {
        let client = MockClient::new(vec![
            Ok(vec![record("a"), record("b")]),
            Ok(vec![
                record("a"),
                record("b"),
                record("c"),
                record("d"),
                record("e"),
            ]),
        ]);
        let pipeline = MockPipeline::new();
        let (mut consumer, _tx) =
            consumer(client.clone(), pipeline.clone(), ConsumerOptions::default());

        assert_eq!(consumer.poll_cycle().await.unwrap(), 2);

        // a and b were remembered, so the second batch shrinks to c, d, e.
        assert_eq!(consumer.poll_cycle().await.unwrap(), 3);

        let mut all = pipeline.processed();
        let second_cycle = all.split_off(2);
        let mut keys: Vec<String> = second_cycle.iter().map(|(k, _)| k.clone()).collect();
        keys.sort();
        assert_eq!(keys, vec!["c", "d", "e"]);
        for (_, metadata) in &second_cycle {
            assert_eq!(metadata.size, 3);
        }
    }

    #[tokio::test]
    async fn test_failed_unit_is_not_deleted_and_may_reappear() {
        let client = MockClient::new(vec![
            Ok(vec![record("good"), record("bad")]),
            Ok(vec![record("good"), record("bad")]),
        ]);
        let pipeline = MockPipeline::failing(&["bad"]);
        let (mut consumer, _tx) =
            consumer(client.clone(), pipeline.clone(), ConsumerOptions::default());

        // Sibling units are unaffected by the failure.
        assert_eq!(consumer.poll_cycle().await.unwrap(), 2);
        assert_eq!(client.deleted(), vec!["good".to_owned()]);

        // The failed item was never remembered, so it comes back; the
        // successful one stays suppressed.
        assert_eq!(consumer.poll_cycle().await.unwrap(), 1);
        let keys: Vec<String> = pipeline.processed().iter().map(|(k, _)| k.clone()).collect();
        assert_eq!(keys.len(), 3);
        assert_eq!(keys.iter().filter(|k| *k == "bad").count(), 2);
        assert_eq!(keys[2], "bad");
    }

    #[tokio::test]
    async fn test_cleanup_toggle_disables_deletes() {
        let client = MockClient::new(vec![Ok(vec![record("a")])]);
        let pipeline = MockPipeline::new();
        let options = ConsumerOptions {
            cleanup_on_success: false,
            ..Default::default()
        };
        let (mut consumer, _tx) = consumer(client.clone(), pipeline.clone(), options);

        assert_eq!(consumer.poll_cycle().await.unwrap(), 1);
        assert!(client.deleted().is_empty());
    }

    #[tokio::test]
    async fn test_dedup_toggle_allows_redelivery() {
        let client = MockClient::new(vec![
            Ok(vec![record("a")]),
            Ok(vec![record("a")]),
        ]);
        let pipeline = MockPipeline::new();
        let options = ConsumerOptions {
            deduplicate: false,
            ..Default::default()
        };
        let (mut consumer, _tx) = consumer(client.clone(), pipeline.clone(), options);

        assert_eq!(consumer.poll_cycle().await.unwrap(), 1);
        assert_eq!(consumer.poll_cycle().await.unwrap(), 1);
        assert_eq!(pipeline.processed().len(), 2);
    }

    #[tokio::test]
    async fn test_stop_signal_halts_dispatching() {
        let client = MockClient::new(vec![Ok(vec![record("a"), record("b")])]);
        let pipeline = MockPipeline::new();
        let (mut consumer, tx) =
            consumer(client.clone(), pipeline.clone(), ConsumerOptions::default());

        tx.send(true).unwrap();

        // The fetch and assembly still run, but nothing is dispatched once
        // the stop signal is up.
        let count = consumer.poll_cycle().await.unwrap();
        assert_eq!(count, 0);
        assert!(pipeline.processed().is_empty());
    }

    #[tokio::test]
    async fn test_run_stops_and_resets_the_tracker() {
        let client = MockClient::new(vec![Ok(vec![record("a")])]);
        let pipeline = MockPipeline::new();
        let options = ConsumerOptions {
            poll_interval: time::Duration::from_millis(10),
            ..Default::default()
        };
        let (mut consumer, tx) = consumer(client.clone(), pipeline.clone(), options);

        tokio::spawn(async move {
            tokio::time::sleep(time::Duration::from_millis(100)).await;
            tx.send(true).ok();
        });

        consumer.run().await.unwrap();

        assert_eq!(pipeline.processed().len(), 1);
        assert!(consumer.tracker.is_empty());
    }
}
