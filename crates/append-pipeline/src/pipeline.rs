//! Coordinator and worker pool.

use crate::error::AppendError;
use append_sink::{Appendable, Appender, SeriesRef};
use series_generator::{GeneratorError, Series};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Counters of one [`append`] run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AppendStats {
    /// Number of workers that ran.
    pub workers: usize,
    /// Series fully drained into a committed appender.
    pub series: u64,
    /// Samples appended to committed appenders.
    pub samples: u64,
}

impl AppendStats {
    fn add(&mut self, worker: WorkerStats) {
        self.series += worker.series;
        self.samples += worker.samples;
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct WorkerStats {
    series: u64,
    samples: u64,
}

type Queue = Arc<Mutex<mpsc::Receiver<Series>>>;

/// Default worker count: twice the number of CPUs.
pub fn default_concurrency() -> usize {
    2 * num_cpus::get()
}

/// Drain every series of `series_set` into `sink` using `concurrency`
/// workers. A concurrency of 0 is treated as 1.
///
/// Each worker opens one appender and appends whole series to it, sample by
/// sample. When the set is exhausted every worker commits exactly once.
///
/// If a worker fails, its appender is rolled back and the run is cancelled:
/// the other workers roll back instead of committing, unless they already
/// committed. The same happens when the series set fails or `cancel` fires.
///
/// Result precedence: a series set failure, then the first worker failure,
/// then [`AppendError::Cancelled`].
pub async fn append<A, S>(
    cancel: &CancellationToken,
    concurrency: usize,
    sink: &A,
    series_set: S,
) -> Result<AppendStats, AppendError>
where
    A: Appendable,
    S: IntoIterator<Item = Result<Series, GeneratorError>>,
{
    let concurrency = concurrency.max(1);
    let token = cancel.child_token();

    let mut appenders = Vec::with_capacity(concurrency);
    for _ in 0..concurrency {
        match sink.appender().await {
            Ok(appender) => appenders.push(appender),
            Err(e) => {
                for opened in appenders {
                    if let Err(rollback) = opened.rollback().await {
                        warn!("Failed to roll back unused appender: {rollback:#}");
                    }
                }
                return Err(AppendError::Open(e));
            }
        }
    }

    let (tx, rx) = mpsc::channel::<Series>(1);
    let queue: Queue = Arc::new(Mutex::new(rx));

    let mut workers = JoinSet::new();
    for (id, appender) in appenders.into_iter().enumerate() {
        workers.spawn(run_worker(id, appender, Arc::clone(&queue), token.clone()));
    }
    drop(queue);
    debug!("Started {concurrency} append workers");

    let fed = feed(series_set, &tx, &token).await;
    if fed.is_err() {
        // Cancel before closing the queue so idle workers roll back.
        token.cancel();
    }
    drop(tx);

    let mut stats = AppendStats {
        workers: concurrency,
        ..AppendStats::default()
    };
    let mut first_failure: Option<AppendError> = None;
    let mut cancelled = false;
    while let Some(joined) = workers.join_next().await {
        match joined {
            Ok(Ok(worker)) => stats.add(worker),
            Ok(Err(AppendError::Cancelled)) => cancelled = true,
            Ok(Err(e)) => {
                first_failure.get_or_insert(e);
            }
            Err(e) => {
                token.cancel();
                first_failure.get_or_insert(AppendError::Worker(e));
            }
        }
    }

    match fed {
        Err(AppendError::Cancelled) => cancelled = true,
        Err(e) => return Err(e),
        Ok(()) => {}
    }
    if let Some(e) = first_failure {
        return Err(e);
    }
    if cancelled {
        return Err(AppendError::Cancelled);
    }
    debug!(
        "Appended {} series, {} samples",
        stats.series, stats.samples
    );
    Ok(stats)
}

/// Hand every series to the queue, one at a time.
async fn feed<S>(
    series_set: S,
    tx: &mpsc::Sender<Series>,
    token: &CancellationToken,
) -> Result<(), AppendError>
where
    S: IntoIterator<Item = Result<Series, GeneratorError>>,
{
    for series in series_set {
        if token.is_cancelled() {
            return Err(AppendError::Cancelled);
        }
        let series = series?;
        tokio::select! {
            biased;
            _ = token.cancelled() => return Err(AppendError::Cancelled),
            sent = tx.send(series) => {
                // Every worker is gone; their results tell why.
                if sent.is_err() {
                    return Err(AppendError::Cancelled);
                }
            }
        }
    }
    Ok(())
}

async fn receive(queue: &Queue) -> Option<Series> {
    queue.lock().await.recv().await
}

async fn run_worker<W: Appender>(
    id: usize,
    mut appender: W,
    queue: Queue,
    token: CancellationToken,
) -> Result<WorkerStats, AppendError> {
    // Cancels the siblings if this task ends any other way than a clean
    // commit, including a panic.
    let guard = token.clone().drop_guard();
    let mut stats = WorkerStats::default();
    loop {
        let received = tokio::select! {
            biased;
            _ = token.cancelled() => None,
            series = receive(&queue) => Some(series),
        };
        let series = match received {
            None => return cancelled(id, appender).await,
            Some(None) => break,
            Some(Some(series)) => series,
        };

        let (labels, samples) = series.into_parts();
        let mut series_ref = SeriesRef::EMPTY;
        for sample in samples {
            if token.is_cancelled() {
                return cancelled(id, appender).await;
            }
            match appender
                .append(series_ref, &labels, sample.timestamp, sample.value)
                .await
            {
                Ok(next) => series_ref = next,
                Err(source) => {
                    warn!("Worker {id} failed to append to {labels}: {source:#}");
                    token.cancel();
                    return Err(match appender.rollback().await {
                        Ok(()) => AppendError::Append { labels, source },
                        Err(rollback) => AppendError::Rollback {
                            labels,
                            source,
                            rollback,
                        },
                    });
                }
            }
            stats.samples += 1;
        }
        stats.series += 1;
    }

    if let Err(e) = appender.commit().await {
        warn!("Worker {id} failed to commit: {e:#}");
        token.cancel();
        return Err(AppendError::Commit(e));
    }
    guard.disarm();
    debug!(
        "Worker {id} committed {} series, {} samples",
        stats.series, stats.samples
    );
    Ok(stats)
}

async fn cancelled<W: Appender>(id: usize, appender: W) -> Result<WorkerStats, AppendError> {
    debug!("Worker {id} cancelled, rolling back");
    if let Err(e) = appender.rollback().await {
        warn!("Worker {id} failed to roll back: {e:#}");
    }
    Err(AppendError::Cancelled)
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::{bail, Result};
    use append_sink::{MemoryAppender, MemorySink};
    use blockgen_core::{BlockSpec, Labels, SpecError};
    use series_generator::BlockSeriesSet;
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const BLOCK: &str = r#"
minTime: 0
maxTime: 600000
thanos:
  labels:
    cluster: test
series:
  - labels:
      __name__: cpu
    targets: 6
    type: GAUGE
    minTime: 0
    maxTime: 600000
    scrapeInterval: 15s
    jitter: 2s
    min: 0
    max: 1
  - labels:
      __name__: requests_total
    targets: 4
    type: COUNTER
    minTime: 0
    maxTime: 300000
    scrapeInterval: 30s
    min: 0
    max: 10
"#;

    fn block() -> BlockSpec {
        BlockSpec::from_yaml(BLOCK).unwrap()
    }

    fn expected(spec: &BlockSpec) -> BTreeMap<Labels, Vec<(i64, f64)>> {
        BlockSeriesSet::new(spec)
            .map(|s| {
                let (labels, samples) = s.unwrap().into_parts();
                (labels, samples.map(|s| (s.timestamp, s.value)).collect())
            })
            .collect()
    }

    /// Sink failing on the `fail_at`-th sample of one series.
    #[derive(Clone)]
    struct FailingSink {
        inner: MemorySink,
        fail_on: Labels,
        fail_at: usize,
        rollback_fails: bool,
    }

    struct FailingAppender {
        inner: MemoryAppender,
        fail_on: Labels,
        fail_at: usize,
        seen: usize,
        rollback_fails: bool,
    }

    #[async_trait::async_trait]
    impl Appendable for FailingSink {
        type Appender = FailingAppender;

        async fn appender(&self) -> Result<FailingAppender> {
            Ok(FailingAppender {
                inner: self.inner.appender().await?,
                fail_on: self.fail_on.clone(),
                fail_at: self.fail_at,
                seen: 0,
                rollback_fails: self.rollback_fails,
            })
        }
    }

    #[async_trait::async_trait]
    impl Appender for FailingAppender {
        async fn append(
            &mut self,
            series_ref: SeriesRef,
            labels: &Labels,
            timestamp: i64,
            value: f64,
        ) -> Result<SeriesRef> {
            if *labels == self.fail_on {
                if self.seen == self.fail_at {
                    bail!("disk full");
                }
                self.seen += 1;
            }
            self.inner.append(series_ref, labels, timestamp, value).await
        }

        async fn commit(self) -> Result<()> {
            self.inner.commit().await
        }

        async fn rollback(self) -> Result<()> {
            self.inner.rollback().await?;
            if self.rollback_fails {
                bail!("rollback refused");
            }
            Ok(())
        }
    }

    /// Sink whose appenders panic on the first sample of one series.
    struct PanickingSink {
        inner: MemorySink,
        panic_on: Labels,
    }

    struct PanickingAppender {
        inner: MemoryAppender,
        panic_on: Labels,
    }

    #[async_trait::async_trait]
    impl Appendable for PanickingSink {
        type Appender = PanickingAppender;

        async fn appender(&self) -> Result<PanickingAppender> {
            Ok(PanickingAppender {
                inner: self.inner.appender().await?,
                panic_on: self.panic_on.clone(),
            })
        }
    }

    #[async_trait::async_trait]
    impl Appender for PanickingAppender {
        async fn append(
            &mut self,
            series_ref: SeriesRef,
            labels: &Labels,
            timestamp: i64,
            value: f64,
        ) -> Result<SeriesRef> {
            if *labels == self.panic_on {
                panic!("appender blew up");
            }
            self.inner.append(series_ref, labels, timestamp, value).await
        }

        async fn commit(self) -> Result<()> {
            self.inner.commit().await
        }

        async fn rollback(self) -> Result<()> {
            self.inner.rollback().await
        }
    }

    /// Sink that cancels the caller's token after a number of appends.
    struct CancellingSink {
        inner: MemorySink,
        cancel: CancellationToken,
        cancel_after: usize,
        appended: Arc<AtomicUsize>,
    }

    struct CancellingAppender {
        inner: MemoryAppender,
        cancel: CancellationToken,
        cancel_after: usize,
        appended: Arc<AtomicUsize>,
    }

    #[async_trait::async_trait]
    impl Appendable for CancellingSink {
        type Appender = CancellingAppender;

        async fn appender(&self) -> Result<CancellingAppender> {
            Ok(CancellingAppender {
                inner: self.inner.appender().await?,
                cancel: self.cancel.clone(),
                cancel_after: self.cancel_after,
                appended: Arc::clone(&self.appended),
            })
        }
    }

    #[async_trait::async_trait]
    impl Appender for CancellingAppender {
        async fn append(
            &mut self,
            series_ref: SeriesRef,
            labels: &Labels,
            timestamp: i64,
            value: f64,
        ) -> Result<SeriesRef> {
            if self.appended.fetch_add(1, Ordering::SeqCst) + 1 == self.cancel_after {
                self.cancel.cancel();
            }
            self.inner.append(series_ref, labels, timestamp, value).await
        }

        async fn commit(self) -> Result<()> {
            self.inner.commit().await
        }

        async fn rollback(self) -> Result<()> {
            self.inner.rollback().await
        }
    }

    fn first_series_labels(spec: &BlockSpec) -> Labels {
        BlockSeriesSet::new(spec)
            .next()
            .unwrap()
            .unwrap()
            .labels()
            .clone()
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_appends_every_series() {
        let spec = block();
        let sink = MemorySink::new();
        let stats = append(&CancellationToken::new(), 4, &sink, BlockSeriesSet::new(&spec))
            .await
            .unwrap();

        let want = expected(&spec);
        assert_eq!(sink.committed(), want);
        assert_eq!(stats.workers, 4);
        assert_eq!(stats.series, 10);
        assert_eq!(
            stats.samples,
            want.values().map(|s| s.len() as u64).sum::<u64>()
        );
        assert_eq!(sink.stats().commits, 4);
        assert_eq!(sink.stats().rollbacks, 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_result_independent_of_concurrency() {
        let spec = block();

        let single = MemorySink::new();
        append(&CancellationToken::new(), 1, &single, BlockSeriesSet::new(&spec))
            .await
            .unwrap();

        let many = MemorySink::new();
        append(&CancellationToken::new(), 8, &many, BlockSeriesSet::new(&spec))
            .await
            .unwrap();

        assert_eq!(single.committed(), many.committed());
        assert_eq!(single.stats().commits, 1);
        assert_eq!(many.stats().commits, 8);
    }

    #[tokio::test]
    async fn test_zero_concurrency_runs_one_worker() {
        let spec = block();
        let sink = MemorySink::new();
        let stats = append(&CancellationToken::new(), 0, &sink, BlockSeriesSet::new(&spec))
            .await
            .unwrap();
        assert_eq!(stats.workers, 1);
        assert_eq!(sink.committed(), expected(&spec));
    }

    #[tokio::test]
    async fn test_empty_series_set_commits_every_worker() {
        let sink = MemorySink::new();
        let stats = append(
            &CancellationToken::new(),
            3,
            &sink,
            std::iter::empty::<Result<Series, GeneratorError>>(),
        )
        .await
        .unwrap();

        assert_eq!(stats.series, 0);
        assert_eq!(sink.stats().commits, 3);
        assert!(sink.committed().is_empty());
    }

    #[tokio::test]
    async fn test_append_failure_rolls_back_single_worker() {
        let spec = block();
        let sink = FailingSink {
            inner: MemorySink::new(),
            fail_on: first_series_labels(&spec),
            fail_at: 3,
            rollback_fails: false,
        };

        let err = append(&CancellationToken::new(), 1, &sink, BlockSeriesSet::new(&spec))
            .await
            .unwrap_err();
        match err {
            AppendError::Append { labels, source } => {
                assert_eq!(labels, sink.fail_on);
                assert!(source.to_string().contains("disk full"));
            }
            other => panic!("expected append error, got {other:?}"),
        }
        assert!(sink.inner.committed().is_empty());
        assert_eq!(sink.inner.stats().commits, 0);
        assert_eq!(sink.inner.stats().rollbacks, 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_append_failure_cancels_siblings() {
        let spec = block();
        let sink = FailingSink {
            inner: MemorySink::new(),
            fail_on: first_series_labels(&spec),
            fail_at: 3,
            rollback_fails: false,
        };

        let err = append(&CancellationToken::new(), 4, &sink, BlockSeriesSet::new(&spec))
            .await
            .unwrap_err();
        assert!(matches!(err, AppendError::Append { .. }), "got {err:?}");

        let stats = sink.inner.stats();
        assert!(stats.rollbacks >= 1);
        assert_eq!(stats.commits + stats.rollbacks, 4);
        assert!(!sink.inner.committed().contains_key(&sink.fail_on));
    }

    #[tokio::test]
    async fn test_rollback_failure_keeps_original_error() {
        let spec = block();
        let sink = FailingSink {
            inner: MemorySink::new(),
            fail_on: first_series_labels(&spec),
            fail_at: 0,
            rollback_fails: true,
        };

        let err = append(&CancellationToken::new(), 1, &sink, BlockSeriesSet::new(&spec))
            .await
            .unwrap_err();
        assert!(matches!(err, AppendError::Rollback { .. }), "got {err:?}");
        let message = err.to_string();
        assert!(message.contains("disk full"), "{message}");
        assert!(message.contains("rollback refused"), "{message}");
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let spec = block();
        let sink = MemorySink::new();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = append(&cancel, 2, &sink, BlockSeriesSet::new(&spec))
            .await
            .unwrap_err();
        assert!(err.is_cancelled());
        assert_eq!(sink.stats().commits, 0);
        assert_eq!(sink.stats().rollbacks, 2);
        assert!(sink.committed().is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_cancelled_mid_run_rolls_back_every_worker() {
        let spec = block();
        let cancel = CancellationToken::new();
        // The gauge series come first with 40 samples each, so the queue is
        // still open and nothing is finished when the token fires.
        let sink = CancellingSink {
            inner: MemorySink::new(),
            cancel: cancel.clone(),
            cancel_after: 5,
            appended: Arc::new(AtomicUsize::new(0)),
        };

        let err = append(&cancel, 4, &sink, BlockSeriesSet::new(&spec))
            .await
            .unwrap_err();
        assert!(err.is_cancelled(), "got {err:?}");
        assert_eq!(sink.inner.stats().commits, 0);
        assert_eq!(sink.inner.stats().rollbacks, 4);
        assert!(sink.inner.committed().is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_worker_panic_cancels_siblings() {
        let mut spec = block();
        spec.series[0].targets = 200;
        let sink = PanickingSink {
            inner: MemorySink::new(),
            panic_on: first_series_labels(&spec),
        };

        let err = append(&CancellationToken::new(), 4, &sink, BlockSeriesSet::new(&spec))
            .await
            .unwrap_err();
        match &err {
            AppendError::Worker(join) => assert!(join.is_panic()),
            other => panic!("expected worker error, got {other:?}"),
        }

        // The panicking worker never ends its appender; the others roll back.
        let stats = sink.inner.stats();
        assert_eq!(stats.commits, 0);
        assert_eq!(stats.rollbacks, 3);
        assert!(sink.inner.committed().is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_series_set_error_wins_and_nothing_commits() {
        let spec = block();
        let good: Vec<_> = BlockSeriesSet::new(&spec).take(2).collect();
        let failure = GeneratorError::InvalidSeries {
            labels: Labels::from_pairs([("__name__", "broken")]).unwrap(),
            source: SpecError::InvalidScrapeInterval,
        };
        let set = good.into_iter().chain(std::iter::once(Err(failure)));

        let sink = MemorySink::new();
        let err = append(&CancellationToken::new(), 2, &sink, set)
            .await
            .unwrap_err();
        assert!(matches!(err, AppendError::SeriesSet(_)), "got {err:?}");
        assert_eq!(sink.stats().commits, 0);
        assert_eq!(sink.stats().rollbacks, 2);
        assert!(sink.committed().is_empty());
    }
}
