use crate::executor::{execute, Fetcher, Request, Response};
use crate::report::RunReport;
use crate::stats::{Progress, StatsAggregator};
use crate::target::LoadPlan;
use anyhow::Result;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{debug, info};

/// Upper bound on the worker pool; keeps both channel capacities well inside
/// what tokio's bounded channel accepts.
pub const MAX_CONCURRENCY: usize = 100_000;

/// Runs a fixed number of requests through a pool of `concurrency` workers.
///
/// One generator task fills a bounded queue (`2 × concurrency`), the workers
/// drain it through the fetcher, and completions come back over a channel of
/// `concurrency` slots to the aggregator, which runs on the caller's task.
/// The two bounded channels are the only backpressure.
pub struct Dispatcher {
    fetcher: Arc<dyn Fetcher>,
    concurrency: usize,
    seed: Option<u64>,
}

impl Dispatcher {
    pub fn new(fetcher: Arc<dyn Fetcher>, concurrency: usize) -> Self {
        Self {
            fetcher,
            concurrency,
            seed: None,
        }
    }

    /// Fix the RNG seed so weighted runs draw the same endpoint sequence.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub async fn run(&self, plan: LoadPlan, requests: u64) -> Result<RunReport> {
        if self.concurrency == 0 || self.concurrency > MAX_CONCURRENCY {
            anyhow::bail!(
                "Concurrency must be between 1 and {} (got {})",
                MAX_CONCURRENCY,
                self.concurrency
            );
        }

        let started_at = chrono::Utc::now();
        let start_time = Instant::now();
        info!(
            "Starting thrashing at {}: {} requests, concurrency {}, {} endpoint(s), {} fetcher",
            started_at.to_rfc3339(),
            requests,
            self.concurrency,
            plan.endpoint_count(),
            self.fetcher.name()
        );

        let LoadPlan {
            target,
            distribution,
        } = plan;

        let (queue_tx, queue_rx) = flume::bounded::<Request>(self.concurrency * 2);
        let (done_tx, mut done_rx) = mpsc::channel::<Response>(self.concurrency);
        let mut tasks = JoinSet::new();

        for _ in 0..self.concurrency {
            let queue_rx = queue_rx.clone();
            let done_tx = done_tx.clone();
            let fetcher = self.fetcher.clone();
            tasks.spawn(async move {
                while let Ok(req) = queue_rx.recv_async().await {
                    let response = execute(fetcher.as_ref(), req).await;
                    if done_tx.send(response).await.is_err() {
                        break;
                    }
                }
            });
        }
        drop(queue_rx);
        drop(done_tx);

        let mut rng = match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        tasks.spawn(async move {
            for id in 0..requests {
                let url = target.next_url(&mut rng);
                if queue_tx.send_async(Request { url, id }).await.is_err() {
                    break;
                }
            }
            debug!("Generator queued {} requests", requests);
        });

        let mut aggregator = StatsAggregator::new(distribution, requests);
        let mut progress = Vec::new();
        let folded = fold_completions(&mut done_rx, &mut aggregator, &mut progress).await;

        // Close the completion side first so no worker stays parked on a
        // full channel, then stop whatever is still running.
        drop(done_rx);
        tasks.shutdown().await;
        folded?;

        let duration = start_time.elapsed();
        let report = RunReport::new(
            started_at,
            requests,
            self.concurrency,
            duration,
            aggregator.into_distribution(),
            progress,
        );
        info!(
            "Finished {} requests in {:?} ({} failures)",
            report.requests, report.duration, report.total_failures
        );

        Ok(report)
    }
}

async fn fold_completions(
    done_rx: &mut mpsc::Receiver<Response>,
    aggregator: &mut StatsAggregator,
    progress: &mut Vec<Progress>,
) -> Result<()> {
    while !aggregator.is_complete() {
        let Some(response) = done_rx.recv().await else {
            anyhow::bail!(
                "Workers stopped after {} of {} completions",
                aggregator.completed(),
                aggregator.expected()
            );
        };

        if let Some(checkpoint) = aggregator.record(&response)? {
            info!(
                "Completed requests: {}\t{:?}\tReq/Sec: {:.2}",
                checkpoint.completed, checkpoint.elapsed, checkpoint.requests_per_sec
            );
            progress.push(checkpoint);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Config, EndpointConfig, Frequency};
    use crate::executor::{MockFetcher, MockOutcome};
    use std::future::Future;
    use std::pin::Pin;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn weighted_config() -> Config {
        Config {
            root: "http://x".to_string(),
            endpoints: vec![
                EndpointConfig {
                    path: "/a".to_string(),
                    freq: Frequency::Percentage(50.0),
                },
                EndpointConfig {
                    path: "/b".to_string(),
                    freq: Frequency::Auto,
                },
                EndpointConfig {
                    path: "/c".to_string(),
                    freq: Frequency::Excluded,
                },
            ],
        }
    }

    /// Counts calls and the peak number of overlapping requests.
    struct CountingFetcher {
        calls: AtomicUsize,
        in_flight: AtomicUsize,
        peak: AtomicUsize,
    }

    impl CountingFetcher {
        fn new() -> Self {
            Self {
                calls: AtomicUsize::new(0),
                in_flight: AtomicUsize::new(0),
                peak: AtomicUsize::new(0),
            }
        }
    }

    impl Fetcher for CountingFetcher {
        fn name(&self) -> &'static str {
            "counting"
        }

        fn get<'a>(
            &'a self,
            _url: &'a str,
        ) -> Pin<Box<dyn Future<Output = Result<u16>> + Send + 'a>> {
            Box::pin(async move {
                self.calls.fetch_add(1, Ordering::SeqCst);
                let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                self.peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(std::time::Duration::from_millis(2)).await;
                self.in_flight.fetch_sub(1, Ordering::SeqCst);
                Ok(200)
            })
        }
    }

    #[tokio::test]
    async fn test_single_url_run_completes_exactly() {
        let fetcher = Arc::new(CountingFetcher::new());
        let dispatcher = Dispatcher::new(fetcher.clone(), 10);
        let plan = LoadPlan::single("http://localhost:1/ping").unwrap();

        let report = dispatcher.run(plan, 100).await.unwrap();

        let stats = &report.endpoints["http://localhost:1/ping"];
        assert_eq!(stats.count, 100);
        assert_eq!(stats.failures, 0);
        assert_eq!(report.total_failures, 0);
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 100);
        assert!(fetcher.peak.load(Ordering::SeqCst) <= 10);

        assert_eq!(report.progress.len(), 10);
        assert_eq!(report.progress.last().map(|p| p.completed), Some(100));
    }

    #[tokio::test]
    async fn test_weighted_run_spreads_requests() {
        let dispatcher = Dispatcher::new(Arc::new(MockFetcher::new(0)), 4).with_seed(3);
        let plan = LoadPlan::from_config(&weighted_config()).unwrap();

        let report = dispatcher.run(plan, 200).await.unwrap();

        let a = report.endpoints["http://x/a"].count;
        let b = report.endpoints["http://x/b"].count;
        assert_eq!(a + b, 200);
        assert!(a > 0 && b > 0, "a={a} b={b}");
        assert!(!report.endpoints.contains_key("http://x/c"));
    }

    #[tokio::test]
    async fn test_failures_are_counted_not_fatal() {
        let fetcher = MockFetcher::with_outcome(0, MockOutcome::TransportError);
        let dispatcher = Dispatcher::new(Arc::new(fetcher), 3);
        let plan = LoadPlan::single("http://localhost:1/").unwrap();

        let report = dispatcher.run(plan, 12).await.unwrap();

        assert_eq!(report.total_failures, 12);
        assert_eq!(report.endpoints["http://localhost:1/"].count, 12);
        assert_eq!(report.success_percent(), Some(0.0));
    }

    #[tokio::test]
    async fn test_zero_requests() {
        let dispatcher = Dispatcher::new(Arc::new(MockFetcher::new(0)), 2);
        let plan = LoadPlan::single("http://localhost:1/").unwrap();

        let report = dispatcher.run(plan, 0).await.unwrap();

        assert_eq!(report.endpoints["http://localhost:1/"].count, 0);
        assert!(report.progress.is_empty());
        assert_eq!(report.success_percent(), None);
    }

    #[tokio::test]
    async fn test_zero_concurrency_is_rejected() {
        let dispatcher = Dispatcher::new(Arc::new(MockFetcher::new(0)), 0);
        let plan = LoadPlan::single("http://localhost:1/").unwrap();

        assert!(dispatcher.run(plan, 5).await.is_err());
    }

    #[tokio::test]
    async fn test_oversized_concurrency_is_rejected() {
        let dispatcher = Dispatcher::new(Arc::new(MockFetcher::new(0)), MAX_CONCURRENCY + 1);
        let plan = LoadPlan::single("http://localhost:1/").unwrap();

        let err = dispatcher.run(plan, 5).await.unwrap_err();
        assert!(err.to_string().contains("Concurrency must be between"));
    }

    #[tokio::test]
    async fn test_tiny_share_run_finishes() {
        let config = Config {
            root: "http://x".to_string(),
            endpoints: vec![EndpointConfig {
                path: "/a".to_string(),
                freq: Frequency::Percentage(1e-14),
            }],
        };
        let dispatcher = Dispatcher::new(Arc::new(MockFetcher::new(0)), 2).with_seed(1);
        let plan = LoadPlan::from_config(&config).unwrap();

        let report = tokio::time::timeout(
            std::time::Duration::from_secs(5),
            dispatcher.run(plan, 10),
        )
        .await
        .expect("run should not hang")
        .unwrap();

        assert_eq!(report.endpoints["http://x/a"].count, 10);
    }

    #[tokio::test]
    async fn test_dispatcher_is_reusable() {
        let dispatcher = Dispatcher::new(Arc::new(MockFetcher::new(0)), 2).with_seed(11);

        for _ in 0..3 {
            let plan = LoadPlan::from_config(&weighted_config()).unwrap();
            let report = dispatcher.run(plan, 20).await.unwrap();
            let total: u64 = report.endpoints.values().map(|s| s.count).sum();
            assert_eq!(total, 20);
        }
    }
}
