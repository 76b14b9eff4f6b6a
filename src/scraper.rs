use std::collections::BTreeSet;
use std::fmt::Display;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use indicatif::{ProgressBar, ProgressStyle};
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinSet;
use tracing::{info, warn};

use crate::error::{FetchError, HarvestError};
use crate::fetch::DocumentSource;
use crate::output::Sink;

/// One document to fetch: the key it is reported under and where it lives.
#[derive(Debug, Clone)]
pub struct Job<K> {
    pub key: K,
    pub url: String,
}

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_backoff: Duration,
}

#[derive(Debug, Clone)]
pub struct BatchOptions {
    /// Fetches in flight at once.
    pub concurrency: usize,
    pub retry: RetryPolicy,
    pub show_progress: bool,
}

/// Batch stats returned after every disposition is recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchReport {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
}

/// Fetch every job, run `extract` on each body and feed the results to
/// `sink`, one at a time, from this task only.
///
/// All jobs are spawned up front; the semaphore bounds how many fetch at
/// once. A failed job never affects the others. Returns once every job has
/// exactly one disposition in the sink.
pub async fn run_batch<K, R, S, E, A>(
    jobs: Vec<Job<K>>,
    source: Arc<S>,
    extract: E,
    sink: &mut A,
    opts: &BatchOptions,
) -> Result<BatchReport>
where
    K: Ord + Clone + Display + Send + Sync + 'static,
    R: Send + 'static,
    S: DocumentSource,
    E: Fn(&str) -> R + Send + Sync + 'static,
    A: Sink<K, R>,
{
    let total = jobs.len();
    let width = opts.concurrency.max(1);
    let semaphore = Arc::new(Semaphore::new(width));
    let extract = Arc::new(extract);
    let mut pending: BTreeSet<K> = jobs.iter().map(|j| j.key.clone()).collect();

    let pb = if opts.show_progress {
        ProgressBar::new(total as u64)
    } else {
        ProgressBar::hidden()
    };
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40} {pos}/{len} ({per_sec}, eta {eta})")?
            .progress_chars("=> "),
    );

    // Workers send results, this task is the only one touching the sink
    let (tx, mut rx) = mpsc::channel::<(K, Result<R, FetchError>)>(width * 2);
    let mut tasks = JoinSet::new();

    for job in jobs {
        let source = Arc::clone(&source);
        let sem = Arc::clone(&semaphore);
        let extract = Arc::clone(&extract);
        let retry = opts.retry.clone();
        let tx = tx.clone();

        tasks.spawn(async move {
            let Ok(_permit) = sem.acquire().await else {
                return;
            };
            let outcome = fetch_with_retry(source.as_ref(), &job.url, &retry, &job.key)
                .await
                .map(|body| extract(&body));
            if let Err(e) = &outcome {
                let failure = HarvestError::FetchFailed {
                    id: job.key.to_string(),
                    source: e.clone(),
                };
                warn!("{} ({})", failure, job.url);
            }
            let _ = tx.send((job.key, outcome)).await;
        });
    }

    // Drop our copy of tx so rx closes when all spawned tasks finish
    drop(tx);

    let mut succeeded = 0usize;
    let mut failed = 0usize;
    while let Some((key, outcome)) = rx.recv().await {
        if !pending.remove(&key) {
            warn!("Duplicate result for {} ignored", key);
            continue;
        }
        if sink.accept(key, outcome) {
            succeeded += 1;
        } else {
            failed += 1;
        }
        pb.inc(1);
    }

    while let Some(joined) = tasks.join_next().await {
        if let Err(e) = joined {
            warn!("Fetch task did not complete: {}", e);
        }
    }

    // Tasks that died before reporting still get their one disposition
    for key in std::mem::take(&mut pending) {
        warn!("No result for {}, recording as failed", key);
        if sink.accept(key, Err(FetchError::Aborted)) {
            succeeded += 1;
        } else {
            failed += 1;
        }
        pb.inc(1);
    }

    pb.finish_and_clear();
    info!("Completed {} of {} ({} failed)", succeeded, total, failed);

    Ok(BatchReport {
        total,
        succeeded,
        failed,
    })
}

/// Fetch once, then retry transient failures with exponential backoff.
/// Permanent failures come back immediately.
pub async fn fetch_with_retry<S: DocumentSource, K: Display>(
    source: &S,
    url: &str,
    retry: &RetryPolicy,
    key: &K,
) -> Result<String, FetchError> {
    let mut attempt = 0u32;
    loop {
        match source.fetch(url).await {
            Ok(body) => return Ok(body),
            Err(e) if e.is_transient() && attempt < retry.max_retries => {
                let backoff = retry.base_backoff * 2u32.saturating_pow(attempt);
                warn!(
                    "{} on {} (attempt {}/{}), backing off {:.1}s",
                    e,
                    key,
                    attempt + 1,
                    retry.max_retries,
                    backoff.as_secs_f64()
                );
                tokio::time::sleep(backoff).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use super::*;

    /// Serves canned responses; counts calls per URL.
    struct FakeSource {
        pages: HashMap<String, Vec<Result<String, FetchError>>>,
        calls: Mutex<HashMap<String, usize>>,
        in_flight: AtomicUsize,
        peak: AtomicUsize,
    }

    impl FakeSource {
        fn new(pages: Vec<(&str, Vec<Result<String, FetchError>>)>) -> Self {
            Self {
                pages: pages.into_iter().map(|(u, r)| (u.to_string(), r)).collect(),
                calls: Mutex::new(HashMap::new()),
                in_flight: AtomicUsize::new(0),
                peak: AtomicUsize::new(0),
            }
        }

        fn calls(&self, url: &str) -> usize {
            self.calls.lock().unwrap().get(url).copied().unwrap_or(0)
        }
    }

    impl DocumentSource for FakeSource {
        async fn fetch(&self, url: &str) -> Result<String, FetchError> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(5)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            let n = {
                let mut calls = self.calls.lock().unwrap();
                let n = calls.entry(url.to_string()).or_insert(0);
                *n += 1;
                *n
            };
            match self.pages.get(url) {
                Some(responses) => responses[(n - 1).min(responses.len() - 1)].clone(),
                None => Err(FetchError::Status(404)),
            }
        }
    }

    #[derive(Default)]
    struct VecSink {
        ok: Vec<(u32, usize)>,
        failed: Vec<(u32, FetchError)>,
    }

    impl Sink<u32, usize> for VecSink {
        fn accept(&mut self, key: u32, outcome: Result<usize, FetchError>) -> bool {
            match outcome {
                Ok(len) => {
                    self.ok.push((key, len));
                    true
                }
                Err(e) => {
                    self.failed.push((key, e));
                    false
                }
            }
        }
    }

    fn opts(concurrency: usize, max_retries: u32) -> BatchOptions {
        BatchOptions {
            concurrency,
            retry: RetryPolicy {
                max_retries,
                base_backoff: Duration::from_millis(1),
            },
            show_progress: false,
        }
    }

    fn jobs(ids: &[u32]) -> Vec<Job<u32>> {
        ids.iter()
            .map(|id| Job {
                key: *id,
                url: format!("u/{}", id),
            })
            .collect()
    }

    #[tokio::test]
    async fn failures_are_isolated() {
        let source = Arc::new(FakeSource::new(vec![
            ("u/1", vec![Ok("one".into())]),
            ("u/2", vec![Err(FetchError::Status(500))]),
            ("u/4", vec![Ok("four!".into())]),
        ]));
        let mut sink = VecSink::default();
        let report = run_batch(jobs(&[1, 2, 3, 4]), source, |b: &str| b.len(), &mut sink, &opts(4, 0))
            .await
            .unwrap();

        assert_eq!(report, BatchReport { total: 4, succeeded: 2, failed: 2 });
        sink.ok.sort();
        assert_eq!(sink.ok, vec![(1, 3), (4, 5)]);
        sink.failed.sort_by_key(|(k, _)| *k);
        assert_eq!(sink.failed[0], (2, FetchError::Status(500)));
        assert_eq!(sink.failed[1], (3, FetchError::Status(404)));
    }

    #[tokio::test]
    async fn every_job_gets_one_disposition() {
        let ids: Vec<u32> = (0..50).collect();
        let pages: Vec<(String, Vec<Result<String, FetchError>>)> = ids
            .iter()
            .filter(|i| *i % 3 != 0)
            .map(|i| (format!("u/{}", i), vec![Ok(i.to_string())]))
            .collect();
        let source = Arc::new(FakeSource::new(
            pages.iter().map(|(u, r)| (u.as_str(), r.clone())).collect(),
        ));
        let mut sink = VecSink::default();
        let report = run_batch(jobs(&ids), source, |b: &str| b.len(), &mut sink, &opts(8, 0))
            .await
            .unwrap();

        assert_eq!(report.total, 50);
        assert_eq!(sink.ok.len() + sink.failed.len(), 50);
        let mut seen: Vec<u32> = sink
            .ok
            .iter()
            .map(|(k, _)| *k)
            .chain(sink.failed.iter().map(|(k, _)| *k))
            .collect();
        seen.sort();
        assert_eq!(seen, ids);
        assert_eq!(report.failed, 17);
    }

    #[tokio::test]
    async fn concurrency_width_is_respected() {
        let ids: Vec<u32> = (0..30).collect();
        let source = Arc::new(FakeSource::new(vec![]));
        let mut sink = VecSink::default();
        run_batch(jobs(&ids), Arc::clone(&source), |b: &str| b.len(), &mut sink, &opts(3, 0))
            .await
            .unwrap();
        assert!(source.peak.load(Ordering::SeqCst) <= 3);
        assert_eq!(sink.failed.len(), 30);
    }

    #[tokio::test]
    async fn transient_failures_retried_until_success() {
        let source = FakeSource::new(vec![(
            "u/1",
            vec![
                Err(FetchError::Timeout(Duration::from_secs(1))),
                Err(FetchError::Status(503)),
                Ok("body".into()),
            ],
        )]);
        let retry = RetryPolicy {
            max_retries: 3,
            base_backoff: Duration::from_millis(1),
        };
        let body = fetch_with_retry(&source, "u/1", &retry, &1).await.unwrap();
        assert_eq!(body, "body");
        assert_eq!(source.calls("u/1"), 3);
    }

    #[tokio::test]
    async fn retries_are_bounded() {
        let source = FakeSource::new(vec![("u/1", vec![Err(FetchError::Transport("reset".into()))])]);
        let retry = RetryPolicy {
            max_retries: 2,
            base_backoff: Duration::from_millis(1),
        };
        let err = fetch_with_retry(&source, "u/1", &retry, &1).await.unwrap_err();
        assert_eq!(err, FetchError::Transport("reset".into()));
        assert_eq!(source.calls("u/1"), 3);
    }

    #[tokio::test]
    async fn permanent_failures_not_retried() {
        let source = FakeSource::new(vec![]);
        let retry = RetryPolicy {
            max_retries: 5,
            base_backoff: Duration::from_millis(1),
        };
        let err = fetch_with_retry(&source, "u/missing", &retry, &"missing").await.unwrap_err();
        assert_eq!(err, FetchError::Status(404));
        assert_eq!(source.calls("u/missing"), 1);
    }

    #[tokio::test]
    async fn empty_batch_completes() {
        let source = Arc::new(FakeSource::new(vec![]));
        let mut sink = VecSink::default();
        let report = run_batch(Vec::<Job<u32>>::new(), source, |b: &str| b.len(), &mut sink, &opts(2, 0))
            .await
            .unwrap();
        assert_eq!(report, BatchReport { total: 0, succeeded: 0, failed: 0 });
    }
}
