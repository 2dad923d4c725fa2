//! Bounded worker pool.
//!
//! A fixed number of workers drain a shared job queue. Each job is followed
//! by a pacing pause in the worker that ran it, which keeps the request rate
//! against the marketplace low regardless of how fast pages come back.

use std::{num::NonZeroUsize, sync::Arc, time::Duration};

use tokio::task::JoinSet;
use tracing::{debug, error};

/// Run `task` over `jobs` on `workers` workers, pausing `pacing` after each
/// job. Outputs come back in completion order.
pub async fn run<J, T, F, Fut>(
    jobs: impl IntoIterator<Item = J>,
    workers: NonZeroUsize,
    pacing: Duration,
    task: F,
) -> Vec<T>
where
    J: Send + 'static,
    T: Send + 'static,
    F: Fn(J) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = T> + Send + 'static,
{
    let (job_tx, job_rx) = async_channel::unbounded();
    for job in jobs {
        // unbounded and still open: cannot fail
        let _ = job_tx.try_send(job);
    }
    job_tx.close();

    let (done_tx, done_rx) = async_channel::unbounded();
    let task = Arc::new(task);
    let mut join_set = JoinSet::new();
    for worker in 0..workers.get() {
        let jobs = job_rx.clone();
        let done = done_tx.clone();
        let task = task.clone();
        join_set.spawn(async move {
            let mut handled = 0usize;
            while let Ok(job) = jobs.recv().await {
                let output = task(job).await;
                handled += 1;
                if done.send(output).await.is_err() {
                    break;
                }
                if !pacing.is_zero() {
                    tokio::time::sleep(pacing).await;
                }
            }
            debug!(worker, handled, "worker drained");
        });
    }
    drop(done_tx);

    let mut outputs = Vec::new();
    while let Ok(output) = done_rx.recv().await {
        outputs.push(output);
    }
    while let Some(joined) = join_set.join_next().await {
        if let Err(error) = joined {
            error!(%error, "worker aborted");
        }
    }
    outputs
}

#[cfg(test)]
mod test {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    #[tokio::test]
    async fn every_job_runs_once() {
        let mut outputs = run(
            1..=20u32,
            NonZeroUsize::new(4).unwrap(),
            Duration::ZERO,
            |n| async move { n * 2 },
        )
        .await;
        outputs.sort_unstable();
        assert_eq!(outputs, (1..=20).map(|n| n * 2).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn concurrency_is_bounded() {
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let outputs = run(
            0..16,
            NonZeroUsize::new(3).unwrap(),
            Duration::from_millis(1),
            {
                let running = running.clone();
                let peak = peak.clone();
                move |_: i32| {
                    let running = running.clone();
                    let peak = peak.clone();
                    async move {
                        let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                        peak.fetch_max(now, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(5)).await;
                        running.fetch_sub(1, Ordering::SeqCst);
                    }
                }
            },
        )
        .await;
        assert_eq!(outputs.len(), 16);
        assert!(peak.load(Ordering::SeqCst) <= 3);
    }

    #[tokio::test]
    async fn no_jobs_no_outputs() {
        let outputs: Vec<()> = run(
            Vec::<()>::new(),
            NonZeroUsize::new(2).unwrap(),
            Duration::ZERO,
            |()| async {},
        )
        .await;
        assert!(outputs.is_empty());
    }
}
