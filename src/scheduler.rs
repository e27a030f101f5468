//! Fixed-size worker pool for background cache rebuilds.
//!
//! Jobs are fire-and-forget: `submit` never waits for a worker and the
//! submitter never observes completion. The queue is unbounded, so a saturated
//! pool queues work rather than rejecting it.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use futures_util::FutureExt;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::error::CacheError;

pub const DEFAULT_REBUILD_WORKERS: usize = 10;

pub type RebuildJob = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

#[derive(Default)]
struct Counters {
  submitted: AtomicU64,
  completed: AtomicU64,
  panicked: AtomicU64,
}

pub struct RebuildScheduler {
  tx: Mutex<Option<mpsc::UnboundedSender<RebuildJob>>>,
  workers: Mutex<Vec<JoinHandle<()>>>,
  size: usize,
  counters: Arc<Counters>,
}

impl RebuildScheduler {
  /// Spawn `size` workers on the current tokio runtime.
  pub fn new(size: usize) -> Self {
    let size = size.max(1);
    let (tx, rx) = mpsc::unbounded_channel::<RebuildJob>();
    let rx = Arc::new(tokio::sync::Mutex::new(rx));
    let counters = Arc::new(Counters::default());

    let workers = (0..size)
      .map(|worker| {
        let rx = rx.clone();
        let counters = counters.clone();
        tokio::spawn(async move {
          loop {
            // Hold the receiver only while waiting, so idle workers queue up
            // behind the one currently receiving.
            let job = { rx.lock().await.recv().await };
            let Some(job) = job else { break };

            if AssertUnwindSafe(job).catch_unwind().await.is_err() {
              counters.panicked.fetch_add(1, Ordering::Relaxed);
              tracing::error!(worker, "Rebuild job panicked");
            }
            counters.completed.fetch_add(1, Ordering::Relaxed);
          }
          tracing::debug!(worker, "Rebuild worker stopped");
        })
      })
      .collect();

    tracing::info!("Rebuild scheduler started with {} workers", size);
    Self {
      tx: Mutex::new(Some(tx)),
      workers: Mutex::new(workers),
      size,
      counters,
    }
  }

  /// Queue a job without waiting for it to start or finish.
  pub fn submit<F>(&self, job: F) -> Result<(), CacheError>
  where
    F: Future<Output = ()> + Send + 'static,
  {
    let tx = self.tx.lock();
    let tx = tx.as_ref().ok_or(CacheError::SchedulerClosed)?;
    tx.send(Box::pin(job))
      .map_err(|_| CacheError::SchedulerClosed)?;
    self.counters.submitted.fetch_add(1, Ordering::Relaxed);
    Ok(())
  }

  pub fn workers(&self) -> usize {
    self.size
  }

  pub fn submitted(&self) -> u64 {
    self.counters.submitted.load(Ordering::Relaxed)
  }

  pub fn completed(&self) -> u64 {
    self.counters.completed.load(Ordering::Relaxed)
  }

  pub fn panicked(&self) -> u64 {
    self.counters.panicked.load(Ordering::Relaxed)
  }

  /// Jobs submitted but not yet finished
  pub fn pending(&self) -> u64 {
    self.submitted().saturating_sub(self.completed())
  }

  /// Stop accepting jobs and wait for the queued ones to finish.
  pub async fn shutdown(&self) {
    drop(self.tx.lock().take());
    let workers = std::mem::take(&mut *self.workers.lock());
    for worker in workers {
      if let Err(e) = worker.await {
        tracing::error!("Rebuild worker failed: {}", e);
      }
    }
    tracing::info!("Rebuild scheduler stopped");
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::sync::atomic::AtomicUsize;
  use std::time::{Duration, Instant};

  #[tokio::test]
  async fn test_submit_does_not_wait() {
    let scheduler = RebuildScheduler::new(2);
    let start = Instant::now();
    scheduler
      .submit(async {
        tokio::time::sleep(Duration::from_millis(200)).await;
      })
      .unwrap();
    assert!(start.elapsed() < Duration::from_millis(100));
    scheduler.shutdown().await;
    assert_eq!(scheduler.completed(), 1);
  }

  #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
  async fn test_runs_all_jobs_with_bounded_concurrency() {
    let scheduler = RebuildScheduler::new(3);
    let running = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));

    for _ in 0..12 {
      let running = running.clone();
      let peak = peak.clone();
      scheduler
        .submit(async move {
          let now = running.fetch_add(1, Ordering::SeqCst) + 1;
          peak.fetch_max(now, Ordering::SeqCst);
          tokio::time::sleep(Duration::from_millis(20)).await;
          running.fetch_sub(1, Ordering::SeqCst);
        })
        .unwrap();
    }

    scheduler.shutdown().await;
    assert_eq!(scheduler.completed(), 12);
    assert_eq!(scheduler.pending(), 0);
    assert!(peak.load(Ordering::SeqCst) <= 3);
  }

  #[tokio::test]
  async fn test_panicking_job_keeps_worker_alive() {
    let scheduler = RebuildScheduler::new(1);
    let ran = Arc::new(AtomicUsize::new(0));

    scheduler.submit(async { panic!("boom") }).unwrap();
    let r = ran.clone();
    scheduler
      .submit(async move {
        r.fetch_add(1, Ordering::SeqCst);
      })
      .unwrap();

    scheduler.shutdown().await;
    assert_eq!(scheduler.panicked(), 1);
    assert_eq!(ran.load(Ordering::SeqCst), 1);
  }

  #[tokio::test]
  async fn test_submit_after_shutdown_fails() {
    let scheduler = RebuildScheduler::new(1);
    scheduler.shutdown().await;
    assert!(matches!(
      scheduler.submit(async {}),
      Err(CacheError::SchedulerClosed)
    ));
  }
}
