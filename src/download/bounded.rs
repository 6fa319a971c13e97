//! Bounded-parallelism batch downloader.
//!
//! A fixed pool of workers pulls tasks from a shared queue, fetches each
//! document and writes it straight to its destination. Results are handed
//! back in completion order. A failed task never cancels its siblings and
//! nothing is retried here; retry decisions belong to the caller.

use std::collections::VecDeque;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use anyhow::{Context, Result};
use async_trait::async_trait;
use indicatif::{ProgressBar, ProgressStyle};
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::models::{DownloadTask, TaskResult};

/// Capability to fetch the bytes of one document.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, task: &DownloadTask) -> Result<Vec<u8>>;
}

/// Runs batches of download tasks with a fixed concurrency ceiling.
#[derive(Debug, Clone)]
pub struct BoundedDownloader {
    concurrency_limit: usize,
    show_progress: bool,
}

impl BoundedDownloader {
    pub fn new(concurrency_limit: usize) -> Self {
        Self {
            concurrency_limit: concurrency_limit.max(1),
            show_progress: false,
        }
    }

    /// Render a terminal progress bar while collecting results.
    pub fn with_progress_bar(mut self, enabled: bool) -> Self {
        self.show_progress = enabled;
        self
    }

    pub fn concurrency_limit(&self) -> usize {
        self.concurrency_limit
    }

    /// Start a batch and return a handle to observe and collect it.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start_batch(&self, tasks: Vec<DownloadTask>, fetcher: Arc<dyn Fetcher>) -> BatchHandle {
        let total = tasks.len();
        let completed = Arc::new(AtomicUsize::new(0));
        let (tx, rx) = mpsc::unbounded_channel();

        let worker_count = self.concurrency_limit.min(total);
        let queue = Arc::new(Mutex::new(VecDeque::from(tasks)));
        let mut workers = Vec::with_capacity(worker_count);

        for worker_id in 0..worker_count {
            let queue = Arc::clone(&queue);
            let fetcher = Arc::clone(&fetcher);
            let completed = Arc::clone(&completed);
            let tx = tx.clone();

            workers.push(tokio::spawn(async move {
                loop {
                    let next = queue
                        .lock()
                        .unwrap_or_else(|poisoned| poisoned.into_inner())
                        .pop_front();
                    let Some(task) = next else {
                        break;
                    };

                    let result = run_task(worker_id, task, fetcher.as_ref()).await;
                    completed.fetch_add(1, Ordering::SeqCst);
                    if tx.send(result).is_err() {
                        break;
                    }
                }
                debug!("Download worker {} finished", worker_id);
            }));
        }

        if total > 0 {
            info!(
                "Started batch of {} downloads with {} workers",
                total, worker_count
            );
        }

        BatchHandle {
            total,
            completed,
            results: rx,
            workers,
            progress: self.progress_bar(total),
        }
    }

    /// Run a batch to completion and return one result per task.
    pub async fn run_batch(
        &self,
        tasks: Vec<DownloadTask>,
        fetcher: Arc<dyn Fetcher>,
    ) -> Vec<TaskResult> {
        self.start_batch(tasks, fetcher).collect().await
    }

    fn progress_bar(&self, total: usize) -> ProgressBar {
        if !self.show_progress || total == 0 {
            return ProgressBar::hidden();
        }
        let bar = ProgressBar::new(total as u64);
        bar.set_style(
            ProgressStyle::with_template(
                "{spinner} [{elapsed_precise}] {bar:40} {pos}/{len} downloads",
            )
            .unwrap_or_else(|_| ProgressStyle::default_bar()),
        );
        bar
    }
}

/// Handle to a running batch.
pub struct BatchHandle {
    total: usize,
    completed: Arc<AtomicUsize>,
    results: mpsc::UnboundedReceiver<TaskResult>,
    workers: Vec<JoinHandle<()>>,
    progress: ProgressBar,
}

impl BatchHandle {
    pub fn total(&self) -> usize {
        self.total
    }

    /// Number of tasks finished so far. Monotonic, safe to poll while the
    /// workers are running.
    pub fn completed(&self) -> usize {
        self.completed.load(Ordering::SeqCst)
    }

    /// Wait for the next finished task, or `None` once the batch is drained.
    pub async fn next_result(&mut self) -> Option<TaskResult> {
        let result = self.results.recv().await;
        self.progress.set_position(self.completed() as u64);
        result
    }

    /// Wait for every task and return the results in completion order.
    pub async fn collect(mut self) -> Vec<TaskResult> {
        let mut results = Vec::with_capacity(self.total);
        while let Some(result) = self.next_result().await {
            results.push(result);
        }

        for worker in self.workers.drain(..) {
            if let Err(e) = worker.await {
                error!("Download worker terminated abnormally: {}", e);
            }
        }
        self.progress.finish_and_clear();

        let failed = results.iter().filter(|r| !r.success).count();
        if self.total > 0 {
            info!(
                "Batch finished: {} succeeded, {} failed",
                results.len() - failed,
                failed
            );
        }
        results
    }
}

async fn run_task(worker_id: usize, task: DownloadTask, fetcher: &dyn Fetcher) -> TaskResult {
    let start = Instant::now();
    debug!("Worker {} fetching {}", worker_id, task.source_id);

    let outcome = match fetcher.fetch(&task).await {
        Ok(bytes) => write_artifact(&task.destination_path, &bytes)
            .await
            .map(|_| bytes.len() as u64),
        Err(e) => Err(e),
    };
    let duration_ms = start.elapsed().as_millis() as u64;

    match outcome {
        Ok(bytes_written) => {
            debug!(
                "Downloaded {} ({} bytes) in {}ms",
                task.source_id, bytes_written, duration_ms
            );
            TaskResult::succeeded(task, bytes_written, duration_ms)
        }
        Err(e) => {
            warn!("Download of {} failed: {:#}", task.source_id, e);
            TaskResult::failed(task, format!("{:#}", e), duration_ms)
        }
    }
}

/// Write fetched bytes to `dest`, creating parent directories if needed.
async fn write_artifact(dest: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = dest.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .context("Failed to create parent directories")?;
    }

    let mut file = tokio::fs::File::create(dest)
        .await
        .context("Failed to create destination file")?;
    file.write_all(bytes)
        .await
        .context("Failed to write to file")?;
    file.flush().await.context("Failed to flush file")?;
    Ok(())
}
