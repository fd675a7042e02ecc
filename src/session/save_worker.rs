//! Non-blocking episode persistence.
//!
//! Episode writes can take longer than a frame period, so the capture
//! loop never touches the filesystem itself. It hands finished episodes
//! to a pool of writer threads through an unbounded channel; enqueue is
//! a send on that channel and cannot block or fail while the pool is up.

use super::episode::Episode;
use super::episode_file::write_episode;
use crate::error::{Error, Result};
use crossbeam_channel::{unbounded, Sender};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

/// One pending save
pub struct SaveTask {
    pub path: PathBuf,
    pub episode: Episode,
}

/// Fixed pool of writer threads draining a task queue
pub struct SaveWorker {
    sender: Option<Sender<SaveTask>>,
    handles: Vec<JoinHandle<()>>,
    completed: Arc<AtomicU64>,
    failed: Arc<AtomicU64>,
}

impl SaveWorker {
    /// Start `workers` writer threads (at least one)
    pub fn new(workers: usize) -> Result<Self> {
        let workers = workers.max(1);
        let (sender, receiver) = unbounded::<SaveTask>();
        let completed = Arc::new(AtomicU64::new(0));
        let failed = Arc::new(AtomicU64::new(0));

        let mut handles = Vec::with_capacity(workers);
        for index in 0..workers {
            let receiver = receiver.clone();
            let completed = completed.clone();
            let failed = failed.clone();
            let handle = std::thread::Builder::new()
                .name(format!("save-worker-{}", index))
                .spawn(move || {
                    // Exits when every sender is dropped and the queue drains
                    while let Ok(task) = receiver.recv() {
                        match write_episode(&task.path, &task.episode) {
                            Ok(()) => {
                                completed.fetch_add(1, Ordering::Relaxed);
                            }
                            Err(e) => {
                                failed.fetch_add(1, Ordering::Relaxed);
                                log::error!(
                                    "Failed to save episode to {}: {}",
                                    task.path.display(),
                                    e
                                );
                            }
                        }
                    }
                })
                .map_err(|e| Error::Connection(format!("failed to spawn save worker: {}", e)))?;
            handles.push(handle);
        }

        log::info!("Save worker pool started ({} threads)", workers);
        Ok(SaveWorker {
            sender: Some(sender),
            handles,
            completed,
            failed,
        })
    }

    /// Queue an episode for writing. Returns immediately.
    pub fn enqueue(&self, path: impl Into<PathBuf>, episode: Episode) -> Result<()> {
        let sender = self
            .sender
            .as_ref()
            .ok_or_else(|| Error::InvalidParameter("save worker already shut down".to_string()))?;
        let path = path.into();
        log::debug!("Queueing episode save to {}", path.display());
        sender
            .send(SaveTask { path, episode })
            .map_err(|_| Error::InvalidParameter("save worker pool is gone".to_string()))
    }

    /// Episodes written successfully so far
    pub fn completed(&self) -> u64 {
        self.completed.load(Ordering::Relaxed)
    }

    /// Episodes that failed to write
    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }

    /// Drain the queue and stop the pool. Blocks until every queued
    /// episode has been written or has failed.
    pub fn shutdown(mut self) {
        self.shutdown_inner();
    }

    fn shutdown_inner(&mut self) {
        // Closing the channel lets the workers finish the backlog and exit
        drop(self.sender.take());
        for handle in self.handles.drain(..) {
            if handle.join().is_err() {
                log::warn!("A save worker thread panicked");
            }
        }
        let failed = self.failed.load(Ordering::Relaxed);
        if failed > 0 {
            log::warn!("Save worker pool stopped with {} failed episodes", failed);
        } else {
            log::info!(
                "Save worker pool stopped ({} episodes written)",
                self.completed.load(Ordering::Relaxed)
            );
        }
    }
}

impl Drop for SaveWorker {
    fn drop(&mut self) {
        if self.sender.is_some() {
            self.shutdown_inner();
        }
    }
}
