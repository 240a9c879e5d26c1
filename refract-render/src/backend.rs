use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc;
use std::thread::JoinHandle;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, error, warn};

use crate::error::RenderError;
use crate::task::{ComputeTask, TaskResult};

/// Which compute units the controller prefers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BackendKind {
    #[default]
    Cpu,
    Gpu,
}

/// Host parallelism, or 1 if it cannot be queried.
pub fn default_worker_count() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

/// Run `compute` for `task`, turning a panic into [`ComputeTask::failed`]
/// so the worker survives and the tile's pending count still drains.
pub(crate) fn run_caught(
    task: &ComputeTask,
    compute: impl FnOnce(&ComputeTask) -> TaskResult,
) -> TaskResult {
    match panic::catch_unwind(AssertUnwindSafe(|| compute(task))) {
        Ok(result) => result,
        Err(payload) => {
            let reason = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            error!(
                epoch = task.epoch,
                tile = task.tile_id,
                stage = task.stage,
                "Band computation panicked: {reason}"
            );
            task.failed()
        }
    }
}

struct Worker {
    tx: Option<mpsc::Sender<ComputeTask>>,
    handle: Option<JoinHandle<()>>,
}

impl Worker {
    fn spawn(index: usize, result_tx: mpsc::Sender<TaskResult>) -> crate::Result<Self> {
        let (tx, rx) = mpsc::channel::<ComputeTask>();
        let handle = std::thread::Builder::new()
            .name(format!("refract-worker-{index}"))
            .spawn(move || {
                debug!(worker = index, "Compute worker started");
                while let Ok(task) = rx.recv() {
                    if result_tx.send(run_caught(&task, ComputeTask::run)).is_err() {
                        break;
                    }
                }
                debug!(worker = index, "Compute worker exiting");
            })
            .map_err(RenderError::WorkerSpawn)?;
        Ok(Self {
            tx: Some(tx),
            handle: Some(handle),
        })
    }
}

/// A fixed set of long-lived worker threads, one task channel each.
///
/// Tasks are handed out round-robin with no load feedback; each worker runs
/// one band at a time and replies on the shared result channel. Workers
/// whose channel has closed are respawned on the next submit.
pub struct CpuPool {
    workers: Vec<Worker>,
    next: usize,
    result_tx: mpsc::Sender<TaskResult>,
    results: mpsc::Receiver<TaskResult>,
}

impl CpuPool {
    /// Spawn `count` workers (at least one).
    pub fn new(count: usize) -> crate::Result<Self> {
        let count = count.max(1);
        let (result_tx, results) = mpsc::channel::<TaskResult>();
        let workers = (0..count)
            .map(|index| Worker::spawn(index, result_tx.clone()))
            .collect::<crate::Result<Vec<_>>>()?;

        debug!(workers = count, "CPU pool ready");
        Ok(Self {
            workers,
            next: 0,
            result_tx,
            results,
        })
    }

    pub fn len(&self) -> usize {
        self.workers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }

    /// Whether any worker still accepts tasks.
    pub fn has_live_workers(&self) -> bool {
        self.workers.iter().any(|w| w.tx.is_some())
    }

    fn send_round_robin(&mut self, task: ComputeTask) -> Option<ComputeTask> {
        let count = self.workers.len();
        for _ in 0..count {
            let index = self.next;
            self.next = (self.next + 1) % count;
            let Some(tx) = &self.workers[index].tx else {
                continue;
            };
            if tx.send(task).is_ok() {
                return None;
            }
            warn!(worker = index, "Compute worker channel closed");
            self.workers[index].tx = None;
        }
        Some(task)
    }

    /// Replace every worker whose channel is closed. Returns how many came
    /// back.
    fn respawn_dead(&mut self) -> usize {
        let mut respawned = 0;
        for (index, worker) in self.workers.iter_mut().enumerate() {
            if worker.tx.is_some() {
                continue;
            }
            if let Some(handle) = worker.handle.take() {
                let _ = handle.join();
            }
            match Worker::spawn(index, self.result_tx.clone()) {
                Ok(fresh) => {
                    *worker = fresh;
                    respawned += 1;
                }
                Err(e) => error!(worker = index, "Cannot respawn compute worker: {e}"),
            }
        }
        if respawned > 0 {
            warn!(respawned, "Compute workers respawned");
        }
        respawned
    }

    /// Hand a task to the next worker in turn. Gives the task back when no
    /// worker is left to take it, even after respawning.
    #[must_use = "a returned task was never queued"]
    pub fn submit(&mut self, task: ComputeTask) -> Option<ComputeTask> {
        let task = self.send_round_robin(task)?;
        if self.respawn_dead() > 0 {
            return self.send_round_robin(task);
        }
        warn!(tile = task.tile_id, "No live compute worker");
        Some(task)
    }

    /// Submit every task, returning those no worker accepted.
    #[must_use = "returned tasks were never queued"]
    pub fn submit_all(&mut self, tasks: impl IntoIterator<Item = ComputeTask>) -> Vec<ComputeTask> {
        tasks
            .into_iter()
            .filter_map(|task| self.submit(task))
            .collect()
    }

    /// Close every worker's task channel, as if all of them had exited.
    #[cfg(test)]
    pub(crate) fn close_workers(&mut self) {
        for worker in &mut self.workers {
            worker.tx.take();
        }
    }

    /// Next finished result, without blocking.
    pub fn try_recv(&self) -> Option<TaskResult> {
        self.results.try_recv().ok()
    }

    /// Next finished result, waiting at most `timeout`.
    pub fn recv_timeout(&self, timeout: Duration) -> Option<TaskResult> {
        self.results.recv_timeout(timeout).ok()
    }
}

impl Drop for CpuPool {
    fn drop(&mut self) {
        for worker in &mut self.workers {
            worker.tx.take();
        }
        for worker in &mut self.workers {
            if let Some(handle) = worker.handle.take() {
                let _ = handle.join();
            }
        }
    }
}

impl std::fmt::Debug for CpuPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CpuPool")
            .field("workers", &self.workers.len())
            .field("next", &self.next)
            .finish()
    }
}
