//! Single cooperative background worker.
//!
//! One thread drains a task queue of index persistence, async embedding
//! generation, and replication dispatch. Task errors are logged and the loop
//! proceeds; no user request ever blocks on (or fails because of) a
//! background task. `SaveIndex` submissions coalesce: while one is queued,
//! further ones are dropped in favor of the newest state.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc::{channel, Sender};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::Result;
use crate::types::WalEntry;

/// Closed set of background task types.
#[derive(Debug, Clone)]
pub enum Task {
    /// Persist the ANN snapshot.
    SaveIndex,
    /// Compute a vector for the entity's text and write it back.
    GenerateEmbedding { entity_id: Uuid, text: String },
    /// Hand a WAL record to the replication transport.
    Replicate { entry: WalEntry },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerStatus {
    Idle,
    Busy,
    Stopped,
    Error,
}

enum Message {
    Run(Task),
    Shutdown,
}

struct Shared {
    status: Mutex<WorkerStatus>,
    pending: AtomicUsize,
    save_queued: AtomicBool,
    running: AtomicBool,
    last_error: Mutex<Option<String>>,
}

/// Handle to the worker thread. Owned by the database handle, not global.
pub struct BackgroundWorker {
    sender: Sender<Message>,
    handle: Mutex<Option<JoinHandle<()>>>,
    shared: Arc<Shared>,
}

impl BackgroundWorker {
    /// Spawn the worker loop around a task handler.
    pub fn start<F>(handler: F) -> Self
    where
        F: Fn(Task) -> Result<()> + Send + 'static,
    {
        let (sender, receiver) = channel::<Message>();
        let shared = Arc::new(Shared {
            status: Mutex::new(WorkerStatus::Idle),
            pending: AtomicUsize::new(0),
            save_queued: AtomicBool::new(false),
            running: AtomicBool::new(true),
            last_error: Mutex::new(None),
        });

        let loop_shared = shared.clone();
        let handle = std::thread::Builder::new()
            .name("remdb-worker".into())
            .spawn(move || {
                while let Ok(message) = receiver.recv() {
                    if !loop_shared.running.load(Ordering::SeqCst) {
                        break;
                    }
                    let task = match message {
                        Message::Run(task) => task,
                        Message::Shutdown => break,
                    };
                    if matches!(task, Task::SaveIndex) {
                        loop_shared.save_queued.store(false, Ordering::SeqCst);
                    }
                    *loop_shared.status.lock() = WorkerStatus::Busy;
                    if let Err(err) = handler(task) {
                        warn!("background task failed: {err}");
                        *loop_shared.last_error.lock() = Some(err.to_string());
                        *loop_shared.status.lock() = WorkerStatus::Error;
                    }
                    loop_shared.pending.fetch_sub(1, Ordering::SeqCst);
                    let mut status = loop_shared.status.lock();
                    if *status == WorkerStatus::Busy {
                        *status = WorkerStatus::Idle;
                    }
                }
                *loop_shared.status.lock() = WorkerStatus::Stopped;
            })
            .expect("failed to spawn worker thread");

        Self {
            sender,
            handle: Mutex::new(Some(handle)),
            shared,
        }
    }

    /// Queue a task. `SaveIndex` coalesces with an already-queued save.
    pub fn submit(&self, task: Task) {
        if matches!(task, Task::SaveIndex)
            && self.shared.save_queued.swap(true, Ordering::SeqCst)
        {
            debug!("coalescing redundant SaveIndex task");
            return;
        }
        self.shared.pending.fetch_add(1, Ordering::SeqCst);
        if self.sender.send(Message::Run(task)).is_err() {
            // Worker already stopped; nothing will drain this.
            self.shared.pending.fetch_sub(1, Ordering::SeqCst);
        }
    }

    pub fn status(&self) -> WorkerStatus {
        *self.shared.status.lock()
    }

    pub fn queue_len(&self) -> usize {
        self.shared.pending.load(Ordering::SeqCst)
    }

    pub fn last_error(&self) -> Option<String> {
        self.shared.last_error.lock().clone()
    }

    /// Block until the queue drains or `timeout` elapses. Returns whether
    /// the worker reached idle.
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            if self.queue_len() == 0 && self.status() != WorkerStatus::Busy {
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            std::thread::sleep(Duration::from_millis(10));
        }
    }

    /// Request shutdown; the worker drains the queue or aborts at `timeout`.
    pub fn stop(&self, timeout: Duration) {
        let _ = self.sender.send(Message::Shutdown);
        let deadline = Instant::now() + timeout;
        if let Some(handle) = self.handle.lock().take() {
            while !handle.is_finished() && Instant::now() < deadline {
                std::thread::sleep(Duration::from_millis(10));
            }
            if handle.is_finished() {
                let _ = handle.join();
            } else {
                // Abandon the tail of the queue; the loop exits after the
                // current task.
                self.shared.running.store(false, Ordering::SeqCst);
            }
        }
        *self.shared.status.lock() = WorkerStatus::Stopped;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn tasks_run_in_submission_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let sink = log.clone();
        let worker = BackgroundWorker::start(move |task| {
            if let Task::GenerateEmbedding { text, .. } = task {
                sink.lock().push(text);
            }
            Ok(())
        });

        for i in 0..5 {
            worker.submit(Task::GenerateEmbedding {
                entity_id: Uuid::nil(),
                text: format!("t{i}"),
            });
        }
        assert!(worker.wait_idle(Duration::from_secs(5)));
        assert_eq!(*log.lock(), vec!["t0", "t1", "t2", "t3", "t4"]);
        worker.stop(Duration::from_secs(1));
        assert_eq!(worker.status(), WorkerStatus::Stopped);
    }

    #[test]
    fn errors_do_not_stop_the_loop() {
        let runs = Arc::new(AtomicUsize::new(0));
        let counter = runs.clone();
        let worker = BackgroundWorker::start(move |task| {
            counter.fetch_add(1, Ordering::SeqCst);
            match task {
                Task::SaveIndex => Err(crate::error::DbError::Embedding("boom".into())),
                _ => Ok(()),
            }
        });

        worker.submit(Task::SaveIndex);
        worker.submit(Task::GenerateEmbedding {
            entity_id: Uuid::nil(),
            text: "after".into(),
        });
        assert!(worker.wait_idle(Duration::from_secs(5)));
        assert_eq!(runs.load(Ordering::SeqCst), 2);
        assert_eq!(worker.last_error().unwrap(), "embedding error: boom");
        worker.stop(Duration::from_secs(1));
    }

    #[test]
    fn save_index_tasks_coalesce() {
        let saves = Arc::new(AtomicUsize::new(0));
        let counter = saves.clone();
        let gate = Arc::new(Mutex::new(()));
        let held = gate.lock();

        let gate_in_worker = gate.clone();
        let worker = BackgroundWorker::start(move |task| {
            if matches!(task, Task::SaveIndex) {
                // Park until the test releases the gate so submissions
                // pile up behind one queued save.
                let _g = gate_in_worker.lock();
                counter.fetch_add(1, Ordering::SeqCst);
            }
            Ok(())
        });

        worker.submit(Task::SaveIndex);
        // Give the worker a moment to dequeue the first save (clearing the
        // queued flag) and block on the gate.
        std::thread::sleep(Duration::from_millis(50));
        worker.submit(Task::SaveIndex);
        worker.submit(Task::SaveIndex);
        worker.submit(Task::SaveIndex);
        drop(held);

        assert!(worker.wait_idle(Duration::from_secs(5)));
        // First save plus exactly one coalesced follow-up.
        assert_eq!(saves.load(Ordering::SeqCst), 2);
        worker.stop(Duration::from_secs(1));
    }
}
