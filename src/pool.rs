//! Bounded Task Pool
//!
//! Runs a list of independent fetches with a fixed number of workers pulling from
//! a shared channel. Management controllers fail requests once too many sessions
//! are open, so concurrency is small (default 1).
//!
//! [`Pool::run`] returns once every task has executed exactly once. Outcomes come
//! back in task-list order no matter which worker finished first, so evaluation
//! afterwards is deterministic.

use crate::collectors::ResourceKind;
use crate::error::Result;
use futures_util::future::join_all;
use serde_json::Value;
use std::future::Future;
use tokio::sync::{mpsc, Mutex};
use tracing::debug;

/// One resource to fetch and the mapping that consumes it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Task {
    pub kind: ResourceKind,
    pub url: String,
}

impl Task {
    pub fn new(kind: ResourceKind, url: impl Into<String>) -> Self {
        Self {
            kind,
            url: url.into(),
        }
    }
}

/// Result of one executed task.
#[derive(Debug)]
pub struct TaskOutcome {
    pub task: Task,
    pub result: Result<Value>,
}

pub struct Pool {
    tasks: Vec<Task>,
    concurrency: usize,
}

impl Pool {
    pub fn new(tasks: Vec<Task>, concurrency: usize) -> Self {
        Self { tasks, concurrency }
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Execute every task with `fetch`, at most `concurrency` at a time.
    pub async fn run<F, Fut>(self, fetch: F) -> Vec<TaskOutcome>
    where
        F: Fn(&Task) -> Fut,
        Fut: Future<Output = Result<Value>>,
    {
        let total = self.tasks.len();
        if total == 0 {
            return Vec::new();
        }
        let workers = self.concurrency.clamp(1, total);
        debug!("Running {} tasks on {} workers", total, workers);

        let (tx, rx) = mpsc::unbounded_channel();
        for entry in self.tasks.into_iter().enumerate() {
            // The receiver outlives this loop.
            let _ = tx.send(entry);
        }
        drop(tx);

        let rx = Mutex::new(rx);
        let rx = &rx;
        let fetch = &fetch;

        let finished = join_all((0..workers).map(|_| async move {
            let mut done = Vec::new();
            loop {
                let next = rx.lock().await.recv().await;
                let Some((index, task)) = next else {
                    break;
                };
                let result = fetch(&task).await;
                done.push((index, TaskOutcome { task, result }));
            }
            done
        }))
        .await;

        let mut outcomes: Vec<(usize, TaskOutcome)> = finished.into_iter().flatten().collect();
        outcomes.sort_by_key(|(index, _)| *index);
        outcomes.into_iter().map(|(_, outcome)| outcome).collect()
    }
}
