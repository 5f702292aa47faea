//! Adaptive status polling for a single task.
//!
//! A fetch is issued as soon as a task id is watched. After every successful
//! fetch the next one is scheduled `interval` later, but only while the task is
//! PENDING or RUNNING. A failed fetch surfaces an error and ends the schedule;
//! only `refresh` (or watching a new id) starts it again. This keeps a broken
//! backend from being hammered, at the cost of stalling updates after a single
//! transient failure.

use std::{sync::Arc, time::Duration};
use tokio::{sync::mpsc, task::JoinHandle};

use crate::{
    api::task::{TaskApi, TaskSnapshot},
    events::AppEvent,
};

/// Progress of the poll loop, tagged with the generation that produced it.
#[derive(Debug)]
pub enum PollEvent {
    /// A fetch was issued.
    Started { generation: u64 },
    Fetched {
        generation: u64,
        snapshot: TaskSnapshot,
    },
    Failed { generation: u64, message: String },
}

/// Owns the poll schedule of the task currently on screen.
pub struct TaskPoller {
    api: Arc<dyn TaskApi>,
    interval: Duration,
    tx: mpsc::Sender<AppEvent>,
    task_id: Option<String>,
    /// Bumped whenever the schedule restarts; older events are discarded.
    generation: u64,
    /// The one schedule this controller may have alive.
    handle: Option<JoinHandle<()>>,
    snapshot: Option<TaskSnapshot>,
    loading: bool,
    error: Option<String>,
}

impl TaskPoller {
    pub fn new(api: Arc<dyn TaskApi>, interval: Duration, tx: mpsc::Sender<AppEvent>) -> Self {
        Self {
            api,
            interval,
            tx,
            task_id: None,
            generation: 0,
            handle: None,
            snapshot: None,
            loading: false,
            error: None,
        }
    }

    /// Observe `task_id`, restarting polling from scratch if it changed.
    pub fn watch(&mut self, task_id: Option<String>) {
        if task_id.is_some() && task_id == self.task_id {
            return;
        }
        self.stop();
        self.snapshot = None;
        self.error = None;
        self.task_id = task_id;
        if self.task_id.is_some() {
            self.restart();
        }
    }

    /// Fetch now and resume the schedule, e.g. after a failed fetch.
    pub fn refresh(&mut self) {
        if self.task_id.is_some() {
            self.restart();
        }
    }

    /// Cancel any pending fetch. Called when the detail view goes away.
    pub fn stop(&mut self) {
        if let Some(h) = self.handle.take() {
            h.abort();
        }
        // Anything already queued by the aborted loop is now stale.
        self.generation += 1;
        self.loading = false;
    }

    fn restart(&mut self) {
        self.stop();
        let Some(task_id) = self.task_id.clone() else {
            return;
        };
        tracing::info!("polling task {task_id} (generation {})", self.generation);
        self.loading = true;
        self.handle = Some(tokio::spawn(poll_loop(
            self.api.clone(),
            task_id,
            self.interval,
            self.generation,
            self.tx.clone(),
        )));
    }

    /// Apply a poll event. Snapshots are replaced wholesale; failures keep the
    /// last good snapshot.
    pub fn apply(&mut self, ev: PollEvent) {
        let generation = match &ev {
            PollEvent::Started { generation }
            | PollEvent::Fetched { generation, .. }
            | PollEvent::Failed { generation, .. } => *generation,
        };
        if generation != self.generation {
            tracing::debug!("dropping stale poll event (generation {generation})");
            return;
        }
        match ev {
            PollEvent::Started { .. } => self.loading = true,
            PollEvent::Fetched { snapshot, .. } => {
                self.loading = false;
                self.error = None;
                self.snapshot = Some(snapshot);
            }
            PollEvent::Failed { message, .. } => {
                self.loading = false;
                self.error = Some(message);
            }
        }
    }

    pub fn task_id(&self) -> Option<&str> {
        self.task_id.as_deref()
    }

    pub fn snapshot(&self) -> Option<&TaskSnapshot> {
        self.snapshot.as_ref()
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// True while a fetch or a scheduled follow-up is outstanding.
    pub fn is_polling(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }
}

impl Drop for TaskPoller {
    fn drop(&mut self) {
        if let Some(h) = self.handle.take() {
            h.abort();
        }
    }
}

async fn poll_loop(
    api: Arc<dyn TaskApi>,
    task_id: String,
    interval: Duration,
    generation: u64,
    tx: mpsc::Sender<AppEvent>,
) {
    loop {
        let _ = tx
            .send(AppEvent::Poll(PollEvent::Started { generation }))
            .await;

        match api.get_task(&task_id).await {
            Ok(snapshot) => {
                let status = snapshot.status;
                tracing::debug!("task {task_id} is {status}");
                let sent = tx
                    .send(AppEvent::Poll(PollEvent::Fetched {
                        generation,
                        snapshot,
                    }))
                    .await;
                if sent.is_err() {
                    return;
                }
                if status.is_terminal() {
                    tracing::info!("task {task_id} finished as {status}, polling stopped");
                    return;
                }
            }
            Err(e) => {
                // No retry here: a manual refresh restarts the schedule.
                tracing::error!("fetching task {task_id} failed: {e}");
                let _ = tx
                    .send(AppEvent::Poll(PollEvent::Failed {
                        generation,
                        message: e.to_string(),
                    }))
                    .await;
                return;
            }
        }

        tokio::time::sleep(interval).await;
    }
}
