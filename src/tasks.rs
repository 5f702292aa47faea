//! Task listing, submission and cancellation.

use std::sync::Arc;
use tokio::sync::mpsc;

use crate::{
    api::task::{
        TaskApi, TaskListQuery, TaskListResponse, TaskSnapshot, TaskStatus, TaskSubmitRequest,
    },
    events::{AppEvent, spawn_reported},
};

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum TaskFormError {
    #[error("task type is required")]
    MissingTaskType,
}

#[derive(Debug)]
pub enum BoardEvent {
    Listed {
        seq: u64,
        outcome: Result<TaskListResponse, String>,
    },
    Submitted(Result<TaskSnapshot, String>),
    Cancelled {
        task_id: String,
        outcome: Result<(), String>,
    },
}

/// What the status bar should say after a board event.
#[derive(Debug, PartialEq, Eq)]
pub enum BoardNotice {
    Created(String),
    Cancelled(String),
    Failed(String),
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TaskFilter {
    pub status: Option<TaskStatus>,
    pub task_type: Option<String>,
}

pub struct TaskBoard {
    api: Arc<dyn TaskApi>,
    tx: mpsc::Sender<AppEvent>,
    pub tasks: Vec<TaskSnapshot>,
    pub total: u64,
    /// 1-based.
    pub page: u32,
    pub page_size: u32,
    pub filter: TaskFilter,
    pub loading: bool,
    pub error: Option<String>,
    /// Sequence of the newest list request; older replies are dropped.
    seq: u64,
}

impl TaskBoard {
    pub fn new(api: Arc<dyn TaskApi>, page_size: u32, tx: mpsc::Sender<AppEvent>) -> Self {
        Self {
            api,
            tx,
            tasks: Vec::new(),
            total: 0,
            page: 1,
            page_size: page_size.max(1),
            filter: TaskFilter::default(),
            loading: false,
            error: None,
            seq: 0,
        }
    }

    pub fn query(&self) -> TaskListQuery {
        TaskListQuery {
            status: self.filter.status,
            task_type: self.filter.task_type.clone(),
            page: self.page,
            page_size: self.page_size,
        }
    }

    pub fn refresh(&mut self) {
        self.seq += 1;
        self.loading = true;
        let seq = self.seq;
        let query = self.query();
        let api = self.api.clone();
        let tx = self.tx.clone();
        spawn_reported(
            tx,
            async move { api.list_tasks(&query).await.map_err(|e| e.to_string()) },
            move |outcome| AppEvent::Board(BoardEvent::Listed { seq, outcome }),
        );
    }

    /// Replace the filter and go back to the first page.
    pub fn set_filter(&mut self, filter: TaskFilter) {
        self.filter = filter;
        self.page = 1;
        self.refresh();
    }

    pub fn reset_filter(&mut self) {
        self.set_filter(TaskFilter::default());
    }

    /// Step the status filter through "all" and then each status.
    pub fn cycle_status(&mut self) {
        let next = match self.filter.status {
            None => Some(TaskStatus::ALL[0]),
            Some(cur) => TaskStatus::ALL
                .iter()
                .position(|s| *s == cur)
                .and_then(|i| TaskStatus::ALL.get(i + 1))
                .copied(),
        };
        let filter = TaskFilter {
            status: next,
            ..self.filter.clone()
        };
        self.set_filter(filter);
    }

    pub fn has_next_page(&self) -> bool {
        u64::from(self.page) * u64::from(self.page_size) < self.total
    }

    pub fn next_page(&mut self) -> bool {
        if !self.has_next_page() {
            return false;
        }
        self.page += 1;
        self.refresh();
        true
    }

    pub fn prev_page(&mut self) -> bool {
        if self.page <= 1 {
            return false;
        }
        self.page -= 1;
        self.refresh();
        true
    }

    pub fn submit(&mut self, req: TaskSubmitRequest) -> Result<(), TaskFormError> {
        let task_type = req.task_type.as_deref().map(str::trim).unwrap_or_default();
        if task_type.is_empty() {
            return Err(TaskFormError::MissingTaskType);
        }
        tracing::info!("submitting {task_type} task");
        let api = self.api.clone();
        let tx = self.tx.clone();
        spawn_reported(
            tx,
            async move { api.create_task(&req).await.map_err(|e| e.to_string()) },
            |outcome| AppEvent::Board(BoardEvent::Submitted(outcome)),
        );
        Ok(())
    }

    pub fn cancel(&mut self, task_id: &str) {
        tracing::info!("cancelling task {task_id}");
        let api = self.api.clone();
        let tx = self.tx.clone();
        let task_id = task_id.to_string();
        let id = task_id.clone();
        spawn_reported(
            tx,
            async move { api.cancel_task(&id).await.map_err(|e| e.to_string()) },
            move |outcome| AppEvent::Board(BoardEvent::Cancelled { task_id, outcome }),
        );
    }

    pub fn apply(&mut self, ev: BoardEvent) -> Option<BoardNotice> {
        match ev {
            BoardEvent::Listed { seq, outcome } => {
                if seq != self.seq {
                    tracing::debug!("dropping stale task list ({seq})");
                    return None;
                }
                self.loading = false;
                match outcome {
                    Ok(list) => {
                        self.tasks = list.tasks;
                        self.total = list.total;
                        self.error = None;
                        None
                    }
                    Err(e) => {
                        tracing::error!("task list failed: {e}");
                        self.error = Some(e.clone());
                        Some(BoardNotice::Failed(format!("list failed: {e}")))
                    }
                }
            }
            BoardEvent::Submitted(Ok(task)) => {
                tracing::info!("task created: {}", task.task_id);
                self.refresh();
                Some(BoardNotice::Created(task.task_id))
            }
            BoardEvent::Submitted(Err(e)) => {
                tracing::error!("submit failed: {e}");
                Some(BoardNotice::Failed(format!("submit failed: {e}")))
            }
            BoardEvent::Cancelled {
                task_id,
                outcome: Ok(()),
            } => {
                tracing::info!("task cancelled: {task_id}");
                self.refresh();
                Some(BoardNotice::Cancelled(task_id))
            }
            BoardEvent::Cancelled {
                task_id,
                outcome: Err(e),
            } => {
                tracing::error!("cancel of {task_id} failed: {e}");
                Some(BoardNotice::Failed(format!("cancel failed: {e}")))
            }
        }
    }
}
