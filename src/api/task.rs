//! Task service API: submit, list, inspect and cancel long-running tasks.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::{ApiError, ApiResult, ensure_success, join};

/// Server-side lifecycle state of a task.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl TaskStatus {
    pub const ALL: [TaskStatus; 5] = [
        TaskStatus::Pending,
        TaskStatus::Running,
        TaskStatus::Completed,
        TaskStatus::Failed,
        TaskStatus::Cancelled,
    ];

    /// Still making progress on the server, worth polling again.
    pub fn is_active(self) -> bool {
        matches!(self, TaskStatus::Pending | TaskStatus::Running)
    }

    pub fn is_terminal(self) -> bool {
        !self.is_active()
    }

    /// Wire name, also used as the list filter value.
    pub fn as_str(self) -> &'static str {
        match self {
            TaskStatus::Pending => "PENDING",
            TaskStatus::Running => "RUNNING",
            TaskStatus::Completed => "COMPLETED",
            TaskStatus::Failed => "FAILED",
            TaskStatus::Cancelled => "CANCELLED",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One fetch worth of task state. Replaced wholesale, never patched.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskSnapshot {
    pub task_id: String,
    pub status: TaskStatus,
    #[serde(default)]
    pub task_type: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
    #[serde(default)]
    pub completed_at: Option<String>,
    /// 0..=100 when the server reports it.
    #[serde(default)]
    pub progress: Option<u8>,
    #[serde(default)]
    pub error_message: Option<String>,
    #[serde(default)]
    pub result: Option<serde_json::Value>,
    #[serde(default)]
    pub video_key: Option<String>,
}

/// Payload for creating a task. Unset fields are not sent.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskSubmitRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub video_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub link_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub submit_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub video_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub custom_data: Option<serde_json::Map<String, serde_json::Value>>,
}

/// Filter and paging for the task list.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TaskListQuery {
    pub status: Option<TaskStatus>,
    pub task_type: Option<String>,
    pub page: u32,
    pub page_size: u32,
}

impl TaskListQuery {
    fn pairs(&self) -> Vec<(&'static str, String)> {
        let mut q = vec![
            ("page", self.page.to_string()),
            ("pageSize", self.page_size.to_string()),
        ];
        if let Some(st) = self.status {
            q.push(("status", st.as_str().to_string()));
        }
        if let Some(t) = &self.task_type {
            q.push(("taskType", t.clone()));
        }
        q
    }
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskListResponse {
    #[serde(default)]
    pub tasks: Vec<TaskSnapshot>,
    #[serde(default)]
    pub total: u64,
    #[serde(default)]
    pub page: u32,
    #[serde(default)]
    pub page_size: u32,
}

/// Operations offered by the remote task service.
#[async_trait]
pub trait TaskApi: Send + Sync {
    async fn create_task(&self, req: &TaskSubmitRequest) -> ApiResult<TaskSnapshot>;
    async fn list_tasks(&self, query: &TaskListQuery) -> ApiResult<TaskListResponse>;
    async fn get_task(&self, task_id: &str) -> ApiResult<TaskSnapshot>;
    async fn cancel_task(&self, task_id: &str) -> ApiResult<()>;
}

/// `TaskApi` over HTTP/JSON.
#[derive(Clone)]
pub struct HttpTaskClient {
    http: Client,
    base_url: String,
}

impl HttpTaskClient {
    pub fn new(http: Client, base_url: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into(),
        }
    }

    fn task_url(&self, task_id: &str, suffix: &str) -> String {
        let path = format!("{}{}", urlencoding::encode(task_id), suffix);
        join(&self.base_url, &path)
    }
}

#[async_trait]
impl TaskApi for HttpTaskClient {
    async fn create_task(&self, req: &TaskSubmitRequest) -> ApiResult<TaskSnapshot> {
        let resp = self.http.post(&self.base_url).json(req).send().await?;
        let resp = ensure_success(resp).await?;
        Ok(resp.json::<TaskSnapshot>().await?)
    }

    async fn list_tasks(&self, query: &TaskListQuery) -> ApiResult<TaskListResponse> {
        let resp = self
            .http
            .get(&self.base_url)
            .query(&query.pairs())
            .send()
            .await?;
        let resp = ensure_success(resp).await?;
        Ok(resp.json::<TaskListResponse>().await?)
    }

    async fn get_task(&self, task_id: &str) -> ApiResult<TaskSnapshot> {
        let resp = self.http.get(self.task_url(task_id, "")).send().await?;
        if resp.status() == StatusCode::NOT_FOUND {
            return Err(ApiError::NotFound(task_id.to_string()));
        }
        let resp = ensure_success(resp).await?;
        Ok(resp.json::<TaskSnapshot>().await?)
    }

    async fn cancel_task(&self, task_id: &str) -> ApiResult<()> {
        let resp = self
            .http
            .post(self.task_url(task_id, "/cancel"))
            .send()
            .await?;
        ensure_success(resp).await?;
        Ok(())
    }
}
