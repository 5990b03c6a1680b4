use crate::integrations::oauth::{AuthError, TokenProvider};
use crate::models::{Task, TaskList, TaskStatus};
use async_trait::async_trait;
use futures::future::join_all;
use reqwest::{RequestBuilder, Response, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

pub const TASKS_API_BASE: &str = "https://tasks.googleapis.com/tasks/v1/";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, thiserror::Error)]
pub enum TasksError {
    #[error(transparent)]
    Auth(#[from] AuthError),
    #[error("HTTP {status}: {reason}")]
    Transport { status: u16, reason: String },
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("unexpected response body: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("invalid endpoint: {0}")]
    Url(String),
    #[error("no task lists available")]
    NoTaskLists,
    #[error("cannot send status `{0}` to the server")]
    InvalidStatus(&'static str),
    #[error("request cancelled")]
    Cancelled,
}

impl TasksError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, TasksError::Cancelled)
    }

    pub fn is_auth(&self) -> bool {
        matches!(self, TasksError::Auth(_))
    }
}

#[async_trait]
pub trait TasksApi: Send + Sync {
    async fn fetch_task_lists(&self) -> Result<Vec<TaskList>, TasksError>;

    /// Tasks of the given lists, flattened in list order and tagged with their
    /// owning list. A list whose fetch fails contributes nothing.
    async fn fetch_tasks_in(
        &self,
        task_lists: &[TaskList],
        include_completed: bool,
    ) -> Result<Vec<Task>, TasksError>;

    async fn fetch_tasks(&self, include_completed: bool) -> Result<Vec<Task>, TasksError> {
        let task_lists = self.fetch_task_lists().await?;
        self.fetch_tasks_in(&task_lists, include_completed).await
    }

    /// Creates a task in `task_list_id`, or in the first list when none is given.
    async fn create_task(
        &self,
        title: &str,
        notes: Option<&str>,
        task_list_id: Option<&str>,
    ) -> Result<(), TasksError>;

    async fn set_task_status(
        &self,
        task_list_id: &str,
        task_id: &str,
        status: TaskStatus,
    ) -> Result<(), TasksError>;

    /// `notes` of `Some("")` clears the notes; `None` leaves them untouched.
    async fn update_task(
        &self,
        task_list_id: &str,
        task_id: &str,
        title: &str,
        notes: Option<&str>,
    ) -> Result<(), TasksError>;
}

#[derive(Deserialize)]
struct ListResponse<T> {
    #[serde(default = "Vec::new")]
    items: Vec<T>,
}

#[derive(Deserialize)]
struct RemoteTaskList {
    id: String,
    #[serde(default)]
    title: String,
}

#[derive(Deserialize)]
struct RemoteTask {
    id: String,
    title: Option<String>,
    notes: Option<String>,
    status: Option<String>,
    due: Option<String>,
    updated: Option<String>,
    position: Option<String>,
}

impl RemoteTask {
    fn into_task(self, task_list_id: &str) -> Task {
        Task {
            id: self.id,
            title: self.title.unwrap_or_default(),
            notes: self.notes,
            status: TaskStatus::from_remote(self.status.as_deref()),
            task_list_id: Some(task_list_id.to_string()),
            due: self.due,
            updated: self.updated,
            position: self.position,
        }
    }
}

#[derive(Serialize)]
struct NewTaskRequest<'a> {
    title: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    notes: Option<&'a str>,
}

#[derive(Serialize, Default)]
struct TaskPatchRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    title: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    notes: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    status: Option<&'static str>,
}

pub struct GoogleTasksClient {
    http: reqwest::Client,
    base_url: Url,
    credentials: Arc<dyn TokenProvider>,
    cancel: CancellationToken,
}

impl GoogleTasksClient {
    pub fn new(
        credentials: Arc<dyn TokenProvider>,
        cancel: CancellationToken,
    ) -> Result<Self, TasksError> {
        Self::with_base_url(TASKS_API_BASE, credentials, cancel)
    }

    pub fn with_base_url(
        base_url: &str,
        credentials: Arc<dyn TokenProvider>,
        cancel: CancellationToken,
    ) -> Result<Self, TasksError> {
        let base_url = Url::parse(base_url).map_err(|e| TasksError::Url(e.to_string()))?;
        if base_url.cannot_be_a_base() {
            return Err(TasksError::Url(base_url.to_string()));
        }
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            http,
            base_url,
            credentials,
            cancel,
        })
    }

    /// Cancels every in-flight and future request of this client.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, TasksError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| TasksError::Url(self.base_url.to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response, TasksError> {
        let token = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return Err(TasksError::Cancelled),
            token = self.credentials.access_token() => token?,
        };

        let response = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return Err(TasksError::Cancelled),
            response = request.bearer_auth(token).send() => response?,
        };

        let status = response.status();
        if status != StatusCode::OK {
            return Err(TasksError::Transport {
                status: status.as_u16(),
                reason: status.canonical_reason().unwrap_or_default().to_string(),
            });
        }
        Ok(response)
    }

    async fn read_json<T: DeserializeOwned>(&self, response: Response) -> Result<T, TasksError> {
        let body = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return Err(TasksError::Cancelled),
            body = response.bytes() => body?,
        };
        Ok(serde_json::from_slice(&body)?)
    }

    async fn fetch_list_tasks(
        &self,
        task_list: &TaskList,
        include_completed: bool,
    ) -> Result<Vec<Task>, TasksError> {
        let url = self.endpoint(&["lists", &task_list.id, "tasks"])?;
        let show_completed = if include_completed { "true" } else { "false" };
        let request = self
            .http
            .get(url)
            .query(&[("showCompleted", show_completed), ("showHidden", "false")]);

        let response = self.send(request).await?;
        let body: ListResponse<RemoteTask> = self.read_json(response).await?;
        debug!(list = %task_list.id, count = body.items.len(), "fetched tasks");
        Ok(body
            .items
            .into_iter()
            .map(|task| task.into_task(&task_list.id))
            .collect())
    }

    async fn patch_task(
        &self,
        task_list_id: &str,
        task_id: &str,
        patch: &TaskPatchRequest<'_>,
    ) -> Result<(), TasksError> {
        let url = self.endpoint(&["lists", task_list_id, "tasks", task_id])?;
        self.send(self.http.patch(url).json(patch)).await?;
        Ok(())
    }
}

#[async_trait]
impl TasksApi for GoogleTasksClient {
    async fn fetch_task_lists(&self) -> Result<Vec<TaskList>, TasksError> {
        let url = self.endpoint(&["users", "@me", "lists"])?;
        let response = self.send(self.http.get(url)).await?;
        let body: ListResponse<RemoteTaskList> = self.read_json(response).await?;
        debug!(count = body.items.len(), "fetched task lists");
        Ok(body
            .items
            .into_iter()
            .map(|list| TaskList::new(list.id, list.title))
            .collect())
    }

    async fn fetch_tasks_in(
        &self,
        task_lists: &[TaskList],
        include_completed: bool,
    ) -> Result<Vec<Task>, TasksError> {
        let results = join_all(
            task_lists
                .iter()
                .map(|list| self.fetch_list_tasks(list, include_completed)),
        )
        .await;

        let mut tasks = Vec::new();
        for (list, result) in task_lists.iter().zip(results) {
            match result {
                Ok(list_tasks) => tasks.extend(list_tasks),
                Err(err) if err.is_cancelled() => return Err(err),
                Err(err) => warn!(list = %list.id, error = %err, "skipping task list"),
            }
        }
        Ok(tasks)
    }

    async fn create_task(
        &self,
        title: &str,
        notes: Option<&str>,
        task_list_id: Option<&str>,
    ) -> Result<(), TasksError> {
        let task_list_id = match task_list_id {
            Some(id) => id.to_string(),
            None => self
                .fetch_task_lists()
                .await?
                .into_iter()
                .next()
                .map(|list| list.id)
                .ok_or(TasksError::NoTaskLists)?,
        };

        let url = self.endpoint(&["lists", &task_list_id, "tasks"])?;
        let body = NewTaskRequest { title, notes };
        self.send(self.http.post(url).json(&body)).await?;
        debug!(list = %task_list_id, "created task");
        Ok(())
    }

    async fn set_task_status(
        &self,
        task_list_id: &str,
        task_id: &str,
        status: TaskStatus,
    ) -> Result<(), TasksError> {
        if status == TaskStatus::Placeholder {
            return Err(TasksError::InvalidStatus(status.as_str()));
        }
        let patch = TaskPatchRequest {
            status: Some(status.as_str()),
            ..TaskPatchRequest::default()
        };
        self.patch_task(task_list_id, task_id, &patch).await
    }

    async fn update_task(
        &self,
        task_list_id: &str,
        task_id: &str,
        title: &str,
        notes: Option<&str>,
    ) -> Result<(), TasksError> {
        let patch = TaskPatchRequest {
            title: Some(title),
            notes,
            status: None,
        };
        self.patch_task(task_list_id, task_id, &patch).await
    }
}
