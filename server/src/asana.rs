//! Asana client module for fetching projects, tasks and subtasks.
//!
//! This module provides a client for the three read operations the dashboard
//! needs:
//! - Project details via `GET /projects/{id}`
//! - Task lists via `GET /tasks?project={id}`
//! - Subtask lists via `GET /tasks/{id}/subtasks`
//!
//! # Failure policy
//!
//! Project details and task lists are required: failures are returned as a
//! [`FetchError`] so the caller can skip the affected project. Subtasks are
//! cosmetic: failures produce [`SubtaskFetch::Degraded`], which reads as an
//! empty list and is never an error.
//!
//! # Example
//!
//! ```rust,ignore
//! use taskboard_server::asana::AsanaClient;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = AsanaClient::new("https://app.asana.com/api/1.0", "token", None)?;
//!
//!     let project = client.get_project_details("1209145611805182").await?;
//!     let tasks = client.get_project_tasks(&project.id).await?;
//!     for task in &tasks {
//!         let subtasks = client.get_subtasks(&task.id).await;
//!         println!("{}: {} subtasks", task.name, subtasks.subtasks().len());
//!     }
//!
//!     Ok(())
//! }
//! ```

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::{Client, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, error, warn};

use crate::config::{Config, DEFAULT_COMPLETED_SINCE};
use crate::error::FetchError;
use crate::types::{ProjectDetails, Subtask, Task};

/// Fields requested for project details.
const PROJECT_FIELDS: &str =
    "name,notes,color,start_on,due_on,created_at,modified_at,current_status.title";

/// Fields requested for tasks in a project's task list.
const TASK_FIELDS: &str = "name,notes,completed,due_on,due_at";

/// Fields requested for subtasks.
const SUBTASK_FIELDS: &str = "name,notes,completed,due_on,due_at";

/// Errors that can occur when talking to the Asana API.
#[derive(Debug, Error)]
pub enum AsanaError {
    /// The access token was rejected (401 or 403).
    #[error("unauthorized: invalid or expired access token")]
    Unauthorized,

    /// The requested resource does not exist.
    #[error("resource not found: {0}")]
    NotFound(String),

    /// The request exceeded the configured timeout.
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    /// The API could not be reached.
    #[error("asana unavailable: {0}")]
    Unavailable(String),

    /// The API answered with a non-success status.
    #[error("unexpected status {status}: {body}")]
    UnexpectedStatus {
        /// HTTP status code.
        status: u16,
        /// Response body, possibly empty.
        body: String,
    },

    /// The response body did not match the expected shape.
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// Client configuration error (e.g. an invalid base URL).
    #[error("client configuration error: {0}")]
    Configuration(String),
}

/// Outcome of a subtask fetch.
///
/// A failed subtask fetch is not an error: it degrades to an empty list so a
/// single missing subtask set never drops its parent task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubtaskFetch {
    /// Subtasks were fetched.
    Loaded(Vec<Subtask>),

    /// The fetch failed. Behaves as an empty list.
    Degraded {
        /// Description of the failure, kept for logging and diagnostics.
        reason: String,
    },
}

impl SubtaskFetch {
    /// Returns the fetched subtasks, or an empty slice when degraded.
    pub fn subtasks(&self) -> &[Subtask] {
        match self {
            Self::Loaded(subtasks) => subtasks,
            Self::Degraded { .. } => &[],
        }
    }

    /// Consumes the result, yielding an empty list when degraded.
    pub fn into_subtasks(self) -> Vec<Subtask> {
        match self {
            Self::Loaded(subtasks) => subtasks,
            Self::Degraded { .. } => Vec::new(),
        }
    }

    /// Returns true if the fetch failed.
    pub fn is_degraded(&self) -> bool {
        matches!(self, Self::Degraded { .. })
    }
}

/// Asana wraps every payload in a `data` envelope.
#[derive(Debug, Deserialize)]
struct DataEnvelope<T> {
    data: T,
}

#[derive(Debug, Deserialize)]
struct AsanaStatus {
    title: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AsanaProject {
    gid: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    notes: Option<String>,
    #[serde(default)]
    color: Option<String>,
    #[serde(default)]
    start_on: Option<String>,
    #[serde(default)]
    due_on: Option<String>,
    #[serde(default)]
    created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    modified_at: Option<DateTime<Utc>>,
    #[serde(default)]
    current_status: Option<AsanaStatus>,
}

impl From<AsanaProject> for ProjectDetails {
    fn from(project: AsanaProject) -> Self {
        Self {
            id: project.gid,
            name: project.name.unwrap_or_default(),
            notes: project.notes.unwrap_or_default(),
            status: project.current_status.and_then(|s| s.title),
            color: project.color,
            start_date: project.start_on,
            due_date: project.due_on,
            created_at: project.created_at,
            modified_at: project.modified_at,
        }
    }
}

/// Task and subtask payloads share one shape.
#[derive(Debug, Deserialize)]
struct AsanaTask {
    gid: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    notes: Option<String>,
    #[serde(default)]
    completed: bool,
    #[serde(default)]
    due_on: Option<String>,
    #[serde(default)]
    due_at: Option<String>,
}

impl AsanaTask {
    /// `due_at` carries a time of day and wins over the bare date.
    fn due_date(&mut self) -> Option<String> {
        self.due_at
            .take()
            .or_else(|| self.due_on.take())
            .filter(|d| !d.is_empty())
    }
}

impl From<AsanaTask> for Task {
    fn from(mut task: AsanaTask) -> Self {
        let due_date = task.due_date();
        Self {
            id: task.gid,
            name: task.name.unwrap_or_default(),
            notes: task.notes.unwrap_or_default(),
            completed: task.completed,
            due_date,
            subtasks: Vec::new(),
        }
    }
}

impl From<AsanaTask> for Subtask {
    fn from(mut task: AsanaTask) -> Self {
        let due_date = task.due_date();
        Self {
            id: task.gid,
            name: task.name.unwrap_or_default(),
            notes: task.notes.unwrap_or_default(),
            completed: task.completed,
            due_date,
        }
    }
}

/// Client for the Asana REST API.
///
/// The client is cheap to clone: the inner `reqwest::Client` is reference
/// counted and pools connections across clones.
#[derive(Clone)]
pub struct AsanaClient {
    /// The underlying HTTP client.
    http_client: Client,

    /// API base URL (e.g. `https://app.asana.com/api/1.0`).
    base_url: Url,

    /// Personal access token sent as a bearer token.
    token: String,

    /// Timeout applied to each request, if any.
    timeout: Option<Duration>,

    /// Value of the `completed_since` filter on task lists.
    completed_since: String,
}

impl fmt::Debug for AsanaClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AsanaClient")
            .field("base_url", &self.base_url.as_str())
            .field("token", &"<redacted>")
            .field("timeout", &self.timeout)
            .field("completed_since", &self.completed_since)
            .finish()
    }
}

impl AsanaClient {
    /// Creates a new Asana client.
    ///
    /// # Arguments
    ///
    /// * `base_url` - The API base URL, trailing slashes are ignored
    /// * `token` - Personal access token
    /// * `timeout` - Optional per-request timeout; `None` waits indefinitely
    ///
    /// # Errors
    ///
    /// Returns [`AsanaError::Configuration`] if the URL is invalid or the HTTP
    /// client cannot be created.
    pub fn new(
        base_url: impl AsRef<str>,
        token: impl Into<String>,
        timeout: Option<Duration>,
    ) -> Result<Self, AsanaError> {
        let raw = base_url.as_ref().trim_end_matches('/');
        let base_url = Url::parse(raw)
            .map_err(|e| AsanaError::Configuration(format!("invalid base URL '{raw}': {e}")))?;
        if base_url.cannot_be_a_base() {
            return Err(AsanaError::Configuration(format!(
                "base URL '{raw}' cannot carry a path"
            )));
        }

        let mut builder = Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let http_client = builder.build().map_err(|e| {
            AsanaError::Configuration(format!("failed to create HTTP client: {e}"))
        })?;

        Ok(Self {
            http_client,
            base_url,
            token: token.into(),
            timeout,
            completed_since: DEFAULT_COMPLETED_SINCE.to_string(),
        })
    }

    /// Creates a client from server configuration.
    ///
    /// # Errors
    ///
    /// Returns [`AsanaError::Configuration`] if the configured URL is invalid.
    pub fn from_config(config: &Config) -> Result<Self, AsanaError> {
        Ok(
            Self::new(&config.asana_url, config.asana_token.clone(), config.request_timeout)?
                .with_completed_since(config.completed_since.clone()),
        )
    }

    /// Overrides the `completed_since` filter used when listing tasks.
    #[must_use]
    pub fn with_completed_since(mut self, completed_since: impl Into<String>) -> Self {
        self.completed_since = completed_since.into();
        self
    }

    /// Returns the configured base URL.
    pub fn base_url(&self) -> &str {
        self.base_url.as_str()
    }

    /// Fetches a project's metadata.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::DetailsUnavailable`] on any transport or upstream
    /// failure. The failure is logged here.
    pub async fn get_project_details(
        &self,
        project_id: &str,
    ) -> Result<ProjectDetails, FetchError> {
        self.get_data::<AsanaProject>(
            &["projects", project_id],
            &[("opt_fields", PROJECT_FIELDS)],
        )
        .await
        .map(ProjectDetails::from)
        .map_err(|e| {
            error!(project_id = %project_id, error = %e, "Failed to fetch project details");
            FetchError::DetailsUnavailable {
                project_id: project_id.to_string(),
                source: e,
            }
        })
    }

    /// Fetches the task list of a project.
    ///
    /// Returned tasks have no subtasks attached.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::TasksUnavailable`] on any transport or upstream
    /// failure. The failure is logged here.
    pub async fn get_project_tasks(&self, project_id: &str) -> Result<Vec<Task>, FetchError> {
        let query = [
            ("project", project_id),
            ("opt_fields", TASK_FIELDS),
            ("completed_since", self.completed_since.as_str()),
        ];

        self.get_data::<Vec<AsanaTask>>(&["tasks"], &query)
            .await
            .map(|tasks| tasks.into_iter().map(Task::from).collect())
            .map_err(|e| {
                error!(project_id = %project_id, error = %e, "Failed to fetch project tasks");
                FetchError::TasksUnavailable {
                    project_id: project_id.to_string(),
                    source: e,
                }
            })
    }

    /// Fetches the subtasks of a task.
    ///
    /// Never fails: transport or upstream errors are logged and reported as
    /// [`SubtaskFetch::Degraded`].
    pub async fn get_subtasks(&self, task_id: &str) -> SubtaskFetch {
        match self
            .get_data::<Vec<AsanaTask>>(
                &["tasks", task_id, "subtasks"],
                &[("opt_fields", SUBTASK_FIELDS)],
            )
            .await
        {
            Ok(subtasks) => SubtaskFetch::Loaded(subtasks.into_iter().map(Subtask::from).collect()),
            Err(e) => {
                warn!(
                    task_id = %task_id,
                    error = %e,
                    "Failed to fetch subtasks, treating as empty"
                );
                SubtaskFetch::Degraded {
                    reason: e.to_string(),
                }
            }
        }
    }

    /// Builds the URL for the given path segments below the base URL.
    fn endpoint(&self, segments: &[&str]) -> Result<Url, AsanaError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| AsanaError::Configuration("base URL cannot carry a path".to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// Performs an authenticated GET and unwraps the `data` envelope.
    async fn get_data<T: DeserializeOwned>(
        &self,
        segments: &[&str],
        query: &[(&str, &str)],
    ) -> Result<T, AsanaError> {
        let url = self.endpoint(segments)?;

        debug!(url = %url, "Requesting Asana resource");

        let response = self
            .http_client
            .get(url.clone())
            .bearer_auth(&self.token)
            .header(reqwest::header::ACCEPT, "application/json")
            .query(query)
            .send()
            .await
            .map_err(|e| self.classify_transport_error(e))?;

        let status = response.status();

        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            debug!(url = %url, status = %status, "Asana rejected access token");
            return Err(AsanaError::Unauthorized);
        }

        if status == StatusCode::NOT_FOUND {
            return Err(AsanaError::NotFound(url.path().to_string()));
        }

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AsanaError::UnexpectedStatus {
                status: status.as_u16(),
                body,
            });
        }

        let envelope: DataEnvelope<T> = response.json().await.map_err(|e| {
            AsanaError::InvalidResponse(format!(
                "failed to parse response from {}: {e}",
                url.path()
            ))
        })?;

        Ok(envelope.data)
    }

    fn classify_transport_error(&self, e: reqwest::Error) -> AsanaError {
        if e.is_timeout() {
            AsanaError::Timeout(self.timeout.unwrap_or_default())
        } else if e.is_connect() {
            AsanaError::Unavailable(format!("connection failed: {e}"))
        } else {
            AsanaError::Unavailable(format!("request failed: {e}"))
        }
    }
}
