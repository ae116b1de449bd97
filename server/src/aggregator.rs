//! Project aggregation: fan-out fetches and completion metrics.
//!
//! For each tracked project the [`Aggregator`] fetches details and tasks,
//! then fetches every task's subtasks concurrently and folds the result into
//! [`Metrics`]. Projects are processed concurrently and joined only after all
//! of them finish; a project whose pipeline fails is logged and left out of
//! the result instead of failing the batch.

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use futures_util::future::join_all;
use tracing::{debug, info, warn};

use crate::asana::AsanaClient;
use crate::error::{DashboardError, FetchError};
use crate::types::{Metrics, Project, ProjectUpdate, Task};

/// Tasks due within this many days (inclusive) count as upcoming.
pub const UPCOMING_WINDOW_DAYS: i64 = 7;

const MILLIS_PER_DAY: f64 = 86_400_000.0;

/// Builds fully populated projects for a fixed list of project ids.
#[derive(Debug, Clone)]
pub struct Aggregator {
    client: AsanaClient,
    project_ids: Arc<[String]>,
}

impl Aggregator {
    /// Creates an aggregator for the given tracked projects.
    pub fn new(client: AsanaClient, project_ids: Vec<String>) -> Self {
        Self {
            client,
            project_ids: project_ids.into(),
        }
    }

    /// Returns the upstream client.
    pub fn client(&self) -> &AsanaClient {
        &self.client
    }

    /// Returns the tracked project ids in configured order.
    pub fn project_ids(&self) -> &[String] {
        &self.project_ids
    }

    /// Fetches and aggregates every tracked project.
    ///
    /// Projects that fail are dropped. The result keeps the configured id
    /// order and may be empty if every project failed.
    ///
    /// # Errors
    ///
    /// Returns [`DashboardError::Aggregation`] only when there is no project
    /// to attempt.
    pub async fn aggregate(&self) -> Result<Vec<Project>, DashboardError> {
        if self.project_ids.is_empty() {
            warn!("Aggregation requested with no tracked projects");
            return Err(DashboardError::aggregation("no tracked projects configured"));
        }

        let results = join_all(self.project_ids.iter().map(|id| self.build_project(id))).await;

        let mut projects = Vec::with_capacity(results.len());
        for (project_id, result) in self.project_ids.iter().zip(results) {
            match result {
                Ok(project) => projects.push(project),
                Err(e) => {
                    warn!(
                        project_id = %project_id,
                        error = %e,
                        cause = %e.cause(),
                        "Dropping project from snapshot"
                    );
                }
            }
        }

        info!(
            requested = self.project_ids.len(),
            succeeded = projects.len(),
            "Aggregated project data"
        );

        Ok(projects)
    }

    /// Runs the full pipeline for one project.
    ///
    /// # Errors
    ///
    /// Returns the [`FetchError`] of the details or task fetch. Subtask
    /// failures never fail the pipeline.
    pub async fn build_project(&self, project_id: &str) -> Result<Project, FetchError> {
        let (details, tasks) = tokio::try_join!(
            self.client.get_project_details(project_id),
            self.client.get_project_tasks(project_id),
        )?;

        let tasks = self.attach_subtasks(tasks).await;
        let now = Utc::now();
        let metrics = compute_metrics(&tasks, now);

        debug!(
            project_id = %project_id,
            total_tasks = metrics.total_tasks,
            completed_tasks = metrics.completed_tasks,
            "Built project"
        );

        Ok(Project {
            details,
            tasks,
            metrics,
            last_update: now,
        })
    }

    /// Fetches details and tasks for one project, without subtasks or metrics.
    ///
    /// # Errors
    ///
    /// Returns the [`FetchError`] of the details or task fetch.
    pub async fn project_update(&self, project_id: &str) -> Result<ProjectUpdate, FetchError> {
        let (details, tasks) = tokio::try_join!(
            self.client.get_project_details(project_id),
            self.client.get_project_tasks(project_id),
        )?;

        Ok(ProjectUpdate {
            details,
            tasks,
            last_update: Utc::now(),
        })
    }

    async fn attach_subtasks(&self, tasks: Vec<Task>) -> Vec<Task> {
        let fetches = join_all(tasks.iter().map(|task| self.client.get_subtasks(&task.id))).await;

        tasks
            .into_iter()
            .zip(fetches)
            .map(|(mut task, fetch)| {
                task.subtasks = fetch.into_subtasks();
                task
            })
            .collect()
    }
}

/// Computes completion metrics for a task list as of `now`.
pub fn compute_metrics(tasks: &[Task], now: DateTime<Utc>) -> Metrics {
    let total_tasks = tasks.len();
    let completed_tasks = tasks.iter().filter(|t| t.completed).count();

    let due_dates: Vec<&str> = tasks
        .iter()
        .filter_map(|t| t.due_date.as_deref())
        .filter(|d| !d.is_empty())
        .collect();

    let upcoming_tasks = due_dates
        .iter()
        .filter_map(|due| days_until_due(due, now))
        .filter(|days| (0..=UPCOMING_WINDOW_DAYS).contains(days))
        .count();

    let completion_rate = if total_tasks > 0 {
        completed_tasks as f64 / total_tasks as f64 * 100.0
    } else {
        0.0
    };

    Metrics {
        total_tasks,
        completed_tasks,
        pending_tasks: total_tasks - completed_tasks,
        completion_rate,
        upcoming_tasks,
        tasks_without_due_date: total_tasks - due_dates.len(),
    }
}

/// Whole days from `now` until `due`, rounded up.
///
/// Calendar dates are taken as UTC midnight, so a task due today yields 0
/// and one due yesterday yields -1. Returns `None` for unparseable dates.
pub fn days_until_due(due: &str, now: DateTime<Utc>) -> Option<i64> {
    let due = match DateTime::parse_from_rfc3339(due) {
        Ok(at) => at.with_timezone(&Utc),
        Err(_) => NaiveDate::parse_from_str(due, "%Y-%m-%d")
            .ok()?
            .and_hms_opt(0, 0, 0)?
            .and_utc(),
    };

    let millis = (due - now).num_milliseconds() as f64;
    Some((millis / MILLIS_PER_DAY).ceil() as i64)
}
