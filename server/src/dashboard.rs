//! Dashboard facade composing the client, aggregator, cache and poller.
//!
//! [`Dashboard`] is the entry point the HTTP layer and the binary use. It is
//! cheap to clone; clones share one cache.
//!
//! # Example
//!
//! ```rust,no_run
//! use taskboard_server::config::Config;
//! use taskboard_server::dashboard::Dashboard;
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = Config::from_env().expect("failed to load config");
//!     let dashboard = Dashboard::from_config(&config).expect("failed to build dashboard");
//!
//!     let snapshot = dashboard.get_all_projects_data(false).await.expect("fetch failed");
//!     for project in &snapshot.projects {
//!         println!("{}: {:.0}% done", project.details.name, project.metrics.completion_rate);
//!     }
//! }
//! ```

use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use crate::aggregator::Aggregator;
use crate::asana::{AsanaClient, SubtaskFetch};
use crate::cache::ProjectCache;
use crate::config::Config;
use crate::error::{DashboardError, FetchError};
use crate::poller::{self, PollerHandle};
use crate::types::{ProjectDetails, ProjectUpdate, Snapshot, Task};

/// Outward-facing operations over the tracked projects.
#[derive(Debug, Clone)]
pub struct Dashboard {
    aggregator: Aggregator,
    cache: Arc<ProjectCache>,
}

impl Dashboard {
    /// Creates a dashboard tracking `project_ids` with the given cache window.
    pub fn new(client: AsanaClient, project_ids: Vec<String>, cache_ttl: Duration) -> Self {
        debug!(
            base_url = client.base_url(),
            projects = project_ids.len(),
            cache_ttl_secs = cache_ttl.as_secs(),
            "Creating dashboard"
        );
        let aggregator = Aggregator::new(client, project_ids);
        let cache = Arc::new(ProjectCache::new(aggregator.clone(), cache_ttl));
        Self { aggregator, cache }
    }

    /// Creates a dashboard from server configuration.
    ///
    /// # Errors
    ///
    /// Returns [`DashboardError::Client`] if the upstream client cannot be built.
    pub fn from_config(config: &Config) -> Result<Self, DashboardError> {
        let client = AsanaClient::from_config(config)?;
        Ok(Self::new(client, config.project_ids.clone(), config.cache_ttl))
    }

    /// Returns the shared snapshot cache.
    pub fn cache(&self) -> &Arc<ProjectCache> {
        &self.cache
    }

    /// Returns the tracked project ids.
    pub fn project_ids(&self) -> &[String] {
        self.aggregator.project_ids()
    }

    /// Returns all tracked projects, from cache unless stale or forced.
    ///
    /// # Errors
    ///
    /// Returns [`DashboardError::Aggregation`] if no project could be
    /// attempted. Individual project failures only shrink the result.
    pub async fn get_all_projects_data(
        &self,
        force_refresh: bool,
    ) -> Result<Arc<Snapshot>, DashboardError> {
        self.cache.get(force_refresh).await
    }

    /// Fetches a project's metadata, bypassing the cache.
    pub async fn get_project_details(
        &self,
        project_id: &str,
    ) -> Result<ProjectDetails, FetchError> {
        self.aggregator.client().get_project_details(project_id).await
    }

    /// Fetches a project's task list, bypassing the cache.
    pub async fn get_project_tasks(&self, project_id: &str) -> Result<Vec<Task>, FetchError> {
        self.aggregator.client().get_project_tasks(project_id).await
    }

    /// Fetches a task's subtasks. Failures degrade to an empty list.
    pub async fn get_subtasks(&self, task_id: &str) -> SubtaskFetch {
        self.aggregator.client().get_subtasks(task_id).await
    }

    /// Fetches details and tasks for one project, bypassing the cache.
    pub async fn get_project_update(&self, project_id: &str) -> Result<ProjectUpdate, FetchError> {
        self.aggregator.project_update(project_id).await
    }

    /// Starts a poller that force-refreshes the cache every `interval`.
    pub fn start_auto_update<F>(&self, callback: F, interval: Duration) -> PollerHandle
    where
        F: Fn(Arc<Snapshot>) + Send + Sync + 'static,
    {
        poller::start(Arc::clone(&self.cache), callback, interval)
    }
}
