//! Error types for the Taskboard server.
//!
//! This module defines the errors that cross component boundaries:
//!
//! - [`FetchError`] - A project's details or task list could not be fetched.
//!   The aggregator uses it to skip that one project.
//! - [`DashboardError`] - Top-level error for the dashboard facade and the
//!   snapshot endpoint.
//!
//! Transport-level failures live in [`crate::asana::AsanaError`] and are
//! carried as the source of a [`FetchError`]. Subtask failures never become
//! errors; see [`crate::asana::SubtaskFetch`].

use std::error::Error;
use std::fmt;

use thiserror::Error as ThisError;

use crate::asana::AsanaError;

/// A required piece of project data could not be fetched.
///
/// The display message is fixed per kind so it can be shown to end users;
/// the upstream cause is available through [`Error::source`].
#[derive(ThisError, Debug)]
pub enum FetchError {
    /// Fetching the project metadata failed.
    #[error("project details unavailable")]
    DetailsUnavailable {
        /// The project that failed.
        project_id: String,
        /// Underlying transport or upstream failure.
        #[source]
        source: AsanaError,
    },

    /// Fetching the project's task list failed.
    #[error("project tasks unavailable")]
    TasksUnavailable {
        /// The project that failed.
        project_id: String,
        /// Underlying transport or upstream failure.
        #[source]
        source: AsanaError,
    },
}

impl FetchError {
    /// Returns the identifier of the project whose fetch failed.
    pub fn project_id(&self) -> &str {
        match self {
            Self::DetailsUnavailable { project_id, .. }
            | Self::TasksUnavailable { project_id, .. } => project_id,
        }
    }

    /// Returns the upstream cause.
    pub fn cause(&self) -> &AsanaError {
        match self {
            Self::DetailsUnavailable { source, .. } | Self::TasksUnavailable { source, .. } => {
                source
            }
        }
    }
}

/// Top-level error type for the dashboard facade and the HTTP layer.
///
/// # Error Categories
///
/// - **Client errors**: the upstream HTTP client could not be built
/// - **Aggregation errors**: no project could even be attempted
///
/// Single-project failures stay [`FetchError`]s and never reach this type.
#[derive(Debug)]
pub enum DashboardError {
    /// The upstream client could not be constructed.
    Client(AsanaError),

    /// The aggregation as a whole could not run.
    Aggregation(String),
}

impl fmt::Display for DashboardError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Client(err) => write!(f, "upstream client error: {err}"),
            Self::Aggregation(msg) => write!(f, "could not aggregate project data: {msg}"),
        }
    }
}

impl Error for DashboardError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Client(err) => Some(err),
            Self::Aggregation(_) => None,
        }
    }
}

impl From<AsanaError> for DashboardError {
    fn from(err: AsanaError) -> Self {
        Self::Client(err)
    }
}

impl DashboardError {
    /// Creates a new aggregation error.
    ///
    /// # Example
    ///
    /// ```rust
    /// use taskboard_server::error::DashboardError;
    ///
    /// let err = DashboardError::aggregation("no tracked projects configured");
    /// assert!(matches!(err, DashboardError::Aggregation(_)));
    /// ```
    pub fn aggregation(message: impl Into<String>) -> Self {
        Self::Aggregation(message.into())
    }
}
