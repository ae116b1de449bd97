//! Shared dashboard types for the Taskboard server.
//!
//! These structures describe the aggregated view served to the front-end. A
//! whole tree of projects, tasks and subtasks is rebuilt on every refresh and
//! never mutated afterwards. Field names serialize as camelCase, which is the
//! shape the dashboard charts consume.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Project metadata as returned by the upstream project endpoint.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectDetails {
    /// Upstream identifier (Asana `gid`).
    pub id: String,
    pub name: String,
    pub notes: String,
    /// Title of the project's current status update, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modified_at: Option<DateTime<Utc>>,
}

/// A task belonging to a tracked project.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: String,
    pub name: String,
    pub notes: String,
    pub completed: bool,
    /// Calendar due date (`YYYY-MM-DD`) or a full RFC 3339 timestamp.
    #[serde(default)]
    pub due_date: Option<String>,
    /// Subtasks in upstream order. Empty when the subtask fetch degraded.
    #[serde(default)]
    pub subtasks: Vec<Subtask>,
}

/// A subtask. Same shape as [`Task`] without nested children.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subtask {
    pub id: String,
    pub name: String,
    pub notes: String,
    pub completed: bool,
    #[serde(default)]
    pub due_date: Option<String>,
}

/// Completion metrics derived from a project's task list.
///
/// `completed_tasks + pending_tasks == total_tasks` always holds and
/// `completion_rate` is a percentage in `[0, 100]`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Metrics {
    pub total_tasks: usize,
    pub completed_tasks: usize,
    pub pending_tasks: usize,
    pub completion_rate: f64,
    /// Tasks due between today and seven days from now, inclusive.
    pub upcoming_tasks: usize,
    pub tasks_without_due_date: usize,
}

/// A fully populated project: details, tasks with subtasks, and metrics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    #[serde(flatten)]
    pub details: ProjectDetails,
    pub tasks: Vec<Task>,
    pub metrics: Metrics,
    pub last_update: DateTime<Utc>,
}

impl Project {
    /// Returns the upstream identifier of the project.
    pub fn id(&self) -> &str {
        &self.details.id
    }
}

/// Lightweight refresh of a single project: details and tasks only.
///
/// Tasks carry no subtasks and no metrics are computed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectUpdate {
    #[serde(flatten)]
    pub details: ProjectDetails,
    pub tasks: Vec<Task>,
    pub last_update: DateTime<Utc>,
}

/// The aggregated state of all tracked projects at one point in time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    /// Projects that were fetched successfully, in configured order.
    pub projects: Vec<Project>,
    pub fetched_at: DateTime<Utc>,
}

impl Snapshot {
    /// Creates a snapshot stamped with the current time.
    pub fn new(projects: Vec<Project>) -> Self {
        Self {
            projects,
            fetched_at: Utc::now(),
        }
    }

    /// Returns true if no project made it into the snapshot.
    pub fn is_empty(&self) -> bool {
        self.projects.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample_project() -> Project {
        Project {
            details: ProjectDetails {
                id: "P1".to_string(),
                name: "Website".to_string(),
                notes: "Relaunch".to_string(),
                ..Default::default()
            },
            tasks: vec![Task {
                id: "T1".to_string(),
                name: "Design".to_string(),
                due_date: Some("2024-03-12".to_string()),
                ..Default::default()
            }],
            metrics: Metrics {
                total_tasks: 1,
                pending_tasks: 1,
                ..Default::default()
            },
            last_update: Utc.with_ymd_and_hms(2024, 3, 10, 10, 0, 0).unwrap(),
        }
    }

    #[test]
    fn project_serializes_flattened_camel_case() {
        let json = serde_json::to_value(sample_project()).expect("should serialize");

        assert_eq!(json["id"], "P1");
        assert_eq!(json["name"], "Website");
        assert_eq!(json["metrics"]["totalTasks"], 1);
        assert_eq!(json["metrics"]["completionRate"], 0.0);
        assert_eq!(json["metrics"]["tasksWithoutDueDate"], 0);
        assert_eq!(json["tasks"][0]["dueDate"], "2024-03-12");
        assert_eq!(json["lastUpdate"], "2024-03-10T10:00:00Z");
        assert!(json.get("status").is_none());
    }

    #[test]
    fn project_deserializes_from_serialized_form() {
        let project = sample_project();
        let json = serde_json::to_string(&project).expect("should serialize");
        let parsed: Project = serde_json::from_str(&json).expect("should deserialize");
        assert_eq!(parsed, project);
    }

    #[test]
    fn snapshot_serializes_projects_with_fetch_time() {
        let snapshot = Snapshot::new(vec![sample_project()]);
        assert!(!snapshot.is_empty());

        let json = serde_json::to_value(&snapshot).expect("should serialize");
        assert_eq!(json["projects"][0]["id"], "P1");
        assert!(json["fetchedAt"].is_string());
    }

    #[test]
    fn empty_snapshot_reports_empty() {
        let snapshot = Snapshot::new(Vec::new());
        assert!(snapshot.is_empty());
    }
}
