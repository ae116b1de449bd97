//! Taskboard Server - Asana project metrics aggregator.
//!
//! This crate provides the server component of Taskboard, responsible for:
//! - Fetching project details, tasks and subtasks from Asana
//! - Aggregating them into per-project completion metrics
//! - Caching the aggregated snapshot and refreshing it periodically
//!
//! # Architecture
//!
//! The [`dashboard::Dashboard`] facade sits in front of a single-slot
//! [`cache::ProjectCache`], which runs the [`aggregator::Aggregator`] on a
//! miss. The aggregator fans out over the [`asana::AsanaClient`]. An optional
//! [`poller`] forces refreshes on a timer and pushes each snapshot through the
//! [`broadcast::SnapshotBroadcaster`] to WebSocket clients.

pub mod aggregator;
pub mod asana;
pub mod broadcast;
pub mod cache;
pub mod config;
pub mod dashboard;
pub mod error;
pub mod poller;
pub mod routes;
pub mod types;

pub use dashboard::Dashboard;
pub use error::{DashboardError, FetchError};
