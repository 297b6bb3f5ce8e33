//! API Module
//!
//! Read-side surface for external consumers:
//! - `dashboard`: time-range queries returning samples with their scores
//! - `engine_status`: one status snapshot for operators

pub mod dashboard;
pub mod engine_status;

pub use dashboard::{DashboardQuery, DashboardWindow, UsageSnapshot};
pub use engine_status::EngineStatus;
