//! Resource Sentinel - system resource sampling with isolation-forest
//! anomaly detection.

pub mod api;
pub mod config;
pub mod constants;
pub mod logic;
