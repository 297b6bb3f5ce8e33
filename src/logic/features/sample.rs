//! Metric Sample - one point of the resource utilization series

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Gauge band boundaries (%)
pub const ELEVATED_USAGE_PERCENT: f64 = 50.0;
pub const CRITICAL_USAGE_PERCENT: f64 = 80.0;

/// Raw reading from the OS metrics provider
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ResourceUsage {
    pub cpu_percent: f64,
    pub mem_percent: f64,
    pub disk_percent: f64,
}

/// Metric Sample - immutable once written to the store
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MetricSample {
    pub timestamp: DateTime<Utc>,
    pub cpu_percent: f64,
    pub mem_percent: f64,
    pub disk_percent: f64,
}

impl MetricSample {
    pub fn new(timestamp: DateTime<Utc>, cpu_percent: f64, mem_percent: f64, disk_percent: f64) -> Self {
        Self {
            timestamp,
            cpu_percent,
            mem_percent,
            disk_percent,
        }
    }

    pub fn from_usage(timestamp: DateTime<Utc>, usage: ResourceUsage) -> Self {
        Self::new(timestamp, usage.cpu_percent, usage.mem_percent, usage.disk_percent)
    }

    /// Values in `FEATURE_LAYOUT` order
    pub fn values(&self) -> [f64; super::layout::FEATURE_COUNT] {
        [self.cpu_percent, self.mem_percent, self.disk_percent]
    }

    /// First field outside [0, 100] (NaN included), if any
    pub fn out_of_range(&self) -> Option<(&'static str, f64)> {
        super::layout::FEATURE_LAYOUT
            .iter()
            .zip(self.values())
            .find(|(_, v)| !(0.0..=100.0).contains(v))
            .map(|(name, v)| (*name, v))
    }

    pub fn is_valid(&self) -> bool {
        self.out_of_range().is_none()
    }
}

/// Dashboard gauge band for one utilization value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UsageLevel {
    Normal,
    Elevated,
    Critical,
}

impl UsageLevel {
    pub fn from_percent(percent: f64) -> Self {
        if percent >= CRITICAL_USAGE_PERCENT {
            UsageLevel::Critical
        } else if percent >= ELEVATED_USAGE_PERCENT {
            UsageLevel::Elevated
        } else {
            UsageLevel::Normal
        }
    }
}
