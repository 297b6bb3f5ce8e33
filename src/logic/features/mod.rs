//! Features Module - sample shape and model input
//!
//! `layout` fixes the ordered schema, `sample` is the stored record,
//! `vector` is what the scorer consumes.

pub mod layout;
pub mod sample;
pub mod vector;


// Re-export common types
pub use layout::{feature_schema, layout_hash, LayoutInfo, FEATURE_COUNT, FEATURE_LAYOUT, FEATURE_VERSION};
pub use sample::{MetricSample, ResourceUsage, UsageLevel};
pub use vector::FeatureVector;
