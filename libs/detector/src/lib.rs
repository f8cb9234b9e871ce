//! Детекция присутствия по тепловым сеткам.

pub mod config;
mod detector;
mod label;

pub use config::{Connectivity, DetectorConfig};
pub use detector::{Cluster, Detection, OccupancyDetector};
pub use label::{Labeling, label_components};
