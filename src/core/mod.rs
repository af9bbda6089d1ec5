//! Feature engines and the per-site driver

pub mod masked_stats;
pub mod slope;
pub mod distance;
pub mod assembly;
pub mod cloud_mask;
pub mod coverage;

// Re-export main types
pub use masked_stats::{masked_statistics, MaskedStatistics};
pub use slope::{slope_statistics, SlopeStatistics};
pub use distance::{nearest_feature_distance, DistanceField, NearestDistance, OccupancyGrid, OccupancyStats};
pub use assembly::{ExtractionReport, FeatureExtractor, SiteInputs, SiteOutcome};
pub use cloud_mask::{cloud_mask_from_scl, generate_cloud_mask, DEFAULT_CLOUD_CLASSES};
pub use coverage::{assess_coverage, validate_directory, validate_scene, CoverageThresholds, CoverageVerdict};
