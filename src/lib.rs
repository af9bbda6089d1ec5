//! Geoglyph: per-site feature extraction for archaeological site detection
//!
//! For every candidate site this library reads a vegetation-index raster, an
//! optional cloud mask, a digital terrain model and optional hydrography
//! vectors, reduces them to a small row of scalar features and appends the
//! row to a labeled tabular dataset.

pub mod types;
pub mod config;
pub mod io;
pub mod core;

// Re-export main types and functions for easier access
pub use types::{
    FeatureError, FeatureResult, FeatureRow, GeoTransform, Raster, Site, SiteKey,
    Vertex, VertexFailure,
};
pub use config::{ExtractionConfig, RasterizeMode};
pub use io::{FeatureTable, RasterReader, SiteReader, VectorReader};
pub use crate::core::{ExtractionReport, FeatureExtractor, SiteOutcome};
