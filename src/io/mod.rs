//! I/O modules for reading rasters, vector layers and site tables, and writing feature tables

pub mod raster;
pub mod vector;
pub mod sites;
pub mod table;

pub use raster::RasterReader;
pub use vector::{VectorGeometry, VectorLayer, VectorReader};
pub use sites::SiteReader;
pub use table::FeatureTable;
