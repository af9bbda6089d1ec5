use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::path::PathBuf;

/// Geospatial transformation parameters (GDAL coefficient order)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoTransform {
    pub top_left_x: f64,
    pub pixel_width: f64,
    pub rotation_x: f64,
    pub top_left_y: f64,
    pub rotation_y: f64,
    pub pixel_height: f64,
}

impl GeoTransform {
    /// North-up transform with no rotation terms
    pub fn north_up(top_left_x: f64, top_left_y: f64, pixel_width: f64, pixel_height: f64) -> Self {
        Self {
            top_left_x,
            pixel_width,
            rotation_x: 0.0,
            top_left_y,
            rotation_y: 0.0,
            pixel_height,
        }
    }

    /// GDAL's transform for rasters that carry none: pixel indices as coordinates
    pub fn identity() -> Self {
        Self::north_up(0.0, 0.0, 1.0, 1.0)
    }

    pub fn from_gdal(coeffs: [f64; 6]) -> Self {
        Self {
            top_left_x: coeffs[0],
            pixel_width: coeffs[1],
            rotation_x: coeffs[2],
            top_left_y: coeffs[3],
            rotation_y: coeffs[4],
            pixel_height: coeffs[5],
        }
    }

    pub fn to_gdal(&self) -> [f64; 6] {
        [
            self.top_left_x,
            self.pixel_width,
            self.rotation_x,
            self.top_left_y,
            self.rotation_y,
            self.pixel_height,
        ]
    }

    fn determinant(&self) -> f64 {
        self.pixel_width * self.pixel_height - self.rotation_x * self.rotation_y
    }

    /// Whether the affine part can be inverted
    pub fn is_invertible(&self) -> bool {
        let det = self.determinant();
        det.is_finite() && det.abs() > 1e-12
    }

    /// Ground coordinate of the top-left corner of pixel (row, col)
    pub fn pixel_to_ground(&self, row: f64, col: f64) -> (f64, f64) {
        let x = self.top_left_x + col * self.pixel_width + row * self.rotation_x;
        let y = self.top_left_y + col * self.rotation_y + row * self.pixel_height;
        (x, y)
    }

    /// Fractional (row, col) for a ground coordinate, `None` if the transform is singular
    pub fn ground_to_pixel(&self, x: f64, y: f64) -> Option<(f64, f64)> {
        if !self.is_invertible() {
            return None;
        }
        let det = self.determinant();
        let dx = x - self.top_left_x;
        let dy = y - self.top_left_y;

        let col = (self.pixel_height * dx - self.rotation_x * dy) / det;
        let row = (-self.rotation_y * dx + self.pixel_width * dy) / det;
        Some((row, col))
    }

    /// Ground size of one pixel along the horizontal axis
    pub fn pixel_size(&self) -> f64 {
        self.pixel_width.abs()
    }
}

impl Default for GeoTransform {
    fn default() -> Self {
        Self::north_up(0.0, 0.0, 1.0, -1.0)
    }
}

/// A single raster band with its georeferencing
#[derive(Debug, Clone)]
pub struct Raster<T> {
    pub data: Array2<T>,
    pub transform: GeoTransform,
    /// Projection as WKT, `None` when the source carries no CRS
    pub projection: Option<String>,
}

impl<T> Raster<T> {
    pub fn new(data: Array2<T>, transform: GeoTransform) -> Self {
        Self {
            data,
            transform,
            projection: None,
        }
    }

    pub fn with_projection(mut self, wkt: impl Into<String>) -> Self {
        self.projection = Some(wkt.into());
        self
    }

    /// (rows, cols)
    pub fn shape(&self) -> (usize, usize) {
        self.data.dim()
    }
}

/// A candidate site location in geographic degrees
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Site {
    pub lat: f64,
    pub lon: f64,
}

impl Site {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    pub fn key(&self) -> SiteKey {
        SiteKey::from_coordinates(self.lat, self.lon)
    }

    /// Total order on (lat, lon), used to re-sort rows computed out of order
    pub fn cmp_coordinates(&self, other: &Site) -> Ordering {
        self.lat
            .total_cmp(&other.lat)
            .then_with(|| self.lon.total_cmp(&other.lon))
    }
}

/// File-name identity of a site: `LAT{lat:.3}_LON{lon:.3}` with `-` spelled `m`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SiteKey(String);

impl SiteKey {
    pub fn from_coordinates(lat: f64, lon: f64) -> Self {
        SiteKey(format!("LAT{:.3}_LON{:.3}", lat, lon).replace('-', "m"))
    }

    /// Find a site key inside a file name and recover its coordinates
    pub fn parse(name: &str) -> Option<(SiteKey, Site)> {
        let caps = site_key_pattern()?.captures(name)?;
        let decode = |s: &str| s.replacen('m', "-", 1).parse::<f64>().ok();
        let lat = decode(caps.get(1)?.as_str())?;
        let lon = decode(caps.get(2)?.as_str())?;
        let key = SiteKey(caps.get(0)?.as_str().to_string());
        Some((key, Site::new(lat, lon)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

fn site_key_pattern() -> Option<&'static regex::Regex> {
    static PATTERN: std::sync::OnceLock<Option<regex::Regex>> = std::sync::OnceLock::new();
    PATTERN
        .get_or_init(|| regex::Regex::new(r"LAT(m?\d+\.\d{3})_LON(m?\d+\.\d{3})").ok())
        .as_ref()
}

impl fmt::Display for SiteKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One output record per processed site. NaN means "unknown", never zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureRow {
    pub lat: f64,
    pub lon: f64,
    #[serde(deserialize_with = "crate::io::table::nan_when_empty")]
    pub ndvi_mean: f64,
    #[serde(deserialize_with = "crate::io::table::nan_when_empty")]
    pub ndvi_std: f64,
    #[serde(deserialize_with = "crate::io::table::nan_when_empty")]
    pub slope_mean: f64,
    #[serde(deserialize_with = "crate::io::table::nan_when_empty")]
    pub slope_max: f64,
    #[serde(deserialize_with = "crate::io::table::nan_when_empty")]
    pub dist_river: f64,
    pub label: u8,
}

impl FeatureRow {
    pub fn site(&self) -> Site {
        Site::new(self.lat, self.lon)
    }
}

/// Why a vector vertex could not be placed on a raster grid.
///
/// Reported per vertex and tallied; never aborts a computation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, thiserror::Error)]
pub enum VertexFailure {
    #[error("vertex could not be reprojected to the working CRS")]
    Reprojection,

    #[error("vertex has a non-finite coordinate")]
    NonFinite,

    #[error("vertex falls outside the raster extent")]
    OutsideExtent,

    #[error("raster geotransform cannot be inverted")]
    SingularTransform,
}

/// A vertex in working-CRS ground coordinates, or the reason it is unusable
pub type Vertex = Result<(f64, f64), VertexFailure>;

/// Error types for feature extraction
#[derive(Debug, thiserror::Error)]
pub enum FeatureError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Missing input file: {}", .0.display())]
    MissingFile(PathBuf),

    #[error("Unreadable raster {}: {reason}", path.display())]
    UnreadableRaster { path: PathBuf, reason: String },

    #[error("Unreadable vector layer {}: {reason}", path.display())]
    UnreadableVector { path: PathBuf, reason: String },

    #[error("Grid shape mismatch: expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        expected: (usize, usize),
        actual: (usize, usize),
    },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid data format: {0}")]
    InvalidFormat(String),

    #[error("GDAL error: {0}")]
    Gdal(#[from] gdal::errors::GdalError),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type for feature extraction operations
pub type FeatureResult<T> = Result<T, FeatureError>;

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_site_key_format() {
        assert_eq!(Site::new(-10.35, -67.15).key().as_str(), "LATm10.350_LONm67.150");
        assert_eq!(Site::new(3.1, 12.0).key().as_str(), "LAT3.100_LON12.000");
    }

    #[test]
    fn test_site_key_parse_from_file_name() {
        let (key, site) = SiteKey::parse("DTM_LATm9.871_LONm67.532.tif").unwrap();
        assert_eq!(key.as_str(), "LATm9.871_LONm67.532");
        assert_relative_eq!(site.lat, -9.871);
        assert_relative_eq!(site.lon, -67.532);
        assert!(SiteKey::parse("scene.tif").is_none());
    }

    #[test]
    fn test_geotransform_inversion() {
        let gt = GeoTransform::north_up(-67.2, -10.3, 0.001, -0.001);
        let (x, y) = gt.pixel_to_ground(12.5, 40.25);
        let (row, col) = gt.ground_to_pixel(x, y).unwrap();
        assert_relative_eq!(row, 12.5, epsilon = 1e-6);
        assert_relative_eq!(col, 40.25, epsilon = 1e-6);
    }

    #[test]
    fn test_singular_geotransform() {
        let gt = GeoTransform::north_up(0.0, 0.0, 0.0, -1.0);
        assert!(!gt.is_invertible());
        assert!(gt.ground_to_pixel(1.0, 1.0).is_none());
    }
}
