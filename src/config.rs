//! Run configuration for feature extraction
//!
//! Every path the extractor touches is derived from this struct; nothing is
//! resolved against the process working directory implicitly.

use crate::types::{FeatureError, FeatureResult, SiteKey};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

/// Placeholder substituted with the site key in file-name templates
pub const SITE_PLACEHOLDER: &str = "{site}";

/// How hydrographic lines are burned into the occupancy grid
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RasterizeMode {
    /// Only the explicit vertices of each line
    #[default]
    Vertices,
    /// Vertices plus points interpolated every half pixel along each segment
    Densified,
}

/// Inputs without which a site is skipped
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MandatoryInputs {
    /// Vegetation index raster, relative to `raster_root`
    pub ndvi: String,
    /// Elevation raster, relative to `raster_root`
    pub dtm: String,
}

impl Default for MandatoryInputs {
    fn default() -> Self {
        Self {
            ndvi: "sentinel2/{site}.tiff".to_string(),
            dtm: "lidar/DTM_{site}.tif".to_string(),
        }
    }
}

/// Inputs whose absence only turns the dependent features into NaN.
/// `None` disables the input entirely.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OptionalInputs {
    /// Cloud/validity mask raster, relative to `raster_root`
    pub cloud_mask: Option<String>,
    /// Hydrographic vector layer, relative to `vector_root`
    pub hydrography: Option<String>,
}

impl Default for OptionalInputs {
    fn default() -> Self {
        Self {
            cloud_mask: Some("sentinel2/{site}_CLOUD_MASK.tiff".to_string()),
            hydrography: Some("hydro_{site}.geojson".to_string()),
        }
    }
}

/// Feature extraction configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionConfig {
    /// Point layer (GeoJSON or any OGR format) or CSV with `lat`,`lon` columns
    pub site_table_path: PathBuf,
    pub raster_root: PathBuf,
    pub vector_root: PathBuf,
    /// Destination CSV, rebuilt on every run
    pub output_path: PathBuf,
    pub mandatory_inputs: MandatoryInputs,
    pub optional_inputs: OptionalInputs,
    /// 1-based band holding the vegetation index
    pub ndvi_band: usize,
    /// Constant class marker written to every row
    pub label: u8,
    /// EPSG code vector layers are reprojected to before rasterization
    pub working_epsg: u32,
    pub rasterize: RasterizeMode,
    /// Process sites with rayon (needs the `parallel` feature)
    pub parallel: bool,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            site_table_path: PathBuf::from("data/geojson/geoglifos_known.geojson"),
            raster_root: PathBuf::from("data/raw"),
            vector_root: PathBuf::from("data/raw/hydrography"),
            output_path: PathBuf::from("data/processed/features_labeled.csv"),
            mandatory_inputs: MandatoryInputs::default(),
            optional_inputs: OptionalInputs::default(),
            ndvi_band: 1,
            label: 1,
            working_epsg: 4326,
            rasterize: RasterizeMode::default(),
            parallel: false,
        }
    }
}

impl ExtractionConfig {
    /// Load configuration from a JSON file; missing keys take their defaults
    pub fn load<P: AsRef<Path>>(path: P) -> FeatureResult<Self> {
        let path = path.as_ref();
        log::info!("Loading extraction config from: {}", path.display());

        if !path.exists() {
            return Err(FeatureError::MissingFile(path.to_path_buf()));
        }
        let reader = BufReader::new(File::open(path)?);
        let config: ExtractionConfig = serde_json::from_reader(reader)?;
        config.validate()?;

        log::debug!("Extraction config: {:?}", config);
        Ok(config)
    }

    pub fn validate(&self) -> FeatureResult<()> {
        if self.ndvi_band == 0 {
            return Err(FeatureError::InvalidConfig(
                "ndvi_band is 1-based; 0 is not a band".to_string(),
            ));
        }

        let templates = [
            ("mandatory_inputs.ndvi", Some(&self.mandatory_inputs.ndvi)),
            ("mandatory_inputs.dtm", Some(&self.mandatory_inputs.dtm)),
            ("optional_inputs.cloud_mask", self.optional_inputs.cloud_mask.as_ref()),
            ("optional_inputs.hydrography", self.optional_inputs.hydrography.as_ref()),
        ];
        for (name, template) in templates {
            let Some(template) = template else { continue };
            if !template.contains(SITE_PLACEHOLDER) {
                return Err(FeatureError::InvalidConfig(format!(
                    "{} template '{}' does not contain {}",
                    name, template, SITE_PLACEHOLDER
                )));
            }
        }

        Ok(())
    }

    pub fn ndvi_path(&self, key: &SiteKey) -> PathBuf {
        resolve(&self.raster_root, &self.mandatory_inputs.ndvi, key)
    }

    pub fn dtm_path(&self, key: &SiteKey) -> PathBuf {
        resolve(&self.raster_root, &self.mandatory_inputs.dtm, key)
    }

    pub fn cloud_mask_path(&self, key: &SiteKey) -> Option<PathBuf> {
        self.optional_inputs
            .cloud_mask
            .as_ref()
            .map(|t| resolve(&self.raster_root, t, key))
    }

    pub fn hydrography_path(&self, key: &SiteKey) -> Option<PathBuf> {
        self.optional_inputs
            .hydrography
            .as_ref()
            .map(|t| resolve(&self.vector_root, t, key))
    }
}

fn resolve(root: &Path, template: &str, key: &SiteKey) -> PathBuf {
    root.join(template.replace(SITE_PLACEHOLDER, key.as_str()))
}
