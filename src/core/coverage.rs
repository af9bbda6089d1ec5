//! Scene quality screening before feature extraction

use crate::config::ExtractionConfig;
use crate::io::RasterReader;
use crate::types::{FeatureError, FeatureResult, SiteKey};
use ndarray::ArrayView2;
use std::collections::BTreeSet;
use std::fmt;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CoverageThresholds {
    /// 1-based band holding NDVI; downloaded scenes stack B04, B03, B02, NDVI
    pub band: usize,
    /// Largest acceptable fraction of cloud-flagged pixels
    pub max_cloud_fraction: f64,
    /// Smallest acceptable mean vegetation index
    pub min_mean_ndvi: f64,
}

impl Default for CoverageThresholds {
    fn default() -> Self {
        Self {
            band: 4,
            max_cloud_fraction: 0.5,
            min_mean_ndvi: 5.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum CoverageVerdict {
    Acceptable,
    MissingNdvi(PathBuf),
    MissingMask(PathBuf),
    AllZero,
    AllMissing,
    TooCloudy(f64),
    LowVegetation(f64),
    /// Scene or mask present but not usable
    Unreadable(String),
}

impl CoverageVerdict {
    pub fn is_acceptable(&self) -> bool {
        matches!(self, CoverageVerdict::Acceptable)
    }
}

impl fmt::Display for CoverageVerdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CoverageVerdict::Acceptable => write!(f, "acceptable quality"),
            CoverageVerdict::MissingNdvi(p) => write!(f, "NDVI file missing: {}", p.display()),
            CoverageVerdict::MissingMask(p) => write!(f, "cloud mask missing: {}", p.display()),
            CoverageVerdict::AllZero => write!(f, "NDVI is all zero"),
            CoverageVerdict::AllMissing => write!(f, "NDVI is all NaN"),
            CoverageVerdict::TooCloudy(fraction) => {
                write!(f, "too cloudy: {:.1}%", fraction * 100.0)
            }
            CoverageVerdict::LowVegetation(mean) => write!(f, "low NDVI: mean = {:.2}", mean),
            CoverageVerdict::Unreadable(reason) => write!(f, "unreadable: {}", reason),
        }
    }
}

/// Screen one scene. Checks run in order: all-zero, all-NaN, cloud fraction,
/// mean vegetation index.
pub fn assess_coverage(
    ndvi: ArrayView2<f64>,
    cloud_mask: ArrayView2<f64>,
    thresholds: &CoverageThresholds,
) -> CoverageVerdict {
    if ndvi.iter().all(|&v| v == 0.0) {
        return CoverageVerdict::AllZero;
    }
    if ndvi.iter().all(|v| v.is_nan()) {
        return CoverageVerdict::AllMissing;
    }

    let cloud_fraction = if cloud_mask.is_empty() {
        0.0
    } else {
        cloud_mask.sum() / cloud_mask.len() as f64
    };
    if cloud_fraction > thresholds.max_cloud_fraction {
        return CoverageVerdict::TooCloudy(cloud_fraction);
    }

    let (sum, count) = ndvi
        .iter()
        .filter(|v| !v.is_nan())
        .fold((0.0, 0usize), |(s, n), &v| (s + v, n + 1));
    let mean = sum / count as f64;
    if mean < thresholds.min_mean_ndvi {
        return CoverageVerdict::LowVegetation(mean);
    }

    CoverageVerdict::Acceptable
}

/// Screen the scene files of one site
pub fn validate_scene(
    ndvi_path: &Path,
    mask_path: &Path,
    thresholds: &CoverageThresholds,
) -> FeatureResult<CoverageVerdict> {
    if !ndvi_path.exists() {
        return Ok(CoverageVerdict::MissingNdvi(ndvi_path.to_path_buf()));
    }
    if !mask_path.exists() {
        return Ok(CoverageVerdict::MissingMask(mask_path.to_path_buf()));
    }

    let ndvi = RasterReader::read_band::<f64, _>(ndvi_path, thresholds.band)?;
    let mask = RasterReader::read_band::<f64, _>(mask_path, 1)?;
    if mask.shape() != ndvi.shape() {
        return Err(FeatureError::ShapeMismatch {
            expected: ndvi.shape(),
            actual: mask.shape(),
        });
    }
    Ok(assess_coverage(ndvi.data.view(), mask.data.view(), thresholds))
}

/// Site keys of the scenes in `dir`, ignoring SCL and mask files
pub fn scan_scene_keys(dir: &Path) -> FeatureResult<Vec<SiteKey>> {
    let mut keys = BTreeSet::new();
    for entry in std::fs::read_dir(dir)? {
        let name = entry?.file_name();
        let Some(name) = name.to_str() else { continue };
        if name.contains("_SCL") || name.contains("_CLOUD") {
            continue;
        }
        if let Some((key, _)) = SiteKey::parse(name) {
            keys.insert(key);
        }
    }
    Ok(keys.into_iter().collect())
}

/// Screen every scene found next to the configured NDVI rasters.
///
/// A scene that cannot be read gets an `Unreadable` verdict; the scan continues.
pub fn validate_directory(
    config: &ExtractionConfig,
    thresholds: &CoverageThresholds,
) -> FeatureResult<Vec<(SiteKey, CoverageVerdict)>> {
    let template_dir = Path::new(&config.mandatory_inputs.ndvi)
        .parent()
        .unwrap_or_else(|| Path::new(""));
    let scene_dir = config.raster_root.join(template_dir);
    log::info!("Validating scenes in: {}", scene_dir.display());

    let keys = scan_scene_keys(&scene_dir)?;
    let mut verdicts = Vec::with_capacity(keys.len());
    for key in keys {
        let Some(mask_path) = config.cloud_mask_path(&key) else {
            return Err(FeatureError::InvalidConfig(
                "scene validation needs optional_inputs.cloud_mask".to_string(),
            ));
        };
        let verdict = match validate_scene(&config.ndvi_path(&key), &mask_path, thresholds) {
            Ok(verdict) => verdict,
            Err(e) => {
                log::warn!("Cannot validate {}: {}", key, e);
                CoverageVerdict::Unreadable(e.to_string())
            }
        };
        verdicts.push((key, verdict));
    }
    Ok(verdicts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{GeoTransform, Raster};
    use approx::assert_relative_eq;
    use gdal::raster::Buffer;
    use gdal::DriverManager;
    use ndarray::{array, Array2};
    use tempfile::TempDir;

    /// Four-band 2x2 scene: zero red/green/blue reflectance and a constant NDVI band
    fn write_stacked_scene(path: &Path, ndvi: f64) {
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        let driver = DriverManager::get_driver_by_name("GTiff").unwrap();
        let dataset = driver.create_with_band_type::<f64, _>(path, 2, 2, 4).unwrap();
        for band in 1..=4 {
            let value = if band == 4 { ndvi } else { 0.0 };
            let buffer = Buffer {
                size: (2, 2),
                data: vec![value; 4],
            };
            dataset.rasterband(band).unwrap().write((0, 0), (2, 2), &buffer).unwrap();
        }
    }

    fn write_clear_mask(path: &Path) {
        let mask = Raster::new(Array2::<u8>::zeros((2, 2)), GeoTransform::default());
        RasterReader::write_geotiff(&mask, path).unwrap();
    }

    #[test]
    fn test_all_zero_scene() {
        let ndvi = Array2::<f64>::zeros((3, 3));
        let mask = Array2::<f64>::zeros((3, 3));
        let verdict = assess_coverage(ndvi.view(), mask.view(), &CoverageThresholds::default());
        assert_eq!(verdict, CoverageVerdict::AllZero);
    }

    #[test]
    fn test_all_nan_scene() {
        let ndvi = Array2::<f64>::from_elem((2, 2), f64::NAN);
        let mask = Array2::<f64>::zeros((2, 2));
        let verdict = assess_coverage(ndvi.view(), mask.view(), &CoverageThresholds::default());
        assert_eq!(verdict, CoverageVerdict::AllMissing);
    }

    #[test]
    fn test_cloudy_scene() {
        let ndvi = Array2::<f64>::from_elem((2, 2), 120.0);
        let mask = array![[1.0, 1.0], [1.0, 0.0]];
        match assess_coverage(ndvi.view(), mask.view(), &CoverageThresholds::default()) {
            CoverageVerdict::TooCloudy(fraction) => assert_relative_eq!(fraction, 0.75),
            other => panic!("unexpected verdict {:?}", other),
        }
    }

    #[test]
    fn test_low_vegetation_ignores_nan() {
        let ndvi = array![[1.0, f64::NAN], [3.0, 2.0]];
        let mask = Array2::<f64>::zeros((2, 2));
        let verdict = assess_coverage(ndvi.view(), mask.view(), &CoverageThresholds::default());
        assert_eq!(verdict, CoverageVerdict::LowVegetation(2.0));
    }

    #[test]
    fn test_acceptable_scene() {
        let ndvi = array![[80.0, 95.0], [110.0, 60.0]];
        let mask = array![[0.0, 1.0], [0.0, 0.0]];
        let verdict = assess_coverage(ndvi.view(), mask.view(), &CoverageThresholds::default());
        assert!(verdict.is_acceptable());
    }

    #[test]
    fn test_scan_skips_auxiliary_files() {
        let dir = tempfile::TempDir::new().unwrap();
        for name in [
            "LATm10.350_LONm67.150.tiff",
            "LATm10.350_LONm67.150_SCL.tiff",
            "LATm10.350_LONm67.150_CLOUD_MASK.tiff",
            "LAT2.000_LON3.500.tiff",
            "notes.txt",
        ] {
            std::fs::write(dir.path().join(name), b"").unwrap();
        }

        let keys = scan_scene_keys(dir.path()).unwrap();
        let names: Vec<&str> = keys.iter().map(|k| k.as_str()).collect();
        assert_eq!(names, vec!["LAT2.000_LON3.500", "LATm10.350_LONm67.150"]);
    }

    #[test]
    fn test_scene_validation_reads_ndvi_band() {
        let dir = TempDir::new().unwrap();
        let scene = dir.path().join("LAT2.000_LON3.500.tiff");
        let mask = dir.path().join("LAT2.000_LON3.500_CLOUD_MASK.tiff");
        write_stacked_scene(&scene, 80.0);
        write_clear_mask(&mask);

        let thresholds = CoverageThresholds::default();
        assert_eq!(thresholds.band, 4);
        let verdict = validate_scene(&scene, &mask, &thresholds).unwrap();
        assert_eq!(verdict, CoverageVerdict::Acceptable);

        let red_band = CoverageThresholds { band: 1, ..thresholds };
        let verdict = validate_scene(&scene, &mask, &red_band).unwrap();
        assert_eq!(verdict, CoverageVerdict::AllZero);
    }

    #[test]
    fn test_unreadable_scene_does_not_stop_directory_scan() {
        let dir = TempDir::new().unwrap();
        let config = ExtractionConfig {
            raster_root: dir.path().to_path_buf(),
            ..ExtractionConfig::default()
        };
        let (good, _) = SiteKey::parse("LAT2.000_LON3.500").unwrap();
        let (broken, _) = SiteKey::parse("LATm10.350_LONm67.150").unwrap();

        write_stacked_scene(&config.ndvi_path(&good), 80.0);
        write_clear_mask(&config.cloud_mask_path(&good).unwrap());
        std::fs::write(config.ndvi_path(&broken), b"not a tiff").unwrap();
        write_clear_mask(&config.cloud_mask_path(&broken).unwrap());

        let verdicts = validate_directory(&config, &CoverageThresholds::default()).unwrap();
        assert_eq!(verdicts.len(), 2);
        assert_eq!(verdicts[0], (good, CoverageVerdict::Acceptable));
        assert_eq!(verdicts[1].0, broken);
        assert!(matches!(verdicts[1].1, CoverageVerdict::Unreadable(_)));
    }
}
