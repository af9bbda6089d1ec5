use geoglyph::config::{ExtractionConfig, RasterizeMode};
use geoglyph::{FeatureError, FeatureExtractor, SiteKey};
use std::path::PathBuf;
use tempfile::TempDir;

#[test]
fn test_load_json_overrides_layout() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("config.json");
    std::fs::write(
        &path,
        r#"{
            "raster_root": "/srv/acre",
            "mandatory_inputs": { "ndvi": "s2/{site}_ndvi.tif" },
            "optional_inputs": { "hydrography": null },
            "rasterize": "densified",
            "label": 0
        }"#,
    )
    .unwrap();

    let config = ExtractionConfig::load(&path).unwrap();
    let (key, _) = SiteKey::parse("LATm10.350_LONm67.150").unwrap();

    assert_eq!(config.ndvi_path(&key), PathBuf::from("/srv/acre/s2/LATm10.350_LONm67.150_ndvi.tif"));
    assert_eq!(config.dtm_path(&key), PathBuf::from("/srv/acre/lidar/DTM_LATm10.350_LONm67.150.tif"));
    assert!(config.cloud_mask_path(&key).is_some());
    assert!(config.hydrography_path(&key).is_none());
    assert_eq!(config.rasterize, RasterizeMode::Densified);
    assert_eq!(config.label, 0);
}

#[test]
fn test_missing_config_file() {
    let result = ExtractionConfig::load("no/such/config.json");
    assert!(matches!(result, Err(FeatureError::MissingFile(_))));
}

#[test]
fn test_extractor_rejects_invalid_config() {
    let config = ExtractionConfig {
        ndvi_band: 0,
        ..ExtractionConfig::default()
    };
    assert!(matches!(
        FeatureExtractor::new(config),
        Err(FeatureError::InvalidConfig(_))
    ));
}
