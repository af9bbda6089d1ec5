use crate::config::ExtractionConfig;
use crate::core::distance::{nearest_feature_distance, NearestDistance, OccupancyStats};
use crate::core::masked_stats::{masked_statistics, MaskedStatistics};
use crate::core::slope::{slope_statistics, SlopeStatistics};
use crate::io::{FeatureTable, RasterReader, SiteReader, VectorReader};
use crate::types::{FeatureError, FeatureResult, FeatureRow, Raster, Site, SiteKey};
use std::path::{Path, PathBuf};

/// Input files for one site, resolved from the configured templates
#[derive(Debug, Clone, PartialEq)]
pub struct SiteInputs {
    pub ndvi: PathBuf,
    pub dtm: PathBuf,
    pub cloud_mask: Option<PathBuf>,
    pub hydrography: Option<PathBuf>,
}

impl SiteInputs {
    /// Mandatory inputs that are not on disk
    pub fn missing_mandatory(&self) -> Vec<PathBuf> {
        [&self.ndvi, &self.dtm]
            .into_iter()
            .filter(|p| !p.exists())
            .cloned()
            .collect()
    }
}

/// Terminal state of one site
#[derive(Debug, Clone)]
pub enum SiteOutcome {
    RowAppended {
        key: SiteKey,
        row: FeatureRow,
        /// Pixels that contributed to the vegetation statistics
        valid_ndvi_pixels: usize,
        /// Rasterization counts, `None` when no hydrography was available
        occupancy: Option<OccupancyStats>,
    },
    /// A mandatory input was absent; no row is written
    Skipped { key: SiteKey, missing: Vec<PathBuf> },
    /// An input existed but could not be processed; no row is written
    Failed { key: SiteKey, reason: String },
}

impl SiteOutcome {
    pub fn key(&self) -> &SiteKey {
        match self {
            SiteOutcome::RowAppended { key, .. }
            | SiteOutcome::Skipped { key, .. }
            | SiteOutcome::Failed { key, .. } => key,
        }
    }

    pub fn row(&self) -> Option<&FeatureRow> {
        match self {
            SiteOutcome::RowAppended { row, .. } => Some(row),
            _ => None,
        }
    }
}

/// Everything one extraction run produced
#[derive(Debug, Clone, Default)]
pub struct ExtractionReport {
    pub table: FeatureTable,
    /// One outcome per input site, in input order
    pub outcomes: Vec<SiteOutcome>,
}

impl ExtractionReport {
    pub fn appended_count(&self) -> usize {
        self.table.len()
    }

    pub fn skipped_count(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o, SiteOutcome::Skipped { .. }))
            .count()
    }

    pub fn failed_count(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o, SiteOutcome::Failed { .. }))
            .count()
    }

    /// Occupancy counts summed over all appended sites
    pub fn occupancy_totals(&self) -> OccupancyStats {
        let mut totals = OccupancyStats::default();
        for outcome in &self.outcomes {
            if let SiteOutcome::RowAppended {
                occupancy: Some(stats),
                ..
            } = outcome
            {
                totals.merge(stats);
            }
        }
        totals
    }
}

/// Drives the feature engines over a list of sites
pub struct FeatureExtractor {
    config: ExtractionConfig,
}

impl FeatureExtractor {
    pub fn new(config: ExtractionConfig) -> FeatureResult<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &ExtractionConfig {
        &self.config
    }

    pub fn resolve_inputs(&self, key: &SiteKey) -> SiteInputs {
        SiteInputs {
            ndvi: self.config.ndvi_path(key),
            dtm: self.config.dtm_path(key),
            cloud_mask: self.config.cloud_mask_path(key),
            hydrography: self.config.hydrography_path(key),
        }
    }

    /// Vegetation index statistics; an absent mask leaves every pixel valid
    pub fn ndvi_features(
        &self,
        ndvi_path: &Path,
        cloud_mask_path: Option<&Path>,
    ) -> FeatureResult<MaskedStatistics> {
        let ndvi = RasterReader::read_band::<f64, _>(ndvi_path, self.config.ndvi_band)?;

        let mask = match cloud_mask_path.filter(|p| p.exists()) {
            Some(path) => Some(RasterReader::read_band::<f64, _>(path, 1)?),
            None => {
                log::debug!("No cloud mask for {}, all pixels valid", ndvi_path.display());
                None
            }
        };

        masked_statistics(ndvi.data.view(), mask.as_ref().map(|m| m.data.view()))
    }

    /// Elevation raster as f32, ready for differencing
    pub fn read_dtm(&self, dtm_path: &Path) -> FeatureResult<Raster<f32>> {
        RasterReader::read_band::<f32, _>(dtm_path, 1)
    }

    pub fn dtm_features(&self, dtm: &Raster<f32>) -> SlopeStatistics {
        slope_statistics(dtm.data.view())
    }

    /// Distance from the DTM footprint to the nearest hydrography vertex
    pub fn river_distance(
        &self,
        hydrography_path: &Path,
        dtm: &Raster<f32>,
    ) -> FeatureResult<NearestDistance> {
        let layer = VectorReader::read_layer(hydrography_path, self.config.working_epsg)?;
        Ok(nearest_feature_distance(
            layer.line_parts(),
            &dtm.transform,
            dtm.shape(),
            self.config.rasterize,
        ))
    }

    /// Run every engine for one site and decide its terminal state
    pub fn process_site(&self, site: &Site) -> SiteOutcome {
        let key = site.key();
        let inputs = self.resolve_inputs(&key);

        let missing = inputs.missing_mandatory();
        if !missing.is_empty() {
            log::warn!("Missing inputs for {}, skipping: {:?}", key, missing);
            return SiteOutcome::Skipped { key, missing };
        }

        log::info!("Processing {}...", key);
        match self.compute_row(site, &inputs) {
            Ok((row, ndvi, occupancy)) => {
                log::info!("Row appended for {}", key);
                SiteOutcome::RowAppended {
                    key,
                    row,
                    valid_ndvi_pixels: ndvi.valid_pixels,
                    occupancy,
                }
            }
            // Mandatory file removed between the existence check and the read
            Err(FeatureError::MissingFile(path)) => {
                log::warn!("Missing input for {}, skipping: {}", key, path.display());
                SiteOutcome::Skipped {
                    key,
                    missing: vec![path],
                }
            }
            Err(e) => {
                log::warn!("Failed to process {}: {}", key, e);
                SiteOutcome::Failed {
                    key,
                    reason: e.to_string(),
                }
            }
        }
    }

    fn compute_row(
        &self,
        site: &Site,
        inputs: &SiteInputs,
    ) -> FeatureResult<(FeatureRow, MaskedStatistics, Option<OccupancyStats>)> {
        let ndvi = self.ndvi_features(&inputs.ndvi, inputs.cloud_mask.as_deref())?;

        let dtm = self.read_dtm(&inputs.dtm)?;
        let slope = self.dtm_features(&dtm);

        let river = match inputs.hydrography.as_deref().filter(|p| p.exists()) {
            Some(path) => Some(self.river_distance(path, &dtm)?),
            None => {
                log::debug!("No hydrography for {}, distance is NaN", site.key());
                None
            }
        };

        let row = FeatureRow {
            lat: site.lat,
            lon: site.lon,
            ndvi_mean: ndvi.mean,
            ndvi_std: ndvi.std_dev,
            slope_mean: slope.mean,
            slope_max: slope.max,
            dist_river: river.map(|r| r.distance).unwrap_or(f64::NAN),
            label: self.config.label,
        };
        Ok((row, ndvi, river.map(|r| r.stats)))
    }

    /// Process every site and collect appended rows into a table.
    ///
    /// With `parallel` enabled rows are sorted by (lat, lon); otherwise they
    /// follow the input order.
    pub fn extract(&self, sites: &[Site]) -> ExtractionReport {
        log::info!("Extracting features for {} sites", sites.len());

        let outcomes = if self.config.parallel {
            self.process_parallel(sites)
        } else {
            sites.iter().map(|site| self.process_site(site)).collect()
        };

        let mut table: FeatureTable = outcomes.iter().filter_map(|o| o.row().cloned()).collect();
        if self.config.parallel {
            table.sort_by_site();
        }

        let report = ExtractionReport { table, outcomes };
        log::info!(
            "Extraction finished: {} rows, {} skipped, {} failed",
            report.appended_count(),
            report.skipped_count(),
            report.failed_count()
        );
        let occupancy = report.occupancy_totals();
        if occupancy.failures() > 0 {
            log::info!(
                "{} of {} hydrography vertices could not be placed: {:?}",
                occupancy.failures(),
                occupancy.vertices,
                occupancy
            );
        }
        report
    }

    #[cfg(feature = "parallel")]
    fn process_parallel(&self, sites: &[Site]) -> Vec<SiteOutcome> {
        use rayon::prelude::*;
        sites.par_iter().map(|site| self.process_site(site)).collect()
    }

    #[cfg(not(feature = "parallel"))]
    fn process_parallel(&self, sites: &[Site]) -> Vec<SiteOutcome> {
        log::warn!("Built without the `parallel` feature, processing sequentially");
        sites.iter().map(|site| self.process_site(site)).collect()
    }

    /// Read the site table, extract every site and rewrite the output table
    pub fn run(&self) -> FeatureResult<ExtractionReport> {
        let sites = SiteReader::read_sites(&self.config.site_table_path)?;
        let report = self.extract(&sites);
        report.table.write_csv(&self.config.output_path)?;
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{MandatoryInputs, OptionalInputs};
    use crate::types::GeoTransform;
    use ndarray::Array2;
    use tempfile::TempDir;

    fn config_in(root: &Path) -> ExtractionConfig {
        ExtractionConfig {
            raster_root: root.to_path_buf(),
            vector_root: root.to_path_buf(),
            output_path: root.join("features.csv"),
            mandatory_inputs: MandatoryInputs {
                ndvi: "{site}_ndvi.tif".to_string(),
                dtm: "{site}_dtm.tif".to_string(),
            },
            optional_inputs: OptionalInputs {
                cloud_mask: Some("{site}_mask.tif".to_string()),
                hydrography: None,
            },
            ..ExtractionConfig::default()
        }
    }

    #[test]
    fn test_resolve_inputs() {
        let extractor = FeatureExtractor::new(config_in(Path::new("/data"))).unwrap();
        let inputs = extractor.resolve_inputs(&Site::new(-10.35, -67.15).key());
        assert_eq!(inputs.ndvi, PathBuf::from("/data/LATm10.350_LONm67.150_ndvi.tif"));
        assert_eq!(inputs.cloud_mask, Some(PathBuf::from("/data/LATm10.350_LONm67.150_mask.tif")));
        assert!(inputs.hydrography.is_none());
    }

    #[test]
    fn test_missing_dtm_skips_site() {
        let dir = TempDir::new().unwrap();
        let extractor = FeatureExtractor::new(config_in(dir.path())).unwrap();
        let site = Site::new(1.0, 2.0);

        let ndvi = Raster::new(Array2::<f64>::from_elem((3, 3), 0.5), GeoTransform::default());
        RasterReader::write_geotiff(&ndvi, extractor.resolve_inputs(&site.key()).ndvi).unwrap();

        match extractor.process_site(&site) {
            SiteOutcome::Skipped { missing, .. } => {
                assert_eq!(missing, vec![extractor.resolve_inputs(&site.key()).dtm]);
            }
            other => panic!("expected skip, got {:?}", other),
        }
    }

    #[test]
    fn test_unreadable_dtm_fails_site() {
        let dir = TempDir::new().unwrap();
        let extractor = FeatureExtractor::new(config_in(dir.path())).unwrap();
        let site = Site::new(1.0, 2.0);
        let inputs = extractor.resolve_inputs(&site.key());

        let ndvi = Raster::new(Array2::<f64>::from_elem((3, 3), 0.5), GeoTransform::default());
        RasterReader::write_geotiff(&ndvi, &inputs.ndvi).unwrap();
        std::fs::write(&inputs.dtm, b"corrupt").unwrap();

        let report = extractor.extract(&[site]);
        assert_eq!(report.failed_count(), 1);
        assert_eq!(report.skipped_count(), 0);
        assert!(report.table.is_empty());
    }

    #[test]
    fn test_cloud_mask_applied_when_present() {
        let dir = TempDir::new().unwrap();
        let extractor = FeatureExtractor::new(config_in(dir.path())).unwrap();
        let site = Site::new(1.0, 2.0);
        let inputs = extractor.resolve_inputs(&site.key());

        let mut values = Array2::<f64>::from_elem((2, 2), 0.4);
        values[[0, 0]] = 9.0;
        let mut mask = Array2::<u8>::zeros((2, 2));
        mask[[0, 0]] = 1;
        RasterReader::write_geotiff(&Raster::new(values, GeoTransform::default()), &inputs.ndvi).unwrap();
        RasterReader::write_geotiff(
            &Raster::new(mask, GeoTransform::default()),
            inputs.cloud_mask.as_ref().unwrap(),
        )
        .unwrap();
        RasterReader::write_geotiff(
            &Raster::new(Array2::<f32>::zeros((2, 2)), GeoTransform::default()),
            &inputs.dtm,
        )
        .unwrap();

        let report = extractor.extract(&[site]);
        let row = &report.table.rows()[0];
        assert!((row.ndvi_mean - 0.4).abs() < 1e-12);
        assert!(row.ndvi_std.abs() < 1e-12);
        assert_eq!(row.slope_mean, 0.0);
        assert!(row.dist_river.is_nan());
        match &report.outcomes[0] {
            SiteOutcome::RowAppended { valid_ndvi_pixels, occupancy, .. } => {
                assert_eq!(*valid_ndvi_pixels, 3);
                assert!(occupancy.is_none());
            }
            other => panic!("expected row, got {:?}", other),
        }
    }
}
