use crate::types::{FeatureError, FeatureResult, Site, SiteKey};
use gdal::vector::LayerAccess;
use gdal::Dataset;
use serde::Deserialize;
use std::collections::HashSet;
use std::path::Path;

#[derive(Debug, Deserialize)]
struct SiteRecord {
    lat: f64,
    lon: f64,
}

/// Site table reader
pub struct SiteReader;

impl SiteReader {
    /// Read candidate sites from a CSV (`lat`, `lon` columns) or any OGR point layer.
    ///
    /// Point x/y are taken as lon/lat. Sites whose key repeats an earlier one are dropped.
    pub fn read_sites<P: AsRef<Path>>(path: P) -> FeatureResult<Vec<Site>> {
        let path = path.as_ref();
        log::info!("Reading site table from: {}", path.display());

        if !path.exists() {
            return Err(FeatureError::MissingFile(path.to_path_buf()));
        }

        let is_csv = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.eq_ignore_ascii_case("csv"))
            .unwrap_or(false);
        let sites = if is_csv {
            Self::read_csv(path)?
        } else {
            Self::read_point_layer(path)?
        };

        let unique = deduplicate(sites);
        log::info!("Loaded {} sites", unique.len());
        Ok(unique)
    }

    fn read_csv(path: &Path) -> FeatureResult<Vec<Site>> {
        let mut reader = csv::Reader::from_path(path)?;
        let mut sites = Vec::new();
        for record in reader.deserialize::<SiteRecord>() {
            let record = record?;
            sites.push(Site::new(record.lat, record.lon));
        }
        Ok(sites)
    }

    fn read_point_layer(path: &Path) -> FeatureResult<Vec<Site>> {
        let dataset = Dataset::open(path).map_err(|e| FeatureError::UnreadableVector {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        let mut layer = dataset.layer(0)?;

        let mut sites = Vec::new();
        for (index, feature) in layer.features().enumerate() {
            let point = feature
                .geometry()
                .filter(|g| !g.is_empty() && g.geometry_name() == "POINT")
                .map(|g| g.get_point(0));
            match point {
                Some((lon, lat, _)) => sites.push(Site::new(lat, lon)),
                None => log::warn!("Site table feature {} is not a point, skipping", index),
            }
        }
        Ok(sites)
    }
}

fn deduplicate(sites: Vec<Site>) -> Vec<Site> {
    let mut seen: HashSet<SiteKey> = HashSet::new();
    sites
        .into_iter()
        .filter(|site| {
            let key = site.key();
            let fresh = seen.insert(key.clone());
            if !fresh {
                log::warn!("Duplicate site {} in site table, keeping the first", key);
            }
            fresh
        })
        .collect()
}
