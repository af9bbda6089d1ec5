use crate::types::{FeatureError, FeatureResult, FeatureRow};
use serde::{Deserialize, Deserializer};
use std::path::Path;

/// Output column order
pub const COLUMNS: [&str; 8] = [
    "lat",
    "lon",
    "ndvi_mean",
    "ndvi_std",
    "slope_mean",
    "slope_max",
    "dist_river",
    "label",
];

/// Ordered feature rows for one extraction run
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeatureTable {
    rows: Vec<FeatureRow>,
}

impl FeatureTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, row: FeatureRow) {
        self.rows.push(row);
    }

    pub fn rows(&self) -> &[FeatureRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Sort rows by (lat, lon)
    pub fn sort_by_site(&mut self) {
        self.rows
            .sort_by(|a, b| a.site().cmp_coordinates(&b.site()));
    }

    /// Write the table as CSV, replacing any existing file. NaN is written as `NaN`.
    pub fn write_csv<P: AsRef<Path>>(&self, path: P) -> FeatureResult<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let mut writer = csv::Writer::from_path(path)?;
        if self.rows.is_empty() {
            // serde only emits the header alongside the first record
            writer.write_record(COLUMNS)?;
        }
        for row in &self.rows {
            writer.serialize(row)?;
        }
        writer.flush()?;

        log::info!("Wrote {} feature rows to: {}", self.rows.len(), path.display());
        Ok(())
    }

    /// Read a table written by `write_csv`; empty numeric cells read as NaN
    pub fn read_csv<P: AsRef<Path>>(path: P) -> FeatureResult<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(FeatureError::MissingFile(path.to_path_buf()));
        }

        let mut reader = csv::Reader::from_path(path)?;
        let headers = reader.headers()?.clone();
        if headers.iter().ne(COLUMNS.iter().copied()) {
            return Err(FeatureError::InvalidFormat(format!(
                "unexpected feature table columns: {:?}",
                headers.iter().collect::<Vec<_>>()
            )));
        }

        let mut table = FeatureTable::new();
        for row in reader.deserialize::<FeatureRow>() {
            table.push(row?);
        }
        Ok(table)
    }
}

impl FromIterator<FeatureRow> for FeatureTable {
    fn from_iter<I: IntoIterator<Item = FeatureRow>>(iter: I) -> Self {
        Self {
            rows: iter.into_iter().collect(),
        }
    }
}

/// Deserialize an optional float cell, mapping an empty cell to NaN
pub(crate) fn nan_when_empty<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    let value: Option<f64> = Option::deserialize(deserializer)?;
    Ok(value.unwrap_or(f64::NAN))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn row(lat: f64, lon: f64) -> FeatureRow {
        FeatureRow {
            lat,
            lon,
            ndvi_mean: 0.61,
            ndvi_std: 0.05,
            slope_mean: 1.25,
            slope_max: 7.5,
            dist_river: f64::NAN,
            label: 1,
        }
    }

    #[test]
    fn test_sort_by_site() {
        let mut table: FeatureTable = vec![row(-9.0, -67.0), row(-10.0, -66.0), row(-10.0, -67.0)]
            .into_iter()
            .collect();
        table.sort_by_site();

        let order: Vec<(f64, f64)> = table.rows().iter().map(|r| (r.lat, r.lon)).collect();
        assert_eq!(order, vec![(-10.0, -67.0), (-10.0, -66.0), (-9.0, -67.0)]);
    }

    #[test]
    fn test_empty_table_still_has_header() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("empty.csv");
        FeatureTable::new().write_csv(&path).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text.trim(), COLUMNS.join(","));
        assert!(FeatureTable::read_csv(&path).unwrap().is_empty());
    }

    #[test]
    fn test_empty_cells_read_as_nan() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("pandas.csv");
        std::fs::write(
            &path,
            "lat,lon,ndvi_mean,ndvi_std,slope_mean,slope_max,dist_river,label\n\
             -10.35,-67.15,0.5,0.1,1.0,2.0,,1\n",
        )
        .unwrap();

        let table = FeatureTable::read_csv(&path).unwrap();
        assert_eq!(table.len(), 1);
        assert!(table.rows()[0].dist_river.is_nan());
    }

    #[test]
    fn test_wrong_columns_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("other.csv");
        std::fs::write(&path, "a,b\n1,2\n").unwrap();
        assert!(matches!(
            FeatureTable::read_csv(&path),
            Err(FeatureError::InvalidFormat(_))
        ));
    }
}
