use crate::types::{FeatureError, FeatureResult, GeoTransform, Raster};
use gdal::raster::{Buffer, GdalType};
use gdal::{Dataset, DriverManager};
use ndarray::Array2;
use std::path::Path;

/// Single-band raster reader backed by GDAL
pub struct RasterReader;

impl RasterReader {
    /// Read one band (1-based) together with its geotransform and projection.
    ///
    /// The dataset is opened, read and dropped inside this call.
    pub fn read_band<T, P>(path: P, band: usize) -> FeatureResult<Raster<T>>
    where
        T: GdalType + Copy,
        P: AsRef<Path>,
    {
        let path = path.as_ref();
        log::debug!("Reading band {} from: {}", band, path.display());

        if !path.exists() {
            return Err(FeatureError::MissingFile(path.to_path_buf()));
        }
        let unreadable = |reason: String| FeatureError::UnreadableRaster {
            path: path.to_path_buf(),
            reason,
        };

        let dataset = Dataset::open(path).map_err(|e| unreadable(e.to_string()))?;
        let (width, height) = dataset.raster_size();
        let band_count = dataset.raster_count();
        if band == 0 || band as isize > band_count {
            return Err(unreadable(format!(
                "band {} requested but dataset has {} band(s)",
                band, band_count
            )));
        }

        // No geotransform: row and column index map straight to y and x
        let geo_transform = dataset
            .geo_transform()
            .map(GeoTransform::from_gdal)
            .unwrap_or_else(|_| GeoTransform::identity());
        if !geo_transform.is_invertible() {
            return Err(unreadable(format!(
                "geotransform {:?} is not invertible",
                geo_transform
            )));
        }

        log::debug!("Raster size: {}x{}", width, height);
        log::debug!("Raster geotransform: {:?}", geo_transform);

        let rasterband = dataset
            .rasterband(band as isize)
            .map_err(|e| unreadable(e.to_string()))?;
        let band_data = rasterband
            .read_as::<T>((0, 0), (width, height), (width, height), None)
            .map_err(|e| unreadable(e.to_string()))?;

        let data = Array2::from_shape_vec((height, width), band_data.data)
            .map_err(|e| unreadable(format!("failed to reshape band data: {}", e)))?;

        let projection = dataset.projection();
        let mut raster = Raster::new(data, geo_transform);
        if !projection.is_empty() {
            raster = raster.with_projection(projection);
        }
        Ok(raster)
    }

    /// Write a single-band GeoTIFF carrying the raster's transform and projection
    pub fn write_geotiff<T, P>(raster: &Raster<T>, path: P) -> FeatureResult<()>
    where
        T: GdalType + Copy,
        P: AsRef<Path>,
    {
        let path = path.as_ref();
        log::info!("Writing raster to: {}", path.display());

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let (rows, cols) = raster.shape();
        let driver = DriverManager::get_driver_by_name("GTiff")?;
        let mut dataset =
            driver.create_with_band_type::<T, _>(path, cols as isize, rows as isize, 1)?;

        dataset.set_geo_transform(&raster.transform.to_gdal())?;
        if let Some(wkt) = &raster.projection {
            dataset.set_projection(wkt)?;
        }

        let mut band = dataset.rasterband(1)?;
        let buffer = Buffer {
            size: (cols, rows),
            data: raster.data.iter().copied().collect(),
        };
        band.write((0, 0), (cols, rows), &buffer)?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gdal::spatial_ref::SpatialRef;
    use tempfile::TempDir;

    #[test]
    fn test_missing_raster_is_reported_as_missing() {
        let result = RasterReader::read_band::<f64, _>("does/not/exist.tif", 1);
        assert!(matches!(result, Err(FeatureError::MissingFile(_))));
    }

    #[test]
    fn test_garbage_file_is_unreadable() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("broken.tif");
        std::fs::write(&path, b"this is not a tiff").unwrap();

        let result = RasterReader::read_band::<f64, _>(&path, 1);
        assert!(matches!(result, Err(FeatureError::UnreadableRaster { .. })));
    }

    #[test]
    fn test_write_then_read_preserves_grid_and_georeferencing() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested/elevation.tif");

        let data = Array2::from_shape_fn((4, 6), |(r, c)| (r * 6 + c) as f32);
        let transform = GeoTransform::north_up(-67.2, -10.3, 0.001, -0.001);
        let wkt = SpatialRef::from_epsg(4326).unwrap().to_wkt().unwrap();
        let raster = Raster::new(data.clone(), transform).with_projection(wkt);

        RasterReader::write_geotiff(&raster, &path).unwrap();
        let loaded = RasterReader::read_band::<f32, _>(&path, 1).unwrap();

        assert_eq!(loaded.shape(), (4, 6));
        assert_eq!(loaded.data, data);
        assert_eq!(loaded.transform, transform);
        assert!(loaded.projection.is_some());
    }

    #[test]
    fn test_missing_geotransform_falls_back_to_identity() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bare.tif");
        {
            let driver = DriverManager::get_driver_by_name("GTiff").unwrap();
            driver.create_with_band_type::<f32, _>(&path, 3, 2, 1).unwrap();
        }

        let loaded = RasterReader::read_band::<f32, _>(&path, 1).unwrap();
        assert_eq!(loaded.transform, GeoTransform::identity());
        assert_eq!(loaded.transform.pixel_height, 1.0);
        assert_eq!(loaded.transform.ground_to_pixel(1.5, 0.5), Some((0.5, 1.5)));
    }

    #[test]
    fn test_band_out_of_range() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("single.tif");
        let raster = Raster::new(Array2::<u8>::zeros((2, 2)), GeoTransform::default());
        RasterReader::write_geotiff(&raster, &path).unwrap();

        let result = RasterReader::read_band::<u8, _>(&path, 2);
        assert!(matches!(result, Err(FeatureError::UnreadableRaster { .. })));
    }
}
