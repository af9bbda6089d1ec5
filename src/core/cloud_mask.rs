use crate::io::RasterReader;
use crate::types::{FeatureResult, Raster};
use ndarray::{Array2, ArrayView2};
use std::path::Path;

/// Scene classification classes collapsed to "invalid":
/// 3 cloud shadow, 8 cloud medium probability, 9 cloud high probability
pub const DEFAULT_CLOUD_CLASSES: [u16; 3] = [3, 8, 9];

/// Binary validity mask from a scene classification layer: 1 where the class
/// is in `cloud_classes`, 0 elsewhere
pub fn cloud_mask_from_scl(scl: ArrayView2<u16>, cloud_classes: &[u16]) -> Array2<u8> {
    scl.mapv(|class| u8::from(cloud_classes.contains(&class)))
}

/// Read an SCL raster, classify it and write the mask with the SCL georeferencing
pub fn generate_cloud_mask<P, Q>(
    scl_path: P,
    output_path: Q,
    cloud_classes: &[u16],
) -> FeatureResult<Raster<u8>>
where
    P: AsRef<Path>,
    Q: AsRef<Path>,
{
    log::info!(
        "Generating cloud mask from {} (classes {:?})",
        scl_path.as_ref().display(),
        cloud_classes
    );

    let scl = RasterReader::read_band::<u16, _>(scl_path, 1)?;
    let mask = Raster {
        data: cloud_mask_from_scl(scl.data.view(), cloud_classes),
        transform: scl.transform,
        projection: scl.projection,
    };

    let cloudy = mask.data.iter().filter(|&&v| v == 1).count();
    log::debug!("{} of {} pixels flagged as cloud/shadow", cloudy, mask.data.len());

    RasterReader::write_geotiff(&mask, output_path)?;
    Ok(mask)
}
