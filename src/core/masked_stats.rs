use crate::types::{FeatureError, FeatureResult};
use ndarray::{ArrayView2, Zip};

/// Mask value marking a pixel as invalid (cloud, shadow)
pub const INVALID: f64 = 1.0;

/// Distribution statistics over the valid pixels of a band
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MaskedStatistics {
    pub mean: f64,
    /// Population standard deviation (divides by N)
    pub std_dev: f64,
    pub valid_pixels: usize,
    pub total_pixels: usize,
}

impl MaskedStatistics {
    /// Fraction of pixels that contributed, NaN for an empty grid
    pub fn valid_fraction(&self) -> f64 {
        if self.total_pixels == 0 {
            f64::NAN
        } else {
            self.valid_pixels as f64 / self.total_pixels as f64
        }
    }
}

/// Mean and population standard deviation of `values`, skipping NaN pixels
/// and every pixel whose `mask` value equals [`INVALID`].
///
/// A missing mask treats every pixel as valid. When nothing is left both
/// statistics are NaN.
pub fn masked_statistics(
    values: ArrayView2<f64>,
    mask: Option<ArrayView2<f64>>,
) -> FeatureResult<MaskedStatistics> {
    if let Some(mask) = &mask {
        if mask.dim() != values.dim() {
            return Err(FeatureError::ShapeMismatch {
                expected: values.dim(),
                actual: mask.dim(),
            });
        }
    }

    let mut kept: Vec<f64> = Vec::with_capacity(values.len());
    match mask {
        Some(mask) => Zip::from(&values).and(&mask).for_each(|&v, &m| {
            if m != INVALID && !v.is_nan() {
                kept.push(v);
            }
        }),
        None => kept.extend(values.iter().copied().filter(|v| !v.is_nan())),
    }

    let (mean, std_dev) = mean_and_std(&kept);
    if kept.is_empty() {
        log::debug!("No valid pixels among {}, statistics are NaN", values.len());
    }

    Ok(MaskedStatistics {
        mean,
        std_dev,
        valid_pixels: kept.len(),
        total_pixels: values.len(),
    })
}

/// Two-pass mean / population std; (NaN, NaN) for an empty slice
fn mean_and_std(samples: &[f64]) -> (f64, f64) {
    if samples.is_empty() {
        return (f64::NAN, f64::NAN);
    }
    let n = samples.len() as f64;
    let mean = samples.iter().sum::<f64>() / n;
    let variance = samples.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / n;
    (mean, variance.sqrt())
}
