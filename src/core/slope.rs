use ndarray::{Array2, ArrayView2};

/// Grid-wide reduction of the slope magnitude field
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SlopeStatistics {
    /// Mean gradient magnitude, elevation units per pixel
    pub mean: f64,
    /// Maximum gradient magnitude, elevation units per pixel
    pub max: f64,
}

/// Finite-difference derivative along one axis of a 1-D lane:
/// central differences inside, one-sided at the two ends.
/// Lanes shorter than two samples have no defined derivative and yield 0.
fn lane_gradient(lane: &[f32], out: &mut [f32]) {
    let n = lane.len();
    if n < 2 {
        out.iter_mut().for_each(|g| *g = 0.0);
        return;
    }
    out[0] = lane[1] - lane[0];
    out[n - 1] = lane[n - 1] - lane[n - 2];
    for i in 1..n - 1 {
        out[i] = (lane[i + 1] - lane[i - 1]) / 2.0;
    }
}

/// Row-direction and column-direction gradients of an elevation grid
pub fn gradient(elevation: ArrayView2<f32>) -> (Array2<f32>, Array2<f32>) {
    let (rows, cols) = elevation.dim();
    let mut d_row = Array2::<f32>::zeros((rows, cols));
    let mut d_col = Array2::<f32>::zeros((rows, cols));

    let mut lane = vec![0.0f32; rows];
    let mut out = vec![0.0f32; rows];
    for j in 0..cols {
        lane.iter_mut()
            .zip(elevation.column(j))
            .for_each(|(dst, &z)| *dst = z);
        lane_gradient(&lane, &mut out);
        d_row.column_mut(j).iter_mut().zip(&out).for_each(|(dst, &g)| *dst = g);
    }

    let mut lane = vec![0.0f32; cols];
    let mut out = vec![0.0f32; cols];
    for i in 0..rows {
        lane.iter_mut().zip(elevation.row(i)).for_each(|(dst, &z)| *dst = z);
        lane_gradient(&lane, &mut out);
        d_col.row_mut(i).iter_mut().zip(&out).for_each(|(dst, &g)| *dst = g);
    }

    (d_row, d_col)
}

/// Per-pixel slope magnitude `sqrt(d_row² + d_col²)`
pub fn slope_magnitude(elevation: ArrayView2<f32>) -> Array2<f32> {
    let (d_row, d_col) = gradient(elevation);
    let mut magnitude = d_row;
    magnitude.zip_mut_with(&d_col, |r, &c| *r = (*r * *r + c * c).sqrt());
    magnitude
}

/// Mean and max slope magnitude, ignoring NaN pixels.
///
/// No conversion to degrees is made. NaN elevations propagate into their
/// neighbours' gradients and are skipped in the reduction; an empty or
/// all-NaN field gives (NaN, NaN).
pub fn slope_statistics(elevation: ArrayView2<f32>) -> SlopeStatistics {
    let (rows, cols) = elevation.dim();
    log::debug!("Computing slope over {}x{} elevation grid", rows, cols);

    let magnitude = slope_magnitude(elevation);

    let mut sum = 0.0f64;
    let mut count = 0usize;
    let mut max = f64::NAN;
    for &m in magnitude.iter().filter(|m| !m.is_nan()) {
        let m = m as f64;
        sum += m;
        count += 1;
        max = if max.is_nan() { m } else { max.max(m) };
    }

    let mean = if count == 0 { f64::NAN } else { sum / count as f64 };
    SlopeStatistics { mean, max }
}
