//! Nearest-feature distance over a raster footprint
//!
//! Line vertices are burned into an occupancy grid congruent with a reference
//! raster, an exact Euclidean distance transform is run over the grid
//! (Felzenszwalb & Huttenlocher lower-envelope method, separable in rows and
//! columns), and the field is scaled to ground units by the pixel size.

use crate::config::RasterizeMode;
use crate::types::{GeoTransform, Vertex, VertexFailure};
use ndarray::{Array2, ArrayView2, Axis};

/// Outcome counts from burning vertices into an occupancy grid
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OccupancyStats {
    /// Explicit vertices examined (densified points are not counted)
    pub vertices: usize,
    /// Cells switched from background to occupied
    pub occupied_cells: usize,
    pub reprojection_failures: usize,
    pub non_finite: usize,
    pub outside_extent: usize,
    pub singular_transform: usize,
}

impl OccupancyStats {
    pub fn record_failure(&mut self, failure: VertexFailure) {
        match failure {
            VertexFailure::Reprojection => self.reprojection_failures += 1,
            VertexFailure::NonFinite => self.non_finite += 1,
            VertexFailure::OutsideExtent => self.outside_extent += 1,
            VertexFailure::SingularTransform => self.singular_transform += 1,
        }
    }

    /// Vertices that could not be placed, all categories
    pub fn failures(&self) -> usize {
        self.reprojection_failures + self.non_finite + self.outside_extent + self.singular_transform
    }

    pub fn merge(&mut self, other: &OccupancyStats) {
        self.vertices += other.vertices;
        self.occupied_cells += other.occupied_cells;
        self.reprojection_failures += other.reprojection_failures;
        self.non_finite += other.non_finite;
        self.outside_extent += other.outside_extent;
        self.singular_transform += other.singular_transform;
    }
}

/// Boolean grid where `true` is background and `false` is occupied
#[derive(Debug, Clone)]
pub struct OccupancyGrid {
    pub background: Array2<bool>,
    pub stats: OccupancyStats,
}

impl OccupancyGrid {
    /// Fully background grid
    pub fn empty(shape: (usize, usize)) -> Self {
        Self {
            background: Array2::from_elem(shape, true),
            stats: OccupancyStats::default(),
        }
    }

    pub fn occupy(&mut self, row: usize, col: usize) {
        if let Some(cell) = self.background.get_mut((row, col)) {
            if *cell {
                *cell = false;
                self.stats.occupied_cells += 1;
            }
        }
    }
}

/// Grid cell containing a ground coordinate (floor of the inverse transform)
pub fn locate(
    transform: &GeoTransform,
    shape: (usize, usize),
    x: f64,
    y: f64,
) -> Result<(usize, usize), VertexFailure> {
    if !x.is_finite() || !y.is_finite() {
        return Err(VertexFailure::NonFinite);
    }
    let (row, col) = transform
        .ground_to_pixel(x, y)
        .ok_or(VertexFailure::SingularTransform)?;
    let (row, col) = (row.floor(), col.floor());
    if !row.is_finite() || !col.is_finite() {
        return Err(VertexFailure::NonFinite);
    }

    let (rows, cols) = shape;
    if row < 0.0 || col < 0.0 || row >= rows as f64 || col >= cols as f64 {
        return Err(VertexFailure::OutsideExtent);
    }
    Ok((row as usize, col as usize))
}

/// Burn line vertices into an occupancy grid congruent with `shape`.
///
/// A vertex that cannot be placed is tallied by failure category and skipped.
/// In `Densified` mode, segments between two usable vertices are sampled every
/// half pixel as well.
pub fn rasterize_lines<'a, I>(
    lines: I,
    transform: &GeoTransform,
    shape: (usize, usize),
    mode: RasterizeMode,
) -> OccupancyGrid
where
    I: IntoIterator<Item = &'a [Vertex]>,
{
    let mut grid = OccupancyGrid::empty(shape);
    let step = 0.5 * transform.pixel_width.abs().min(transform.pixel_height.abs());

    for line in lines {
        let mut previous: Option<(f64, f64)> = None;
        for vertex in line {
            grid.stats.vertices += 1;
            let placed = (*vertex)
                .and_then(|(x, y)| locate(transform, shape, x, y).map(|cell| (x, y, cell)));
            match placed {
                Ok((x, y, (row, col))) => {
                    grid.occupy(row, col);
                    if mode == RasterizeMode::Densified {
                        if let Some(start) = previous {
                            densify_segment(&mut grid, transform, shape, start, (x, y), step);
                        }
                    }
                    previous = Some((x, y));
                }
                Err(failure) => {
                    grid.stats.record_failure(failure);
                    previous = None;
                }
            }
        }
    }

    log::debug!("Occupancy grid: {:?}", grid.stats);
    grid
}

fn densify_segment(
    grid: &mut OccupancyGrid,
    transform: &GeoTransform,
    shape: (usize, usize),
    start: (f64, f64),
    end: (f64, f64),
    step: f64,
) {
    let length = ((end.0 - start.0).powi(2) + (end.1 - start.1).powi(2)).sqrt();
    if !(step > 0.0) || !length.is_finite() || length <= step {
        return;
    }
    let samples = (length / step).ceil() as usize;
    for k in 1..samples {
        let t = k as f64 / samples as f64;
        let x = start.0 + t * (end.0 - start.0);
        let y = start.1 + t * (end.1 - start.1);
        if let Ok((row, col)) = locate(transform, shape, x, y) {
            grid.occupy(row, col);
        }
    }
}

/// Squared distance transform of one lane. `f` holds 0 at sites and +inf
/// elsewhere; lanes without any finite sample stay +inf.
fn squared_edt_1d(f: &[f64], out: &mut [f64], roots: &mut Vec<usize>, bounds: &mut Vec<f64>) {
    roots.clear();
    bounds.clear();

    for q in 0..f.len() {
        if !f[q].is_finite() {
            continue;
        }
        let fq = f[q] + (q * q) as f64;
        let mut boundary = f64::NEG_INFINITY;
        while let (Some(&p), Some(&zp)) = (roots.last(), bounds.last()) {
            let s = (fq - (f[p] + (p * p) as f64)) / (2.0 * (q - p) as f64);
            if s <= zp {
                roots.pop();
                bounds.pop();
            } else {
                boundary = s;
                break;
            }
        }
        roots.push(q);
        bounds.push(boundary);
    }

    if roots.is_empty() {
        out.iter_mut().for_each(|d| *d = f64::INFINITY);
        return;
    }

    let mut k = 0;
    for (q, d) in out.iter_mut().enumerate() {
        while k + 1 < roots.len() && bounds[k + 1] < q as f64 {
            k += 1;
        }
        let p = roots[k];
        let offset = q as f64 - p as f64;
        *d = offset * offset + f[p];
    }
}

/// Exact squared Euclidean distance, in pixels², from every cell to the
/// nearest occupied (`false`) cell. All +inf when nothing is occupied.
pub fn squared_distance_transform(background: ArrayView2<bool>) -> Array2<f64> {
    let mut field = background.mapv(|bg| if bg { f64::INFINITY } else { 0.0 });
    let (rows, cols) = field.dim();

    let mut roots = Vec::with_capacity(rows.max(cols));
    let mut bounds = Vec::with_capacity(rows.max(cols));

    for axis in [Axis(0), Axis(1)] {
        let len = if axis == Axis(0) { rows } else { cols };
        let mut input = vec![0.0f64; len];
        let mut output = vec![0.0f64; len];
        for mut lane in field.lanes_mut(axis) {
            input.iter_mut().zip(lane.iter()).for_each(|(dst, &v)| *dst = v);
            squared_edt_1d(&input, &mut output, &mut roots, &mut bounds);
            lane.iter_mut().zip(&output).for_each(|(dst, &v)| *dst = v);
        }
    }

    field
}

/// Distance to the nearest occupied cell, in ground units
#[derive(Debug, Clone)]
pub struct DistanceField {
    pub distances: Array2<f64>,
}

impl DistanceField {
    /// Distance transform of `grid` scaled by `pixel_size`; `None` when no cell is occupied
    pub fn compute(grid: &OccupancyGrid, pixel_size: f64) -> Option<Self> {
        if !grid.background.iter().any(|&bg| !bg) {
            return None;
        }
        let distances = squared_distance_transform(grid.background.view())
            .mapv(|d2| d2.sqrt() * pixel_size);
        Some(Self { distances })
    }

    pub fn at(&self, row: usize, col: usize) -> Option<f64> {
        self.distances.get((row, col)).copied()
    }

    /// Grid-wide minimum ignoring NaN; NaN if every value is NaN
    pub fn min(&self) -> f64 {
        self.distances
            .iter()
            .copied()
            .filter(|d| !d.is_nan())
            .fold(f64::NAN, |acc, d| if acc.is_nan() { d } else { acc.min(d) })
    }
}

/// Nearest-feature distance result for one raster footprint
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NearestDistance {
    /// Minimum ground distance, NaN when no vertex landed on the grid
    pub distance: f64,
    pub stats: OccupancyStats,
}

/// Rasterize `lines` onto the reference grid and reduce the scaled distance
/// field to its minimum. Degenerate grids (nothing occupied) give NaN.
pub fn nearest_feature_distance<'a, I>(
    lines: I,
    transform: &GeoTransform,
    shape: (usize, usize),
    mode: RasterizeMode,
) -> NearestDistance
where
    I: IntoIterator<Item = &'a [Vertex]>,
{
    let grid = rasterize_lines(lines, transform, shape, mode);
    let distance = match DistanceField::compute(&grid, transform.pixel_size()) {
        Some(field) => field.min(),
        None => {
            log::debug!("No vertex fell on the {:?} grid, distance is NaN", shape);
            f64::NAN
        }
    };
    NearestDistance {
        distance,
        stats: grid.stats,
    }
}
