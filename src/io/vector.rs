use crate::types::{FeatureError, FeatureResult, Vertex, VertexFailure};
use gdal::spatial_ref::{CoordTransform, SpatialRef};
use gdal::vector::{Geometry, LayerAccess};
use gdal::Dataset;
use std::path::Path;

/// Geometry reprojected into the working CRS
#[derive(Debug, Clone, PartialEq)]
pub enum VectorGeometry {
    Point(Vertex),
    Line(Vec<Vertex>),
    MultiLine(Vec<Vec<Vertex>>),
    /// Exterior ring first, then holes
    Polygon(Vec<Vec<Vertex>>),
    /// Any other OGR geometry type, kept by name only
    Unsupported(String),
}

/// All geometries of one vector layer
#[derive(Debug, Clone, Default)]
pub struct VectorLayer {
    pub geometries: Vec<VectorGeometry>,
    /// Features with no geometry or an empty one
    pub skipped_empty: usize,
}

impl VectorLayer {
    pub fn is_empty(&self) -> bool {
        self.geometries.is_empty()
    }

    /// Every vertex sequence belonging to a line or multi-line geometry
    pub fn line_parts(&self) -> impl Iterator<Item = &[Vertex]> + '_ {
        self.geometries
            .iter()
            .flat_map(|geometry| -> Box<dyn Iterator<Item = &[Vertex]> + '_> {
                match geometry {
                    VectorGeometry::Line(part) => Box::new(std::iter::once(part.as_slice())),
                    VectorGeometry::MultiLine(parts) => Box::new(parts.iter().map(|p| p.as_slice())),
                    _ => Box::new(std::iter::empty()),
                }
            })
    }

    /// Number of vertices whose reprojection failed
    pub fn reprojection_failures(&self) -> usize {
        let count = |part: &[Vertex]| part.iter().filter(|v| v.is_err()).count();
        self.geometries
            .iter()
            .map(|geometry| match geometry {
                VectorGeometry::Point(v) => usize::from(v.is_err()),
                VectorGeometry::Line(part) => count(part),
                VectorGeometry::MultiLine(parts) | VectorGeometry::Polygon(parts) => {
                    parts.iter().map(|p| count(p)).sum()
                }
                VectorGeometry::Unsupported(_) => 0,
            })
            .sum()
    }
}

/// Vector layer reader backed by GDAL/OGR
pub struct VectorReader;

impl VectorReader {
    /// Read the first layer of a vector file, reprojecting every vertex to `working_epsg`.
    ///
    /// Layers without a CRS are assumed to already be in the working CRS.
    /// Vertices that fail to reproject are kept as `Err(VertexFailure::Reprojection)`.
    pub fn read_layer<P: AsRef<Path>>(path: P, working_epsg: u32) -> FeatureResult<VectorLayer> {
        let path = path.as_ref();
        log::debug!("Reading vector layer from: {}", path.display());

        if !path.exists() {
            return Err(FeatureError::MissingFile(path.to_path_buf()));
        }
        let unreadable = |reason: String| FeatureError::UnreadableVector {
            path: path.to_path_buf(),
            reason,
        };

        let dataset = Dataset::open(path).map_err(|e| unreadable(e.to_string()))?;
        let mut layer = dataset.layer(0).map_err(|e| unreadable(e.to_string()))?;

        let target = traditional_order(SpatialRef::from_epsg(working_epsg)?);
        let transform = match layer.spatial_ref() {
            Some(source) => {
                let source = traditional_order(source);
                match CoordTransform::new(&source, &target) {
                    Ok(ct) => Reprojection::Transform(ct),
                    Err(e) => {
                        log::warn!(
                            "Cannot build transform to EPSG:{} for {}: {}",
                            working_epsg,
                            path.display(),
                            e
                        );
                        Reprojection::Unavailable
                    }
                }
            }
            None => {
                log::debug!(
                    "{} has no CRS, assuming EPSG:{}",
                    path.display(),
                    working_epsg
                );
                Reprojection::Identity
            }
        };

        let mut collected = VectorLayer::default();
        for feature in layer.features() {
            let Some(geometry) = feature.geometry() else {
                collected.skipped_empty += 1;
                continue;
            };
            if geometry.is_empty() {
                collected.skipped_empty += 1;
                continue;
            }
            collected.geometries.push(convert_geometry(geometry, &transform));
        }

        log::debug!(
            "Read {} geometries ({} empty skipped, {} vertices failed reprojection)",
            collected.geometries.len(),
            collected.skipped_empty,
            collected.reprojection_failures()
        );
        Ok(collected)
    }
}

enum Reprojection {
    Identity,
    Transform(CoordTransform),
    Unavailable,
}

impl Reprojection {
    fn apply(&self, points: Vec<(f64, f64, f64)>) -> Vec<Vertex> {
        match self {
            Reprojection::Identity => points.into_iter().map(|(x, y, _)| Ok((x, y))).collect(),
            Reprojection::Unavailable => points
                .iter()
                .map(|_| Err(VertexFailure::Reprojection))
                .collect(),
            Reprojection::Transform(ct) => {
                let mut xs: Vec<f64> = points.iter().map(|p| p.0).collect();
                let mut ys: Vec<f64> = points.iter().map(|p| p.1).collect();
                let mut zs: Vec<f64> = points.iter().map(|p| p.2).collect();
                if ct.transform_coords(&mut xs, &mut ys, &mut zs).is_ok() {
                    return xs.into_iter().zip(ys).map(Ok).collect();
                }
                // Batch failed: retry vertex by vertex so one bad point costs only itself
                points
                    .into_iter()
                    .map(|(x, y, z)| {
                        let (mut x, mut y, mut z) = ([x], [y], [z]);
                        ct.transform_coords(&mut x, &mut y, &mut z)
                            .map(|_| (x[0], y[0]))
                            .map_err(|_| VertexFailure::Reprojection)
                    })
                    .collect()
            }
        }
    }
}

fn traditional_order(srs: SpatialRef) -> SpatialRef {
    srs.set_axis_mapping_strategy(gdal_sys::OSRAxisMappingStrategy::OAMS_TRADITIONAL_GIS_ORDER);
    srs
}

fn convert_geometry(geometry: &Geometry, reprojection: &Reprojection) -> VectorGeometry {
    let parts = |geometry: &Geometry| -> Vec<Vec<Vertex>> {
        (0..geometry.geometry_count())
            .map(|i| reprojection.apply(geometry.get_geometry(i).get_point_vec()))
            .collect()
    };

    match geometry.geometry_name().as_str() {
        "POINT" => {
            let projected = reprojection.apply(vec![geometry.get_point(0)]);
            VectorGeometry::Point(
                projected
                    .into_iter()
                    .next()
                    .unwrap_or(Err(VertexFailure::Reprojection)),
            )
        }
        "LINESTRING" | "LINEARRING" => {
            VectorGeometry::Line(reprojection.apply(geometry.get_point_vec()))
        }
        "MULTILINESTRING" => VectorGeometry::MultiLine(parts(geometry)),
        "POLYGON" => VectorGeometry::Polygon(parts(geometry)),
        other => VectorGeometry::Unsupported(other.to_string()),
    }
}
