use std::fs;
use std::path::Path;

use geo::{Geometry, LineString, Polygon};
use geojson::GeoJson;
use shapefile::{PolygonRing, Shape};

use crate::error::{Result, SegmentError};
use crate::georef::Crs;
use crate::input::{detect_kind, FileKind};

/// Polygons from one vector file, in world coordinates.
#[derive(Debug, Clone)]
pub struct VectorLayer {
    pub polygons: Vec<Polygon<f64>>,
    pub crs: Crs,
}

/// Loads polygon layers for the pipeline.
pub trait VectorSource {
    fn load(&self, path: &Path) -> Result<VectorLayer>;
}

/// Reads ESRI shapefiles and GeoJSON documents.
#[derive(Debug, Default, Copy, Clone)]
pub struct FileVectorSource;

impl VectorSource for FileVectorSource {
    fn load(&self, path: &Path) -> Result<VectorLayer> {
        let layer = match detect_kind(path)? {
            FileKind::Shapefile => read_shapefile(path)?,
            FileKind::GeoJson => read_geojson(path)?,
            _ => return Err(SegmentError::vector_read(path, "not a vector format")),
        };
        log::info!(
            "loaded {}: {} polygon(s), {}",
            path.display(),
            layer.polygons.len(),
            layer.crs
        );
        Ok(layer)
    }
}

fn read_shapefile(path: &Path) -> Result<VectorLayer> {
    let shapes = shapefile::read_shapes(path).map_err(|e| SegmentError::vector_read(path, e))?;

    let mut polygons = Vec::new();
    let mut skipped = 0usize;
    for shape in shapes {
        let rings: Vec<(bool, LineString<f64>)> = match shape {
            Shape::Polygon(p) => p
                .rings()
                .iter()
                .map(|r| (is_outer(r), r.points().iter().map(|pt| (pt.x, pt.y)).collect()))
                .collect(),
            Shape::PolygonM(p) => p
                .rings()
                .iter()
                .map(|r| (is_outer(r), r.points().iter().map(|pt| (pt.x, pt.y)).collect()))
                .collect(),
            Shape::PolygonZ(p) => p
                .rings()
                .iter()
                .map(|r| (is_outer(r), r.points().iter().map(|pt| (pt.x, pt.y)).collect()))
                .collect(),
            _ => {
                skipped += 1;
                continue;
            }
        };
        assemble_rings(rings, &mut polygons);
    }
    if skipped > 0 {
        log::warn!("{}: ignored {} non-polygon shape(s)", path.display(), skipped);
    }

    let crs = match fs::read_to_string(path.with_extension("prj")) {
        Ok(wkt) => Crs::from_wkt(&wkt),
        Err(_) => Crs::Unknown,
    };
    Ok(VectorLayer { polygons, crs })
}

fn is_outer<P>(ring: &PolygonRing<P>) -> bool {
    matches!(ring, PolygonRing::Outer(_))
}

/// Shapefile polygons list each exterior followed by its holes.
fn assemble_rings(rings: Vec<(bool, LineString<f64>)>, out: &mut Vec<Polygon<f64>>) {
    let mut current: Option<(LineString<f64>, Vec<LineString<f64>>)> = None;
    for (outer, ring) in rings {
        if outer {
            if let Some((exterior, holes)) = current.take() {
                out.push(Polygon::new(exterior, holes));
            }
            current = Some((ring, Vec::new()));
        } else if let Some((_, holes)) = current.as_mut() {
            holes.push(ring);
        }
    }
    if let Some((exterior, holes)) = current {
        out.push(Polygon::new(exterior, holes));
    }
}

fn read_geojson(path: &Path) -> Result<VectorLayer> {
    let text = fs::read_to_string(path).map_err(|e| SegmentError::vector_read(path, e))?;
    let document: GeoJson = text
        .parse()
        .map_err(|e: geojson::Error| SegmentError::vector_read(path, e))?;
    layer_from_geojson(&document).map_err(|e| SegmentError::vector_read(path, e))
}

pub fn layer_from_geojson(document: &GeoJson) -> std::result::Result<VectorLayer, geojson::Error> {
    let members = match document {
        GeoJson::FeatureCollection(fc) => fc.foreign_members.as_ref(),
        GeoJson::Feature(f) => f.foreign_members.as_ref(),
        GeoJson::Geometry(g) => g.foreign_members.as_ref(),
    };
    let crs = members
        .and_then(|m| m.get("crs"))
        .and_then(|crs| crs["properties"]["name"].as_str())
        .map_or(Crs::Unknown, Crs::from_name);

    let mut polygons = Vec::new();
    for geometry in geojson::quick_collection::<f64>(document)?.0 {
        match geometry {
            Geometry::Polygon(p) => polygons.push(p),
            Geometry::MultiPolygon(mp) => polygons.extend(mp.0),
            _ => {}
        }
    }
    Ok(VectorLayer { polygons, crs })
}
