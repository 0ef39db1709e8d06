//! Fusion of raster gradients and vector boundaries into one edge field.
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::config::SegmentConfig;
use crate::error::{Result, SegmentError};
use crate::georef::{Crs, GeoTransform};
use crate::gradient::sobel_magnitude;
use crate::grid::{EdgeField, Grid, ValidityMask};
use crate::holes::fill_covered_holes;
use crate::raster::{Raster, RasterSource};
use crate::rasterize::{rasterize_boundaries, rasterize_coverage};
use crate::rescale::rescale_band;
use crate::vector::{VectorLayer, VectorSource};

/// Reduction applied to the per-band gradient fields.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EdgeCombiner {
    /// The strongest boundary of any band wins.
    Max,
    Mean,
}

impl EdgeCombiner {
    pub fn reduce(self, fields: &[EdgeField], width: usize, height: usize) -> EdgeField {
        let mut out = Grid::new(width, height, 0.0f32);
        if fields.is_empty() {
            return out;
        }
        for field in fields {
            for (o, &v) in out.data_mut().iter_mut().zip(field.data()) {
                match self {
                    EdgeCombiner::Max => *o = o.max(v),
                    EdgeCombiner::Mean => *o += v,
                }
            }
        }
        if self == EdgeCombiner::Mean {
            let n = fields.len() as f32;
            out.data_mut().iter_mut().for_each(|v| *v /= n);
        }
        out
    }
}

impl FromStr for EdgeCombiner {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "max" => Ok(EdgeCombiner::Max),
            "mean" => Ok(EdgeCombiner::Mean),
            other => Err(format!("unknown combiner '{}', expected max or mean", other)),
        }
    }
}

impl fmt::Display for EdgeCombiner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EdgeCombiner::Max => write!(f, "max"),
            EdgeCombiner::Mean => write!(f, "mean"),
        }
    }
}

/// What the writer needs to georeference its output.
#[derive(Debug, Clone, PartialEq)]
pub struct OutputMeta {
    pub width: usize,
    pub height: usize,
    pub transform: GeoTransform,
    pub crs: Crs,
    pub nodata: Option<f64>,
}

#[derive(Debug, Clone)]
pub struct EdgeFieldOutput {
    pub edges: EdgeField,
    pub mask: ValidityMask,
    pub crs: Crs,
    pub meta: OutputMeta,
    /// Rescaled bands of every raster after hole filling, when it ran.
    pub filled: Option<Vec<Grid<f32>>>,
}

/// Loads the inputs and fuses them. Fails before opening any file when hole
/// filling is requested without vector input.
pub fn build_edge_field(
    rasters: &[PathBuf],
    shapes: &[PathBuf],
    config: &SegmentConfig,
    raster_source: &dyn RasterSource,
    vector_source: &dyn VectorSource,
) -> Result<EdgeFieldOutput> {
    check_fill_holes(config, !shapes.is_empty())?;
    if rasters.is_empty() {
        return Err(SegmentError::Configuration(
            "at least one raster input is required".to_string(),
        ));
    }

    let loaded = rasters
        .iter()
        .map(|path| raster_source.load(path, config.nodata))
        .collect::<Result<Vec<_>>>()?;
    let layers = shapes
        .iter()
        .map(|path| vector_source.load(path))
        .collect::<Result<Vec<_>>>()?;

    let raster_names: Vec<&Path> = rasters.iter().map(|p| p.as_path()).collect();
    let shape_names: Vec<&Path> = shapes.iter().map(|p| p.as_path()).collect();
    check_alignment(&raster_names, &loaded, &shape_names, &layers)?;
    fuse(&loaded, &layers, config)
}

/// In-memory variant of [`build_edge_field`].
pub fn fuse_edge_field(
    rasters: &[Raster],
    layers: &[VectorLayer],
    config: &SegmentConfig,
) -> Result<EdgeFieldOutput> {
    check_fill_holes(config, !layers.is_empty())?;
    if rasters.is_empty() {
        return Err(SegmentError::Configuration(
            "at least one raster is required".to_string(),
        ));
    }
    let raster_names: Vec<PathBuf> = (0..rasters.len())
        .map(|i| PathBuf::from(format!("<raster {}>", i)))
        .collect();
    let shape_names: Vec<PathBuf> = (0..layers.len())
        .map(|i| PathBuf::from(format!("<layer {}>", i)))
        .collect();
    check_alignment(
        &raster_names.iter().map(|p| p.as_path()).collect::<Vec<_>>(),
        rasters,
        &shape_names.iter().map(|p| p.as_path()).collect::<Vec<_>>(),
        layers,
    )?;
    fuse(rasters, layers, config)
}

fn check_fill_holes(config: &SegmentConfig, has_shapes: bool) -> Result<()> {
    if config.fill_holes && !has_shapes {
        return Err(SegmentError::Configuration(
            "cannot fill raster holes without some shapes".to_string(),
        ));
    }
    Ok(())
}

/// Every input must match the primary raster's size and coordinate system.
fn check_alignment(
    raster_names: &[&Path],
    rasters: &[Raster],
    shape_names: &[&Path],
    layers: &[VectorLayer],
) -> Result<()> {
    let primary = &rasters[0];
    let (width, height) = (primary.width(), primary.height());
    for (name, raster) in raster_names.iter().zip(rasters).skip(1) {
        if raster.width() != width || raster.height() != height {
            return Err(SegmentError::RasterShapeMismatch {
                path: name.to_path_buf(),
                width,
                height,
                found_width: raster.width(),
                found_height: raster.height(),
            });
        }
    }

    let named_crs = raster_names
        .iter()
        .zip(rasters.iter().map(|r| r.crs))
        .chain(shape_names.iter().zip(layers.iter().map(|l| l.crs)));
    for (name, crs) in named_crs.skip(1) {
        if !primary.crs.is_compatible(&crs) {
            return Err(SegmentError::CrsMismatch {
                path: name.to_path_buf(),
                expected: primary.crs,
                found: crs,
            });
        }
        if crs != primary.crs && (crs == Crs::Unknown || primary.crs == Crs::Unknown) {
            log::warn!(
                "{} has coordinate system {}, primary raster has {}; assuming they match",
                name.display(),
                crs,
                primary.crs
            );
        }
    }
    Ok(())
}

fn fuse(rasters: &[Raster], layers: &[VectorLayer], config: &SegmentConfig) -> Result<EdgeFieldOutput> {
    let primary = &rasters[0];
    let (width, height) = (primary.width(), primary.height());
    let (low, high) = config.rescale_percentiles;

    let mut rescaled: Vec<(Vec<Grid<f32>>, ValidityMask)> = rasters
        .iter()
        .map(|raster| {
            let valid = raster.validity_mask();
            let bands = raster
                .bands
                .iter()
                .map(|band| rescale_band(band, &valid, low, high))
                .collect();
            (bands, valid)
        })
        .collect();

    let polygons: Vec<_> = layers.iter().flat_map(|l| l.polygons.iter().cloned()).collect();

    if config.fill_holes {
        let coverage = rasterize_coverage(&polygons, &primary.transform, width, height);
        for (i, (bands, valid)) in rescaled.iter_mut().enumerate() {
            let filled = fill_covered_holes(bands, valid, &coverage);
            log::info!("raster {}: filled {} pixel(s) from polygons", i, filled);
        }
    }

    let mut mask = Grid::new(width, height, true);
    for (_, valid) in &rescaled {
        mask.and_assign(valid);
    }

    let gradients: Vec<EdgeField> = rescaled
        .iter()
        .flat_map(|(bands, _)| bands.iter())
        .map(|band| sobel_magnitude(band, &mask))
        .collect();
    let mut edges = config.combiner.reduce(&gradients, width, height);
    log::debug!(
        "reduced {} gradient band(s) with {}",
        gradients.len(),
        config.combiner
    );

    if !polygons.is_empty() && config.shapefile_weight > 0 {
        let boundaries = rasterize_boundaries(&polygons, &primary.transform, width, height);
        let weight = config.shapefile_weight as f32;
        for (e, &on_boundary) in edges.data_mut().iter_mut().zip(boundaries.data()) {
            if on_boundary {
                *e = e.max(weight);
            }
        }
    }

    for (e, &ok) in edges.data_mut().iter_mut().zip(mask.data()) {
        if !ok {
            *e = 0.0;
        }
    }

    log::info!(
        "edge field {}x{}: {} of {} pixel(s) valid",
        width,
        height,
        mask.count_valid(),
        mask.len()
    );

    let filled = if config.fill_holes {
        Some(rescaled.into_iter().flat_map(|(bands, _)| bands).collect())
    } else {
        None
    };

    Ok(EdgeFieldOutput {
        edges,
        mask,
        crs: primary.crs,
        meta: OutputMeta {
            width,
            height,
            transform: primary.transform,
            crs: primary.crs,
            nodata: primary.nodata,
        },
        filled,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::polygon;

    fn step_raster() -> Raster {
        let data = (0..8 * 6)
            .map(|i| if i % 8 < 4 { 20.0 } else { 200.0 })
            .collect();
        Raster::single_band(Grid::from_vec(8, 6, data).unwrap())
    }

    fn outline() -> VectorLayer {
        /* horizontal cut across the middle rows in pixel space (identity transform) */
        VectorLayer {
            polygons: vec![polygon![
                (x: 0.5, y: 3.5),
                (x: 7.5, y: 3.5),
                (x: 7.5, y: 5.5),
                (x: 0.5, y: 5.5),
            ]],
            crs: Crs::Unknown,
        }
    }

    #[test]
    fn combiners_reduce_elementwise() {
        let a = Grid::from_vec(2, 1, vec![1.0, 10.0]).unwrap();
        let b = Grid::from_vec(2, 1, vec![3.0, 0.0]).unwrap();
        let max = EdgeCombiner::Max.reduce(&[a.clone(), b.clone()], 2, 1);
        let mean = EdgeCombiner::Mean.reduce(&[a, b], 2, 1);
        assert_eq!(max.data(), &[3.0, 10.0]);
        assert_eq!(mean.data(), &[2.0, 5.0]);
        assert_eq!("MEAN".parse::<EdgeCombiner>(), Ok(EdgeCombiner::Mean));
        assert!("median".parse::<EdgeCombiner>().is_err());
    }

    #[test]
    fn fill_holes_needs_shapes() {
        let config = SegmentConfig {
            fill_holes: true,
            ..Default::default()
        };
        let err = fuse_edge_field(&[step_raster()], &[], &config).unwrap_err();
        assert!(matches!(err, SegmentError::Configuration(_)));
    }

    #[test]
    fn zero_weight_ignores_vectors() {
        let config = SegmentConfig {
            shapefile_weight: 0,
            ..Default::default()
        };
        let plain = fuse_edge_field(&[step_raster()], &[], &config).unwrap();
        let guided = fuse_edge_field(&[step_raster()], &[outline()], &config).unwrap();
        assert_eq!(plain.edges, guided.edges);
        assert_eq!(plain.mask, guided.mask);
    }

    #[test]
    fn vector_boundaries_raise_edges() {
        let config = SegmentConfig::default();
        let guided = fuse_edge_field(&[step_raster()], &[outline()], &config).unwrap();
        assert_eq!(*guided.edges.get(1, 3), 150.0);
        assert_eq!(*guided.edges.get(1, 1), 0.0);
    }

    #[test]
    fn mismatched_sizes_are_rejected() {
        let small = Raster::single_band(Grid::new(2, 2, 1.0));
        let err = fuse_edge_field(&[step_raster(), small], &[], &SegmentConfig::default())
            .unwrap_err();
        assert!(matches!(err, SegmentError::RasterShapeMismatch { .. }));
    }

    #[test]
    fn mismatched_crs_is_rejected() {
        let mut a = step_raster();
        a.crs = Crs::Projected(32630);
        let mut b = step_raster();
        b.crs = Crs::Projected(27700);
        let err = fuse_edge_field(&[a, b], &[], &SegmentConfig::default()).unwrap_err();
        assert!(matches!(err, SegmentError::CrsMismatch { .. }));
    }

    #[test]
    fn nodata_is_masked_and_holes_filled() {
        let mut raster = step_raster();
        raster.nodata = Some(-1.0);
        *raster.bands[0].get_mut(2, 4) = -1.0;
        *raster.bands[0].get_mut(2, 0) = -1.0;

        let plain = fuse_edge_field(&[raster.clone()], &[], &SegmentConfig::default()).unwrap();
        assert!(!*plain.mask.get(2, 4));
        assert_eq!(*plain.edges.get(2, 4), 0.0);
        assert!(plain.filled.is_none());

        let config = SegmentConfig {
            fill_holes: true,
            ..Default::default()
        };
        let filled = fuse_edge_field(&[raster], &[outline()], &config).unwrap();
        assert!(*filled.mask.get(2, 4));
        assert!(!*filled.mask.get(2, 0));
        let bands = filled.filled.unwrap();
        assert_eq!(bands.len(), 1);
        assert_eq!(*bands[0].get(2, 4), 0.0);
    }
}
