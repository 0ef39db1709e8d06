use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::edges::EdgeCombiner;
use crate::error::{Result, SegmentError};
use crate::grid::Connexity;

/// Parameters of one segmentation run.
///
/// Missing fields in a JSON config take their default value, so a file only
/// needs to name what it changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SegmentConfig {
    /// Overrides the nodata value embedded in every raster.
    pub nodata: Option<f64>,
    /// Strength given to vector boundaries, 0 disables them.
    pub shapefile_weight: u8,
    /// Fill nodata holes that are covered by an input polygon.
    pub fill_holes: bool,
    /// Merge weight multiplier per fraction of the image covered by the pair.
    pub size_penalty: f64,
    /// Low and high percentile used as clip bounds when rescaling bands.
    pub rescale_percentiles: (f64, f64),
    /// Side of the square window used to find watershed seeds.
    pub footprint: usize,
    /// Percentile of edge strength over labelled pixels; boundaries weaker than
    /// it merge.
    pub threshold: f64,
    /// Also write a raster of labels next to the polygons.
    pub output_raster: bool,
    /// How gradients of several bands are reduced into one field.
    pub combiner: EdgeCombiner,
    pub watershed_connexity: Connexity,
    pub adjacency_connexity: Connexity,
}

impl Default for SegmentConfig {
    fn default() -> Self {
        SegmentConfig {
            nodata: None,
            shapefile_weight: 150,
            fill_holes: false,
            size_penalty: 10.0,
            rescale_percentiles: (0.0, 98.0),
            footprint: 2,
            threshold: 40.0,
            output_raster: true,
            combiner: EdgeCombiner::Max,
            watershed_connexity: Connexity::C4,
            adjacency_connexity: Connexity::C8,
        }
    }
}

impl SegmentConfig {
    pub fn from_json_file(path: &Path) -> Result<SegmentConfig> {
        let text = fs::read_to_string(path).map_err(|e| {
            SegmentError::Configuration(format!("cannot read {}: {}", path.display(), e))
        })?;
        let config: SegmentConfig = serde_json::from_str(&text).map_err(|e| {
            SegmentError::Configuration(format!("cannot parse {}: {}", path.display(), e))
        })?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let (low, high) = self.rescale_percentiles;
        if !(0.0..=100.0).contains(&low) || !(0.0..=100.0).contains(&high) || low >= high {
            return Err(SegmentError::Configuration(format!(
                "rescale percentiles must satisfy 0 <= low < high <= 100, got {} {}",
                low, high
            )));
        }
        if !(0.0..=100.0).contains(&self.threshold) {
            return Err(SegmentError::Configuration(format!(
                "threshold must be a percentile in [0, 100], got {}",
                self.threshold
            )));
        }
        if !self.size_penalty.is_finite() || self.size_penalty < 0.0 {
            return Err(SegmentError::Configuration(format!(
                "size penalty must be a non-negative number, got {}",
                self.size_penalty
            )));
        }
        if self.footprint == 0 {
            return Err(SegmentError::Configuration(
                "footprint must be at least 1".to_string(),
            ));
        }
        if let Some(nodata) = self.nodata {
            if nodata.is_nan() {
                return Err(SegmentError::Configuration(
                    "nodata override cannot be NaN".to_string(),
                ));
            }
        }
        Ok(())
    }
}
