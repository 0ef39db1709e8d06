#![allow(dead_code)]

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use rio_segment::edges::OutputMeta;
use rio_segment::raster::{Raster, RasterSource};
use rio_segment::vector::{VectorLayer, VectorSource};
use rio_segment::writer::{SegmentSink, WrittenSegments};
use rio_segment::{EdgeField, Grid, LabelGrid, Result, SegmentError, ValidityMask};

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Single band raster with `low` on the left half and `high` on the right.
pub fn plateaus(width: usize, height: usize, low: f64, high: f64) -> Raster {
    let data = (0..width * height)
        .map(|i| if i % width < width / 2 { low } else { high })
        .collect();
    Raster::single_band(Grid::from_vec(width, height, data).unwrap())
}

/// Pseudo-random edge strengths in `[0, 255)`, reproducible from `seed`.
pub fn rough_field(width: usize, height: usize, seed: u64) -> EdgeField {
    let mut state = seed.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
    let data = (0..width * height)
        .map(|_| {
            state = state
                .wrapping_mul(6364136223846793005)
                .wrapping_add(1442695040888963407);
            ((state >> 33) % 255) as f32
        })
        .collect();
    Grid::from_vec(width, height, data).unwrap()
}

/// Rasters served from memory, counting every load attempt.
#[derive(Default)]
pub struct MemoryRasters {
    rasters: HashMap<PathBuf, Raster>,
    pub loads: Cell<usize>,
}

impl MemoryRasters {
    pub fn with(mut self, path: &str, raster: Raster) -> Self {
        self.rasters.insert(PathBuf::from(path), raster);
        self
    }
}

impl RasterSource for MemoryRasters {
    fn load(&self, path: &Path, nodata_override: Option<f64>) -> Result<Raster> {
        self.loads.set(self.loads.get() + 1);
        let mut raster = self
            .rasters
            .get(path)
            .cloned()
            .ok_or_else(|| SegmentError::RasterRead {
                path: path.to_path_buf(),
                message: "not in memory".to_string(),
            })?;
        if nodata_override.is_some() {
            raster.nodata = nodata_override;
        }
        Ok(raster)
    }
}

#[derive(Default)]
pub struct MemoryVectors {
    layers: HashMap<PathBuf, VectorLayer>,
    pub loads: Cell<usize>,
}

impl MemoryVectors {
    pub fn with(mut self, path: &str, layer: VectorLayer) -> Self {
        self.layers.insert(PathBuf::from(path), layer);
        self
    }
}

impl VectorSource for MemoryVectors {
    fn load(&self, path: &Path) -> Result<VectorLayer> {
        self.loads.set(self.loads.get() + 1);
        self.layers
            .get(path)
            .cloned()
            .ok_or_else(|| SegmentError::VectorRead {
                path: path.to_path_buf(),
                message: "not in memory".to_string(),
            })
    }
}

/// Keeps the final labels instead of writing them.
#[derive(Default)]
pub struct CapturingSink {
    pub labels: RefCell<Option<LabelGrid>>,
}

impl SegmentSink for CapturingSink {
    fn write(
        &self,
        output: &Path,
        labels: &LabelGrid,
        _mask: &ValidityMask,
        _meta: &OutputMeta,
        _emit_raster: bool,
    ) -> Result<WrittenSegments> {
        *self.labels.borrow_mut() = Some(labels.clone());
        Ok(WrittenSegments {
            vector: output.to_path_buf(),
            raster: None,
            features: 0,
        })
    }
}

/// Number of distinct positive labels.
pub fn region_count(labels: &LabelGrid) -> usize {
    let mut seen: Vec<u32> = labels.data().iter().copied().filter(|&l| l != 0).collect();
    seen.sort_unstable();
    seen.dedup();
    seen.len()
}
