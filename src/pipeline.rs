//! End-to-end segmentation: inputs → edge field → watershed → merge → output.
use std::path::{Path, PathBuf};
use std::time::Instant;

use crate::config::SegmentConfig;
use crate::edges::{build_edge_field, fuse_edge_field, EdgeFieldOutput};
use crate::error::Result;
use crate::grid::LabelGrid;
use crate::input::classify_inputs;
use crate::rag::{rag_merge_threshold, MergeSummary};
use crate::raster::{FileRasterSource, Raster, RasterSource};
use crate::vector::{FileVectorSource, VectorLayer, VectorSource};
use crate::watershed::{count_labels, watershed_segment};
use crate::writer::{check_output_path, GeoJsonSegmentWriter, SegmentSink, WrittenSegments};

/// Labels of a finished run together with the edge field they came from.
#[derive(Debug, Clone)]
pub struct Segmentation {
    pub field: EdgeFieldOutput,
    pub labels: LabelGrid,
    pub watershed_regions: usize,
    pub merge: MergeSummary,
}

#[derive(Debug, Clone)]
pub struct SegmentReport {
    pub watershed_regions: usize,
    pub merge: MergeSummary,
    pub written: WrittenSegments,
}

fn elapsed_ms(t0: Instant) -> f64 {
    t0.elapsed().as_secs_f64() * 1000.0
}

/// Watershed and merging over an already fused edge field.
pub fn segment_field(field: EdgeFieldOutput, config: &SegmentConfig) -> Result<Segmentation> {
    let t0 = Instant::now();
    let mut labels = watershed_segment(
        &field.edges,
        &field.mask,
        config.footprint,
        config.watershed_connexity,
    )?;
    let watershed_regions = count_labels(&labels);
    log::debug!("watershed done in {:.3} ms", elapsed_ms(t0));

    let t0 = Instant::now();
    let merge = rag_merge_threshold(
        &field.edges,
        &mut labels,
        config.threshold,
        config.size_penalty,
        config.adjacency_connexity,
    )?;
    log::debug!("merging done in {:.3} ms", elapsed_ms(t0));

    Ok(Segmentation {
        field,
        labels,
        watershed_regions,
        merge,
    })
}

/// In-memory run without any file I/O.
pub fn segment_rasters(
    rasters: &[Raster],
    layers: &[VectorLayer],
    config: &SegmentConfig,
) -> Result<Segmentation> {
    config.validate()?;
    let field = fuse_edge_field(rasters, layers, config)?;
    segment_field(field, config)
}

/// Segments `inputs` and hands the result to `sink`.
///
/// Parameters, the output path and the input kinds are checked before any
/// file is opened.
pub fn segment(
    inputs: &[PathBuf],
    output: &Path,
    config: &SegmentConfig,
    raster_source: &dyn RasterSource,
    vector_source: &dyn VectorSource,
    sink: &dyn SegmentSink,
) -> Result<SegmentReport> {
    config.validate()?;
    check_output_path(output)?;
    let inputs = classify_inputs(inputs)?;
    log::info!(
        "{} raster(s), {} vector file(s), georeferenced by {}",
        inputs.rasters.len(),
        inputs.shapes.len(),
        inputs
            .primary_raster()
            .map_or_else(|| "nothing".to_string(), |p| p.display().to_string())
    );

    let t0 = Instant::now();
    let field = build_edge_field(
        &inputs.rasters,
        &inputs.shapes,
        config,
        raster_source,
        vector_source,
    )?;
    log::info!(
        "edge field {}x{} built in {:.3} ms",
        field.meta.width,
        field.meta.height,
        elapsed_ms(t0)
    );

    let segmentation = segment_field(field, config)?;

    let t0 = Instant::now();
    let written = sink.write(
        output,
        &segmentation.labels,
        &segmentation.field.mask,
        &segmentation.field.meta,
        config.output_raster,
    )?;
    log::debug!("output written in {:.3} ms", elapsed_ms(t0));

    Ok(SegmentReport {
        watershed_regions: segmentation.watershed_regions,
        merge: segmentation.merge,
        written,
    })
}

/// [`segment`] with the file based loaders and the GeoJSON writer.
pub fn run(inputs: &[PathBuf], output: &Path, config: &SegmentConfig) -> Result<SegmentReport> {
    segment(
        inputs,
        output,
        config,
        &FileRasterSource,
        &FileVectorSource,
        &GeoJsonSegmentWriter,
    )
}
