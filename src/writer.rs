//! Writing segments out: GeoJSON polygons and an optional GeoTIFF label raster.
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use geojson::{Feature, FeatureCollection, JsonObject};
use serde_json::json;
use tiff::encoder::{colortype, TiffEncoder};
use tiff::tags::Tag;

use crate::edges::OutputMeta;
use crate::error::{Result, SegmentError};
use crate::grid::{LabelGrid, ValidityMask};
use crate::polygonize::polygonize;

/// Paths produced by a [`SegmentSink`].
#[derive(Debug, Clone, PartialEq)]
pub struct WrittenSegments {
    pub vector: PathBuf,
    pub raster: Option<PathBuf>,
    pub features: usize,
}

/// Receives the final label grid.
pub trait SegmentSink {
    fn write(
        &self,
        output: &Path,
        labels: &LabelGrid,
        mask: &ValidityMask,
        meta: &OutputMeta,
        emit_raster: bool,
    ) -> Result<WrittenSegments>;
}

/// Only GeoJSON is written; checked before any computation starts.
pub fn check_output_path(output: &Path) -> Result<()> {
    let ext = output
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());
    match ext.as_deref() {
        Some("geojson") | Some("json") => Ok(()),
        _ => Err(SegmentError::Configuration(format!(
            "output {} must be a .geojson or .json file",
            output.display()
        ))),
    }
}

/// The label raster sits next to the vector output.
pub fn raster_output_path(output: &Path) -> PathBuf {
    output.with_extension("tif")
}

#[derive(Debug, Default, Copy, Clone)]
pub struct GeoJsonSegmentWriter;

impl SegmentSink for GeoJsonSegmentWriter {
    fn write(
        &self,
        output: &Path,
        labels: &LabelGrid,
        mask: &ValidityMask,
        meta: &OutputMeta,
        emit_raster: bool,
    ) -> Result<WrittenSegments> {
        check_output_path(output)?;
        let mut labels = labels.clone();
        for (label, &valid) in labels.data_mut().iter_mut().zip(mask.data()) {
            if !valid {
                *label = 0;
            }
        }

        let collection = feature_collection(&labels, meta);
        let features = collection.features.len();
        write_geojson(output, &collection)?;
        log::info!("wrote {} feature(s) to {}", features, output.display());

        let raster = if emit_raster {
            let path = raster_output_path(output);
            write_label_tiff(&path, &labels, meta)?;
            log::info!("wrote label raster {}", path.display());
            Some(path)
        } else {
            None
        };

        Ok(WrittenSegments {
            vector: output.to_path_buf(),
            raster,
            features,
        })
    }
}

/// One feature per label with its id and pixel count.
pub fn feature_collection(labels: &LabelGrid, meta: &OutputMeta) -> FeatureCollection {
    let features = polygonize(labels, &meta.transform)
        .into_iter()
        .map(|shape| {
            let mut properties = JsonObject::new();
            properties.insert("label".to_string(), json!(shape.label));
            properties.insert("pixels".to_string(), json!(shape.pixels));
            Feature {
                bbox: None,
                geometry: Some(geojson::Geometry::new(geojson::Value::from(&shape.geometry()))),
                id: None,
                properties: Some(properties),
                foreign_members: None,
            }
        })
        .collect();

    let foreign_members = meta.crs.to_name().map(|name| {
        let mut members = JsonObject::new();
        members.insert(
            "crs".to_string(),
            json!({ "type": "name", "properties": { "name": name } }),
        );
        members
    });
    FeatureCollection {
        bbox: None,
        features,
        foreign_members,
    }
}

fn write_geojson(path: &Path, collection: &FeatureCollection) -> Result<()> {
    let file = File::create(path).map_err(|e| SegmentError::write(path, e))?;
    let mut out = BufWriter::new(file);
    serde_json::to_writer(&mut out, collection).map_err(|e| SegmentError::write(path, e))?;
    out.flush().map_err(|e| SegmentError::write(path, e))
}

/// `u32` labels with 0 as nodata, georeferenced like the input.
pub fn write_label_tiff(path: &Path, labels: &LabelGrid, meta: &OutputMeta) -> Result<()> {
    let err = |e: tiff::TiffError| SegmentError::write(path, e);
    let mut file = File::create(path).map_err(|e| SegmentError::write(path, e))?;
    let mut tiff = TiffEncoder::new(&mut file).map_err(err)?;
    let mut img = tiff
        .new_image::<colortype::Gray32>(labels.width() as u32, labels.height() as u32)
        .map_err(err)?;

    {
        let dir = img.encoder();
        match meta.transform.to_tiepoint() {
            Some((tiepoint, scale)) => {
                dir.write_tag(Tag::ModelPixelScaleTag, &scale[..]).map_err(err)?;
                dir.write_tag(Tag::ModelTiepointTag, &tiepoint[..]).map_err(err)?;
            }
            None => {
                let matrix = meta.transform.to_model_transformation();
                dir.write_tag(Tag::ModelTransformationTag, &matrix[..])
                    .map_err(err)?;
            }
        }
        if let Some(keys) = meta.crs.to_geokeys() {
            dir.write_tag(Tag::GeoKeyDirectoryTag, &keys[..]).map_err(err)?;
        }
        dir.write_tag(Tag::GdalNodata, "0").map_err(err)?;
    }

    img.write_data(labels.data()).map_err(err)
}
