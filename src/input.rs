use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use crate::error::{Result, SegmentError};

/// Concrete format of an input file.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum FileKind {
    GeoTiff,
    Image,
    Shapefile,
    GeoJson,
}

impl FileKind {
    pub fn is_raster(self) -> bool {
        matches!(self, FileKind::GeoTiff | FileKind::Image)
    }

    fn from_extension(path: &Path) -> Option<FileKind> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        let kind = match ext.as_str() {
            "tif" | "tiff" | "gtiff" => FileKind::GeoTiff,
            "png" | "jpg" | "jpeg" | "bmp" | "gif" | "pnm" | "pgm" | "ppm" | "tga" | "webp" => {
                FileKind::Image
            }
            "shp" => FileKind::Shapefile,
            "geojson" | "json" => FileKind::GeoJson,
            _ => return None,
        };
        Some(kind)
    }

    fn sniff(path: &Path) -> Option<FileKind> {
        let mut head = [0u8; 16];
        let mut file = File::open(path).ok()?;
        let n = file.read(&mut head).ok()?;
        let head = &head[..n];
        if head.starts_with(b"II*\0") || head.starts_with(b"MM\0*") {
            return Some(FileKind::GeoTiff);
        }
        if head.starts_with(b"\x89PNG") || head.starts_with(&[0xff, 0xd8, 0xff]) {
            return Some(FileKind::Image);
        }
        if head.starts_with(&[0x00, 0x00, 0x27, 0x0a]) {
            return Some(FileKind::Shapefile);
        }
        match head.iter().find(|b| !b.is_ascii_whitespace()) {
            Some(b'{') => Some(FileKind::GeoJson),
            _ => None,
        }
    }
}

/// Extension first, leading bytes when the extension says nothing.
pub fn detect_kind(path: &Path) -> Result<FileKind> {
    FileKind::from_extension(path)
        .or_else(|| FileKind::sniff(path))
        .ok_or_else(|| SegmentError::UnrecognizedFileType(path.to_path_buf()))
}

/// Inputs split by role, each group in the order given on the command line.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClassifiedInputs {
    pub rasters: Vec<PathBuf>,
    pub shapes: Vec<PathBuf>,
}

impl ClassifiedInputs {
    /// The raster providing geotransform, CRS and nodata for the output.
    pub fn primary_raster(&self) -> Option<&Path> {
        self.rasters.first().map(|p| p.as_path())
    }
}

pub fn classify_inputs<P: AsRef<Path>>(paths: &[P]) -> Result<ClassifiedInputs> {
    if paths.is_empty() {
        return Err(SegmentError::Configuration(
            "at least one input file is required".to_string(),
        ));
    }
    let mut inputs = ClassifiedInputs::default();
    for path in paths {
        let path = path.as_ref();
        if detect_kind(path)?.is_raster() {
            inputs.rasters.push(path.to_path_buf());
        } else {
            inputs.shapes.push(path.to_path_buf());
        }
    }
    log::debug!(
        "classified {} raster(s) and {} vector file(s)",
        inputs.rasters.len(),
        inputs.shapes.len()
    );
    Ok(inputs)
}
