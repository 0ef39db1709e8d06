use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use image::{DynamicImage, GenericImageView};
use palette::{FromColor, Lab, Srgb};
use tiff::decoder::{Decoder, DecodingResult, Limits};
use tiff::tags::Tag;

use crate::error::{Result, SegmentError};
use crate::georef::{Crs, GeoTransform};
use crate::grid::{Grid, ValidityMask};
use crate::input::{detect_kind, FileKind};

/// A georeferenced stack of equally sized bands.
#[derive(Debug, Clone)]
pub struct Raster {
    pub bands: Vec<Grid<f64>>,
    pub nodata: Option<f64>,
    pub transform: GeoTransform,
    pub crs: Crs,
}

impl Raster {
    pub fn new(bands: Vec<Grid<f64>>) -> Raster {
        Raster {
            bands,
            nodata: None,
            transform: GeoTransform::identity(),
            crs: Crs::Unknown,
        }
    }

    pub fn single_band(band: Grid<f64>) -> Raster {
        Raster::new(vec![band])
    }

    pub fn width(&self) -> usize {
        self.bands.first().map_or(0, |b| b.width())
    }

    pub fn height(&self) -> usize {
        self.bands.first().map_or(0, |b| b.height())
    }

    #[inline]
    pub fn is_valid_sample(&self, value: f64) -> bool {
        !value.is_nan() && self.nodata != Some(value)
    }

    /// A pixel is valid when every band holds data.
    pub fn validity_mask(&self) -> ValidityMask {
        let mut mask = Grid::new(self.width(), self.height(), true);
        for band in &self.bands {
            for (valid, &value) in mask.data_mut().iter_mut().zip(band.data()) {
                *valid = *valid && self.is_valid_sample(value);
            }
        }
        mask
    }
}

/// Loads rasters for the pipeline.
pub trait RasterSource {
    fn load(&self, path: &Path, nodata_override: Option<f64>) -> Result<Raster>;
}

/// Reads GeoTIFFs with `tiff` and everything else with `image`.
#[derive(Debug, Default, Copy, Clone)]
pub struct FileRasterSource;

impl RasterSource for FileRasterSource {
    fn load(&self, path: &Path, nodata_override: Option<f64>) -> Result<Raster> {
        let mut raster = match detect_kind(path)? {
            FileKind::GeoTiff => read_geotiff(path)?,
            FileKind::Image => {
                let img = image::open(path).map_err(|e| SegmentError::raster_read(path, e))?;
                raster_from_image(&img)
            }
            _ => return Err(SegmentError::raster_read(path, "not a raster format")),
        };
        if nodata_override.is_some() {
            raster.nodata = nodata_override;
        }
        log::info!(
            "loaded {}: {}x{}, {} band(s), nodata {:?}, {}",
            path.display(),
            raster.width(),
            raster.height(),
            raster.bands.len(),
            raster.nodata,
            raster.crs
        );
        Ok(raster)
    }
}

fn read_geotiff(path: &Path) -> Result<Raster> {
    let err = |e: tiff::TiffError| SegmentError::raster_read(path, e);

    let file = File::open(path).map_err(|e| SegmentError::raster_read(path, e))?;
    let mut decoder = Decoder::new(BufReader::new(file))
        .map_err(err)?
        .with_limits(Limits::unlimited());
    let (width, height) = decoder.dimensions().map_err(err)?;
    let (width, height) = (width as usize, height as usize);

    let transform = match decoder.find_tag(Tag::ModelTransformationTag).map_err(err)? {
        Some(value) => GeoTransform::from_model_transformation(&value.into_f64_vec().map_err(err)?),
        None => {
            let tiepoint = decoder.find_tag(Tag::ModelTiepointTag).map_err(err)?;
            let scale = decoder.find_tag(Tag::ModelPixelScaleTag).map_err(err)?;
            match (tiepoint, scale) {
                (Some(tiepoint), Some(scale)) => GeoTransform::from_tiepoint(
                    &tiepoint.into_f64_vec().map_err(err)?,
                    &scale.into_f64_vec().map_err(err)?,
                ),
                _ => None,
            }
        }
    }
    .unwrap_or_else(|| {
        log::warn!("{} has no georeferencing, using pixel coordinates", path.display());
        GeoTransform::identity()
    });

    let crs = match decoder.find_tag(Tag::GeoKeyDirectoryTag).map_err(err)? {
        Some(value) => Crs::from_geokeys(&value.into_u16_vec().map_err(err)?),
        None => Crs::Unknown,
    };

    let nodata = match decoder.find_tag(Tag::GdalNodata).map_err(err)? {
        Some(value) => parse_nodata(&value.into_string().map_err(err)?),
        None => None,
    };

    let samples = decode_samples(decoder.read_image().map_err(err)?)
        .ok_or_else(|| SegmentError::raster_read(path, "unsupported sample format"))?;

    let pixels = width * height;
    if pixels == 0 || samples.len() % pixels != 0 {
        return Err(SegmentError::raster_read(
            path,
            format!("{} samples do not fit a {}x{} image", samples.len(), width, height),
        ));
    }
    let band_count = samples.len() / pixels;
    let bands = (0..band_count)
        .map(|b| {
            let data = samples.iter().skip(b).step_by(band_count).copied().collect();
            Grid::from_vec(width, height, data)
        })
        .collect::<Option<Vec<_>>>()
        .ok_or_else(|| SegmentError::raster_read(path, "inconsistent band size"))?;

    Ok(Raster {
        bands,
        nodata,
        transform,
        crs,
    })
}

#[allow(unreachable_patterns)]
fn decode_samples(result: DecodingResult) -> Option<Vec<f64>> {
    let samples = match result {
        DecodingResult::U8(v) => v.into_iter().map(f64::from).collect(),
        DecodingResult::U16(v) => v.into_iter().map(f64::from).collect(),
        DecodingResult::U32(v) => v.into_iter().map(f64::from).collect(),
        DecodingResult::U64(v) => v.into_iter().map(|s| s as f64).collect(),
        DecodingResult::I8(v) => v.into_iter().map(f64::from).collect(),
        DecodingResult::I16(v) => v.into_iter().map(f64::from).collect(),
        DecodingResult::I32(v) => v.into_iter().map(f64::from).collect(),
        DecodingResult::I64(v) => v.into_iter().map(|s| s as f64).collect(),
        DecodingResult::F32(v) => v.into_iter().map(f64::from).collect(),
        DecodingResult::F64(v) => v,
        _ => return None,
    };
    Some(samples)
}

fn parse_nodata(text: &str) -> Option<f64> {
    let text = text.trim_matches(|c: char| c == '\0' || c.is_whitespace());
    match text.to_ascii_lowercase().as_str() {
        "" => None,
        "nan" => Some(f64::NAN),
        other => other.parse().ok(),
    }
}

/// Colour images become three CIE L*a*b* bands so gradients follow perceived
/// contrast; grey images give a single band. Transparent pixels are nodata.
pub fn raster_from_image(img: &DynamicImage) -> Raster {
    let (width, height) = img.dimensions();
    let (width, height) = (width as usize, height as usize);
    let has_alpha = img.color().has_alpha();

    let bands = if img.color().has_color() {
        let rgba = img.to_rgba32f();
        let mut l = Vec::with_capacity(width * height);
        let mut a = Vec::with_capacity(width * height);
        let mut b = Vec::with_capacity(width * height);
        for p in rgba.pixels() {
            if has_alpha && p[3] <= 0.0 {
                l.push(f64::NAN);
                a.push(f64::NAN);
                b.push(f64::NAN);
                continue;
            }
            let lab: Lab = Lab::from_color(Srgb::new(p[0], p[1], p[2]).into_linear());
            l.push(lab.l as f64);
            a.push(lab.a as f64);
            b.push(lab.b as f64);
        }
        [l, a, b]
            .into_iter()
            .filter_map(|data| Grid::from_vec(width, height, data))
            .collect()
    } else {
        let luma = img.to_luma_alpha32f();
        let data = luma
            .pixels()
            .map(|p| {
                if has_alpha && p[1] <= 0.0 {
                    f64::NAN
                } else {
                    p[0] as f64 * 255.0
                }
            })
            .collect();
        Grid::from_vec(width, height, data).into_iter().collect()
    };

    Raster::new(bands)
}
