use image::codecs::png::PngEncoder;
use image::{ColorType, ImageEncoder};
use wasm_bindgen::prelude::*;

pub mod config;
pub mod edges;
pub mod error;
pub mod georef;
pub mod gradient;
pub mod grid;
pub mod holes;
pub mod input;
pub mod pipeline;
pub mod polygonize;
pub mod rag;
pub mod raster;
pub mod rasterize;
pub mod rescale;
pub mod stats;
pub mod vector;
pub mod visualize;
pub mod watershed;
pub mod writer;

pub use config::SegmentConfig;
pub use edges::EdgeCombiner;
pub use error::{Result, SegmentError};
pub use grid::{Connexity, EdgeField, Grid, LabelGrid, ValidityMask};
pub use pipeline::{run, segment, segment_rasters, SegmentReport, Segmentation};

use raster::{raster_from_image, Raster};
use visualize::visualize;

fn to_js(e: impl ToString) -> JsValue {
    js_sys::Error::new(&e.to_string()).into()
}

#[cfg(target_arch = "wasm32")]
fn console_log(message: &str) {
    web_sys::console::log_1(&JsValue::from_str(message));
}

#[cfg(not(target_arch = "wasm32"))]
fn console_log(message: &str) {
    log::info!("{}", message);
}

#[wasm_bindgen]
pub struct WasmSegmenter {
    img: image::DynamicImage,
    raster: Raster,
}

#[wasm_bindgen]
impl WasmSegmenter {
    #[wasm_bindgen]
    pub fn new(img: &[u8]) -> std::result::Result<WasmSegmenter, JsValue> {
        match image::load_from_memory(img) {
            Ok(img) => {
                let raster = raster_from_image(&img);
                Ok(WasmSegmenter { img, raster })
            }
            Err(e) => Err(to_js(e)),
        }
    }

    /// Segments the image and returns a PNG where each region has its mean colour.
    #[wasm_bindgen]
    pub fn process(
        &self,
        size_penalty: f64,
        footprint: u32,
        threshold: f64,
        rescale_low: f64,
        rescale_high: f64,
    ) -> std::result::Result<Vec<u8>, JsValue> {
        let config = SegmentConfig {
            size_penalty,
            footprint: footprint as usize,
            threshold,
            rescale_percentiles: (rescale_low, rescale_high),
            ..SegmentConfig::default()
        };
        let segmentation =
            segment_rasters(std::slice::from_ref(&self.raster), &[], &config).map_err(to_js)?;
        console_log(&format!(
            "{} watershed region(s) merged into {}",
            segmentation.watershed_regions, segmentation.merge.final_regions
        ));
        let res = visualize(&self.img, &segmentation.labels);

        let mut out = Vec::new();
        let encoder = PngEncoder::new(&mut out);
        match encoder.write_image(&res, res.width(), res.height(), ColorType::Rgb8) {
            Err(e) => Err(to_js(e)),
            Ok(_) => Ok(out),
        }
    }
}

#[wasm_bindgen]
pub fn init_panic_hook() {
    console_error_panic_hook::set_once();
}
