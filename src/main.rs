use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use structopt::StructOpt;

use rio_segment::{run, EdgeCombiner, SegmentConfig};

/// Segments rasters along their edges and the boundaries of optional vector
/// files, writing the regions as GeoJSON polygons.
#[derive(Debug, StructOpt)]
#[structopt(name = "rio-segment")]
struct Opt {
    /// Input rasters and vector files, followed by the output .geojson path
    #[structopt(parse(from_os_str), min_values = 2, required = true)]
    paths: Vec<PathBuf>,

    /// Nodata value overriding the one stored in the rasters
    #[structopt(long = "no-data", allow_hyphen_values = true)]
    no_data: Option<i64>,

    /// Edge strength given to vector boundaries (0 to 255)
    #[structopt(long = "shapefile-weight")]
    shapefile_weight: Option<u8>,

    /// Fill nodata holes covered by the input polygons
    #[structopt(long = "fill-holes", overrides_with = "no-fill-holes")]
    fill_holes: bool,

    /// Leave nodata holes as they are
    #[structopt(long = "no-fill-holes", overrides_with = "fill-holes")]
    no_fill_holes: bool,

    /// Penalty against merging large regions
    #[structopt(long = "size-pen")]
    size_pen: Option<f64>,

    /// Percentiles used to rescale each band to 0..255
    #[structopt(long = "rescale-perc", number_of_values = 2, value_names = &["LOW", "HIGH"])]
    rescale_perc: Option<Vec<f64>>,

    /// Window size used to find watershed seeds
    #[structopt(long)]
    footprint: Option<usize>,

    /// Percentile of pixel edge strength below which boundaries merge
    #[structopt(long)]
    threshold: Option<f64>,

    /// Write the label raster next to the polygons
    #[structopt(long = "output-raster", overrides_with = "no-output-raster")]
    output_raster: bool,

    /// Do not write the label raster next to the polygons
    #[structopt(long = "no-output-raster", overrides_with = "output-raster")]
    no_output_raster: bool,

    /// How band gradients are combined: max or mean
    #[structopt(long)]
    combine: Option<EdgeCombiner>,

    /// JSON file with default parameters; flags given here take precedence
    #[structopt(long, parse(from_os_str))]
    config: Option<PathBuf>,

    /// More logging, repeat for more detail
    #[structopt(short, long, parse(from_occurrences))]
    verbose: u8,
}

impl Opt {
    fn segment_config(&self) -> Result<SegmentConfig> {
        let mut config = match &self.config {
            Some(path) => SegmentConfig::from_json_file(path)
                .with_context(|| format!("loading config {}", path.display()))?,
            None => SegmentConfig::default(),
        };
        if let Some(nodata) = self.no_data {
            config.nodata = Some(nodata as f64);
        }
        if let Some(weight) = self.shapefile_weight {
            config.shapefile_weight = weight;
        }
        if self.fill_holes {
            config.fill_holes = true;
        } else if self.no_fill_holes {
            config.fill_holes = false;
        }
        if let Some(size_pen) = self.size_pen {
            config.size_penalty = size_pen;
        }
        if let Some(perc) = &self.rescale_perc {
            match perc.as_slice() {
                &[low, high] => config.rescale_percentiles = (low, high),
                other => bail!("--rescale-perc takes two values, got {}", other.len()),
            }
        }
        if let Some(footprint) = self.footprint {
            config.footprint = footprint;
        }
        if let Some(threshold) = self.threshold {
            config.threshold = threshold;
        }
        if self.output_raster {
            config.output_raster = true;
        } else if self.no_output_raster {
            config.output_raster = false;
        }
        if let Some(combine) = self.combine {
            config.combiner = combine;
        }
        Ok(config)
    }
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();
}

fn main() -> Result<()> {
    let opt = Opt::from_args();
    init_logging(opt.verbose);

    let config = opt.segment_config()?;
    let (output, inputs) = match opt.paths.split_last() {
        Some((output, inputs)) if !inputs.is_empty() => (output, inputs),
        _ => bail!("expected at least one input and an output path"),
    };

    let report = run(inputs, output, &config).with_context(|| {
        format!("segmenting {} input(s) into {}", inputs.len(), output.display())
    })?;
    log::info!(
        "{} watershed region(s), {} after merging",
        report.watershed_regions,
        report.merge.final_regions
    );
    println!("complete");
    Ok(())
}
