use crate::grid::{Grid, ValidityMask};
use crate::stats::percentile_sorted;

/// Upper end of the common intensity range every band is mapped to.
pub const RANGE_MAX: f32 = 255.0;

/// Linearly maps `band` to `[0, RANGE_MAX]`, clipping at the `low` and `high`
/// percentiles of its valid samples. Invalid pixels are written as 0.
pub fn rescale_band(band: &Grid<f64>, valid: &ValidityMask, low: f64, high: f64) -> Grid<f32> {
    let mut samples: Vec<f64> = band
        .data()
        .iter()
        .zip(valid.data())
        .filter(|(_, &ok)| ok)
        .map(|(&v, _)| v)
        .collect();

    if samples.is_empty() {
        return Grid::new(band.width(), band.height(), 0.0);
    }
    samples.sort_unstable_by(|a, b| a.total_cmp(b));
    let lo = percentile_sorted(&samples, low);
    let hi = percentile_sorted(&samples, high);
    let span = hi - lo;

    let mut out = Grid::new(band.width(), band.height(), 0.0f32);
    if span <= 0.0 {
        return out;
    }
    for ((o, &v), &ok) in out.data_mut().iter_mut().zip(band.data()).zip(valid.data()) {
        if ok {
            *o = ((v.clamp(lo, hi) - lo) / span * RANGE_MAX as f64) as f32;
        }
    }
    out
}
