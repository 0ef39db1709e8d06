use crate::grid::{Connexity, Grid, ValidityMask};

/// Fills invalid pixels that lie under `coverage` by propagating the mean of
/// known 8-neighbours inwards, one ring per pass, until nothing changes.
///
/// Every band is filled at the same pixels; `valid` is updated. Covered pixels
/// that no valid data can reach stay invalid. Returns the number of pixels
/// filled.
pub fn fill_covered_holes(
    bands: &mut [Grid<f32>],
    valid: &mut ValidityMask,
    coverage: &Grid<bool>,
) -> usize {
    let mut pending: Vec<usize> = (0..valid.len())
        .filter(|&i| !valid.data()[i] && coverage.data()[i])
        .collect();
    let mut filled = 0;

    loop {
        /* values of one pass only read pixels known before the pass */
        let mut updates: Vec<(usize, Vec<f32>)> = Vec::new();
        pending.retain(|&idx| {
            let known: Vec<usize> = valid
                .neighbors(idx, Connexity::C8)
                .filter(|&n| valid.data()[n])
                .collect();
            if known.is_empty() {
                return true;
            }
            let values = bands
                .iter()
                .map(|band| {
                    known.iter().map(|&n| band.data()[n]).sum::<f32>() / known.len() as f32
                })
                .collect();
            updates.push((idx, values));
            false
        });

        if updates.is_empty() {
            break;
        }
        filled += updates.len();
        for (idx, values) in updates {
            for (band, value) in bands.iter_mut().zip(values) {
                band.data_mut()[idx] = value;
            }
            valid.data_mut()[idx] = true;
        }
    }

    if !pending.is_empty() {
        log::debug!("{} covered pixel(s) unreachable from valid data", pending.len());
    }
    filled
}
