/// Percentile `q` (0..=100) with linear interpolation between closest ranks.
///
/// Sorts `values` in place. Returns `None` for an empty slice.
pub fn percentile(values: &mut [f64], q: f64) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    values.sort_unstable_by(|a, b| a.total_cmp(b));
    Some(percentile_sorted(values, q))
}

/// Same as [`percentile`] on already sorted, non-empty values.
pub fn percentile_sorted(sorted: &[f64], q: f64) -> f64 {
    let q = q.clamp(0.0, 100.0);
    let rank = q / 100.0 * (sorted.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    let frac = rank - lo as f64;
    sorted[lo] + (sorted[hi] - sorted[lo]) * frac
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interpolates_between_ranks() {
        let mut values = vec![4.0, 1.0, 3.0, 2.0];
        assert_eq!(percentile(&mut values, 0.0), Some(1.0));
        assert_eq!(percentile(&mut values, 100.0), Some(4.0));
        assert_eq!(percentile(&mut values, 50.0), Some(2.5));
        assert!((percentile(&mut values, 40.0).unwrap() - 2.2).abs() < 1e-12);
    }

    #[test]
    fn empty_and_single() {
        assert_eq!(percentile(&mut [], 50.0), None);
        assert_eq!(percentile(&mut [7.0], 98.0), Some(7.0));
    }
}
