//! Sobel gradient magnitude on rescaled bands.
//!
//! Kernels are normalised by 4 so a step of `h` between neighbouring pixels
//! yields a derivative of `h`; the magnitude is `|g| / sqrt(2)`, which keeps a
//! band in `[0, 255]` inside `[0, 255]`. Samples outside the grid or outside the
//! validity mask are replaced by the centre sample, so nodata borders do not
//! show up as edges.
use glam::Vec2;

use crate::grid::{EdgeField, Grid, ValidityMask};
use crate::rescale::RANGE_MAX;

type Kernel3 = [[f32; 3]; 3];

const SOBEL_KERNEL_X: Kernel3 = [[-1.0, 0.0, 1.0], [-2.0, 0.0, 2.0], [-1.0, 0.0, 1.0]];
const SOBEL_KERNEL_Y: Kernel3 = [[-1.0, -2.0, -1.0], [0.0, 0.0, 0.0], [1.0, 2.0, 1.0]];
const SOBEL_NORM: f32 = 4.0;

pub fn sobel_magnitude(band: &Grid<f32>, valid: &ValidityMask) -> EdgeField {
    let (w, h) = (band.width(), band.height());
    let mut out = Grid::new(w, h, 0.0f32);

    for y in 0..h {
        for x in 0..w {
            if !*valid.get(x, y) {
                continue;
            }
            let centre = *band.get(x, y);
            let mut g = Vec2::ZERO;
            for (ky, dy) in (-1isize..=1).enumerate() {
                for (kx, dx) in (-1isize..=1).enumerate() {
                    let v = match band.offset(x, y, dx, dy) {
                        Some(i) if valid.data()[i] => band.data()[i],
                        _ => centre,
                    };
                    g += Vec2::new(SOBEL_KERNEL_X[ky][kx], SOBEL_KERNEL_Y[ky][kx]) * v;
                }
            }
            let magnitude = (g / SOBEL_NORM).length() / std::f32::consts::SQRT_2;
            *out.get_mut(x, y) = magnitude.min(RANGE_MAX);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flat_band_has_no_edges() {
        let band = Grid::new(5, 5, 42.0f32);
        let mask = Grid::new(5, 5, true);
        assert!(sobel_magnitude(&band, &mask).data().iter().all(|v| *v == 0.0));
    }

    #[test]
    fn vertical_step_peaks_beside_the_step() {
        let band = Grid::from_vec(4, 3, vec![0.0, 0.0, 255.0, 255.0].repeat(3)).unwrap();
        let mask = Grid::new(4, 3, true);
        let edges = sobel_magnitude(&band, &mask);
        let expected = 255.0 / std::f32::consts::SQRT_2;
        assert!((edges.get(1, 1) - expected).abs() < 1e-3);
        assert!((edges.get(2, 1) - expected).abs() < 1e-3);
        assert_eq!(*edges.get(0, 1), 0.0);
        assert_eq!(*edges.get(3, 1), 0.0);
    }

    #[test]
    fn invalid_neighbours_do_not_create_edges() {
        let band = Grid::from_vec(3, 1, vec![10.0, 10.0, 0.0]).unwrap();
        let mask = Grid::from_vec(3, 1, vec![true, true, false]).unwrap();
        let edges = sobel_magnitude(&band, &mask);
        assert_eq!(edges.data(), &[0.0, 0.0, 0.0]);
    }
}
