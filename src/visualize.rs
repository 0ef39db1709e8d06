use glam::Vec3;
use image::{DynamicImage, GenericImageView, ImageBuffer, Rgb, RgbImage};

use crate::grid::LabelGrid;

/// Paints every region with its mean colour. Background pixels stay black.
pub fn visualize(img: &DynamicImage, labels: &LabelGrid) -> RgbImage {
    let max_label = labels.data().iter().copied().max().unwrap_or(0) as usize;
    let mut sums = vec![(Vec3::ZERO, 0u32); max_label + 1];
    for (i, &label) in labels.data().iter().enumerate() {
        if label == 0 {
            continue;
        }
        let (x, y) = labels.coord(i);
        let rgb = img.get_pixel(x as u32, y as u32);
        let entry = &mut sums[label as usize];
        entry.0 += Vec3::new(rgb[0] as f32, rgb[1] as f32, rgb[2] as f32);
        entry.1 += 1;
    }
    let colors: Vec<Rgb<u8>> = sums
        .iter()
        .map(|&(sum, count)| {
            let avg = sum / count.max(1) as f32;
            Rgb([
                avg.x.round() as u8,
                avg.y.round() as u8,
                avg.z.round() as u8,
            ])
        })
        .collect();

    let mut res = ImageBuffer::new(labels.width() as u32, labels.height() as u32);
    for (i, &label) in labels.data().iter().enumerate() {
        let (x, y) = labels.coord(i);
        let color = if label == 0 {
            Rgb([0, 0, 0])
        } else {
            colors[label as usize]
        };
        res.put_pixel(x as u32, y as u32, color);
    }
    res
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::Grid;

    #[test]
    fn regions_take_their_mean_colour() {
        let mut img = RgbImage::new(3, 1);
        img.put_pixel(0, 0, Rgb([10, 20, 30]));
        img.put_pixel(1, 0, Rgb([30, 40, 50]));
        img.put_pixel(2, 0, Rgb([200, 200, 200]));
        let labels = Grid::from_vec(3, 1, vec![1, 1, 0]).unwrap();
        let res = visualize(&DynamicImage::ImageRgb8(img), &labels);
        assert_eq!(res.get_pixel(0, 0), &Rgb([20, 30, 40]));
        assert_eq!(res.get_pixel(1, 0), &Rgb([20, 30, 40]));
        assert_eq!(res.get_pixel(2, 0), &Rgb([0, 0, 0]));
    }
}
