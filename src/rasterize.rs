//! Burning vector polygons onto the raster grid.
use geo::{BoundingRect, Contains, Coord, LineString, Point, Polygon};
use glam::DVec2;

use crate::georef::GeoTransform;
use crate::grid::Grid;

/// Marks every pixel crossed by a polygon ring (exteriors and holes).
pub fn rasterize_boundaries(
    polygons: &[Polygon<f64>],
    transform: &GeoTransform,
    width: usize,
    height: usize,
) -> Grid<bool> {
    let mut out = Grid::new(width, height, false);
    let inverse = transform.inverse();
    for polygon in polygons {
        for ring in std::iter::once(polygon.exterior()).chain(polygon.interiors()) {
            burn_ring(ring, |p| inverse.transform_point2(p), &mut out);
        }
    }
    out
}

fn burn_ring<F: Fn(DVec2) -> DVec2>(ring: &LineString<f64>, to_pixel: F, out: &mut Grid<bool>) {
    for line in ring.lines() {
        let a = to_pixel(DVec2::new(line.start.x, line.start.y));
        let b = to_pixel(DVec2::new(line.end.x, line.end.y));
        let bounds = DVec2::new(out.width() as f64, out.height() as f64);
        if let Some((a, b)) = clip_segment(a, b, DVec2::splat(-1.0), bounds + 1.0) {
            draw_line(a, b, out);
        }
    }
}

/// Liang-Barsky clipping of `a..b` against the box `min..max`.
fn clip_segment(a: DVec2, b: DVec2, min: DVec2, max: DVec2) -> Option<(DVec2, DVec2)> {
    let d = b - a;
    let mut t0 = 0.0f64;
    let mut t1 = 1.0f64;
    for (p, q) in [
        (-d.x, a.x - min.x),
        (d.x, max.x - a.x),
        (-d.y, a.y - min.y),
        (d.y, max.y - a.y),
    ] {
        if p == 0.0 {
            if q < 0.0 {
                return None;
            }
            continue;
        }
        let r = q / p;
        if p < 0.0 {
            t0 = t0.max(r);
        } else {
            t1 = t1.min(r);
        }
        if t0 > t1 {
            return None;
        }
    }
    Some((a + d * t0, a + d * t1))
}

/// Bresenham between the pixels containing `a` and `b`.
fn draw_line(a: DVec2, b: DVec2, out: &mut Grid<bool>) {
    let (mut x0, mut y0) = (a.x.floor() as i64, a.y.floor() as i64);
    let (x1, y1) = (b.x.floor() as i64, b.y.floor() as i64);
    let dx = (x1 - x0).abs();
    let dy = -(y1 - y0).abs();
    let sx = if x0 < x1 { 1 } else { -1 };
    let sy = if y0 < y1 { 1 } else { -1 };
    let mut err = dx + dy;
    loop {
        if x0 >= 0 && y0 >= 0 && (x0 as usize) < out.width() && (y0 as usize) < out.height() {
            *out.get_mut(x0 as usize, y0 as usize) = true;
        }
        if x0 == x1 && y0 == y1 {
            break;
        }
        let e2 = 2 * err;
        if e2 >= dy {
            err += dy;
            x0 += sx;
        }
        if e2 <= dx {
            err += dx;
            y0 += sy;
        }
    }
}

/// Marks pixels whose centre lies inside a polygon (holes excluded).
pub fn rasterize_coverage(
    polygons: &[Polygon<f64>],
    transform: &GeoTransform,
    width: usize,
    height: usize,
) -> Grid<bool> {
    let mut out = Grid::new(width, height, false);
    if width == 0 || height == 0 {
        return out;
    }
    let inverse = transform.inverse();
    for polygon in polygons {
        let rect = match polygon.bounding_rect() {
            Some(rect) => rect,
            None => continue,
        };
        /* pixel window of the bounding box, whatever the orientation of the transform */
        let corners = [
            rect.min(),
            rect.max(),
            Coord {
                x: rect.min().x,
                y: rect.max().y,
            },
            Coord {
                x: rect.max().x,
                y: rect.min().y,
            },
        ]
        .map(|c| inverse.transform_point2(DVec2::new(c.x, c.y)));
        let lo = corners.iter().fold(DVec2::splat(f64::INFINITY), |m, c| m.min(*c));
        let hi = corners
            .iter()
            .fold(DVec2::splat(f64::NEG_INFINITY), |m, c| m.max(*c));
        let x0 = lo.x.floor().max(0.0) as usize;
        let y0 = lo.y.floor().max(0.0) as usize;
        let x1 = (hi.x.ceil().max(0.0) as usize).min(width);
        let y1 = (hi.y.ceil().max(0.0) as usize).min(height);

        for y in y0..y1 {
            for x in x0..x1 {
                let cell = out.get_mut(x, y);
                if *cell {
                    continue;
                }
                let centre = transform.pixel_to_world(DVec2::new(x as f64 + 0.5, y as f64 + 0.5));
                if polygon.contains(&Point::new(centre.x, centre.y)) {
                    *cell = true;
                }
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::polygon;

    fn north_up() -> GeoTransform {
        /* 1 unit pixels, origin at (100, 50), y pointing down in pixel space */
        GeoTransform::from_gdal([100.0, 1.0, 0.0, 50.0, 0.0, -1.0])
    }

    #[test]
    fn square_outline_and_interior() {
        let square = polygon![
            (x: 102.0, y: 48.0),
            (x: 106.0, y: 48.0),
            (x: 106.0, y: 44.0),
            (x: 102.0, y: 44.0),
        ];
        let edges = rasterize_boundaries(&[square.clone()], &north_up(), 10, 10);
        assert!(*edges.get(2, 2));
        assert!(*edges.get(4, 2));
        assert!(*edges.get(2, 4));
        assert!(!*edges.get(4, 4));
        assert!(!*edges.get(0, 0));

        let inside = rasterize_coverage(&[square], &north_up(), 10, 10);
        assert_eq!(inside.count_valid(), 16);
        assert!(*inside.get(2, 2) && *inside.get(5, 5));
        assert!(!*inside.get(6, 5) && !*inside.get(1, 2));
    }

    #[test]
    fn holes_are_not_covered() {
        let donut = Polygon::new(
            LineString::from(vec![(100.0, 50.0), (110.0, 50.0), (110.0, 40.0), (100.0, 40.0)]),
            vec![LineString::from(vec![
                (103.0, 47.0),
                (107.0, 47.0),
                (107.0, 43.0),
                (103.0, 43.0),
            ])],
        );
        let inside = rasterize_coverage(&[donut], &north_up(), 10, 10);
        assert_eq!(inside.count_valid(), 100 - 16);
        assert!(!*inside.get(4, 4));
    }

    #[test]
    fn far_away_segments_are_clipped() {
        let huge = polygon![
            (x: -1e9, y: 45.5),
            (x: 1e9, y: 45.5),
            (x: 1e9, y: -1e9),
        ];
        let edges = rasterize_boundaries(&[huge], &north_up(), 10, 10);
        for x in 0..10 {
            assert!(*edges.get(x, 4));
        }
    }
}
