//! Dissolving a label grid into polygons, one multipolygon per label.
//!
//! Rings follow pixel edges. Every boundary edge is directed so that its own
//! pixel lies on its right (y pointing down); exterior rings then have positive
//! signed area and holes negative. At a corner where two pixels of a label
//! touch only diagonally the tracer turns right, keeping such parts apart.
use std::collections::BTreeMap;

use geo::orient::{Direction, Orient};
use geo::{Contains, Coord, Geometry, LineString, MultiPolygon, Point, Polygon};
use glam::DVec2;

use crate::georef::GeoTransform;
use crate::grid::LabelGrid;

type Vertex = (i64, i64);

/* east, south, west, north; a right turn is `+1` */
const STEPS: [(i64, i64); 4] = [(1, 0), (0, 1), (-1, 0), (0, -1)];

/// Dissolved geometry of one label, in world coordinates.
#[derive(Debug, Clone, PartialEq)]
pub struct SegmentShape {
    pub label: u32,
    pub pixels: u64,
    pub polygons: MultiPolygon<f64>,
}

impl SegmentShape {
    /// `Polygon` for a single part, `MultiPolygon` otherwise.
    pub fn geometry(&self) -> Geometry<f64> {
        match self.polygons.0.as_slice() {
            [single] => Geometry::Polygon(single.clone()),
            _ => Geometry::MultiPolygon(self.polygons.clone()),
        }
    }
}

#[derive(Debug, Default)]
struct LabelEdges {
    pixels: u64,
    outgoing: BTreeMap<Vertex, Vec<usize>>,
}

impl LabelEdges {
    fn add(&mut self, from: Vertex, dir: usize) {
        self.outgoing.entry(from).or_default().push(dir);
    }

    fn has(&self, from: Vertex, dir: usize) -> bool {
        self.outgoing
            .get(&from)
            .map_or(false, |dirs| dirs.contains(&dir))
    }

    fn take(&mut self, from: Vertex, dir: usize) {
        if let Some(dirs) = self.outgoing.get_mut(&from) {
            if let Some(pos) = dirs.iter().position(|&d| d == dir) {
                dirs.swap_remove(pos);
            }
            if dirs.is_empty() {
                self.outgoing.remove(&from);
            }
        }
    }
}

#[derive(Debug)]
struct Ring {
    corners: Vec<Vertex>,
    /// First edge of the ring, used to find a point just inside it.
    start: Vertex,
    dir: usize,
    /// Twice the signed area.
    area2: i64,
}

impl Ring {
    /// Point a quarter pixel to the right of the middle of the first edge.
    fn witness(&self) -> Point<f64> {
        let (dx, dy) = STEPS[self.dir];
        let (rx, ry) = (-dy, dx);
        Point::new(
            self.start.0 as f64 + dx as f64 * 0.5 + rx as f64 * 0.25,
            self.start.1 as f64 + dy as f64 * 0.5 + ry as f64 * 0.25,
        )
    }

    fn pixel_polygon(&self) -> Polygon<f64> {
        Polygon::new(line_string(&self.corners, |x, y| DVec2::new(x, y)), vec![])
    }
}

fn line_string<F: Fn(f64, f64) -> DVec2>(corners: &[Vertex], to_world: F) -> LineString<f64> {
    corners
        .iter()
        .map(|&(x, y)| {
            let p = to_world(x as f64, y as f64);
            Coord { x: p.x, y: p.y }
        })
        .collect::<Vec<_>>()
        .into()
}

fn advance(v: Vertex, dir: usize) -> Vertex {
    (v.0 + STEPS[dir].0, v.1 + STEPS[dir].1)
}

/// Directed boundary edges of every label, keyed by label.
fn collect_edges(labels: &LabelGrid) -> BTreeMap<u32, LabelEdges> {
    let mut out: BTreeMap<u32, LabelEdges> = BTreeMap::new();
    let differs = |x: usize, y: usize, dx: isize, dy: isize, label: u32| {
        labels
            .offset(x, y, dx, dy)
            .map_or(true, |n| labels.data()[n] != label)
    };
    for y in 0..labels.height() {
        for x in 0..labels.width() {
            let label = *labels.get(x, y);
            if label == 0 {
                continue;
            }
            let (xi, yi) = (x as i64, y as i64);
            let edges = out.entry(label).or_default();
            edges.pixels += 1;
            if differs(x, y, 0, -1, label) {
                edges.add((xi, yi), 0);
            }
            if differs(x, y, 1, 0, label) {
                edges.add((xi + 1, yi), 1);
            }
            if differs(x, y, 0, 1, label) {
                edges.add((xi + 1, yi + 1), 2);
            }
            if differs(x, y, -1, 0, label) {
                edges.add((xi, yi + 1), 3);
            }
        }
    }
    out
}

fn trace_rings(edges: &mut LabelEdges) -> Vec<Ring> {
    let mut rings = vec![];
    loop {
        let next = edges.outgoing.iter().next().map(|(&v, dirs)| (v, dirs[0]));
        let (start, first) = match next {
            Some(edge) => edge,
            None => break,
        };
        edges.take(start, first);

        let mut steps = vec![(start, first)];
        let mut at = advance(start, first);
        let mut dir = first;
        loop {
            let at_start = at == start;
            let next = [(dir + 1) % 4, dir, (dir + 3) % 4]
                .into_iter()
                .find(|&c| (at_start && c == first) || edges.has(at, c));
            match next {
                Some(c) if at_start && c == first => break,
                Some(c) => {
                    edges.take(at, c);
                    steps.push((at, c));
                    at = advance(at, c);
                    dir = c;
                }
                None => {
                    log::warn!("open boundary at {:?}, dropping ring", at);
                    steps.clear();
                    break;
                }
            }
        }
        if steps.is_empty() {
            continue;
        }

        /* keep only the vertices where the direction changes */
        let corners: Vec<Vertex> = (0..steps.len())
            .filter(|&i| steps[(i + steps.len() - 1) % steps.len()].1 != steps[i].1)
            .map(|i| steps[i].0)
            .collect();
        let area2 = (0..corners.len())
            .map(|i| {
                let (a, b) = (corners[i], corners[(i + 1) % corners.len()]);
                a.0 * b.1 - b.0 * a.1
            })
            .sum();
        rings.push(Ring {
            corners,
            start,
            dir: first,
            area2,
        });
    }
    rings
}

/// Exteriors with their holes, still in pixel coordinates.
fn assemble(rings: Vec<Ring>) -> Vec<(Ring, Vec<Ring>)> {
    let (exteriors, holes): (Vec<Ring>, Vec<Ring>) = rings.into_iter().partition(|r| r.area2 > 0);
    let shapes: Vec<Polygon<f64>> = exteriors.iter().map(Ring::pixel_polygon).collect();
    let mut out: Vec<(Ring, Vec<Ring>)> = exteriors.into_iter().map(|r| (r, vec![])).collect();

    for hole in holes {
        let witness = hole.witness();
        let owner = shapes
            .iter()
            .enumerate()
            .filter(|(_, shape)| shape.contains(&witness))
            .min_by_key(|&(i, _)| out[i].0.area2)
            .map(|(i, _)| i);
        match owner {
            Some(i) => out[i].1.push(hole),
            None => log::warn!("hole at {:?} has no enclosing ring", hole.start),
        }
    }
    out
}

/// Polygons of every positive label, ordered by label.
pub fn polygonize(labels: &LabelGrid, transform: &GeoTransform) -> Vec<SegmentShape> {
    let to_world = |x: f64, y: f64| transform.pixel_to_world(DVec2::new(x, y));
    collect_edges(labels)
        .into_iter()
        .map(|(label, mut edges)| {
            let parts = assemble(trace_rings(&mut edges))
                .into_iter()
                .map(|(exterior, holes)| {
                    Polygon::new(
                        line_string(&exterior.corners, to_world),
                        holes
                            .iter()
                            .map(|h| line_string(&h.corners, to_world))
                            .collect(),
                    )
                    .orient(Direction::Default)
                })
                .collect::<Vec<_>>();
            SegmentShape {
                label,
                pixels: edges.pixels,
                polygons: MultiPolygon(parts),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::Grid;
    use geo::{Area, Winding};

    fn grid(width: usize, rows: &[u32]) -> LabelGrid {
        Grid::from_vec(width, rows.len() / width, rows.to_vec()).unwrap()
    }

    #[test]
    fn single_pixel_is_a_unit_square() {
        let shapes = polygonize(&grid(1, &[4]), &GeoTransform::identity());
        assert_eq!(shapes.len(), 1);
        assert_eq!(shapes[0].label, 4);
        assert_eq!(shapes[0].pixels, 1);
        let polygon = &shapes[0].polygons.0[0];
        assert_eq!(polygon.exterior().0.len(), 5);
        assert_eq!(polygon.unsigned_area(), 1.0);
    }

    #[test]
    fn collinear_vertices_are_dropped() {
        let shapes = polygonize(&grid(3, &[1, 1, 1, 1, 1, 1]), &GeoTransform::identity());
        assert_eq!(shapes[0].polygons.0[0].exterior().0.len(), 5);
    }

    #[test]
    fn enclosed_label_leaves_a_hole() {
        #[rustfmt::skip]
        let labels = grid(3, &[
            1, 1, 1,
            1, 2, 1,
            1, 1, 1,
        ]);
        let shapes = polygonize(&labels, &GeoTransform::identity());
        assert_eq!(shapes.len(), 2);
        let outer = &shapes[0].polygons.0;
        assert_eq!(outer.len(), 1);
        assert_eq!(outer[0].interiors().len(), 1);
        assert_eq!(outer[0].unsigned_area(), 8.0);
        assert_eq!(shapes[1].polygons.0[0].unsigned_area(), 1.0);
        assert!(matches!(shapes[0].geometry(), Geometry::Polygon(_)));
    }

    #[test]
    fn diagonal_pixels_are_separate_parts() {
        #[rustfmt::skip]
        let labels = grid(2, &[
            1, 2,
            2, 1,
        ]);
        let shapes = polygonize(&labels, &GeoTransform::identity());
        for shape in &shapes {
            assert_eq!(shape.polygons.0.len(), 2);
            assert!(matches!(shape.geometry(), Geometry::MultiPolygon(_)));
            for part in &shape.polygons.0 {
                assert_eq!(part.unsigned_area(), 1.0);
            }
        }
    }

    #[test]
    fn background_is_skipped() {
        let shapes = polygonize(&grid(3, &[0, 3, 0]), &GeoTransform::identity());
        assert_eq!(shapes.len(), 1);
        assert_eq!(shapes[0].label, 3);
    }

    #[test]
    fn area_matches_pixel_counts() {
        #[rustfmt::skip]
        let labels = grid(6, &[
            1, 1, 2, 2, 2, 3,
            1, 4, 4, 2, 3, 3,
            1, 4, 1, 2, 0, 3,
            1, 1, 1, 2, 3, 3,
            5, 5, 2, 2, 3, 5,
        ]);
        let transform = GeoTransform::from_gdal([500.0, 2.0, 0.0, 100.0, 0.0, -2.0]);
        for shape in polygonize(&labels, &transform) {
            let expected = labels.data().iter().filter(|&&l| l == shape.label).count();
            assert_eq!(shape.pixels as usize, expected);
            assert_eq!(shape.polygons.unsigned_area(), expected as f64 * 4.0);
        }
    }

    #[test]
    fn exteriors_are_counter_clockwise_in_world_space() {
        #[rustfmt::skip]
        let labels = grid(3, &[
            1, 1, 1,
            1, 0, 1,
            1, 1, 1,
        ]);
        let transform = GeoTransform::from_gdal([0.0, 1.0, 0.0, 3.0, 0.0, -1.0]);
        let shapes = polygonize(&labels, &transform);
        let polygon = &shapes[0].polygons.0[0];
        assert!(polygon.exterior().is_ccw());
        assert!(polygon.interiors()[0].is_cw());
        let first = polygon.exterior().0[0];
        assert!(first.x >= 0.0 && first.x <= 3.0 && first.y >= 0.0 && first.y <= 3.0);
    }
}
