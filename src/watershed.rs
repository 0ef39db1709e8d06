//! Marker based watershed over the edge field.
//!
//! Seeds are plateaus holding a local minimum of a square window and not
//! bordering lower ground; basins are grown by a priority flood that always
//! extends into the lowest pending pixel.
//! Equal values pop in insertion order, so a run is reproducible.
use std::cmp::Ordering;
use std::collections::BinaryHeap;

use crate::error::{Result, SegmentError};
use crate::grid::{Connexity, EdgeField, Grid, LabelGrid, ValidityMask};

#[derive(Debug)]
struct FloodItem {
    value: f32,
    seq: u64,
    index: usize,
    label: u32,
}

impl PartialEq for FloodItem {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}
impl Eq for FloodItem {}

impl PartialOrd for FloodItem {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for FloodItem {
    fn cmp(&self, other: &Self) -> Ordering {
        // BinaryHeap is a max-heap: lowest value, then oldest entry, pops first
        other
            .value
            .total_cmp(&self.value)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

struct Flood<'a> {
    edges: &'a EdgeField,
    mask: &'a ValidityMask,
    connexity: Connexity,
    heap: BinaryHeap<FloodItem>,
    seq: u64,
}

impl<'a> Flood<'a> {
    fn push_neighbors(&mut self, labels: &LabelGrid, index: usize, label: u32) {
        for n in self.mask.neighbors(index, self.connexity) {
            if self.mask.data()[n] && labels.data()[n] == 0 {
                self.heap.push(FloodItem {
                    value: self.edges.data()[n],
                    seq: self.seq,
                    index: n,
                    label,
                });
                self.seq += 1;
            }
        }
    }

    fn run(&mut self, labels: &mut LabelGrid) {
        while let Some(item) = self.heap.pop() {
            if labels.data()[item.index] != 0 {
                continue;
            }
            labels.data_mut()[item.index] = item.label;
            self.push_neighbors(labels, item.index, item.label);
        }
    }
}

/// Minimum of the valid values in the `footprint` window around each pixel.
fn window_minimum(edges: &EdgeField, mask: &ValidityMask, footprint: usize) -> Grid<f32> {
    let (w, h) = (edges.width(), edges.height());
    let before = (footprint / 2) as isize;
    let after = (footprint - 1 - footprint / 2) as isize;
    let masked = |i: usize| {
        if mask.data()[i] {
            edges.data()[i]
        } else {
            f32::INFINITY
        }
    };

    /* separable: rows, then columns of the row result */
    let mut rows = Grid::new(w, h, f32::INFINITY);
    for y in 0..h {
        for x in 0..w {
            let m = (-before..=after)
                .filter_map(|dx| edges.offset(x, y, dx, 0))
                .map(masked)
                .fold(f32::INFINITY, f32::min);
            *rows.get_mut(x, y) = m;
        }
    }
    let mut out = Grid::new(w, h, f32::INFINITY);
    for y in 0..h {
        for x in 0..w {
            let m = (-before..=after)
                .filter_map(|dy| rows.offset(x, y, 0, dy))
                .map(|i| rows.data()[i])
                .fold(f32::INFINITY, f32::min);
            *out.get_mut(x, y) = m;
        }
    }
    out
}

/// Valid pixels equal to the minimum of their window.
pub fn local_minima(edges: &EdgeField, mask: &ValidityMask, footprint: usize) -> Grid<bool> {
    let minimum = window_minimum(edges, mask, footprint);
    let mut out = Grid::new(edges.width(), edges.height(), false);
    for (i, o) in out.data_mut().iter_mut().enumerate() {
        *o = mask.data()[i] && edges.data()[i] <= minimum.data()[i];
    }
    out
}

/// Labels the plateaus holding a window minimum as seeds.
///
/// A plateau is a connected run of valid pixels sharing one value. A plateau
/// with a strictly lower valid neighbour drains elsewhere and is skipped.
fn label_seeds(
    minima: &Grid<bool>,
    edges: &EdgeField,
    mask: &ValidityMask,
    connexity: Connexity,
    labels: &mut LabelGrid,
) -> u32 {
    let mut visited = Grid::new(minima.width(), minima.height(), false);
    let mut count = 0u32;
    let mut queue: Vec<usize> = vec![];
    let mut plateau: Vec<usize> = vec![];
    for start in 0..minima.len() {
        if !minima.data()[start] || visited.data()[start] {
            continue;
        }
        let level = edges.data()[start];
        visited.data_mut()[start] = true;
        queue.push(start);
        plateau.clear();
        let mut drains = false;
        while let Some(idx) = queue.pop() {
            plateau.push(idx);
            for n in minima.neighbors(idx, connexity) {
                if !mask.data()[n] {
                    continue;
                }
                let value = edges.data()[n];
                if value < level {
                    drains = true;
                } else if value == level && !visited.data()[n] {
                    visited.data_mut()[n] = true;
                    queue.push(n);
                }
            }
        }
        if drains {
            continue;
        }
        count += 1;
        for &idx in &plateau {
            labels.data_mut()[idx] = count;
        }
    }
    count
}

/// Floods `seeds` labelled basins over the valid pixels, then gives each
/// valid island no basin reached a label of its own.
fn flood_basins(
    edges: &EdgeField,
    mask: &ValidityMask,
    connexity: Connexity,
    labels: &mut LabelGrid,
    seeds: u32,
) -> Result<u32> {
    if seeds == 0 {
        return Err(SegmentError::DegenerateInput(
            "no local minimum to seed from".to_string(),
        ));
    }
    let mut flood = Flood {
        edges,
        mask,
        connexity,
        heap: BinaryHeap::new(),
        seq: 0,
    };
    for i in 0..labels.len() {
        let label = labels.data()[i];
        if label != 0 {
            flood.push_neighbors(labels, i, label);
        }
    }
    flood.run(labels);

    let mut count = seeds;
    for i in 0..labels.len() {
        if mask.data()[i] && labels.data()[i] == 0 {
            count += 1;
            labels.data_mut()[i] = count;
            flood.push_neighbors(labels, i, count);
            flood.run(labels);
        }
    }
    Ok(count)
}

/// Partitions the valid pixels of `edges` into basins labelled `1..=n`.
///
/// Invalid pixels are left at 0. Every valid pixel receives a label, and each
/// label is connected under `connexity`.
pub fn watershed_segment(
    edges: &EdgeField,
    mask: &ValidityMask,
    footprint: usize,
    connexity: Connexity,
) -> Result<LabelGrid> {
    let (w, h) = (edges.width(), edges.height());
    if footprint == 0 || footprint > w || footprint > h {
        return Err(SegmentError::DegenerateInput(format!(
            "footprint {} does not fit a {}x{} raster",
            footprint, w, h
        )));
    }

    let (lo, hi) = edges
        .data()
        .iter()
        .zip(mask.data())
        .filter(|(_, &ok)| ok)
        .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), (&v, _)| {
            (lo.min(v), hi.max(v))
        });
    if lo > hi {
        return Err(SegmentError::DegenerateInput(
            "no valid pixels to seed from".to_string(),
        ));
    }
    if lo == hi {
        return Err(SegmentError::DegenerateInput(
            "edge field is uniform, no seeds found".to_string(),
        ));
    }

    let mut labels = Grid::new(w, h, 0u32);
    let minima = local_minima(edges, mask, footprint);
    let seeds = label_seeds(&minima, edges, mask, connexity, &mut labels);
    let count = flood_basins(edges, mask, connexity, &mut labels, seeds)?;

    log::info!(
        "watershed: {} seed(s), {} region(s) with footprint {}",
        seeds,
        count,
        footprint
    );
    Ok(labels)
}

/// Number of distinct positive labels.
pub fn count_labels(labels: &LabelGrid) -> usize {
    let mut seen: Vec<u32> = labels.data().iter().copied().filter(|&l| l != 0).collect();
    seen.sort_unstable();
    seen.dedup();
    seen.len()
}
