//! Region adjacency graph and threshold merging.
//!
//! Regions live in an arena indexed by label id. Each keeps a sorted map of
//! boundaries to its neighbours; a boundary accumulates the edge strength of
//! every neighbouring pixel pair across it, so combining two boundaries gives a
//! length-weighted mean. Merge candidates sit in a min-heap and are invalidated
//! lazily through per-region version stamps.
use std::cmp::Ordering;
use std::collections::{BTreeMap, BinaryHeap};

use crate::error::{Result, SegmentError};
use crate::grid::{Connexity, EdgeField, LabelGrid};
use crate::stats::percentile;

#[derive(Debug, Copy, Clone, Default, PartialEq)]
pub struct Boundary {
    sum: f64,
    count: u64,
}

impl Boundary {
    pub fn mean(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.sum / self.count as f64
        }
    }

    pub fn pairs(&self) -> u64 {
        self.count
    }

    fn add(&mut self, value: f64) {
        self.sum += value;
        self.count += 1;
    }

    fn absorb(&mut self, other: Boundary) {
        self.sum += other.sum;
        self.count += other.count;
    }
}

#[derive(Debug, Default)]
struct RegionNode {
    size: u64,
    alive: bool,
    version: u32,
    neighbors: BTreeMap<u32, Boundary>,
}

#[derive(Debug)]
struct MergeCandidate {
    weight: f64,
    a: u32,
    b: u32,
    version_a: u32,
    version_b: u32,
}

impl PartialEq for MergeCandidate {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}
impl Eq for MergeCandidate {}

impl PartialOrd for MergeCandidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for MergeCandidate {
    fn cmp(&self, other: &Self) -> Ordering {
        // reversed for the max-heap: smallest weight, then lowest label pair first
        other
            .weight
            .total_cmp(&self.weight)
            .then_with(|| other.a.cmp(&self.a))
            .then_with(|| other.b.cmp(&self.b))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MergeSummary {
    pub initial_regions: usize,
    pub final_regions: usize,
    pub merges: usize,
    pub cutoff: f64,
}

pub struct AdjacencyGraph {
    regions: Vec<RegionNode>,
    parent: Vec<u32>,
    total_size: u64,
    alive: usize,
    size_penalty: f64,
}

impl AdjacencyGraph {
    /// One node per positive label, one boundary per touching pair of labels.
    pub fn from_labels(
        edges: &EdgeField,
        labels: &LabelGrid,
        connexity: Connexity,
        size_penalty: f64,
    ) -> Result<AdjacencyGraph> {
        let max_label = labels.data().iter().copied().max().unwrap_or(0);
        if max_label == 0 {
            return Err(SegmentError::EmptyGraph);
        }

        let mut regions: Vec<RegionNode> = (0..=max_label).map(|_| RegionNode::default()).collect();
        for y in 0..labels.height() {
            for x in 0..labels.width() {
                let idx = labels.index(x, y);
                let label = labels.data()[idx];
                if label == 0 {
                    continue;
                }
                let region = &mut regions[label as usize];
                region.size += 1;
                region.alive = true;

                for &(dx, dy) in connexity.forward_offsets() {
                    let nidx = match labels.offset(x, y, dx, dy) {
                        Some(n) => n,
                        None => continue,
                    };
                    let nlabel = labels.data()[nidx];
                    if nlabel == 0 || nlabel == label {
                        continue;
                    }
                    let value = (edges.data()[idx] as f64 + edges.data()[nidx] as f64) / 2.0;
                    regions[label as usize]
                        .neighbors
                        .entry(nlabel)
                        .or_default()
                        .add(value);
                    regions[nlabel as usize]
                        .neighbors
                        .entry(label)
                        .or_default()
                        .add(value);
                }
            }
        }

        let total_size = regions.iter().map(|r| r.size).sum();
        let alive = regions.iter().filter(|r| r.alive).count();
        Ok(AdjacencyGraph {
            regions,
            parent: (0..=max_label).collect(),
            total_size,
            alive,
            size_penalty,
        })
    }

    pub fn region_count(&self) -> usize {
        self.alive
    }

    pub fn edge_count(&self) -> usize {
        self.regions
            .iter()
            .map(|r| r.neighbors.len())
            .sum::<usize>()
            / 2
    }

    pub fn region_size(&self, label: u32) -> Option<u64> {
        self.regions
            .get(label as usize)
            .filter(|r| r.alive)
            .map(|r| r.size)
    }

    pub fn boundary(&self, a: u32, b: u32) -> Option<Boundary> {
        self.regions.get(a as usize)?.neighbors.get(&b).copied()
    }

    /// Mean boundary strength of every edge, each pair once.
    #[cfg(test)]
    fn boundary_means(&self) -> Vec<f64> {
        self.edges().map(|(_, _, boundary)| boundary.mean()).collect()
    }

    fn edges(&self) -> impl Iterator<Item = (u32, u32, &Boundary)> + '_ {
        self.regions.iter().enumerate().flat_map(|(a, region)| {
            region
                .neighbors
                .range((a as u32 + 1)..)
                .map(move |(&b, boundary)| (a as u32, b, boundary))
        })
    }

    /// Boundary mean scaled up by the share of the image the pair would cover.
    pub fn weight(&self, a: u32, b: u32) -> Option<f64> {
        let boundary = self.boundary(a, b)?;
        Some(self.effective_weight(a, b, &boundary))
    }

    fn effective_weight(&self, a: u32, b: u32, boundary: &Boundary) -> f64 {
        let combined = (self.regions[a as usize].size + self.regions[b as usize].size) as f64;
        let share = combined / self.total_size.max(1) as f64;
        boundary.mean() * (1.0 + self.size_penalty * share)
    }

    fn candidate(&self, a: u32, b: u32, boundary: &Boundary) -> MergeCandidate {
        let (a, b) = if a < b { (a, b) } else { (b, a) };
        MergeCandidate {
            weight: self.effective_weight(a, b, boundary),
            a,
            b,
            version_a: self.regions[a as usize].version,
            version_b: self.regions[b as usize].version,
        }
    }

    fn is_current(&self, c: &MergeCandidate) -> bool {
        let (ra, rb) = (&self.regions[c.a as usize], &self.regions[c.b as usize]);
        ra.alive && rb.alive && ra.version == c.version_a && rb.version == c.version_b
    }

    /// Folds `gone` into `keep`, uniting their boundaries with every neighbour.
    fn merge(&mut self, keep: u32, gone: u32) {
        let absorbed = std::mem::take(&mut self.regions[gone as usize]);
        {
            let survivor = &mut self.regions[keep as usize];
            survivor.size += absorbed.size;
            survivor.version += 1;
            survivor.neighbors.remove(&gone);
        }
        for (n, boundary) in absorbed.neighbors {
            if n == keep {
                continue;
            }
            let neighbor = &mut self.regions[n as usize].neighbors;
            neighbor.remove(&gone);
            neighbor.entry(keep).or_default().absorb(boundary);
            self.regions[keep as usize]
                .neighbors
                .entry(n)
                .or_default()
                .absorb(boundary);
        }
        self.parent[gone as usize] = keep;
        self.alive -= 1;
    }

    /// Merges the cheapest adjacent pair while its weight stays within `cutoff`.
    /// Returns the number of merges.
    pub fn merge_below(&mut self, cutoff: f64) -> usize {
        let mut heap: BinaryHeap<MergeCandidate> = self
            .edges()
            .map(|(a, b, boundary)| self.candidate(a, b, boundary))
            .collect();

        let mut merges = 0;
        while let Some(c) = heap.pop() {
            if self.alive <= 1 {
                break;
            }
            if !self.is_current(&c) {
                continue;
            }
            if c.weight > cutoff {
                break;
            }
            log::trace!("merge {} <- {} at {:.3}", c.a, c.b, c.weight);
            self.merge(c.a, c.b);
            merges += 1;

            let survivor = &self.regions[c.a as usize];
            let fresh: Vec<MergeCandidate> = survivor
                .neighbors
                .iter()
                .map(|(&n, boundary)| self.candidate(c.a, n, boundary))
                .collect();
            heap.extend(fresh);
        }
        merges
    }

    /// Surviving label of `label`.
    pub fn find(&self, mut label: u32) -> u32 {
        while self.parent[label as usize] != label {
            label = self.parent[label as usize];
        }
        label
    }

    /// Rewrites every pixel to the surviving label of its region.
    pub fn relabel(&self, labels: &mut LabelGrid) {
        let roots: Vec<u32> = (0..self.parent.len() as u32).map(|l| self.find(l)).collect();
        for label in labels.data_mut() {
            *label = roots[*label as usize];
        }
    }
}

/// Merges adjacent regions of `labels` in place.
///
/// The cutoff is the `threshold` percentile of the edge strength over all
/// labelled pixels. Each merged group keeps the smallest label id among its
/// members.
pub fn rag_merge_threshold(
    edges: &EdgeField,
    labels: &mut LabelGrid,
    threshold: f64,
    size_penalty: f64,
    connexity: Connexity,
) -> Result<MergeSummary> {
    let mut graph = AdjacencyGraph::from_labels(edges, labels, connexity, size_penalty)?;
    let initial_regions = graph.region_count();

    let mut strengths: Vec<f64> = edges
        .data()
        .iter()
        .zip(labels.data())
        .filter(|(_, &label)| label != 0)
        .map(|(&e, _)| e as f64)
        .collect();
    let cutoff = percentile(&mut strengths, threshold).ok_or(SegmentError::EmptyGraph)?;
    let merges = graph.merge_below(cutoff);
    graph.relabel(labels);

    let summary = MergeSummary {
        initial_regions,
        final_regions: graph.region_count(),
        merges,
        cutoff,
    };
    log::info!(
        "merged {} into {} region(s), cutoff {:.3} at percentile {}",
        summary.initial_regions,
        summary.final_regions,
        summary.cutoff,
        threshold
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::Grid;

    /// Labels laid out as vertical stripes of the given widths.
    fn stripes(widths: &[usize], height: usize) -> LabelGrid {
        let row: Vec<u32> = widths
            .iter()
            .enumerate()
            .flat_map(|(i, &w)| std::iter::repeat(i as u32 + 1).take(w))
            .collect();
        let width = row.len();
        Grid::from_vec(width, height, row.repeat(height)).unwrap()
    }

    /// Edge strength `walls[i]` on both pixels across the i-th stripe border.
    fn walls(labels: &LabelGrid, walls: &[f32]) -> EdgeField {
        let mut edges = Grid::new(labels.width(), labels.height(), 0.0f32);
        for y in 0..labels.height() {
            for x in 0..labels.width() - 1 {
                let (l, r) = (*labels.get(x, y), *labels.get(x + 1, y));
                if l != r {
                    let v = walls[l as usize - 1];
                    *edges.get_mut(x, y) = v;
                    *edges.get_mut(x + 1, y) = v;
                }
            }
        }
        edges
    }

    #[test]
    fn builds_boundaries_between_touching_labels() {
        let labels = stripes(&[2, 2, 2], 3);
        let edges = walls(&labels, &[10.0, 30.0]);
        let graph = AdjacencyGraph::from_labels(&edges, &labels, Connexity::C4, 0.0).unwrap();
        assert_eq!(graph.region_count(), 3);
        assert_eq!(graph.edge_count(), 2);
        assert_eq!(graph.boundary(1, 2).unwrap().pairs(), 3);
        assert_eq!(graph.boundary(1, 2).unwrap().mean(), 10.0);
        assert_eq!(graph.boundary(2, 3).unwrap().mean(), 30.0);
        assert!(graph.boundary(1, 3).is_none());
        assert_eq!(graph.region_size(2), Some(6));
        assert_eq!(graph.boundary_means(), vec![10.0, 30.0]);
    }

    #[test]
    fn diagonal_pairs_count_with_c8() {
        let labels = Grid::from_vec(2, 2, vec![1, 2, 3, 1]).unwrap();
        let edges = Grid::new(2, 2, 1.0f32);
        let c4 = AdjacencyGraph::from_labels(&edges, &labels, Connexity::C4, 0.0).unwrap();
        let c8 = AdjacencyGraph::from_labels(&edges, &labels, Connexity::C8, 0.0).unwrap();
        assert!(c4.boundary(2, 3).is_none());
        assert_eq!(c8.boundary(2, 3).unwrap().pairs(), 1);
    }

    #[test]
    fn empty_labels_fail() {
        let labels = Grid::new(3, 3, 0u32);
        let edges = Grid::new(3, 3, 0.0f32);
        let err = rag_merge_threshold(&edges, &mut labels.clone(), 50.0, 0.0, Connexity::C8)
            .unwrap_err();
        assert!(matches!(err, SegmentError::EmptyGraph));
    }

    #[test]
    fn merges_weakest_boundary_first() {
        let mut labels = stripes(&[2, 2, 2], 3);
        let edges = walls(&labels, &[10.0, 30.0]);
        let summary = rag_merge_threshold(&edges, &mut labels, 50.0, 0.0, Connexity::C4).unwrap();
        assert_eq!(summary.cutoff, 10.0);
        assert_eq!(summary.merges, 1);
        assert_eq!(summary.final_regions, 2);
        assert_eq!(labels.get(2, 0), labels.get(0, 0));
        assert_eq!(*labels.get(2, 0), 1);
        assert_eq!(*labels.get(5, 0), 3);
    }

    #[test]
    fn combined_boundaries_are_length_weighted() {
        /* 1 | 2 | 3 stacked over a row of 4 touching both 1 and 3 */
        let labels = Grid::from_vec(
            3,
            2,
            vec![
                1, 2, 3, //
                4, 4, 4,
            ],
        )
        .unwrap();
        let edges = Grid::from_vec(3, 2, vec![2.0, 0.0, 2.0, 6.0, 6.0, 6.0]).unwrap();
        let mut graph = AdjacencyGraph::from_labels(&edges, &labels, Connexity::C4, 0.0).unwrap();
        assert_eq!(graph.boundary(1, 4).unwrap().mean(), 4.0);
        assert_eq!(graph.boundary(2, 4).unwrap().mean(), 3.0);
        assert_eq!(graph.boundary(1, 2).unwrap().mean(), 1.0);
        graph.merge(1, 2);
        let merged = graph.boundary(1, 4).unwrap();
        assert_eq!(merged.pairs(), 2);
        assert_eq!(merged.mean(), 3.5);
        assert_eq!(graph.boundary(4, 1), Some(merged));
        assert!(graph.boundary(4, 2).is_none());
        assert_eq!(graph.find(2), 1);
    }

    #[test]
    fn size_penalty_raises_weights_of_large_pairs() {
        let labels = stripes(&[1, 1, 6], 2);
        let edges = walls(&labels, &[10.0, 10.0]);
        let graph = AdjacencyGraph::from_labels(&edges, &labels, Connexity::C4, 10.0).unwrap();
        let small = graph.weight(1, 2).unwrap();
        let large = graph.weight(2, 3).unwrap();
        assert!(large > small);
        /* (2 + 2) / 16 of the image: 10 * (1 + 10 * 0.25) */
        assert!((small - 35.0).abs() < 1e-9);
    }

    #[test]
    fn single_region_has_nothing_to_merge() {
        let mut labels = Grid::new(4, 4, 7u32);
        let edges = Grid::new(4, 4, 0.0f32);
        let summary = rag_merge_threshold(&edges, &mut labels, 100.0, 0.0, Connexity::C8).unwrap();
        assert_eq!(summary.merges, 0);
        assert_eq!(summary.final_regions, 1);
        assert!(labels.data().iter().all(|&l| l == 7));
    }

    #[test]
    fn background_never_merges() {
        let mut labels = Grid::from_vec(3, 1, vec![1, 0, 2]).unwrap();
        let edges = Grid::new(3, 1, 0.0f32);
        let summary = rag_merge_threshold(&edges, &mut labels, 100.0, 0.0, Connexity::C8).unwrap();
        assert_eq!(summary.final_regions, 2);
        assert_eq!(labels.data(), &[1, 0, 2]);
    }
}
