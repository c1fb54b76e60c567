use super::tree::{Interval, LocalTree, Tree};
use ndarray::Array1;
use thiserror::Error;

/// A segregating site and its per-sample allele dosages.
#[derive(Clone, Debug, PartialEq)]
pub struct Site {
    pub position: f64,
    pub genotypes: Array1<f64>,
}

impl Site {
    pub fn new(position: f64, genotypes: Array1<f64>) -> Self {
        Self {
            position,
            genotypes,
        }
    }
}

/// Ordered collection of local trees and sites over one genome.
pub trait TreeSequence {
    type Tree: LocalTree + Sync;

    fn num_samples(&self) -> usize;

    fn num_trees(&self) -> usize;

    /// Local trees in genome order.
    fn trees(&self) -> impl Iterator<Item = &Self::Tree> + '_;

    fn num_sites(&self) -> usize;

    /// Sites in genome order.
    fn sites(&self) -> impl Iterator<Item = &Site> + '_;

    /// Left coordinates of every tree followed by the right end of the last.
    fn breakpoints(&self) -> Vec<f64> {
        let mut points: Vec<f64> = self.trees().map(|tree| tree.interval().left).collect();
        if let Some(last) = self.trees().last() {
            points.push(last.interval().right);
        }
        points
    }

    /// Index of the tree whose interval covers `position`.
    fn tree_index_at(&self, position: f64) -> Option<usize> {
        self.trees()
            .position(|tree| tree.interval().contains(position))
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SequenceError {
    #[error("a tree sequence needs at least one tree")]
    NoTrees,

    #[error("tree {index} has {found} samples, expected {expected}")]
    SampleCount {
        index: usize,
        expected: usize,
        found: usize,
    },

    #[error("tree {index} starts at {left} but the previous tree ends at {previous_right}")]
    NonContiguous {
        index: usize,
        left: f64,
        previous_right: f64,
    },

    #[error("site {index} has {found} genotypes, expected {expected}")]
    GenotypeLength {
        index: usize,
        expected: usize,
        found: usize,
    },

    #[error("site {index} at position {position} lies outside the sequence {span}")]
    SiteOutOfRange {
        index: usize,
        position: f64,
        span: Interval,
    },

    #[error("site {index} at position {position} is not after the preceding site")]
    UnorderedSite { index: usize, position: f64 },
}

/// In-memory tree sequence backed by [`Tree`] arenas.
#[derive(Clone, Debug)]
pub struct TreeSequenceData {
    num_samples: usize,
    trees: Vec<Tree>,
    sites: Vec<Site>,
}

impl TreeSequenceData {
    pub fn new(trees: Vec<Tree>, sites: Vec<Site>) -> Result<Self, SequenceError> {
        let first = trees.first().ok_or(SequenceError::NoTrees)?;
        let num_samples = first.num_samples();

        let mut previous_right: Option<f64> = None;
        for (index, tree) in trees.iter().enumerate() {
            if tree.num_samples() != num_samples {
                return Err(SequenceError::SampleCount {
                    index,
                    expected: num_samples,
                    found: tree.num_samples(),
                });
            }
            let interval = tree.interval();
            match previous_right {
                Some(right) if interval.left != right => {
                    return Err(SequenceError::NonContiguous {
                        index,
                        left: interval.left,
                        previous_right: right,
                    });
                }
                _ => {}
            }
            previous_right = Some(interval.right);
        }

        let span = Interval {
            left: first.interval().left,
            right: previous_right.unwrap_or(first.interval().right),
        };
        let mut previous_position: Option<f64> = None;
        for (index, site) in sites.iter().enumerate() {
            if site.genotypes.len() != num_samples {
                return Err(SequenceError::GenotypeLength {
                    index,
                    expected: num_samples,
                    found: site.genotypes.len(),
                });
            }
            if !span.contains(site.position) {
                return Err(SequenceError::SiteOutOfRange {
                    index,
                    position: site.position,
                    span,
                });
            }
            if previous_position.is_some_and(|previous| site.position <= previous) {
                return Err(SequenceError::UnorderedSite {
                    index,
                    position: site.position,
                });
            }
            previous_position = Some(site.position);
        }

        Ok(Self {
            num_samples,
            trees,
            sites,
        })
    }

    pub fn tree(&self, index: usize) -> Option<&Tree> {
        self.trees.get(index)
    }

    pub fn site(&self, index: usize) -> Option<&Site> {
        self.sites.get(index)
    }

    pub fn sequence_length(&self) -> f64 {
        self.trees
            .last()
            .map(|tree| tree.interval().right)
            .unwrap_or(0.0)
    }
}

impl TreeSequence for TreeSequenceData {
    type Tree = Tree;

    fn num_samples(&self) -> usize {
        self.num_samples
    }

    fn num_trees(&self) -> usize {
        self.trees.len()
    }

    fn trees(&self) -> impl Iterator<Item = &Tree> + '_ {
        self.trees.iter()
    }

    fn num_sites(&self) -> usize {
        self.sites.len()
    }

    fn sites(&self) -> impl Iterator<Item = &Site> + '_ {
        self.sites.iter()
    }

    fn tree_index_at(&self, position: f64) -> Option<usize> {
        // Trees are contiguous and sorted, so a binary search on the left
        // coordinates is enough.
        let upper = self
            .trees
            .partition_point(|tree| tree.interval().left <= position);
        let index = upper.checked_sub(1)?;
        self.trees[index]
            .interval()
            .contains(position)
            .then_some(index)
    }
}
