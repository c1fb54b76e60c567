use std::fmt;
use thiserror::Error;

/// Index of a node inside a tree's node arena.
pub type NodeId = usize;

/// Genomic span `[left, right)` covered by one local tree.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Interval {
    pub left: f64,
    pub right: f64,
}

impl Interval {
    pub fn new(left: f64, right: f64) -> Result<Self, TreeError> {
        if !(left.is_finite() && right.is_finite()) || left >= right {
            return Err(TreeError::InvalidInterval { left, right });
        }
        Ok(Self { left, right })
    }

    pub fn span(&self) -> f64 {
        self.right - self.left
    }

    pub fn midpoint(&self) -> f64 {
        0.5 * (self.left + self.right)
    }

    pub fn contains(&self, position: f64) -> bool {
        position >= self.left && position < self.right
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.left, self.right)
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum TreeError {
    #[error("tree interval [{left}, {right}) is empty or not finite")]
    InvalidInterval { left: f64, right: f64 },

    #[error("a tree must contain at least one sample")]
    NoSamples,

    #[error("node {node} refers to parent {parent}, but the tree only has {num_nodes} nodes")]
    ParentOutOfRange {
        node: NodeId,
        parent: NodeId,
        num_nodes: usize,
    },

    #[error("node {node} has time {time}, which is not a finite non-negative value")]
    InvalidTime { node: NodeId, time: f64 },

    #[error("node {node} (time {child_time}) is older than its parent {parent} (time {parent_time})")]
    ParentYoungerThanChild {
        node: NodeId,
        parent: NodeId,
        child_time: f64,
        parent_time: f64,
    },

    #[error("the parent links starting at node {node} form a cycle")]
    Cycle { node: NodeId },

    #[error("sample id {sample} is out of range for a tree with {num_samples} samples")]
    SampleOutOfRange { sample: usize, num_samples: usize },

    #[error("sample {sample} is attached to more than one node")]
    DuplicateSample { sample: usize },

    #[error("sample {sample} is not attached to any node")]
    MissingSample { sample: usize },
}

/// Read access to one local tree.
///
/// Implementations expose the node table of a single genealogy: the age of
/// every node, its parent, and the samples below it. Times grow backwards
/// in time and sample leaves sit at time zero.
pub trait LocalTree {
    fn num_samples(&self) -> usize;

    /// Every node of the tree, in any order.
    fn nodes(&self) -> impl Iterator<Item = NodeId> + '_;

    fn time(&self, node: NodeId) -> f64;

    fn parent(&self, node: NodeId) -> Option<NodeId>;

    /// Sample ids descending from `node`, including the node itself when it
    /// is a sample.
    fn samples(&self, node: NodeId) -> &[usize];

    fn total_branch_length(&self) -> f64;

    fn interval(&self) -> Interval;
}

/// One row of a node table.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct NodeRecord {
    pub time: f64,
    pub parent: Option<NodeId>,
    pub sample: Option<usize>,
}

impl NodeRecord {
    pub fn sample(sample: usize, parent: Option<NodeId>) -> Self {
        Self {
            time: 0.0,
            parent,
            sample: Some(sample),
        }
    }

    pub fn internal(time: f64, parent: Option<NodeId>) -> Self {
        Self {
            time,
            parent,
            sample: None,
        }
    }
}

/// Arena-backed local tree with precomputed sample descendant sets.
#[derive(Clone, Debug)]
pub struct Tree {
    interval: Interval,
    nodes: Vec<NodeRecord>,
    descendants: Vec<Vec<usize>>,
    num_samples: usize,
    total_branch_length: f64,
}

impl Tree {
    pub fn new(
        interval: Interval,
        nodes: Vec<NodeRecord>,
        num_samples: usize,
    ) -> Result<Self, TreeError> {
        if num_samples == 0 {
            return Err(TreeError::NoSamples);
        }
        let num_nodes = nodes.len();
        let mut sample_nodes: Vec<Option<NodeId>> = vec![None; num_samples];

        for (node, record) in nodes.iter().enumerate() {
            if !record.time.is_finite() || record.time < 0.0 {
                return Err(TreeError::InvalidTime {
                    node,
                    time: record.time,
                });
            }
            if let Some(parent) = record.parent {
                if parent >= num_nodes {
                    return Err(TreeError::ParentOutOfRange {
                        node,
                        parent,
                        num_nodes,
                    });
                }
                let parent_time = nodes[parent].time;
                if parent_time < record.time {
                    return Err(TreeError::ParentYoungerThanChild {
                        node,
                        parent,
                        child_time: record.time,
                        parent_time,
                    });
                }
            }
            if let Some(sample) = record.sample {
                let slot = sample_nodes
                    .get_mut(sample)
                    .ok_or(TreeError::SampleOutOfRange {
                        sample,
                        num_samples,
                    })?;
                if slot.is_some() {
                    return Err(TreeError::DuplicateSample { sample });
                }
                *slot = Some(node);
            }
        }

        // A valid ancestry walk visits at most `num_nodes` edges.
        for start in 0..num_nodes {
            let mut steps = 0usize;
            let mut cursor = nodes[start].parent;
            while let Some(node) = cursor {
                steps += 1;
                if steps > num_nodes {
                    return Err(TreeError::Cycle { node: start });
                }
                cursor = nodes[node].parent;
            }
        }

        let mut descendants: Vec<Vec<usize>> = vec![Vec::new(); num_nodes];
        for (sample, node) in sample_nodes.iter().enumerate() {
            let node = node.ok_or(TreeError::MissingSample { sample })?;
            let mut cursor = Some(node);
            while let Some(current) = cursor {
                descendants[current].push(sample);
                cursor = nodes[current].parent;
            }
        }

        let total_branch_length = nodes
            .iter()
            .zip(descendants.iter())
            .filter(|(_, below)| !below.is_empty())
            .filter_map(|(record, _)| record.parent.map(|p| nodes[p].time - record.time))
            .sum();

        Ok(Self {
            interval,
            nodes,
            descendants,
            num_samples,
            total_branch_length,
        })
    }

    pub fn num_nodes(&self) -> usize {
        self.nodes.len()
    }

    pub fn node(&self, node: NodeId) -> &NodeRecord {
        &self.nodes[node]
    }

    /// Nodes without a parent that carry at least one sample.
    pub fn roots(&self) -> Vec<NodeId> {
        (0..self.nodes.len())
            .filter(|&node| self.nodes[node].parent.is_none() && !self.descendants[node].is_empty())
            .collect()
    }
}

impl LocalTree for Tree {
    fn num_samples(&self) -> usize {
        self.num_samples
    }

    fn nodes(&self) -> impl Iterator<Item = NodeId> + '_ {
        0..self.nodes.len()
    }

    fn time(&self, node: NodeId) -> f64 {
        self.nodes[node].time
    }

    fn parent(&self, node: NodeId) -> Option<NodeId> {
        self.nodes[node].parent
    }

    fn samples(&self, node: NodeId) -> &[usize] {
        &self.descendants[node]
    }

    fn total_branch_length(&self) -> f64 {
        self.total_branch_length
    }

    fn interval(&self) -> Interval {
        self.interval
    }
}
