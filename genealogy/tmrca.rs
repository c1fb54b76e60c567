use super::tree::{LocalTree, TreeError};
use ndarray::{Array2, ArrayView2};

/// Pairwise TMRCA matrix of one local tree together with the tree height.
///
/// The matrix is built by visiting every node once and subtracting the
/// branch above it from all pairs of samples below it. Once the height is
/// known it is added back, which leaves each pair with the age of its most
/// recent common ancestor. Samples that descend from the same node share the
/// whole ancestral path above that node, so every shared branch is removed
/// exactly once per pair.
#[derive(Clone, Debug)]
pub struct GenealogyMatrix {
    tmrca: Array2<f64>,
    height: f64,
}

impl GenealogyMatrix {
    pub fn from_tree<T: LocalTree>(tree: &T) -> Result<Self, TreeError> {
        let n = tree.num_samples();
        let mut acc = Array2::<f64>::zeros((n, n));
        let mut height = 0.0_f64;

        for node in tree.nodes() {
            let below = tree.samples(node);
            if below.is_empty() {
                continue;
            }
            if let Some(&sample) = below.iter().find(|&&sample| sample >= n) {
                return Err(TreeError::SampleOutOfRange {
                    sample,
                    num_samples: n,
                });
            }
            let Some(parent) = tree.parent(node) else {
                continue;
            };
            let parent_time = tree.time(parent);
            height = height.max(parent_time);

            let time = tree.time(node);
            if below.len() == n || time == 0.0 {
                continue;
            }
            let branch = parent_time - time;
            for &i in below {
                let mut row = acc.row_mut(i);
                for &j in below {
                    row[j] -= branch;
                }
            }
        }

        acc += height;
        acc.diag_mut().fill(0.0);
        let tmrca = (&acc + &acc.t()) * 0.5;

        Ok(Self { tmrca, height })
    }

    pub fn num_samples(&self) -> usize {
        self.tmrca.nrows()
    }

    pub fn tmrca(&self) -> ArrayView2<'_, f64> {
        self.tmrca.view()
    }

    /// Age of the oldest coalescence seen during the traversal.
    pub fn height(&self) -> f64 {
        self.height
    }

    /// Shared ancestry between samples: `height - tmrca`.
    pub fn covariance(&self) -> Array2<f64> {
        self.tmrca.mapv(|t| self.height - t)
    }

    pub fn into_tmrca(self) -> Array2<f64> {
        self.tmrca
    }
}
