//! Per-tree association through a Mantel test between genealogical and
//! phenotypic distances.

use super::engine::{UnitError, UnitOutcome};
use crate::genealogy::{GenealogyMatrix, LocalTree, check_psd};
use ndarray::{Array2, ArrayView1, ArrayView2};
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const DEFAULT_PERMUTATIONS: usize = 999;
pub const DEFAULT_SEED: u64 = 42;

/// Permuted statistics within this distance of the observed one count as
/// at least as extreme. Permutations that map the matrix onto itself sum
/// the same terms in a different order.
const TIE_EPSILON: f64 = 1.0e-12;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CorrelationMethod {
    #[default]
    Pearson,
    Spearman,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Alternative {
    #[default]
    TwoSided,
    Greater,
    Less,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MantelOptions {
    pub permutations: usize,
    /// Every tree is permuted with a generator seeded from this value, so
    /// identical inputs give identical p-values.
    pub seed: u64,
    pub method: CorrelationMethod,
    pub alternative: Alternative,
    /// Check that each tree's covariance is PSD before testing it.
    pub verify_covariance: bool,
}

impl Default for MantelOptions {
    fn default() -> Self {
        Self {
            permutations: DEFAULT_PERMUTATIONS,
            seed: DEFAULT_SEED,
            method: CorrelationMethod::default(),
            alternative: Alternative::default(),
            verify_covariance: true,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct MantelResult {
    pub statistic: f64,
    pub p_value: f64,
    pub permutations: usize,
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum MantelError {
    #[error("distance matrix must be square, got {rows}x{cols}")]
    NotSquare { rows: usize, cols: usize },

    #[error("distance matrices differ in size ({left} vs {right})")]
    SizeMismatch { left: usize, right: usize },

    #[error("a Mantel test needs at least 3 objects, got {0}")]
    TooFewObjects(usize),

    #[error("a Mantel test needs at least one permutation")]
    NoPermutations,

    #[error("distance matrix contains non-finite entries")]
    NonFinite,
}

/// Absolute pairwise differences `|y_i - y_j|`.
pub fn phenotype_distances(values: ArrayView1<'_, f64>) -> Array2<f64> {
    let n = values.len();
    Array2::from_shape_fn((n, n), |(i, j)| (values[i] - values[j]).abs())
}

/// Mantel test of association between two symmetric distance matrices.
///
/// The statistic is the Pearson (or Spearman) correlation of the upper
/// triangles. Significance comes from permuting rows and columns of `x`
/// together. Returns `Ok(None)` when either matrix has constant
/// off-diagonal entries, since the correlation is undefined there.
pub fn mantel_test(
    x: ArrayView2<'_, f64>,
    y: ArrayView2<'_, f64>,
    options: &MantelOptions,
) -> Result<Option<MantelResult>, MantelError> {
    let n = square_size(x)?;
    let m = square_size(y)?;
    if n != m {
        return Err(MantelError::SizeMismatch { left: n, right: m });
    }
    if n < 3 {
        return Err(MantelError::TooFewObjects(n));
    }
    if options.permutations == 0 {
        return Err(MantelError::NoPermutations);
    }

    let mut flat_x = upper_triangle(x);
    let mut flat_y = upper_triangle(y);
    if flat_x.iter().chain(flat_y.iter()).any(|v| !v.is_finite()) {
        return Err(MantelError::NonFinite);
    }
    if options.method == CorrelationMethod::Spearman {
        flat_x = average_ranks(&flat_x);
        flat_y = average_ranks(&flat_y);
    }

    let Some(std_x) = standardize(&flat_x) else {
        return Ok(None);
    };
    let Some(std_y) = standardize(&flat_y) else {
        return Ok(None);
    };

    // Standardized x laid back into a symmetric matrix for permuted lookups.
    let mut x_matrix = Array2::<f64>::zeros((n, n));
    let mut k = 0;
    for i in 0..n {
        for j in (i + 1)..n {
            x_matrix[[i, j]] = std_x[k];
            x_matrix[[j, i]] = std_x[k];
            k += 1;
        }
    }

    let mut order: Vec<usize> = (0..n).collect();
    let statistic = permuted_correlation(&x_matrix, &std_y, &order);

    let mut rng = StdRng::seed_from_u64(options.seed);
    let mut extreme = 0usize;
    for _ in 0..options.permutations {
        order.shuffle(&mut rng);
        let permuted = permuted_correlation(&x_matrix, &std_y, &order);
        let as_extreme = match options.alternative {
            Alternative::TwoSided => permuted.abs() >= statistic.abs() - TIE_EPSILON,
            Alternative::Greater => permuted >= statistic - TIE_EPSILON,
            Alternative::Less => permuted <= statistic + TIE_EPSILON,
        };
        if as_extreme {
            extreme += 1;
        }
    }

    let p_value = (extreme as f64 + 1.0) / (options.permutations as f64 + 1.0);
    Ok(Some(MantelResult {
        statistic,
        p_value,
        permutations: options.permutations,
    }))
}

/// Runs the Mantel test for one local tree against precomputed phenotype
/// distances.
pub(crate) fn evaluate_tree<T: LocalTree>(
    tree: &T,
    distances: ArrayView2<'_, f64>,
    options: &MantelOptions,
    psd_tolerance: f64,
) -> Result<UnitOutcome, UnitError> {
    if tree.total_branch_length() == 0.0 {
        return Ok(UnitOutcome::Skipped);
    }
    let genealogy = GenealogyMatrix::from_tree(tree)?;
    if options.verify_covariance {
        check_psd(genealogy.covariance().view(), psd_tolerance)?;
    }
    match mantel_test(genealogy.tmrca(), distances, options)? {
        Some(result) => Ok(UnitOutcome::Tested(result.p_value)),
        None => Ok(UnitOutcome::Undefined),
    }
}

fn square_size(matrix: ArrayView2<'_, f64>) -> Result<usize, MantelError> {
    let (rows, cols) = matrix.dim();
    if rows != cols {
        return Err(MantelError::NotSquare { rows, cols });
    }
    Ok(rows)
}

fn upper_triangle(matrix: ArrayView2<'_, f64>) -> Vec<f64> {
    let n = matrix.nrows();
    let mut flat = Vec::with_capacity(n * n.saturating_sub(1) / 2);
    for i in 0..n {
        for j in (i + 1)..n {
            flat.push(matrix[[i, j]]);
        }
    }
    flat
}

/// Centers and scales to unit norm; `None` for constant input.
fn standardize(values: &[f64]) -> Option<Vec<f64>> {
    let mean = values.iter().sum::<f64>() / values.len() as f64;
    let centered: Vec<f64> = values.iter().map(|v| v - mean).collect();
    let norm = centered.iter().map(|v| v * v).sum::<f64>().sqrt();
    if !(norm > 0.0) || !norm.is_finite() {
        return None;
    }
    Some(centered.into_iter().map(|v| v / norm).collect())
}

fn permuted_correlation(x_matrix: &Array2<f64>, std_y: &[f64], order: &[usize]) -> f64 {
    let n = order.len();
    let mut sum = 0.0;
    let mut k = 0;
    for i in 0..n {
        let row = x_matrix.row(order[i]);
        for j in (i + 1)..n {
            sum += row[order[j]] * std_y[k];
            k += 1;
        }
    }
    sum
}

/// Ranks starting at 1, ties share their average rank.
fn average_ranks(values: &[f64]) -> Vec<f64> {
    let mut order: Vec<usize> = (0..values.len()).collect();
    order.sort_by(|&a, &b| values[a].total_cmp(&values[b]));

    let mut ranks = vec![0.0; values.len()];
    let mut start = 0;
    while start < order.len() {
        let mut end = start + 1;
        while end < order.len() && values[order[end]] == values[order[start]] {
            end += 1;
        }
        let rank = (start + end + 1) as f64 / 2.0;
        for &index in &order[start..end] {
            ranks[index] = rank;
        }
        start = end;
    }
    ranks
}
