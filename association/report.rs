use super::config::ReportOptions;
use ndarray::{Array1, ArrayView1};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ReportError {
    #[error("expected {expected} positions, one per result, got {found}")]
    PositionCount { expected: usize, found: usize },

    #[error("a histogram needs at least one bin")]
    NoBins,
}

/// Equal-width histogram of p-values over `[0, 1]`.
#[derive(Clone, Debug, PartialEq)]
pub struct Histogram {
    pub edges: Vec<f64>,
    pub counts: Vec<usize>,
}

impl Histogram {
    pub fn total(&self) -> usize {
        self.counts.iter().sum()
    }
}

/// One point of a Manhattan plot.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ManhattanPoint {
    pub index: usize,
    pub position: f64,
    pub q_value: f64,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ReportSummary {
    pub total: usize,
    pub set: usize,
    pub unset: usize,
    pub min_p_value: Option<f64>,
}

/// Read-only projections of a result vector for plotting and export.
#[derive(Clone, Copy, Debug)]
pub struct PValueReport<'a> {
    label: &'a str,
    p_values: ArrayView1<'a, f64>,
    options: &'a ReportOptions,
}

impl<'a> PValueReport<'a> {
    pub fn new(label: &'a str, p_values: ArrayView1<'a, f64>, options: &'a ReportOptions) -> Self {
        Self {
            label,
            p_values,
            options,
        }
    }

    pub fn label(&self) -> &'a str {
        self.label
    }

    pub fn p_values(&self) -> ArrayView1<'a, f64> {
        self.p_values
    }

    /// `-scale * log10(p)` with the configured scale. Unset slots stay NaN
    /// and `p = 0` maps to infinity.
    pub fn q_values(&self) -> Array1<f64> {
        self.q_values_with_scale(self.options.q_value_scale)
    }

    pub fn q_values_with_scale(&self, scale: f64) -> Array1<f64> {
        self.p_values.mapv(|p| -scale * p.log10())
    }

    pub fn histogram(&self) -> Histogram {
        let bins = self.options.histogram_bins.max(1);
        self.build_histogram(bins)
    }

    pub fn histogram_with_bins(&self, bins: usize) -> Result<Histogram, ReportError> {
        if bins == 0 {
            return Err(ReportError::NoBins);
        }
        Ok(self.build_histogram(bins))
    }

    fn build_histogram(&self, bins: usize) -> Histogram {
        let width = 1.0 / bins as f64;
        let edges = (0..=bins).map(|k| k as f64 * width).collect();
        let mut counts = vec![0usize; bins];
        for &p in self.p_values.iter().filter(|p| (0.0..=1.0).contains(*p)) {
            let bin = ((p * bins as f64) as usize).min(bins - 1);
            counts[bin] += 1;
        }
        Histogram { edges, counts }
    }

    /// Pairs every set p-value with its position, in result order.
    pub fn manhattan(&self, positions: &[f64]) -> Result<Vec<ManhattanPoint>, ReportError> {
        if positions.len() != self.p_values.len() {
            return Err(ReportError::PositionCount {
                expected: self.p_values.len(),
                found: positions.len(),
            });
        }
        let q_values = self.q_values();
        Ok(positions
            .iter()
            .zip(q_values.iter())
            .enumerate()
            .filter(|(_, (_, q))| !q.is_nan())
            .map(|(index, (&position, &q_value))| ManhattanPoint {
                index,
                position,
                q_value,
            })
            .collect())
    }

    pub fn summary(&self) -> ReportSummary {
        let set = self.p_values.iter().filter(|p| !p.is_nan()).count();
        let min_p_value = self
            .p_values
            .iter()
            .copied()
            .filter(|p| !p.is_nan())
            .reduce(f64::min);
        ReportSummary {
            total: self.p_values.len(),
            set,
            unset: self.p_values.len() - set,
            min_p_value,
        }
    }
}
