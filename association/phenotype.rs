use ndarray::{Array1, ArrayView1};
use serde::{Deserialize, Serialize};
use std::fmt;

/// What one entry of a result vector refers to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisUnit {
    Tree,
    Variant,
}

impl AnalysisUnit {
    pub fn describe(self) -> &'static str {
        match self {
            Self::Tree => "tree",
            Self::Variant => "variant",
        }
    }
}

impl fmt::Display for AnalysisUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.describe())
    }
}

/// Phenotype values for the sampled haplotypes, in sample order.
pub trait PhenotypeSource {
    fn values(&self) -> ArrayView1<'_, f64>;

    /// Sample count the phenotype was generated for.
    fn num_samples(&self) -> usize;

    /// Number of trees or variants the phenotype was generated against.
    fn num_units(&self, unit: AnalysisUnit) -> usize;

    /// Label used by reports.
    fn name(&self) -> &str;
}

#[derive(Clone, Debug)]
pub struct Phenotype {
    name: String,
    values: Array1<f64>,
    num_trees: usize,
    num_variants: usize,
}

impl Phenotype {
    pub fn new(
        name: impl Into<String>,
        values: Array1<f64>,
        num_trees: usize,
        num_variants: usize,
    ) -> Self {
        Self {
            name: name.into(),
            values,
            num_trees,
            num_variants,
        }
    }
}

impl PhenotypeSource for Phenotype {
    fn values(&self) -> ArrayView1<'_, f64> {
        self.values.view()
    }

    fn num_samples(&self) -> usize {
        self.values.len()
    }

    fn num_units(&self, unit: AnalysisUnit) -> usize {
        match unit {
            AnalysisUnit::Tree => self.num_trees,
            AnalysisUnit::Variant => self.num_variants,
        }
    }

    fn name(&self) -> &str {
        &self.name
    }
}
