//! Site summaries over a tree sequence: minor allele frequencies, typed
//! status, and frequency-targeted site lookup.

pub mod search;
pub mod summary;

pub use search::{FREQUENCY_STEP, MAX_MINOR_ALLELE_FREQUENCY, VariantHit, VariantQuery};
pub use summary::{TypingFilter, VariantSummary, VariantTable, minor_allele_frequency};

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum VariantError {
    #[error("allele frequency bounds [{min}, {max}] must be ordered and lie in [0, 1]")]
    InvalidFrequencyBounds { min: f64, max: f64 },

    #[error("proportion of typed sites must lie in [0, 1], got {0}")]
    InvalidProportion(f64),

    #[error("site {index} at position {position} is not covered by any tree")]
    SiteOutsideTrees { index: usize, position: f64 },

    #[error("invalid variant query: {0}")]
    InvalidQuery(String),

    #[error("no sites in the interval [{left}, {right}]")]
    NoVariantsInInterval { left: f64, right: f64 },

    #[error("no sites with typed = {typed} in the interval [{left}, {right}]")]
    NoVariantsWithStatus { typed: bool, left: f64, right: f64 },

    #[error("no site with a minor allele frequency near {target}")]
    FrequencyNotFound { target: f64 },
}
