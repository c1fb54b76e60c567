#![deny(unused_variables)]
#![deny(dead_code)]
#![deny(unused_imports)]
#![deny(clippy::no_effect_underscore_binding)]

pub mod config;
pub mod engine;
pub mod mantel;
pub mod ols;
pub mod phenotype;
pub mod progress;
pub mod report;

#[path = "../genealogy/mod.rs"]
pub mod genealogy;

#[path = "../variants/mod.rs"]
pub mod variants;

pub use config::{AssociationConfig, ConfigError, FailurePolicy, ReportOptions};
pub use engine::{
    AssociationEngine, AssociationError, CompatibilityError, RunSummary, TestMode, UNSET,
    UnitError, UnitFailure, check_compatibility,
};
pub use mantel::{Alternative, CorrelationMethod, MantelOptions, MantelResult, mantel_test};
pub use ols::{OlsFit, RegressionOptions, fit_genotype};
pub use phenotype::{AnalysisUnit, Phenotype, PhenotypeSource};
pub use progress::{NoopProgress, ProgressBarObserver, ProgressObserver};
pub use report::{Histogram, ManhattanPoint, PValueReport, ReportSummary};
