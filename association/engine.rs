use super::config::{AssociationConfig, ConfigError, FailurePolicy};
use super::mantel::{self, MantelError, phenotype_distances};
use super::ols::{self, RegressionError};
use super::phenotype::{AnalysisUnit, PhenotypeSource};
use super::progress::{NoopProgress, ProgressObserver};
use super::report::PValueReport;
use crate::genealogy::{LocalTree, Site, StabilityError, TreeError, TreeSequence};
use ndarray::{Array1, ArrayView1};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Value held by a result slot that has not received a p-value.
pub const UNSET: f64 = f64::NAN;

/// Which association test the engine runs.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TestMode {
    /// Mantel test of genealogical against phenotypic distance, one per tree.
    PerTree,
    /// Least-squares test of genotype against phenotype, one per site.
    PerSite,
}

impl TestMode {
    pub fn unit(self) -> AnalysisUnit {
        match self {
            Self::PerTree => AnalysisUnit::Tree,
            Self::PerSite => AnalysisUnit::Variant,
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum CompatibilityError {
    #[error(
        "phenotype '{name}' was built for {phenotype} {unit}s but the tree sequence has {tree_sequence}"
    )]
    UnitCount {
        name: String,
        unit: AnalysisUnit,
        phenotype: usize,
        tree_sequence: usize,
    },

    #[error(
        "phenotype '{name}' was built for {phenotype} samples but the tree sequence has {tree_sequence}"
    )]
    SampleCount {
        name: String,
        phenotype: usize,
        tree_sequence: usize,
    },

    #[error("phenotype '{name}' declares {declared} samples but holds {actual} values")]
    PhenotypeLength {
        name: String,
        declared: usize,
        actual: usize,
    },
}

/// Failure of a single tree or site.
#[derive(Error, Debug)]
pub enum UnitError {
    #[error(transparent)]
    Tree(#[from] TreeError),

    #[error(transparent)]
    Stability(#[from] StabilityError),

    #[error(transparent)]
    Mantel(#[from] MantelError),

    #[error(transparent)]
    Regression(#[from] RegressionError),
}

#[derive(Error, Debug)]
pub enum AssociationError {
    #[error(transparent)]
    Compatibility(#[from] CompatibilityError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("association results are write-once and this test has already run")]
    AlreadyRun,

    #[error("{unit} {index} failed: {source}")]
    Unit {
        unit: AnalysisUnit,
        index: usize,
        #[source]
        source: UnitError,
    },
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) enum UnitOutcome {
    Tested(f64),
    /// Zero total branch length: nothing to test.
    Skipped,
    /// The statistic is undefined for this input (constant distances or
    /// genotypes).
    Undefined,
}

#[derive(Debug)]
pub struct UnitFailure {
    pub index: usize,
    pub error: UnitError,
}

#[derive(Debug, Default)]
pub struct RunSummary {
    pub tested: usize,
    pub skipped: usize,
    pub undefined: usize,
    pub failures: Vec<UnitFailure>,
}

/// Checks that a phenotype lines up with a tree sequence for the given unit.
pub fn check_compatibility<S, P>(
    tree_sequence: &S,
    phenotype: &P,
    unit: AnalysisUnit,
) -> Result<(), CompatibilityError>
where
    S: TreeSequence,
    P: PhenotypeSource + ?Sized,
{
    let expected_units = match unit {
        AnalysisUnit::Tree => tree_sequence.num_trees(),
        AnalysisUnit::Variant => tree_sequence.num_sites(),
    };
    let declared_units = phenotype.num_units(unit);
    if declared_units != expected_units {
        return Err(CompatibilityError::UnitCount {
            name: phenotype.name().to_string(),
            unit,
            phenotype: declared_units,
            tree_sequence: expected_units,
        });
    }
    if phenotype.num_samples() != tree_sequence.num_samples() {
        return Err(CompatibilityError::SampleCount {
            name: phenotype.name().to_string(),
            phenotype: phenotype.num_samples(),
            tree_sequence: tree_sequence.num_samples(),
        });
    }
    let actual = phenotype.values().len();
    if actual != phenotype.num_samples() {
        return Err(CompatibilityError::PhenotypeLength {
            name: phenotype.name().to_string(),
            declared: phenotype.num_samples(),
            actual,
        });
    }
    Ok(())
}

/// Association test over every tree or every site of a tree sequence.
///
/// Holds the phenotype and tree sequence by reference and owns the result
/// vector, which is sized at construction, starts out filled with
/// [`UNSET`], and is written at most once per slot.
pub struct AssociationEngine<'a, S, P>
where
    S: TreeSequence,
    P: PhenotypeSource,
{
    tree_sequence: &'a S,
    phenotype: &'a P,
    mode: TestMode,
    config: AssociationConfig,
    p_values: Array1<f64>,
    completed: bool,
}

impl<'a, S, P> AssociationEngine<'a, S, P>
where
    S: TreeSequence,
    P: PhenotypeSource,
{
    pub fn new(
        tree_sequence: &'a S,
        phenotype: &'a P,
        mode: TestMode,
        config: AssociationConfig,
    ) -> Result<Self, AssociationError> {
        config.validate()?;
        let unit = mode.unit();
        check_compatibility(tree_sequence, phenotype, unit)?;

        let n = tree_sequence.num_samples();
        match mode {
            TestMode::PerTree if n < 3 => {
                return Err(AssociationError::InvalidInput(format!(
                    "per-tree Mantel tests need at least 3 samples, got {n}"
                )));
            }
            TestMode::PerSite if n <= config.regression.parameter_count() => {
                return Err(AssociationError::InvalidInput(format!(
                    "per-site regression with {} parameters needs more than {n} samples",
                    config.regression.parameter_count()
                )));
            }
            _ => {}
        }

        let num_units = phenotype.num_units(unit);
        log::debug!(
            "prepared {} association for phenotype '{}' over {} {}s and {} samples",
            match mode {
                TestMode::PerTree => "Mantel",
                TestMode::PerSite => "OLS",
            },
            phenotype.name(),
            num_units,
            unit,
            n
        );

        Ok(Self {
            tree_sequence,
            phenotype,
            mode,
            config,
            p_values: Array1::from_elem(num_units, UNSET),
            completed: false,
        })
    }

    pub fn per_tree(
        tree_sequence: &'a S,
        phenotype: &'a P,
        config: AssociationConfig,
    ) -> Result<Self, AssociationError> {
        Self::new(tree_sequence, phenotype, TestMode::PerTree, config)
    }

    pub fn per_site(
        tree_sequence: &'a S,
        phenotype: &'a P,
        config: AssociationConfig,
    ) -> Result<Self, AssociationError> {
        Self::new(tree_sequence, phenotype, TestMode::PerSite, config)
    }

    pub fn mode(&self) -> TestMode {
        self.mode
    }

    pub fn unit(&self) -> AnalysisUnit {
        self.mode.unit()
    }

    pub fn num_units(&self) -> usize {
        self.p_values.len()
    }

    pub fn config(&self) -> &AssociationConfig {
        &self.config
    }

    /// Phenotype name, used as the label of every report.
    pub fn label(&self) -> &str {
        self.phenotype.name()
    }

    /// One p-value per unit in tree or site order; [`UNSET`] where no
    /// p-value was produced.
    pub fn p_values(&self) -> ArrayView1<'_, f64> {
        self.p_values.view()
    }

    pub fn is_complete(&self) -> bool {
        self.completed
    }

    /// Genomic coordinate of every unit, parallel to [`Self::p_values`]:
    /// tree midpoints for per-tree tests, site positions for per-site tests.
    pub fn unit_positions(&self) -> Vec<f64> {
        match self.mode {
            TestMode::PerTree => self
                .tree_sequence
                .trees()
                .map(|tree| tree.interval().midpoint())
                .collect(),
            TestMode::PerSite => self
                .tree_sequence
                .sites()
                .map(|site| site.position)
                .collect(),
        }
    }

    pub fn report(&self) -> PValueReport<'_> {
        PValueReport::new(self.phenotype.name(), self.p_values.view(), &self.config.report)
    }

    pub fn run(&mut self) -> Result<RunSummary, AssociationError> {
        self.run_with_progress(&NoopProgress)
    }

    pub fn run_with_progress<O>(&mut self, observer: &O) -> Result<RunSummary, AssociationError>
    where
        O: ProgressObserver + ?Sized,
    {
        if self.completed {
            return Err(AssociationError::AlreadyRun);
        }
        let unit = self.unit();
        let tree_sequence = self.tree_sequence;
        let phenotype_source = self.phenotype;
        let phenotype = phenotype_source.values();
        let parallel = self.config.parallel;

        log::info!(
            "running {} {} association tests for phenotype '{}'",
            self.num_units(),
            unit,
            self.phenotype.name()
        );
        observer.on_start(unit, self.num_units());

        let outcomes = match self.mode {
            TestMode::PerTree => {
                let trees: Vec<&S::Tree> = tree_sequence.trees().collect();
                self.ensure_unit_count(trees.len())?;
                let distances = phenotype_distances(phenotype);
                let distances = distances.view();
                let options = &self.config.mantel;
                let tolerance = self.config.psd_tolerance;
                evaluate_units(&trees, parallel, unit, observer, |tree| {
                    mantel::evaluate_tree(*tree, distances, options, tolerance)
                })
            }
            TestMode::PerSite => {
                let sites: Vec<&Site> = tree_sequence.sites().collect();
                self.ensure_unit_count(sites.len())?;
                let options = &self.config.regression;
                evaluate_units(&sites, parallel, unit, observer, |site| {
                    ols::evaluate_site(site.genotypes.view(), phenotype, options)
                })
            }
        };

        let summary = self.commit(outcomes)?;
        observer.on_finish(unit);
        log::info!(
            "{} {}s tested, {} skipped for zero branch length, {} undefined, {} failed",
            summary.tested,
            unit,
            summary.skipped,
            summary.undefined,
            summary.failures.len()
        );
        Ok(summary)
    }

    fn ensure_unit_count(&self, found: usize) -> Result<(), AssociationError> {
        if found != self.num_units() {
            return Err(AssociationError::InvalidInput(format!(
                "tree sequence yielded {found} {}s but declares {}",
                self.unit(),
                self.num_units()
            )));
        }
        Ok(())
    }

    /// Writes outcomes into their slots, or aborts without writing anything.
    fn commit(
        &mut self,
        mut outcomes: Vec<Result<UnitOutcome, UnitError>>,
    ) -> Result<RunSummary, AssociationError> {
        let unit = self.unit();
        if self.config.failure_policy == FailurePolicy::Abort {
            if let Some(index) = outcomes.iter().position(Result::is_err) {
                if let Err(source) = outcomes.swap_remove(index) {
                    log::error!("{unit} {index} failed, aborting the run: {source}");
                    return Err(AssociationError::Unit {
                        unit,
                        index,
                        source,
                    });
                }
            }
        }

        let mut summary = RunSummary::default();
        for (index, outcome) in outcomes.into_iter().enumerate() {
            match outcome {
                Ok(UnitOutcome::Tested(p_value)) => {
                    self.p_values[index] = p_value;
                    summary.tested += 1;
                }
                Ok(UnitOutcome::Skipped) => {
                    log::debug!("{unit} {index} has zero total branch length, left unset");
                    summary.skipped += 1;
                }
                Ok(UnitOutcome::Undefined) => {
                    log::debug!("{unit} {index} has an undefined statistic, left unset");
                    summary.undefined += 1;
                }
                Err(error) => {
                    log::warn!("{unit} {index} failed and was left unset: {error}");
                    summary.failures.push(UnitFailure { index, error });
                }
            }
        }
        self.completed = true;
        Ok(summary)
    }
}

fn evaluate_units<U, O, F>(
    items: &[U],
    parallel: bool,
    unit: AnalysisUnit,
    observer: &O,
    evaluate: F,
) -> Vec<Result<UnitOutcome, UnitError>>
where
    U: Sync,
    O: ProgressObserver + ?Sized,
    F: Fn(&U) -> Result<UnitOutcome, UnitError> + Sync,
{
    let run_one = |(index, item): (usize, &U)| {
        let outcome = evaluate(item);
        observer.on_unit_done(unit, index);
        outcome
    };
    if parallel {
        items.par_iter().enumerate().map(run_one).collect()
    } else {
        items.iter().enumerate().map(run_one).collect()
    }
}
