//! Per-site association through ordinary least squares.

use super::engine::{UnitError, UnitOutcome};
use ndarray::ArrayView1;
use serde::{Deserialize, Serialize};
use statrs::distribution::{ContinuousCDF, StudentsT};
use thiserror::Error;

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegressionOptions {
    /// Fit an intercept next to the genotype coefficient. Off by default:
    /// the model is a single coefficient through the origin.
    pub intercept: bool,
}

impl RegressionOptions {
    pub fn parameter_count(&self) -> usize {
        if self.intercept { 2 } else { 1 }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct OlsFit {
    pub coefficient: f64,
    pub standard_error: f64,
    pub t_statistic: f64,
    pub p_value: f64,
    pub degrees_of_freedom: usize,
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum RegressionError {
    #[error("genotype vector has {genotypes} entries but the phenotype has {phenotype}")]
    LengthMismatch { genotypes: usize, phenotype: usize },

    #[error("{observations} observations cannot support {parameters} fitted parameters")]
    InsufficientDegreesOfFreedom {
        observations: usize,
        parameters: usize,
    },

    #[error("regression inputs contain non-finite values")]
    NonFinite,

    #[error("invalid t distribution: {0}")]
    Distribution(String),
}

/// Regresses `phenotype` on `genotypes` and tests the genotype coefficient.
///
/// Returns `Ok(None)` when the genotype carries no variation the model can
/// use (zero sum of squares, after centring when an intercept is fitted).
/// The two-sided p-value uses a Student-t with `n - p` degrees of freedom.
/// Swapping the roles of genotype and phenotype gives the same p-value.
pub fn fit_genotype(
    genotypes: ArrayView1<'_, f64>,
    phenotype: ArrayView1<'_, f64>,
    options: &RegressionOptions,
) -> Result<Option<OlsFit>, RegressionError> {
    let n = genotypes.len();
    if phenotype.len() != n {
        return Err(RegressionError::LengthMismatch {
            genotypes: n,
            phenotype: phenotype.len(),
        });
    }
    let parameters = options.parameter_count();
    if n <= parameters {
        return Err(RegressionError::InsufficientDegreesOfFreedom {
            observations: n,
            parameters,
        });
    }
    if genotypes.iter().chain(phenotype.iter()).any(|v| !v.is_finite()) {
        return Err(RegressionError::NonFinite);
    }

    let (g_mean, y_mean) = if options.intercept {
        (genotypes.mean().unwrap_or(0.0), phenotype.mean().unwrap_or(0.0))
    } else {
        (0.0, 0.0)
    };

    let mut sxx = 0.0;
    let mut sxy = 0.0;
    let mut raw_ss = 0.0;
    for (&g, &y) in genotypes.iter().zip(phenotype.iter()) {
        let gc = g - g_mean;
        sxx += gc * gc;
        sxy += gc * (y - y_mean);
        raw_ss += g * g;
    }
    // Centring a constant vector leaves only rounding noise.
    if sxx <= f64::EPSILON * raw_ss {
        return Ok(None);
    }

    let coefficient = sxy / sxx;
    let rss: f64 = genotypes
        .iter()
        .zip(phenotype.iter())
        .map(|(&g, &y)| {
            let residual = (y - y_mean) - coefficient * (g - g_mean);
            residual * residual
        })
        .sum();

    let degrees_of_freedom = n - parameters;
    let standard_error = (rss / degrees_of_freedom as f64 / sxx).sqrt();

    if standard_error == 0.0 {
        if coefficient == 0.0 {
            return Ok(None);
        }
        return Ok(Some(OlsFit {
            coefficient,
            standard_error,
            t_statistic: coefficient.signum() * f64::INFINITY,
            p_value: 0.0,
            degrees_of_freedom,
        }));
    }

    let t_statistic = coefficient / standard_error;
    let distribution = StudentsT::new(0.0, 1.0, degrees_of_freedom as f64)
        .map_err(|err| RegressionError::Distribution(err.to_string()))?;
    let p_value = (2.0 * distribution.cdf(-t_statistic.abs())).clamp(0.0, 1.0);

    Ok(Some(OlsFit {
        coefficient,
        standard_error,
        t_statistic,
        p_value,
        degrees_of_freedom,
    }))
}

pub(crate) fn evaluate_site(
    genotypes: ArrayView1<'_, f64>,
    phenotype: ArrayView1<'_, f64>,
    options: &RegressionOptions,
) -> Result<UnitOutcome, UnitError> {
    match fit_genotype(genotypes, phenotype, options)? {
        Some(fit) => Ok(UnitOutcome::Tested(fit.p_value)),
        None => Ok(UnitOutcome::Undefined),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    #[test]
    fn exact_linear_relation_gives_zero_p_value() {
        let g = array![0.0, 1.0, 1.0, 0.0, 1.0];
        let y = g.mapv(|v| 3.0 * v);
        let fit = fit_genotype(g.view(), y.view(), &RegressionOptions::default())
            .unwrap()
            .unwrap();
        assert_abs_diff_eq!(fit.coefficient, 3.0, epsilon = 1e-12);
        assert!(fit.p_value < 1e-12);
    }

    #[test]
    fn through_origin_fit_matches_hand_computation() {
        let g = array![1.0, 2.0, 3.0];
        let y = array![1.0, 3.0, 2.0];
        let fit = fit_genotype(g.view(), y.view(), &RegressionOptions::default())
            .unwrap()
            .unwrap();
        // beta = 13/14, rss = 14 - 169/14 = 27/14, se = sqrt(27/14 / 2 / 14)
        let beta = 13.0 / 14.0;
        let se = (27.0_f64 / 14.0 / 2.0 / 14.0).sqrt();
        assert_abs_diff_eq!(fit.coefficient, beta, epsilon = 1e-12);
        assert_abs_diff_eq!(fit.standard_error, se, epsilon = 1e-12);
        assert_eq!(fit.degrees_of_freedom, 2);
        let t = StudentsT::new(0.0, 1.0, 2.0).unwrap();
        assert_abs_diff_eq!(fit.p_value, 2.0 * t.cdf(-beta / se), epsilon = 1e-12);
    }

    #[test]
    fn p_value_is_symmetric_in_genotype_and_phenotype() {
        let g = array![0.0, 1.0, 2.0, 1.0, 0.0, 2.0];
        let y = array![0.3, 1.1, 1.7, 0.4, -0.2, 2.5];
        for intercept in [false, true] {
            let options = RegressionOptions { intercept };
            let forward = fit_genotype(g.view(), y.view(), &options).unwrap().unwrap();
            let backward = fit_genotype(y.view(), g.view(), &options).unwrap().unwrap();
            assert_abs_diff_eq!(forward.p_value, backward.p_value, epsilon = 1e-10);
        }
    }

    #[test]
    fn constant_genotype_is_degenerate_only_with_intercept() {
        let g = array![1.0, 1.0, 1.0, 1.0];
        let y = array![0.5, 1.5, 0.7, 1.2];
        let with_intercept = RegressionOptions { intercept: true };
        assert_eq!(fit_genotype(g.view(), y.view(), &with_intercept), Ok(None));
        assert!(
            fit_genotype(g.view(), y.view(), &RegressionOptions::default())
                .unwrap()
                .is_some()
        );

        let zeros = array![0.0, 0.0, 0.0, 0.0];
        assert_eq!(
            fit_genotype(zeros.view(), y.view(), &RegressionOptions::default()),
            Ok(None)
        );
    }

    #[test]
    fn rejects_too_few_observations_and_mismatched_lengths() {
        let one = array![1.0];
        assert!(matches!(
            fit_genotype(one.view(), one.view(), &RegressionOptions::default()),
            Err(RegressionError::InsufficientDegreesOfFreedom { .. })
        ));

        let g = array![0.0, 1.0, 1.0];
        let y = array![0.0, 1.0];
        assert_eq!(
            fit_genotype(g.view(), y.view(), &RegressionOptions::default()),
            Err(RegressionError::LengthMismatch {
                genotypes: 3,
                phenotype: 2
            })
        );
    }
}
