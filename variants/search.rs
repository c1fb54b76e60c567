use super::VariantError;
use super::summary::{VariantSummary, VariantTable};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Increment used when walking the target frequency.
pub const FREQUENCY_STEP: f64 = 0.001;
pub const MAX_MINOR_ALLELE_FREQUENCY: f64 = 0.5;
const RELATIVE_TOLERANCE: f64 = 0.01;
const ABSOLUTE_TOLERANCE: f64 = 1e-8;

/// A request for one site inside `[left, right]` (inclusive) near a target
/// minor allele frequency.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct VariantQuery {
    pub left: f64,
    pub right: f64,
    pub typed: bool,
    pub allele_frequency: f64,
    pub seed: u64,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct VariantHit {
    pub index: usize,
    pub position: f64,
    pub allele_frequency: f64,
    /// Target frequency that produced the match; differs from the
    /// requested one when the search had to walk.
    pub matched_target: f64,
}

impl VariantQuery {
    fn validate(&self) -> Result<(), VariantError> {
        if !self.left.is_finite() || !self.right.is_finite() || self.left > self.right {
            return Err(VariantError::InvalidQuery(format!(
                "interval [{}, {}] is not a finite, ordered range",
                self.left, self.right
            )));
        }
        if !(0.0..=MAX_MINOR_ALLELE_FREQUENCY).contains(&self.allele_frequency) {
            return Err(VariantError::InvalidQuery(format!(
                "target minor allele frequency {} is outside [0, {}]",
                self.allele_frequency, MAX_MINOR_ALLELE_FREQUENCY
            )));
        }
        Ok(())
    }
}

fn frequencies_match(observed: f64, target: f64) -> bool {
    (observed - target).abs() <= ABSOLUTE_TOLERANCE + RELATIVE_TOLERANCE * target.abs()
}

fn first_match(candidates: &[&VariantSummary], target: f64) -> Option<VariantHit> {
    candidates
        .iter()
        .find(|variant| frequencies_match(variant.allele_frequency, target))
        .map(|variant| VariantHit {
            index: variant.index,
            position: variant.position,
            allele_frequency: variant.allele_frequency,
            matched_target: target,
        })
}

fn round_to_step(frequency: f64) -> f64 {
    (frequency / FREQUENCY_STEP).round() * FREQUENCY_STEP
}

impl VariantTable {
    /// Picks the first site matching `query`, walking the target frequency
    /// in a seeded direction when no site matches exactly. The walk turns
    /// around once when it leaves `[0, 0.5]`.
    pub fn find_variant(&self, query: &VariantQuery) -> Result<VariantHit, VariantError> {
        query.validate()?;

        let in_interval: Vec<&VariantSummary> = self
            .iter()
            .filter(|variant| (query.left..=query.right).contains(&variant.position))
            .collect();
        if in_interval.is_empty() {
            return Err(VariantError::NoVariantsInInterval {
                left: query.left,
                right: query.right,
            });
        }

        let candidates: Vec<&VariantSummary> = in_interval
            .into_iter()
            .filter(|variant| variant.typed == query.typed)
            .collect();
        if candidates.is_empty() {
            return Err(VariantError::NoVariantsWithStatus {
                typed: query.typed,
                left: query.left,
                right: query.right,
            });
        }

        if let Some(hit) = first_match(&candidates, query.allele_frequency) {
            return Ok(hit);
        }

        let mut rng = StdRng::seed_from_u64(query.seed);
        let mut step = if rng.gen_bool(0.5) {
            FREQUENCY_STEP
        } else {
            -FREQUENCY_STEP
        };
        for _ in 0..2 {
            let mut target = query.allele_frequency;
            loop {
                target = round_to_step(target + step);
                if !(0.0..=MAX_MINOR_ALLELE_FREQUENCY).contains(&target) {
                    break;
                }
                if let Some(hit) = first_match(&candidates, target) {
                    log::debug!(
                        "matched site {} at frequency {} after walking from {}",
                        hit.index,
                        target,
                        query.allele_frequency
                    );
                    return Ok(hit);
                }
            }
            log::warn!(
                "no site near frequency {} walking by {}, turning around",
                query.allele_frequency,
                step
            );
            step = -step;
        }

        Err(VariantError::FrequencyNotFound {
            target: query.allele_frequency,
        })
    }
}
