use super::VariantError;
use crate::genealogy::TreeSequence;
use ndarray::ArrayView1;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

/// Minor allele frequency of a haploid 0/1 genotype vector.
pub fn minor_allele_frequency(genotypes: ArrayView1<'_, f64>) -> f64 {
    let frequency = genotypes.mean().unwrap_or(0.0).clamp(0.0, 1.0);
    frequency.min(1.0 - frequency)
}

/// Rules deciding which sites count as typed.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TypingFilter {
    pub min_allele_frequency: f64,
    pub max_allele_frequency: f64,
    /// Share of frequency-eligible sites kept as typed, drawn at random.
    pub proportion_typed: f64,
    /// Round positions to integers, bumping collisions by one.
    pub integer_positions: bool,
    pub seed: u64,
}

impl Default for TypingFilter {
    fn default() -> Self {
        Self {
            min_allele_frequency: 0.0,
            max_allele_frequency: 1.0,
            proportion_typed: 1.0,
            integer_positions: false,
            seed: 0,
        }
    }
}

impl TypingFilter {
    pub fn validate(&self) -> Result<(), VariantError> {
        let min = self.min_allele_frequency;
        let max = self.max_allele_frequency;
        let in_unit = |value: f64| (0.0..=1.0).contains(&value);
        if !in_unit(min) || !in_unit(max) || min > max {
            return Err(VariantError::InvalidFrequencyBounds { min, max });
        }
        if !in_unit(self.proportion_typed) {
            return Err(VariantError::InvalidProportion(self.proportion_typed));
        }
        Ok(())
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct VariantSummary {
    pub index: usize,
    pub position: f64,
    pub allele_frequency: f64,
    /// Index of the local tree that covers the site.
    pub tree_index: usize,
    pub typed: bool,
}

/// Per-site summary of a tree sequence's variants.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct VariantTable {
    variants: Vec<VariantSummary>,
}

impl VariantTable {
    pub fn build<S: TreeSequence>(
        tree_sequence: &S,
        filter: &TypingFilter,
    ) -> Result<Self, VariantError> {
        filter.validate()?;
        let mut rng = StdRng::seed_from_u64(filter.seed);
        let mut variants: Vec<VariantSummary> = Vec::with_capacity(tree_sequence.num_sites());

        for (index, site) in tree_sequence.sites().enumerate() {
            let allele_frequency = minor_allele_frequency(site.genotypes.view());
            let tree_index = tree_sequence.tree_index_at(site.position).ok_or(
                VariantError::SiteOutsideTrees {
                    index,
                    position: site.position,
                },
            )?;

            let mut position = site.position;
            if filter.integer_positions {
                position = position.round();
                if variants.last().is_some_and(|previous| previous.position == position) {
                    position += 1.0;
                }
            }

            let eligible = (filter.min_allele_frequency..=filter.max_allele_frequency)
                .contains(&allele_frequency);
            let typed = eligible
                && (filter.proportion_typed >= 1.0
                    || rng.gen_range(0.0..1.0) < filter.proportion_typed);

            variants.push(VariantSummary {
                index,
                position,
                allele_frequency,
                tree_index,
                typed,
            });
        }

        let table = Self { variants };
        log::info!(
            "summarised {} variants, {} typed",
            table.len(),
            table.num_typed()
        );
        Ok(table)
    }

    pub fn len(&self) -> usize {
        self.variants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.variants.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&VariantSummary> {
        self.variants.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &VariantSummary> + '_ {
        self.variants.iter()
    }

    pub fn num_typed(&self) -> usize {
        self.variants.iter().filter(|variant| variant.typed).count()
    }

    pub fn typed_indices(&self) -> Vec<usize> {
        self.variants
            .iter()
            .filter(|variant| variant.typed)
            .map(|variant| variant.index)
            .collect()
    }
}
