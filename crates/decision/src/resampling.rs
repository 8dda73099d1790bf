//! Seeded resampling: per-iteration generators and the permutation test
//!
//! Every resampling routine takes an explicit seed. Iteration `i` draws from
//! its own generator derived from `(seed, i)`, so loops can run on the rayon
//! pool and still reproduce bit for bit.

use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_xoshiro::Xoshiro256PlusPlus;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::errors::{DecisionError, Result};
use crate::statistical::{check_sample, mean};

/// Relative slack for treating a permuted difference as a tie with the observed one
const EXTREMENESS_TOLERANCE: f64 = 1e-12;

fn splitmix64(mut x: u64) -> u64 {
    x = x.wrapping_add(0x9E37_79B9_7F4A_7C15);
    x = (x ^ (x >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    x = (x ^ (x >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    x ^ (x >> 31)
}

/// Generator for iteration `iteration` of a loop seeded with `seed`
pub(crate) fn iteration_rng(seed: u64, iteration: u64) -> Xoshiro256PlusPlus {
    Xoshiro256PlusPlus::seed_from_u64(splitmix64(seed ^ splitmix64(iteration)))
}

/// Outcome of a two-sided permutation test on the mean difference
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct PermutationResult {
    /// `mean(treatment) − mean(control)` on the observed labels
    pub observed_diff: f64,
    /// Share of permutations with `|diff| ≥ |observed_diff|`
    pub p_value: f64,
    /// Number of permutations drawn
    pub n_permutations: usize,
}

/// Two-sided permutation test of `mean(treatment) − mean(control)`
///
/// Under the null the labels are exchangeable: each permutation shuffles the
/// pooled outcomes, takes `treatment.len()` of them as pseudo-treatment and
/// the remaining `control.len()` as pseudo-control. Draws are without
/// replacement, and the group sizes (and any imbalance between them) are
/// preserved.
pub fn permutation_test(
    control: &[f64],
    treatment: &[f64],
    n_permutations: usize,
    seed: u64,
) -> Result<PermutationResult> {
    check_sample("control", control)?;
    check_sample("treatment", treatment)?;
    if n_permutations == 0 {
        return Err(DecisionError::invalid("n_permutations must be positive"));
    }

    let observed_diff = mean(treatment) - mean(control);
    let threshold = observed_diff.abs() * (1.0 - EXTREMENESS_TOLERANCE);

    let mut pool = Vec::with_capacity(control.len() + treatment.len());
    pool.extend_from_slice(treatment);
    pool.extend_from_slice(control);
    let n_treatment = treatment.len();

    let extreme = (0..n_permutations)
        .into_par_iter()
        .map_init(
            || pool.clone(),
            |buffer, i| {
                // every iteration starts from the canonical pool order
                buffer.copy_from_slice(&pool);
                let mut rng = iteration_rng(seed, i as u64);
                let (pseudo_treatment, pseudo_control) =
                    buffer.partial_shuffle(&mut rng, n_treatment);
                mean(pseudo_treatment) - mean(pseudo_control)
            },
        )
        .filter(|diff| diff.abs() >= threshold)
        .count();

    Ok(PermutationResult {
        observed_diff,
        p_value: extreme as f64 / n_permutations as f64,
        n_permutations,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;

    #[test]
    fn test_iteration_rng_is_reproducible() {
        let mut a = iteration_rng(42, 3);
        let mut b = iteration_rng(42, 3);
        let draws_a: Vec<u64> = (0..4).map(|_| a.gen()).collect();
        let draws_b: Vec<u64> = (0..4).map(|_| b.gen()).collect();
        assert_eq!(draws_a, draws_b);

        let mut c = iteration_rng(42, 4);
        let draws_c: Vec<u64> = (0..4).map(|_| c.gen()).collect();
        assert_ne!(draws_a, draws_c);
    }

    #[test]
    fn test_permutation_is_deterministic() {
        let control: Vec<f64> = (0..400).map(|i| if i % 30 == 0 { 1.0 } else { 0.0 }).collect();
        let treatment: Vec<f64> = (0..380).map(|i| if i % 25 == 0 { 1.0 } else { 0.0 }).collect();

        let first = permutation_test(&control, &treatment, 2_000, 42).unwrap();
        let second = permutation_test(&control, &treatment, 2_000, 42).unwrap();
        assert_eq!(first, second);
        assert!((0.0..=1.0).contains(&first.p_value));
    }

    #[test]
    fn test_permutation_identical_groups() {
        let outcomes: Vec<f64> = (0..300).map(|i| if i % 9 == 0 { 1.0 } else { 0.0 }).collect();
        let r = permutation_test(&outcomes, &outcomes, 1_000, 3).unwrap();
        assert_eq!(r.observed_diff, 0.0);
        assert_eq!(r.p_value, 1.0);
    }

    #[test]
    fn test_permutation_detects_clear_difference() {
        let control = vec![0.0; 200];
        let treatment: Vec<f64> = (0..200).map(|i| if i % 2 == 0 { 1.0 } else { 0.0 }).collect();
        let r = permutation_test(&control, &treatment, 1_000, 11).unwrap();
        assert_eq!(r.observed_diff, 0.5);
        assert_eq!(r.p_value, 0.0);
    }

    #[test]
    fn test_permutation_p_values_are_large_for_one_population() {
        let mut p_values = Vec::new();
        for seed in 0..40u64 {
            let mut rng = Xoshiro256PlusPlus::seed_from_u64(1_000 + seed);
            let mut pooled: Vec<f64> = (0..300)
                .map(|_| {
                    if rng.gen_bool(0.1) {
                        rng.gen_range(5.0..150.0)
                    } else {
                        0.0
                    }
                })
                .collect();
            pooled.shuffle(&mut rng);
            let (control, treatment) = pooled.split_at(150);

            let r = permutation_test(control, treatment, 500, seed).unwrap();
            assert_ne!(r.observed_diff, 0.0);
            p_values.push(r.p_value);
        }

        let mean_p = mean(&p_values);
        assert!(mean_p > 0.3, "mean p = {mean_p}");
        let small = p_values.iter().filter(|p| **p < 0.01).count();
        assert!(small <= 3, "{small} of 40 p-values below 0.01");
    }

    #[test]
    fn test_permutation_preserves_group_sizes() {
        // a single 1 among 10 values, treatment of size 1: P(|diff| >= obs) is the
        // chance the 1 lands in treatment, about 10%
        let control = vec![0.0; 9];
        let treatment = vec![1.0];
        let r = permutation_test(&control, &treatment, 20_000, 5).unwrap();
        assert_eq!(r.observed_diff, 1.0);
        assert!((r.p_value - 0.1).abs() < 0.01, "p = {}", r.p_value);
    }

    #[test]
    fn test_permutation_errors() {
        assert!(matches!(
            permutation_test(&[], &[1.0], 100, 1),
            Err(DecisionError::InvalidParameter(_))
        ));
        assert!(matches!(
            permutation_test(&[1.0], &[0.0], 0, 1),
            Err(DecisionError::InvalidParameter(_))
        ));
    }
}
