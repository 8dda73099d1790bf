//! Inference on continuous metrics
//!
//! Revenue per session is zero-inflated and right-skewed, so it is compared
//! with the Mann-Whitney rank-sum test and a percentile bootstrap of the mean
//! difference. Welch's t-test is meant for the converters-only order values,
//! whose variances differ between arms with the device mix.

use abtest_types::{IntervalEstimate, TestResult};
use rand::Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use statrs::distribution::{ContinuousCDF, StudentsT};

use crate::errors::{DecisionError, Result};
use crate::resampling::iteration_rng;
use crate::statistical::{
    check_open_unit, check_sample, mean, percentile_sorted, sample_variance, standard_normal,
    StatisticalTest,
};

/// Tie-free samples use the exact U distribution unless both exceed this size
const EXACT_MANN_WHITNEY_LIMIT: usize = 8;

/// Largest `n1 · n2` for which the exact distribution is tabulated
const EXACT_MANN_WHITNEY_MAX_CELLS: usize = 200_000;

// ---------------------------------------------------------------------------
// Mann-Whitney U
// ---------------------------------------------------------------------------

/// Two-sided Mann-Whitney U test of `sample_a` against `sample_b`
///
/// The statistic is `U` of `sample_a` (the number of pairs where the `a`
/// value exceeds the `b` value, ties counting one half). Tie-free samples
/// where at least one arm has 8 or fewer values use the exact null
/// distribution; otherwise the normal approximation with tie and continuity
/// corrections is used.
pub fn mann_whitney(sample_a: &[f64], sample_b: &[f64]) -> Result<TestResult> {
    MannWhitneyU::new(sample_a, sample_b).test()
}

/// Mann-Whitney U test over two borrowed samples
#[derive(Debug, Clone, Copy)]
pub struct MannWhitneyU<'a> {
    /// Sample whose `U` is reported
    pub sample_a: &'a [f64],
    /// Sample it is ranked against
    pub sample_b: &'a [f64],
}

impl<'a> MannWhitneyU<'a> {
    /// Create a test of `sample_a` against `sample_b`
    pub fn new(sample_a: &'a [f64], sample_b: &'a [f64]) -> Self {
        Self { sample_a, sample_b }
    }
}

impl StatisticalTest for MannWhitneyU<'_> {
    fn test(&self) -> Result<TestResult> {
        check_sample("sample_a", self.sample_a)?;
        check_sample("sample_b", self.sample_b)?;

        let n1 = self.sample_a.len();
        let n2 = self.sample_b.len();
        let n1f = n1 as f64;
        let n2f = n2 as f64;
        let nf = (n1 + n2) as f64;

        let mut combined: Vec<(f64, bool)> = Vec::with_capacity(n1 + n2);
        combined.extend(self.sample_a.iter().map(|&v| (v, true)));
        combined.extend(self.sample_b.iter().map(|&v| (v, false)));
        combined.sort_by(|x, y| x.0.total_cmp(&y.0));

        let (rank_sum_a, tie_term) = rank_sum_and_ties(&combined);

        let u1 = rank_sum_a - n1f * (n1f + 1.0) / 2.0;
        let u2 = n1f * n2f - u1;
        let u_max = u1.max(u2);

        let exact = (n1 <= EXACT_MANN_WHITNEY_LIMIT || n2 <= EXACT_MANN_WHITNEY_LIMIT)
            && n1 * n2 <= EXACT_MANN_WHITNEY_MAX_CELLS
            && tie_term == 0.0;

        let p_value = if exact {
            let upper_tail = exact_u_upper_tail(n1, n2, u_max.round() as usize);
            (2.0 * upper_tail).min(1.0)
        } else {
            let mu = n1f * n2f / 2.0;
            let sigma_sq = n1f * n2f / 12.0 * ((nf + 1.0) - tie_term / (nf * (nf - 1.0)));
            if sigma_sq <= 0.0 {
                return Err(DecisionError::degenerate(
                    "all values are tied; rank variance is zero",
                ));
            }
            let z = (u_max - mu - 0.5) / sigma_sq.sqrt();
            (2.0 * (1.0 - standard_normal()?.cdf(z))).clamp(0.0, 1.0)
        };

        Ok(TestResult::new(u1, p_value))
    }
}

/// Rank sum of the flagged sample and `Σ(t³ − t)` over tie groups
///
/// `combined` must be sorted by value. Tied values share their average rank.
fn rank_sum_and_ties(combined: &[(f64, bool)]) -> (f64, f64) {
    let mut rank_sum = 0.0;
    let mut tie_term = 0.0;
    let mut i = 0;

    while i < combined.len() {
        let mut j = i + 1;
        while j < combined.len() && combined[j].0 == combined[i].0 {
            j += 1;
        }

        // ranks i+1 ..= j share the average
        let avg_rank = (i + 1 + j) as f64 / 2.0;
        let flagged = combined[i..j].iter().filter(|(_, in_a)| *in_a).count();
        rank_sum += avg_rank * flagged as f64;

        let t = (j - i) as f64;
        tie_term += t * t * t - t;
        i = j;
    }

    (rank_sum, tie_term)
}

/// P(U ≥ u) under the null for sample sizes `m` and `n`, without ties
fn exact_u_upper_tail(m: usize, n: usize, u: usize) -> f64 {
    let counts = exact_u_counts(m, n);
    let total: i128 = counts.iter().sum();
    let tail: i128 = counts.iter().skip(u).sum();
    tail as f64 / total as f64
}

/// Number of orderings with `U = k` for each `k` in `0..=m·n`
///
/// These are the coefficients of the Gaussian binomial `[m+n choose m]_q`,
/// built one factor `(1 − q^(n+i)) / (1 − q^i)` at a time over the smaller
/// sample. Every intermediate polynomial is itself a Gaussian binomial, so
/// the integer arithmetic is exact.
fn exact_u_counts(m: usize, n: usize) -> Vec<i128> {
    let (m, n) = (m.min(n), m.max(n));
    let mut coeffs = vec![0i128; m * n + 1];
    coeffs[0] = 1;

    for i in 1..=m {
        let degree = i * n;
        // multiply by (1 − q^(n+i)); terms above `degree` cancel after the division
        for k in (n + i..=degree).rev() {
            coeffs[k] -= coeffs[k - n - i];
        }
        // divide by (1 − q^i)
        for k in i..=degree {
            coeffs[k] += coeffs[k - i];
        }
    }

    coeffs
}

// ---------------------------------------------------------------------------
// Welch's t-test
// ---------------------------------------------------------------------------

/// Two-sided Welch t-test of `mean(sample_a) − mean(sample_b)`
///
/// Variances are not assumed equal; degrees of freedom follow the
/// Welch-Satterthwaite approximation. Intended for converters-only order
/// values, never for zero-inflated per-session revenue.
pub fn welch_t_test(sample_a: &[f64], sample_b: &[f64]) -> Result<TestResult> {
    WelchTTest::new(sample_a, sample_b).test()
}

/// Welch's unequal-variance t-test over two borrowed samples
#[derive(Debug, Clone, Copy)]
pub struct WelchTTest<'a> {
    /// First sample; its mean is the minuend
    pub sample_a: &'a [f64],
    /// Second sample
    pub sample_b: &'a [f64],
}

impl<'a> WelchTTest<'a> {
    /// Create a test of `mean(sample_a) − mean(sample_b)`
    pub fn new(sample_a: &'a [f64], sample_b: &'a [f64]) -> Self {
        Self { sample_a, sample_b }
    }
}

impl StatisticalTest for WelchTTest<'_> {
    fn test(&self) -> Result<TestResult> {
        check_sample("sample_a", self.sample_a)?;
        check_sample("sample_b", self.sample_b)?;

        let n1 = self.sample_a.len();
        let n2 = self.sample_b.len();
        if n1 < 2 || n2 < 2 {
            return Err(DecisionError::invalid(format!(
                "Welch t-test needs at least 2 values per sample, got {n1} and {n2}"
            )));
        }

        let n1f = n1 as f64;
        let n2f = n2 as f64;
        let v1 = sample_variance(self.sample_a) / n1f;
        let v2 = sample_variance(self.sample_b) / n2f;

        let se_sq = v1 + v2;
        if se_sq <= 0.0 {
            return Err(DecisionError::degenerate(
                "both samples have zero variance",
            ));
        }

        let t = (mean(self.sample_a) - mean(self.sample_b)) / se_sq.sqrt();

        // Welch-Satterthwaite degrees of freedom
        let df = se_sq.powi(2) / (v1 * v1 / (n1f - 1.0) + v2 * v2 / (n2f - 1.0));

        let dist = StudentsT::new(0.0, 1.0, df)
            .map_err(|e| DecisionError::degenerate(e.to_string()))?;
        let p_value = (2.0 * (1.0 - dist.cdf(t.abs()))).clamp(0.0, 1.0);

        Ok(TestResult::new(t, p_value).with_degrees_of_freedom(df))
    }
}

// ---------------------------------------------------------------------------
// Bootstrap
// ---------------------------------------------------------------------------

/// Percentile bootstrap of a mean difference
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct BootstrapResult {
    /// `mean(sample_b) − mean(sample_a)` on the original samples
    pub observed_diff: f64,
    /// Mean of the resampled differences with its percentile bounds
    pub interval: IntervalEstimate,
    /// Number of resamples drawn
    pub n_resamples: usize,
    /// Confidence level of the interval
    pub confidence_level: f64,
}

/// Bootstrap interval for `mean(sample_b) − mean(sample_a)`
///
/// Each arm is resampled independently with replacement to its own size
/// `n_resamples` times. The interval bounds are the `(1−c)/2` and
/// `1−(1−c)/2` percentiles of the resampled differences, widened if needed
/// to contain the point, which is their mean. This is a plain percentile interval, not bias-corrected, so it
/// can be off for heavily skewed data.
///
/// Resample `i` draws from a generator derived from `(seed, i)`. The result
/// is therefore identical for a fixed seed however the iterations are
/// scheduled across threads.
pub fn bootstrap_mean_diff(
    sample_a: &[f64],
    sample_b: &[f64],
    n_resamples: usize,
    confidence_level: f64,
    seed: u64,
) -> Result<BootstrapResult> {
    check_sample("sample_a", sample_a)?;
    check_sample("sample_b", sample_b)?;
    check_open_unit("confidence_level", confidence_level)?;
    if n_resamples == 0 {
        return Err(DecisionError::invalid("n_resamples must be positive"));
    }

    let mut diffs: Vec<f64> = (0..n_resamples)
        .into_par_iter()
        .map(|i| {
            let mut rng = iteration_rng(seed, i as u64);
            let mean_a = resampled_mean(sample_a, &mut rng);
            let mean_b = resampled_mean(sample_b, &mut rng);
            mean_b - mean_a
        })
        .collect();

    let point = mean(&diffs);
    diffs.sort_by(|a, b| a.total_cmp(b));

    let tail = (1.0 - confidence_level) / 2.0;
    let lower = percentile_sorted(&diffs, tail).unwrap_or(point);
    let upper = percentile_sorted(&diffs, 1.0 - tail).unwrap_or(point);

    Ok(BootstrapResult {
        observed_diff: mean(sample_b) - mean(sample_a),
        // narrow intervals on lattice data can exclude the mean
        interval: IntervalEstimate::new(point, lower.min(point), upper.max(point)),
        n_resamples,
        confidence_level,
    })
}

fn resampled_mean<R: Rng>(sample: &[f64], rng: &mut R) -> f64 {
    let n = sample.len();
    let sum: f64 = (0..n).map(|_| sample[rng.gen_range(0..n)]).sum();
    sum / n as f64
}
