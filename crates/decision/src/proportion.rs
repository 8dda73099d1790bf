//! Inference on conversion proportions
//!
//! Score (Wilson) intervals for a single rate, the pooled two-proportion
//! z-test, the unpooled confidence interval for the absolute lift and
//! Cohen's h effect size.
//!
//! The z-test relies on the large-sample normal approximation. It does not
//! check that `n·p·(1-p)` is large enough in each arm (a rule of thumb is
//! `> 5`); callers with small arms get a result that may be unreliable.

use abtest_types::{IntervalEstimate, TestResult};
use serde::{Deserialize, Serialize};

use crate::errors::{DecisionError, Result};
use crate::statistical::{
    check_open_unit, check_proportion, two_sided_normal_p, z_critical, StatisticalTest,
};

/// Interval construction method for a single proportion
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum IntervalMethod {
    /// Wilson score interval
    #[default]
    Wilson,
    /// Wald interval `p ± z·sqrt(p(1-p)/n)`, clipped to [0, 1]
    Normal,
}

/// Confidence interval for a single proportion `count / n`
///
/// The returned estimate has `point = count / n` and satisfies
/// `0 <= lower <= point <= upper <= 1`.
pub fn confidence_interval(
    count: u64,
    n: u64,
    alpha: f64,
    method: IntervalMethod,
) -> Result<IntervalEstimate> {
    if n == 0 {
        return Err(DecisionError::invalid("n must be positive"));
    }
    if count > n {
        return Err(DecisionError::invalid(format!(
            "count {count} exceeds n {n}"
        )));
    }

    let z = z_critical(alpha)?;
    let nf = n as f64;
    let p = count as f64 / nf;

    let (lower, upper) = match method {
        IntervalMethod::Wilson => {
            let z2 = z * z;
            let denom = 1.0 + z2 / nf;
            let center = (p + z2 / (2.0 * nf)) / denom;
            let half_width = z * (p * (1.0 - p) / nf + z2 / (4.0 * nf * nf)).sqrt() / denom;
            (center - half_width, center + half_width)
        }
        IntervalMethod::Normal => {
            let margin = z * (p * (1.0 - p) / nf).sqrt();
            (p - margin, p + margin)
        }
    };

    // rounding can push the bounds a hair past the point or the unit interval
    Ok(IntervalEstimate::new(
        p,
        lower.min(p).max(0.0),
        upper.max(p).min(1.0),
    ))
}

/// Two-proportion z-test using the pooled proportion
///
/// Index 0 of each array is the first sample; the statistic is positive when
/// the first sample's rate is higher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProportionZTest {
    /// Successes in each sample
    pub successes: [u64; 2],
    /// Total trials in each sample
    pub totals: [u64; 2],
}

impl ProportionZTest {
    /// Create a new z-test, rejecting empty samples and counts above totals
    pub fn new(successes: [u64; 2], totals: [u64; 2]) -> Result<Self> {
        for i in 0..2 {
            if totals[i] == 0 {
                return Err(DecisionError::invalid(format!(
                    "total of sample {i} must be positive"
                )));
            }
            if successes[i] > totals[i] {
                return Err(DecisionError::invalid(format!(
                    "successes {} exceed total {} in sample {i}",
                    successes[i], totals[i]
                )));
            }
        }
        Ok(Self { successes, totals })
    }

    /// Sample proportions
    pub fn proportions(&self) -> (f64, f64) {
        (
            self.successes[0] as f64 / self.totals[0] as f64,
            self.successes[1] as f64 / self.totals[1] as f64,
        )
    }

    /// Pooled proportion under the null of equal rates
    pub fn pooled_proportion(&self) -> f64 {
        let total_successes = self.successes[0] + self.successes[1];
        let total_trials = self.totals[0] + self.totals[1];
        total_successes as f64 / total_trials as f64
    }

    /// Calculate z-statistic
    pub fn z_statistic(&self) -> Result<f64> {
        let (p1, p2) = self.proportions();
        let p_pool = self.pooled_proportion();

        let n1 = self.totals[0] as f64;
        let n2 = self.totals[1] as f64;

        // Standard error: sqrt(p_pool * (1 - p_pool) * (1/n1 + 1/n2))
        let se = (p_pool * (1.0 - p_pool) * (1.0 / n1 + 1.0 / n2)).sqrt();

        if se == 0.0 {
            return Err(DecisionError::degenerate(format!(
                "pooled proportion {p_pool} has zero variance"
            )));
        }

        Ok((p1 - p2) / se)
    }

    /// Cohen's h of the first sample against the second
    pub fn effect_size(&self) -> Result<f64> {
        let (p1, p2) = self.proportions();
        cohens_h(p1, p2)
    }
}

impl StatisticalTest for ProportionZTest {
    /// Perform two-tailed z-test
    fn test(&self) -> Result<TestResult> {
        let z = self.z_statistic()?;
        Ok(TestResult::new(z, two_sided_normal_p(z)?))
    }
}

/// Two-sided pooled z-test for `successes = [k1, k2]`, `totals = [n1, n2]`
///
/// Returns the z statistic of `k1/n1 - k2/n2` and its two-sided p-value.
pub fn proportion_ztest(successes: [u64; 2], totals: [u64; 2]) -> Result<TestResult> {
    ProportionZTest::new(successes, totals)?.test()
}

/// Confidence interval for `rate_treatment - rate_control`
///
/// Uses the unpooled standard error
/// `sqrt(p_c(1-p_c)/n_c + p_t(1-p_t)/n_t)` and the normal critical value
/// `z_{1-alpha/2}`. The point is exactly `rate_treatment - rate_control`.
pub fn lift_confidence_interval(
    rate_control: f64,
    rate_treatment: f64,
    n_control: u64,
    n_treatment: u64,
    alpha: f64,
) -> Result<IntervalEstimate> {
    check_proportion("rate_control", rate_control)?;
    check_proportion("rate_treatment", rate_treatment)?;
    check_open_unit("alpha", alpha)?;
    if n_control == 0 || n_treatment == 0 {
        return Err(DecisionError::invalid("group sizes must be positive"));
    }

    let diff = rate_treatment - rate_control;
    let se = (rate_control * (1.0 - rate_control) / n_control as f64
        + rate_treatment * (1.0 - rate_treatment) / n_treatment as f64)
        .sqrt();
    let margin = z_critical(alpha)? * se;

    Ok(IntervalEstimate::new(diff, diff - margin, diff + margin))
}

/// Cohen's h effect size: `2·(asin(√p1) − asin(√p2))`
///
/// Positive when `p1 > p2`; `cohens_h(p1, p2) == -cohens_h(p2, p1)`.
pub fn cohens_h(p1: f64, p2: f64) -> Result<f64> {
    check_proportion("p1", p1)?;
    check_proportion("p2", p2)?;
    Ok(2.0 * (p1.sqrt().asin() - p2.sqrt().asin()))
}
