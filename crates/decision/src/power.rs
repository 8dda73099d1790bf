//! Power and sample-size planning for conversion experiments
//!
//! An absolute minimum detectable effect (MDE) is standardized against the
//! baseline's Bernoulli standard deviation,
//! `d = mde / sqrt(p·(1 − p))`, and plugged into the two-sided
//! normal-approximation power equation for two equally sized arms:
//!
//! ```text
//! power(n) = Φ(d·√(n/2) − z) + Φ(−d·√(n/2) − z),   z = z_{1−α/2}
//! ```
//!
//! where `n` is the per-arm size. Both tails are counted, so solving for `n`
//! gives a slightly smaller root than the textbook closed form
//! `2·((z_{1−α/2} + z_{power}) / d)²`. That closed form is still used as the
//! upper bracket of the solver.

use serde::{Deserialize, Serialize};
use statrs::distribution::ContinuousCDF;

use crate::errors::{DecisionError, Result};
use crate::statistical::{check_open_unit, standard_normal, z_critical};

const BISECTION_ITERATIONS: usize = 200;

/// Sample size calculator for A/B tests
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SampleSizeCalculator {
    /// Baseline conversion rate
    pub baseline_rate: f64,
    /// Minimum detectable effect (absolute difference in rates)
    pub min_effect: f64,
    /// Statistical power (1 - beta)
    pub power: f64,
    /// Significance level (alpha)
    pub alpha: f64,
}

impl SampleSizeCalculator {
    /// Create a new sample size calculator
    pub fn new(baseline_rate: f64, min_effect: f64, power: f64, alpha: f64) -> Result<Self> {
        check_baseline(baseline_rate)?;
        check_open_unit("power", power)?;
        check_open_unit("alpha", alpha)?;

        if !min_effect.is_finite() || min_effect <= 0.0 {
            return Err(DecisionError::invalid(format!(
                "minimum detectable effect must be positive, got {min_effect}"
            )));
        }

        if power <= alpha {
            return Err(DecisionError::invalid(format!(
                "power {power} must exceed alpha {alpha}"
            )));
        }

        Ok(Self {
            baseline_rate,
            min_effect,
            power,
            alpha,
        })
    }

    /// Standardized effect size `mde / sqrt(p(1-p))`
    pub fn effect_size(&self) -> Result<f64> {
        standardized_effect(self.baseline_rate, self.min_effect)
    }

    /// Calculate required sample size per variant
    pub fn calculate(&self) -> Result<u64> {
        let d = self.effect_size()?;
        let normal = standard_normal()?;

        let z_alpha = z_critical(self.alpha)?;
        let z_beta = normal.inverse_cdf(self.power);

        // single-tail closed form; the second tail only adds power
        let upper = 2.0 * ((z_alpha + z_beta) / d).powi(2);
        if !upper.is_finite() {
            return Err(DecisionError::degenerate(format!(
                "effect size {d} is too small to plan for"
            )));
        }

        let mut lo = 0.0;
        let mut hi = upper;
        for _ in 0..BISECTION_ITERATIONS {
            let mid = 0.5 * (lo + hi);
            if power_at(d, mid, z_alpha)? < self.power {
                lo = mid;
            } else {
                hi = mid;
            }
        }

        Ok(hi.ceil().max(1.0) as u64)
    }
}

fn check_baseline(baseline_rate: f64) -> Result<()> {
    if !baseline_rate.is_finite() || baseline_rate <= 0.0 || baseline_rate >= 1.0 {
        return Err(DecisionError::invalid(format!(
            "baseline rate must lie in (0, 1), got {baseline_rate}"
        )));
    }
    Ok(())
}

fn standardized_effect(baseline_rate: f64, mde: f64) -> Result<f64> {
    let sd = (baseline_rate * (1.0 - baseline_rate)).sqrt();
    if sd == 0.0 {
        return Err(DecisionError::degenerate(
            "baseline rate has zero variance",
        ));
    }
    Ok(mde / sd)
}

/// Two-sided power at standardized effect `d` and per-arm size `n`
fn power_at(d: f64, n: f64, z_alpha: f64) -> Result<f64> {
    let normal = standard_normal()?;
    let shift = d * (n / 2.0).sqrt();
    Ok(normal.cdf(shift - z_alpha) + normal.cdf(-shift - z_alpha))
}

/// Per-arm sample size needed to detect an absolute lift of `mde`
///
/// Rounds up, so the returned size never under-powers the test.
pub fn required_sample_size(baseline_rate: f64, mde: f64, alpha: f64, power: f64) -> Result<u64> {
    SampleSizeCalculator::new(baseline_rate, mde, power, alpha)?.calculate()
}

/// Power achieved for an absolute lift of `mde` with `n_per_group` per arm
pub fn achieved_power(baseline_rate: f64, mde: f64, n_per_group: u64, alpha: f64) -> Result<f64> {
    check_baseline(baseline_rate)?;
    if !mde.is_finite() || mde < 0.0 {
        return Err(DecisionError::invalid(format!(
            "minimum detectable effect must be non-negative, got {mde}"
        )));
    }
    if n_per_group == 0 {
        return Err(DecisionError::invalid("group size must be positive"));
    }

    let d = standardized_effect(baseline_rate, mde)?;
    power_at(d, n_per_group as f64, z_critical(alpha)?)
}

/// Smallest absolute lift detectable at `power` with `n_per_group` per arm
pub fn minimum_detectable_effect(
    baseline_rate: f64,
    n_per_group: u64,
    alpha: f64,
    power: f64,
) -> Result<f64> {
    check_baseline(baseline_rate)?;
    check_open_unit("power", power)?;
    if n_per_group == 0 {
        return Err(DecisionError::invalid("group size must be positive"));
    }
    if power <= alpha {
        return Err(DecisionError::invalid(format!(
            "power {power} must exceed alpha {alpha}"
        )));
    }

    let z_alpha = z_critical(alpha)?;
    let z_beta = standard_normal()?.inverse_cdf(power);
    let n = n_per_group as f64;

    let mut lo = 0.0;
    let mut hi = (z_alpha + z_beta) / (n / 2.0).sqrt();
    for _ in 0..BISECTION_ITERATIONS {
        let mid = 0.5 * (lo + hi);
        if power_at(mid, n, z_alpha)? < power {
            lo = mid;
        } else {
            hi = mid;
        }
    }

    Ok(hi * (baseline_rate * (1.0 - baseline_rate)).sqrt())
}

/// One row of a pre-experiment planning table
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct PowerPlan {
    /// Absolute minimum detectable effect
    pub mde: f64,
    /// Required sessions per arm
    pub n_per_group: u64,
    /// Days of traffic needed at the planned daily volume per arm
    pub days: f64,
}

/// Required size and duration for each candidate MDE
pub fn plan_durations(
    baseline_rate: f64,
    mdes: &[f64],
    alpha: f64,
    power: f64,
    sessions_per_group_per_day: f64,
) -> Result<Vec<PowerPlan>> {
    if !sessions_per_group_per_day.is_finite() || sessions_per_group_per_day <= 0.0 {
        return Err(DecisionError::invalid(
            "sessions per group per day must be positive",
        ));
    }

    mdes.iter()
        .map(|&mde| {
            let n_per_group = required_sample_size(baseline_rate, mde, alpha, power)?;
            Ok(PowerPlan {
                mde,
                n_per_group,
                days: n_per_group as f64 / sessions_per_group_per_day,
            })
        })
        .collect()
}
