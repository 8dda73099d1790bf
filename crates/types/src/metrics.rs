//! Summary statistics and test result value objects

use serde::{Deserialize, Serialize};

/// Derived per-arm statistics
///
/// Recomputed on demand from the observation set; never stored.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct GroupSummary {
    /// Number of sessions
    pub n: u64,
    /// Number of converting sessions
    pub conversions: u64,
    /// conversions / n
    pub conversion_rate: f64,
    /// Mean revenue per session (zeros included)
    pub revenue_mean: f64,
    /// Sample variance (n - 1) of revenue per session
    pub revenue_variance: f64,
    /// Mean order value over converting sessions, if any converted
    pub aov_mean: Option<f64>,
}

impl GroupSummary {
    /// Standard error of the conversion rate
    pub fn conversion_std_error(&self) -> f64 {
        if self.n == 0 {
            return 0.0;
        }
        let p = self.conversion_rate;
        (p * (1.0 - p) / self.n as f64).sqrt()
    }
}

/// Result of a hypothesis test
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct TestResult {
    /// Test statistic (z, t or U depending on the test)
    pub statistic: f64,
    /// Two-sided p-value
    pub p_value: f64,
    /// Degrees of freedom, where the reference distribution has them
    pub degrees_of_freedom: Option<f64>,
}

impl TestResult {
    pub fn new(statistic: f64, p_value: f64) -> Self {
        Self {
            statistic,
            p_value,
            degrees_of_freedom: None,
        }
    }

    pub fn with_degrees_of_freedom(mut self, df: f64) -> Self {
        self.degrees_of_freedom = Some(df);
        self
    }

    /// Whether the p-value falls below `alpha`
    pub fn is_significant(&self, alpha: f64) -> bool {
        self.p_value < alpha
    }
}

/// Point estimate with a confidence interval
///
/// Invariant: `lower <= point <= upper`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct IntervalEstimate {
    pub point: f64,
    pub lower: f64,
    pub upper: f64,
}

impl IntervalEstimate {
    pub fn new(point: f64, lower: f64, upper: f64) -> Self {
        Self { point, lower, upper }
    }

    pub fn width(&self) -> f64 {
        self.upper - self.lower
    }

    /// Whether `value` lies inside the closed interval
    pub fn contains(&self, value: f64) -> bool {
        self.lower <= value && value <= self.upper
    }

    /// Whether the interval lies strictly on one side of zero
    pub fn excludes_zero(&self) -> bool {
        !self.contains(0.0)
    }
}
