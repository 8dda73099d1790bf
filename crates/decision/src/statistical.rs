//! Shared statistical building blocks
//!
//! The [`StatisticalTest`] trait is the common seam of every two-sample test
//! in this crate. The free functions below are the small numeric helpers the
//! inference modules share: normal quantiles, parameter checks, moments and
//! percentiles.

use abtest_types::TestResult;
use statrs::distribution::{ContinuousCDF, Normal};

use crate::errors::{DecisionError, Result};

/// Statistical test trait
pub trait StatisticalTest {
    /// Perform the test
    fn test(&self) -> Result<TestResult>;

    /// Check if result is significant at given alpha level
    fn is_significant(&self, alpha: f64) -> Result<bool> {
        check_open_unit("alpha", alpha)?;
        Ok(self.test()?.p_value < alpha)
    }
}

/// Standard normal distribution N(0, 1)
pub(crate) fn standard_normal() -> Result<Normal> {
    Normal::new(0.0, 1.0).map_err(|e| DecisionError::degenerate(e.to_string()))
}

/// Two-sided critical value z_{1 - alpha/2}
pub fn z_critical(alpha: f64) -> Result<f64> {
    check_open_unit("alpha", alpha)?;
    Ok(standard_normal()?.inverse_cdf(1.0 - alpha / 2.0))
}

/// Two-sided p-value of a standard normal statistic
pub(crate) fn two_sided_normal_p(z: f64) -> Result<f64> {
    let normal = standard_normal()?;
    Ok((2.0 * (1.0 - normal.cdf(z.abs()))).clamp(0.0, 1.0))
}

/// Require `value` in the open interval (0, 1)
pub(crate) fn check_open_unit(name: &str, value: f64) -> Result<()> {
    if value.is_finite() && value > 0.0 && value < 1.0 {
        Ok(())
    } else {
        Err(DecisionError::invalid(format!(
            "{name} must lie in (0, 1), got {value}"
        )))
    }
}

/// Require `value` in the closed interval [0, 1]
pub(crate) fn check_proportion(name: &str, value: f64) -> Result<()> {
    if value.is_finite() && (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(DecisionError::invalid(format!(
            "{name} must lie in [0, 1], got {value}"
        )))
    }
}

/// Require a non-empty sample of finite values
pub(crate) fn check_sample(name: &str, sample: &[f64]) -> Result<()> {
    if sample.is_empty() {
        return Err(DecisionError::invalid(format!("{name} is empty")));
    }
    if sample.iter().any(|v| !v.is_finite()) {
        return Err(DecisionError::invalid(format!(
            "{name} contains non-finite values"
        )));
    }
    Ok(())
}

/// Arithmetic mean; 0 for an empty slice
pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Sample variance with n - 1 denominator; 0 for fewer than two values
pub fn sample_variance(values: &[f64]) -> f64 {
    let n = values.len();
    if n < 2 {
        return 0.0;
    }
    let m = mean(values);
    values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / (n - 1) as f64
}

/// Percentile of already sorted values using linear interpolation
///
/// `q` is a fraction in [0, 1]. Returns `None` for an empty slice.
pub fn percentile_sorted(sorted_values: &[f64], q: f64) -> Option<f64> {
    if sorted_values.is_empty() {
        return None;
    }

    if sorted_values.len() == 1 {
        return Some(sorted_values[0]);
    }

    let rank = q.clamp(0.0, 1.0) * (sorted_values.len() - 1) as f64;
    let lower_idx = rank.floor() as usize;
    let upper_idx = rank.ceil() as usize;

    if lower_idx == upper_idx {
        Some(sorted_values[lower_idx])
    } else {
        let fraction = rank - lower_idx as f64;
        Some(sorted_values[lower_idx] * (1.0 - fraction) + sorted_values[upper_idx] * fraction)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_z_critical() {
        assert_abs_diff_eq!(z_critical(0.05).unwrap(), 1.959964, epsilon = 1e-6);
        assert_abs_diff_eq!(z_critical(0.01).unwrap(), 2.575829, epsilon = 1e-6);
        assert!(z_critical(0.0).is_err());
        assert!(z_critical(1.0).is_err());
    }

    #[test]
    fn test_two_sided_p() {
        assert_abs_diff_eq!(two_sided_normal_p(1.959964).unwrap(), 0.05, epsilon = 1e-6);
        assert_abs_diff_eq!(two_sided_normal_p(0.0).unwrap(), 1.0, epsilon = 1e-12);
        assert_eq!(
            two_sided_normal_p(-1.5).unwrap(),
            two_sided_normal_p(1.5).unwrap()
        );
    }

    #[test]
    fn test_moments() {
        let values = [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0];
        assert_abs_diff_eq!(mean(&values), 5.0);
        assert_abs_diff_eq!(sample_variance(&values), 32.0 / 7.0, epsilon = 1e-12);
        assert_eq!(mean(&[]), 0.0);
        assert_eq!(sample_variance(&[3.0]), 0.0);
    }

    #[test]
    fn test_percentile_interpolation() {
        let sorted = [1.0, 2.0, 3.0, 4.0, 5.0];
        assert_eq!(percentile_sorted(&sorted, 0.5), Some(3.0));
        assert_eq!(percentile_sorted(&sorted, 0.0), Some(1.0));
        assert_eq!(percentile_sorted(&sorted, 1.0), Some(5.0));
        assert_abs_diff_eq!(percentile_sorted(&sorted, 0.1).unwrap(), 1.4, epsilon = 1e-12);
        assert_eq!(percentile_sorted(&[], 0.5), None);
        assert_eq!(percentile_sorted(&[7.0], 0.9), Some(7.0));
    }

    #[test]
    fn test_parameter_checks() {
        assert!(check_open_unit("alpha", 0.5).is_ok());
        assert!(check_open_unit("alpha", f64::NAN).is_err());
        assert!(check_proportion("p", 0.0).is_ok());
        assert!(check_proportion("p", 1.0).is_ok());
        assert!(check_proportion("p", 1.01).is_err());
        assert!(check_sample("a", &[]).is_err());
        assert!(check_sample("a", &[1.0, f64::INFINITY]).is_err());
    }
}
