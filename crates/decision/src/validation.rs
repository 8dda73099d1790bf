//! Data-quality checks and the sample-ratio-mismatch test
//!
//! A sample-ratio mismatch (SRM) means the arms received a share of traffic
//! that is unlikely under the intended allocation, which usually points at a
//! broken randomizer or logging rather than at a treatment effect.

use abtest_types::{ExperimentData, Group};
use serde::{Deserialize, Serialize};
use statrs::distribution::{ChiSquared, ContinuousCDF};
use std::collections::{BTreeMap, HashMap};

use crate::errors::{DecisionError, Result};
use crate::statistical::check_open_unit;

/// Outcome of the chi-square goodness-of-fit test on arm sizes
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct SrmCheck {
    pub chi_squared: f64,
    pub p_value: f64,
    /// Whether `p_value < alpha`
    pub flagged: bool,
}

/// Chi-square test of observed arm sizes against the intended allocation
///
/// `expected_ratios` are relative weights, normalized before use, so
/// `[1.0, 1.0]` and `[0.5, 0.5]` are equivalent.
pub fn sample_ratio_mismatch(
    observed_counts: &[u64],
    expected_ratios: &[f64],
    alpha: f64,
) -> Result<SrmCheck> {
    check_open_unit("alpha", alpha)?;
    if observed_counts.len() != expected_ratios.len() {
        return Err(DecisionError::invalid(format!(
            "{} counts but {} expected ratios",
            observed_counts.len(),
            expected_ratios.len()
        )));
    }
    if observed_counts.len() < 2 {
        return Err(DecisionError::invalid("need at least two groups"));
    }
    if expected_ratios.iter().any(|r| !r.is_finite() || *r <= 0.0) {
        return Err(DecisionError::invalid("expected ratios must be positive"));
    }

    let total: u64 = observed_counts.iter().sum();
    if total == 0 {
        return Err(DecisionError::invalid("no observations to check"));
    }

    let ratio_sum: f64 = expected_ratios.iter().sum();
    let chi_squared: f64 = observed_counts
        .iter()
        .zip(expected_ratios)
        .map(|(&observed, &ratio)| {
            let expected = total as f64 * ratio / ratio_sum;
            (observed as f64 - expected).powi(2) / expected
        })
        .sum();

    let dist = ChiSquared::new((observed_counts.len() - 1) as f64)
        .map_err(|e| DecisionError::degenerate(e.to_string()))?;
    let p_value = (1.0 - dist.cdf(chi_squared)).clamp(0.0, 1.0);

    Ok(SrmCheck {
        chi_squared,
        p_value,
        flagged: p_value < alpha,
    })
}

/// A row rejected by [`Observation::validate`](abtest_types::Observation::validate)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InvalidRow {
    pub index: usize,
    pub user_id: String,
    pub reason: String,
}

/// Data-quality findings for one observation set
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DataQualityReport {
    pub total_rows: usize,
    /// Rows whose `user_id` already appeared earlier in the set
    pub duplicate_user_ids: usize,
    pub group_counts: BTreeMap<Group, u64>,
    pub invalid_rows: Vec<InvalidRow>,
    /// `None` for an empty observation set
    pub srm: Option<SrmCheck>,
}

impl DataQualityReport {
    /// No duplicates, no invalid rows and no SRM flag
    pub fn is_clean(&self) -> bool {
        self.duplicate_user_ids == 0
            && self.invalid_rows.is_empty()
            && !self.srm.map(|s| s.flagged).unwrap_or(false)
    }
}

/// Data-quality checks against an even 50/50 allocation
pub fn validate_dataset(data: &ExperimentData, srm_alpha: f64) -> Result<DataQualityReport> {
    validate_dataset_with_allocation(data, 0.5, srm_alpha)
}

/// Data-quality checks against an intended treatment share
pub fn validate_dataset_with_allocation(
    data: &ExperimentData,
    treatment_share: f64,
    srm_alpha: f64,
) -> Result<DataQualityReport> {
    check_open_unit("treatment_share", treatment_share)?;
    check_open_unit("srm_alpha", srm_alpha)?;

    let mut seen: HashMap<&str, usize> = HashMap::with_capacity(data.len());
    let mut group_counts: BTreeMap<Group, u64> =
        [(Group::Control, 0), (Group::Treatment, 0)].into_iter().collect();
    let mut invalid_rows = Vec::new();

    for (index, observation) in data.observations().iter().enumerate() {
        *seen.entry(observation.user_id.as_str()).or_default() += 1;
        *group_counts.entry(observation.group).or_default() += 1;
        if let Err(e) = observation.validate() {
            invalid_rows.push(InvalidRow {
                index,
                user_id: observation.user_id.clone(),
                reason: e.to_string(),
            });
        }
    }

    let duplicate_user_ids = seen.values().map(|count| count - 1).sum();

    let srm = if data.is_empty() {
        None
    } else {
        let counts = [
            group_counts[&Group::Control],
            group_counts[&Group::Treatment],
        ];
        Some(sample_ratio_mismatch(
            &counts,
            &[1.0 - treatment_share, treatment_share],
            srm_alpha,
        )?)
    };

    Ok(DataQualityReport {
        total_rows: data.len(),
        duplicate_user_ids,
        group_counts,
        invalid_rows,
        srm,
    })
}
