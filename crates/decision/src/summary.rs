//! Per-arm summary statistics and the daily cumulative conversion series

use abtest_types::{Group, GroupSummary, Observation};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::errors::{DecisionError, Result};
use crate::statistical::{check_proportion, mean, sample_variance};

/// Summary statistics of one arm
///
/// An empty iterator gives an all-zero summary with no AOV.
pub fn summarize<'a, I>(observations: I) -> GroupSummary
where
    I: IntoIterator<Item = &'a Observation>,
{
    let mut revenues = Vec::new();
    let mut order_values = Vec::new();

    for observation in observations {
        revenues.push(observation.revenue);
        if observation.converted {
            order_values.push(observation.revenue);
        }
    }

    let n = revenues.len() as u64;
    let conversions = order_values.len() as u64;

    GroupSummary {
        n,
        conversions,
        conversion_rate: if n == 0 {
            0.0
        } else {
            conversions as f64 / n as f64
        },
        revenue_mean: mean(&revenues),
        revenue_variance: sample_variance(&revenues),
        aov_mean: (!order_values.is_empty()).then(|| mean(&order_values)),
    }
}

/// Relative lift `(treatment − control) / control`
pub fn relative_lift(control_rate: f64, treatment_rate: f64) -> Result<f64> {
    check_proportion("control_rate", control_rate)?;
    check_proportion("treatment_rate", treatment_rate)?;
    if control_rate == 0.0 {
        return Err(DecisionError::degenerate(
            "relative lift is undefined for a zero control rate",
        ));
    }
    Ok((treatment_rate - control_rate) / control_rate)
}

/// One day of one arm in the cumulative conversion series
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DailyCumulative {
    pub date: NaiveDate,
    pub group: Group,
    /// Sessions on this day
    pub sessions: u64,
    /// Conversions on this day
    pub conversions: u64,
    pub cumulative_sessions: u64,
    pub cumulative_conversions: u64,
    /// cumulative_conversions / cumulative_sessions
    pub cumulative_rate: f64,
}

/// Cumulative conversion rate per arm and day
///
/// Rows are ordered by date, control before treatment on the same day.
/// Days on which an arm has no sessions are skipped for that arm.
pub fn cumulative_conversion<'a, I>(observations: I) -> Vec<DailyCumulative>
where
    I: IntoIterator<Item = &'a Observation>,
{
    let mut daily: BTreeMap<(NaiveDate, Group), (u64, u64)> = BTreeMap::new();
    for observation in observations {
        let entry = daily
            .entry((observation.date(), observation.group))
            .or_default();
        entry.0 += 1;
        entry.1 += u64::from(observation.converted);
    }

    let mut running: BTreeMap<Group, (u64, u64)> = BTreeMap::new();
    daily
        .into_iter()
        .map(|((date, group), (sessions, conversions))| {
            let totals = running.entry(group).or_default();
            totals.0 += sessions;
            totals.1 += conversions;
            DailyCumulative {
                date,
                group,
                sessions,
                conversions,
                cumulative_sessions: totals.0,
                cumulative_conversions: totals.1,
                cumulative_rate: totals.1 as f64 / totals.0 as f64,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use abtest_types::{Device, TrafficSource};
    use approx::assert_abs_diff_eq;
    use chrono::{TimeZone, Utc};

    fn session(id: &str, day: u32, group: Group, revenue: Option<f64>) -> Observation {
        Observation::new(
            id,
            Utc.with_ymd_and_hms(2024, 9, day, 12, 0, 0).unwrap(),
            group,
            Device::Desktop,
            TrafficSource::Organic,
            revenue.is_some(),
            revenue.unwrap_or(0.0),
        )
    }

    #[test]
    fn test_summarize() {
        let observations = vec![
            session("U1", 1, Group::Control, None),
            session("U2", 1, Group::Control, Some(30.0)),
            session("U3", 1, Group::Control, None),
            session("U4", 1, Group::Control, Some(50.0)),
        ];

        let s = summarize(&observations);
        assert_eq!(s.n, 4);
        assert_eq!(s.conversions, 2);
        assert_abs_diff_eq!(s.conversion_rate, 0.5);
        assert_abs_diff_eq!(s.revenue_mean, 20.0);
        // deviations -20, 10, -20, 30 -> 1400 / 3
        assert_abs_diff_eq!(s.revenue_variance, 1400.0 / 3.0, epsilon = 1e-9);
        assert_eq!(s.aov_mean, Some(40.0));
    }

    #[test]
    fn test_summarize_edge_cases() {
        let empty = summarize(&[]);
        assert_eq!(empty.n, 0);
        assert_eq!(empty.conversion_rate, 0.0);
        assert_eq!(empty.aov_mean, None);

        let single = summarize(&[session("U1", 1, Group::Treatment, None)]);
        assert_eq!(single.revenue_variance, 0.0);
        assert_eq!(single.aov_mean, None);
    }

    #[test]
    fn test_relative_lift() {
        assert_abs_diff_eq!(relative_lift(0.0311, 0.0361).unwrap(), 0.005 / 0.0311, epsilon = 1e-12);
        assert!(relative_lift(0.04, 0.03).unwrap() < 0.0);
        assert!(matches!(
            relative_lift(0.0, 0.01),
            Err(DecisionError::NumericalDegeneracy(_))
        ));
        assert!(matches!(
            relative_lift(1.2, 0.01),
            Err(DecisionError::InvalidParameter(_))
        ));
    }

    #[test]
    fn test_cumulative_conversion() {
        let observations = vec![
            session("U1", 2, Group::Treatment, Some(20.0)),
            session("U2", 1, Group::Control, None),
            session("U3", 1, Group::Control, Some(35.0)),
            session("U4", 1, Group::Treatment, None),
            session("U5", 2, Group::Control, None),
        ];

        let series = cumulative_conversion(&observations);
        let keys: Vec<(u32, Group)> = series
            .iter()
            .map(|row| (chrono::Datelike::day(&row.date), row.group))
            .collect();
        assert_eq!(
            keys,
            vec![
                (1, Group::Control),
                (1, Group::Treatment),
                (2, Group::Control),
                (2, Group::Treatment),
            ]
        );

        let control_day2 = &series[2];
        assert_eq!(control_day2.sessions, 1);
        assert_eq!(control_day2.cumulative_sessions, 3);
        assert_eq!(control_day2.cumulative_conversions, 1);
        assert_abs_diff_eq!(control_day2.cumulative_rate, 1.0 / 3.0);

        let treatment_day2 = &series[3];
        assert_eq!(treatment_day2.conversions, 1);
        assert_abs_diff_eq!(treatment_day2.cumulative_rate, 0.5);
    }
}
