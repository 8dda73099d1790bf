//! Robustness checks on the primary conversion lift
//!
//! The stratified checks recompute the lift inside each partition of the
//! observations (by device, or first and second half of the experiment)
//! to show whether the effect is stable. They are descriptive: no
//! multiple-comparison correction is applied and small partitions are not
//! flagged. Interpreting partition noise is left to the caller.

use abtest_types::{Device, Group, Observation};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::errors::{DecisionError, Result};
use crate::statistical::check_open_unit;

/// Session and conversion counts of one arm inside a partition
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConversionCount {
    pub n: u64,
    pub conversions: u64,
}

impl ConversionCount {
    fn record(&mut self, converted: bool) {
        self.n += 1;
        if converted {
            self.conversions += 1;
        }
    }

    /// Conversion rate, or `None` for an empty arm
    pub fn rate(&self) -> Option<f64> {
        if self.n == 0 {
            None
        } else {
            Some(self.conversions as f64 / self.n as f64)
        }
    }
}

/// Conversion lift inside one partition
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SegmentLift {
    /// Partition label (e.g. "mobile", "first_half")
    pub segment: String,
    pub control: ConversionCount,
    pub treatment: ConversionCount,
    /// Treatment rate minus control rate; `None` if either arm is empty
    pub lift: Option<f64>,
}

impl SegmentLift {
    fn new(segment: impl Into<String>, control: ConversionCount, treatment: ConversionCount) -> Self {
        let lift = match (control.rate(), treatment.rate()) {
            (Some(c), Some(t)) => Some(t - c),
            _ => None,
        };
        Self {
            segment: segment.into(),
            control,
            treatment,
            lift,
        }
    }
}

/// Lift per partition, with partitions assigned by `key`
///
/// Partitions are returned in key order.
pub fn stratified_lift<'a, K, F, I>(observations: I, key: F) -> Vec<SegmentLift>
where
    I: IntoIterator<Item = &'a Observation>,
    K: Ord + ToString,
    F: Fn(&Observation) -> K,
{
    let mut partitions: BTreeMap<K, (ConversionCount, ConversionCount)> = BTreeMap::new();

    for observation in observations {
        let entry = partitions.entry(key(observation)).or_default();
        match observation.group {
            Group::Control => entry.0.record(observation.converted),
            Group::Treatment => entry.1.record(observation.converted),
        }
    }

    partitions
        .into_iter()
        .map(|(k, (control, treatment))| SegmentLift::new(k.to_string(), control, treatment))
        .collect()
}

/// Lift per device category
pub fn lift_by_device<'a, I>(observations: I) -> Vec<SegmentLift>
where
    I: IntoIterator<Item = &'a Observation>,
{
    stratified_lift(observations, |o: &Observation| -> Device { o.device })
}

/// Half of the experiment period a session falls into
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Half {
    First,
    Second,
}

impl std::fmt::Display for Half {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Half::First => f.write_str("first_half"),
            Half::Second => f.write_str("second_half"),
        }
    }
}

/// Midpoint date splitting the experiment into halves
///
/// With the sorted distinct dates `D`, the midpoint is `D[len / 2]`; sessions
/// on or before it form the first half.
pub fn midpoint_date<'a, I>(observations: I) -> Option<NaiveDate>
where
    I: IntoIterator<Item = &'a Observation>,
{
    let dates: Vec<NaiveDate> = observations
        .into_iter()
        .map(Observation::date)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    dates.get(dates.len() / 2).copied()
}

/// Lift in the first and second half of the experiment period
///
/// Returns an empty list when there are no observations. When every
/// session falls on or before the midpoint only `first_half` is reported.
pub fn lift_by_time_window(observations: &[Observation]) -> Vec<SegmentLift> {
    let Some(midpoint) = midpoint_date(observations) else {
        return Vec::new();
    };

    stratified_lift(observations, |o: &Observation| {
        if o.date() <= midpoint {
            Half::First
        } else {
            Half::Second
        }
    })
}

/// Bonferroni-adjusted significance threshold `alpha / comparisons`
///
/// Only the threshold is computed; comparing a p-value against it is the
/// caller's call.
pub fn bonferroni_alpha(alpha: f64, comparisons: usize) -> Result<f64> {
    check_open_unit("alpha", alpha)?;
    if comparisons == 0 {
        return Err(DecisionError::invalid("comparisons must be positive"));
    }
    Ok(alpha / comparisons as f64)
}
