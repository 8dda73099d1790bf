//! Experiment observation types
//!
//! One [`Observation`] is one session of the experiment. The set of
//! observations is created once by the data-preparation collaborator and is
//! treated as a read-only sample from then on.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use crate::errors::{DataError, Result};

/// Experiment arm a session was randomized into
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum Group {
    Control,
    Treatment,
}

impl Group {
    /// Label used in the source dataset
    pub fn as_str(&self) -> &'static str {
        match self {
            Group::Control => "control",
            Group::Treatment => "treatment",
        }
    }
}

impl fmt::Display for Group {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Group {
    type Err = DataError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "control" => Ok(Group::Control),
            "treatment" => Ok(Group::Treatment),
            other => Err(DataError::UnknownGroup(other.to_string())),
        }
    }
}

/// Device category of a session
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum Device {
    Desktop,
    Mobile,
    Tablet,
}

impl Device {
    pub fn as_str(&self) -> &'static str {
        match self {
            Device::Desktop => "desktop",
            Device::Mobile => "mobile",
            Device::Tablet => "tablet",
        }
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Acquisition channel of a session
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum TrafficSource {
    Organic,
    PaidSearch,
    Social,
    Email,
    Direct,
}

impl TrafficSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            TrafficSource::Organic => "organic",
            TrafficSource::PaidSearch => "paid_search",
            TrafficSource::Social => "social",
            TrafficSource::Email => "email",
            TrafficSource::Direct => "direct",
        }
    }
}

impl fmt::Display for TrafficSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single experimental unit (session)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Observation {
    /// Session owner identifier (e.g. "U0000001")
    pub user_id: String,
    /// Session start time
    pub timestamp: DateTime<Utc>,
    /// Randomized arm
    pub group: Group,
    /// Device category
    pub device: Device,
    /// Acquisition channel
    pub traffic_source: TrafficSource,
    /// Pages viewed during the session
    pub pages_viewed: u32,
    /// Session duration in seconds
    pub session_duration_sec: u32,
    /// Whether the session ended in a purchase
    pub converted: bool,
    /// Order value; zero when the session did not convert
    pub revenue: f64,
}

impl Observation {
    /// Create a new observation with neutral engagement fields
    pub fn new(
        user_id: impl Into<String>,
        timestamp: DateTime<Utc>,
        group: Group,
        device: Device,
        traffic_source: TrafficSource,
        converted: bool,
        revenue: f64,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            timestamp,
            group,
            device,
            traffic_source,
            pages_viewed: 1,
            session_duration_sec: 0,
            converted,
            revenue,
        }
    }

    /// Check the revenue invariants of a single row
    pub fn validate(&self) -> Result<()> {
        if !self.revenue.is_finite() {
            return Err(DataError::NonFiniteRevenue {
                user_id: self.user_id.clone(),
            });
        }

        if self.revenue < 0.0 {
            return Err(DataError::NegativeRevenue {
                user_id: self.user_id.clone(),
                revenue: self.revenue,
            });
        }

        if !self.converted && self.revenue != 0.0 {
            return Err(DataError::RevenueWithoutConversion {
                user_id: self.user_id.clone(),
                revenue: self.revenue,
            });
        }

        Ok(())
    }

    /// Calendar date of the session (UTC)
    pub fn date(&self) -> NaiveDate {
        self.timestamp.date_naive()
    }

    /// Conversion outcome as 0.0 / 1.0
    pub fn outcome(&self) -> f64 {
        if self.converted {
            1.0
        } else {
            0.0
        }
    }
}

/// Read-only observation set for one experiment
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExperimentData {
    observations: Vec<Observation>,
}

impl ExperimentData {
    /// Wrap an observation set without checking it
    pub fn new(observations: Vec<Observation>) -> Self {
        Self { observations }
    }

    /// Wrap an observation set, rejecting empty sets and malformed rows
    pub fn validated(observations: Vec<Observation>) -> Result<Self> {
        if observations.is_empty() {
            return Err(DataError::Empty);
        }
        for observation in &observations {
            observation.validate()?;
        }
        Ok(Self { observations })
    }

    pub fn observations(&self) -> &[Observation] {
        &self.observations
    }

    pub fn len(&self) -> usize {
        self.observations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observations.is_empty()
    }

    /// Observations belonging to one arm
    pub fn group(&self, group: Group) -> impl Iterator<Item = &Observation> + '_ {
        self.observations.iter().filter(move |o| o.group == group)
    }

    /// Split into (control, treatment)
    pub fn split(&self) -> (Vec<&Observation>, Vec<&Observation>) {
        self.observations
            .iter()
            .partition(|o| o.group == Group::Control)
    }

    /// Number of sessions in one arm
    pub fn count(&self, group: Group) -> usize {
        self.group(group).count()
    }

    /// Conversion outcomes (0/1) of one arm
    pub fn outcomes(&self, group: Group) -> Vec<f64> {
        self.group(group).map(Observation::outcome).collect()
    }

    /// Revenue per session of one arm, zeros included
    pub fn revenues(&self, group: Group) -> Vec<f64> {
        self.group(group).map(|o| o.revenue).collect()
    }

    /// Order values of the converting sessions of one arm
    pub fn order_values(&self, group: Group) -> Vec<f64> {
        self.group(group)
            .filter(|o| o.converted)
            .map(|o| o.revenue)
            .collect()
    }

    /// Sorted distinct calendar dates covered by the experiment
    pub fn distinct_dates(&self) -> Vec<NaiveDate> {
        self.observations
            .iter()
            .map(Observation::date)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }
}

impl From<Vec<Observation>> for ExperimentData {
    fn from(observations: Vec<Observation>) -> Self {
        Self::new(observations)
    }
}
