//! Statistical decision core for two-arm conversion experiments
//!
//! This crate provides the inference behind a checkout A/B test: power and
//! sample-size planning, proportion tests and intervals, non-parametric and
//! Welch tests for revenue metrics, seeded bootstrap and permutation
//! resampling, stratified robustness checks, data-quality checks and an
//! analyzer composing all of them into one serializable report.
//!
//! The statistical primitives are pure functions of their inputs and do not
//! log; only [`ExperimentAnalyzer`] emits `tracing` events.

pub mod analysis;
pub mod continuous;
pub mod errors;
pub mod impact;
pub mod power;
pub mod proportion;
pub mod resampling;
pub mod robustness;
pub mod statistical;
pub mod summary;
pub mod validation;

pub use analysis::{
    AnalysisReport, ExperimentAnalyzer, OrderValueReport, PlanningReport, PrimaryMetricReport,
    RevenueReport, RobustnessReport,
};
pub use continuous::{
    bootstrap_mean_diff, mann_whitney, welch_t_test, BootstrapResult, MannWhitneyU, WelchTTest,
};
pub use errors::{DecisionError, Result};
pub use impact::{project_impact, ImpactProjection, ImpactScenario};
pub use power::{
    achieved_power, minimum_detectable_effect, plan_durations, required_sample_size, PowerPlan,
    SampleSizeCalculator,
};
pub use proportion::{
    cohens_h, confidence_interval, lift_confidence_interval, proportion_ztest, IntervalMethod,
    ProportionZTest,
};
pub use resampling::{permutation_test, PermutationResult};
pub use robustness::{
    bonferroni_alpha, lift_by_device, lift_by_time_window, midpoint_date, stratified_lift,
    ConversionCount, SegmentLift,
};
pub use statistical::{mean, percentile_sorted, sample_variance, z_critical, StatisticalTest};
pub use summary::{cumulative_conversion, relative_lift, summarize, DailyCumulative};
pub use validation::{
    sample_ratio_mismatch, validate_dataset, validate_dataset_with_allocation, DataQualityReport,
    InvalidRow, SrmCheck,
};
