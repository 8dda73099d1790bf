//! Analyze a simulated 21-day checkout redesign experiment
//!
//! ```text
//! cargo run -p decision --example checkout_analysis [config.yaml]
//! ```
//!
//! Configuration follows the usual layering: defaults, the optional YAML file,
//! then `ABTEST_*` environment overrides. The report is printed as JSON.

use abtest_config::AnalysisConfig;
use abtest_types::{Device, ExperimentData, Group, Observation, TrafficSource};
use chrono::{Datelike, Duration, TimeZone, Utc};
use decision::ExperimentAnalyzer;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Exp, Normal, Poisson};
use rand_xoshiro::Xoshiro256PlusPlus;
use std::path::PathBuf;

const DAYS: i64 = 21;
const SESSIONS_PER_DAY: f64 = 3_500.0;
const BASELINE_RATE: f64 = 0.032;
const TREATMENT_LIFT: f64 = 0.004;
const NOVELTY_PEAK: f64 = 0.003;
const NOVELTY_HALFLIFE_DAYS: f64 = 4.0;

/// Traffic and conversion multipliers, Monday first
const DOW_TRAFFIC: [f64; 7] = [1.0, 0.97, 0.95, 1.02, 1.08, 1.15, 1.05];
const DOW_CONVERSION: [f64; 7] = [1.0, 1.01, 1.00, 0.99, 1.03, 0.96, 0.94];

fn simulate(seed: u64) -> Result<ExperimentData, Box<dyn std::error::Error>> {
    let mut rng = Xoshiro256PlusPlus::seed_from_u64(seed);
    let order_value = Normal::new(68.0, 32.0)?;
    let converter_duration = Exp::new(1.0 / 320.0)?;
    let bouncer_duration = Exp::new(1.0 / 90.0)?;
    let start = Utc.with_ymd_and_hms(2024, 9, 2, 0, 0, 0).single().ok_or("bad start date")?;

    let mut observations = Vec::new();
    for day in 0..DAYS {
        let date = start + Duration::days(day);
        let dow = date.weekday().num_days_from_monday() as usize;
        let sessions = Poisson::new(SESSIONS_PER_DAY * DOW_TRAFFIC[dow])?.sample(&mut rng) as u64;
        let novelty = NOVELTY_PEAK * (-(2f64.ln()) * day as f64 / NOVELTY_HALFLIFE_DAYS).exp();

        for _ in 0..sessions {
            let group = if rng.gen_bool(0.5) { Group::Treatment } else { Group::Control };
            let (device, cvr_mult, aov_mult) = match rng.gen::<f64>() {
                u if u < 0.42 => (Device::Desktop, 1.15, 1.10),
                u if u < 0.87 => (Device::Mobile, 0.82, 0.88),
                _ => (Device::Tablet, 1.05, 1.02),
            };
            let source = match rng.gen::<f64>() {
                u if u < 0.35 => TrafficSource::Organic,
                u if u < 0.63 => TrafficSource::PaidSearch,
                u if u < 0.81 => TrafficSource::Social,
                u if u < 0.93 => TrafficSource::Email,
                _ => TrafficSource::Direct,
            };

            let mut cvr = BASELINE_RATE * DOW_CONVERSION[dow] * cvr_mult;
            if group == Group::Treatment {
                cvr += TREATMENT_LIFT + novelty;
            }
            let converted = rng.gen::<f64>() < cvr;
            let revenue = if converted {
                let value: f64 = order_value.sample(&mut rng) * aov_mult;
                (value.max(5.0) * 100.0).round() / 100.0
            } else {
                0.0
            };

            let mut observation = Observation::new(
                format!("U{:07}", observations.len() + 1),
                date + Duration::seconds(rng.gen_range(0..86_400)),
                group,
                device,
                source,
                converted,
                revenue,
            );
            let duration = if converted {
                converter_duration.sample(&mut rng) + 30.0
            } else {
                bouncer_duration.sample(&mut rng) + 5.0
            };
            observation.session_duration_sec = duration as u32;
            observation.pages_viewed = if converted {
                Poisson::new(5.5)?.sample(&mut rng) as u32 + 1
            } else {
                Poisson::new(2.8)?.sample(&mut rng) as u32 + 1
            };
            observations.push(observation);
        }
    }

    Ok(ExperimentData::validated(observations)?)
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = AnalysisConfig::load(std::env::args().nth(1).map(PathBuf::from))?;
    config.observability.init_tracing()?;

    let data = simulate(config.inference.seed)?;
    let report = ExperimentAnalyzer::new(&config)?.analyze(&data)?;

    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
