//! Seeded synthetic checkout experiment shared by the integration tests

use abtest_types::{Device, ExperimentData, Group, Observation, TrafficSource};
use chrono::{Duration, TimeZone, Utc};
use rand::Rng;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal, Poisson};
use rand_xoshiro::Xoshiro256PlusPlus;

pub struct Scenario {
    pub days: u32,
    pub sessions_per_day: f64,
    pub baseline_rate: f64,
    pub treatment_lift: f64,
    pub seed: u64,
}

impl Default for Scenario {
    fn default() -> Self {
        Self {
            days: 14,
            sessions_per_day: 2_000.0,
            baseline_rate: 0.032,
            treatment_lift: 0.004,
            seed: 42,
        }
    }
}

const DEVICES: [(Device, f64, f64); 3] = [
    // device, conversion multiplier, order value multiplier
    (Device::Desktop, 1.15, 1.10),
    (Device::Mobile, 0.82, 0.88),
    (Device::Tablet, 1.05, 1.02),
];

const SOURCES: [TrafficSource; 5] = [
    TrafficSource::Organic,
    TrafficSource::PaidSearch,
    TrafficSource::Social,
    TrafficSource::Email,
    TrafficSource::Direct,
];

fn pick_device<R: Rng>(rng: &mut R) -> (Device, f64, f64) {
    let u: f64 = rng.gen();
    if u < 0.42 {
        DEVICES[0]
    } else if u < 0.87 {
        DEVICES[1]
    } else {
        DEVICES[2]
    }
}

pub fn generate(scenario: &Scenario) -> ExperimentData {
    let mut rng = Xoshiro256PlusPlus::seed_from_u64(scenario.seed);
    let traffic = Poisson::new(scenario.sessions_per_day).unwrap();
    let order_value = Normal::new(68.0, 32.0).unwrap();
    let start = Utc.with_ymd_and_hms(2024, 9, 2, 0, 0, 0).unwrap();

    let mut observations = Vec::new();
    let mut user_counter = 0u64;

    for day in 0..scenario.days {
        let sessions = traffic.sample(&mut rng) as u64;
        for _ in 0..sessions {
            user_counter += 1;
            let group = if rng.gen_bool(0.5) {
                Group::Treatment
            } else {
                Group::Control
            };
            let (device, cvr_mult, aov_mult) = pick_device(&mut rng);

            let mut cvr = scenario.baseline_rate * cvr_mult;
            if group == Group::Treatment {
                cvr += scenario.treatment_lift;
            }
            let converted = rng.gen::<f64>() < cvr;
            let revenue = if converted {
                let value: f64 = order_value.sample(&mut rng) * aov_mult;
                (value.max(5.0) * 100.0).round() / 100.0
            } else {
                0.0
            };

            let offset = Duration::days(day as i64) + Duration::seconds(rng.gen_range(0..86_400));
            let mut observation = Observation::new(
                format!("U{user_counter:07}"),
                start + offset,
                group,
                device,
                SOURCES[rng.gen_range(0..SOURCES.len())],
                converted,
                revenue,
            );
            observation.pages_viewed = if converted { 6 } else { 3 };
            observations.push(observation);
        }
    }

    ExperimentData::new(observations)
}
