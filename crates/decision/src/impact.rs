//! Business impact projection of a conversion lift

use abtest_types::IntervalEstimate;
use serde::{Deserialize, Serialize};

use crate::errors::{DecisionError, Result};

/// Projected outcome for one lift value
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct ImpactScenario {
    /// Absolute conversion lift assumed by the scenario
    pub absolute_lift: f64,
    /// `daily_sessions · days · absolute_lift`
    pub extra_orders: f64,
    /// `extra_orders · average_order_value`
    pub revenue_uplift: f64,
}

/// Impact at the lower bound, point and upper bound of the lift interval
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct ImpactProjection {
    pub daily_sessions: f64,
    pub days: f64,
    pub average_order_value: f64,
    pub conservative: ImpactScenario,
    pub expected: ImpactScenario,
    pub optimistic: ImpactScenario,
}

/// Project extra orders and revenue over `days` of full traffic
///
/// A negative bound yields a negative scenario; nothing is clipped at zero.
pub fn project_impact(
    daily_sessions: f64,
    days: f64,
    average_order_value: f64,
    lift_ci: &IntervalEstimate,
) -> Result<ImpactProjection> {
    if !daily_sessions.is_finite() || daily_sessions < 0.0 {
        return Err(DecisionError::invalid(format!(
            "daily sessions must be non-negative, got {daily_sessions}"
        )));
    }
    if !days.is_finite() || days < 0.0 {
        return Err(DecisionError::invalid(format!(
            "projection days must be non-negative, got {days}"
        )));
    }
    if !average_order_value.is_finite() || average_order_value < 0.0 {
        return Err(DecisionError::invalid(format!(
            "average order value must be non-negative, got {average_order_value}"
        )));
    }

    let sessions = daily_sessions * days;
    let scenario = |absolute_lift: f64| {
        let extra_orders = sessions * absolute_lift;
        ImpactScenario {
            absolute_lift,
            extra_orders,
            revenue_uplift: extra_orders * average_order_value,
        }
    };

    Ok(ImpactProjection {
        daily_sessions,
        days,
        average_order_value,
        conservative: scenario(lift_ci.lower),
        expected: scenario(lift_ci.point),
        optimistic: scenario(lift_ci.upper),
    })
}
