//! Numeric threshold evaluation.

use serde::{Deserialize, Serialize};

use crate::status::SensorStatus;

/// Which way a value has to move to get worse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThresholdDirection {
    /// Higher is worse.
    #[default]
    Exceeds,
    /// Lower is worse.
    Falls,
}

/// Optional warning/critical boundaries for a numeric sensor.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Thresholds {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub warning: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub critical: Option<f64>,
    #[serde(default, rename = "type")]
    pub direction: ThresholdDirection,
}

impl Thresholds {
    pub const fn exceeds(warning: Option<f64>, critical: Option<f64>) -> Self {
        Self {
            warning,
            critical,
            direction: ThresholdDirection::Exceeds,
        }
    }

    pub const fn falls(warning: Option<f64>, critical: Option<f64>) -> Self {
        Self {
            warning,
            critical,
            direction: ThresholdDirection::Falls,
        }
    }

    pub const fn is_defined(&self) -> bool {
        self.warning.is_some() || self.critical.is_some()
    }

    fn crossed(&self, value: f64, bound: f64) -> bool {
        match self.direction {
            ThresholdDirection::Exceeds => value >= bound,
            ThresholdDirection::Falls => value <= bound,
        }
    }

    fn crossed_bound(&self, value: f64) -> Option<(SensorStatus, f64)> {
        if let Some(critical) = self.critical.filter(|c| self.crossed(value, *c)) {
            return Some((SensorStatus::Critical, critical));
        }
        self.warning
            .filter(|w| self.crossed(value, *w))
            .map(|w| (SensorStatus::Warning, w))
    }
}

/// Map a value to a status. Boundaries are inclusive; unset boundaries are
/// skipped, so a sensor without thresholds always evaluates to OK.
pub fn evaluate(value: f64, thresholds: &Thresholds) -> SensorStatus {
    thresholds
        .crossed_bound(value)
        .map_or(SensorStatus::Ok, |(status, _)| status)
}

/// Status message describing which boundary was crossed, if any.
pub fn crossing_message(value: f64, thresholds: &Thresholds) -> Option<String> {
    let (_, bound) = thresholds.crossed_bound(value)?;
    let bound = crate::result::SensorValue::Number(bound);
    Some(match thresholds.direction {
        ThresholdDirection::Exceeds => format!("exceeds {bound}"),
        ThresholdDirection::Falls => format!("falls below {bound}"),
    })
}
