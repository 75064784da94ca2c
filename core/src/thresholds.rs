use crate::reading::CanonicalReading;
use cold_storage_protocol::SensorGroup;
use serde::{Deserialize, Serialize};
use std::fmt;
use strum::Display;

/// Fixed limits every reading is checked against.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Limits {
    pub temp_max: f64,
    pub temp_min: f64,
    pub humidity_max: f64,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            temp_max: 20.0,
            temp_min: 0.0,
            humidity_max: 90.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "camelCase")]
pub enum AlertKind {
    #[strum(to_string = "temperature high")]
    TempHigh,
    #[strum(to_string = "temperature low")]
    TempLow,
    #[strum(to_string = "humidity high")]
    HumidityHigh,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Display)]
pub enum Severity {
    Warning,
    Critical,
}

impl AlertKind {
    pub fn severity(&self) -> Severity {
        match self {
            Self::TempHigh => Severity::Critical,
            Self::TempLow | Self::HumidityHigh => Severity::Warning,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AlertEvent {
    pub group: SensorGroup,
    pub kind: AlertKind,
    pub value: f64,
    pub limit: f64,
}

impl fmt::Display for AlertEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (unit, cmp) = match self.kind {
            AlertKind::TempHigh => ("°C", ">"),
            AlertKind::TempLow => ("°C", "<"),
            AlertKind::HumidityHigh => ("%", ">"),
        };

        write!(
            f,
            "{}: {} ({:.1}{unit} {cmp} {:.1}{unit})",
            self.group.unit_name(),
            self.kind,
            self.value,
            self.limit
        )
    }
}

/// Outcome of checking one reading.
#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    pub group: SensorGroup,

    /// Alerts in check order: at most one temperature alert, then humidity.
    pub alerts: Vec<AlertEvent>,

    /// Temperature sits within limits, any temperature alert previously shown for the group
    /// should be cleared.
    pub temperature_in_band: bool,
}

fn upper_threshold(value: f64, limit: f64) -> bool {
    value > limit
}

fn lower_threshold(value: f64, limit: f64) -> bool {
    value < limit
}

pub fn evaluate(reading: &CanonicalReading, limits: &Limits) -> Evaluation {
    let mut alerts = Vec::new();
    let alert = |kind, value, limit| AlertEvent {
        group: reading.group,
        kind,
        value,
        limit,
    };

    let temperature_in_band = if upper_threshold(reading.temperature, limits.temp_max) {
        alerts.push(alert(
            AlertKind::TempHigh,
            reading.temperature,
            limits.temp_max,
        ));
        false
    } else if lower_threshold(reading.temperature, limits.temp_min) {
        alerts.push(alert(
            AlertKind::TempLow,
            reading.temperature,
            limits.temp_min,
        ));
        false
    } else {
        true
    };

    if upper_threshold(reading.humidity, limits.humidity_max) {
        alerts.push(alert(
            AlertKind::HumidityHigh,
            reading.humidity,
            limits.humidity_max,
        ));
    }

    Evaluation {
        group: reading.group,
        alerts,
        temperature_in_band,
    }
}

/// Evaluates several readings, milk before vegetables regardless of input order.
pub fn evaluate_all(readings: &[CanonicalReading], limits: &Limits) -> Vec<Evaluation> {
    let mut readings: Vec<&CanonicalReading> = readings.iter().collect();
    readings.sort_by_key(|r| r.group);
    readings.into_iter().map(|r| evaluate(r, limits)).collect()
}
