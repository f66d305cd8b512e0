//! Temperature rules shared by every display and alerting context.
//!
//! Two independent thresholds live here: the alert threshold (±3 °C) decides
//! whether a shipment is alerting, and the display bands (±2 / ±4 °C) decide
//! how a reading is classified. They disagree between 3 and 4 °C of
//! deviation, where a shipment is both alerting and only a warning.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::str::FromStr;

use crate::error::MonitorError;
use crate::models::{Shipment, TemperatureReading};

/// Deviation beyond which a shipment is alerting.
pub const ALERT_THRESHOLD: f64 = 3.0;
/// Upper bound (inclusive) of the normal display band.
pub const NORMAL_BAND: f64 = 2.0;
/// Upper bound (inclusive) of the warning display band.
pub const WARNING_BAND: f64 = 4.0;

pub const UNKNOWN_TEMPERATURE: &str = "N/A";
pub const DEGREE_SUFFIX: &str = "°C";

/// Number of readings plotted on a shipment history chart.
pub const CHART_WINDOW: usize = 20;

pub fn deviation(current: f64, target: f64) -> f64 {
    (current - target).abs()
}

/// Alert rule with the default threshold. Unknown temperature never alerts.
pub fn is_temperature_alert(current: Option<f64>, target: f64) -> bool {
    exceeds_threshold(current, target, ALERT_THRESHOLD)
}

pub fn exceeds_threshold(current: Option<f64>, target: f64, threshold: f64) -> bool {
    match current {
        Some(current) => deviation(current, target) > threshold,
        None => false,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TemperatureStatus {
    Normal,
    Warning,
    Critical,
    Unknown,
}

impl TemperatureStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TemperatureStatus::Normal => "normal",
            TemperatureStatus::Warning => "warning",
            TemperatureStatus::Critical => "critical",
            TemperatureStatus::Unknown => "unknown",
        }
    }
}

impl fmt::Display for TemperatureStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Three-band display classification.
pub fn classify(current: Option<f64>, target: f64) -> TemperatureStatus {
    let Some(current) = current else {
        return TemperatureStatus::Unknown;
    };

    let diff = deviation(current, target);
    if diff <= NORMAL_BAND {
        TemperatureStatus::Normal
    } else if diff <= WARNING_BAND {
        TemperatureStatus::Warning
    } else {
        TemperatureStatus::Critical
    }
}

/// Renders a temperature with one decimal place, or `N/A` when unknown.
pub fn format_temperature(temperature: Option<f64>) -> String {
    match temperature {
        Some(t) => {
            let formatted = format!("{:.1}", t);
            // small negatives round to "-0.0"
            let formatted = match formatted.strip_prefix('-') {
                Some(magnitude) if magnitude == "0.0" => magnitude.to_string(),
                _ => formatted,
            };
            format!("{}{}", formatted, DEGREE_SUFFIX)
        }
        None => UNKNOWN_TEMPERATURE.to_string(),
    }
}

/// Inverse of [`format_temperature`]. The degree suffix is optional.
pub fn parse_temperature(input: &str) -> Result<Option<f64>, MonitorError> {
    let trimmed = input.trim();
    if trimmed == UNKNOWN_TEMPERATURE {
        return Ok(None);
    }

    let number = trimmed.strip_suffix(DEGREE_SUFFIX).unwrap_or(trimmed).trim();
    number
        .parse::<f64>()
        .ok()
        .filter(|t| t.is_finite())
        .map(Some)
        .ok_or_else(|| MonitorError::Validation(format!("Invalid temperature: '{}'", input)))
}

/// Filter used by the temperature overview list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StatusFilter {
    #[default]
    All,
    Normal,
    Warning,
    Critical,
}

impl StatusFilter {
    /// `All` matches everything; the banded filters never match an unknown temperature.
    pub fn matches(&self, current: Option<f64>, target: f64) -> bool {
        let status = classify(current, target);
        match self {
            StatusFilter::All => true,
            StatusFilter::Normal => status == TemperatureStatus::Normal,
            StatusFilter::Warning => status == TemperatureStatus::Warning,
            StatusFilter::Critical => status == TemperatureStatus::Critical,
        }
    }

    pub fn apply<'a>(&self, shipments: &'a [Shipment]) -> Vec<&'a Shipment> {
        shipments
            .iter()
            .filter(|s| self.matches(s.current_temperature, s.target_temperature))
            .collect()
    }
}

impl FromStr for StatusFilter {
    type Err = MonitorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "all" => Ok(StatusFilter::All),
            "normal" => Ok(StatusFilter::Normal),
            "warning" => Ok(StatusFilter::Warning),
            "critical" => Ok(StatusFilter::Critical),
            other => Err(MonitorError::Validation(format!("Unknown filter: '{}'", other))),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatusSummary {
    pub normal: usize,
    pub warning: usize,
    pub critical: usize,
    pub unknown: usize,
}

impl StatusSummary {
    pub fn total(&self) -> usize {
        self.normal + self.warning + self.critical + self.unknown
    }
}

pub fn summarize(shipments: &[Shipment]) -> StatusSummary {
    shipments.iter().fold(StatusSummary::default(), |mut acc, s| {
        match classify(s.current_temperature, s.target_temperature) {
            TemperatureStatus::Normal => acc.normal += 1,
            TemperatureStatus::Warning => acc.warning += 1,
            TemperatureStatus::Critical => acc.critical += 1,
            TemperatureStatus::Unknown => acc.unknown += 1,
        }
        acc
    })
}

/// Reference lines drawn around the target on a history chart.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct AlertBand {
    pub lower: f64,
    pub target: f64,
    pub upper: f64,
}

pub fn alert_band(target: f64) -> AlertBand {
    AlertBand {
        lower: target - ALERT_THRESHOLD,
        target,
        upper: target + ALERT_THRESHOLD,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChartPoint {
    pub recorded_at: DateTime<Utc>,
    pub temperature: f64,
    pub is_alert: bool,
}

/// Takes readings newest first and returns the latest [`CHART_WINDOW`] of
/// them oldest first.
pub fn chart_series(readings_newest_first: &[TemperatureReading]) -> Vec<ChartPoint> {
    let mut points: Vec<ChartPoint> = readings_newest_first
        .iter()
        .take(CHART_WINDOW)
        .map(|r| ChartPoint {
            recorded_at: r.recorded_at,
            temperature: r.temperature,
            is_alert: r.is_alert,
        })
        .collect();
    points.reverse();
    points
}
