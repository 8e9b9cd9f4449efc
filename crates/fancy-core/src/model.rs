// ── Backend payload types ──
//
// Shapes of the values the fan-control service sends back. Owned by the
// backend; this side only decodes them.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Sensor name to degrees Celsius.
pub type Temperatures = HashMap<String, f64>;

/// Percent per fan index.
pub type FanSpeeds = Vec<f64>;

/// Period of the polling engine.
///
/// On the wire it is a number of milliseconds where `0` means disabled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "u64", into = "u64")]
pub enum PollInterval {
    #[default]
    Disabled,
    Every(Duration),
}

impl PollInterval {
    pub fn from_millis(ms: u64) -> Self {
        if ms == 0 {
            Self::Disabled
        } else {
            Self::Every(Duration::from_millis(ms))
        }
    }

    pub fn period(self) -> Option<Duration> {
        match self {
            Self::Disabled => None,
            Self::Every(period) if period.is_zero() => None,
            Self::Every(period) => Some(period),
        }
    }

    pub fn as_millis(self) -> u64 {
        self.period()
            .map_or(0, |p| u64::try_from(p.as_millis()).unwrap_or(u64::MAX))
    }
}

impl From<u64> for PollInterval {
    fn from(ms: u64) -> Self {
        Self::from_millis(ms)
    }
}

impl From<PollInterval> for u64 {
    fn from(interval: PollInterval) -> Self {
        interval.as_millis()
    }
}

impl fmt::Display for PollInterval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.period() {
            Some(period) => write!(f, "every {}ms", period.as_millis()),
            None => f.write_str("disabled"),
        }
    }
}

/// One step of a fan curve.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct TemperatureThreshold {
    pub up_threshold: u32,
    pub down_threshold: u32,
    pub fan_speed: f64,
}

/// An entry of the backend's configs list.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ConfigInfo {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub path: Option<String>,
    /// Fan curves keyed by fan name.
    #[serde(default)]
    pub thresholds: BTreeMap<String, Vec<TemperatureThreshold>>,
}

impl ConfigInfo {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// `name`, or `path` when the name is empty.
    pub fn display_name(&self) -> &str {
        if self.name.is_empty() {
            self.path.as_deref().unwrap_or_default()
        } else {
            &self.name
        }
    }
}
