//! Power band classification with appliance suggestions.

use serde::Serialize;
use std::fmt;

pub const HIGH_POWER_THRESHOLD: f64 = 200.0;
pub const MEDIUM_POWER_THRESHOLD: f64 = 100.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PowerBand {
    High,
    Medium,
    Low,
}

impl PowerBand {
    /// Thresholds are exclusive: exactly 200 is Medium, exactly 100 is Low.
    pub fn classify(power: f64) -> Self {
        if power > HIGH_POWER_THRESHOLD {
            PowerBand::High
        } else if power > MEDIUM_POWER_THRESHOLD {
            PowerBand::Medium
        } else {
            PowerBand::Low
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            PowerBand::High => "High power",
            PowerBand::Medium => "Medium power",
            PowerBand::Low => "Low power",
        }
    }

    pub fn devices(self) -> &'static [&'static str] {
        match self {
            PowerBand::High => &["washing machine", "heater", "multiple devices"],
            PowerBand::Medium => &["TV", "laptop", "lights"],
            PowerBand::Low => &["Only essential devices, ie phone charging"],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Recommendation {
    pub band: PowerBand,
    pub label: &'static str,
    pub devices: Vec<&'static str>,
}

pub fn recommend(power: f64) -> Recommendation {
    let band = PowerBand::classify(power);
    Recommendation {
        band,
        label: band.label(),
        devices: band.devices().to_vec(),
    }
}

impl fmt::Display for Recommendation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {{Recommendations: {}}}",
            self.label,
            self.devices.join(", ")
        )
    }
}
