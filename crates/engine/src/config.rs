//! Salon configuration: business hours, grid granularity, gesture timing and
//! the per-service default duration table.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::model::HairdressingService;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Invalid config JSON: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// Minutes per hairdressing service type.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct ServiceDurations(BTreeMap<HairdressingService, u32>);

impl ServiceDurations {
    pub fn get(&self, service: HairdressingService) -> Option<u32> {
        self.0.get(&service).copied()
    }

    pub fn set(&mut self, service: HairdressingService, mins: u32) {
        self.0.insert(service, mins);
    }

    pub fn iter(&self) -> impl Iterator<Item = (HairdressingService, u32)> + '_ {
        self.0.iter().map(|(s, m)| (*s, *m))
    }
}

impl Default for ServiceDurations {
    fn default() -> Self {
        use HairdressingService::*;
        ServiceDurations(BTreeMap::from([
            (BathAndBrush, 60),
            (BathAndTrim, 90),
            (Stripping, 120),
            (Deshedding, 90),
            (Brushing, 30),
            (Spa, 45),
            (SpaOzone, 60),
            (KnotRemoval, 30),
            (HeavilySoiled, 30),
        ]))
    }
}

impl FromIterator<(HairdressingService, u32)> for ServiceDurations {
    fn from_iter<I: IntoIterator<Item = (HairdressingService, u32)>>(iter: I) -> Self {
        ServiceDurations(iter.into_iter().collect())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SalonConfig {
    /// First bookable hour (inclusive).
    #[serde(default = "default_open_hour")]
    pub open_hour: u32,
    /// Closing hour (exclusive).
    #[serde(default = "default_close_hour")]
    pub close_hour: u32,
    #[serde(default = "default_slot_step_mins")]
    pub slot_step_mins: u32,
    /// 6 (Monday to Saturday) or 7.
    #[serde(default = "default_days_per_week")]
    pub days_per_week: u32,
    #[serde(default = "default_double_tap_window_ms")]
    pub double_tap_window_ms: u64,
    #[serde(default)]
    pub service_durations: ServiceDurations,
}

fn default_open_hour() -> u32 {
    9
}

fn default_close_hour() -> u32 {
    19
}

fn default_slot_step_mins() -> u32 {
    60
}

fn default_days_per_week() -> u32 {
    6
}

fn default_double_tap_window_ms() -> u64 {
    300
}

impl Default for SalonConfig {
    fn default() -> Self {
        Self {
            open_hour: default_open_hour(),
            close_hour: default_close_hour(),
            slot_step_mins: default_slot_step_mins(),
            days_per_week: default_days_per_week(),
            double_tap_window_ms: default_double_tap_window_ms(),
            service_durations: ServiceDurations::default(),
        }
    }
}

impl SalonConfig {
    pub fn from_json_str(raw: &str) -> Result<Self, ConfigError> {
        let config: SalonConfig = serde_json::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        debug!(path = %path.display(), "SalonConfig::load");
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json_str(&raw)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.close_hour > 24 {
            return Err(ConfigError::Invalid(format!(
                "closeHour {} is past midnight",
                self.close_hour
            )));
        }
        if self.open_hour >= self.close_hour {
            return Err(ConfigError::Invalid(format!(
                "openHour {} must be before closeHour {}",
                self.open_hour, self.close_hour
            )));
        }
        let day_mins = (self.close_hour - self.open_hour) * 60;
        if self.slot_step_mins == 0 || day_mins % self.slot_step_mins != 0 {
            return Err(ConfigError::Invalid(format!(
                "slotStepMins {} must evenly divide the {}-minute business day",
                self.slot_step_mins, day_mins
            )));
        }
        if !(6..=7).contains(&self.days_per_week) {
            return Err(ConfigError::Invalid(format!(
                "daysPerWeek must be 6 or 7, got {}",
                self.days_per_week
            )));
        }
        for service in HairdressingService::ALL {
            match self.service_durations.get(service) {
                None => {
                    return Err(ConfigError::Invalid(format!(
                        "service '{}' has no default duration",
                        service
                    )))
                }
                Some(0) => {
                    return Err(ConfigError::Invalid(format!(
                        "service '{}' has a zero duration",
                        service
                    )))
                }
                Some(_) => {}
            }
        }
        Ok(())
    }
}
