use chrono::{Datelike, Duration, NaiveDate, NaiveTime, Timelike};

use crate::config::{ConfigError, SalonConfig};
use crate::model::Slot;

/// Number of reservations a single slot can hold at once (two stations).
pub const SLOT_CAPACITY: usize = 2;

/// Day/week addressing over the salon's business hours.
#[derive(Debug, Clone)]
pub struct TimeGrid {
    open_hour: u32,
    close_hour: u32,
    step_mins: u32,
    days_per_week: u32,
}

impl TimeGrid {
    /// Build the grid for `config`. The config is validated first, so a
    /// grid never holds a zero step or an empty business day.
    pub fn new(config: &SalonConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            open_hour: config.open_hour,
            close_hour: config.close_hour,
            step_mins: config.slot_step_mins,
            days_per_week: config.days_per_week,
        })
    }

    pub fn step_mins(&self) -> u32 {
        self.step_mins
    }

    /// Closing time of the business day, as minutes after midnight.
    pub fn closing_minute(&self) -> u32 {
        self.close_hour * 60
    }

    /// Every slot of one day, from opening to the last step before closing.
    pub fn enumerate_day(&self, date: NaiveDate) -> Vec<Slot> {
        (self.open_hour * 60..self.close_hour * 60)
            .step_by(self.step_mins as usize)
            .filter_map(|m| NaiveTime::from_hms_opt(m / 60, m % 60, 0))
            .map(|time| Slot { date, time })
            .collect()
    }

    /// One column of slots per business day, starting at `week_start`.
    pub fn enumerate_week(&self, week_start: NaiveDate) -> Vec<Vec<Slot>> {
        (0..self.days_per_week)
            .map(|d| self.enumerate_day(week_start + Duration::days(d as i64)))
            .collect()
    }

    /// Monday of the week containing `date`.
    pub fn week_start_of(date: NaiveDate) -> NaiveDate {
        date - Duration::days(date.weekday().num_days_from_monday() as i64)
    }

    /// Whether the slot is inside business hours, falls on a business day and
    /// is aligned to the grid step.
    pub fn contains(&self, slot: &Slot) -> bool {
        if slot.date.weekday().num_days_from_monday() >= self.days_per_week {
            return false;
        }
        let minute = slot.time.hour() * 60 + slot.time.minute();
        slot.time.second() == 0
            && minute >= self.open_hour * 60
            && minute < self.close_hour * 60
            && (minute - self.open_hour * 60) % self.step_mins == 0
    }
}
