use std::collections::{HashMap, HashSet};

use chrono::Timelike;
use serde::Serialize;

use crate::config::SalonConfig;
use crate::decomposer::decompose;
use crate::grid::{TimeGrid, SLOT_CAPACITY};
use crate::model::{Reservation, ReservationStatus, Slot};

// ---------------------------------------------------------------------------
// Validation result types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct ValidationResult {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ValidationResult {
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Validate implementation
// ---------------------------------------------------------------------------

/// Check a batch of reservations before it is loaded into a store. Errors
/// describe data the store would have to repair on load; warnings are
/// advisory. Errors are listed before warnings.
pub fn validate(reservations: &[Reservation], config: &SalonConfig) -> ValidationResult {
    let mut errors: Vec<String> = Vec::new();
    let mut warnings: Vec<String> = Vec::new();
    let grid = match TimeGrid::new(config) {
        Ok(grid) => grid,
        Err(e) => {
            errors.push(e.to_string());
            return ValidationResult { errors, warnings };
        }
    };

    // -----------------------------------------------------------------------
    // Error: duplicate reservation IDs
    // -----------------------------------------------------------------------
    {
        let mut seen: HashSet<&str> = HashSet::new();
        for r in reservations {
            if !seen.insert(r.id.as_str()) {
                errors.push(format!(
                    "Duplicate reservation ID '{}' -- each reservation must have a unique ID",
                    r.id
                ));
            }
        }
    }

    // -----------------------------------------------------------------------
    // Error: time without date
    // -----------------------------------------------------------------------
    for r in reservations {
        if r.time.is_some() && r.date.is_none() {
            errors.push(format!(
                "Reservation '{}' has a time but no date -- it cannot hold a slot",
                r.id
            ));
        }
    }

    // -----------------------------------------------------------------------
    // Error: slot over capacity
    // -----------------------------------------------------------------------
    {
        let mut per_slot: HashMap<Slot, Vec<&str>> = HashMap::new();
        for r in reservations {
            if let Some(slot) = r.slot() {
                per_slot.entry(slot).or_default().push(r.id.as_str());
            }
        }
        let mut crowded: Vec<_> = per_slot
            .into_iter()
            .filter(|(_, ids)| ids.len() > SLOT_CAPACITY)
            .collect();
        crowded.sort_by_key(|(slot, _)| *slot);
        for (slot, ids) in crowded {
            errors.push(format!(
                "Slot {} holds {} reservations ({}) -- capacity is {}",
                slot,
                ids.len(),
                ids.join(", "),
                SLOT_CAPACITY
            ));
        }
    }

    // -----------------------------------------------------------------------
    // Warnings
    // -----------------------------------------------------------------------
    for r in reservations {
        if !r.has_hairdressing() {
            warnings.push(format!(
                "Reservation '{}' has no hairdressing services -- it will hold a slot without tasks",
                r.id
            ));
        }

        let Some(slot) = r.slot() else {
            continue;
        };

        if !grid.contains(&slot) {
            warnings.push(format!(
                "Reservation '{}' at {} is outside business hours or off the {}-minute grid",
                r.id,
                slot,
                grid.step_mins()
            ));
        }

        if r.status == ReservationStatus::Pending {
            warnings.push(format!(
                "Reservation '{}' holds slot {} but is still pending confirmation",
                r.id, slot
            ));
        }

        match decompose(r, slot.date, slot.time, &config.service_durations) {
            Ok(tasks) => {
                if let Some(last) = tasks.last() {
                    let end = last.ends_at();
                    let end_minute = end.hour() * 60 + end.minute();
                    if end.date() > slot.date || end_minute > grid.closing_minute() {
                        warnings.push(format!(
                            "Reservation '{}' runs until {} -- past closing time",
                            r.id,
                            end.format("%Y-%m-%d %H:%M")
                        ));
                    }
                }
            }
            Err(e) => errors.push(format!("Reservation '{}': {}", r.id, e)),
        }
    }

    ValidationResult { errors, warnings }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{AdditionalService, BookingSource, Client, HairdressingService, Pet};
    use chrono::{NaiveDate, NaiveTime};

    fn make(id: &str, date: Option<u32>, time: Option<(u32, u32)>, services: Vec<HairdressingService>) -> Reservation {
        Reservation {
            id: id.to_string(),
            source: BookingSource::Hotel,
            date: date.map(|d| NaiveDate::from_ymd_opt(2024, 3, d).unwrap()),
            time: time.map(|(h, m)| NaiveTime::from_hms_opt(h, m, 0).unwrap()),
            client: Client {
                name: "Pau".to_string(),
                phone: "633000000".to_string(),
                email: None,
            },
            pet: Pet {
                name: "Nala".to_string(),
                breed: "Mestizo".to_string(),
                size: "medium".to_string(),
                weight: 15.0,
            },
            additional_services: vec![AdditionalService::hairdressing(services)],
            status: ReservationStatus::Confirmed,
            duration: None,
        }
    }

    #[test]
    fn test_clean_batch() {
        let batch = vec![
            make("a", Some(20), Some((10, 0)), vec![HairdressingService::BathAndBrush]),
            make("b", None, None, vec![HairdressingService::Spa]),
        ];
        let result = validate(&batch, &SalonConfig::default());
        assert!(result.is_ok(), "{:?}", result.errors);
        assert!(result.warnings.is_empty(), "{:?}", result.warnings);
    }

    #[test]
    fn test_errors() {
        let batch = vec![
            make("a", Some(20), Some((10, 0)), vec![HairdressingService::Spa]),
            make("a", None, None, vec![HairdressingService::Spa]),
            make("b", None, Some((10, 0)), vec![HairdressingService::Spa]),
            make("c", Some(20), Some((10, 0)), vec![HairdressingService::Spa]),
            make("d", Some(20), Some((10, 0)), vec![HairdressingService::Spa]),
        ];
        let result = validate(&batch, &SalonConfig::default());
        assert_eq!(result.errors.len(), 3, "{:?}", result.errors);
        assert!(result.errors[0].contains("Duplicate"));
        assert!(result.errors[1].contains("no date"));
        assert!(result.errors[2].contains("capacity is 2"));
    }

    #[test]
    fn test_warnings() {
        let mut pending = make("p", Some(20), Some((11, 0)), vec![HairdressingService::Brushing]);
        pending.status = ReservationStatus::Pending;
        let batch = vec![
            make("empty", None, None, vec![]),
            make("odd", Some(20), Some((10, 30)), vec![HairdressingService::Brushing]),
            make("late", Some(20), Some((18, 0)), vec![HairdressingService::Stripping]),
            pending,
        ];
        let result = validate(&batch, &SalonConfig::default());
        assert!(result.is_ok());
        assert_eq!(result.warnings.len(), 4, "{:?}", result.warnings);
        assert!(result.warnings[0].contains("no hairdressing"));
        assert!(result.warnings[1].contains("off the 60-minute grid"));
        assert!(result.warnings[2].contains("past closing"));
        assert!(result.warnings[3].contains("pending"));
    }

    #[test]
    fn test_invalid_config_reported() {
        let config = SalonConfig {
            slot_step_mins: 0,
            ..SalonConfig::default()
        };
        let batch = vec![make("a", Some(20), Some((10, 0)), vec![HairdressingService::Spa])];
        let result = validate(&batch, &config);
        assert!(!result.is_ok());
        assert!(result.errors[0].contains("slotStepMins"), "{:?}", result.errors);
    }
}
