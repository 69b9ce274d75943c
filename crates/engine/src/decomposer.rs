use chrono::{Duration, NaiveDate, NaiveTime};

use crate::config::ServiceDurations;
use crate::model::{HairdressingService, Reservation, Task, TaskService};

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecomposeError {
    #[error("Service '{0}' has no default duration configured")]
    MissingDuration(HairdressingService),
}

// ---------------------------------------------------------------------------
// Decomposition
// ---------------------------------------------------------------------------

/// Expand a reservation's hairdressing services into chained tasks anchored
/// at `anchor_date`/`anchor_time`.
///
/// Services are visited in encounter order (entry order, then the order
/// inside each entry). Each task starts where the previous one ended, so the
/// result is contiguous and its span is the sum of the default durations.
/// A reservation without hairdressing services yields no tasks.
///
/// Tasks that run past midnight carry the following day's date.
pub fn decompose(
    reservation: &Reservation,
    anchor_date: NaiveDate,
    anchor_time: NaiveTime,
    durations: &ServiceDurations,
) -> Result<Vec<Task>, DecomposeError> {
    let mut cursor = anchor_date.and_time(anchor_time);
    let mut tasks = Vec::new();

    for (index, (pet_index, service)) in reservation.hairdressing_services().enumerate() {
        let duration_mins = durations
            .get(service)
            .ok_or(DecomposeError::MissingDuration(service))?;

        tasks.push(Task {
            id: format!("{}-{}", reservation.id, index),
            reservation_id: reservation.id.clone(),
            service: TaskService {
                service_type: service,
                pet_index,
            },
            date: cursor.date(),
            time: cursor.time(),
            duration_mins,
        });

        cursor += Duration::minutes(duration_mins as i64);
    }

    Ok(tasks)
}

/// Re-anchor tasks by `delta`, keeping their ids, order and durations.
pub fn shift_tasks(tasks: &mut [Task], delta: Duration) {
    if delta.is_zero() {
        return;
    }
    for task in tasks.iter_mut() {
        let moved = task.starts_at() + delta;
        task.date = moved.date();
        task.time = moved.time();
    }
}

pub fn total_duration(tasks: &[Task]) -> u32 {
    tasks.iter().map(|t| t.duration_mins).sum()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{
        AdditionalService, BookingSource, Client, HairdressingKind, HairdressingRequest, Pet,
        ReservationStatus,
    };
    use proptest::prelude::*;

    fn make_reservation(id: &str, services: Vec<AdditionalService>) -> Reservation {
        Reservation {
            id: id.to_string(),
            source: BookingSource::External,
            date: None,
            time: None,
            client: Client {
                name: "Ana".to_string(),
                phone: "600000000".to_string(),
                email: None,
            },
            pet: Pet {
                name: "Toby".to_string(),
                breed: "Poodle".to_string(),
                size: "medium".to_string(),
                weight: 12.0,
            },
            additional_services: services,
            status: ReservationStatus::Confirmed,
            duration: None,
        }
    }

    fn d() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 20).unwrap()
    }

    fn t(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    #[test]
    fn test_bath_then_spa_chain() {
        let r = make_reservation(
            "r1",
            vec![AdditionalService::hairdressing(vec![
                HairdressingService::BathAndBrush,
                HairdressingService::Spa,
            ])],
        );
        let tasks = decompose(&r, d(), t(9, 0), &ServiceDurations::default()).unwrap();

        assert_eq!(tasks.len(), 2);
        assert_eq!(tasks[0].id, "r1-0");
        assert_eq!(tasks[0].time, t(9, 0));
        assert_eq!(tasks[0].duration_mins, 60);
        assert_eq!(tasks[1].id, "r1-1");
        assert_eq!(tasks[1].time, t(10, 0));
        assert_eq!(tasks[1].duration_mins, 45);
        assert_eq!(tasks[1].ends_at(), d().and_time(t(10, 45)));
    }

    #[test]
    fn test_entries_preserve_order_and_pet_index() {
        let r = make_reservation(
            "r2",
            vec![
                AdditionalService::Other(serde_json::json!({ "kind": "transport" })),
                AdditionalService::hairdressing(vec![HairdressingService::Brushing]),
                AdditionalService::Hairdressing(HairdressingRequest {
                    kind: HairdressingKind::Hairdressing,
                    services: vec![HairdressingService::KnotRemoval, HairdressingService::Spa],
                    pet_index: 1,
                }),
            ],
        );
        let tasks = decompose(&r, d(), t(11, 0), &ServiceDurations::default()).unwrap();
        let kinds: Vec<_> = tasks.iter().map(|t| t.service.service_type).collect();
        assert_eq!(
            kinds,
            vec![
                HairdressingService::Brushing,
                HairdressingService::KnotRemoval,
                HairdressingService::Spa
            ]
        );
        assert_eq!(tasks[0].service.pet_index, 0);
        assert_eq!(tasks[2].service.pet_index, 1);
        assert_eq!(tasks[2].time, t(12, 0));
    }

    #[test]
    fn test_no_hairdressing_yields_no_tasks() {
        let r = make_reservation(
            "r3",
            vec![AdditionalService::Other(serde_json::json!({ "kind": "medication" }))],
        );
        let tasks = decompose(&r, d(), t(9, 0), &ServiceDurations::default()).unwrap();
        assert!(tasks.is_empty());
    }

    #[test]
    fn test_missing_duration_error() {
        let durations: ServiceDurations = [(HairdressingService::Spa, 45)].into_iter().collect();
        let r = make_reservation(
            "r4",
            vec![AdditionalService::hairdressing(vec![HairdressingService::Stripping])],
        );
        let err = decompose(&r, d(), t(9, 0), &durations).unwrap_err();
        assert_eq!(err, DecomposeError::MissingDuration(HairdressingService::Stripping));
    }

    #[test]
    fn test_rolls_past_midnight() {
        let r = make_reservation(
            "r5",
            vec![AdditionalService::hairdressing(vec![
                HairdressingService::Stripping,
                HairdressingService::Brushing,
            ])],
        );
        let tasks = decompose(&r, d(), t(23, 0), &ServiceDurations::default()).unwrap();
        assert_eq!(tasks[1].date, d().succ_opt().unwrap());
        assert_eq!(tasks[1].time, t(1, 0));
    }

    #[test]
    fn test_shift_preserves_shape() {
        let r = make_reservation(
            "r6",
            vec![AdditionalService::hairdressing(vec![
                HairdressingService::BathAndTrim,
                HairdressingService::Brushing,
            ])],
        );
        let mut tasks = decompose(&r, d(), t(9, 0), &ServiceDurations::default()).unwrap();
        shift_tasks(&mut tasks, Duration::days(1) + Duration::hours(2));

        assert_eq!(tasks[0].date, d().succ_opt().unwrap());
        assert_eq!(tasks[0].time, t(11, 0));
        assert_eq!(tasks[1].time, t(12, 30));
        assert_eq!(tasks[0].id, "r6-0");
        assert_eq!(total_duration(&tasks), 120);
    }

    fn any_service() -> impl Strategy<Value = HairdressingService> {
        proptest::sample::select(HairdressingService::ALL.to_vec())
    }

    proptest! {
        #[test]
        fn prop_decomposition_is_deterministic_and_conserves_duration(
            entries in proptest::collection::vec(proptest::collection::vec(any_service(), 0..4), 0..4),
            hour in 6u32..20,
        ) {
            let services = entries.into_iter().map(AdditionalService::hairdressing).collect();
            let r = make_reservation("p", services);
            let durations = ServiceDurations::default();

            let first = decompose(&r, d(), t(hour, 0), &durations).unwrap();
            let second = decompose(&r, d(), t(hour, 0), &durations).unwrap();
            prop_assert_eq!(&first, &second);

            let expected: u32 = r
                .hairdressing_services()
                .map(|(_, s)| durations.get(s).unwrap())
                .sum();
            prop_assert_eq!(total_duration(&first), expected);

            if let Some(head) = first.first() {
                prop_assert_eq!(head.time, t(hour, 0));
            }
            for pair in first.windows(2) {
                prop_assert_eq!(pair[0].ends_at(), pair[1].starts_at());
            }
        }
    }
}
