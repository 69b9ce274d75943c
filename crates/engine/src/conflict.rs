use serde::Serialize;

use crate::model::Task;

/// A pair of tasks whose half-open `[start, end)` windows intersect on the
/// same day.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Conflict {
    pub task_id: String,
    pub with_task_id: String,
    pub with_reservation_id: String,
}

/// `a` and `b` overlap when they share a date and
/// `a.start < b.end && a.end > b.start`. A task never overlaps itself.
pub fn overlaps(a: &Task, b: &Task) -> bool {
    a.id != b.id
        && a.date == b.date
        && a.starts_at() < b.ends_at()
        && a.ends_at() > b.starts_at()
}

/// Every task in `tasks` that collides with `candidate`.
pub fn find_conflicts<'a>(tasks: &'a [Task], candidate: &Task) -> Vec<&'a Task> {
    tasks.iter().filter(|t| overlaps(candidate, t)).collect()
}

/// Every colliding pair in `tasks`, each reported once.
pub fn find_all_conflicts(tasks: &[Task]) -> Vec<(&Task, &Task)> {
    let mut pairs = Vec::new();
    for (i, a) in tasks.iter().enumerate() {
        for b in &tasks[i + 1..] {
            if overlaps(a, b) {
                pairs.push((a, b));
            }
        }
    }
    pairs
}

/// Conflicts between a reservation's own tasks and everyone else's.
pub(crate) fn conflicts_against(own: &[Task], others: &[Task]) -> Vec<Conflict> {
    own.iter()
        .flat_map(|task| {
            find_conflicts(others, task).into_iter().map(move |other| Conflict {
                task_id: task.id.clone(),
                with_task_id: other.id.clone(),
                with_reservation_id: other.reservation_id.clone(),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{HairdressingService, TaskService};
    use chrono::{NaiveDate, NaiveTime};
    use proptest::prelude::*;

    fn task(id: &str, day: u32, h: u32, m: u32, dur: u32) -> Task {
        Task {
            id: id.to_string(),
            reservation_id: id.split('-').next().unwrap_or(id).to_string(),
            service: TaskService {
                service_type: HairdressingService::Brushing,
                pet_index: 0,
            },
            date: NaiveDate::from_ymd_opt(2024, 3, day).unwrap(),
            time: NaiveTime::from_hms_opt(h, m, 0).unwrap(),
            duration_mins: dur,
        }
    }

    #[test]
    fn test_touching_tasks_do_not_conflict() {
        let a = task("a-0", 20, 9, 0, 60);
        let b = task("b-0", 20, 10, 0, 30);
        assert!(!overlaps(&a, &b));
    }

    #[test]
    fn test_partial_overlap() {
        let a = task("a-0", 20, 9, 0, 60);
        let b = task("b-0", 20, 9, 30, 60);
        assert!(overlaps(&a, &b));
    }

    #[test]
    fn test_different_days_never_conflict() {
        let a = task("a-0", 20, 9, 0, 60);
        let b = task("b-0", 21, 9, 0, 60);
        assert!(!overlaps(&a, &b));
    }

    #[test]
    fn test_self_is_not_a_conflict() {
        let a = task("a-0", 20, 9, 0, 60);
        assert!(find_conflicts(std::slice::from_ref(&a), &a).is_empty());
    }

    #[test]
    fn test_reports_all_collisions() {
        let placed = vec![
            task("a-0", 20, 9, 0, 60),
            task("b-0", 20, 9, 30, 30),
            task("c-0", 20, 11, 0, 30),
        ];
        let candidate = task("d-0", 20, 9, 15, 30);
        let hits: Vec<_> = find_conflicts(&placed, &candidate)
            .into_iter()
            .map(|t| t.id.as_str())
            .collect();
        assert_eq!(hits, vec!["a-0", "b-0"]);
    }

    #[test]
    fn test_find_all_conflicts_pairs_once() {
        let tasks = vec![
            task("a-0", 20, 9, 0, 60),
            task("b-0", 20, 9, 30, 60),
            task("c-0", 20, 10, 0, 30),
        ];
        let pairs: Vec<_> = find_all_conflicts(&tasks)
            .into_iter()
            .map(|(x, y)| (x.id.as_str(), y.id.as_str()))
            .collect();
        assert_eq!(pairs, vec![("a-0", "b-0"), ("b-0", "c-0")]);
    }

    proptest! {
        #[test]
        fn prop_conflict_is_symmetric(
            h1 in 8u32..18, m1 in 0u32..60, d1 in 5u32..180,
            h2 in 8u32..18, m2 in 0u32..60, d2 in 5u32..180,
        ) {
            let a = task("a-0", 20, h1, m1, d1);
            let b = task("b-0", 20, h2, m2, d2);
            prop_assert_eq!(overlaps(&a, &b), overlaps(&b, &a));
        }
    }
}
