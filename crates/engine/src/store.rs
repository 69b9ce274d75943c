use std::collections::{HashMap, HashSet};

use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::ServiceDurations;
use crate::conflict::{conflicts_against, Conflict};
use crate::decomposer::{decompose, shift_tasks, total_duration, DecomposeError};
use crate::grid::SLOT_CAPACITY;
use crate::model::{HairdressingService, Reservation, ReservationStatus, Slot, Task};

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ScheduleError {
    #[error("Slot {slot} is full ({capacity} reservations already booked)")]
    SlotFull { slot: Slot, capacity: usize },
    #[error("Reservation '{0}' not found")]
    NotFound(String),
    #[error("Invalid transition: {0}")]
    InvalidTransition(String),
    #[error("Reservation '{0}' already exists")]
    DuplicateReservation(String),
    #[error("Service '{0}' has no default duration configured")]
    MissingDuration(HairdressingService),
}

impl From<DecomposeError> for ScheduleError {
    fn from(e: DecomposeError) -> Self {
        match e {
            DecomposeError::MissingDuration(service) => ScheduleError::MissingDuration(service),
        }
    }
}

impl ScheduleError {
    /// `InvalidTransition` signals a caller bug; everything else is an
    /// expected, user-facing outcome.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, ScheduleError::InvalidTransition(_))
    }
}

// ---------------------------------------------------------------------------
// Public types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Pool {
    Unscheduled,
    Scheduled,
}

/// A reservation holding a slot, together with the tasks it owns.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduledEntry {
    pub reservation: Reservation,
    pub tasks: Vec<Task>,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TransitionKind {
    Scheduled,
    Moved,
    Unscheduled,
    Created,
    Updated,
    TasksReplaced,
    Removed,
    Unchanged,
}

/// The committed result of a store operation.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Transition {
    pub kind: TransitionKind,
    /// State of the reservation after the transition (before removal for
    /// `Removed`).
    pub reservation: Reservation,
    pub revision: u64,
    /// Advisory task-level overlaps with other scheduled reservations.
    pub conflicts: Vec<Conflict>,
}

impl Transition {
    pub fn is_change(&self) -> bool {
        self.kind != TransitionKind::Unchanged
    }
}

/// Acknowledgement from the reservation backend for a persisted revision.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PersistAck {
    pub reservation_id: String,
    pub revision: u64,
    /// Status as recorded by the backend, if it reports one.
    #[serde(default)]
    pub status: Option<ReservationStatus>,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case", tag = "outcome")]
pub enum Reconciliation {
    Applied,
    Stale { current: u64 },
    Unknown,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadReport {
    pub scheduled: usize,
    pub unscheduled: usize,
    pub warnings: Vec<String>,
}

/// Serializable view of the whole store.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreSnapshot {
    pub unscheduled: Vec<Reservation>,
    pub scheduled: Vec<ScheduledEntry>,
    pub selection: Option<String>,
    pub dragged: Option<String>,
}

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

/// Single source of truth for both pools, the selection and the drag state.
///
/// Every mutating operation validates all of its preconditions and computes
/// the new tasks before touching either pool, so a failed call leaves the
/// store exactly as it was.
#[derive(Debug, Clone)]
pub struct SchedulerStore {
    durations: ServiceDurations,
    unscheduled: Vec<Reservation>,
    scheduled: Vec<ScheduledEntry>,
    selection: Option<String>,
    dragged: Option<String>,
    revisions: HashMap<String, u64>,
    confirmed: HashMap<String, u64>,
}

impl SchedulerStore {
    pub fn new(durations: ServiceDurations) -> Self {
        Self {
            durations,
            unscheduled: Vec::new(),
            scheduled: Vec::new(),
            selection: None,
            dragged: None,
            revisions: HashMap::new(),
            confirmed: HashMap::new(),
        }
    }

    // -----------------------------------------------------------------------
    // Population
    // -----------------------------------------------------------------------

    /// Replace both pools with `reservations`. Reservations that cannot hold
    /// their slot (no date, slot already full, unknown service duration) are
    /// demoted to the unscheduled pool. Revision counters are kept so late
    /// acknowledgements are still compared against local history.
    pub fn load(&mut self, reservations: Vec<Reservation>) -> LoadReport {
        let mut report = LoadReport::default();
        self.unscheduled.clear();
        self.scheduled.clear();
        self.selection = None;
        self.dragged = None;

        let mut seen: HashSet<String> = HashSet::new();
        for mut r in reservations {
            if !seen.insert(r.id.clone()) {
                report
                    .warnings
                    .push(format!("Duplicate reservation '{}' ignored", r.id));
                continue;
            }
            self.revisions.entry(r.id.clone()).or_insert(0);

            let Some(time) = r.time else {
                self.unscheduled.push(r);
                continue;
            };
            let Some(date) = r.date else {
                report.warnings.push(format!(
                    "Reservation '{}' has a time but no date -- moved to unscheduled",
                    r.id
                ));
                r.time = None;
                self.unscheduled.push(r);
                continue;
            };

            let slot = Slot::new(date, time);
            if self.occupancy(&slot) >= SLOT_CAPACITY {
                report.warnings.push(format!(
                    "Slot {} is over capacity -- reservation '{}' moved to unscheduled",
                    slot, r.id
                ));
                r.time = None;
                self.unscheduled.push(r);
                continue;
            }

            match decompose(&r, date, time, &self.durations) {
                Ok(tasks) => {
                    if !tasks.is_empty() {
                        r.duration = Some(total_duration(&tasks));
                    }
                    self.scheduled.push(ScheduledEntry {
                        reservation: r,
                        tasks,
                    });
                }
                Err(e) => {
                    report.warnings.push(format!(
                        "Reservation '{}' could not be decomposed ({}) -- moved to unscheduled",
                        r.id, e
                    ));
                    r.time = None;
                    self.unscheduled.push(r);
                }
            }
        }

        report.scheduled = self.scheduled.len();
        report.unscheduled = self.unscheduled.len();
        info!(
            scheduled = report.scheduled,
            unscheduled = report.unscheduled,
            warnings = report.warnings.len(),
            "SchedulerStore::load"
        );
        report
    }

    // -----------------------------------------------------------------------
    // Transitions
    // -----------------------------------------------------------------------

    /// First placement of an unscheduled reservation. Decomposes its tasks at
    /// the slot's start.
    pub fn schedule_unscheduled(&mut self, id: &str, slot: Slot) -> Result<Transition, ScheduleError> {
        let idx = match self.unscheduled.iter().position(|r| r.id == id) {
            Some(idx) => idx,
            None if self.scheduled_index(id).is_some() => {
                return Err(ScheduleError::InvalidTransition(format!(
                    "reservation '{}' is already scheduled -- use move",
                    id
                )))
            }
            None => return Err(ScheduleError::NotFound(id.to_string())),
        };
        self.ensure_capacity(&slot)?;

        let mut reservation = self.unscheduled[idx].clone();
        reservation.date = Some(slot.date);
        reservation.time = Some(slot.time);
        let tasks = decompose(&reservation, slot.date, slot.time, &self.durations)?;
        if !tasks.is_empty() {
            reservation.duration = Some(total_duration(&tasks));
        }
        let conflicts = conflicts_against(&tasks, &self.tasks_except(id));

        self.unscheduled.remove(idx);
        self.scheduled.push(ScheduledEntry {
            reservation: reservation.clone(),
            tasks,
        });
        let revision = self.bump(id);
        info!(reservation_id = %id, slot = %slot, revision, "scheduled");

        Ok(Transition {
            kind: TransitionKind::Scheduled,
            reservation,
            revision,
            conflicts,
        })
    }

    /// Move a scheduled reservation. `time == None` demotes it to the
    /// unscheduled pool and discards its tasks; otherwise its existing tasks
    /// are shifted by the slot delta. Moving onto its own slot is a no-op.
    pub fn move_reservation(
        &mut self,
        id: &str,
        date: NaiveDate,
        time: Option<NaiveTime>,
    ) -> Result<Transition, ScheduleError> {
        let idx = match self.scheduled_index(id) {
            Some(idx) => idx,
            None if self.unscheduled.iter().any(|r| r.id == id) => {
                return Err(ScheduleError::InvalidTransition(format!(
                    "reservation '{}' is not scheduled -- schedule it first",
                    id
                )))
            }
            None => return Err(ScheduleError::NotFound(id.to_string())),
        };

        let Some(time) = time else {
            let mut entry = self.scheduled.remove(idx);
            entry.reservation.date = Some(date);
            entry.reservation.time = None;
            let reservation = entry.reservation;
            self.unscheduled.push(reservation.clone());
            let revision = self.bump(id);
            info!(reservation_id = %id, revision, discarded_tasks = entry.tasks.len(), "unscheduled");
            return Ok(Transition {
                kind: TransitionKind::Unscheduled,
                reservation,
                revision,
                conflicts: Vec::new(),
            });
        };

        let target = Slot::new(date, time);
        let current = self.scheduled[idx]
            .reservation
            .slot()
            .ok_or_else(|| ScheduleError::InvalidTransition(format!("reservation '{}' has no slot", id)))?;

        if current == target {
            debug!(reservation_id = %id, slot = %target, "move onto own slot");
            return Ok(Transition {
                kind: TransitionKind::Unchanged,
                reservation: self.scheduled[idx].reservation.clone(),
                revision: self.revision(id),
                conflicts: Vec::new(),
            });
        }
        self.ensure_capacity(&target)?;

        let mut tasks = self.scheduled[idx].tasks.clone();
        shift_tasks(&mut tasks, target.starts_at() - current.starts_at());
        let conflicts = conflicts_against(&tasks, &self.tasks_except(id));

        let entry = &mut self.scheduled[idx];
        entry.reservation.date = Some(date);
        entry.reservation.time = Some(time);
        entry.tasks = tasks;
        let reservation = entry.reservation.clone();
        let revision = self.bump(id);
        info!(reservation_id = %id, from = %current, to = %target, revision, "moved");

        Ok(Transition {
            kind: TransitionKind::Moved,
            reservation,
            revision,
            conflicts,
        })
    }

    /// Insert a new reservation: unscheduled when it has no time, otherwise
    /// scheduled and decomposed immediately.
    pub fn create(&mut self, mut draft: Reservation) -> Result<Transition, ScheduleError> {
        if self.pool_of(&draft.id).is_some() {
            return Err(ScheduleError::DuplicateReservation(draft.id));
        }

        let Some(time) = draft.time else {
            let id = draft.id.clone();
            self.unscheduled.push(draft.clone());
            let revision = self.bump(&id);
            info!(reservation_id = %id, revision, "created unscheduled");
            return Ok(Transition {
                kind: TransitionKind::Created,
                reservation: draft,
                revision,
                conflicts: Vec::new(),
            });
        };
        let date = draft.date.ok_or_else(|| {
            ScheduleError::InvalidTransition(format!(
                "reservation '{}' has a time but no date",
                draft.id
            ))
        })?;

        let slot = Slot::new(date, time);
        self.ensure_capacity(&slot)?;
        let tasks = decompose(&draft, date, time, &self.durations)?;
        if !tasks.is_empty() {
            draft.duration = Some(total_duration(&tasks));
        }
        let conflicts = conflicts_against(&tasks, &self.tasks_except(&draft.id));

        let id = draft.id.clone();
        self.scheduled.push(ScheduledEntry {
            reservation: draft.clone(),
            tasks,
        });
        let revision = self.bump(&id);
        info!(reservation_id = %id, slot = %slot, revision, "created scheduled");

        Ok(Transition {
            kind: TransitionKind::Created,
            reservation: draft,
            revision,
            conflicts,
        })
    }

    /// Replace a reservation's data in place. Placement (`date`/`time`) must
    /// be unchanged; tasks are left as they are.
    pub fn update(&mut self, reservation: Reservation) -> Result<Transition, ScheduleError> {
        let id = reservation.id.clone();
        let slot_ref = if let Some(idx) = self.scheduled_index(&id) {
            &mut self.scheduled[idx].reservation
        } else if let Some(idx) = self.unscheduled.iter().position(|r| r.id == id) {
            &mut self.unscheduled[idx]
        } else {
            return Err(ScheduleError::NotFound(id));
        };

        if !slot_ref.same_placement(&reservation) {
            return Err(ScheduleError::InvalidTransition(format!(
                "update of '{}' would change its placement -- use move",
                id
            )));
        }
        *slot_ref = reservation.clone();
        let revision = self.bump(&id);
        info!(reservation_id = %id, revision, "updated");

        Ok(Transition {
            kind: TransitionKind::Updated,
            reservation,
            revision,
            conflicts: Vec::new(),
        })
    }

    /// Install tasks the caller recomputed for a scheduled reservation.
    pub fn replace_tasks(&mut self, id: &str, tasks: Vec<Task>) -> Result<Transition, ScheduleError> {
        let idx = self
            .scheduled_index(id)
            .ok_or_else(|| match self.pool_of(id) {
                Some(_) => ScheduleError::InvalidTransition(format!(
                    "reservation '{}' is not scheduled and owns no tasks",
                    id
                )),
                None => ScheduleError::NotFound(id.to_string()),
            })?;
        if let Some(foreign) = tasks.iter().find(|t| t.reservation_id != id) {
            return Err(ScheduleError::InvalidTransition(format!(
                "task '{}' belongs to '{}', not '{}'",
                foreign.id, foreign.reservation_id, id
            )));
        }

        let conflicts = conflicts_against(&tasks, &self.tasks_except(id));
        let entry = &mut self.scheduled[idx];
        entry.reservation.duration = Some(total_duration(&tasks));
        entry.tasks = tasks;
        let reservation = entry.reservation.clone();
        let revision = self.bump(id);
        info!(reservation_id = %id, revision, "tasks replaced");

        Ok(Transition {
            kind: TransitionKind::TasksReplaced,
            reservation,
            revision,
            conflicts,
        })
    }

    /// Delete a reservation from whichever pool holds it, with its tasks.
    pub fn remove(&mut self, id: &str) -> Result<Transition, ScheduleError> {
        let reservation = if let Some(idx) = self.scheduled_index(id) {
            self.scheduled.remove(idx).reservation
        } else if let Some(idx) = self.unscheduled.iter().position(|r| r.id == id) {
            self.unscheduled.remove(idx)
        } else {
            return Err(ScheduleError::NotFound(id.to_string()));
        };

        if self.selection.as_deref() == Some(id) {
            self.selection = None;
        }
        if self.dragged.as_deref() == Some(id) {
            self.dragged = None;
        }
        let revision = self.bump(id);
        info!(reservation_id = %id, revision, "removed");

        Ok(Transition {
            kind: TransitionKind::Removed,
            reservation,
            revision,
            conflicts: Vec::new(),
        })
    }

    // -----------------------------------------------------------------------
    // Selection and drag
    // -----------------------------------------------------------------------

    pub fn select(&mut self, id: &str) -> Result<(), ScheduleError> {
        if let Some(dragged) = &self.dragged {
            return Err(ScheduleError::InvalidTransition(format!(
                "cannot select '{}' while '{}' is being dragged",
                id, dragged
            )));
        }
        if self.pool_of(id).is_none() {
            return Err(ScheduleError::NotFound(id.to_string()));
        }
        self.selection = Some(id.to_string());
        Ok(())
    }

    pub fn clear_selection(&mut self) -> Option<String> {
        self.selection.take()
    }

    /// Start dragging `id`. Any pending selection is dropped.
    pub fn begin_drag(&mut self, id: &str) -> Result<(), ScheduleError> {
        if self.pool_of(id).is_none() {
            return Err(ScheduleError::NotFound(id.to_string()));
        }
        self.selection = None;
        self.dragged = Some(id.to_string());
        Ok(())
    }

    pub fn end_drag(&mut self) -> Option<String> {
        self.dragged.take()
    }

    pub fn selection(&self) -> Option<&str> {
        self.selection.as_deref()
    }

    pub fn dragged(&self) -> Option<&str> {
        self.dragged.as_deref()
    }

    // -----------------------------------------------------------------------
    // Persistence reconciliation
    // -----------------------------------------------------------------------

    /// Compare a backend acknowledgement against local history. Only an ack
    /// for the latest revision is applied; older ones are discarded.
    pub fn reconcile(&mut self, ack: &PersistAck) -> Reconciliation {
        let Some(&current) = self.revisions.get(&ack.reservation_id) else {
            return Reconciliation::Unknown;
        };
        if ack.revision < current {
            debug!(
                reservation_id = %ack.reservation_id,
                acked = ack.revision,
                current,
                "discarding stale acknowledgement"
            );
            return Reconciliation::Stale { current };
        }
        if ack.revision > current {
            warn!(
                reservation_id = %ack.reservation_id,
                acked = ack.revision,
                current,
                "acknowledgement for a revision never issued"
            );
            return Reconciliation::Unknown;
        }

        self.confirmed.insert(ack.reservation_id.clone(), current);
        if let Some(status) = ack.status {
            if let Some(r) = self.find_mut(&ack.reservation_id) {
                r.status = status;
            }
        }
        Reconciliation::Applied
    }

    pub fn revision(&self, id: &str) -> u64 {
        self.revisions.get(id).copied().unwrap_or(0)
    }

    /// Whether the latest local revision has been acknowledged.
    pub fn is_synced(&self, id: &str) -> bool {
        let current = self.revision(id);
        current == 0 || self.confirmed.get(id) == Some(&current)
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    pub fn unscheduled(&self) -> &[Reservation] {
        &self.unscheduled
    }

    pub fn scheduled(&self) -> &[ScheduledEntry] {
        &self.scheduled
    }

    pub fn find(&self, id: &str) -> Option<&Reservation> {
        self.scheduled
            .iter()
            .map(|e| &e.reservation)
            .chain(self.unscheduled.iter())
            .find(|r| r.id == id)
    }

    pub fn pool_of(&self, id: &str) -> Option<Pool> {
        if self.scheduled_index(id).is_some() {
            Some(Pool::Scheduled)
        } else if self.unscheduled.iter().any(|r| r.id == id) {
            Some(Pool::Unscheduled)
        } else {
            None
        }
    }

    pub fn tasks_for(&self, id: &str) -> &[Task] {
        self.scheduled_index(id)
            .map(|idx| self.scheduled[idx].tasks.as_slice())
            .unwrap_or(&[])
    }

    pub fn all_tasks(&self) -> impl Iterator<Item = &Task> + '_ {
        self.scheduled.iter().flat_map(|e| e.tasks.iter())
    }

    /// Scheduled reservations sitting on `slot`. Always counted, never cached.
    pub fn occupancy(&self, slot: &Slot) -> usize {
        self.scheduled
            .iter()
            .filter(|e| e.reservation.slot().as_ref() == Some(slot))
            .count()
    }

    /// Tasks anchored exactly at `slot`.
    pub fn task_occupancy(&self, slot: &Slot) -> usize {
        self.all_tasks()
            .filter(|t| t.date == slot.date && t.time == slot.time)
            .count()
    }

    pub fn is_eligible(&self, slot: &Slot) -> bool {
        self.occupancy(slot) < SLOT_CAPACITY
    }

    /// Eligibility from the point of view of `id`: its own slot always is.
    pub fn is_eligible_for(&self, id: &str, slot: &Slot) -> bool {
        self.find(id).and_then(Reservation::slot).as_ref() == Some(slot) || self.is_eligible(slot)
    }

    pub fn snapshot(&self) -> StoreSnapshot {
        StoreSnapshot {
            unscheduled: self.unscheduled.clone(),
            scheduled: self.scheduled.clone(),
            selection: self.selection.clone(),
            dragged: self.dragged.clone(),
        }
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    fn scheduled_index(&self, id: &str) -> Option<usize> {
        self.scheduled.iter().position(|e| e.reservation.id == id)
    }

    fn find_mut(&mut self, id: &str) -> Option<&mut Reservation> {
        self.scheduled
            .iter_mut()
            .map(|e| &mut e.reservation)
            .chain(self.unscheduled.iter_mut())
            .find(|r| r.id == id)
    }

    fn ensure_capacity(&self, slot: &Slot) -> Result<(), ScheduleError> {
        if self.is_eligible(slot) {
            Ok(())
        } else {
            warn!(slot = %slot, "slot full");
            Err(ScheduleError::SlotFull {
                slot: *slot,
                capacity: SLOT_CAPACITY,
            })
        }
    }

    fn tasks_except(&self, id: &str) -> Vec<Task> {
        self.all_tasks()
            .filter(|t| t.reservation_id != id)
            .cloned()
            .collect()
    }

    fn bump(&mut self, id: &str) -> u64 {
        let revision = self.revisions.entry(id.to_string()).or_insert(0);
        *revision += 1;
        *revision
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
