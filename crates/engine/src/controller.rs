//! Placement interaction controller.
//!
//! Pointer-drag, click-select-then-click-target and double-tap all funnel
//! into two logical actions, *select* and *place*. This is the only caller of
//! the store's mutating operations; after every committed transition it
//! persists through the [`ReservationSource`] and reports through the
//! [`Notifier`].
//!
//! Timestamps are milliseconds supplied by the host. A tap on a reservation is
//! held for the double-tap window: a second tap on the same card inside the
//! window opens the editor, anything else (a later `tick`, another tap, a tap
//! on a slot) resolves it as a single click.

use chrono::NaiveDate;
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::collab::{
    NotificationKind, Notifier, ReservationSource, SourceError, MSG_MOVED, MSG_REMOVED,
    MSG_SAVED, MSG_SELECT_TARGET, MSG_SLOT_UNAVAILABLE,
};
use crate::config::{ConfigError, SalonConfig};
use crate::grid::{TimeGrid, SLOT_CAPACITY};
use crate::model::{Reservation, Slot, Task};
use crate::store::{
    LoadReport, PersistAck, Pool, Reconciliation, ScheduleError, SchedulerStore, Transition,
    TransitionKind,
};

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase", rename_all_fields = "camelCase", tag = "outcome")]
pub enum Outcome {
    Ignored,
    TapPending { reservation_id: String },
    Selected { reservation_id: String },
    SelectionCleared { reservation_id: String },
    DragStarted { reservation_id: String },
    DragCancelled { reservation_id: Option<String> },
    OpenEditor { reservation_id: String },
    Committed { transition: Transition },
}

/// Failure to build a controller.
#[derive(Debug, thiserror::Error)]
pub enum ControllerError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Source(#[from] SourceError),
}

#[derive(Debug, Clone)]
struct PendingTap {
    reservation_id: String,
    at_ms: u64,
}

pub struct PlacementController<S: ReservationSource, N: Notifier> {
    store: SchedulerStore,
    grid: TimeGrid,
    source: S,
    notifier: N,
    double_tap_window_ms: u64,
    pending_tap: Option<PendingTap>,
    last_load: LoadReport,
}

impl<S: ReservationSource, N: Notifier> PlacementController<S, N> {
    /// Build a controller and populate its pools from `source`. An invalid
    /// `config` is rejected before the backend is contacted.
    pub fn new(config: &SalonConfig, source: S, notifier: N) -> Result<Self, ControllerError> {
        let mut controller = Self {
            store: SchedulerStore::new(config.service_durations.clone()),
            grid: TimeGrid::new(config)?,
            source,
            notifier,
            double_tap_window_ms: config.double_tap_window_ms,
            pending_tap: None,
            last_load: LoadReport::default(),
        };
        controller.refresh()?;
        Ok(controller)
    }

    /// Reload both pools from the backend.
    pub fn refresh(&mut self) -> Result<LoadReport, SourceError> {
        let reservations = self.source.list_reservations()?;
        self.pending_tap = None;
        let report = self.store.load(reservations);
        for w in &report.warnings {
            warn!("{}", w);
        }
        self.last_load = report.clone();
        Ok(report)
    }

    /// Report of the most recent load from the backend.
    pub fn last_load(&self) -> &LoadReport {
        &self.last_load
    }

    pub fn store(&self) -> &SchedulerStore {
        &self.store
    }

    pub fn grid(&self) -> &TimeGrid {
        &self.grid
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn source_mut(&mut self) -> &mut S {
        &mut self.source
    }

    pub fn notifier(&self) -> &N {
        &self.notifier
    }

    pub fn notifier_mut(&mut self) -> &mut N {
        &mut self.notifier
    }

    // -----------------------------------------------------------------------
    // Pointer drag
    // -----------------------------------------------------------------------

    pub fn press(&mut self, id: &str) -> Result<Outcome, ScheduleError> {
        self.pending_tap = None;
        match self.store.begin_drag(id) {
            Ok(()) => {
                debug!(reservation_id = %id, "drag started");
                Ok(Outcome::DragStarted {
                    reservation_id: id.to_string(),
                })
            }
            Err(e) => Err(self.handle_error(e)),
        }
    }

    /// Drop the dragged card on `slot`. Dropping outside the grid cancels the
    /// drag without touching the pools.
    pub fn drop_on_slot(&mut self, slot: Slot) -> Result<Outcome, ScheduleError> {
        let Some(id) = self.store.end_drag() else {
            return Ok(Outcome::Ignored);
        };
        if !self.grid.contains(&slot) {
            debug!(reservation_id = %id, slot = %slot, "dropped outside the grid");
            return Ok(Outcome::DragCancelled {
                reservation_id: Some(id),
            });
        }
        self.place(&id, slot)
    }

    /// Drop the dragged card back onto the unscheduled list.
    pub fn drop_on_unscheduled(&mut self) -> Result<Outcome, ScheduleError> {
        let Some(id) = self.store.end_drag() else {
            return Ok(Outcome::Ignored);
        };
        match self.store.pool_of(&id) {
            Some(Pool::Scheduled) => self.unschedule(&id),
            _ => Ok(Outcome::DragCancelled {
                reservation_id: Some(id),
            }),
        }
    }

    pub fn drag_end(&mut self) -> Outcome {
        Outcome::DragCancelled {
            reservation_id: self.store.end_drag(),
        }
    }

    // -----------------------------------------------------------------------
    // Click / tap
    // -----------------------------------------------------------------------

    pub fn tap_reservation(&mut self, id: &str, now_ms: u64) -> Result<Outcome, ScheduleError> {
        if self.store.dragged().is_some() {
            debug!(reservation_id = %id, "tap ignored during drag");
            return Ok(Outcome::Ignored);
        }
        if let Some(pending) = self.pending_tap.take() {
            if pending.reservation_id == id
                && now_ms.saturating_sub(pending.at_ms) <= self.double_tap_window_ms
            {
                info!(reservation_id = %id, "double tap");
                return Ok(Outcome::OpenEditor {
                    reservation_id: id.to_string(),
                });
            }
            self.resolve_tap(pending)?;
        }
        if self.store.find(id).is_none() {
            return Err(self.handle_error(ScheduleError::NotFound(id.to_string())));
        }
        self.pending_tap = Some(PendingTap {
            reservation_id: id.to_string(),
            at_ms: now_ms,
        });
        Ok(Outcome::TapPending {
            reservation_id: id.to_string(),
        })
    }

    /// Resolve a held tap once the double-tap window has passed.
    pub fn tick(&mut self, now_ms: u64) -> Result<Outcome, ScheduleError> {
        let due = self
            .pending_tap
            .as_ref()
            .is_some_and(|p| now_ms.saturating_sub(p.at_ms) > self.double_tap_window_ms);
        match self.pending_tap.take() {
            Some(pending) if due => self.resolve_tap(pending),
            pending => {
                self.pending_tap = pending;
                Ok(Outcome::Ignored)
            }
        }
    }

    /// Click on a grid cell. Places the current selection there when the
    /// cell is an eligible target. A tap still held in the double-tap window
    /// is resolved as a single click first, so the window closes early.
    pub fn tap_slot(&mut self, slot: Slot) -> Result<Outcome, ScheduleError> {
        if let Some(pending) = self.pending_tap.take() {
            self.resolve_tap(pending)?;
        }
        let Some(id) = self.store.selection().map(str::to_string) else {
            return Ok(Outcome::Ignored);
        };
        if !self.grid.contains(&slot) {
            return Ok(Outcome::Ignored);
        }
        if !self.store.is_eligible_for(&id, &slot) {
            return Err(self.handle_error(ScheduleError::SlotFull {
                slot,
                capacity: SLOT_CAPACITY,
            }));
        }
        let outcome = self.place(&id, slot)?;
        self.store.clear_selection();
        Ok(outcome)
    }

    fn resolve_tap(&mut self, pending: PendingTap) -> Result<Outcome, ScheduleError> {
        let id = pending.reservation_id;
        if self.store.selection() == Some(id.as_str()) {
            self.store.clear_selection();
            debug!(reservation_id = %id, "selection cleared");
            return Ok(Outcome::SelectionCleared { reservation_id: id });
        }
        match self.store.select(&id) {
            Ok(()) => {
                self.notifier.notify(NotificationKind::Info, MSG_SELECT_TARGET);
                debug!(reservation_id = %id, "selected");
                Ok(Outcome::Selected { reservation_id: id })
            }
            Err(e) => Err(self.handle_error(e)),
        }
    }

    // -----------------------------------------------------------------------
    // Placement
    // -----------------------------------------------------------------------

    /// Put `id` on `slot`, scheduling or moving depending on its pool.
    pub fn place(&mut self, id: &str, slot: Slot) -> Result<Outcome, ScheduleError> {
        let result = match self.store.pool_of(id) {
            Some(Pool::Unscheduled) => self.store.schedule_unscheduled(id, slot),
            Some(Pool::Scheduled) => self.store.move_reservation(id, slot.date, Some(slot.time)),
            None => Err(ScheduleError::NotFound(id.to_string())),
        };
        self.finish(result)
    }

    /// Send a scheduled reservation back to the unscheduled pool.
    pub fn unschedule(&mut self, id: &str) -> Result<Outcome, ScheduleError> {
        let date = self.store.find(id).and_then(|r| r.date);
        let result = match date {
            Some(date) => self.store.move_reservation(id, date, None),
            None if self.store.pool_of(id).is_some() => Err(ScheduleError::InvalidTransition(
                format!("reservation '{}' is not scheduled", id),
            )),
            None => Err(ScheduleError::NotFound(id.to_string())),
        };
        self.finish(result)
    }

    pub fn create(&mut self, draft: Reservation) -> Result<Outcome, ScheduleError> {
        let result = self.store.create(draft);
        self.finish(result)
    }

    pub fn update(&mut self, reservation: Reservation) -> Result<Outcome, ScheduleError> {
        let result = self.store.update(reservation);
        self.finish(result)
    }

    pub fn replace_tasks(&mut self, id: &str, tasks: Vec<Task>) -> Result<Outcome, ScheduleError> {
        let result = self.store.replace_tasks(id, tasks);
        self.finish(result)
    }

    pub fn remove(&mut self, id: &str) -> Result<Outcome, ScheduleError> {
        if self.pending_tap.as_ref().is_some_and(|p| p.reservation_id == id) {
            self.pending_tap = None;
        }
        let result = self.store.remove(id);
        self.finish(result)
    }

    /// Feed a backend acknowledgement back into the store.
    pub fn acknowledge(&mut self, ack: &PersistAck) -> Reconciliation {
        self.store.reconcile(ack)
    }

    // -----------------------------------------------------------------------
    // Affordances
    // -----------------------------------------------------------------------

    /// Slots of `date` that can take one more reservation right now.
    pub fn eligible_slots(&self, date: NaiveDate) -> Vec<Slot> {
        self.grid
            .enumerate_day(date)
            .into_iter()
            .filter(|s| self.store.is_eligible(s))
            .collect()
    }

    /// Whether `slot` should be offered as a target for `id`.
    pub fn is_target_for(&self, id: &str, slot: &Slot) -> bool {
        self.grid.contains(slot) && self.store.is_eligible_for(id, slot)
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    fn finish(&mut self, result: Result<Transition, ScheduleError>) -> Result<Outcome, ScheduleError> {
        match result {
            Ok(transition) => {
                self.commit(&transition);
                Ok(Outcome::Committed { transition })
            }
            Err(e) => Err(self.handle_error(e)),
        }
    }

    fn commit(&mut self, transition: &Transition) {
        if !transition.is_change() {
            return;
        }
        let id = transition.reservation.id.as_str();
        if !transition.conflicts.is_empty() {
            debug!(reservation_id = %id, conflicts = transition.conflicts.len(), "task overlaps");
        }

        let message = match transition.kind {
            TransitionKind::Removed => {
                self.source.delete(id, transition.revision);
                MSG_REMOVED
            }
            kind => {
                self.source.persist(&transition.reservation, transition.revision);
                match kind {
                    TransitionKind::Scheduled | TransitionKind::Moved | TransitionKind::Unscheduled => {
                        MSG_MOVED
                    }
                    _ => MSG_SAVED,
                }
            }
        };
        self.notifier.notify(NotificationKind::Success, message);
    }

    fn handle_error(&mut self, e: ScheduleError) -> ScheduleError {
        match &e {
            ScheduleError::SlotFull { slot, .. } => {
                warn!(slot = %slot, "placement rejected: slot full");
                self.notifier.notify(NotificationKind::Error, MSG_SLOT_UNAVAILABLE);
            }
            ScheduleError::NotFound(id) => {
                warn!(reservation_id = %id, "reservation vanished, refreshing pools");
                if let Err(refresh_err) = self.refresh() {
                    error!(error = %refresh_err, "refresh after stale reference failed");
                }
            }
            ScheduleError::InvalidTransition(msg) => {
                error!(reason = %msg, "invalid transition refused");
            }
            ScheduleError::DuplicateReservation(_) | ScheduleError::MissingDuration(_) => {
                warn!(error = %e, "operation rejected");
                self.notifier.notify(NotificationKind::Error, &e.to_string());
            }
        }
        e
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collab::{MemorySource, PersistRecord, RecordingNotifier};
    use crate::model::{
        AdditionalService, BookingSource, Client, HairdressingService, Pet, ReservationStatus,
    };
    use chrono::NaiveTime;

    type Controller = PlacementController<MemorySource, RecordingNotifier>;

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, day).unwrap()
    }

    fn slot(day: u32, h: u32) -> Slot {
        Slot::new(d(day), NaiveTime::from_hms_opt(h, 0, 0).unwrap())
    }

    fn groom(id: &str, placement: Option<Slot>) -> Reservation {
        Reservation {
            id: id.to_string(),
            source: BookingSource::External,
            date: placement.map(|s| s.date),
            time: placement.map(|s| s.time),
            client: Client {
                name: "Marta".to_string(),
                phone: "622000000".to_string(),
                email: Some("marta@example.com".to_string()),
            },
            pet: Pet {
                name: "Kira".to_string(),
                breed: "Golden".to_string(),
                size: "large".to_string(),
                weight: 30.0,
            },
            additional_services: vec![AdditionalService::hairdressing(vec![
                HairdressingService::BathAndBrush,
                HairdressingService::Spa,
            ])],
            status: ReservationStatus::Confirmed,
            duration: None,
        }
    }

    fn controller(reservations: Vec<Reservation>) -> Controller {
        PlacementController::new(
            &SalonConfig::default(),
            MemorySource::new(reservations),
            RecordingNotifier::default(),
        )
        .unwrap()
    }

    fn messages(c: &Controller) -> Vec<&str> {
        c.notifier().notifications().iter().map(|n| n.message.as_str()).collect()
    }

    #[test]
    fn test_drag_and_drop_schedules() {
        let mut c = controller(vec![groom("a", None)]);
        c.press("a").unwrap();
        let outcome = c.drop_on_slot(slot(20, 10)).unwrap();

        assert!(matches!(outcome, Outcome::Committed { .. }));
        assert_eq!(c.store().pool_of("a"), Some(Pool::Scheduled));
        assert_eq!(c.store().dragged(), None);
        assert_eq!(messages(&c), vec![MSG_MOVED]);
        assert!(matches!(
            c.source().log(),
            [PersistRecord::Upsert { revision: 1, .. }]
        ));
    }

    #[test]
    fn test_drop_outside_grid_cancels() {
        let mut c = controller(vec![groom("a", None)]);
        c.press("a").unwrap();
        let outcome = c.drop_on_slot(slot(20, 22)).unwrap();
        assert!(matches!(outcome, Outcome::DragCancelled { .. }));
        assert_eq!(c.store().pool_of("a"), Some(Pool::Unscheduled));
        assert!(c.source().log().is_empty());
    }

    #[test]
    fn test_drop_on_full_slot_rejected() {
        let mut c = controller(vec![
            groom("a", Some(slot(20, 10))),
            groom("b", Some(slot(20, 10))),
            groom("c", None),
        ]);
        c.press("c").unwrap();
        let err = c.drop_on_slot(slot(20, 10)).unwrap_err();
        assert!(matches!(err, ScheduleError::SlotFull { .. }));
        assert_eq!(c.store().pool_of("c"), Some(Pool::Unscheduled));
        assert_eq!(c.store().dragged(), None);
        assert_eq!(messages(&c), vec![MSG_SLOT_UNAVAILABLE]);
    }

    #[test]
    fn test_drag_back_to_unscheduled() {
        let mut c = controller(vec![groom("a", Some(slot(20, 10)))]);
        c.press("a").unwrap();
        c.drop_on_unscheduled().unwrap();
        assert_eq!(c.store().pool_of("a"), Some(Pool::Unscheduled));
        assert!(c.store().tasks_for("a").is_empty());
    }

    #[test]
    fn test_drag_end_clears_without_mutation() {
        let mut c = controller(vec![groom("a", None)]);
        c.press("a").unwrap();
        let outcome = c.drag_end();
        assert!(matches!(
            outcome,
            Outcome::DragCancelled { reservation_id: Some(ref id) } if id == "a"
        ));
        assert_eq!(c.store().pool_of("a"), Some(Pool::Unscheduled));
    }

    #[test]
    fn test_select_commits_only_after_window() {
        let mut c = controller(vec![groom("a", None)]);
        c.tap_reservation("a", 1_000).unwrap();
        assert_eq!(c.store().selection(), None);

        assert!(matches!(c.tick(1_200).unwrap(), Outcome::Ignored));
        assert_eq!(c.store().selection(), None);

        assert!(matches!(c.tick(1_301).unwrap(), Outcome::Selected { .. }));
        assert_eq!(c.store().selection(), Some("a"));
        assert_eq!(messages(&c), vec![MSG_SELECT_TARGET]);
    }

    #[test]
    fn test_double_tap_opens_editor_without_selecting() {
        let mut c = controller(vec![groom("a", None)]);
        c.tap_reservation("a", 1_000).unwrap();
        let outcome = c.tap_reservation("a", 1_250).unwrap();
        assert!(matches!(outcome, Outcome::OpenEditor { .. }));
        assert!(matches!(c.tick(2_000).unwrap(), Outcome::Ignored));
        assert_eq!(c.store().selection(), None);
    }

    #[test]
    fn test_slow_second_tap_is_two_single_clicks() {
        let mut c = controller(vec![groom("a", None)]);
        c.tap_reservation("a", 1_000).unwrap();
        c.tap_reservation("a", 1_500).unwrap();
        assert_eq!(c.store().selection(), Some("a"));
        c.tick(2_000).unwrap();
        assert_eq!(c.store().selection(), None);
    }

    #[test]
    fn test_click_select_then_click_slot_places() {
        let mut c = controller(vec![groom("a", None)]);
        c.tap_reservation("a", 0).unwrap();
        c.tick(400).unwrap();
        let outcome = c.tap_slot(slot(21, 11)).unwrap();

        assert!(matches!(outcome, Outcome::Committed { .. }));
        assert_eq!(c.store().selection(), None);
        let r = c.store().find("a").unwrap();
        assert_eq!(r.date, Some(d(21)));
        assert_eq!(c.store().tasks_for("a").len(), 2);
    }

    #[test]
    fn test_quick_slot_tap_resolves_pending_selection() {
        let mut c = controller(vec![groom("a", None)]);
        c.tap_reservation("a", 0).unwrap();
        let outcome = c.tap_slot(slot(21, 11)).unwrap();
        assert!(matches!(outcome, Outcome::Committed { .. }));
    }

    #[test]
    fn test_full_slot_is_not_a_target() {
        let mut c = controller(vec![
            groom("a", Some(slot(20, 10))),
            groom("b", Some(slot(20, 10))),
            groom("c", None),
        ]);
        assert!(!c.is_target_for("c", &slot(20, 10)));
        assert!(c.is_target_for("a", &slot(20, 10)));
        assert!(!c.eligible_slots(d(20)).contains(&slot(20, 10)));
        assert_eq!(c.eligible_slots(d(20)).len(), 9);

        c.tap_reservation("c", 0).unwrap();
        c.tick(1_000).unwrap();
        assert!(c.tap_slot(slot(20, 10)).is_err());
        assert_eq!(c.store().selection(), Some("c"));
        assert_eq!(c.store().pool_of("c"), Some(Pool::Unscheduled));
    }

    #[test]
    fn test_tap_slot_without_selection_is_ignored() {
        let mut c = controller(vec![groom("a", None)]);
        assert!(matches!(c.tap_slot(slot(20, 10)).unwrap(), Outcome::Ignored));
    }

    #[test]
    fn test_tap_during_drag_is_ignored() {
        let mut c = controller(vec![groom("a", None), groom("b", None)]);
        c.press("a").unwrap();
        assert!(matches!(c.tap_reservation("b", 0).unwrap(), Outcome::Ignored));
        assert!(matches!(c.tick(1_000).unwrap(), Outcome::Ignored));
        assert_eq!(c.store().selection(), None);
    }

    #[test]
    fn test_stale_reference_refreshes_pools() {
        let mut c = controller(vec![groom("a", None)]);
        // Another session deleted "a" and booked "late" behind our back.
        c.source_mut().delete("a", 1);
        c.source_mut().persist(&groom("late", None), 1);
        let err = c.place("ghost", slot(20, 10)).unwrap_err();
        assert!(matches!(err, ScheduleError::NotFound(_)));
        assert!(c.store().find("a").is_none());
        assert_eq!(c.store().pool_of("late"), Some(Pool::Unscheduled));
    }

    #[test]
    fn test_rapid_moves_keep_latest() {
        let mut c = controller(vec![groom("a", Some(slot(20, 10)))]);
        c.place("a", slot(20, 11)).unwrap();
        c.place("a", slot(20, 15)).unwrap();

        let stale = c.acknowledge(&PersistAck {
            reservation_id: "a".to_string(),
            revision: 1,
            status: None,
        });
        assert!(matches!(stale, Reconciliation::Stale { current: 2 }));
        assert_eq!(c.store().find("a").unwrap().slot(), Some(slot(20, 15)));
        assert_eq!(c.store().tasks_for("a")[0].time, slot(20, 15).time);
        assert_eq!(c.source().log().len(), 2);
    }

    #[test]
    fn test_noop_move_does_not_persist() {
        let mut c = controller(vec![groom("a", Some(slot(20, 10)))]);
        c.place("a", slot(20, 10)).unwrap();
        assert!(c.source().log().is_empty());
        assert!(c.notifier().notifications().is_empty());
    }

    #[test]
    fn test_remove_persists_delete() {
        let mut c = controller(vec![groom("a", Some(slot(20, 10)))]);
        c.remove("a").unwrap();
        assert!(matches!(c.source().log(), [PersistRecord::Delete { .. }]));
        assert_eq!(messages(&c), vec![MSG_REMOVED]);
    }

    #[test]
    fn test_invalid_transition_refused_quietly() {
        let mut c = controller(vec![groom("a", None)]);
        let err = c.unschedule("a").unwrap_err();
        assert!(matches!(err, ScheduleError::InvalidTransition(_)));
        assert!(c.notifier().notifications().is_empty());
        assert_eq!(c.store().pool_of("a"), Some(Pool::Unscheduled));
    }

    #[test]
    fn test_zero_step_config_rejected() {
        let config = SalonConfig {
            slot_step_mins: 0,
            ..SalonConfig::default()
        };
        let result = Controller::new(
            &config,
            MemorySource::new(vec![groom("a", None)]),
            RecordingNotifier::default(),
        );
        assert!(matches!(result, Err(ControllerError::Config(ConfigError::Invalid(_)))));
    }

    #[test]
    fn test_initial_load_report_kept() {
        let c = controller(vec![
            groom("a", Some(slot(20, 10))),
            groom("b", Some(slot(20, 10))),
            groom("c", Some(slot(20, 10))),
            groom("d", None),
        ]);
        let report = c.last_load();
        assert_eq!(report.scheduled, 2);
        assert_eq!(report.unscheduled, 2);
        assert_eq!(report.warnings.len(), 1);
        assert!(report.warnings[0].contains("over capacity"));
    }
}
