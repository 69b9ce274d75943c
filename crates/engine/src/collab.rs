//! Seams to the host environment: the reservation backend and the
//! notification surface.
//!
//! The core never waits on either. `persist` is fire-and-forget; the backend
//! answers later with a [`PersistAck`](crate::store::PersistAck) that the host
//! feeds back through the controller.

use serde::{Deserialize, Serialize};

use crate::model::Reservation;

pub const MSG_MOVED: &str = "Cita movida";
pub const MSG_SLOT_UNAVAILABLE: &str = "El horario seleccionado no está disponible";
pub const MSG_SELECT_TARGET: &str = "Selecciona un horario para colocar la cita";
pub const MSG_REMOVED: &str = "Cita eliminada";
pub const MSG_SAVED: &str = "Cita guardada";

#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("Reservation backend unavailable: {0}")]
    Unavailable(String),
}

/// Backend that owns the durable copy of reservations.
pub trait ReservationSource {
    fn list_reservations(&self) -> Result<Vec<Reservation>, SourceError>;

    /// Queue `reservation` at `revision` for storage.
    fn persist(&mut self, reservation: &Reservation, revision: u64);

    /// Queue deletion of `id` at `revision`.
    fn delete(&mut self, id: &str, revision: u64);
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    Success,
    Info,
    Error,
}

pub trait Notifier {
    fn notify(&mut self, kind: NotificationKind, message: &str);
}

// ---------------------------------------------------------------------------
// In-memory implementations
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase", rename_all_fields = "camelCase", tag = "op")]
pub enum PersistRecord {
    Upsert { reservation: Reservation, revision: u64 },
    Delete { reservation_id: String, revision: u64 },
}

/// Backend kept in memory. Writes apply immediately to its own copy and are
/// logged in order; acknowledgements are left for the host to deliver.
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    reservations: Vec<Reservation>,
    log: Vec<PersistRecord>,
}

impl MemorySource {
    pub fn new(reservations: Vec<Reservation>) -> Self {
        Self {
            reservations,
            log: Vec::new(),
        }
    }

    pub fn log(&self) -> &[PersistRecord] {
        &self.log
    }

    /// Take every record logged since the previous drain.
    pub fn drain_log(&mut self) -> Vec<PersistRecord> {
        std::mem::take(&mut self.log)
    }
}

impl ReservationSource for MemorySource {
    fn list_reservations(&self) -> Result<Vec<Reservation>, SourceError> {
        Ok(self.reservations.clone())
    }

    fn persist(&mut self, reservation: &Reservation, revision: u64) {
        match self.reservations.iter_mut().find(|r| r.id == reservation.id) {
            Some(existing) => *existing = reservation.clone(),
            None => self.reservations.push(reservation.clone()),
        }
        self.log.push(PersistRecord::Upsert {
            reservation: reservation.clone(),
            revision,
        });
    }

    fn delete(&mut self, id: &str, revision: u64) {
        self.reservations.retain(|r| r.id != id);
        self.log.push(PersistRecord::Delete {
            reservation_id: id.to_string(),
            revision,
        });
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct Notification {
    pub kind: NotificationKind,
    pub message: String,
}

#[derive(Debug, Clone, Default)]
pub struct RecordingNotifier {
    notifications: Vec<Notification>,
}

impl RecordingNotifier {
    pub fn notifications(&self) -> &[Notification] {
        &self.notifications
    }

    pub fn drain(&mut self) -> Vec<Notification> {
        std::mem::take(&mut self.notifications)
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&mut self, kind: NotificationKind, message: &str) {
        self.notifications.push(Notification {
            kind,
            message: message.to_string(),
        });
    }
}
