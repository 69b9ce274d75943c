#![deny(clippy::all)]

use napi::bindgen_prelude::*;
use napi_derive::napi;

use groomgrid_engine::collab::{self, MemorySource, PersistRecord, RecordingNotifier};
use groomgrid_engine::config::SalonConfig;
use groomgrid_engine::controller::{Outcome as EngineOutcome, PlacementController};
use groomgrid_engine::grid::TimeGrid;
use groomgrid_engine::model::{self as engine, format_time, parse_date, parse_time};
use groomgrid_engine::store::{PersistAck, Reconciliation, ScheduleError};

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

#[napi(string_enum)]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BookingSource {
    Hotel,
    External,
}

#[napi(string_enum)]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReservationStatus {
    Pending,
    Confirmed,
    Completed,
    Cancelled,
}

#[napi(string_enum)]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HairdressingService {
    BathAndBrush,
    BathAndTrim,
    Stripping,
    Deshedding,
    Brushing,
    Spa,
    SpaOzone,
    KnotRemoval,
    HeavilySoiled,
}

#[napi(string_enum)]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotificationKind {
    Success,
    Info,
    Error,
}

// ---------------------------------------------------------------------------
// Enum conversions
// ---------------------------------------------------------------------------

impl From<BookingSource> for engine::BookingSource {
    fn from(v: BookingSource) -> Self {
        match v {
            BookingSource::Hotel => engine::BookingSource::Hotel,
            BookingSource::External => engine::BookingSource::External,
        }
    }
}

impl From<engine::BookingSource> for BookingSource {
    fn from(v: engine::BookingSource) -> Self {
        match v {
            engine::BookingSource::Hotel => BookingSource::Hotel,
            engine::BookingSource::External => BookingSource::External,
        }
    }
}

impl From<ReservationStatus> for engine::ReservationStatus {
    fn from(v: ReservationStatus) -> Self {
        match v {
            ReservationStatus::Pending => engine::ReservationStatus::Pending,
            ReservationStatus::Confirmed => engine::ReservationStatus::Confirmed,
            ReservationStatus::Completed => engine::ReservationStatus::Completed,
            ReservationStatus::Cancelled => engine::ReservationStatus::Cancelled,
        }
    }
}

impl From<engine::ReservationStatus> for ReservationStatus {
    fn from(v: engine::ReservationStatus) -> Self {
        match v {
            engine::ReservationStatus::Pending => ReservationStatus::Pending,
            engine::ReservationStatus::Confirmed => ReservationStatus::Confirmed,
            engine::ReservationStatus::Completed => ReservationStatus::Completed,
            engine::ReservationStatus::Cancelled => ReservationStatus::Cancelled,
        }
    }
}

impl From<HairdressingService> for engine::HairdressingService {
    fn from(v: HairdressingService) -> Self {
        match v {
            HairdressingService::BathAndBrush => engine::HairdressingService::BathAndBrush,
            HairdressingService::BathAndTrim => engine::HairdressingService::BathAndTrim,
            HairdressingService::Stripping => engine::HairdressingService::Stripping,
            HairdressingService::Deshedding => engine::HairdressingService::Deshedding,
            HairdressingService::Brushing => engine::HairdressingService::Brushing,
            HairdressingService::Spa => engine::HairdressingService::Spa,
            HairdressingService::SpaOzone => engine::HairdressingService::SpaOzone,
            HairdressingService::KnotRemoval => engine::HairdressingService::KnotRemoval,
            HairdressingService::HeavilySoiled => engine::HairdressingService::HeavilySoiled,
        }
    }
}

impl From<engine::HairdressingService> for HairdressingService {
    fn from(v: engine::HairdressingService) -> Self {
        match v {
            engine::HairdressingService::BathAndBrush => HairdressingService::BathAndBrush,
            engine::HairdressingService::BathAndTrim => HairdressingService::BathAndTrim,
            engine::HairdressingService::Stripping => HairdressingService::Stripping,
            engine::HairdressingService::Deshedding => HairdressingService::Deshedding,
            engine::HairdressingService::Brushing => HairdressingService::Brushing,
            engine::HairdressingService::Spa => HairdressingService::Spa,
            engine::HairdressingService::SpaOzone => HairdressingService::SpaOzone,
            engine::HairdressingService::KnotRemoval => HairdressingService::KnotRemoval,
            engine::HairdressingService::HeavilySoiled => HairdressingService::HeavilySoiled,
        }
    }
}

impl From<collab::NotificationKind> for NotificationKind {
    fn from(v: collab::NotificationKind) -> Self {
        match v {
            collab::NotificationKind::Success => NotificationKind::Success,
            collab::NotificationKind::Info => NotificationKind::Info,
            collab::NotificationKind::Error => NotificationKind::Error,
        }
    }
}

// ---------------------------------------------------------------------------
// Date / time helpers
// ---------------------------------------------------------------------------

fn date_from_js(raw: &str) -> Result<Option<chrono::NaiveDate>> {
    if raw.trim().is_empty() {
        return Ok(None);
    }
    parse_date(raw)
        .map(Some)
        .ok_or_else(|| Error::from_reason(format!("Invalid date '{}', expected YYYY-MM-DD", raw)))
}

fn time_from_js(raw: &str) -> Result<Option<chrono::NaiveTime>> {
    if raw.trim().is_empty() {
        return Ok(None);
    }
    parse_time(raw)
        .map(Some)
        .ok_or_else(|| Error::from_reason(format!("Invalid time '{}', expected HH:MM", raw)))
}

fn required<T>(value: Option<T>, what: &str) -> Result<T> {
    value.ok_or_else(|| Error::from_reason(format!("{} must not be empty", what)))
}

fn schedule_err(e: ScheduleError) -> Error {
    Error::from_reason(e.to_string())
}

fn config_from_js(config_json: Option<String>) -> Result<SalonConfig> {
    match config_json {
        Some(raw) => SalonConfig::from_json_str(&raw).map_err(|e| Error::from_reason(e.to_string())),
        None => Ok(SalonConfig::default()),
    }
}

// ---------------------------------------------------------------------------
// Mirror types: reservation side
// ---------------------------------------------------------------------------

#[napi(object)]
#[derive(Debug, Clone)]
pub struct Client {
    pub name: String,
    pub phone: String,
    pub email: Option<String>,
}

impl From<Client> for engine::Client {
    fn from(v: Client) -> Self {
        engine::Client {
            name: v.name,
            phone: v.phone,
            email: v.email,
        }
    }
}

impl From<engine::Client> for Client {
    fn from(v: engine::Client) -> Self {
        Client {
            name: v.name,
            phone: v.phone,
            email: v.email,
        }
    }
}

#[napi(object)]
#[derive(Debug, Clone)]
pub struct Pet {
    pub name: String,
    pub breed: String,
    pub size: String,
    pub weight: f64,
}

impl From<Pet> for engine::Pet {
    fn from(v: Pet) -> Self {
        engine::Pet {
            name: v.name,
            breed: v.breed,
            size: v.size,
            weight: v.weight,
        }
    }
}

impl From<engine::Pet> for Pet {
    fn from(v: engine::Pet) -> Self {
        Pet {
            name: v.name,
            breed: v.breed,
            size: v.size,
            weight: v.weight,
        }
    }
}

/// JS-facing reservation. `additionalServices` keeps the backend's JSON
/// shape and order; hairdressing entries are checked on the way in.
#[napi(object)]
#[derive(Debug, Clone)]
pub struct Reservation {
    pub id: String,
    pub source: BookingSource,
    /// `YYYY-MM-DD`, or empty.
    pub date: String,
    /// `HH:MM`, or empty when the reservation holds no slot.
    pub time: String,
    pub client: Client,
    pub pet: Pet,
    pub additional_services: Vec<serde_json::Value>,
    pub status: ReservationStatus,
    pub duration: Option<u32>,
}

impl TryFrom<Reservation> for engine::Reservation {
    type Error = Error;

    fn try_from(v: Reservation) -> Result<Self> {
        let additional_services = v
            .additional_services
            .into_iter()
            .map(serde_json::from_value::<engine::AdditionalService>)
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| {
                Error::from_reason(format!("Reservation '{}': {}", v.id, e))
            })?;
        Ok(engine::Reservation {
            id: v.id,
            source: v.source.into(),
            date: date_from_js(&v.date)?,
            time: time_from_js(&v.time)?,
            client: v.client.into(),
            pet: v.pet.into(),
            additional_services,
            status: v.status.into(),
            duration: v.duration,
        })
    }
}

impl From<engine::Reservation> for Reservation {
    fn from(v: engine::Reservation) -> Self {
        let additional_services = v
            .additional_services
            .iter()
            .filter_map(|s| serde_json::to_value(s).ok())
            .collect();
        Reservation {
            id: v.id,
            source: v.source.into(),
            date: v.date.map(|d| d.format("%Y-%m-%d").to_string()).unwrap_or_default(),
            time: v.time.map(format_time).unwrap_or_default(),
            client: v.client.into(),
            pet: v.pet.into(),
            additional_services,
            status: v.status.into(),
            duration: v.duration,
        }
    }
}

// ---------------------------------------------------------------------------
// Mirror types: grid / task side
// ---------------------------------------------------------------------------

#[napi(object)]
#[derive(Debug, Clone)]
pub struct Slot {
    pub date: String,
    pub time: String,
}

impl TryFrom<Slot> for engine::Slot {
    type Error = Error;

    fn try_from(v: Slot) -> Result<Self> {
        Ok(engine::Slot::new(
            required(date_from_js(&v.date)?, "slot date")?,
            required(time_from_js(&v.time)?, "slot time")?,
        ))
    }
}

impl From<engine::Slot> for Slot {
    fn from(v: engine::Slot) -> Self {
        Slot {
            date: v.date.format("%Y-%m-%d").to_string(),
            time: format_time(v.time),
        }
    }
}

#[napi(object)]
#[derive(Debug, Clone)]
pub struct Task {
    pub id: String,
    pub reservation_id: String,
    pub service_type: HairdressingService,
    pub pet_index: u32,
    pub date: String,
    pub time: String,
    pub duration_mins: u32,
}

impl From<engine::Task> for Task {
    fn from(v: engine::Task) -> Self {
        Task {
            id: v.id,
            reservation_id: v.reservation_id,
            service_type: v.service.service_type.into(),
            pet_index: v.service.pet_index,
            date: v.date.format("%Y-%m-%d").to_string(),
            time: format_time(v.time),
            duration_mins: v.duration_mins,
        }
    }
}

impl TryFrom<Task> for engine::Task {
    type Error = Error;

    fn try_from(v: Task) -> Result<Self> {
        Ok(engine::Task {
            id: v.id,
            reservation_id: v.reservation_id,
            service: engine::TaskService {
                service_type: v.service_type.into(),
                pet_index: v.pet_index,
            },
            date: required(date_from_js(&v.date)?, "task date")?,
            time: required(time_from_js(&v.time)?, "task time")?,
            duration_mins: v.duration_mins,
        })
    }
}

#[napi(object)]
#[derive(Debug, Clone)]
pub struct ScheduledEntry {
    pub reservation: Reservation,
    pub tasks: Vec<Task>,
}

// ---------------------------------------------------------------------------
// Mirror types: controller output
// ---------------------------------------------------------------------------

#[napi(object)]
#[derive(Debug, Clone)]
pub struct Conflict {
    pub task_id: String,
    pub with_task_id: String,
    pub with_reservation_id: String,
}

/// Flattened controller outcome. `outcome` is the camelCase outcome name;
/// committed transitions also carry `transitionKind`, `revision` and
/// `conflicts`.
#[napi(object)]
#[derive(Debug, Clone)]
pub struct Outcome {
    pub outcome: String,
    pub reservation_id: Option<String>,
    pub transition_kind: Option<String>,
    pub revision: Option<i64>,
    pub conflicts: Vec<Conflict>,
}

impl Outcome {
    fn simple(outcome: &str, reservation_id: Option<String>) -> Self {
        Outcome {
            outcome: outcome.to_string(),
            reservation_id,
            transition_kind: None,
            revision: None,
            conflicts: Vec::new(),
        }
    }
}

impl From<EngineOutcome> for Outcome {
    fn from(v: EngineOutcome) -> Self {
        match v {
            EngineOutcome::Ignored => Outcome::simple("ignored", None),
            EngineOutcome::TapPending { reservation_id } => {
                Outcome::simple("tapPending", Some(reservation_id))
            }
            EngineOutcome::Selected { reservation_id } => {
                Outcome::simple("selected", Some(reservation_id))
            }
            EngineOutcome::SelectionCleared { reservation_id } => {
                Outcome::simple("selectionCleared", Some(reservation_id))
            }
            EngineOutcome::DragStarted { reservation_id } => {
                Outcome::simple("dragStarted", Some(reservation_id))
            }
            EngineOutcome::DragCancelled { reservation_id } => {
                Outcome::simple("dragCancelled", reservation_id)
            }
            EngineOutcome::OpenEditor { reservation_id } => {
                Outcome::simple("openEditor", Some(reservation_id))
            }
            EngineOutcome::Committed { transition } => Outcome {
                outcome: "committed".to_string(),
                reservation_id: Some(transition.reservation.id.clone()),
                transition_kind: serde_json::to_value(transition.kind)
                    .ok()
                    .and_then(|k| k.as_str().map(str::to_string)),
                revision: Some(transition.revision as i64),
                conflicts: transition
                    .conflicts
                    .into_iter()
                    .map(|c| Conflict {
                        task_id: c.task_id,
                        with_task_id: c.with_task_id,
                        with_reservation_id: c.with_reservation_id,
                    })
                    .collect(),
            },
        }
    }
}

#[napi(object)]
#[derive(Debug, Clone)]
pub struct Notification {
    pub kind: NotificationKind,
    pub message: String,
}

#[napi(object)]
#[derive(Debug, Clone)]
pub struct PersistedChange {
    /// `upsert` or `delete`.
    pub op: String,
    pub reservation_id: String,
    pub revision: i64,
    pub reservation: Option<Reservation>,
}

impl From<PersistRecord> for PersistedChange {
    fn from(v: PersistRecord) -> Self {
        match v {
            PersistRecord::Upsert {
                reservation,
                revision,
            } => PersistedChange {
                op: "upsert".to_string(),
                reservation_id: reservation.id.clone(),
                revision: revision as i64,
                reservation: Some(reservation.into()),
            },
            PersistRecord::Delete {
                reservation_id,
                revision,
            } => PersistedChange {
                op: "delete".to_string(),
                reservation_id,
                revision: revision as i64,
                reservation: None,
            },
        }
    }
}

// ---------------------------------------------------------------------------
// Validation result
// ---------------------------------------------------------------------------

#[napi(object)]
#[derive(Debug, Clone)]
pub struct ValidationResult {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl From<groomgrid_engine::validator::ValidationResult> for ValidationResult {
    fn from(v: groomgrid_engine::validator::ValidationResult) -> Self {
        ValidationResult {
            errors: v.errors,
            warnings: v.warnings,
        }
    }
}

// ---------------------------------------------------------------------------
// Exported functions
// ---------------------------------------------------------------------------

fn convert_reservations(reservations: Vec<Reservation>) -> Result<Vec<engine::Reservation>> {
    reservations.into_iter().map(TryInto::try_into).collect()
}

/// Split a reservation's hairdressing services into chained tasks starting at
/// `date` `time`.
#[napi]
pub fn decompose(
    reservation: Reservation,
    date: String,
    time: String,
    config_json: Option<String>,
) -> Result<Vec<Task>> {
    let config = config_from_js(config_json)?;
    let reservation = engine::Reservation::try_from(reservation)?;
    let date = required(date_from_js(&date)?, "date")?;
    let time = required(time_from_js(&time)?, "time")?;
    groomgrid_engine::decomposer::decompose(&reservation, date, time, &config.service_durations)
        .map(|tasks| tasks.into_iter().map(Into::into).collect())
        .map_err(|e| Error::from_reason(e.to_string()))
}

/// Validate a batch of reservations and return errors and warnings.
#[napi]
pub fn validate(
    reservations: Vec<Reservation>,
    config_json: Option<String>,
) -> Result<ValidationResult> {
    let config = config_from_js(config_json)?;
    let reservations = convert_reservations(reservations)?;
    Ok(groomgrid_engine::validator::validate(&reservations, &config).into())
}

/// Slots of the business week containing `date`, one column per day.
#[napi]
pub fn enumerate_week(date: String, config_json: Option<String>) -> Result<Vec<Vec<Slot>>> {
    let config = config_from_js(config_json)?;
    let date = required(date_from_js(&date)?, "date")?;
    let grid = TimeGrid::new(&config).map_err(|e| Error::from_reason(e.to_string()))?;
    Ok(grid
        .enumerate_week(TimeGrid::week_start_of(date))
        .into_iter()
        .map(|day| day.into_iter().map(Into::into).collect())
        .collect())
}

// ---------------------------------------------------------------------------
// Scheduler class
// ---------------------------------------------------------------------------

/// In-process scheduler for a JS host. Persistence requests and user
/// notifications are buffered; the host drains them after each gesture.
#[napi]
pub struct Scheduler {
    inner: PlacementController<MemorySource, RecordingNotifier>,
}

#[napi]
impl Scheduler {
    #[napi(constructor)]
    pub fn new(reservations: Vec<Reservation>, config_json: Option<String>) -> Result<Self> {
        let config = config_from_js(config_json)?;
        let source = MemorySource::new(convert_reservations(reservations)?);
        let inner = PlacementController::new(&config, source, RecordingNotifier::default())
            .map_err(|e| Error::from_reason(e.to_string()))?;
        Ok(Scheduler { inner })
    }

    #[napi]
    pub fn press(&mut self, id: String) -> Result<Outcome> {
        self.inner.press(&id).map(Into::into).map_err(schedule_err)
    }

    #[napi]
    pub fn drop_on_slot(&mut self, slot: Slot) -> Result<Outcome> {
        let slot = engine::Slot::try_from(slot)?;
        self.inner.drop_on_slot(slot).map(Into::into).map_err(schedule_err)
    }

    #[napi]
    pub fn drop_on_unscheduled(&mut self) -> Result<Outcome> {
        self.inner.drop_on_unscheduled().map(Into::into).map_err(schedule_err)
    }

    #[napi]
    pub fn drag_end(&mut self) -> Outcome {
        self.inner.drag_end().into()
    }

    #[napi]
    pub fn tap_reservation(&mut self, id: String, at_ms: i64) -> Result<Outcome> {
        self.inner
            .tap_reservation(&id, at_ms.max(0) as u64)
            .map(Into::into)
            .map_err(schedule_err)
    }

    #[napi]
    pub fn tick(&mut self, at_ms: i64) -> Result<Outcome> {
        self.inner.tick(at_ms.max(0) as u64).map(Into::into).map_err(schedule_err)
    }

    #[napi]
    pub fn tap_slot(&mut self, slot: Slot) -> Result<Outcome> {
        let slot = engine::Slot::try_from(slot)?;
        self.inner.tap_slot(slot).map(Into::into).map_err(schedule_err)
    }

    #[napi]
    pub fn place(&mut self, id: String, slot: Slot) -> Result<Outcome> {
        let slot = engine::Slot::try_from(slot)?;
        self.inner.place(&id, slot).map(Into::into).map_err(schedule_err)
    }

    #[napi]
    pub fn unschedule(&mut self, id: String) -> Result<Outcome> {
        self.inner.unschedule(&id).map(Into::into).map_err(schedule_err)
    }

    #[napi]
    pub fn create(&mut self, reservation: Reservation) -> Result<Outcome> {
        let reservation = engine::Reservation::try_from(reservation)?;
        self.inner.create(reservation).map(Into::into).map_err(schedule_err)
    }

    #[napi]
    pub fn update(&mut self, reservation: Reservation) -> Result<Outcome> {
        let reservation = engine::Reservation::try_from(reservation)?;
        self.inner.update(reservation).map(Into::into).map_err(schedule_err)
    }

    #[napi]
    pub fn replace_tasks(&mut self, id: String, tasks: Vec<Task>) -> Result<Outcome> {
        let tasks = tasks
            .into_iter()
            .map(engine::Task::try_from)
            .collect::<Result<Vec<_>>>()?;
        self.inner.replace_tasks(&id, tasks).map(Into::into).map_err(schedule_err)
    }

    #[napi]
    pub fn remove(&mut self, id: String) -> Result<Outcome> {
        self.inner.remove(&id).map(Into::into).map_err(schedule_err)
    }

    /// Apply a backend acknowledgement. Returns `applied`, `stale` or
    /// `unknown`.
    #[napi]
    pub fn acknowledge(
        &mut self,
        reservation_id: String,
        revision: i64,
        status: Option<ReservationStatus>,
    ) -> String {
        let ack = PersistAck {
            reservation_id,
            revision: revision.max(0) as u64,
            status: status.map(Into::into),
        };
        match self.inner.acknowledge(&ack) {
            Reconciliation::Applied => "applied",
            Reconciliation::Stale { .. } => "stale",
            Reconciliation::Unknown => "unknown",
        }
        .to_string()
    }

    #[napi]
    pub fn refresh(&mut self) -> Result<Vec<String>> {
        self.inner
            .refresh()
            .map(|report| report.warnings)
            .map_err(|e| Error::from_reason(e.to_string()))
    }

    #[napi]
    pub fn unscheduled(&self) -> Vec<Reservation> {
        self.inner
            .store()
            .unscheduled()
            .iter()
            .cloned()
            .map(Into::into)
            .collect()
    }

    #[napi]
    pub fn scheduled(&self) -> Vec<ScheduledEntry> {
        self.inner
            .store()
            .scheduled()
            .iter()
            .map(|e| ScheduledEntry {
                reservation: e.reservation.clone().into(),
                tasks: e.tasks.iter().cloned().map(Into::into).collect(),
            })
            .collect()
    }

    #[napi]
    pub fn selection(&self) -> Option<String> {
        self.inner.store().selection().map(str::to_string)
    }

    #[napi]
    pub fn occupancy(&self, slot: Slot) -> Result<u32> {
        let slot = engine::Slot::try_from(slot)?;
        Ok(self.inner.store().occupancy(&slot) as u32)
    }

    #[napi]
    pub fn eligible_slots(&self, date: String) -> Result<Vec<Slot>> {
        let date = required(date_from_js(&date)?, "date")?;
        Ok(self
            .inner
            .eligible_slots(date)
            .into_iter()
            .map(Into::into)
            .collect())
    }

    #[napi]
    pub fn drain_notifications(&mut self) -> Vec<Notification> {
        self.inner
            .notifier_mut()
            .drain()
            .into_iter()
            .map(|n| Notification {
                kind: n.kind.into(),
                message: n.message,
            })
            .collect()
    }

    #[napi]
    pub fn drain_persisted(&mut self) -> Vec<PersistedChange> {
        self.inner
            .source_mut()
            .drain_log()
            .into_iter()
            .map(Into::into)
            .collect()
    }
}
