use std::fmt;

use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime};
use serde::{de, Deserialize, Deserializer, Serialize};

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// Where a reservation came from: pre-accepted by the affiliated hotel, or
/// booked directly by an outside client.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BookingSource {
    Hotel,
    External,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ReservationStatus {
    Pending,
    Confirmed,
    Completed,
    Cancelled,
}

/// Concrete grooming service types. Each maps to a default duration through
/// the salon configuration.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
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

impl HairdressingService {
    pub const ALL: [HairdressingService; 9] = [
        HairdressingService::BathAndBrush,
        HairdressingService::BathAndTrim,
        HairdressingService::Stripping,
        HairdressingService::Deshedding,
        HairdressingService::Brushing,
        HairdressingService::Spa,
        HairdressingService::SpaOzone,
        HairdressingService::KnotRemoval,
        HairdressingService::HeavilySoiled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            HairdressingService::BathAndBrush => "bath_and_brush",
            HairdressingService::BathAndTrim => "bath_and_trim",
            HairdressingService::Stripping => "stripping",
            HairdressingService::Deshedding => "deshedding",
            HairdressingService::Brushing => "brushing",
            HairdressingService::Spa => "spa",
            HairdressingService::SpaOzone => "spa_ozone",
            HairdressingService::KnotRemoval => "knot_removal",
            HairdressingService::HeavilySoiled => "heavily_soiled",
        }
    }
}

impl fmt::Display for HairdressingService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Derived from the current time against a task's `[start, end)` window.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    InProgress,
    Completed,
}

// ---------------------------------------------------------------------------
// Reservation building blocks
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Client {
    pub name: String,
    pub phone: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Pet {
    pub name: String,
    pub breed: String,
    pub size: String,
    /// Kilograms.
    pub weight: f64,
}

/// Tag value that marks an additional service as a hairdressing request.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum HairdressingKind {
    Hairdressing,
}

/// A hairdressing entry of a reservation: an ordered list of concrete
/// services for one of the reservation's pets.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HairdressingRequest {
    pub kind: HairdressingKind,
    pub services: Vec<HairdressingService>,
    #[serde(default)]
    pub pet_index: u32,
}

/// An additional service attached to a reservation. Only hairdressing
/// requests matter for scheduling; every other kind (transport, medication,
/// ...) is carried through untouched.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(untagged)]
pub enum AdditionalService {
    Hairdressing(HairdressingRequest),
    Other(serde_json::Value),
}

/// Dispatches on `kind`: an entry tagged `hairdressing` must parse as a
/// [`HairdressingRequest`] or the whole reservation is rejected.
impl<'de> Deserialize<'de> for AdditionalService {
    fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        let value = serde_json::Value::deserialize(d)?;
        if value.get("kind").and_then(serde_json::Value::as_str) == Some("hairdressing") {
            serde_json::from_value(value)
                .map(AdditionalService::Hairdressing)
                .map_err(|e| de::Error::custom(format!("invalid hairdressing service: {}", e)))
        } else {
            Ok(AdditionalService::Other(value))
        }
    }
}

impl AdditionalService {
    pub fn hairdressing(services: Vec<HairdressingService>) -> Self {
        AdditionalService::Hairdressing(HairdressingRequest {
            kind: HairdressingKind::Hairdressing,
            services,
            pet_index: 0,
        })
    }
}

// ---------------------------------------------------------------------------
// Reservation
// ---------------------------------------------------------------------------

/// A booked grooming appointment. `time == None` means it sits in the
/// unscheduled pool; `time == Some(_)` means it holds a slot.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Reservation {
    pub id: String,
    pub source: BookingSource,
    #[serde(default, with = "opt_date")]
    pub date: Option<NaiveDate>,
    #[serde(default, with = "opt_hhmm")]
    pub time: Option<NaiveTime>,
    pub client: Client,
    pub pet: Pet,
    #[serde(default)]
    pub additional_services: Vec<AdditionalService>,
    pub status: ReservationStatus,
    /// Aggregate minutes across all decomposed tasks.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<u32>,
}

impl Reservation {
    /// Hairdressing services in encounter order: entry order first, then the
    /// order inside each entry. Yields `(pet_index, service)`.
    pub fn hairdressing_services(&self) -> impl Iterator<Item = (u32, HairdressingService)> + '_ {
        self.additional_services
            .iter()
            .filter_map(|s| match s {
                AdditionalService::Hairdressing(req) => Some(req),
                AdditionalService::Other(_) => None,
            })
            .flat_map(|req| req.services.iter().map(move |svc| (req.pet_index, *svc)))
    }

    pub fn has_hairdressing(&self) -> bool {
        self.hairdressing_services().next().is_some()
    }

    /// The slot this reservation occupies, if it has both a date and a time.
    pub fn slot(&self) -> Option<Slot> {
        match (self.date, self.time) {
            (Some(date), Some(time)) => Some(Slot { date, time }),
            _ => None,
        }
    }

    /// Same reservation, ignoring where it sits on the grid.
    pub(crate) fn same_placement(&self, other: &Reservation) -> bool {
        self.date == other.date && self.time == other.time
    }
}

// ---------------------------------------------------------------------------
// Tasks and slots
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TaskService {
    pub service_type: HairdressingService,
    pub pet_index: u32,
}

/// One concrete service unit derived from a reservation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: String,
    pub reservation_id: String,
    pub service: TaskService,
    pub date: NaiveDate,
    #[serde(with = "hhmm")]
    pub time: NaiveTime,
    pub duration_mins: u32,
}

impl Task {
    pub fn starts_at(&self) -> NaiveDateTime {
        self.date.and_time(self.time)
    }

    pub fn ends_at(&self) -> NaiveDateTime {
        self.starts_at() + Duration::minutes(self.duration_mins as i64)
    }

    pub fn status_at(&self, now: NaiveDateTime) -> TaskStatus {
        if now < self.starts_at() {
            TaskStatus::Pending
        } else if now < self.ends_at() {
            TaskStatus::InProgress
        } else {
            TaskStatus::Completed
        }
    }
}

/// An addressable grid cell. Occupancy is never stored here; it is counted
/// from the scheduled pool on demand.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "camelCase")]
pub struct Slot {
    pub date: NaiveDate,
    #[serde(with = "hhmm")]
    pub time: NaiveTime,
}

impl Slot {
    pub fn new(date: NaiveDate, time: NaiveTime) -> Self {
        Slot { date, time }
    }

    pub fn starts_at(&self) -> NaiveDateTime {
        self.date.and_time(self.time)
    }
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.date.format("%Y-%m-%d"), format_time(self.time))
    }
}

// ---------------------------------------------------------------------------
// Date / time text helpers
// ---------------------------------------------------------------------------

const TIME_FORMATS: &[&str] = &["%H:%M", "%H:%M:%S"];

/// Parse `HH:MM` (or `HH:MM:SS`). Blank input is not a time.
pub fn parse_time(s: &str) -> Option<NaiveTime> {
    let s = s.trim();
    TIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveTime::parse_from_str(s, fmt).ok())
}

pub fn format_time(t: NaiveTime) -> String {
    t.format("%H:%M").to_string()
}

/// Parse `YYYY-MM-DD`, tolerating a trailing `T...` time part.
pub fn parse_date(s: &str) -> Option<NaiveDate> {
    let s = s.trim();
    let day = s.split('T').next().unwrap_or(s);
    NaiveDate::parse_from_str(day, "%Y-%m-%d").ok()
}

mod hhmm {
    use chrono::NaiveTime;
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(t: &NaiveTime, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&super::format_time(*t))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<NaiveTime, D::Error> {
        let raw = String::deserialize(d)?;
        super::parse_time(&raw)
            .ok_or_else(|| de::Error::custom(format!("invalid time '{}', expected HH:MM", raw)))
    }
}

mod opt_hhmm {
    use chrono::NaiveTime;
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(t: &Option<NaiveTime>, s: S) -> Result<S::Ok, S::Error> {
        match t {
            Some(t) => s.serialize_str(&super::format_time(*t)),
            None => s.serialize_str(""),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<NaiveTime>, D::Error> {
        match Option::<String>::deserialize(d)? {
            Some(raw) if !raw.trim().is_empty() => super::parse_time(&raw)
                .map(Some)
                .ok_or_else(|| de::Error::custom(format!("invalid time '{}', expected HH:MM", raw))),
            _ => Ok(None),
        }
    }
}

mod opt_date {
    use chrono::NaiveDate;
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Option<NaiveDate>, s: S) -> Result<S::Ok, S::Error> {
        match d {
            Some(d) => s.serialize_str(&d.format("%Y-%m-%d").to_string()),
            None => s.serialize_str(""),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<NaiveDate>, D::Error> {
        match Option::<String>::deserialize(d)? {
            Some(raw) if !raw.trim().is_empty() => super::parse_date(&raw)
                .map(Some)
                .ok_or_else(|| de::Error::custom(format!("invalid date '{}', expected YYYY-MM-DD", raw))),
            _ => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RAW: &str = r#"{
        "id": "r1",
        "source": "hotel",
        "date": "2024-03-20",
        "time": "",
        "client": { "name": "Ana", "phone": "600000000" },
        "pet": { "name": "Toby", "breed": "Schnauzer", "size": "small", "weight": 7.5 },
        "additionalServices": [
            { "kind": "transport", "pickup": "09:00" },
            { "kind": "hairdressing", "services": ["bath_and_brush", "spa"] },
            { "kind": "hairdressing", "services": ["knot_removal"], "petIndex": 1 }
        ],
        "status": "confirmed"
    }"#;

    #[test]
    fn test_blank_time_is_unscheduled() {
        let r: Reservation = serde_json::from_str(RAW).unwrap();
        assert_eq!(r.time, None);
        assert_eq!(r.date, NaiveDate::from_ymd_opt(2024, 3, 20));
        assert!(r.slot().is_none());
    }

    #[test]
    fn test_hairdressing_services_in_encounter_order() {
        let r: Reservation = serde_json::from_str(RAW).unwrap();
        let services: Vec<_> = r.hairdressing_services().collect();
        assert_eq!(
            services,
            vec![
                (0, HairdressingService::BathAndBrush),
                (0, HairdressingService::Spa),
                (1, HairdressingService::KnotRemoval),
            ]
        );
    }

    #[test]
    fn test_other_service_kinds_survive_serialization() {
        let r: Reservation = serde_json::from_str(RAW).unwrap();
        let json = serde_json::to_value(&r).unwrap();
        assert_eq!(json["additionalServices"][0]["kind"], "transport");
        assert_eq!(json["additionalServices"][0]["pickup"], "09:00");
        assert_eq!(json["time"], "");
    }

    #[test]
    fn test_invalid_time_rejected() {
        let raw = RAW.replace(r#""time": """#, r#""time": "25:99""#);
        assert!(serde_json::from_str::<Reservation>(&raw).is_err());
    }

    #[test]
    fn test_task_status_window() {
        let task = Task {
            id: "r1-0".to_string(),
            reservation_id: "r1".to_string(),
            service: TaskService {
                service_type: HairdressingService::Spa,
                pet_index: 0,
            },
            date: NaiveDate::from_ymd_opt(2024, 3, 20).unwrap(),
            time: NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
            duration_mins: 45,
        };
        let at = |h, m| task.date.and_hms_opt(h, m, 0).unwrap();
        assert_eq!(task.status_at(at(8, 59)), TaskStatus::Pending);
        assert_eq!(task.status_at(at(9, 0)), TaskStatus::InProgress);
        assert_eq!(task.status_at(at(9, 44)), TaskStatus::InProgress);
        assert_eq!(task.status_at(at(9, 45)), TaskStatus::Completed);
    }

    #[test]
    fn test_parse_time_accepts_seconds() {
        assert_eq!(parse_time("10:30:00"), NaiveTime::from_hms_opt(10, 30, 0));
        assert_eq!(parse_time("  "), None);
    }

    #[test]
    fn test_unknown_hairdressing_service_rejected() {
        let raw = r#"{ "kind": "hairdressing", "services": ["bath_and_brush", "nail_trim"] }"#;
        let err = serde_json::from_str::<AdditionalService>(raw).unwrap_err();
        assert!(err.to_string().contains("invalid hairdressing service"), "{}", err);

        let missing = r#"{ "kind": "hairdressing" }"#;
        assert!(serde_json::from_str::<AdditionalService>(missing).is_err());
    }

    #[test]
    fn test_reservation_with_bad_hairdressing_rejected() {
        let raw = RAW.replace("\"knot_removal\"", "\"nail_trim\"");
        assert!(serde_json::from_str::<Reservation>(&raw).is_err());
    }

    #[test]
    fn test_other_kinds_stay_opaque() {
        let raw = r#"{ "kind": "transport", "services": ["nail_trim"] }"#;
        let service: AdditionalService = serde_json::from_str(raw).unwrap();
        assert!(matches!(service, AdditionalService::Other(_)));
        assert_eq!(serde_json::to_string(&service).unwrap(), raw.replace(' ', ""));
    }

    #[test]
    fn test_additional_services_keep_booking_order() {
        let r: Reservation = serde_json::from_str(RAW).unwrap();
        let entries: Vec<serde_json::Value> = r
            .additional_services
            .iter()
            .map(|s| serde_json::to_value(s).unwrap())
            .collect();
        let kinds: Vec<&str> = entries.iter().map(|e| e["kind"].as_str().unwrap()).collect();
        assert_eq!(kinds, vec!["transport", "hairdressing", "hairdressing"]);

        let back: Vec<AdditionalService> = entries
            .into_iter()
            .map(|e| serde_json::from_value(e).unwrap())
            .collect();
        assert_eq!(back, r.additional_services);
    }
}
