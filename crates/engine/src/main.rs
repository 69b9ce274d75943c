use std::io::{self, Read, Write};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing_subscriber::EnvFilter;

use groomgrid_engine::collab::{MemorySource, Notification, PersistRecord, RecordingNotifier};
use groomgrid_engine::config::{ConfigError, SalonConfig};
use groomgrid_engine::controller::{Outcome, PlacementController};
use groomgrid_engine::decomposer::{decompose, total_duration};
use groomgrid_engine::grid::TimeGrid;
use groomgrid_engine::model::{parse_time, Reservation, ReservationStatus, Slot, Task};
use groomgrid_engine::store::{LoadReport, PersistAck, Reconciliation, SchedulerStore, StoreSnapshot};
use groomgrid_engine::validator;

const CONFIG_ENV: &str = "GROOMGRID_CONFIG";

// ---------------------------------------------------------------------------
// Request / Response types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(tag = "command", rename_all = "camelCase")]
enum Request {
    Decompose {
        reservation: Reservation,
        date: NaiveDate,
        time: String,
        config: Option<SalonConfig>,
    },
    Validate {
        reservations: Vec<Reservation>,
        config: Option<SalonConfig>,
    },
    Grid {
        date: NaiveDate,
        #[serde(default)]
        view: GridView,
        #[serde(default)]
        reservations: Vec<Reservation>,
        config: Option<SalonConfig>,
    },
    Simulate {
        reservations: Vec<Reservation>,
        actions: Vec<Action>,
        config: Option<SalonConfig>,
    },
}

#[derive(Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
enum GridView {
    #[default]
    Day,
    Week,
}

/// One host event replayed against the controller.
#[derive(Debug, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase", rename_all_fields = "camelCase")]
enum Action {
    Press { id: String },
    DropOnSlot { slot: Slot },
    DropOnUnscheduled,
    DragEnd,
    TapReservation { id: String, at: u64 },
    TapSlot { slot: Slot },
    Tick { at: u64 },
    Place { id: String, slot: Slot },
    Unschedule { id: String },
    Create { reservation: Reservation },
    Update { reservation: Reservation },
    Remove { id: String },
    Ack {
        reservation_id: String,
        revision: u64,
        status: Option<ReservationStatus>,
    },
}

#[derive(Debug, Serialize)]
struct OkResponse<T: Serialize> {
    ok: bool,
    data: T,
}

#[derive(Debug, Serialize)]
struct ErrResponse {
    ok: bool,
    error: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Decomposition {
    tasks: Vec<Task>,
    total_duration_mins: u32,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SlotView {
    #[serde(flatten)]
    slot: Slot,
    occupancy: usize,
    eligible: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GridResponse {
    week_start: NaiveDate,
    days: Vec<Vec<SlotView>>,
    load: LoadReport,
}

#[derive(Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
struct ActionResult {
    ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    outcome: Option<Outcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    reconciliation: Option<Reconciliation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SimulationReport {
    load: LoadReport,
    results: Vec<ActionResult>,
    state: StoreSnapshot,
    notifications: Vec<Notification>,
    persisted: Vec<PersistRecord>,
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Inline config wins, then the file named by `GROOMGRID_CONFIG`, then the
/// built-in defaults.
fn resolve_config(inline: Option<SalonConfig>) -> Result<SalonConfig, ConfigError> {
    match inline {
        Some(config) => {
            config.validate()?;
            Ok(config)
        }
        None => match std::env::var(CONFIG_ENV) {
            Ok(path) if !path.is_empty() => SalonConfig::load(path),
            _ => Ok(SalonConfig::default()),
        },
    }
}

fn run_grid(
    config: &SalonConfig,
    date: NaiveDate,
    view: GridView,
    reservations: Vec<Reservation>,
) -> Result<GridResponse, ConfigError> {
    let grid = TimeGrid::new(config)?;
    let mut store = SchedulerStore::new(config.service_durations.clone());
    let load = store.load(reservations);

    let week_start = TimeGrid::week_start_of(date);
    let columns = match view {
        GridView::Day => vec![grid.enumerate_day(date)],
        GridView::Week => grid.enumerate_week(week_start),
    };
    let days = columns
        .into_iter()
        .map(|column| {
            column
                .into_iter()
                .map(|slot| SlotView {
                    slot,
                    occupancy: store.occupancy(&slot),
                    eligible: store.is_eligible(&slot),
                })
                .collect()
        })
        .collect();

    Ok(GridResponse {
        week_start,
        days,
        load,
    })
}

fn run_simulation(
    config: &SalonConfig,
    reservations: Vec<Reservation>,
    actions: Vec<Action>,
) -> Result<SimulationReport, String> {
    let mut controller = PlacementController::new(
        config,
        MemorySource::new(reservations),
        RecordingNotifier::default(),
    )
    .map_err(|e| e.to_string())?;
    let load = controller.last_load().clone();

    let mut results = Vec::with_capacity(actions.len());
    for action in actions {
        let outcome = match action {
            Action::Press { id } => controller.press(&id),
            Action::DropOnSlot { slot } => controller.drop_on_slot(slot),
            Action::DropOnUnscheduled => controller.drop_on_unscheduled(),
            Action::DragEnd => Ok(controller.drag_end()),
            Action::TapReservation { id, at } => controller.tap_reservation(&id, at),
            Action::TapSlot { slot } => controller.tap_slot(slot),
            Action::Tick { at } => controller.tick(at),
            Action::Place { id, slot } => controller.place(&id, slot),
            Action::Unschedule { id } => controller.unschedule(&id),
            Action::Create { reservation } => controller.create(reservation),
            Action::Update { reservation } => controller.update(reservation),
            Action::Remove { id } => controller.remove(&id),
            Action::Ack {
                reservation_id,
                revision,
                status,
            } => {
                let reconciliation = controller.acknowledge(&PersistAck {
                    reservation_id,
                    revision,
                    status,
                });
                results.push(ActionResult {
                    ok: true,
                    reconciliation: Some(reconciliation),
                    ..ActionResult::default()
                });
                continue;
            }
        };
        results.push(match outcome {
            Ok(outcome) => ActionResult {
                ok: true,
                outcome: Some(outcome),
                ..ActionResult::default()
            },
            Err(e) => ActionResult {
                ok: false,
                error: Some(e.to_string()),
                ..ActionResult::default()
            },
        });
    }

    Ok(SimulationReport {
        load,
        results,
        state: controller.store().snapshot(),
        notifications: controller.notifier_mut().drain(),
        persisted: controller.source_mut().drain_log(),
    })
}

fn write_ok<T: Serialize>(data: T) {
    let resp = OkResponse { ok: true, data };
    let json = serde_json::to_string(&resp).unwrap_or_else(|e| {
        format!("{{\"ok\":false,\"error\":\"serialization error: {}\"}}", e)
    });
    println!("{}", json);
    let _ = io::stdout().flush();
}

fn write_err(msg: impl std::fmt::Display) -> ! {
    let resp = ErrResponse {
        ok: false,
        error: msg.to_string(),
    };
    let json = serde_json::to_string(&resp).unwrap_or_else(|_| {
        "{\"ok\":false,\"error\":\"double serialization error\"}".to_string()
    });
    println!("{}", json);
    let _ = io::stdout().flush();
    std::process::exit(1);
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(io::stderr)
        .init();

    // Read all of stdin
    let mut input = String::new();
    if let Err(e) = io::stdin().read_to_string(&mut input) {
        write_err(format!("Failed to read stdin: {}", e));
    }

    // Parse request
    let request: Request = match serde_json::from_str(&input) {
        Ok(r) => r,
        Err(e) => write_err(format!("Invalid JSON input: {}", e)),
    };

    match request {
        Request::Decompose {
            reservation,
            date,
            time,
            config,
        } => {
            let config = resolve_config(config).unwrap_or_else(|e| write_err(e));
            let time = parse_time(&time)
                .unwrap_or_else(|| write_err(format!("Invalid time '{}', expected HH:MM", time)));
            match decompose(&reservation, date, time, &config.service_durations) {
                Ok(tasks) => write_ok(Decomposition {
                    total_duration_mins: total_duration(&tasks),
                    tasks,
                }),
                Err(e) => write_err(e),
            }
        }
        Request::Validate {
            reservations,
            config,
        } => {
            let config = resolve_config(config).unwrap_or_else(|e| write_err(e));
            write_ok(validator::validate(&reservations, &config));
        }
        Request::Grid {
            date,
            view,
            reservations,
            config,
        } => {
            let config = resolve_config(config).unwrap_or_else(|e| write_err(e));
            match run_grid(&config, date, view, reservations) {
                Ok(grid) => write_ok(grid),
                Err(e) => write_err(e),
            }
        }
        Request::Simulate {
            reservations,
            actions,
            config,
        } => {
            let config = resolve_config(config).unwrap_or_else(|e| write_err(e));
            match run_simulation(&config, reservations, actions) {
                Ok(report) => write_ok(report),
                Err(e) => write_err(e),
            }
        }
    }
}
