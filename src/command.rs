//! JSON-lines command surface used by the `fleetbook` binary.
//!
//! One request object per line, tagged by `op`; one response object per
//! line: `{"ok":true,"data":...}` or `{"ok":false,"error":<kind>,...}`.

use std::sync::Arc;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Deserialize;
use serde_json::{Value, json};
use thiserror::Error;
use ulid::Ulid;

use crate::advisor::{self, AdvisorError};
use crate::engine::{Engine, EngineError};
use crate::limits::{DAY_MS, MAX_QUERY_WINDOW_MS, MAX_VALID_TIMESTAMP_MS, MIN_VALID_TIMESTAMP_MS};
use crate::model::*;
use crate::store::FleetDirectory;

/// How far past a rejected start the driver looks for an alternative slot.
const SUGGESTION_HORIZON_MS: Ms = 7 * DAY_MS;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Command {
    RegisterVehicle {
        id: Option<Ulid>,
    },
    RetireVehicle {
        id: Ulid,
    },
    Create {
        id: Option<Ulid>,
        vehicle: Ulid,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        holder: String,
        #[serde(default)]
        purpose: String,
        #[serde(default)]
        activate: bool,
    },
    Update {
        id: Ulid,
        vehicle: Option<Ulid>,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
        holder: Option<String>,
        purpose: Option<String>,
    },
    Cancel {
        id: Ulid,
    },
    Complete {
        id: Ulid,
    },
    Activate {
        id: Ulid,
    },
    Get {
        id: Ulid,
    },
    List {
        vehicle: Ulid,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    },
    FreeWindows {
        vehicle: Ulid,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        min_minutes: Option<i64>,
    },
    UpcomingMaintenance {
        tasks: Vec<TaskInput>,
        now: Option<DateTime<Utc>>,
        days: u32,
    },
    OverdueMaintenance {
        tasks: Vec<TaskInput>,
        now: Option<DateTime<Utc>>,
    },
    FuelSummary {
        entries: Vec<FuelInput>,
    },
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TaskInput {
    pub id: Option<Ulid>,
    pub vehicle: Ulid,
    pub schedule_date: DateTime<Utc>,
    #[serde(default = "scheduled")]
    pub status: MaintenanceStatus,
    pub completed_at: Option<DateTime<Utc>>,
    pub cost: Option<f64>,
    pub description: Option<String>,
}

fn scheduled() -> MaintenanceStatus {
    MaintenanceStatus::Scheduled
}

impl From<TaskInput> for MaintenanceTask {
    fn from(t: TaskInput) -> Self {
        MaintenanceTask {
            id: t.id.unwrap_or_else(Ulid::new),
            resource_id: t.vehicle,
            schedule_date: t.schedule_date.timestamp_millis(),
            status: t.status,
            completed_at: t.completed_at.map(|at| at.timestamp_millis()),
            cost: t.cost,
            description: t.description,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct FuelInput {
    pub vehicle: Ulid,
    pub at: DateTime<Utc>,
    pub odometer: f64,
    pub fuel: f64,
    pub cost: f64,
}

impl From<FuelInput> for FuelLogEntry {
    fn from(f: FuelInput) -> Self {
        FuelLogEntry {
            resource_id: f.vehicle,
            at: f.at.timestamp_millis(),
            odometer: f.odometer,
            fuel: f.fuel,
            cost: f.cost,
        }
    }
}

#[derive(Debug, Error)]
pub enum CommandError {
    #[error("bad request: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("{0}")]
    Engine(#[from] EngineError),
    #[error("{0}")]
    Advisor(#[from] AdvisorError),
    /// A create lost to existing reservations; `suggestion` is the earliest
    /// same-length free slot in the following week, if any.
    #[error("vehicle unavailable: overlaps {} reservation(s)", .conflicts.len())]
    Unavailable {
        conflicts: Vec<Reservation>,
        suggestion: Option<Span>,
    },
    #[error("unknown vehicle: {0}")]
    UnknownVehicle(Ulid),
}

impl CommandError {
    pub fn kind(&self) -> &'static str {
        match self {
            CommandError::Parse(_) => "bad_request",
            CommandError::Engine(e) => e.kind(),
            CommandError::Advisor(AdvisorError::OdometerRegression { .. }) => "odometer_regression",
            CommandError::Advisor(AdvisorError::InvalidTransition { .. }) => "invalid_transition",
            CommandError::Advisor(AdvisorError::InvalidWindow(_)) => "invalid_window",
            CommandError::Advisor(AdvisorError::InvalidTimestamp(_)) => "invalid_timestamp",
            CommandError::Unavailable { .. } => "resource_unavailable",
            CommandError::UnknownVehicle(_) => "not_found",
        }
    }
}

pub fn parse(line: &str) -> Result<Command, CommandError> {
    Ok(serde_json::from_str(line)?)
}

/// Executes commands against one engine and the vehicle directory it
/// consults.
#[derive(Clone)]
pub struct Driver {
    engine: Engine,
    directory: Arc<FleetDirectory>,
}

impl Driver {
    pub fn new(engine: Engine, directory: Arc<FleetDirectory>) -> Self {
        Self { engine, directory }
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    /// Parse, execute and render one request line. Never fails: errors are
    /// rendered as `ok: false` responses.
    pub async fn handle_line(&self, line: &str) -> Value {
        let result = match parse(line) {
            Ok(cmd) => {
                let op = crate::observability::command_label(&cmd);
                let result = self.execute_command(cmd).await;
                if let Err(e) = &result {
                    tracing::debug!("{op} failed: {e}");
                }
                result
            }
            Err(e) => Err(e),
        };
        match result {
            Ok(data) => json!({ "ok": true, "data": data }),
            Err(e) => error_response(&e),
        }
    }

    pub async fn execute_command(&self, cmd: Command) -> Result<Value, CommandError> {
        let engine = &self.engine;
        match cmd {
            Command::RegisterVehicle { id } => {
                let id = id.unwrap_or_else(Ulid::new);
                let added = self.directory.register(id).map_err(EngineError::from)?;
                Ok(json!({ "id": id.to_string(), "added": added }))
            }
            Command::RetireVehicle { id } => {
                if !self.directory.retire(&id).map_err(EngineError::from)? {
                    return Err(CommandError::UnknownVehicle(id));
                }
                engine.notify.remove(&id);
                Ok(json!({ "id": id.to_string() }))
            }
            Command::Create {
                id,
                vehicle,
                start,
                end,
                holder,
                purpose,
                activate,
            } => {
                let (start, end) = (start.timestamp_millis(), end.timestamp_millis());
                let req = NewReservation {
                    id,
                    resource_id: vehicle,
                    start,
                    end,
                    holder,
                    purpose,
                    activate,
                };
                match engine.create(req).await {
                    Ok(reservation) => Ok(reservation_view(&reservation)),
                    Err(EngineError::ResourceUnavailable(conflicts)) => {
                        Err(self.unavailable(vehicle, start, end, conflicts).await)
                    }
                    Err(e) => Err(e.into()),
                }
            }
            Command::Update {
                id,
                vehicle,
                start,
                end,
                holder,
                purpose,
            } => {
                let changes = ReservationChanges {
                    resource_id: vehicle,
                    start: start.map(|t| t.timestamp_millis()),
                    end: end.map(|t| t.timestamp_millis()),
                    holder,
                    purpose,
                };
                let updated = engine.update(id, changes).await?;
                Ok(reservation_view(&updated))
            }
            Command::Cancel { id } => Ok(reservation_view(&engine.cancel(id).await?)),
            Command::Complete { id } => Ok(reservation_view(&engine.complete(id).await?)),
            Command::Activate { id } => Ok(reservation_view(&engine.activate(id).await?)),
            Command::Get { id } => Ok(reservation_view(&engine.get(id).await?)),
            Command::List {
                vehicle,
                start,
                end,
            } => {
                let window = match (start, end) {
                    (Some(s), Some(e)) => Some((s.timestamp_millis(), e.timestamp_millis())),
                    // Open ends reach as far as one query window allows.
                    (Some(s), None) => {
                        let s = s.timestamp_millis();
                        let e = s.saturating_add(MAX_QUERY_WINDOW_MS).min(MAX_VALID_TIMESTAMP_MS);
                        Some((s, e))
                    }
                    (None, Some(e)) => {
                        let e = e.timestamp_millis();
                        let s = e.saturating_sub(MAX_QUERY_WINDOW_MS).max(MIN_VALID_TIMESTAMP_MS);
                        Some((s, e))
                    }
                    (None, None) => None,
                };
                let list = engine.reservations_for(vehicle, window).await?;
                Ok(Value::Array(list.iter().map(reservation_view).collect()))
            }
            Command::FreeWindows {
                vehicle,
                start,
                end,
                min_minutes,
            } => {
                let free = engine
                    .free_windows(
                        vehicle,
                        start.timestamp_millis(),
                        end.timestamp_millis(),
                        min_minutes.map(|m| m.saturating_mul(60_000)),
                    )
                    .await?;
                Ok(Value::Array(free.iter().map(span_view).collect()))
            }
            Command::UpcomingMaintenance { tasks, now, days } => {
                let tasks: Vec<MaintenanceTask> = tasks.into_iter().map(Into::into).collect();
                let now = now.unwrap_or_else(Utc::now).timestamp_millis();
                let due = advisor::upcoming_maintenance(&tasks, now, days)?;
                Ok(Value::Array(due.iter().map(task_view).collect()))
            }
            Command::OverdueMaintenance { tasks, now } => {
                let tasks: Vec<MaintenanceTask> = tasks.into_iter().map(Into::into).collect();
                let now = now.unwrap_or_else(Utc::now).timestamp_millis();
                let overdue = advisor::overdue_maintenance(&tasks, now);
                Ok(Value::Array(overdue.iter().map(task_view).collect()))
            }
            Command::FuelSummary { entries } => {
                let entries: Vec<FuelLogEntry> = entries.into_iter().map(Into::into).collect();
                let summary = advisor::monthly_fuel_summary(&entries)?;
                Ok(serde_json::to_value(summary)?)
            }
        }
    }

    async fn unavailable(
        &self,
        vehicle: Ulid,
        start: Ms,
        end: Ms,
        conflicts: Vec<Reservation>,
    ) -> CommandError {
        let suggestion = self
            .engine
            .suggest_slot(vehicle, start, start.saturating_add(SUGGESTION_HORIZON_MS), end - start)
            .await;
        let suggestion = match suggestion {
            Ok(slot) => slot,
            Err(e) => {
                tracing::debug!("no suggestion for {vehicle}: {e}");
                None
            }
        };
        CommandError::Unavailable {
            conflicts,
            suggestion,
        }
    }
}

fn error_response(e: &CommandError) -> Value {
    let mut body = json!({
        "ok": false,
        "error": e.kind(),
        "message": e.to_string(),
    });
    match e {
        CommandError::Engine(EngineError::ResourceUnavailable(conflicts)) => {
            body["conflicts"] = Value::Array(conflicts.iter().map(reservation_view).collect());
        }
        CommandError::Unavailable {
            conflicts,
            suggestion,
        } => {
            body["conflicts"] = Value::Array(conflicts.iter().map(reservation_view).collect());
            body["suggestion"] = suggestion.as_ref().map_or(Value::Null, span_view);
        }
        _ => {}
    }
    body
}

/// RFC 3339 in UTC with millisecond precision; raw milliseconds if the
/// value is outside chrono's range.
pub fn iso(ms: Ms) -> Value {
    match DateTime::<Utc>::from_timestamp_millis(ms) {
        Some(t) => Value::String(t.to_rfc3339_opts(SecondsFormat::Millis, true)),
        None => Value::from(ms),
    }
}

fn span_view(span: &Span) -> Value {
    json!({ "start": iso(span.start), "end": iso(span.end) })
}

pub fn reservation_view(r: &Reservation) -> Value {
    json!({
        "id": r.id.to_string(),
        "vehicle": r.resource_id.to_string(),
        "start": iso(r.span.start),
        "end": iso(r.span.end),
        "holder": r.holder,
        "purpose": r.purpose,
        "status": r.status.as_str(),
    })
}

fn task_view(t: &MaintenanceTask) -> Value {
    json!({
        "id": t.id.to_string(),
        "vehicle": t.resource_id.to_string(),
        "schedule_date": iso(t.schedule_date),
        "status": t.status,
        "completed_at": t.completed_at.map(iso),
        "cost": t.cost,
        "description": t.description,
    })
}
