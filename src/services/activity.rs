use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use serde_json::{json, Map, Value};
use tokio::{
    sync::{mpsc, oneshot},
    task::JoinHandle,
};
use tracing::{debug, error, warn};

use crate::{
    config::ActivityConfig,
    error::AppError,
    models::{
        activity::{ActivityAction, ActivityLogEntry},
        event::{Event, EventDetails, EventKind},
        user::UserSnapshot,
    },
    services::reconcile::EventDiff,
};

/// Durable destination for activity entries.
#[async_trait]
pub trait ActivitySink: Send + Sync {
    async fn record(&self, entry: &ActivityLogEntry) -> Result<(), AppError>;
}

enum Message {
    Record(ActivityLogEntry),
    Flush(oneshot::Sender<()>),
}

/// Handle to the background activity writer. Cloning is cheap.
#[derive(Clone)]
pub struct ActivityLogger {
    tx: mpsc::Sender<Message>,
}

impl ActivityLogger {
    pub fn spawn(sink: Arc<dyn ActivitySink>, config: &ActivityConfig) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(config.queue_capacity);
        let handle = tokio::spawn(run_worker(sink, rx, config.clone()));
        (Self { tx }, handle)
    }

    /// Queues an entry without waiting. A full or closed queue drops it.
    pub fn log(&self, entry: ActivityLogEntry) {
        if let Err(err) = self.tx.try_send(Message::Record(entry)) {
            let entry = match err {
                mpsc::error::TrySendError::Full(Message::Record(e))
                | mpsc::error::TrySendError::Closed(Message::Record(e)) => e,
                _ => return,
            };
            warn!(
                trip_id = %entry.trip_id,
                action = %entry.action,
                "activity queue unavailable, dropping entry"
            );
        }
    }

    /// Resolves once every entry queued before the call has been handled.
    pub async fn flush(&self) {
        let (ack, done) = oneshot::channel();
        if self.tx.send(Message::Flush(ack)).await.is_ok() {
            let _ = done.await;
        }
    }
}

async fn run_worker(
    sink: Arc<dyn ActivitySink>,
    mut rx: mpsc::Receiver<Message>,
    config: ActivityConfig,
) {
    debug!("activity worker started");
    while let Some(message) = rx.recv().await {
        match message {
            Message::Record(entry) => {
                if let Err(err) = record_with_retry(sink.as_ref(), &entry, &config).await {
                    error!(
                        trip_id = %entry.trip_id,
                        action = %entry.action,
                        "activity entry lost after {} retries: {err}",
                        config.max_retries
                    );
                }
            }
            Message::Flush(ack) => {
                let _ = ack.send(());
            }
        }
    }
    debug!("activity worker stopped (channel closed)");
}

async fn record_with_retry(
    sink: &dyn ActivitySink,
    entry: &ActivityLogEntry,
    config: &ActivityConfig,
) -> Result<(), AppError> {
    let mut attempt = 0;
    loop {
        match sink.record(entry).await {
            Ok(()) => return Ok(()),
            Err(err) if attempt >= config.max_retries => return Err(err),
            Err(err) => {
                let delay = backoff(config.retry_base, attempt);
                attempt += 1;
                warn!(
                    "activity write failed ({err}), retry {attempt}/{} in {delay:?}",
                    config.max_retries
                );
                tokio::time::sleep(delay).await;
            }
        }
    }
}

fn backoff(base: Duration, attempt: u32) -> Duration {
    base.saturating_mul(2u32.saturating_pow(attempt))
        .min(Duration::from_secs(30))
}

/// Short human-readable name for an event.
pub fn event_label(event: &Event) -> String {
    fn present(value: &Option<String>) -> Option<&str> {
        value.as_deref().map(str::trim).filter(|v| !v.is_empty())
    }
    fn route(kind: &str, from: &Option<String>, to: &Option<String>) -> Option<String> {
        match (present(from), present(to)) {
            (Some(from), Some(to)) => Some(format!("{kind} from {from} to {to}")),
            (Some(from), None) => Some(format!("{kind} from {from}")),
            (None, Some(to)) => Some(format!("{kind} to {to}")),
            (None, None) => None,
        }
    }
    fn joined(parts: &[&Option<String>]) -> Option<String> {
        let words: Vec<&str> = parts.iter().filter_map(|p| present(*p)).collect();
        (!words.is_empty()).then(|| words.join(" "))
    }

    let label = match &event.details {
        EventDetails::Arrival(d) => present(&d.airport).map(|a| format!("Arrival at {a}")),
        EventDetails::Departure(d) => present(&d.airport).map(|a| format!("Departure from {a}")),
        EventDetails::Flight(d) => route("Flight", &d.departure_airport, &d.arrival_airport)
            .or_else(|| joined(&[&d.airline, &d.flight_number]).map(|f| format!("Flight {f}"))),
        EventDetails::Train(d) => route("Train", &d.departure_station, &d.arrival_station)
            .or_else(|| joined(&[&d.train_operator, &d.train_number]).map(|t| format!("Train {t}"))),
        EventDetails::Bus(d) => route("Bus", &d.departure_station, &d.arrival_station)
            .or_else(|| joined(&[&d.bus_operator, &d.bus_number]).map(|b| format!("Bus {b}"))),
        EventDetails::RentalCar(d) => present(&d.company).map(|c| format!("Rental car from {c}")),
        EventDetails::Stay(d) => present(&d.accommodation_name).map(|n| format!("Stay at {n}")),
        EventDetails::Activity(d) => present(&d.title).map(str::to_string),
        EventDetails::Destination(d) => present(&d.place_name).map(str::to_string),
    };

    label.unwrap_or_else(|| {
        match event.kind() {
            EventKind::Arrival => "Arrival",
            EventKind::Departure => "Departure",
            EventKind::Flight => "Flight",
            EventKind::Train => "Train",
            EventKind::Bus => "Bus",
            EventKind::RentalCar => "Rental car",
            EventKind::Stay => "Stay",
            EventKind::Activity => "Activity",
            EventKind::Destination => "Destination",
        }
        .to_string()
    })
}

/// Builds the audit entry describing one reconciled change.
pub fn diff_entry(diff: &EventDiff, actor: &UserSnapshot, trip_id: &str) -> ActivityLogEntry {
    let (action, description, details) = match diff {
        EventDiff::Created(event) => {
            let label = event_label(event);
            (
                ActivityAction::EventCreate,
                format!("{} added {label}", actor.name),
                json!({
                    "eventType": event.kind().as_str(),
                    "name": label,
                    "date": event.date,
                    "status": event.status,
                }),
            )
        }
        EventDiff::Updated { after, changes, .. } => {
            let label = event_label(after);
            let fields: Vec<&str> = changes.iter().map(|c| c.field).collect();
            let mut changed = Map::new();
            for change in changes {
                changed.insert(
                    change.field.to_string(),
                    json!({ "old": change.old, "new": change.new }),
                );
            }
            (
                ActivityAction::EventUpdate,
                format!("{} updated {label} ({})", actor.name, fields.join(", ")),
                json!({
                    "eventType": after.kind().as_str(),
                    "name": label,
                    "changedFields": fields,
                    "changes": Value::Object(changed),
                }),
            )
        }
        EventDiff::Deleted(event) => {
            let label = event_label(event);
            (
                ActivityAction::EventDelete,
                format!("{} removed {label}", actor.name),
                json!({ "name": label, "date": event.date }),
            )
        }
    };

    ActivityLogEntry::new(&actor.id, trip_id, action, description)
        .with_event(diff.event_id())
        .with_details(details)
}
