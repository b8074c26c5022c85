/// Entry and exit domain events
///
/// Events travel over the broker as UTF-8 JSON with their field names kept
/// as-is. Timestamps are RFC 3339 in UTC.
///
/// # Wire Format
///
/// ```text
/// entry: {"id":"<uuid>","vehicle_plate":"KA01AB1234","entry_date_time":"2025-01-04T12:00:00Z"}
/// exit:  {"id":"<uuid>","vehicle_plate":"KA01AB1234","exit_date_time":"2025-01-04T14:30:00Z"}
/// ```
///
/// # Example
///
/// ```no_run
/// use parkline_shared::events::{decode, encode, EntryEvent};
/// use chrono::Utc;
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let event = EntryEvent::new("KA01AB1234", Utc::now());
/// let body = encode(&event)?;
///
/// let decoded: EntryEvent = decode(&body)?;
/// assert_eq!(decoded, event);
/// # Ok(())
/// # }
/// ```

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Event codec errors
#[derive(Error, Debug)]
pub enum EventCodecError {
    /// Body is not valid JSON for the expected event
    #[error("Invalid event payload: {0}")]
    InvalidPayload(#[from] serde_json::Error),
}

/// A vehicle entered
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryEvent {
    /// Unique event id
    pub id: String,

    /// Plate of the vehicle
    pub vehicle_plate: String,

    /// When the vehicle entered
    pub entry_date_time: DateTime<Utc>,
}

impl EntryEvent {
    /// Creates an entry event with a fresh id
    pub fn new(vehicle_plate: impl Into<String>, entry_date_time: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            vehicle_plate: vehicle_plate.into(),
            entry_date_time,
        }
    }
}

/// A vehicle exited
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExitEvent {
    /// Unique event id
    pub id: String,

    /// Plate of the vehicle
    pub vehicle_plate: String,

    /// When the vehicle exited
    pub exit_date_time: DateTime<Utc>,
}

impl ExitEvent {
    /// Creates an exit event with a fresh id
    pub fn new(vehicle_plate: impl Into<String>, exit_date_time: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            vehicle_plate: vehicle_plate.into(),
            exit_date_time,
        }
    }
}

/// Either kind of event
///
/// Untagged: the variant is recognised by its timestamp field name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DomainEvent {
    /// Vehicle entered
    Entry(EntryEvent),

    /// Vehicle exited
    Exit(ExitEvent),
}

impl DomainEvent {
    /// Event id
    pub fn id(&self) -> &str {
        match self {
            DomainEvent::Entry(e) => &e.id,
            DomainEvent::Exit(e) => &e.id,
        }
    }

    /// Plate the event is about
    pub fn vehicle_plate(&self) -> &str {
        match self {
            DomainEvent::Entry(e) => &e.vehicle_plate,
            DomainEvent::Exit(e) => &e.vehicle_plate,
        }
    }

    /// When the transition happened
    pub fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            DomainEvent::Entry(e) => e.entry_date_time,
            DomainEvent::Exit(e) => e.exit_date_time,
        }
    }
}

impl From<EntryEvent> for DomainEvent {
    fn from(event: EntryEvent) -> Self {
        DomainEvent::Entry(event)
    }
}

impl From<ExitEvent> for DomainEvent {
    fn from(event: ExitEvent) -> Self {
        DomainEvent::Exit(event)
    }
}

/// Serializes an event to its JSON body
pub fn encode<T: Serialize + ?Sized>(event: &T) -> Result<Vec<u8>, EventCodecError> {
    Ok(serde_json::to_vec(event)?)
}

/// Parses a JSON body into an event
pub fn decode<T: DeserializeOwned>(body: &[u8]) -> Result<T, EventCodecError> {
    Ok(serde_json::from_slice(body)?)
}
