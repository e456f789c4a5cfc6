//! Shipment and checkpoint models

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use validator::Validate;

/// A shipment is stale when its latest checkpoint is at least this old
pub const STALE_AFTER_HOURS: i64 = 24;

/// Text of the checkpoint every shipment starts with
pub const SEED_CHECKPOINT_TEXT: &str = "Label created";

/// Checkpoint status tag
///
/// The wire value, the stored value and the display key are the same string.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum CheckpointStatus {
    Label,
    Pickup,
    Transit,
    Out,
    Done,
}

impl CheckpointStatus {
    pub const ALL: [CheckpointStatus; 5] = [
        CheckpointStatus::Label,
        CheckpointStatus::Pickup,
        CheckpointStatus::Transit,
        CheckpointStatus::Out,
        CheckpointStatus::Done,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CheckpointStatus::Label => "label",
            CheckpointStatus::Pickup => "pickup",
            CheckpointStatus::Transit => "transit",
            CheckpointStatus::Out => "out",
            CheckpointStatus::Done => "done",
        }
    }
}

impl std::fmt::Display for CheckpointStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for CheckpointStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        CheckpointStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| format!("Invalid checkpoint status: {}", s))
    }
}

/// A timestamped status event in a shipment's lifecycle
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Checkpoint {
    pub at: DateTime<Utc>,
    pub text: String,
    pub status: CheckpointStatus,
}

impl Checkpoint {
    pub fn new(at: DateTime<Utc>, text: impl Into<String>, status: CheckpointStatus) -> Self {
        Self {
            at,
            text: text.into(),
            status,
        }
    }

    /// The checkpoint every new shipment is created with
    pub fn seed(at: DateTime<Utc>) -> Self {
        Self::new(at, SEED_CHECKPOINT_TEXT, CheckpointStatus::Label)
    }
}

/// Shipment fields that can be edited after creation
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub enum ShipmentField {
    Sender,
    Receiver,
    Phone,
    Origin,
    Destination,
    Cargo,
    Weight,
    Vehicle,
    Driver,
    Count,
    ShipmentType,
}

impl ShipmentField {
    pub const ALL: [ShipmentField; 11] = [
        ShipmentField::Sender,
        ShipmentField::Receiver,
        ShipmentField::Phone,
        ShipmentField::Origin,
        ShipmentField::Destination,
        ShipmentField::Cargo,
        ShipmentField::Weight,
        ShipmentField::Vehicle,
        ShipmentField::Driver,
        ShipmentField::Count,
        ShipmentField::ShipmentType,
    ];

    /// Name used on the wire and in audit entries
    pub fn as_str(&self) -> &'static str {
        match self {
            ShipmentField::Sender => "sender",
            ShipmentField::Receiver => "receiver",
            ShipmentField::Phone => "phone",
            ShipmentField::Origin => "origin",
            ShipmentField::Destination => "destination",
            ShipmentField::Cargo => "cargo",
            ShipmentField::Weight => "weight",
            ShipmentField::Vehicle => "vehicle",
            ShipmentField::Driver => "driver",
            ShipmentField::Count => "count",
            ShipmentField::ShipmentType => "shipmentType",
        }
    }

    /// Column in the `shipments` table
    pub fn column(&self) -> &'static str {
        match self {
            ShipmentField::ShipmentType => "shipment_type",
            other => other.as_str(),
        }
    }
}

impl std::fmt::Display for ShipmentField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Value of a single editable field
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Text(Option<String>),
    Number(i64),
}

impl FieldValue {
    /// String form used for change detection; a missing value is the empty string
    pub fn stringify(&self) -> String {
        match self {
            FieldValue::Text(value) => value.clone().unwrap_or_default(),
            FieldValue::Number(n) => n.to_string(),
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            FieldValue::Text(Some(value)) => serde_json::Value::String(value.clone()),
            FieldValue::Text(None) => serde_json::Value::Null,
            FieldValue::Number(n) => serde_json::Value::from(*n),
        }
    }
}

/// One field-level difference recorded by an update
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FieldChange {
    pub field: ShipmentField,
    pub before: serde_json::Value,
    pub after: serde_json::Value,
}

/// A tracked logistics unit
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Shipment {
    pub tracking_id: String,
    pub sender: Option<String>,
    pub receiver: Option<String>,
    pub phone: Option<String>,
    pub origin: Option<String>,
    pub destination: Option<String>,
    pub cargo: Option<String>,
    pub weight: Option<String>,
    pub vehicle: Option<String>,
    pub driver: Option<String>,
    pub count: i64,
    pub shipment_type: Option<String>,
    /// Checkpoints in insertion order
    pub checkpoints: Vec<Checkpoint>,
    #[serde(default)]
    pub last_client_ping_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Shipment {
    pub fn field_value(&self, field: ShipmentField) -> FieldValue {
        let text = |value: &Option<String>| FieldValue::Text(value.clone());
        match field {
            ShipmentField::Sender => text(&self.sender),
            ShipmentField::Receiver => text(&self.receiver),
            ShipmentField::Phone => text(&self.phone),
            ShipmentField::Origin => text(&self.origin),
            ShipmentField::Destination => text(&self.destination),
            ShipmentField::Cargo => text(&self.cargo),
            ShipmentField::Weight => text(&self.weight),
            ShipmentField::Vehicle => text(&self.vehicle),
            ShipmentField::Driver => text(&self.driver),
            ShipmentField::Count => FieldValue::Number(self.count),
            ShipmentField::ShipmentType => text(&self.shipment_type),
        }
    }

    /// Checkpoints in display order: timestamp ascending, ties in insertion order
    pub fn sorted_checkpoints(&self) -> Vec<Checkpoint> {
        let mut sorted = self.checkpoints.clone();
        sorted.sort_by_key(|c| c.at);
        sorted
    }

    /// Latest checkpoint by timestamp; on equal timestamps the later insertion wins
    pub fn latest_checkpoint(&self) -> Option<&Checkpoint> {
        self.checkpoints
            .iter()
            .enumerate()
            .max_by_key(|(index, c)| (c.at, *index))
            .map(|(_, c)| c)
    }

    pub fn is_stale_at(&self, now: DateTime<Utc>) -> bool {
        is_stale(self.latest_checkpoint().map(|c| c.at), now)
    }
}

/// Staleness rule shared by the detail and list views
pub fn is_stale(latest_checkpoint_at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
    match latest_checkpoint_at {
        Some(at) => now - at >= Duration::hours(STALE_AFTER_HOURS),
        None => true,
    }
}

/// Detail view returned by lookups
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ShipmentDetail {
    pub tracking_id: String,
    pub sender: Option<String>,
    pub receiver: Option<String>,
    pub phone: Option<String>,
    pub origin: Option<String>,
    pub destination: Option<String>,
    pub cargo: Option<String>,
    pub weight: Option<String>,
    pub vehicle: Option<String>,
    pub driver: Option<String>,
    pub count: i64,
    pub shipment_type: Option<String>,
    pub checkpoints: Vec<Checkpoint>,
    pub last_checkpoint_at: Option<DateTime<Utc>>,
    pub stale: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ShipmentDetail {
    pub fn from_shipment(shipment: Shipment, now: DateTime<Utc>) -> Self {
        let last_checkpoint_at = shipment.latest_checkpoint().map(|c| c.at);
        let checkpoints = shipment.sorted_checkpoints();
        Self {
            stale: is_stale(last_checkpoint_at, now),
            last_checkpoint_at,
            checkpoints,
            tracking_id: shipment.tracking_id,
            sender: shipment.sender,
            receiver: shipment.receiver,
            phone: shipment.phone,
            origin: shipment.origin,
            destination: shipment.destination,
            cargo: shipment.cargo,
            weight: shipment.weight,
            vehicle: shipment.vehicle,
            driver: shipment.driver,
            count: shipment.count,
            shipment_type: shipment.shipment_type,
            created_at: shipment.created_at,
            updated_at: shipment.updated_at,
        }
    }
}

/// Row of the worker dashboard listing
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ShipmentSummary {
    pub tracking_id: String,
    pub origin: Option<String>,
    pub destination: Option<String>,
    pub driver: Option<String>,
    pub vehicle: Option<String>,
    pub updated_at: DateTime<Utc>,
    pub last_status: Option<CheckpointStatus>,
    pub last_status_at: Option<DateTime<Utc>>,
    pub stale: bool,
}

/// Listing and export filter
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ShipmentFilter {
    /// Case-insensitive text matched against id, origin, destination, driver and vehicle
    pub q: Option<String>,
    pub status: Option<CheckpointStatus>,
}

/// Input for creating a shipment
#[derive(Debug, Clone, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ShipmentDraft {
    #[validate(length(max = 200))]
    pub sender: Option<String>,
    #[validate(length(max = 200))]
    pub receiver: Option<String>,
    #[validate(length(max = 50))]
    pub phone: Option<String>,
    #[validate(length(max = 200))]
    pub origin: Option<String>,
    #[validate(length(max = 200))]
    pub destination: Option<String>,
    #[validate(length(max = 1000))]
    pub cargo: Option<String>,
    #[validate(length(max = 50))]
    pub weight: Option<String>,
    #[validate(length(max = 100))]
    pub vehicle: Option<String>,
    #[validate(length(max = 100))]
    pub driver: Option<String>,
    #[serde(default, deserialize_with = "lenient_count")]
    #[validate(range(min = 1))]
    pub count: Option<i64>,
    #[validate(length(max = 50))]
    pub shipment_type: Option<String>,
}

/// Partial update; absent (or null) fields are left untouched
#[derive(Debug, Clone, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ShipmentPatch {
    #[validate(length(max = 200))]
    pub sender: Option<String>,
    #[validate(length(max = 200))]
    pub receiver: Option<String>,
    #[validate(length(max = 50))]
    pub phone: Option<String>,
    #[validate(length(max = 200))]
    pub origin: Option<String>,
    #[validate(length(max = 200))]
    pub destination: Option<String>,
    #[validate(length(max = 1000))]
    pub cargo: Option<String>,
    #[validate(length(max = 50))]
    pub weight: Option<String>,
    #[validate(length(max = 100))]
    pub vehicle: Option<String>,
    #[validate(length(max = 100))]
    pub driver: Option<String>,
    #[serde(default, deserialize_with = "lenient_count")]
    #[validate(range(min = 1))]
    pub count: Option<i64>,
    #[validate(length(max = 50))]
    pub shipment_type: Option<String>,
}

impl ShipmentPatch {
    /// Incoming value for a field, if the request carried one
    pub fn get(&self, field: ShipmentField) -> Option<FieldValue> {
        let text = |value: &Option<String>| value.clone().map(|v| FieldValue::Text(Some(v)));
        match field {
            ShipmentField::Sender => text(&self.sender),
            ShipmentField::Receiver => text(&self.receiver),
            ShipmentField::Phone => text(&self.phone),
            ShipmentField::Origin => text(&self.origin),
            ShipmentField::Destination => text(&self.destination),
            ShipmentField::Cargo => text(&self.cargo),
            ShipmentField::Weight => text(&self.weight),
            ShipmentField::Vehicle => text(&self.vehicle),
            ShipmentField::Driver => text(&self.driver),
            ShipmentField::Count => self.count.map(FieldValue::Number),
            ShipmentField::ShipmentType => text(&self.shipment_type),
        }
    }
}

/// Request body for appending a checkpoint
#[derive(Debug, Clone, Deserialize)]
pub struct NewCheckpoint {
    /// Raw status; validated by the editor so bad or missing values map to a 400
    #[serde(default, alias = "icon")]
    pub status: String,
    #[serde(default, alias = "text")]
    pub note: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub at: Option<DateTime<Utc>>,
}

/// Accepts `3`, `"3"` or null for counts coming from HTML forms
fn lenient_count<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(i64),
        Text(String),
    }

    match Option::<Raw>::deserialize(deserializer)? {
        None => Ok(None),
        Some(Raw::Number(n)) => Ok(Some(n)),
        Some(Raw::Text(s)) if s.trim().is_empty() => Ok(None),
        Some(Raw::Text(s)) => s
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| serde::de::Error::custom(format!("invalid count: {}", s))),
    }
}
