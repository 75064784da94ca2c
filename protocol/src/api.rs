//! Bodies exchanged with the gateway's HTTP endpoints.
//!
//! The gateway produces these typed rows. Clients read responses back as [`crate::Record`]s so
//! that rows from older or newer servers with missing fields still resolve through field chains.

use crate::SensorGroup;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Success,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub status: Status,
    pub message: String,
}

impl ErrorResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            status: Status::Error,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ReceivedValues {
    pub temp: f64,
    pub hum: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DataReceived {
    pub milk: Option<ReceivedValues>,
    pub vegetables: Option<ReceivedValues>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub single: Option<ReceivedValues>,
}

impl DataReceived {
    pub fn set(&mut self, group: SensorGroup, values: ReceivedValues) {
        match group {
            SensorGroup::Milk => self.milk = Some(values),
            SensorGroup::Vegetables => self.vegetables = Some(values),
            SensorGroup::Single => self.single = Some(values),
        }
    }
}

/// Response to `POST /sensor-data`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngestResponse {
    pub status: Status,
    pub data_received: DataReceived,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GroupValues {
    pub temperature: f64,
    pub humidity: f64,
}

/// Element of the `GET /current-status` array.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurrentStatus {
    pub device_id: String,
    pub milk: Option<GroupValues>,
    pub vegetables: Option<GroupValues>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub humidity: Option<f64>,
    pub timestamp: String,
}

/// Element of `GET /raw-data`: one stored reading.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawRow {
    pub unit_type: SensorGroup,
    pub unit_name: String,
    pub temperature: f64,
    pub humidity: f64,
    pub time: Option<String>,
}

/// Element of `GET /history-all`: one group's readings within one hour.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregatedRow {
    pub time: String,
    pub unit_type: SensorGroup,
    pub avg_temp: f64,
    pub max_temp: f64,
    pub min_temp: f64,
    pub avg_humidity: f64,
    pub max_humidity: f64,
    pub min_humidity: f64,
}

/// Element of `GET /history/{hours}`: both groups' hourly averages side by side.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WindowRow {
    pub time: String,
    pub milk_temperature: Option<f64>,
    pub milk_humidity: Option<f64>,
    pub veg_temperature: Option<f64>,
    pub veg_humidity: Option<f64>,
}
