pub mod api;
pub mod record;

use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumIter, EnumString};

pub use record::{FieldChain, Record, RecordError};

/// Topic the sensor node publishes its readings on.
pub const DEFAULT_TOPIC: &str = "esp32/data";

/// Path prefix every gateway endpoint is mounted under.
pub const API_PREFIX: &str = "/api";

/// Device name assumed when an ingested payload does not carry one.
pub const DEFAULT_DEVICE_ID: &str = "ESP32";

/// One monitored compartment of the cold store.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    EnumIter,
    AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum SensorGroup {
    Milk,
    Vegetables,
    Single,
}

impl SensorGroup {
    /// Key of the nested object carrying this group's values in a dual-sensor payload.
    pub fn payload_key(&self) -> Option<&'static str> {
        match self {
            Self::Milk => Some("milk"),
            Self::Vegetables => Some("vegetables"),
            Self::Single => None,
        }
    }

    /// Human readable storage unit name, as stored alongside raw rows.
    pub fn unit_name(&self) -> &'static str {
        match self {
            Self::Milk => "Milk",
            Self::Vegetables => "Vegetables",
            Self::Single => "Single",
        }
    }

    /// Candidate names of group-prefixed temperature fields, most specific first.
    pub fn temperature_fields(&self) -> FieldChain {
        match self {
            Self::Milk => FieldChain::new(&["milk_temperature", "milk_temp"]),
            Self::Vegetables => FieldChain::new(&["veg_temperature", "veg_temp"]),
            Self::Single => FieldChain::new(&[]),
        }
    }

    /// Candidate names of group-prefixed humidity fields, most specific first.
    pub fn humidity_fields(&self) -> FieldChain {
        match self {
            Self::Milk => FieldChain::new(&["milk_humidity", "milk_hum"]),
            Self::Vegetables => FieldChain::new(&["veg_humidity", "veg_hum"]),
            Self::Single => FieldChain::new(&[]),
        }
    }
}

/// How the sensor node reports: one probe, or a milk and a vegetables probe.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum Layout {
    Single,
    #[default]
    Dual,
}

impl Layout {
    /// Groups a payload in this layout can carry, in evaluation order.
    pub fn groups(&self) -> &'static [SensorGroup] {
        match self {
            Self::Single => &[SensorGroup::Single],
            Self::Dual => &[SensorGroup::Milk, SensorGroup::Vegetables],
        }
    }

    /// Picks the layout from the shape of an ingested payload.
    pub fn detect(payload: &Record) -> Self {
        if payload.contains("milk") || payload.contains("vegetables") {
            Self::Dual
        } else {
            Self::Single
        }
    }
}
