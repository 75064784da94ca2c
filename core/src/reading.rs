use chrono::{DateTime, Utc};
use cold_storage_protocol::{record::parse_number, FieldChain, Layout, Record, SensorGroup};
use serde::{Deserialize, Serialize};
use strum::Display;

/// Transport a reading arrived over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    #[strum(to_string = "LIVE")]
    Live,
    #[strum(to_string = "POLLED")]
    Polled,
}

/// One sensor group's validated measurement at one point in time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalReading {
    pub group: SensorGroup,
    pub temperature: f64,
    pub humidity: f64,
    pub source: Source,
    pub observed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Normalized {
    /// At most one reading per group, in the layout's group order.
    pub readings: Vec<CanonicalReading>,

    /// Groups the payload could not provide a complete reading for.
    pub dropped: Vec<SensorGroup>,
}

/// Turns a raw payload into canonical readings.
///
/// Each group of `layout` is resolved independently: temperature and humidity must both resolve
/// to finite numbers or the group is dropped, without affecting the other groups.
pub fn normalize(
    payload: &Record,
    layout: Layout,
    source: Source,
    observed_at: DateTime<Utc>,
) -> Normalized {
    let mut normalized = Normalized::default();

    for group in layout.groups() {
        match resolve_group(payload, *group) {
            Some((temperature, humidity)) => normalized.readings.push(CanonicalReading {
                group: *group,
                temperature,
                humidity,
                source,
                observed_at,
            }),
            None => normalized.dropped.push(*group),
        }
    }

    normalized
}

/// Resolves one group's temperature and humidity from a payload.
///
/// In a dual-sensor payload the group's nested object is searched first (explicit then
/// aggregate field names), followed by group-prefixed fields at the top level. When the group
/// has no nested object the top level stands in for it.
pub fn resolve_group(payload: &Record, group: SensorGroup) -> Option<(f64, f64)> {
    let nested = group.payload_key().and_then(|key| payload.nested(key));
    let scope = nested.as_ref().unwrap_or(payload);

    let temperature = resolve_first(&[
        (scope, FieldChain::TEMPERATURE),
        (payload, group.temperature_fields()),
    ])?;
    let humidity = resolve_first(&[
        (scope, FieldChain::HUMIDITY),
        (payload, group.humidity_fields()),
    ])?;

    Some((temperature, humidity))
}

/// Resolves one group from its own fields only.
///
/// A group with a nested payload key never borrows the generic top-level fields: without its
/// nested object only the group-prefixed fields count. Used where a reading is stored under the
/// group's name.
pub fn resolve_group_exact(payload: &Record, group: SensorGroup) -> Option<(f64, f64)> {
    match group.payload_key() {
        Some(key) if payload.nested(key).is_none() => Some((
            resolve_first(&[(payload, group.temperature_fields())])?,
            resolve_first(&[(payload, group.humidity_fields())])?,
        )),
        _ => resolve_group(payload, group),
    }
}

/// Walks a list of (record, chain) candidates, the first present field decides the value.
pub(crate) fn resolve_first(candidates: &[(&Record, FieldChain)]) -> Option<f64> {
    candidates
        .iter()
        .find_map(|(record, chain)| record.first_present(chain))
        .and_then(|(_, value)| parse_number(value))
}
