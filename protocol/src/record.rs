use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Ordered list of field names that may carry one logical quantity.
///
/// The first candidate that is present and not `null` decides the value, later candidates are
/// only consulted when earlier ones are absent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldChain(&'static [&'static str]);

impl FieldChain {
    pub const TEMPERATURE: Self = Self(&["temperature", "avg_temp"]);
    pub const HUMIDITY: Self = Self(&["humidity", "avg_humidity"]);

    pub const fn new(fields: &'static [&'static str]) -> Self {
        Self(fields)
    }

    pub fn fields(&self) -> &'static [&'static str] {
        self.0
    }
}

#[derive(thiserror::Error, Debug)]
pub enum RecordError {
    #[error("payload is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("payload is not a JSON object")]
    NotAnObject,
}

/// A loosely shaped JSON object, as received from a sensor node or returned by a query endpoint.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record(Map<String, Value>);

impl Record {
    pub fn from_json(s: &str) -> Result<Self, RecordError> {
        Self::try_from(serde_json::from_str::<Value>(s)?)
    }

    pub fn from_slice(bytes: &[u8]) -> Result<Self, RecordError> {
        Self::try_from(serde_json::from_slice::<Value>(bytes)?)
    }

    /// Returns a field, treating `null` and blank strings the same as a missing field.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key).filter(|v| match v {
            Value::Null => false,
            Value::String(s) => !s.trim().is_empty(),
            _ => true,
        })
    }

    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Returns the nested object under `key`, if there is one.
    pub fn nested(&self, key: &str) -> Option<Record> {
        match self.get(key) {
            Some(Value::Object(map)) => Some(Record(map.clone())),
            _ => None,
        }
    }

    /// The first candidate of `chain` present in this record.
    pub fn first_present(&self, chain: &FieldChain) -> Option<(&'static str, &Value)> {
        chain
            .fields()
            .iter()
            .find_map(|name| self.get(name).map(|v| (*name, v)))
    }

    /// Resolves `chain` to a finite number.
    ///
    /// Returns `None` when no candidate is present, or when the deciding candidate does not hold
    /// a number (or a string that parses as one).
    pub fn number(&self, chain: &FieldChain) -> Option<f64> {
        self.first_present(chain).and_then(|(_, v)| parse_number(v))
    }

    /// A field rendered as text, numbers included.
    pub fn text(&self, key: &str) -> Option<String> {
        match self.get(key)? {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl TryFrom<Value> for Record {
    type Error = RecordError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::Object(map) => Ok(Self(map)),
            _ => Err(RecordError::NotAnObject),
        }
    }
}

impl From<Record> for Value {
    fn from(record: Record) -> Self {
        Value::Object(record.0)
    }
}

/// Reads a JSON number, or a string holding one, rejecting non-finite values.
pub fn parse_number(value: &Value) -> Option<f64> {
    let n = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };

    n.is_finite().then_some(n)
}

#[cfg(test)]
mod test {
    use super::*;
    use serde_json::json;

    fn record(value: Value) -> Record {
        Record::try_from(value).unwrap()
    }

    #[test]
    fn numbers_and_numeric_strings() {
        let r = record(json!({"temperature": 4.5, "humidity": " 81 "}));
        assert_eq!(r.number(&FieldChain::TEMPERATURE), Some(4.5));
        assert_eq!(r.number(&FieldChain::HUMIDITY), Some(81.0));
    }

    #[test]
    fn falls_back_to_later_candidates() {
        let r = record(json!({"temperature": null, "avg_temp": "3.25"}));
        assert_eq!(r.number(&FieldChain::TEMPERATURE), Some(3.25));
    }

    #[test]
    fn blank_string_falls_through() {
        let r = record(json!({
            "temperature": "", "avg_temp": 5,
            "humidity": "  ", "avg_humidity": "70"
        }));
        assert_eq!(r.number(&FieldChain::TEMPERATURE), Some(5.0));
        assert_eq!(r.number(&FieldChain::HUMIDITY), Some(70.0));
        assert!(!r.contains("temperature"));
        assert_eq!(r.text("temperature"), None);
    }

    #[test]
    fn zero_is_a_value() {
        let r = record(json!({"temperature": 0, "avg_temp": 12}));
        assert_eq!(r.number(&FieldChain::TEMPERATURE), Some(0.0));
    }

    #[test]
    fn present_but_garbage_does_not_fall_through() {
        let r = record(json!({"temperature": "warm", "avg_temp": 12}));
        assert_eq!(r.number(&FieldChain::TEMPERATURE), None);
    }

    #[test]
    fn non_finite_rejected() {
        let r = record(json!({"temperature": "NaN", "humidity": "inf"}));
        assert_eq!(r.number(&FieldChain::TEMPERATURE), None);
        assert_eq!(r.number(&FieldChain::HUMIDITY), None);
    }

    #[test]
    fn nested_objects() {
        let r = record(json!({"milk": {"temperature": 2}, "vegetables": null}));
        assert_eq!(
            r.nested("milk").unwrap().number(&FieldChain::TEMPERATURE),
            Some(2.0)
        );
        assert!(r.nested("vegetables").is_none());
        assert!(!r.contains("vegetables"));
    }

    #[test]
    fn only_objects_are_records() {
        assert!(matches!(
            Record::from_json("[1, 2]"),
            Err(RecordError::NotAnObject)
        ));
        assert!(matches!(
            Record::from_json("{nope"),
            Err(RecordError::Json(_))
        ));
    }
}
