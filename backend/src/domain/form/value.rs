//! Typed submission values.

use std::collections::BTreeMap;

use chrono::{DateTime, FixedOffset, NaiveDate};
use serde::ser::{Serialize, SerializeSeq, Serializer};

/// Parsed field values keyed by field name.
pub type FieldMap = BTreeMap<String, FieldValue>;

/// Date format accepted by `date` fields and used when serialising them.
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// One coerced field value.
///
/// Serialises untagged: strings, numbers, and booleans map to their JSON
/// counterparts, dates become `YYYY-MM-DD`, date-times RFC 3339 strings with
/// the client offset, and arrays JSON arrays.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    /// Free text.
    String(String),
    /// Signed 64-bit integer.
    Integer(i64),
    /// Double precision float.
    Float(f64),
    /// Boolean flag.
    Boolean(bool),
    /// Calendar date without time zone.
    Date(NaiveDate),
    /// Instant resolved in the submitter's time zone.
    DateTime(DateTime<FixedOffset>),
    /// Values of a `multiple` field, in submission order.
    Array(Vec<FieldValue>),
}

impl Serialize for FieldValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::String(value) => serializer.serialize_str(value),
            Self::Integer(value) => serializer.serialize_i64(*value),
            Self::Float(value) => serializer.serialize_f64(*value),
            Self::Boolean(value) => serializer.serialize_bool(*value),
            Self::Date(value) => serializer.collect_str(&value.format(DATE_FORMAT)),
            Self::DateTime(value) => serializer.serialize_str(&value.to_rfc3339()),
            Self::Array(values) => {
                let mut seq = serializer.serialize_seq(Some(values.len()))?;
                for value in values {
                    seq.serialize_element(value)?;
                }
                seq.end()
            }
        }
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_owned())
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        Self::Boolean(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    #[test]
    fn serialises_scalars_untagged() {
        let map = FieldMap::from([
            ("name".to_owned(), FieldValue::from("Ann")),
            ("year".to_owned(), FieldValue::from(2024)),
            ("ratio".to_owned(), FieldValue::Float(0.5)),
            ("agree".to_owned(), FieldValue::from(true)),
        ]);
        let value = serde_json::to_value(&map).expect("serialise");
        assert_eq!(
            value,
            json!({ "name": "Ann", "year": 2024, "ratio": 0.5, "agree": true })
        );
    }

    #[test]
    fn serialises_dates_as_strings() {
        let date = NaiveDate::from_ymd_opt(2024, 2, 29).expect("valid date");
        let offset = FixedOffset::east_opt(3600).expect("valid offset");
        let instant = offset
            .with_ymd_and_hms(2024, 2, 29, 13, 45, 0)
            .single()
            .expect("unambiguous");
        let value = serde_json::to_value(FieldValue::Array(vec![
            FieldValue::Date(date),
            FieldValue::DateTime(instant),
        ]))
        .expect("serialise");
        assert_eq!(value, json!(["2024-02-29", "2024-02-29T13:45:00+01:00"]));
    }
}
