//! Text-to-value coercion per declared field type.

use chrono::{DateTime, FixedOffset, Local, NaiveDate, NaiveDateTime, TimeZone};
use chrono_tz::Tz;

use crate::domain::form::{DATE_FORMAT, FieldType, FieldValue};

/// Accepted `date-time` input format (HTML `datetime-local`).
pub const DATE_TIME_FORMAT: &str = "%Y-%m-%dT%H:%M";

/// Time zone used to interpret `date-time` input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientTimezone {
    /// IANA zone reported by the client.
    Named(Tz),
    /// The server's local zone.
    ServerLocal,
}

impl ClientTimezone {
    /// Parse an IANA zone name such as `Europe/Berlin`.
    pub fn parse(name: &str) -> Option<Self> {
        name.trim().parse::<Tz>().ok().map(Self::Named)
    }

    /// IANA name, `None` for the server zone.
    pub fn name(&self) -> Option<&'static str> {
        match self {
            Self::Named(tz) => Some(tz.name()),
            Self::ServerLocal => None,
        }
    }

    /// Attach this zone to a wall-clock time.
    ///
    /// Ambiguous times resolve to the earlier instant. Times skipped by a
    /// daylight-saving transition do not exist and yield `None`.
    pub fn localize(&self, naive: NaiveDateTime) -> Option<DateTime<FixedOffset>> {
        match self {
            Self::Named(tz) => tz
                .from_local_datetime(&naive)
                .earliest()
                .map(|value| value.fixed_offset()),
            Self::ServerLocal => Local
                .from_local_datetime(&naive)
                .earliest()
                .map(|value| value.fixed_offset()),
        }
    }
}

/// Coerce `raw` (already trimmed and non-empty) into `kind`.
///
/// The error string describes why parsing failed.
pub(super) fn coerce(
    kind: FieldType,
    raw: &str,
    timezone: ClientTimezone,
) -> Result<FieldValue, String> {
    match kind {
        FieldType::String => Ok(FieldValue::String(raw.to_owned())),
        FieldType::Integer => raw
            .parse::<i64>()
            .map(FieldValue::Integer)
            .map_err(|error| error.to_string()),
        FieldType::Float => raw
            .parse::<f64>()
            .map(FieldValue::Float)
            .map_err(|error| error.to_string()),
        FieldType::Boolean => parse_bool(raw)
            .map(FieldValue::Boolean)
            .ok_or_else(|| "expected one of 1, t, true, 0, f, false".to_owned()),
        FieldType::Date => NaiveDate::parse_from_str(raw, DATE_FORMAT)
            .map(FieldValue::Date)
            .map_err(|error| error.to_string()),
        FieldType::DateTime => {
            let naive = NaiveDateTime::parse_from_str(raw, DATE_TIME_FORMAT)
                .map_err(|error| error.to_string())?;
            timezone
                .localize(naive)
                .map(FieldValue::DateTime)
                .ok_or_else(|| "local time does not exist in the client time zone".to_owned())
        }
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw {
        "1" | "t" | "T" | "true" | "TRUE" | "True" => Some(true),
        "0" | "f" | "F" | "false" | "FALSE" | "False" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Timelike;
    use rstest::rstest;

    #[rstest]
    #[case("1", true)]
    #[case("t", true)]
    #[case("True", true)]
    #[case("TRUE", true)]
    #[case("0", false)]
    #[case("F", false)]
    #[case("false", false)]
    fn accepts_boolean_spellings(#[case] raw: &str, #[case] expected: bool) {
        assert_eq!(
            coerce(FieldType::Boolean, raw, ClientTimezone::ServerLocal),
            Ok(FieldValue::Boolean(expected))
        );
    }

    #[rstest]
    #[case(FieldType::Boolean, "yes")]
    #[case(FieldType::Integer, "12.5")]
    #[case(FieldType::Integer, "abc")]
    #[case(FieldType::Float, "one")]
    #[case(FieldType::Date, "2024-13-01")]
    #[case(FieldType::Date, "01/02/2024")]
    #[case(FieldType::DateTime, "2024-01-01 10:00")]
    fn rejects_malformed_input(#[case] kind: FieldType, #[case] raw: &str) {
        assert!(coerce(kind, raw, ClientTimezone::ServerLocal).is_err());
    }

    #[test]
    fn integer_accepts_sign() {
        assert_eq!(
            coerce(FieldType::Integer, "-42", ClientTimezone::ServerLocal),
            Ok(FieldValue::Integer(-42))
        );
    }

    #[test]
    fn date_time_uses_client_zone() {
        let zone = ClientTimezone::parse("Asia/Tokyo").expect("known zone");
        let Ok(FieldValue::DateTime(value)) = coerce(FieldType::DateTime, "2024-06-01T09:30", zone)
        else {
            panic!("expected a date-time");
        };
        assert_eq!(value.offset().local_minus_utc(), 9 * 3600);
        assert_eq!(value.hour(), 9);
        assert_eq!(value.minute(), 30);
    }

    #[test]
    fn skipped_local_time_is_rejected() {
        let zone = ClientTimezone::parse("Europe/Berlin").expect("known zone");
        assert!(coerce(FieldType::DateTime, "2024-03-31T02:30", zone).is_err());
    }

    #[rstest]
    #[case("Europe/Berlin", Some("Europe/Berlin"))]
    #[case(" UTC ", Some("UTC"))]
    #[case("Mars/Olympus", None)]
    #[case("", None)]
    fn parses_zone_names(#[case] raw: &str, #[case] expected: Option<&str>) {
        assert_eq!(
            ClientTimezone::parse(raw).and_then(|zone| zone.name()),
            expected
        );
    }
}
