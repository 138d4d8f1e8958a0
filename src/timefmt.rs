//! The fixed wire format for persisted timestamps.
//!
//! Both the compiled timeline and the progress ledger record instants as
//! `"01 Jan 2000 06:00:00 UTC"`. Every persisted timestamp is UTC, so the
//! zone suffix is a literal rather than a formatted field.

use jiff::Timestamp;
use jiff::civil::DateTime;
use jiff::tz::TimeZone;
use serde::{Deserialize, Deserializer, Serializer, de};

/// strftime pattern for persisted timestamps.
pub const FORMAT: &str = "%d %b %Y %H:%M:%S UTC";

/// Format a timestamp in the persisted wire format.
pub fn format(ts: Timestamp) -> String {
    ts.to_zoned(TimeZone::UTC).strftime(FORMAT).to_string()
}

/// Parse a timestamp from the persisted wire format.
pub fn parse(s: &str) -> Result<Timestamp, jiff::Error> {
    Ok(DateTime::strptime(FORMAT, s)?
        .to_zoned(TimeZone::UTC)?
        .timestamp())
}

pub fn serialize<S: Serializer>(ts: &Timestamp, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&format(*ts))
}

pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Timestamp, D::Error> {
    let s = String::deserialize(deserializer)?;
    parse(&s).map_err(de::Error::custom)
}

#[cfg(test)]
mod tests {
    use super::*;

    use jiff::civil::date;

    #[test]
    fn format_matches_wire_shape() {
        let ts = date(2000, 1, 1)
            .at(6, 0, 0, 0)
            .to_zoned(TimeZone::UTC)
            .unwrap()
            .timestamp();
        assert_eq!(format(ts), "01 Jan 2000 06:00:00 UTC");
    }

    #[test]
    fn parse_round_trips() {
        let s = "23 Feb 2011 18:30:05 UTC";
        let ts = parse(s).unwrap();
        assert_eq!(format(ts), s);
    }

    #[test]
    fn parse_rejects_garbage() {
        assert!(parse("not a timestamp").is_err());
    }
}
