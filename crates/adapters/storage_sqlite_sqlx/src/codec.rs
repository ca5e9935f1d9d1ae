//! Column conversions shared by the repositories.

use std::error::Error as StdError;
use std::str::FromStr;

use cadence_domain::time::{self, Timestamp};

/// Wrap a conversion failure as a row decode error.
pub(crate) fn decode<T, E>(result: Result<T, E>) -> Result<T, sqlx::Error>
where
    E: StdError + Send + Sync + 'static,
{
    result.map_err(|err| sqlx::Error::Decode(Box::new(err)))
}

/// Parse a column through its [`FromStr`] impl (ids, statuses, frequencies).
pub(crate) fn parse<T>(value: &str) -> Result<T, sqlx::Error>
where
    T: FromStr,
    T::Err: StdError + Send + Sync + 'static,
{
    decode(T::from_str(value))
}

pub(crate) fn parse_timestamp(value: &str) -> Result<Timestamp, sqlx::Error> {
    decode(chrono::DateTime::parse_from_rfc3339(value)).map(|dt| dt.to_utc())
}

pub(crate) fn parse_optional_timestamp(value: Option<&str>) -> Result<Option<Timestamp>, sqlx::Error> {
    value.map(parse_timestamp).transpose()
}

pub(crate) fn timestamp(ts: Timestamp) -> String {
    time::to_sortable(ts)
}

pub(crate) fn optional_timestamp(ts: Option<Timestamp>) -> Option<String> {
    ts.map(time::to_sortable)
}

#[cfg(test)]
mod tests {
    use super::*;
    use cadence_domain::id::AutomationId;
    use chrono::{TimeZone, Utc};

    #[test]
    fn should_read_back_stored_timestamp() {
        let ts = Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap();
        assert_eq!(parse_timestamp(&timestamp(ts)).unwrap(), ts);
    }

    #[test]
    fn should_report_decode_error_when_id_is_garbage() {
        let result = parse::<AutomationId>("nope");
        assert!(matches!(result, Err(sqlx::Error::Decode(_))));
    }
}
