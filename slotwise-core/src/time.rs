//! Time utilities: timezone resolution and local wall-clock arithmetic.

use anyhow::Result;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Timelike, Utc};
use chrono_tz::Tz;

use crate::error::Error;

pub fn parse_timezone(tz: &str) -> Result<Tz, Error> {
    tz.trim()
        .parse()
        .map_err(|_| Error::validation(format!("invalid timezone: {tz}")))
}

/// Parse a local time like "2026-02-20 23:59" in an IANA tz like "America/Chicago",
/// returning UTC.
pub fn parse_local_to_utc(local: &str, tz: Tz) -> Result<DateTime<Utc>> {
    let ndt = NaiveDateTime::parse_from_str(local, "%Y-%m-%d %H:%M")
        .map_err(|e| anyhow::anyhow!("invalid local datetime '{local}': {e}"))?;

    let local_dt = tz
        .from_local_datetime(&ndt)
        .single()
        .ok_or_else(|| anyhow::anyhow!("ambiguous or invalid local time (DST?): {local} {tz}"))?;

    Ok(local_dt.with_timezone(&Utc))
}

/// `hour:minute` on `date` in `tz`. Falls back to reading the wall time as UTC
/// offset-free when it lands in a DST gap.
pub fn local_at(date: NaiveDate, hour: u32, minute: u32, tz: Tz) -> DateTime<Tz> {
    let time = NaiveTime::from_hms_opt(hour, minute, 0).unwrap_or(NaiveTime::MIN);
    let ndt = date.and_time(time);
    tz.from_local_datetime(&ndt)
        .earliest()
        .unwrap_or_else(|| tz.from_utc_datetime(&ndt))
}

/// Round up to the next whole minute.
pub fn ceil_to_minute(dt: DateTime<Tz>) -> DateTime<Tz> {
    if dt.second() == 0 && dt.nanosecond() == 0 {
        return dt;
    }
    let floored = dt - chrono::Duration::seconds(dt.second().into())
        - chrono::Duration::nanoseconds(dt.nanosecond().into());
    floored + chrono::Duration::minutes(1)
}

/// ISO-8601 with the local offset of `tz`.
pub fn to_rfc3339_local(dt: DateTime<Utc>, tz: Tz) -> String {
    dt.with_timezone(&tz).to_rfc3339()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_chicago_local() {
        // Feb is CST (UTC-6)
        let utc = parse_local_to_utc("2026-02-20 23:59", chrono_tz::America::Chicago).unwrap();
        assert_eq!(utc.to_rfc3339(), "2026-02-21T05:59:00+00:00");
    }

    #[test]
    fn rejects_unknown_timezone() {
        assert!(parse_timezone("Mars/Olympus").is_err());
        assert_eq!(parse_timezone("Europe/Berlin").unwrap(), chrono_tz::Europe::Berlin);
    }

    #[test]
    fn ceil_rounds_partial_minutes_up() {
        let tz = chrono_tz::UTC;
        let dt = tz.with_ymd_and_hms(2026, 3, 2, 10, 7, 33).unwrap();
        assert_eq!(ceil_to_minute(dt), tz.with_ymd_and_hms(2026, 3, 2, 10, 8, 0).unwrap());
        let exact = tz.with_ymd_and_hms(2026, 3, 2, 10, 8, 0).unwrap();
        assert_eq!(ceil_to_minute(exact), exact);
    }

    #[test]
    fn local_rfc3339_carries_offset() {
        let utc = Utc.with_ymd_and_hms(2026, 7, 1, 15, 0, 0).unwrap();
        assert_eq!(
            to_rfc3339_local(utc, chrono_tz::America::Chicago),
            "2026-07-01T10:00:00-05:00"
        );
    }
}
