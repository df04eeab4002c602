//! Time built-ins: `now`, `hour`, `minute`, `seconds`, `day`, `month`,
//! `year`, `weekday`. Field accessors take epoch seconds and honor the `TZ`
//! environment variable the way the `date` command honors `-u`/local time,
//! without pulling in a full IANA timezone database: `TZ` is read as a
//! fixed UTC offset (`+HH:MM` / `-HH:MM`, or `UTC`); anything else,
//! including unset, falls back to UTC.

use crate::error::RuntimeErrorKind;
use crate::value::Value;
use chrono::{DateTime, Datelike, FixedOffset, TimeZone, Timelike, Utc};

type VResult = Result<Value, RuntimeErrorKind>;

fn tz_offset() -> FixedOffset {
    match std::env::var("TZ") {
        Ok(spec) => parse_offset(&spec).unwrap_or_else(|| FixedOffset::east_opt(0).unwrap()),
        Err(_) => FixedOffset::east_opt(0).unwrap(),
    }
}

fn parse_offset(spec: &str) -> Option<FixedOffset> {
    let spec = spec.trim();
    if spec.eq_ignore_ascii_case("utc") || spec.is_empty() {
        return FixedOffset::east_opt(0);
    }
    let (sign, rest) = match spec.as_bytes().first()? {
        b'+' => (1, &spec[1..]),
        b'-' => (-1, &spec[1..]),
        _ => return None,
    };
    let (h, m) = match rest.split_once(':') {
        Some((h, m)) => (h.parse::<i32>().ok()?, m.parse::<i32>().ok()?),
        None if rest.len() <= 2 => (rest.parse::<i32>().ok()?, 0),
        None => (rest[..2].parse::<i32>().ok()?, rest[2..].parse::<i32>().ok()?),
    };
    FixedOffset::east_opt(sign * (h * 3600 + m * 60))
}

fn to_local(epoch: i64) -> Option<DateTime<FixedOffset>> {
    let utc = Utc.timestamp_opt(epoch, 0).single()?;
    Some(utc.with_timezone(&tz_offset()))
}

pub fn now(args: &[Value]) -> VResult {
    if !args.is_empty() {
        return Ok(Value::Null);
    }
    Ok(Value::Integer(Utc::now().timestamp()))
}

fn field(args: &[Value], f: impl Fn(DateTime<FixedOffset>) -> i64) -> VResult {
    match args {
        [Value::Integer(epoch)] => match to_local(*epoch) {
            Some(dt) => Ok(Value::Integer(f(dt))),
            None => Ok(Value::Null),
        },
        _ => Ok(Value::Null),
    }
}

pub fn hour(args: &[Value]) -> VResult {
    field(args, |dt| dt.hour() as i64)
}

pub fn minute(args: &[Value]) -> VResult {
    field(args, |dt| dt.minute() as i64)
}

pub fn seconds(args: &[Value]) -> VResult {
    field(args, |dt| dt.second() as i64)
}

pub fn day(args: &[Value]) -> VResult {
    field(args, |dt| dt.day() as i64)
}

pub fn month(args: &[Value]) -> VResult {
    field(args, |dt| dt.month() as i64)
}

pub fn year(args: &[Value]) -> VResult {
    field(args, |dt| dt.year() as i64)
}

const WEEKDAYS: [&str; 7] = ["Monday", "Tuesday", "Wednesday", "Thursday", "Friday", "Saturday", "Sunday"];

pub fn weekday(args: &[Value]) -> VResult {
    match args {
        [Value::Integer(epoch)] => match to_local(*epoch) {
            Some(dt) => Ok(Value::string(WEEKDAYS[dt.weekday().num_days_from_monday() as usize])),
            None => Ok(Value::Null),
        },
        _ => Ok(Value::Null),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn field_accessors_read_epoch_utc() {
        // 2021-01-02 03:04:05 UTC, a Saturday.
        let epoch = 1609558845;
        std::env::remove_var("TZ");
        assert_eq!(year(&[Value::Integer(epoch)]), Ok(Value::Integer(2021)));
        assert_eq!(month(&[Value::Integer(epoch)]), Ok(Value::Integer(1)));
        assert_eq!(day(&[Value::Integer(epoch)]), Ok(Value::Integer(2)));
        assert_eq!(hour(&[Value::Integer(epoch)]), Ok(Value::Integer(3)));
        assert_eq!(minute(&[Value::Integer(epoch)]), Ok(Value::Integer(4)));
        assert_eq!(seconds(&[Value::Integer(epoch)]), Ok(Value::Integer(5)));
        assert_eq!(weekday(&[Value::Integer(epoch)]), Ok(Value::string("Saturday")));
    }

    #[test]
    fn tz_offset_applies_fixed_shift() {
        std::env::set_var("TZ", "+05:00");
        // 23:00 UTC on day 1 becomes 04:00 on day 2 at +05:00.
        let epoch = 1609545600 + 23 * 3600;
        assert_eq!(hour(&[Value::Integer(epoch)]), Ok(Value::Integer(4)));
        std::env::remove_var("TZ");
    }

    #[test]
    fn weekday_non_integer_is_null() {
        assert_eq!(weekday(&[Value::string("nope")]), Ok(Value::Null));
    }

    #[test]
    fn now_takes_no_args() {
        assert_eq!(now(&[Value::Integer(1)]), Ok(Value::Null));
        assert!(matches!(now(&[]), Ok(Value::Integer(_))));
    }
}
