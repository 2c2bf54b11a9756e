//! Minimal date wrapper exposed to scripts as `moment`.
//!
//! Months are zero-based for `get`/`set` and `"day"` is the weekday
//! (Sunday = 0), while `"date"` is the day of the month. All instants are UTC.

use chrono::{
    DateTime, Datelike, Months, NaiveDate, NaiveDateTime, SecondsFormat, TimeDelta, TimeZone,
    Timelike, Utc,
};
use rhai::{Dynamic, Engine, EvalAltResult, INT, Position};

type RhaiResult<T> = Result<T, Box<EvalAltResult>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Moment(DateTime<Utc>);

/// The `moment` value scripts receive; a factory for `Moment`s.
#[derive(Debug, Clone, Copy, Default)]
pub struct MomentLib;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Unit {
    Year,
    Month,
    Week,
    Day,
    Date,
    Hour,
    Minute,
    Second,
    Millisecond,
}

impl Unit {
    fn parse(raw: &str) -> RhaiResult<Self> {
        let unit = match raw {
            "year" | "years" | "y" => Unit::Year,
            "month" | "months" | "M" => Unit::Month,
            "week" | "weeks" | "w" => Unit::Week,
            "day" | "days" | "d" => Unit::Day,
            "date" | "D" => Unit::Date,
            "hour" | "hours" | "h" => Unit::Hour,
            "minute" | "minutes" | "m" => Unit::Minute,
            "second" | "seconds" | "s" => Unit::Second,
            "millisecond" | "milliseconds" | "ms" => Unit::Millisecond,
            other => return Err(runtime_error(format!("unknown date unit '{other}'"))),
        };
        Ok(unit)
    }
}

impl Moment {
    pub fn new(at: DateTime<Utc>) -> Self {
        Self(at)
    }

    pub fn now() -> Self {
        Self(Utc::now())
    }

    pub fn datetime(&self) -> DateTime<Utc> {
        self.0
    }

    pub fn to_iso_string(&self) -> String {
        self.0.to_rfc3339_opts(SecondsFormat::Millis, true)
    }

    fn get(&self, unit: Unit) -> INT {
        let at = self.0;
        match unit {
            Unit::Year => INT::from(at.year()),
            Unit::Month => INT::from(at.month0()),
            Unit::Week => INT::from(at.iso_week().week()),
            Unit::Day => INT::from(at.weekday().num_days_from_sunday()),
            Unit::Date => INT::from(at.day()),
            Unit::Hour => INT::from(at.hour()),
            Unit::Minute => INT::from(at.minute()),
            Unit::Second => INT::from(at.second()),
            Unit::Millisecond => INT::from(at.timestamp_subsec_millis()),
        }
    }

    fn set(&self, unit: Unit, value: INT) -> Option<Self> {
        let at = self.0;
        let narrow = u32::try_from(value).ok();
        let next = match unit {
            Unit::Year => at.with_year(i32::try_from(value).ok()?)?,
            Unit::Month => at.with_month0(narrow?)?,
            Unit::Date => at.with_day(narrow?)?,
            Unit::Day => {
                let current = INT::from(at.weekday().num_days_from_sunday());
                at.checked_add_signed(TimeDelta::try_days(value - current)?)?
            }
            Unit::Week => {
                let current = INT::from(at.iso_week().week());
                at.checked_add_signed(TimeDelta::try_weeks(value - current)?)?
            }
            Unit::Hour => at.with_hour(narrow?)?,
            Unit::Minute => at.with_minute(narrow?)?,
            Unit::Second => at.with_second(narrow?)?,
            Unit::Millisecond => at.with_nanosecond(narrow?.checked_mul(1_000_000)?)?,
        };
        Some(Self(next))
    }

    fn add(&self, amount: INT, unit: Unit) -> Option<Self> {
        let at = self.0;
        let next = match unit {
            Unit::Year | Unit::Month => {
                let months = if unit == Unit::Year {
                    amount.checked_mul(12)?
                } else {
                    amount
                };
                let magnitude = Months::new(u32::try_from(months.unsigned_abs()).ok()?);
                if months >= 0 {
                    at.checked_add_months(magnitude)?
                } else {
                    at.checked_sub_months(magnitude)?
                }
            }
            Unit::Week => at.checked_add_signed(TimeDelta::try_weeks(amount)?)?,
            Unit::Day | Unit::Date => at.checked_add_signed(TimeDelta::try_days(amount)?)?,
            Unit::Hour => at.checked_add_signed(TimeDelta::try_hours(amount)?)?,
            Unit::Minute => at.checked_add_signed(TimeDelta::try_minutes(amount)?)?,
            Unit::Second => at.checked_add_signed(TimeDelta::try_seconds(amount)?)?,
            Unit::Millisecond => at.checked_add_signed(TimeDelta::try_milliseconds(amount)?)?,
        };
        Some(Self(next))
    }

    fn start_of(&self, unit: Unit) -> Option<Self> {
        let at = self.0;
        let date = at.date_naive();
        let naive = match unit {
            Unit::Year => NaiveDate::from_ymd_opt(date.year(), 1, 1)?.and_hms_opt(0, 0, 0)?,
            Unit::Month => date.with_day(1)?.and_hms_opt(0, 0, 0)?,
            Unit::Week => {
                let offset = TimeDelta::try_days(i64::from(date.weekday().num_days_from_sunday()))?;
                date.checked_sub_signed(offset)?.and_hms_opt(0, 0, 0)?
            }
            Unit::Day | Unit::Date => date.and_hms_opt(0, 0, 0)?,
            Unit::Hour => date.and_hms_opt(at.hour(), 0, 0)?,
            Unit::Minute => date.and_hms_opt(at.hour(), at.minute(), 0)?,
            Unit::Second => date.and_hms_opt(at.hour(), at.minute(), at.second())?,
            Unit::Millisecond => return Some(*self),
        };
        Some(Self(Utc.from_utc_datetime(&naive)))
    }
}

/// Parse the date representations form values carry: RFC 3339, a naive
/// `YYYY-MM-DDTHH:MM:SS[.fff]` timestamp, or a bare `YYYY-MM-DD` date.
pub fn parse_datetime(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(parsed.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f") {
        return Some(Utc.from_utc_datetime(&naive));
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| Utc.from_utc_datetime(&naive))
}

fn runtime_error(message: impl Into<String>) -> Box<EvalAltResult> {
    Box::new(EvalAltResult::ErrorRuntime(
        Dynamic::from(message.into()),
        Position::NONE,
    ))
}

fn out_of_range(operation: &str) -> Box<EvalAltResult> {
    runtime_error(format!("{operation} produced a date out of range"))
}

fn parse_moment(raw: &str) -> RhaiResult<Moment> {
    parse_datetime(raw)
        .map(Moment)
        .ok_or_else(|| runtime_error(format!("cannot parse '{raw}' as a date")))
}

fn from_millis(millis: INT) -> RhaiResult<Moment> {
    DateTime::from_timestamp_millis(millis)
        .map(Moment)
        .ok_or_else(|| runtime_error(format!("timestamp {millis} is out of range")))
}

pub(crate) fn register(engine: &mut Engine) {
    engine.register_type_with_name::<MomentLib>("MomentLib");
    engine.register_type_with_name::<Moment>("Moment");

    engine.register_fn("now", |_: &mut MomentLib| Moment::now());
    engine.register_fn("parse", |_: &mut MomentLib, raw: &str| parse_moment(raw));
    engine.register_fn("parse", |_: &mut MomentLib, millis: INT| from_millis(millis));
    engine.register_fn("moment", Moment::now);
    engine.register_fn("moment", |raw: &str| parse_moment(raw));

    engine.register_fn("get", |m: &mut Moment, unit: &str| -> RhaiResult<INT> {
        Ok(m.get(Unit::parse(unit)?))
    });
    engine.register_fn(
        "set",
        |m: &mut Moment, unit: &str, value: INT| -> RhaiResult<Moment> {
            *m = m.set(Unit::parse(unit)?, value).ok_or_else(|| out_of_range("set"))?;
            Ok(*m)
        },
    );
    engine.register_fn(
        "add",
        |m: &mut Moment, amount: INT, unit: &str| -> RhaiResult<Moment> {
            *m = m.add(amount, Unit::parse(unit)?).ok_or_else(|| out_of_range("add"))?;
            Ok(*m)
        },
    );
    engine.register_fn(
        "subtract",
        |m: &mut Moment, amount: INT, unit: &str| -> RhaiResult<Moment> {
            *m = m
                .add(-amount, Unit::parse(unit)?)
                .ok_or_else(|| out_of_range("subtract"))?;
            Ok(*m)
        },
    );
    engine.register_fn("startOf", |m: &mut Moment, unit: &str| -> RhaiResult<Moment> {
        *m = m.start_of(Unit::parse(unit)?).ok_or_else(|| out_of_range("startOf"))?;
        Ok(*m)
    });
    engine.register_fn("isBefore", |m: &mut Moment, other: Moment| m.0 < other.0);
    engine.register_fn("isAfter", |m: &mut Moment, other: Moment| m.0 > other.0);
    engine.register_fn("isSame", |m: &mut Moment, other: Moment| m.0 == other.0);
    engine.register_fn("isBetween", |m: &mut Moment, from: Moment, to: Moment| {
        from.0 < m.0 && m.0 < to.0
    });
    engine.register_fn("toISOString", |m: &mut Moment| m.to_iso_string());
    engine.register_fn("format", |m: &mut Moment| m.to_iso_string());
    engine.register_fn("format", |m: &mut Moment, pattern: &str| {
        m.0.format(pattern).to_string()
    });
    engine.register_fn("valueOf", |m: &mut Moment| m.0.timestamp_millis());
    engine.register_fn("clone", |m: &mut Moment| *m);
    engine.register_fn("to_string", |m: &mut Moment| m.to_iso_string());
    engine.register_fn("==", |a: Moment, b: Moment| a == b);
}
