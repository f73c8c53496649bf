//! Time handling for aviation weather messages.
//!
//! Aviation messages mostly carry *partial* times: an issue time `020532Z`
//! names only day, hour and minute, and a validity `0206/0312` only day and
//! hour. These types carry such values alongside their completed form once a
//! suitable reference time is known.

use chrono::{
    DateTime, Datelike, Duration, FixedOffset, Months, NaiveDate, NaiveDateTime, Offset, TimeZone,
    Timelike, Utc,
};
use std::fmt;

use crate::error::{AviError, AviResult};

/// How far (in steps of the partial time's own granularity) completion
/// searches before giving up.
const SEARCH_STEPS: i32 = 12;

/// Source of the current time.
///
/// Injected wherever "now" matters so that processing is deterministic
/// under test.
pub trait Clock: Send + Sync + fmt::Debug {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock frozen at a single instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedClock(DateTime<Utc>);

impl FixedClock {
    pub fn new(instant: DateTime<Utc>) -> Self {
        Self(instant)
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    Month,
    Day,
    Hour,
}

/// A date-time with some of day, hour and minute specified.
///
/// Hour 24 is accepted and means midnight at the end of the given day, as
/// used by TAF validity periods (`0212/0224`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct PartialDateTime {
    day: Option<u32>,
    hour: Option<u32>,
    minute: Option<u32>,
    zone: Option<FixedOffset>,
}

impl PartialDateTime {
    pub fn new(day: Option<u32>, hour: Option<u32>, minute: Option<u32>) -> AviResult<Self> {
        if day.is_none() && hour.is_none() && minute.is_none() {
            return Err(AviError::InvalidTime("partial time without any field".to_string()));
        }
        if let Some(d) = day {
            if !(1..=31).contains(&d) {
                return Err(AviError::InvalidTime(format!("day {} out of range", d)));
            }
        }
        if let Some(h) = hour {
            if h > 24 {
                return Err(AviError::InvalidTime(format!("hour {} out of range", h)));
            }
            if h == 24 && minute.unwrap_or(0) != 0 {
                return Err(AviError::InvalidTime("hour 24 only allowed with minute 00".to_string()));
            }
        }
        if let Some(m) = minute {
            if m > 59 {
                return Err(AviError::InvalidTime(format!("minute {} out of range", m)));
            }
        }
        Ok(Self { day, hour, minute, zone: None })
    }

    pub fn of_day_hour_minute(day: u32, hour: u32, minute: u32) -> AviResult<Self> {
        Self::new(Some(day), Some(hour), Some(minute))
    }

    pub fn of_day_hour(day: u32, hour: u32) -> AviResult<Self> {
        Self::new(Some(day), Some(hour), None)
    }

    pub fn of_hour_minute(hour: u32, minute: u32) -> AviResult<Self> {
        Self::new(None, Some(hour), Some(minute))
    }

    /// Parse `ddhhmm` or `ddhh`, optionally followed by `Z` (which sets the
    /// zone to UTC).
    pub fn parse(s: &str) -> AviResult<Self> {
        let (digits, utc) = match s.strip_suffix('Z') {
            Some(rest) => (rest, true),
            None => (s, false),
        };
        if !digits.chars().all(|c| c.is_ascii_digit()) {
            return Err(AviError::InvalidTime(s.to_string()));
        }
        let field = |range: std::ops::Range<usize>| -> AviResult<u32> {
            digits[range]
                .parse()
                .map_err(|_| AviError::InvalidTime(s.to_string()))
        };
        let partial = match digits.len() {
            6 => Self::of_day_hour_minute(field(0..2)?, field(2..4)?, field(4..6)?)?,
            4 => Self::of_day_hour(field(0..2)?, field(2..4)?)?,
            _ => return Err(AviError::InvalidTime(s.to_string())),
        };
        Ok(if utc { partial.with_zone(utc_offset()) } else { partial })
    }

    pub fn day(&self) -> Option<u32> {
        self.day
    }

    pub fn hour(&self) -> Option<u32> {
        self.hour
    }

    pub fn minute(&self) -> Option<u32> {
        self.minute
    }

    pub fn zone(&self) -> Option<FixedOffset> {
        self.zone
    }

    pub fn with_zone(mut self, zone: FixedOffset) -> Self {
        self.zone = Some(zone);
        self
    }

    /// The zone of this time, defaulting to UTC when unspecified.
    pub fn zone_or_utc(&self) -> FixedOffset {
        self.zone.unwrap_or_else(utc_offset)
    }

    fn step(&self) -> Step {
        if self.day.is_some() {
            Step::Month
        } else if self.hour.is_some() {
            Step::Day
        } else {
            Step::Hour
        }
    }

    /// Candidate local date-time in the `offset`th step unit relative to `base`.
    fn candidate(&self, base: NaiveDateTime, offset: i32) -> Option<NaiveDateTime> {
        let minute = self.minute.unwrap_or(0);
        match self.step() {
            Step::Month => {
                let first = NaiveDate::from_ymd_opt(base.year(), base.month(), 1)?;
                let month = if offset >= 0 {
                    first.checked_add_months(Months::new(offset.unsigned_abs()))?
                } else {
                    first.checked_sub_months(Months::new(offset.unsigned_abs()))?
                };
                let date = NaiveDate::from_ymd_opt(month.year(), month.month(), self.day?)?;
                at_time(date, self.hour.unwrap_or(0), minute)
            }
            Step::Day => {
                let date = base.date().checked_add_signed(Duration::days(offset as i64))?;
                at_time(date, self.hour?, minute)
            }
            Step::Hour => {
                let hour_start = base.date().and_hms_opt(base.hour(), 0, 0)?;
                hour_start
                    .checked_add_signed(Duration::hours(offset as i64))?
                    .with_minute(minute)
            }
        }
    }

    fn candidates(&self, reference: DateTime<Utc>, offsets: std::ops::RangeInclusive<i32>) -> Vec<DateTime<Utc>> {
        let zone = self.zone_or_utc();
        let base = reference.with_timezone(&zone).naive_local();
        offsets
            .filter_map(|offset| self.candidate(base, offset))
            .filter_map(|local| zone.from_local_datetime(&local).single())
            .map(|dt| dt.with_timezone(&Utc))
            .collect()
    }

    /// Complete to the matching instant closest to `reference`. Ties prefer
    /// the earlier instant.
    pub fn complete_near(&self, reference: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.candidates(reference, -1..=1)
            .into_iter()
            .min_by_key(|candidate| ((*candidate - reference).num_seconds().abs(), *candidate))
    }

    /// Complete to the first matching instant strictly after `instant`.
    pub fn complete_after(&self, instant: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.candidates(instant, -1..=SEARCH_STEPS)
            .into_iter()
            .filter(|candidate| *candidate > instant)
            .min()
    }

    /// Complete to the last matching instant strictly before `instant`.
    pub fn complete_before(&self, instant: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.candidates(instant, -SEARCH_STEPS..=1)
            .into_iter()
            .filter(|candidate| *candidate < instant)
            .max()
    }
}

impl fmt::Display for PartialDateTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let part = |v: Option<u32>| v.map(|v| format!("{:02}", v)).unwrap_or_else(|| "--".to_string());
        write!(f, "{}{}{}", part(self.day), part(self.hour), part(self.minute))?;
        match self.zone {
            Some(zone) if zone.local_minus_utc() == 0 => write!(f, "Z"),
            Some(zone) => write!(f, "{}", zone),
            None => Ok(()),
        }
    }
}

fn utc_offset() -> FixedOffset {
    Utc.fix()
}

fn at_time(date: NaiveDate, hour: u32, minute: u32) -> Option<NaiveDateTime> {
    if hour == 24 {
        date.checked_add_signed(Duration::days(1))?.and_hms_opt(0, minute, 0)
    } else {
        date.and_hms_opt(hour, minute, 0)
    }
}

/// A time instant that is partial, complete, or both (a partial time that
/// has already been completed keeps its original partial form).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PartialOrCompleteTimeInstant {
    partial: Option<PartialDateTime>,
    complete: Option<DateTime<Utc>>,
}

impl PartialOrCompleteTimeInstant {
    pub fn of_partial(partial: PartialDateTime) -> Self {
        Self { partial: Some(partial), complete: None }
    }

    pub fn of_complete(complete: DateTime<Utc>) -> Self {
        Self { partial: None, complete: Some(complete) }
    }

    pub fn partial_time(&self) -> Option<PartialDateTime> {
        self.partial
    }

    pub fn complete_time(&self) -> Option<DateTime<Utc>> {
        self.complete
    }

    pub fn is_complete(&self) -> bool {
        self.complete.is_some()
    }

    pub fn with_complete_time(mut self, complete: DateTime<Utc>) -> Self {
        self.complete = Some(complete);
        self
    }

    /// The complete time if known, otherwise the partial time completed
    /// near `reference`.
    pub fn complete_near(&self, reference: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.complete
            .or_else(|| self.partial.and_then(|partial| partial.complete_near(reference)))
    }
}

impl fmt::Display for PartialOrCompleteTimeInstant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.complete, self.partial) {
            (Some(complete), _) => write!(f, "{}", complete.to_rfc3339()),
            (None, Some(partial)) => write!(f, "{}", partial),
            (None, None) => write!(f, "<none>"),
        }
    }
}

/// A time period whose ends are partial or complete.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PartialOrCompleteTimePeriod {
    start: Option<PartialOrCompleteTimeInstant>,
    end: Option<PartialOrCompleteTimeInstant>,
}

impl PartialOrCompleteTimePeriod {
    pub fn new(start: Option<PartialOrCompleteTimeInstant>, end: Option<PartialOrCompleteTimeInstant>) -> Self {
        Self { start, end }
    }

    /// Parse a TAC validity such as `0206/0312`.
    pub fn parse(s: &str) -> AviResult<Self> {
        let (start, end) = s
            .split_once('/')
            .ok_or_else(|| AviError::InvalidTime(s.to_string()))?;
        Ok(Self::new(
            Some(PartialOrCompleteTimeInstant::of_partial(PartialDateTime::parse(start)?)),
            Some(PartialOrCompleteTimeInstant::of_partial(PartialDateTime::parse(end)?)),
        ))
    }

    pub fn start(&self) -> Option<PartialOrCompleteTimeInstant> {
        self.start
    }

    pub fn end(&self) -> Option<PartialOrCompleteTimeInstant> {
        self.end
    }

    fn start_complete(&self) -> Option<DateTime<Utc>> {
        self.start.and_then(|s| s.complete_time())
    }

    fn end_complete(&self) -> Option<DateTime<Utc>> {
        self.end.and_then(|e| e.complete_time())
    }

    /// True when every present end is complete.
    pub fn is_complete(&self) -> bool {
        self.start.map_or(true, |s| s.is_complete()) && self.end.map_or(true, |e| e.is_complete())
    }

    /// True when at least one present end is complete.
    pub fn has_complete_end(&self) -> bool {
        self.start_complete().is_some() || self.end_complete().is_some()
    }

    /// Complete a period that has at least one complete end: the other end
    /// is completed strictly after (end) or before (start) it.
    pub fn complete_from_known_end(&self) -> AviResult<Self> {
        match (self.start_complete(), self.end_complete()) {
            (Some(_), Some(_)) => Ok(*self),
            (Some(start), None) => Ok(Self::new(self.start, complete_end_after(self.end, start)?)),
            (None, Some(end)) => {
                let start = match self.start {
                    Some(instant) => {
                        let partial = instant
                            .partial_time()
                            .ok_or_else(|| AviError::InvalidTime("empty period start".to_string()))?;
                        let completed = partial.complete_before(end).ok_or_else(|| {
                            AviError::InvalidTime(format!("cannot complete {} before {}", partial, end))
                        })?;
                        Some(instant.with_complete_time(completed))
                    }
                    None => None,
                };
                Ok(Self::new(start, self.end))
            }
            (None, None) => Err(AviError::InvalidTime("period has no complete end".to_string())),
        }
    }

    /// Complete both ends of an entirely partial period: the start near
    /// `reference`, the end strictly after the completed start.
    pub fn complete_near(&self, reference: DateTime<Utc>) -> AviResult<Self> {
        if self.has_complete_end() {
            return self.complete_from_known_end();
        }
        match self.start {
            Some(instant) => {
                let start = instant.complete_near(reference).ok_or_else(|| {
                    AviError::InvalidTime(format!("cannot complete {} near {}", instant, reference))
                })?;
                Ok(Self::new(
                    Some(instant.with_complete_time(start)),
                    complete_end_after(self.end, start)?,
                ))
            }
            None => {
                let end = match self.end {
                    Some(instant) => {
                        let completed = instant.complete_near(reference).ok_or_else(|| {
                            AviError::InvalidTime(format!("cannot complete {} near {}", instant, reference))
                        })?;
                        Some(instant.with_complete_time(completed))
                    }
                    None => None,
                };
                Ok(Self::new(None, end))
            }
        }
    }
}

fn complete_end_after(
    end: Option<PartialOrCompleteTimeInstant>,
    start: DateTime<Utc>,
) -> AviResult<Option<PartialOrCompleteTimeInstant>> {
    let Some(instant) = end else {
        return Ok(None);
    };
    if instant.is_complete() {
        return Ok(Some(instant));
    }
    let partial = instant
        .partial_time()
        .ok_or_else(|| AviError::InvalidTime("empty period end".to_string()))?;
    let completed = partial
        .complete_after(start)
        .ok_or_else(|| AviError::InvalidTime(format!("cannot complete {} after {}", partial, start)))?;
    Ok(Some(instant.with_complete_time(completed)))
}

impl fmt::Display for PartialOrCompleteTimePeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let end = |v: Option<PartialOrCompleteTimeInstant>| v.map(|v| v.to_string()).unwrap_or_default();
        write!(f, "{}/{}", end(self.start), end(self.end))
    }
}

/// Parse an ISO-8601 duration such as `PT12H`, `P1DT6H`, `-PT30M` or
/// `PT1.5S`. Years and months are rejected as they have no fixed length.
pub fn parse_iso8601_duration(s: &str) -> AviResult<Duration> {
    let invalid = || AviError::InvalidDuration(s.to_string());
    let trimmed = s.trim();
    let (negative, rest) = match trimmed.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, trimmed.strip_prefix('+').unwrap_or(trimmed)),
    };
    let rest = rest
        .strip_prefix('P')
        .or_else(|| rest.strip_prefix('p'))
        .ok_or_else(invalid)?;
    if rest.is_empty() {
        return Err(invalid());
    }

    let mut total_millis: i64 = 0;
    let mut in_time = false;
    let mut number = String::new();
    let mut seen_component = false;

    for c in rest.chars() {
        match c.to_ascii_uppercase() {
            'T' if !in_time && number.is_empty() => in_time = true,
            d if d.is_ascii_digit() || d == '.' => number.push(d),
            unit => {
                if number.is_empty() {
                    return Err(invalid());
                }
                let value: f64 = number.parse().map_err(|_| invalid())?;
                let unit_millis: f64 = match (in_time, unit) {
                    (false, 'W') => 7.0 * 86_400_000.0,
                    (false, 'D') => 86_400_000.0,
                    (true, 'H') => 3_600_000.0,
                    (true, 'M') => 60_000.0,
                    (true, 'S') => 1_000.0,
                    _ => return Err(invalid()),
                };
                total_millis = total_millis
                    .checked_add((value * unit_millis).round() as i64)
                    .ok_or_else(invalid)?;
                number.clear();
                seen_component = true;
            }
        }
    }
    if !number.is_empty() || !seen_component {
        return Err(invalid());
    }

    let millis = if negative { -total_millis } else { total_millis };
    Ok(Duration::milliseconds(millis))
}
