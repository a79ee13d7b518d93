//! Local-day parsing and formatting.
//!
//! Venue pages write dates every way imaginable: `2025-10-19`, `2025/10/19`,
//! `2025.10.19`, `2025年10月19日(日)`, or just `10月19日` under a year
//! heading. Everything here works on calendar days without a timezone; the
//! only clock read is [`today_utc`].

use std::sync::LazyLock;

use chrono::{Datelike, NaiveDate, NaiveTime, Utc};
use regex::Regex;

use crate::text::to_half_width;

static RE_ISO_DATE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d{4}-\d{2}-\d{2}$").expect("invalid regex: iso date"));

static RE_YMD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\d{4})\s*[-/.年]\s*(\d{1,2})\s*[-/.月]\s*(\d{1,2})").expect("invalid regex: ymd")
});

static RE_MD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\d{1,2})\s*[/月]\s*(\d{1,2})").expect("invalid regex: month/day")
});

static RE_RANGE_SEP: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[〜～~]|\s[-–—]\s").expect("invalid regex: range separator"));

static RE_DAY_ONLY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*(\d{1,2})\s*日?").expect("invalid regex: day only"));

static RE_HM: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d{1,2})\s*:\s*(\d{2})").expect("invalid regex: h:m"));

static RE_JP_TIME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(午前|午後)?\s*(\d{1,2})\s*時\s*(?:(\d{1,2})\s*分|(半))?")
        .expect("invalid regex: japanese time")
});

/// Checks the persisted `YYYY-MM-DD` shape.
pub fn is_iso_date(value: &str) -> bool {
    RE_ISO_DATE.is_match(value)
}

pub fn format_iso(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

pub fn format_hhmm(time: NaiveTime) -> String {
    time.format("%H:%M").to_string()
}

pub fn today_utc() -> NaiveDate {
    Utc::now().date_naive()
}

/// Parses the first full date found in `text`.
///
/// When only month and day are present, `reference` supplies the year: the
/// date is placed in the reference year unless that would put it more than
/// six months in the past, in which case the following year is used. Listing
/// pages published in December routinely announce January events this way.
pub fn parse_local_date(text: &str, reference: Option<NaiveDate>) -> Option<NaiveDate> {
    let text = to_half_width(text);

    if let Some(caps) = RE_YMD.captures(&text) {
        let year: i32 = caps[1].parse().ok()?;
        let month: u32 = caps[2].parse().ok()?;
        let day: u32 = caps[3].parse().ok()?;
        return NaiveDate::from_ymd_opt(year, month, day);
    }

    let reference = reference?;
    let caps = RE_MD.captures(&text)?;
    let month: u32 = caps[1].parse().ok()?;
    let day: u32 = caps[2].parse().ok()?;
    infer_year(month, day, reference)
}

fn infer_year(month: u32, day: u32, reference: NaiveDate) -> Option<NaiveDate> {
    let candidate = NaiveDate::from_ymd_opt(reference.year(), month, day)?;
    if (reference - candidate).num_days() > 183 {
        NaiveDate::from_ymd_opt(reference.year() + 1, month, day)
    } else {
        Some(candidate)
    }
}

/// Parses `"2025年10月1日(水)～10月3日(金)"`-style ranges.
///
/// The end part may omit the year, or the year and month; missing parts are
/// taken from the start date. A lone date yields `(date, None)`.
pub fn parse_date_range(
    text: &str,
    reference: Option<NaiveDate>,
) -> Option<(NaiveDate, Option<NaiveDate>)> {
    let text = to_half_width(text);
    let mut parts = RE_RANGE_SEP.splitn(&text, 2);
    let head = parts.next()?;
    let from = parse_local_date(head, reference)?;

    let Some(tail) = parts.next() else {
        return Some((from, None));
    };

    let to = parse_local_date(tail, Some(from)).or_else(|| {
        let caps = RE_DAY_ONLY.captures(tail)?;
        let day: u32 = caps[1].parse().ok()?;
        NaiveDate::from_ymd_opt(from.year(), from.month(), day)
    });

    match to {
        Some(to) if to >= from => Some((from, Some(to))),
        Some(to) => {
            log::debug!("Date range end {to} precedes start {from} in '{text}'");
            Some((from, None))
        }
        None => Some((from, None)),
    }
}

/// Parses `18:30`, `18：30`, `18時30分`, `午後6時半` and similar into a time of day.
pub fn parse_time(text: &str) -> Option<NaiveTime> {
    let text = to_half_width(text);

    if let Some(caps) = RE_HM.captures(&text) {
        let hour: u32 = caps[1].parse().ok()?;
        let minute: u32 = caps[2].parse().ok()?;
        return NaiveTime::from_hms_opt(hour, minute, 0);
    }

    let caps = RE_JP_TIME.captures(&text)?;
    let mut hour: u32 = caps[2].parse().ok()?;
    let minute: u32 = match (caps.get(3), caps.get(4)) {
        (Some(m), _) => m.as_str().parse().ok()?,
        (None, Some(_)) => 30,
        (None, None) => 0,
    };
    if caps.get(1).is_some_and(|m| m.as_str() == "午後") && hour < 12 {
        hour += 12;
    }
    NaiveTime::from_hms_opt(hour, minute, 0)
}

/// True when the closed day range `[from, to]` overlaps `[window_start, window_end]`.
/// A missing `to` means a single-day event.
pub fn is_happening_in_window(
    from: NaiveDate,
    to: Option<NaiveDate>,
    window_start: NaiveDate,
    window_end: NaiveDate,
) -> bool {
    let to = to.unwrap_or(from);
    from <= window_end && to >= window_start
}

/// True when the event has not finished before `today`.
pub fn is_current_or_upcoming(from: NaiveDate, to: Option<NaiveDate>, today: NaiveDate) -> bool {
    to.unwrap_or(from) >= today
}
