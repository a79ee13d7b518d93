use std::fmt::Display;

use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};

use crate::date::{format_iso, is_iso_date, parse_date_range, parse_local_date, parse_time};
use crate::error::{Result, ScrapeError};
use crate::text::{clean_multiline, clean_text, non_empty};

pub const DEFAULT_TAG_TYPE: &str = "other";
pub const MIN_TITLE_CHARS: usize = 2;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tags {
    #[serde(rename = "type")]
    pub kind: String,
    pub genres: Vec<String>,
    pub flags: Vec<String>,
}

impl Default for Tags {
    fn default() -> Self {
        Self {
            kind: DEFAULT_TAG_TYPE.to_string(),
            genres: Vec::new(),
            flags: Vec::new(),
        }
    }
}

impl Tags {
    pub fn is_default(&self) -> bool {
        self.kind == DEFAULT_TAG_TYPE && self.genres.is_empty() && self.flags.is_empty()
    }
}

/// A normalized event as persisted in a venue's root document.
///
/// Every field is always serialized; absent values are written as `null`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub title: Option<String>,
    pub date_from: Option<NaiveDate>,
    pub date_to: Option<NaiveDate>,
    #[serde(default, with = "hhmm")]
    pub open_time: Option<NaiveTime>,
    #[serde(default, with = "hhmm")]
    pub start_time: Option<NaiveTime>,
    #[serde(default, with = "hhmm")]
    pub end_time: Option<NaiveTime>,
    pub description: Option<String>,
    pub body: Option<String>,
    pub image_url: Option<String>,
    pub source_url: Option<String>,
    pub price: Option<String>,
    pub contact: Option<String>,
    pub source_type: Option<String>,
    pub venue_name: Option<String>,
    pub status: Option<String>,
    #[serde(default)]
    pub tags: Tags,
}

impl Display for Event {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let date = match (self.date_from, self.date_to) {
            (Some(from), Some(to)) if from != to => format!("{from} – {to}"),
            (Some(from), _) => from.to_string(),
            (None, _) => "????-??-??".to_string(),
        };
        write!(f, "[{}] {}", date, self.title.as_deref().unwrap_or("(untitled)"))?;
        if let Some(start) = self.start_time {
            write!(f, " {}", start.format("%H:%M"))?;
        }
        Ok(())
    }
}

/// Loosely shaped event input as produced by extractors.
///
/// Values are raw strings straight from the page; [`create_event`] does the
/// cleanup. Unknown keys are ignored when deserializing, so extractor output
/// can carry scratch fields without leaking them into persisted files.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct EventDraft {
    pub title: Option<String>,
    pub date_from: Option<String>,
    pub date_to: Option<String>,
    /// Free-form date text such as `2025年10月1日～3日`, used when
    /// `date_from` is absent.
    pub date_text: Option<String>,
    pub open_time: Option<String>,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
    /// Legacy name for `start_time`.
    pub time_start: Option<String>,
    /// Legacy name for `end_time`.
    pub time_end: Option<String>,
    pub description: Option<String>,
    pub body: Option<String>,
    pub image_url: Option<String>,
    pub source_url: Option<String>,
    pub price: Option<String>,
    pub contact: Option<String>,
    pub source_type: Option<String>,
    pub venue_name: Option<String>,
    pub status: Option<String>,
    pub tags: Option<TagsDraft>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct TagsDraft {
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub genres: Option<Vec<String>>,
    pub flags: Option<Vec<String>>,
}

impl EventDraft {
    pub fn from_value(value: serde_json::Value) -> Result<Self> {
        Ok(serde_json::from_value(value)?)
    }
}

/// Builds a canonical event from a draft.
///
/// Text fields are tag-stripped and entity-decoded, dates accept any form
/// [`parse_local_date`] understands, `date_to` falls back to `date_from`, and
/// canonical time fields take precedence over their legacy names.
pub fn create_event(draft: EventDraft) -> Event {
    let (mut date_from, mut date_to) = (
        draft
            .date_from
            .as_deref()
            .and_then(|d| parse_local_date(d, None)),
        None,
    );
    if let Some(to) = draft.date_to.as_deref() {
        date_to = parse_local_date(to, date_from);
    }
    if date_from.is_none()
        && let Some((from, to)) = draft
            .date_text
            .as_deref()
            .and_then(|t| parse_date_range(t, None))
    {
        date_from = Some(from);
        date_to = date_to.or(to);
    }
    let date_to = date_to.or(date_from);

    let time = |canonical: Option<String>, legacy: Option<String>| {
        non_empty(canonical)
            .or_else(|| non_empty(legacy))
            .and_then(|t| parse_time(&t))
    };

    let tags = match draft.tags {
        Some(t) => Tags {
            kind: non_empty(t.kind).unwrap_or_else(|| DEFAULT_TAG_TYPE.to_string()),
            genres: t.genres.unwrap_or_default(),
            flags: t.flags.unwrap_or_default(),
        },
        None => Tags::default(),
    };

    Event {
        title: clean(draft.title),
        date_from,
        date_to,
        open_time: time(draft.open_time, None),
        start_time: time(draft.start_time, draft.time_start),
        end_time: time(draft.end_time, draft.time_end),
        description: clean_block(draft.description),
        body: clean_block(draft.body),
        image_url: non_empty(draft.image_url),
        source_url: non_empty(draft.source_url),
        price: clean(draft.price),
        contact: clean(draft.contact),
        source_type: non_empty(draft.source_type),
        venue_name: clean(draft.venue_name),
        status: non_empty(draft.status),
        tags,
    }
}

fn clean(value: Option<String>) -> Option<String> {
    non_empty(value.map(|v| clean_text(&v)))
}

fn clean_block(value: Option<String>) -> Option<String> {
    non_empty(value.map(|v| clean_multiline(&v)))
}

/// True when the event has a title of at least [`MIN_TITLE_CHARS`] and a
/// `date_from` that serializes as `YYYY-MM-DD`.
pub fn is_complete(event: &Event) -> bool {
    has_valid_title(event) && has_valid_date_from(event)
}

fn has_valid_title(event: &Event) -> bool {
    event
        .title
        .as_deref()
        .is_some_and(|t| t.trim().chars().count() >= MIN_TITLE_CHARS)
}

fn has_valid_date_from(event: &Event) -> bool {
    event.date_from.is_some_and(|d| is_iso_date(&format_iso(d)))
}

/// Strict gate applied before persisting a batch.
///
/// Fails with an empty-result error when fewer than `min_events` events are
/// present, and with a validation error naming the first event whose title is
/// missing or shorter than [`MIN_TITLE_CHARS`], or whose `date_from` does not
/// serialize as `YYYY-MM-DD`.
pub fn validate_final_data(events: &[Event], min_events: usize) -> Result<()> {
    if events.len() < min_events {
        return Err(ScrapeError::TooFewEvents {
            count: events.len(),
            min: min_events,
        });
    }

    for (i, event) in events.iter().enumerate() {
        if !has_valid_title(event) {
            return Err(ScrapeError::Validation(format!(
                "event #{i} has a missing or too short title: {:?}",
                event.title
            )));
        }

        if !has_valid_date_from(event) {
            return Err(ScrapeError::Validation(format!(
                "event #{i} ('{}') has an invalid date_from: {:?}",
                event.title.as_deref().unwrap_or_default(),
                event.date_from
            )));
        }
    }
    Ok(())
}

/// `Option<NaiveTime>` as `"HH:MM"` or `null`.
pub(crate) mod hhmm {
    use chrono::NaiveTime;
    use serde::{Deserialize, Deserializer, Serializer, de::Error};

    pub fn serialize<S: Serializer>(value: &Option<NaiveTime>, s: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(t) => s.serialize_str(&t.format("%H:%M").to_string()),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<NaiveTime>, D::Error> {
        let raw: Option<String> = Option::deserialize(d)?;
        raw.map(|s| {
            NaiveTime::parse_from_str(&s, "%H:%M")
                .map_err(|e| D::Error::custom(format!("invalid time '{s}': {e}")))
        })
        .transpose()
    }
}
