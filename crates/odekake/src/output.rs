use std::fmt::Display;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::io::AsyncWriteExt;

use crate::date::today_utc;
use crate::error::{Result, ScrapeError};
use crate::schema::Event;

const RESERVED_KEYS: [&str; 4] = ["venue_id", "venue_name", "last_success_at", "events"];

/// The per-venue JSON file consumed by the site.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RootDocument {
    pub venue_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub venue_name: Option<String>,
    pub last_success_at: NaiveDate,
    pub events: Vec<Event>,
    /// Additional top-level keys, written alongside the standard ones.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Hook that sees the assembled document right before it is written and may
/// modify it in place.
pub type BeforeWrite = Box<dyn FnOnce(&mut RootDocument) + Send>;

pub struct FinalizeOptions {
    pub venue_id: String,
    pub output_path: PathBuf,
    pub events: Vec<Event>,
    pub venue_name: Option<String>,
    /// Defaults to today's UTC date.
    pub last_success_at: Option<NaiveDate>,
    pub extra_data: Map<String, Value>,
    pub require_date_from: bool,
    pub before_write: Option<BeforeWrite>,
}

impl FinalizeOptions {
    pub fn new(
        venue_id: impl Into<String>,
        output_path: impl Into<PathBuf>,
        events: Vec<Event>,
    ) -> Self {
        Self {
            venue_id: venue_id.into(),
            output_path: output_path.into(),
            events,
            venue_name: None,
            last_success_at: None,
            extra_data: Map::new(),
            require_date_from: true,
            before_write: None,
        }
    }

    pub fn venue_name(mut self, name: impl Into<String>) -> Self {
        self.venue_name = Some(name.into());
        self
    }

    pub fn last_success_at(mut self, date: NaiveDate) -> Self {
        self.last_success_at = Some(date);
        self
    }

    pub fn extra(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.extra_data.insert(key.into(), value.into());
        self
    }

    pub fn require_date_from(mut self, required: bool) -> Self {
        self.require_date_from = required;
        self
    }

    pub fn before_write(mut self, hook: impl FnOnce(&mut RootDocument) + Send + 'static) -> Self {
        self.before_write = Some(Box::new(hook));
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FinalizeSummary {
    pub venue_id: String,
    pub event_count: usize,
    pub output_path: PathBuf,
}

impl Display for FinalizeSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}: saved {} event(s) to {}",
            self.venue_id,
            self.event_count,
            self.output_path.display()
        )
    }
}

/// Validates a batch, assembles the root document and writes it atomically.
///
/// The batch must be non-empty and, unless `require_date_from` is off, at
/// least one event must carry a `date_from`. Both checks run before anything
/// touches the file system, so a failed run leaves the previous file in place.
pub async fn finalize_and_save_events(options: FinalizeOptions) -> Result<FinalizeSummary> {
    let FinalizeOptions {
        venue_id,
        output_path,
        events,
        venue_name,
        last_success_at,
        mut extra_data,
        require_date_from,
        before_write,
    } = options;

    if events.is_empty() {
        return Err(ScrapeError::NoEvents { venue_id });
    }
    if require_date_from && !events.iter().any(|e| e.date_from.is_some()) {
        return Err(ScrapeError::Validation(format!(
            "{venue_id}: none of {} event(s) has a date_from",
            events.len()
        )));
    }

    for key in RESERVED_KEYS {
        if extra_data.remove(key).is_some() {
            log::warn!("{venue_id}: ignoring extra key '{key}' that shadows a document field");
        }
    }

    let mut document = RootDocument {
        venue_id,
        venue_name,
        last_success_at: last_success_at.unwrap_or_else(today_utc),
        events,
        extra: extra_data,
    };

    if let Some(hook) = before_write {
        hook(&mut document);
    }

    let mut json = serde_json::to_string_pretty(&document)?;
    json.push('\n');
    write_atomic(&output_path, json.as_bytes()).await?;

    let summary = FinalizeSummary {
        venue_id: document.venue_id,
        event_count: document.events.len(),
        output_path,
    };
    log::info!("{summary}");
    Ok(summary)
}

pub async fn read_root_document(path: &Path) -> Result<RootDocument> {
    let raw = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| ScrapeError::io(path, e))?;
    Ok(serde_json::from_str(&raw)?)
}

/// Writes `data` to a hidden sibling, syncs it, then renames it over `path`.
pub async fn write_atomic(path: &Path, data: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| ScrapeError::io(parent, e))?;
    }

    let file_name = path
        .file_name()
        .ok_or_else(|| ScrapeError::Config(format!("Not a file path: {}", path.display())))?;
    let tmp = path.with_file_name(format!(".{}.tmp", file_name.to_string_lossy()));

    let result = async {
        let mut file = tokio::fs::File::create(&tmp).await?;
        file.write_all(data).await?;
        file.sync_all().await?;
        drop(file);
        tokio::fs::rename(&tmp, path).await
    }
    .await;

    if let Err(e) = result {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(ScrapeError::io(path, e));
    }
    Ok(())
}
