use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::{Result, ScrapeError};
use crate::extract::{ExtractorKind, compile_selector};
use crate::fetch::{DEFAULT_TIMEOUT, Encoding, FetchOptions};

fn default_accept_encoding() -> String {
    "identity".to_string()
}

fn default_concurrency() -> usize {
    4
}

fn default_min_events() -> usize {
    1
}

/// One entry of the venue registry file.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VenueConfig {
    pub id: String,
    pub name: String,
    /// Listing page the run starts from.
    pub url: String,
    #[serde(default)]
    pub encoding: Encoding,
    #[serde(default = "default_accept_encoding")]
    pub accept_encoding: String,
    #[serde(default)]
    pub extractor: ExtractorKind,
    /// When set, events are read from the pages these links point to rather
    /// than from the listing page itself.
    #[serde(default)]
    pub detail_link_selector: Option<String>,
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    /// A run that keeps fewer events than this fails, strict or not.
    #[serde(default = "default_min_events")]
    pub min_events: usize,
    /// Run the strict title/date validation before saving.
    #[serde(default)]
    pub strict: bool,
    #[serde(default)]
    pub keep_past: bool,
    #[serde(default)]
    pub output: Option<PathBuf>,
    #[serde(default)]
    pub timeout_ms: Option<u64>,
    #[serde(default)]
    pub retries: u32,
    #[serde(default)]
    pub headers: Vec<(String, String)>,
}

impl VenueConfig {
    pub fn fetch_options(&self) -> FetchOptions {
        let mut options = FetchOptions::default()
            .accept_encoding(&self.accept_encoding)
            .encoding(self.encoding)
            .timeout(self.timeout_ms.map(Duration::from_millis).unwrap_or(DEFAULT_TIMEOUT))
            .retries(self.retries, Duration::from_secs(2))
            .debug_label(self.id.as_str());
        for (name, value) in &self.headers {
            options = options.header(name, value);
        }
        options
    }

    pub fn output_path(&self, data_dir: &Path) -> PathBuf {
        match &self.output {
            Some(path) if path.is_absolute() => path.clone(),
            Some(path) => data_dir.join(path),
            None => data_dir.join(format!("{}.json", self.id)),
        }
    }

    fn validate(&self) -> Result<()> {
        let id_ok = !self.id.is_empty()
            && self
                .id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !id_ok {
            return Err(ScrapeError::Config(format!(
                "Venue id '{}' must be non-empty ASCII letters, digits, '-' or '_'",
                self.id
            )));
        }
        if !self.url.starts_with("http://") && !self.url.starts_with("https://") {
            return Err(ScrapeError::Config(format!(
                "{}: url must be absolute, got '{}'",
                self.id, self.url
            )));
        }
        if self.concurrency == 0 {
            return Err(ScrapeError::Config(format!(
                "{}: concurrency must be greater than 0",
                self.id
            )));
        }
        if let Some(selector) = &self.detail_link_selector {
            compile_selector(selector)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default)]
pub struct Registry {
    venues: Vec<VenueConfig>,
}

impl Registry {
    pub fn from_json(raw: &str) -> Result<Self> {
        let venues: Vec<VenueConfig> = serde_json::from_str(raw)
            .map_err(|e| ScrapeError::Config(format!("Malformed venue registry: {e}")))?;

        let mut ids = HashSet::new();
        for venue in &venues {
            venue.validate()?;
            if !ids.insert(venue.id.as_str()) {
                return Err(ScrapeError::Config(format!(
                    "Duplicate venue id '{}'",
                    venue.id
                )));
            }
        }
        Ok(Self { venues })
    }

    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| ScrapeError::io(path, e))?;
        let registry = Self::from_json(&raw)?;
        log::debug!(
            "Loaded {} venue(s) from {}",
            registry.venues.len(),
            path.display()
        );
        Ok(registry)
    }

    pub fn venues(&self) -> &[VenueConfig] {
        &self.venues
    }

    pub fn get(&self, id: &str) -> Option<&VenueConfig> {
        self.venues.iter().find(|v| v.id == id)
    }
}
