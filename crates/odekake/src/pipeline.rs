use std::path::{Path, PathBuf};

use chrono::NaiveDate;

use crate::concurrency::map_concurrent_lenient;
use crate::config::VenueConfig;
use crate::date::{is_current_or_upcoming, today_utc};
use crate::dedupe::dedupe_events_by_source_url;
use crate::error::{Result, ScrapeError};
use crate::extract::{compile_selector, detail_links};
use crate::fetch::Fetcher;
use crate::output::{FinalizeOptions, FinalizeSummary, finalize_and_save_events};
use crate::schema::{Event, EventDraft, create_event, is_complete, validate_final_data};
use crate::tagging::{carry_over_tags, classify_all, load_previous};

pub const SOURCE_TYPE_WEB: &str = "web";

/// Runs venues through fetch, extract, normalize, dedupe, validate and save.
#[derive(Debug, Clone)]
pub struct VenueScraper {
    fetcher: Fetcher,
    data_dir: PathBuf,
    today: Option<NaiveDate>,
}

impl VenueScraper {
    pub fn new(data_dir: impl Into<PathBuf>) -> Result<Self> {
        Ok(Self::with_fetcher(Fetcher::new()?, data_dir))
    }

    pub fn with_fetcher(fetcher: Fetcher, data_dir: impl Into<PathBuf>) -> Self {
        Self {
            fetcher,
            data_dir: data_dir.into(),
            today: None,
        }
    }

    /// Pins the date used for past-event filtering and `last_success_at`.
    pub fn today(mut self, date: NaiveDate) -> Self {
        self.today = Some(date);
        self
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Fetches and normalizes a venue's events without writing anything.
    ///
    /// Events missing a title or `date_from` fail a strict venue and are
    /// dropped otherwise. Fewer than `min_events` survivors fail every venue.
    pub async fn collect_events(&self, venue: &VenueConfig) -> Result<Vec<Event>> {
        let options = venue.fetch_options();
        let extractor = venue.extractor.build();

        log::info!("[{}] Fetching listing {}", venue.id, venue.url);
        let listing = self.fetcher.fetch_text_with_meta(&venue.url, &options).await?;

        let drafts: Vec<EventDraft> = match &venue.detail_link_selector {
            Some(selector) => {
                let selector = compile_selector(selector)?;
                let links = detail_links(&listing.text, &listing.url, &selector);
                if links.is_empty() {
                    return Err(ScrapeError::NoEvents {
                        venue_id: venue.id.clone(),
                    });
                }

                log::info!(
                    "[{}] Fetching {} detail page(s), {} at a time...",
                    venue.id,
                    links.len(),
                    venue.concurrency
                );
                let pages = map_concurrent_lenient(links, venue.concurrency, &venue.id, |link| {
                    let options = &options;
                    async move {
                        let html = self.fetcher.fetch_text(&link, options).await?;
                        Ok::<_, ScrapeError>((link, html))
                    }
                })
                .await;

                let mut drafts = Vec::new();
                for (link, html) in pages {
                    for mut draft in extractor.extract(&html, &link) {
                        draft.source_url.get_or_insert_with(|| link.clone());
                        drafts.push(draft);
                    }
                }
                drafts
            }
            None => extractor.extract(&listing.text, &listing.url),
        };

        let extracted = drafts.len();
        let mut events: Vec<Event> = drafts
            .into_iter()
            .map(|mut draft| {
                draft.venue_name.get_or_insert_with(|| venue.name.clone());
                draft
                    .source_type
                    .get_or_insert_with(|| SOURCE_TYPE_WEB.to_string());
                create_event(draft)
            })
            .collect();

        if venue.strict {
            validate_final_data(&events, 0)?;
        } else {
            let before = events.len();
            events.retain(is_complete);
            if events.len() < before {
                log::warn!(
                    "[{}] dropped {} event(s) without a usable title or date_from",
                    venue.id,
                    before - events.len()
                );
            }
        }

        if !venue.keep_past {
            let today = self.today.unwrap_or_else(today_utc);
            events.retain(|e| {
                e.date_from
                    .is_some_and(|from| is_current_or_upcoming(from, e.date_to, today))
            });
        }

        let events = dedupe_events_by_source_url(events);
        log::info!(
            "[{}] {} candidate(s) via {}, {} kept",
            venue.id,
            extracted,
            extractor.name(),
            events.len()
        );

        validate_final_data(&events, venue.min_events)?;
        Ok(events)
    }

    /// Collects a venue's events and replaces its output file.
    ///
    /// Tags from the previous file are carried over for events that are still
    /// listed, then the keyword classifier runs on the final document.
    pub async fn run(&self, venue: &VenueConfig) -> Result<FinalizeSummary> {
        let events = self.collect_events(venue).await?;
        let output_path = venue.output_path(&self.data_dir);
        let previous = load_previous(&output_path).await;

        let mut options = FinalizeOptions::new(&venue.id, output_path, events)
            .venue_name(&venue.name)
            .extra("source_page", venue.url.clone())
            .before_write(move |document| {
                if let Some(previous) = previous {
                    carry_over_tags(&previous, document);
                }
                classify_all(document);
            });
        if let Some(today) = self.today {
            options = options.last_success_at(today);
        }

        finalize_and_save_events(options).await
    }
}
