pub mod concurrency;
pub mod config;
pub mod date;
pub mod dedupe;
pub mod error;
pub mod extract;
pub mod fetch;
pub mod output;
pub mod pipeline;
pub mod schema;
pub mod tagging;
pub mod text;

pub use config::{Registry, VenueConfig};
pub use error::{ErrorKind, ScrapeError, report_fatal};
pub use fetch::{Encoding, FetchOptions, FetchResponse, Fetcher};
pub use output::{FinalizeOptions, FinalizeSummary, RootDocument, finalize_and_save_events};
pub use pipeline::VenueScraper;
pub use schema::{Event, EventDraft, Tags, create_event, validate_final_data};
