use std::collections::HashSet;
use std::sync::LazyLock;

use scraper::{Html, Selector};
use serde::Deserialize;
use serde_json::{Map, Value};

use crate::error::{Result, ScrapeError};
use crate::schema::EventDraft;
use crate::text::absolute_url;

static SEL_JSON_LD: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse(r#"script[type="application/ld+json"]"#).expect("invalid selector: json-ld")
});

/// Turns one fetched page into candidate events.
///
/// Implementations do no I/O; anything venue-specific lives behind this trait.
pub trait Extractor: Send + Sync {
    fn name(&self) -> &'static str;
    fn extract(&self, html: &str, page_url: &str) -> Vec<EventDraft>;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ExtractorKind {
    #[default]
    JsonLd,
}

impl ExtractorKind {
    pub fn build(self) -> Box<dyn Extractor> {
        match self {
            ExtractorKind::JsonLd => Box::new(JsonLdExtractor),
        }
    }
}

/// Reads schema.org `Event` items (and subtypes such as `MusicEvent`) from
/// `application/ld+json` blocks.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonLdExtractor;

impl Extractor for JsonLdExtractor {
    fn name(&self) -> &'static str {
        "json-ld"
    }

    fn extract(&self, html: &str, page_url: &str) -> Vec<EventDraft> {
        let document = Html::parse_document(html);
        let mut drafts = Vec::new();

        for script in document.select(&SEL_JSON_LD) {
            let raw = script.text().collect::<String>();
            let value = match serde_json::from_str::<Value>(raw.trim()) {
                Ok(value) => value,
                Err(e) => {
                    log::debug!("{page_url}: skipping unparseable JSON-LD block: {e}");
                    continue;
                }
            };

            let mut items = Vec::new();
            collect_events(&value, &mut items);
            drafts.extend(
                items
                    .into_iter()
                    .filter_map(|item| draft_from_json_ld(item, page_url)),
            );
        }

        drafts
    }
}

fn is_event_type(value: Option<&Value>) -> bool {
    match value {
        Some(Value::String(t)) => t.ends_with("Event"),
        Some(Value::Array(types)) => types.iter().any(|t| is_event_type(Some(t))),
        _ => false,
    }
}

fn collect_events<'a>(value: &'a Value, out: &mut Vec<&'a Map<String, Value>>) {
    match value {
        Value::Array(values) => values.iter().for_each(|v| collect_events(v, out)),
        Value::Object(obj) => {
            if is_event_type(obj.get("@type")) {
                out.push(obj);
                return;
            }
            for key in ["@graph", "itemListElement", "item"] {
                if let Some(nested) = obj.get(key) {
                    collect_events(nested, out);
                }
            }
        }
        _ => {}
    }
}

fn string_field(obj: &Map<String, Value>, key: &str) -> Option<String> {
    match obj.get(key)? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Splits `2025-10-19T18:30:00+09:00` into its date and time parts. The time
/// part is left whole for `parse_time`.
fn split_date_time(value: &str) -> (Option<String>, Option<String>) {
    match value.split_once('T') {
        Some((date, time)) => (Some(date.to_string()), Some(time.to_string())),
        None => (Some(value.to_string()), None),
    }
}

/// `doorTime` is either a bare time or a full date-time.
fn time_part(value: &str) -> String {
    value
        .split_once('T')
        .map(|(_, t)| t.to_string())
        .unwrap_or_else(|| value.to_string())
}

fn image_url(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Array(values) => values.iter().find_map(image_url),
        Value::Object(obj) => string_field(obj, "url"),
        _ => None,
    }
}

fn price_text(offers: &Value) -> Option<String> {
    let offer = match offers {
        Value::Array(values) => values.iter().find_map(Value::as_object)?,
        Value::Object(obj) => obj,
        _ => return None,
    };
    let price = string_field(offer, "price").or_else(|| string_field(offer, "lowPrice"))?;
    if price.parse::<f64>().is_ok_and(|p| p == 0.0) {
        return Some("free".to_string());
    }
    match string_field(offer, "priceCurrency") {
        Some(currency) => Some(format!("{price} {currency}")),
        None => Some(price),
    }
}

fn draft_from_json_ld(obj: &Map<String, Value>, page_url: &str) -> Option<EventDraft> {
    let title = string_field(obj, "name")?;
    let (date_from, start_time) = string_field(obj, "startDate")
        .map(|s| split_date_time(&s))
        .unwrap_or_default();
    let (date_to, end_time) = string_field(obj, "endDate")
        .map(|s| split_date_time(&s))
        .unwrap_or_default();

    Some(EventDraft {
        title: Some(title),
        date_from,
        date_to,
        open_time: string_field(obj, "doorTime").map(|t| time_part(&t)),
        start_time,
        end_time,
        description: string_field(obj, "description"),
        image_url: obj
            .get("image")
            .and_then(image_url)
            .and_then(|u| absolute_url(page_url, &u)),
        source_url: string_field(obj, "url").and_then(|u| absolute_url(page_url, &u)),
        price: obj.get("offers").and_then(price_text),
        status: string_field(obj, "eventStatus")
            .map(|s| s.rsplit('/').next().unwrap_or(&s).to_string()),
        ..Default::default()
    })
}

pub fn compile_selector(selector: &str) -> Result<Selector> {
    Selector::parse(selector)
        .map_err(|e| ScrapeError::Config(format!("Invalid CSS selector '{selector}': {e:?}")))
}

/// Absolute, de-duplicated `href` targets of the elements matched by `selector`,
/// in document order. Fragments are stripped.
pub fn detail_links(html: &str, page_url: &str, selector: &Selector) -> Vec<String> {
    let document = Html::parse_document(html);
    let mut seen = HashSet::new();

    document
        .select(selector)
        .filter_map(|el| el.value().attr("href"))
        .filter_map(|href| absolute_url(page_url, href))
        .map(|url| match url.split_once('#') {
            Some((base, _)) => base.to_string(),
            None => url,
        })
        .filter(|url| url != page_url && seen.insert(url.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    const LISTING_URL: &str = "https://hall.example.jp/events/";

    #[test]
    fn test_extract_listing_fixture() {
        let html = fs::read_to_string("fixtures/listing_jsonld.html").expect("Failed to read fixture");
        let drafts = JsonLdExtractor.extract(&html, LISTING_URL);

        assert_eq!(drafts.len(), 3, "Organization block must be ignored");

        let concert = &drafts[0];
        assert_eq!(concert.title.as_deref(), Some("秋の定期演奏会 &amp; ロビーコンサート"));
        assert_eq!(concert.date_from.as_deref(), Some("2025-11-08"));
        assert_eq!(concert.start_time.as_deref(), Some("14:00:00+09:00"));
        assert_eq!(concert.open_time.as_deref(), Some("13:30"));
        assert_eq!(
            concert.source_url.as_deref(),
            Some("https://hall.example.jp/events/detail/101.html")
        );
        assert_eq!(
            concert.image_url.as_deref(),
            Some("https://hall.example.jp/img/101.jpg")
        );
        assert_eq!(concert.price.as_deref(), Some("2500 JPY"));

        let exhibition = &drafts[1];
        assert_eq!(exhibition.date_from.as_deref(), Some("2025-10-01"));
        assert_eq!(exhibition.date_to.as_deref(), Some("2025-12-14"));
        assert_eq!(exhibition.price.as_deref(), Some("free"));

        let cancelled = &drafts[2];
        assert_eq!(cancelled.status.as_deref(), Some("EventCancelled"));
        assert_eq!(cancelled.start_time, None);
    }

    #[test]
    fn test_extract_handles_graph_and_type_arrays() {
        let html = r#"<html><head><script type="application/ld+json">
            {"@context": "https://schema.org", "@graph": [
                {"@type": "WebPage", "name": "page"},
                {"@type": ["Event", "SportsEvent"], "name": "市民マラソン",
                 "startDate": "2026-02-15", "url": "/marathon"}
            ]}
            </script></head><body></body></html>"#;
        let drafts = JsonLdExtractor.extract(html, LISTING_URL);
        assert_eq!(drafts.len(), 1);
        assert_eq!(drafts[0].title.as_deref(), Some("市民マラソン"));
        assert_eq!(
            drafts[0].source_url.as_deref(),
            Some("https://hall.example.jp/marathon")
        );
    }

    #[test]
    fn test_single_digit_hour_start_time_survives() {
        let html = r#"<script type="application/ld+json">
            {"@type": "Event", "name": "朝のヨガ教室", "startDate": "2026-04-05T9:30",
             "endDate": "2026-04-05T11:00+09:00"}
            </script>"#;
        let drafts = JsonLdExtractor.extract(html, LISTING_URL);
        assert_eq!(drafts.len(), 1);

        let event = crate::schema::create_event(drafts[0].clone());
        assert_eq!(event.start_time, chrono::NaiveTime::from_hms_opt(9, 30, 0));
        assert_eq!(event.end_time, chrono::NaiveTime::from_hms_opt(11, 0, 0));
        assert_eq!(event.date_from, chrono::NaiveDate::from_ymd_opt(2026, 4, 5));
    }

    #[test]
    fn test_extract_skips_broken_blocks() {
        let html = r#"<script type="application/ld+json">{ "@type": "Event", </script>
            <script type="application/ld+json">{"@type": "Event", "name": "OK"}</script>"#;
        let drafts = JsonLdExtractor.extract(html, LISTING_URL);
        assert_eq!(drafts.len(), 1);
        assert_eq!(drafts[0].title.as_deref(), Some("OK"));
    }

    #[test]
    fn test_detail_links() {
        let html = fs::read_to_string("fixtures/listing_jsonld.html").expect("Failed to read fixture");
        let selector = compile_selector("ul.event-list a.event-link").unwrap();
        let links = detail_links(&html, LISTING_URL, &selector);
        assert_eq!(
            links,
            vec![
                "https://hall.example.jp/events/detail/101.html".to_string(),
                "https://hall.example.jp/events/detail/102.html".to_string(),
                "https://hall.example.jp/events/detail/103.html".to_string(),
            ]
        );
    }

    #[test]
    fn test_compile_selector_rejects_garbage() {
        assert!(compile_selector("ul > > a[").is_err());
    }
}
