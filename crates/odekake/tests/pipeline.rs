use std::fs;
use std::path::Path;

use chrono::NaiveDate;
use odekake::{ErrorKind, Registry, RootDocument, ScrapeError, VenueConfig, VenueScraper};
use odekake::fetch::Fetcher;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const LISTING: &str = r#"<html><body>
<ul class="event-list">
  <li><a class="event-link" href="detail/1.html">秋の定期演奏会</a></li>
  <li><a class="event-link" href="detail/2.html">郷土の写真展</a></li>
  <li><a class="event-link" href="detail/3.html">準備中</a></li>
  <li><a class="event-link" href="detail/1.html#tickets">チケット</a></li>
</ul>
</body></html>"#;

const EXHIBITION: &str = r#"<html><head><script type="application/ld+json">
{"@context": "https://schema.org", "@type": "ExhibitionEvent",
 "name": "郷土の写真展", "startDate": "2099-10-01", "endDate": "2099-12-14",
 "offers": {"price": 0, "priceCurrency": "JPY"}}
</script></head><body></body></html>"#;

fn html(body: impl Into<Vec<u8>>) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_raw(body.into(), "text/html; charset=utf-8")
}

async fn mount(server: &MockServer, route: &str, response: ResponseTemplate) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(response)
        .mount(server)
        .await;
}

async fn venue_site() -> MockServer {
    let server = MockServer::start().await;
    mount(&server, "/events/", html(LISTING)).await;
    mount(
        &server,
        "/events/detail/1.html",
        html(fs::read_to_string("fixtures/detail_page.html").expect("Failed to read fixture")),
    )
    .await;
    mount(&server, "/events/detail/2.html", html(EXHIBITION)).await;
    mount(&server, "/events/detail/3.html", ResponseTemplate::new(500)).await;
    server
}

fn venue(server: &MockServer, extra: &str) -> VenueConfig {
    let raw = format!(
        r#"[{{
            "id": "bunka-kaikan",
            "name": "市民文化会館",
            "url": "{}/events/",
            "detail_link_selector": "ul.event-list a.event-link",
            "concurrency": 2,
            "strict": true{}
        }}]"#,
        server.uri(),
        extra
    );
    Registry::from_json(&raw).unwrap().venues()[0].clone()
}

fn scraper(data_dir: &Path) -> VenueScraper {
    VenueScraper::with_fetcher(Fetcher::new().unwrap(), data_dir)
        .today(NaiveDate::from_ymd_opt(2025, 10, 19).unwrap())
}

fn read_document(path: &Path) -> RootDocument {
    serde_json::from_str(&fs::read_to_string(path).unwrap()).unwrap()
}

#[tokio::test]
async fn test_detail_pages_are_scraped_normalized_and_saved() {
    let server = venue_site().await;
    let dir = tempfile::tempdir().unwrap();
    let venue = venue(&server, "");

    let summary = scraper(dir.path()).run(&venue).await.unwrap();

    assert_eq!(summary.event_count, 2, "failed detail page is skipped");
    assert_eq!(summary.output_path, dir.path().join("bunka-kaikan.json"));

    let document = read_document(&summary.output_path);
    assert_eq!(document.venue_id, "bunka-kaikan");
    assert_eq!(document.venue_name.as_deref(), Some("市民文化会館"));
    assert_eq!(document.last_success_at.to_string(), "2025-10-19");
    assert_eq!(
        document.extra["source_page"],
        format!("{}/events/", server.uri())
    );

    let concert = &document.events[0];
    assert_eq!(concert.title.as_deref(), Some("秋の定期演奏会"));
    assert_eq!(concert.date_from.unwrap().to_string(), "2099-11-08");
    assert_eq!(concert.date_to, concert.date_from);
    assert_eq!(concert.open_time.unwrap().to_string(), "13:30:00");
    assert_eq!(
        concert.source_url.as_deref(),
        Some(format!("{}/events/detail/1.html", server.uri()).as_str())
    );
    assert_eq!(concert.source_type.as_deref(), Some("web"));
    assert_eq!(concert.venue_name.as_deref(), Some("市民文化会館"));
    assert_eq!(concert.price.as_deref(), Some("2500 JPY"));
    assert_eq!(concert.tags.kind, "music");
    assert_eq!(concert.tags.genres, vec!["concert".to_string()]);

    let exhibition = &document.events[1];
    assert_eq!(exhibition.title.as_deref(), Some("郷土の写真展"));
    assert_eq!(exhibition.date_to.unwrap().to_string(), "2099-12-14");
    assert_eq!(exhibition.tags.kind, "exhibition");
    assert_eq!(exhibition.tags.flags, vec!["free".to_string()]);
}

#[tokio::test]
async fn test_tags_survive_a_rerun() {
    let server = venue_site().await;
    let dir = tempfile::tempdir().unwrap();
    let venue = venue(&server, "");
    let scraper = scraper(dir.path());

    let summary = scraper.run(&venue).await.unwrap();
    let mut document = read_document(&summary.output_path);
    document.events[1].tags.flags.push("featured".into());
    fs::write(
        &summary.output_path,
        serde_json::to_string_pretty(&document).unwrap(),
    )
    .unwrap();

    scraper.run(&venue).await.unwrap();

    let document = read_document(&summary.output_path);
    assert_eq!(
        document.events[1].tags.flags,
        vec!["free".to_string(), "featured".to_string()]
    );
    assert!(!document.events[0].tags.flags.contains(&"featured".to_string()));
}

#[tokio::test]
async fn test_unreachable_listing_keeps_previous_output() {
    let server = MockServer::start().await;
    mount(&server, "/events/", ResponseTemplate::new(404)).await;

    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("bunka-kaikan.json");
    fs::write(&output, "{\"venue_id\": \"bunka-kaikan\", \"events\": []}").unwrap();
    let before = fs::read(&output).unwrap();

    let err = scraper(dir.path())
        .run(&venue(&server, ""))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Network);
    assert_eq!(fs::read(&output).unwrap(), before);
}

#[tokio::test]
async fn test_strict_minimum_blocks_the_write() {
    let server = venue_site().await;
    let dir = tempfile::tempdir().unwrap();

    let err = scraper(dir.path())
        .run(&venue(&server, r#", "min_events": 5"#))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::EmptyResult);
    assert!(matches!(err, ScrapeError::TooFewEvents { count: 2, min: 5 }));
    assert!(!dir.path().join("bunka-kaikan.json").exists());
}

#[tokio::test]
async fn test_listing_mode_filters_past_events() {
    let server = MockServer::start().await;
    mount(
        &server,
        "/events/",
        html(fs::read_to_string("fixtures/listing_jsonld.html").expect("Failed to read fixture")),
    )
    .await;

    let raw = format!(
        r#"[{{"id": "bunka-kaikan", "name": "市民文化会館", "url": "{}/events/"}}]"#,
        server.uri()
    );
    let registry = Registry::from_json(&raw).unwrap();
    let venue = registry.get("bunka-kaikan").unwrap();
    let dir = tempfile::tempdir().unwrap();

    let events = scraper(dir.path()).collect_events(venue).await.unwrap();
    assert_eq!(events.len(), 3);
    assert_eq!(
        events[0].title.as_deref(),
        Some("秋の定期演奏会 & ロビーコンサート")
    );

    let later = VenueScraper::with_fetcher(Fetcher::new().unwrap(), dir.path())
        .today(NaiveDate::from_ymd_opt(2025, 12, 15).unwrap());
    let events = later.collect_events(venue).await.unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].title.as_deref(), Some("年末特別公演"));
    assert_eq!(events[0].status.as_deref(), Some("EventCancelled"));
}

const MIXED_LISTING: &str = r#"<html><head><script type="application/ld+json">
[
  {"@type": "Event", "name": "秋の演奏会", "startDate": "2099-11-08", "url": "/e/1"},
  {"@type": "Event", "name": "A", "startDate": "2099-11-09", "url": "/e/2"},
  {"@type": "Event", "name": "日程未定の講座", "url": "/e/3"}
]
</script></head><body></body></html>"#;

async fn listing_site(body: &str) -> MockServer {
    let server = MockServer::start().await;
    mount(&server, "/events/", html(body)).await;
    server
}

fn listing_venue(server: &MockServer, extra: &str) -> VenueConfig {
    let raw = format!(
        r#"[{{"id": "kominkan", "name": "中央公民館", "url": "{}/events/"{}}}]"#,
        server.uri(),
        extra
    );
    Registry::from_json(&raw).unwrap().venues()[0].clone()
}

#[tokio::test]
async fn test_incomplete_events_are_never_persisted() {
    let server = listing_site(MIXED_LISTING).await;
    let dir = tempfile::tempdir().unwrap();

    let summary = scraper(dir.path())
        .run(&listing_venue(&server, ""))
        .await
        .unwrap();
    assert_eq!(summary.event_count, 1);

    let document = read_document(&summary.output_path);
    assert_eq!(document.events.len(), 1);
    assert_eq!(document.events[0].title.as_deref(), Some("秋の演奏会"));
    for event in &document.events {
        assert!(event.title.as_deref().is_some_and(|t| t.chars().count() >= 2));
        assert!(event.date_from.is_some());
    }
}

#[tokio::test]
async fn test_strict_venue_fails_on_incomplete_events() {
    let server = listing_site(MIXED_LISTING).await;
    let dir = tempfile::tempdir().unwrap();

    let err = scraper(dir.path())
        .run(&listing_venue(&server, r#", "strict": true"#))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Validation);
    assert!(!dir.path().join("kominkan.json").exists());
}

#[tokio::test]
async fn test_min_events_applies_without_strict() {
    let server = listing_site(MIXED_LISTING).await;
    let dir = tempfile::tempdir().unwrap();

    let err = scraper(dir.path())
        .run(&listing_venue(&server, r#", "min_events": 5"#))
        .await
        .unwrap_err();

    assert!(matches!(err, ScrapeError::TooFewEvents { count: 1, min: 5 }));
    assert!(!dir.path().join("kominkan.json").exists());
}
