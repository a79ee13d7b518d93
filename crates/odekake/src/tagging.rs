//! Tagging pass run as the finalizer's `before_write` hook.

use std::collections::HashMap;
use std::path::Path;

use crate::output::{RootDocument, read_root_document};
use crate::schema::{DEFAULT_TAG_TYPE, Event};

struct Rule {
    kind: &'static str,
    genre: &'static str,
    keywords: &'static [&'static str],
}

const RULES: &[Rule] = &[
    Rule {
        kind: "music",
        genre: "concert",
        keywords: &["コンサート", "演奏会", "リサイタル", "ライブ", "concert", "recital"],
    },
    Rule {
        kind: "music",
        genre: "jazz",
        keywords: &["ジャズ", "jazz"],
    },
    Rule {
        kind: "stage",
        genre: "theater",
        keywords: &["演劇", "舞台", "ミュージカル", "バレエ", "公演"],
    },
    Rule {
        kind: "stage",
        genre: "rakugo",
        keywords: &["落語", "寄席", "漫才"],
    },
    Rule {
        kind: "exhibition",
        genre: "art",
        keywords: &["展覧会", "企画展", "特別展", "写真展", "美術", "展示"],
    },
    Rule {
        kind: "sports",
        genre: "sports",
        keywords: &["試合", "大会", "マラソン", "リーグ", "スポーツ"],
    },
    Rule {
        kind: "workshop",
        genre: "workshop",
        keywords: &["ワークショップ", "体験", "教室", "講座", "workshop"],
    },
    Rule {
        kind: "festival",
        genre: "festival",
        keywords: &["まつり", "祭り", "フェスティバル", "マルシェ", "festival"],
    },
    Rule {
        kind: "film",
        genre: "film",
        keywords: &["上映会", "映画", "シネマ"],
    },
];

const FREE_MARKERS: [&str; 3] = ["無料", "free", "入場料なし"];
const RESERVATION_MARKERS: [&str; 3] = ["要予約", "事前申込", "要申込"];

fn push_unique(values: &mut Vec<String>, value: &str) {
    if !values.iter().any(|v| v == value) {
        values.push(value.to_string());
    }
}

/// Derives type, genres and flags from the event's own text.
///
/// An explicit type set by the extractor is kept; genres and flags are only
/// ever added.
pub fn classify(event: &mut Event) {
    let haystack = [event.title.as_deref(), event.description.as_deref()]
        .into_iter()
        .flatten()
        .collect::<Vec<_>>()
        .join("\n")
        .to_lowercase();

    for rule in RULES {
        if rule.keywords.iter().any(|k| haystack.contains(k)) {
            if event.tags.kind == DEFAULT_TAG_TYPE {
                event.tags.kind = rule.kind.to_string();
            }
            push_unique(&mut event.tags.genres, rule.genre);
        }
    }

    let price = event.price.as_deref().unwrap_or_default().to_lowercase();
    if FREE_MARKERS.iter().any(|m| price.contains(m)) {
        push_unique(&mut event.tags.flags, "free");
    }
    if RESERVATION_MARKERS
        .iter()
        .any(|m| haystack.contains(m) || price.contains(m))
    {
        push_unique(&mut event.tags.flags, "reservation");
    }
}

pub fn classify_all(document: &mut RootDocument) {
    document.events.iter_mut().for_each(classify);
}

/// Copies tags from the previous run onto events with the same `source_url`.
///
/// Genres and flags are unioned; a previous non-default type replaces a
/// default one. This keeps hand-curated tags alive across full rewrites.
pub fn carry_over_tags(previous: &RootDocument, document: &mut RootDocument) {
    let by_url: HashMap<&str, &Event> = previous
        .events
        .iter()
        .filter_map(|e| e.source_url.as_deref().map(|url| (url, e)))
        .collect();

    let mut carried = 0;
    for event in &mut document.events {
        let Some(old) = event.source_url.as_deref().and_then(|url| by_url.get(url)) else {
            continue;
        };
        if old.tags.is_default() {
            continue;
        }
        if event.tags.kind == DEFAULT_TAG_TYPE {
            event.tags.kind = old.tags.kind.clone();
        }
        for genre in &old.tags.genres {
            push_unique(&mut event.tags.genres, genre);
        }
        for flag in &old.tags.flags {
            push_unique(&mut event.tags.flags, flag);
        }
        carried += 1;
    }

    if carried > 0 {
        log::debug!("{}: carried tags over for {} event(s)", document.venue_id, carried);
    }
}

/// Loads the document a previous run wrote, if there is a readable one.
pub async fn load_previous(path: &Path) -> Option<RootDocument> {
    if !tokio::fs::try_exists(path).await.unwrap_or(false) {
        return None;
    }
    match read_root_document(path).await {
        Ok(document) => Some(document),
        Err(e) => {
            log::warn!("Ignoring previous output {}: {}", path.display(), e);
            None
        }
    }
}
