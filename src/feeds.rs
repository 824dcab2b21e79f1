//! RSS feed fetching and normalization.
//!
//! Pulls the configured Saudi financial news feeds, parses the RSS XML with
//! `quick-xml`, and maps `<item>` entries to normalized [`Article`] records.
//! Each source is fetched independently; a failed source is logged and
//! contributes zero articles. The aggregate call fails only when every source
//! comes back empty.
//!
//! # Feed tolerance
//!
//! Feeds in the wild are messy: descriptions arrive as HTML (sometimes inside
//! CDATA), `pubDate` may be missing or live in `dc:date`, and Arabic titles
//! often start with a stray U+200F right-to-left mark. All of that is
//! normalized here so downstream scoring sees plain text.

use crate::errors::FetchError;
use crate::models::Article;
use chrono::{DateTime, Utc};
use futures::future::join_all;
use once_cell::sync::Lazy;
use quick_xml::Reader;
use quick_xml::events::{BytesRef, Event};
use regex::Regex;
use std::time::Duration;
use tracing::{debug, error, info, instrument};

/// A named RSS source.
#[derive(Debug, Clone, Copy)]
pub struct FeedSource {
    pub name: &'static str,
    pub url: &'static str,
}

/// The production source set: Argaam main news, Argaam company disclosures,
/// and Al Arabiya business.
pub const SOURCES: &[FeedSource] = &[
    FeedSource {
        name: "Argaam",
        url: "https://www.argaam.com/en/rss/ho-main-news?sectionid=1524",
    },
    FeedSource {
        name: "Disclosures",
        url: "https://www.argaam.com/en/rss/ho-company-disclosures?sectionid=244",
    },
    FeedSource {
        name: "Al Arabiya",
        url: "https://english.alarabiya.net/feed/rss2/en/business.xml",
    },
];

const FETCH_TIMEOUT: Duration = Duration::from_secs(10);
const USER_AGENT: &str = "Mozilla/5.0 (compatible; TasiPulse/1.0)";
const MAX_DESCRIPTION_CHARS: usize = 1000;

static TAG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]*>").unwrap());
static WS_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

/// Strip HTML tags and common entities from a feed description.
pub fn strip_html(html: &str) -> String {
    let text = TAG_RE.replace_all(html, " ");
    let text = text
        .replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'");
    WS_RE.replace_all(&text, " ").trim().to_string()
}

fn truncate_chars(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => s[..idx].to_string(),
        None => s.to_string(),
    }
}

/// Fields of an `<item>` we care about while walking the XML.
#[derive(Debug, Clone, Copy, PartialEq)]
enum ItemField {
    Title,
    Description,
    Summary,
    Link,
    PubDate,
}

#[derive(Debug, Default)]
struct RawItem {
    title: String,
    description: String,
    summary: String,
    link: String,
    pub_date: String,
}

/// Parse RSS XML into normalized articles.
///
/// Tolerates zero, one, or many `<item>` elements, CDATA-wrapped fields, and
/// a missing `pubDate` (which falls back to `fetched_at`). Entity and
/// character references arrive as separate reader events and are resolved
/// back into the surrounding text. Text is deliberately not trimmed per
/// event (that would eat the spaces around a reference); fields are trimmed
/// once assembled. Items are indexed in document order to derive the
/// throwaway article id.
pub fn parse_feed(xml: &str, source_name: &str, fetched_at: DateTime<Utc>) -> Vec<Article> {
    let mut reader = Reader::from_str(xml);

    let mut items: Vec<RawItem> = Vec::new();
    let mut current: Option<RawItem> = None;
    let mut field: Option<ItemField> = None;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                let name = e.name();
                match name.as_ref() {
                    b"item" => {
                        current = Some(RawItem::default());
                        field = None;
                    }
                    b"title" if current.is_some() => field = Some(ItemField::Title),
                    b"description" if current.is_some() => field = Some(ItemField::Description),
                    b"summary" if current.is_some() => field = Some(ItemField::Summary),
                    b"link" if current.is_some() => field = Some(ItemField::Link),
                    b"pubDate" | b"dc:date" if current.is_some() => field = Some(ItemField::PubDate),
                    _ => field = None,
                }
            }
            Ok(Event::End(e)) => {
                if e.name().as_ref() == b"item" {
                    if let Some(item) = current.take() {
                        items.push(item);
                    }
                }
                field = None;
            }
            Ok(Event::Text(t)) => {
                let text = t
                    .xml_content()
                    .map(|c| c.into_owned())
                    .unwrap_or_else(|_| String::from_utf8_lossy(&t).into_owned());
                append_field(&mut current, field, &text);
            }
            Ok(Event::GeneralRef(r)) => {
                if let Some(text) = resolve_reference(&r) {
                    append_field(&mut current, field, &text);
                }
            }
            Ok(Event::CData(t)) => {
                let text = String::from_utf8_lossy(&t.into_inner()).into_owned();
                append_field(&mut current, field, &text);
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => {
                debug!(source = source_name, error = %e, "XML parse error; keeping items so far");
                break;
            }
        }
    }

    items
        .into_iter()
        .enumerate()
        .map(|(idx, item)| {
            let title = item
                .title
                .trim_start_matches('\u{200f}')
                .trim()
                .to_string();
            let raw_desc = if item.description.is_empty() {
                item.summary
            } else {
                item.description
            };
            let description = truncate_chars(&strip_html(&raw_desc), MAX_DESCRIPTION_CHARS);
            let link = if item.link.trim().is_empty() {
                "#".to_string()
            } else {
                item.link.trim().to_string()
            };
            let date = DateTime::parse_from_rfc2822(item.pub_date.trim())
                .map(|d| d.with_timezone(&Utc))
                .unwrap_or(fetched_at);

            Article {
                id: format!("{}-{}-{}", source_name, idx, fetched_at.timestamp_millis()),
                title,
                description,
                source: source_name.to_string(),
                url: link,
                date,
                category: "General".to_string(),
            }
        })
        .collect()
}

/// Resolve a `&#...;` character reference or predefined entity to its text.
/// Unknown named entities are dropped rather than passed through raw.
fn resolve_reference(r: &BytesRef) -> Option<String> {
    if let Ok(Some(ch)) = r.resolve_char_ref() {
        return Some(ch.to_string());
    }
    let replacement = match r.decode().ok()?.as_ref() {
        "amp" => "&",
        "lt" => "<",
        "gt" => ">",
        "apos" => "'",
        "quot" => "\"",
        _ => return None,
    };
    Some(replacement.to_string())
}

fn append_field(current: &mut Option<RawItem>, field: Option<ItemField>, text: &str) {
    let (Some(item), Some(field)) = (current.as_mut(), field) else {
        return;
    };
    let target = match field {
        ItemField::Title => &mut item.title,
        ItemField::Description => &mut item.description,
        ItemField::Summary => &mut item.summary,
        ItemField::Link => &mut item.link,
        ItemField::PubDate => &mut item.pub_date,
    };
    target.push_str(text);
}

/// Fetch and parse a single source.
#[instrument(level = "info", skip(client), fields(source = source.name))]
pub async fn fetch_source(
    client: &reqwest::Client,
    source: FeedSource,
) -> Result<Vec<Article>, FetchError> {
    let response = client
        .get(source.url)
        .timeout(FETCH_TIMEOUT)
        .header(reqwest::header::USER_AGENT, USER_AGENT)
        .send()
        .await
        .and_then(|r| r.error_for_status())
        .map_err(|e| FetchError::Source {
            name: source.name.to_string(),
            reason: e.to_string(),
        })?;

    let body = response.text().await.map_err(|e| FetchError::Source {
        name: source.name.to_string(),
        reason: e.to_string(),
    })?;

    let articles = parse_feed(&body, source.name, Utc::now());
    info!(count = articles.len(), "Fetched source");
    Ok(articles)
}

/// Fetch all sources concurrently and flatten the results.
///
/// Per-source failures are logged and skipped. Returns
/// [`FetchError::AllSourcesFailed`] only when the aggregate is empty.
#[instrument(level = "info", skip_all)]
pub async fn fetch_all(
    client: &reqwest::Client,
    sources: &[FeedSource],
) -> Result<Vec<Article>, FetchError> {
    let results = join_all(sources.iter().map(|s| fetch_source(client, *s))).await;

    let mut articles = Vec::new();
    for (source, result) in sources.iter().zip(results) {
        match result {
            Ok(mut fetched) => articles.append(&mut fetched),
            Err(e) => error!(source = source.name, error = %e, "Source fetch failed"),
        }
    }

    info!(count = articles.len(), "Fetched all sources");
    if articles.is_empty() {
        return Err(FetchError::AllSourcesFailed);
    }
    Ok(articles)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn fixed_now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 11, 10, 12, 0, 0).unwrap()
    }

    const SAMPLE_RSS: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0">
  <channel>
    <title>Argaam Main News</title>
    <item>
      <title>&#8207;Aramco announces Q3 dividends</title>
      <description><![CDATA[<p>Saudi Aramco declared a base dividend of <b>$20.3 billion</b>.</p>]]></description>
      <link>https://www.argaam.com/en/article/1</link>
      <pubDate>Sun, 10 Nov 2024 09:30:00 +0300</pubDate>
    </item>
    <item>
      <title>TASI closes higher</title>
      <description>The index rose 0.5% &amp; volume reached 250 million shares.</description>
      <link>https://www.argaam.com/en/article/2</link>
    </item>
  </channel>
</rss>"#;

    #[test]
    fn test_parse_feed_maps_items() {
        let articles = parse_feed(SAMPLE_RSS, "Argaam", fixed_now());
        assert_eq!(articles.len(), 2);

        let first = &articles[0];
        assert_eq!(first.title, "Aramco announces Q3 dividends");
        // Tags become spaces before whitespace collapse, as the feeds expect.
        assert_eq!(first.description, "Saudi Aramco declared a base dividend of $20.3 billion .");
        assert_eq!(first.url, "https://www.argaam.com/en/article/1");
        assert_eq!(first.source, "Argaam");
        assert_eq!(first.id, format!("Argaam-0-{}", fixed_now().timestamp_millis()));
        // 09:30 +0300 is 06:30 UTC
        assert_eq!(first.date, Utc.with_ymd_and_hms(2024, 11, 10, 6, 30, 0).unwrap());
    }

    #[test]
    fn test_parse_feed_missing_pubdate_uses_fetch_time() {
        let articles = parse_feed(SAMPLE_RSS, "Argaam", fixed_now());
        assert_eq!(articles[1].date, fixed_now());
        assert_eq!(
            articles[1].description,
            "The index rose 0.5% & volume reached 250 million shares."
        );
    }

    #[test]
    fn test_parse_feed_single_item_and_missing_link() {
        let xml = r#"<rss><channel><item>
            <title>Solo</title>
            <summary>Summary text only</summary>
        </item></channel></rss>"#;
        let articles = parse_feed(xml, "Disclosures", fixed_now());
        assert_eq!(articles.len(), 1);
        assert_eq!(articles[0].url, "#");
        assert_eq!(articles[0].description, "Summary text only");
    }

    #[test]
    fn test_parse_feed_no_items() {
        let xml = "<rss><channel><title>Empty</title></channel></rss>";
        assert!(parse_feed(xml, "Argaam", fixed_now()).is_empty());
    }

    #[test]
    fn test_parse_feed_channel_title_not_leaked() {
        // The channel-level <title> must not bleed into item titles.
        let articles = parse_feed(SAMPLE_RSS, "Argaam", fixed_now());
        assert!(!articles[0].title.contains("Main News"));
    }

    #[test]
    fn test_strip_html() {
        assert_eq!(
            strip_html("<p>Hello <b>world</b></p>"),
            "Hello world"
        );
        assert_eq!(strip_html("a &amp; b &lt;c&gt;"), "a & b <c>");
        assert_eq!(strip_html("  spaced\n\n  out  "), "spaced out");
        // Words separated only by markup must not be glued together.
        assert_eq!(strip_html("end.</p><p>Start"), "end. Start");
    }

    #[test]
    fn test_parse_feed_resolves_entity_references() {
        // References arrive as separate reader events; the spacing around
        // them must survive reassembly.
        let xml = r#"<rss><channel><item>
            <title>Saudi &quot;Vision&quot; fund&apos;s P&amp;L &#8212; update</title>
            <description>Up 5% &amp; rising</description>
            <link>https://x/1</link>
        </item></channel></rss>"#;
        let articles = parse_feed(xml, "Argaam", fixed_now());
        assert_eq!(articles[0].title, "Saudi \"Vision\" fund's P&L \u{2014} update");
        assert_eq!(articles[0].description, "Up 5% & rising");
    }

    #[test]
    fn test_description_truncated_to_1000_chars() {
        let long = "word ".repeat(400);
        let xml = format!(
            "<rss><channel><item><title>T</title><description>{long}</description><link>https://x</link></item></channel></rss>"
        );
        let articles = parse_feed(&xml, "Argaam", fixed_now());
        assert_eq!(articles[0].description.chars().count(), 1000);
    }
}
