// src/sources/rss.rs
//! Social signals counted from RSS feeds.
//!
//! Each item inside the collection window is scanned for a small vocabulary per
//! topic; every topic with at least one hit becomes a `content_mentions` signal.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use metrics::{counter, histogram};
use once_cell::sync::OnceCell;
use quick_xml::de::from_str;
use regex::Regex;
use serde::Deserialize;
use time::{format_description::well_known::Rfc2822, OffsetDateTime};

use super::{http_client, CollectionWindow, MockFeed, SignalProvider};
use crate::signal::{Signal, SourceType};

/// Items read per feed, newest first.
pub const MAX_ITEMS_PER_FEED: usize = 10;

/// Topic vocabularies, matched as lower-case substrings.
pub const TOPIC_VOCABULARY: [(&str, &[&str]); 4] = [
    ("ai_agents", &["ai", "agent", "bot", "autonomous", "chatbot"]),
    ("defi", &["defi", "dex", "yield", "liquidity", "amm", "perps"]),
    ("gaming", &["game", "nft", "metaverse", "p2e", "play-to-earn"]),
    ("payments", &["payment", "usdc", "stablecoin", "merchant", "commerce"]),
];

#[derive(Debug, Deserialize)]
struct Rss {
    channel: Channel,
}
#[derive(Debug, Deserialize)]
struct Channel {
    #[serde(rename = "item", default)]
    item: Vec<Item>,
}
#[derive(Debug, Deserialize)]
struct Item {
    title: Option<String>,
    #[serde(rename = "pubDate")]
    pub_date: Option<String>,
    description: Option<String>,
}

fn parse_rfc2822(ts: &str) -> Option<DateTime<Utc>> {
    let dt = OffsetDateTime::parse(ts.trim(), &Rfc2822).ok()?;
    DateTime::from_timestamp(dt.unix_timestamp(), 0)
}

pub struct RssMentionsProvider {
    mode: Mode,
}

enum Mode {
    Fixture(Vec<(String, String)>),
    Http {
        urls: Vec<String>,
        client: reqwest::Client,
    },
}

impl RssMentionsProvider {
    pub fn from_urls(urls: Vec<String>, timeout: Duration) -> Result<Self> {
        Ok(Self {
            mode: Mode::Http {
                urls,
                client: http_client(timeout)?,
            },
        })
    }

    /// Offline provider over `(feed label, xml body)` pairs.
    pub fn from_fixtures(feeds: Vec<(String, String)>) -> Self {
        Self {
            mode: Mode::Fixture(feeds),
        }
    }

    async fn fetch_body(client: &reqwest::Client, url: &str) -> Result<String> {
        client
            .get(url)
            .send()
            .await
            .with_context(|| format!("rss GET {url}"))?
            .error_for_status()
            .with_context(|| format!("rss status {url}"))?
            .text()
            .await
            .context("rss http .text()")
    }
}

#[async_trait]
impl SignalProvider for RssMentionsProvider {
    async fn collect(&self, window: &CollectionWindow) -> Result<Vec<Signal>> {
        match &self.mode {
            Mode::Fixture(feeds) => {
                let mut out = Vec::new();
                for (label, xml) in feeds {
                    out.extend(parse_feed(xml, label, window)?);
                }
                Ok(out)
            }
            Mode::Http { urls, client } => {
                let mut out = Vec::new();
                let mut failures = 0usize;
                for url in urls {
                    let parsed = match Self::fetch_body(client, url).await {
                        Ok(body) => parse_feed(&body, url, window),
                        Err(e) => Err(e),
                    };
                    match parsed {
                        Ok(v) => out.extend(v),
                        Err(e) => {
                            failures += 1;
                            tracing::warn!(target: "sources", error = ?e, feed = %url, provider = "rss", "feed failed");
                            counter!("source_errors_total", "source" => "rss").increment(1);
                        }
                    }
                }
                if !urls.is_empty() && failures == urls.len() {
                    anyhow::bail!("rss: all {failures} feeds failed");
                }
                Ok(out)
            }
        }
    }

    fn name(&self) -> &'static str {
        "rss"
    }

    fn source_type(&self) -> SourceType {
        SourceType::Social
    }

    fn fallback(&self) -> Option<MockFeed> {
        Some(MockFeed::Social)
    }
}

/// Parse one feed body into mention signals. Items without a date are stamped
/// with the window end; items dated outside the window are dropped.
pub fn parse_feed(xml: &str, feed: &str, window: &CollectionWindow) -> Result<Vec<Signal>> {
    let t0 = std::time::Instant::now();
    let xml_clean = scrub_html_entities_for_xml(xml);
    let rss: Rss = from_str(&xml_clean).context("parsing rss xml")?;

    let mut out = Vec::new();
    for it in rss.channel.item.into_iter().take(MAX_ITEMS_PER_FEED) {
        let published = it
            .pub_date
            .as_deref()
            .and_then(parse_rfc2822)
            .unwrap_or(window.end);
        if !window.contains(published) {
            continue;
        }

        let title = clean_text(it.title.as_deref().unwrap_or_default());
        let body = clean_text(it.description.as_deref().unwrap_or_default());
        let text = format!("{title} {body}");

        for (topic, count) in extract_topic_mentions(&text) {
            out.push(
                Signal::new(SourceType::Social, "content_mentions", count as f64, published)
                    .with_meta("source", "rss")
                    .with_meta("topic", topic)
                    .with_meta("feed", feed)
                    .with_meta("title", title.as_str()),
            );
        }
    }

    histogram!("source_fetch_ms", "source" => "rss").record(t0.elapsed().as_secs_f64() * 1_000.0);
    Ok(out)
}

/// Number of distinct vocabulary words present per topic; zero-hit topics are
/// omitted. Output follows vocabulary order.
pub fn extract_topic_mentions(text: &str) -> Vec<(&'static str, usize)> {
    let lower = text.to_lowercase();
    TOPIC_VOCABULARY
        .iter()
        .filter_map(|(topic, words)| {
            let count = words.iter().filter(|w| lower.contains(*w)).count();
            (count > 0).then_some((*topic, count))
        })
        .collect()
}

/// Decode entities, drop tags, collapse whitespace.
fn clean_text(s: &str) -> String {
    static RE_TAGS: OnceCell<Regex> = OnceCell::new();
    static RE_WS: OnceCell<Regex> = OnceCell::new();
    let re_tags = RE_TAGS.get_or_init(|| Regex::new(r"(?is)</?[^>]+>").expect("tag regex"));
    let re_ws = RE_WS.get_or_init(|| Regex::new(r"\s+").expect("whitespace regex"));

    let decoded = html_escape::decode_html_entities(s);
    let stripped = re_tags.replace_all(&decoded, " ");
    re_ws.replace_all(&stripped, " ").trim().to_string()
}

/// quick-xml only knows the XML entities; feeds routinely use HTML ones.
fn scrub_html_entities_for_xml(s: &str) -> String {
    s.replace("&nbsp;", " ")
        .replace("&ndash;", "-")
        .replace("&mdash;", "-")
        .replace("&ldquo;", "\"")
        .replace("&rdquo;", "\"")
        .replace("&lsquo;", "'")
        .replace("&rsquo;", "'")
        .replace("&hellip;", "...")
}
