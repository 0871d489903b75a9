// src/news/google_rss.rs
//! Keyless fallback: the Google News RSS search feed.

use super::{fetch_timestamp, NewsArticle, NewsFetchResult, NewsProvider};
use crate::error::NewsroomError;
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use log::{debug, warn};
use quick_xml::events::Event;
use quick_xml::Reader;
use reqwest::Client;
use url::Url;

const DEFAULT_SOURCE: &str = "Google News";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    Title,
    Link,
    PubDate,
    Source,
}

#[derive(Debug, Default)]
struct FeedItem {
    title: String,
    link: String,
    pub_date: String,
    source: String,
}

impl FeedItem {
    fn push(&mut self, field: Field, text: &str) {
        let target = match field {
            Field::Title => &mut self.title,
            Field::Link => &mut self.link,
            Field::PubDate => &mut self.pub_date,
            Field::Source => &mut self.source,
        };
        target.push_str(text);
    }

    /// `None` when the item has neither a title nor a link.
    fn into_article(self) -> Option<NewsArticle> {
        let title = self.title.trim().to_string();
        let url = self.link.trim().to_string();
        if title.is_empty() && url.is_empty() {
            return None;
        }
        let source = match self.source.trim() {
            "" => DEFAULT_SOURCE.to_string(),
            name => name.to_string(),
        };
        let published_at = DateTime::parse_from_rfc2822(self.pub_date.trim())
            .map(|dt| dt.with_timezone(&Utc).to_rfc3339_opts(SecondsFormat::Secs, true))
            .unwrap_or_else(|_| fetch_timestamp());

        Some(NewsArticle {
            title,
            description: None,
            content: None,
            url,
            source,
            published_at,
            author: None,
        })
    }
}

fn field_for(tag: &[u8]) -> Option<Field> {
    match tag {
        b"title" => Some(Field::Title),
        b"link" => Some(Field::Link),
        b"pubDate" => Some(Field::PubDate),
        b"source" => Some(Field::Source),
        _ => None,
    }
}

/// Extracts up to `max_articles` items in document order.
///
/// Parsing is best effort: malformed XML ends the scan and whatever was
/// collected before the error is returned.
pub fn parse_feed(xml: &str, max_articles: usize) -> Vec<NewsArticle> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);

    let mut articles = Vec::new();
    let mut current: Option<FeedItem> = None;
    let mut field: Option<Field> = None;

    while articles.len() < max_articles {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                let name = e.local_name();
                if name.as_ref() == b"item" {
                    current = Some(FeedItem::default());
                    field = None;
                } else if current.is_some() {
                    field = field_for(name.as_ref());
                }
            }
            Ok(Event::Text(t)) => {
                if let (Some(item), Some(f)) = (current.as_mut(), field) {
                    let text = t
                        .unescape()
                        .map(|s| s.into_owned())
                        .unwrap_or_else(|_| String::from_utf8_lossy(&t).into_owned());
                    item.push(f, &text);
                }
            }
            Ok(Event::CData(c)) => {
                if let (Some(item), Some(f)) = (current.as_mut(), field) {
                    item.push(f, &String::from_utf8_lossy(&c.into_inner()));
                }
            }
            Ok(Event::End(e)) => {
                let name = e.local_name();
                if name.as_ref() == b"item" {
                    if let Some(article) = current.take().and_then(FeedItem::into_article) {
                        articles.push(article);
                    } else {
                        debug!("Skipping feed item without title or link");
                    }
                    field = None;
                } else if field_for(name.as_ref()).is_some() {
                    field = None;
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                warn!(
                    "Feed parse stopped at byte {}: {} ({} items kept)",
                    reader.buffer_position(),
                    e,
                    articles.len()
                );
                break;
            }
            _ => {}
        }
    }

    articles
}

pub struct GoogleNewsRssProvider {
    client: Client,
    base_url: String,
}

impl GoogleNewsRssProvider {
    pub fn new(client: Client, base_url: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    fn request_url(&self, topic: &str) -> Result<Url, NewsroomError> {
        Url::parse_with_params(
            &format!("{}/rss/search", self.base_url),
            &[("q", topic), ("hl", "en-US"), ("gl", "US"), ("ceid", "US:en")],
        )
        .map_err(|e| NewsroomError::ConfigError(format!("Invalid Google News base URL: {}", e)))
    }
}

#[async_trait]
impl NewsProvider for GoogleNewsRssProvider {
    fn name(&self) -> &str {
        "Google News RSS"
    }

    fn is_configured(&self) -> bool {
        true
    }

    async fn fetch(&self, topic: &str, max_articles: usize) -> Result<NewsFetchResult, NewsroomError> {
        let response = self.client.get(self.request_url(topic)?).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(NewsroomError::ProviderError(format!(
                "Google News feed returned HTTP {}",
                status
            )));
        }
        let body = response.text().await?;
        let articles = parse_feed(&body, max_articles);
        Ok(NewsFetchResult {
            total_results: articles.len() as u64,
            articles,
            query: topic.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const FEED: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0"><channel>
  <title>"rust" - Google News</title>
  <item>
    <title><![CDATA[Rust 2.0 announced & celebrated]]></title>
    <link>https://news.example.com/a</link>
    <pubDate>Tue, 05 Mar 2024 14:30:00 GMT</pubDate>
    <source url="https://example.com">Example Times</source>
  </item>
  <item>
    <title>Borrow checker explained</title>
    <link>https://news.example.com/b</link>
    <pubDate>Wed, 06 Mar 2024 09:00:00 GMT</pubDate>
  </item>
  <item>
    <title>Third story</title>
    <link>https://news.example.com/c</link>
  </item>
</channel></rss>"#;

    #[test]
    fn test_stops_at_max_articles_in_document_order() {
        let articles = parse_feed(FEED, 2);
        assert_eq!(articles.len(), 2);
        assert_eq!(articles[0].title, "Rust 2.0 announced & celebrated");
        assert_eq!(articles[0].url, "https://news.example.com/a");
        assert_eq!(articles[0].source, "Example Times");
        assert_eq!(articles[0].published_at, "2024-03-05T14:30:00Z");
        assert_eq!(articles[1].title, "Borrow checker explained");
        assert_eq!(articles[1].source, "Google News");
    }

    #[test]
    fn test_skipped_items_do_not_count() {
        let feed = r#"<rss><channel>
            <item><pubDate>Tue, 05 Mar 2024 14:30:00 GMT</pubDate></item>
            <item><title>Only title</title></item>
            <item><link>https://only.link</link></item>
        </channel></rss>"#;
        let articles = parse_feed(feed, 2);
        assert_eq!(articles.len(), 2);
        assert_eq!(articles[0].title, "Only title");
        assert_eq!(articles[0].url, "");
        assert_eq!(articles[1].url, "https://only.link");
    }

    #[test]
    fn test_escaped_text_is_unescaped() {
        let feed = "<rss><channel><item><title>Fish &amp; Chips</title><link>https://x</link></item></channel></rss>";
        assert_eq!(parse_feed(feed, 5)[0].title, "Fish & Chips");
    }

    #[test]
    fn test_malformed_feed_keeps_collected_items() {
        let feed = "<rss><channel><item><title>Good</title><link>https://g</link></item><item><title>Bad</wrong>";
        let articles = parse_feed(feed, 5);
        assert_eq!(articles.len(), 1);
        assert_eq!(articles[0].title, "Good");
    }

    #[test]
    fn test_unparsable_date_defaults_to_now() {
        let feed = "<rss><item><title>T</title><pubDate>yesterday-ish</pubDate></item></rss>";
        let article = &parse_feed(feed, 1)[0];
        assert!(DateTime::parse_from_rfc3339(&article.published_at).is_ok());
    }

    #[test]
    fn test_request_url() {
        let provider = GoogleNewsRssProvider::new(Client::new(), "https://news.google.com");
        let url = provider.request_url("space exploration").unwrap();
        assert_eq!(url.path(), "/rss/search");
        assert_eq!(url.query(), Some("q=space+exploration&hl=en-US&gl=US&ceid=US%3Aen"));
    }
}
