//! Secondary provider: GNews `/v4/search`.

use super::{fetch_timestamp, NewsArticle, NewsFetchResult, NewsProvider};
use crate::error::NewsroomError;
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use url::Url;

const UNKNOWN_SOURCE: &str = "Unknown";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchResponse {
    /// Presence of this field is GNews' success signal.
    articles: Option<Vec<RawArticle>>,
    total_articles: Option<u64>,
    #[serde(default)]
    errors: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawArticle {
    title: Option<String>,
    description: Option<String>,
    content: Option<String>,
    url: Option<String>,
    published_at: Option<String>,
    source: Option<RawSource>,
}

#[derive(Debug, Deserialize)]
struct RawSource {
    name: Option<String>,
}

impl From<RawArticle> for NewsArticle {
    fn from(raw: RawArticle) -> Self {
        NewsArticle {
            title: raw.title.unwrap_or_default(),
            description: raw.description,
            content: raw.content,
            url: raw.url.unwrap_or_default(),
            source: raw
                .source
                .and_then(|s| s.name)
                .unwrap_or_else(|| UNKNOWN_SOURCE.to_string()),
            published_at: raw.published_at.unwrap_or_else(fetch_timestamp),
            author: None,
        }
    }
}

pub struct GNewsProvider {
    client: Client,
    base_url: String,
    api_key: Option<String>,
}

impl GNewsProvider {
    pub fn new(client: Client, base_url: &str, api_key: Option<String>) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
        }
    }

    fn request_url(&self, topic: &str, max_articles: usize, api_key: &str) -> Result<Url, NewsroomError> {
        let max = max_articles.to_string();
        Url::parse_with_params(
            &format!("{}/v4/search", self.base_url),
            &[("q", topic), ("max", max.as_str()), ("apikey", api_key)],
        )
        .map_err(|e| NewsroomError::ConfigError(format!("Invalid GNews base URL: {}", e)))
    }
}

#[async_trait]
impl NewsProvider for GNewsProvider {
    fn name(&self) -> &str {
        "GNews"
    }

    fn is_configured(&self) -> bool {
        self.api_key.as_deref().map_or(false, |k| !k.is_empty())
    }

    async fn fetch(&self, topic: &str, max_articles: usize) -> Result<NewsFetchResult, NewsroomError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| NewsroomError::ConfigError("GNEWS_API_KEY is not set".into()))?;
        let url = self.request_url(topic, max_articles, api_key)?;

        let body: SearchResponse = self.client.get(url).send().await?.json().await?;
        let raw_articles = match body.articles {
            Some(articles) => articles,
            None => {
                return Err(NewsroomError::ProviderError(format!(
                    "GNews response without articles: {}",
                    body.errors.map(|e| e.to_string()).unwrap_or_default()
                )))
            }
        };

        let articles: Vec<NewsArticle> = raw_articles.into_iter().map(NewsArticle::from).collect();
        Ok(NewsFetchResult {
            total_results: body.total_articles.unwrap_or(articles.len() as u64),
            articles,
            query: topic.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_url() {
        let provider = GNewsProvider::new(Client::new(), "https://gnews.io/api", Some("k".into()));
        let url = provider.request_url("climate", 3, "k").unwrap();
        assert_eq!(url.path(), "/api/v4/search");
        assert_eq!(url.query(), Some("q=climate&max=3&apikey=k"));
    }

    #[test]
    fn test_normalizes_source_and_author() {
        let raw: RawArticle = serde_json::from_str(
            r#"{"title": "T", "url": "https://x", "publishedAt": "2024-01-01T00:00:00Z"}"#,
        )
        .unwrap();
        let article = NewsArticle::from(raw);
        assert_eq!(article.source, "Unknown");
        assert_eq!(article.published_at, "2024-01-01T00:00:00Z");
        assert!(article.author.is_none());
    }
}
