//! Primary provider: NewsAPI `/v2/everything`.

use super::{fetch_timestamp, NewsArticle, NewsFetchResult, NewsProvider};
use crate::error::NewsroomError;
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use url::Url;

const UNKNOWN_SOURCE: &str = "Unknown";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EverythingResponse {
    status: String,
    #[serde(default)]
    total_results: Option<u64>,
    #[serde(default)]
    articles: Vec<RawArticle>,
    code: Option<String>,
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawArticle {
    source: Option<RawSource>,
    author: Option<String>,
    title: Option<String>,
    description: Option<String>,
    url: Option<String>,
    published_at: Option<String>,
    content: Option<String>,
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
            author: raw.author,
        }
    }
}

pub struct NewsApiProvider {
    client: Client,
    base_url: String,
    api_key: Option<String>,
}

impl NewsApiProvider {
    pub fn new(client: Client, base_url: &str, api_key: Option<String>) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
        }
    }

    fn request_url(&self, topic: &str, max_articles: usize, api_key: &str) -> Result<Url, NewsroomError> {
        let page_size = max_articles.to_string();
        Url::parse_with_params(
            &format!("{}/v2/everything", self.base_url),
            &[
                ("q", topic),
                ("sortBy", "publishedAt"),
                ("pageSize", page_size.as_str()),
                ("apiKey", api_key),
            ],
        )
        .map_err(|e| NewsroomError::ConfigError(format!("Invalid NewsAPI base URL: {}", e)))
    }
}

#[async_trait]
impl NewsProvider for NewsApiProvider {
    fn name(&self) -> &str {
        "NewsAPI"
    }

    fn is_configured(&self) -> bool {
        self.api_key.as_deref().map_or(false, |k| !k.is_empty())
    }

    async fn fetch(&self, topic: &str, max_articles: usize) -> Result<NewsFetchResult, NewsroomError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| NewsroomError::ConfigError("NEWS_API_KEY is not set".into()))?;
        let url = self.request_url(topic, max_articles, api_key)?;

        // Error payloads arrive with 4xx statuses and still carry `status`.
        let body: EverythingResponse = self.client.get(url).send().await?.json().await?;
        if body.status != "ok" {
            return Err(NewsroomError::ProviderError(format!(
                "NewsAPI status '{}' ({}): {}",
                body.status,
                body.code.unwrap_or_default(),
                body.message.unwrap_or_default()
            )));
        }

        let articles: Vec<NewsArticle> = body.articles.into_iter().map(NewsArticle::from).collect();
        Ok(NewsFetchResult {
            total_results: body.total_results.unwrap_or(articles.len() as u64),
            articles,
            query: topic.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalizes_missing_fields() {
        let raw: RawArticle = serde_json::from_str(r#"{"source": {"id": null}}"#).unwrap();
        let article = NewsArticle::from(raw);
        assert_eq!(article.title, "");
        assert_eq!(article.url, "");
        assert_eq!(article.source, "Unknown");
        assert!(article.content.is_none());
        assert!(!article.published_at.is_empty());
    }

    #[test]
    fn test_request_url_encodes_topic() {
        let provider = NewsApiProvider::new(Client::new(), "https://newsapi.org/", Some("k".into()));
        let url = provider.request_url("rust & go", 5, "k").unwrap();
        assert_eq!(url.path(), "/v2/everything");
        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        assert!(pairs.contains(&("q".into(), "rust & go".into())));
        assert!(pairs.contains(&("pageSize".into(), "5".into())));
        assert!(pairs.contains(&("sortBy".into(), "publishedAt".into())));
    }

    #[test]
    fn test_missing_key_is_unconfigured() {
        assert!(!NewsApiProvider::new(Client::new(), "https://newsapi.org", None).is_configured());
        assert!(!NewsApiProvider::new(Client::new(), "https://newsapi.org", Some(String::new())).is_configured());
    }
}
