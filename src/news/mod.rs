// src/news/mod.rs
//! News acquisition: provider clients, the fallback chain over them and the
//! full-page content fetcher.

pub mod content;
pub mod gnews;
pub mod google_rss;
pub mod newsapi;

pub use content::{fetch_full_content, FullContent};
pub use gnews::GNewsProvider;
pub use google_rss::GoogleNewsRssProvider;
pub use newsapi::NewsApiProvider;

use crate::config::Config;
use crate::error::NewsroomError;
use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use log::{debug, info, warn};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

const USER_AGENT: &str = concat!("newsroom/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewsArticle {
    pub title: String,
    pub description: Option<String>,
    pub content: Option<String>,
    pub url: String,
    pub source: String,
    /// RFC 3339.
    pub published_at: String,
    pub author: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewsFetchResult {
    pub articles: Vec<NewsArticle>,
    pub total_results: u64,
    pub query: String,
}

impl NewsFetchResult {
    pub fn empty(query: &str) -> Self {
        Self {
            articles: Vec::new(),
            total_results: 0,
            query: query.to_string(),
        }
    }
}

/// Current time in the format stored in `NewsArticle::published_at`.
pub(crate) fn fetch_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Shared HTTP client for provider and page requests.
pub fn build_http_client(timeout: Duration) -> Result<Client, NewsroomError> {
    Client::builder()
        .user_agent(USER_AGENT)
        .timeout(timeout)
        .build()
        .map_err(|e| NewsroomError::ConfigError(format!("Failed to build HTTP client: {}", e)))
}

/// One source of articles.
///
/// `fetch` returns `Ok` only on the provider's structural success signal; an
/// `Ok` with zero articles still ends the chain.
#[async_trait]
pub trait NewsProvider: Send + Sync {
    fn name(&self) -> &str;

    /// False when the provider's credential is missing.
    fn is_configured(&self) -> bool;

    async fn fetch(&self, topic: &str, max_articles: usize) -> Result<NewsFetchResult, NewsroomError>;
}

/// Tries providers strictly in priority order, never concurrently.
pub struct FetchChain {
    providers: Vec<Arc<dyn NewsProvider>>,
    provider_timeout: Duration,
}

impl FetchChain {
    pub fn new(providers: Vec<Arc<dyn NewsProvider>>, provider_timeout: Duration) -> Self {
        Self {
            providers,
            provider_timeout,
        }
    }

    /// NewsAPI, then GNews, then the Google News feed.
    pub fn from_config(config: &Config, client: Client) -> Self {
        let providers: Vec<Arc<dyn NewsProvider>> = vec![
            Arc::new(NewsApiProvider::new(
                client.clone(),
                &config.news_api_base_url,
                config.news_api_key.clone(),
            )),
            Arc::new(GNewsProvider::new(
                client.clone(),
                &config.gnews_base_url,
                config.gnews_api_key.clone(),
            )),
            Arc::new(GoogleNewsRssProvider::new(client, &config.google_news_base_url)),
        ];
        Self::new(providers, Duration::from_secs(config.provider_timeout_secs))
    }

    pub fn provider_names(&self) -> Vec<&str> {
        self.providers.iter().map(|p| p.name()).collect()
    }

    /// Never fails: exhausting every provider yields the empty result.
    pub async fn fetch_articles(&self, topic: &str, max_articles: usize) -> NewsFetchResult {
        for provider in &self.providers {
            if !provider.is_configured() {
                debug!("Skipping {}: no credential configured", provider.name());
                continue;
            }

            debug!("Fetching '{}' from {}", topic, provider.name());
            match tokio::time::timeout(self.provider_timeout, provider.fetch(topic, max_articles)).await
            {
                Ok(Ok(result)) => {
                    info!(
                        "📰 {} returned {} articles for '{}'",
                        provider.name(),
                        result.articles.len(),
                        topic
                    );
                    return result;
                }
                Ok(Err(e)) => {
                    warn!("{} failed for '{}': {}", provider.name(), topic, e);
                }
                Err(_) => {
                    warn!(
                        "{} timed out after {:?} for '{}'",
                        provider.name(),
                        self.provider_timeout,
                        topic
                    );
                }
            }
        }

        warn!("All news providers failed for '{}'", topic);
        NewsFetchResult::empty(topic)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    enum Behaviour {
        Succeed(usize),
        Fail,
        Hang,
    }

    struct StubProvider {
        name: String,
        configured: bool,
        behaviour: Behaviour,
        calls: AtomicUsize,
    }

    impl StubProvider {
        fn new(name: &str, configured: bool, behaviour: Behaviour) -> Arc<Self> {
            Arc::new(Self {
                name: name.to_string(),
                configured,
                behaviour,
                calls: AtomicUsize::new(0),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl NewsProvider for StubProvider {
        fn name(&self) -> &str {
            &self.name
        }

        fn is_configured(&self) -> bool {
            self.configured
        }

        async fn fetch(&self, topic: &str, _max: usize) -> Result<NewsFetchResult, NewsroomError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.behaviour {
                Behaviour::Succeed(count) => Ok(NewsFetchResult {
                    articles: (0..count)
                        .map(|i| NewsArticle {
                            title: format!("{} #{}", self.name, i),
                            description: None,
                            content: None,
                            url: format!("https://example.com/{}/{}", self.name, i),
                            source: self.name.clone(),
                            published_at: fetch_timestamp(),
                            author: None,
                        })
                        .collect(),
                    total_results: count as u64,
                    query: topic.to_string(),
                }),
                Behaviour::Fail => Err(NewsroomError::ProviderError("boom".into())),
                Behaviour::Hang => {
                    tokio::time::sleep(Duration::from_secs(3600)).await;
                    Err(NewsroomError::Unknown("unreachable".into()))
                }
            }
        }
    }

    fn chain(providers: Vec<Arc<StubProvider>>) -> FetchChain {
        FetchChain::new(
            providers
                .into_iter()
                .map(|p| p as Arc<dyn NewsProvider>)
                .collect(),
            Duration::from_secs(5),
        )
    }

    #[tokio::test]
    async fn test_first_success_wins() {
        let a = StubProvider::new("a", true, Behaviour::Fail);
        let b = StubProvider::new("b", true, Behaviour::Succeed(2));
        let c = StubProvider::new("c", true, Behaviour::Succeed(5));
        let result = chain(vec![a.clone(), b.clone(), c.clone()])
            .fetch_articles("rust", 5)
            .await;

        assert_eq!(result.articles.len(), 2);
        assert_eq!(result.articles[0].source, "b");
        assert_eq!((a.calls(), b.calls(), c.calls()), (1, 1, 0));
    }

    #[tokio::test]
    async fn test_empty_success_still_stops_chain() {
        let a = StubProvider::new("a", true, Behaviour::Succeed(0));
        let b = StubProvider::new("b", true, Behaviour::Succeed(3));
        let result = chain(vec![a, b.clone()]).fetch_articles("rust", 5).await;
        assert!(result.articles.is_empty());
        assert_eq!(b.calls(), 0);
    }

    #[tokio::test]
    async fn test_unconfigured_providers_are_skipped() {
        let a = StubProvider::new("a", false, Behaviour::Succeed(1));
        let b = StubProvider::new("b", true, Behaviour::Succeed(1));
        let result = chain(vec![a.clone(), b]).fetch_articles("rust", 5).await;
        assert_eq!(result.articles[0].source, "b");
        assert_eq!(a.calls(), 0);
    }

    #[tokio::test]
    async fn test_exhausted_chain_returns_empty_shape() {
        let a = StubProvider::new("a", true, Behaviour::Fail);
        let b = StubProvider::new("b", false, Behaviour::Succeed(1));
        let result = chain(vec![a, b]).fetch_articles("x", 5).await;
        assert_eq!(result, NewsFetchResult::empty("x"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_advances_to_next_provider() {
        let a = StubProvider::new("a", true, Behaviour::Hang);
        let b = StubProvider::new("b", true, Behaviour::Succeed(1));
        let result = chain(vec![a.clone(), b.clone()]).fetch_articles("rust", 5).await;
        assert_eq!(result.articles.len(), 1);
        assert_eq!((a.calls(), b.calls()), (1, 1));
    }
}
