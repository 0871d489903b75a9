//! OpenAI-compatible chat-completions client producing [`GeneratedContent`].

use super::{ContentGenerator, GeneratedContent};
use crate::cache::{get_or_compute, CacheStore};
use crate::config::Config;
use crate::error::NewsroomError;
use crate::news::NewsArticle;
use crate::utils::truncate_chars;
use async_trait::async_trait;
use chrono::Utc;
use log::{debug, info};
use reqwest::{header, Client};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt::Write as _;
use std::sync::Arc;
use uuid::Uuid;

pub const GENERATION_CACHE_PREFIX: &str = "generation:response:";

/// Per-article excerpt length in the prompt.
const EXCERPT_CHARS: usize = 600;

const SYSTEM_PROMPT: &str = "You are a journalist writing clear, educational articles for a general \
audience. Synthesize the provided news into one original article. Reply with a single JSON object \
with the fields \"title\" (string), \"summary\" (two or three sentences), \"body\" (the article, \
plain text paragraphs) and \"keyPoints\" (array of short strings).";

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    temperature: f32,
    response_format: ResponseFormat,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: &'static str,
    content: String,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    format_type: &'static str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: MessageResponse,
}

#[derive(Debug, Deserialize)]
struct MessageResponse {
    content: Option<String>,
}

/// The structured part of a model reply; this is what gets cached.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Draft {
    title: String,
    #[serde(default)]
    summary: String,
    body: String,
    #[serde(default)]
    key_points: Vec<String>,
}

pub struct OpenAiGenerator {
    client: Client,
    base_url: String,
    model: String,
    api_key: Option<String>,
    cache: Arc<dyn CacheStore>,
    cache_ttl_secs: u64,
}

impl OpenAiGenerator {
    pub fn new(
        client: Client,
        base_url: &str,
        model: &str,
        api_key: Option<String>,
        cache: Arc<dyn CacheStore>,
        cache_ttl_secs: u64,
    ) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            api_key,
            cache,
            cache_ttl_secs,
        }
    }

    pub fn from_config(config: &Config, client: Client, cache: Arc<dyn CacheStore>) -> Self {
        Self::new(
            client,
            &config.openai_base_url,
            &config.openai_model,
            config.openai_api_key.clone(),
            cache,
            config.generation_cache_ttl_secs,
        )
    }

    fn chat_completions_url(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }

    /// Same topic, model and source URLs give the same key.
    pub fn cache_key(&self, topic: &str, articles: &[NewsArticle]) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.model.as_bytes());
        hasher.update(b"\n");
        hasher.update(topic.as_bytes());
        for article in articles {
            hasher.update(b"\n");
            hasher.update(article.url.as_bytes());
        }
        let digest = hasher.finalize();
        format!("{}{}", GENERATION_CACHE_PREFIX, hex::encode(&digest[..16]))
    }

    async fn request_draft(
        &self,
        api_key: &str,
        topic: &str,
        articles: &[NewsArticle],
    ) -> Result<Draft, NewsroomError> {
        let request = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: SYSTEM_PROMPT.to_string(),
                },
                ChatMessage {
                    role: "user",
                    content: build_prompt(topic, articles),
                },
            ],
            temperature: 0.7,
            response_format: ResponseFormat {
                format_type: "json_object",
            },
        };

        debug!("Requesting generation for '{}' from {}", topic, self.model);
        let response = self
            .client
            .post(self.chat_completions_url())
            .header(header::AUTHORIZATION, format!("Bearer {}", api_key))
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(NewsroomError::GenerationError(format!(
                "HTTP {}: {}",
                status,
                truncate_chars(&body, 300)
            )));
        }

        let chat: ChatResponse = response.json().await?;
        let reply = chat
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| NewsroomError::GenerationError("Empty completion".to_string()))?;
        parse_draft(&reply)
    }
}

fn parse_draft(reply: &str) -> Result<Draft, NewsroomError> {
    let draft: Draft = serde_json::from_str(reply).map_err(|e| {
        NewsroomError::GenerationError(format!("Reply is not the expected JSON object: {}", e))
    })?;
    if draft.title.trim().is_empty() || draft.body.trim().is_empty() {
        return Err(NewsroomError::GenerationError(
            "Reply is missing a title or body".to_string(),
        ));
    }
    Ok(draft)
}

fn build_prompt(topic: &str, articles: &[NewsArticle]) -> String {
    let mut prompt = format!("Topic: {}\n", topic);
    if articles.is_empty() {
        prompt.push_str("\nNo recent news was found. Write from general knowledge of the topic.\n");
        return prompt;
    }

    prompt.push_str("\nSource articles:\n");
    for (i, article) in articles.iter().enumerate() {
        let _ = writeln!(prompt, "{}. {} ({})", i + 1, article.title, article.source);
        let excerpt = article
            .content
            .as_deref()
            .or(article.description.as_deref())
            .unwrap_or_default();
        if !excerpt.is_empty() {
            let _ = writeln!(prompt, "   {}", truncate_chars(excerpt, EXCERPT_CHARS));
        }
        if !article.url.is_empty() {
            let _ = writeln!(prompt, "   {}", article.url);
        }
    }
    prompt
}

#[async_trait]
impl ContentGenerator for OpenAiGenerator {
    async fn generate(
        &self,
        topic: &str,
        articles: &[NewsArticle],
    ) -> Result<GeneratedContent, NewsroomError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| NewsroomError::ConfigError("OPENAI_API_KEY is not set".into()))?;

        let key = self.cache_key(topic, articles);
        let draft: Draft = get_or_compute(self.cache.as_ref(), &key, self.cache_ttl_secs, || {
            self.request_draft(api_key, topic, articles)
        })
        .await?;
        info!("✍️ Generated '{}' for topic '{}'", draft.title, topic);

        Ok(GeneratedContent {
            id: Uuid::new_v4(),
            topic: topic.to_string(),
            title: draft.title,
            summary: draft.summary,
            body: draft.body,
            key_points: draft.key_points,
            sources: articles
                .iter()
                .filter(|a| !a.url.is_empty())
                .map(|a| a.url.clone())
                .collect(),
            generated_at: Utc::now(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCache;

    fn article(url: &str) -> NewsArticle {
        NewsArticle {
            title: "Solar record".to_string(),
            description: Some("Panels outperform forecasts.".to_string()),
            content: None,
            url: url.to_string(),
            source: "Example Wire".to_string(),
            published_at: "2024-03-05T00:00:00Z".to_string(),
            author: None,
        }
    }

    fn generator(api_key: Option<&str>) -> OpenAiGenerator {
        OpenAiGenerator::new(
            Client::new(),
            "http://127.0.0.1:1/v1/",
            "test-model",
            api_key.map(str::to_string),
            Arc::new(MemoryCache::new()),
            60,
        )
    }

    #[test]
    fn test_cache_key_depends_on_sources() {
        let g = generator(Some("k"));
        let a = g.cache_key("energy", &[article("https://a")]);
        let b = g.cache_key("energy", &[article("https://b")]);
        assert!(a.starts_with(GENERATION_CACHE_PREFIX));
        assert_eq!(a.len(), GENERATION_CACHE_PREFIX.len() + 32);
        assert_ne!(a, b);
        assert_eq!(a, g.cache_key("energy", &[article("https://a")]));
    }

    #[test]
    fn test_prompt_lists_sources() {
        let prompt = build_prompt("energy", &[article("https://a")]);
        assert!(prompt.contains("1. Solar record (Example Wire)"));
        assert!(prompt.contains("Panels outperform forecasts."));
        assert!(prompt.contains("https://a"));

        let bare = build_prompt("energy", &[]);
        assert!(bare.contains("No recent news was found"));
    }

    #[test]
    fn test_parse_draft_requires_title_and_body() {
        let draft = parse_draft(r#"{"title":"T","body":"B","keyPoints":["x"]}"#).unwrap();
        assert_eq!(draft.key_points, vec!["x".to_string()]);
        assert_eq!(draft.summary, "");
        assert!(parse_draft(r#"{"title":"","body":"B"}"#).is_err());
        assert!(parse_draft("not json").is_err());
    }

    #[tokio::test]
    async fn test_missing_api_key_is_config_error() {
        let result = generator(None).generate("energy", &[]).await;
        assert!(matches!(result, Err(NewsroomError::ConfigError(_))));
    }

    #[tokio::test]
    async fn test_cached_reply_skips_request() {
        let cache = Arc::new(MemoryCache::new());
        let g = OpenAiGenerator::new(
            Client::new(),
            "http://127.0.0.1:1/v1",
            "test-model",
            Some("k".to_string()),
            cache.clone(),
            60,
        );
        let articles = [article("https://a")];
        let cached = r#"{"title":"Cached","summary":"S","body":"Body","keyPoints":[]}"#;
        cache
            .set_with_ttl(&g.cache_key("energy", &articles), 60, cached)
            .await
            .unwrap();

        // The endpoint is unreachable, so only a cache hit can succeed.
        let content = g.generate("energy", &articles).await.unwrap();
        assert_eq!(content.title, "Cached");
        assert_eq!(content.sources, vec!["https://a".to_string()]);
    }
}
