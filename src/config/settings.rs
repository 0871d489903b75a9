use crate::pipeline::topics::default_topics;
use crate::utils::mask_secret;
use log::{info, warn};
use std::env;
use std::str::FromStr;

#[derive(Debug, Clone)]
pub struct Config {
    pub news_api_key: Option<String>,
    pub news_api_base_url: String,
    pub gnews_api_key: Option<String>,
    pub gnews_base_url: String,
    pub google_news_base_url: String,
    pub openai_api_key: Option<String>,
    pub openai_base_url: String,
    pub openai_model: String,
    pub neo4j_uri: String,
    pub neo4j_username: String,
    pub neo4j_password: Option<String>,
    pub neo4j_database: String,
    pub redis_url: Option<String>,
    pub schedule_hour: u32,
    pub schedule_minute: u32,
    pub schedule_utc_offset_hours: i32,
    pub max_articles: usize,
    pub provider_timeout_secs: u64,
    pub generation_cache_ttl_secs: u64,
    pub notification_retention_days: i64,
    pub startup_connect_attempts: u32,
    pub startup_connect_delay_ms: u64,
    pub topics: Vec<String>,
    pub log_level: String,
}

/// Non-empty value of `key`, if any.
fn optional_var(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn var_or(key: &str, default: &str) -> String {
    optional_var(key).unwrap_or_else(|| default.to_string())
}

fn parsed_or<T: FromStr>(key: &str, default: T) -> T {
    match optional_var(key) {
        Some(raw) => raw.parse().unwrap_or_else(|_| {
            warn!("Ignoring unparsable {}={:?}, using default", key, raw);
            default
        }),
        None => default,
    }
}

fn describe_secret(secret: &Option<String>) -> String {
    secret
        .as_deref()
        .map(mask_secret)
        .unwrap_or_else(|| "<unset>".to_string())
}

impl Config {
    pub fn from_env() -> Self {
        let topics = optional_var("NEWS_TOPICS")
            .map(|raw| {
                raw.split(',')
                    .map(|t| t.trim().to_string())
                    .filter(|t| !t.is_empty())
                    .collect()
            })
            .unwrap_or_else(default_topics);

        Config {
            news_api_key: optional_var("NEWS_API_KEY"),
            news_api_base_url: var_or("NEWS_API_BASE_URL", "https://newsapi.org"),
            gnews_api_key: optional_var("GNEWS_API_KEY"),
            gnews_base_url: var_or("GNEWS_BASE_URL", "https://gnews.io/api"),
            google_news_base_url: var_or("GOOGLE_NEWS_BASE_URL", "https://news.google.com"),
            openai_api_key: optional_var("OPENAI_API_KEY"),
            openai_base_url: var_or("OPENAI_BASE_URL", "https://api.openai.com/v1"),
            openai_model: var_or("OPENAI_MODEL", "gpt-4o-mini"),
            neo4j_uri: var_or("NEO4J_URI", "http://localhost:7474"),
            neo4j_username: var_or("NEO4J_USERNAME", "neo4j"),
            neo4j_password: optional_var("NEO4J_PASSWORD"),
            neo4j_database: var_or("NEO4J_DATABASE", "neo4j"),
            redis_url: optional_var("REDIS_URL"),
            schedule_hour: parsed_or("SCHEDULE_HOUR", 3),
            schedule_minute: parsed_or("SCHEDULE_MINUTE", 0),
            schedule_utc_offset_hours: parsed_or("SCHEDULE_UTC_OFFSET_HOURS", 8),
            max_articles: parsed_or("MAX_ARTICLES", 10),
            provider_timeout_secs: parsed_or("PROVIDER_TIMEOUT_SECS", 15),
            generation_cache_ttl_secs: parsed_or("GENERATION_CACHE_TTL_SECS", 6 * 60 * 60),
            notification_retention_days: parsed_or("NOTIFICATION_RETENTION_DAYS", 30),
            startup_connect_attempts: parsed_or("STARTUP_CONNECT_ATTEMPTS", 3),
            startup_connect_delay_ms: parsed_or("STARTUP_CONNECT_DELAY_MS", 2000),
            topics,
            log_level: var_or("LOG_LEVEL", "info"),
        }
    }

    /// Offline configuration: no credentials, every URL on localhost.
    pub fn test_default() -> Self {
        Config {
            news_api_key: None,
            news_api_base_url: "http://127.0.0.1:1".to_string(),
            gnews_api_key: None,
            gnews_base_url: "http://127.0.0.1:1".to_string(),
            google_news_base_url: "http://127.0.0.1:1".to_string(),
            openai_api_key: None,
            openai_base_url: "http://127.0.0.1:1/v1".to_string(),
            openai_model: "test-model".to_string(),
            neo4j_uri: "http://127.0.0.1:1".to_string(),
            neo4j_username: "neo4j".to_string(),
            neo4j_password: None,
            neo4j_database: "neo4j".to_string(),
            redis_url: None,
            schedule_hour: 3,
            schedule_minute: 0,
            schedule_utc_offset_hours: 8,
            max_articles: 5,
            provider_timeout_secs: 2,
            generation_cache_ttl_secs: 60,
            notification_retention_days: 30,
            startup_connect_attempts: 1,
            startup_connect_delay_ms: 0,
            topics: vec!["testing".to_string()],
            log_level: "debug".to_string(),
        }
    }

    /// Range checks that `from_env` cannot express through defaults alone.
    pub fn validate(&self) -> Result<(), String> {
        if self.schedule_hour > 23 {
            return Err(format!("SCHEDULE_HOUR must be 0-23, got {}", self.schedule_hour));
        }
        if self.schedule_minute > 59 {
            return Err(format!("SCHEDULE_MINUTE must be 0-59, got {}", self.schedule_minute));
        }
        if !(-12..=14).contains(&self.schedule_utc_offset_hours) {
            return Err(format!(
                "SCHEDULE_UTC_OFFSET_HOURS must be -12..=14, got {}",
                self.schedule_utc_offset_hours
            ));
        }
        if self.topics.is_empty() {
            return Err("NEWS_TOPICS resolved to an empty list".to_string());
        }
        if self.max_articles == 0 {
            return Err("MAX_ARTICLES must be at least 1".to_string());
        }
        Ok(())
    }

    pub fn validate_and_log(&self) {
        info!("--- Effective configuration ---");
        info!("News API key: {}", describe_secret(&self.news_api_key));
        info!("GNews API key: {}", describe_secret(&self.gnews_api_key));
        info!("Google News feed: {}", self.google_news_base_url);
        info!("Generation: {} ({})", self.openai_base_url, self.openai_model);
        info!("Generation API key: {}", describe_secret(&self.openai_api_key));
        info!("Graph database: {} db={} user={}", self.neo4j_uri, self.neo4j_database, self.neo4j_username);
        info!("Graph database password: {}", describe_secret(&self.neo4j_password));
        info!(
            "Cache backend: {}",
            self.redis_url.as_deref().unwrap_or("in-memory")
        );
        info!(
            "Schedule: daily at {:02}:{:02} UTC{:+}",
            self.schedule_hour, self.schedule_minute, self.schedule_utc_offset_hours
        );
        info!(
            "Max articles: {} | provider timeout: {}s | {} topics",
            self.max_articles,
            self.provider_timeout_secs,
            self.topics.len()
        );

        if self.news_api_key.is_none() {
            warn!("NEWS_API_KEY not set: NewsAPI tier disabled");
        }
        if self.gnews_api_key.is_none() {
            warn!("GNEWS_API_KEY not set: GNews tier disabled");
        }
        if self.openai_api_key.is_none() {
            warn!("OPENAI_API_KEY not set: generation will fail when a job runs");
        }
        if self.neo4j_password.is_none() {
            warn!("NEO4J_PASSWORD not set: persistence will fail when a job runs");
        }
    }
}
