// src/pipeline/mod.rs
//! The daily content job: topic → news → generated article → graph store,
//! followed by the notification retention sweep.

pub mod generator;
pub mod repository;
pub mod topics;

pub use generator::OpenAiGenerator;
pub use repository::{connect_with_retry, Neo4jRepository};

use crate::cache::{CleanupHistory, CleanupRecord};
use crate::config::Config;
use crate::error::NewsroomError;
use crate::news::{FetchChain, NewsArticle};
use crate::scheduler::ScheduledJob;
use crate::utils::timing::JobTimer;
use crate::utils::Clock;
use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use log::{error, info, warn};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// Runs slower than this are flagged in the stage breakdown.
const SLOW_RUN_THRESHOLD: Duration = Duration::from_secs(120);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratedContent {
    pub id: Uuid,
    pub topic: String,
    pub title: String,
    pub summary: String,
    pub body: String,
    pub key_points: Vec<String>,
    /// URLs of the articles the content was generated from.
    pub sources: Vec<String>,
    pub generated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobReport {
    pub topic: String,
    pub article_count: usize,
    pub content_id: Uuid,
    /// `None` when the retention sweep failed.
    pub purged: Option<u64>,
}

#[async_trait]
pub trait ContentGenerator: Send + Sync {
    /// `articles` may be empty; the topic alone is then the prompt.
    async fn generate(
        &self,
        topic: &str,
        articles: &[NewsArticle],
    ) -> Result<GeneratedContent, NewsroomError>;
}

#[async_trait]
pub trait ContentRepository: Send + Sync {
    async fn verify_connectivity(&self) -> Result<(), NewsroomError>;

    /// Stores the content, links it to its source articles and raises a
    /// notification for it.
    async fn save_content(
        &self,
        content: &GeneratedContent,
        articles: &[NewsArticle],
    ) -> Result<(), NewsroomError>;

    /// Deletes notifications created before `older_than`, returning how many
    /// were removed.
    async fn purge_stale_notifications(&self, older_than: DateTime<Utc>) -> Result<u64, NewsroomError>;

    async fn close(&self);
}

#[derive(Debug, Clone)]
pub struct JobSettings {
    pub topics: Vec<String>,
    pub max_articles: usize,
    pub retention_days: i64,
}

impl JobSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            topics: config.topics.clone(),
            max_articles: config.max_articles,
            retention_days: config.notification_retention_days,
        }
    }
}

pub struct ContentJob {
    chain: Arc<FetchChain>,
    generator: Arc<dyn ContentGenerator>,
    repository: Arc<dyn ContentRepository>,
    history: CleanupHistory,
    clock: Arc<dyn Clock>,
    settings: JobSettings,
}

impl ContentJob {
    pub fn new(
        chain: Arc<FetchChain>,
        generator: Arc<dyn ContentGenerator>,
        repository: Arc<dyn ContentRepository>,
        history: CleanupHistory,
        clock: Arc<dyn Clock>,
        settings: JobSettings,
    ) -> Self {
        Self {
            chain,
            generator,
            repository,
            history,
            clock,
            settings,
        }
    }

    fn pick_topic(&self) -> Result<String, NewsroomError> {
        let mut rng = rand::thread_rng();
        topics::pick_topic(&self.settings.topics, &mut rng)
            .map(str::to_string)
            .ok_or_else(|| NewsroomError::ConfigError("No topics configured".to_string()))
    }

    pub async fn run(&self) -> Result<JobReport, NewsroomError> {
        let mut timer = JobTimer::start("content job");
        let topic = self.pick_topic()?;
        info!("🗞️ Content job started for topic '{}'", topic);

        let fetched = self
            .chain
            .fetch_articles(&topic, self.settings.max_articles)
            .await;
        timer.checkpoint("fetch");
        if fetched.articles.is_empty() {
            warn!("No articles found for '{}', generating from the topic alone", topic);
        }

        let content = match self.generator.generate(&topic, &fetched.articles).await {
            Ok(content) => content,
            Err(e) => {
                error!("❌ Content generation failed for '{}': {}", topic, e);
                return Err(e);
            }
        };
        timer.checkpoint("generate");

        if let Err(e) = self.repository.save_content(&content, &fetched.articles).await {
            error!("❌ Saving content {} failed: {}", content.id, e);
            return Err(e);
        }
        timer.checkpoint("persist");
        info!("✅ Saved '{}' ({})", content.title, content.id);

        let purged = self.sweep_notifications().await;
        timer.checkpoint("sweep");
        timer.finish_with_threshold(SLOW_RUN_THRESHOLD);

        Ok(JobReport {
            topic,
            article_count: fetched.articles.len(),
            content_id: content.id,
            purged,
        })
    }

    /// Failures here never fail the job.
    async fn sweep_notifications(&self) -> Option<u64> {
        let cutoff = self.clock.now() - ChronoDuration::days(self.settings.retention_days);
        let deleted = match self.repository.purge_stale_notifications(cutoff).await {
            Ok(deleted) => deleted,
            Err(e) => {
                warn!("Notification sweep failed: {}", e);
                return None;
            }
        };
        info!("🧹 Purged {} notifications older than {}", deleted, cutoff);

        let record = CleanupRecord {
            timestamp: self.clock.now_millis(),
            deleted_count: deleted,
        };
        if let Err(e) = self.history.record(record).await {
            warn!("Could not record cleanup history: {}", e);
        }
        Some(deleted)
    }
}

#[async_trait]
impl ScheduledJob for ContentJob {
    fn name(&self) -> &str {
        "content job"
    }

    async fn execute(&self) -> Result<(), NewsroomError> {
        let report = self.run().await?;
        info!(
            "Content job finished: topic='{}' articles={} content={} purged={:?}",
            report.topic, report.article_count, report.content_id, report.purged
        );
        Ok(())
    }
}
