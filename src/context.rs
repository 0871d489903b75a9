// src/context.rs
//! Process-wide services, built once at startup and torn down on shutdown.

use crate::auth::TokenRevocationLedger;
use crate::cache::{CacheStore, CleanupHistory, MemoryCache, RedisCache};
use crate::config::Config;
use crate::error::NewsroomError;
use crate::news::{build_http_client, FetchChain};
use crate::pipeline::{
    connect_with_retry, ContentJob, ContentRepository, JobSettings, Neo4jRepository,
    OpenAiGenerator,
};
use crate::scheduler::{DailyScheduler, DailyTrigger};
use crate::utils::{Clock, SystemClock};
use log::{info, warn};
use std::sync::Arc;
use std::time::Duration;

pub struct NewsroomContext {
    pub config: Arc<Config>,
    pub cache: Arc<dyn CacheStore>,
    pub revocation: TokenRevocationLedger,
    pub history: CleanupHistory,
    pub repository: Arc<dyn ContentRepository>,
    pub job: Arc<ContentJob>,
    pub scheduler: DailyScheduler,
}

/// Redis when `REDIS_URL` is set and reachable, memory otherwise.
async fn select_cache(config: &Config, clock: Arc<dyn Clock>) -> Arc<dyn CacheStore> {
    match &config.redis_url {
        Some(url) => match RedisCache::new(url).await {
            Ok(redis) => {
                info!("🗄️ Using Redis cache");
                Arc::new(redis)
            }
            Err(e) => {
                warn!("Redis unavailable ({}), falling back to in-memory cache", e);
                Arc::new(MemoryCache::with_clock(clock))
            }
        },
        None => {
            info!("🗄️ Using in-memory cache");
            Arc::new(MemoryCache::with_clock(clock))
        }
    }
}

impl NewsroomContext {
    pub async fn build(config: Arc<Config>) -> Result<Self, NewsroomError> {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let cache = select_cache(&config, clock.clone()).await;

        let client = build_http_client(Duration::from_secs(config.provider_timeout_secs))?;
        let chain = Arc::new(FetchChain::from_config(&config, client.clone()));
        info!("News providers: {}", chain.provider_names().join(" → "));

        // Generation can be slow; give it its own client without the provider timeout.
        let generation_client = build_http_client(Duration::from_secs(180))?;
        let generator = Arc::new(OpenAiGenerator::from_config(
            &config,
            generation_client,
            cache.clone(),
        ));
        let repository: Arc<dyn ContentRepository> =
            Arc::new(Neo4jRepository::from_config(&config, client));

        let history = CleanupHistory::new(cache.clone());
        let job = Arc::new(ContentJob::new(
            chain,
            generator,
            repository.clone(),
            history.clone(),
            clock.clone(),
            JobSettings::from_config(&config),
        ));
        let scheduler = DailyScheduler::new(DailyTrigger::from_config(&config)?, job.clone(), clock.clone());

        Ok(Self {
            revocation: TokenRevocationLedger::with_clock(cache.clone(), clock),
            config,
            cache,
            history,
            repository,
            job,
            scheduler,
        })
    }

    /// Probes the graph database. Failure is only a warning; the scheduler
    /// still arms and each run reports its own persistence errors.
    pub async fn connect_repository(&self) {
        let attempts = self.config.startup_connect_attempts;
        let delay = Duration::from_millis(self.config.startup_connect_delay_ms);
        if let Err(e) = connect_with_retry(self.repository.as_ref(), attempts, delay).await {
            warn!("⚠️ Graph database not reachable at startup: {}", e);
        }
    }

    pub async fn shutdown(&self) {
        info!("Shutting down newsroom services...");
        self.scheduler.shutdown().await;
        self.repository.close().await;
        info!("Shutdown complete");
    }
}
