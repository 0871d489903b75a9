//! Neo4j persistence over the HTTP transactional endpoint.

use super::{ContentRepository, GeneratedContent};
use crate::config::Config;
use crate::error::NewsroomError;
use crate::news::NewsArticle;
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use log::{debug, info, warn};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::time::sleep;
use uuid::Uuid;

const SAVE_CONTENT: &str = "MERGE (c:GeneratedContent {id: $id}) \
SET c.topic = $topic, c.title = $title, c.summary = $summary, c.body = $body, \
c.keyPoints = $keyPoints, c.sources = $sources, c.generatedAt = datetime($generatedAt)";

const LINK_ARTICLES: &str = "MATCH (c:GeneratedContent {id: $id}) \
UNWIND $articles AS a \
MERGE (n:NewsArticle {url: a.url}) \
SET n.title = a.title, n.source = a.source, n.publishedAt = a.publishedAt \
MERGE (c)-[:CITES]->(n)";

const CREATE_NOTIFICATION: &str = "MATCH (c:GeneratedContent {id: $id}) \
CREATE (m:Notification {id: $notificationId, message: $message, createdAt: datetime($generatedAt)}) \
CREATE (m)-[:ABOUT]->(c)";

const PURGE_NOTIFICATIONS: &str = "MATCH (m:Notification) WHERE m.createdAt < datetime($cutoff) \
DETACH DELETE m RETURN count(m) AS deleted";

#[derive(Debug, Serialize)]
struct Statement {
    statement: &'static str,
    parameters: Value,
}

#[derive(Debug, Deserialize)]
struct TxResponse {
    #[serde(default)]
    results: Vec<TxResult>,
    #[serde(default)]
    errors: Vec<TxError>,
}

#[derive(Debug, Deserialize)]
struct TxResult {
    #[serde(default)]
    data: Vec<TxRow>,
}

#[derive(Debug, Deserialize)]
struct TxRow {
    row: Vec<Value>,
}

#[derive(Debug, Deserialize)]
struct TxError {
    code: String,
    message: String,
}

pub struct Neo4jRepository {
    client: Client,
    endpoint: String,
    username: String,
    password: Option<String>,
    closed: AtomicBool,
}

impl Neo4jRepository {
    pub fn new(client: Client, uri: &str, database: &str, username: &str, password: Option<String>) -> Self {
        Self {
            client,
            endpoint: format!("{}/db/{}/tx/commit", uri.trim_end_matches('/'), database),
            username: username.to_string(),
            password,
            closed: AtomicBool::new(false),
        }
    }

    pub fn from_config(config: &Config, client: Client) -> Self {
        Self::new(
            client,
            &config.neo4j_uri,
            &config.neo4j_database,
            &config.neo4j_username,
            config.neo4j_password.clone(),
        )
    }

    /// Runs `statements` in one auto-committed transaction.
    async fn commit(&self, statements: Vec<Statement>) -> Result<Vec<TxResult>, NewsroomError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(NewsroomError::PersistenceError("Repository is closed".to_string()));
        }
        let password = self
            .password
            .as_deref()
            .ok_or_else(|| NewsroomError::ConfigError("NEO4J_PASSWORD is not set".into()))?;

        let response = self
            .client
            .post(&self.endpoint)
            .basic_auth(&self.username, Some(password))
            .json(&json!({ "statements": statements }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(NewsroomError::PersistenceError(format!(
                "Graph database returned HTTP {}",
                status
            )));
        }

        let body: TxResponse = response.json().await?;
        if let Some(err) = body.errors.first() {
            return Err(NewsroomError::PersistenceError(format!(
                "{}: {}",
                err.code, err.message
            )));
        }
        Ok(body.results)
    }
}

#[async_trait]
impl ContentRepository for Neo4jRepository {
    async fn verify_connectivity(&self) -> Result<(), NewsroomError> {
        self.commit(vec![Statement {
            statement: "RETURN 1",
            parameters: json!({}),
        }])
        .await
        .map(|_| ())
    }

    async fn save_content(
        &self,
        content: &GeneratedContent,
        articles: &[NewsArticle],
    ) -> Result<(), NewsroomError> {
        let id = content.id.to_string();
        let generated_at = content.generated_at.to_rfc3339_opts(SecondsFormat::Millis, true);

        let mut statements = vec![Statement {
            statement: SAVE_CONTENT,
            parameters: json!({
                "id": id,
                "topic": content.topic,
                "title": content.title,
                "summary": content.summary,
                "body": content.body,
                "keyPoints": content.key_points,
                "sources": content.sources,
                "generatedAt": generated_at,
            }),
        }];

        // Articles without a URL have no identity to merge on.
        let linked: Vec<Value> = articles
            .iter()
            .filter(|a| !a.url.is_empty())
            .map(|a| {
                json!({
                    "url": a.url,
                    "title": a.title,
                    "source": a.source,
                    "publishedAt": a.published_at,
                })
            })
            .collect();
        if !linked.is_empty() {
            statements.push(Statement {
                statement: LINK_ARTICLES,
                parameters: json!({ "id": id, "articles": linked }),
            });
        }

        statements.push(Statement {
            statement: CREATE_NOTIFICATION,
            parameters: json!({
                "id": id,
                "notificationId": Uuid::new_v4().to_string(),
                "message": format!("New article: {}", content.title),
                "generatedAt": generated_at,
            }),
        });

        debug!("Saving content {} with {} linked articles", id, linked.len());
        self.commit(statements).await.map(|_| ())
    }

    async fn purge_stale_notifications(&self, older_than: DateTime<Utc>) -> Result<u64, NewsroomError> {
        let results = self
            .commit(vec![Statement {
                statement: PURGE_NOTIFICATIONS,
                parameters: json!({
                    "cutoff": older_than.to_rfc3339_opts(SecondsFormat::Millis, true),
                }),
            }])
            .await?;

        Ok(results
            .first()
            .and_then(|r| r.data.first())
            .and_then(|row| row.row.first())
            .and_then(Value::as_u64)
            .unwrap_or(0))
    }

    async fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            info!("Graph database client closed");
        }
    }
}

/// Fixed-delay connectivity probe used at startup.
pub async fn connect_with_retry(
    repository: &dyn ContentRepository,
    attempts: u32,
    delay: Duration,
) -> Result<(), NewsroomError> {
    let attempts = attempts.max(1);
    let mut last_error = None;

    for attempt in 1..=attempts {
        match repository.verify_connectivity().await {
            Ok(()) => {
                info!("✅ Graph database reachable (attempt {}/{})", attempt, attempts);
                return Ok(());
            }
            Err(e) => {
                warn!(
                    "Graph database connection attempt {}/{} failed: {}",
                    attempt, attempts, e
                );
                last_error = Some(e);
                if attempt < attempts {
                    sleep(delay).await;
                }
            }
        }
    }

    Err(last_error.unwrap_or_else(|| {
        NewsroomError::PersistenceError("No connection attempts made".to_string())
    }))
}
