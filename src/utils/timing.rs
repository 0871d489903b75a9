//! Stage timing for job runs.
//!
//! A `JobTimer` is started when a run begins and checkpointed after each
//! stage (fetch, generate, persist, sweep); `finish` logs the breakdown.

use log::{debug, info, warn};
use std::time::{Duration, Instant};

#[derive(Debug)]
pub struct JobTimer {
    start_time: Instant,
    operation_name: String,
    checkpoints: Vec<(String, Instant)>,
}

impl JobTimer {
    pub fn start(operation_name: &str) -> Self {
        debug!("⏱️ Starting timer for: {}", operation_name);
        Self {
            start_time: Instant::now(),
            operation_name: operation_name.to_string(),
            checkpoints: Vec::new(),
        }
    }

    pub fn checkpoint(&mut self, checkpoint_name: &str) {
        let now = Instant::now();
        debug!(
            "📍 {} - {}: {}ms",
            self.operation_name,
            checkpoint_name,
            now.duration_since(self.start_time).as_millis()
        );
        self.checkpoints.push((checkpoint_name.to_string(), now));
    }

    /// Per-stage durations in checkpoint order.
    pub fn stages(&self) -> Vec<(String, Duration)> {
        let mut last = self.start_time;
        self.checkpoints
            .iter()
            .map(|(name, at)| {
                let segment = at.duration_since(last);
                last = *at;
                (name.clone(), segment)
            })
            .collect()
    }

    /// Logs the breakdown and warns if the whole run exceeded `threshold`.
    pub fn finish_with_threshold(self, threshold: Duration) -> Duration {
        let total = self.start_time.elapsed();
        info!("🕐 {} completed in {}ms", self.operation_name, total.as_millis());
        for (name, segment) in self.stages() {
            info!("   └─ {}: {}ms", name, segment.as_millis());
        }
        if total > threshold {
            warn!(
                "⚠️ {} took {}ms (exceeds threshold of {}ms)",
                self.operation_name,
                total.as_millis(),
                threshold.as_millis()
            );
        }
        total
    }
}
