// src/scheduler/mod.rs
//! Daily trigger at a fixed UTC offset and the single-task scheduler that
//! drives a [`ScheduledJob`] from it.

use crate::config::Config;
use crate::error::NewsroomError;
use crate::utils::Clock;
use async_trait::async_trait;
use chrono::{DateTime, Days, Duration as ChronoDuration, FixedOffset, NaiveTime, TimeZone, Utc};
use log::{error, info, warn};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;

/// Wall-clock time of day in a fixed offset (no DST).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DailyTrigger {
    time: NaiveTime,
    offset: FixedOffset,
}

impl DailyTrigger {
    pub fn new(hour: u32, minute: u32, utc_offset_hours: i32) -> Result<Self, NewsroomError> {
        let time = NaiveTime::from_hms_opt(hour, minute, 0).ok_or_else(|| {
            NewsroomError::ConfigError(format!("Invalid trigger time {:02}:{:02}", hour, minute))
        })?;
        let offset = FixedOffset::east_opt(utc_offset_hours * 3600).ok_or_else(|| {
            NewsroomError::ConfigError(format!("Invalid UTC offset {}h", utc_offset_hours))
        })?;
        Ok(Self { time, offset })
    }

    pub fn from_config(config: &Config) -> Result<Self, NewsroomError> {
        Self::new(
            config.schedule_hour,
            config.schedule_minute,
            config.schedule_utc_offset_hours,
        )
    }

    pub fn offset(&self) -> FixedOffset {
        self.offset
    }

    /// First trigger instant strictly after `now`.
    ///
    /// Once the local clock has reached the trigger's hour and minute the
    /// target rolls to the next local day.
    pub fn next_after(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let local = now.with_timezone(&self.offset);
        let today = local.date_naive();
        let passed = local.time() >= self.time;
        let date = if passed { today + Days::new(1) } else { today };

        let local_target = date.and_time(self.time);
        let utc_target =
            local_target - ChronoDuration::seconds(i64::from(self.offset.local_minus_utc()));
        Utc.from_utc_datetime(&utc_target)
    }

    /// Time to sleep from `now` until the next trigger, in `(0, 24h]`.
    pub fn delay_from(&self, now: DateTime<Utc>) -> Duration {
        (self.next_after(now) - now)
            .to_std()
            .unwrap_or(Duration::ZERO)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Idle,
    Armed { next_run: DateTime<Utc> },
    Running,
}

/// Work the scheduler fires. Errors are reported back but never stop the
/// scheduler from re-arming.
#[async_trait]
pub trait ScheduledJob: Send + Sync {
    fn name(&self) -> &str;

    async fn execute(&self) -> Result<(), NewsroomError>;
}

pub struct DailyScheduler {
    trigger: DailyTrigger,
    job: Arc<dyn ScheduledJob>,
    clock: Arc<dyn Clock>,
    state: Arc<Mutex<SchedulerState>>,
    is_running: Arc<AtomicBool>,
    generation: Arc<AtomicU64>,
    stop_tx: Mutex<Option<watch::Sender<bool>>>,
    handle: Mutex<Option<JoinHandle<()>>>,
    // Stopped loops that may still be finishing a run.
    draining: Mutex<Vec<JoinHandle<()>>>,
}

impl DailyScheduler {
    pub fn new(trigger: DailyTrigger, job: Arc<dyn ScheduledJob>, clock: Arc<dyn Clock>) -> Self {
        Self {
            trigger,
            job,
            clock,
            state: Arc::new(Mutex::new(SchedulerState::Idle)),
            is_running: Arc::new(AtomicBool::new(false)),
            generation: Arc::new(AtomicU64::new(0)),
            stop_tx: Mutex::new(None),
            handle: Mutex::new(None),
            draining: Mutex::new(Vec::new()),
        }
    }

    pub async fn state(&self) -> SchedulerState {
        *self.state.lock().await
    }

    /// True while a job run (scheduled or manual) is in flight.
    pub fn is_running(&self) -> bool {
        self.is_running.load(Ordering::SeqCst)
    }

    /// Arms the timer from the current instant. Calling `start` on an armed
    /// scheduler is a no-op. After `stop`, a new loop is armed even while the
    /// stopped one is still finishing a run.
    pub async fn start(&self) {
        let mut handle = self.handle.lock().await;
        if handle.as_ref().map_or(false, |h| !h.is_finished()) {
            warn!("Scheduler for {} already started", self.job.name());
            return;
        }
        self.draining.lock().await.retain(|h| !h.is_finished());

        let (stop_tx, mut stop_rx) = watch::channel(false);
        *self.stop_tx.lock().await = Some(stop_tx);
        let my_generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;

        let trigger = self.trigger;
        let job = self.job.clone();
        let clock = self.clock.clone();
        let state = self.state.clone();
        let is_running = self.is_running.clone();
        let generation = self.generation.clone();

        *handle = Some(tokio::spawn(async move {
            loop {
                let now = clock.now();
                let next_run = trigger.next_after(now);
                let delay = trigger.delay_from(now);
                {
                    // `stop` flips the flag under the state lock, so a stopped
                    // loop can never overwrite its Idle.
                    let mut current = state.lock().await;
                    if *stop_rx.borrow() {
                        break;
                    }
                    *current = SchedulerState::Armed { next_run };
                }
                info!(
                    "⏰ Next {} run at {} ({}), in {:?}",
                    job.name(),
                    next_run.with_timezone(&trigger.offset()),
                    next_run,
                    delay
                );

                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = stop_rx.changed() => break,
                }
                if *stop_rx.borrow() {
                    break;
                }

                if let Err(e) = run_guarded(job.as_ref(), &state, &is_running).await {
                    error!("❌ Scheduled {} run failed: {}", job.name(), e);
                }
            }

            let mut current = state.lock().await;
            if generation.load(Ordering::SeqCst) == my_generation {
                *current = SchedulerState::Idle;
            }
            info!("Scheduler loop for {} exited", job.name());
        }));
    }

    /// Cancels the pending timer. A run already in flight finishes on its own.
    pub async fn stop(&self) {
        {
            let mut current = self.state.lock().await;
            if let Some(stop_tx) = self.stop_tx.lock().await.take() {
                let _ = stop_tx.send(true);
            }
            *current = SchedulerState::Idle;
        }
        if let Some(handle) = self.handle.lock().await.take() {
            self.draining.lock().await.push(handle);
        }
        info!("🛑 Scheduler for {} stopped", self.job.name());
    }

    /// Stops and waits for every loop, including any in-flight run, to exit.
    pub async fn shutdown(&self) {
        self.stop().await;
        let handles: Vec<JoinHandle<()>> = self.draining.lock().await.drain(..).collect();
        for handle in handles {
            if let Err(e) = handle.await {
                warn!("Scheduler task ended abnormally: {}", e);
            }
        }
        *self.state.lock().await = SchedulerState::Idle;
    }

    /// Runs the job immediately under the same guard as scheduled runs.
    pub async fn run_now(&self) -> Result<(), NewsroomError> {
        run_guarded(self.job.as_ref(), &self.state, &self.is_running).await
    }
}

async fn run_guarded(
    job: &dyn ScheduledJob,
    state: &Mutex<SchedulerState>,
    is_running: &AtomicBool,
) -> Result<(), NewsroomError> {
    if is_running.swap(true, Ordering::SeqCst) {
        warn!("Skipping {} run: previous run still in progress", job.name());
        return Err(NewsroomError::SchedulerError(format!(
            "{} is already running",
            job.name()
        )));
    }

    let previous = std::mem::replace(&mut *state.lock().await, SchedulerState::Running);
    info!("🚀 Running {}", job.name());
    let result = job.execute().await;
    is_running.store(false, Ordering::SeqCst);

    let mut current = state.lock().await;
    if *current == SchedulerState::Running {
        *current = previous;
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::ManualClock;
    use chrono::Timelike;
    use std::sync::atomic::AtomicUsize;

    fn utc(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    fn default_trigger() -> DailyTrigger {
        DailyTrigger::new(3, 0, 8).unwrap()
    }

    #[test]
    fn test_past_trigger_rolls_to_next_day() {
        // 10:00 local on the 5th
        let now = utc("2024-03-05T02:00:00Z");
        let next = default_trigger().next_after(now);
        assert_eq!(next, utc("2024-03-05T19:00:00Z"));

        let local = next.with_timezone(&default_trigger().offset());
        assert_eq!((local.hour(), local.minute()), (3, 0));
        assert_eq!(local.date_naive().to_string(), "2024-03-06");

        let delay = default_trigger().delay_from(now);
        assert!(delay > Duration::ZERO && delay <= Duration::from_secs(24 * 3600));
    }

    #[test]
    fn test_before_trigger_fires_same_day() {
        // 02:59:59 local
        let now = utc("2024-03-05T18:59:59Z");
        assert_eq!(default_trigger().next_after(now), utc("2024-03-05T19:00:00Z"));
        assert_eq!(default_trigger().delay_from(now), Duration::from_secs(1));
    }

    #[test]
    fn test_exactly_at_trigger_waits_full_day() {
        let now = utc("2024-03-05T19:00:00Z");
        assert_eq!(default_trigger().next_after(now), utc("2024-03-06T19:00:00Z"));
        assert_eq!(default_trigger().delay_from(now), Duration::from_secs(24 * 3600));
    }

    #[test]
    fn test_month_and_year_rollover() {
        assert_eq!(
            default_trigger().next_after(utc("2024-02-29T20:00:00Z")),
            utc("2024-03-01T19:00:00Z")
        );
        assert_eq!(
            default_trigger().next_after(utc("2024-12-31T19:30:00Z")),
            utc("2025-01-01T19:00:00Z")
        );
    }

    #[test]
    fn test_configurable_offset() {
        let utc_trigger = DailyTrigger::new(3, 0, 0).unwrap();
        assert_eq!(
            utc_trigger.next_after(utc("2024-03-05T02:00:00Z")),
            utc("2024-03-05T03:00:00Z")
        );
        assert!(DailyTrigger::new(24, 0, 8).is_err());
        assert!(DailyTrigger::new(3, 0, 30).is_err());
    }

    struct CountingJob {
        runs: AtomicUsize,
        fail: bool,
        work: Duration,
    }

    impl CountingJob {
        fn new(fail: bool, work: Duration) -> Arc<Self> {
            Arc::new(Self {
                runs: AtomicUsize::new(0),
                fail,
                work,
            })
        }

        fn runs(&self) -> usize {
            self.runs.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ScheduledJob for CountingJob {
        fn name(&self) -> &str {
            "counting job"
        }

        async fn execute(&self) -> Result<(), NewsroomError> {
            self.runs.fetch_add(1, Ordering::SeqCst);
            if !self.work.is_zero() {
                tokio::time::sleep(self.work).await;
            }
            if self.fail {
                Err(NewsroomError::GenerationError("model offline".into()))
            } else {
                Ok(())
            }
        }
    }

    /// One second before the default trigger.
    fn clock_before_trigger() -> Arc<ManualClock> {
        Arc::new(ManualClock::new(utc("2024-03-05T18:59:59Z")))
    }

    #[tokio::test(start_paused = true)]
    async fn test_fires_and_rearms() {
        let job = CountingJob::new(false, Duration::ZERO);
        let scheduler = DailyScheduler::new(default_trigger(), job.clone(), clock_before_trigger());

        scheduler.start().await;
        tokio::time::sleep(Duration::from_millis(1500)).await;

        assert_eq!(job.runs(), 1);
        assert!(matches!(scheduler.state().await, SchedulerState::Armed { .. }));
        assert!(!scheduler.is_running());
        scheduler.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_failing_job_still_rearms() {
        let job = CountingJob::new(true, Duration::ZERO);
        let scheduler = DailyScheduler::new(default_trigger(), job.clone(), clock_before_trigger());

        scheduler.start().await;
        tokio::time::sleep(Duration::from_millis(2500)).await;

        // The manual clock is frozen one second before the trigger, so every
        // re-arm waits exactly one more second.
        assert_eq!(job.runs(), 2);
        assert!(matches!(scheduler.state().await, SchedulerState::Armed { .. }));
        scheduler.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_goes_idle_and_cancels_timer() {
        let job = CountingJob::new(false, Duration::ZERO);
        let scheduler = DailyScheduler::new(default_trigger(), job.clone(), clock_before_trigger());

        scheduler.start().await;
        tokio::time::sleep(Duration::from_millis(100)).await;
        scheduler.stop().await;
        assert_eq!(scheduler.state().await, SchedulerState::Idle);

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(job.runs(), 0);
        assert_eq!(scheduler.state().await, SchedulerState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_lets_in_flight_run_finish() {
        let job = CountingJob::new(false, Duration::from_secs(5));
        let scheduler = DailyScheduler::new(default_trigger(), job.clone(), clock_before_trigger());

        scheduler.start().await;
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(scheduler.is_running());

        scheduler.shutdown().await;
        assert_eq!(job.runs(), 1);
        assert!(!scheduler.is_running());
        assert_eq!(scheduler.state().await, SchedulerState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_restart_after_stop_fires_again() {
        let job = CountingJob::new(false, Duration::ZERO);
        let scheduler = DailyScheduler::new(default_trigger(), job.clone(), clock_before_trigger());

        scheduler.start().await;
        tokio::time::sleep(Duration::from_millis(100)).await;
        scheduler.stop().await;
        scheduler.start().await;
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(matches!(scheduler.state().await, SchedulerState::Armed { .. }));

        // Re-armed at 0.2s; fires at 1.2s, 2.2s and 3.2s.
        tokio::time::sleep(Duration::from_secs(3)).await;
        assert_eq!(job.runs(), 3);
        assert!(matches!(scheduler.state().await, SchedulerState::Armed { .. }));

        scheduler.shutdown().await;
        assert_eq!(scheduler.state().await, SchedulerState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_restart_during_run_rearms_and_skips_overlap() {
        let job = CountingJob::new(false, Duration::from_secs(5));
        let scheduler = DailyScheduler::new(default_trigger(), job.clone(), clock_before_trigger());

        // First run spans 1s..6s.
        scheduler.start().await;
        tokio::time::sleep(Duration::from_millis(2500)).await;
        assert!(scheduler.is_running());

        scheduler.stop().await;
        scheduler.start().await;
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(matches!(scheduler.state().await, SchedulerState::Armed { .. }));

        // Fires at 3.5s, 4.5s and 5.5s are skipped; the one at 6.5s runs.
        tokio::time::sleep(Duration::from_millis(4400)).await;
        assert_eq!(job.runs(), 2);
        assert!(scheduler.is_running());

        scheduler.shutdown().await;
        assert!(!scheduler.is_running());
        assert_eq!(scheduler.state().await, SchedulerState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_now_rejects_overlap() {
        let job = CountingJob::new(false, Duration::from_secs(5));
        let scheduler = Arc::new(DailyScheduler::new(
            default_trigger(),
            job.clone(),
            clock_before_trigger(),
        ));

        let background = {
            let scheduler = scheduler.clone();
            tokio::spawn(async move { scheduler.run_now().await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(scheduler.state().await, SchedulerState::Running);

        let overlapping = scheduler.run_now().await;
        assert!(matches!(overlapping, Err(NewsroomError::SchedulerError(_))));

        assert!(background.await.unwrap().is_ok());
        assert_eq!(job.runs(), 1);
        assert_eq!(scheduler.state().await, SchedulerState::Idle);
    }

    #[tokio::test]
    async fn test_run_now_returns_job_error() {
        let job = CountingJob::new(true, Duration::ZERO);
        let scheduler = DailyScheduler::new(default_trigger(), job, clock_before_trigger());
        assert!(matches!(
            scheduler.run_now().await,
            Err(NewsroomError::GenerationError(_))
        ));
        assert!(!scheduler.is_running());
    }
}
