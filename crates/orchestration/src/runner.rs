//! Bounded worker pool over named FIFO queues.
//!
//! Each queue keeps submission order; a pool-wide semaphore caps how many
//! tasks run at once. Delivery is at-least-once and tasks are expected to be
//! idempotent (the recommendation cache and upsert-style vectorization make
//! them so). Failed attempts retry with exponential backoff and jitter up to
//! a configured attempt cap; terminal errors (validation, revocation) are
//! never retried.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use rand::Rng;
use serde::Serialize;
use tokio::sync::{Mutex, Semaphore, mpsc, watch};
use tracing::{error, info, warn};
use uuid::Uuid;

use locarank_config::TaskConfig;
use locarank_context::RequestScope;
use locarank_core::{Error, Result, TaskStatus};

use crate::tasks::{QueueName, TaskKind};

/// Executes one task kind to completion.
#[async_trait::async_trait]
pub trait TaskHandler: Send + Sync {
    async fn execute(&self, kind: &TaskKind) -> Result<serde_json::Value>;
}

/// Latest periodic health probe outcome, readable synchronously.
#[derive(Debug, Clone, Default, Serialize)]
pub struct HealthSnapshot {
    pub healthy: bool,
    pub detail: serde_json::Value,
    pub checked_at: Option<chrono::DateTime<chrono::Utc>>,
}

/// External view of a task's lifecycle.
#[derive(Debug, Clone, Serialize)]
pub struct TaskView {
    pub task_id: Uuid,
    pub name: &'static str,
    pub status: TaskStatus,
    pub ready: bool,
    pub attempts: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RevokeOutcome {
    Revoked,
    AlreadyFinished,
    NotFound,
}

struct TaskRecord {
    name: &'static str,
    status: TaskStatus,
    attempts: u32,
    result: Option<serde_json::Value>,
    error: Option<String>,
    revoked: Arc<AtomicBool>,
}

struct Envelope {
    id: Uuid,
    kind: TaskKind,
    scope: RequestScope,
}

struct RunnerInner {
    records: Mutex<HashMap<Uuid, TaskRecord>>,
    handler: Arc<dyn TaskHandler>,
    config: TaskConfig,
    permits: Arc<Semaphore>,
    health_tx: watch::Sender<HealthSnapshot>,
}

/// Handle over the worker pool. Cheap to clone.
#[derive(Clone)]
pub struct TaskRunner {
    inner: Arc<RunnerInner>,
    queues: Arc<HashMap<QueueName, mpsc::UnboundedSender<Envelope>>>,
    health_rx: watch::Receiver<HealthSnapshot>,
}

impl TaskRunner {
    /// Spawn the queue consumers and the periodic health-check task.
    pub fn start(handler: Arc<dyn TaskHandler>, config: TaskConfig) -> Self {
        let (health_tx, health_rx) = watch::channel(HealthSnapshot::default());
        let inner = Arc::new(RunnerInner {
            records: Mutex::new(HashMap::new()),
            handler,
            permits: Arc::new(Semaphore::new(config.worker_concurrency.max(1))),
            health_tx,
            config,
        });

        let mut queues = HashMap::new();
        for queue in QueueName::ALL {
            let (tx, mut rx) = mpsc::unbounded_channel::<Envelope>();
            queues.insert(queue, tx);

            let inner = Arc::clone(&inner);
            tokio::spawn(async move {
                // Waiting for a permit before spawning keeps each queue's
                // start order FIFO even under a saturated pool.
                while let Some(envelope) = rx.recv().await {
                    let permit = match Arc::clone(&inner.permits).acquire_owned().await {
                        Ok(permit) => permit,
                        Err(_) => break,
                    };
                    let inner = Arc::clone(&inner);
                    tokio::spawn(async move {
                        inner.run(envelope).await;
                        drop(permit);
                    });
                }
            });
        }

        let runner = Self { inner, queues: Arc::new(queues), health_rx };
        runner.spawn_periodic_health();
        runner
    }

    /// Enqueue a task under the ambient request scope. Returns the opaque
    /// task id.
    pub async fn submit(&self, kind: TaskKind) -> Uuid {
        let id = Uuid::new_v4();
        let queue = kind.queue();
        let envelope = Envelope {
            id,
            scope: RequestScope::current_or_generate(),
            kind,
        };

        {
            let mut records = self.inner.records.lock().await;
            records.insert(
                id,
                TaskRecord {
                    name: envelope.kind.name(),
                    status: TaskStatus::Pending,
                    attempts: 0,
                    result: None,
                    error: None,
                    revoked: Arc::new(AtomicBool::new(false)),
                },
            );
        }

        info!(task_id = %id, task = envelope.kind.name(), queue = queue.as_str(), "task submitted");
        if let Some(tx) = self.queues.get(&queue) {
            if tx.send(envelope).is_err() {
                error!(task_id = %id, "queue consumer gone; task will never run");
            }
        }
        id
    }

    pub async fn status(&self, id: Uuid) -> Option<TaskView> {
        let records = self.inner.records.lock().await;
        records.get(&id).map(|record| TaskView {
            task_id: id,
            name: record.name,
            status: record.status,
            ready: record.status.is_ready(),
            attempts: record.attempts,
            result: record.result.clone(),
            error: record.error.clone(),
        })
    }

    /// Revoke a task. Pending tasks are marked failed immediately; started
    /// tasks observe the flag cooperatively between attempts. Finished
    /// tasks are left untouched.
    pub async fn revoke(&self, id: Uuid) -> RevokeOutcome {
        let mut records = self.inner.records.lock().await;
        match records.get_mut(&id) {
            None => RevokeOutcome::NotFound,
            Some(record) if record.status.is_ready() => RevokeOutcome::AlreadyFinished,
            Some(record) => {
                record.revoked.store(true, Ordering::Relaxed);
                if record.status == TaskStatus::Pending {
                    record.status = TaskStatus::Failure;
                    record.error = Some("revoked".to_string());
                }
                info!(task_id = %id, "task revoked");
                RevokeOutcome::Revoked
            }
        }
    }

    /// Latest periodic health probe, without awaiting anything.
    pub fn health_snapshot(&self) -> HealthSnapshot {
        self.health_rx.borrow().clone()
    }

    fn spawn_periodic_health(&self) {
        let inner = Arc::clone(&self.inner);
        let interval = Duration::from_secs(self.inner.config.health_check_interval_seconds.max(1));
        tokio::spawn(async move {
            // First probe after one full interval, then steadily.
            let start = tokio::time::Instant::now() + interval;
            let mut ticker = tokio::time::interval_at(start, interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let snapshot = match inner.handler.execute(&TaskKind::HealthCheck).await {
                    Ok(detail) => HealthSnapshot {
                        healthy: detail
                            .get("healthy")
                            .and_then(serde_json::Value::as_bool)
                            .unwrap_or(false),
                        detail,
                        checked_at: Some(chrono::Utc::now()),
                    },
                    Err(e) => {
                        warn!(error = %e, "periodic health check failed");
                        HealthSnapshot {
                            healthy: false,
                            detail: serde_json::json!({ "error": e.to_string() }),
                            checked_at: Some(chrono::Utc::now()),
                        }
                    }
                };
                let _ = inner.health_tx.send(snapshot);
            }
        });
    }
}

impl RunnerInner {
    async fn run(self: Arc<Self>, envelope: Envelope) {
        let Envelope { id, kind, scope } = envelope;

        let revoked = {
            let records = self.records.lock().await;
            match records.get(&id) {
                Some(record) => Arc::clone(&record.revoked),
                None => return,
            }
        };

        // The envelope's scope is installed for the whole retry loop and
        // dropped with it, whatever the outcome.
        locarank_context::scope(scope, async {
            let max_attempts = self.config.max_attempts.max(1);
            for attempt in 1..=max_attempts {
                if revoked.load(Ordering::Relaxed) {
                    self.finish(id, TaskStatus::Failure, None, Some("revoked".to_string())).await;
                    return;
                }

                self.mark_started(id, attempt).await;
                match self.handler.execute(&kind).await {
                    Ok(result) => {
                        info!(task_id = %id, task = kind.name(), attempt, "task succeeded");
                        self.finish(id, TaskStatus::Success, Some(result), None).await;
                        return;
                    }
                    Err(e) if e.is_terminal() || attempt == max_attempts => {
                        error!(task_id = %id, task = kind.name(), attempt, error = %e, "task failed");
                        self.finish(id, TaskStatus::Failure, None, Some(e.to_string())).await;
                        return;
                    }
                    Err(e) => {
                        let delay = self.backoff(attempt);
                        warn!(
                            task_id = %id,
                            task = kind.name(),
                            attempt,
                            delay_ms = delay.as_millis() as u64,
                            error = %e,
                            "task attempt failed; retrying"
                        );
                        self.mark_retry(id, &e).await;
                        tokio::time::sleep(delay).await;
                    }
                }
            }
        })
        .await;
    }

    /// Exponential backoff with jitter, capped at the configured maximum.
    fn backoff(&self, attempt: u32) -> Duration {
        let base = self.config.retry_base_delay_seconds.max(1) as f64;
        let capped = (base * 2f64.powi(attempt.saturating_sub(1) as i32))
            .min(self.config.retry_max_delay_seconds as f64);
        let jitter = rand::thread_rng().gen_range(0.5..1.5);
        Duration::from_secs_f64(capped * jitter)
    }

    async fn mark_started(&self, id: Uuid, attempt: u32) {
        let mut records = self.records.lock().await;
        if let Some(record) = records.get_mut(&id) {
            record.status = TaskStatus::Started;
            record.attempts = attempt;
        }
    }

    async fn mark_retry(&self, id: Uuid, error: &Error) {
        let mut records = self.records.lock().await;
        if let Some(record) = records.get_mut(&id) {
            record.status = TaskStatus::Retry;
            record.error = Some(error.to_string());
        }
    }

    async fn finish(
        &self,
        id: Uuid,
        status: TaskStatus,
        result: Option<serde_json::Value>,
        error: Option<String>,
    ) {
        let mut records = self.records.lock().await;
        if let Some(record) = records.get_mut(&id) {
            record.status = status;
            record.result = result;
            record.error = error;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;

    fn test_config() -> TaskConfig {
        TaskConfig {
            worker_concurrency: 2,
            max_attempts: 3,
            retry_base_delay_seconds: 1,
            retry_max_delay_seconds: 1,
            health_check_interval_seconds: 3600,
        }
    }

    struct ScriptedHandler {
        failures_before_success: u32,
        calls: AtomicU32,
        terminal: bool,
    }

    impl ScriptedHandler {
        fn succeeding() -> Self {
            Self { failures_before_success: 0, calls: AtomicU32::new(0), terminal: false }
        }

        fn flaky(failures: u32) -> Self {
            Self { failures_before_success: failures, calls: AtomicU32::new(0), terminal: false }
        }

        fn terminal() -> Self {
            Self { failures_before_success: u32::MAX, calls: AtomicU32::new(0), terminal: true }
        }
    }

    #[async_trait::async_trait]
    impl TaskHandler for ScriptedHandler {
        async fn execute(&self, kind: &TaskKind) -> Result<serde_json::Value> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if self.terminal {
                return Err(Error::validation("bad input"));
            }
            if call < self.failures_before_success {
                return Err(Error::unavailable("stub", "transient"));
            }
            Ok(serde_json::json!({ "task": kind.name(), "call": call }))
        }
    }

    async fn wait_ready(runner: &TaskRunner, id: Uuid) -> TaskView {
        for _ in 0..200 {
            if let Some(view) = runner.status(id).await {
                if view.ready {
                    return view;
                }
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        panic!("task {id} never reached a terminal status");
    }

    #[tokio::test(start_paused = true)]
    async fn successful_task_reports_success_with_result() {
        let runner = TaskRunner::start(Arc::new(ScriptedHandler::succeeding()), test_config());
        let id = runner.submit(TaskKind::HealthCheck).await;

        let view = wait_ready(&runner, id).await;
        assert_eq!(view.status, TaskStatus::Success);
        assert_eq!(view.attempts, 1);
        assert!(view.result.is_some());
        assert!(view.error.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn transient_failures_retry_until_success() {
        let runner = TaskRunner::start(Arc::new(ScriptedHandler::flaky(2)), test_config());
        let id = runner.submit(TaskKind::HealthCheck).await;

        let view = wait_ready(&runner, id).await;
        assert_eq!(view.status, TaskStatus::Success);
        assert_eq!(view.attempts, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_retries_end_in_failure_with_last_error() {
        let runner = TaskRunner::start(Arc::new(ScriptedHandler::flaky(10)), test_config());
        let id = runner.submit(TaskKind::HealthCheck).await;

        let view = wait_ready(&runner, id).await;
        assert_eq!(view.status, TaskStatus::Failure);
        assert_eq!(view.attempts, 3);
        assert!(view.error.as_deref().unwrap_or_default().contains("transient"));
    }

    #[tokio::test(start_paused = true)]
    async fn terminal_errors_are_not_retried() {
        let runner = TaskRunner::start(Arc::new(ScriptedHandler::terminal()), test_config());
        let id = runner.submit(TaskKind::HealthCheck).await;

        let view = wait_ready(&runner, id).await;
        assert_eq!(view.status, TaskStatus::Failure);
        assert_eq!(view.attempts, 1);
    }

    #[tokio::test]
    async fn unknown_task_id_has_no_status() {
        let runner = TaskRunner::start(Arc::new(ScriptedHandler::succeeding()), test_config());
        assert!(runner.status(Uuid::new_v4()).await.is_none());
    }

    #[tokio::test]
    async fn revoking_unknown_task_reports_not_found() {
        let runner = TaskRunner::start(Arc::new(ScriptedHandler::succeeding()), test_config());
        assert_eq!(runner.revoke(Uuid::new_v4()).await, RevokeOutcome::NotFound);
    }

    #[tokio::test(start_paused = true)]
    async fn finished_task_cannot_be_revoked() {
        let runner = TaskRunner::start(Arc::new(ScriptedHandler::succeeding()), test_config());
        let id = runner.submit(TaskKind::HealthCheck).await;
        wait_ready(&runner, id).await;

        assert_eq!(runner.revoke(id).await, RevokeOutcome::AlreadyFinished);
    }
}
