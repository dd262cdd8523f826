//! Drives every pipeline task on its own fixed cadence.
//!
//! Each task gets an independent timer loop. A task runs once immediately on
//! start, then every `cadence`. A failed or panicking run is logged and
//! recorded in the task's status; it never stops sibling tasks or the task's
//! next tick.
use std::any::Any;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::FutureExt;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{error, info};

use crate::errors::TaskError;

pub const SEISMIC_CADENCE: Duration = Duration::from_secs(5 * 60);
pub const FEED_CADENCE: Duration = Duration::from_secs(15 * 60);
pub const ALERT_CADENCE: Duration = Duration::from_secs(60);

/// One unit of scheduled work. `Ok` carries how many records it produced.
#[async_trait]
pub trait Task: Send + Sync {
    async fn run(&self) -> Result<usize, TaskError>;
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaskStatus {
    pub runs: u64,
    pub failures: u64,
    pub last_count: Option<usize>,
    pub last_error: Option<String>,
    pub last_error_kind: Option<&'static str>,
    pub last_run_at: Option<DateTime<Utc>>,
}

struct ScheduledTask {
    name: String,
    cadence: Duration,
    task: Arc<dyn Task>,
}

type StatusMap = Arc<RwLock<HashMap<String, TaskStatus>>>;

#[derive(Default)]
pub struct Orchestrator {
    tasks: Vec<ScheduledTask>,
    status: StatusMap,
}

impl Orchestrator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, name: impl Into<String>, cadence: Duration, task: Arc<dyn Task>) -> &mut Self {
        self.tasks.push(ScheduledTask {
            name: name.into(),
            cadence,
            task,
        });
        self
    }

    pub fn task_names(&self) -> Vec<&str> {
        self.tasks.iter().map(|t| t.name.as_str()).collect()
    }

    pub fn cadence_of(&self, name: &str) -> Option<Duration> {
        self.tasks.iter().find(|t| t.name == name).map(|t| t.cadence)
    }

    /// Runs a single registered task now, without waiting for its timer.
    pub async fn run_once(&self, name: &str) -> Result<usize, TaskError> {
        let scheduled = self
            .tasks
            .iter()
            .find(|t| t.name == name)
            .ok_or_else(|| TaskError::UnknownTask(name.to_string()))?;
        execute(&scheduled.name, scheduled.task.as_ref(), &self.status).await
    }

    pub fn status(&self) -> HashMap<String, TaskStatus> {
        read_status(&self.status)
    }

    /// Spawns one timer loop per task and returns their handles. Dropping or
    /// aborting the handles stops future ticks; a run in progress is not
    /// interrupted by the orchestrator itself.
    pub fn start(&self) -> Vec<JoinHandle<()>> {
        self.tasks
            .iter()
            .map(|scheduled| {
                let name = scheduled.name.clone();
                let cadence = scheduled.cadence;
                let task = scheduled.task.clone();
                let status = self.status.clone();
                info!("Scheduling task {} every {:?}", name, cadence);

                tokio::spawn(async move {
                    let mut ticker = interval(cadence);
                    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
                    loop {
                        ticker.tick().await;
                        // Errors are already logged and recorded.
                        let _ = execute(&name, task.as_ref(), &status).await;
                    }
                })
            })
            .collect()
    }
}

fn read_status(status: &StatusMap) -> HashMap<String, TaskStatus> {
    status
        .read()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
        .clone()
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        msg.to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

async fn execute(name: &str, task: &dyn Task, status: &StatusMap) -> Result<usize, TaskError> {
    let result = match AssertUnwindSafe(task.run()).catch_unwind().await {
        Ok(result) => result,
        Err(payload) => Err(TaskError::Panicked(panic_message(payload))),
    };

    let mut map = status.write().unwrap_or_else(|poisoned| poisoned.into_inner());
    let entry = map.entry(name.to_string()).or_default();
    entry.runs += 1;
    entry.last_run_at = Some(Utc::now());
    match &result {
        Ok(count) => {
            info!("Task {} finished: {} records", name, count);
            entry.last_count = Some(*count);
            entry.last_error = None;
            entry.last_error_kind = None;
        }
        Err(e) => {
            error!("Task {} failed ({}): {}", name, e.kind(), e);
            entry.failures += 1;
            entry.last_count = None;
            entry.last_error = Some(e.to_string());
            entry.last_error_kind = Some(e.kind());
        }
    }
    drop(map);
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::SourceError;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Counting {
        calls: AtomicUsize,
        fail: bool,
    }

    impl Counting {
        fn new(fail: bool) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                fail,
            })
        }
    }

    #[async_trait]
    impl Task for Counting {
        async fn run(&self) -> Result<usize, TaskError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if self.fail {
                Err(SourceError::Provider("feed offline".to_string()).into())
            } else {
                Ok(n)
            }
        }
    }

    #[tokio::test]
    async fn test_run_once_records_success_and_failure() {
        let ok = Counting::new(false);
        let broken = Counting::new(true);
        let mut orchestrator = Orchestrator::new();
        orchestrator
            .register("seismic", SEISMIC_CADENCE, ok.clone())
            .register("wildfire", FEED_CADENCE, broken.clone());

        assert_eq!(orchestrator.run_once("seismic").await.unwrap(), 1);
        assert!(orchestrator.run_once("wildfire").await.is_err());
        assert_eq!(orchestrator.run_once("seismic").await.unwrap(), 2);

        let status = orchestrator.status();
        assert_eq!(status["seismic"].runs, 2);
        assert_eq!(status["seismic"].last_count, Some(2));
        assert_eq!(status["wildfire"].failures, 1);
        assert_eq!(status["wildfire"].last_error_kind, Some("provider"));
        assert!(status["wildfire"].last_error.as_deref().unwrap().contains("feed offline"));
    }

    #[tokio::test]
    async fn test_run_once_unknown_task() {
        let orchestrator = Orchestrator::new();
        assert!(matches!(
            orchestrator.run_once("tsunami").await,
            Err(TaskError::UnknownTask(_))
        ));
    }

    #[tokio::test]
    async fn test_start_runs_every_task_immediately_despite_failures() {
        let ok = Counting::new(false);
        let broken = Counting::new(true);
        let mut orchestrator = Orchestrator::new();
        orchestrator
            .register("broken", Duration::from_millis(20), broken.clone())
            .register("alerts", Duration::from_millis(20), ok.clone());

        let handles = orchestrator.start();
        tokio::time::sleep(Duration::from_millis(110)).await;
        for handle in &handles {
            handle.abort();
        }

        // The failing task keeps ticking and never starves its sibling.
        assert!(broken.calls.load(Ordering::SeqCst) >= 2);
        assert!(ok.calls.load(Ordering::SeqCst) >= 2);
        let status = orchestrator.status();
        assert!(status["broken"].failures >= 2);
        assert_eq!(status["alerts"].failures, 0);
    }

    /// Panics on its first call, succeeds afterwards.
    struct PanicsOnce {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Task for PanicsOnce {
        async fn run(&self) -> Result<usize, TaskError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if n == 1 {
                panic!("feed payload out of range");
            }
            Ok(n)
        }
    }

    #[tokio::test]
    async fn test_panicking_task_keeps_its_schedule() {
        let task = Arc::new(PanicsOnce {
            calls: AtomicUsize::new(0),
        });
        let mut orchestrator = Orchestrator::new();
        orchestrator.register("tsunami", Duration::from_millis(20), task.clone());

        let handles = orchestrator.start();
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert!(!handles[0].is_finished());
        for handle in &handles {
            handle.abort();
        }

        assert!(task.calls.load(Ordering::SeqCst) >= 3);
        let status = orchestrator.status();
        assert_eq!(status["tsunami"].failures, 1);
        assert!(status["tsunami"].runs >= 3);
        assert!(status["tsunami"].last_count.is_some());
    }

    #[tokio::test]
    async fn test_run_once_reports_panic_as_failure() {
        let task = Arc::new(PanicsOnce {
            calls: AtomicUsize::new(0),
        });
        let mut orchestrator = Orchestrator::new();
        orchestrator.register("flood", FEED_CADENCE, task);

        let err = orchestrator.run_once("flood").await.unwrap_err();
        assert_eq!(err.kind(), "panic");
        assert!(err.to_string().contains("feed payload out of range"));
        assert_eq!(orchestrator.status()["flood"].last_error_kind, Some("panic"));
        assert_eq!(orchestrator.run_once("flood").await.unwrap(), 2);
    }

    #[test]
    fn test_cadence_lookup() {
        let mut orchestrator = Orchestrator::new();
        orchestrator.register("geofence", ALERT_CADENCE, Counting::new(false));
        assert_eq!(orchestrator.cadence_of("geofence"), Some(Duration::from_secs(60)));
        assert_eq!(orchestrator.cadence_of("flood"), None);
        assert_eq!(orchestrator.task_names(), vec!["geofence"]);
    }
}
