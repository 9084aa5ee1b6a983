//! Scheduler engine: the trigger table and the clock loop that fires it.
//! One recurring trigger per task id, evaluated in local time on every tick.
//! Manual runs go through a separate one-shot queue so they never touch the
//! recurring trigger of the same task.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Local};
use futures::future::BoxFuture;
use tokio::sync::{Mutex, Semaphore, mpsc, watch};
use tokio::task::JoinHandle;

use crate::cron::{CronError, CronSchedule};
use crate::error::{Result, SchedulerError};

/// Source of "now" for trigger evaluation.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Local>;
}

/// Wall clock in the host's local timezone.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Local> {
        Local::now()
    }
}

/// A clock that only moves when told to.
pub struct ManualClock {
    now: std::sync::Mutex<DateTime<Local>>,
}

impl ManualClock {
    pub fn new(at: DateTime<Local>) -> Self {
        Self {
            now: std::sync::Mutex::new(at),
        }
    }

    pub fn set(&self, at: DateTime<Local>) {
        *self.now.lock().unwrap_or_else(|e| e.into_inner()) = at;
    }

    pub fn advance(&self, by: chrono::Duration) {
        let mut now = self.now.lock().unwrap_or_else(|e| e.into_inner());
        *now += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Local> {
        *self.now.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// How a run was started.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FireKind {
    /// The task's cron trigger came due.
    Recurring,
    /// Manual start; does not affect the recurring trigger.
    OneShot,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Firing {
    pub task_id: u32,
    pub kind: FireKind,
}

/// Invoked on the runtime whenever a trigger fires.
pub type TriggerCallback = Arc<dyn Fn(Firing) -> BoxFuture<'static, ()> + Send + Sync>;

struct Trigger {
    schedule: CronSchedule,
    next_fire: Option<DateTime<Local>>,
    callback: TriggerCallback,
}

struct OneShot {
    task_id: u32,
    callback: TriggerCallback,
}

/// A firing handed to the runtime.
pub struct Dispatched {
    pub firing: Firing,
    handle: JoinHandle<()>,
}

impl Dispatched {
    /// Wait for the callback to finish.
    pub async fn join(self) {
        if let Err(e) = self.handle.await {
            tracing::error!("Task {} callback aborted: {e}", self.firing.task_id);
        }
    }
}

/// Holds at most one recurring trigger per task id and fires them on tick.
pub struct SchedulerEngine {
    clock: Arc<dyn Clock>,
    triggers: Mutex<HashMap<u32, Trigger>>,
    one_shot_tx: mpsc::UnboundedSender<OneShot>,
    one_shot_rx: Mutex<Option<mpsc::UnboundedReceiver<OneShot>>>,
    permits: Arc<Semaphore>,
    tick_interval: Duration,
}

impl SchedulerEngine {
    /// Create an engine. `max_concurrent` bounds how many runs execute at once.
    pub fn new(clock: Arc<dyn Clock>, tick_interval: Duration, max_concurrent: usize) -> Self {
        let (one_shot_tx, one_shot_rx) = mpsc::unbounded_channel();
        Self {
            clock,
            triggers: Mutex::new(HashMap::new()),
            one_shot_tx,
            one_shot_rx: Mutex::new(Some(one_shot_rx)),
            permits: Arc::new(Semaphore::new(max_concurrent.max(1))),
            // tokio intervals reject a zero period.
            tick_interval: tick_interval.max(Duration::from_millis(1)),
        }
    }

    /// Engine on the system clock, ticking once per second.
    pub fn with_defaults() -> Self {
        Self::new(Arc::new(SystemClock), Duration::from_secs(1), 4)
    }

    pub fn now(&self) -> DateTime<Local> {
        self.clock.now()
    }

    /// Install the recurring trigger for `task_id`, replacing any existing one.
    ///
    /// The old trigger is removed first, so a parse failure leaves the task
    /// with no trigger at all. Returns the next fire time.
    pub async fn schedule(
        &self,
        task_id: u32,
        cron: &str,
        callback: TriggerCallback,
    ) -> std::result::Result<Option<DateTime<Local>>, CronError> {
        let mut triggers = self.triggers.lock().await;
        if triggers.remove(&task_id).is_some() {
            tracing::debug!("Removed existing trigger for task {task_id}");
        }

        let schedule = match CronSchedule::parse(cron) {
            Ok(schedule) => schedule,
            Err(e) => {
                tracing::error!("Failed to schedule task {task_id} with cron '{cron}': {e}");
                return Err(e);
            }
        };

        let next_fire = schedule.next_after(&self.clock.now());
        match next_fire {
            Some(next) => tracing::info!("📅 Task {task_id} scheduled with cron '{cron}', next run {next}"),
            None => tracing::warn!("Task {task_id} cron '{cron}' never fires"),
        }
        triggers.insert(
            task_id,
            Trigger {
                schedule,
                next_fire,
                callback,
            },
        );
        Ok(next_fire)
    }

    /// Remove the recurring trigger for `task_id`. Returns whether one existed.
    pub async fn unschedule(&self, task_id: u32) -> bool {
        let removed = self.triggers.lock().await.remove(&task_id).is_some();
        if removed {
            tracing::info!("Task {task_id} unscheduled");
        }
        removed
    }

    /// Queue a single immediate run. Fails only when the clock loop is gone.
    pub fn trigger_now(&self, task_id: u32, callback: TriggerCallback) -> Result<()> {
        self.one_shot_tx
            .send(OneShot { task_id, callback })
            .map_err(|_| SchedulerError::ClockStopped)
    }

    pub async fn has_trigger(&self, task_id: u32) -> bool {
        self.triggers.lock().await.contains_key(&task_id)
    }

    pub async fn next_fire(&self, task_id: u32) -> Option<DateTime<Local>> {
        self.triggers
            .lock()
            .await
            .get(&task_id)
            .and_then(|t| t.next_fire)
    }

    pub async fn trigger_count(&self) -> usize {
        self.triggers.lock().await.len()
    }

    /// Fire every trigger that is due and advance it past `now`.
    ///
    /// Firings missed while the process was busy collapse into one. Callbacks
    /// are spawned after the trigger lock is released.
    pub async fn tick(&self) -> Vec<Dispatched> {
        let now = self.clock.now();
        let mut due: Vec<(u32, TriggerCallback)> = Vec::new();
        {
            let mut triggers = self.triggers.lock().await;
            for (id, trigger) in triggers.iter_mut() {
                let is_due = matches!(trigger.next_fire, Some(next) if next <= now);
                if is_due {
                    due.push((*id, trigger.callback.clone()));
                    trigger.next_fire = trigger.schedule.next_after(&now);
                }
            }
        }
        due.sort_by_key(|(id, _)| *id);

        due.into_iter()
            .map(|(task_id, callback)| {
                tracing::info!("🔔 Task {task_id} triggered");
                self.dispatch(
                    Firing {
                        task_id,
                        kind: FireKind::Recurring,
                    },
                    callback,
                )
            })
            .collect()
    }

    fn dispatch(&self, firing: Firing, callback: TriggerCallback) -> Dispatched {
        let permits = self.permits.clone();
        let handle = tokio::spawn(async move {
            let _permit = match permits.acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => {
                    tracing::warn!("Run of task {} dropped, no permits left", firing.task_id);
                    return;
                }
            };
            callback(firing).await;
        });
        Dispatched { firing, handle }
    }

    /// Run the clock loop until `shutdown` flips to true.
    ///
    /// Only one loop may own the one-shot queue; a second call returns at once.
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let Some(mut one_shots) = self.one_shot_rx.lock().await.take() else {
            tracing::warn!("Scheduler loop already running");
            return;
        };

        tracing::info!("⏰ Scheduler started (tick every {:?})", self.tick_interval);
        let mut interval = tokio::time::interval(self.tick_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    self.tick().await;
                }
                Some(job) = one_shots.recv() => {
                    tracing::info!("▶️ Task {} started manually", job.task_id);
                    self.dispatch(
                        Firing {
                            task_id: job.task_id,
                            kind: FireKind::OneShot,
                        },
                        job.callback,
                    );
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        tracing::info!("Scheduler stopped");
        // Dropping the receiver makes further trigger_now calls fail.
        drop(one_shots);
    }

    /// Spawn [`run`](Self::run) on the runtime.
    pub fn spawn(self: &Arc<Self>, shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(self.clone().run(shutdown))
    }
}
