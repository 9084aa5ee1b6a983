//! Task manager: owns the task list and drives every status transition.
//!
//! All mutations go through one async lock so the in-memory list, the JSON
//! file and the engine's trigger table move together. Lock order is always
//! manager state first, then the engine's trigger table.
//!
//! ```text
//! manual_start ─► status Running ─► engine.trigger_now ─┐
//! cron trigger ───────────────────────────────────────────┼─► execute ─► action ─► terminal status
//! stop / disable ─► unschedule                             │                       + last_run
//! enable / update_cron ─► schedule (replaces)              └─ overlapping run: skipped
//! ```

use std::any::Any;
use std::collections::HashSet;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Weak};

use futures::FutureExt;
use tokio::sync::{Mutex, broadcast};

use crate::cron::CronSchedule;
use crate::engine::{FireKind, Firing, SchedulerEngine, TriggerCallback};
use crate::error::{Result, SchedulerError};
use crate::notify::{NotifyRouter, TaskEvent, Toast};
use crate::registry::{ActionError, ActionRegistry};
use crate::store::TaskStore;
use crate::tasks::{LAST_RUN_FORMAT, Task, TaskStatus};

/// Result of asking the manager to run a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// The action ran and reported this status.
    Finished(TaskStatus),
    /// Nothing ran: a run was already in flight, or the task is disabled.
    Skipped,
}

struct ManagerState {
    tasks: Vec<Task>,
    /// Ids whose action is executing right now.
    in_flight: HashSet<u32>,
}

pub struct TaskManager {
    state: Mutex<ManagerState>,
    store: TaskStore,
    registry: ActionRegistry,
    engine: Arc<SchedulerEngine>,
    notify: NotifyRouter,
}

fn find_mut(tasks: &mut [Task], id: u32) -> Result<&mut Task> {
    tasks
        .iter_mut()
        .find(|t| t.id == id)
        .ok_or(SchedulerError::TaskNotFound { id })
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

impl TaskManager {
    /// Load tasks from `store` and arm a trigger for every task that is not disabled.
    pub async fn start(
        store: TaskStore,
        registry: ActionRegistry,
        engine: Arc<SchedulerEngine>,
    ) -> Arc<Self> {
        let tasks = store.load();
        for task in &tasks {
            if !registry.contains(&task.action) {
                tracing::warn!(
                    "Task {} ({}) uses unregistered action '{}'",
                    task.id,
                    task.name,
                    task.action
                );
            }
        }

        let manager = Arc::new(Self {
            state: Mutex::new(ManagerState {
                tasks,
                in_flight: HashSet::new(),
            }),
            store,
            registry,
            engine,
            notify: NotifyRouter::new(),
        });
        manager.schedule_all().await;
        manager
    }

    async fn schedule_all(self: &Arc<Self>) {
        let state = self.state.lock().await;
        let mut armed = 0;
        for task in state.tasks.iter().filter(|t| t.is_schedulable()) {
            if self
                .engine
                .schedule(task.id, &task.cron, self.trigger_callback())
                .await
                .is_ok()
            {
                armed += 1;
            }
        }
        tracing::info!("Scheduled {armed} of {} task(s)", state.tasks.len());
    }

    /// Callback handed to the engine. Holds a weak reference so the engine
    /// does not keep the manager alive.
    fn trigger_callback(self: &Arc<Self>) -> TriggerCallback {
        let manager: Weak<Self> = Arc::downgrade(self);
        Arc::new(move |firing: Firing| {
            let manager = manager.clone();
            async move {
                let Some(manager) = manager.upgrade() else {
                    return;
                };
                if let Err(e) = manager.execute(firing).await {
                    tracing::error!("Run of task {} failed: {e}", firing.task_id);
                }
            }
            .boxed()
        })
    }

    pub fn engine(&self) -> &Arc<SchedulerEngine> {
        &self.engine
    }

    pub fn store(&self) -> &TaskStore {
        &self.store
    }

    /// Snapshot of all tasks in insertion order.
    pub async fn list(&self) -> Vec<Task> {
        self.state.lock().await.tasks.clone()
    }

    pub async fn get(&self, id: u32) -> Result<Task> {
        let state = self.state.lock().await;
        state
            .tasks
            .iter()
            .find(|t| t.id == id)
            .cloned()
            .ok_or(SchedulerError::TaskNotFound { id })
    }

    /// Publish the full task list to subscribers and return it.
    pub async fn request_tasks(&self) -> Vec<Task> {
        let tasks = self.list().await;
        self.notify.publish(TaskEvent::LoadTaskData(tasks.clone()));
        tasks
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TaskEvent> {
        self.notify.subscribe()
    }

    /// Recent toasts, oldest first.
    pub fn notifications(&self) -> Vec<Toast> {
        self.notify.history()
    }

    /// Record and publish a toast for a failure outside a run.
    pub fn toast(&self, title: &str, message: &str) -> Toast {
        self.notify.toast(title, message)
    }

    /// Mark the task `Running` and queue a single immediate run.
    ///
    /// The recurring trigger is left as it is. If the run cannot be queued the
    /// previous status is restored and a toast is emitted.
    pub async fn manual_start(self: &Arc<Self>, id: u32) -> Result<Task> {
        let mut guard = self.state.lock().await;
        let state = &mut *guard;
        let task = find_mut(&mut state.tasks, id)?;
        if state.in_flight.contains(&id) || task.status == TaskStatus::Running {
            return Err(SchedulerError::AlreadyRunning { id });
        }
        if task.status == TaskStatus::Disabled {
            return Err(SchedulerError::InvalidTransition {
                id,
                status: task.status,
                reason: "enable the task before starting it",
            });
        }

        let previous = task.status;
        task.status = TaskStatus::Running;
        let snapshot = task.clone();
        self.persist(&state.tasks);
        self.notify.publish(TaskEvent::UpdateTask(snapshot.clone()));

        if let Err(e) = self.engine.trigger_now(id, self.trigger_callback()) {
            tracing::error!("Error with manual start for task {id}: {e}");
            let task = find_mut(&mut state.tasks, id)?;
            task.status = previous;
            let restored = task.clone();
            self.persist(&state.tasks);
            self.notify.publish(TaskEvent::UpdateTask(restored.clone()));
            self.notify.toast(
                "Task Error",
                &format!("Error with Manual start for Task {}: {e}", restored.name),
            );
            return Err(e);
        }

        tracing::info!("Task {id}: {} started manually", snapshot.name);
        Ok(snapshot)
    }

    /// Remove the recurring trigger and mark the task `Stopped`.
    /// The trigger comes back on the next restart.
    pub async fn stop(&self, id: u32) -> Result<Task> {
        self.halt(id, TaskStatus::Stopped).await
    }

    /// Remove the recurring trigger and mark the task `Disabled` (survives restarts).
    pub async fn disable(&self, id: u32) -> Result<Task> {
        self.halt(id, TaskStatus::Disabled).await
    }

    async fn halt(&self, id: u32, status: TaskStatus) -> Result<Task> {
        let mut state = self.state.lock().await;
        let task = find_mut(&mut state.tasks, id)?;
        task.status = status;
        let snapshot = task.clone();

        self.engine.unschedule(id).await;
        self.persist(&state.tasks);
        self.notify.publish(TaskEvent::UpdateTask(snapshot.clone()));
        tracing::info!("Task {id}: {} {}", snapshot.name, status);
        Ok(snapshot)
    }

    /// Re-arm a disabled task and mark it `Scheduled`.
    pub async fn enable(self: &Arc<Self>, id: u32) -> Result<Task> {
        let mut state = self.state.lock().await;
        let cron = {
            let task = find_mut(&mut state.tasks, id)?;
            if task.status != TaskStatus::Disabled {
                return Err(SchedulerError::InvalidTransition {
                    id,
                    status: task.status,
                    reason: "only disabled tasks can be enabled",
                });
            }
            task.cron.clone()
        };

        self.engine
            .schedule(id, &cron, self.trigger_callback())
            .await
            .map_err(|source| SchedulerError::InvalidCron { id, source })?;

        let task = find_mut(&mut state.tasks, id)?;
        task.status = TaskStatus::Scheduled;
        let snapshot = task.clone();
        self.persist(&state.tasks);
        self.notify.publish(TaskEvent::UpdateTask(snapshot.clone()));
        tracing::info!("Task {id}: {} enabled", snapshot.name);
        Ok(snapshot)
    }

    /// Replace the task's cron expression, mark it `Updated` and re-arm it.
    ///
    /// The expression is validated before anything changes.
    pub async fn update_cron(self: &Arc<Self>, id: u32, new_cron: &str) -> Result<Task> {
        let mut state = self.state.lock().await;
        find_mut(&mut state.tasks, id)?;
        let schedule = CronSchedule::parse(new_cron)
            .map_err(|source| SchedulerError::InvalidCron { id, source })?;
        let cron = schedule.expression().to_string();

        self.engine
            .schedule(id, &cron, self.trigger_callback())
            .await
            .map_err(|source| SchedulerError::InvalidCron { id, source })?;

        let task = find_mut(&mut state.tasks, id)?;
        task.cron = cron;
        task.status = TaskStatus::Updated;
        let snapshot = task.clone();
        self.persist(&state.tasks);
        self.notify.publish(TaskEvent::UpdateTask(snapshot.clone()));
        tracing::info!("Task {id}: {} cron updated to '{}'", snapshot.name, snapshot.cron);
        Ok(snapshot)
    }

    /// Run the task's action now, on the calling task.
    pub async fn run(&self, id: u32) -> Result<RunOutcome> {
        self.execute(Firing {
            task_id: id,
            kind: FireKind::OneShot,
        })
        .await
    }

    /// Execute one firing: `Running`, invoke the action, then record the
    /// terminal status and `last_run`.
    ///
    /// A firing that arrives while the same task is still running is skipped,
    /// as is any firing (recurring or queued manual start) for a task that is
    /// disabled by the time it runs. If the
    /// status was changed during the run (stop, disable, cron update), that
    /// status is kept; `last_run` is stamped regardless.
    pub async fn execute(&self, firing: Firing) -> Result<RunOutcome> {
        let id = firing.task_id;
        let (name, action_name) = {
            let mut guard = self.state.lock().await;
            let state = &mut *guard;
            let task = find_mut(&mut state.tasks, id)?;
            if state.in_flight.contains(&id) {
                tracing::warn!("Task {id}: {} is still running, skipping this run", task.name);
                return Ok(RunOutcome::Skipped);
            }
            if task.status == TaskStatus::Disabled {
                tracing::info!("Task {id}: {} is disabled, skipping {:?} run", task.name, firing.kind);
                return Ok(RunOutcome::Skipped);
            }

            task.status = TaskStatus::Running;
            let snapshot = task.clone();
            state.in_flight.insert(id);
            self.persist(&state.tasks);
            self.notify.publish(TaskEvent::UpdateTask(snapshot.clone()));
            (snapshot.name, snapshot.action)
        };

        tracing::info!("🚀 Running task {id}: {name}");
        let result = match self.registry.get(&action_name) {
            Some(action) => AssertUnwindSafe(action())
                .catch_unwind()
                .await
                .unwrap_or_else(|payload| Err(ActionError::Panicked(panic_message(payload.as_ref())))),
            None => Err(ActionError::NotRegistered(action_name)),
        };
        let outcome = match &result {
            Ok(status) if status.is_run_result() => {
                tracing::info!("Task {id}: {name} - {status}");
                *status
            }
            Ok(status) => {
                tracing::error!("Task {id}: {name} returned non-terminal status {status}, recording Error");
                TaskStatus::Error
            }
            Err(e) => {
                tracing::error!("Error running task '{id}': {e}");
                TaskStatus::Error
            }
        };

        let mut guard = self.state.lock().await;
        let state = &mut *guard;
        state.in_flight.remove(&id);
        let task = find_mut(&mut state.tasks, id)?;
        if task.status == TaskStatus::Running {
            task.status = outcome;
        } else {
            tracing::info!("Task {id} changed to {} during the run, keeping it", task.status);
        }
        task.last_run = self.engine.now().format(LAST_RUN_FORMAT).to_string();
        let snapshot = task.clone();
        self.persist(&state.tasks);
        self.notify.publish(TaskEvent::UpdateTask(snapshot));

        if outcome.is_failure() {
            let message = match result {
                Err(e) => format!("Task {name} failed: {e}"),
                Ok(_) => format!("Task {name} finished with status {outcome}"),
            };
            self.notify.toast("Task Failed", &message);
        }
        Ok(RunOutcome::Finished(outcome))
    }

    fn persist(&self, tasks: &[Task]) {
        if let Err(e) = self.store.save(tasks) {
            tracing::error!("Failed to save tasks: {e}");
        }
    }
}
