//! # MediaWolf Scheduler
//!
//! Persistent cron scheduler for MediaWolf's sync and recommendation jobs.
//! A fixed set of tasks lives in one JSON file; each task that is not disabled
//! holds exactly one recurring trigger, and every status change is persisted
//! and pushed to subscribers.
//!
//! ## Architecture
//! ```text
//! TaskManager (state lock)
//!   ├── TaskStore: tasks_config.json, rewritten on every change
//!   ├── ActionRegistry: "radarr_sync" → async action → Completed | Failed
//!   ├── NotifyRouter: update_task / load_task_data / new_toast_msg
//!   └── SchedulerEngine (tokio interval, local time)
//!         ├── triggers: task id → cron schedule + next fire
//!         └── one-shot queue: manual starts
//! ```

pub mod cron;
pub mod engine;
pub mod error;
pub mod manager;
pub mod notify;
pub mod registry;
pub mod store;
pub mod tasks;

pub use cron::{CronError, CronSchedule};
pub use engine::{Clock, FireKind, Firing, ManualClock, SchedulerEngine, SystemClock};
pub use error::{Result, SchedulerError};
pub use manager::{RunOutcome, TaskManager};
pub use notify::{NotifyRouter, TaskEvent, Toast};
pub use registry::{Action, ActionError, ActionRegistry};
pub use store::TaskStore;
pub use tasks::{LAST_RUN_FORMAT, Task, TaskStatus};
