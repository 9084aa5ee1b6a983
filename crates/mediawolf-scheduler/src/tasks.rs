//! Task definitions: the core data model for scheduled work.

use serde::{Deserialize, Serialize};

/// `last_run` stamp format, e.g. `16-October-2026 04:30:00`.
pub const LAST_RUN_FORMAT: &str = "%d-%B-%Y %H:%M:%S";

/// A scheduled task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    /// Unique task ID. Also the trigger key and the JSON map key.
    pub id: u32,
    /// Human-readable name.
    pub name: String,
    /// 5-field cron expression.
    pub cron: String,
    pub description: String,
    /// Action registry key invoked when the task fires.
    #[serde(rename = "function_name")]
    pub action: String,
    /// When the last run finished, or empty if the task never ran.
    #[serde(default)]
    pub last_run: String,
    #[serde(default)]
    pub status: TaskStatus,
}

/// Task status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TaskStatus {
    #[default]
    Scheduled,
    Running,
    Disabled,
    Stopped,
    Updated,
    Error,
    Completed,
    Failed,
}

impl TaskStatus {
    /// Statuses an action may report as the result of a run.
    pub fn is_run_result(&self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Error)
    }

    /// Terminal statuses that warrant a failure toast.
    pub fn is_failure(&self) -> bool {
        matches!(self, TaskStatus::Error | TaskStatus::Failed)
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TaskStatus::Scheduled => "Scheduled",
            TaskStatus::Running => "Running",
            TaskStatus::Disabled => "Disabled",
            TaskStatus::Stopped => "Stopped",
            TaskStatus::Updated => "Updated",
            TaskStatus::Error => "Error",
            TaskStatus::Completed => "Completed",
            TaskStatus::Failed => "Failed",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for TaskStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Scheduled" => Ok(TaskStatus::Scheduled),
            "Running" => Ok(TaskStatus::Running),
            "Disabled" => Ok(TaskStatus::Disabled),
            "Stopped" => Ok(TaskStatus::Stopped),
            "Updated" => Ok(TaskStatus::Updated),
            "Error" => Ok(TaskStatus::Error),
            "Completed" => Ok(TaskStatus::Completed),
            "Failed" => Ok(TaskStatus::Failed),
            other => Err(format!("unknown task status: {other}")),
        }
    }
}

impl Task {
    pub fn new(id: u32, name: &str, cron: &str, description: &str, action: &str) -> Self {
        Self {
            id,
            name: name.to_string(),
            cron: cron.to_string(),
            description: description.to_string(),
            action: action.to_string(),
            last_run: String::new(),
            status: TaskStatus::Scheduled,
        }
    }

    /// The ten built-in sync and recommendation tasks, one per hour from 01:00.
    pub fn default_tasks() -> Vec<Task> {
        vec![
            Task::new(1, "Lidarr Sync", "0 1 * * *", "Refreshes Lidarr artist list.", "lidarr_sync"),
            Task::new(2, "Artist Recommendations", "0 2 * * *", "Generates artist recommendations list.", "generate_artist_recommendations"),
            Task::new(3, "Radarr Sync", "0 3 * * *", "Updates Radarr movie database.", "radarr_sync"),
            Task::new(4, "Movie Recommendations", "0 4 * * *", "Generates movie recommendations list.", "generate_movie_recommendations"),
            Task::new(5, "Sonarr Sync", "0 5 * * *", "Syncs Sonarr series list.", "sonarr_sync"),
            Task::new(6, "TV Recommendations", "0 6 * * *", "Generates tv recommendations list.", "generate_tv_recommendations"),
            Task::new(7, "Readarr Sync", "0 7 * * *", "Updates Readarr book collection.", "readarr_sync"),
            Task::new(8, "Book Recommendations", "0 8 * * *", "Generates book recommendations list.", "generate_book_recommendations"),
            Task::new(9, "Spotify Sync", "0 9 * * *", "Syncs Spotify playlists.", "spotify_sync"),
            Task::new(10, "YouTube Sync", "0 10 * * *", "Syncs YouTube playlists and channels.", "youtube_sync"),
        ]
    }

    /// Whether the task may hold a recurring trigger.
    pub fn is_schedulable(&self) -> bool {
        self.status != TaskStatus::Disabled
    }
}
