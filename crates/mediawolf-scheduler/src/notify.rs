//! Task events pushed to connected clients.
//! One broadcast channel fans out every status change; toasts are also kept
//! in a small in-memory history so late clients can catch up.

use std::collections::VecDeque;
use std::sync::Mutex;

use serde::Serialize;
use tokio::sync::broadcast;

use crate::tasks::Task;

const HISTORY_LIMIT: usize = 100;
const CHANNEL_CAPACITY: usize = 256;

/// A user-facing message about a task (manual start failure, failed run).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Toast {
    pub title: String,
    pub message: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

/// Event emitted to subscribers, serialized as `{"type": ..., "data": ...}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum TaskEvent {
    /// One task changed.
    UpdateTask(Task),
    /// Full task list.
    LoadTaskData(Vec<Task>),
    #[serde(rename = "new_toast_msg")]
    Toast(Toast),
}

/// Fans task events out to subscribers.
pub struct NotifyRouter {
    sender: broadcast::Sender<TaskEvent>,
    /// Toast history (ring buffer, max 100).
    history: Mutex<VecDeque<Toast>>,
}

impl NotifyRouter {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            sender,
            history: Mutex::new(VecDeque::with_capacity(HISTORY_LIMIT)),
        }
    }

    /// Send an event to every current subscriber. Having none is not an error.
    pub fn publish(&self, event: TaskEvent) {
        let _ = self.sender.send(event);
    }

    /// Record a toast and publish it.
    pub fn toast(&self, title: &str, message: &str) -> Toast {
        let toast = Toast {
            title: title.to_string(),
            message: message.to_string(),
            timestamp: chrono::Utc::now(),
        };
        {
            let mut history = self.history.lock().unwrap_or_else(|e| e.into_inner());
            if history.len() == HISTORY_LIMIT {
                history.pop_front();
            }
            history.push_back(toast.clone());
        }
        self.publish(TaskEvent::Toast(toast.clone()));
        toast
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TaskEvent> {
        self.sender.subscribe()
    }

    /// Toast history, oldest first.
    pub fn history(&self) -> Vec<Toast> {
        let history = self.history.lock().unwrap_or_else(|e| e.into_inner());
        history.iter().cloned().collect()
    }
}

impl Default for NotifyRouter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_wire_shape() {
        let task = Task::new(3, "Radarr Sync", "0 3 * * *", "", "radarr_sync");
        let json = serde_json::to_value(TaskEvent::UpdateTask(task)).unwrap();
        assert_eq!(json["type"], "update_task");
        assert_eq!(json["data"]["id"], 3);

        let json = serde_json::to_value(TaskEvent::LoadTaskData(Task::default_tasks())).unwrap();
        assert_eq!(json["type"], "load_task_data");
        assert_eq!(json["data"].as_array().unwrap().len(), 10);
    }

    #[tokio::test]
    async fn test_toast_published_and_recorded() {
        let router = NotifyRouter::new();
        let mut rx = router.subscribe();
        router.toast("Task Error", "Error with Manual start for Task Radarr Sync");

        match rx.recv().await.unwrap() {
            TaskEvent::Toast(toast) => assert_eq!(toast.title, "Task Error"),
            other => panic!("unexpected event: {other:?}"),
        }
        let json = serde_json::to_value(TaskEvent::Toast(router.history()[0].clone())).unwrap();
        assert_eq!(json["type"], "new_toast_msg");
        assert_eq!(json["data"]["message"], "Error with Manual start for Task Radarr Sync");
    }

    #[test]
    fn test_history_ring_buffer() {
        let router = NotifyRouter::default();
        for i in 0..105 {
            router.toast("Task Failed", &format!("run {i}"));
        }
        let history = router.history();
        assert_eq!(history.len(), 100);
        assert_eq!(history[0].message, "run 5");
        assert_eq!(history[99].message, "run 104");
    }
}
