//! WebSocket handler for live task updates.
//!
//! Protocol:
//! ← Server sends: {"type":"load_task_data","data":[...]} on connect
//! → Client sends: {"type":"request_tasks"}
//! → Client sends: {"type":"task_manual_start","task_id":3}  (also task_stop, task_disable, task_enable)
//! → Client sends: {"type":"update_task_cron","taskId":3,"newCron":"30 4 * * *"}
//! ← Server sends: {"type":"update_task","data":{...}} on every status change
//! ← Server sends: {"type":"new_toast_msg","data":{"title":"...","message":"..."}}
//!   on run results and whenever a command does not take effect
//! ← Server sends: {"type":"error","message":"..."} for a message that does not parse

use std::sync::Arc;

use axum::{
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::IntoResponse,
};
use futures::{SinkExt, StreamExt};
use mediawolf_scheduler::{SchedulerError, TaskEvent};
use serde::Deserialize;
use tokio::sync::{broadcast, mpsc};

use super::server::AppState;

/// Commands accepted from a WebSocket client.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientCommand {
    RequestTasks,
    TaskManualStart {
        task_id: u32,
    },
    TaskStop {
        task_id: u32,
    },
    TaskDisable {
        task_id: u32,
    },
    TaskEnable {
        task_id: u32,
    },
    UpdateTaskCron {
        #[serde(rename = "taskId")]
        task_id: u32,
        #[serde(rename = "newCron")]
        new_cron: String,
    },
}

/// WebSocket upgrade handler.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Run a client command against the task manager.
pub async fn execute_command(state: &AppState, command: ClientCommand) -> Result<(), SchedulerError> {
    let manager = &state.manager;
    match command {
        ClientCommand::RequestTasks => {
            manager.request_tasks().await;
        }
        ClientCommand::TaskManualStart { task_id } => {
            manager.manual_start(task_id).await?;
        }
        ClientCommand::TaskStop { task_id } => {
            manager.stop(task_id).await?;
        }
        ClientCommand::TaskDisable { task_id } => {
            manager.disable(task_id).await?;
        }
        ClientCommand::TaskEnable { task_id } => {
            manager.enable(task_id).await?;
        }
        ClientCommand::UpdateTaskCron { task_id, new_cron } => {
            manager.update_cron(task_id, &new_cron).await?;
        }
    }
    Ok(())
}

/// Toast title shown when `command` fails.
fn failure_title(command: &ClientCommand) -> &'static str {
    match command {
        ClientCommand::RequestTasks => "Failed to load Tasks",
        ClientCommand::TaskManualStart { .. } => "Failed to start Task",
        ClientCommand::TaskStop { .. } => "Failed to stop Task",
        ClientCommand::TaskDisable { .. } => "Failed to disable Task",
        ClientCommand::TaskEnable { .. } => "Failed to enable Task",
        ClientCommand::UpdateTaskCron { .. } => "Failed to update Task schedule",
    }
}

/// Run a command and report a failure to every client as a toast.
pub async fn handle_command(state: &AppState, command: ClientCommand) {
    let title = failure_title(&command);
    match execute_command(state, command).await {
        Ok(()) => {}
        // The manager has already toasted this one.
        Err(e @ SchedulerError::ClockStopped) => tracing::warn!("WS command failed: {e}"),
        Err(e) => {
            tracing::warn!("WS command failed: {e}");
            let message = match e {
                SchedulerError::TaskNotFound { id } => format!("Task {id} not found, check config"),
                other => other.to_string(),
            };
            state.manager.toast(title, &message);
        }
    }
}

fn error_message(message: &str) -> serde_json::Value {
    serde_json::json!({
        "type": "error",
        "message": message,
    })
}

/// Handle a WebSocket connection.
async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    tracing::info!("WebSocket client connected");

    let (mut sink, mut stream) = socket.split();
    let mut events = state.manager.subscribe();
    let (reply_tx, mut reply_rx) = mpsc::unbounded_channel::<serde_json::Value>();

    let tasks = state.manager.list().await;
    match serde_json::to_value(TaskEvent::LoadTaskData(tasks)) {
        Ok(initial) => {
            let _ = reply_tx.send(initial);
        }
        Err(e) => tracing::error!("Failed to serialize task list: {e}"),
    }

    // Writer: fans manager events and command replies into the socket.
    let writer = tokio::spawn(async move {
        loop {
            let value = tokio::select! {
                event = events.recv() => match event {
                    Ok(event) => match serde_json::to_value(&event) {
                        Ok(value) => value,
                        Err(e) => {
                            tracing::error!("Failed to serialize task event: {e}");
                            continue;
                        }
                    },
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!("WS client lagging, {skipped} event(s) dropped");
                        continue;
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                },
                reply = reply_rx.recv() => match reply {
                    Some(value) => value,
                    None => break,
                },
            };
            if let Err(e) = sink.send(Message::Text(value.to_string().into())).await {
                tracing::error!("WS send failed: {e}");
                break;
            }
        }
    });

    let mut command_count: u64 = 0;
    while let Some(msg) = stream.next().await {
        match msg {
            Ok(Message::Text(text)) => {
                let command = match serde_json::from_str::<ClientCommand>(&text) {
                    Ok(command) => command,
                    Err(e) => {
                        let _ = reply_tx.send(error_message(&format!("Invalid command: {e}")));
                        continue;
                    }
                };
                command_count += 1;
                tracing::debug!("WS command: {command:?}");
                handle_command(&state, command).await;
            }
            Ok(Message::Close(_)) => {
                tracing::info!("WebSocket client disconnected (close frame)");
                break;
            }
            Err(e) => {
                tracing::error!("WebSocket error: {e}");
                break;
            }
            _ => {}
        }
    }

    writer.abort();
    tracing::info!("WebSocket connection closed (total commands: {command_count})");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routes::tests::test_state;
    use mediawolf_scheduler::TaskStatus;

    #[test]
    fn test_parse_commands() {
        let cmd: ClientCommand = serde_json::from_str(r#"{"type":"request_tasks"}"#).unwrap();
        assert_eq!(cmd, ClientCommand::RequestTasks);

        let cmd: ClientCommand =
            serde_json::from_str(r#"{"type":"task_manual_start","task_id":3}"#).unwrap();
        assert_eq!(cmd, ClientCommand::TaskManualStart { task_id: 3 });

        let cmd: ClientCommand =
            serde_json::from_str(r#"{"type":"update_task_cron","taskId":3,"newCron":"30 4 * * *"}"#)
                .unwrap();
        assert_eq!(
            cmd,
            ClientCommand::UpdateTaskCron {
                task_id: 3,
                new_cron: "30 4 * * *".into()
            }
        );
    }

    #[test]
    fn test_parse_rejects_unknown() {
        assert!(serde_json::from_str::<ClientCommand>(r#"{"type":"task_delete","task_id":3}"#).is_err());
        assert!(serde_json::from_str::<ClientCommand>(r#"{"type":"task_stop"}"#).is_err());
    }

    #[tokio::test]
    async fn test_execute_commands() {
        let (_dir, state) = test_state().await;
        let mut events = state.manager.subscribe();

        execute_command(&state, ClientCommand::TaskDisable { task_id: 2 }).await.unwrap();
        match events.recv().await.unwrap() {
            TaskEvent::UpdateTask(task) => assert_eq!(task.status, TaskStatus::Disabled),
            other => panic!("unexpected event: {other:?}"),
        }

        execute_command(
            &state,
            ClientCommand::UpdateTaskCron {
                task_id: 4,
                new_cron: "15 6 * * 1-5".into(),
            },
        )
        .await
        .unwrap();
        assert_eq!(state.manager.get(4).await.unwrap().cron, "15 6 * * 1-5");

        execute_command(&state, ClientCommand::RequestTasks).await.unwrap();
        let mut saw_list = false;
        while let Ok(event) = events.try_recv() {
            if let TaskEvent::LoadTaskData(tasks) = event {
                assert_eq!(tasks.len(), 10);
                saw_list = true;
            }
        }
        assert!(saw_list);

        let err = execute_command(&state, ClientCommand::TaskEnable { task_id: 99 })
            .await
            .unwrap_err();
        assert!(matches!(err, SchedulerError::TaskNotFound { id: 99 }));
    }

    #[tokio::test]
    async fn test_failed_command_toasts() {
        let (_dir, state) = test_state().await;
        let mut events = state.manager.subscribe();

        handle_command(&state, ClientCommand::TaskEnable { task_id: 99 }).await;
        match events.recv().await.unwrap() {
            TaskEvent::Toast(toast) => {
                assert_eq!(toast.title, "Failed to enable Task");
                assert_eq!(toast.message, "Task 99 not found, check config");
            }
            other => panic!("unexpected event: {other:?}"),
        }

        handle_command(
            &state,
            ClientCommand::UpdateTaskCron {
                task_id: 4,
                new_cron: "61 * * * *".into(),
            },
        )
        .await;
        match events.recv().await.unwrap() {
            TaskEvent::Toast(toast) => assert_eq!(toast.title, "Failed to update Task schedule"),
            other => panic!("unexpected event: {other:?}"),
        }

        let history = state.manager.notifications();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].title, "Failed to enable Task");

        // Success publishes the update only.
        handle_command(&state, ClientCommand::TaskDisable { task_id: 2 }).await;
        assert!(matches!(events.recv().await.unwrap(), TaskEvent::UpdateTask(_)));
        assert_eq!(state.manager.notifications().len(), 2);
    }
}
