//! Media manager integrations bound to task actions.
//!
//! Radarr, Sonarr, Lidarr and Readarr expose a `command` endpoint that kicks
//! off a library refresh; each `*_sync` action posts the matching command.
//! A missing or failing service makes the run `Failed`, never an error.

use std::sync::Arc;
use std::time::Duration;

use mediawolf_core::config::{ArrConfig, ServicesConfig};
use mediawolf_scheduler::{ActionError, ActionRegistry, TaskStatus};

/// One *arr sync action.
struct ArrSync {
    action: &'static str,
    service: &'static str,
    api_version: &'static str,
    command: &'static str,
}

impl ArrSync {
    fn config<'a>(&self, services: &'a ServicesConfig) -> Option<&'a ArrConfig> {
        match self.service {
            "Radarr" => services.radarr.as_ref(),
            "Sonarr" => services.sonarr.as_ref(),
            "Lidarr" => services.lidarr.as_ref(),
            "Readarr" => services.readarr.as_ref(),
            _ => None,
        }
    }
}

const ARR_SYNCS: [ArrSync; 4] = [
    ArrSync { action: "radarr_sync", service: "Radarr", api_version: "v3", command: "RefreshMovie" },
    ArrSync { action: "sonarr_sync", service: "Sonarr", api_version: "v3", command: "RefreshSeries" },
    ArrSync { action: "lidarr_sync", service: "Lidarr", api_version: "v1", command: "RefreshArtist" },
    ArrSync { action: "readarr_sync", service: "Readarr", api_version: "v1", command: "RefreshAuthor" },
];

/// Actions with no client in this service; they log and complete.
const LOCAL_ACTIONS: [&str; 6] = [
    "generate_artist_recommendations",
    "generate_movie_recommendations",
    "generate_tv_recommendations",
    "generate_book_recommendations",
    "spotify_sync",
    "youtube_sync",
];

/// HTTP client for one *arr instance.
pub struct ArrClient {
    service: &'static str,
    base_url: String,
    api_key: String,
    api_version: &'static str,
    http: reqwest::Client,
}

impl ArrClient {
    pub fn new(
        service: &'static str,
        api_version: &'static str,
        config: &ArrConfig,
    ) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            service,
            base_url: config.url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            api_version,
            http,
        })
    }

    pub fn command_url(&self) -> String {
        format!("{}/api/{}/command", self.base_url, self.api_version)
    }

    /// Post a named command. 2xx means `Completed`, anything else `Failed`.
    pub async fn send_command(&self, name: &str) -> Result<TaskStatus, ActionError> {
        tracing::info!("Sending {name} to {}", self.service);
        let response = match self
            .http
            .post(self.command_url())
            .header("X-Api-Key", &self.api_key)
            .json(&serde_json::json!({ "name": name }))
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                tracing::error!("{} API request failed: {e}", self.service);
                return Ok(TaskStatus::Failed);
            }
        };

        let status = response.status();
        if status.is_success() {
            tracing::info!("{} accepted {name}", self.service);
            Ok(TaskStatus::Completed)
        } else {
            let body = response.text().await.unwrap_or_default();
            tracing::error!("{} error code: {status}", self.service);
            tracing::error!("{} error message: {body}", self.service);
            Ok(TaskStatus::Failed)
        }
    }
}

/// Bind every default task action to its implementation.
pub fn build_registry(services: &ServicesConfig) -> ActionRegistry {
    let mut registry = ActionRegistry::new();

    for sync in &ARR_SYNCS {
        let client = match sync.config(services) {
            Some(config) => match ArrClient::new(sync.service, sync.api_version, config) {
                Ok(client) => Some(Arc::new(client)),
                Err(e) => {
                    tracing::error!("Failed to build {} client: {e}", sync.service);
                    None
                }
            },
            None => {
                tracing::warn!("{} is not configured, {} will fail", sync.service, sync.action);
                None
            }
        };

        let (service, action, command) = (sync.service, sync.action, sync.command);
        match client {
            Some(client) => registry.register(action, move || {
                let client = client.clone();
                async move { client.send_command(command).await }
            }),
            None => registry.register(action, move || async move {
                tracing::warn!("{service} is not configured, skipping {action}");
                Ok(TaskStatus::Failed)
            }),
        }
    }

    for action in LOCAL_ACTIONS {
        registry.register(action, move || async move {
            tracing::info!("{action}: nothing to refresh");
            Ok(TaskStatus::Completed)
        });
    }

    registry
}

#[cfg(test)]
mod tests {
    use super::*;
    use mediawolf_scheduler::Task;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    fn arr_config(url: &str) -> ArrConfig {
        ArrConfig {
            url: url.to_string(),
            api_key: "secret".to_string(),
            timeout_secs: 5,
        }
    }

    /// Accept one HTTP request, answer with `status_line`, and hand back the raw request.
    async fn one_shot_server(status_line: &'static str) -> (String, tokio::task::JoinHandle<String>) {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}", listener.local_addr().unwrap());
        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = vec![0u8; 4096];
            let n = socket.read(&mut buf).await.unwrap();
            let response = format!("HTTP/1.1 {status_line}\r\ncontent-length: 0\r\nconnection: close\r\n\r\n");
            socket.write_all(response.as_bytes()).await.unwrap();
            String::from_utf8_lossy(&buf[..n]).to_string()
        });
        (url, handle)
    }

    #[test]
    fn test_command_url() {
        let client = ArrClient::new("Lidarr", "v1", &arr_config("http://lidarr:8686/")).unwrap();
        assert_eq!(client.command_url(), "http://lidarr:8686/api/v1/command");
    }

    #[test]
    fn test_registry_binds_every_default_action() {
        let registry = build_registry(&ServicesConfig::default());
        assert_eq!(registry.len(), 10);
        for task in Task::default_tasks() {
            assert!(registry.contains(&task.action), "{}", task.action);
        }
    }

    #[tokio::test]
    async fn test_unconfigured_service_fails() {
        let registry = build_registry(&ServicesConfig::default());
        let radarr = registry.get("radarr_sync").unwrap();
        assert_eq!(radarr().await.unwrap(), TaskStatus::Failed);
        let spotify = registry.get("spotify_sync").unwrap();
        assert_eq!(spotify().await.unwrap(), TaskStatus::Completed);
    }

    #[tokio::test]
    async fn test_command_accepted() {
        let (url, server) = one_shot_server("201 Created").await;
        let client = ArrClient::new("Radarr", "v3", &arr_config(&url)).unwrap();
        assert_eq!(client.send_command("RefreshMovie").await.unwrap(), TaskStatus::Completed);

        let request = server.await.unwrap();
        assert!(request.starts_with("POST /api/v3/command"));
        assert!(request.to_lowercase().contains("x-api-key: secret"));
    }

    #[tokio::test]
    async fn test_command_rejected() {
        let (url, server) = one_shot_server("401 Unauthorized").await;
        let client = ArrClient::new("Sonarr", "v3", &arr_config(&url)).unwrap();
        assert_eq!(client.send_command("RefreshSeries").await.unwrap(), TaskStatus::Failed);
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_unreachable_service_fails() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}", listener.local_addr().unwrap());
        drop(listener);
        let client = ArrClient::new("Readarr", "v1", &arr_config(&url)).unwrap();
        assert_eq!(client.send_command("RefreshAuthor").await.unwrap(), TaskStatus::Failed);
    }
}
