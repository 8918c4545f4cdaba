//! Common test utilities - AdvisorTest harness for end-to-end testing

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use advisord::backend::ScriptedBackend;
use advisord::client::AdvisorClient;
use advisord::{Config, Server};
use anyhow::Result;
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use tempfile::TempDir;
use tokio::task::JoinHandle;

/// Analysis text in the model's schema with three recommendations
pub const ANALYSIS_ABC: &str = r#"Here is my assessment.

```json
{
  "current_assessment": {
    "overall_description": "A four-lane arterial with narrow sidewalks",
    "identified_issues": [
      {"category": "Walkability", "details": "Sidewalks under 1.5m"},
      {"category": "Greenery", "details": "No street trees"}
    ]
  },
  "improvement_recommendations": [
    {"category": "Walkability", "recommendation": "Widen sidewalks", "expected_benefits": "Comfortable walking"},
    {"category": "Transportation", "recommendation": "Add a protected bike lane", "expected_benefits": "Safer cycling"},
    {"category": "Greenery", "recommendation": "Plant street trees", "expected_benefits": "Shade and cooling"}
  ],
  "urban_planning_principles": ["Complete streets", "Human scale", "Green infrastructure"]
}
```"#;

/// Test harness that spawns a real advisord server on a random port
pub struct AdvisorTest {
    pub addr: SocketAddr,
    pub client: Client,
    pub backend: Arc<ScriptedBackend>,
    pub data_dir: TempDir,
    server: Arc<Server>,
    _handle: JoinHandle<()>,
}

impl AdvisorTest {
    /// Start a new test server instance
    pub async fn start() -> Result<Self> {
        Self::start_with(|_| {}).await
    }

    /// Start with a tweaked configuration
    pub async fn start_with(tweak: impl FnOnce(&mut Config)) -> Result<Self> {
        // Find a random available port
        let listener = std::net::TcpListener::bind("127.0.0.1:0")?;
        let addr = listener.local_addr()?;
        drop(listener);

        let data_dir = tempfile::tempdir()?;
        let mut config = Config {
            bind_addr: addr,
            data_dir: data_dir.path().to_path_buf(),
            ..Config::default()
        };
        tweak(&mut config);

        let backend = Arc::new(ScriptedBackend::new());
        let server = Arc::new(Server::with_backend(config, backend.clone()));
        let server_clone = server.clone();

        // Spawn the server in a background task
        let handle = tokio::spawn(async move {
            if let Err(e) = server_clone.run().await {
                eprintln!("Server error: {}", e);
            }
        });

        let client = Client::builder().timeout(Duration::from_secs(10)).build()?;

        // Poll until server is ready (max 2 seconds)
        let mut ready = false;
        for _ in 0..20 {
            tokio::time::sleep(Duration::from_millis(100)).await;
            if client
                .get(format!("http://{}/health", addr))
                .send()
                .await
                .is_ok()
            {
                ready = true;
                break;
            }
        }

        if !ready {
            panic!("Server failed to start within 2 seconds");
        }

        Ok(Self {
            addr,
            client,
            backend,
            data_dir,
            server,
            _handle: handle,
        })
    }

    /// Get the base URL for the server
    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Typed client pointed at this server
    pub fn advisor_client(&self) -> AdvisorClient {
        AdvisorClient::new(&self.base_url(), Duration::from_secs(10))
            .expect("failed to build advisor client")
    }

    /// Make a GET request
    pub async fn get(&self, path: &str) -> Result<reqwest::Response> {
        Ok(self
            .client
            .get(format!("{}{}", self.base_url(), path))
            .send()
            .await?)
    }

    /// POST a multipart upload to the analyze endpoint
    pub async fn upload(
        &self,
        query: &str,
        file_name: &str,
        mime: &str,
        data: Vec<u8>,
    ) -> Result<reqwest::Response> {
        let part = Part::bytes(data)
            .file_name(file_name.to_string())
            .mime_str(mime)?;
        let form = Form::new().part("image", part);
        Ok(self
            .client
            .post(format!("{}/api/analyze-urban-space{}", self.base_url(), query))
            .multipart(form)
            .send()
            .await?)
    }

    /// Files currently in a data subdirectory
    pub fn files_in(&self, subdir: &str) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(self.data_dir.path().join(subdir))
            .map(|entries| {
                entries
                    .filter_map(|e| e.ok())
                    .map(|e| e.file_name().to_string_lossy().into_owned())
                    .collect()
            })
            .unwrap_or_default();
        names.sort();
        names
    }

    /// Shutdown the server gracefully
    pub fn shutdown(&self) {
        self.server.shutdown();
    }
}

impl Drop for AdvisorTest {
    fn drop(&mut self) {
        self.shutdown();
    }
}
