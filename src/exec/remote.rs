//! HTTP transport for remote computer-use sessions.
//!
//! Speaks a minimal instance API: `POST /v1/instances` starts an instance,
//! `POST /v1/instances/{id}/act` submits input and returns the agent's turn,
//! `POST /v1/instances/{id}/stop` tears it down.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;

use super::session::{AgentSession, InputMode, SessionBackend};

/// Backend that opens sessions against a remote instance API.
///
/// With no endpoint configured, `open` fails and computer-use leaves resolve
/// to error-string results - the tree still completes.
pub struct RemoteSessionBackend {
    client: Client,
    endpoint: Option<String>,
    api_key: Option<String>,
}

impl RemoteSessionBackend {
    pub fn new(endpoint: Option<String>, api_key: Option<String>) -> Self {
        Self {
            client: Client::new(),
            endpoint: endpoint.map(|e| e.trim_end_matches('/').to_string()),
            api_key,
        }
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => request.header("Authorization", format!("Bearer {}", key)),
            None => request,
        }
    }
}

#[derive(Debug, Deserialize)]
struct StartResponse {
    instance_id: String,
}

#[derive(Debug, Deserialize)]
struct ActResponse {
    output: String,
}

#[async_trait]
impl SessionBackend for RemoteSessionBackend {
    async fn open(&self, _mode: InputMode) -> anyhow::Result<Box<dyn AgentSession>> {
        let endpoint = self
            .endpoint
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("no remote session endpoint configured"))?;

        let response = self
            .authorize(self.client.post(format!("{}/v1/instances", endpoint)))
            .send()
            .await?
            .error_for_status()?;
        let started: StartResponse = response.json().await?;

        tracing::info!("started remote session instance {}", started.instance_id);

        Ok(Box::new(RemoteSession {
            client: self.client.clone(),
            endpoint: endpoint.clone(),
            api_key: self.api_key.clone(),
            instance_id: started.instance_id,
            terminated: false,
        }))
    }
}

struct RemoteSession {
    client: Client,
    endpoint: String,
    api_key: Option<String>,
    instance_id: String,
    terminated: bool,
}

impl RemoteSession {
    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => request.header("Authorization", format!("Bearer {}", key)),
            None => request,
        }
    }
}

#[async_trait]
impl AgentSession for RemoteSession {
    async fn submit(&mut self, prompt: &str) -> anyhow::Result<String> {
        let response = self
            .authorize(self.client.post(format!(
                "{}/v1/instances/{}/act",
                self.endpoint, self.instance_id
            )))
            .json(&json!({ "prompt": prompt }))
            .send()
            .await?
            .error_for_status()?;
        let turn: ActResponse = response.json().await?;
        Ok(turn.output)
    }

    async fn terminate(&mut self) {
        if self.terminated {
            return;
        }
        self.terminated = true;
        let result = self
            .authorize(self.client.post(format!(
                "{}/v1/instances/{}/stop",
                self.endpoint, self.instance_id
            )))
            .send()
            .await;
        if let Err(e) = result {
            tracing::warn!(
                "failed to stop remote session instance {}: {}",
                self.instance_id,
                e
            );
        }
    }
}
