use std::time::Duration;

use serde::{Serialize, de::DeserializeOwned};

use crate::{
  automation::{ActionResponse, ActionResult, ContinueRequest, HealthStatus, Screenshot, StartRequest},
  config::ExecutorSettings,
  error::{CyberpilotError, Result},
};

/// HTTP client for the relay's action-loop endpoints.
#[derive(Clone, Debug)]
pub struct RelayClient {
  client: reqwest::Client,
  base_url: String,
}

impl RelayClient {
  pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
    let client = reqwest::Client::builder().timeout(timeout).build()?;
    Ok(Self {
      client,
      base_url: base_url.trim_end_matches('/').to_string(),
    })
  }

  pub fn from_settings(settings: &ExecutorSettings) -> Result<Self> {
    Self::new(
      &settings.relay_url,
      Duration::from_secs(settings.request_timeout_secs.max(1)),
    )
  }

  pub fn base_url(&self) -> &str {
    &self.base_url
  }

  pub async fn health(&self) -> Result<HealthStatus> {
    let response = self.client.get(format!("{}/", self.base_url)).send().await?;
    Self::read(response).await
  }

  pub async fn start(&self, prompt: &str, screenshot: Screenshot) -> Result<ActionResponse> {
    let request = StartRequest {
      prompt: prompt.to_string(),
      screenshot,
    };
    self.post("/api/v1/start", &request).await
  }

  pub async fn continue_session(
    &self,
    session_id: &str,
    results: Vec<ActionResult>,
    screenshot: Screenshot,
    current_url: &str,
  ) -> Result<ActionResponse> {
    let request = ContinueRequest {
      session_id: session_id.to_string(),
      screenshot,
      current_url: Some(current_url.to_string()),
      function_results: results,
    };
    self.post("/api/v1/continue", &request).await
  }

  pub async fn delete_session(&self, session_id: &str) -> Result<()> {
    let response = self
      .client
      .delete(format!("{}/api/v1/session/{session_id}", self.base_url))
      .send()
      .await?;
    Self::read::<serde_json::Value>(response).await.map(|_| ())
  }

  async fn post<B: Serialize, T: DeserializeOwned>(&self, path: &str, body: &B) -> Result<T> {
    let response = self
      .client
      .post(format!("{}{path}", self.base_url))
      .json(body)
      .send()
      .await?;
    Self::read(response).await
  }

  async fn read<T: DeserializeOwned>(response: reqwest::Response) -> Result<T> {
    let status = response.status();
    if !status.is_success() {
      let body = response.text().await.unwrap_or_default();
      let message = serde_json::from_str::<serde_json::Value>(&body)
        .ok()
        .and_then(|value| value.get("error").and_then(|e| e.as_str()).map(str::to_string))
        .unwrap_or(body);
      return Err(CyberpilotError::Relay {
        status: status.as_u16(),
        message,
      });
    }
    Ok(response.json::<T>().await?)
  }
}
