use base64::Engine;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use super::{
  action::{Action, ActionResult},
  state::{AbortReason, LoopStatus},
};
use crate::error::Result;

/// Encoded still image of the executor's screen. Cheap to clone, so the
/// full transcript can be replayed on every oracle call.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Screenshot(Bytes);

impl Screenshot {
  pub fn new(bytes: impl Into<Bytes>) -> Self {
    Self(bytes.into())
  }

  /// Decodes base64, tolerating a `data:image/png;base64,` prefix.
  pub fn from_base64(encoded: &str) -> Result<Self> {
    let payload = match encoded.split_once(',') {
      Some((_, payload)) => payload,
      None => encoded,
    };
    let bytes = base64::engine::general_purpose::STANDARD.decode(payload.trim())?;
    Ok(Self(Bytes::from(bytes)))
  }

  pub fn to_base64(&self) -> String {
    base64::engine::general_purpose::STANDARD.encode(&self.0)
  }

  pub fn as_bytes(&self) -> &[u8] {
    &self.0
  }

  pub fn len(&self) -> usize {
    self.0.len()
  }

  pub fn is_empty(&self) -> bool {
    self.0.is_empty()
  }

  pub fn mime_type(&self) -> &'static str {
    match image::guess_format(&self.0) {
      Ok(image::ImageFormat::Jpeg) => "image/jpeg",
      Ok(image::ImageFormat::WebP) => "image/webp",
      _ => "image/png",
    }
  }
}

impl std::fmt::Debug for Screenshot {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "Screenshot({} bytes)", self.0.len())
  }
}

impl Serialize for Screenshot {
  fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
    serializer.serialize_str(&self.to_base64())
  }
}

impl<'de> Deserialize<'de> for Screenshot {
  fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
    let encoded = String::deserialize(deserializer)?;
    Self::from_base64(&encoded).map_err(serde::de::Error::custom)
  }
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct StartRequest {
  #[serde(alias = "task")]
  pub prompt: String,
  pub screenshot: Screenshot,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct ContinueRequest {
  pub session_id: String,
  pub screenshot: Screenshot,
  #[serde(default, alias = "current_location")]
  pub current_url: Option<String>,
  #[serde(default, alias = "action_results")]
  pub function_results: Vec<ActionResult>,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct ActionResponse {
  pub session_id: String,
  pub actions: Vec<Action>,
  pub reasoning: Option<String>,
  pub is_complete: bool,
  pub status: LoopStatus,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub abort_reason: Option<AbortReason>,
}

impl ActionResponse {
  pub fn is_terminal(&self) -> bool {
    self.status.is_terminal()
  }
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct SessionSummary {
  pub session_id: String,
  pub created_at: DateTime<Utc>,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct SessionList {
  pub total_sessions: usize,
  pub sessions: Vec<SessionSummary>,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct SessionDetail {
  pub session_id: String,
  pub created_at: DateTime<Utc>,
  pub last_activity: DateTime<Utc>,
  pub status: LoopStatus,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub abort_reason: Option<AbortReason>,
  pub round_trips: u32,
  pub turns: usize,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct HealthStatus {
  pub service: String,
  pub status: String,
  pub model: String,
  pub timestamp: DateTime<Utc>,
}
