use thiserror::Error;

#[derive(Debug, Error)]
pub enum CyberpilotError {
  #[error("Session `{0}` not found")]
  NotFound(String),
  #[error("Transcript out of order: {0}")]
  OutOfOrder(String),
  #[error("Invalid session state: {0}")]
  InvalidState(String),
  #[error("Oracle failure: {0}")]
  OracleFailure(String),
  #[error("Execution failure: {0}")]
  ExecutionFailure(String),
  #[error("Invalid payload: {0}")]
  InvalidPayload(String),
  #[error("Relay responded with {status}: {message}")]
  Relay { status: u16, message: String },
  #[error("{0}")]
  RuntimeError(String),
  #[error(transparent)]
  Base64Error(#[from] base64::DecodeError),
  #[error(transparent)]
  EnigoError(#[from] enigo::NewConError),
  #[error(transparent)]
  ImageError(#[from] image::ImageError),
  #[error(transparent)]
  InputError(#[from] enigo::InputError),
  #[error(transparent)]
  IoError(#[from] std::io::Error),
  #[error(transparent)]
  ReqwestError(#[from] reqwest::Error),
  #[error(transparent)]
  SerdeJsonError(#[from] serde_json::Error),
  #[error(transparent)]
  XCapError(#[from] xcap::XCapError),
}

impl CyberpilotError {
  pub fn not_found(session_id: &str) -> Self {
    Self::NotFound(session_id.to_string())
  }

  pub fn oracle_failure(err: impl std::fmt::Display) -> Self {
    Self::OracleFailure(err.to_string())
  }

  pub fn error_current_monitor() -> Self {
    Self::RuntimeError("Unable to find the primary monitor".into())
  }

  pub fn missing_settings(field: &str) -> Self {
    Self::RuntimeError(format!("Missing `{field}` in settings"))
  }

  pub fn invalid_settings<T: std::fmt::Debug>(field: &str, expect: &str, actual: T) -> Self {
    Self::RuntimeError(format!(
      "Invalid value for `{field}` in settings, expecting {expect}, actually {actual:?}"
    ))
  }
}

pub type Result<T> = std::result::Result<T, CyberpilotError>;
