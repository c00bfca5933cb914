use serde::{Deserialize, Serialize};

use super::{
  action::{Action, ActionResult},
  types::Screenshot,
};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OracleTurn {
  pub reasoning: Option<String>,
  pub actions: Vec<Action>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExecutorTurn {
  pub results: Vec<ActionResult>,
  pub screenshot: Screenshot,
  pub current_location: Option<String>,
}

/// One entry of a session transcript.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Turn {
  Prompt { text: String, screenshot: Screenshot },
  Oracle(OracleTurn),
  Executor(ExecutorTurn),
}

impl Turn {
  pub fn label(&self) -> &'static str {
    match self {
      Self::Prompt { .. } => "prompt",
      Self::Oracle(_) => "oracle",
      Self::Executor(_) => "executor",
    }
  }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LoopStatus {
  #[default]
  Idle,
  AwaitingOracle,
  ActionsPending,
  Complete,
  Aborted,
}

impl LoopStatus {
  pub fn is_terminal(&self) -> bool {
    matches!(self, Self::Complete | Self::Aborted)
  }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AbortReason {
  BoundExceeded,
  OracleFailures,
}

impl std::fmt::Display for AbortReason {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      Self::BoundExceeded => write!(f, "iteration bound exceeded"),
      Self::OracleFailures => write!(f, "too many consecutive oracle failures"),
    }
  }
}

/// Per-session position in the action loop.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LoopState {
  #[default]
  Idle,
  AwaitingOracle,
  ActionsPending,
  Complete,
  Aborted(AbortReason),
}

impl LoopState {
  pub fn status(&self) -> LoopStatus {
    match self {
      Self::Idle => LoopStatus::Idle,
      Self::AwaitingOracle => LoopStatus::AwaitingOracle,
      Self::ActionsPending => LoopStatus::ActionsPending,
      Self::Complete => LoopStatus::Complete,
      Self::Aborted(_) => LoopStatus::Aborted,
    }
  }

  pub fn abort_reason(&self) -> Option<AbortReason> {
    match self {
      Self::Aborted(reason) => Some(*reason),
      _ => None,
    }
  }

  pub fn is_terminal(&self) -> bool {
    self.status().is_terminal()
  }
}
