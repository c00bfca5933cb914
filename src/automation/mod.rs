mod action;
mod state;
mod types;

pub use action::{Action, ActionKind, ActionResult, ScrollDirection, UNKNOWN_FUNCTION, split_combo};
pub use state::{AbortReason, ExecutorTurn, LoopState, LoopStatus, OracleTurn, Turn};
pub use types::{
  ActionResponse, ContinueRequest, HealthStatus, Screenshot, SessionDetail, SessionList,
  SessionSummary, StartRequest,
};
