use std::time::Duration;

use rand::Rng;

use crate::{
  automation::{AbortReason, ActionResponse, ActionResult, LoopStatus, Screenshot},
  error::{CyberpilotError, Result},
};

use super::{
  capture::ScreenSource, client::RelayClient, input::InputDriver, interpreter::ActionInterpreter,
};

const CONTINUE_ATTEMPTS: u32 = 3;

#[derive(Clone, Debug, PartialEq)]
pub struct RunSummary {
  pub session_id: String,
  pub status: LoopStatus,
  pub abort_reason: Option<AbortReason>,
  pub round_trips: u32,
  pub actions_executed: usize,
  pub final_location: String,
  pub last_reasoning: Option<String>,
}

/// Runs one task end to end: capture, start, then execute and continue until
/// the relay reports a terminal status.
pub struct TaskRunner<S: ScreenSource, D: InputDriver, R: Rng> {
  client: RelayClient,
  screen: S,
  interpreter: ActionInterpreter<D, R>,
  turn_pause: Duration,
}

impl<S: ScreenSource, D: InputDriver, R: Rng> TaskRunner<S, D, R> {
  pub fn new(
    client: RelayClient,
    screen: S,
    interpreter: ActionInterpreter<D, R>,
    turn_pause: Duration,
  ) -> Self {
    Self {
      client,
      screen,
      interpreter,
      turn_pause,
    }
  }

  pub fn interpreter(&self) -> &ActionInterpreter<D, R> {
    &self.interpreter
  }

  pub async fn run(&mut self, task: &str) -> Result<RunSummary> {
    let health = self.client.health().await?;
    tracing::info!(
      target: "executor",
      relay = self.client.base_url(),
      model = %health.model,
      "relay reachable"
    );

    let geometry = self.screen.geometry()?;
    self.interpreter.set_screen(geometry);
    let screenshot = self.screen.capture()?;
    let mut response = self.client.start(task, screenshot).await?;
    let session_id = response.session_id.clone();
    let mut round_trips = 1;
    let mut actions_executed = 0;
    let mut last_reasoning = None;
    tracing::info!(target: "executor", session_id = %session_id, "session started");

    loop {
      if let Some(reasoning) = response.reasoning.take() {
        tracing::info!(target: "executor", round_trips, reasoning = %reasoning, "oracle reasoning");
        last_reasoning = Some(reasoning);
      }
      if response.is_terminal() || response.actions.is_empty() {
        break;
      }

      tracing::info!(target: "executor", round_trips, actions = response.actions.len(), "executing turn");
      let results = self.interpreter.execute_all(&response.actions).await;
      actions_executed += results.len();

      if !self.turn_pause.is_zero() {
        tokio::time::sleep(self.turn_pause).await;
      }
      let screenshot = self.screen.capture()?;
      response = self.continue_turn(&session_id, results, screenshot).await?;
      round_trips += 1;
    }

    let summary = RunSummary {
      session_id,
      status: response.status,
      abort_reason: response.abort_reason,
      round_trips,
      actions_executed,
      final_location: self.interpreter.current_location().to_string(),
      last_reasoning,
    };
    match summary.status {
      LoopStatus::Complete => {
        tracing::info!(target: "executor", round_trips, "task complete")
      }
      status => tracing::warn!(
        target: "executor",
        ?status,
        reason = ?summary.abort_reason,
        round_trips,
        "task ended without completing"
      ),
    }
    Ok(summary)
  }

  /// Retries when the relay reports an oracle failure; the relay keeps the
  /// session open until its own failure limit.
  async fn continue_turn(
    &self,
    session_id: &str,
    results: Vec<ActionResult>,
    screenshot: Screenshot,
  ) -> Result<ActionResponse> {
    let mut attempt = 1;
    loop {
      let outcome = self
        .client
        .continue_session(
          session_id,
          results.clone(),
          screenshot.clone(),
          self.interpreter.current_location(),
        )
        .await;
      match outcome {
        Err(CyberpilotError::Relay { status: 502, message }) if attempt < CONTINUE_ATTEMPTS => {
          tracing::warn!(target: "executor", attempt, error = %message, "oracle failed, retrying turn");
          attempt += 1;
          if !self.turn_pause.is_zero() {
            tokio::time::sleep(self.turn_pause).await;
          }
        }
        outcome => return outcome,
      }
    }
  }
}
