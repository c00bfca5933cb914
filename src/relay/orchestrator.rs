use std::sync::Arc;

use crate::{
  automation::{
    Action, ActionResponse, ActionResult, AbortReason, ExecutorTurn, LoopState, Screenshot,
    SessionDetail, SessionList, Turn,
  },
  config::RelaySettings,
  error::{CyberpilotError, Result},
  relay::{
    oracle::ActionOracle,
    transcript::{Session, TranscriptStore},
  },
};

pub const DEFAULT_MAX_ROUND_TRIPS: u32 = 30;
pub const DEFAULT_MAX_ORACLE_FAILURES: u32 = 3;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LoopSettings {
  /// Oracle round-trips a session may make before the next continue aborts it.
  pub max_round_trips: u32,
  /// Consecutive failed oracle calls tolerated before the session aborts.
  pub max_oracle_failures: u32,
}

impl Default for LoopSettings {
  fn default() -> Self {
    Self {
      max_round_trips: DEFAULT_MAX_ROUND_TRIPS,
      max_oracle_failures: DEFAULT_MAX_ORACLE_FAILURES,
    }
  }
}

impl From<&RelaySettings> for LoopSettings {
  fn from(settings: &RelaySettings) -> Self {
    Self {
      max_round_trips: settings.max_round_trips.max(1),
      max_oracle_failures: settings.max_oracle_failures.max(1),
    }
  }
}

#[derive(Clone, Debug, PartialEq)]
pub struct TurnOutcome {
  pub session_id: String,
  pub actions: Vec<Action>,
  pub reasoning: Option<String>,
  pub state: LoopState,
}

impl From<TurnOutcome> for ActionResponse {
  fn from(outcome: TurnOutcome) -> Self {
    Self {
      session_id: outcome.session_id,
      actions: outcome.actions,
      reasoning: outcome.reasoning,
      is_complete: outcome.state == LoopState::Complete,
      status: outcome.state.status(),
      abort_reason: outcome.state.abort_reason(),
    }
  }
}

/// Drives each session through the action loop. One oracle round-trip per
/// call; calls for the same session are serialized by the session lock.
pub struct Orchestrator {
  store: TranscriptStore,
  oracle: Arc<dyn ActionOracle>,
  settings: LoopSettings,
}

impl Orchestrator {
  pub fn new(oracle: Arc<dyn ActionOracle>, settings: LoopSettings) -> Self {
    Self {
      store: TranscriptStore::new(),
      oracle,
      settings,
    }
  }

  pub fn settings(&self) -> LoopSettings {
    self.settings
  }

  pub fn model(&self) -> &str {
    self.oracle.model()
  }

  pub async fn start_turn(&self, task: String, screenshot: Screenshot) -> Result<TurnOutcome> {
    let mut session = Session::new(task, screenshot);
    session.await_oracle();

    // Nothing is registered until the first reply arrives.
    let reply = self.oracle.propose(session.transcript().turns()).await?;
    let complete = reply.complete || reply.actions.is_empty();
    let actions = reply.actions.clone();
    let reasoning = reply.reasoning.clone();
    session.complete_round_trip(None, reply.into_turn(), complete)?;
    let state = session.state();

    let handle = self.store.register(session).await;
    tracing::info!(
      target: "relay",
      session_id = handle.id(),
      actions = actions.len(),
      complete,
      "session started"
    );
    Ok(TurnOutcome {
      session_id: handle.id().to_string(),
      actions,
      reasoning,
      state,
    })
  }

  pub async fn continue_turn(
    &self,
    session_id: &str,
    results: Vec<ActionResult>,
    screenshot: Screenshot,
    current_location: Option<String>,
  ) -> Result<TurnOutcome> {
    let handle = self.store.checkout(session_id).await?;
    let mut session = handle.lock().await;

    if session.state().is_terminal() {
      return Err(CyberpilotError::InvalidState(format!(
        "session `{session_id}` is already {:?}",
        session.state().status()
      )));
    }
    // AwaitingOracle under the lock means an earlier call was dropped mid-flight.
    if !matches!(
      session.state(),
      LoopState::ActionsPending | LoopState::AwaitingOracle
    ) {
      return Err(CyberpilotError::InvalidState(format!(
        "session `{session_id}` is not waiting for results"
      )));
    }
    if session.round_trips() >= self.settings.max_round_trips {
      session.abort(AbortReason::BoundExceeded);
      handle.publish(&session);
      tracing::warn!(
        target: "relay",
        session_id,
        round_trips = session.round_trips(),
        "iteration bound reached, aborting session"
      );
      return Ok(TurnOutcome {
        session_id: session_id.to_string(),
        actions: Vec::new(),
        reasoning: None,
        state: session.state(),
      });
    }
    session.transcript().ensure_executor_next()?;

    let staged = ExecutorTurn {
      results,
      screenshot,
      current_location,
    };
    let mut turns = session.transcript().turns().to_vec();
    turns.push(Turn::Executor(staged.clone()));

    session.await_oracle();
    handle.publish(&session);
    let reply = self.oracle.propose(&turns).await;

    if handle.is_retired() {
      tracing::info!(target: "relay", session_id, "session deleted during oracle call, discarding reply");
      return Err(CyberpilotError::not_found(session_id));
    }

    let reply = match reply {
      Ok(reply) => reply,
      Err(err) => {
        let failures = session.record_oracle_failure(self.settings.max_oracle_failures);
        handle.publish(&session);
        tracing::error!(
          target: "relay",
          session_id,
          failures,
          error = %err,
          "oracle call failed"
        );
        return Err(err);
      }
    };

    let complete = reply.complete || reply.actions.is_empty();
    let actions = reply.actions.clone();
    let reasoning = reply.reasoning.clone();
    session.complete_round_trip(Some(staged), reply.into_turn(), complete)?;
    handle.publish(&session);

    tracing::info!(
      target: "relay",
      session_id,
      round_trips = session.round_trips(),
      actions = actions.len(),
      complete,
      "session continued"
    );
    Ok(TurnOutcome {
      session_id: session_id.to_string(),
      actions,
      reasoning,
      state: session.state(),
    })
  }

  pub async fn list_sessions(&self) -> SessionList {
    let sessions = self.store.list().await;
    SessionList {
      total_sessions: sessions.len(),
      sessions,
    }
  }

  pub async fn session_detail(&self, session_id: &str) -> Result<SessionDetail> {
    // Reads the published snapshot so an in-flight oracle call never blocks it.
    let handle = self.store.checkout(session_id).await?;
    let snapshot = handle.snapshot();
    Ok(SessionDetail {
      session_id: handle.id().to_string(),
      created_at: handle.created_at(),
      last_activity: snapshot.last_activity,
      status: snapshot.state.status(),
      abort_reason: snapshot.state.abort_reason(),
      round_trips: snapshot.round_trips,
      turns: snapshot.turns.len(),
    })
  }

  pub async fn transcript(&self, session_id: &str) -> Result<Vec<Turn>> {
    self.store.transcript(session_id).await
  }

  /// Deleting does not wait for an in-flight turn; that turn's reply is dropped.
  pub async fn delete_session(&self, session_id: &str) -> Result<()> {
    if self.store.remove(session_id).await {
      tracing::info!(target: "relay", session_id, "session deleted");
      Ok(())
    } else {
      Err(CyberpilotError::not_found(session_id))
    }
  }

  pub async fn shutdown(&self) {
    let count = self.store.len().await;
    self.store.clear().await;
    tracing::info!(target: "relay", sessions = count, "session store cleared");
  }
}
