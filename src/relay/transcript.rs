use std::{
  collections::HashMap,
  sync::{
    Arc, Mutex as StdMutex, PoisonError,
    atomic::{AtomicBool, Ordering},
  },
};

use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, MutexGuard, RwLock};

use crate::{
  automation::{
    AbortReason, Action, ActionResult, ExecutorTurn, LoopState, OracleTurn, Screenshot, SessionSummary, Turn,
  },
  error::{CyberpilotError, Result},
};

/// Append-only conversation for one session. The first entry is always the
/// prompt turn; after it oracle and executor turns strictly alternate.
#[derive(Clone, Debug)]
pub struct Transcript {
  turns: Vec<Turn>,
}

impl Transcript {
  pub fn new(prompt: String, screenshot: Screenshot) -> Self {
    Self {
      turns: vec![Turn::Prompt {
        text: prompt,
        screenshot,
      }],
    }
  }

  pub fn turns(&self) -> &[Turn] {
    &self.turns
  }

  pub fn len(&self) -> usize {
    self.turns.len()
  }

  pub fn is_empty(&self) -> bool {
    self.turns.is_empty()
  }

  fn last_label(&self) -> &'static str {
    self.turns.last().map(Turn::label).unwrap_or("nothing")
  }

  pub fn ensure_oracle_next(&self) -> Result<()> {
    match self.turns.last() {
      Some(Turn::Prompt { .. }) | Some(Turn::Executor(_)) => Ok(()),
      _ => Err(CyberpilotError::OutOfOrder(format!(
        "an oracle turn cannot follow {}",
        self.last_label()
      ))),
    }
  }

  pub fn ensure_executor_next(&self) -> Result<()> {
    match self.turns.last() {
      Some(Turn::Oracle(_)) => Ok(()),
      _ => Err(CyberpilotError::OutOfOrder(format!(
        "an executor turn cannot follow {}",
        self.last_label()
      ))),
    }
  }

  pub fn append_oracle(&mut self, turn: OracleTurn) -> Result<()> {
    self.ensure_oracle_next()?;
    self.turns.push(Turn::Oracle(turn));
    Ok(())
  }

  pub fn append_executor(&mut self, turn: ExecutorTurn) -> Result<()> {
    self.ensure_executor_next()?;
    self.turns.push(Turn::Executor(turn));
    Ok(())
  }
}

#[derive(Debug)]
pub struct Session {
  transcript: Transcript,
  state: LoopState,
  round_trips: u32,
  oracle_failures: u32,
  last_activity: DateTime<Utc>,
}

impl Session {
  pub fn new(prompt: String, screenshot: Screenshot) -> Self {
    Self {
      transcript: Transcript::new(prompt, screenshot),
      state: LoopState::Idle,
      round_trips: 0,
      oracle_failures: 0,
      last_activity: Utc::now(),
    }
  }

  pub fn transcript(&self) -> &Transcript {
    &self.transcript
  }

  pub fn state(&self) -> LoopState {
    self.state
  }

  pub fn round_trips(&self) -> u32 {
    self.round_trips
  }

  pub fn last_activity(&self) -> DateTime<Utc> {
    self.last_activity
  }

  pub fn append_oracle(&mut self, turn: OracleTurn) -> Result<()> {
    self.transcript.append_oracle(turn)?;
    self.touch();
    Ok(())
  }

  pub fn append_executor(&mut self, turn: ExecutorTurn) -> Result<()> {
    self.transcript.append_executor(turn)?;
    self.touch();
    Ok(())
  }

  /// Appends the executor turn the reply answers (none for the opening
  /// round trip) and the reply itself, then settles the loop state.
  pub(crate) fn complete_round_trip(
    &mut self,
    executor: Option<ExecutorTurn>,
    reply: OracleTurn,
    complete: bool,
  ) -> Result<()> {
    match &executor {
      Some(_) => self.transcript.ensure_executor_next()?,
      None => self.transcript.ensure_oracle_next()?,
    }
    if let Some(turn) = executor {
      self.transcript.append_executor(turn)?;
    }
    self.transcript.append_oracle(reply)?;
    self.round_trips += 1;
    self.oracle_failures = 0;
    self.state = if complete {
      LoopState::Complete
    } else {
      LoopState::ActionsPending
    };
    self.touch();
    Ok(())
  }

  pub(crate) fn await_oracle(&mut self) {
    self.state = LoopState::AwaitingOracle;
    self.touch();
  }

  /// Counts a failed oracle call; at `limit` consecutive failures the
  /// session aborts, otherwise the results may be resent. Returns the count.
  pub(crate) fn record_oracle_failure(&mut self, limit: u32) -> u32 {
    self.oracle_failures += 1;
    self.state = if self.oracle_failures >= limit {
      LoopState::Aborted(AbortReason::OracleFailures)
    } else {
      LoopState::ActionsPending
    };
    self.touch();
    self.oracle_failures
  }

  pub(crate) fn abort(&mut self, reason: AbortReason) {
    self.state = LoopState::Aborted(reason);
    self.touch();
  }

  pub fn snapshot(&self) -> SessionSnapshot {
    SessionSnapshot {
      state: self.state,
      round_trips: self.round_trips,
      last_activity: self.last_activity,
      turns: self.transcript.turns().to_vec(),
    }
  }

  fn touch(&mut self) {
    self.last_activity = Utc::now();
  }
}

/// Last published view of a session, readable while its lock is held by an
/// in-flight round trip.
#[derive(Clone, Debug)]
pub struct SessionSnapshot {
  pub state: LoopState,
  pub round_trips: u32,
  pub last_activity: DateTime<Utc>,
  pub turns: Vec<Turn>,
}

/// Registry entry. Holding the session lock is the per-session critical
/// section; a retired handle may still be locked by an in-flight turn.
pub struct SessionHandle {
  id: String,
  created_at: DateTime<Utc>,
  retired: AtomicBool,
  session: Mutex<Session>,
  published: StdMutex<SessionSnapshot>,
}

impl SessionHandle {
  pub fn id(&self) -> &str {
    &self.id
  }

  pub fn created_at(&self) -> DateTime<Utc> {
    self.created_at
  }

  pub fn is_retired(&self) -> bool {
    self.retired.load(Ordering::Acquire)
  }

  pub async fn lock(&self) -> MutexGuard<'_, Session> {
    self.session.lock().await
  }

  /// Call with the session lock held, after every state change.
  pub fn publish(&self, session: &Session) {
    *self.published.lock().unwrap_or_else(PoisonError::into_inner) = session.snapshot();
  }

  pub fn snapshot(&self) -> SessionSnapshot {
    self
      .published
      .lock()
      .unwrap_or_else(PoisonError::into_inner)
      .clone()
  }

  fn summary(&self) -> SessionSummary {
    SessionSummary {
      session_id: self.id.clone(),
      created_at: self.created_at,
    }
  }
}

/// Process-wide session registry. Created at service start and cleared at
/// shutdown; the map itself never leaves this type.
#[derive(Default)]
pub struct TranscriptStore {
  sessions: RwLock<HashMap<String, Arc<SessionHandle>>>,
}

impl TranscriptStore {
  pub fn new() -> Self {
    Self::default()
  }

  pub async fn register(&self, session: Session) -> Arc<SessionHandle> {
    let handle = Arc::new(SessionHandle {
      id: uuid::Uuid::new_v4().to_string(),
      created_at: Utc::now(),
      retired: AtomicBool::new(false),
      published: StdMutex::new(session.snapshot()),
      session: Mutex::new(session),
    });
    self
      .sessions
      .write()
      .await
      .insert(handle.id.clone(), handle.clone());
    handle
  }

  pub async fn start_session(&self, prompt: String, screenshot: Screenshot) -> (String, Vec<Turn>) {
    let session = Session::new(prompt, screenshot);
    let turns = session.transcript().turns().to_vec();
    let handle = self.register(session).await;
    (handle.id.clone(), turns)
  }

  pub async fn checkout(&self, session_id: &str) -> Result<Arc<SessionHandle>> {
    self
      .sessions
      .read()
      .await
      .get(session_id)
      .cloned()
      .ok_or_else(|| CyberpilotError::not_found(session_id))
  }

  pub async fn append_oracle_turn(
    &self,
    session_id: &str,
    reasoning: Option<String>,
    actions: Vec<Action>,
  ) -> Result<()> {
    let handle = self.checkout(session_id).await?;
    let mut session = handle.lock().await;
    session.append_oracle(OracleTurn { reasoning, actions })?;
    handle.publish(&session);
    Ok(())
  }

  pub async fn append_executor_turn(
    &self,
    session_id: &str,
    results: Vec<ActionResult>,
    screenshot: Screenshot,
    current_location: Option<String>,
  ) -> Result<()> {
    let handle = self.checkout(session_id).await?;
    let mut session = handle.lock().await;
    session.append_executor(ExecutorTurn {
      results,
      screenshot,
      current_location,
    })?;
    handle.publish(&session);
    Ok(())
  }

  pub async fn transcript(&self, session_id: &str) -> Result<Vec<Turn>> {
    Ok(self.checkout(session_id).await?.snapshot().turns)
  }

  pub async fn list(&self) -> Vec<SessionSummary> {
    let mut sessions = self
      .sessions
      .read()
      .await
      .values()
      .map(|handle| handle.summary())
      .collect::<Vec<_>>();
    sessions.sort_by_key(|summary| summary.created_at);
    sessions
  }

  /// Returns false when the id was unknown.
  pub async fn remove(&self, session_id: &str) -> bool {
    match self.sessions.write().await.remove(session_id) {
      Some(handle) => {
        handle.retired.store(true, Ordering::Release);
        true
      }
      None => false,
    }
  }

  pub async fn clear(&self) {
    for (_, handle) in self.sessions.write().await.drain() {
      handle.retired.store(true, Ordering::Release);
    }
  }

  pub async fn len(&self) -> usize {
    self.sessions.read().await.len()
  }

  pub async fn is_empty(&self) -> bool {
    self.sessions.read().await.is_empty()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn shot(tag: u8) -> Screenshot {
    Screenshot::new(vec![tag; 4])
  }

  #[tokio::test]
  async fn start_session_creates_a_single_prompt_turn() {
    let store = TranscriptStore::new();
    let (id, turns) = store.start_session("open example.com".into(), shot(1)).await;
    assert_eq!(turns.len(), 1);
    assert!(matches!(&turns[0], Turn::Prompt { text, .. } if text == "open example.com"));
    assert_eq!(store.list().await.len(), 1);
    assert_eq!(store.list().await[0].session_id, id);
  }

  #[tokio::test]
  async fn turns_alternate_after_the_prompt() {
    let store = TranscriptStore::new();
    let (id, _) = store.start_session("task".into(), shot(1)).await;

    store
      .append_oracle_turn(&id, Some("go".into()), vec![Action::navigate("http://example.com")])
      .await
      .unwrap();
    store
      .append_executor_turn(&id, vec![ActionResult::success("navigate", "")], shot(2), None)
      .await
      .unwrap();
    store.append_oracle_turn(&id, None, vec![]).await.unwrap();

    let labels = store
      .transcript(&id)
      .await
      .unwrap()
      .iter()
      .map(Turn::label)
      .collect::<Vec<_>>();
    assert_eq!(labels, vec!["prompt", "oracle", "executor", "oracle"]);
  }

  #[tokio::test]
  async fn out_of_order_appends_leave_the_transcript_unchanged() {
    let store = TranscriptStore::new();
    let (id, _) = store.start_session("task".into(), shot(1)).await;

    let err = store
      .append_executor_turn(&id, vec![], shot(2), None)
      .await
      .unwrap_err();
    assert!(matches!(err, CyberpilotError::OutOfOrder(_)));
    assert_eq!(store.transcript(&id).await.unwrap().len(), 1);

    store.append_oracle_turn(&id, None, vec![]).await.unwrap();
    let err = store.append_oracle_turn(&id, None, vec![]).await.unwrap_err();
    assert!(matches!(err, CyberpilotError::OutOfOrder(_)));
    assert_eq!(store.transcript(&id).await.unwrap().len(), 2);
  }

  #[tokio::test]
  async fn unknown_sessions_are_not_found() {
    let store = TranscriptStore::new();
    let err = store.append_oracle_turn("missing", None, vec![]).await.unwrap_err();
    assert!(matches!(err, CyberpilotError::NotFound(_)));
    assert!(matches!(
      store.transcript("missing").await,
      Err(CyberpilotError::NotFound(_))
    ));
  }

  #[tokio::test]
  async fn removal_retires_outstanding_handles() {
    let store = TranscriptStore::new();
    let (id, _) = store.start_session("task".into(), shot(1)).await;
    let handle = store.checkout(&id).await.unwrap();

    assert!(store.remove(&id).await);
    assert!(handle.is_retired());
    assert!(!store.remove(&id).await);
    assert!(store.is_empty().await);
  }

  #[tokio::test]
  async fn transcript_reads_skip_the_session_lock() {
    let store = TranscriptStore::new();
    let (id, _) = store.start_session("task".into(), shot(1)).await;
    let handle = store.checkout(&id).await.unwrap();

    let mut session = handle.lock().await;
    session.append_oracle(OracleTurn { reasoning: None, actions: vec![] }).unwrap();
    // Unpublished changes stay invisible until the holder publishes them.
    assert_eq!(store.transcript(&id).await.unwrap().len(), 1);
    handle.publish(&session);
    assert_eq!(store.transcript(&id).await.unwrap().len(), 2);
    assert_eq!(handle.snapshot().state, LoopState::Idle);
  }

  #[test]
  fn round_trips_append_both_turns_or_neither() {
    let mut session = Session::new("task".into(), shot(1));
    let executor = ExecutorTurn {
      results: vec![],
      screenshot: shot(2),
      current_location: None,
    };
    let reply = OracleTurn { reasoning: None, actions: vec![] };

    let err = session
      .complete_round_trip(Some(executor), reply.clone(), false)
      .unwrap_err();
    assert!(matches!(err, CyberpilotError::OutOfOrder(_)));
    assert_eq!(session.transcript().len(), 1);

    session.complete_round_trip(None, reply, true).unwrap();
    assert_eq!(session.transcript().len(), 2);
    assert_eq!(session.round_trips(), 1);
    assert_eq!(session.state(), LoopState::Complete);
  }
}
