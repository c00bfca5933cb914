pub mod api;
mod diagnostics;
pub mod oracle;
pub mod orchestrator;
pub mod transcript;

use std::{net::SocketAddr, sync::Arc, time::Duration};

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::{
  config::{DEFAULT_MAX_BODY_BYTES, RelaySettings},
  error::{CyberpilotError, Result},
};

pub use self::{
  api::{ApiState, router},
  oracle::{ActionOracle, GeminiOracle, OracleReply},
  orchestrator::{LoopSettings, Orchestrator, TurnOutcome},
  transcript::{Transcript, TranscriptStore},
};

struct ServerHandle {
  addr: SocketAddr,
  stop: CancellationToken,
  task: JoinHandle<()>,
}

/// Owns the orchestrator (and with it the session store) for the lifetime
/// of the HTTP server.
pub struct RelayRuntime {
  orchestrator: Arc<Orchestrator>,
  max_body_bytes: usize,
  server: Option<ServerHandle>,
}

impl RelayRuntime {
  pub fn new(oracle: Arc<dyn ActionOracle>, loop_settings: LoopSettings) -> Self {
    Self {
      orchestrator: Arc::new(Orchestrator::new(oracle, loop_settings)),
      max_body_bytes: DEFAULT_MAX_BODY_BYTES,
      server: None,
    }
  }

  /// Largest request body the HTTP surface accepts; takes effect on `start`.
  pub fn with_max_body_bytes(mut self, max_body_bytes: usize) -> Self {
    self.max_body_bytes = max_body_bytes;
    self
  }

  pub fn from_settings(settings: &RelaySettings) -> Result<Self> {
    let api_key = settings.resolve_api_key()?;
    let oracle = GeminiOracle::new(settings, api_key)?;
    let runtime = Self::new(Arc::new(oracle), LoopSettings::from(settings));
    Ok(runtime.with_max_body_bytes(settings.max_body_bytes))
  }

  pub fn orchestrator(&self) -> Arc<Orchestrator> {
    self.orchestrator.clone()
  }

  pub fn local_addr(&self) -> Option<SocketAddr> {
    self.server.as_ref().map(|server| server.addr)
  }

  /// Binds and serves in the background. Port 0 picks a free port; the
  /// bound address is returned.
  pub async fn start(&mut self, addr: SocketAddr) -> Result<SocketAddr> {
    if let Some(server) = &self.server {
      return Ok(server.addr);
    }
    let router = api::router(
      ApiState::new(self.orchestrator.clone()).with_max_body_bytes(self.max_body_bytes),
    );
    let listener = tokio::net::TcpListener::bind(addr)
      .await
      .map_err(|err| CyberpilotError::RuntimeError(format!("Failed to bind relay on {addr}: {err}")))?;
    let addr = listener.local_addr()?;

    let stop = CancellationToken::new();
    let stop_signal = stop.clone();
    let task = tokio::spawn(async move {
      let served = axum::serve(listener, router)
        .with_graceful_shutdown(async move {
          stop_signal.cancelled().await;
        })
        .await;
      if let Err(err) = served {
        tracing::error!(target: "relay", error = %err, "relay server exited");
      }
    });

    self.server = Some(ServerHandle { addr, stop, task });
    tracing::info!(target: "relay", %addr, model = self.orchestrator.model(), "relay listening");
    Ok(addr)
  }

  pub async fn stop(&mut self) -> Result<()> {
    if let Some(server) = self.server.take() {
      server.stop.cancel();
      let _ = tokio::time::timeout(Duration::from_secs(2), server.task).await;
      tracing::info!(target: "relay", "relay stopped");
    }
    self.orchestrator.shutdown().await;
    Ok(())
  }
}
