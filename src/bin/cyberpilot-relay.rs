use std::process::ExitCode;

use clap::Parser;
use cyberpilot_lib::{config::Settings, logger, relay::RelayRuntime};

#[derive(Parser)]
#[command(name = "cyberpilot-relay")]
#[command(version)]
#[command(about = "Keeps action-loop sessions and asks the vision model for the next actions")]
struct Cli {
  /// Interface to bind (overrides config and CYBERPILOT_HOST)
  #[arg(long)]
  host: Option<String>,

  /// Port to bind (overrides config and CYBERPILOT_PORT)
  #[arg(short, long)]
  port: Option<u16>,

  /// Verbose logging plus the daily log file
  #[arg(long)]
  debug: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
  let cli = Cli::parse();
  match serve(cli).await {
    Ok(()) => ExitCode::SUCCESS,
    Err(err) => {
      eprintln!("error: {err}");
      ExitCode::FAILURE
    }
  }
}

async fn serve(cli: Cli) -> cyberpilot_lib::Result<()> {
  let mut settings = Settings::load()?;
  if let Some(host) = cli.host {
    settings.relay.host = host;
  }
  if let Some(port) = cli.port {
    settings.relay.port = port;
  }
  settings.debug |= cli.debug;
  logger::init(settings.debug)?;

  let mut runtime = RelayRuntime::from_settings(&settings.relay)?;
  let addr = runtime.start(settings.relay.socket_addr()?).await?;
  println!("cyberpilot relay listening on http://{addr}");

  if let Err(err) = tokio::signal::ctrl_c().await {
    tracing::error!(target: "relay", error = %err, "failed to wait for ctrl-c");
  }
  tracing::info!(target: "relay", "shutting down");
  runtime.stop().await
}
