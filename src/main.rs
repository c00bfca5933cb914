use std::{process::ExitCode, time::Duration};

use clap::{Parser, Subcommand};
use cyberpilot_lib::{
  config::Settings,
  executor::{
    ActionInterpreter, EnigoDriver, InterpreterSettings, PrimaryMonitor, RelayClient, RunSummary,
    ScreenGeometry, TaskRunner,
  },
  logger,
};
use rand::{SeedableRng, rngs::StdRng};

#[derive(Parser)]
#[command(name = "cyberpilot")]
#[command(version)]
#[command(about = "Drives this desktop from the actions a cyberpilot relay proposes")]
struct Cli {
  #[command(subcommand)]
  command: Commands,

  /// Relay base URL (overrides config and CYBERPILOT_RELAY_URL)
  #[arg(long, global = true)]
  relay_url: Option<String>,

  /// Verbose logging plus the daily log file
  #[arg(long, global = true)]
  debug: bool,
}

#[derive(Subcommand)]
enum Commands {
  /// Run one task until the relay reports it complete or aborted
  Run {
    /// Natural-language task, e.g. "search for rust async book"
    task: String,

    /// Multiplier on settle delays and pointer timing (0 disables them)
    #[arg(long)]
    delay_scale: Option<f64>,
  },

  /// Check that the relay is reachable
  Health,

  /// Print the tail of the most recent log file
  Logs {
    #[arg(short = 'n', long, default_value_t = 200)]
    lines: usize,
  },
}

#[tokio::main]
async fn main() -> ExitCode {
  let cli = Cli::parse();

  let result = match load_settings(&cli) {
    Ok(settings) => match cli.command {
      Commands::Run { task, delay_scale } => cmd_run(settings, &task, delay_scale).await,
      Commands::Health => cmd_health(settings).await,
      Commands::Logs { lines } => cmd_logs(lines),
    },
    Err(err) => Err(err),
  };

  match result {
    Ok(()) => ExitCode::SUCCESS,
    Err(err) => {
      eprintln!("error: {err}");
      ExitCode::FAILURE
    }
  }
}

fn load_settings(cli: &Cli) -> cyberpilot_lib::Result<Settings> {
  let mut settings = Settings::load()?;
  if let Some(url) = &cli.relay_url {
    settings.executor.relay_url = url.clone();
  }
  settings.debug |= cli.debug;
  logger::init(settings.debug)?;
  Ok(settings)
}

async fn cmd_run(settings: Settings, task: &str, delay_scale: Option<f64>) -> cyberpilot_lib::Result<()> {
  let mut executor = settings.executor;
  if let Some(scale) = delay_scale {
    executor.delay_scale = scale;
  }

  let client = RelayClient::from_settings(&executor)?;
  // Real geometry is read from the monitor when the run starts.
  let interpreter = ActionInterpreter::new(
    EnigoDriver::new()?,
    StdRng::from_os_rng(),
    ScreenGeometry::new(0, 0),
    InterpreterSettings::from(&executor),
  );
  let mut runner = TaskRunner::new(
    client,
    PrimaryMonitor,
    interpreter,
    Duration::from_millis(executor.turn_pause_ms),
  );

  let summary = runner.run(task).await?;
  print_summary(&summary);
  Ok(())
}

async fn cmd_health(settings: Settings) -> cyberpilot_lib::Result<()> {
  let client = RelayClient::from_settings(&settings.executor)?;
  let health = client.health().await?;
  println!(
    "{} at {} is {} (model {})",
    health.service,
    client.base_url(),
    health.status,
    health.model
  );
  Ok(())
}

fn cmd_logs(lines: usize) -> cyberpilot_lib::Result<()> {
  let logs = logger::read_recent_logs(lines)?;
  if logs.is_empty() {
    println!("No log files yet.");
  } else {
    println!("{logs}");
  }
  Ok(())
}

fn print_summary(summary: &RunSummary) {
  println!("session:     {}", summary.session_id);
  println!("status:      {:?}", summary.status);
  if let Some(reason) = &summary.abort_reason {
    println!("reason:      {reason}");
  }
  println!("round trips: {}", summary.round_trips);
  println!("actions:     {}", summary.actions_executed);
  println!("location:    {}", summary.final_location);
  if let Some(reasoning) = &summary.last_reasoning {
    println!("last note:   {reasoning}");
  }
}

#[cfg(test)]
mod tests {
  use clap::CommandFactory;

  use super::*;

  #[test]
  fn cli_definition_is_consistent() {
    Cli::command().debug_assert();
  }

  #[test]
  fn relay_url_help_names_the_env_override() {
    let help = Cli::command().render_long_help().to_string();
    assert!(help.contains("CYBERPILOT_RELAY_URL"), "{help}");
  }

  #[test]
  fn run_accepts_a_relay_url_and_delay_scale() {
    let cli = Cli::try_parse_from([
      "cyberpilot",
      "run",
      "open example.com",
      "--delay-scale",
      "0",
      "--relay-url",
      "http://10.0.0.2:8080",
    ])
    .unwrap();
    assert_eq!(cli.relay_url.as_deref(), Some("http://10.0.0.2:8080"));
    match cli.command {
      Commands::Run { task, delay_scale } => {
        assert_eq!(task, "open example.com");
        assert_eq!(delay_scale, Some(0.0));
      }
      _ => panic!("expected the run subcommand"),
    }
  }
}
