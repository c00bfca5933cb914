use std::time::Duration;

use rand::Rng;

use crate::{
  automation::{Action, ActionKind, ActionResult, ScrollDirection, UNKNOWN_FUNCTION},
  config::ExecutorSettings,
  error::{CyberpilotError, Result},
};

use super::{
  coords::ScreenGeometry,
  input::{InputDriver, is_system_modifier},
  trajectory::TrajectoryPlanner,
};

pub const INITIAL_LOCATION: &str = "about:blank";

const PAGE_SETTLE: Duration = Duration::from_millis(2000);
const CLICK_SETTLE: Duration = Duration::from_millis(500);
const SCROLL_SETTLE: Duration = Duration::from_millis(300);
const KEY_SETTLE: Duration = Duration::from_millis(300);
const SYSTEM_KEY_SETTLE: Duration = Duration::from_millis(1500);
const FOCUS_PAUSE: Duration = Duration::from_millis(200);
const CLEAR_PAUSE: Duration = Duration::from_millis(100);
const TYPE_PAUSE: Duration = Duration::from_millis(100);
const ENTER_PAUSE: Duration = Duration::from_millis(300);
const TYPE_SETTLE: Duration = Duration::from_millis(500);

#[derive(Clone, Debug, PartialEq)]
pub struct InterpreterSettings {
  pub delay_scale: f64,
  pub scroll_multiplier: i32,
  pub search_url: String,
}

impl Default for InterpreterSettings {
  fn default() -> Self {
    Self::from(&ExecutorSettings::default())
  }
}

impl From<&ExecutorSettings> for InterpreterSettings {
  fn from(settings: &ExecutorSettings) -> Self {
    Self {
      delay_scale: settings.delay_scale.max(0.0),
      scroll_multiplier: settings.scroll_multiplier,
      search_url: settings.search_url.clone(),
    }
  }
}

/// Executes oracle actions against the local machine. Never fails as a
/// whole: every action yields exactly one [`ActionResult`].
pub struct ActionInterpreter<D: InputDriver, R: Rng> {
  driver: D,
  planner: TrajectoryPlanner<R>,
  screen: ScreenGeometry,
  settings: InterpreterSettings,
  current_location: String,
}

impl<D: InputDriver, R: Rng> ActionInterpreter<D, R> {
  pub fn new(driver: D, rng: R, screen: ScreenGeometry, mut settings: InterpreterSettings) -> Self {
    settings.delay_scale = settings.delay_scale.max(0.0);
    Self {
      driver,
      planner: TrajectoryPlanner::new(rng, settings.delay_scale),
      screen,
      settings,
      current_location: INITIAL_LOCATION.to_string(),
    }
  }

  pub fn current_location(&self) -> &str {
    &self.current_location
  }

  pub fn screen(&self) -> ScreenGeometry {
    self.screen
  }

  pub fn set_screen(&mut self, screen: ScreenGeometry) {
    self.screen = screen;
  }

  pub fn driver(&self) -> &D {
    &self.driver
  }

  pub async fn execute_all(&mut self, actions: &[Action]) -> Vec<ActionResult> {
    let mut results = Vec::with_capacity(actions.len());
    for action in actions {
      results.push(self.execute(action).await);
    }
    results
  }

  pub async fn execute(&mut self, action: &Action) -> ActionResult {
    let kind = action.kind();
    tracing::info!(target: "executor", action = %action.name, args = ?action.args, "executing");
    let outcome = match kind {
      ActionKind::OpenBrowser => Ok("success".to_string()),
      ActionKind::Navigate { url } => self.open_page(url).await,
      ActionKind::Search { query } => match self.search_url(&query) {
        Ok(url) => self.open_page(url).await,
        Err(err) => Err(err),
      },
      ActionKind::Click { x, y } => self.click(x, y).await,
      ActionKind::TypeText {
        x,
        y,
        text,
        press_enter,
        clear_first,
      } => self.type_text(x, y, &text, press_enter, clear_first).await,
      ActionKind::Scroll { direction, amount } => self.scroll(direction, amount).await,
      ActionKind::PressKey { key } => self.chord(vec![key], false).await,
      ActionKind::Hotkey { keys } => self.chord(keys, true).await,
      ActionKind::Unknown { name, .. } => {
        tracing::warn!(target: "executor", action = %name, "unknown action, reporting as unsupported");
        return ActionResult::success(&action.name, UNKNOWN_FUNCTION);
      }
      ActionKind::Malformed { name, reason } => Err(CyberpilotError::ExecutionFailure(format!(
        "Invalid arguments for `{name}`: {reason}"
      ))),
    };
    match outcome {
      Ok(detail) => ActionResult::success(&action.name, detail),
      Err(err) => {
        tracing::warn!(target: "executor", action = %action.name, error = %err, "action failed");
        ActionResult::failure(&action.name, err.to_string())
      }
    }
  }

  async fn pause(&self, duration: Duration) {
    let scaled = duration.mul_f64(self.settings.delay_scale);
    if !scaled.is_zero() {
      tokio::time::sleep(scaled).await;
    }
  }

  fn search_url(&self, query: &str) -> Result<String> {
    let encoded = serde_urlencoded::to_string([("q", query)])
      .map_err(|err| CyberpilotError::ExecutionFailure(err.to_string()))?;
    Ok(format!("{}?{encoded}", self.settings.search_url))
  }

  async fn open_page(&mut self, url: String) -> Result<String> {
    self.driver.open_url(&url)?;
    self.current_location = url;
    self.pause(PAGE_SETTLE).await;
    Ok("success".to_string())
  }

  /// Moves along a planned trajectory and returns the device point reached.
  async fn move_to_logical(&mut self, x: f64, y: f64) -> Result<(i32, i32)> {
    let target = self.screen.to_device(x, y);
    let start = self.driver.cursor_position()?;
    let trajectory = self.planner.plan(start, target);
    for waypoint in &trajectory.waypoints {
      self.driver.move_to(waypoint.x, waypoint.y)?;
      if !waypoint.delay.is_zero() {
        tokio::time::sleep(waypoint.delay).await;
      }
    }
    Ok(target)
  }

  async fn click(&mut self, x: f64, y: f64) -> Result<String> {
    let (px, py) = self.move_to_logical(x, y).await?;
    self.driver.click_primary()?;
    tracing::debug!(target: "input", x = px, y = py, "clicked");
    self.pause(CLICK_SETTLE).await;
    Ok("success".to_string())
  }

  async fn type_text(
    &mut self,
    x: f64,
    y: f64,
    text: &str,
    press_enter: bool,
    clear_first: bool,
  ) -> Result<String> {
    // (0, 0) means type into whatever already has focus.
    let targeted = x != 0.0 || y != 0.0;
    if targeted {
      self.move_to_logical(x, y).await?;
      self.driver.click_primary()?;
      self.pause(FOCUS_PAUSE).await;
      if clear_first {
        let select_all = if cfg!(target_os = "macos") { "cmd" } else { "ctrl" };
        self.driver.press_chord(&[select_all.to_string(), "a".to_string()])?;
        self.driver.press_chord(&["backspace".to_string()])?;
        self.pause(CLEAR_PAUSE).await;
      }
    }
    self.driver.type_text(text)?;
    self.pause(TYPE_PAUSE).await;
    if press_enter {
      self.pause(ENTER_PAUSE).await;
      self.driver.press_chord(&["enter".to_string()])?;
    }
    self.pause(TYPE_SETTLE).await;
    Ok("success".to_string())
  }

  async fn scroll(&mut self, direction: ScrollDirection, amount: u32) -> Result<String> {
    let magnitude = i32::try_from(amount)
      .ok()
      .and_then(|amount| amount.checked_mul(self.settings.scroll_multiplier))
      .ok_or_else(|| CyberpilotError::ExecutionFailure(format!("Scroll amount {amount} is too large")))?;
    let (delta, horizontal) = match direction {
      ScrollDirection::Up => (magnitude, false),
      ScrollDirection::Down => (-magnitude, false),
      ScrollDirection::Left => (-magnitude, true),
      ScrollDirection::Right => (magnitude, true),
    };
    self.driver.scroll(delta, horizontal)?;
    self.pause(SCROLL_SETTLE).await;
    Ok("success".to_string())
  }

  async fn chord(&mut self, keys: Vec<String>, is_hotkey: bool) -> Result<String> {
    self.driver.press_chord(&keys)?;
    let settle = if is_hotkey && keys.iter().any(|key| is_system_modifier(key)) {
      SYSTEM_KEY_SETTLE
    } else {
      KEY_SETTLE
    };
    self.pause(settle).await;
    Ok("success".to_string())
  }
}
