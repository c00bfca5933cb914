use std::time::Duration;

use device_query::{DeviceQuery, DeviceState};
use enigo::{Axis, Button, Coordinate, Direction, Enigo, Key, Keyboard, Mouse, Settings};

use crate::error::{CyberpilotError, Result};

/// Wheel units that make up one scroll notch.
pub const UNITS_PER_NOTCH: i32 = 100;

const CHORD_GAP: Duration = Duration::from_millis(10);
const CLICK_HOLD: Duration = Duration::from_millis(24);

/// OS input primitives the interpreter drives. Calls are synchronous and
/// short; pacing between them belongs to the caller.
pub trait InputDriver: Send {
  fn cursor_position(&mut self) -> Result<(i32, i32)>;

  fn move_to(&mut self, x: i32, y: i32) -> Result<()>;

  fn click_primary(&mut self) -> Result<()>;

  /// Presses `keys` in order and releases them in reverse.
  fn press_chord(&mut self, keys: &[String]) -> Result<()>;

  /// Emits `text` as character input; any Unicode scalar is allowed.
  fn type_text(&mut self, text: &str) -> Result<()>;

  /// Positive deltas scroll up (or right when `horizontal`).
  fn scroll(&mut self, delta: i32, horizontal: bool) -> Result<()>;

  fn open_url(&mut self, url: &str) -> Result<()>;
}

fn normalize_key(key: &str) -> String {
  key.trim().to_lowercase().replace(['_', ' '], "")
}

/// Modifiers that open OS-level menus or switch windows.
pub fn is_system_modifier(key: &str) -> bool {
  matches!(
    normalize_key(key).as_str(),
    "win" | "windows" | "cmd" | "command" | "super" | "meta" | "alt" | "option"
  )
}

pub fn map_key(key: &str) -> Result<Key> {
  let key = normalize_key(key);
  let mapped = match key.as_str() {
    "ctrl" | "control" => Key::Control,
    "alt" | "option" => Key::Alt,
    "shift" => Key::Shift,
    "cmd" | "command" | "win" | "windows" | "super" | "meta" => Key::Meta,
    "enter" | "return" => Key::Return,
    "esc" | "escape" => Key::Escape,
    "tab" => Key::Tab,
    "backspace" => Key::Backspace,
    "delete" | "del" => Key::Delete,
    "home" => Key::Home,
    "end" => Key::End,
    "pageup" | "pgup" => Key::PageUp,
    "pagedown" | "pgdn" => Key::PageDown,
    "left" | "arrowleft" => Key::LeftArrow,
    "right" | "arrowright" => Key::RightArrow,
    "up" | "arrowup" => Key::UpArrow,
    "down" | "arrowdown" => Key::DownArrow,
    "space" => Key::Space,
    "capslock" => Key::CapsLock,
    "f1" => Key::F1,
    "f2" => Key::F2,
    "f3" => Key::F3,
    "f4" => Key::F4,
    "f5" => Key::F5,
    "f6" => Key::F6,
    "f7" => Key::F7,
    "f8" => Key::F8,
    "f9" => Key::F9,
    "f10" => Key::F10,
    "f11" => Key::F11,
    "f12" => Key::F12,
    _ => {
      let mut chars = key.chars();
      return match (chars.next(), chars.next()) {
        (Some(c), None) => Ok(Key::Unicode(c)),
        _ => Err(CyberpilotError::ExecutionFailure(format!("Unknown key `{key}`"))),
      };
    }
  };
  Ok(mapped)
}

/// Wheel units to notches; any non-zero delta moves at least one notch.
pub fn wheel_notches(delta: i32) -> i32 {
  if delta == 0 {
    return 0;
  }
  let notches = delta / UNITS_PER_NOTCH;
  if notches == 0 { delta.signum() } else { notches }
}

/// Real input via enigo, cursor reads via device_query.
pub struct EnigoDriver {
  enigo: Enigo,
}

impl EnigoDriver {
  pub fn new() -> Result<Self> {
    Ok(Self {
      enigo: Enigo::new(&Settings::default())?,
    })
  }

  fn safe_key(&mut self, key: Key, direction: Direction) -> Result<()> {
    let enigo = &mut self.enigo;
    let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| enigo.key(key, direction)));
    match result {
      Ok(res) => res.map_err(|err| CyberpilotError::ExecutionFailure(err.to_string())),
      Err(_) => Err(CyberpilotError::ExecutionFailure(
        "Keyboard simulation panicked".into(),
      )),
    }
  }
}

impl InputDriver for EnigoDriver {
  fn cursor_position(&mut self) -> Result<(i32, i32)> {
    let state = DeviceState::new();
    Ok(state.get_mouse().coords)
  }

  fn move_to(&mut self, x: i32, y: i32) -> Result<()> {
    self.enigo.move_mouse(x, y, Coordinate::Abs)?;
    Ok(())
  }

  fn click_primary(&mut self) -> Result<()> {
    self.enigo.button(Button::Left, Direction::Press)?;
    std::thread::sleep(CLICK_HOLD);
    self.enigo.button(Button::Left, Direction::Release)?;
    Ok(())
  }

  fn press_chord(&mut self, keys: &[String]) -> Result<()> {
    // Resolve everything first so a bad name leaves no key held down.
    let mapped = keys.iter().map(|key| map_key(key)).collect::<Result<Vec<_>>>()?;
    if let [key] = mapped.as_slice() {
      return self.safe_key(*key, Direction::Click);
    }
    let mut pressed = Vec::with_capacity(mapped.len());
    let mut outcome = Ok(());
    for key in mapped {
      if let Err(err) = self.safe_key(key, Direction::Press) {
        outcome = Err(err);
        break;
      }
      pressed.push(key);
      std::thread::sleep(CHORD_GAP);
    }
    for key in pressed.into_iter().rev() {
      let released = self.safe_key(key, Direction::Release);
      if outcome.is_ok() {
        outcome = released;
      }
      std::thread::sleep(CHORD_GAP);
    }
    outcome
  }

  fn type_text(&mut self, text: &str) -> Result<()> {
    if text.is_empty() {
      return Ok(());
    }
    self.enigo.text(text)?;
    Ok(())
  }

  fn scroll(&mut self, delta: i32, horizontal: bool) -> Result<()> {
    let notches = wheel_notches(delta);
    if notches == 0 {
      return Ok(());
    }
    // enigo scrolls down/right for positive lengths
    if horizontal {
      self.enigo.scroll(notches, Axis::Horizontal)?;
    } else {
      self.enigo.scroll(-notches, Axis::Vertical)?;
    }
    Ok(())
  }

  fn open_url(&mut self, url: &str) -> Result<()> {
    let mut command = if cfg!(windows) {
      let mut command = std::process::Command::new("cmd");
      command.args(["/C", "start", ""]);
      command
    } else if cfg!(target_os = "macos") {
      std::process::Command::new("open")
    } else {
      std::process::Command::new("xdg-open")
    };
    command
      .arg(url)
      .spawn()
      .map_err(|err| CyberpilotError::ExecutionFailure(format!("Failed to open `{url}`: {err}")))?;
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn key_names_map_to_enigo_keys() {
    assert_eq!(map_key("Control").unwrap(), Key::Control);
    assert_eq!(map_key("ENTER").unwrap(), Key::Return);
    assert_eq!(map_key("page_down").unwrap(), Key::PageDown);
    assert_eq!(map_key("Win").unwrap(), Key::Meta);
    assert_eq!(map_key("a").unwrap(), Key::Unicode('a'));
    assert_eq!(map_key("ж").unwrap(), Key::Unicode('ж'));
  }

  #[test]
  fn unknown_multi_character_keys_are_rejected() {
    assert!(matches!(map_key("hyperdrive"), Err(CyberpilotError::ExecutionFailure(_))));
    assert!(map_key("").is_err());
  }

  #[test]
  fn system_modifiers_exclude_plain_ones() {
    for key in ["win", "Alt", "cmd", "super"] {
      assert!(is_system_modifier(key), "{key}");
    }
    assert!(!is_system_modifier("ctrl"));
    assert!(!is_system_modifier("shift"));
    assert!(!is_system_modifier("r"));
  }

  #[test]
  fn wheel_units_round_toward_at_least_one_notch() {
    assert_eq!(wheel_notches(-300), -3);
    assert_eq!(wheel_notches(500), 5);
    assert_eq!(wheel_notches(40), 1);
    assert_eq!(wheel_notches(-1), -1);
    assert_eq!(wheel_notches(0), 0);
  }
}
