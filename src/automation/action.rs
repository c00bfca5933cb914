use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::{Map, Value, json};

pub const UNKNOWN_FUNCTION: &str = "unknown_function";

/// An action proposed by the oracle, kept in its wire form (`name` plus a
/// flat argument mapping) so it can be replayed to the oracle verbatim.
/// [`Action::kind`] gives the typed view the executor dispatches on.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct Action {
  pub name: String,
  #[serde(default)]
  pub args: Map<String, Value>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScrollDirection {
  Up,
  #[default]
  Down,
  Left,
  Right,
}

#[derive(Clone, Debug, PartialEq)]
pub enum ActionKind {
  OpenBrowser,
  Navigate {
    url: String,
  },
  Click {
    x: f64,
    y: f64,
  },
  TypeText {
    x: f64,
    y: f64,
    text: String,
    press_enter: bool,
    clear_first: bool,
  },
  Scroll {
    direction: ScrollDirection,
    amount: u32,
  },
  PressKey {
    key: String,
  },
  Hotkey {
    keys: Vec<String>,
  },
  Search {
    query: String,
  },
  Unknown {
    name: String,
    args: Map<String, Value>,
  },
  /// A known action whose arguments could not be read.
  Malformed {
    name: String,
    reason: String,
  },
}

#[derive(Deserialize)]
#[serde(default)]
struct PointArgs {
  x: f64,
  y: f64,
}

impl Default for PointArgs {
  fn default() -> Self {
    Self { x: 0.0, y: 0.0 }
  }
}

#[derive(Deserialize)]
struct NavigateArgs {
  url: String,
}

#[derive(Deserialize)]
#[serde(default)]
struct TypeTextArgs {
  x: f64,
  y: f64,
  text: String,
  #[serde(alias = "pressEnter")]
  press_enter: bool,
  #[serde(alias = "clear_before_typing", alias = "clearFirst")]
  clear_first: bool,
}

impl Default for TypeTextArgs {
  fn default() -> Self {
    Self {
      x: 0.0,
      y: 0.0,
      text: String::new(),
      press_enter: false,
      clear_first: true,
    }
  }
}

#[derive(Deserialize)]
#[serde(default)]
struct ScrollArgs {
  direction: ScrollDirection,
  #[serde(alias = "magnitude")]
  amount: u32,
}

impl Default for ScrollArgs {
  fn default() -> Self {
    Self {
      direction: ScrollDirection::Down,
      amount: 3,
    }
  }
}

#[derive(Deserialize)]
struct PressKeyArgs {
  key: String,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum KeysArg {
  List(Vec<String>),
  Combo(String),
}

#[derive(Deserialize)]
struct HotkeyArgs {
  keys: KeysArg,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct SearchArgs {
  query: String,
}

/// Splits a `ctrl+shift+t` style combo into key names.
pub fn split_combo(combo: &str) -> Vec<String> {
  combo
    .split('+')
    .map(|key| key.trim().to_lowercase())
    .filter(|key| !key.is_empty())
    .collect()
}

impl Action {
  pub fn new(name: impl Into<String>, args: Value) -> Self {
    let args = match args {
      Value::Object(map) => map,
      _ => Map::new(),
    };
    Self {
      name: name.into(),
      args,
    }
  }

  pub fn navigate(url: &str) -> Self {
    Self::new("navigate", json!({ "url": url }))
  }

  pub fn click(x: f64, y: f64) -> Self {
    Self::new("click", json!({ "x": x, "y": y }))
  }

  fn parse_args<T: DeserializeOwned>(&self) -> std::result::Result<T, String> {
    serde_json::from_value(Value::Object(self.args.clone())).map_err(|err| err.to_string())
  }

  /// Resolves the wire form against the fixed vocabulary. Never fails:
  /// unrecognized names become [`ActionKind::Unknown`].
  pub fn kind(&self) -> ActionKind {
    let parsed = match self.name.as_str() {
      "open_browser" | "open_web_browser" => Ok(ActionKind::OpenBrowser),
      "navigate" => self
        .parse_args::<NavigateArgs>()
        .map(|args| ActionKind::Navigate { url: args.url }),
      "click" | "click_at" => self
        .parse_args::<PointArgs>()
        .map(|args| ActionKind::Click { x: args.x, y: args.y }),
      "type_text" | "type_text_at" | "type" => {
        self
          .parse_args::<TypeTextArgs>()
          .map(|args| ActionKind::TypeText {
            x: args.x,
            y: args.y,
            text: args.text,
            press_enter: args.press_enter,
            clear_first: args.clear_first,
          })
      }
      "scroll" | "scroll_document" => self
        .parse_args::<ScrollArgs>()
        .map(|args| ActionKind::Scroll {
          direction: args.direction,
          amount: args.amount,
        }),
      "press_key" | "key" => self
        .parse_args::<PressKeyArgs>()
        .map(|args| ActionKind::PressKey { key: args.key }),
      "hotkey" | "key_combination" => self.parse_args::<HotkeyArgs>().and_then(|args| {
        let keys = match args.keys {
          KeysArg::List(keys) => keys.iter().map(|key| key.trim().to_lowercase()).collect(),
          KeysArg::Combo(combo) => split_combo(&combo),
        };
        if keys.is_empty() {
          Err("`keys` is empty".to_string())
        } else {
          Ok(ActionKind::Hotkey { keys })
        }
      }),
      "search" => self
        .parse_args::<SearchArgs>()
        .map(|args| ActionKind::Search { query: args.query }),
      _ => Ok(ActionKind::Unknown {
        name: self.name.clone(),
        args: self.args.clone(),
      }),
    };
    parsed.unwrap_or_else(|reason| ActionKind::Malformed {
      name: self.name.clone(),
      reason,
    })
  }
}

fn default_success() -> bool {
  true
}

/// Outcome of executing one [`Action`]. Produced exactly once per action,
/// in proposal order.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct ActionResult {
  pub name: String,
  #[serde(rename = "success", alias = "succeeded", default = "default_success")]
  pub succeeded: bool,
  #[serde(default, alias = "result", alias = "error")]
  pub detail: String,
}

impl ActionResult {
  pub fn success(name: &str, detail: impl Into<String>) -> Self {
    Self {
      name: name.to_string(),
      succeeded: true,
      detail: detail.into(),
    }
  }

  pub fn failure(name: &str, detail: impl Into<String>) -> Self {
    Self {
      name: name.to_string(),
      succeeded: false,
      detail: detail.into(),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn unknown_names_are_preserved() {
    let action = Action::new("fly_to_moon", json!({ "speed": 11 }));
    match action.kind() {
      ActionKind::Unknown { name, args } => {
        assert_eq!(name, "fly_to_moon");
        assert_eq!(args.get("speed"), Some(&json!(11)));
      }
      other => panic!("expected unknown, got {other:?}"),
    }
  }

  #[test]
  fn oracle_aliases_resolve_to_the_same_kind() {
    let click = Action::new("click_at", json!({ "x": 500, "y": 250 }));
    assert_eq!(click.kind(), ActionKind::Click { x: 500.0, y: 250.0 });

    let typed = Action::new(
      "type_text_at",
      json!({ "x": 10, "y": 20, "text": "привет", "press_enter": true }),
    );
    assert_eq!(
      typed.kind(),
      ActionKind::TypeText {
        x: 10.0,
        y: 20.0,
        text: "привет".into(),
        press_enter: true,
        clear_first: true,
      }
    );

    let key = Action::new("key", json!({ "key": "enter" }));
    assert_eq!(key.kind(), ActionKind::PressKey { key: "enter".into() });
  }

  #[test]
  fn hotkey_accepts_lists_and_combos() {
    let list = Action::new("hotkey", json!({ "keys": ["Win", "r"] }));
    assert_eq!(list.kind(), ActionKind::Hotkey { keys: vec!["win".into(), "r".into()] });

    let combo = Action::new("key_combination", json!({ "keys": "Control+Shift+T" }));
    assert_eq!(
      combo.kind(),
      ActionKind::Hotkey { keys: vec!["control".into(), "shift".into(), "t".into()] }
    );
  }

  #[test]
  fn scroll_defaults_match_the_client() {
    let scroll = Action::new("scroll", json!({}));
    assert_eq!(
      scroll.kind(),
      ActionKind::Scroll { direction: ScrollDirection::Down, amount: 3 }
    );
  }

  #[test]
  fn bad_arguments_become_malformed() {
    let navigate = Action::new("navigate", json!({}));
    assert!(matches!(navigate.kind(), ActionKind::Malformed { .. }));

    let hotkey = Action::new("hotkey", json!({ "keys": [] }));
    assert!(matches!(hotkey.kind(), ActionKind::Malformed { .. }));

    let scroll = Action::new("scroll", json!({ "amount": -4 }));
    assert!(matches!(scroll.kind(), ActionKind::Malformed { .. }));
  }

  #[test]
  fn results_accept_the_client_field_names() {
    let ok: ActionResult =
      serde_json::from_value(json!({ "name": "navigate", "success": true, "result": "success" }))
        .unwrap();
    assert_eq!(ok, ActionResult::success("navigate", "success"));

    let failed: ActionResult =
      serde_json::from_value(json!({ "name": "click", "success": false, "error": "boom" })).unwrap();
    assert_eq!(failed, ActionResult::failure("click", "boom"));

    let bare: ActionResult = serde_json::from_value(json!({ "name": "navigate" })).unwrap();
    assert!(bare.succeeded);
  }
}
