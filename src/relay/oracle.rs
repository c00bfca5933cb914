use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use crate::{
  automation::{Action, ExecutorTurn, OracleTurn, Screenshot, Turn},
  config::RelaySettings,
  error::{CyberpilotError, Result},
};

const SYSTEM_INSTRUCTION: &str = "You operate a computer on the user's behalf and see its screen \
through screenshots. Coordinates are normalized to a 0-1000 grid where (500, 500) is the center \
of the screen. Available actions: click_at(x, y), type_text_at(x, y, text, press_enter, \
clear_before_typing), key(key), hotkey(keys), scroll(direction, amount), navigate(url), \
search(query), open_web_browser(). Look at every screenshot before acting, prefer keyboard \
shortcuts to find applications that are not visible, switch the keyboard layout before typing \
text in another script, and preserve the exact characters of the task when typing. Use navigate \
only for web pages. When the task is done, reply with text only.\n\nTask:";

/// What the oracle proposed for one turn.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct OracleReply {
  pub reasoning: Option<String>,
  pub actions: Vec<Action>,
  pub complete: bool,
}

impl OracleReply {
  pub fn into_turn(self) -> OracleTurn {
    OracleTurn {
      reasoning: self.reasoning,
      actions: self.actions,
    }
  }
}

/// Stateless action proposer. Receives the whole transcript on every call;
/// the last turn carries the newest screenshot.
#[async_trait]
pub trait ActionOracle: Send + Sync {
  async fn propose(&self, turns: &[Turn]) -> Result<OracleReply>;

  fn model(&self) -> &str {
    "unknown"
  }
}

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Content {
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub role: Option<String>,
  #[serde(default)]
  pub parts: Vec<Part>,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Part {
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub text: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub inline_data: Option<InlineData>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub function_call: Option<FunctionCall>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub function_response: Option<FunctionResponse>,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InlineData {
  pub mime_type: String,
  pub data: String,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct FunctionCall {
  pub name: String,
  #[serde(default)]
  pub args: Map<String, Value>,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct FunctionResponse {
  pub name: String,
  pub response: Value,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest<'a> {
  contents: Vec<Content>,
  tools: Vec<Tool<'a>>,
  generation_config: GenerationConfig<'a>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Tool<'a> {
  computer_use: ComputerUse<'a>,
}

#[derive(Serialize)]
struct ComputerUse<'a> {
  environment: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig<'a> {
  temperature: f32,
  response_modalities: [&'a str; 1],
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateResponse {
  #[serde(default)]
  pub candidates: Vec<Candidate>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Candidate {
  #[serde(default)]
  pub content: Option<Content>,
  #[serde(default)]
  pub finish_reason: Option<String>,
}

fn image_part(screenshot: &Screenshot) -> Part {
  Part {
    inline_data: Some(InlineData {
      mime_type: screenshot.mime_type().to_string(),
      data: screenshot.to_base64(),
    }),
    ..Default::default()
  }
}

fn text_part(text: String) -> Part {
  Part {
    text: Some(text),
    ..Default::default()
  }
}

fn executor_parts(turn: &ExecutorTurn) -> Vec<Part> {
  let url = turn.current_location.clone().unwrap_or_default();
  let mut parts = turn
    .results
    .iter()
    .map(|result| Part {
      function_response: Some(FunctionResponse {
        name: result.name.clone(),
        response: json!({
          "url": url,
          "success": result.succeeded,
          "detail": result.detail,
        }),
      }),
      ..Default::default()
    })
    .collect::<Vec<_>>();
  if parts.is_empty() {
    parts.push(text_part(format!("No actions were executed. Current location: {url}")));
  }
  parts.push(image_part(&turn.screenshot));
  parts
}

/// Renders the transcript as Gemini contents, one content per turn.
pub fn render_contents(turns: &[Turn]) -> Vec<Content> {
  turns
    .iter()
    .map(|turn| match turn {
      Turn::Prompt { text, screenshot } => Content {
        role: Some("user".into()),
        parts: vec![
          text_part(format!("{SYSTEM_INSTRUCTION}\n{text}")),
          image_part(screenshot),
        ],
      },
      Turn::Oracle(turn) => {
        let mut parts = Vec::with_capacity(turn.actions.len() + 1);
        if let Some(reasoning) = &turn.reasoning {
          parts.push(text_part(reasoning.clone()));
        }
        parts.extend(turn.actions.iter().map(|action| Part {
          function_call: Some(FunctionCall {
            name: action.name.clone(),
            args: action.args.clone(),
          }),
          ..Default::default()
        }));
        Content {
          role: Some("model".into()),
          parts,
        }
      }
      Turn::Executor(turn) => Content {
        role: Some("user".into()),
        parts: executor_parts(turn),
      },
    })
    .collect()
}

/// Reads the first candidate. The reasoning is the last non-empty text part;
/// the turn is complete when no function call was made.
pub fn parse_reply(response: GenerateResponse) -> Result<OracleReply> {
  let candidate = response
    .candidates
    .into_iter()
    .next()
    .ok_or_else(|| CyberpilotError::oracle_failure("response has no candidates"))?;
  let content = candidate.content.ok_or_else(|| {
    CyberpilotError::oracle_failure(format!(
      "candidate has no content (finish reason: {})",
      candidate.finish_reason.as_deref().unwrap_or("unknown")
    ))
  })?;

  let mut reasoning = None;
  let mut actions = Vec::new();
  for part in content.parts {
    if let Some(text) = part.text.filter(|text| !text.trim().is_empty()) {
      reasoning = Some(text);
    }
    if let Some(call) = part.function_call {
      actions.push(Action {
        name: call.name,
        args: call.args,
      });
    }
  }
  let complete = actions.is_empty();
  Ok(OracleReply {
    reasoning,
    actions,
    complete,
  })
}

/// Gemini computer-use model over the `generateContent` REST endpoint.
pub struct GeminiOracle {
  client: reqwest::Client,
  endpoint: String,
  api_key: String,
  model: String,
  temperature: f32,
  environment: String,
}

impl GeminiOracle {
  pub fn new(settings: &RelaySettings, api_key: String) -> Result<Self> {
    let client = reqwest::Client::builder()
      .timeout(Duration::from_secs(settings.oracle_timeout_secs.max(1)))
      .build()?;
    let base = settings.oracle_url.trim_end_matches('/');
    Ok(Self {
      client,
      endpoint: format!("{base}/v1beta/models/{}:generateContent", settings.model),
      api_key,
      model: settings.model.clone(),
      temperature: settings.temperature,
      environment: settings.oracle_environment.clone(),
    })
  }

  fn request<'a>(&'a self, turns: &[Turn]) -> GenerateRequest<'a> {
    GenerateRequest {
      contents: render_contents(turns),
      tools: vec![Tool {
        computer_use: ComputerUse {
          environment: &self.environment,
        },
      }],
      generation_config: GenerationConfig {
        temperature: self.temperature,
        response_modalities: ["TEXT"],
      },
    }
  }
}

#[async_trait]
impl ActionOracle for GeminiOracle {
  async fn propose(&self, turns: &[Turn]) -> Result<OracleReply> {
    let request = self.request(turns);
    tracing::debug!(
      target: "oracle",
      model = %self.model,
      contents = request.contents.len(),
      "sending generateContent"
    );

    let response = self
      .client
      .post(&self.endpoint)
      .header("x-goog-api-key", &self.api_key)
      .json(&request)
      .send()
      .await
      .map_err(CyberpilotError::oracle_failure)?;
    if !response.status().is_success() {
      let status = response.status();
      let body = response.text().await.unwrap_or_default();
      return Err(CyberpilotError::OracleFailure(format!(
        "Gemini API error ({status}): {body}"
      )));
    }
    let body = response
      .json::<GenerateResponse>()
      .await
      .map_err(CyberpilotError::oracle_failure)?;

    let reply = parse_reply(body)?;
    tracing::info!(
      target: "oracle",
      actions = reply.actions.len(),
      complete = reply.complete,
      "oracle replied"
    );
    Ok(reply)
  }

  fn model(&self) -> &str {
    &self.model
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::automation::ActionResult;

  fn shot() -> Screenshot {
    Screenshot::new(vec![0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A])
  }

  #[test]
  fn transcript_renders_as_alternating_contents() {
    let turns = vec![
      Turn::Prompt {
        text: "open example.com".into(),
        screenshot: shot(),
      },
      Turn::Oracle(OracleTurn {
        reasoning: Some("navigating".into()),
        actions: vec![Action::navigate("http://example.com")],
      }),
      Turn::Executor(ExecutorTurn {
        results: vec![ActionResult::success("navigate", "")],
        screenshot: shot(),
        current_location: Some("http://example.com".into()),
      }),
    ];

    let contents = render_contents(&turns);
    let roles = contents
      .iter()
      .map(|content| content.role.as_deref().unwrap_or(""))
      .collect::<Vec<_>>();
    assert_eq!(roles, vec!["user", "model", "user"]);

    let prompt = serde_json::to_value(&contents[0]).unwrap();
    assert!(
      prompt["parts"][0]["text"]
        .as_str()
        .unwrap()
        .ends_with("open example.com")
    );
    assert_eq!(prompt["parts"][1]["inlineData"]["mimeType"], "image/png");

    let model = serde_json::to_value(&contents[1]).unwrap();
    assert_eq!(model["parts"][1]["functionCall"]["name"], "navigate");
    assert_eq!(model["parts"][1]["functionCall"]["args"]["url"], "http://example.com");

    let feedback = serde_json::to_value(&contents[2]).unwrap();
    assert_eq!(
      feedback["parts"][0]["functionResponse"]["response"]["url"],
      "http://example.com"
    );
    assert!(feedback["parts"][1]["inlineData"].is_object());
  }

  #[test]
  fn reply_without_calls_is_complete() {
    let response: GenerateResponse = serde_json::from_value(json!({
      "candidates": [{
        "content": { "role": "model", "parts": [{ "text": "" }, { "text": "All done." }] },
        "finishReason": "STOP"
      }]
    }))
    .unwrap();
    let reply = parse_reply(response).unwrap();
    assert!(reply.complete);
    assert!(reply.actions.is_empty());
    assert_eq!(reply.reasoning.as_deref(), Some("All done."));
  }

  #[test]
  fn function_calls_become_actions_in_order() {
    let response: GenerateResponse = serde_json::from_value(json!({
      "candidates": [{
        "content": { "role": "model", "parts": [
          { "text": "Clicking the search box" },
          { "functionCall": { "name": "click_at", "args": { "x": 500, "y": 120 } } },
          { "functionCall": { "name": "type_text_at", "args": { "x": 500, "y": 120, "text": "rust" } } }
        ] }
      }]
    }))
    .unwrap();
    let reply = parse_reply(response).unwrap();
    assert!(!reply.complete);
    let names = reply.actions.iter().map(|a| a.name.as_str()).collect::<Vec<_>>();
    assert_eq!(names, vec!["click_at", "type_text_at"]);
  }

  #[test]
  fn empty_candidates_are_an_oracle_failure() {
    let err = parse_reply(GenerateResponse::default()).unwrap_err();
    assert!(matches!(err, CyberpilotError::OracleFailure(_)));

    let blocked: GenerateResponse =
      serde_json::from_value(json!({ "candidates": [{ "finishReason": "SAFETY" }] })).unwrap();
    assert!(matches!(parse_reply(blocked), Err(CyberpilotError::OracleFailure(_))));
  }

  #[test]
  fn request_carries_the_configured_environment() {
    let settings = RelaySettings {
      oracle_environment: "ENVIRONMENT_UNSPECIFIED".into(),
      temperature: 0.5,
      ..RelaySettings::default()
    };
    let oracle = GeminiOracle::new(&settings, "key".into()).unwrap();
    let turns = vec![Turn::Prompt {
      text: "open notepad".into(),
      screenshot: shot(),
    }];

    let body = serde_json::to_value(oracle.request(&turns)).unwrap();
    assert_eq!(
      body["tools"][0]["computerUse"]["environment"],
      "ENVIRONMENT_UNSPECIFIED"
    );
    assert_eq!(body["generationConfig"]["temperature"], 0.5);
    assert_eq!(body["generationConfig"]["responseModalities"][0], "TEXT");
    assert_eq!(body["contents"].as_array().unwrap().len(), 1);
    assert!(oracle.endpoint.ends_with(":generateContent"));
  }
}
