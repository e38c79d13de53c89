//! Completion notification parsing
//!
//! The provider has sent several payload shapes over time. Each field is read
//! through an ordered chain of extractors; the first extractor that yields a
//! value wins, and a missing or oddly typed shape simply yields nothing.
//!
//! # Shapes
//!
//! ```text
//! job id:   taskId | task_id | data.taskId | data.task_id
//! state:    state | status | data.state | data.status
//! artifact: resultUrl | result_url | data.resultUrl | data.result_url
//!           | data.resultJson.resultUrls[0]   (JSON string or object)
//!           | data.resultUrls[0]
//! ```

use serde_json::Value;

type Extractor = fn(&Value) -> Option<String>;

/// Completion state reported by the provider
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompletionState {
    /// Job finished and produced a result
    Success,

    /// Job finished without a result
    Failed(String),

    /// Job still running (or a state this side does not know)
    InProgress(String),

    /// No state in the payload
    Unknown,
}

impl CompletionState {
    fn from_raw(raw: Option<String>) -> Self {
        let Some(raw) = raw else {
            return CompletionState::Unknown;
        };

        match raw.to_ascii_lowercase().as_str() {
            "success" | "succeeded" | "completed" | "complete" | "done" | "finished" => {
                CompletionState::Success
            }
            "fail" | "failed" | "failure" | "error" | "cancelled" | "canceled" | "timeout"
            | "expired" => CompletionState::Failed(raw),
            _ => CompletionState::InProgress(raw),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, CompletionState::Success)
    }
}

/// Fields read from one notification
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub job_id: String,
    pub state: CompletionState,

    /// Result location; only read when the state is a success
    pub artifact: Option<String>,
}

impl Notification {
    /// Parses a raw body; `None` when it is not JSON or carries no job id
    pub fn parse(body: &[u8]) -> Option<Self> {
        let value: Value = serde_json::from_slice(body).ok()?;
        Self::from_value(&value)
    }

    pub fn from_value(value: &Value) -> Option<Self> {
        let job_id = first_match(value, &JOB_ID_CHAIN)?;
        let state = CompletionState::from_raw(first_match(value, &STATE_CHAIN));
        let artifact = if state.is_success() {
            first_match(value, &ARTIFACT_CHAIN)
        } else {
            None
        };

        Some(Notification {
            job_id,
            state,
            artifact,
        })
    }
}

const JOB_ID_CHAIN: [Extractor; 4] = [
    |v: &Value| scalar(v.get("taskId")),
    |v: &Value| scalar(v.get("task_id")),
    |v: &Value| scalar(data(v)?.get("taskId")),
    |v: &Value| scalar(data(v)?.get("task_id")),
];

const STATE_CHAIN: [Extractor; 4] = [
    |v: &Value| text(v.get("state")),
    |v: &Value| text(v.get("status")),
    |v: &Value| text(data(v)?.get("state")),
    |v: &Value| text(data(v)?.get("status")),
];

const ARTIFACT_CHAIN: [Extractor; 6] = [
    |v: &Value| text(v.get("resultUrl")),
    |v: &Value| text(v.get("result_url")),
    |v: &Value| text(data(v)?.get("resultUrl")),
    |v: &Value| text(data(v)?.get("result_url")),
    |v: &Value| first_url(&embedded_json(data(v)?.get("resultJson")?)?),
    |v: &Value| first_url(data(v)?),
];

fn first_match(value: &Value, chain: &[Extractor]) -> Option<String> {
    chain.iter().find_map(|extract| extract(value))
}

fn data(value: &Value) -> Option<&Value> {
    value.get("data").filter(|d| d.is_object())
}

/// Non-empty string
fn text(value: Option<&Value>) -> Option<String> {
    value
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Non-empty string, or a number rendered as text
fn scalar(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::Number(n) => Some(n.to_string()),
        other => text(Some(other)),
    }
}

/// `resultJson` arrives either JSON-encoded in a string or already decoded
fn embedded_json(value: &Value) -> Option<Value> {
    match value {
        Value::String(raw) => serde_json::from_str(raw).ok(),
        Value::Object(_) => Some(value.clone()),
        _ => None,
    }
}

fn first_url(value: &Value) -> Option<String> {
    text(value.get("resultUrls")?.as_array()?.first())
}
