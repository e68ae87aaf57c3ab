//! Conversation State
//!
//! The only entity carried across turns. The caller owns the canonical copy:
//! each turn receives one by value, works on it, and hands the updated copy
//! back in the [`TurnOutcome`](crate::turn::TurnOutcome).
//!
//! # Validation
//!
//! Caller-supplied state is untrusted JSON. [`ConversationState::from_value`]
//! is the single point where it is normalized: a missing or blank `model`
//! falls back to the catalog default, a missing or malformed `history`
//! becomes empty, and history entries that are not `{role, content}` pairs
//! with a known role are discarded. Keys the relay does not understand are
//! kept and round-trip back to the caller unchanged.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Who produced a message
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    /// User input
    User,
    /// Completion provider reply
    Assistant,
}

/// One entry of the conversation history
///
/// Fields are private: a message never changes once it is in a history.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    role: MessageRole,
    content: String,
}

impl Message {
    /// Create a user message
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
        }
    }

    /// Create an assistant message
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: content.into(),
        }
    }

    /// Who sent this message
    #[must_use]
    pub fn role(&self) -> MessageRole {
        self.role
    }

    /// Message text
    #[must_use]
    pub fn content(&self) -> &str {
        &self.content
    }
}

/// Per-conversation state: active model plus append-only history
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ConversationState {
    model: String,
    history: Vec<Message>,
    /// Caller keys the relay does not interpret
    #[serde(flatten)]
    extra: Map<String, Value>,
}

impl ConversationState {
    /// Create an empty state using `model`
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            history: Vec::new(),
            extra: Map::new(),
        }
    }

    /// Normalize caller-supplied JSON into a state
    ///
    /// Accepts an object, or a string holding a JSON-encoded object. Anything
    /// else yields an empty state on `default_model`.
    #[must_use]
    pub fn from_value(value: Option<&Value>, default_model: &str) -> Self {
        let object = match value {
            None | Some(Value::Null) => Map::new(),
            Some(Value::Object(map)) => map.clone(),
            Some(Value::String(encoded)) => match serde_json::from_str::<Value>(encoded) {
                Ok(Value::Object(map)) => map,
                Ok(_) => {
                    tracing::warn!("Encoded state is not a JSON object, starting empty");
                    Map::new()
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Encoded state is not valid JSON, starting empty");
                    Map::new()
                }
            },
            Some(other) => {
                tracing::warn!(kind = %json_kind(other), "Unsupported state type, starting empty");
                Map::new()
            }
        };

        Self::from_map(object, default_model)
    }

    fn from_map(mut object: Map<String, Value>, default_model: &str) -> Self {
        let model = match object.remove("model") {
            Some(Value::String(m)) if !m.trim().is_empty() => m,
            Some(Value::String(_)) | None => default_model.to_string(),
            Some(other) => {
                tracing::warn!(kind = %json_kind(&other), "State model is not a string, using default");
                default_model.to_string()
            }
        };

        let history = match object.remove("history") {
            Some(Value::Array(entries)) => {
                let total = entries.len();
                let history: Vec<Message> = entries
                    .into_iter()
                    .filter_map(|entry| serde_json::from_value(entry).ok())
                    .collect();
                if history.len() != total {
                    tracing::warn!(
                        dropped = total - history.len(),
                        "Discarded malformed history entries"
                    );
                }
                history
            }
            None | Some(Value::Null) => Vec::new(),
            Some(other) => {
                tracing::warn!(kind = %json_kind(&other), "State history is not an array, starting empty");
                Vec::new()
            }
        };

        Self {
            model,
            history,
            extra: object,
        }
    }

    /// Active model identifier (never empty)
    #[must_use]
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Switch the active model; blank identifiers are ignored
    pub fn set_model(&mut self, model: impl Into<String>) {
        let model = model.into();
        if !model.trim().is_empty() {
            self.model = model;
        }
    }

    /// Messages in insertion order
    #[must_use]
    pub fn history(&self) -> &[Message] {
        &self.history
    }

    /// Record a completed exchange
    ///
    /// Both messages are appended together, so the history never holds a
    /// user turn whose reply is still pending.
    pub fn record_exchange(&mut self, user: Message, assistant: Message) {
        self.history.push(user);
        self.history.push(assistant);
    }

    /// Encode back to the caller's JSON form
    #[must_use]
    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or_else(|_| Value::Object(Map::new()))
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
