//! Type definitions for the [Dify chat-messages API](https://docs.dify.ai/guides/application-publishing/developing-with-apis).

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

// ---------------------------------------------------------------------------
// Request types (what we send TO Dify)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseMode {
    Streaming,
    Blocking,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DifyInputs {
    pub text: String,
}

/// `conversation_id` is always serialized; `null` starts a new conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DifyChatRequest {
    pub inputs: DifyInputs,
    pub query: String,
    pub response_mode: ResponseMode,
    pub user: String,
    pub conversation_id: Option<String>,
}

// ---------------------------------------------------------------------------
// Response types (what Dify streams back)
// ---------------------------------------------------------------------------

/// One line of a Dify response. Either an answer chunk (`answer` present) or a
/// terminal chunk carrying `metadata.usage`. Other fields Dify sends are ignored.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DifyStreamChunk {
    #[serde(default, deserialize_with = "deserialize_answer")]
    pub answer: Option<String>,
    #[serde(default, deserialize_with = "super::openai_types::deserialize_lenient_string")]
    pub task_id: Option<String>,
    #[serde(default, deserialize_with = "deserialize_timestamp")]
    pub created_at: Option<i64>,
    #[serde(default)]
    pub metadata: Option<DifyMetadata>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DifyMetadata {
    #[serde(default)]
    pub usage: Option<Value>,
}

/// Non-string answers are relayed as their JSON text; `null` reads as absent.
fn deserialize_answer<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Null => None,
        Value::String(s) => Some(s),
        other => Some(other.to_string()),
    })
}

/// Seconds since the epoch. Fractional values are truncated, numeric strings are
/// parsed, anything else reads as absent.
fn deserialize_timestamp<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => s.trim().parse::<f64>().ok().map(|f| f as i64),
        _ => None,
    })
}
