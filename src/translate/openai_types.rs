//! Type definitions for the caller-facing side: the [OpenAI Chat Completions API](https://platform.openai.com/docs/api-reference/chat).
//!
//! The request types are deliberately lenient: missing or oddly-shaped fields fall
//! back to defaults instead of rejecting the request. The chunk types serialize in
//! the exact field order callers see on the wire.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

// ---------------------------------------------------------------------------
// Request types (what callers send TO the relay)
// ---------------------------------------------------------------------------

/// `model` and any other caller fields are ignored; Dify selects the model per app.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChatCompletionRequest {
    #[serde(default, deserialize_with = "deserialize_messages")]
    pub messages: Vec<ChatMessage>,
    /// Interpreted by JSON truthiness, so `1` or `"yes"` also request streaming.
    #[serde(default, deserialize_with = "deserialize_truthy")]
    pub stream: bool,
    #[serde(default, deserialize_with = "deserialize_lenient_string")]
    pub user: Option<String>,
    #[serde(default, deserialize_with = "deserialize_lenient_string")]
    pub conversation_id: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChatMessage {
    #[serde(default, deserialize_with = "deserialize_lenient_string")]
    pub role: Option<String>,
    #[serde(default)]
    pub content: Option<MessageContent>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
    Other(Value),
}

#[derive(Debug, Clone, Deserialize)]
pub struct ContentPart {
    #[serde(rename = "type", default, deserialize_with = "deserialize_lenient_string")]
    pub part_type: Option<String>,
    #[serde(default, deserialize_with = "deserialize_lenient_string")]
    pub text: Option<String>,
}

impl MessageContent {
    /// Flatten to plain text. Multi-part content keeps only its text parts,
    /// concatenated in order.
    pub fn as_text(&self) -> String {
        match self {
            MessageContent::Text(s) => s.clone(),
            MessageContent::Parts(parts) => parts
                .iter()
                .filter(|p| p.part_type.as_deref().map_or(true, |t| t == "text"))
                .filter_map(|p| p.text.as_deref())
                .collect(),
            MessageContent::Other(_) => String::new(),
        }
    }
}

impl ChatMessage {
    pub fn is_user(&self) -> bool {
        self.role.as_deref() == Some("user")
    }

    pub fn text(&self) -> String {
        self.content
            .as_ref()
            .map(MessageContent::as_text)
            .unwrap_or_default()
    }
}

/// Strings pass through; any other JSON value reads as absent.
pub(super) fn deserialize_lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(Some(s)),
        _ => Ok(None),
    }
}

/// A non-array `messages` reads as empty; an entry that is not an object reads
/// as a message with neither role nor content.
fn deserialize_messages<'de, D>(deserializer: D) -> Result<Vec<ChatMessage>, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::Array(items) => Ok(items
            .into_iter()
            .map(|item| serde_json::from_value(item).unwrap_or_default())
            .collect()),
        _ => Ok(Vec::new()),
    }
}

fn deserialize_truthy<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(is_truthy(&value))
}

/// JSON truthiness: `null`, `false`, zero, and empty strings, arrays and objects
/// are falsy.
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map_or(true, |f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

// ---------------------------------------------------------------------------
// Streaming chunk types (what the relay sends BACK to callers)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatCompletionChunk {
    pub choices: Vec<ChunkChoice>,
    pub id: String,
    pub object: String,
    pub created: i64,
    pub model: String,
    pub usage: ChunkUsage,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkChoice {
    pub delta: ChunkDelta,
    pub index: u32,
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChunkDelta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChatUsage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ChunkUsage {
    /// Token counters, zeroed on answer chunks.
    Counters(ChatUsage),
    /// Usage reported by the backend on the terminal chunk, passed through verbatim.
    Reported(Value),
}

// ---------------------------------------------------------------------------
// Error body
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelayErrorBody {
    pub error: String,
    pub status_code: u16,
}

impl RelayErrorBody {
    pub fn new(error: impl Into<String>, status_code: u16) -> Self {
        Self {
            error: error.into(),
            status_code,
        }
    }

    pub fn backend_failed(status_code: u16) -> Self {
        Self::new("Dify API request failed", status_code)
    }

    pub fn invalid_request(reason: impl std::fmt::Display) -> Self {
        Self::new(format!("Invalid request body: {}", reason), 400)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_truthiness() {
        for falsy in [json!(null), json!(false), json!(0), json!(0.0), json!(""), json!([]), json!({})] {
            assert!(!is_truthy(&falsy), "{falsy} should be falsy");
        }
        for truthy in [json!(true), json!(1), json!(-2.5), json!("no"), json!([0]), json!({"a": 1})] {
            assert!(is_truthy(&truthy), "{truthy} should be truthy");
        }
    }

    #[test]
    fn test_lenient_request_parsing() {
        let req: ChatCompletionRequest = serde_json::from_value(json!({
            "model": {"weird": true},
            "stream": "yes",
            "temperature": 0.2,
            "messages": [
                {"role": "system"},
                {"role": "user", "content": null},
                {"content": "no role"}
            ]
        }))
        .unwrap();

        assert!(req.stream);
        assert_eq!(req.messages.len(), 3);
        assert!(req.messages[1].is_user());
        assert_eq!(req.messages[1].text(), "");
        assert!(!req.messages[2].is_user());
        assert!(req.user.is_none());
    }

    #[test]
    fn test_wrong_typed_fields_fall_back_to_defaults() {
        let req: ChatCompletionRequest = serde_json::from_value(json!({
            "user": 42,
            "conversation_id": 7,
            "messages": [
                {"role": 1, "content": "x"},
                "not a message",
                {"role": "user", "content": [{"type": "text", "text": 5}, {"type": "text", "text": "hi"}]}
            ]
        }))
        .unwrap();

        assert!(req.user.is_none());
        assert!(req.conversation_id.is_none());
        assert_eq!(req.messages.len(), 3);
        assert!(!req.messages[0].is_user());
        assert!(req.messages[1].role.is_none());
        assert_eq!(req.messages[2].text(), "hi");
    }

    #[test]
    fn test_non_array_messages_read_as_empty() {
        let req: ChatCompletionRequest =
            serde_json::from_value(json!({"messages": "hello"})).unwrap();
        assert!(req.messages.is_empty());
    }

    #[test]
    fn test_empty_object_is_a_valid_request() {
        let req: ChatCompletionRequest = serde_json::from_value(json!({})).unwrap();
        assert!(req.messages.is_empty());
        assert!(!req.stream);
        assert!(req.conversation_id.is_none());
    }

    #[test]
    fn test_multipart_content_keeps_text_parts() {
        let msg: ChatMessage = serde_json::from_value(json!({
            "role": "user",
            "content": [
                {"type": "text", "text": "look at "},
                {"type": "image_url", "image_url": {"url": "https://example.com/a.png"}},
                {"type": "text", "text": "this"}
            ]
        }))
        .unwrap();
        assert_eq!(msg.text(), "look at this");
    }

    #[test]
    fn test_error_body_shape() {
        let body = serde_json::to_string(&RelayErrorBody::backend_failed(500)).unwrap();
        assert_eq!(body, r#"{"error":"Dify API request failed","status_code":500}"#);
    }
}
