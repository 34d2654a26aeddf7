use super::dify_types::DifyStreamChunk;
use super::openai_types::{ChatCompletionChunk, ChatUsage, ChunkChoice, ChunkDelta, ChunkUsage};

/// Model name reported on every outbound chunk.
pub const RELAY_MODEL: &str = "dify";

/// Translate one Dify stream line into an OpenAI `chat.completion.chunk`.
/// Pure function: an `answer` field selects a content delta, its absence a stop chunk.
pub fn dify_to_openai(chunk: &DifyStreamChunk) -> ChatCompletionChunk {
    let (delta, finish_reason, usage) = match chunk.answer {
        Some(ref answer) => (
            ChunkDelta {
                content: Some(answer.clone()),
            },
            None,
            ChunkUsage::Counters(ChatUsage::default()),
        ),
        None => {
            let reported = chunk
                .metadata
                .as_ref()
                .and_then(|m| m.usage.clone())
                .unwrap_or_else(|| serde_json::Value::Object(serde_json::Map::new()));
            (
                ChunkDelta::default(),
                Some("stop".to_string()),
                ChunkUsage::Reported(reported),
            )
        }
    };

    ChatCompletionChunk {
        choices: vec![ChunkChoice {
            delta,
            index: 0,
            finish_reason,
        }],
        id: chunk.task_id.clone().unwrap_or_default(),
        object: "chat.completion.chunk".to_string(),
        created: chunk.created_at.unwrap_or_default(),
        model: RELAY_MODEL.to_string(),
        usage,
    }
}
