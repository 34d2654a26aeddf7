//! Translate OpenAI Chat Completions requests into Dify chat-messages requests.
//!
//! Dify takes a single query per call, so only the latest user turn is forwarded;
//! earlier turns live in the Dify conversation referenced by `conversation_id`.

use super::dify_types::{DifyChatRequest, DifyInputs, ResponseMode};
use super::openai_types::{ChatCompletionRequest, ChatMessage};

/// Sent as `user` when the caller does not identify one.
pub const DEFAULT_USER: &str = "default-user";

/// Content of the last message whose role is `user`, or an empty string.
pub fn latest_user_message(messages: &[ChatMessage]) -> String {
    messages
        .iter()
        .rev()
        .find(|m| m.is_user())
        .map(ChatMessage::text)
        .unwrap_or_default()
}

/// Translate an OpenAI request into a Dify request.
/// Pure function; `model` and any other caller fields are dropped.
pub fn openai_to_dify(req: &ChatCompletionRequest) -> DifyChatRequest {
    let query = latest_user_message(&req.messages);

    DifyChatRequest {
        inputs: DifyInputs {
            text: query.clone(),
        },
        query,
        response_mode: if req.stream {
            ResponseMode::Streaming
        } else {
            ResponseMode::Blocking
        },
        user: req
            .user
            .clone()
            .unwrap_or_else(|| DEFAULT_USER.to_string()),
        conversation_id: req.conversation_id.clone(),
    }
}
