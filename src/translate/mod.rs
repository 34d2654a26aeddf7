//! API translation between OpenAI Chat Completions and Dify chat-messages.
//!
//! Converts the caller's request into a Dify request and each line of the Dify
//! response into an OpenAI streaming chunk. All translation functions are pure (no I/O).

pub mod dify_types;
pub mod openai_types;
pub mod request;
pub mod response;
pub mod streaming;
