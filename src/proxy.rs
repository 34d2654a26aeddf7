use crate::config::BackendTarget;
use crate::error::{RelayError, Result};
use crate::logging::{LogLevel, SharedLogger, Stage};
use crate::translate::dify_types::DifyChatRequest;
use crate::translate::openai_types::{ChatCompletionRequest, RelayErrorBody};
use crate::translate::request::openai_to_dify;
use crate::translate::streaming::{translate_line, LineSplitter};

use bytes::Bytes;
use futures::stream::Stream;
use futures::StreamExt;
use serde_json::json;
use std::pin::Pin;

/// Translated response body: one `data: ...\n\n` frame per item.
pub type FrameStream = Pin<Box<dyn Stream<Item = Result<Bytes>> + Send>>;

/// Outcome of relaying one chat completion request.
pub enum RelayOutcome {
    Stream(FrameStream),
    /// Dify answered with a non-success status.
    Rejected(RelayErrorBody, u16),
}

/// Forward a chat completion request to Dify and translate its answer.
///
/// The backend body is always consumed incrementally, also when the caller asked
/// for a blocking response.
pub async fn relay_chat(
    req: &ChatCompletionRequest,
    backend: &BackendTarget,
    client: &reqwest::Client,
    logger: &SharedLogger,
    request_id: &str,
) -> Result<RelayOutcome> {
    let dify_req = openai_to_dify(req);

    logger.request(
        LogLevel::Info,
        Stage::Backend,
        request_id,
        format!("Transformed request to Dify format, POST {}", backend.url),
        serde_json::to_value(&dify_req).ok(),
    );

    let response = send(&dify_req, backend, client).await?;
    let status = response.status();

    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        logger.request(
            LogLevel::Error,
            Stage::Upstream,
            request_id,
            format!("Dify API request failed with status code {}", status.as_u16()),
            Some(json!({ "body": truncate(&body, 500) })),
        );
        return Ok(RelayOutcome::Rejected(
            RelayErrorBody::backend_failed(status.as_u16()),
            status.as_u16(),
        ));
    }

    let frames = translate_stream(
        response.bytes_stream(),
        request_id.to_string(),
        logger.clone(),
    );

    Ok(RelayOutcome::Stream(Box::pin(frames)))
}

async fn send(
    dify_req: &DifyChatRequest,
    backend: &BackendTarget,
    client: &reqwest::Client,
) -> Result<reqwest::Response> {
    client
        .post(&backend.url)
        .header("Authorization", format!("Bearer {}", backend.api_key))
        .header("Content-Type", "application/json")
        .json(dify_req)
        .send()
        .await
        .map_err(|e| RelayError::backend(format!("Request to Dify failed: {}", e)))
}

/// Read the Dify body line by line and yield one translated frame per non-blank line.
///
/// A line that does not decode ends the stream with an error, which makes the
/// server drop the caller connection. Dropping the returned stream drops the
/// backend response and with it the backend connection.
fn translate_stream(
    byte_stream: impl Stream<Item = std::result::Result<Bytes, reqwest::Error>> + Send + 'static,
    request_id: String,
    logger: SharedLogger,
) -> impl Stream<Item = Result<Bytes>> + Send + 'static {
    async_stream::try_stream! {
        let mut splitter = LineSplitter::new();
        let mut frames: usize = 0;

        tokio::pin!(byte_stream);

        while let Some(chunk_result) = byte_stream.next().await {
            let chunk = match chunk_result {
                Ok(c) => c,
                Err(e) => {
                    logger.request(
                        LogLevel::Error,
                        Stage::Stream,
                        &request_id,
                        format!("Byte stream error: {}", e),
                        None,
                    );
                    Err(RelayError::from(e))?
                }
            };

            for line in splitter.push(&chunk) {
                if let Some(frame) = translate_or_log(&line, &request_id, &logger)? {
                    frames += 1;
                    yield frame;
                }
            }
        }

        if let Some(line) = splitter.finish() {
            if let Some(frame) = translate_or_log(&line, &request_id, &logger)? {
                frames += 1;
                yield frame;
            }
        }

        logger.request(
            LogLevel::Info,
            Stage::Stream,
            &request_id,
            format!("Stream completed frames={}", frames),
            None,
        );
    }
}

fn translate_or_log(line: &[u8], request_id: &str, logger: &SharedLogger) -> Result<Option<Bytes>> {
    translate_line(line).map_err(|e| {
        let text = String::from_utf8_lossy(line);
        logger.request(
            LogLevel::Error,
            Stage::Stream,
            request_id,
            format!("Aborting stream: {}", e),
            Some(json!({ "line": truncate(&text, 300) })),
        );
        e
    })
}

fn truncate(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;
    use tempfile::TempDir;

    fn logger(dir: &TempDir) -> SharedLogger {
        SharedLogger::new(dir.path().join("relay.log")).unwrap()
    }

    fn body(parts: &[&'static str]) -> impl Stream<Item = std::result::Result<Bytes, reqwest::Error>> + Send + 'static {
        let owned: Vec<std::result::Result<Bytes, reqwest::Error>> = parts
            .iter()
            .copied()
            .map(|p: &'static str| Ok(Bytes::from_static(p.as_bytes())))
            .collect();
        stream::iter(owned)
    }

    #[tokio::test]
    async fn test_frames_follow_backend_order_across_reads() {
        let dir = TempDir::new().unwrap();
        let frames: Vec<_> = translate_stream(
            body(&[
                "data: {\"answer\":\"a\",\"task_id\":\"t\"}\n\ndata: {\"ans",
                "wer\":\"b\",\"task_id\":\"t\"}\n\n",
                "data: {\"event\":\"message_end\",\"task_id\":\"t\"}",
            ]),
            "r1".to_string(),
            logger(&dir),
        )
        .collect()
        .await;

        let texts: Vec<String> = frames
            .into_iter()
            .map(|f| String::from_utf8(f.unwrap().to_vec()).unwrap())
            .collect();
        assert_eq!(texts.len(), 3);
        assert!(texts[0].contains("\"content\":\"a\""));
        assert!(texts[1].contains("\"content\":\"b\""));
        assert!(texts[2].contains("\"finish_reason\":\"stop\""));
        assert!(texts.iter().all(|t| t.starts_with("data: ") && t.ends_with("\n\n")));
    }

    #[tokio::test]
    async fn test_malformed_line_ends_stream_with_error() {
        let dir = TempDir::new().unwrap();
        let log = logger(&dir);
        let items: Vec<_> = translate_stream(
            body(&["data: {\"answer\":\"ok\"}\n", "event: ping\n", "data: {\"answer\":\"late\"}\n"]),
            "r2".to_string(),
            log.clone(),
        )
        .collect()
        .await;

        assert_eq!(items.len(), 2);
        assert!(items[0].is_ok());
        assert!(items[1].is_err());

        let entries = log.for_request("r2");
        assert!(entries
            .iter()
            .any(|e| e.level == LogLevel::Error && e.stage == Stage::Stream));
        assert!(!entries.iter().any(|e| e.message.starts_with("Stream completed")));
    }

    #[test]
    fn test_truncate_respects_char_boundaries() {
        assert_eq!(truncate("héllo", 2), "hé");
        assert_eq!(truncate("abc", 10), "abc");
    }
}
