//! Request journal.
//!
//! Every relay call writes its inbound payload, the translated backend request and
//! the outcome as JSON lines. Entries are kept in a bounded in-memory ring and
//! appended to a JSONL file, and each one is mirrored to `tracing`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;
use std::sync::{Arc, Mutex};

const MAX_LOG_ENTRIES: usize = 10_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

/// Where in the relay pipeline an entry was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Startup,
    /// Payload as received from the caller.
    Inbound,
    /// Payload as sent to Dify.
    Backend,
    /// Non-success answer from Dify.
    Upstream,
    Stream,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Startup => "startup",
            Stage::Inbound => "inbound",
            Stage::Backend => "backend",
            Stage::Upstream => "upstream",
            Stage::Stream => "stream",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub level: LogLevel,
    pub stage: Stage,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<serde_json::Value>,
}

impl LogEntry {
    pub fn new(level: LogLevel, stage: Stage, message: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            level,
            stage,
            request_id: None,
            message: message.into(),
            context: None,
        }
    }

    pub fn for_request(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }

    pub fn with_context(mut self, ctx: serde_json::Value) -> Self {
        self.context = Some(ctx);
        self
    }

    fn emit_tracing(&self) {
        let request_id = self.request_id.as_deref().unwrap_or("-");
        let context = self
            .context
            .as_ref()
            .map(ToString::to_string)
            .unwrap_or_default();
        match self.level {
            LogLevel::Debug => {
                tracing::debug!(stage = %self.stage, request_id, "{} {}", self.message, context)
            }
            LogLevel::Info => {
                tracing::info!(stage = %self.stage, request_id, "{} {}", self.message, context)
            }
            LogLevel::Warn => {
                tracing::warn!(stage = %self.stage, request_id, "{} {}", self.message, context)
            }
            LogLevel::Error => {
                tracing::error!(stage = %self.stage, request_id, "{} {}", self.message, context)
            }
        }
    }
}

/// Ring-buffer journal persisted as JSONL.
pub struct Logger {
    entries: VecDeque<LogEntry>,
    writer: BufWriter<File>,
}

impl Logger {
    pub fn new(file_path: impl AsRef<Path>) -> std::io::Result<Self> {
        let file_path = file_path.as_ref();

        if let Some(parent) = file_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let mut entries = VecDeque::with_capacity(MAX_LOG_ENTRIES);

        if file_path.exists() {
            let reader = BufReader::new(File::open(file_path)?);
            for line in reader.lines().map_while(std::result::Result::ok) {
                if let Ok(entry) = serde_json::from_str::<LogEntry>(&line) {
                    if entries.len() >= MAX_LOG_ENTRIES {
                        entries.pop_front();
                    }
                    entries.push_back(entry);
                }
            }
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(file_path)?;

        Ok(Self {
            entries,
            writer: BufWriter::new(file),
        })
    }

    pub fn log(&mut self, entry: LogEntry) {
        if let Ok(json) = serde_json::to_string(&entry) {
            let _ = writeln!(self.writer, "{}", json);
            let _ = self.writer.flush();
        }
        if self.entries.len() >= MAX_LOG_ENTRIES {
            self.entries.pop_front();
        }
        self.entries.push_back(entry);
    }

    /// Most recent entries, newest first.
    pub fn recent(&self, limit: usize) -> Vec<LogEntry> {
        self.entries.iter().rev().take(limit).cloned().collect()
    }

    pub fn for_request(&self, request_id: &str) -> Vec<LogEntry> {
        self.entries
            .iter()
            .filter(|e| e.request_id.as_deref() == Some(request_id))
            .cloned()
            .collect()
    }
}

#[derive(Clone)]
pub struct SharedLogger(Arc<Mutex<Logger>>);

impl SharedLogger {
    pub fn new(file_path: impl AsRef<Path>) -> std::io::Result<Self> {
        Ok(Self(Arc::new(Mutex::new(Logger::new(file_path)?))))
    }

    pub fn log(&self, entry: LogEntry) {
        entry.emit_tracing();
        if let Ok(mut logger) = self.0.lock() {
            logger.log(entry);
        }
    }

    pub fn info(&self, stage: Stage, message: impl Into<String>) {
        self.log(LogEntry::new(LogLevel::Info, stage, message));
    }

    /// Log an entry tied to one relay call.
    pub fn request(
        &self,
        level: LogLevel,
        stage: Stage,
        request_id: &str,
        message: impl Into<String>,
        context: Option<serde_json::Value>,
    ) {
        let mut entry = LogEntry::new(level, stage, message).for_request(request_id);
        if let Some(ctx) = context {
            entry = entry.with_context(ctx);
        }
        self.log(entry);
    }

    pub fn recent(&self, limit: usize) -> Vec<LogEntry> {
        self.0.lock().map(|l| l.recent(limit)).unwrap_or_default()
    }

    pub fn for_request(&self, request_id: &str) -> Vec<LogEntry> {
        self.0
            .lock()
            .map(|l| l.for_request(request_id))
            .unwrap_or_default()
    }
}
