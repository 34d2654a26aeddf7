use crate::error::{RelayError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub backend: BackendConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    /// Chat-messages endpoint. When unset the URL is read from `url_env`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default = "default_url_env")]
    pub url_env: String,
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
}

/// Backend endpoint and credential, resolved once at startup.
#[derive(Debug, Clone)]
pub struct BackendTarget {
    pub url: String,
    pub api_key: String,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_url_env() -> String {
    "DIFY_URL".to_string()
}

fn default_api_key_env() -> String {
    "DIFY_KEY".to_string()
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            backend: BackendConfig::default(),
        }
    }
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            url: None,
            url_env: default_url_env(),
            api_key_env: default_api_key_env(),
        }
    }
}

impl RelayConfig {
    /// Load config from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            RelayError::config(format!("Failed to read config file {}: {}", path.display(), e))
        })?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    /// Search standard locations for a config file.
    /// Priority: CLI arg > CWD > XDG config > home dir > built-in defaults
    pub fn find_and_load(explicit_path: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit_path {
            return Self::load(path);
        }

        for candidate in &config_search_paths() {
            if candidate.exists() {
                tracing::info!(path = %candidate.display(), "Loading config");
                return Self::load(candidate);
            }
        }

        tracing::info!("No config file found, using defaults and environment");
        Ok(Self::default())
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Resolve the backend URL and key from the process environment.
    pub fn resolve_backend(&self) -> Result<BackendTarget> {
        self.resolve_backend_with(|name| std::env::var(name).ok())
    }

    /// Resolve the backend URL and key using `lookup` for environment variables.
    ///
    /// Fails when either value is missing or blank, or when the URL is not an
    /// absolute http(s) URL.
    pub fn resolve_backend_with<F>(&self, lookup: F) -> Result<BackendTarget>
    where
        F: Fn(&str) -> Option<String>,
    {
        let url = match self.backend.url {
            Some(ref url) => url.clone(),
            None => lookup(&self.backend.url_env).ok_or_else(|| {
                RelayError::config(format!(
                    "Environment variable '{}' not set. Set it to the Dify chat-messages URL.",
                    self.backend.url_env
                ))
            })?,
        };
        let url = url.trim().to_string();
        if url.is_empty() {
            return Err(RelayError::config("Backend URL is empty"));
        }
        reqwest::Url::parse(&url)
            .map_err(|e| RelayError::config(format!("Invalid backend URL '{}': {}", url, e)))
            .and_then(|parsed| match parsed.scheme() {
                "http" | "https" => Ok(()),
                other => Err(RelayError::config(format!(
                    "Unsupported backend URL scheme '{}'",
                    other
                ))),
            })?;

        let api_key = lookup(&self.backend.api_key_env)
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty())
            .ok_or_else(|| {
                RelayError::config(format!(
                    "Environment variable '{}' not set. Set it with your Dify app API key.",
                    self.backend.api_key_env
                ))
            })?;

        Ok(BackendTarget { url, api_key })
    }
}

pub fn config_search_paths() -> Vec<PathBuf> {
    let mut paths = Vec::new();

    // CWD
    paths.push(PathBuf::from("dify-relay.toml"));

    if cfg!(target_os = "macos") {
        if let Some(home) = home_dir() {
            paths.push(
                home.join("Library")
                    .join("Application Support")
                    .join("dify-relay")
                    .join("config.toml"),
            );
        }
    } else {
        if let Ok(xdg) = std::env::var("XDG_CONFIG_HOME") {
            paths.push(PathBuf::from(xdg).join("dify-relay").join("config.toml"));
        }
        if let Some(home) = home_dir() {
            paths.push(home.join(".config").join("dify-relay").join("config.toml"));
        }
    }

    if let Some(home) = home_dir() {
        paths.push(home.join(".dify-relay.toml"));
    }

    paths
}

fn home_dir() -> Option<PathBuf> {
    std::env::var("HOME").ok().map(PathBuf::from)
}
