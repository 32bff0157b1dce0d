use callbridge_core::tool::DEFAULT_FALLBACK_TEXT;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use tracing::Level;

pub const OPENAI_REALTIME_URL: &str =
    "wss://api.openai.com/v1/realtime?model=gpt-4o-realtime-preview-2024-10-01";

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingVar(String),
    #[error("Invalid value for environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Flavours of OpenAI-protocol realtime endpoints; they differ only in how the
/// connection is authenticated.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Provider {
    OpenAI,
    Azure,
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub bind_address: SocketAddr,
    pub provider: Provider,
    pub realtime_url: String,
    pub realtime_api_key: String,
    pub tool_endpoint_url: String,
    pub tool_timeout: Duration,
    pub tool_fallback_text: String,
    pub public_stream_url: Option<String>,
    pub voice: String,
    pub greeting: String,
    pub log_level: Level,
    pub prompts_path: PathBuf,
    pub tools_path: Option<PathBuf>,
}

fn required(name: &str) -> Result<String, ConfigError> {
    std::env::var(name)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| ConfigError::MissingVar(name.to_string()))
}

impl Config {
    /// Loads configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Only load from .env in non-test mode to avoid contamination
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }

        let bind_address_str =
            std::env::var("BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0:5050".to_string());
        let bind_address = bind_address_str
            .parse::<SocketAddr>()
            .map_err(|e| ConfigError::InvalidValue("BIND_ADDRESS".to_string(), e.to_string()))?;

        let provider_str =
            std::env::var("REALTIME_PROVIDER").unwrap_or_else(|_| "openai".to_string());
        let provider = match provider_str.to_lowercase().as_str() {
            "openai" => Provider::OpenAI,
            "azure" => Provider::Azure,
            other => {
                return Err(ConfigError::InvalidValue(
                    "REALTIME_PROVIDER".to_string(),
                    format!("'{}' is not one of 'openai', 'azure'", other),
                ));
            }
        };

        // Azure deployments have no well-known URL.
        let realtime_url = match (&provider, std::env::var("REALTIME_URL").ok()) {
            (_, Some(url)) if !url.trim().is_empty() => url,
            (Provider::OpenAI, _) => OPENAI_REALTIME_URL.to_string(),
            (Provider::Azure, _) => {
                return Err(ConfigError::MissingVar(
                    "REALTIME_URL must be set for 'azure' provider".to_string(),
                ));
            }
        };
        if !realtime_url.starts_with("ws://") && !realtime_url.starts_with("wss://") {
            return Err(ConfigError::InvalidValue(
                "REALTIME_URL".to_string(),
                format!("'{}' is not a ws:// or wss:// URL", realtime_url),
            ));
        }

        let realtime_api_key = required("REALTIME_API_KEY")?;
        let tool_endpoint_url = required("TOOL_ENDPOINT_URL")?;

        let tool_timeout = match std::env::var("TOOL_TIMEOUT_SECS") {
            Ok(secs) => secs
                .parse::<u64>()
                .ok()
                .filter(|secs| *secs > 0)
                .map(Duration::from_secs)
                .ok_or_else(|| {
                    ConfigError::InvalidValue(
                        "TOOL_TIMEOUT_SECS".to_string(),
                        format!("'{}' is not a positive number of seconds", secs),
                    )
                })?,
            Err(_) => Duration::from_secs(30),
        };

        let tool_fallback_text = std::env::var("TOOL_FALLBACK_TEXT")
            .unwrap_or_else(|_| DEFAULT_FALLBACK_TEXT.to_string());

        let public_stream_url = std::env::var("PUBLIC_STREAM_URL")
            .ok()
            .filter(|v| !v.trim().is_empty());

        let voice = std::env::var("REALTIME_VOICE").unwrap_or_else(|_| "alloy".to_string());
        let greeting = std::env::var("CALL_GREETING")
            .unwrap_or_else(|_| "Connecting you to the AI assistant".to_string());

        let log_level_str = std::env::var("RUST_LOG").unwrap_or_else(|_| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        let prompts_path = std::env::var("PROMPTS_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./prompts"));
        let tools_path = std::env::var("TOOLS_PATH").ok().map(PathBuf::from);

        Ok(Self {
            bind_address,
            provider,
            realtime_url,
            realtime_api_key,
            tool_endpoint_url,
            tool_timeout,
            tool_fallback_text,
            public_stream_url,
            voice,
            greeting,
            log_level,
            prompts_path,
            tools_path,
        })
    }
}
