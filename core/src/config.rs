/// Configuration management
use crate::error::{Result, VibeError};
use serde::{Deserialize, Serialize};
use std::time::Duration;

const DEFAULT_API_BASE_URL: &str = "http://localhost:5000/api";
const DEFAULT_SOCKET_URL: &str = "ws://localhost:5000/socket.io/?EIO=4&transport=websocket";

/// Quiet interval after the last keystroke before `stop typing` is sent
pub const DEFAULT_TYPING_QUIET_INTERVAL: Duration = Duration::from_millis(3000);

/// Client configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Base URL of the REST backend (no trailing slash)
    pub api_base_url: String,

    /// Real-time endpoint (Engine.IO over WebSocket)
    pub socket_url: String,

    /// Bearer token issued by `/auth/login`
    pub auth_token: Option<String>,

    /// Quiet interval for the local typing signal
    pub typing_quiet_interval: Duration,

    /// Page size for the initial history fetch
    pub history_page_size: u32,

    /// Timeout for a single WebSocket connection attempt
    pub connection_timeout: Duration,

    /// Max WebSocket connection attempts per session
    pub max_connection_attempts: u32,

    /// Base delay between connection attempts
    pub retry_interval: Duration,

    /// Optional timeout for REST calls (none by default)
    pub request_timeout: Option<Duration>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            socket_url: DEFAULT_SOCKET_URL.to_string(),
            auth_token: None,
            typing_quiet_interval: DEFAULT_TYPING_QUIET_INTERVAL,
            history_page_size: 50,
            connection_timeout: Duration::from_secs(10),
            max_connection_attempts: 5,
            retry_interval: Duration::from_secs(2),
            request_timeout: None,
        }
    }
}

impl Config {
    /// Create config from command line arguments.
    ///
    /// Flags are consumed; everything else is returned as positional
    /// arguments (the program name excluded).
    pub fn from_args(args: &[String]) -> Result<(Self, Vec<String>)> {
        let mut config = Self::default();
        let mut positional = Vec::new();

        let mut i = 1;
        while i < args.len() {
            match args[i].as_str() {
                "--api" => {
                    config.api_base_url = flag_value(args, i, "--api")?
                        .trim_end_matches('/')
                        .to_string();
                    i += 2;
                }
                "--socket" => {
                    config.socket_url = flag_value(args, i, "--socket")?.to_string();
                    i += 2;
                }
                "--token" => {
                    config.auth_token = Some(flag_value(args, i, "--token")?.to_string());
                    i += 2;
                }
                "--page-size" => {
                    let n = flag_value(args, i, "--page-size")?;
                    config.history_page_size = n.parse::<u32>().ok().filter(|n| *n > 0).ok_or_else(|| {
                        VibeError::Config("--page-size must be a positive number".to_string())
                    })?;
                    i += 2;
                }
                "--timeout" => {
                    let secs = flag_value(args, i, "--timeout")?;
                    let secs = secs.parse::<u64>().map_err(|_| {
                        VibeError::Config("--timeout must be a number of seconds".to_string())
                    })?;
                    config.request_timeout = Some(Duration::from_secs(secs));
                    i += 2;
                }
                other => {
                    positional.push(other.to_string());
                    i += 1;
                }
            }
        }

        config.apply_env();
        Ok((config, positional))
    }

    /// Environment overrides (nice for scripts)
    pub fn apply_env(&mut self) {
        if let Ok(url) = std::env::var("VIBE_API_URL") {
            self.api_base_url = url.trim_end_matches('/').to_string();
        }
        if let Ok(url) = std::env::var("VIBE_SOCKET_URL") {
            self.socket_url = url;
        }
        if let Ok(token) = std::env::var("VIBE_TOKEN") {
            if !token.is_empty() {
                self.auth_token = Some(token);
            }
        }
    }
}

fn flag_value<'a>(args: &'a [String], i: usize, flag: &str) -> Result<&'a str> {
    args.get(i + 1)
        .map(String::as_str)
        .ok_or_else(|| VibeError::Config(format!("{} requires an argument", flag)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        std::iter::once("vibe")
            .chain(list.iter().copied())
            .map(String::from)
            .collect()
    }

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.typing_quiet_interval, Duration::from_millis(3000));
        assert_eq!(config.history_page_size, 50);
        assert!(config.request_timeout.is_none());
    }

    #[test]
    fn test_flags_and_positional() {
        let (config, rest) = Config::from_args(&args(&[
            "--api",
            "http://example.test/api/",
            "chat",
            "--page-size",
            "20",
            "c1",
        ]))
        .unwrap();

        assert_eq!(config.api_base_url, "http://example.test/api");
        assert_eq!(config.history_page_size, 20);
        assert_eq!(rest, vec!["chat".to_string(), "c1".to_string()]);
    }

    #[test]
    fn test_missing_flag_value() {
        let err = Config::from_args(&args(&["--token"])).unwrap_err();
        assert!(matches!(err, VibeError::Config(_)));
    }

    #[test]
    fn test_zero_page_size_rejected() {
        assert!(Config::from_args(&args(&["--page-size", "0"])).is_err());
    }
}
