use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

use crate::auth::{Credential, DEFAULT_LOGIN_URL, DEFAULT_TOKEN_FILE};
use crate::error::{AuthError, Result};

/// Bayes token cache - prints a valid portal access token
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct CliArgs {
    /// Bayes portal username
    #[arg(short, long, env = "BAYES_USERNAME")]
    pub username: Option<String>,

    /// Bayes portal password
    #[arg(short, long, env = "BAYES_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    /// Path of the cached token file
    #[arg(short, long, env = "TOKEN_FILE", default_value = DEFAULT_TOKEN_FILE)]
    pub token_file: String,

    /// Portal login endpoint
    #[arg(long, env = "BAYES_LOGIN_URL", default_value = DEFAULT_LOGIN_URL)]
    pub login_url: String,

    /// HTTP connect timeout in seconds
    #[arg(long, env = "HTTP_CONNECT_TIMEOUT", default_value = "10")]
    pub connect_timeout: u64,

    /// HTTP request timeout in seconds, also bounds each login attempt
    #[arg(long, env = "HTTP_REQUEST_TIMEOUT", default_value = "30")]
    pub http_timeout: u64,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Log format (text, json)
    #[arg(long, env = "LOG_FORMAT", default_value = "text")]
    pub log_format: String,

    /// Show the cached token's expiry instead of printing a token
    #[arg(long)]
    pub status: bool,
}

#[derive(Clone, Debug)]
pub struct Config {
    // Credential
    pub credential: Credential,

    // Token cache
    pub token_file: PathBuf,

    // Login endpoint
    pub login_url: String,

    // Timeouts (seconds)
    pub http_connect_timeout: u64,
    pub http_request_timeout: u64,

    // Logging
    pub log_level: String,
    pub log_format: LogFormat,

    // Mode
    pub status_only: bool,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum LogFormat {
    Text,
    Json,
}

impl Config {
    /// Load configuration with priority: CLI > ENV (.env included) > defaults
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_args(CliArgs::parse())
    }

    /// Build configuration from parsed arguments
    pub fn from_args(args: CliArgs) -> Result<Self> {
        let username = required(args.username, "BAYES_USERNAME", "-u")?;
        let password = required(args.password, "BAYES_PASSWORD", "-p")?;

        Ok(Config {
            credential: Credential::new(username, password),
            token_file: expand_tilde(&args.token_file),
            login_url: args.login_url,
            http_connect_timeout: args.connect_timeout,
            http_request_timeout: args.http_timeout,
            log_level: args.log_level,
            log_format: parse_log_format(&args.log_format),
            status_only: args.status,
        })
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.http_connect_timeout == 0 || self.http_request_timeout == 0 {
            return Err(AuthError::Configuration(
                "HTTP timeouts must be greater than zero".to_string(),
            ));
        }

        if !(self.login_url.starts_with("https://") || self.login_url.starts_with("http://")) {
            return Err(AuthError::Configuration(format!(
                "BAYES_LOGIN_URL must be an http(s) URL: {}",
                self.login_url
            )));
        }

        if self.token_file.as_os_str().is_empty() {
            return Err(AuthError::Configuration("TOKEN_FILE must not be empty".to_string()));
        }

        Ok(())
    }

    /// Bound on a single login attempt
    pub fn login_timeout(&self) -> Duration {
        Duration::from_secs(self.http_request_timeout)
    }
}

fn required(value: Option<String>, env: &str, flag: &str) -> Result<String> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(AuthError::Configuration(format!(
            "{} is required (use {} or set {} env var)",
            env, flag, env
        ))),
    }
}

/// Expand tilde (~) in file paths to user's home directory
fn expand_tilde(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}

fn parse_log_format(s: &str) -> LogFormat {
    match s.to_lowercase().as_str() {
        "json" => LogFormat::Json,
        _ => LogFormat::Text,
    }
}
