use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use reqwest::Url;
use std::path::PathBuf;

/// Default API root of a local backend
pub const DEFAULT_API_BASE: &str = "http://127.0.0.1:8000/api/";

/// Sayahat API client
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct CliArgs {
    /// API base URL
    #[arg(short = 'b', long, env = "SAYAHAT_API_BASE", default_value = DEFAULT_API_BASE)]
    pub api_base: String,

    /// Path to the session database
    #[arg(short = 'd', long, env = "SAYAHAT_SESSION_DB")]
    pub session_db: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "warn")]
    pub log_level: String,

    /// HTTP connect timeout in seconds
    #[arg(long, env = "HTTP_CONNECT_TIMEOUT", default_value = "10")]
    pub connect_timeout: u64,

    /// HTTP request timeout in seconds
    #[arg(long, env = "HTTP_REQUEST_TIMEOUT", default_value = "30")]
    pub request_timeout: u64,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Create an account
    Signup {
        #[arg(long)]
        email: String,
        #[arg(long)]
        username: String,
    },
    /// Sign in and store the session tokens
    Login {
        #[arg(long)]
        email: String,
    },
    /// Drop the local session
    Logout,
    /// Fetch the signed-in profile
    Whoami,
    /// Upload a new avatar image
    Avatar { path: PathBuf },
    /// GET an API path (relative to the base URL) and print the JSON body
    Get { path: String },
    /// Show the local session state
    Status,
}

/// Settings for the API client
#[derive(Clone, Debug)]
pub struct ClientConfig {
    /// API root; relative request paths are joined onto it
    pub api_base: Url,
    pub connect_timeout: u64,
    pub request_timeout: u64,
}

impl ClientConfig {
    /// Client settings for `api_base` with default timeouts
    pub fn new(api_base: &str) -> Result<Self> {
        Ok(Self {
            api_base: parse_api_base(api_base)?,
            connect_timeout: 10,
            request_timeout: 30,
        })
    }
}

#[derive(Clone, Debug)]
pub struct Config {
    pub client: ClientConfig,
    pub session_db: PathBuf,
    pub log_level: String,
}

impl Config {
    /// Load configuration with priority: CLI > ENV > defaults
    pub fn load() -> Result<(Self, Command)> {
        // Load .env file if it exists
        dotenvy::dotenv().ok();

        let args = CliArgs::parse();
        let config = Self::from_args(&args)?;
        Ok((config, args.command))
    }

    pub fn from_args(args: &CliArgs) -> Result<Self> {
        let session_db = args
            .session_db
            .as_deref()
            .map(expand_tilde)
            .or_else(default_session_db)
            .context("Cannot determine a session database path (use -d or set SAYAHAT_SESSION_DB)")?;

        Ok(Config {
            client: ClientConfig {
                api_base: parse_api_base(&args.api_base)?,
                connect_timeout: args.connect_timeout,
                request_timeout: args.request_timeout,
            },
            session_db,
            log_level: args.log_level.clone(),
        })
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        let scheme = self.client.api_base.scheme();
        if scheme != "http" && scheme != "https" {
            anyhow::bail!("SAYAHAT_API_BASE must be an http(s) URL, got scheme: {}", scheme);
        }
        if self.client.request_timeout == 0 {
            anyhow::bail!("HTTP_REQUEST_TIMEOUT must be greater than zero");
        }
        Ok(())
    }
}

/// Parse the API root, forcing a trailing slash so joins stay below it
fn parse_api_base(raw: &str) -> Result<Url> {
    let normalized = if raw.ends_with('/') {
        raw.to_string()
    } else {
        format!("{}/", raw)
    };
    Url::parse(&normalized).with_context(|| format!("Invalid API base URL: {}", raw))
}

/// Default session database under the user's data directory
fn default_session_db() -> Option<PathBuf> {
    dirs::data_dir().map(|dir| dir.join("sayahat").join("session.sqlite3"))
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

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> CliArgs {
        CliArgs::try_parse_from(args).unwrap()
    }

    #[test]
    fn test_expand_tilde() {
        let path = expand_tilde("~/test/session.sqlite3");
        assert!(path.to_string_lossy().contains("test/session.sqlite3"));
        assert!(!path.to_string_lossy().starts_with('~'));

        let path = expand_tilde("/absolute/path");
        assert_eq!(path, PathBuf::from("/absolute/path"));

        // Just "~" without slash should not expand
        assert_eq!(expand_tilde("~"), PathBuf::from("~"));
    }

    #[test]
    fn test_parse_api_base_adds_trailing_slash() {
        let url = parse_api_base("http://localhost:8000/api").unwrap();
        assert_eq!(url.as_str(), "http://localhost:8000/api/");
        assert_eq!(
            url.join("users/profile/").unwrap().as_str(),
            "http://localhost:8000/api/users/profile/"
        );

        assert!(parse_api_base("not a url").is_err());
    }

    #[test]
    fn test_from_args() {
        let args = parse(&[
            "sayahat",
            "--api-base",
            "https://api.example.com/api",
            "-d",
            "/tmp/session.sqlite3",
            "--request-timeout",
            "5",
            "get",
            "places/map-places/",
        ]);
        let config = Config::from_args(&args).unwrap();

        assert_eq!(config.client.api_base.as_str(), "https://api.example.com/api/");
        assert_eq!(config.session_db, PathBuf::from("/tmp/session.sqlite3"));
        assert_eq!(config.client.request_timeout, 5);
        assert!(config.validate().is_ok());
        assert!(matches!(args.command, Command::Get { ref path } if path == "places/map-places/"));
    }

    #[test]
    fn test_avatar_command_takes_a_path() {
        let args = parse(&["sayahat", "avatar", "/tmp/me.png"]);
        assert!(matches!(args.command, Command::Avatar { ref path } if path == &PathBuf::from("/tmp/me.png")));
    }

    #[test]
    fn test_validate_rejects_non_http_scheme() {
        let args = parse(&["sayahat", "-b", "ftp://example.com/", "-d", "/tmp/s.db", "status"]);
        let config = Config::from_args(&args).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_timeout() {
        let mut config = Config::from_args(&parse(&["sayahat", "-d", "/tmp/s.db", "logout"])).unwrap();
        config.client.request_timeout = 0;
        assert!(config.validate().is_err());
    }
}
