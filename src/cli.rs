//! Command-line interface parsing for instaclient
//!
//! Flags map onto [`ClientConfig`]; subcommands pick the call to make. Request
//! parameters are given as repeated `-p key=value` pairs.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use thiserror::Error;

use crate::config::{CacheConfig, ClientConfig, DEFAULT_ENDPOINT};
use crate::http::Params;

/// Error types for CLI argument parsing
#[derive(Debug, Error)]
pub enum CliError {
    /// A `-p` argument was not of the form `key=value`
    #[error("Invalid parameter: '{0}'. Expected key=value")]
    InvalidParam(String),

    /// The timeout was zero
    #[error("Invalid timeout: must be at least one second")]
    InvalidTimeout,
}

/// instaclient - call the Instagram REST API from the command line
#[derive(Parser, Debug)]
#[command(name = "instaclient")]
#[command(about = "Instagram REST API client with response caching")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Application client id
    #[arg(long, global = true, default_value = "")]
    pub client_id: String,

    /// Application client secret, used for code exchange
    #[arg(long, global = true, default_value = "")]
    pub client_secret: String,

    /// Access token for authenticated calls
    #[arg(long, global = true, default_value = "")]
    pub access_token: String,

    /// OAuth redirect URI registered for the application
    #[arg(long, global = true, default_value = "")]
    pub redirect_uri: String,

    /// API endpoint
    #[arg(long, global = true, default_value = DEFAULT_ENDPOINT)]
    pub endpoint: String,

    /// Cache GET responses
    #[arg(long, global = true)]
    pub cache: bool,

    /// Cache engine (file, memory)
    #[arg(long, global = true, default_value = "file")]
    pub cache_engine: String,

    /// Cache directory, instead of the platform cache directory
    #[arg(long, global = true, value_name = "DIR")]
    pub cache_dir: Option<PathBuf>,

    /// Total request timeout in seconds
    #[arg(long, global = true, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Log requests and cache activity to stderr
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// GET an API path
    Get(CallArgs),
    /// POST to an API path
    Post(CallArgs),
    /// DELETE an API path
    Delete(CallArgs),
    /// Manage the response cache
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },
    /// Print the OAuth authorization URL
    AuthUrl {
        /// Ask for the mobile-friendly page
        #[arg(long)]
        touch: bool,
    },
    /// Exchange an OAuth authorization code for an access token
    Exchange {
        code: String,
    },
}

/// Path and parameters of an API call
#[derive(clap::Args, Debug, Clone, PartialEq, Eq)]
pub struct CallArgs {
    /// API path, e.g. users/self or /v1/media/popular
    pub path: String,

    /// Request parameter, repeatable
    #[arg(short, long = "param", value_name = "KEY=VALUE", value_parser = parse_param)]
    pub params: Vec<(String, String)>,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheAction {
    /// Remove expired entries (runs during even minutes only)
    Gc,
    /// Remove every entry
    Clear,
}

impl CallArgs {
    pub fn to_params(&self) -> Params {
        self.params.iter().cloned().collect()
    }
}

/// Parses a `key=value` parameter. The value may be empty and may itself
/// contain `=`.
pub fn parse_param(s: &str) -> Result<(String, String), CliError> {
    match s.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => {
            Ok((key.trim().to_string(), value.to_string()))
        }
        _ => Err(CliError::InvalidParam(s.to_string())),
    }
}

/// Configuration derived from CLI arguments for application startup
#[derive(Debug, Clone, Default)]
pub struct StartupConfig {
    pub client: ClientConfig,
    pub verbose: bool,
}

impl StartupConfig {
    /// Creates a StartupConfig from parsed CLI arguments.
    ///
    /// # Returns
    /// * `Ok(StartupConfig)` with the flags applied over the defaults
    /// * `Err(CliError)` if a flag value is out of range
    pub fn from_cli(cli: &Cli) -> Result<Self, CliError> {
        let mut client = ClientConfig {
            endpoint: cli.endpoint.clone(),
            client_id: cli.client_id.clone(),
            client_secret: cli.client_secret.clone(),
            access_token: cli.access_token.clone(),
            redirect_uri: cli.redirect_uri.clone(),
            cache: CacheConfig {
                enabled: cli.cache || matches!(cli.command, Command::Cache { .. }),
                engine: cli.cache_engine.clone(),
                dir: cli.cache_dir.clone(),
                ..Default::default()
            },
            ..Default::default()
        };

        match cli.timeout {
            Some(0) => return Err(CliError::InvalidTimeout),
            Some(secs) => client.transport.timeout = Duration::from_secs(secs),
            None => {}
        }

        Ok(StartupConfig {
            client,
            verbose: cli.verbose,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_param_key_value() {
        assert_eq!(
            parse_param("count=5").unwrap(),
            ("count".to_string(), "5".to_string())
        );
    }

    #[test]
    fn test_parse_param_keeps_equals_in_value() {
        assert_eq!(
            parse_param("q=a=b").unwrap(),
            ("q".to_string(), "a=b".to_string())
        );
        assert_eq!(
            parse_param("text=").unwrap(),
            ("text".to_string(), String::new())
        );
    }

    #[test]
    fn test_parse_param_invalid() {
        let err = parse_param("novalue").unwrap_err();
        assert!(err.to_string().contains("Invalid parameter"));
        assert!(err.to_string().contains("novalue"));
        assert!(parse_param("=5").is_err());
    }

    #[test]
    fn test_cli_parse_get_with_params() {
        let cli = Cli::parse_from([
            "instaclient", "get", "users/self", "-p", "count=5", "--param", "max_id=9",
        ]);
        let Command::Get(args) = cli.command else {
            panic!("expected get command");
        };
        assert_eq!(args.path, "users/self");
        assert_eq!(args.to_params().get("count"), Some("5"));
        assert_eq!(args.to_params().get("max_id"), Some("9"));
    }

    #[test]
    fn test_cli_parse_cache_gc() {
        let cli = Cli::parse_from(["instaclient", "cache", "gc"]);
        assert_eq!(
            cli.command,
            Command::Cache {
                action: CacheAction::Gc
            }
        );
    }

    #[test]
    fn test_startup_config_defaults() {
        let cli = Cli::parse_from(["instaclient", "get", "media/popular"]);
        let config = StartupConfig::from_cli(&cli).unwrap();
        assert_eq!(config.client.endpoint, DEFAULT_ENDPOINT);
        assert!(!config.client.cache.enabled);
        assert!(!config.verbose);
    }

    #[test]
    fn test_startup_config_from_flags() {
        let cli = Cli::parse_from([
            "instaclient",
            "--client-id",
            "abc",
            "--cache",
            "--cache-dir",
            "/tmp/ic",
            "--timeout",
            "3",
            "-v",
            "get",
            "media/popular",
        ]);
        let config = StartupConfig::from_cli(&cli).unwrap();
        assert_eq!(config.client.client_id, "abc");
        assert!(config.client.cache.enabled);
        assert_eq!(config.client.cache.dir, Some(PathBuf::from("/tmp/ic")));
        assert_eq!(config.client.transport.timeout, Duration::from_secs(3));
        assert!(config.verbose);
    }

    #[test]
    fn test_cache_command_enables_cache() {
        let cli = Cli::parse_from(["instaclient", "cache", "clear"]);
        let config = StartupConfig::from_cli(&cli).unwrap();
        assert!(config.client.cache.enabled);
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let cli = Cli::parse_from(["instaclient", "--timeout", "0", "get", "x"]);
        assert!(StartupConfig::from_cli(&cli).is_err());
    }
}
