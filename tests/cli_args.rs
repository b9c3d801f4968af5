//! Integration tests for CLI argument handling
//!
//! Runs the binary for flags that exit before any network call.

use std::process::Command;

use tempfile::TempDir;

/// Helper to run the CLI with given args and capture output
fn run_cli(args: &[&str]) -> std::process::Output {
    Command::new(env!("CARGO_BIN_EXE_instaclient"))
        .args(args)
        .output()
        .expect("Failed to execute instaclient")
}

#[test]
fn test_help_flag_exits_successfully() {
    let output = run_cli(&["--help"]);
    assert!(
        output.status.success(),
        "Expected --help to exit successfully"
    );
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("instaclient"), "Help should mention instaclient");
    assert!(stdout.contains("get"), "Help should list the get command");
    assert!(stdout.contains("cache"), "Help should list the cache command");
}

#[test]
fn test_invalid_param_prints_error_and_exits() {
    let output = run_cli(&["get", "users/self", "-p", "novalue"]);
    assert!(!output.status.success(), "Expected invalid param to fail");
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(
        stderr.contains("Invalid parameter") || stderr.contains("invalid value"),
        "Should print error message about the parameter: {}",
        stderr
    );
}

#[test]
fn test_missing_command_fails() {
    let output = run_cli(&[]);
    assert!(!output.status.success());
}

#[test]
fn test_auth_url_prints_url() {
    let output = run_cli(&[
        "auth-url",
        "--client-id",
        "abc",
        "--redirect-uri",
        "https://example.com/cb",
        "--touch",
    ]);
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.starts_with("https://api.instagram.com/oauth/authorize/?client_id=abc"));
    assert!(stdout.contains("redirect_uri=https%3A%2F%2Fexample.com%2Fcb"));
    assert!(stdout.trim_end().ends_with("&display=touch"));
}

#[test]
fn test_cache_clear_on_empty_dir() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let dir = temp_dir.path().join("cache");
    let output = run_cli(&["cache", "clear", "--cache-dir", dir.to_str().unwrap()]);
    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains("cache cleared"));
    assert!(dir.is_dir());
}

#[test]
fn test_zero_timeout_rejected() {
    let output = run_cli(&["--timeout", "0", "get", "users/self"]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Invalid timeout"), "{}", stderr);
}

#[cfg(test)]
mod unit_tests {
    //! Unit tests for CLI parsing that don't require running the binary

    use clap::Parser;
    use instaclient::cli::{parse_param, CacheAction, Cli, Command, StartupConfig};

    #[test]
    fn test_cli_post_with_params() {
        let cli = Cli::parse_from([
            "instaclient",
            "post",
            "media/1/comments",
            "-p",
            "text=nice shot",
        ]);
        match cli.command {
            Command::Post(args) => {
                assert_eq!(args.path, "media/1/comments");
                assert_eq!(args.to_params().get("text"), Some("nice shot"));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_cli_cache_clear() {
        let cli = Cli::parse_from(["instaclient", "cache", "clear"]);
        assert_eq!(
            cli.command,
            Command::Cache {
                action: CacheAction::Clear
            }
        );
    }

    #[test]
    fn test_parse_param_invalid_returns_error() {
        assert!(parse_param("invalid").is_err());
    }

    #[test]
    fn test_startup_config_access_token() {
        let cli = Cli::parse_from(["instaclient", "--access-token", "tok", "get", "users/self"]);
        let config = StartupConfig::from_cli(&cli).unwrap();
        assert_eq!(config.client.access_token, "tok");
    }
}
