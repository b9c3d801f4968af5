//! instaclient - call the Instagram REST API from the command line
//!
//! Prints the normalized response as pretty JSON on stdout. Failures go to
//! stderr with a non-zero exit status.

use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use instaclient::cache::{self, Cache};
use instaclient::cli::{CacheAction, CallArgs, Cli, Command, StartupConfig};
use instaclient::http::Method;
use instaclient::Client;

/// Installs the stderr log subscriber. `--verbose` turns on debug output for
/// this crate; otherwise `RUST_LOG` applies, defaulting to warnings only.
fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("instaclient=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Makes one API call and renders the response
async fn call(
    method: Method,
    args: &CallArgs,
    startup: StartupConfig,
) -> Result<String, Box<dyn std::error::Error>> {
    let client = Client::new(startup.client)?;
    let request = client.request(method, &args.path, args.to_params());
    let response = client.send(request).await?;
    Ok(serde_json::to_string_pretty(&response)?)
}

/// Runs one command and returns what should be printed
async fn run(command: &Command, startup: StartupConfig) -> Result<String, Box<dyn std::error::Error>> {
    match command {
        Command::Get(args) => call(Method::Get, args, startup).await,
        Command::Post(args) => call(Method::Post, args, startup).await,
        Command::Delete(args) => call(Method::Delete, args, startup).await,
        Command::Cache { action } => {
            let cache = cache::open_engine(&startup.client.cache)?;
            match action {
                CacheAction::Gc => {
                    let removed = cache.gc()?;
                    Ok(format!("removed {removed} expired entries"))
                }
                CacheAction::Clear => {
                    cache.clear()?;
                    Ok("cache cleared".to_string())
                }
            }
        }
        Command::AuthUrl { touch } => {
            let client = Client::new(startup.client)?;
            Ok(client.authorize_url(*touch))
        }
        Command::Exchange { code } => {
            let mut client = Client::new(startup.client)?;
            let response = client.exchange_code(code).await?;
            Ok(serde_json::to_string_pretty(&response)?)
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let startup = match StartupConfig::from_cli(&cli) {
        Ok(startup) => startup,
        Err(e) => {
            eprintln!("error: {e}");
            return ExitCode::from(2);
        }
    };
    init_tracing(startup.verbose);

    match run(&cli.command, startup).await {
        Ok(output) => {
            println!("{output}");
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}
