//! vrpc - cross-context RPC bridge
//!
//! CLI entry point for the in-process demo and config inspection.

use std::time::Duration;

use clap::Parser;
use colored::Colorize;
use eyre::{Context, Result};
use serde::Deserialize;
use tracing::{debug, info};

use vrpc::cli::{Cli, Command};
use vrpc::config::Config;
use vrpc::{Controller, Link, Source, async_fn, sync_fn};

fn setup_logging(cli_log_level: Option<&str>, config_log_level: Option<&str>) -> Result<()> {
    // Priority: CLI --log-level > config file > default (INFO)
    let level = match cli_log_level.or(config_log_level).map(|s| s.to_uppercase()) {
        Some(s) => match s.as_str() {
            "TRACE" => tracing::Level::TRACE,
            "DEBUG" => tracing::Level::DEBUG,
            "INFO" => tracing::Level::INFO,
            "WARN" | "WARNING" => tracing::Level::WARN,
            "ERROR" => tracing::Level::ERROR,
            _ => {
                eprintln!("Warning: Unknown log-level '{}', defaulting to INFO", s);
                tracing::Level::INFO
            }
        },
        None => tracing::Level::INFO,
    };

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .try_init()
        .map_err(|e| eyre::eyre!("Failed to install subscriber: {}", e))?;

    info!("Logging initialized (level: {:?})", level);
    Ok(())
}

#[derive(Deserialize)]
struct AddArgs {
    a: i64,
    b: i64,
}

async fn cmd_demo(config: &Config, a: i64, b: i64, timeout_ms: Option<u64>, browser_id: Option<u32>) -> Result<()> {
    debug!(a, b, ?timeout_ms, ?browser_id, "cmd_demo: called");

    let cef = Controller::new(Source::Cef, config.controller.clone());
    let client = Controller::new(Source::Client, config.controller.clone());
    let server = Controller::new(Source::Server, config.controller.clone());

    server.register_sync_procedure("add", sync_fn(|args: AddArgs| Ok(args.a + args.b)));
    client.register_async_procedure(
        "log",
        async_fn(|line: String| {
            info!(%line, "client log");
            Ok(())
        }),
    );

    for (context, controller) in [("client", &client), ("server", &server)] {
        let (async_names, sync_names) = controller.procedure_names();
        info!(context, async_procedures = ?async_names, sync_procedures = ?sync_names, "Procedures bound");
    }

    if let Some(id) = browser_id {
        cef.bind_browser(id);
    }

    let to_client = Link::new(&cef, &client);
    let to_server = Link::new(&cef, &server);

    cef.call_async("log", to_client.send_async(), format!("cef asks server for {a} + {b}"))
        .context("Failed to notify client")?;

    let timeout = timeout_ms
        .map(Duration::from_millis)
        .unwrap_or_else(|| cef.config().default_timeout());

    match cef
        .call_sync::<_, i64, _>("add", timeout, Source::Cef, to_server.send_sync(), serde_json::json!({"a": a, "b": b}))
        .await
    {
        Ok(sum) => {
            println!("{} {} + {} = {}", "ok".green().bold(), a, b, sum);
            Ok(())
        }
        Err(e) => {
            println!("{} {}", "failed".red().bold(), e);
            Err(e).context("Demo call failed")
        }
    }
}

fn cmd_config(config: &Config) -> Result<()> {
    debug!("cmd_config: called");
    let yaml = serde_yaml::to_string(config).context("Failed to render config")?;
    print!("{}", yaml);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load log level from config file early (before full config load)
    let config_log_level = Config::load_log_level(cli.config.as_ref());

    setup_logging(cli.log_level.as_deref(), config_log_level.as_deref()).context("Failed to setup logging")?;

    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;

    debug!(command = ?cli.command, "main: dispatching command");
    match cli.command {
        Command::Demo {
            a,
            b,
            timeout_ms,
            browser_id,
            unbound,
        } => {
            let browser_id = if unbound { None } else { browser_id };
            cmd_demo(&config, a, b, timeout_ms, browser_id).await
        }
        Command::Config => cmd_config(&config),
    }
}
