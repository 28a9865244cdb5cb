//! CLI command definitions and subcommands

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// vrpc - cross-context RPC bridge
#[derive(Parser)]
#[command(
    name = "vrpc",
    about = "RPC bridge between the browser UI, client and server script contexts",
    version
)]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true, help = "Path to config file")]
    pub config: Option<PathBuf>,

    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    #[arg(
        short = 'l',
        long = "log-level",
        global = true,
        help = "Log level (TRACE, DEBUG, INFO, WARN, ERROR)"
    )]
    pub log_level: Option<String>,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Command,
}

/// CLI subcommands
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Wire cef, client and server controllers in-process and call `add` on the server from the UI
    Demo {
        /// First operand
        #[arg(short, long, default_value = "2")]
        a: i64,

        /// Second operand
        #[arg(short, long, default_value = "3")]
        b: i64,

        /// Call timeout in milliseconds (defaults to the configured timeout)
        #[arg(short, long)]
        timeout_ms: Option<u64>,

        /// Browser instance id bound in the UI context (omit to see routing fail)
        #[arg(long, default_value = "1")]
        browser_id: Option<u32>,

        /// Leave the UI context without a browser id
        #[arg(long, conflicts_with = "browser_id")]
        unbound: bool,
    },

    /// Print the effective configuration as YAML
    Config,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_demo_defaults() {
        let cli = Cli::parse_from(["vrpc", "demo"]);
        match cli.command {
            Command::Demo {
                a,
                b,
                timeout_ms,
                browser_id,
                unbound,
            } => {
                assert_eq!(a, 2);
                assert_eq!(b, 3);
                assert_eq!(timeout_ms, None);
                assert_eq!(browser_id, Some(1));
                assert!(!unbound);
            }
            other => panic!("Wrong command: {other:?}"),
        }
    }

    #[test]
    fn test_parse_global_flags() {
        let cli = Cli::parse_from(["vrpc", "config", "--log-level", "debug", "-c", "/tmp/vrpc.yml"]);
        assert_eq!(cli.log_level.as_deref(), Some("debug"));
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/vrpc.yml")));
        assert!(matches!(cli.command, Command::Config));
    }
}
