//! keepsake CLI — the main entry point.
//!
//! Commands:
//! - `chat`    — Interactive chat or single-message mode (the default)
//! - `memory`  — Print everything remembered as JSON
//! - `stats`   — Show memory counters
//! - `teach`   — Teach a multi-step procedure
//! - `recall`  — Show a learned procedure
//! - `config`  — Show the effective configuration

use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod commands;

#[derive(Parser)]
#[command(
    name = "keepsake",
    about = "keepsake — a local assistant that remembers",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    #[command(flatten)]
    globals: GlobalArgs,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

/// Options shared by every command.
#[derive(clap::Args, Debug, Default, Clone)]
pub struct GlobalArgs {
    /// Memory database file (overrides memory.path)
    #[arg(long, global = true)]
    pub db: Option<PathBuf>,

    /// Override a config value, e.g. `--set backend.model=llama3.2`
    #[arg(long = "set", value_name = "KEY=VALUE", global = true)]
    pub overrides: Vec<String>,

    /// Report the assistant as offline in its memory context
    #[arg(long, global = true)]
    pub offline: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Chat with the assistant
    Chat {
        /// Send a single message instead of entering interactive mode
        #[arg(short, long)]
        message: Option<String>,
    },

    /// Print the memory snapshot as JSON
    Memory,

    /// Show memory statistics
    Stats,

    /// Teach a procedure, one argument per step
    Teach {
        /// Procedure name
        name: String,

        /// Ordered steps
        #[arg(required = true)]
        steps: Vec<String>,
    },

    /// Show a learned procedure
    Recall {
        /// Procedure name
        name: String,
    },

    /// Show the effective configuration as TOML
    Config,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Chat output goes to stdout; keep logs quiet unless asked.
    let filter = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let config = commands::load_config(&cli.globals)?;

    match cli.command.unwrap_or(Commands::Chat { message: None }) {
        Commands::Chat { message } => commands::chat::run(&config, message).await?,
        Commands::Memory => commands::memory::export(&config).await?,
        Commands::Stats => commands::memory::stats(&config).await?,
        Commands::Teach { name, steps } => commands::teach::teach(&config, &name, steps).await?,
        Commands::Recall { name } => commands::teach::recall(&config, &name).await?,
        Commands::Config => commands::config_cmd::show(&config)?,
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_subcommand_means_chat() {
        let cli = Cli::try_parse_from(["keepsake"]).unwrap();
        assert!(cli.command.is_none());
        assert!(!cli.verbose);
    }

    #[test]
    fn global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "keepsake",
            "chat",
            "-m",
            "hello",
            "--offline",
            "--set",
            "backend.model=phi3",
            "--set",
            "persona.name=Kit",
        ])
        .unwrap();
        assert!(cli.globals.offline);
        assert_eq!(cli.globals.overrides, vec!["backend.model=phi3", "persona.name=Kit"]);
        match cli.command {
            Some(Commands::Chat { message }) => assert_eq!(message.as_deref(), Some("hello")),
            _ => panic!("expected chat"),
        }
    }

    #[test]
    fn teach_requires_steps() {
        assert!(Cli::try_parse_from(["keepsake", "teach", "tea"]).is_err());
        let cli = Cli::try_parse_from(["keepsake", "teach", "tea", "boil", "pour"]).unwrap();
        match cli.command {
            Some(Commands::Teach { name, steps }) => {
                assert_eq!(name, "tea");
                assert_eq!(steps, vec!["boil", "pour"]);
            }
            _ => panic!("expected teach"),
        }
    }
}
