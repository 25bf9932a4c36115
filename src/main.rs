use clap::{Parser, Subcommand};
use mcp_dispatch::Result;
use mcp_dispatch::capabilities::{DirectoryStore, register_builtins};
use mcp_dispatch::config::{Config, get_config_dir};
use mcp_dispatch::dispatch::Dispatcher;
use mcp_dispatch::protocol::CapabilityKind;
use mcp_dispatch::registry::CapabilityRegistry;
use mcp_dispatch::server::StdioServer;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "mcp-dispatch")]
#[command(about = "A capability dispatch server with structured-schema validation")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the dispatch server on stdio
    Serve,
    /// List the built-in capabilities with their schemas
    Capabilities,
    /// Show the effective configuration
    Config,
}

fn load_config() -> Result<Config> {
    let config_dir = get_config_dir().map_err(|e| mcp_dispatch::ServerError::Config(e.to_string()))?;
    Ok(Config::load(config_dir)?)
}

fn build_dispatcher(config: &Config) -> Result<Dispatcher> {
    let mut registry = CapabilityRegistry::new();
    let store = Arc::new(DirectoryStore::seeded());
    register_builtins(&mut registry, store, config)
        .map_err(|e| mcp_dispatch::ServerError::Dispatch(e.to_string()))?;
    Ok(Dispatcher::new(Arc::new(registry)))
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve => {
            let config = load_config()?;
            let dispatcher = build_dispatcher(&config)?;
            StdioServer::new(dispatcher)
                .serve()
                .await
                .map_err(|e| mcp_dispatch::ServerError::Transport(e.to_string()))?;
        }
        Commands::Capabilities => {
            let config = load_config()?;
            let dispatcher = build_dispatcher(&config)?;
            let registry = dispatcher.registry();

            for kind in [
                CapabilityKind::Tool,
                CapabilityKind::Resource,
                CapabilityKind::Prompt,
            ] {
                let descriptors = registry.list(kind);
                println!("{}s ({} total):", kind, descriptors.len());
                for descriptor in descriptors {
                    let description = descriptor.description.as_deref().unwrap_or("");
                    println!("  {} - {}", descriptor.name, description);
                }
                println!();
            }
        }
        Commands::Config => {
            let config = load_config()?;
            let rendered = toml::to_string_pretty(&config)
                .map_err(|e| mcp_dispatch::ServerError::Config(e.to_string()))?;
            println!("Configuration directory: {}", config.base_dir.display());
            println!();
            print!("{}", rendered);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::error::ErrorKind;

    #[test]
    fn cli_parsing() {
        let cli = Cli::try_parse_from(["mcp-dispatch", "serve"]);
        assert!(cli.is_ok());

        if let Ok(parsed) = cli {
            matches!(parsed.command, Commands::Serve);
        }
    }

    #[test]
    fn capabilities_command() {
        let cli = Cli::try_parse_from(["mcp-dispatch", "capabilities"]);
        assert!(cli.is_ok());

        if let Ok(parsed) = cli {
            matches!(parsed.command, Commands::Capabilities);
        }
    }

    #[test]
    fn invalid_command() {
        let cli = Cli::try_parse_from(["mcp-dispatch", "invalid"]);
        assert!(cli.is_err());

        if let Err(err) = cli {
            assert_eq!(err.kind(), ErrorKind::InvalidSubcommand);
        }
    }

    #[test]
    fn help_message() {
        let cli = Cli::try_parse_from(["mcp-dispatch", "--help"]);
        assert!(cli.is_err());

        if let Err(err) = cli {
            assert_eq!(err.kind(), ErrorKind::DisplayHelp);
        }
    }

    #[test]
    fn dispatcher_builds_from_default_config() {
        let dispatcher = build_dispatcher(&Config::default()).expect("dispatcher builds");
        assert!(!dispatcher.registry().is_empty());
    }
}
