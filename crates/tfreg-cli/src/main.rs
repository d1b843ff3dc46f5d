mod server;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tfreg_registry::{ModuleCoordinate, RegistryConfig, RegistryService};
use tiny_http::Server;

#[derive(Parser, Debug)]
#[command(name = "tfreg")]
#[command(about = "Terraform module and provider registry")]
#[command(version)]
struct Args {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file (defaults to ./tfreg.toml when present)
    #[arg(short, long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Serve the registry protocol
    Serve {
        /// Address to listen on
        #[arg(long, default_value = "0.0.0.0")]
        host: String,

        /// Port to listen on (overrides configuration)
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Package one module version into the store and print its download URL
    Warm {
        organization: String,
        name: String,
        provider: String,
        version: String,
    },
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp_millis()
        .init();
}

fn run_server(config: &RegistryConfig, host: &str, port: Option<u16>) -> Result<i32> {
    let rt = tokio::runtime::Runtime::new()
        .map_err(|e| anyhow::anyhow!("Failed to create async runtime: {}", e))?;
    let service = RegistryService::from_config(config)?;

    let addr = format!("{}:{}", host, port.unwrap_or(config.port));
    let server = Server::http(&addr).map_err(|e| anyhow::anyhow!("Failed to start server: {}", e))?;

    log::info!("Registry listening on http://{}", addr);
    log::info!("Public address is {}", config.hostname);

    server::serve(server, Arc::new(service), rt.handle().clone());
    Ok(0)
}

fn run_warm(config: &RegistryConfig, coordinate: ModuleCoordinate) -> Result<i32> {
    let rt = tokio::runtime::Runtime::new()
        .map_err(|e| anyhow::anyhow!("Failed to create async runtime: {}", e))?;
    let path = rt.block_on(async {
        let service = RegistryService::from_config(config)?;
        service.module_download_path(&coordinate).await
    })?;

    println!("{}", path);
    Ok(0)
}

fn run() -> Result<i32> {
    let args = Args::parse();
    init_logging(args.verbose);

    let config = RegistryConfig::load(args.config.as_deref())?;
    log::debug!("Configuration: {:?}", config);

    match args.command {
        Commands::Serve { host, port } => run_server(&config, &host, port),
        Commands::Warm {
            organization,
            name,
            provider,
            version,
        } => run_warm(
            &config,
            ModuleCoordinate::new(organization, name, provider, version),
        ),
    }
}

fn main() -> ExitCode {
    match run() {
        Ok(code) => ExitCode::from(code as u8),
        Err(e) => {
            eprintln!("Error: {}", e);
            for cause in e.chain().skip(1) {
                eprintln!("  Caused by: {}", cause);
            }
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_serve() {
        let args = Args::try_parse_from(["tfreg", "serve", "--port", "9090", "-v"]).unwrap();
        assert_eq!(args.verbose, 1);
        match args.command {
            Commands::Serve { host, port } => {
                assert_eq!(host, "0.0.0.0");
                assert_eq!(port, Some(9090));
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_parse_warm() {
        let args = Args::try_parse_from([
            "tfreg", "--config", "registry.toml", "warm", "acme", "vpc", "aws", "1.0.0",
        ])
        .unwrap();
        assert_eq!(args.config, Some(PathBuf::from("registry.toml")));
        match args.command {
            Commands::Warm {
                organization,
                version,
                ..
            } => {
                assert_eq!(organization, "acme");
                assert_eq!(version, "1.0.0");
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_warm_requires_coordinate() {
        assert!(Args::try_parse_from(["tfreg", "warm", "acme", "vpc"]).is_err());
    }
}
