use anyhow::{anyhow, Context};
use clap::{Parser, Subcommand};
use log::info;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;
use triplegate::config::{Config, ConfigError, DiscoveryConfig, RecoveryConfig};
use triplegate::Gateway;

#[derive(Parser)]
#[command(name = "triplegate")]
#[command(about = "Read/write splitting gateway for a replicated RDF triple-store cluster")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the gateway
    Run {
        /// Path to configuration file
        #[arg(short, long, default_value = "config/dev.toml")]
        config: PathBuf,
    },
    /// Generate example configuration files
    Config {
        /// Discovery mode (cloudmap or static)
        #[arg(short, long)]
        mode: String,
        /// Output file path
        #[arg(short, long)]
        output: PathBuf,
    },
    /// Validate configuration file
    Validate {
        /// Path to configuration file to validate
        #[arg(short, long)]
        config: PathBuf,
    },
    /// Show version information
    Version,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run { config } => run_gateway(config).await?,
        Commands::Config { mode, output } => generate_config(mode, output)?,
        Commands::Validate { config } => validate_config(config)?,
        Commands::Version => show_version(),
    }

    Ok(())
}

async fn run_gateway(config_path: PathBuf) -> anyhow::Result<()> {
    let config = Config::load_from_file(&config_path)
        .with_context(|| format!("Failed to load config from {:?}", config_path))?;

    init_logging(&config)?;

    info!("Starting triplegate v{}", env!("CARGO_PKG_VERSION"));
    info!("Configuration loaded from: {:?}", config_path);
    info!("Listening on: {}", config.server.listen_addr);

    let gateway = Gateway::from_config(config)
        .await
        .context("Failed to build gateway")?;
    gateway.run().await.context("Gateway stopped")?;

    Ok(())
}

fn generate_config(mode: String, output: PathBuf) -> anyhow::Result<()> {
    println!("Generating {} configuration file: {:?}", mode, output);

    Config::create_example_config(&output, &mode).context("Failed to generate config")?;

    println!("Configuration file generated successfully!");
    println!("Edit the file to match your environment and run:");
    println!("  triplegate run --config {:?}", output);

    Ok(())
}

fn validate_config(config_path: PathBuf) -> anyhow::Result<()> {
    println!("Validating configuration file: {:?}", config_path);

    let config = match Config::load_from_file(&config_path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("✗ Configuration file validation failed:");
            match &e {
                ConfigError::IoError(msg) => eprintln!("  File error: {}", msg),
                ConfigError::ParseError(msg) => eprintln!("  Parse error: {}", msg),
                ConfigError::ValidationError(msg) => eprintln!("  Validation error: {}", msg),
                ConfigError::SerializeError(msg) => eprintln!("  Serialization error: {}", msg),
            }
            return Err(e.into());
        }
    };

    println!("✓ Configuration file is valid");
    println!("  Listen address: {}", config.server.listen_addr);
    println!("  Topology cache TTL: {}s", config.cache.ttl_sec);

    match &config.discovery {
        DiscoveryConfig::CloudMap {
            namespace,
            master_service,
            app_port,
            ..
        } => {
            println!("  Discovery: Cloud Map namespace {}", namespace);
            println!("    master service: {}", master_service);
            println!("    application port: {}", app_port);
        }
        DiscoveryConfig::Static { master, replicas } => {
            println!("  Discovery: static, {} replicas", replicas.len());
            println!("    master: {}", master);
            for (i, replica) in replicas.iter().enumerate() {
                println!("    replica {}: {}", i + 1, replica);
            }
        }
    }

    match &config.recovery {
        RecoveryConfig::Ecs {
            cluster,
            service_name_prefix,
            master_group_suffix,
            replica_group_suffix,
            ..
        } => {
            println!("  Recovery: ECS cluster {}", cluster);
            println!(
                "    groups: {}{} / {}{}",
                service_name_prefix, master_group_suffix, service_name_prefix, replica_group_suffix
            );
        }
        RecoveryConfig::Disabled => println!("  Recovery: disabled"),
    }

    Ok(())
}

fn show_version() {
    println!("triplegate v{}", env!("CARGO_PKG_VERSION"));
    println!("Read/write splitting gateway for a replicated RDF triple-store cluster");
    println!();
    println!("Target: {}", std::env::consts::ARCH);
    println!();
    println!("Features:");
    println!("  • Writes to the master with background replication to replicas");
    println!("  • Reads raced across every member, first reply wins");
    println!("  • Cloud Map discovery with a time-bounded topology cache");
    println!("  • ECS redeployment of members that stop answering");
}

/// `RUST_LOG` wins over the configured level; `log` records are bridged into tracing
fn init_logging(config: &Config) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.logging.level))
        .context("Invalid log level")?;

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    let installed = if config.logging.format == "json" {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    installed.map_err(|e| anyhow!("Failed to initialize logging: {}", e))?;

    info!("Logging initialized at level: {}", config.logging.level);
    Ok(())
}
