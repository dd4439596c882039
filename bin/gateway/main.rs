//! Glossary Gateway Server
//!
//! Loads the TOML config (unwrapping API keys), builds the shared app
//! context and serves the gateway routes.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use glossary_gateway::{run_server, AppContext, GatewayConfig};
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "glossary-gateway")]
#[command(about = "HTTP gateway for glossary chat and wikipedia lookups")]
struct Args {
    /// Server host
    #[arg(long, default_value = "0.0.0.0", env = "GATEWAY_HOST")]
    host: String,

    /// Server port
    #[arg(short, long, default_value = "11160", env = "GATEWAY_PORT")]
    port: u16,

    /// Config file (rewritten when plaintext API keys get sealed)
    #[arg(short, long, default_value = "config.toml", env = "GATEWAY_CONFIG")]
    config: PathBuf,

    /// Env file holding the API-key DEK
    #[arg(long, default_value = ".env", env = "GATEWAY_ENV_FILE")]
    env_file: PathBuf,

    /// Prompt templates directory
    #[arg(long, default_value = "prompts", env = "GATEWAY_PROMPTS_DIR")]
    prompts_dir: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("glossary_gateway=debug".parse().unwrap())
                .add_directive("info".parse().unwrap()),
        )
        .init();

    let args = Args::parse();

    info!("Starting Glossary Gateway");
    info!("  Config: {}", args.config.display());
    info!("  Prompts: {}", args.prompts_dir.display());
    info!("  Listening on: {}:{}", args.host, args.port);

    let config = GatewayConfig::load(&args.config, &args.env_file)?;
    let ctx = Arc::new(AppContext::new(config, args.prompts_dir)?);

    run_server(ctx, &args.host, args.port).await
}
