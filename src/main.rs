//! STOREFRONT — E-commerce Demo Stack
//!
//! Entry point. Loads configuration, initialises structured logging, and
//! dispatches to one of three roles: the CRUD admin API, the customer shop
//! API, or the synthetic load simulator.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::info;

use storefront::analytics::system::spawn_system_sampler;
use storefront::analytics::MetricsSink;
use storefront::api;
use storefront::config::{AppConfig, ServiceConfig};
use storefront::simulator::LoadSimulator;
use storefront::store::pg::PgStore;

const BANNER: &str = r#"
 ____ _____ ___  ____  _____ _____ ____   ___  _   _ _____
/ ___|_   _/ _ \|  _ \| ____|  ___|  _ \ / _ \| \ | |_   _|
\___ \ | || | | | |_) |  _| | |_  | |_) | | | |  \| | | |
 ___) || || |_| |  _ <| |___|  _| |  _ <| |_| | |\  | | |
|____/ |_| \___/|_| \_\_____|_|   |_| \_\\___/|_| \_| |_|

  E-commerce Demo Stack
  v0.1.0
"#;

#[derive(Parser)]
#[command(name = "storefront", about = "E-commerce demo stack", version)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long, default_value = "config.toml", env = "STOREFRONT_CONFIG")]
    config: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the admin CRUD API (users and product catalog).
    CrudApi,
    /// Run the customer shop API (cart, checkout, orders).
    ShopApi,
    /// Run the synthetic load simulator against the APIs.
    Simulate,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (non-fatal if missing)
    let _ = dotenv::dotenv();

    let cli = Cli::parse();
    let cfg = AppConfig::load(&cli.config)?;

    init_logging();

    println!("{BANNER}");

    match cli.command {
        Command::CrudApi => {
            let service = cfg.crud_api.clone();
            let ctx = build_context(&cfg, &service).await?;
            let router = api::build_crud_router(ctx);
            api::serve(router, service.port, &service.service_name).await
        }
        Command::ShopApi => {
            let service = cfg.shop_api.clone();
            let ctx = build_context(&cfg, &service).await?;
            let router = api::build_shop_router(ctx);
            api::serve(router, service.port, &service.service_name).await
        }
        Command::Simulate => run_simulation(&cfg).await,
    }
}

/// Wire up the shared pieces an API service needs: the Postgres store,
/// the analytics sink, and the per-process system metrics sampler.
async fn build_context(cfg: &AppConfig, service: &ServiceConfig) -> Result<api::ApiContext> {
    let store = PgStore::connect(&cfg.postgres).await?;
    let metrics = MetricsSink::spawn(&cfg.analytics)?;

    if metrics.is_enabled() {
        spawn_system_sampler(
            metrics.clone(),
            service.service_name.clone(),
            Duration::from_secs(cfg.analytics.system_sample_secs),
        );
    }

    info!(
        service = %service.service_name,
        port = service.port,
        analytics = metrics.is_enabled(),
        "Service context ready"
    );

    Ok(api::ApiContext {
        store: Arc::new(store),
        metrics,
        service_name: service.service_name.clone(),
    })
}

async fn run_simulation(cfg: &AppConfig) -> Result<()> {
    cfg.validate()?;

    let simulator = Arc::new(LoadSimulator::new(cfg)?);

    info!("Waiting for target services to become healthy");
    simulator.wait_for_services().await?;

    let stopper = Arc::clone(&simulator);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Shutdown signal received, stopping simulation");
            stopper.stop();
        }
    });

    simulator.run().await
}

/// Initialise the `tracing` subscriber.
fn init_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("storefront=info"));

    let json_logging = std::env::var("STOREFRONT_LOG_JSON").is_ok();

    if json_logging {
        fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_thread_ids(true)
            .init();
    } else {
        fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .init();
    }
}
