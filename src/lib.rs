pub mod api;
pub mod cli;
pub mod config;
pub mod crypto;
pub mod db;
pub mod entities;
pub mod mail;
pub mod models;
pub mod services;
pub mod state;

pub use config::Config;

use anyhow::Context;
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use cli::{Cli, Commands, KeyCommands, UserCommands};
use state::SharedState;

/// Loads the config named by `--config`, or searches the default locations.
pub fn load_config(cli: &Cli) -> anyhow::Result<Config> {
    if matches!(cli.command, Some(Commands::Init)) {
        return Ok(Config::default());
    }

    let config = match &cli.config {
        Some(path) => Config::load_from_path(path)?,
        None => Config::load()?,
    };
    config.validate()?;
    Ok(config)
}

/// Installs the global subscriber. `RUST_LOG` overrides `[general] log_level`.
pub fn init_tracing(config: &Config) {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.general.log_level));

    let json = config.observability.json_logs;
    tracing_subscriber::registry()
        .with(env_filter)
        .with(json.then(|| tracing_subscriber::fmt::layer().json()))
        .with((!json).then(tracing_subscriber::fmt::layer))
        .init();
}

pub async fn run(cli: Cli, config: Config) -> anyhow::Result<()> {
    init_tracing(&config);

    let Some(command) = cli.command else {
        print_help();
        return Ok(());
    };

    match command {
        Commands::Serve => run_server(config).await,

        Commands::Init => {
            let path = cli.config.unwrap_or_else(Config::default_config_path);
            cli::cmd_init(&path)
        }

        Commands::User { command } => match command {
            UserCommands::Create {
                name,
                email,
                admin,
                approve,
            } => cli::cmd_user_create(&config, &name, &email, admin, approve).await,
            UserCommands::Approve { user } => cli::cmd_user_approve(&config, &user).await,
            UserCommands::Reject { user } => cli::cmd_user_reject(&config, &user).await,
            UserCommands::Update {
                user,
                name,
                email,
                role,
            } => cli::cmd_user_update(&config, &user, name, email, role).await,
            UserCommands::Delete { user } => cli::cmd_user_delete(&config, &user).await,
            UserCommands::List => cli::cmd_user_list(&config).await,
        },

        Commands::Keys { command } => match command {
            KeyCommands::Generate { key_version } => {
                cli::cmd_keys_generate(key_version);
                Ok(())
            }
            KeyCommands::Rotate { key } => cli::cmd_keys_rotate(&config, key.as_deref()).await,
            KeyCommands::Resume => cli::cmd_keys_resume(&config).await,
            KeyCommands::Retire { version } => cli::cmd_keys_retire(&config, version).await,
            KeyCommands::Status => cli::cmd_keys_status(&config).await,
        },
    }
}

fn print_help() {
    println!("Hermes - Email sending API gateway");
    println!();
    println!("Usage: hermes [--config <path>] <command>");
    println!();
    println!("Commands:");
    println!("  serve                      Run the HTTP API");
    println!("  init                       Create config.toml and the keyring");
    println!("  user create|approve|reject|update|delete|list");
    println!("  keys generate|rotate|resume|retire|status");
    println!();
    println!("Run `hermes help <command>` for details.");
}

async fn run_server(config: Config) -> anyhow::Result<()> {
    info!("Hermes v{} starting...", env!("CARGO_PKG_VERSION"));

    let prometheus_handle = if config.observability.metrics_enabled {
        use metrics_exporter_prometheus::PrometheusBuilder;
        let handle = PrometheusBuilder::new()
            .install_recorder()
            .context("Failed to install Prometheus recorder")?;
        info!("Prometheus metrics recorder initialized");
        Some(handle)
    } else {
        None
    };

    let addr = format!("{}:{}", config.server.bind_address, config.server.port);

    let shared = Arc::new(SharedState::new(config).await?);
    let api_state = api::create_app_state(shared, prometheus_handle);
    let app = api::router(api_state);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    info!("Web API running at http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Web server error")?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    match signal::ctrl_c().await {
        Ok(()) => info!("Shutdown signal received"),
        Err(e) => error!("Error listening for shutdown: {}", e),
    }
}
