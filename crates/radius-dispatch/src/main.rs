use clap::Parser;
use radius_dispatch::{Config, RadiusServer, ServerConfig, SimpleHandler};
use std::process;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// RADIUS dispatch server - RFC 2865/2866 over UDP
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
#[command(name = "radius-dispatch")]
struct Cli {
    /// Path to configuration file
    #[arg(value_name = "CONFIG", default_value = "config.json")]
    config_path: String,

    /// Validate configuration and exit (doesn't start server)
    #[arg(long)]
    validate: bool,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match Config::from_file(&cli.config_path) {
        Ok(cfg) => cfg,
        Err(e) => {
            tracing_subscriber::registry()
                .with(EnvFilter::new("info"))
                .with(tracing_subscriber::fmt::layer())
                .init();

            if cli.validate {
                error!(path = %cli.config_path, error = %e, "Configuration validation failed");
                process::exit(1);
            }

            warn!(path = %cli.config_path, error = %e, "Could not load config file");
            info!("Creating example configuration at: {}", cli.config_path);

            if let Err(e) = Config::example().to_file(&cli.config_path) {
                error!("Error creating example config: {}", e);
                process::exit(1);
            }

            info!("Please edit {} and restart the server", cli.config_path);
            process::exit(0);
        }
    };

    if cli.validate {
        println!("Configuration is valid");
        println!("  Listen: {}:{}", config.listen_address, config.listen_port);
        println!("  Clients: {}", config.clients.len());
        println!("  Users: {}", config.users.len());
        match config.max_in_flight {
            Some(limit) => println!(
                "  Max in flight: {} ({:?} when full)",
                limit, config.overload_policy
            ),
            None => println!("  Max in flight: unbounded"),
        }
        process::exit(0);
    }

    let log_level = config.log_level.as_deref().unwrap_or("info");
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level)))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("RADIUS dispatch server v{}", env!("CARGO_PKG_VERSION"));
    info!("Loaded configuration from: {}", cli.config_path);

    for client in &config.clients {
        info!(
            address = %client.address,
            name = client.name.as_deref().unwrap_or("(unnamed)"),
            enabled = client.enabled,
            "Configured client"
        );
    }
    if config.secret.is_some() {
        warn!("Default secret set: requests from any address will be answered");
    }

    let handler = SimpleHandler::from_config(&config);
    let server_config = match ServerConfig::from_config(&config, Arc::new(handler)) {
        Ok(cfg) => cfg,
        Err(e) => {
            error!("Invalid configuration: {}", e);
            process::exit(1);
        }
    };

    let server = Arc::new(RadiusServer::new(server_config));
    let running = Arc::clone(&server);
    let mut serve = tokio::spawn(async move { running.listen_and_serve().await });

    tokio::select! {
        result = &mut serve => {
            match result {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    error!("Server error: {}", e);
                    process::exit(1);
                }
                Err(e) => {
                    error!("Server task failed: {}", e);
                    process::exit(1);
                }
            }
        }
        signal = tokio::signal::ctrl_c() => {
            if let Err(e) = signal {
                error!("Failed to listen for Ctrl+C: {}", e);
            }
            info!("Interrupt received");
            if let Err(e) = server.shutdown(Some(config.shutdown_timeout())).await {
                warn!("{}", e);
                process::exit(1);
            }
        }
    }
}
