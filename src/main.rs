use std::{net::SocketAddr, path::Path, sync::Arc};

use clap::Parser;
use color_eyre::{
    Result,
    eyre::{Context, eyre},
};
use junction::{
    adapters::{
        GatewayHandler, InMemoryRegistry, PooledClientFactory, create_load_shed_middleware,
        http_handler, request_id_middleware,
    },
    config::GatewayConfig,
    core::{GatewayService, IngressGate},
    metrics, tracing_setup,
    utils::graceful_shutdown::GracefulShutdown,
};
use tower_http::trace::TraceLayer;

#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    #[clap(subcommand)]
    command: Option<Commands>,

    #[clap(short, long, default_value = "config.toml")]
    config: String,
}

#[derive(Parser, Debug)]
enum Commands {
    /// Validate configuration file
    Validate {
        /// Configuration file to validate
        #[clap(short, long, default_value = "config.toml")]
        config: String,
    },
    /// Initialize a new configuration file
    Init {
        /// Output path for the new config file
        #[clap(short, long, default_value = "config.toml")]
        config: String,
    },
    /// Start the gateway server (default)
    Serve {
        /// Configuration file to use
        #[clap(short, long, default_value = "config.toml")]
        config: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let args = Args::parse();

    // Determine the command to run
    let (command, config_path) = match args.command {
        Some(Commands::Validate { config }) => ("validate", config),
        Some(Commands::Init { config }) => ("init", config),
        Some(Commands::Serve { config }) => ("serve", config),
        None => ("serve", args.config), // Default to serve with config from args
    };

    match command {
        "validate" => {
            return validate_config_command(&config_path).await;
        }
        "init" => {
            return init_config_command(&config_path).await;
        }
        "serve" => {
            // Continue with normal server startup
        }
        _ => unreachable!(),
    }

    tracing_setup::init_tracing().map_err(|e| eyre!("Failed to initialize tracing: {}", e))?;
    metrics::init_metrics().map_err(|e| eyre!("Failed to initialize metrics: {}", e))?;

    tracing::info!("Loading configuration from {config_path}");
    let config: GatewayConfig = junction::config::load_config(&config_path)
        .await
        .with_context(|| format!("Failed to load config from {config_path}"))?;
    junction::config::GatewayConfigValidator::validate(&config)
        .map_err(|e| eyre!("Invalid configuration: {e}"))?;
    let config = Arc::new(config);

    // Wire the core: one registry backend, one gateway, one ingress gate
    let registry = Arc::new(InMemoryRegistry::new());
    let gateway = Arc::new(GatewayService::new(
        config.clone(),
        registry.clone(),
        Arc::new(PooledClientFactory::new()),
    ));
    let handler = GatewayHandler::new(gateway.clone(), registry);
    let gate = IngressGate::new(config.ingress.capacity);

    // Create graceful shutdown manager
    let graceful_shutdown = Arc::new(GracefulShutdown::new());

    // Start signal handler for graceful shutdown
    let signal_handler_shutdown = graceful_shutdown.clone();
    tokio::spawn(async move {
        if let Err(e) = signal_handler_shutdown.run_signal_handler().await {
            tracing::error!("Signal handler error: {}", e);
        }
    });

    let app = http_handler::router(handler)
        .layer(axum::middleware::from_fn(create_load_shed_middleware(
            gate.clone(),
        )))
        .layer(axum::middleware::from_fn(request_id_middleware))
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = config
        .listen_addr
        .parse()
        .context("Failed to parse listen address")?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;

    tracing::info!(
        "Starting Junction API Gateway on {} (api prefix: {}, ingress capacity: {})",
        addr,
        config.api_prefix,
        config.ingress.capacity
    );
    println!(
        "Junction API Gateway listening on {addr} (api prefix: {}, ingress capacity: {})",
        config.api_prefix, config.ingress.capacity
    );

    // Run the server and wait for shutdown. Each accepted connection runs in
    // its own task, so leaving the select only stops the accept loop and
    // in-flight requests keep draining through the gate.
    let server_result = tokio::select! {
        result = axum::serve(listener, app.into_make_service()) => {
            result.context("Server error")
        },
        shutdown_reason = graceful_shutdown.wait_for_shutdown_signal() => {
            tracing::info!("Shutdown signal received: {:?}", shutdown_reason);

            let drained = gate.wait_for_drain(config.drain_timeout()).await;
            if drained {
                tracing::info!("Ingress drained, tearing down gateway state");
            } else {
                tracing::warn!(
                    "Drain timeout ({:?}) elapsed with requests still in flight",
                    config.drain_timeout()
                );
            }
            gateway.shutdown().await;

            tracing::info!("Graceful shutdown completed");
            Ok(())
        }
    };

    server_result?;

    // Shutdown tracing on exit
    tracing_setup::shutdown_tracing();

    Ok(())
}

/// Validate configuration file and exit
async fn validate_config_command(config_path: &str) -> Result<()> {
    use junction::config::{GatewayConfigValidator, load_config};

    println!("🔍 Validating configuration file: {config_path}");

    // First check if file exists and is readable
    if !Path::new(config_path).exists() {
        eprintln!("❌ Error: Configuration file '{config_path}' not found");
        std::process::exit(1);
    }

    // Try to parse the configuration
    let config = match load_config(config_path).await {
        Ok(config) => {
            println!("✅ Configuration parsing: OK");
            config
        }
        Err(e) => {
            eprintln!("❌ Configuration parsing failed:");
            eprintln!("   {e}");
            std::process::exit(1);
        }
    };

    // Validate the configuration
    match GatewayConfigValidator::validate(&config) {
        Ok(()) => {
            println!("✅ Configuration validation: OK");
            println!();
            println!("📋 Configuration Summary:");
            println!("   • Listen Address: {}", config.listen_addr);
            println!("   • API Prefix: {}", config.api_prefix);
            println!("   • Ingress Capacity: {}", config.ingress.capacity);
            println!(
                "   • Circuit Breaker: {} failures / {} ms call timeout / {} ms reset",
                config.circuit_breaker.max_failures,
                config.circuit_breaker.call_timeout_ms,
                config.circuit_breaker.reset_timeout_ms
            );
            println!();
            println!("🎉 Configuration is valid and ready to use!");
            Ok(())
        }
        Err(e) => {
            eprintln!("❌ Configuration validation failed:");
            eprintln!("{e}");
            println!();
            println!("💡 Common fixes:");
            println!("   • Verify listen address format (e.g., '127.0.0.1:8787')");
            println!("   • Ensure the API prefix starts and ends with '/'");
            println!("   • Keep ingress capacity and breaker thresholds above zero");
            std::process::exit(1);
        }
    }
}

/// Initialize a new configuration file
async fn init_config_command(config_path: &str) -> Result<()> {
    let path = Path::new(config_path);
    if path.exists() {
        eprintln!("❌ Error: Configuration file '{config_path}' already exists");
        std::process::exit(1);
    }

    let default_config = r#"# Junction API Gateway Configuration

# The address to listen on
listen_addr = "127.0.0.1:8787"

# Path prefix service dispatches live under; must start and end with '/'
api_prefix = "/api/"

# Bounded ingress admission
[ingress]
capacity = 128
drain_timeout_secs = 30

# Per-service circuit breaker settings
[circuit_breaker]
max_failures = 5
call_timeout_ms = 5000
reset_timeout_ms = 10000
fallback_on_failure = true
"#;

    tokio::fs::write(path, default_config)
        .await
        .context("Failed to write config file")?;
    println!("✅ Created default configuration at: {config_path}");
    println!("   Run 'junction serve --config {config_path}' to start the gateway");
    Ok(())
}
