use std::{net::SocketAddr, path::Path, sync::Arc};

use clap::Parser;
use color_eyre::{
    Result,
    eyre::{Context, eyre},
};
use edge_gateway::{
    BucketSweeper, GatewayService, GracefulShutdown, HttpClientAdapter, JwtTokenValidator,
    adapters::build_router,
    config::{
        ServerConfigValidator,
        loader::{ENV_PREFIX, load_config},
        models::ServerConfig,
        validation::parse_duration_field,
    },
    tracing_setup::{self, LogFormat},
};

#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    #[clap(subcommand)]
    command: Option<Commands>,

    #[clap(short, long, default_value = "config.toml")]
    config: String,

    /// Log output format
    #[clap(long, value_enum, default_value_t = LogFormat::Json)]
    log_format: LogFormat,

    /// Default log level when RUST_LOG is unset
    #[clap(long, default_value = "info")]
    log_level: String,
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

    match args.command {
        Some(Commands::Validate { config }) => validate_config_command(&config).await,
        Some(Commands::Init { config }) => init_config_command(&config).await,
        Some(Commands::Serve { config }) => serve(&config, args.log_format, &args.log_level).await,
        None => serve(&args.config, args.log_format, &args.log_level).await,
    }
}

async fn serve(config_path: &str, log_format: LogFormat, log_level: &str) -> Result<()> {
    tracing_setup::init_tracing(log_format, log_level)?;

    tracing::info!("Loading configuration from {config_path}");
    let config: ServerConfig = load_config(config_path)
        .await
        .with_context(|| format!("Failed to load config from {config_path}"))?;

    ServerConfigValidator::validate(&config)
        .map_err(|e| eyre!("Invalid configuration in {config_path}: {e}"))?;
    let config = Arc::new(config);

    let backend_timeout = parse_duration_field("backend_timeout", &config.backend_timeout)?;
    let sweep_interval =
        parse_duration_field("rate_limit.sweep_interval", &config.rate_limit.sweep_interval)?;

    let http_client = Arc::new(
        HttpClientAdapter::new(backend_timeout).context("Failed to create backend HTTP client")?,
    );
    let validator = Arc::new(JwtTokenValidator::new(&config.jwt));
    let gateway_service = Arc::new(
        GatewayService::new(config.clone(), http_client, validator)
            .context("Failed to build gateway service")?,
    );

    for rule in gateway_service.routes().rules() {
        tracing::info!(
            "Configured route: {} {:?} -> {} (auth: {}, rate limit: {})",
            rule.pattern.as_str(),
            rule.methods,
            rule.target,
            rule.requires_auth,
            rule.requires_rate_limit
        );
    }

    let sweeper = BucketSweeper::new(gateway_service.rate_limiter(), sweep_interval);
    let sweeper_handle = tokio::spawn(async move { sweeper.run().await });

    let graceful_shutdown = Arc::new(GracefulShutdown::new());
    let shutdown_token = graceful_shutdown.shutdown_token();
    let signal_handler = graceful_shutdown.clone();
    tokio::spawn(async move {
        if let Err(e) = signal_handler.run_signal_handler().await {
            tracing::error!("Signal handler failed: {:?}", e);
        }
    });

    let addr: SocketAddr = config
        .listen_addr
        .parse()
        .context("Failed to parse listen address")?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {addr}"))?;

    tracing::info!("Edge gateway listening on {}", addr);
    println!("Edge gateway listening on {addr}");

    let app = build_router(gateway_service);
    let server_result = axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async move {
        let reason = shutdown_token.wait().await;
        tracing::info!("Shutdown signal received: {:?}, draining connections", reason);
    })
    .await
    .context("Server error");

    tracing::info!("Stopping rate limit sweeper...");
    sweeper_handle.abort();

    server_result?;
    tracing::info!("Graceful shutdown completed");
    Ok(())
}

/// Validate configuration file and exit
async fn validate_config_command(config_path: &str) -> Result<()> {
    println!("🔍 Validating configuration file: {config_path}");

    if !Path::new(config_path).exists() {
        eprintln!("❌ Error: Configuration file '{config_path}' not found");
        std::process::exit(1);
    }

    let config = match load_config(config_path).await {
        Ok(config) => {
            println!("✅ Configuration parsing: OK");
            config
        }
        Err(e) => {
            eprintln!("❌ Configuration parsing failed:");
            eprintln!("   {e:#}");
            std::process::exit(1);
        }
    };

    match ServerConfigValidator::validate(&config) {
        Ok(()) => {
            println!("✅ Configuration validation: OK");
            println!();
            println!("📋 Configuration Summary:");
            println!("   • Listen Address: {}", config.listen_addr);
            println!("   • Services: {}", config.services.len());
            println!("   • Routes: {}", config.routes.len());
            println!(
                "   • Rate Limit: {} tokens, {} per {}",
                config.rate_limit.capacity,
                config.rate_limit.refill_tokens,
                config.rate_limit.refill_period
            );
            println!("   • Backend Timeout: {}", config.backend_timeout);
            println!();
            println!("🎉 Configuration is valid and ready to use!");
            Ok(())
        }
        Err(e) => {
            eprintln!("❌ Configuration validation failed:");
            eprintln!("{e}");
            println!();
            println!("💡 Common fixes:");
            println!("   • Ensure all service URLs start with http:// or https://");
            println!("   • Set a JWT secret (or {ENV_PREFIX}__JWT__SECRET in the environment)");
            println!("   • Verify listen address format (e.g., '127.0.0.1:8080')");
            println!("   • Ensure durations use valid units (s, m, h)");
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

    let default_config = r#"# Edge Gateway Configuration

# The address to listen on
listen_addr = "127.0.0.1:8080"

# Time allowed for a backend to send response headers ("0s" disables)
backend_timeout = "60s"

# Adds X-Content-Type-Options, X-Frame-Options and X-XSS-Protection to every response
security_headers = true

# Backend base URLs, referenced by name from routes
[services]
user = "http://localhost:8081"
product = "http://localhost:8082"
media = "http://localhost:8083"

# HMAC key for bearer tokens. Prefer GATEWAY__JWT__SECRET in the environment.
[jwt]
secret = "change-me"
algorithms = ["HS256", "HS384", "HS512"]

# Token bucket shared by all clients of rate-limited routes
[rate_limit]
capacity = 10
refill_tokens = 10
refill_period = "1m"
sweep_interval = "60s"

[cors]
allowed_origins = ["http://localhost:4200", "http://localhost:3000"]
allowed_methods = ["GET", "POST", "PUT", "DELETE", "OPTIONS"]
exposed_headers = ["Authorization"]
allow_credentials = true
max_age_secs = 3600

# Routes are matched in order; the first match wins.
# Omit every [[routes]] entry to use the built-in table.
[[routes]]
path = "/api/users/register"
methods = ["POST"]
service = "user"

[[routes]]
path = "/api/users/login"
methods = ["POST"]
service = "user"
rate_limit = true

[[routes]]
path = "/api/users/avatars/{filename}"
methods = ["GET"]
service = "user"

[[routes]]
path = "/api/users/profile/**"
methods = ["GET", "PUT"]
service = "user"
auth = true

[[routes]]
path = "/api/products/my-products"
methods = ["GET"]
service = "product"
auth = true

[[routes]]
path = "/api/products"
methods = ["GET"]
service = "product"

[[routes]]
path = "/api/products/{id}"
methods = ["GET"]
service = "product"

[[routes]]
path = "/api/products/**"
methods = ["POST", "PUT", "DELETE"]
service = "product"
auth = true

[[routes]]
path = "/api/media/{id}"
methods = ["GET"]
service = "media"

[[routes]]
path = "/api/media/product/{productId}"
methods = ["GET"]
service = "media"

[[routes]]
path = "/api/media/**"
methods = ["POST", "DELETE"]
service = "media"
auth = true
"#;

    tokio::fs::write(path, default_config)
        .await
        .context("Failed to write config file")?;
    println!("✅ Created default configuration at: {config_path}");
    println!("   Run 'edge-gateway serve --config {config_path}' to start the server");
    Ok(())
}
