//! Spigot bridge server.
//!
//! Loads the configuration, sets up logging and runs the Spigot adapter with
//! a logging host runtime until a termination signal arrives.

mod cli;
mod config;
mod runtime;
mod signals;

use cli::CliArgs;
use config::{AppConfig, LoggingSettings};
use runtime::LoggingRuntime;
use spigot_adapter::{IdentityEncoding, SpigotAdapter};
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Installs the global tracing subscriber.
///
/// `RUST_LOG` takes precedence over the configured level.
fn setup_logging(config: &LoggingSettings) -> Result<(), Box<dyn std::error::Error>> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    let registry = tracing_subscriber::registry().with(filter);

    if config.json_format {
        registry
            .with(
                fmt::layer()
                    .json()
                    .with_file(false)
                    .with_line_number(false)
                    .with_thread_ids(true),
            )
            .try_init()?;
    } else {
        registry
            .with(
                fmt::layer()
                    .with_ansi(true)
                    .with_file(false)
                    .with_line_number(false)
                    .with_thread_ids(true),
            )
            .try_init()?;
    }

    info!("🔧 Logging initialized with level: {}", config.level);
    Ok(())
}

struct Application {
    config: AppConfig,
    adapter: Arc<SpigotAdapter>,
    runtime: Arc<LoggingRuntime>,
}

impl Application {
    async fn new(args: CliArgs) -> Result<Self, Box<dyn std::error::Error>> {
        let mut config = AppConfig::load_from_file(&args.config_path).await?;

        if let Some(bind_address) = args.bind_address {
            config.server.bind_address = bind_address;
        }

        if let Some(log_level) = args.log_level {
            config.logging.level = log_level;
        }

        if args.json_logs {
            config.logging.json_format = true;
        }

        if args.raw_identity {
            config.adapter.identity_encoding = IdentityEncoding::Raw;
        }

        if let Err(e) = config.validate() {
            return Err(format!("Configuration validation failed: {e}").into());
        }

        setup_logging(&config.logging)?;
        info!("📂 Config: {}", args.config_path.display());

        let runtime = Arc::new(LoggingRuntime::new());
        let adapter = Arc::new(SpigotAdapter::new(
            config.to_adapter_config()?,
            runtime.clone(),
        ));

        Ok(Self {
            config,
            adapter,
            runtime,
        })
    }

    async fn run(self) -> Result<(), Box<dyn std::error::Error>> {
        info!("📋 Configuration Summary:");
        info!("  🌐 Bind address: {}", self.config.server.bind_address);
        info!("  🔗 Endpoint: {}", self.config.server.ws_path);
        info!("  🪪 Identity header: {}", self.config.adapter.identity_header);
        info!("  👥 Max connections: {}", self.config.server.max_connections);

        let (local_addr, mut server) = self.adapter.start()?;
        info!("✅ Spigot bridge ready on {}", local_addr);
        info!("🛑 Press Ctrl+C to gracefully shutdown");

        let signalled = tokio::select! {
            signal = signals::shutdown_signal() => {
                info!("📡 Received {}", signal?);
                true
            }
            result = &mut server => {
                result??;
                false
            }
        };

        if signalled {
            self.adapter.shutdown();
            server.await??;
        }

        info!(
            "✅ Spigot bridge shutdown complete, {} event(s) handled",
            self.runtime.events_handled()
        );
        Ok(())
    }
}

#[tokio::main]
async fn main() {
    let args = CliArgs::parse();

    let app = match Application::new(args).await {
        Ok(app) => app,
        Err(e) => {
            eprintln!("❌ Failed to start Spigot bridge: {e}");
            std::process::exit(1);
        }
    };

    if let Err(e) = app.run().await {
        error!("❌ Spigot bridge error: {}", e);
        std::process::exit(1);
    }
}
