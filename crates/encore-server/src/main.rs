//! Encore server binary.
//!
//! # Usage
//!
//! ```bash
//! # In-memory storage, default ports 21032/21033
//! encore-server --public-address 203.0.113.7
//!
//! # Persistent storage
//! encore-server --public-address 203.0.113.7 --database encore.redb
//! ```
//!
//! Every flag can also be set through its `ENCORE_*` environment variable.

use std::{net::IpAddr, path::PathBuf, time::Duration};

use clap::Parser;
use encore_core::{AccessKey, ConnectionConfig, Platform, platform::AccessKeys};
use encore_server::{
    HandlerConfig, MemoryStorage, RedbStorage, Server, ServerRuntimeConfig, Storage,
    config::{DEFAULT_AUTH_PORT, DEFAULT_SECURE_PORT},
};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Encore online-services server
#[derive(Parser, Debug)]
#[command(name = "encore-server")]
#[command(about = "PRUDP auth and secure endpoints for rhythm-game consoles")]
#[command(version)]
struct Args {
    /// Address both endpoints bind to
    #[arg(long, env = "ENCORE_LISTEN", default_value = "0.0.0.0")]
    listen: IpAddr,

    /// Auth endpoint port
    #[arg(long, env = "ENCORE_AUTH_PORT", default_value_t = DEFAULT_AUTH_PORT)]
    auth_port: u16,

    /// Secure endpoint port
    #[arg(long, env = "ENCORE_SECURE_PORT", default_value_t = DEFAULT_SECURE_PORT)]
    secure_port: u16,

    /// Address advertised to clients in the secure station URL
    #[arg(long, env = "ENCORE_PUBLIC_ADDRESS", default_value = "127.0.0.1")]
    public_address: IpAddr,

    /// Ticket password for platforms that send none
    #[arg(long, env = "ENCORE_DEFAULT_PASSWORD", default_value = "")]
    default_password: String,

    /// Xbox 360 access key (32 hex digits)
    #[arg(long, env = "ENCORE_ACCESS_KEY_XBOX360", value_parser = parse_access_key)]
    access_key_xbox360: Option<AccessKey>,

    /// PS3 access key (32 hex digits)
    #[arg(long, env = "ENCORE_ACCESS_KEY_PS3", value_parser = parse_access_key)]
    access_key_ps3: Option<AccessKey>,

    /// Wii access key (32 hex digits)
    #[arg(long, env = "ENCORE_ACCESS_KEY_WII", value_parser = parse_access_key)]
    access_key_wii: Option<AccessKey>,

    /// redb database file; in-memory storage if omitted
    #[arg(long, env = "ENCORE_DATABASE")]
    database: Option<PathBuf>,

    /// Largest DATA payload per packet
    #[arg(long, env = "ENCORE_FRAGMENT_SIZE", default_value_t = 750)]
    fragment_size: usize,

    /// Seconds without traffic before a client is evicted
    #[arg(long, env = "ENCORE_IDLE_TIMEOUT_SECS", default_value_t = 60)]
    idle_timeout_secs: u64,

    /// Send attempts per reliable packet before eviction
    #[arg(long, env = "ENCORE_MAX_RETRANSMITS", default_value_t = 5)]
    max_retransmits: u32,

    /// Deadline for one request's repository work, in seconds
    #[arg(long, env = "ENCORE_REQUEST_TIMEOUT_SECS", default_value_t = 10)]
    request_timeout_secs: u64,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "ENCORE_LOG_LEVEL", default_value = "info")]
    log_level: String,
}

fn parse_access_key(text: &str) -> Result<AccessKey, String> {
    AccessKey::from_hex(text).map_err(|e| e.to_string())
}

impl Args {
    fn runtime_config(&self) -> ServerRuntimeConfig {
        let key = |configured: Option<AccessKey>, platform: Platform| {
            configured.unwrap_or_else(|| platform.default_access_key())
        };

        ServerRuntimeConfig {
            listen_address: self.listen,
            auth_port: self.auth_port,
            secure_port: self.secure_port,
            connection: ConnectionConfig {
                fragment_size: self.fragment_size,
                idle_timeout: Duration::from_secs(self.idle_timeout_secs),
                max_retransmits: self.max_retransmits,
                ..ConnectionConfig::default()
            },
            handler: HandlerConfig {
                default_password: self.default_password.clone(),
                access_keys: AccessKeys::new(
                    key(self.access_key_xbox360, Platform::Xbox360),
                    key(self.access_key_ps3, Platform::Ps3),
                    key(self.access_key_wii, Platform::Wii),
                ),
                public_address: self.public_address,
                secure_port: self.secure_port,
                request_timeout: Duration::from_secs(self.request_timeout_secs),
            },
            ..ServerRuntimeConfig::default()
        }
    }
}

async fn serve<S: Storage>(config: ServerRuntimeConfig, storage: S) -> Result<(), Box<dyn std::error::Error>> {
    let server = Server::bind(config, storage)?;
    let shutdown = server.shutdown_handle();

    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                tracing::info!("Interrupt received, shutting down");
                shutdown.shutdown();
            },
            Err(e) => tracing::error!("Failed to listen for interrupt: {e}"),
        }
    });

    server.run().await?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::registry().with(fmt::layer()).with(filter).init();

    tracing::info!("Encore server starting");
    let config = args.runtime_config();

    match &args.database {
        Some(path) => {
            tracing::info!("Opening database {}", path.display());
            serve(config, RedbStorage::open(path)?).await
        },
        None => {
            tracing::warn!("No database configured - accounts are lost on restart");
            serve(config, MemoryStorage::new()).await
        },
    }
}
