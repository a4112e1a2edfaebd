//! Runtime configuration.
//!
//! [`ServerRuntimeConfig`] is what the binary builds from its command line.
//! Transport timing lives in [`ConnectionConfig`] (owned by `encore-core`);
//! everything handlers read lives in [`HandlerConfig`].

use std::{net::IpAddr, time::Duration};

use encore_core::{ConnectionConfig, platform::AccessKeys};
use encore_proto::{StationUrl, UrlScheme, station_url};

use crate::error::ServerError;

/// Default auth endpoint port.
pub const DEFAULT_AUTH_PORT: u16 = 21_032;
/// Default secure endpoint port.
pub const DEFAULT_SECURE_PORT: u16 = 21_033;

/// Settings read by RMC handlers.
#[derive(Debug, Clone)]
pub struct HandlerConfig {
    /// Password used for key derivation when the client sends none
    pub default_password: String,
    /// Access key per platform
    pub access_keys: AccessKeys,
    /// Address clients should use to reach the secure endpoint
    pub public_address: IpAddr,
    /// Port of the secure endpoint, advertised in the login reply
    pub secure_port: u16,
    /// Deadline for one request's repository work
    pub request_timeout: Duration,
}

impl HandlerConfig {
    /// Station URL of the secure endpoint, as returned by login.
    pub fn secure_station_url(&self) -> StationUrl {
        let mut url = StationUrl::new(UrlScheme::Prudps);
        url.set(station_url::KEY_ADDRESS, self.public_address)
            .set(station_url::KEY_PORT, self.secure_port)
            .set(station_url::KEY_CID, 1)
            .set(station_url::KEY_PID, 2)
            .set(station_url::KEY_SID, 1)
            .set(station_url::KEY_STREAM, 3)
            .set(station_url::KEY_TYPE, 2);
        url
    }
}

impl Default for HandlerConfig {
    fn default() -> Self {
        Self {
            default_password: String::new(),
            access_keys: AccessKeys::default(),
            public_address: IpAddr::from([127, 0, 0, 1]),
            secure_port: DEFAULT_SECURE_PORT,
            request_timeout: Duration::from_secs(10),
        }
    }
}

/// Server configuration for the production runtime.
#[derive(Debug, Clone)]
pub struct ServerRuntimeConfig {
    /// Address both listeners bind to
    pub listen_address: IpAddr,
    /// Auth endpoint port
    pub auth_port: u16,
    /// Secure endpoint port
    pub secure_port: u16,
    /// How often expired messages are swept
    pub purge_interval: Duration,
    /// PRUDP timing and sizes
    pub connection: ConnectionConfig,
    /// Handler settings
    pub handler: HandlerConfig,
}

impl ServerRuntimeConfig {
    /// Check cross-field consistency.
    ///
    /// # Errors
    ///
    /// - `Config` if both endpoints share a non-ephemeral port
    /// - `Config` if the purge interval is zero
    /// - `Config` if the fragment size cannot hold any payload
    pub fn validate(&self) -> Result<(), ServerError> {
        if self.auth_port == self.secure_port && self.auth_port != 0 {
            return Err(ServerError::Config(format!(
                "auth and secure endpoints both use port {}",
                self.auth_port
            )));
        }
        if self.purge_interval.is_zero() {
            return Err(ServerError::Config("purge interval must be positive".to_string()));
        }
        if self.connection.fragment_size == 0 {
            return Err(ServerError::Config("fragment size must be positive".to_string()));
        }
        Ok(())
    }
}

impl Default for ServerRuntimeConfig {
    fn default() -> Self {
        Self {
            listen_address: IpAddr::from([0, 0, 0, 0]),
            auth_port: DEFAULT_AUTH_PORT,
            secure_port: DEFAULT_SECURE_PORT,
            purge_interval: Duration::from_secs(30),
            connection: ConnectionConfig::default(),
            handler: HandlerConfig::default(),
        }
    }
}
