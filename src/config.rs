//! Client settings.
//!
//! Settings are layered: built-in defaults, then an optional config file
//! (TOML, YAML or JSON, picked by extension), then `HEATWATCH_*` environment
//! variables. Command line flags are applied on top by the binary.
//!
//! ```toml
//! server_url = "http://heatpump.local:5000"
//! time_range = "7d"
//! price_per_kwh = 2.5
//! request_timeout = "10s"
//! reconnect_delay = "1s"
//! max_reconnect_attempts = 10
//! ```

use std::path::Path;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use config::{Config, Environment, File};
use heatwatch_types::TimeRange;
use serde::Deserialize;

use crate::channel::ReconnectPolicy;
use crate::duration::parse_duration;

/// Prefix for environment overrides, e.g. `HEATWATCH_SERVER_URL`.
pub const ENV_PREFIX: &str = "HEATWATCH";

/// Settings as they appear in files and the environment.
#[derive(Debug, Deserialize)]
struct RawSettings {
    server_url: String,
    websocket_url: Option<String>,
    time_range: String,
    price_per_kwh: Option<f64>,
    request_timeout: String,
    reconnect_delay: String,
    max_reconnect_attempts: u32,
}

/// Validated client settings.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    /// Base URL of the telemetry server's HTTP API.
    pub server_url: String,
    /// Explicit live channel URL. Derived from `server_url` when unset.
    pub websocket_url: Option<String>,
    /// Range selected at startup.
    pub time_range: TimeRange,
    /// Electricity price sent with refresh requests.
    pub price_per_kwh: Option<f64>,
    /// Bound on snapshot requests and channel connect attempts.
    pub request_timeout: Duration,
    /// Fixed delay between reconnect attempts.
    pub reconnect_delay: Duration,
    /// Consecutive failed connects before the channel gives up.
    pub max_reconnect_attempts: u32,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server_url: "http://localhost:5000".to_string(),
            websocket_url: None,
            time_range: TimeRange::default(),
            price_per_kwh: None,
            request_timeout: Duration::from_secs(10),
            reconnect_delay: Duration::from_secs(1),
            max_reconnect_attempts: 10,
        }
    }
}

impl Settings {
    /// Load settings from defaults, an optional file and the process environment.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        Self::load_with_env(path, Environment::with_prefix(ENV_PREFIX))
    }

    /// Load settings with an explicit environment source.
    pub fn load_with_env(path: Option<&Path>, env: Environment) -> Result<Self> {
        let mut builder = Config::builder()
            .set_default("server_url", "http://localhost:5000")?
            .set_default("time_range", "24h")?
            .set_default("request_timeout", "10s")?
            .set_default("reconnect_delay", "1s")?
            .set_default("max_reconnect_attempts", 10)?;

        if let Some(path) = path {
            builder = builder.add_source(File::from(path));
        }

        let config = builder
            .add_source(env)
            .build()
            .context("Failed to read settings")?;

        let raw: RawSettings = config
            .try_deserialize()
            .context("Invalid settings")?;

        Self::from_raw(raw)
    }

    fn from_raw(raw: RawSettings) -> Result<Self> {
        let settings = Self {
            server_url: raw.server_url.trim_end_matches('/').to_string(),
            websocket_url: raw.websocket_url.filter(|url| !url.trim().is_empty()),
            time_range: TimeRange::new(&raw.time_range)?,
            price_per_kwh: raw.price_per_kwh,
            request_timeout: parse_duration(&raw.request_timeout)
                .context("Invalid request_timeout")?,
            reconnect_delay: parse_duration(&raw.reconnect_delay)
                .context("Invalid reconnect_delay")?,
            max_reconnect_attempts: raw.max_reconnect_attempts,
        };
        settings.validate()?;
        Ok(settings)
    }

    /// Check cross-field constraints.
    pub fn validate(&self) -> Result<()> {
        if self.max_reconnect_attempts == 0 {
            bail!("max_reconnect_attempts must be at least 1");
        }
        if self.request_timeout.is_zero() {
            bail!("request_timeout must be greater than zero");
        }
        if let Some(price) = self.price_per_kwh {
            if !price.is_finite() || price < 0.0 {
                bail!("price_per_kwh must be a non-negative number, got {}", price);
            }
        }
        self.websocket_url()?;
        Ok(())
    }

    /// The live channel URL: the explicit setting, or `<server>/ws` with the
    /// scheme switched to `ws`/`wss`.
    pub fn websocket_url(&self) -> Result<String> {
        match &self.websocket_url {
            Some(url) => Ok(url.clone()),
            None => derive_websocket_url(&self.server_url),
        }
    }

    /// Reconnect policy for the live channel.
    pub fn reconnect_policy(&self) -> ReconnectPolicy {
        ReconnectPolicy::new(self.reconnect_delay, self.max_reconnect_attempts)
    }
}

fn derive_websocket_url(server_url: &str) -> Result<String> {
    let base = server_url.trim_end_matches('/');
    if let Some(rest) = base.strip_prefix("https://") {
        Ok(format!("wss://{}/ws", rest))
    } else if let Some(rest) = base.strip_prefix("http://") {
        Ok(format!("ws://{}/ws", rest))
    } else {
        bail!("server_url must start with http:// or https://: {}", server_url)
    }
}
