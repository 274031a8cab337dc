mod rate_limit;
mod server;
mod state;
mod telemetry;
mod tiers;


pub use rate_limit::*;
pub use server::*;
pub use state::*;
pub use telemetry::*;
pub use tiers::*;

use std::collections::BTreeMap;
use std::path::Path;

use serde::Deserialize;

use crate::error::ServerError;

/// Top-level configuration for the Tollgate server, loaded from a TOML file.
#[derive(Debug, Default, Deserialize)]
pub struct TollgateConfig {
    /// HTTP server bind configuration.
    #[serde(default)]
    pub server: ServerConfig,
    /// State backend configuration.
    #[serde(default)]
    pub state: StateConfig,
    /// Admission and bucket behavior.
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    /// Tier definitions. When empty the stock catalog is used.
    #[serde(default)]
    pub tiers: BTreeMap<String, TierConfig>,
    /// OpenTelemetry distributed tracing configuration.
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

impl TollgateConfig {
    /// Read the configuration file at `path`.
    ///
    /// A missing file yields the defaults; a file that exists but does not
    /// parse is an error.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ServerError> {
        let path = path.as_ref();
        match std::fs::read_to_string(path) {
            Ok(contents) => toml::from_str(&contents)
                .map_err(|e| ServerError::Config(format!("{}: {e}", path.display()))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(ServerError::Io(e)),
        }
    }
}
