use std::time::Duration;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::utils::backoff::RetryConfig;

const DEFAULT_SESSION_TIMEOUT_MS: u64 = 30_000;

/// Per-session options.
/// Durations are expressed in milliseconds so the struct round-trips through
/// plain config files.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct SessionConfig {
    /// Opaque client identity; a fresh v4 UUID when unset.
    pub id: Option<String>,
    /// Server-side session expiry without a keepalive (`None` = 30 s).
    /// Keepalives are issued at half this interval.
    pub timeout_ms: Option<u64>,
    /// Retry schedule for transport failures inside the dispatch loop.
    #[serde(default)]
    pub retry: RetryConfig,
}

impl SessionConfig {
    /// Loads session options from environment variables.
    /// Recognized: STRATA_SESSION_TIMEOUT_MS, STRATA_SESSION_ID.
    pub fn from_env() -> Self {
        let timeout_ms = std::env::var("STRATA_SESSION_TIMEOUT_MS")
            .ok()
            .and_then(|v| v.parse().ok());
        let id = std::env::var("STRATA_SESSION_ID").ok();
        Self {
            id,
            timeout_ms,
            retry: RetryConfig::default(),
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms.unwrap_or(DEFAULT_SESSION_TIMEOUT_MS))
    }

    /// Resolves the client identity, minting one if the caller did not
    /// supply an id.
    pub fn client_id(&self) -> String {
        self.id
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().to_string())
    }
}
