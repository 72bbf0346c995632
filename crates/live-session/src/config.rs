//! Live session configuration.
//!
//! Configuration is loaded from environment variables. The backend token is
//! redacted in Debug output.

use common::secret::SecretString;
use std::collections::HashMap;
use std::env;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Default relay address (the in-process relay).
pub const DEFAULT_RELAY_ADDRESS: &str = "local://relay";

/// Default REST backend base URL.
pub const DEFAULT_BACKEND_URL: &str = "http://localhost:5000";

/// Default relay connect deadline in seconds.
pub const DEFAULT_RELAY_CONNECT_TIMEOUT_SECONDS: u64 = 10;

/// Default deadline for a peer link to leave the negotiating state.
pub const DEFAULT_NEGOTIATION_TIMEOUT_SECONDS: u64 = 30;

/// Default HTTP timeout for backend requests.
pub const DEFAULT_BACKEND_TIMEOUT_SECONDS: u64 = 10;

/// Default per-participant buffer for payloads that arrive before their link.
pub const DEFAULT_MAX_PENDING_PAYLOADS: usize = 32;

/// Default relay room capacity.
pub const DEFAULT_RELAY_MAX_PARTICIPANTS: usize = 8;

/// Default number of guests started by the simulation binary.
pub const DEFAULT_SIM_GUESTS: usize = 2;

/// Which session backend the simulation binary talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BackendKind {
    /// In-process store (`LS_BACKEND=memory`).
    #[default]
    InMemory,
    /// REST API at `backend_url` (`LS_BACKEND=http`).
    Http,
}

/// Live session configuration.
#[derive(Clone)]
pub struct Config {
    /// Signaling relay address (default: "local://relay").
    pub relay_address: String,

    /// Session backend selection (default: memory).
    pub backend: BackendKind,

    /// REST backend base URL.
    pub backend_url: String,

    /// Bearer token for backend requests.
    /// Protected by `SecretString` to prevent accidental logging.
    pub auth_token: SecretString,

    /// Relay connect deadline in seconds (default: 10).
    pub relay_connect_timeout_seconds: u64,

    /// Negotiation deadline in seconds (default: 30).
    pub negotiation_timeout_seconds: u64,

    /// Backend HTTP timeout in seconds (default: 10).
    pub backend_timeout_seconds: u64,

    /// Early-payload buffer size per participant (default: 32).
    pub max_pending_payloads: usize,

    /// Relay room capacity (default: 8).
    pub relay_max_participants: usize,

    /// Guests joined by the simulation binary (default: 2).
    pub sim_guests: usize,
}

/// Custom Debug implementation that redacts sensitive fields.
impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("relay_address", &self.relay_address)
            .field("backend", &self.backend)
            .field("backend_url", &self.backend_url)
            .field("auth_token", &"[REDACTED]")
            .field(
                "relay_connect_timeout_seconds",
                &self.relay_connect_timeout_seconds,
            )
            .field(
                "negotiation_timeout_seconds",
                &self.negotiation_timeout_seconds,
            )
            .field("backend_timeout_seconds", &self.backend_timeout_seconds)
            .field("max_pending_payloads", &self.max_pending_payloads)
            .field("relay_max_participants", &self.relay_max_participants)
            .field("sim_guests", &self.sim_guests)
            .finish()
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&env::vars().collect())
    }

    /// Load configuration from a `HashMap` (for testing).
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let relay_address = vars
            .get("LS_RELAY_ADDRESS")
            .cloned()
            .unwrap_or_else(|| DEFAULT_RELAY_ADDRESS.to_string());

        let backend = match vars.get("LS_BACKEND").map(String::as_str) {
            None | Some("memory") => BackendKind::InMemory,
            Some("http") => BackendKind::Http,
            Some(_) => {
                return Err(ConfigError::InvalidValue(
                    "LS_BACKEND must be memory or http".to_string(),
                ))
            }
        };

        let backend_url = vars
            .get("LS_BACKEND_URL")
            .cloned()
            .unwrap_or_else(|| DEFAULT_BACKEND_URL.to_string());

        if !backend_url.starts_with("http://") && !backend_url.starts_with("https://") {
            return Err(ConfigError::InvalidValue(
                "LS_BACKEND_URL must be an http(s) URL".to_string(),
            ));
        }

        let auth_token = SecretString::from(vars.get("LS_AUTH_TOKEN").cloned().unwrap_or_default());

        let relay_connect_timeout_seconds = positive(
            vars,
            "LS_RELAY_CONNECT_TIMEOUT_SECONDS",
            DEFAULT_RELAY_CONNECT_TIMEOUT_SECONDS,
        )?;

        let negotiation_timeout_seconds = positive(
            vars,
            "LS_NEGOTIATION_TIMEOUT_SECONDS",
            DEFAULT_NEGOTIATION_TIMEOUT_SECONDS,
        )?;

        let backend_timeout_seconds = positive(
            vars,
            "LS_BACKEND_TIMEOUT_SECONDS",
            DEFAULT_BACKEND_TIMEOUT_SECONDS,
        )?;

        let max_pending_payloads = positive(
            vars,
            "LS_MAX_PENDING_PAYLOADS",
            DEFAULT_MAX_PENDING_PAYLOADS,
        )?;

        let relay_max_participants = positive(
            vars,
            "LS_RELAY_MAX_PARTICIPANTS",
            DEFAULT_RELAY_MAX_PARTICIPANTS,
        )?;

        // Zero guests is a valid (host-only) simulation
        let sim_guests = vars
            .get("LS_SIM_GUESTS")
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_SIM_GUESTS);

        Ok(Config {
            relay_address,
            backend,
            backend_url,
            auth_token,
            relay_connect_timeout_seconds,
            negotiation_timeout_seconds,
            backend_timeout_seconds,
            max_pending_payloads,
            relay_max_participants,
            sim_guests,
        })
    }

    /// Relay connect deadline.
    #[must_use]
    pub fn relay_connect_timeout(&self) -> Duration {
        Duration::from_secs(self.relay_connect_timeout_seconds)
    }

    /// Negotiation deadline.
    #[must_use]
    pub fn negotiation_timeout(&self) -> Duration {
        Duration::from_secs(self.negotiation_timeout_seconds)
    }

    /// Backend HTTP timeout.
    #[must_use]
    pub fn backend_timeout(&self) -> Duration {
        Duration::from_secs(self.backend_timeout_seconds)
    }
}

/// Parse a value that must be greater than zero, falling back to `default`
/// when the variable is absent or unparseable.
fn positive<T>(vars: &HashMap<String, String>, key: &str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr + PartialEq + Default,
{
    let value = vars
        .get(key)
        .and_then(|s| s.parse().ok())
        .unwrap_or(default);

    if value == T::default() {
        return Err(ConfigError::InvalidValue(format!(
            "{key} must be greater than zero"
        )));
    }

    Ok(value)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use common::secret::ExposeSecret;

    #[test]
    fn test_from_vars_success_with_defaults() {
        let config = Config::from_vars(&HashMap::new()).expect("Config should load successfully");

        assert_eq!(config.relay_address, DEFAULT_RELAY_ADDRESS);
        assert_eq!(config.backend, BackendKind::InMemory);
        assert_eq!(config.backend_url, DEFAULT_BACKEND_URL);
        assert_eq!(config.auth_token.expose_secret(), "");
        assert_eq!(
            config.relay_connect_timeout_seconds,
            DEFAULT_RELAY_CONNECT_TIMEOUT_SECONDS
        );
        assert_eq!(
            config.negotiation_timeout_seconds,
            DEFAULT_NEGOTIATION_TIMEOUT_SECONDS
        );
        assert_eq!(config.backend_timeout_seconds, DEFAULT_BACKEND_TIMEOUT_SECONDS);
        assert_eq!(config.max_pending_payloads, DEFAULT_MAX_PENDING_PAYLOADS);
        assert_eq!(config.relay_max_participants, DEFAULT_RELAY_MAX_PARTICIPANTS);
        assert_eq!(config.sim_guests, DEFAULT_SIM_GUESTS);
        assert_eq!(config.negotiation_timeout(), Duration::from_secs(30));
    }

    #[test]
    fn test_from_vars_success_with_custom_values() {
        let vars = HashMap::from([
            ("LS_RELAY_ADDRESS".to_string(), "local://campus-relay".to_string()),
            ("LS_BACKEND".to_string(), "http".to_string()),
            (
                "LS_BACKEND_URL".to_string(),
                "https://campus.example.edu".to_string(),
            ),
            ("LS_AUTH_TOKEN".to_string(), "bearer-xyz".to_string()),
            ("LS_RELAY_CONNECT_TIMEOUT_SECONDS".to_string(), "3".to_string()),
            ("LS_NEGOTIATION_TIMEOUT_SECONDS".to_string(), "45".to_string()),
            ("LS_BACKEND_TIMEOUT_SECONDS".to_string(), "5".to_string()),
            ("LS_MAX_PENDING_PAYLOADS".to_string(), "4".to_string()),
            ("LS_RELAY_MAX_PARTICIPANTS".to_string(), "4".to_string()),
            ("LS_SIM_GUESTS".to_string(), "0".to_string()),
        ]);

        let config = Config::from_vars(&vars).expect("Config should load successfully");

        assert_eq!(config.relay_address, "local://campus-relay");
        assert_eq!(config.backend, BackendKind::Http);
        assert_eq!(config.backend_url, "https://campus.example.edu");
        assert_eq!(config.auth_token.expose_secret(), "bearer-xyz");
        assert_eq!(config.relay_connect_timeout(), Duration::from_secs(3));
        assert_eq!(config.negotiation_timeout_seconds, 45);
        assert_eq!(config.backend_timeout(), Duration::from_secs(5));
        assert_eq!(config.max_pending_payloads, 4);
        assert_eq!(config.relay_max_participants, 4);
        assert_eq!(config.sim_guests, 0);
    }

    #[test]
    fn test_unparseable_values_fall_back_to_defaults() {
        let vars = HashMap::from([(
            "LS_NEGOTIATION_TIMEOUT_SECONDS".to_string(),
            "soon".to_string(),
        )]);

        let config = Config::from_vars(&vars).expect("Config should load successfully");
        assert_eq!(
            config.negotiation_timeout_seconds,
            DEFAULT_NEGOTIATION_TIMEOUT_SECONDS
        );
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let vars = HashMap::from([(
            "LS_RELAY_CONNECT_TIMEOUT_SECONDS".to_string(),
            "0".to_string(),
        )]);

        let result = Config::from_vars(&vars);
        assert!(
            matches!(result, Err(ConfigError::InvalidValue(msg)) if msg.contains("LS_RELAY_CONNECT_TIMEOUT_SECONDS"))
        );
    }

    #[test]
    fn test_zero_capacity_rejected() {
        let vars = HashMap::from([("LS_RELAY_MAX_PARTICIPANTS".to_string(), "0".to_string())]);
        assert!(matches!(
            Config::from_vars(&vars),
            Err(ConfigError::InvalidValue(_))
        ));
    }

    #[test]
    fn test_non_http_backend_rejected() {
        let vars = HashMap::from([("LS_BACKEND_URL".to_string(), "ftp://campus".to_string())]);
        assert!(matches!(
            Config::from_vars(&vars),
            Err(ConfigError::InvalidValue(_))
        ));
    }

    #[test]
    fn test_unknown_backend_rejected() {
        let vars = HashMap::from([("LS_BACKEND".to_string(), "carrier-pigeon".to_string())]);
        assert!(matches!(
            Config::from_vars(&vars),
            Err(ConfigError::InvalidValue(msg)) if msg.contains("LS_BACKEND")
        ));
    }

    #[test]
    fn test_debug_redacts_sensitive_fields() {
        let vars = HashMap::from([("LS_AUTH_TOKEN".to_string(), "eyJhbGciOiJFZERTQSJ9".to_string())]);
        let config = Config::from_vars(&vars).expect("Config should load successfully");

        let debug_output = format!("{config:?}");

        assert!(debug_output.contains("[REDACTED]"));
        assert!(!debug_output.contains("eyJhbGciOiJFZERTQSJ9"));
    }
}
