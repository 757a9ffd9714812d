//! Server configuration for `PinVault`.
//!
//! Loads configuration from environment variables with sensible defaults.
//! All settings can be overridden via `PINVAULT_*` environment variables.

use std::net::SocketAddr;
use std::time::Duration;

use pinvault_core::gate::GateConfig;

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind the HTTP listener to.
    pub bind_addr: SocketAddr,
    /// Where the long-lived partition lives.
    pub storage_backend: StorageBackendType,
    /// Log level filter (e.g., `info`, `debug`, `warn`).
    pub log_level: String,
    /// PIN gate tunables.
    pub gate: GateConfig,
    /// Browser origins allowed to call the API. Empty means none.
    pub cors_origins: Vec<String>,
}

/// Supported long-lived storage backends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageBackendType {
    /// In-memory (development only, data lost on restart).
    Memory,
    /// Redb file at `path`.
    Redb { path: String },
}

impl ServerConfig {
    /// Load configuration from environment variables.
    ///
    /// Environment variables:
    /// - `PORT` — port to bind on (binds to `0.0.0.0`)
    /// - `PINVAULT_BIND_ADDR` — full bind address (overrides `PORT`, default: `127.0.0.1:8300`)
    /// - `PINVAULT_STORAGE` — `memory` or `redb` (default: `redb`)
    /// - `PINVAULT_STORAGE_PATH` — redb file path (default: `./pinvault.redb`)
    /// - `PINVAULT_LOG_LEVEL` — log filter (default: `info`)
    /// - `PINVAULT_PIN_LENGTH` — digits per PIN (default: `3`)
    /// - `PINVAULT_DEFAULT_PIN` — PIN written on first run (default: `123`)
    /// - `PINVAULT_INACTIVITY_TIMEOUT_SECS` — idle session lifetime (default: `300`)
    /// - `PINVAULT_NOTICE_SECS` — how long notices stay visible (default: `3`)
    /// - `PINVAULT_RECOVERY_DELAY_MS` — simulated recovery latency (default: `1000`)
    /// - `PINVAULT_CORS_ORIGINS` — comma-separated allowed origins (default: none)
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a configuration from an arbitrary variable source.
    pub fn from_lookup(var: impl Fn(&str) -> Option<String>) -> Self {
        // Priority: PINVAULT_BIND_ADDR > PORT > default 127.0.0.1:8300
        let bind_addr = if let Some(addr) = var("PINVAULT_BIND_ADDR") {
            addr.parse()
                .unwrap_or_else(|_| SocketAddr::from(([127, 0, 0, 1], 8300)))
        } else if let Some(port_str) = var("PORT") {
            let port: u16 = port_str.parse().unwrap_or(8300);
            SocketAddr::from(([0, 0, 0, 0], port))
        } else {
            SocketAddr::from(([127, 0, 0, 1], 8300))
        };

        let storage_path =
            var("PINVAULT_STORAGE_PATH").unwrap_or_else(|| "./pinvault.redb".to_owned());

        let storage_backend = match var("PINVAULT_STORAGE")
            .unwrap_or_else(|| "redb".to_owned())
            .to_lowercase()
            .as_str()
        {
            "memory" => StorageBackendType::Memory,
            _ => StorageBackendType::Redb { path: storage_path },
        };

        let log_level = var("PINVAULT_LOG_LEVEL").unwrap_or_else(|| "info".to_owned());

        let parsed = |key: &str| var(key).and_then(|v| v.parse::<u64>().ok());
        let defaults = GateConfig::default();
        let gate = GateConfig {
            pin_length: var("PINVAULT_PIN_LENGTH")
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.pin_length),
            default_pin: var("PINVAULT_DEFAULT_PIN").unwrap_or(defaults.default_pin),
            inactivity_timeout: parsed("PINVAULT_INACTIVITY_TIMEOUT_SECS")
                .map_or(defaults.inactivity_timeout, Duration::from_secs),
            notice_duration: parsed("PINVAULT_NOTICE_SECS")
                .map_or(defaults.notice_duration, Duration::from_secs),
            recovery_delay: parsed("PINVAULT_RECOVERY_DELAY_MS")
                .map_or(defaults.recovery_delay, Duration::from_millis),
        };

        let cors_origins = var("PINVAULT_CORS_ORIGINS")
            .map(|list| {
                list.split(',')
                    .map(str::trim)
                    .filter(|o| !o.is_empty())
                    .map(str::to_owned)
                    .collect()
            })
            .unwrap_or_default();

        Self {
            bind_addr,
            storage_backend,
            log_level,
            gate,
            cors_origins,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn config(vars: &[(&str, &str)]) -> ServerConfig {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect();
        ServerConfig::from_lookup(|k| map.get(k).cloned())
    }

    #[test]
    fn defaults() {
        let c = config(&[]);
        assert_eq!(c.bind_addr, SocketAddr::from(([127, 0, 0, 1], 8300)));
        assert_eq!(
            c.storage_backend,
            StorageBackendType::Redb {
                path: "./pinvault.redb".to_owned()
            }
        );
        assert_eq!(c.log_level, "info");
        assert_eq!(c.gate.pin_length, 3);
        assert_eq!(c.gate.default_pin, "123");
        assert_eq!(c.gate.inactivity_timeout, Duration::from_secs(300));
    }

    #[test]
    fn cors_origins_are_opt_in() {
        assert!(config(&[]).cors_origins.is_empty());

        let c = config(&[(
            "PINVAULT_CORS_ORIGINS",
            "http://localhost:5173, ,https://vault.example",
        )]);
        assert_eq!(
            c.cors_origins,
            vec!["http://localhost:5173", "https://vault.example"]
        );
    }

    #[test]
    fn port_binds_all_interfaces_unless_overridden() {
        let c = config(&[("PORT", "9000")]);
        assert_eq!(c.bind_addr, SocketAddr::from(([0, 0, 0, 0], 9000)));

        let c = config(&[("PORT", "9000"), ("PINVAULT_BIND_ADDR", "127.0.0.1:9100")]);
        assert_eq!(c.bind_addr, SocketAddr::from(([127, 0, 0, 1], 9100)));
    }

    #[test]
    fn gate_overrides() {
        let c = config(&[
            ("PINVAULT_STORAGE", "MEMORY"),
            ("PINVAULT_PIN_LENGTH", "4"),
            ("PINVAULT_DEFAULT_PIN", "0000"),
            ("PINVAULT_INACTIVITY_TIMEOUT_SECS", "60"),
            ("PINVAULT_RECOVERY_DELAY_MS", "0"),
        ]);
        assert_eq!(c.storage_backend, StorageBackendType::Memory);
        assert_eq!(c.gate.pin_length, 4);
        assert_eq!(c.gate.default_pin, "0000");
        assert_eq!(c.gate.inactivity_timeout, Duration::from_secs(60));
        assert_eq!(c.gate.recovery_delay, Duration::ZERO);
        assert_eq!(c.gate.notice_duration, Duration::from_secs(3));
    }

    #[test]
    fn unparseable_values_fall_back() {
        let c = config(&[("PINVAULT_BIND_ADDR", "nope"), ("PINVAULT_PIN_LENGTH", "x")]);
        assert_eq!(c.bind_addr, SocketAddr::from(([127, 0, 0, 1], 8300)));
        assert_eq!(c.gate.pin_length, 3);
    }
}
