use crate::error::{FinError, Result};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

const DEFAULT_DATA_DIR: &str = "database";
const DEFAULT_STATIC_DIR: &str = "static";
const DEFAULT_SESSION_TTL: u64 = 60 * 60; // 1 hour, same as the token lifetime

/// Server settings, read from `FINTRACK_*` environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    pub addr: SocketAddr,
    pub data_dir: PathBuf,
    pub static_dir: PathBuf,
    pub session_ttl: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            addr: SocketAddr::from(([127, 0, 0, 1], 3000)),
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            static_dir: PathBuf::from(DEFAULT_STATIC_DIR),
            session_ttl: Duration::from_secs(DEFAULT_SESSION_TTL),
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a config from any key lookup; unset keys keep their defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Config::default();

        if let Some(addr) = lookup("FINTRACK_ADDR") {
            config.addr = addr
                .parse()
                .map_err(|_| FinError::validation(format!("FINTRACK_ADDR is not a socket address: {}", addr)))?;
        }
        if let Some(dir) = lookup("FINTRACK_DATA_DIR") {
            config.data_dir = PathBuf::from(dir);
        }
        if let Some(dir) = lookup("FINTRACK_STATIC_DIR") {
            config.static_dir = PathBuf::from(dir);
        }
        if let Some(ttl) = lookup("FINTRACK_SESSION_TTL") {
            let secs: u64 = ttl
                .parse()
                .map_err(|_| FinError::validation(format!("FINTRACK_SESSION_TTL must be seconds: {}", ttl)))?;
            if secs == 0 {
                return Err(FinError::validation("FINTRACK_SESSION_TTL must be positive"));
            }
            config.session_ttl = Duration::from_secs(secs);
        }

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_apply_when_nothing_is_set() {
        let config = Config::from_lookup(|_| None).unwrap();
        assert_eq!(config.addr.port(), 3000);
        assert_eq!(config.data_dir, PathBuf::from("database"));
        assert_eq!(config.session_ttl, Duration::from_secs(3600));
    }

    #[test]
    fn overrides_are_parsed() {
        let config = Config::from_lookup(lookup(&[
            ("FINTRACK_ADDR", "0.0.0.0:8080"),
            ("FINTRACK_DATA_DIR", "/var/lib/fintrack"),
            ("FINTRACK_SESSION_TTL", "120"),
        ]))
        .unwrap();
        assert_eq!(config.addr.port(), 8080);
        assert_eq!(config.data_dir, PathBuf::from("/var/lib/fintrack"));
        assert_eq!(config.session_ttl, Duration::from_secs(120));
    }

    #[test]
    fn bad_values_are_rejected() {
        assert!(Config::from_lookup(lookup(&[("FINTRACK_ADDR", "nowhere")])).is_err());
        assert!(Config::from_lookup(lookup(&[("FINTRACK_SESSION_TTL", "soon")])).is_err());
        assert!(Config::from_lookup(lookup(&[("FINTRACK_SESSION_TTL", "0")])).is_err());
    }
}
