use std::path::PathBuf;
use std::str::FromStr;

/// Server settings, read once at startup from `VENUEBOOK_*` environment variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub port: u16,
    pub bind: String,
    pub data_dir: PathBuf,
    pub password: String,
    pub max_connections: usize,
    pub compact_threshold: u64,
    pub metrics_port: Option<u16>,
    pub debug: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 5433,
            bind: "127.0.0.1".into(),
            data_dir: PathBuf::from("./data"),
            password: "venuebook".into(),
            max_connections: 16,
            compact_threshold: 1000,
            metrics_port: None,
            debug: false,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup. Unparseable values fall back to the default.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        fn parse<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
            lookup(key).and_then(|s| s.trim().parse().ok())
        }
        let defaults = Self::default();
        Self {
            port: parse(&lookup, "VENUEBOOK_PORT").unwrap_or(defaults.port),
            bind: lookup("VENUEBOOK_BIND").unwrap_or(defaults.bind),
            data_dir: lookup("VENUEBOOK_DATA_DIR").map(PathBuf::from).unwrap_or(defaults.data_dir),
            password: lookup("VENUEBOOK_PASSWORD").unwrap_or(defaults.password),
            max_connections: parse(&lookup, "VENUEBOOK_MAX_CONNECTIONS")
                .filter(|&n: &usize| n > 0)
                .unwrap_or(defaults.max_connections),
            compact_threshold: parse(&lookup, "VENUEBOOK_COMPACT_THRESHOLD").unwrap_or(defaults.compact_threshold),
            metrics_port: parse(&lookup, "VENUEBOOK_METRICS_PORT"),
            debug: lookup("VENUEBOOK_DEBUG").is_some_and(|v| matches!(v.as_str(), "1" | "true" | "yes")),
        }
    }

    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.bind, self.port)
    }

    pub fn wal_path(&self) -> PathBuf {
        self.data_dir.join("venuebook.wal")
    }
}
