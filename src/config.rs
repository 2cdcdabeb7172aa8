use std::env;
use std::time::Duration;

pub const DATABASE_PATH_VAR: &str = "BOOKS_DATABASE_PATH";
pub const CACHE_TTL_VAR: &str = "BOOKS_CACHE_TTL_SECS";
pub const CACHE_CAPACITY_VAR: &str = "BOOKS_CACHE_CAPACITY";

/// Entries the in-process cache keeps before evicting the least recently used.
pub const DEFAULT_CACHE_CAPACITY: usize = 1024;

const DEFAULT_DATABASE_PATH: &str = "books.db";
const DEFAULT_CACHE_TTL_SECS: u64 = 3600;

/// Runtime settings read from the environment. The site address comes from
/// the Leptos configuration instead.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub database_path: String,
    pub cache_ttl: Duration,
    pub cache_capacity: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database_path: DEFAULT_DATABASE_PATH.to_string(),
            cache_ttl: Duration::from_secs(DEFAULT_CACHE_TTL_SECS),
            cache_capacity: DEFAULT_CACHE_CAPACITY,
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    // Unparseable or empty values fall back to the defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let database_path = lookup(DATABASE_PATH_VAR)
            .filter(|p| !p.trim().is_empty())
            .unwrap_or(defaults.database_path);
        let cache_ttl = lookup(CACHE_TTL_VAR)
            .and_then(|v| v.trim().parse::<u64>().ok())
            .map(Duration::from_secs)
            .unwrap_or(defaults.cache_ttl);
        let cache_capacity = lookup(CACHE_CAPACITY_VAR)
            .and_then(|v| v.trim().parse::<usize>().ok())
            .filter(|&n| n > 0)
            .unwrap_or(defaults.cache_capacity);
        Self {
            database_path,
            cache_ttl,
            cache_capacity,
        }
    }
}
