//! # Server Configuration Module
//!
//! Tunables for framing limits and the connection worker pool.
//!
//! ## Environment Variables
//!
//! | Variable | Meaning | Default |
//! |---|---|---|
//! | `RAWROUTE_HEADER_LIMIT` | Bytes buffered for the request line + headers | `4096` |
//! | `RAWROUTE_BODY_LIMIT` | Largest accepted `Content-Length` | `10485760` (10 MiB) |
//! | `RAWROUTE_WORKERS` | Worker coroutines serving connections | `64` |
//! | `RAWROUTE_QUEUE_MODE` | `unbounded` or `shed` | `unbounded` |
//! | `RAWROUTE_QUEUE_BOUND` | Waiting connections before shedding | `1024` |
//! | `RAWROUTE_STACK_SIZE` | Worker coroutine stack, decimal or `0x` hex | `0x10000` |
//!
//! Unparseable values are ignored and the default is kept.
//!
//! ```rust
//! use rawroute::config::ServerConfig;
//!
//! let config = ServerConfig::from_env();
//! assert!(config.workers >= 1);
//! ```

use std::env;

/// Default size of the header buffer in bytes.
pub const DEFAULT_HEADER_LIMIT: usize = 4096;
/// Default request body limit (10 MiB).
pub const DEFAULT_BODY_LIMIT: u64 = 10 * 1024 * 1024;
/// Default number of worker coroutines.
pub const DEFAULT_WORKERS: usize = 64;
/// Default queue depth at which `QueueMode::Shed` starts rejecting.
pub const DEFAULT_QUEUE_BOUND: usize = 1024;
/// Default worker coroutine stack size (64 KB).
pub const DEFAULT_STACK_SIZE: usize = 0x10000;

/// What the acceptor does when every worker is busy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QueueMode {
    /// Keep accepting and queue connections without limit.
    #[default]
    Unbounded,
    /// Answer with a fixed 503 once `queue_bound` connections are waiting.
    Shed,
}

impl QueueMode {
    /// Parse queue mode from string (case-insensitive)
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "unbounded" => Some(Self::Unbounded),
            "shed" => Some(Self::Shed),
            _ => None,
        }
    }
}

/// Limits and pool sizing for an [`HttpServer`](crate::server::HttpServer).
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Capacity of the head buffer; the request line and headers must fit in it
    pub header_limit: usize,
    /// Largest `Content-Length` accepted
    pub body_limit: u64,
    /// Number of worker coroutines
    pub workers: usize,
    /// Queue policy in front of the workers
    pub queue_mode: QueueMode,
    /// Waiting connections tolerated in `QueueMode::Shed`
    pub queue_bound: usize,
    /// Stack size for worker coroutines in bytes
    pub stack_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            header_limit: DEFAULT_HEADER_LIMIT,
            body_limit: DEFAULT_BODY_LIMIT,
            workers: DEFAULT_WORKERS,
            queue_mode: QueueMode::Unbounded,
            queue_bound: DEFAULT_QUEUE_BOUND,
            stack_size: DEFAULT_STACK_SIZE,
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables, falling back to defaults.
    #[must_use]
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let header_limit = env_parse("RAWROUTE_HEADER_LIMIT").unwrap_or(defaults.header_limit);
        let body_limit = env_parse("RAWROUTE_BODY_LIMIT").unwrap_or(defaults.body_limit);
        let workers = env_parse("RAWROUTE_WORKERS").unwrap_or(defaults.workers);
        let queue_mode = env::var("RAWROUTE_QUEUE_MODE")
            .ok()
            .and_then(|s| QueueMode::parse(&s))
            .unwrap_or_default();
        let queue_bound = env_parse("RAWROUTE_QUEUE_BOUND").unwrap_or(defaults.queue_bound);
        let stack_size = env::var("RAWROUTE_STACK_SIZE")
            .ok()
            .and_then(|s| parse_size(&s))
            .unwrap_or(defaults.stack_size);

        Self {
            header_limit,
            body_limit,
            workers,
            queue_mode,
            queue_bound,
            stack_size,
        }
        .normalized()
    }

    /// Clamp values that would make the server unusable.
    #[must_use]
    pub fn normalized(mut self) -> Self {
        self.workers = self.workers.max(1);
        // the request line needs at least "X / Y\r\n\r\n"
        self.header_limit = self.header_limit.max(16);
        self
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    env::var(name).ok().and_then(|s| s.trim().parse().ok())
}

/// Parse a size given either in decimal or as `0x`-prefixed hex.
#[must_use]
pub fn parse_size(s: &str) -> Option<usize> {
    let s = s.trim();
    if let Some(hex) = s.strip_prefix("0x") {
        usize::from_str_radix(hex, 16).ok()
    } else {
        s.parse().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    // from_env reads process-wide state
    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    const VARS: [&str; 6] = [
        "RAWROUTE_HEADER_LIMIT",
        "RAWROUTE_BODY_LIMIT",
        "RAWROUTE_WORKERS",
        "RAWROUTE_QUEUE_MODE",
        "RAWROUTE_QUEUE_BOUND",
        "RAWROUTE_STACK_SIZE",
    ];

    fn clear_env() {
        for var in VARS {
            env::remove_var(var);
        }
    }

    #[test]
    fn test_defaults() {
        let config = ServerConfig::default();
        assert_eq!(config.header_limit, 4096);
        assert_eq!(config.body_limit, 10 * 1024 * 1024);
        assert_eq!(config.workers, 64);
        assert_eq!(config.queue_mode, QueueMode::Unbounded);
    }

    #[test]
    fn test_from_env_overrides() {
        let _guard = ENV_MUTEX.lock().unwrap();
        clear_env();
        env::set_var("RAWROUTE_HEADER_LIMIT", "8192");
        env::set_var("RAWROUTE_BODY_LIMIT", "1024");
        env::set_var("RAWROUTE_WORKERS", "8");
        env::set_var("RAWROUTE_QUEUE_MODE", "SHED");
        env::set_var("RAWROUTE_QUEUE_BOUND", "16");
        env::set_var("RAWROUTE_STACK_SIZE", "0x8000");

        let config = ServerConfig::from_env();
        clear_env();

        assert_eq!(config.header_limit, 8192);
        assert_eq!(config.body_limit, 1024);
        assert_eq!(config.workers, 8);
        assert_eq!(config.queue_mode, QueueMode::Shed);
        assert_eq!(config.queue_bound, 16);
        assert_eq!(config.stack_size, 0x8000);
    }

    #[test]
    fn test_from_env_ignores_garbage() {
        let _guard = ENV_MUTEX.lock().unwrap();
        clear_env();
        env::set_var("RAWROUTE_WORKERS", "lots");
        env::set_var("RAWROUTE_QUEUE_MODE", "sometimes");

        let config = ServerConfig::from_env();
        clear_env();

        assert_eq!(config.workers, DEFAULT_WORKERS);
        assert_eq!(config.queue_mode, QueueMode::Unbounded);
    }

    #[test]
    fn test_zero_workers_clamped() {
        let config = ServerConfig {
            workers: 0,
            ..ServerConfig::default()
        }
        .normalized();
        assert_eq!(config.workers, 1);
    }

    #[test]
    fn test_parse_size() {
        assert_eq!(parse_size("16384"), Some(16384));
        assert_eq!(parse_size("0x4000"), Some(0x4000));
        assert_eq!(parse_size("0xzz"), None);
    }
}
