use clap::Parser;

use crate::{messenger::MessengerOptions, store::DEFAULT_CACHED_CHATS};

/// Real-time chat delivery server
#[derive(Parser, Clone, Debug)]
#[command(name = "chatwire", version, about = "Real-time chat delivery server")]
pub struct Config {
    /// Bind address
    #[arg(long, env = "CHATWIRE_BIND_ADDRESS", default_value = "0.0.0.0")]
    pub bind_address: String,

    /// Port to listen on
    #[arg(long, env = "CHATWIRE_PORT", default_value = "8080")]
    pub port: u16,

    /// SQLite database URL
    #[arg(long, env = "DATABASE_URL", default_value = "sqlite://chatwire.db?mode=rwc")]
    pub database_url: String,

    /// Size of the database connection pool
    #[arg(long, env = "CHATWIRE_MAX_CONNECTIONS", default_value = "16")]
    pub max_connections: u32,

    /// Frames buffered per socket before further broadcasts to it are dropped
    #[arg(long, env = "CHATWIRE_OUTBOX_CAPACITY", default_value = "64")]
    pub outbox_capacity: usize,

    /// Cap on concurrent summary fetches per chat listing (unbounded when unset)
    #[arg(long, env = "CHATWIRE_SUMMARY_FANOUT_LIMIT")]
    pub summary_fanout_limit: Option<usize>,

    /// Serve chat history through an in-process read-through cache
    #[arg(long, env = "CHATWIRE_MESSAGE_CACHE")]
    pub message_cache: bool,

    /// Most chats whose history the cache keeps at once
    #[arg(long, env = "CHATWIRE_MESSAGE_CACHE_CHATS", default_value_t = DEFAULT_CACHED_CHATS)]
    pub message_cache_chats: u64,

    /// Enable structured JSON logging
    #[arg(long, env = "CHATWIRE_JSON_LOGS")]
    pub json_logs: bool,
}

impl Config {
    /// Load `.env` if present, then parse flags and environment.
    pub fn load() -> Self {
        dotenv::dotenv().ok();
        Self::parse()
    }

    pub fn listen_address(&self) -> String {
        format!("{}:{}", self.bind_address, self.port)
    }

    pub fn messenger_options(&self) -> MessengerOptions {
        MessengerOptions {
            outbox_capacity: self.outbox_capacity,
            summary_fanout_limit: self.summary_fanout_limit,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_without_flags() {
        let config = Config::try_parse_from(["chatwire"]).unwrap();
        assert_eq!(config.port, 8080);
        assert_eq!(config.listen_address(), "0.0.0.0:8080");
        assert_eq!(config.messenger_options().outbox_capacity, 64);
        assert_eq!(config.messenger_options().summary_fanout_limit, None);
        assert!(!config.message_cache);
        assert_eq!(config.message_cache_chats, DEFAULT_CACHED_CHATS);
    }

    #[test]
    fn flags_override_defaults() {
        let config = Config::try_parse_from([
            "chatwire",
            "--port",
            "9000",
            "--summary-fanout-limit",
            "4",
            "--message-cache",
        ])
        .unwrap();
        assert_eq!(config.port, 9000);
        assert_eq!(config.summary_fanout_limit, Some(4));
        assert!(config.message_cache);
    }
}
