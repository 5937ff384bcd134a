//! Service configuration from the environment

use crate::dispatch::RetryPolicy;
use crate::llm::LlmConfig;
use crate::poll::PollConfig;
use crate::sequence::DEFAULT_LOCK_TIMEOUT;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

const DEFAULT_PORT: u16 = 8000;
const DEFAULT_WORKERS: usize = 2;
const DEFAULT_QUEUE_CAPACITY: usize = 256;

#[derive(Debug, Clone)]
pub struct Config {
    pub db_path: PathBuf,
    /// JSON seed applied at startup
    pub seed_file: Option<PathBuf>,
    pub port: u16,
    pub workers: usize,
    pub queue_capacity: usize,
    pub retry: RetryPolicy,
    pub lock_timeout: Duration,
    pub poll: PollConfig,
    pub llm: LlmConfig,
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |key: &str, default| parse_or(&lookup, key, default);

        let db_path = lookup("CHAT_RELAY_DB_PATH").map_or_else(
            || {
                let home = lookup("HOME").unwrap_or_else(|| "/tmp".to_string());
                PathBuf::from(home).join(".chat-relay").join("chat.db")
            },
            PathBuf::from,
        );

        let retry_defaults = RetryPolicy::default();
        let poll_defaults = PollConfig::default();

        let min_timeout = Duration::from_secs(get("CHAT_RELAY_POLL_MIN_SECS", poll_defaults.min_timeout.as_secs()));
        let max_timeout = Duration::from_secs(get("CHAT_RELAY_POLL_MAX_SECS", poll_defaults.max_timeout.as_secs()))
            .max(min_timeout);

        Self {
            db_path,
            seed_file: lookup("CHAT_RELAY_SEED_FILE").map(PathBuf::from),
            port: parse_or(&lookup, "CHAT_RELAY_PORT", DEFAULT_PORT),
            workers: parse_or(&lookup, "CHAT_RELAY_WORKERS", DEFAULT_WORKERS).max(1),
            queue_capacity: parse_or(&lookup, "CHAT_RELAY_QUEUE_CAPACITY", DEFAULT_QUEUE_CAPACITY).max(1),
            retry: RetryPolicy {
                max_attempts: parse_or(&lookup, "CHAT_RELAY_REPLY_ATTEMPTS", retry_defaults.max_attempts).max(1),
                backoff: Duration::from_secs(get("CHAT_RELAY_REPLY_BACKOFF_SECS", retry_defaults.backoff.as_secs())),
            },
            lock_timeout: Duration::from_millis(get(
                "CHAT_RELAY_LOCK_TIMEOUT_MS",
                u64::try_from(DEFAULT_LOCK_TIMEOUT.as_millis()).unwrap_or(2000),
            )),
            poll: PollConfig {
                interval: Duration::from_millis(get(
                    "CHAT_RELAY_POLL_INTERVAL_MS",
                    u64::try_from(poll_defaults.interval.as_millis()).unwrap_or(1000),
                ))
                .max(Duration::from_millis(1)),
                min_timeout,
                max_timeout,
            },
            llm: LlmConfig {
                anthropic_api_key: lookup("ANTHROPIC_API_KEY"),
                gateway: lookup("LLM_GATEWAY"),
                default_model: lookup("DEFAULT_MODEL"),
            },
        }
    }
}

fn parse_or<T: FromStr + Copy>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T {
    match lookup(key) {
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            tracing::warn!(key, value = %raw, "Ignoring unparseable setting");
            default
        }),
        None => default,
    }
}
