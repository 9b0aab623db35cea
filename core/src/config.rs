//! Process configuration, resolved once at startup and handed to each
//! component through its constructor.

use std::time::Duration;

use crate::error::{Error, Result};

pub const DEFAULT_ASSISTANT_ID: &str = "asst_fFMc7RSnZ9GboO9x0a2iEsRz";
pub const DEFAULT_PORT: u16 = 3001;
pub const DEFAULT_SCRYFALL_URL: &str = "https://api.scryfall.com";
pub const DEFAULT_MOXFIELD_URL: &str = "https://api2.moxfield.com";

/// How the job runner waits on an assistant run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub interval: Duration,
    pub max_attempts: u32,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(2000),
            max_attempts: 150,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    /// Bearer credential for the assistant API. `None` disables the assistant.
    pub openai_api_key: Option<String>,
    pub openai_api_base: Option<String>,
    pub assistant_id: String,
    pub port: u16,
    pub poll: PollPolicy,
    pub scryfall_url: String,
    pub moxfield_url: String,
    /// Max in-flight card lookups while verifying a deck list.
    pub verify_concurrency: usize,
}

impl Config {
    /// Load `.env` (if any) and read the process environment.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a config from an arbitrary key lookup. Blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let defaults = PollPolicy::default();
        let poll = PollPolicy {
            interval: match get("POLL_INTERVAL_MS") {
                Some(raw) => Duration::from_millis(parse_number("POLL_INTERVAL_MS", &raw)?),
                None => defaults.interval,
            },
            max_attempts: match get("POLL_MAX_ATTEMPTS") {
                Some(raw) => parse_number("POLL_MAX_ATTEMPTS", &raw)?,
                None => defaults.max_attempts,
            },
        };

        let port = match get("PORT") {
            Some(raw) => parse_number("PORT", &raw)?,
            None => DEFAULT_PORT,
        };

        let verify_concurrency = match get("VERIFY_CONCURRENCY") {
            Some(raw) => parse_number::<usize>("VERIFY_CONCURRENCY", &raw)?.max(1),
            None => 4,
        };

        Ok(Self {
            openai_api_key: get("OPENAI_API_KEY"),
            openai_api_base: get("OPENAI_API_BASE"),
            assistant_id: get("ASSISTANT_ID").unwrap_or_else(|| DEFAULT_ASSISTANT_ID.to_string()),
            port,
            poll,
            scryfall_url: get("SCRYFALL_API_URL").unwrap_or_else(|| DEFAULT_SCRYFALL_URL.to_string()),
            moxfield_url: get("MOXFIELD_API_URL").unwrap_or_else(|| DEFAULT_MOXFIELD_URL.to_string()),
            verify_concurrency,
        })
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, raw: &str) -> Result<T> {
    raw.parse()
        .map_err(|_| Error::Configuration(format!("{key} must be a number, got '{raw}'")))
}
