//! Client runtime configuration.
//!
//! Everything comes from the environment. `from_lookup` takes any key lookup
//! so tests can feed values without touching the process environment.

use std::collections::HashMap;
use std::env;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::session::FileSessionStore;
use crate::sync::{LoginMergePolicy, SyncConfig};
use crate::util::{is_http_url, normalize_text_option};

const DEFAULT_API_BASE_URL: &str = "http://127.0.0.1:8080";

#[derive(Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// OAuth client id the identity widget is configured with
    pub google_client_id: String,
    pub api_base_url: String,
    /// Overrides the platform data directory for the session record
    pub session_path: Option<PathBuf>,
    pub push_debounce: Duration,
    pub retry_base: Duration,
    pub retry_max: Duration,
    pub login_merge_policy: LoginMergePolicy,
}

impl fmt::Debug for ClientConfig {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("ClientConfig")
            .field("google_client_id", &"[REDACTED]")
            .field("api_base_url", &self.api_base_url)
            .field("session_path", &self.session_path)
            .field("push_debounce", &self.push_debounce)
            .field("retry_base", &self.retry_base)
            .field("retry_max", &self.retry_max)
            .field("login_merge_policy", &self.login_merge_policy)
            .finish()
    }
}

impl ClientConfig {
    pub fn from_env() -> Result<Self> {
        let values: HashMap<String, String> = env::vars().collect();
        Self::from_lookup(|name| values.get(name).cloned())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let google_client_id = optional_trimmed(&lookup, "REEL_GOOGLE_CLIENT_ID").ok_or_else(
            || Error::Config("Missing required environment variable: REEL_GOOGLE_CLIENT_ID".into()),
        )?;

        let api_base_url = optional_trimmed(&lookup, "REEL_API_BASE_URL")
            .unwrap_or_else(|| DEFAULT_API_BASE_URL.to_string());
        if !is_http_url(&api_base_url) {
            return Err(Error::Config(
                "REEL_API_BASE_URL must start with http:// or https://".to_string(),
            ));
        }
        let api_base_url = api_base_url.trim_end_matches('/').to_string();

        let session_path = optional_trimmed(&lookup, "REEL_SESSION_PATH").map(PathBuf::from);

        let push_debounce_ms = millis_in_range(&lookup, "REEL_PUSH_DEBOUNCE_MS", 300, 0, 10_000)?;
        let retry_base_ms = millis_in_range(&lookup, "REEL_RETRY_BASE_MS", 1_000, 50, 60_000)?;
        let retry_max_ms =
            millis_in_range(&lookup, "REEL_RETRY_MAX_MS", 60_000, retry_base_ms, 3_600_000)?;

        let login_merge_policy = match optional_trimmed(&lookup, "REEL_LOGIN_MERGE_POLICY") {
            Some(value) => value
                .parse::<LoginMergePolicy>()
                .map_err(|error| Error::Config(format!("REEL_LOGIN_MERGE_POLICY: {error}")))?,
            None => LoginMergePolicy::default(),
        };

        Ok(Self {
            google_client_id,
            api_base_url,
            session_path,
            push_debounce: Duration::from_millis(push_debounce_ms),
            retry_base: Duration::from_millis(retry_base_ms),
            retry_max: Duration::from_millis(retry_max_ms),
            login_merge_policy,
        })
    }

    pub const fn sync_config(&self) -> SyncConfig {
        SyncConfig {
            push_debounce: self.push_debounce,
            retry_base: self.retry_base,
            retry_max: self.retry_max,
            login_merge_policy: self.login_merge_policy,
        }
    }

    /// File store for the `login` record, at `REEL_SESSION_PATH` or the
    /// platform data directory.
    pub fn session_store(&self) -> Result<FileSessionStore> {
        match &self.session_path {
            Some(path) => Ok(FileSessionStore::new(path.clone())),
            None => Ok(FileSessionStore::at_default_location()?),
        }
    }
}

fn millis_in_range(
    lookup: impl Fn(&str) -> Option<String>,
    name: &str,
    default: u64,
    min: u64,
    max: u64,
) -> Result<u64> {
    let Some(raw) = optional_trimmed(lookup, name) else {
        return Ok(default);
    };
    let value = raw.parse::<u64>().map_err(|_| {
        Error::Config(format!("{name} must be an integer in [{min}, {max}]"))
    })?;
    if !(min..=max).contains(&value) {
        return Err(Error::Config(format!("{name} must be in [{min}, {max}]")));
    }
    Ok(value)
}

fn optional_trimmed(lookup: impl Fn(&str) -> Option<String>, name: &str) -> Option<String> {
    normalize_text_option(lookup(name))
}
