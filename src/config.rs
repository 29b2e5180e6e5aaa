//! Application-level configuration: tunables from a JSON file, secrets from the environment.

use std::{env, fs, io::ErrorKind, path::PathBuf, time::Duration};

use serde::Deserialize;
use serde_with::{DurationMilliSeconds, DurationSeconds, serde_as};
use tracing::{info, warn};

/// Default location on disk where the server looks for the JSON configuration.
const DEFAULT_CONFIG_PATH: &str = "config/app.json";
/// Environment variable that overrides [`DEFAULT_CONFIG_PATH`].
const CONFIG_PATH_ENV: &str = "SCORE_RELAY_CONFIG_PATH";

const CLIENT_ID_ENV: &str = "RATING_API_CLIENT_ID";
const CLIENT_SECRET_ENV: &str = "RATING_API_CLIENT_SECRET";
const CLUB_ID_ENV: &str = "RATING_API_CLUB_ID";
const ADMIN_TOKEN_ENV: &str = "ADMIN_TOKEN";

/// Immutable runtime configuration shared across the application.
#[derive(Debug, Clone, Default)]
pub struct AppConfig {
    pub submission: SubmissionConfig,
    pub rating_sync: RatingSyncConfig,
    pub rating_api: RatingApiConfig,
    pub credentials: RatingCredentials,
    /// Token expected in `x-admin-token` for diagnostic endpoints.
    pub admin_token: Option<String>,
}

/// Tunables of the submission pipeline.
#[serde_as]
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SubmissionConfig {
    /// Courtesy pause between successive match submissions.
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub delay_between_calls: Duration,
    /// Attempts after which a batch is left for manual intervention.
    pub max_retries: u32,
    /// Wait before retry `n` is `backoff[n - 1]`, the last entry repeating.
    #[serde_as(as = "Vec<DurationSeconds<u64>>")]
    pub backoff: Vec<Duration>,
    /// Below this no game is considered a plausible result; advisory only.
    pub min_game_score: u32,
    #[serde_as(as = "DurationSeconds<u64>")]
    pub queue_interval: Duration,
    #[serde_as(as = "DurationSeconds<u64>")]
    pub correction_interval: Duration,
}

impl Default for SubmissionConfig {
    fn default() -> Self {
        Self {
            delay_between_calls: Duration::from_millis(500),
            max_retries: 3,
            backoff: vec![
                Duration::from_secs(60),
                Duration::from_secs(120),
                Duration::from_secs(180),
            ],
            min_game_score: 6,
            queue_interval: Duration::from_secs(60),
            correction_interval: Duration::from_secs(3_600),
        }
    }
}

impl SubmissionConfig {
    /// Delay before retry number `attempt`, counted from 1.
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let index = (attempt as usize).saturating_sub(1);
        self.backoff
            .get(index)
            .or_else(|| self.backoff.last())
            .copied()
            .unwrap_or(Duration::from_secs(60))
    }
}

/// Tunables of the rating refresh jobs.
#[serde_as]
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RatingSyncConfig {
    #[serde_as(as = "DurationSeconds<u64>")]
    pub interval: Duration,
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub delay_between_fetches: Duration,
    /// Minimum time between two manual refreshes of one profile.
    #[serde_as(as = "DurationSeconds<u64>")]
    pub manual_refresh_cooldown: Duration,
}

impl Default for RatingSyncConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(24 * 3_600),
            delay_between_fetches: Duration::from_millis(250),
            manual_refresh_cooldown: Duration::from_secs(60),
        }
    }
}

/// Rating service endpoint settings.
#[serde_as]
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RatingApiConfig {
    pub base_url: String,
    #[serde_as(as = "DurationSeconds<u64>")]
    pub request_timeout: Duration,
    #[serde_as(as = "DurationSeconds<u64>")]
    pub token_timeout: Duration,
}

impl Default for RatingApiConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.ratings.example".into(),
            request_timeout: Duration::from_secs(15),
            token_timeout: Duration::from_secs(10),
        }
    }
}

/// Secrets read from the environment only.
#[derive(Clone, Default)]
pub struct RatingCredentials {
    pub client_id: String,
    pub client_secret: String,
    /// Club scope; its presence switches submissions to club mode.
    pub club_id: Option<String>,
}

impl std::fmt::Debug for RatingCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RatingCredentials")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("club_id", &self.club_id)
            .finish()
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
/// JSON representation of the configuration file located at [`DEFAULT_CONFIG_PATH`].
struct RawConfig {
    submission: SubmissionConfig,
    rating_sync: RatingSyncConfig,
    rating_api: RatingApiConfig,
}

impl AppConfig {
    /// Load tunables from disk (falling back to defaults) and secrets from the environment.
    pub fn load() -> Self {
        let raw = load_raw_config();
        Self {
            submission: raw.submission,
            rating_sync: raw.rating_sync,
            rating_api: raw.rating_api,
            credentials: RatingCredentials {
                client_id: env_value(CLIENT_ID_ENV).unwrap_or_default(),
                client_secret: env_value(CLIENT_SECRET_ENV).unwrap_or_default(),
                club_id: env_value(CLUB_ID_ENV),
            },
            admin_token: env_value(ADMIN_TOKEN_ENV),
        }
    }
}

fn load_raw_config() -> RawConfig {
    let path = resolve_config_path();
    match fs::read_to_string(&path) {
        Ok(contents) => match serde_json::from_str::<RawConfig>(&contents) {
            Ok(raw) => {
                info!(path = %path.display(), "loaded configuration file");
                raw
            }
            Err(err) => {
                warn!(
                    path = %path.display(),
                    error = %err,
                    "failed to parse config; falling back to defaults"
                );
                RawConfig::default()
            }
        },
        Err(err) if err.kind() == ErrorKind::NotFound => {
            info!(
                path = %path.display(),
                "config file not found; using built-in defaults"
            );
            RawConfig::default()
        }
        Err(err) => {
            warn!(
                path = %path.display(),
                error = %err,
                "failed to read config; falling back to defaults"
            );
            RawConfig::default()
        }
    }
}

/// Resolve the configuration path taking the environment override into account.
fn resolve_config_path() -> PathBuf {
    env::var_os(CONFIG_PATH_ENV)
        .map(PathBuf::from)
        .filter(|path| !path.as_os_str().is_empty())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}

fn env_value(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_owned())
        .filter(|value| !value.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_file_keeps_defaults() {
        let raw: RawConfig = serde_json::from_str(
            r#"{ "submission": { "max_retries": 5, "backoff": [30, 90] } }"#,
        )
        .unwrap();
        assert_eq!(raw.submission.max_retries, 5);
        assert_eq!(raw.submission.min_game_score, 6);
        assert_eq!(raw.submission.backoff_for(1), Duration::from_secs(30));
        assert_eq!(raw.submission.backoff_for(4), Duration::from_secs(90));
        assert_eq!(raw.rating_sync.manual_refresh_cooldown, Duration::from_secs(60));
    }

    #[test]
    fn default_backoff_escalates() {
        let config = SubmissionConfig::default();
        assert_eq!(config.backoff_for(1), Duration::from_secs(60));
        assert_eq!(config.backoff_for(2), Duration::from_secs(120));
        assert_eq!(config.backoff_for(3), Duration::from_secs(180));
    }
}
