//! Tunables for both gates.
//!
//! Durations are plain second counts so the structures deserialize from any
//! serde format without helper crates.

use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::routes::RoutePolicy;

/// Prefix of every environment variable read by [`GateConfig::from_env`].
pub const ENV_PREFIX: &str = "TOLLGATE_";

/// Sliding-window admission control settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Requests a client may make within one window.
    pub max_requests_per_window: u32,
    /// Length of the trailing window.
    pub window_secs: u64,
    /// Width of a counting bucket.  Must be smaller than the window.
    pub bucket_granularity_secs: u64,
    /// A client's counters are dropped after this long without a request.
    pub client_idle_timeout_secs: u64,
    /// Upper bound on clients tracked at once.
    pub max_tracked_clients: usize,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests_per_window: 5,
            window_secs: 5 * 60,
            bucket_granularity_secs: 60,
            client_idle_timeout_secs: 5 * 60,
            max_tracked_clients: 500,
        }
    }
}

impl RateLimitConfig {
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }

    pub fn bucket_granularity(&self) -> Duration {
        Duration::from_secs(self.bucket_granularity_secs)
    }

    pub fn client_idle_timeout(&self) -> Duration {
        Duration::from_secs(self.client_idle_timeout_secs)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        nonzero("max_requests_per_window", self.max_requests_per_window as u64)?;
        nonzero("window_secs", self.window_secs)?;
        nonzero("bucket_granularity_secs", self.bucket_granularity_secs)?;
        nonzero("client_idle_timeout_secs", self.client_idle_timeout_secs)?;
        nonzero("max_tracked_clients", self.max_tracked_clients as u64)?;
        fits_millis("window_secs", self.window_secs)?;
        fits_millis("bucket_granularity_secs", self.bucket_granularity_secs)?;
        if self.bucket_granularity_secs >= self.window_secs {
            return Err(ConfigError::BucketNotFinerThanWindow {
                granularity_secs: self.bucket_granularity_secs,
                window_secs: self.window_secs,
            });
        }
        Ok(())
    }
}

/// Authentication cache settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CredentialCacheConfig {
    /// Fixed lifetime of a cached credential, counted from when it was cached.
    pub ttl_secs: u64,
    /// Upper bound on cached principals.
    pub max_entries: usize,
}

impl Default for CredentialCacheConfig {
    fn default() -> Self {
        Self {
            ttl_secs: 24 * 60 * 60,
            max_entries: 200,
        }
    }
}

impl CredentialCacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        nonzero("ttl_secs", self.ttl_secs)?;
        nonzero("max_entries", self.max_entries as u64)
    }
}

/// Everything a [`Gatekeeper`](crate::Gatekeeper) needs.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GateConfig {
    pub rate_limit: RateLimitConfig,
    pub credentials: CredentialCacheConfig,
    pub routes: RoutePolicy,
}

impl GateConfig {
    /// Defaults overlaid with `TOLLGATE_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Defaults overlaid with values from `lookup`, which receives the full
    /// variable name (e.g. `TOLLGATE_WINDOW_SECS`).
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        let rl = &mut config.rate_limit;
        overlay(&lookup, "MAX_REQUESTS_PER_WINDOW", &mut rl.max_requests_per_window)?;
        overlay(&lookup, "WINDOW_SECS", &mut rl.window_secs)?;
        overlay(&lookup, "BUCKET_SECS", &mut rl.bucket_granularity_secs)?;
        overlay(&lookup, "CLIENT_IDLE_SECS", &mut rl.client_idle_timeout_secs)?;
        overlay(&lookup, "MAX_TRACKED_CLIENTS", &mut rl.max_tracked_clients)?;

        let creds = &mut config.credentials;
        overlay(&lookup, "CREDENTIAL_TTL_SECS", &mut creds.ttl_secs)?;
        overlay(&lookup, "CREDENTIAL_CACHE_SIZE", &mut creds.max_entries)?;

        if let Some(raw) = lookup(&format!("{ENV_PREFIX}RATE_LIMITED_ROUTES")) {
            config.routes.rate_limited = raw
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect();
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.rate_limit.validate()?;
        self.credentials.validate()
    }
}

fn fits_millis(field: &'static str, secs: u64) -> Result<(), ConfigError> {
    match secs.checked_mul(1000) {
        Some(_) => Ok(()),
        None => Err(ConfigError::TooLarge { field }),
    }
}

fn nonzero(field: &'static str, value: u64) -> Result<(), ConfigError> {
    if value == 0 {
        Err(ConfigError::Zero { field })
    } else {
        Ok(())
    }
}

fn overlay<F, T>(lookup: &F, suffix: &str, slot: &mut T) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    let var = format!("{ENV_PREFIX}{suffix}");
    if let Some(raw) = lookup(&var) {
        *slot = raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidEnv { var, value: raw })?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn defaults_are_valid() {
        assert!(GateConfig::default().validate().is_ok());
    }

    #[test]
    fn env_overrides_defaults() {
        let config = GateConfig::from_lookup(lookup_from(&[
            ("TOLLGATE_MAX_REQUESTS_PER_WINDOW", "4"),
            ("TOLLGATE_WINDOW_SECS", "180"),
            ("TOLLGATE_CREDENTIAL_TTL_SECS", " 600 "),
            ("TOLLGATE_RATE_LIMITED_ROUTES", "/a/, ,/b/"),
        ]))
        .unwrap();

        assert_eq!(config.rate_limit.max_requests_per_window, 4);
        assert_eq!(config.rate_limit.window(), Duration::from_secs(180));
        assert_eq!(config.credentials.ttl(), Duration::from_secs(600));
        assert_eq!(config.routes.rate_limited, vec!["/a/", "/b/"]);
    }

    #[test]
    fn unparsable_env_value_is_reported() {
        let err = GateConfig::from_lookup(lookup_from(&[("TOLLGATE_WINDOW_SECS", "five")]))
            .unwrap_err();
        assert_eq!(
            err,
            ConfigError::InvalidEnv {
                var: "TOLLGATE_WINDOW_SECS".into(),
                value: "five".into()
            }
        );
    }

    #[test]
    fn bucket_must_be_finer_than_window() {
        let config = RateLimitConfig {
            window_secs: 60,
            bucket_granularity_secs: 60,
            ..RateLimitConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::BucketNotFinerThanWindow { .. })
        ));
    }

    #[test]
    fn second_counts_must_fit_in_milliseconds() {
        let config = RateLimitConfig {
            window_secs: u64::MAX,
            bucket_granularity_secs: u64::MAX / 100,
            ..RateLimitConfig::default()
        };
        assert_eq!(
            config.validate(),
            Err(ConfigError::TooLarge {
                field: "window_secs"
            })
        );

        let config = RateLimitConfig {
            window_secs: u64::MAX / 1000,
            bucket_granularity_secs: 60,
            ..RateLimitConfig::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn zero_limit_is_rejected() {
        let config = RateLimitConfig {
            max_requests_per_window: 0,
            ..RateLimitConfig::default()
        };
        assert_eq!(
            config.validate(),
            Err(ConfigError::Zero {
                field: "max_requests_per_window"
            })
        );
    }

    #[test]
    fn deserializes_partial_json() {
        let config: GateConfig =
            serde_json::from_str(r#"{ "rate_limit": { "max_requests_per_window": 10 } }"#).unwrap();
        assert_eq!(config.rate_limit.max_requests_per_window, 10);
        assert_eq!(config.rate_limit.window_secs, 300);
        assert_eq!(config.credentials, CredentialCacheConfig::default());
    }
}
