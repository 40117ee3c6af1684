use chrono_tz::Tz;
use std::env;
use std::fmt::Display;
use std::str::FromStr;
use std::time::Duration;

use crate::error::ConfigurationError;

const DEFAULT_DATABASE_URL: &str = "sqlite:../data/kickcast.db";
const DEFAULT_OPENLIGA_BASE_URL: &str = "https://api.openligadb.de";
const DEFAULT_SOURCE_TIMEZONE: Tz = chrono_tz::Europe::Berlin;

/// Process-wide settings, read once at startup and handed to [`crate::context::AppContext`].
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub database_url: String,
    pub openliga_base_url: String,
    /// Zone of kickoff times the source sends without an offset.
    pub source_timezone: Tz,
    pub league: String,
    pub season: String,
    pub previous_season: String,
    pub min_refresh: chrono::Duration,
    pub teams_interval: Duration,
    pub matches_interval: Duration,
    pub prediction_ttl: chrono::Duration,
    pub quality_ttl: chrono::Duration,
    pub form_window: u32,
    pub http_timeout: Duration,
    pub startup_retry_delay: Duration,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigurationError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the config from any key lookup; `from_env` passes the process environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigurationError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let league = get("KICKCAST_LEAGUE").ok_or(ConfigurationError::Missing("KICKCAST_LEAGUE"))?;
        let season = get("KICKCAST_SEASON").ok_or(ConfigurationError::Missing("KICKCAST_SEASON"))?;

        let previous_season = match get("KICKCAST_PREVIOUS_SEASON") {
            Some(previous) => previous,
            None => match season.parse::<i64>() {
                Ok(year) => (year - 1).to_string(),
                Err(_) => return Err(ConfigurationError::Missing("KICKCAST_PREVIOUS_SEASON")),
            },
        };

        let form_window: u32 = parse_number(&get, "KICKCAST_FORM_WINDOW", 14)?;
        if form_window == 0 {
            return Err(ConfigurationError::Invalid {
                key: "KICKCAST_FORM_WINDOW",
                value: "0".into(),
                reason: "window must hold at least one match".into(),
            });
        }

        let source_timezone = match get("KICKCAST_SOURCE_TIMEZONE") {
            None => DEFAULT_SOURCE_TIMEZONE,
            Some(raw) => Tz::from_str(&raw).map_err(|_| ConfigurationError::Invalid {
                key: "KICKCAST_SOURCE_TIMEZONE",
                value: raw.clone(),
                reason: "expected an IANA zone like Europe/Berlin".into(),
            })?,
        };

        Ok(Self {
            database_url: get("DATABASE_URL").unwrap_or_else(|| DEFAULT_DATABASE_URL.to_string()),
            openliga_base_url: get("OPENLIGA_BASE_URL")
                .unwrap_or_else(|| DEFAULT_OPENLIGA_BASE_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
            source_timezone,
            league,
            season,
            previous_season,
            min_refresh: chrono::Duration::minutes(parse_number::<u32, _>(&get, "KICKCAST_MIN_REFRESH_MINUTES", 30)?.into()),
            teams_interval: interval_minutes(&get, "KICKCAST_TEAMS_INTERVAL_MINUTES", 1440)?,
            matches_interval: interval_minutes(&get, "KICKCAST_MATCHES_INTERVAL_MINUTES", 60)?,
            prediction_ttl: chrono::Duration::minutes(parse_number::<u32, _>(&get, "KICKCAST_PREDICTION_TTL_MINUTES", 30)?.into()),
            quality_ttl: chrono::Duration::hours(parse_number::<u32, _>(&get, "KICKCAST_QUALITY_TTL_HOURS", 6)?.into()),
            form_window,
            http_timeout: Duration::from_secs(positive(&get, "KICKCAST_HTTP_TIMEOUT_SECS", 10)?),
            startup_retry_delay: Duration::from_secs(parse_number(&get, "KICKCAST_STARTUP_RETRY_SECS", 15)?),
        })
    }

    /// Seasons the statistics window may span, current first.
    pub fn stat_seasons(&self) -> Vec<String> {
        vec![self.season.clone(), self.previous_season.clone()]
    }
}

fn parse_number<T, G>(get: &G, key: &'static str, default: T) -> Result<T, ConfigurationError>
where
    T: FromStr,
    T::Err: Display,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        None => Ok(default),
        Some(raw) => raw.parse::<T>().map_err(|e| ConfigurationError::Invalid {
            key,
            value: raw.clone(),
            reason: e.to_string(),
        }),
    }
}

fn positive<G>(get: &G, key: &'static str, default: u64) -> Result<u64, ConfigurationError>
where
    G: Fn(&str) -> Option<String>,
{
    let value = parse_number(get, key, default)?;
    if value == 0 {
        return Err(ConfigurationError::Invalid {
            key,
            value: "0".into(),
            reason: "must be greater than zero".into(),
        });
    }
    Ok(value)
}

fn interval_minutes<G>(get: &G, key: &'static str, default: u64) -> Result<Duration, ConfigurationError>
where
    G: Fn(&str) -> Option<String>,
{
    let minutes = positive(get, key, default)?;
    minutes
        .checked_mul(60)
        .map(Duration::from_secs)
        .ok_or_else(|| ConfigurationError::Invalid {
            key,
            value: minutes.to_string(),
            reason: "interval too large".into(),
        })
}
