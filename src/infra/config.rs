use std::{env, fmt::Display, str::FromStr};

use anyhow::{Context, Result, bail};
use chrono::{FixedOffset, TimeDelta};
use tracing::info;

use crate::services::schedule::SchedulePolicy;

#[derive(Debug, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub auth: AuthConfig,
    pub schedule: SchedulePolicy,
    pub orders: OrderPolicy,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Clone)]
pub struct AuthConfig {
    pub jwt_secret: String,
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("jwt_secret", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct OrderPolicy {
    /// Return stock to the ledger when an order moves into `CANCELLED`.
    pub restock_on_cancel: bool,
}

/// Loads the configuration from the process environment.
pub fn load() -> Result<Config> {
    from_lookup(|key| env::var(key).ok())
}

/// Builds the configuration from an arbitrary key lookup.
pub fn from_lookup<F>(lookup: F) -> Result<Config>
where
    F: Fn(&str) -> Option<String>,
{
    let open_hour: u32 = parse_or(&lookup, "OPEN_HOUR", 8)?;
    let close_hour: u32 = parse_or(&lookup, "CLOSE_HOUR", 22)?;
    if close_hour > 24 || open_hour >= close_hour {
        bail!("OPEN_HOUR ({open_hour}) must be before CLOSE_HOUR ({close_hour}), both within 0..=24");
    }

    let duration_minutes: i64 = parse_or(&lookup, "RESERVATION_DURATION_MINUTES", 60)?;
    let lead_minutes: i64 = parse_or(&lookup, "RESERVATION_MAX_LEAD_MINUTES", 120)?;
    if duration_minutes <= 0 || lead_minutes <= 0 {
        bail!("Reservation duration and lead time must be positive");
    }

    let duration = TimeDelta::try_minutes(duration_minutes).with_context(|| {
        format!("RESERVATION_DURATION_MINUTES out of range: {duration_minutes}")
    })?;
    let max_lead = TimeDelta::try_minutes(lead_minutes)
        .with_context(|| format!("RESERVATION_MAX_LEAD_MINUTES out of range: {lead_minutes}"))?;

    let offset_minutes: i32 = parse_or(&lookup, "RESTAURANT_UTC_OFFSET_MINUTES", 0)?;
    let utc_offset = offset_minutes
        .checked_mul(60)
        .and_then(FixedOffset::east_opt)
        .with_context(|| format!("RESTAURANT_UTC_OFFSET_MINUTES out of range: {offset_minutes}"))?;

    Ok(Config {
        server: ServerConfig {
            port: parse_or(&lookup, "PORT", 3000)?,
        },
        database: DatabaseConfig {
            url: required(&lookup, "DATABASE_URL")?,
            max_connections: parse_or(&lookup, "DATABASE_MAX_CONNECTIONS", 10)?,
        },
        auth: AuthConfig {
            jwt_secret: required(&lookup, "JWT_SECRET")?,
        },
        schedule: SchedulePolicy {
            open_hour,
            close_hour,
            duration,
            max_lead,
            utc_offset,
        },
        orders: OrderPolicy {
            restock_on_cancel: parse_or(&lookup, "RESTOCK_ON_CANCEL", false)?,
        },
    })
}

fn required<F>(lookup: &F, key: &str) -> Result<String>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key).with_context(|| format!("Environment variable {key} must be set"))
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr + Display,
    T::Err: Display,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| anyhow::anyhow!("Invalid {key} value {raw:?}: {e}")),
        None => {
            info!("{key} not set, using default: {default}");
            Ok(default)
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    const REQUIRED: &[(&str, &str)] = &[
        ("DATABASE_URL", "postgres://localhost/restaurant"),
        ("JWT_SECRET", "secret"),
    ];

    #[test]
    fn defaults_apply_when_only_required_keys_are_set() {
        let config = from_lookup(lookup_from(REQUIRED)).unwrap();

        assert_eq!(config.server.port, 3000);
        assert_eq!(config.database.max_connections, 10);
        assert_eq!(config.schedule.open_hour, 8);
        assert_eq!(config.schedule.close_hour, 22);
        assert_eq!(config.schedule.duration, TimeDelta::minutes(60));
        assert_eq!(config.schedule.max_lead, TimeDelta::minutes(120));
        assert!(!config.orders.restock_on_cancel);
    }

    #[test]
    fn missing_database_url_fails() {
        let err = from_lookup(lookup_from(&[("JWT_SECRET", "s")])).unwrap_err();
        assert!(err.to_string().contains("DATABASE_URL"));
    }

    #[test]
    fn inverted_operating_window_is_rejected() {
        let mut pairs = REQUIRED.to_vec();
        pairs.push(("OPEN_HOUR", "23"));
        pairs.push(("CLOSE_HOUR", "10"));
        assert!(from_lookup(lookup_from(&pairs)).is_err());
    }

    #[test]
    fn overrides_are_parsed() {
        let mut pairs = REQUIRED.to_vec();
        pairs.push(("RESTOCK_ON_CANCEL", "true"));
        pairs.push(("RESTAURANT_UTC_OFFSET_MINUTES", "420"));
        pairs.push(("RESERVATION_DURATION_MINUTES", "90"));

        let config = from_lookup(lookup_from(&pairs)).unwrap();
        assert!(config.orders.restock_on_cancel);
        assert_eq!(config.schedule.utc_offset.local_minus_utc(), 420 * 60);
        assert_eq!(config.schedule.duration, TimeDelta::minutes(90));
    }

    #[test]
    fn huge_durations_fail_instead_of_panicking() {
        let mut pairs = REQUIRED.to_vec();
        pairs.push(("RESERVATION_DURATION_MINUTES", "9223372036854775807"));
        let err = from_lookup(lookup_from(&pairs)).unwrap_err();
        assert!(err.to_string().contains("RESERVATION_DURATION_MINUTES"));

        let mut pairs = REQUIRED.to_vec();
        pairs.push(("RESTAURANT_UTC_OFFSET_MINUTES", "2147483647"));
        assert!(from_lookup(lookup_from(&pairs)).is_err());
    }

    #[test]
    fn garbage_numbers_are_reported_with_their_key() {
        let mut pairs = REQUIRED.to_vec();
        pairs.push(("PORT", "eighty"));
        let err = from_lookup(lookup_from(&pairs)).unwrap_err();
        assert!(err.to_string().contains("PORT"));
    }
}
