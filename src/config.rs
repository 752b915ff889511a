use std::env;

use crate::engine::matching::MatchPolicy;
use crate::error::AppError;

#[derive(Debug, Clone)]
pub struct Config {
    pub http_port: u16,
    pub log_level: String,
    pub event_buffer_size: usize,
    pub match_tie_band_m: f64,
    pub stale_location_secs: i64,
    pub cas_retries: u32,
}

impl Config {
    pub fn from_env() -> Result<Self, AppError> {
        let _ = dotenvy::dotenv();

        let config = Self {
            http_port: parse_or_default("HTTP_PORT", 3000)?,
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            event_buffer_size: parse_or_default("EVENT_BUFFER_SIZE", 1024)?,
            match_tie_band_m: parse_or_default("MATCH_TIE_BAND_M", 1.0)?,
            stale_location_secs: parse_or_default("STALE_LOCATION_SECS", 300)?,
            cas_retries: parse_or_default("CAS_RETRIES", 3)?,
        };

        if !config.match_tie_band_m.is_finite() || config.match_tie_band_m < 0.0 {
            return Err(AppError::Internal(
                "invalid MATCH_TIE_BAND_M: must be a non-negative number".to_string(),
            ));
        }
        if config.event_buffer_size == 0 {
            return Err(AppError::Internal(
                "invalid EVENT_BUFFER_SIZE: must be > 0".to_string(),
            ));
        }

        Ok(config)
    }

    pub fn match_policy(&self) -> MatchPolicy {
        MatchPolicy {
            tie_band_m: self.match_tie_band_m,
            stale_after_secs: self.stale_location_secs,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            http_port: 3000,
            log_level: "info".to_string(),
            event_buffer_size: 1024,
            match_tie_band_m: 1.0,
            stale_location_secs: 300,
            cas_retries: 3,
        }
    }
}

fn parse_or_default<T>(key: &str, default: T) -> Result<T, AppError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw
            .parse::<T>()
            .map_err(|err| AppError::Internal(format!("invalid {key}: {err}"))),
        Err(_) => Ok(default),
    }
}
