use std::{env, io};

use tracing::debug;

const DEFAULT_LOOKUP_ENDPOINT: &str = "https://www.als.gov.hk/lookup";
const DEFAULT_DIAGNOSTICS_FILE: &str = "resolver-failures.jsonl";

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub lookup_endpoint: String,
    pub rate_limit: f64,
    pub max_in_flight: usize,
    pub max_retries: u32,
    pub sleep_multiplier: u32,
    pub retry_base_secs: f64,
    pub suggestion_limit: u32,
    pub request_timeout_secs: u64,
    pub diagnostics_file_name: String,
    pub diagnostics_batch_size: usize,
}

impl AppConfig {
    pub fn from_env() -> Self {
        load_dotenv_if_present();
        Self {
            lookup_endpoint: env::var("ALS_LOOKUP_ENDPOINT")
                .unwrap_or_else(|_| DEFAULT_LOOKUP_ENDPOINT.to_string()),
            rate_limit: parse_f64("ALS_RATE_LIMIT", 20.0),
            max_in_flight: parse_usize("ALS_MAX_IN_FLIGHT", 20),
            max_retries: parse_u32("ALS_MAX_RETRIES", 10),
            sleep_multiplier: parse_u32("ALS_SLEEP_MULTIPLIER", 2),
            retry_base_secs: parse_f64("ALS_RETRY_BASE_SECS", 1.0),
            suggestion_limit: parse_u32("ALS_SUGGESTION_LIMIT", 1),
            request_timeout_secs: parse_u64("ALS_REQUEST_TIMEOUT_SECS", 10),
            diagnostics_file_name: env::var("ALS_DIAGNOSTICS_FILE")
                .unwrap_or_else(|_| DEFAULT_DIAGNOSTICS_FILE.to_string()),
            diagnostics_batch_size: parse_usize("ALS_DIAGNOSTICS_BATCH_SIZE", 16).max(1),
        }
    }
}

fn load_dotenv_if_present() {
    if let Err(err) = dotenvy::dotenv() {
        match &err {
            dotenvy::Error::Io(io_err) if io_err.kind() == io::ErrorKind::NotFound => {}
            _ => debug!(?err, "unable to load .env file"),
        }
    }
}

fn parse_f64(key: &str, default: f64) -> f64 {
    env::var(key)
        .ok()
        .and_then(|v| v.parse::<f64>().ok())
        .unwrap_or(default)
}

fn parse_u64(key: &str, default: u64) -> u64 {
    env::var(key)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(default)
}

fn parse_usize(key: &str, default: usize) -> usize {
    env::var(key)
        .ok()
        .and_then(|v| v.parse::<usize>().ok())
        .unwrap_or(default)
}

fn parse_u32(key: &str, default: u32) -> u32 {
    env::var(key)
        .ok()
        .and_then(|v| v.parse::<u32>().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn applies_defaults_and_env_overrides() {
        env::remove_var("ALS_LOOKUP_ENDPOINT");
        env::remove_var("ALS_RATE_LIMIT");

        let config = AppConfig::from_env();
        assert_eq!(config.lookup_endpoint, DEFAULT_LOOKUP_ENDPOINT);
        assert_eq!(config.rate_limit, 20.0);
        assert_eq!(config.max_in_flight, 20);
        assert_eq!(config.max_retries, 10);
        assert_eq!(config.suggestion_limit, 1);

        env::set_var("ALS_RATE_LIMIT", "2.5");
        env::set_var("ALS_MAX_RETRIES", "4");
        env::set_var("ALS_DIAGNOSTICS_FILE", "failures.jsonl");
        let config = AppConfig::from_env();
        assert_eq!(config.rate_limit, 2.5);
        assert_eq!(config.max_retries, 4);
        assert_eq!(config.diagnostics_file_name, "failures.jsonl");

        env::remove_var("ALS_RATE_LIMIT");
        env::remove_var("ALS_MAX_RETRIES");
        env::remove_var("ALS_DIAGNOSTICS_FILE");
    }

    #[test]
    fn falls_back_on_unparseable_values() {
        env::set_var("ALS_SLEEP_MULTIPLIER", "not-a-number");
        env::set_var("ALS_DIAGNOSTICS_BATCH_SIZE", "0");

        let config = AppConfig::from_env();
        assert_eq!(config.sleep_multiplier, 2);
        // a zero batch size would never flush; clamped up
        assert_eq!(config.diagnostics_batch_size, 1);

        env::remove_var("ALS_SLEEP_MULTIPLIER");
        env::remove_var("ALS_DIAGNOSTICS_BATCH_SIZE");
    }
}
