use std::env;

use chrono_tz::Tz;

use crate::services::bill_assembler::{AssemblyOptions, DEFAULT_DUE_DAYS};

const DEFAULT_BILLING_TIMEZONE: Tz = chrono_tz::Asia::Ho_Chi_Minh;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub app_name: String,
    pub environment: String,
    pub api_prefix: String,
    pub host: String,
    pub port: u16,
    pub request_timeout_seconds: u64,
    pub rate_limit_enabled: bool,
    pub rate_limit_per_second: u64,
    pub rate_limit_burst_size: u32,
    pub database_url: Option<String>,
    pub db_pool_max_connections: u32,
    pub db_pool_min_connections: u32,
    pub db_pool_acquire_timeout_seconds: u64,
    pub db_pool_idle_timeout_seconds: u64,
    pub db_run_migrations: bool,
    pub internal_api_key: Option<String>,
    pub billing_scheduler_enabled: bool,
    /// Day of month (1-28) on which next month's bills are generated.
    pub billing_run_day: u32,
    pub billing_run_hour: u32,
    pub billing_timezone: Tz,
    pub billing_due_days: u32,
    pub billing_include_parking: bool,
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self {
            app_name: env_or("APP_NAME", "Apartment Billing API"),
            environment: env_or("ENVIRONMENT", "development"),
            api_prefix: normalize_prefix(&env_or("API_PREFIX", "/v1")),
            host: env_or("HOST", "0.0.0.0"),
            port: env_parse_or("PORT", 8000),
            request_timeout_seconds: env_parse_or("REQUEST_TIMEOUT_SECONDS", 120),
            rate_limit_enabled: env_parse_bool_or("RATE_LIMIT_ENABLED", true),
            rate_limit_per_second: env_parse_or("RATE_LIMIT_PER_SECOND", 10),
            rate_limit_burst_size: env_parse_or("RATE_LIMIT_BURST_SIZE", 100),
            database_url: env_opt("DATABASE_URL"),
            db_pool_max_connections: env_parse_or("DB_POOL_MAX_CONNECTIONS", 5),
            db_pool_min_connections: env_parse_or("DB_POOL_MIN_CONNECTIONS", 1),
            db_pool_acquire_timeout_seconds: env_parse_or("DB_POOL_ACQUIRE_TIMEOUT_SECONDS", 5),
            db_pool_idle_timeout_seconds: env_parse_or("DB_POOL_IDLE_TIMEOUT_SECONDS", 600),
            db_run_migrations: env_parse_bool_or("DB_RUN_MIGRATIONS", false),
            internal_api_key: env_opt("INTERNAL_API_KEY"),
            billing_scheduler_enabled: env_parse_bool_or("BILLING_SCHEDULER_ENABLED", false),
            billing_run_day: clamp_run_day(env_parse_or("BILLING_RUN_DAY", 25)),
            billing_run_hour: env_parse_or("BILLING_RUN_HOUR", 0u32).min(23),
            billing_timezone: env_parse_or("BILLING_TIMEZONE", DEFAULT_BILLING_TIMEZONE),
            billing_due_days: env_parse_or("BILLING_DUE_DAYS", DEFAULT_DUE_DAYS),
            billing_include_parking: env_parse_bool_or("BILLING_INCLUDE_PARKING", true),
        }
    }

    pub fn is_production(&self) -> bool {
        self.environment.trim().eq_ignore_ascii_case("production")
    }

    /// Bill assembly settings, optionally overriding the parking switch.
    pub fn assembly_options(&self, include_parking: Option<bool>) -> AssemblyOptions {
        AssemblyOptions {
            include_parking: include_parking.unwrap_or(self.billing_include_parking),
            due_days: self.billing_due_days,
        }
    }
}

fn env_opt(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn env_or(key: &str, default: &str) -> String {
    env_opt(key).unwrap_or_else(|| default.to_string())
}

fn env_parse_or<T>(key: &str, default: T) -> T
where
    T: std::str::FromStr + Copy,
{
    env_opt(key)
        .and_then(|raw| raw.parse::<T>().ok())
        .unwrap_or(default)
}

fn env_parse_bool_or(key: &str, default: bool) -> bool {
    match env_opt(key).as_deref().map(str::to_ascii_lowercase) {
        Some(value) if value == "1" || value == "true" || value == "yes" || value == "on" => true,
        Some(value) if value == "0" || value == "false" || value == "no" || value == "off" => false,
        Some(_) => default,
        None => default,
    }
}

// Days past the 28th do not exist in every month.
fn clamp_run_day(day: u32) -> u32 {
    day.clamp(1, 28)
}

fn normalize_prefix(raw: &str) -> String {
    let mut prefix = raw.trim().to_string();
    if prefix.is_empty() {
        return "/v1".to_string();
    }
    if !prefix.starts_with('/') {
        prefix.insert(0, '/');
    }
    while prefix.ends_with('/') && prefix.len() > 1 {
        prefix.pop();
    }
    prefix
}

#[cfg(test)]
impl AppConfig {
    /// Development settings with no database, key or scheduler.
    pub fn for_tests() -> Self {
        Self {
            app_name: "test".to_string(),
            environment: "development".to_string(),
            api_prefix: "/v1".to_string(),
            host: "127.0.0.1".to_string(),
            port: 8000,
            request_timeout_seconds: 30,
            rate_limit_enabled: false,
            rate_limit_per_second: 10,
            rate_limit_burst_size: 100,
            database_url: None,
            db_pool_max_connections: 5,
            db_pool_min_connections: 1,
            db_pool_acquire_timeout_seconds: 5,
            db_pool_idle_timeout_seconds: 600,
            db_run_migrations: false,
            internal_api_key: None,
            billing_scheduler_enabled: false,
            billing_run_day: 25,
            billing_run_hour: 0,
            billing_timezone: DEFAULT_BILLING_TIMEZONE,
            billing_due_days: 10,
            billing_include_parking: false,
        }
    }
}
