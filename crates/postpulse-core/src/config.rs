use crate::app_config::{AppConfig, Environment, StoreBackend};
use crate::ConfigError;

const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
     AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// Load application configuration from environment variables.
///
/// Calls `dotenvy::dotenv().ok()` to load `.env` files before reading env vars.
///
/// # Errors
///
/// Returns `ConfigError` if required env vars are missing or values are invalid.
pub fn load_app_config() -> Result<AppConfig, ConfigError> {
    dotenvy::dotenv().ok();
    load_app_config_from_env()
}

/// Load application configuration from environment variables already in the process.
///
/// Unlike [`load_app_config`], this does NOT load `.env` files.
///
/// # Errors
///
/// Returns `ConfigError` if required env vars are missing or values are invalid.
pub fn load_app_config_from_env() -> Result<AppConfig, ConfigError> {
    build_app_config(|key| std::env::var(key))
}

/// Build application configuration using the provided env-var lookup function.
///
/// Parsing and validation are decoupled from the process environment so the
/// logic can be tested with a plain `HashMap` lookup.
#[allow(clippy::too_many_lines)]
fn build_app_config<F>(lookup: F) -> Result<AppConfig, ConfigError>
where
    F: Fn(&str) -> Result<String, std::env::VarError>,
{
    use std::net::SocketAddr;
    use std::path::PathBuf;

    let or_default = |var: &str, default: &str| -> String {
        lookup(var).unwrap_or_else(|_| default.to_string())
    };

    let optional = |var: &str| -> Option<String> {
        lookup(var)
            .ok()
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    };

    let invalid = |var: &str, reason: String| ConfigError::InvalidEnvVar {
        var: var.to_string(),
        reason,
    };

    let parse_addr = |var: &str, default: &str| -> Result<SocketAddr, ConfigError> {
        or_default(var, default)
            .parse::<SocketAddr>()
            .map_err(|e| invalid(var, e.to_string()))
    };

    let parse_u32 = |var: &str, default: &str| -> Result<u32, ConfigError> {
        or_default(var, default)
            .parse::<u32>()
            .map_err(|e| invalid(var, e.to_string()))
    };

    let parse_u64 = |var: &str, default: &str| -> Result<u64, ConfigError> {
        or_default(var, default)
            .parse::<u64>()
            .map_err(|e| invalid(var, e.to_string()))
    };

    let parse_usize = |var: &str, default: &str| -> Result<usize, ConfigError> {
        or_default(var, default)
            .parse::<usize>()
            .map_err(|e| invalid(var, e.to_string()))
    };

    let parse_bool = |var: &str, default: bool| -> Result<bool, ConfigError> {
        match lookup(var) {
            Err(_) => Ok(default),
            Ok(raw) => parse_flag(&raw).ok_or_else(|| {
                invalid(var, format!("expected true/false, got \"{raw}\""))
            }),
        }
    };

    let env = parse_environment(&or_default("POSTPULSE_ENV", "development"))?;
    let bind_addr = parse_addr("POSTPULSE_BIND_ADDR", "0.0.0.0:8003")?;
    let log_level = or_default("POSTPULSE_LOG_LEVEL", "info");

    let store = parse_store_backend(&or_default("POSTPULSE_STORE", "postgres"))?;
    let database_url = optional("DATABASE_URL");
    if store == StoreBackend::Postgres && database_url.is_none() {
        return Err(ConfigError::MissingEnvVar("DATABASE_URL".to_string()));
    }

    let db_max_connections = parse_u32("POSTPULSE_DB_MAX_CONNECTIONS", "10")?;
    let db_min_connections = parse_u32("POSTPULSE_DB_MIN_CONNECTIONS", "1")?;
    let db_acquire_timeout_secs = parse_u64("POSTPULSE_DB_ACQUIRE_TIMEOUT_SECS", "10")?;

    let linkedin_email = optional("LINKEDIN_EMAIL");
    let linkedin_password = optional("LINKEDIN_PASSWORD");

    let session_state_path =
        PathBuf::from(or_default("POSTPULSE_SESSION_STATE_PATH", "./state.json"));
    let selectors_path =
        PathBuf::from(or_default("POSTPULSE_SELECTORS_PATH", "./config/selectors.yaml"));

    let browser_headless = parse_bool("POSTPULSE_BROWSER_HEADLESS", true)?;
    let browser_executable = optional("POSTPULSE_BROWSER_EXECUTABLE").map(PathBuf::from);
    let browser_user_agent = or_default("POSTPULSE_BROWSER_USER_AGENT", DEFAULT_USER_AGENT);
    let max_browser_sessions = parse_usize("POSTPULSE_MAX_BROWSER_SESSIONS", "1")?;
    if max_browser_sessions == 0 {
        return Err(invalid(
            "POSTPULSE_MAX_BROWSER_SESSIONS",
            "must be at least 1".to_string(),
        ));
    }
    let browser_launch_retries = parse_u32("POSTPULSE_BROWSER_LAUNCH_RETRIES", "2")?;
    let browser_launch_backoff_base_secs =
        parse_u64("POSTPULSE_BROWSER_LAUNCH_BACKOFF_BASE_SECS", "2")?;

    let scrape_timeout_secs = parse_u64("POSTPULSE_SCRAPE_TIMEOUT_SECS", "120")?;
    let scroll_settle_ms = parse_u64("POSTPULSE_SCROLL_SETTLE_MS", "3000")?;
    let manual_verification_timeout_secs =
        parse_u64("POSTPULSE_MANUAL_VERIFICATION_TIMEOUT_SECS", "300")?;

    let hashtag_top_k = parse_usize("POSTPULSE_HASHTAG_TOP_K", "2")?;
    if hashtag_top_k == 0 {
        return Err(invalid(
            "POSTPULSE_HASHTAG_TOP_K",
            "must be at least 1".to_string(),
        ));
    }
    let max_posts_per_request = parse_usize("POSTPULSE_MAX_POSTS_PER_REQUEST", "50")?;
    let single_flight = parse_bool("POSTPULSE_SINGLE_FLIGHT", true)?;
    let export_dir = optional("POSTPULSE_EXPORT_DIR").map(PathBuf::from);

    Ok(AppConfig {
        env,
        bind_addr,
        log_level,
        store,
        database_url,
        db_max_connections,
        db_min_connections,
        db_acquire_timeout_secs,
        linkedin_email,
        linkedin_password,
        session_state_path,
        selectors_path,
        browser_headless,
        browser_executable,
        browser_user_agent,
        max_browser_sessions,
        browser_launch_retries,
        browser_launch_backoff_base_secs,
        scrape_timeout_secs,
        scroll_settle_ms,
        manual_verification_timeout_secs,
        hashtag_top_k,
        max_posts_per_request,
        single_flight,
        export_dir,
    })
}

/// Parse a string into an `Environment` variant.
fn parse_environment(s: &str) -> Result<Environment, ConfigError> {
    match s {
        "development" => Ok(Environment::Development),
        "test" => Ok(Environment::Test),
        "production" => Ok(Environment::Production),
        other => Err(ConfigError::InvalidEnvVar {
            var: "POSTPULSE_ENV".to_string(),
            reason: format!("unknown environment \"{other}\""),
        }),
    }
}

fn parse_store_backend(s: &str) -> Result<StoreBackend, ConfigError> {
    match s.to_ascii_lowercase().as_str() {
        "postgres" | "postgresql" => Ok(StoreBackend::Postgres),
        "memory" => Ok(StoreBackend::Memory),
        other => Err(ConfigError::InvalidEnvVar {
            var: "POSTPULSE_STORE".to_string(),
            reason: format!("unknown store backend \"{other}\"; expected postgres or memory"),
        }),
    }
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
