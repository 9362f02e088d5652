use crate::app_config::{AppConfig, Environment, ImageBounds};
use crate::ConfigError;

/// Load application configuration from environment variables.
///
/// Calls `dotenvy::dotenv().ok()` to load `.env` files before reading env vars.
///
/// # Errors
///
/// Returns `ConfigError` if a value is present but malformed.
pub fn load_app_config() -> Result<AppConfig, ConfigError> {
    dotenvy::dotenv().ok();
    load_app_config_from_env()
}

/// Load application configuration from the variables already in the process.
///
/// # Errors
///
/// Returns `ConfigError` if a value is present but malformed.
pub fn load_app_config_from_env() -> Result<AppConfig, ConfigError> {
    build_app_config(|key| std::env::var(key))
}

fn build_app_config<F>(lookup: F) -> Result<AppConfig, ConfigError>
where
    F: Fn(&str) -> Result<String, std::env::VarError>,
{
    let or_default = |var: &str, default: &str| -> String {
        lookup(var).unwrap_or_else(|_| default.to_string())
    };

    let invalid = |var: &str, reason: String| ConfigError::InvalidEnvVar {
        var: var.to_string(),
        reason,
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

    let parse_quality = |var: &str, default: &str| -> Result<f32, ConfigError> {
        let quality = or_default(var, default)
            .parse::<f32>()
            .map_err(|e| invalid(var, e.to_string()))?;
        if quality > 0.0 && quality <= 1.0 {
            Ok(quality)
        } else {
            Err(invalid(var, format!("{quality} is outside (0, 1]")))
        }
    };

    let database_url = lookup("DATABASE_URL").ok();
    let env = parse_environment(&or_default("VENDMAP_ENV", "development"));
    let log_level = or_default("VENDMAP_LOG_LEVEL", "info");
    let collection = or_default("VENDMAP_COLLECTION", "vending_machines");

    let db_max_connections = parse_u32("VENDMAP_DB_MAX_CONNECTIONS", "10")?;
    let db_min_connections = parse_u32("VENDMAP_DB_MIN_CONNECTIONS", "1")?;
    let db_acquire_timeout_secs = parse_u64("VENDMAP_DB_ACQUIRE_TIMEOUT_SECS", "10")?;

    let storage_base_url = or_default(
        "VENDMAP_STORAGE_BASE_URL",
        "https://firebasestorage.googleapis.com",
    );
    let storage_bucket = lookup("VENDMAP_STORAGE_BUCKET").ok();
    let storage_token = lookup("VENDMAP_STORAGE_TOKEN").ok();
    let storage_timeout_secs = parse_u64("VENDMAP_STORAGE_TIMEOUT_SECS", "30")?;

    let image_max_bytes = parse_u64("VENDMAP_IMAGE_MAX_BYTES", "10485760")?;
    let full_size = ImageBounds {
        max_width: parse_u32("VENDMAP_IMAGE_MAX_WIDTH", "1920")?,
        max_height: parse_u32("VENDMAP_IMAGE_MAX_HEIGHT", "1080")?,
        quality: parse_quality("VENDMAP_IMAGE_QUALITY", "0.8")?,
    };
    let thumbnail = ImageBounds {
        max_width: parse_u32("VENDMAP_THUMB_MAX_WIDTH", "300")?,
        max_height: parse_u32("VENDMAP_THUMB_MAX_HEIGHT", "300")?,
        quality: parse_quality("VENDMAP_THUMB_QUALITY", "0.7")?,
    };

    Ok(AppConfig {
        database_url,
        env,
        log_level,
        collection,
        db_max_connections,
        db_min_connections,
        db_acquire_timeout_secs,
        storage_base_url,
        storage_bucket,
        storage_token,
        storage_timeout_secs,
        image_max_bytes,
        full_size,
        thumbnail,
    })
}

/// Parse a string into an `Environment` variant.
///
/// Unrecognized values default to `Environment::Development`.
fn parse_environment(s: &str) -> Environment {
    match s {
        "production" => Environment::Production,
        "test" => Environment::Test,
        _ => Environment::Development,
    }
}

impl AppConfig {
    /// The database URL, for commands that need Postgres.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::MissingEnvVar` when `DATABASE_URL` is unset.
    pub fn require_database_url(&self) -> Result<&str, ConfigError> {
        self.database_url
            .as_deref()
            .ok_or_else(|| ConfigError::MissingEnvVar("DATABASE_URL".to_string()))
    }

    /// The storage bucket, for commands that touch blob storage.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::MissingEnvVar` when `VENDMAP_STORAGE_BUCKET` is unset.
    pub fn require_storage_bucket(&self) -> Result<&str, ConfigError> {
        self.storage_bucket
            .as_deref()
            .ok_or_else(|| ConfigError::MissingEnvVar("VENDMAP_STORAGE_BUCKET".to_string()))
    }
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
