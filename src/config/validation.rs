use crate::config::types::{
    ApiConfig, ColumnEntry, Config, CrawlerConfig, OutputConfig, PoolConfig, RetailerEntry,
};
use crate::output::is_known_field;
use crate::retailer::Retailer;
use crate::ConfigError;
use std::collections::HashSet;
use url::Url;

/// Largest accepted `backoff-factor`, in seconds
pub const MAX_BACKOFF_FACTOR: f64 = 60.0;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_api_config(&config.api)?;
    validate_crawler_config(&config.crawler)?;
    validate_output_config(&config.output)?;
    validate_pool_config(&config.pool)?;
    validate_retailers(&config.retailer)?;
    validate_columns(&config.column)?;
    Ok(())
}

/// Validates outbound API settings
fn validate_api_config(config: &ApiConfig) -> Result<(), ConfigError> {
    if config.timeout_secs < 1 {
        return Err(ConfigError::Validation(format!(
            "timeout-secs must be >= 1, got {}",
            config.timeout_secs
        )));
    }

    if config.max_retries > 10 {
        return Err(ConfigError::Validation(format!(
            "max-retries must be between 0 and 10, got {}",
            config.max_retries
        )));
    }

    if !config.backoff_factor.is_finite()
        || config.backoff_factor < 0.0
        || config.backoff_factor > MAX_BACKOFF_FACTOR
    {
        return Err(ConfigError::Validation(format!(
            "backoff-factor must be between 0 and {}, got {}",
            MAX_BACKOFF_FACTOR, config.backoff_factor
        )));
    }

    Ok(())
}

/// Validates crawler pacing and limits
fn validate_crawler_config(config: &CrawlerConfig) -> Result<(), ConfigError> {
    if config.max_pages < 1 {
        return Err(ConfigError::Validation(format!(
            "max-pages must be >= 1, got {}",
            config.max_pages
        )));
    }

    if let Some(sort) = &config.sort_by {
        if sort.trim().is_empty() {
            return Err(ConfigError::Validation(
                "sort-by cannot be empty when set".to_string(),
            ));
        }
    }

    Ok(())
}

/// Validates output configuration
fn validate_output_config(config: &OutputConfig) -> Result<(), ConfigError> {
    if config.directory.is_empty() {
        return Err(ConfigError::Validation(
            "output directory cannot be empty".to_string(),
        ));
    }

    if config.database_path.is_empty() {
        return Err(ConfigError::Validation(
            "database-path cannot be empty".to_string(),
        ));
    }

    Ok(())
}

/// Validates worker pool limits
fn validate_pool_config(config: &PoolConfig) -> Result<(), ConfigError> {
    if config.max_concurrent_jobs < 1 || config.max_concurrent_jobs > 64 {
        return Err(ConfigError::Validation(format!(
            "max-concurrent-jobs must be between 1 and 64, got {}",
            config.max_concurrent_jobs
        )));
    }

    Ok(())
}

/// Validates retailer entries
fn validate_retailers(entries: &[RetailerEntry]) -> Result<(), ConfigError> {
    let mut seen = HashSet::new();

    for entry in entries {
        let retailer: Retailer = entry.name.parse()?;

        if !seen.insert(retailer) {
            return Err(ConfigError::Validation(format!(
                "Retailer '{}' is configured more than once",
                retailer
            )));
        }

        if entry.api_key.is_none() && entry.api_key_env.is_none() {
            return Err(ConfigError::Validation(format!(
                "Retailer '{}' needs either api-key or api-key-env",
                retailer
            )));
        }

        if let Some(endpoint) = &entry.endpoint {
            let url = Url::parse(endpoint).map_err(|e| {
                ConfigError::InvalidUrl(format!("Invalid endpoint '{}': {}", endpoint, e))
            })?;

            if url.scheme() != "https" && url.scheme() != "http" {
                return Err(ConfigError::Validation(format!(
                    "Endpoint '{}' must use HTTP or HTTPS",
                    endpoint
                )));
            }
        }
    }

    Ok(())
}

/// Validates template columns
fn validate_columns(columns: &[ColumnEntry]) -> Result<(), ConfigError> {
    let mut headers = HashSet::new();

    for column in columns {
        if !is_known_field(&column.field) {
            return Err(ConfigError::Validation(format!(
                "Unknown column field '{}'",
                column.field
            )));
        }

        if column.header.trim().is_empty() {
            return Err(ConfigError::Validation(format!(
                "Column '{}' has an empty header",
                column.field
            )));
        }

        if !headers.insert(column.header.as_str()) {
            return Err(ConfigError::Validation(format!(
                "Duplicate column header '{}'",
                column.header
            )));
        }
    }

    Ok(())
}
