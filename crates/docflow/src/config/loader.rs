use std::path::Path;

use crate::config::schema::Config;
use crate::error::ConfigError;

const SCHEMA_JSON: &str = include_str!("../../../../schema/config-v1.json");

pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
        path: path.to_path_buf(),
        source: e,
    })?;

    load_config_from_str(&content)
}

pub fn load_config_from_str(content: &str) -> Result<Config, ConfigError> {
    let json_value: serde_json::Value = serde_json::from_str(content)?;

    validate_schema(&json_value)?;

    let config: Config = serde_json::from_value(json_value)?;

    validate_config(&config)?;

    Ok(config)
}

fn validate_schema(json_value: &serde_json::Value) -> Result<(), ConfigError> {
    let schema: serde_json::Value =
        serde_json::from_str(SCHEMA_JSON).map_err(|e| ConfigError::Validation {
            message: format!("Invalid embedded schema JSON: {}", e),
        })?;

    let validator = jsonschema::validator_for(&schema).map_err(|e| ConfigError::Validation {
        message: format!("Failed to compile JSON schema: {}", e),
    })?;

    let error_messages: Vec<String> = validator
        .iter_errors(json_value)
        .map(|e| e.to_string())
        .collect();
    if !error_messages.is_empty() {
        return Err(ConfigError::SchemaValidation {
            errors: error_messages.join("; "),
        });
    }

    Ok(())
}

fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.version != "1.0" {
        return Err(invalid(format!(
            "Unsupported config version: {}",
            config.version
        )));
    }

    let buckets = [
        ("upload.bucket", &config.upload.bucket),
        ("derived_bucket", &config.derived_bucket),
        ("artifact_bucket", &config.artifact_bucket),
    ];
    for (field, bucket) in buckets {
        if bucket.trim().is_empty() {
            return Err(invalid(format!("{} must not be empty", field)));
        }
        if !crate::sanitize::is_safe_segment(bucket) {
            return Err(invalid(format!(
                "{} '{}' must be a single path segment",
                field, bucket
            )));
        }
    }
    if config.upload.bucket == config.derived_bucket
        || config.upload.bucket == config.artifact_bucket
    {
        return Err(invalid(format!(
            "Upload bucket '{}' must differ from the derived and artifact buckets",
            config.upload.bucket
        )));
    }

    let workflow = &config.workflow;
    if workflow.stage_timeout_secs == 0 {
        return Err(invalid("workflow.stage_timeout_secs must be > 0".to_string()));
    }
    if workflow.chunk_concurrency == 0 {
        return Err(invalid("workflow.chunk_concurrency must be > 0".to_string()));
    }
    if workflow.retry.max_attempts == 0 {
        return Err(invalid("workflow.retry.max_attempts must be > 0".to_string()));
    }
    if workflow.retry.initial_backoff_ms > workflow.retry.max_backoff_ms {
        return Err(invalid(format!(
            "workflow.retry.initial_backoff_ms ({}) exceeds max_backoff_ms ({})",
            workflow.retry.initial_backoff_ms, workflow.retry.max_backoff_ms
        )));
    }

    Ok(())
}

fn invalid(message: String) -> ConfigError {
    ConfigError::Validation { message }
}
