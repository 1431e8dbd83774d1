use std::path::Path;

use crate::config::schema::Config;
use crate::error::ConfigError;

pub const CONFIG_VERSION: &str = "1.0";

pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
        path: path.to_path_buf(),
        source: e,
    })?;

    load_config_from_str(&content)
}

pub fn load_config_from_str(content: &str) -> Result<Config, ConfigError> {
    let config: Config = serde_json::from_str(content)?;

    validate_config(&config)?;

    Ok(config)
}

fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.version != CONFIG_VERSION {
        return Err(ConfigError::Validation {
            message: format!("Unsupported config version: {}", config.version),
        });
    }

    let mailbox = &config.mailbox;
    if mailbox.host.trim().is_empty() {
        return Err(validation("mailbox.host must not be empty"));
    }
    if mailbox.username.trim().is_empty() {
        return Err(validation("mailbox.username must not be empty"));
    }
    if !mailbox.password.is_configured() {
        return Err(validation(
            "mailbox.password needs one of: value, file, or env",
        ));
    }
    if mailbox.batch_size == 0 {
        return Err(validation("mailbox.batch_size must be greater than 0"));
    }
    if mailbox.timeout_secs == 0 {
        return Err(validation("mailbox.timeout_secs must be greater than 0"));
    }

    let telegram = &config.telegram;
    if !telegram.bot_token.is_configured() {
        return Err(validation(
            "telegram.bot_token needs one of: value, file, or env",
        ));
    }
    if telegram.owner_id.trim().is_empty() {
        return Err(validation("telegram.owner_id must not be empty"));
    }
    if telegram.owner_id.trim().parse::<i64>().is_err() {
        return Err(ConfigError::Validation {
            message: format!(
                "telegram.owner_id must be a numeric chat id, got '{}'",
                telegram.owner_id
            ),
        });
    }
    if !telegram.api_base_url.starts_with("http://")
        && !telegram.api_base_url.starts_with("https://")
    {
        return Err(validation("telegram.api_base_url must be an http(s) URL"));
    }

    if config.check_interval_secs == 0 {
        return Err(validation("check_interval_secs must be greater than 0"));
    }

    if tracing_subscriber::EnvFilter::try_new(&config.log_level).is_err() {
        return Err(ConfigError::Validation {
            message: format!("Invalid log_level '{}'", config.log_level),
        });
    }

    Ok(())
}

fn validation(message: &str) -> ConfigError {
    ConfigError::Validation {
        message: message.to_string(),
    }
}
