//! Configuration validation.

use crate::config::Config;
use std::time::Duration;

/// Validate the configuration.
///
/// Checks for:
/// - At least one backend, each with a host and a non-zero port
/// - A usable proxy buffer and non-zero timeouts
/// - A positive listen backlog
/// - A known log level
///
/// # Returns
///
/// `Ok(())` if valid, or an error message describing every problem found.
pub fn validate_config(config: &Config) -> Result<(), String> {
    let mut errors = Vec::new();

    if config.backends.is_empty() {
        errors.push("at least one backend must be defined".to_string());
    }

    for (index, backend) in config.backends.iter().enumerate() {
        if backend.host.trim().is_empty() {
            errors.push(format!("backend #{} has an empty host", index));
        }
        if backend.port == 0 {
            errors.push(format!("backend #{} ({}) has port 0", index, backend));
        }
    }

    if config.listener.backlog <= 0 {
        errors.push(format!(
            "listener backlog must be >= 1, got {}",
            config.listener.backlog
        ));
    }

    if config.proxy.buffer_size == 0 {
        errors.push("proxy buffer_size must be >= 1".to_string());
    }

    let timeouts = [
        ("health_check.interval", Some(config.health_check.interval)),
        ("health_check.timeout", Some(config.health_check.timeout)),
        ("proxy.connect_timeout", Some(config.proxy.connect_timeout)),
        ("proxy.io_timeout", config.proxy.io_timeout),
    ];
    for (name, value) in timeouts {
        if value == Some(Duration::ZERO) {
            errors.push(format!("{} must be greater than zero", name));
        }
    }

    if config.global.metrics.enabled && !config.global.metrics.path.starts_with('/') {
        errors.push(format!(
            "metrics path '{}' must start with '/'",
            config.global.metrics.path
        ));
    }

    let valid_levels = ["trace", "debug", "info", "warn", "error"];
    if !valid_levels.contains(&config.global.log_level.to_lowercase().as_str()) {
        errors.push(format!(
            "invalid log level '{}', must be one of: {}",
            config.global.log_level,
            valid_levels.join(", ")
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors.join("; "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BackendConfig;

    #[test]
    fn test_valid_config() {
        assert!(validate_config(&Config::default()).is_ok());
    }

    #[test]
    fn test_no_backends() {
        let mut config = Config::default();
        config.backends.clear();
        let result = validate_config(&config);
        assert!(result.unwrap_err().contains("at least one backend"));
    }

    #[test]
    fn test_duplicate_backends_allowed() {
        let mut config = Config::default();
        config.backends = vec![
            BackendConfig::new("127.0.0.1", 9001),
            BackendConfig::new("127.0.0.1", 9001),
        ];
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_backend_port_zero() {
        let mut config = Config::default();
        config.backends[1].port = 0;
        let result = validate_config(&config);
        assert!(result.unwrap_err().contains("backend #1"));
    }

    #[test]
    fn test_empty_host() {
        let mut config = Config::default();
        config.backends[0].host = " ".to_string();
        let result = validate_config(&config);
        assert!(result.unwrap_err().contains("empty host"));
    }

    #[test]
    fn test_zero_buffer_size() {
        let mut config = Config::default();
        config.proxy.buffer_size = 0;
        let result = validate_config(&config);
        assert!(result.unwrap_err().contains("buffer_size"));
    }

    #[test]
    fn test_zero_durations() {
        let mut config = Config::default();
        config.health_check.interval = Duration::ZERO;
        config.proxy.io_timeout = Some(Duration::ZERO);
        let err = validate_config(&config).unwrap_err();
        assert!(err.contains("health_check.interval"));
        assert!(err.contains("proxy.io_timeout"));
        assert!(!err.contains("health_check.timeout"));
    }

    #[test]
    fn test_invalid_log_level() {
        let mut config = Config::default();
        config.global.log_level = "verbose".to_string();
        let result = validate_config(&config);
        assert!(result.unwrap_err().contains("invalid log level"));
    }

    #[test]
    fn test_errors_are_collected() {
        let mut config = Config::default();
        config.backends.clear();
        config.listener.backlog = 0;
        let err = validate_config(&config).unwrap_err();
        assert_eq!(err.split("; ").count(), 2);
    }
}
