use super::{types::Config, ConfigError};

/// Validate configuration
/// Currently validates:
/// - Server port is not 0
/// - Worker pool and retry ceiling are non-zero
/// - Proxy URL parses when configured
/// - Token TTL is non-zero
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    // Server validation
    if config.server.port == 0 {
        return Err(ConfigError::ValidationError(
            "server.port cannot be 0".to_string(),
        ));
    }

    if config.manager.max_concurrent == 0 {
        return Err(ConfigError::ValidationError(
            "manager.max_concurrent cannot be 0".to_string(),
        ));
    }

    if config.manager.retry_ceiling == 0 {
        return Err(ConfigError::ValidationError(
            "manager.retry_ceiling cannot be 0".to_string(),
        ));
    }

    if config.storage.output_dir.as_os_str().is_empty() {
        return Err(ConfigError::ValidationError(
            "storage.output_dir cannot be empty".to_string(),
        ));
    }

    if let Some(ref proxy) = config.network.proxy {
        url::Url::parse(proxy).map_err(|e| {
            ConfigError::ValidationError(format!("network.proxy is not a valid URL: {}", e))
        })?;
    }

    if config.token.freshness_ttl_secs == 0 {
        return Err(ConfigError::ValidationError(
            "token.freshness_ttl_secs cannot be 0".to_string(),
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::NetworkConfig;

    #[test]
    fn test_validate_default_config() {
        assert!(validate_config(&Config::default()).is_ok());
    }

    #[test]
    fn test_validate_port_zero_fails() {
        let mut config = Config::default();
        config.server.port = 0;
        let result = validate_config(&config);
        assert!(matches!(result, Err(ConfigError::ValidationError(_))));
    }

    #[test]
    fn test_validate_zero_workers_fails() {
        let mut config = Config::default();
        config.manager.max_concurrent = 0;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_validate_bad_proxy_fails() {
        let config = Config {
            network: NetworkConfig {
                proxy: Some("not a url".to_string()),
            },
            ..Default::default()
        };
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_validate_good_proxy_passes() {
        let config = Config {
            network: NetworkConfig {
                proxy: Some("socks5://127.0.0.1:9050".to_string()),
            },
            ..Default::default()
        };
        assert!(validate_config(&config).is_ok());
    }
}
