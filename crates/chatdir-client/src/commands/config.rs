//! Configuration commands.

use crate::config::ChatConfig;
use crate::error::{ClientError, ClientResult};

/// Dump the current configuration to stdout.
pub fn dump(config: &ChatConfig) -> ClientResult<()> {
    let toml_str = toml::to_string_pretty(config)
        .map_err(|e| ClientError::Config(format!("failed to serialize config: {}", e)))?;
    println!("# config.toml ({})", ChatConfig::default_path().display());
    println!("{}", toml_str);

    Ok(())
}

/// Validate the configuration.
pub fn validate(config: &ChatConfig) -> ClientResult<()> {
    let addr = config.directory_addr()?;
    println!("Directory resolves to {}.", addr);

    if config.server.poll_capacity == 0 {
        return Err(ClientError::Config(
            "server.poll_capacity must be at least 1".to_string(),
        ));
    }
    if config.server.max_queued_frames == 0 {
        return Err(ClientError::Config(
            "server.max_queued_frames must be at least 1".to_string(),
        ));
    }

    if config.tls.enabled {
        let serve = config.tls.cert_file.is_some() || config.tls.key_file.is_some();
        config.tls_context(serve)?;
        if serve {
            println!("TLS credentials are valid.");
        } else {
            println!("TLS CA bundle is valid (client only).");
        }
    }

    println!("Configuration is valid.");
    Ok(())
}

/// Show the configuration file path.
pub fn path() -> ClientResult<()> {
    let config_path = ChatConfig::default_path();
    println!("config: {}", config_path.display());
    Ok(())
}
