//! Configuration loading

use anyhow::{Context, Result};

use crate::Config;

/// Load configuration from config file or environment variables
///
/// Config file search order:
/// 1. WSRELAY_CONFIG_PATH environment variable (explicit path)
/// 2. ./config.yaml (current working directory)
/// 3. /config/config.yaml (Kubernetes mount path)
/// 4. Fall back to environment variables only
///
/// A config file that is found but cannot be read is an error, never a
/// silent fallback.
pub fn load_config() -> Result<Config> {
    load_config_from(find_config_file().as_deref())
}

fn load_config_from(path: Option<&str>) -> Result<Config> {
    let config = match path {
        Some(path) => {
            eprintln!("Loading config from {path}");
            Config::from_file(path)
                .with_context(|| format!("Failed to load config file {path}"))?
        }
        None => {
            eprintln!("No config file found, using environment variables");
            Config::from_env().context("Failed to load config from environment")?
        }
    };

    // Fail fast on misconfiguration
    if let Err(errors) = config.validate() {
        for error in &errors {
            eprintln!("Config validation error: {error}");
        }
        return Err(anyhow::anyhow!(
            "Configuration validation failed with {} error(s): {}",
            errors.len(),
            errors.join("; ")
        ));
    }

    Ok(config)
}

fn find_config_file() -> Option<String> {
    std::env::var("WSRELAY_CONFIG_PATH")
        .ok()
        .into_iter()
        .chain(["config.yaml".to_string(), "/config/config.yaml".to_string()])
        .find(|p| std::path::Path::new(p).exists())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_temp_config(name: &str, contents: &str) -> std::path::PathBuf {
        let path = std::env::temp_dir().join(format!("wsrelay-{name}-{}.yaml", std::process::id()));
        std::fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn test_unparseable_config_file_is_an_error() {
        let path = write_temp_config(
            "bad-policy",
            "registry:\n  backend: memory\n\
             dispatcher:\n  missing_destination: skipp\n",
        );

        let result = load_config_from(path.to_str());
        std::fs::remove_file(&path).ok();

        let err = result.unwrap_err();
        assert!(format!("{err:#}").contains("Failed to load config file"), "{err:#}");
    }

    #[test]
    fn test_invalid_config_file_fails_validation() {
        let path = write_temp_config(
            "no-margin",
            "delivery:\n  endpoint: http://localhost:3001\n\
             dispatcher:\n  safety_margin_ms: 60000\n",
        );

        let result = load_config_from(path.to_str());
        std::fs::remove_file(&path).ok();

        let err = result.unwrap_err();
        assert!(err.to_string().contains("validation failed"), "{err}");
    }
}
