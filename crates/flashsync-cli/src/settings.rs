//! Configuration file and overrides

use anyhow::{Context, Result};
use flashsync_core::SyncConfig;
use std::path::{Path, PathBuf};

/// Values given on the command line or via the environment
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    /// Proxy base URL
    pub proxy_url: Option<String>,
    /// Local state directory
    pub state_dir: Option<PathBuf>,
}

/// Load `SyncConfig` from `path` (if any) and apply `overrides`
///
/// # Errors
/// - the file cannot be read or is not valid TOML
/// - the resulting queue limits are unusable
pub fn load_config(path: Option<&Path>, overrides: Overrides) -> Result<SyncConfig> {
    let mut config = match path {
        Some(path) => {
            let text = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
            toml::from_str::<SyncConfig>(&text).with_context(|| format!("parsing {}", path.display()))?
        }
        None => SyncConfig::default(),
    };

    if let Some(url) = overrides.proxy_url {
        config.proxy_url = Some(url);
    }
    if let Some(dir) = overrides.state_dir {
        config.state_dir = dir;
    }
    config.validate().context("invalid sync configuration")?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_values_then_overrides() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("flashsync.toml");
        std::fs::write(
            &path,
            "proxy_url = \"https://proxy.example\"\nstate_dir = \"/var/lib/flashsync\"\n\n[retry]\nmax_retries = 1\n",
        )
        .unwrap();

        let config = load_config(Some(&path), Overrides::default()).unwrap();
        assert_eq!(config.proxy_url.as_deref(), Some("https://proxy.example"));
        assert_eq!(config.retry.max_retries, 1);
        assert_eq!(config.retry.base_delay_ms, 1_000);

        let config = load_config(
            Some(&path),
            Overrides {
                proxy_url: Some("http://localhost:8787".into()),
                state_dir: Some(dir.path().to_path_buf()),
            },
        )
        .unwrap();
        assert_eq!(config.proxy_url.as_deref(), Some("http://localhost:8787"));
        assert_eq!(config.state_dir, dir.path());
    }

    #[test]
    fn missing_file_is_an_error() {
        assert!(load_config(Some(Path::new("/nonexistent/flashsync.toml")), Overrides::default()).is_err());
    }
}
