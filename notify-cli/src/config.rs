use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use notify_client::ClientConfig;

const APP_DIR: &str = "notify-cli";
const CONFIG_FILE: &str = "config.toml";

/// `<config dir>/notify-cli/config.toml`, or `./config.toml` when the
/// platform has no config directory.
pub fn default_path() -> PathBuf {
    dirs::config_dir()
        .map(|dir| dir.join(APP_DIR).join(CONFIG_FILE))
        .unwrap_or_else(|| PathBuf::from(CONFIG_FILE))
}

fn resolve(path: Option<&Path>) -> PathBuf {
    path.map(Path::to_path_buf).unwrap_or_else(default_path)
}

/// Read the config file, falling back to defaults when it does not exist,
/// then overlay environment variables.
pub fn load(path: Option<&Path>) -> Result<ClientConfig> {
    let path = resolve(path);

    let config = if path.exists() {
        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        toml::from_str::<ClientConfig>(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?
    } else {
        ClientConfig::default()
    };

    Ok(config.apply_env())
}

pub fn save(config: &ClientConfig, path: Option<&Path>) -> Result<PathBuf> {
    let path = resolve(path);
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    fs::write(&path, show(config)?)
        .with_context(|| format!("Failed to write config file {}", path.display()))?;
    Ok(path)
}

pub fn reset(path: Option<&Path>) -> Result<PathBuf> {
    save(&ClientConfig::default(), path)
}

pub fn show(config: &ClientConfig) -> Result<String> {
    toml::to_string_pretty(config).context("Failed to serialize configuration")
}
