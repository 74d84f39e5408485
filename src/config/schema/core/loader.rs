use super::Config;
use super::types::default_state_dir;
use crate::error::ConfigError;
use anyhow::{Context, Result};
use std::fs;
use std::path::Path;

impl Config {
    pub fn load_or_init() -> Result<Self> {
        Self::load_or_init_in(&default_state_dir())
    }

    pub fn load_or_init_in(state_dir: &Path) -> Result<Self> {
        let config_path = state_dir.join("config.toml");

        if !state_dir.exists() {
            fs::create_dir_all(state_dir).context("Failed to create .screenpop directory")?;
        }

        let mut config = if config_path.exists() {
            let contents = fs::read_to_string(&config_path)
                .map_err(ConfigError::from)
                .context("Failed to read config file")?;
            let mut config: Config = toml::from_str(&contents)
                .map_err(|e| ConfigError::Load(format!("{}: {e}", config_path.display())))
                .context("Failed to parse config file")?;
            config.config_path.clone_from(&config_path);
            config.state_dir = state_dir.to_path_buf();
            config
        } else {
            let config = Self::in_dir(state_dir);
            config.save()?;
            config
        };

        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        let toml_str = toml::to_string_pretty(self).context("Failed to serialize config")?;
        fs::write(&self.config_path, toml_str)
            .map_err(ConfigError::from)
            .context("Failed to write config file")?;
        Ok(())
    }
}
