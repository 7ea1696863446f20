pub mod config;
pub mod run;
pub mod run_ui;
pub mod schedule;

use color_eyre::Result;
use media_history_config::{Config, CredentialStore, PathManager, TOKEN_ENV_VAR};
use std::path::Path;

/// Load the configuration file, falling back to defaults when it does not exist
pub fn load_config(config_path: &Path) -> Result<Config> {
    Config::load_or_default(config_path)
        .map_err(|e| color_eyre::eyre::eyre!("Failed to load config from {}: {}", config_path.display(), e))
}

pub fn load_credentials(paths: &PathManager) -> Result<CredentialStore> {
    let credentials_file = paths.credentials_file();
    let mut store = CredentialStore::new(credentials_file.clone());
    store
        .load()
        .map_err(|e| color_eyre::eyre::eyre!("Failed to load credentials from {}: {}", credentials_file.display(), e))?;
    Ok(store)
}

pub fn require_token(paths: &PathManager) -> Result<String> {
    load_credentials(paths)?.resolve_token().ok_or_else(|| {
        color_eyre::eyre::eyre!(
            "No API token configured. Set {} or run 'reeltrend config set-token'",
            TOKEN_ENV_VAR
        )
    })
}
