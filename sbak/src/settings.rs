use std::{
    env,
    path::{Path, PathBuf},
};

use config::{Config, File};
use log::debug;
use serde::Deserialize;

use crate::cli::{Args, Command};
use crate::models::ConversationType;

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct Settings {
    pub token: Option<String>,
    pub api_url: Option<String>,
    pub out: Option<PathBuf>,
    pub types: Option<Vec<ConversationType>>,
    pub jobs: Option<usize>,
    pub max_retry_wait: Option<u64>,
    pub max_retry_attempts: Option<u32>,
}

const CONFIG_FILE_NAME: &str = env!("CARGO_PKG_NAME");

// Function to get the XDG_CONFIG_HOME path
fn get_xdg_config_path() -> Option<PathBuf> {
    // First check XDG_CONFIG_HOME environment variable
    if let Ok(xdg_config) = env::var("XDG_CONFIG_HOME") {
        return Some(PathBuf::from(xdg_config));
    }

    // If XDG_CONFIG_HOME is not set, fall back to $HOME/.config
    if let Ok(home) = env::var("HOME") {
        return Some(PathBuf::from(home).join(".config"));
    }

    None
}

pub fn default_config_path() -> Option<PathBuf> {
    get_xdg_config_path().map(|dir| dir.join(CONFIG_FILE_NAME).join("config.toml"))
}

pub fn load_settings(config_path: &Path) -> anyhow::Result<Settings> {
    if !config_path.exists() {
        return Ok(Settings::default());
    }

    Config::builder()
        .add_source(File::from(config_path.to_path_buf()).required(false))
        .build()?
        .try_deserialize()
        .map_err(|e| {
            anyhow::anyhow!(
                "Failed to deserialize config file {}: {}",
                config_path.display(),
                e
            )
        })
}

/// Fills arguments the command line left unset from `settings`.
pub fn apply_settings(args: &Args, settings: Settings) -> Args {
    let mut new_args = args.clone();

    macro_rules! apply_if_unset {
        ($target:expr, $field:ident, $config:expr) => {
            if $target.$field.is_none() {
                $target.$field = $config.$field.clone();
            }
        };
    }

    apply_if_unset!(new_args, token, settings);
    apply_if_unset!(new_args, api_url, settings);

    if let Command::Backup(backup) = &mut new_args.command {
        apply_if_unset!(backup, out, settings);
        apply_if_unset!(backup, jobs, settings);
        apply_if_unset!(backup, max_retry_wait, settings);
        apply_if_unset!(backup, max_retry_attempts, settings);

        if backup.types.is_empty() {
            backup.types = settings
                .types
                .clone()
                .unwrap_or_else(ConversationType::default_selection);
        }
    }

    new_args
}

pub fn merge_settings_with_args(args: &Args) -> anyhow::Result<Args> {
    let settings = match default_config_path() {
        Some(config_path) => load_settings(&config_path)?,
        None => Settings::default(),
    };

    let new_args = apply_settings(args, settings);
    debug!("merged config: {:?}", new_args.command);

    Ok(new_args)
}
