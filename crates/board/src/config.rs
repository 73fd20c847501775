use std::env;
use std::time::Duration;

use thiserror::Error;

use crate::fog::ViewerRole;
use crate::grid::{GridConfig, GRID_SIZE_DEFAULT};
use crate::render::FogStyle;

pub const PLAYER_FOLDER_ENV_VAR: &str = "BATTLEMAP_PLAYER_FOLDER";
pub const ROLE_ENV_VAR: &str = "BATTLEMAP_ROLE";
pub const PERSIST_DEBOUNCE_ENV_VAR: &str = "BATTLEMAP_PERSIST_DEBOUNCE_MS";

pub const DEFAULT_PLAYER_FOLDER_NAME: &str = "Player Characters";

#[derive(Debug, Clone, PartialEq)]
pub struct BoardConfig {
    /// Tokens in this folder reveal the cells they stand on.
    pub player_folder_name: String,
    pub viewer_role: ViewerRole,
    pub gm_fog_opacity: f32,
    pub player_fog_opacity: f32,
    pub persist_debounce: Duration,
    /// Grid size for scenes created on first use.
    pub default_grid_size: u32,
}

impl Default for BoardConfig {
    fn default() -> Self {
        Self {
            player_folder_name: DEFAULT_PLAYER_FOLDER_NAME.to_string(),
            viewer_role: ViewerRole::Player,
            gm_fog_opacity: 0.5,
            player_fog_opacity: 1.0,
            persist_debounce: Duration::from_millis(750),
            default_grid_size: GRID_SIZE_DEFAULT,
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{var} must be `gm` or `player`, got {value:?}")]
    InvalidRole { var: &'static str, value: String },
    #[error("{var} must be a whole number of milliseconds, got {value:?}")]
    InvalidDebounce { var: &'static str, value: String },
    #[error("environment variable {var} is not valid unicode")]
    NotUnicode { var: &'static str },
}

impl BoardConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| match env::var(var) {
            Ok(value) => Ok(Some(value)),
            Err(env::VarError::NotPresent) => Ok(None),
            Err(env::VarError::NotUnicode(_)) => Err(ConfigError::NotUnicode { var }),
        })
    }

    /// Applies overrides from `lookup` on top of the defaults. Blank values are
    /// treated as unset.
    pub fn from_lookup<F>(mut lookup: F) -> Result<Self, ConfigError>
    where
        F: FnMut(&'static str) -> Result<Option<String>, ConfigError>,
    {
        let mut config = Self::default();
        let mut read = |var| -> Result<Option<String>, ConfigError> {
            Ok(lookup(var)?
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty()))
        };

        if let Some(folder) = read(PLAYER_FOLDER_ENV_VAR)? {
            config.player_folder_name = folder;
        }
        if let Some(value) = read(ROLE_ENV_VAR)? {
            config.viewer_role = ViewerRole::parse(&value).ok_or(ConfigError::InvalidRole {
                var: ROLE_ENV_VAR,
                value,
            })?;
        }
        if let Some(value) = read(PERSIST_DEBOUNCE_ENV_VAR)? {
            let millis = value
                .parse::<u64>()
                .map_err(|_| ConfigError::InvalidDebounce {
                    var: PERSIST_DEBOUNCE_ENV_VAR,
                    value,
                })?;
            config.persist_debounce = Duration::from_millis(millis);
        }
        Ok(config)
    }

    pub fn fog_style(&self) -> FogStyle {
        FogStyle {
            gm_opacity: self.gm_fog_opacity,
            player_opacity: self.player_fog_opacity,
        }
    }

    pub fn default_grid(&self) -> GridConfig {
        GridConfig::with_size(self.default_grid_size)
    }
}
