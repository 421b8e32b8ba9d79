//! Gameplay tuning, loaded from a JSON file next to the other assets.
//!
//! Every section falls back to its defaults field by field, so a config file only needs to list
//! the values it overrides.

use std::{
    f32::consts::FRAC_PI_4,
    fmt,
    path::{Path, PathBuf},
};

use bevy::prelude::*;
use serde::Deserialize;

pub const DEFAULT_CONFIG_PATH: &str = "assets/config/game.json";
pub const CONFIG_PATH_VAR: &str = "TOWER_CONFIG";

#[derive(Debug)]
pub struct ConfigPlugin {
    pub path: PathBuf,
}

impl Default for ConfigPlugin {
    fn default() -> Self {
        let path = std::env::var_os(CONFIG_PATH_VAR)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH));
        ConfigPlugin { path }
    }
}

impl Plugin for ConfigPlugin {
    fn build(&self, app: &mut App) {
        let config = match GameConfig::load(&self.path) {
            Ok(config) => {
                info!("Loaded game config from {}", self.path.display());
                config
            }
            Err(err) => {
                warn!(
                    "Could not load game config from {} ({}), using defaults",
                    self.path.display(),
                    err
                );
                GameConfig::default()
            }
        };
        app.insert_resource(config);
    }
}

#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Parse(serde_json::Error),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Io(err) => write!(f, "cannot read config file: {}", err),
            ConfigError::Parse(err) => write!(f, "malformed config file: {}", err),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Io(err) => Some(err),
            ConfigError::Parse(err) => Some(err),
        }
    }
}

impl From<std::io::Error> for ConfigError {
    fn from(err: std::io::Error) -> Self {
        ConfigError::Io(err)
    }
}

impl From<serde_json::Error> for ConfigError {
    fn from(err: serde_json::Error) -> Self {
        ConfigError::Parse(err)
    }
}

#[derive(Debug, Clone, Default, Deserialize, Resource)]
#[serde(default)]
pub struct GameConfig {
    pub portal: PortalConfig,
    pub projectile: ProjectileConfig,
    pub trajectory: TrajectoryConfig,
}

impl GameConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<GameConfig, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_json(&contents)
    }

    pub fn from_json(json: &str) -> Result<GameConfig, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PortalConfig {
    /// How many times a portal view is allowed to see itself.
    pub recursion_threshold: u32,
    /// Vertical field of view of the player camera and of the portal capture cameras, in radians.
    pub fov: f32,
    /// Capture target size used until the primary window exists.
    pub render_target_size: [u32; 2],
    /// Half width and half height of the portal aperture.
    pub half_size: [f32; 2],
    /// Distance in front of the exit portal where travellers are placed.
    pub exit_offset: f32,
    /// How deep behind the portal plane a traveller can be and still be teleported.
    pub trigger_depth: f32,
}

impl PortalConfig {
    pub fn half_size(&self) -> Vec2 {
        Vec2::from(self.half_size)
    }
}

impl Default for PortalConfig {
    fn default() -> Self {
        PortalConfig {
            recursion_threshold: 5,
            fov: FRAC_PI_4,
            render_target_size: [1280, 720],
            half_size: [1., 1.],
            exit_offset: 0.05,
            trigger_depth: 1.,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ProjectileConfig {
    pub radius: f32,
    pub initial_speed: f32,
    /// Share of the tangential velocity lost on each bounce.
    pub friction: f32,
    /// Share of the normal velocity kept on each bounce.
    pub bounciness: f32,
    /// Seconds before a fired projectile is despawned.
    pub life_span: f32,
    /// Spawn point of the projectiles, in the player camera frame.
    pub muzzle_offset: [f32; 3],
}

impl ProjectileConfig {
    pub fn muzzle_offset(&self) -> Vec3 {
        Vec3::from(self.muzzle_offset)
    }
}

impl Default for ProjectileConfig {
    fn default() -> Self {
        ProjectileConfig {
            radius: 0.1,
            initial_speed: 15.,
            friction: 0.2,
            bounciness: 0.6,
            life_span: 3.,
            muzzle_offset: [0.25, -0.2, -0.6],
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TrajectoryConfig {
    /// Simulated seconds covered by a prediction, restarted after every bounce.
    pub max_sim_time: f32,
    pub max_bounces: u32,
    /// Simulation step, in seconds.
    pub step: f32,
    /// Local clock value the simulation restarts from after a bounce.
    pub bounce_epsilon: f32,
}

impl Default for TrajectoryConfig {
    fn default() -> Self {
        TrajectoryConfig {
            max_sim_time: 2.,
            max_bounces: 2,
            step: 1.0e-2,
            bounce_epsilon: 5.0e-4,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_config_keeps_defaults() {
        let config = GameConfig::from_json(
            r#"{
                "portal": { "recursion_threshold": 3 },
                "projectile": { "bounciness": 1.0 }
            }"#,
        )
        .unwrap();
        assert_eq!(config.portal.recursion_threshold, 3);
        assert_eq!(config.portal.render_target_size, [1280, 720]);
        assert_eq!(config.projectile.bounciness, 1.0);
        assert_eq!(config.projectile.friction, 0.2);
        assert_eq!(config.trajectory.max_bounces, 2);
    }

    #[test]
    fn empty_object_is_default() {
        let config = GameConfig::from_json("{}").unwrap();
        assert_eq!(config.trajectory.max_sim_time, 2.);
        assert_eq!(config.trajectory.step, 0.01);
        assert_eq!(config.portal.half_size(), Vec2::ONE);
    }

    #[test]
    fn malformed_json_is_a_parse_error() {
        let err = GameConfig::from_json("{ \"portal\": ").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let err = GameConfig::load("does/not/exist.json").unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }
}
