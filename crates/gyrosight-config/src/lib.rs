mod types;

pub use types::*;

use anyhow::{Context, Result};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::info;

const CONFIG_FILE: &str = "config.toml";

/// `gyrosight/` under the platform config directory, created on demand.
pub fn config_dir() -> Result<PathBuf> {
    let base = dirs::config_dir().context("No platform config directory")?;
    let dir = base.join("gyrosight");
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("Failed to create {}", dir.display()))?;
    Ok(dir)
}

pub fn config_path() -> Result<PathBuf> {
    config_dir().map(|dir| dir.join(CONFIG_FILE))
}

/// Read the user's config; a missing file yields the defaults.
pub fn load_config() -> Result<AppConfig> {
    load_config_from(&config_path()?)
}

pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let contents = match std::fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            info!(?path, "No config file, using defaults");
            return Ok(AppConfig::default());
        }
        Err(e) => return Err(e).with_context(|| format!("Failed to read {}", path.display())),
    };
    let config = toml::from_str(&contents)
        .with_context(|| format!("Invalid config in {}", path.display()))?;
    info!(?path, "Loaded config");
    Ok(config)
}

/// Write `config` back to the user's config file.
pub fn save_config(config: &AppConfig) -> Result<()> {
    save_config_to(config, &config_path()?)
}

pub fn save_config_to(config: &AppConfig, path: &Path) -> Result<()> {
    let contents = toml::to_string_pretty(config)?;
    std::fs::write(path, contents)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    info!(?path, "Saved config");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec2;

    fn scratch_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("gyrosight-{}-{name}.toml", std::process::id()))
    }

    #[test]
    fn missing_file_gives_defaults() {
        let path = scratch_path("missing");
        let _ = std::fs::remove_file(&path);
        assert_eq!(load_config_from(&path).unwrap(), AppConfig::default());
    }

    #[test]
    fn saved_config_loads_back() {
        let path = scratch_path("saved");
        let mut config = AppConfig::default();
        config.sensor.backend = SensorBackend::Simulated;
        config.camera.video_latency_ms = 40;
        config.point_of_interest = Some(PointOfInterestConfig {
            position: Vec2::new(10.0, 20.0),
            radius: 5.0,
        });

        save_config_to(&config, &path).unwrap();
        let loaded = load_config_from(&path).unwrap();
        let _ = std::fs::remove_file(&path);
        assert_eq!(loaded, config);
    }

    #[test]
    fn malformed_file_is_an_error() {
        let path = scratch_path("malformed");
        std::fs::write(&path, "[camera\nwidth = ").unwrap();
        let result = load_config_from(&path);
        let _ = std::fs::remove_file(&path);
        assert!(result.is_err());
    }
}
