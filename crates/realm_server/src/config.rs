//! Host configuration.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use realm_core::config::SimConfig;
use realm_core::geometry::MapGeometry;
use realm_core::math::Aabb;

use crate::error::{Result, ServerError};

/// Server configuration.
///
/// # Example RON
///
/// ```ron
/// (
///     tick_ms: 16,
///     sim_config: Some("data/sim.ron"),
///     log_filter: "info,realm_core=debug",
///     maps: {
///         "area1/m1": (
///             bounds: (min: (x: 0.0, y: 0.0), max: (x: 640.0, y: 640.0)),
///             solids: [Rect((min: (x: 300.0, y: 0.0), max: (x: 310.0, y: 200.0)))],
///         ),
///     },
/// )
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Driver period; every instance is advanced this often.
    pub tick_ms: u64,
    /// Simulation tuning file. `None` uses the built-in defaults.
    pub sim_config: Option<PathBuf>,
    /// Log filter used when `RUST_LOG` is unset.
    pub log_filter: String,
    /// Capacity of the intent ingress queue.
    pub ingress_capacity: usize,
    /// Geometry registered at startup, by map id.
    pub maps: BTreeMap<String, MapGeometry>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            tick_ms: 16,
            sim_config: None,
            log_filter: "info".to_string(),
            ingress_capacity: 1024,
            maps: BTreeMap::from([(
                "area1/m1".to_string(),
                MapGeometry::new(Aabb::from_origin_size(0.0, 0.0, 640.0, 640.0)),
            )]),
        }
    }
}

impl ServerConfig {
    /// Parse a server config from RON.
    pub fn from_ron_str(text: &str) -> Result<Self> {
        Ok(ron::from_str(text)?)
    }

    /// Load a server config file. Relative `sim_config` paths resolve
    /// against the file's directory.
    pub fn load(path: &Path) -> Result<Self> {
        let text = read(path)?;
        let mut config = Self::from_ron_str(&text)?;
        if let (Some(sim), Some(dir)) = (&config.sim_config, path.parent()) {
            if sim.is_relative() {
                config.sim_config = Some(dir.join(sim));
            }
        }
        Ok(config)
    }

    /// Load `path` if given, otherwise the defaults.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => {
                let config = Self::load(path)?;
                tracing::info!(path = %path.display(), "loaded server config");
                Ok(config)
            }
            None => Ok(Self::default()),
        }
    }

    /// Read and validate the simulation tuning.
    pub fn load_sim_config(&self) -> Result<SimConfig> {
        let Some(path) = &self.sim_config else {
            return Ok(SimConfig::default());
        };
        let text = read(path)?;
        let config = SimConfig::from_ron_str(&text, &path.display().to_string())?;
        tracing::info!(path = %path.display(), mobs = config.mobs.len(), "loaded sim config");
        Ok(config)
    }
}

fn read(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).map_err(|source| ServerError::Io {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_ron_keeps_defaults() {
        let config = ServerConfig::from_ron_str("(tick_ms: 20)").unwrap();
        assert_eq!(config.tick_ms, 20);
        assert_eq!(config.log_filter, "info");
        assert!(config.maps.contains_key("area1/m1"));
    }

    #[test]
    fn test_maps_from_ron() {
        let text = r#"(
            maps: {
                "cave": (
                    bounds: (min: (x: 0.0, y: 0.0), max: (x: 100.0, y: 50.0)),
                    solids: [Circle(center: (x: 50.0, y: 25.0), radius: 5.0)],
                ),
            },
        )"#;
        let config = ServerConfig::from_ron_str(text).unwrap();
        assert_eq!(config.maps.len(), 1);
        assert_eq!(config.maps["cave"].solids.len(), 1);
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let err = ServerConfig::load(Path::new("/nonexistent/realm.ron")).unwrap_err();
        assert!(matches!(err, ServerError::Io { .. }));
    }

    #[test]
    fn test_default_sim_config_without_path() {
        let sim = ServerConfig::default().load_sim_config().unwrap();
        assert_eq!(sim, SimConfig::default());
    }
}
