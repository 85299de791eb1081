use crate::domain::{
    config::{DiscoveryConfig, GlobalConfig, ProbeProfile, RttComConfig, SimulatorConfig},
    error::{RttComError, RttComResult},
};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// One configuration file; sections that are absent leave earlier layers untouched
#[derive(Debug, Default, Deserialize)]
struct ConfigLayer {
    global: Option<GlobalConfig>,
    discovery: Option<DiscoveryConfig>,
    simulator: Option<SimulatorConfig>,
    #[serde(default)]
    probes: Vec<ProbeProfile>,
}

impl ConfigLayer {
    fn apply(self, config: &mut RttComConfig) {
        if let Some(global) = self.global {
            config.global = global;
        }
        if let Some(discovery) = self.discovery {
            config.discovery = discovery;
        }
        if let Some(simulator) = self.simulator {
            config.simulator = simulator;
        }
        for profile in self.probes {
            // later layers win for a profile name
            config.probes.retain(|p| p.name != profile.name);
            config.probes.push(profile);
        }
    }
}

/// Configuration manager
pub struct ConfigManager {
    global_config_path: PathBuf,
    project_config_path: Option<PathBuf>,
}

impl ConfigManager {
    /// Create new configuration manager
    pub fn new() -> RttComResult<Self> {
        let global_config_path = Self::get_global_config_path()?;
        let project_config_path = Self::find_project_config_path();

        Ok(Self {
            global_config_path,
            project_config_path,
        })
    }

    /// Manager over explicit file locations
    pub fn with_paths(global_config_path: PathBuf, project_config_path: Option<PathBuf>) -> Self {
        Self {
            global_config_path,
            project_config_path,
        }
    }

    /// Load configuration: defaults, then the global file, then the project file
    pub fn load_config(&self) -> RttComResult<RttComConfig> {
        let mut config = RttComConfig::default();

        if self.global_config_path.exists() {
            debug!("Loading global config {}", self.global_config_path.display());
            Self::read_layer(&self.global_config_path)?.apply(&mut config);
        }

        if let Some(project_path) = &self.project_config_path {
            if project_path.exists() {
                debug!("Loading project config {}", project_path.display());
                Self::read_layer(project_path)?.apply(&mut config);
            }
        }

        config.validate()?;
        Ok(config)
    }

    /// Save global settings to the global file and probe profiles to the project file
    pub fn save_config(&self, config: &RttComConfig) -> RttComResult<()> {
        let global_config = RttComConfig {
            probes: Vec::new(),
            ..config.clone()
        };
        self.save_config_to_path(&self.global_config_path, &global_config)?;

        if let Some(project_path) = &self.project_config_path {
            let project_config = RttComConfig {
                probes: config.probes.clone(),
                ..RttComConfig::default()
            };
            self.save_config_to_path(project_path, &project_config)?;
        }

        Ok(())
    }

    /// Get global configuration path
    fn get_global_config_path() -> RttComResult<PathBuf> {
        let home = dirs::home_dir().ok_or_else(|| RttComError::Config {
            message: "Could not determine home directory".to_string(),
        })?;

        Ok(home.join(".config").join("rttcom").join("config.toml"))
    }

    /// Find project configuration path by walking up directory tree
    fn find_project_config_path() -> Option<PathBuf> {
        let current_dir = std::env::current_dir().ok()?;
        let mut path = current_dir.as_path();

        loop {
            let config_path = path.join(".rttcom").join("config.toml");
            if config_path.exists() {
                return Some(config_path);
            }

            path = path.parent()?;
        }
    }

    fn read_layer(path: &Path) -> RttComResult<ConfigLayer> {
        let content = fs::read_to_string(path).map_err(|e| RttComError::Config {
            message: format!("Failed to read config file {}: {}", path.display(), e),
        })?;

        toml::from_str(&content).map_err(|e| RttComError::Config {
            message: format!("Failed to parse config file {}: {}", path.display(), e),
        })
    }

    /// Load a complete configuration from one file, ignoring the layered locations
    pub fn load_config_from_path(&self, path: &Path) -> RttComResult<RttComConfig> {
        let mut config = RttComConfig::default();
        Self::read_layer(path)?.apply(&mut config);
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to specific path
    pub fn save_config_to_path(&self, path: &Path, config: &RttComConfig) -> RttComResult<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| RttComError::Config {
                message: format!("Failed to create config directory: {}", e),
            })?;
        }

        let content = toml::to_string_pretty(config).map_err(|e| RttComError::Config {
            message: format!("Failed to serialize config: {}", e),
        })?;

        fs::write(path, content).map_err(|e| RttComError::Config {
            message: format!("Failed to write config file {}: {}", path.display(), e),
        })
    }

    /// Create default project configuration under `path`; returns the file written
    pub fn init_project_config(&self, path: &Path) -> RttComResult<PathBuf> {
        let config_file = path.join(".rttcom").join("config.toml");

        if config_file.exists() {
            return Err(RttComError::Config {
                message: "Project configuration already exists".to_string(),
            });
        }

        let default_config = RttComConfig {
            probes: vec![ProbeProfile {
                name: "devkit".to_string(),
                serial_number: 681023456,
                description: "Example development kit".to_string(),
                up_channel: 0,
                down_channel: 0,
            }],
            ..RttComConfig::default()
        };

        self.save_config_to_path(&config_file, &default_config)?;
        Ok(config_file)
    }

    /// Get the current project config path (if any)
    pub fn get_project_config_path(&self) -> Option<&PathBuf> {
        self.project_config_path.as_ref()
    }

    /// Get the global config path
    pub fn get_global_config_path_ref(&self) -> &PathBuf {
        &self.global_config_path
    }
}
