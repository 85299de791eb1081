use crate::domain::error::{RttComError, RttComResult};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::PathBuf;

/// RttCom configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RttComConfig {
    /// Global configuration
    #[serde(default)]
    pub global: GlobalConfig,
    /// Control block discovery settings
    #[serde(default)]
    pub discovery: DiscoveryConfig,
    /// Named probe profiles
    #[serde(default)]
    pub probes: Vec<ProbeProfile>,
    /// Simulated target used when no hardware driver is wired in
    #[serde(default)]
    pub simulator: SimulatorConfig,
}

/// Global configuration settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GlobalConfig {
    /// Default log level
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Upper bound of the blocking worker pool
    #[serde(default = "default_worker_threads")]
    pub worker_threads: usize,
    /// Bytes requested per read
    #[serde(default = "default_read_chunk_size")]
    pub read_chunk_size: u32,
    /// Delay between empty reads of a channel reader, in milliseconds
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,
}

/// Control block discovery settings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveryConfig {
    /// Maximum number of control block queries
    #[serde(default = "default_max_polls")]
    pub max_polls: u32,
    /// Delay between two queries, in microseconds
    #[serde(default)]
    pub poll_interval_us: u64,
}

/// Probe profile
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeProfile {
    /// Profile name
    pub name: String,
    /// Probe serial number
    pub serial_number: u32,
    /// Profile description
    #[serde(default)]
    pub description: String,
    /// Default up channel for reads
    #[serde(default)]
    pub up_channel: u32,
    /// Default down channel for writes
    #[serde(default)]
    pub down_channel: u32,
}

/// Simulated target description
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulatorConfig {
    /// Serial numbers the simulated probe answers to (empty = any)
    #[serde(default)]
    pub serial_numbers: Vec<u32>,
    #[serde(default = "default_clock_speed")]
    pub clock_speed_khz: u32,
    #[serde(default = "default_device_family")]
    pub device_family: String,
    #[serde(default = "default_library_path")]
    pub library_path: PathBuf,
    /// Control block queries answered negatively before it is found
    #[serde(default = "default_control_block_after")]
    pub control_block_after: u32,
    /// Copy bytes written to a down channel into the up channel with the same index
    #[serde(default = "default_echo")]
    pub echo: bool,
    /// Text preloaded into up channel 0
    #[serde(default)]
    pub greeting: String,
    #[serde(default = "default_up_channels")]
    pub up_channels: Vec<SimulatedChannelConfig>,
    #[serde(default = "default_down_channels")]
    pub down_channels: Vec<SimulatedChannelConfig>,
}

/// One simulated RTT channel
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimulatedChannelConfig {
    pub name: String,
    pub buffer_size: u32,
}

impl RttComConfig {
    /// Check configuration consistency
    pub fn validate(&self) -> RttComResult<()> {
        if self.global.worker_threads == 0 {
            return Err(config_error("global.worker_threads must be > 0"));
        }
        if self.global.read_chunk_size == 0 {
            return Err(config_error("global.read_chunk_size must be > 0"));
        }
        if self.discovery.max_polls == 0 {
            return Err(config_error("discovery.max_polls must be > 0"));
        }

        let mut names = HashSet::new();
        for profile in &self.probes {
            if !names.insert(profile.name.as_str()) {
                return Err(config_error(format!(
                    "probe profile '{}' is defined more than once",
                    profile.name
                )));
            }
        }
        Ok(())
    }

    /// Find a probe profile by name
    pub fn find_profile(&self, name: &str) -> Option<&ProbeProfile> {
        self.probes.iter().find(|p| p.name == name)
    }
}

fn config_error(message: impl Into<String>) -> RttComError {
    RttComError::Config {
        message: message.into(),
    }
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            worker_threads: default_worker_threads(),
            read_chunk_size: default_read_chunk_size(),
            poll_interval_ms: default_poll_interval(),
        }
    }
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            max_polls: default_max_polls(),
            poll_interval_us: 0,
        }
    }
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            serial_numbers: Vec::new(),
            clock_speed_khz: default_clock_speed(),
            device_family: default_device_family(),
            library_path: default_library_path(),
            control_block_after: default_control_block_after(),
            echo: default_echo(),
            greeting: String::new(),
            up_channels: default_up_channels(),
            down_channels: default_down_channels(),
        }
    }
}

// Default value functions
fn default_log_level() -> String {
    "info".to_string()
}

fn default_worker_threads() -> usize {
    4
}

fn default_read_chunk_size() -> u32 {
    1024
}

fn default_poll_interval() -> u64 {
    50
}

fn default_max_polls() -> u32 {
    100_000
}

fn default_clock_speed() -> u32 {
    2000
}

fn default_device_family() -> String {
    "nrf52".to_string()
}

fn default_library_path() -> PathBuf {
    PathBuf::from("libjlinkarm.so")
}

fn default_control_block_after() -> u32 {
    10
}

fn default_echo() -> bool {
    true
}

fn default_up_channels() -> Vec<SimulatedChannelConfig> {
    vec![SimulatedChannelConfig {
        name: "Terminal".to_string(),
        buffer_size: 1024,
    }]
}

fn default_down_channels() -> Vec<SimulatedChannelConfig> {
    vec![SimulatedChannelConfig {
        name: "Terminal".to_string(),
        buffer_size: 16,
    }]
}
