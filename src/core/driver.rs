use crate::core::session::registry::ChannelDirection;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Raw status code reported by a failing driver call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DriverStatus(pub i32);

impl DriverStatus {
    pub fn code(self) -> i32 {
        self.0
    }
}

impl std::fmt::Display for DriverStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "status {}", self.0)
    }
}

pub type DriverResult<T> = Result<T, DriverStatus>;

/// Target device family reported by the probe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceFamily {
    Nrf51,
    Nrf52,
    Nrf53,
    Nrf91,
    Unknown,
}

impl std::str::FromStr for DeviceFamily {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.to_ascii_lowercase().as_str() {
            "nrf51" => DeviceFamily::Nrf51,
            "nrf52" => DeviceFamily::Nrf52,
            "nrf53" => DeviceFamily::Nrf53,
            "nrf91" => DeviceFamily::Nrf91,
            _ => DeviceFamily::Unknown,
        })
    }
}

impl std::fmt::Display for DeviceFamily {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeviceFamily::Nrf51 => write!(f, "nRF51"),
            DeviceFamily::Nrf52 => write!(f, "nRF52"),
            DeviceFamily::Nrf53 => write!(f, "nRF53"),
            DeviceFamily::Nrf91 => write!(f, "nRF91"),
            DeviceFamily::Unknown => write!(f, "unknown"),
        }
    }
}

/// Probe facts read through the throwaway high-level handle
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeDetails {
    pub clock_speed_khz: u32,
    pub device_family: DeviceFamily,
    /// Low-level driver library resolved by the high-level layer
    pub library_path: PathBuf,
}

/// Pre-connection access to the probe
///
/// Implementations block; they are only ever called from a worker thread.
pub trait ProbeBackend: Send {
    /// Open a short-lived high-level handle for `serial_number`, read the probe
    /// details, optionally reset the target, and release the handle again.
    fn probe_details(&mut self, serial_number: u32, reset: bool) -> DriverResult<ProbeDetails>;

    /// Load the low-level driver function table
    fn load_driver(&mut self) -> DriverResult<Box<dyn RttDriver>>;
}

/// Low-level RTT driver
///
/// Calls are blocking and stateful; the driver must never be used from two
/// threads at once, which the owning session guarantees.
pub trait RttDriver: Send {
    fn open_driver(&mut self, library_path: &Path, family: DeviceFamily) -> DriverResult<()>;

    fn connect_to_probe(&mut self, serial_number: u32, clock_speed_khz: u32) -> DriverResult<()>;

    fn connect_to_device(&mut self) -> DriverResult<()>;

    fn rtt_start(&mut self) -> DriverResult<()>;

    fn rtt_is_control_block_found(&mut self) -> DriverResult<bool>;

    /// Returns `(down_count, up_count)`
    fn rtt_read_channel_count(&mut self) -> DriverResult<(u32, u32)>;

    /// Returns `(name, buffer_size)`
    fn rtt_read_channel_info(
        &mut self,
        direction: ChannelDirection,
        index: u32,
    ) -> DriverResult<(String, u32)>;

    /// Read up to `max_length` bytes from an up channel
    fn rtt_read(&mut self, channel_index: u32, max_length: u32) -> DriverResult<Vec<u8>>;

    /// Write into a down channel, returning the number of bytes accepted
    fn rtt_write(&mut self, channel_index: u32, data: &[u8]) -> DriverResult<u32>;

    fn rtt_stop(&mut self) -> DriverResult<()>;

    fn disconnect_from_device(&mut self) -> DriverResult<()>;

    fn disconnect_from_probe(&mut self) -> DriverResult<()>;

    fn close_driver(&mut self) -> DriverResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_family_parsing() {
        assert_eq!("NRF52".parse::<DeviceFamily>().unwrap(), DeviceFamily::Nrf52);
        assert_eq!("nrf91".parse::<DeviceFamily>().unwrap(), DeviceFamily::Nrf91);
        assert_eq!("stm32".parse::<DeviceFamily>().unwrap(), DeviceFamily::Unknown);
        assert_eq!(DeviceFamily::Nrf53.to_string(), "nRF53");
    }

    #[test]
    fn test_driver_status_display() {
        assert_eq!(DriverStatus(-102).to_string(), "status -102");
        assert_eq!(DriverStatus(-3).code(), -3);
    }
}
