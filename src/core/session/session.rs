use crate::core::dispatch::task::DiagnosticLog;
use crate::core::driver::{DriverResult, ProbeBackend, ProbeDetails, RttDriver};
use crate::core::session::{
    registry::{ChannelDirection, ChannelRegistry},
    state::{SessionState, StateTracker},
    translate::{CallSite, SessionError},
};
use crate::domain::config::DiscoveryConfig;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Options accepted by start
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartOptions {
    /// Reset the target through the throwaway probe handle before connecting
    #[serde(default = "default_reset")]
    pub reset_on_start: bool,
    /// Override of the configured discovery bound
    #[serde(default)]
    pub max_polls: Option<u32>,
    /// Override of the configured delay between discovery polls
    #[serde(default)]
    pub poll_interval_us: Option<u64>,
}

fn default_reset() -> bool {
    true
}

impl Default for StartOptions {
    fn default() -> Self {
        Self {
            reset_on_start: true,
            max_polls: None,
            poll_interval_us: None,
        }
    }
}

/// Failed teardown calls collected by stop
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TeardownReport {
    pub failures: Vec<SessionError>,
}

impl TeardownReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// What has been brought up so far, so teardown undoes exactly that
#[derive(Debug, Clone, Copy, Default)]
struct OpenedResources {
    driver_open: bool,
    probe_connected: bool,
    device_connected: bool,
    rtt_started: bool,
}

/// The single logical RTT session over one debug probe
///
/// The session exclusively owns the backend and, once loaded, the driver.
/// All methods block and are meant to run on a worker thread.
pub struct Session {
    backend: Box<dyn ProbeBackend>,
    driver: Option<Box<dyn RttDriver>>,
    opened: OpenedResources,
    serial_number: Option<u32>,
    probe: Option<ProbeDetails>,
    registry: ChannelRegistry,
    state: StateTracker,
    discovery: DiscoveryConfig,
}

impl Session {
    pub fn new(backend: Box<dyn ProbeBackend>, discovery: DiscoveryConfig) -> Self {
        Self {
            backend,
            driver: None,
            opened: OpenedResources::default(),
            serial_number: None,
            probe: None,
            registry: ChannelRegistry::default(),
            state: StateTracker::new(),
            discovery,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state.current()
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    pub fn serial_number(&self) -> Option<u32> {
        self.serial_number
    }

    pub fn probe_details(&self) -> Option<&ProbeDetails> {
        self.probe.as_ref()
    }

    pub fn channels(&self) -> &ChannelRegistry {
        &self.registry
    }

    /// Connect to the probe and target, start RTT and discover the channels
    pub fn start(
        &mut self,
        serial_number: u32,
        options: &StartOptions,
        log: &mut DiagnosticLog,
    ) -> Result<&ChannelRegistry, SessionError> {
        let current = self.state.current();
        if !current.can_start() {
            return Err(SessionError::new(
                CallSite::SessionState,
                format!("cannot start while session is {}", current),
            ));
        }

        self.serial_number = Some(serial_number);
        self.registry = ChannelRegistry::default();
        self.state.transition(SessionState::Connecting);
        info!("Starting RTT session on probe {}", serial_number);

        match self.bring_up(serial_number, options, log) {
            Ok(()) => {
                self.state.transition(SessionState::Ready);
                info!(
                    "RTT session ready: {} down channels, {} up channels",
                    self.registry.down_channels().len(),
                    self.registry.up_channels().len()
                );
                Ok(&self.registry)
            }
            Err(e) => {
                log.record(format!("Start failed: {}", e));
                warn!("RTT session start on probe {} failed: {}", serial_number, e);
                self.state.transition(SessionState::Failed(e.kind()));
                Err(e)
            }
        }
    }

    fn bring_up(
        &mut self,
        serial_number: u32,
        options: &StartOptions,
        log: &mut DiagnosticLog,
    ) -> Result<(), SessionError> {
        let details = self
            .backend
            .probe_details(serial_number, options.reset_on_start)
            .map_err(|s| SessionError::driver(CallSite::ProbeDetails, s))?;
        log.record(format!(
            "Probe {}: {} kHz, family {}, driver {}",
            serial_number,
            details.clock_speed_khz,
            details.device_family,
            details.library_path.display()
        ));

        let mut driver = self
            .backend
            .load_driver()
            .map_err(|s| SessionError::driver(CallSite::LoadDriver, s))?;

        driver
            .open_driver(&details.library_path, details.device_family)
            .map_err(|s| SessionError::driver(CallSite::OpenDriver, s))?;
        let driver = self.driver.insert(driver);
        self.opened.driver_open = true;
        self.probe = Some(details.clone());

        driver
            .connect_to_probe(serial_number, details.clock_speed_khz)
            .map_err(|s| SessionError::driver(CallSite::ConnectToProbe, s))?;
        self.opened.probe_connected = true;

        driver
            .connect_to_device()
            .map_err(|s| SessionError::driver(CallSite::ConnectToDevice, s))?;
        self.opened.device_connected = true;

        driver
            .rtt_start()
            .map_err(|s| SessionError::driver(CallSite::RttStart, s))?;
        self.opened.rtt_started = true;
        log.record("RTT started");

        self.state.transition(SessionState::DiscoveringControlBlock);
        let max_polls = options.max_polls.unwrap_or(self.discovery.max_polls);
        let interval = Duration::from_micros(
            options
                .poll_interval_us
                .unwrap_or(self.discovery.poll_interval_us),
        );
        let polls = self.find_control_block(max_polls, interval)?;
        log.record(format!("Found control block after {} polls", polls));

        self.registry = self.discover_channels(log)?;
        Ok(())
    }

    /// Poll until the control block shows up; returns the number of polls used
    fn find_control_block(&mut self, max_polls: u32, interval: Duration) -> Result<u32, SessionError> {
        let driver = self.driver_mut()?;
        for poll in 1..=max_polls {
            let found = driver
                .rtt_is_control_block_found()
                .map_err(|s| SessionError::driver(CallSite::ControlBlockSearch, s))?;
            if found {
                debug!("Control block found on poll {}", poll);
                return Ok(poll);
            }
            if !interval.is_zero() {
                std::thread::sleep(interval);
            }
        }
        Err(SessionError::new(
            CallSite::ControlBlockSearch,
            format!("control block not found after {} polls", max_polls),
        ))
    }

    fn discover_channels(&mut self, log: &mut DiagnosticLog) -> Result<ChannelRegistry, SessionError> {
        let driver = self.driver_mut()?;
        let (down_count, up_count) = driver
            .rtt_read_channel_count()
            .map_err(|s| SessionError::driver(CallSite::ChannelCount, s))?;
        log.record(format!("{} down channels, {} up channels", down_count, up_count));

        let mut builder = ChannelRegistry::builder(down_count, up_count);
        for (direction, count) in [
            (ChannelDirection::Down, down_count),
            (ChannelDirection::Up, up_count),
        ] {
            for index in 0..count {
                let (name, size) = driver
                    .rtt_read_channel_info(direction, index)
                    .map_err(|s| SessionError::driver(CallSite::ChannelInfo, s))?;
                let channel = builder.push(direction, &name, size);
                debug!(
                    "Discovered {} channel {}: '{}' ({} bytes)",
                    direction, channel.index, channel.name, channel.buffer_size
                );
            }
        }
        Ok(builder.build())
    }

    /// Read up to `max_length` bytes from an up channel; an empty result is valid
    pub fn read(&mut self, channel_index: u32, max_length: u32) -> Result<Vec<u8>, SessionError> {
        self.check_channel(ChannelDirection::Up, channel_index)?;
        let driver = self.driver_mut()?;
        let mut data = driver
            .rtt_read(channel_index, max_length)
            .map_err(|s| SessionError::driver(CallSite::RttRead, s))?;
        if data.len() > max_length as usize {
            warn!(
                "Driver returned {} bytes for a {} byte read; truncating",
                data.len(),
                max_length
            );
            data.truncate(max_length as usize);
        }
        Ok(data)
    }

    /// Write into a down channel; returns how many bytes the target accepted
    pub fn write(&mut self, channel_index: u32, data: &[u8]) -> Result<u32, SessionError> {
        self.check_channel(ChannelDirection::Down, channel_index)?;
        let driver = self.driver_mut()?;
        let written = driver
            .rtt_write(channel_index, data)
            .map_err(|s| SessionError::driver(CallSite::RttWrite, s))?;
        Ok(written.min(data.len() as u32))
    }

    /// Tear down whatever is open; always ends in `Stopped`
    pub fn stop(&mut self, log: &mut DiagnosticLog) -> TeardownReport {
        let report = self.teardown();
        for failure in &report.failures {
            log.record(format!("Teardown: {}", failure));
        }
        self.registry = ChannelRegistry::default();
        self.state.transition(SessionState::Stopped);
        info!("RTT session stopped");
        report
    }

    fn teardown(&mut self) -> TeardownReport {
        let mut report = TeardownReport::default();
        let opened = std::mem::take(&mut self.opened);
        let Some(mut driver) = self.driver.take() else {
            return report;
        };

        let mut attempt = |site: CallSite, result: DriverResult<()>| {
            if let Err(status) = result {
                warn!("{} failed during teardown: {}", site.call_name(), status);
                report.failures.push(SessionError::driver(site, status));
            }
        };

        if opened.rtt_started {
            attempt(CallSite::RttStop, driver.rtt_stop());
        }
        if opened.device_connected {
            attempt(CallSite::DisconnectFromDevice, driver.disconnect_from_device());
        }
        if opened.probe_connected {
            attempt(CallSite::DisconnectFromProbe, driver.disconnect_from_probe());
        }
        if opened.driver_open {
            attempt(CallSite::CloseDriver, driver.close_driver());
        }
        report
    }

    fn check_channel(&self, direction: ChannelDirection, index: u32) -> Result<(), SessionError> {
        let state = self.state.current();
        if !state.is_ready() {
            return Err(SessionError::new(
                CallSite::SessionState,
                format!("session is {}, not Ready", state),
            ));
        }
        if !self.registry.contains(direction, index) {
            return Err(SessionError::new(
                CallSite::ChannelIndex,
                format!(
                    "{} channel {} does not exist ({} available)",
                    direction,
                    index,
                    self.registry.count(direction)
                ),
            ));
        }
        Ok(())
    }

    fn driver_mut(&mut self) -> Result<&mut Box<dyn RttDriver>, SessionError> {
        self.driver
            .as_mut()
            .ok_or_else(|| SessionError::new(CallSite::SessionState, "driver is not loaded"))
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if self.driver.is_some() {
            debug!("Session dropped with an open driver; tearing down");
            let _ = self.teardown();
        }
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("state", &self.state.current())
            .field("serial_number", &self.serial_number)
            .field("probe", &self.probe)
            .field("registry", &self.registry)
            .finish()
    }
}
