// Simulated module - In-process stand-in for a debug probe and RTT target
//
// The simulated backend implements the driver traits against ring buffers
// held in shared state, so sessions can be exercised without hardware. A
// `SimHandle` reaches into that state to inject failures, feed the target's
// up channels and inspect what the session called.

use crate::core::driver::{
    DeviceFamily, DriverResult, DriverStatus, ProbeBackend, ProbeDetails, RttDriver,
};
use crate::core::session::registry::ChannelDirection;
use crate::domain::config::{SimulatedChannelConfig, SimulatorConfig};
use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, trace};

/// Status returned when no probe answers to the requested serial number
pub const STATUS_NO_PROBE: i32 = -1;
/// Status returned when a call arrives in the wrong driver state
pub const STATUS_INVALID_STATE: i32 = -2;
/// Status returned for an unknown channel index
pub const STATUS_INVALID_CHANNEL: i32 = -3;

/// Driver entry points recorded in the call journal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SimCall {
    ProbeDetails,
    LoadDriver,
    OpenDriver,
    ConnectToProbe,
    ConnectToDevice,
    RttStart,
    ControlBlockFound,
    ChannelCount,
    ChannelInfo,
    RttRead,
    RttWrite,
    RttStop,
    DisconnectFromDevice,
    DisconnectFromProbe,
    CloseDriver,
}

/// Static description of the simulated probe and target
#[derive(Debug, Clone)]
pub struct SimulatedTarget {
    serial_numbers: Vec<u32>,
    clock_speed_khz: u32,
    device_family: DeviceFamily,
    library_path: PathBuf,
    control_block_after: u32,
    echo: bool,
    greeting: Vec<u8>,
    down_channels: Vec<SimulatedChannelConfig>,
    up_channels: Vec<SimulatedChannelConfig>,
}

impl SimulatedTarget {
    pub fn builder() -> SimulatedTargetBuilder {
        SimulatedTargetBuilder::default()
    }

    pub fn from_config(config: &SimulatorConfig) -> Self {
        Self {
            serial_numbers: config.serial_numbers.clone(),
            clock_speed_khz: config.clock_speed_khz,
            // FromStr for DeviceFamily cannot fail
            device_family: config
                .device_family
                .parse()
                .unwrap_or(DeviceFamily::Unknown),
            library_path: config.library_path.clone(),
            control_block_after: config.control_block_after,
            echo: config.echo,
            greeting: config.greeting.as_bytes().to_vec(),
            down_channels: config.down_channels.clone(),
            up_channels: config.up_channels.clone(),
        }
    }

    pub fn with_echo(mut self, echo: bool) -> Self {
        self.echo = echo;
        self
    }

    fn accepts(&self, serial_number: u32) -> bool {
        self.serial_numbers.is_empty() || self.serial_numbers.contains(&serial_number)
    }
}

impl Default for SimulatedTarget {
    fn default() -> Self {
        Self::from_config(&SimulatorConfig::default())
    }
}

/// Builder for [`SimulatedTarget`]; starts without channels
#[derive(Debug, Clone)]
pub struct SimulatedTargetBuilder {
    target: SimulatedTarget,
}

impl Default for SimulatedTargetBuilder {
    fn default() -> Self {
        let mut target = SimulatedTarget::default();
        target.down_channels.clear();
        target.up_channels.clear();
        target.control_block_after = 0;
        Self { target }
    }
}

impl SimulatedTargetBuilder {
    pub fn serial_number(mut self, serial_number: u32) -> Self {
        self.target.serial_numbers.push(serial_number);
        self
    }

    pub fn device_family(mut self, family: DeviceFamily) -> Self {
        self.target.device_family = family;
        self
    }

    pub fn control_block_after(mut self, polls: u32) -> Self {
        self.target.control_block_after = polls;
        self
    }

    pub fn echo(mut self, echo: bool) -> Self {
        self.target.echo = echo;
        self
    }

    pub fn greeting(mut self, text: &str) -> Self {
        self.target.greeting = text.as_bytes().to_vec();
        self
    }

    pub fn down_channel(mut self, channel: SimulatedChannelConfig) -> Self {
        self.target.down_channels.push(channel);
        self
    }

    pub fn up_channel(mut self, channel: SimulatedChannelConfig) -> Self {
        self.target.up_channels.push(channel);
        self
    }

    pub fn build(self) -> SimulatedTarget {
        self.target
    }
}

/// Fixed-capacity byte buffer of one channel
#[derive(Debug)]
struct ChannelBuffer {
    capacity: usize,
    bytes: VecDeque<u8>,
}

impl ChannelBuffer {
    fn new(capacity: u32) -> Self {
        Self {
            capacity: capacity as usize,
            bytes: VecDeque::new(),
        }
    }

    fn free(&self) -> usize {
        self.capacity.saturating_sub(self.bytes.len())
    }

    /// Append as much of `data` as fits
    fn push(&mut self, data: &[u8]) -> usize {
        let accepted = data.len().min(self.free());
        self.bytes.extend(&data[..accepted]);
        accepted
    }

    fn take(&mut self, max: usize) -> Vec<u8> {
        let count = max.min(self.bytes.len());
        self.bytes.drain(..count).collect()
    }
}

#[derive(Debug, Default, Clone, Copy)]
struct DriverFlags {
    open: bool,
    probe_connected: bool,
    device_connected: bool,
    rtt_started: bool,
}

#[derive(Debug)]
struct SimState {
    target: SimulatedTarget,
    flags: DriverFlags,
    failures: HashMap<SimCall, i32>,
    journal: Vec<SimCall>,
    resets: u32,
    polls: u32,
    down: Vec<ChannelBuffer>,
    up: Vec<ChannelBuffer>,
}

impl SimState {
    fn new(target: SimulatedTarget) -> Self {
        let mut state = Self {
            target,
            flags: DriverFlags::default(),
            failures: HashMap::new(),
            journal: Vec::new(),
            resets: 0,
            polls: 0,
            down: Vec::new(),
            up: Vec::new(),
        };
        state.reset_buffers();
        state
    }

    fn reset_buffers(&mut self) {
        self.down = self
            .target
            .down_channels
            .iter()
            .map(|c| ChannelBuffer::new(c.buffer_size))
            .collect();
        self.up = self
            .target
            .up_channels
            .iter()
            .map(|c| ChannelBuffer::new(c.buffer_size))
            .collect();
        if let Some(first) = self.up.first_mut() {
            first.push(&self.target.greeting);
        }
    }

    /// Journal the call and apply any injected failure
    fn enter(&mut self, call: SimCall) -> DriverResult<()> {
        trace!("simulated driver call {:?}", call);
        self.journal.push(call);
        match self.failures.get(&call) {
            Some(&status) => Err(DriverStatus(status)),
            None => Ok(()),
        }
    }

    fn require(&self, condition: bool) -> DriverResult<()> {
        if condition {
            Ok(())
        } else {
            Err(DriverStatus(STATUS_INVALID_STATE))
        }
    }

    fn write_down(&mut self, index: usize, data: &[u8]) -> DriverResult<u32> {
        let buffer = self
            .down
            .get_mut(index)
            .ok_or(DriverStatus(STATUS_INVALID_CHANNEL))?;
        let accepted = buffer.push(data);

        if self.target.echo {
            if let Some(up) = self.up.get_mut(index) {
                let pending = self.down[index].take(up.free());
                up.push(&pending);
            }
        }
        Ok(accepted as u32)
    }
}

/// Test and CLI access to the shared simulator state
#[derive(Debug, Clone)]
pub struct SimHandle {
    shared: Arc<Mutex<SimState>>,
}

impl SimHandle {
    fn lock(&self) -> MutexGuard<'_, SimState> {
        self.shared.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Make every following `call` fail with `status`
    pub fn fail(&self, call: SimCall, status: i32) {
        self.lock().failures.insert(call, status);
    }

    pub fn clear_failure(&self, call: SimCall) {
        self.lock().failures.remove(&call);
    }

    pub fn count_calls(&self, call: SimCall) -> usize {
        self.lock().journal.iter().filter(|c| **c == call).count()
    }

    /// Every driver call in order
    pub fn calls(&self) -> Vec<SimCall> {
        self.lock().journal.clone()
    }

    /// Number of target resets requested through the probe handle
    pub fn resets(&self) -> u32 {
        self.lock().resets
    }

    /// Emit bytes from the target on an up channel; returns how many fit
    pub fn push_up(&self, index: u32, data: &[u8]) -> usize {
        self.lock()
            .up
            .get_mut(index as usize)
            .map(|buffer| buffer.push(data))
            .unwrap_or(0)
    }

    /// Consume what the host wrote to a down channel
    pub fn take_down(&self, index: u32) -> Vec<u8> {
        self.lock()
            .down
            .get_mut(index as usize)
            .map(|buffer| buffer.take(usize::MAX))
            .unwrap_or_default()
    }
}

/// Probe backend backed by a [`SimulatedTarget`]
#[derive(Debug)]
pub struct SimulatedBackend {
    shared: Arc<Mutex<SimState>>,
}

impl SimulatedBackend {
    pub fn new(target: SimulatedTarget) -> Self {
        Self {
            shared: Arc::new(Mutex::new(SimState::new(target))),
        }
    }

    pub fn from_config(config: &SimulatorConfig) -> Self {
        Self::new(SimulatedTarget::from_config(config))
    }

    pub fn handle(&self) -> SimHandle {
        SimHandle {
            shared: Arc::clone(&self.shared),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SimState> {
        self.shared.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl ProbeBackend for SimulatedBackend {
    fn probe_details(&mut self, serial_number: u32, reset: bool) -> DriverResult<ProbeDetails> {
        let mut state = self.lock();
        state.enter(SimCall::ProbeDetails)?;
        if !state.target.accepts(serial_number) {
            return Err(DriverStatus(STATUS_NO_PROBE));
        }
        if reset {
            state.resets += 1;
            state.reset_buffers();
            debug!("Simulated target {} reset", serial_number);
        }
        Ok(ProbeDetails {
            clock_speed_khz: state.target.clock_speed_khz,
            device_family: state.target.device_family,
            library_path: state.target.library_path.clone(),
        })
    }

    fn load_driver(&mut self) -> DriverResult<Box<dyn RttDriver>> {
        self.lock().enter(SimCall::LoadDriver)?;
        Ok(Box::new(SimulatedDriver {
            shared: Arc::clone(&self.shared),
        }))
    }
}

/// Low-level driver half of the simulator
#[derive(Debug)]
pub struct SimulatedDriver {
    shared: Arc<Mutex<SimState>>,
}

impl SimulatedDriver {
    fn lock(&self) -> MutexGuard<'_, SimState> {
        self.shared.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl RttDriver for SimulatedDriver {
    fn open_driver(&mut self, library_path: &Path, family: DeviceFamily) -> DriverResult<()> {
        let mut state = self.lock();
        state.enter(SimCall::OpenDriver)?;
        debug!("Simulated driver opened ({}, {})", library_path.display(), family);
        state.flags.open = true;
        Ok(())
    }

    fn connect_to_probe(&mut self, serial_number: u32, clock_speed_khz: u32) -> DriverResult<()> {
        let mut state = self.lock();
        state.enter(SimCall::ConnectToProbe)?;
        state.require(state.flags.open)?;
        if !state.target.accepts(serial_number) {
            return Err(DriverStatus(STATUS_NO_PROBE));
        }
        trace!("Simulated probe {} at {} kHz", serial_number, clock_speed_khz);
        state.flags.probe_connected = true;
        Ok(())
    }

    fn connect_to_device(&mut self) -> DriverResult<()> {
        let mut state = self.lock();
        state.enter(SimCall::ConnectToDevice)?;
        state.require(state.flags.probe_connected)?;
        state.flags.device_connected = true;
        Ok(())
    }

    fn rtt_start(&mut self) -> DriverResult<()> {
        let mut state = self.lock();
        state.enter(SimCall::RttStart)?;
        state.require(state.flags.device_connected)?;
        state.flags.rtt_started = true;
        state.polls = 0;
        Ok(())
    }

    fn rtt_is_control_block_found(&mut self) -> DriverResult<bool> {
        let mut state = self.lock();
        state.enter(SimCall::ControlBlockFound)?;
        state.require(state.flags.rtt_started)?;
        state.polls += 1;
        Ok(state.polls > state.target.control_block_after)
    }

    fn rtt_read_channel_count(&mut self) -> DriverResult<(u32, u32)> {
        let mut state = self.lock();
        state.enter(SimCall::ChannelCount)?;
        state.require(state.flags.rtt_started)?;
        Ok((
            state.target.down_channels.len() as u32,
            state.target.up_channels.len() as u32,
        ))
    }

    fn rtt_read_channel_info(
        &mut self,
        direction: ChannelDirection,
        index: u32,
    ) -> DriverResult<(String, u32)> {
        let mut state = self.lock();
        state.enter(SimCall::ChannelInfo)?;
        state.require(state.flags.rtt_started)?;
        let channels = match direction {
            ChannelDirection::Down => &state.target.down_channels,
            ChannelDirection::Up => &state.target.up_channels,
        };
        channels
            .get(index as usize)
            .map(|c| (c.name.clone(), c.buffer_size))
            .ok_or(DriverStatus(STATUS_INVALID_CHANNEL))
    }

    fn rtt_read(&mut self, channel_index: u32, max_length: u32) -> DriverResult<Vec<u8>> {
        let mut state = self.lock();
        state.enter(SimCall::RttRead)?;
        state.require(state.flags.rtt_started)?;
        state
            .up
            .get_mut(channel_index as usize)
            .map(|buffer| buffer.take(max_length as usize))
            .ok_or(DriverStatus(STATUS_INVALID_CHANNEL))
    }

    fn rtt_write(&mut self, channel_index: u32, data: &[u8]) -> DriverResult<u32> {
        let mut state = self.lock();
        state.enter(SimCall::RttWrite)?;
        state.require(state.flags.rtt_started)?;
        state.write_down(channel_index as usize, data)
    }

    fn rtt_stop(&mut self) -> DriverResult<()> {
        let mut state = self.lock();
        state.enter(SimCall::RttStop)?;
        state.flags.rtt_started = false;
        Ok(())
    }

    fn disconnect_from_device(&mut self) -> DriverResult<()> {
        let mut state = self.lock();
        state.enter(SimCall::DisconnectFromDevice)?;
        state.flags.device_connected = false;
        Ok(())
    }

    fn disconnect_from_probe(&mut self) -> DriverResult<()> {
        let mut state = self.lock();
        state.enter(SimCall::DisconnectFromProbe)?;
        state.flags.probe_connected = false;
        Ok(())
    }

    fn close_driver(&mut self) -> DriverResult<()> {
        let mut state = self.lock();
        state.enter(SimCall::CloseDriver)?;
        state.flags = DriverFlags::default();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn channel(name: &str, size: u32) -> SimulatedChannelConfig {
        SimulatedChannelConfig {
            name: name.to_string(),
            buffer_size: size,
        }
    }

    fn started(target: SimulatedTarget) -> (SimHandle, Box<dyn RttDriver>) {
        let mut backend = SimulatedBackend::new(target);
        let handle = backend.handle();
        let details = backend.probe_details(1, true).unwrap();
        let mut driver = backend.load_driver().unwrap();
        driver
            .open_driver(&details.library_path, details.device_family)
            .unwrap();
        driver.connect_to_probe(1, details.clock_speed_khz).unwrap();
        driver.connect_to_device().unwrap();
        driver.rtt_start().unwrap();
        (handle, driver)
    }

    #[test]
    fn test_control_block_appears_after_configured_polls() {
        let target = SimulatedTarget::builder().control_block_after(2).build();
        let (handle, mut driver) = started(target);

        assert!(!driver.rtt_is_control_block_found().unwrap());
        assert!(!driver.rtt_is_control_block_found().unwrap());
        assert!(driver.rtt_is_control_block_found().unwrap());
        assert_eq!(handle.count_calls(SimCall::ControlBlockFound), 3);
        assert_eq!(handle.resets(), 1);
    }

    #[test]
    fn test_echo_moves_down_bytes_to_up_channel() {
        let target = SimulatedTarget::builder()
            .down_channel(channel("Terminal", 16))
            .up_channel(channel("Terminal", 4))
            .build();
        let (handle, mut driver) = started(target);

        assert_eq!(driver.rtt_write(0, b"hello").unwrap(), 5);
        assert_eq!(driver.rtt_read(0, 64).unwrap(), b"hell".to_vec());
        // the byte that did not fit stays in the down buffer
        assert_eq!(handle.take_down(0), b"o".to_vec());
    }

    #[test]
    fn test_greeting_and_push_up() {
        let target = SimulatedTarget::builder()
            .greeting("hi ")
            .up_channel(channel("Terminal", 8))
            .build();
        let (handle, mut driver) = started(target);

        assert_eq!(handle.push_up(0, b"there!"), 5);
        assert_eq!(driver.rtt_read(0, 3).unwrap(), b"hi ".to_vec());
        assert_eq!(driver.rtt_read(0, 64).unwrap(), b"there".to_vec());
        assert!(driver.rtt_read(0, 64).unwrap().is_empty());
        assert_eq!(handle.push_up(5, b"x"), 0);
    }

    #[test]
    fn test_injected_failure_and_unknown_serial() {
        let target = SimulatedTarget::builder().serial_number(7).build();
        let mut backend = SimulatedBackend::new(target);
        let handle = backend.handle();

        assert_eq!(
            backend.probe_details(8, false).unwrap_err(),
            DriverStatus(STATUS_NO_PROBE)
        );
        assert!(backend.probe_details(7, false).is_ok());

        handle.fail(SimCall::LoadDriver, -42);
        assert_eq!(backend.load_driver().err(), Some(DriverStatus(-42)));
        handle.clear_failure(SimCall::LoadDriver);
        assert!(backend.load_driver().is_ok());
        assert_eq!(
            handle.calls(),
            vec![
                SimCall::ProbeDetails,
                SimCall::ProbeDetails,
                SimCall::LoadDriver,
                SimCall::LoadDriver
            ]
        );
    }

    #[test]
    fn test_calls_out_of_order_are_rejected() {
        let mut backend = SimulatedBackend::new(SimulatedTarget::default());
        let mut driver = backend.load_driver().unwrap();
        assert_eq!(
            driver.connect_to_device().unwrap_err(),
            DriverStatus(STATUS_INVALID_STATE)
        );
        assert!(driver.rtt_read(0, 1).is_err());
    }
}
