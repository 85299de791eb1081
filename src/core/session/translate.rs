//! Maps driver failures to session-level error kinds.
//!
//! Every driver call the session makes is identified by a [`CallSite`]; the
//! kind reported for a failure depends only on where it happened.

use crate::core::dispatch::task::DiagnosticLog;
use crate::core::driver::DriverStatus;
use crate::domain::error::{ErrorKind, TaskError};
use thiserror::Error;

/// Place in the session where a failure was detected
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallSite {
    ProbeDetails,
    LoadDriver,
    OpenDriver,
    ConnectToProbe,
    ConnectToDevice,
    RttStart,
    ControlBlockSearch,
    ChannelCount,
    ChannelInfo,
    RttRead,
    RttWrite,
    RttStop,
    DisconnectFromDevice,
    DisconnectFromProbe,
    CloseDriver,
    /// Operation not valid in the current session state
    SessionState,
    /// Channel index outside the discovered range
    ChannelIndex,
    /// Execute step aborted unexpectedly
    Execute,
}

impl CallSite {
    /// Static kind table
    pub fn kind(self) -> ErrorKind {
        match self {
            CallSite::ProbeDetails => ErrorKind::NoProbeConnected,
            CallSite::LoadDriver => ErrorKind::DriverLoadFailed,
            CallSite::OpenDriver => ErrorKind::OutOfResources,
            CallSite::ConnectToProbe => ErrorKind::ProbeConnectionFailed,
            CallSite::ConnectToDevice => ErrorKind::DeviceConnectionFailed,
            CallSite::RttStart => ErrorKind::RttStartFailed,
            CallSite::ControlBlockSearch => ErrorKind::ControlBlockNotFound,
            CallSite::ChannelCount | CallSite::ChannelInfo => ErrorKind::ChannelQueryFailed,
            CallSite::RttRead
            | CallSite::RttWrite
            | CallSite::RttStop
            | CallSite::DisconnectFromDevice
            | CallSite::DisconnectFromProbe
            | CallSite::CloseDriver
            | CallSite::SessionState
            | CallSite::ChannelIndex
            | CallSite::Execute => ErrorKind::OperationFailed,
        }
    }

    /// Driver call name used in messages
    pub fn call_name(self) -> &'static str {
        match self {
            CallSite::ProbeDetails => "probe_details",
            CallSite::LoadDriver => "load_driver",
            CallSite::OpenDriver => "open_driver",
            CallSite::ConnectToProbe => "connect_to_probe",
            CallSite::ConnectToDevice => "connect_to_device",
            CallSite::RttStart => "rtt_start",
            CallSite::ControlBlockSearch => "rtt_is_control_block_found",
            CallSite::ChannelCount => "rtt_read_channel_count",
            CallSite::ChannelInfo => "rtt_read_channel_info",
            CallSite::RttRead => "rtt_read",
            CallSite::RttWrite => "rtt_write",
            CallSite::RttStop => "rtt_stop",
            CallSite::DisconnectFromDevice => "disconnect_from_device",
            CallSite::DisconnectFromProbe => "disconnect_from_probe",
            CallSite::CloseDriver => "close_driver",
            CallSite::SessionState => "session state check",
            CallSite::ChannelIndex => "channel index check",
            CallSite::Execute => "execute",
        }
    }
}

/// Failure raised inside the session, before translation
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{} failed: {detail}", site.call_name())]
pub struct SessionError {
    pub site: CallSite,
    pub status: Option<DriverStatus>,
    pub detail: String,
}

impl SessionError {
    pub fn new(site: CallSite, detail: impl Into<String>) -> Self {
        Self {
            site,
            status: None,
            detail: detail.into(),
        }
    }

    pub fn driver(site: CallSite, status: DriverStatus) -> Self {
        Self {
            site,
            status: Some(status),
            detail: status.to_string(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        self.site.kind()
    }
}

/// Turn a session failure into the error a completion receives
pub fn translate(operation: &str, error: &SessionError, log: &DiagnosticLog) -> TaskError {
    TaskError {
        kind: error.kind(),
        operation: operation.to_string(),
        message: error.to_string(),
        lowlevel_status: error.status.map(DriverStatus::code),
        log: log.text().to_string(),
    }
}
