use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Closed set of session-level error kinds delivered to completion callbacks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    /// Wrong argument count or types
    ArgumentError,
    /// Initial probe/driver discovery failed
    NoProbeConnected,
    /// The resolved driver library could not be opened
    DriverLoadFailed,
    /// Driver open reported resource exhaustion
    OutOfResources,
    /// Connecting to the probe by serial number failed
    ProbeConnectionFailed,
    /// Connecting to the target device failed
    DeviceConnectionFailed,
    /// Starting RTT on the target failed
    RttStartFailed,
    /// Control block discovery exhausted its bound
    ControlBlockNotFound,
    /// Channel count or channel info query failed
    ChannelQueryFailed,
    /// Generic execute-step failure
    OperationFailed,
}

impl ErrorKind {
    /// All kinds, in code order
    pub const ALL: [ErrorKind; 10] = [
        ErrorKind::ArgumentError,
        ErrorKind::NoProbeConnected,
        ErrorKind::DriverLoadFailed,
        ErrorKind::OutOfResources,
        ErrorKind::ProbeConnectionFailed,
        ErrorKind::DeviceConnectionFailed,
        ErrorKind::RttStartFailed,
        ErrorKind::ControlBlockNotFound,
        ErrorKind::ChannelQueryFailed,
        ErrorKind::OperationFailed,
    ];

    /// Stable numeric code
    pub fn code(self) -> u32 {
        match self {
            ErrorKind::ArgumentError => 1,
            ErrorKind::NoProbeConnected => 2,
            ErrorKind::DriverLoadFailed => 3,
            ErrorKind::OutOfResources => 4,
            ErrorKind::ProbeConnectionFailed => 5,
            ErrorKind::DeviceConnectionFailed => 6,
            ErrorKind::RttStartFailed => 7,
            ErrorKind::ControlBlockNotFound => 8,
            ErrorKind::ChannelQueryFailed => 9,
            ErrorKind::OperationFailed => 10,
        }
    }

    /// Human readable description
    pub fn description(self) -> &'static str {
        match self {
            ErrorKind::ArgumentError => "invalid arguments",
            ErrorKind::NoProbeConnected => "no debug probe connected",
            ErrorKind::DriverLoadFailed => "could not load the probe driver library",
            ErrorKind::OutOfResources => "driver ran out of resources while opening",
            ErrorKind::ProbeConnectionFailed => "could not connect to the debug probe",
            ErrorKind::DeviceConnectionFailed => "could not connect to the target device",
            ErrorKind::RttStartFailed => "could not start RTT on the target",
            ErrorKind::ControlBlockNotFound => "RTT control block not found",
            ErrorKind::ChannelQueryFailed => "could not query RTT channels",
            ErrorKind::OperationFailed => "operation failed",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Debug::fmt(self, f)
    }
}

/// Error delivered as the first completion value of a failed task
#[derive(Error, Debug, Clone, PartialEq, Serialize)]
#[error("{operation}: {kind} ({message})")]
pub struct TaskError {
    /// Session-level kind
    pub kind: ErrorKind,
    /// Name of the operation that failed
    pub operation: String,
    /// Description of the failure point
    pub message: String,
    /// Raw status code reported by the driver, if any
    pub lowlevel_status: Option<i32>,
    /// Diagnostic log captured while the task ran
    pub log: String,
}

impl TaskError {
    pub fn new(kind: ErrorKind, operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind,
            operation: operation.into(),
            message: message.into(),
            lowlevel_status: None,
            log: String::new(),
        }
    }

    pub fn argument(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ArgumentError, operation, message)
    }
}

/// RttCom unified error type
#[derive(Error, Debug)]
pub enum RttComError {
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Dispatcher wiring error: {0}")]
    Wiring(String),

    #[error("Task error: {0}")]
    Task(#[from] TaskError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Session error: {message}")]
    Session { message: String },

    #[error("Dispatcher is no longer running")]
    DispatcherClosed,

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Output error: {0}")]
    Output(String),
}

impl RttComError {
    /// Session-level kind when the error came from a task
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            RttComError::Task(task) => Some(task.kind),
            _ => None,
        }
    }
}

pub type RttComResult<T> = Result<T, RttComError>;
