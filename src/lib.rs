//! RttCom Library
//!
//! Asynchronous RTT (Real-Time Transfer) session layer: a task dispatcher
//! that runs blocking debug-probe driver calls off the caller's thread, the
//! session state machine, the channel registry and the translation of driver
//! failures into typed errors.

pub mod cli;
pub mod core;
pub mod domain;
pub mod infrastructure;

pub use domain::error::{ErrorKind, RttComError, RttComResult, TaskError};
pub use domain::config::RttComConfig;
pub use core::dispatch::{Dispatcher, OperationKind, RttClient, TaskId};
pub use core::session::{Channel, ChannelDirection, Session, SessionState, StartOptions};
