//! The caller-facing RTT operations and the table the dispatcher looks them up in.
//!
//! Each operation is split into a parse step (caller thread), an execute step
//! (worker thread, sole access to the session) and an optional format step
//! (caller thread, turns task data into result values).

use crate::core::dispatch::task::{ArgCursor, DiagnosticLog, TaskData};
use crate::core::session::{
    session::{Session, StartOptions},
    translate::{CallSite, SessionError},
};
use crate::domain::error::TaskError;
use serde_json::Value;
use std::collections::HashMap;

pub type ParseFn = fn(&mut ArgCursor<'_>) -> Result<TaskData, TaskError>;
pub type ExecuteFn = fn(&mut Session, &mut TaskData, &mut DiagnosticLog) -> Result<(), SessionError>;
pub type FormatFn = fn(&TaskData) -> Vec<Value>;

/// Operation identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationKind {
    Start,
    Stop,
    Read,
    Write,
}

impl OperationKind {
    pub fn name(self) -> &'static str {
        match self {
            OperationKind::Start => "start",
            OperationKind::Stop => "stop",
            OperationKind::Read => "read",
            OperationKind::Write => "write",
        }
    }
}

impl std::fmt::Display for OperationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Registered steps of one operation
#[derive(Debug, Clone, Copy)]
pub struct OperationSpec {
    pub name: &'static str,
    /// Result values delivered after the error slot
    pub result_arity: usize,
    pub parse: Option<ParseFn>,
    pub execute: Option<ExecuteFn>,
    pub format: Option<FormatFn>,
}

/// Lookup of operation steps by kind
#[derive(Debug, Clone, Default)]
pub struct OperationTable {
    operations: HashMap<OperationKind, OperationSpec>,
}

impl OperationTable {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Table with start, stop, read and write registered
    pub fn rtt() -> Self {
        let mut table = Self::empty();
        table.register(
            OperationKind::Start,
            OperationSpec {
                name: "start",
                result_arity: 2,
                parse: Some(parse_start),
                execute: Some(execute_start),
                format: Some(format_start),
            },
        );
        table.register(
            OperationKind::Stop,
            OperationSpec {
                name: "stop",
                result_arity: 0,
                parse: Some(parse_stop),
                execute: Some(execute_stop),
                format: None,
            },
        );
        table.register(
            OperationKind::Read,
            OperationSpec {
                name: "read",
                result_arity: 2,
                parse: Some(parse_read),
                execute: Some(execute_read),
                format: Some(format_read),
            },
        );
        table.register(
            OperationKind::Write,
            OperationSpec {
                name: "write",
                result_arity: 1,
                parse: Some(parse_write),
                execute: Some(execute_write),
                format: Some(format_write),
            },
        );
        table
    }

    pub fn register(&mut self, kind: OperationKind, entry: OperationSpec) {
        self.operations.insert(kind, entry);
    }

    pub fn get(&self, kind: OperationKind) -> Option<&OperationSpec> {
        self.operations.get(&kind)
    }
}

fn mismatch(expected: OperationKind) -> SessionError {
    SessionError::new(
        CallSite::Execute,
        format!("task data does not belong to {}", expected),
    )
}

fn parse_start(args: &mut ArgCursor<'_>) -> Result<TaskData, TaskError> {
    let serial_number = args.next_u32()?;
    let raw_options = args.next_object()?;
    let options: StartOptions = serde_json::from_value(Value::Object(raw_options.clone()))
        .map_err(|e| TaskError::argument("start", format!("Invalid start options: {}", e)))?;

    Ok(TaskData::Start {
        serial_number,
        options,
        down_channels: Vec::new(),
        up_channels: Vec::new(),
    })
}

fn execute_start(
    session: &mut Session,
    data: &mut TaskData,
    log: &mut DiagnosticLog,
) -> Result<(), SessionError> {
    let TaskData::Start {
        serial_number,
        options,
        down_channels,
        up_channels,
    } = data
    else {
        return Err(mismatch(OperationKind::Start));
    };

    let registry = session.start(*serial_number, options, log)?;
    *down_channels = registry.down_channels().to_vec();
    *up_channels = registry.up_channels().to_vec();
    Ok(())
}

fn format_start(data: &TaskData) -> Vec<Value> {
    match data {
        TaskData::Start {
            down_channels,
            up_channels,
            ..
        } => vec![
            serde_json::to_value(down_channels).unwrap_or_default(),
            serde_json::to_value(up_channels).unwrap_or_default(),
        ],
        _ => Vec::new(),
    }
}

fn parse_stop(_args: &mut ArgCursor<'_>) -> Result<TaskData, TaskError> {
    Ok(TaskData::Stop)
}

fn execute_stop(
    session: &mut Session,
    _data: &mut TaskData,
    log: &mut DiagnosticLog,
) -> Result<(), SessionError> {
    let report = session.stop(log);
    if !report.is_clean() {
        log.record(format!(
            "Stopped with {} teardown failure(s)",
            report.failures.len()
        ));
    }
    Ok(())
}

fn parse_read(args: &mut ArgCursor<'_>) -> Result<TaskData, TaskError> {
    let channel_index = args.next_u32()?;
    let max_length = args.next_u32()?;
    Ok(TaskData::Read {
        channel_index,
        max_length,
        data: Vec::new(),
    })
}

fn execute_read(
    session: &mut Session,
    data: &mut TaskData,
    log: &mut DiagnosticLog,
) -> Result<(), SessionError> {
    let TaskData::Read {
        channel_index,
        max_length,
        data,
    } = data
    else {
        return Err(mismatch(OperationKind::Read));
    };

    *data = session.read(*channel_index, *max_length)?;
    log.record(format!(
        "Read {} of {} bytes from up channel {}",
        data.len(),
        max_length,
        channel_index
    ));
    Ok(())
}

fn format_read(data: &TaskData) -> Vec<Value> {
    match data {
        TaskData::Read { data, .. } => vec![
            Value::String(String::from_utf8_lossy(data).into_owned()),
            Value::Array(data.iter().map(|b| Value::from(*b)).collect()),
        ],
        _ => Vec::new(),
    }
}

fn parse_write(args: &mut ArgCursor<'_>) -> Result<TaskData, TaskError> {
    let channel_index = args.next_u32()?;
    let data = args.next_bytes()?;
    Ok(TaskData::Write {
        channel_index,
        data,
        written: 0,
    })
}

fn execute_write(
    session: &mut Session,
    data: &mut TaskData,
    log: &mut DiagnosticLog,
) -> Result<(), SessionError> {
    let TaskData::Write {
        channel_index,
        data,
        written,
    } = data
    else {
        return Err(mismatch(OperationKind::Write));
    };

    *written = session.write(*channel_index, data)?;
    log.record(format!(
        "Wrote {} of {} bytes to down channel {}",
        written,
        data.len(),
        channel_index
    ));
    Ok(())
}

fn format_write(data: &TaskData) -> Vec<Value> {
    match data {
        TaskData::Write { written, .. } => vec![Value::from(*written)],
        _ => Vec::new(),
    }
}
