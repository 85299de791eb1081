use crate::core::dispatch::operations::{ExecuteFn, OperationKind};
use crate::core::session::registry::Channel;
use crate::core::session::session::StartOptions;
use crate::domain::error::TaskError;
use serde_json::{Map, Value};
use tracing::debug;

/// Identifier handed out by the dispatcher, increasing in submission order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(pub u64);

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Task progress
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    Pending,
    Running,
    Completed,
}

/// Free text gathered while one task runs
#[derive(Debug, Clone, Default)]
pub struct DiagnosticLog {
    text: String,
}

impl DiagnosticLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one line; also emitted at debug level
    pub fn record(&mut self, message: impl AsRef<str>) {
        let message = message.as_ref();
        debug!(target: "rttcom::task", "{}", message);
        self.text.push_str(message);
        self.text.push('\n');
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn clear(&mut self) {
        self.text.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }
}

/// Operation-specific parameters and results carried through a task
#[derive(Debug, Clone, PartialEq)]
pub enum TaskData {
    Start {
        serial_number: u32,
        options: StartOptions,
        down_channels: Vec<Channel>,
        up_channels: Vec<Channel>,
    },
    Stop,
    Read {
        channel_index: u32,
        max_length: u32,
        data: Vec<u8>,
    },
    Write {
        channel_index: u32,
        data: Vec<u8>,
        written: u32,
    },
}

/// One unit of asynchronous work
///
/// Owned by the dispatcher from submission until its completion is delivered.
#[derive(Debug)]
pub struct Task {
    pub id: TaskId,
    pub kind: OperationKind,
    pub name: &'static str,
    pub data: TaskData,
    pub result_arity: usize,
    pub state: TaskState,
    pub result: Result<(), TaskError>,
    pub log: DiagnosticLog,
    pub(crate) execute: ExecuteFn,
}

impl Task {
    pub(crate) fn new(
        id: TaskId,
        kind: OperationKind,
        name: &'static str,
        data: TaskData,
        result_arity: usize,
        execute: ExecuteFn,
    ) -> Self {
        Self {
            id,
            kind,
            name,
            data,
            result_arity,
            state: TaskState::Pending,
            result: Ok(()),
            log: DiagnosticLog::new(),
            execute,
        }
    }
}

/// Positional reader over the raw parameters of one call
#[derive(Debug)]
pub struct ArgCursor<'a> {
    operation: &'static str,
    args: &'a [Value],
    position: usize,
}

impl<'a> ArgCursor<'a> {
    pub fn new(operation: &'static str, args: &'a [Value]) -> Self {
        Self {
            operation,
            args,
            position: 0,
        }
    }

    /// Number of parameters consumed so far
    pub fn position(&self) -> usize {
        self.position
    }

    pub fn remaining(&self) -> usize {
        self.args.len().saturating_sub(self.position)
    }

    fn next(&mut self, expected: &str) -> Result<&'a Value, TaskError> {
        let value = self.args.get(self.position).ok_or_else(|| {
            TaskError::argument(
                self.operation,
                format!("Argument {} ({}) is missing", self.position, expected),
            )
        })?;
        self.position += 1;
        Ok(value)
    }

    fn type_error(&self, expected: &str, found: &Value) -> TaskError {
        TaskError::argument(
            self.operation,
            format!(
                "Argument {} must be {}, got {}",
                self.position - 1,
                expected,
                type_name(found)
            ),
        )
    }

    pub fn next_u32(&mut self) -> Result<u32, TaskError> {
        let value = self.next("an unsigned 32-bit integer")?;
        whole_number(value)
            .and_then(|n| u32::try_from(n).ok())
            .ok_or_else(|| self.type_error("an unsigned 32-bit integer", value))
    }

    pub fn next_object(&mut self) -> Result<&'a Map<String, Value>, TaskError> {
        let value = self.next("an object")?;
        value
            .as_object()
            .ok_or_else(|| self.type_error("an object", value))
    }

    /// Bytes given either as an array of 0..=255 numbers or as a string
    pub fn next_bytes(&mut self) -> Result<Vec<u8>, TaskError> {
        let value = self.next("a byte array")?;
        match value {
            Value::String(text) => Ok(text.as_bytes().to_vec()),
            Value::Array(items) => items
                .iter()
                .map(|item| {
                    whole_number(item)
                        .and_then(|n| u8::try_from(n).ok())
                        .ok_or_else(|| self.type_error("an array of bytes", value))
                })
                .collect(),
            other => Err(self.type_error("a byte array", other)),
        }
    }
}

/// Non-negative integer, also when the host sent it as a whole double such as `64.0`
fn whole_number(value: &Value) -> Option<u64> {
    if let Some(n) = value.as_u64() {
        return Some(n);
    }
    let n = value.as_f64()?;
    if n >= 0.0 && n.fract() == 0.0 && n <= u64::MAX as f64 {
        Some(n as u64)
    } else {
        None
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "undefined",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
