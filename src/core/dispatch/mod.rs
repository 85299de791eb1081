// Dispatch module - Task queue between the caller thread and the session
pub mod client;
pub mod dispatcher;
pub mod operations;
pub mod task;

pub use client::RttClient;
pub use dispatcher::{Completion, Dispatcher};
pub use operations::{OperationKind, OperationSpec, OperationTable};
pub use task::{ArgCursor, DiagnosticLog, Task, TaskData, TaskId, TaskState};
