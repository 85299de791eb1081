use crate::core::dispatch::{
    operations::{FormatFn, OperationKind, OperationTable},
    task::{ArgCursor, Task, TaskId, TaskState},
};
use crate::core::session::{
    session::Session,
    state::SessionState,
    translate::{translate, CallSite, SessionError},
};
use crate::domain::error::{ErrorKind, RttComError, RttComResult, TaskError};
use serde_json::Value;
use std::any::Any;
use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

/// Completion handler: `(error, result values)`
pub type Completion = Box<dyn FnOnce(Option<TaskError>, Vec<Value>)>;

/// Caller-side half of a submitted task
struct PendingCompletion {
    name: &'static str,
    result_arity: usize,
    format: Option<FormatFn>,
    completion: Completion,
}

/// Runs operations against the session off the caller's thread
///
/// The dispatcher lives on the caller's side: `submit` parses on the calling
/// thread, a single executor hands the session to one blocking worker at a
/// time in submission order, and completions are delivered back when the
/// caller drives [`Dispatcher::deliver_ready`], [`Dispatcher::deliver_next`]
/// or [`Dispatcher::drain`].
pub struct Dispatcher {
    operations: OperationTable,
    work_tx: Option<mpsc::UnboundedSender<Task>>,
    done_rx: mpsc::UnboundedReceiver<Task>,
    pending: HashMap<TaskId, PendingCompletion>,
    next_id: u64,
    state_rx: watch::Receiver<SessionState>,
    executor: Option<JoinHandle<()>>,
}

impl Dispatcher {
    /// Dispatcher with the RTT operations registered. Must be called inside a tokio runtime.
    pub fn new(session: Session) -> Self {
        Self::with_operations(session, OperationTable::rtt())
    }

    pub fn with_operations(session: Session, operations: OperationTable) -> Self {
        let state_rx = session.subscribe();
        let (work_tx, work_rx) = mpsc::unbounded_channel();
        let (done_tx, done_rx) = mpsc::unbounded_channel();
        let executor = tokio::spawn(run_executor(session, work_rx, done_tx));

        Self {
            operations,
            work_tx: Some(work_tx),
            done_rx,
            pending: HashMap::new(),
            next_id: 0,
            state_rx,
            executor: Some(executor),
        }
    }

    /// Parse `args` for `kind` and queue the task
    ///
    /// Wiring defects and argument errors are returned here and the
    /// completion is dropped uncalled; otherwise the completion runs exactly
    /// once, during a later delivery call.
    pub fn submit<F>(&mut self, kind: OperationKind, args: Vec<Value>, completion: F) -> RttComResult<TaskId>
    where
        F: FnOnce(Option<TaskError>, Vec<Value>) + 'static,
    {
        let entry = *self.operations.get(kind).ok_or_else(|| {
            RttComError::Wiring(format!("operation '{}' is not registered", kind))
        })?;

        let (Some(parse), Some(execute)) = (entry.parse, entry.execute) else {
            return Err(RttComError::Wiring(format!(
                "One or more of the parse, or execute functions is missing for {}",
                entry.name
            )));
        };
        if entry.format.is_none() && entry.result_arity > 0 {
            return Err(RttComError::Wiring(format!(
                "{} returns {} values but has no format function",
                entry.name, entry.result_arity
            )));
        }

        let mut cursor = ArgCursor::new(entry.name, &args);
        let data = parse(&mut cursor)?;
        if cursor.remaining() > 0 {
            // the completion handler counts as a parameter
            return Err(TaskError::argument(
                entry.name,
                format!(
                    "Too many parameters. The function {} does not take {} parameters.",
                    entry.name,
                    args.len() + 1
                ),
            )
            .into());
        }

        let id = TaskId(self.next_id);
        self.next_id += 1;

        let mut task = Task::new(id, kind, entry.name, data, entry.result_arity, execute);
        task.log.record(format!("Start of {} {}", entry.name, id));

        self.work_tx
            .as_ref()
            .ok_or(RttComError::DispatcherClosed)?
            .send(task)
            .map_err(|_| RttComError::DispatcherClosed)?;
        self.pending.insert(
            id,
            PendingCompletion {
                name: entry.name,
                result_arity: entry.result_arity,
                format: entry.format,
                completion: Box::new(completion),
            },
        );
        debug!("Queued {} {}", entry.name, id);
        Ok(id)
    }

    /// Deliver every completion that is already available without waiting
    pub fn deliver_ready(&mut self) -> usize {
        let mut delivered = 0;
        while let Ok(task) = self.done_rx.try_recv() {
            self.complete(task);
            delivered += 1;
        }
        delivered
    }

    /// Wait for the next completion and deliver it; `None` when nothing is pending
    pub async fn deliver_next(&mut self) -> RttComResult<Option<TaskId>> {
        if self.pending.is_empty() {
            return Ok(None);
        }
        let task = self
            .done_rx
            .recv()
            .await
            .ok_or(RttComError::DispatcherClosed)?;
        let id = task.id;
        self.complete(task);
        Ok(Some(id))
    }

    /// Deliver completions until no task is pending
    pub async fn drain(&mut self) -> RttComResult<usize> {
        let mut delivered = 0;
        while self.deliver_next().await?.is_some() {
            delivered += 1;
        }
        Ok(delivered)
    }

    /// Tasks submitted but not yet delivered
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Latest published session state
    pub fn session_state(&self) -> SessionState {
        *self.state_rx.borrow()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<SessionState> {
        self.state_rx.clone()
    }

    /// Deliver outstanding completions, then stop the executor and release the session
    pub async fn shutdown(mut self) -> RttComResult<()> {
        self.drain().await?;
        self.work_tx = None;
        match self.executor.take() {
            Some(executor) => executor.await.map_err(|e| RttComError::Session {
                message: format!("executor failed: {}", e),
            }),
            None => Ok(()),
        }
    }

    fn complete(&mut self, task: Task) {
        let Some(pending) = self.pending.remove(&task.id) else {
            warn!("Completed task {} has no pending completion", task.id);
            return;
        };

        let (error, values) = match task.result {
            Err(error) => (Some(error), vec![Value::Null; pending.result_arity]),
            Ok(()) => {
                let mut values = pending
                    .format
                    .map(|format| format(&task.data))
                    .unwrap_or_default();
                if values.len() != pending.result_arity {
                    warn!(
                        "{} produced {} result values, expected {}",
                        pending.name,
                        values.len(),
                        pending.result_arity
                    );
                    values.resize(pending.result_arity, Value::Null);
                }
                (None, values)
            }
        };

        debug!(
            "Delivering {} {} ({})",
            pending.name,
            task.id,
            if error.is_some() { "error" } else { "ok" }
        );
        (pending.completion)(error, values);
    }
}

impl Drop for Dispatcher {
    /// Completions still pending fail in submission order; the executor
    /// finishes the queued work and then releases the session.
    fn drop(&mut self) {
        if self.pending.is_empty() {
            return;
        }
        warn!(
            "Dispatcher dropped with {} undelivered completions",
            self.pending.len()
        );

        let mut pending: Vec<_> = self.pending.drain().collect();
        pending.sort_by_key(|(id, _)| *id);
        for (id, pending) in pending {
            let error = TaskError::new(
                ErrorKind::OperationFailed,
                pending.name,
                format!("dispatcher dropped before delivery of {} {}", pending.name, id),
            );
            (pending.completion)(Some(error), vec![Value::Null; pending.result_arity]);
        }
    }
}

/// Executes queued tasks one at a time; the session moves into each worker and back
async fn run_executor(
    session: Session,
    mut work_rx: mpsc::UnboundedReceiver<Task>,
    done_tx: mpsc::UnboundedSender<Task>,
) {
    let mut session = session;

    while let Some(mut task) = work_rx.recv().await {
        task.state = TaskState::Running;
        let worker = tokio::task::spawn_blocking(move || {
            execute_task(&mut session, &mut task);
            (session, task)
        });

        let (returned, task) = match worker.await {
            Ok(pair) => pair,
            Err(e) => {
                error!("Worker thread was lost: {}", e);
                return;
            }
        };
        session = returned;

        if done_tx.send(task).is_err() {
            debug!("Dispatcher dropped; completion discarded");
        }
    }

    // teardown may block on the driver
    let _ = tokio::task::spawn_blocking(move || drop(session)).await;
    debug!("Executor stopped");
}

fn execute_task(session: &mut Session, task: &mut Task) {
    let execute = task.execute;
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
        execute(session, &mut task.data, &mut task.log)
    }));

    let result = match outcome {
        Ok(result) => result,
        Err(payload) => Err(SessionError::new(
            CallSite::Execute,
            format!("execute step panicked: {}", panic_message(payload.as_ref())),
        )),
    };

    task.log.record(format!("End of {} {}", task.name, task.id));
    task.result = result.map_err(|e| translate(task.name, &e, &task.log));
    task.state = TaskState::Completed;
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::config::DiscoveryConfig;
    use crate::domain::error::ErrorKind;
    use crate::infrastructure::simulated::{SimulatedBackend, SimulatedTarget};
    use serde_json::json;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn dispatcher() -> Dispatcher {
        let backend = SimulatedBackend::new(SimulatedTarget::default());
        Dispatcher::new(Session::new(Box::new(backend), DiscoveryConfig::default()))
    }

    type Calls = Rc<RefCell<Vec<(Option<TaskError>, Vec<Value>)>>>;

    fn recorder() -> (Calls, impl Fn() -> Completion) {
        let calls: Calls = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&calls);
        let make = move || -> Completion {
            let sink = Rc::clone(&sink);
            Box::new(move |error, values| sink.borrow_mut().push((error, values)))
        };
        (calls, make)
    }

    #[tokio::test]
    async fn test_stop_completes_without_values() {
        let mut dispatcher = dispatcher();
        let (calls, make) = recorder();

        dispatcher.submit(OperationKind::Stop, vec![], make()).unwrap();
        assert_eq!(dispatcher.pending_count(), 1);
        assert_eq!(dispatcher.drain().await.unwrap(), 1);

        let calls = calls.borrow();
        assert_eq!(calls.len(), 1);
        assert!(calls[0].0.is_none());
        assert!(calls[0].1.is_empty());
        assert_eq!(dispatcher.session_state(), SessionState::Stopped);
    }

    #[tokio::test]
    async fn test_too_many_parameters_is_rejected_synchronously() {
        let mut dispatcher = dispatcher();
        let (calls, make) = recorder();

        let error = dispatcher
            .submit(OperationKind::Read, vec![json!(0), json!(64), json!("extra")], make())
            .unwrap_err();
        assert_eq!(error.kind(), Some(ErrorKind::ArgumentError));
        assert!(error
            .to_string()
            .contains("The function read does not take 4 parameters"));
        assert_eq!(dispatcher.pending_count(), 0);
        assert_eq!(dispatcher.drain().await.unwrap(), 0);
        assert!(calls.borrow().is_empty());
    }

    #[tokio::test]
    async fn test_missing_execute_step_is_a_wiring_error() {
        let backend = SimulatedBackend::new(SimulatedTarget::default());
        let mut table = OperationTable::rtt();
        let mut entry = *table.get(OperationKind::Read).unwrap();
        entry.execute = None;
        table.register(OperationKind::Read, entry);
        let mut dispatcher = Dispatcher::with_operations(
            Session::new(Box::new(backend), DiscoveryConfig::default()),
            table,
        );

        let error = dispatcher
            .submit(OperationKind::Read, vec![json!(0), json!(1)], |_, _| {})
            .unwrap_err();
        assert!(matches!(error, RttComError::Wiring(_)));
    }

    #[tokio::test]
    async fn test_error_delivers_undefined_result_slots() {
        let mut dispatcher = dispatcher();
        let (calls, make) = recorder();

        dispatcher
            .submit(OperationKind::Read, vec![json!(0), json!(64)], make())
            .unwrap();
        dispatcher.drain().await.unwrap();

        let calls = calls.borrow();
        let (error, values) = &calls[0];
        let error = error.as_ref().unwrap();
        assert_eq!(error.kind, ErrorKind::OperationFailed);
        assert!(error.log.contains("Start of read"));
        assert!(error.log.contains("End of read"));
        assert_eq!(values, &vec![Value::Null, Value::Null]);
    }

    #[test]
    fn test_panic_message_extraction() {
        let payload: Box<dyn Any + Send> = Box::new("boom");
        assert_eq!(panic_message(payload.as_ref()), "boom");
        let payload: Box<dyn Any + Send> = Box::new(String::from("bang"));
        assert_eq!(panic_message(payload.as_ref()), "bang");
        let payload: Box<dyn Any + Send> = Box::new(3u8);
        assert_eq!(panic_message(payload.as_ref()), "unknown panic");
    }
}
