use crate::core::dispatch::{
    dispatcher::Dispatcher,
    operations::{OperationKind, OperationTable},
};
use crate::core::session::{
    registry::Channel,
    session::{Session, StartOptions},
    state::SessionState,
};
use crate::domain::error::{RttComError, RttComResult};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use tokio::sync::{oneshot, watch};

/// Typed async front end over the [`Dispatcher`]
///
/// Each call submits one task and drives delivery until its own completion
/// has run, so completions of earlier tasks are still delivered in order.
pub struct RttClient {
    dispatcher: Dispatcher,
}

impl RttClient {
    /// Must be called inside a tokio runtime
    pub fn new(session: Session) -> Self {
        Self {
            dispatcher: Dispatcher::new(session),
        }
    }

    pub fn with_operations(session: Session, operations: OperationTable) -> Self {
        Self {
            dispatcher: Dispatcher::with_operations(session, operations),
        }
    }

    pub fn dispatcher(&mut self) -> &mut Dispatcher {
        &mut self.dispatcher
    }

    pub fn state(&self) -> SessionState {
        self.dispatcher.session_state()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<SessionState> {
        self.dispatcher.subscribe_state()
    }

    /// Start the session; returns `(down_channels, up_channels)`
    pub async fn start(
        &mut self,
        serial_number: u32,
        options: &StartOptions,
    ) -> RttComResult<(Vec<Channel>, Vec<Channel>)> {
        let options = serde_json::to_value(options)
            .map_err(|e| RttComError::InvalidInput(format!("start options: {}", e)))?;
        let values = self
            .call(OperationKind::Start, vec![json!(serial_number), options])
            .await?;
        let mut values = values.into_iter();
        let down = decode(values.next())?;
        let up = decode(values.next())?;
        Ok((down, up))
    }

    pub async fn stop(&mut self) -> RttComResult<()> {
        self.call(OperationKind::Stop, Vec::new()).await?;
        Ok(())
    }

    /// Read up to `max_length` bytes from an up channel
    pub async fn read(&mut self, channel_index: u32, max_length: u32) -> RttComResult<Vec<u8>> {
        let values = self
            .call(
                OperationKind::Read,
                vec![json!(channel_index), json!(max_length)],
            )
            .await?;
        // second value carries the raw bytes
        decode(values.into_iter().nth(1))
    }

    /// Write into a down channel; returns the number of bytes the target accepted
    pub async fn write(&mut self, channel_index: u32, data: &[u8]) -> RttComResult<u32> {
        let values = self
            .call(OperationKind::Write, vec![json!(channel_index), json!(data)])
            .await?;
        decode(values.into_iter().next())
    }

    /// Shut the dispatcher down; dropping the session releases anything still open
    pub async fn close(self) -> RttComResult<()> {
        self.dispatcher.shutdown().await
    }

    async fn call(&mut self, kind: OperationKind, args: Vec<Value>) -> RttComResult<Vec<Value>> {
        let (tx, mut rx) = oneshot::channel();
        self.dispatcher.submit(kind, args, move |error, values| {
            let _ = tx.send((error, values));
        })?;

        loop {
            match rx.try_recv() {
                Ok((Some(error), _)) => return Err(error.into()),
                Ok((None, values)) => return Ok(values),
                Err(oneshot::error::TryRecvError::Closed) => {
                    return Err(RttComError::DispatcherClosed)
                }
                Err(oneshot::error::TryRecvError::Empty) => {}
            }
            if self.dispatcher.deliver_next().await?.is_none() {
                return Err(RttComError::DispatcherClosed);
            }
        }
    }
}

fn decode<T: DeserializeOwned>(value: Option<Value>) -> RttComResult<T> {
    let value = value.ok_or_else(|| RttComError::Session {
        message: "completion delivered fewer values than expected".to_string(),
    })?;
    serde_json::from_value(value).map_err(|e| RttComError::Session {
        message: format!("unexpected result value: {}", e),
    })
}
