use rttcom::core::dispatch::{Dispatcher, OperationKind};
use rttcom::core::session::{Session, SessionState};
use rttcom::domain::config::{DiscoveryConfig, RttComConfig, SimulatedChannelConfig};
use rttcom::domain::error::{ErrorKind, TaskError};
use rttcom::infrastructure::simulated::{SimHandle, SimulatedBackend, SimulatedTarget};
use serde_json::{json, Value};
use std::cell::RefCell;
use std::rc::Rc;

/// Integration tests for the dispatcher, session and simulated driver together
#[cfg(test)]
mod integration_tests {
    use super::*;

    type Delivered = Rc<RefCell<Vec<(Option<TaskError>, Vec<Value>)>>>;

    fn channel(name: &str, size: u32) -> SimulatedChannelConfig {
        SimulatedChannelConfig {
            name: name.to_string(),
            buffer_size: size,
        }
    }

    /// Target with one down and two up channels
    fn dispatcher(echo: bool, down_size: u32) -> (Dispatcher, SimHandle) {
        let target = SimulatedTarget::builder()
            .control_block_after(5)
            .echo(echo)
            .down_channel(channel("Terminal", down_size))
            .up_channel(channel("Terminal", 1024))
            .up_channel(channel("Log", 256))
            .build();
        let backend = SimulatedBackend::new(target);
        let handle = backend.handle();
        let session = Session::new(Box::new(backend), DiscoveryConfig::default());
        (Dispatcher::new(session), handle)
    }

    fn submit(dispatcher: &mut Dispatcher, kind: OperationKind, args: Vec<Value>) -> Delivered {
        let delivered: Delivered = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&delivered);
        dispatcher
            .submit(kind, args, move |error, values| {
                sink.borrow_mut().push((error, values))
            })
            .unwrap();
        delivered
    }

    #[tokio::test]
    async fn test_start_reports_channels_in_index_order() {
        let (mut dispatcher, _handle) = dispatcher(true, 16);

        let start = submit(&mut dispatcher, OperationKind::Start, vec![json!(681023456), json!({})]);
        dispatcher.drain().await.unwrap();

        let start = start.borrow();
        assert_eq!(start.len(), 1);
        let (error, values) = &start[0];
        assert!(error.is_none());
        assert_eq!(values.len(), 2);

        let down = values[0].as_array().unwrap();
        let up = values[1].as_array().unwrap();
        assert_eq!(down.len(), 1);
        assert_eq!(down[0]["index"], 0);
        assert_eq!(down[0]["name"], "Terminal");
        assert_eq!(up.len(), 2);
        assert_eq!(up[0]["index"], 0);
        assert_eq!(up[1]["index"], 1);
        assert_eq!(up[1]["name"], "Log");
        assert_eq!(up[1]["bufferSize"], 256);
        assert_eq!(up[1]["direction"], "up");

        assert_eq!(dispatcher.session_state(), SessionState::Ready);
    }

    #[tokio::test]
    async fn test_read_before_start_fails_with_undefined_results() {
        let (mut dispatcher, _handle) = dispatcher(true, 16);

        let read = submit(&mut dispatcher, OperationKind::Read, vec![json!(0), json!(64)]);
        dispatcher.drain().await.unwrap();

        let read = read.borrow();
        let (error, values) = &read[0];
        assert_eq!(error.as_ref().map(|e| e.kind), Some(ErrorKind::OperationFailed));
        assert_eq!(values, &vec![Value::Null, Value::Null]);
        assert_eq!(dispatcher.session_state(), SessionState::Disconnected);
    }

    #[tokio::test]
    async fn test_write_to_full_buffer_is_a_successful_no_op() {
        let (mut dispatcher, handle) = dispatcher(false, 3);

        submit(&mut dispatcher, OperationKind::Start, vec![json!(1), json!({})]);
        let fill = submit(&mut dispatcher, OperationKind::Write, vec![json!(0), json!([9, 9, 9])]);
        let write = submit(&mut dispatcher, OperationKind::Write, vec![json!(0), json!([1, 2, 3])]);
        dispatcher.drain().await.unwrap();

        assert_eq!(fill.borrow()[0].1, vec![json!(3)]);
        let write = write.borrow();
        let (error, values) = &write[0];
        assert!(error.is_none());
        assert_eq!(values, &vec![json!(0)]);
        assert_eq!(handle.take_down(0), vec![9, 9, 9]);
    }

    #[tokio::test]
    async fn test_partial_write_reports_true_count() {
        let (mut dispatcher, _handle) = dispatcher(false, 4);

        submit(&mut dispatcher, OperationKind::Start, vec![json!(1), json!({})]);
        let write = submit(&mut dispatcher, OperationKind::Write, vec![json!(0), json!("abcdef")]);
        dispatcher.drain().await.unwrap();

        assert_eq!(write.borrow()[0].1, vec![json!(4)]);
    }

    #[tokio::test]
    async fn test_empty_read_is_success() {
        let (mut dispatcher, handle) = dispatcher(true, 16);

        submit(&mut dispatcher, OperationKind::Start, vec![json!(1), json!({})]);
        let empty = submit(&mut dispatcher, OperationKind::Read, vec![json!(1), json!(64)]);
        dispatcher.drain().await.unwrap();

        let empty = empty.borrow();
        assert!(empty[0].0.is_none());
        assert_eq!(empty[0].1, vec![json!(""), json!([])]);

        handle.push_up(1, b"boot ok");
        let read = submit(&mut dispatcher, OperationKind::Read, vec![json!(1), json!(4)]);
        dispatcher.drain().await.unwrap();
        assert_eq!(read.borrow()[0].1, vec![json!("boot"), json!([98, 111, 111, 116])]);
    }

    #[tokio::test]
    async fn test_echo_through_full_lifecycle() {
        let (mut dispatcher, handle) = dispatcher(true, 16);

        let start = submit(&mut dispatcher, OperationKind::Start, vec![json!(1), json!({})]);
        let write = submit(&mut dispatcher, OperationKind::Write, vec![json!(0), json!("ping")]);
        let read = submit(&mut dispatcher, OperationKind::Read, vec![json!(0), json!(64)]);
        let stop = submit(&mut dispatcher, OperationKind::Stop, vec![]);
        assert_eq!(dispatcher.pending_count(), 4);
        assert_eq!(dispatcher.drain().await.unwrap(), 4);

        assert!(start.borrow()[0].0.is_none());
        assert_eq!(write.borrow()[0].1, vec![json!(4)]);
        assert_eq!(read.borrow()[0].1[0], json!("ping"));
        assert!(stop.borrow()[0].0.is_none());
        assert!(stop.borrow()[0].1.is_empty());
        assert_eq!(dispatcher.session_state(), SessionState::Stopped);
        assert_eq!(handle.count_calls(rttcom::infrastructure::simulated::SimCall::CloseDriver), 1);

        // a stopped session can be started again
        let restart = submit(&mut dispatcher, OperationKind::Start, vec![json!(1), json!({})]);
        dispatcher.drain().await.unwrap();
        assert!(restart.borrow()[0].0.is_none());
        dispatcher.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_state_changes_are_published() {
        let (mut dispatcher, _handle) = dispatcher(true, 16);
        let mut states = dispatcher.subscribe_state();
        assert_eq!(*states.borrow(), SessionState::Disconnected);

        submit(&mut dispatcher, OperationKind::Start, vec![json!(1), json!({})]);
        dispatcher.drain().await.unwrap();
        assert!(states.has_changed().unwrap());
        assert_eq!(*states.borrow_and_update(), SessionState::Ready);
    }

    #[test]
    fn test_config_defaults() {
        let config = RttComConfig::default();
        assert_eq!(config.discovery.max_polls, 100_000);
        assert_eq!(config.simulator.down_channels.len(), 1);
        assert_eq!(config.simulator.up_channels[0].name, "Terminal");
    }
}
