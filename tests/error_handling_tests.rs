use rttcom::core::dispatch::RttClient;
use rttcom::core::session::{Session, SessionState, StartOptions};
use rttcom::domain::config::{DiscoveryConfig, SimulatedChannelConfig};
use rttcom::infrastructure::simulated::{SimCall, SimHandle, SimulatedBackend, SimulatedTarget};
use rttcom::{ErrorKind, RttComError, RttComResult, TaskError};

/// Error handling and resilience tests
#[cfg(test)]
mod error_handling_tests {
    use super::*;

    fn client_with(target: SimulatedTarget, max_polls: u32) -> (RttClient, SimHandle) {
        let backend = SimulatedBackend::new(target);
        let handle = backend.handle();
        let discovery = DiscoveryConfig {
            max_polls,
            poll_interval_us: 0,
        };
        (RttClient::new(Session::new(Box::new(backend), discovery)), handle)
    }

    fn target() -> SimulatedTarget {
        SimulatedTarget::builder()
            .control_block_after(2)
            .down_channel(SimulatedChannelConfig {
                name: "Terminal".to_string(),
                buffer_size: 16,
            })
            .up_channel(SimulatedChannelConfig {
                name: "Terminal".to_string(),
                buffer_size: 64,
            })
            .build()
    }

    fn task_error(error: RttComError) -> TaskError {
        match error {
            RttComError::Task(task) => task,
            other => panic!("expected a task error, got {}", other),
        }
    }

    #[tokio::test]
    async fn test_each_start_failure_point_has_its_kind() {
        let cases = [
            (SimCall::ProbeDetails, ErrorKind::NoProbeConnected),
            (SimCall::LoadDriver, ErrorKind::DriverLoadFailed),
            (SimCall::OpenDriver, ErrorKind::OutOfResources),
            (SimCall::ConnectToProbe, ErrorKind::ProbeConnectionFailed),
            (SimCall::ConnectToDevice, ErrorKind::DeviceConnectionFailed),
            (SimCall::RttStart, ErrorKind::RttStartFailed),
            (SimCall::ControlBlockFound, ErrorKind::ControlBlockNotFound),
            (SimCall::ChannelCount, ErrorKind::ChannelQueryFailed),
            (SimCall::ChannelInfo, ErrorKind::ChannelQueryFailed),
        ];

        for (call, kind) in cases {
            let (mut client, handle) = client_with(target(), 100);
            handle.fail(call, -17);

            let error = task_error(client.start(1, &StartOptions::default()).await.unwrap_err());
            assert_eq!(error.kind, kind, "{:?}", call);
            assert_eq!(error.operation, "start");
            assert_eq!(error.lowlevel_status, Some(-17));
            assert!(error.log.contains("Start of start"));
            assert!(error.log.contains("End of start"));
            assert_eq!(client.state(), SessionState::Failed(kind));

            // stop always recovers, even after a failed start
            client.stop().await.unwrap();
            assert_eq!(client.state(), SessionState::Stopped);
        }
    }

    #[tokio::test]
    async fn test_control_block_bound_exhausted() {
        let (mut client, handle) = client_with(target(), 2);

        let error = task_error(client.start(1, &StartOptions::default()).await.unwrap_err());
        assert_eq!(error.kind, ErrorKind::ControlBlockNotFound);
        assert_eq!(error.lowlevel_status, None);
        assert_eq!(handle.count_calls(SimCall::ControlBlockFound), 2);
        assert_eq!(handle.count_calls(SimCall::ChannelCount), 0);

        // reads are refused until a successful restart
        let error = client.read(0, 8).await.unwrap_err();
        assert_eq!(error.kind(), Some(ErrorKind::OperationFailed));

        client.stop().await.unwrap();
        let options = StartOptions {
            max_polls: Some(3),
            ..StartOptions::default()
        };
        let (down, up) = client.start(1, &options).await.unwrap();
        assert_eq!((down.len(), up.len()), (1, 1));
    }

    #[tokio::test]
    async fn test_default_discovery_bound_is_exhausted() {
        let target = SimulatedTarget::builder().control_block_after(u32::MAX).build();
        let backend = SimulatedBackend::new(target);
        let handle = backend.handle();
        let mut client = RttClient::new(Session::new(Box::new(backend), DiscoveryConfig::default()));

        let error = task_error(client.start(1, &StartOptions::default()).await.unwrap_err());
        assert_eq!(error.kind, ErrorKind::ControlBlockNotFound);
        assert!(error.message.contains("100000 polls"));
        assert_eq!(handle.count_calls(SimCall::ControlBlockFound), 100_000);
        assert_eq!(client.state(), SessionState::Failed(ErrorKind::ControlBlockNotFound));
    }

    #[tokio::test]
    async fn test_unknown_serial_number() {
        let target = SimulatedTarget::builder().serial_number(1000).build();
        let (mut client, _handle) = client_with(target, 100);

        let error = task_error(client.start(999, &StartOptions::default()).await.unwrap_err());
        assert_eq!(error.kind, ErrorKind::NoProbeConnected);
    }

    #[tokio::test]
    async fn test_start_twice_is_rejected() {
        let (mut client, handle) = client_with(target(), 100);
        client.start(1, &StartOptions::default()).await.unwrap();

        let error = task_error(client.start(1, &StartOptions::default()).await.unwrap_err());
        assert_eq!(error.kind, ErrorKind::OperationFailed);
        // the running session is untouched
        assert_eq!(client.state(), SessionState::Ready);
        assert_eq!(handle.count_calls(SimCall::LoadDriver), 1);
    }

    #[tokio::test]
    async fn test_teardown_failures_do_not_block_stop() {
        let (mut client, handle) = client_with(target(), 100);
        client.start(1, &StartOptions::default()).await.unwrap();

        handle.fail(SimCall::RttStop, -1);
        handle.fail(SimCall::DisconnectFromDevice, -2);
        client.stop().await.unwrap();

        assert_eq!(client.state(), SessionState::Stopped);
        assert_eq!(handle.count_calls(SimCall::DisconnectFromProbe), 1);
        assert_eq!(handle.count_calls(SimCall::CloseDriver), 1);
    }

    #[tokio::test]
    async fn test_driver_failure_during_io() {
        let (mut client, handle) = client_with(target(), 100);
        client.start(1, &StartOptions::default()).await.unwrap();

        handle.fail(SimCall::RttWrite, -9);
        let error = task_error(client.write(0, b"x").await.unwrap_err());
        assert_eq!(error.kind, ErrorKind::OperationFailed);
        assert_eq!(error.operation, "write");
        assert_eq!(error.lowlevel_status, Some(-9));
        assert!(error.message.contains("rtt_write"));

        // the session stays usable
        handle.clear_failure(SimCall::RttWrite);
        assert_eq!(client.write(0, b"x").await.unwrap(), 1);
    }

    #[test]
    fn test_error_conversion() {
        let io_error = std::io::Error::new(std::io::ErrorKind::NotFound, "File not found");
        let rttcom_error: RttComError = io_error.into();
        assert!(matches!(rttcom_error, RttComError::Io(_)));
        assert_eq!(rttcom_error.kind(), None);

        let task = TaskError::argument("read", "Argument 0 is missing");
        let rttcom_error: RttComError = task.into();
        assert_eq!(rttcom_error.kind(), Some(ErrorKind::ArgumentError));
        assert!(rttcom_error.to_string().contains("Argument 0 is missing"));
    }

    #[test]
    fn test_error_thread_safety() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<RttComError>();
        assert_send_sync::<TaskError>();
    }

    #[test]
    fn test_error_in_option_result() {
        fn complex_function() -> Option<RttComResult<String>> {
            Some(Err(RttComError::Output("Complex error".to_string())))
        }

        match complex_function() {
            Some(Ok(_)) => panic!("Should not succeed"),
            Some(Err(e)) => assert!(e.to_string().contains("Complex error")),
            None => panic!("Should not be None"),
        }
    }
}
