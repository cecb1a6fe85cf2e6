//! TCP input tests

use std::time::Duration;

use conduit_plugin::Input;
use tokio::io::{AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::time::timeout;

use crate::tcp::{ReadLineResult, TcpInput, TcpInputConfig, read_bounded_line};
use crate::test_support::{assert_quiet, common, next_line, runner, settings};

// =============================================================================
// Configuration
// =============================================================================

#[test]
fn test_config_default() {
    let config = TcpInputConfig::default();

    assert_eq!(config.address, "127.0.0.1:5565");
    assert!(!config.keep_alive);
    assert_eq!(config.keep_alive_period, Duration::from_secs(60));
    assert_eq!(config.max_line_length, 64 * 1024);
}

#[tokio::test]
async fn test_init_binds_listener() {
    let mut input = TcpInput::default();
    input
        .init(&common("tcp", "t"), &settings("address = \"127.0.0.1:0\""))
        .await
        .unwrap();

    let addr = input.local_addr().unwrap();
    assert_ne!(addr.port(), 0);
}

#[tokio::test]
async fn test_init_fails_on_bad_address() {
    let mut input = TcpInput::default();
    let err = input
        .init(&common("tcp", "t"), &settings("address = \"not an address\""))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("failed to bind"));
}

#[tokio::test]
async fn test_init_rejects_zero_line_length() {
    let mut input = TcpInput::default();
    let err = input
        .init(
            &common("tcp", "t"),
            &settings("address = \"127.0.0.1:0\"\nmax_line_length = 0"),
        )
        .await
        .unwrap_err();
    assert!(err.to_string().contains("max_line_length"));
}

// =============================================================================
// Bounded line reading
// =============================================================================

#[tokio::test]
async fn test_read_bounded_line() {
    let data: &[u8] = b"short\nthis line is too long\nok\nlast";
    let mut reader = BufReader::new(data);
    let mut buf = Vec::new();

    assert_eq!(read_bounded_line(&mut reader, &mut buf, 10).await.unwrap(), ReadLineResult::Line);
    assert_eq!(buf, b"short\n");

    assert_eq!(read_bounded_line(&mut reader, &mut buf, 10).await.unwrap(), ReadLineResult::TooLong);

    assert_eq!(read_bounded_line(&mut reader, &mut buf, 10).await.unwrap(), ReadLineResult::Line);
    assert_eq!(buf, b"ok\n");

    // Final line without newline
    assert_eq!(read_bounded_line(&mut reader, &mut buf, 10).await.unwrap(), ReadLineResult::Line);
    assert_eq!(buf, b"last");

    assert_eq!(read_bounded_line(&mut reader, &mut buf, 10).await.unwrap(), ReadLineResult::Eof);
}

// =============================================================================
// End to end
// =============================================================================

#[tokio::test]
async fn test_lines_become_envelopes() {
    let mut input = TcpInput::default();
    input
        .init(&common("tcp", "app"), &settings("address = \"127.0.0.1:0\""))
        .await
        .unwrap();
    let addr = input.local_addr().unwrap();
    let metrics = input.metrics_handle();

    let (runner, rx, cancel) = runner("tcp", "app");
    let task = tokio::spawn(async move { input.run(runner).await });

    let mut client = TcpStream::connect(addr).await.unwrap();
    client.write_all(b"  first line \n\n\r\nsecond\r\n").await.unwrap();
    client.flush().await.unwrap();

    assert_eq!(next_line(&rx).await, "first line");
    assert_eq!(next_line(&rx).await, "second");
    assert_quiet(&rx).await;

    let env_tag = {
        client.write_all(b"third\n").await.unwrap();
        let env = timeout(Duration::from_secs(1), rx.recv()).await.unwrap().unwrap();
        env.tag()
    };
    assert_eq!(env_tag, "app");
    assert_eq!(metrics.snapshot().messages_received, 3);

    cancel.cancel();
    timeout(Duration::from_secs(1), task).await.unwrap().unwrap().unwrap();
}

#[tokio::test]
async fn test_multiple_connections() {
    let mut input = TcpInput::default();
    input
        .init(&common("tcp", "app"), &settings("address = \"127.0.0.1:0\""))
        .await
        .unwrap();
    let addr = input.local_addr().unwrap();
    let metrics = input.metrics_handle();

    let (runner, rx, cancel) = runner("tcp", "app");
    let task = tokio::spawn(async move { input.run(runner).await });

    let mut a = TcpStream::connect(addr).await.unwrap();
    a.write_all(b"from a\n").await.unwrap();
    assert_eq!(next_line(&rx).await, "from a");

    let mut b = TcpStream::connect(addr).await.unwrap();
    b.write_all(b"from b\n").await.unwrap();
    assert_eq!(next_line(&rx).await, "from b");

    assert_eq!(metrics.snapshot().connections_total, 2);

    cancel.cancel();
    timeout(Duration::from_secs(1), task).await.unwrap().unwrap().unwrap();
}

#[tokio::test]
async fn test_cancel_stops_with_idle_connection() {
    let mut input = TcpInput::default();
    input
        .init(&common("tcp", "app"), &settings("address = \"127.0.0.1:0\""))
        .await
        .unwrap();
    let addr = input.local_addr().unwrap();

    let (runner, _rx, cancel) = runner("tcp", "app");
    let task = tokio::spawn(async move { input.run(runner).await });

    // Connected but silent
    let _client = TcpStream::connect(addr).await.unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;

    cancel.cancel();
    timeout(Duration::from_secs(1), task).await.unwrap().unwrap().unwrap();
}
