mod common;

use clay_relay::envelope::{self, Envelope};
use clay_relay::host::{encode_frame, NATIVE_ORDER};
use clay_relay::RelayError;
use common::{join_relay, spawn_relay, test_config, ws_url, Browser, STEP_TIMEOUT};
use futures::{SinkExt, StreamExt};
use serde_json::json;
use tokio::net::TcpStream;
use tokio_tungstenite::{
    connect_async,
    tungstenite::{self, Message},
    MaybeTlsStream, WebSocketStream,
};

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

async fn connect(port: u16, token: &str) -> Client {
    let (ws, _) = connect_async(ws_url(port, token)).await.expect("connect");
    ws
}

/// Status code of a rejected upgrade.
async fn rejected_status(port: u16, token: &str) -> u16 {
    match connect_async(ws_url(port, token)).await {
        Err(tungstenite::Error::Http(response)) => response.status().as_u16(),
        Err(e) => panic!("unexpected error: {e}"),
        Ok(_) => panic!("upgrade should have been rejected"),
    }
}

async fn expect_status(browser: &mut Browser, status: &str) {
    assert_eq!(browser.recv().await, Envelope::relay_message(status));
}

async fn next_text(client: &mut Client) -> String {
    loop {
        let msg = tokio::time::timeout(STEP_TIMEOUT, client.next())
            .await
            .expect("timed out waiting for socket message")
            .expect("socket closed")
            .expect("socket error");
        match msg {
            Message::Text(text) => return text,
            Message::Ping(_) | Message::Pong(_) => continue,
            other => panic!("unexpected socket message: {other:?}"),
        }
    }
}

async fn ready_relay() -> (
    Browser,
    tokio::task::JoinHandle<Result<clay_relay::session::Session, RelayError>>,
    u16,
    String,
) {
    let (mut browser, relay) = spawn_relay(test_config());
    browser.send_init(&["e2e"]);
    let (port, token) = browser.recv_banner().await;
    (browser, relay, port, token)
}

#[tokio::test]
async fn ping_from_socket_reaches_stdio_and_back() {
    let (mut browser, relay, port, token) = ready_relay().await;
    assert_eq!(token.len(), 32);

    let mut client = connect(port, &token).await;
    expect_status(&mut browser, "open").await;

    client.send(Message::Text("\"ping\"".into())).await.unwrap();
    let frame = browser.recv().await;
    assert_eq!(
        serde_json::to_value(&frame).unwrap(),
        json!({"action": "trpc", "payload": "\"ping\""})
    );

    browser.send(&Envelope::trpc("\"pong\""));
    assert_eq!(next_text(&mut client).await, "\"pong\"");

    browser.close();
    let session = join_relay(relay).await.expect("graceful shutdown");
    assert_eq!(session.largest_message(), "\"ping\"".len());
    assert!(session.tags().contains("e2e"));
}

#[tokio::test]
async fn messages_keep_arrival_order() {
    let (mut browser, _relay, port, token) = ready_relay().await;
    let mut client = connect(port, &token).await;
    expect_status(&mut browser, "open").await;

    for i in 0..20 {
        client.send(Message::Text(format!("{i}"))).await.unwrap();
        browser.send(&Envelope::trpc(format!("b{i}")));
    }
    for i in 0..20 {
        assert_eq!(browser.recv().await, Envelope::trpc(format!("{i}")));
        assert_eq!(next_text(&mut client).await, format!("b{i}"));
    }
}

#[tokio::test]
async fn second_client_is_rejected_while_first_stays_up() {
    let (mut browser, _relay, port, token) = ready_relay().await;
    let mut first = connect(port, &token).await;
    expect_status(&mut browser, "open").await;

    assert_eq!(rejected_status(port, &token).await, 400);

    first.send(Message::Text("still here".into())).await.unwrap();
    assert_eq!(browser.recv().await, Envelope::trpc("still here"));
    browser.send(&Envelope::trpc("reply"));
    assert_eq!(next_text(&mut first).await, "reply");
}

#[tokio::test]
async fn wrong_token_is_forbidden_regardless_of_slot() {
    let (mut browser, _relay, port, token) = ready_relay().await;

    assert_eq!(rejected_status(port, "deadbeef").await, 403);
    assert_eq!(rejected_status(port, "").await, 403);

    let _client = connect(port, &token).await;
    expect_status(&mut browser, "open").await;
    assert_eq!(rejected_status(port, "deadbeef").await, 403);
}

#[tokio::test]
async fn reconnect_after_client_leaves() {
    let (mut browser, _relay, port, token) = ready_relay().await;

    let mut client = connect(port, &token).await;
    expect_status(&mut browser, "open").await;
    client.close(None).await.unwrap();
    expect_status(&mut browser, "close").await;

    let mut again = connect(port, &token).await;
    expect_status(&mut browser, "open").await;
    again.send(Message::Text("back".into())).await.unwrap();
    assert_eq!(browser.recv().await, Envelope::trpc("back"));
}

#[tokio::test]
async fn stdio_message_without_client_is_dropped() {
    let (mut browser, relay, port, token) = ready_relay().await;

    browser.send(&Envelope::trpc("\"nobody listening\""));
    // Duplicate init and unknown actions are ignored too.
    browser.send_init(&["again"]);
    browser.send(&Envelope::new("mystery", json!(null)));
    // Stdin and socket are independent queues; let the stdin side drain first.
    tokio::time::sleep(std::time::Duration::from_millis(200)).await;

    let mut client = connect(port, &token).await;
    // The next thing on stdout is the open status, nothing for the dropped messages.
    expect_status(&mut browser, "open").await;

    browser.send(&Envelope::trpc("fresh"));
    assert_eq!(next_text(&mut client).await, "fresh");

    browser.close();
    let session = join_relay(relay).await.unwrap();
    assert!(!session.tags().contains("again"));
}

#[tokio::test]
async fn message_at_limit_is_forwarded() {
    let (mut browser, _relay, port, token) = ready_relay().await;
    let mut client = connect(port, &token).await;
    expect_status(&mut browser, "open").await;

    let body = "x".repeat(1_048_576);
    client.send(Message::Text(body)).await.unwrap();
    let frame = browser.recv().await;
    assert_eq!(frame.action, "trpc");
    assert_eq!(frame.payload.as_str().map(str::len), Some(1_048_576));
}

#[tokio::test]
async fn message_over_limit_stops_the_relay() {
    let (mut browser, relay, port, token) = ready_relay().await;
    let mut client = connect(port, &token).await;
    expect_status(&mut browser, "open").await;

    client
        .send(Message::Text("x".repeat(1_048_577)))
        .await
        .unwrap();

    // The extension still hears that the client is gone.
    expect_status(&mut browser, "close").await;
    let err = join_relay(relay).await.expect_err("oversized message is fatal");
    assert!(matches!(
        err,
        RelayError::MessageTooLarge {
            size: 1_048_577,
            max: 1_048_576
        }
    ));
    assert_eq!(err.exit_code(), 1);
}

#[tokio::test]
async fn stdin_eof_shuts_down_and_closes_socket() {
    let (mut browser, relay, port, token) = ready_relay().await;
    let mut client = connect(port, &token).await;
    expect_status(&mut browser, "open").await;

    browser.close();
    join_relay(relay).await.expect("EOF is a clean exit");

    let end = tokio::time::timeout(STEP_TIMEOUT, client.next())
        .await
        .expect("socket should end after relay stops");
    assert!(!matches!(end, Some(Ok(Message::Text(_)))));
}

#[tokio::test]
async fn malformed_stdin_frame_is_dropped() {
    let (mut browser, relay, port, token) = ready_relay().await;
    let mut client = connect(port, &token).await;
    expect_status(&mut browser, "open").await;

    browser.send_raw(encode_frame(*NATIVE_ORDER, b"{garbage").unwrap());
    browser.send_raw(encode_frame(*NATIVE_ORDER, b"[1, 2, 3]").unwrap());
    browser.send(&Envelope::trpc("after garbage"));
    assert_eq!(next_text(&mut client).await, "after garbage");

    client.send(Message::Text("ok".into())).await.unwrap();
    assert_eq!(browser.recv().await, Envelope::trpc("ok"));

    browser.close();
    join_relay(relay).await.expect("relay kept running");
}

#[tokio::test]
async fn oversized_stdin_frame_is_skipped() {
    let mut config = test_config();
    config.max_frame_size = 48;
    let (mut browser, relay) = spawn_relay(config);
    browser.send_init(&[]);
    let (port, token) = browser.recv_banner().await;
    let mut client = connect(port, &token).await;
    expect_status(&mut browser, "open").await;

    let big = envelope::encode(&Envelope::trpc("y".repeat(64))).unwrap();
    assert!(big.len() > 48);
    browser.send_raw(encode_frame(*NATIVE_ORDER, &big).unwrap());
    browser.send(&Envelope::trpc("small"));
    // Only the frame after the skipped one reaches the socket.
    assert_eq!(next_text(&mut client).await, "small");

    client.send(Message::Text("ok".into())).await.unwrap();
    assert_eq!(browser.recv().await, Envelope::trpc("ok"));

    browser.close();
    join_relay(relay).await.expect("relay kept running");
}

#[tokio::test]
async fn truncated_stdin_frame_is_fatal() {
    let (mut browser, relay, _port, _token) = ready_relay().await;
    let mut frame = NATIVE_ORDER.encode_len(100).to_vec();
    frame.extend_from_slice(b"{\"action\"");
    browser.send_raw(frame);
    browser.close();

    let err = join_relay(relay).await.expect_err("partial frame is fatal");
    assert!(matches!(err, RelayError::Stdin(_)));
}

#[tokio::test]
async fn concurrent_override_lets_new_client_take_over() {
    let mut config = test_config();
    config.allow_concurrent = true;
    let (mut browser, _relay) = spawn_relay(config);
    browser.send_init(&[]);
    let (port, token) = browser.recv_banner().await;

    let _old = connect(port, &token).await;
    expect_status(&mut browser, "open").await;
    let mut new = connect(port, &token).await;
    expect_status(&mut browser, "close").await;
    expect_status(&mut browser, "open").await;

    browser.send(&Envelope::trpc("to the new one"));
    assert_eq!(next_text(&mut new).await, "to the new one");
}
