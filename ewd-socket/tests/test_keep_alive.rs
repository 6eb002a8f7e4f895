//! Keep-alive timer integration tests.

mod common;

use std::sync::Arc;
use std::time::Duration;

use ewd_socket::{ApplicationDescriptor, EwdClient, KeepAlive, Route};

const INTERVAL: Duration = Duration::from_secs(59 * 60);

#[tokio::test(start_paused = true)]
async fn keep_alive_sends_once_per_interval() {
    let (client, transport, _) = common::create_test_client();
    common::register(&client);
    client.start_keep_alive(Some(INTERVAL)).unwrap();

    tokio::time::sleep(INTERVAL + Duration::from_millis(10)).await;
    let sent = transport.sent_of("keepAlive");
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].str_field("message"), Some("1"));
    assert_eq!(sent[0].token(), Some("T1"));

    tokio::time::sleep(INTERVAL).await;
    assert_eq!(transport.sent_of("keepAlive").len(), 2);
}

#[tokio::test(start_paused = true)]
async fn keep_alive_defaults_to_configured_interval() {
    let transport = Arc::new(common::MockTransport::default());
    let client = EwdClient::builder(transport.clone())
        .application(ApplicationDescriptor::new("demo"))
        .keep_alive_interval(Duration::from_secs(30))
        .auto_keep_alive(true)
        .build();
    common::register(&client);
    assert!(client.keep_alive_running());

    tokio::time::sleep(Duration::from_secs(95)).await;
    assert_eq!(transport.sent_of("keepAlive").len(), 3);
}

#[tokio::test(start_paused = true)]
async fn keep_alive_stops_on_disconnect() {
    let (client, transport, _) = common::create_test_client();
    common::register(&client);
    client.start_keep_alive(Some(Duration::from_secs(60))).unwrap();

    tokio::time::sleep(Duration::from_secs(61)).await;
    client.handle_disconnect();
    assert!(!client.keep_alive_running());

    tokio::time::sleep(Duration::from_secs(600)).await;
    assert_eq!(transport.sent_of("keepAlive").len(), 1);
}

#[tokio::test(start_paused = true)]
async fn restarting_keep_alive_replaces_previous_timer() {
    let (client, transport, _) = common::create_test_client();
    common::register(&client);
    client.start_keep_alive(Some(Duration::from_secs(60))).unwrap();
    client.start_keep_alive(Some(Duration::from_secs(100))).unwrap();

    tokio::time::sleep(Duration::from_secs(150)).await;
    assert_eq!(transport.sent_of("keepAlive").len(), 1);
}

#[tokio::test(start_paused = true)]
async fn keep_alive_stops_when_reconnect_cannot_register() {
    let (client, transport, _) = common::create_test_client();
    common::register(&client);
    client.start_keep_alive(Some(Duration::from_secs(60))).unwrap();

    transport.set_connected(false);
    let route = client.handle_raw_message(r#"{"type":"EWD.connected"}"#).unwrap();
    assert_eq!(route, Route::RegistrationFailed);
    assert!(!client.keep_alive_running());

    transport.set_connected(true);
    tokio::time::sleep(Duration::from_secs(600)).await;
    assert!(transport.sent_of("keepAlive").is_empty());
}

#[tokio::test(start_paused = true)]
async fn held_sender_keep_alive_ends_after_reconnect() {
    let (client, transport, _) = common::create_test_client();
    common::register(&client);
    let keep_alive = KeepAlive::spawn(client.sender().unwrap(), Duration::from_secs(60)).unwrap();

    client.handle_raw_message(r#"{"type":"EWD.connected"}"#).unwrap();
    tokio::time::sleep(Duration::from_secs(61)).await;
    tokio::task::yield_now().await;

    assert!(!keep_alive.is_running());
    assert!(transport.sent_of("keepAlive").is_empty());
}
