//! Integration tests for connection lifecycle behavior
//!
//! Exercises the connection wrapper against the scripted mock client:
//! - availability ordering around connect and deliberate shutdown
//! - hook invocation order
//! - publish guards and acknowledgement waits
//! - subscription dispatch and unsubscribe semantics

use std::sync::{Arc, Mutex};
use std::time::Duration;

use fluent_mqtt::connection::Connection;
use fluent_mqtt::link::{ConnectAck, DisconnectReason, ProtocolClient};
use fluent_mqtt::testing::MockClient;
use fluent_mqtt::{
    ConnectionError, LifecycleState, MqttBuilder, MqttConfig, PublishError, PublishOptions, QoS,
};

fn test_builder() -> MqttBuilder {
    MqttBuilder::v3("localhost", "agent")
        .connect_timeout(Duration::from_millis(500))
        .ack_timeout(Duration::from_millis(200))
}

fn availability_config() -> MqttConfig {
    test_builder()
        .availability("devices/agent/state", "online", "offline", QoS::AtLeastOnce, true)
        .unwrap()
        .build_config()
        .unwrap()
}

fn connection_with(config: MqttConfig, client: MockClient) -> (Connection, Arc<MockClient>) {
    let client = Arc::new(client);
    let connection = Connection::with_client(config, client.clone() as Arc<dyn ProtocolClient>);
    (connection, client)
}

/// Poll the journal until `expected` shows up or the deadline passes.
async fn wait_for_entry(client: &MockClient, expected: &str) {
    for _ in 0..100 {
        if client
            .journal_entries()
            .iter()
            .any(|entry| entry == expected)
        {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!(
        "journal never contained {expected:?}: {:?}",
        client.journal_entries()
    );
}

fn position(entries: &[String], needle: &str) -> usize {
    entries
        .iter()
        .position(|entry| entry == needle)
        .unwrap_or_else(|| panic!("journal missing {needle:?}: {entries:?}"))
}

#[tokio::test]
async fn online_is_published_before_on_connect_hooks() {
    // Arrange: availability plus a hook that records itself
    let (connection, client) = connection_with(availability_config(), MockClient::new());
    let journal = client.journal();
    connection.add_on_connect(move |_, ack| {
        assert!(!ack.session_present());
        MockClient::record(&journal, "hook:on_connect");
    });

    // Act: connect and let the event task settle
    connection.connect().await.unwrap();
    wait_for_entry(&client, "hook:on_connect").await;

    // Assert: the announcement precedes the hook
    let entries = client.journal_entries();
    let online = position(&entries, "publish devices/agent/state online");
    let hook = position(&entries, "hook:on_connect");
    assert!(
        online < hook,
        "online publish must precede on_connect hooks: {entries:?}"
    );

    connection.close().await.unwrap();
}

#[tokio::test]
async fn deliberate_close_runs_the_full_shutdown_sequence_in_order() {
    // Arrange
    let (connection, client) = connection_with(availability_config(), MockClient::new());
    let journal = client.journal();
    connection.add_before_disconnect(move |_| {
        MockClient::record(&journal, "hook:before_disconnect");
    });
    let journal = client.journal();
    connection.add_on_disconnect(move |_, reason| {
        assert_eq!(*reason, DisconnectReason::ClientRequested);
        MockClient::record(&journal, "hook:on_disconnect");
    });
    connection.connect().await.unwrap();

    // Act
    connection.close().await.unwrap();

    // Assert: before_disconnect -> offline -> disconnect -> on_disconnect
    let entries = client.journal_entries();
    let before = position(&entries, "hook:before_disconnect");
    let offline = position(&entries, "publish devices/agent/state offline");
    let disconnect = position(&entries, "disconnect");
    let after = position(&entries, "hook:on_disconnect");
    assert!(
        before < offline && offline < disconnect && disconnect < after,
        "shutdown sequence out of order: {entries:?}"
    );
    assert_eq!(connection.state(), LifecycleState::Closed);
}

#[tokio::test]
async fn close_is_idempotent_on_a_closed_connection() {
    let (connection, _client) = connection_with(availability_config(), MockClient::new());
    connection.connect().await.unwrap();

    connection.close().await.unwrap();
    assert_eq!(connection.state(), LifecycleState::Closed);

    // Closing again must be a no-op, not an error
    connection.close().await.unwrap();
    assert_eq!(connection.state(), LifecycleState::Closed);
}

#[tokio::test]
async fn publish_on_a_built_connection_is_rejected() {
    let config = test_builder().build_config().unwrap();
    let (connection, _client) = connection_with(config, MockClient::new());

    let result = connection
        .publish("topic", "payload", QoS::AtMostOnce, false)
        .await;
    assert!(matches!(
        result,
        Err(PublishError::NotConnected {
            state: LifecycleState::Built
        })
    ));
}

#[tokio::test]
async fn subscribe_dispatches_matching_messages_until_unsubscribed() {
    // Arrange
    let config = test_builder().build_config().unwrap();
    let (connection, client) = connection_with(config, MockClient::new());
    connection.connect().await.unwrap();

    let received: Arc<Mutex<Vec<(String, String)>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = received.clone();
    connection
        .subscribe("demo/#", QoS::AtLeastOnce, move |message| {
            sink.lock().unwrap().push((
                message.topic().to_string(),
                message.text().unwrap_or("<binary>").to_string(),
            ));
        })
        .await
        .unwrap();

    // Act: deliver a matching message
    client.deliver("demo/x", "hello", QoS::AtLeastOnce, false).await;
    tokio::time::sleep(Duration::from_millis(50)).await;

    // Assert
    assert_eq!(
        received.lock().unwrap().clone(),
        vec![("demo/x".to_string(), "hello".to_string())]
    );

    // Act: unsubscribe, then deliver again
    connection.unsubscribe(&["demo/#"]).await.unwrap();
    client.deliver("demo/x", "ignored", QoS::AtLeastOnce, false).await;
    tokio::time::sleep(Duration::from_millis(50)).await;

    // Assert: the callback saw nothing new and the transport was told
    assert_eq!(received.lock().unwrap().len(), 1);
    let entries = client.journal_entries();
    assert!(entries.contains(&"subscribe demo/#".to_string()));
    assert!(entries.contains(&"unsubscribe demo/#".to_string()));

    connection.close().await.unwrap();
}

#[tokio::test]
async fn malformed_filters_are_rejected_synchronously() {
    let config = test_builder().build_config().unwrap();
    let (connection, _client) = connection_with(config, MockClient::new());

    let result = connection.subscribe("demo/#/deeper", QoS::AtMostOnce, |_| {}).await;
    assert!(result.is_err());
}

#[tokio::test]
async fn a_second_connect_on_the_same_connection_fails() {
    let (connection, _client) = connection_with(availability_config(), MockClient::new());
    connection.connect().await.unwrap();

    assert!(matches!(
        connection.connect().await,
        Err(ConnectionError::AlreadyStarted)
    ));

    connection.close().await.unwrap();
}

#[tokio::test]
async fn blocking_connect_times_out_without_a_connack() {
    let config = test_builder().build_config().unwrap();
    let (connection, _client) = connection_with(config, MockClient::new().manual_connect());

    let result = connection.connect().await;
    assert!(matches!(result, Err(ConnectionError::Timeout(_))));
}

#[tokio::test]
async fn waited_publish_resolves_on_acknowledgement() {
    let config = test_builder().build_config().unwrap();
    let (connection, _client) = connection_with(config, MockClient::new());
    connection.connect().await.unwrap();

    let options = PublishOptions {
        qos: QoS::AtLeastOnce,
        wait_for_publish: true,
        ..Default::default()
    };
    connection
        .publish_with("events/x", "payload", &options)
        .await
        .unwrap();

    let options = PublishOptions {
        qos: QoS::ExactlyOnce,
        wait_for_publish: true,
        ..Default::default()
    };
    connection
        .publish_with("events/x", "payload", &options)
        .await
        .unwrap();

    connection.close().await.unwrap();
}

#[tokio::test]
async fn waited_publish_times_out_when_acks_are_withheld() {
    let config = test_builder().build_config().unwrap();
    let (connection, _client) = connection_with(config, MockClient::new().withhold_acks());
    connection.connect().await.unwrap();

    let options = PublishOptions {
        qos: QoS::AtLeastOnce,
        wait_for_publish: true,
        ..Default::default()
    };
    let result = connection.publish_with("events/x", "payload", &options).await;
    assert!(matches!(result, Err(PublishError::AckTimeout(_))));

    connection.close().await.unwrap();
}

#[tokio::test]
async fn transport_loss_fires_on_disconnect_hooks_with_the_reason() {
    // Arrange: detached connect so failures can only surface via hooks
    let (connection, client) = connection_with(availability_config(), MockClient::new());
    let journal = client.journal();
    connection.add_on_disconnect(move |_, reason| {
        if let DisconnectReason::Transport { message } = reason {
            MockClient::record(&journal, format!("hook:lost {message}"));
        }
    });
    connection.connect_detached().unwrap();
    wait_for_entry(&client, "publish devices/agent/state online").await;

    // Act: the broker connection drops
    client
        .emit_disconnected(DisconnectReason::Transport {
            message: "connection reset".to_string(),
        })
        .await;
    wait_for_entry(&client, "hook:lost connection reset").await;

    // Assert
    assert_eq!(connection.state(), LifecycleState::Disconnected);
}

#[tokio::test]
async fn reconnect_republishes_availability_and_resubscribes() {
    // Arrange: connected session with one subscription
    let (connection, client) = connection_with(availability_config(), MockClient::new());
    connection.connect().await.unwrap();
    connection
        .subscribe("demo/#", QoS::AtLeastOnce, |_| {})
        .await
        .unwrap();

    // Act: drop and re-acknowledge the session
    client
        .emit_disconnected(DisconnectReason::Transport {
            message: "reset".to_string(),
        })
        .await;
    client
        .emit_connected(ConnectAck::V3 {
            session_present: false,
        })
        .await;

    // Assert: a second online announcement and a re-subscription happen
    let count = |entries: &[String], needle: &str| {
        entries.iter().filter(|entry| *entry == needle).count()
    };
    for _ in 0..100 {
        let entries = client.journal_entries();
        if count(&entries, "publish devices/agent/state online") == 2
            && count(&entries, "subscribe demo/#") == 2
        {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    let entries = client.journal_entries();
    assert_eq!(count(&entries, "publish devices/agent/state online"), 2, "{entries:?}");
    assert_eq!(count(&entries, "subscribe demo/#"), 2, "{entries:?}");
    assert!(connection.is_connected());

    connection.close().await.unwrap();
}

#[tokio::test]
async fn messages_without_a_matching_subscription_are_dropped_silently() {
    let config = test_builder().build_config().unwrap();
    let (connection, client) = connection_with(config, MockClient::new());
    connection.connect().await.unwrap();

    // No subscription registered; nothing should panic or error
    client.deliver("unrouted/topic", "x", QoS::AtMostOnce, false).await;
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert!(connection.is_connected());
    connection.close().await.unwrap();
}
