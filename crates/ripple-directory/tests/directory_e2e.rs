// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! End-to-end tests against a real directory server on ephemeral ports.
//!
//! # Test Coverage
//!
//! - Publisher registration, duplicate and malformed addresses
//! - Id allocation across deregistration
//! - Topic gating on publish and subscribe, data-plane delivery
//! - Topic updates and their rollback
//! - Observer initial fetch, reconciliation and disconnect
//! - Unknown and empty command frames
//! - Server shutdown, and a publisher outliving its directory

use ripple_directory::protocol::{header, RegisterReply, StatusReply, WireValue};
use ripple_directory::{
    ClientConfig, DirectoryClient, DirectoryServer, DirectorySnapshot, ErrorCode, Observer,
    Publisher, PublisherRecord, PublisherState, RippleError, ServerConfig, Subscriber,
};
use std::sync::{Arc, Mutex};
use std::time::Duration;

const WAIT: Duration = Duration::from_secs(5);

async fn start_server() -> (DirectoryServer, ClientConfig) {
    let server = DirectoryServer::start(ServerConfig {
        bind_host: "127.0.0.1".into(),
        command_port: 0,
        broadcast_port: 0,
        ..Default::default()
    })
    .await
    .unwrap();

    let config = ClientConfig {
        command_port: server.command_addr().port(),
        broadcast_port: server.broadcast_addr().port(),
        ..ClientConfig::new("127.0.0.1")
    };
    (server, config)
}

fn topics(names: &[&str]) -> Vec<String> {
    names.iter().map(|t| t.to_string()).collect()
}

/// Poll `observer` until its snapshot satisfies `pred`.
async fn wait_for<F>(observer: &Observer, pred: F) -> DirectorySnapshot
where
    F: Fn(&DirectorySnapshot) -> bool,
{
    tokio::time::timeout(WAIT, async {
        loop {
            if let Some(snapshot) = observer.snapshot() {
                if pred(&snapshot) {
                    return snapshot;
                }
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("observer never reconciled")
}

#[tokio::test]
async fn test_register_and_map() {
    let (server, config) = start_server().await;

    let mut publisher = Publisher::new(config.clone(), "127.0.0.1", "sensor", topics(&["temp"]));
    let id = publisher.register().await.unwrap();
    assert_eq!(publisher.state(), PublisherState::Registered);
    assert_eq!(publisher.id(), Some(id));

    let mut client = DirectoryClient::connect(&config).await.unwrap();
    let snapshot = client.map().await.unwrap();
    let record = snapshot.get(id).unwrap();
    assert_eq!(record.id, Some(id));
    assert_eq!(record.name, "sensor");
    assert_eq!(record.topics, topics(&["temp"]));
    assert_eq!(Some(record.address.as_str()), publisher.address());
    assert_eq!(server.publisher_count(), 1);

    assert!(matches!(
        publisher.register().await,
        Err(RippleError::AlreadyRegistered)
    ));
}

#[tokio::test]
async fn test_duplicate_and_invalid_address() {
    let (server, config) = start_server().await;
    let mut client = DirectoryClient::connect(&config).await.unwrap();

    let record = PublisherRecord::new("tcp://127.0.0.1:9", "a", topics(&["x"]));
    let first = client.register(&record).await.unwrap();
    assert!(matches!(first, RegisterReply::Registered(_)));

    let again = PublisherRecord::new("tcp://127.0.0.1:9", "b", topics(&["y"]));
    assert_eq!(
        client.register(&again).await.unwrap(),
        RegisterReply::Failed(ErrorCode::AddressAlreadyRegistered)
    );

    let bad = PublisherRecord::new("not a url", "c", vec![]);
    assert_eq!(
        client.register(&bad).await.unwrap(),
        RegisterReply::Failed(ErrorCode::AddressParseError)
    );

    assert_eq!(server.publisher_count(), 1);
    assert_eq!(server.broadcast_stats().snapshots_sent, 1);
}

#[tokio::test]
async fn test_ids_not_reused() {
    let (_server, config) = start_server().await;
    let mut client = DirectoryClient::connect(&config).await.unwrap();

    let RegisterReply::Registered(first) = client
        .register(&PublisherRecord::new("tcp://127.0.0.1:10", "a", vec![]))
        .await
        .unwrap()
    else {
        panic!("first registration refused");
    };
    assert_eq!(client.deregister(first).await.unwrap(), StatusReply::Ok);

    let RegisterReply::Registered(second) = client
        .register(&PublisherRecord::new("tcp://127.0.0.1:10", "a", vec![]))
        .await
        .unwrap()
    else {
        panic!("second registration refused");
    };
    assert!(second > first);
}

#[tokio::test]
async fn test_deregister() {
    let (server, config) = start_server().await;

    let mut publisher = Publisher::new(config.clone(), "127.0.0.1", "sensor", topics(&["temp"]));
    let id = publisher.register().await.unwrap();
    publisher.deregister().await.unwrap();

    assert_eq!(publisher.state(), PublisherState::Deregistered);
    assert_eq!(publisher.id(), None);
    assert!(matches!(
        publisher.publish("temp", "x"),
        Err(RippleError::NotRegistered)
    ));
    assert!(matches!(
        publisher.register().await,
        Err(RippleError::NotRegistered)
    ));
    publisher.deregister().await.unwrap();

    let mut client = DirectoryClient::connect(&config).await.unwrap();
    assert!(!client.map().await.unwrap().contains(id));
    assert_eq!(
        client.deregister(id).await.unwrap(),
        StatusReply::Failed(ErrorCode::IdNotFound)
    );
    assert_eq!(server.publisher_count(), 0);
}

#[tokio::test]
async fn test_publish_reaches_subscriber() {
    let (_server, config) = start_server().await;

    let mut publisher = Publisher::new(config.clone(), "127.0.0.1", "sensor", topics(&["temp"]));
    publisher.register().await.unwrap();
    let record = publisher.record().unwrap();

    let err = Subscriber::connect(&config, &record, &topics(&["pressure"]))
        .await
        .err()
        .unwrap();
    assert!(matches!(err, RippleError::TopicNotRegistered(t) if t == "pressure"));

    let mut subscriber = Subscriber::connect(&config, &record, &topics(&["temp"]))
        .await
        .unwrap();

    assert!(matches!(
        publisher.publish("pressure", "1013"),
        Err(RippleError::TopicNotRegistered(_))
    ));
    publisher.publish("temp", "21.5").unwrap();
    publisher.publish("temp", "21.7").unwrap();

    let first = tokio::time::timeout(WAIT, subscriber.recv()).await.unwrap().unwrap();
    let second = tokio::time::timeout(WAIT, subscriber.recv()).await.unwrap().unwrap();
    assert_eq!(first, ("temp".to_string(), "21.5".to_string()));
    assert_eq!(second, ("temp".to_string(), "21.7".to_string()));
}

#[tokio::test]
async fn test_update_topics() {
    let (server, config) = start_server().await;

    let mut publisher = Publisher::new(config.clone(), "127.0.0.1", "sensor", topics(&["temp"]));
    let id = publisher.register().await.unwrap();
    publisher
        .update_topics(topics(&["pressure", "humidity"]))
        .await
        .unwrap();

    assert_eq!(publisher.topics(), topics(&["pressure", "humidity"]));
    publisher.publish("pressure", "1013").unwrap();
    assert!(matches!(
        publisher.publish("temp", "21.5"),
        Err(RippleError::TopicNotRegistered(_))
    ));

    let mut client = DirectoryClient::connect(&config).await.unwrap();
    let snapshot = client.map().await.unwrap();
    assert_eq!(snapshot.get(id).unwrap().topics, topics(&["pressure", "humidity"]));

    // Unknown id: refused and not broadcast
    let sent = server.broadcast_stats().snapshots_sent;
    assert_eq!(
        client.update_topics(id + 100, &topics(&["x"])).await.unwrap(),
        StatusReply::Failed(ErrorCode::UpdateFailed)
    );
    assert_eq!(server.broadcast_stats().snapshots_sent, sent);
}

#[tokio::test]
async fn test_update_rolled_back_when_refused() {
    let (_server, config) = start_server().await;

    let mut publisher = Publisher::new(config.clone(), "127.0.0.1", "sensor", topics(&["temp"]));
    let id = publisher.register().await.unwrap();

    // Remove the record behind the publisher's back
    let mut client = DirectoryClient::connect(&config).await.unwrap();
    assert_eq!(client.deregister(id).await.unwrap(), StatusReply::Ok);

    let err = publisher
        .update_topics(topics(&["pressure"]))
        .await
        .unwrap_err();
    assert!(matches!(err, RippleError::UpdateFailed(i) if i == id));
    assert_eq!(publisher.topics(), topics(&["temp"]));

    let err = publisher.deregister().await.unwrap_err();
    assert!(matches!(err, RippleError::IdNotFound(i) if i == id));
    assert_eq!(publisher.state(), PublisherState::Deregistered);
}

#[tokio::test]
async fn test_observer_reconciles() {
    let (_server, config) = start_server().await;

    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink_seen = seen.clone();
    let mut observer = Observer::new(config.clone(), move |s: &DirectorySnapshot| {
        sink_seen.lock().unwrap().push(s.clone());
    });
    observer.connect().await.unwrap();
    assert!(observer.is_listening());
    assert_eq!(seen.lock().unwrap().len(), 1);
    assert!(seen.lock().unwrap()[0].is_empty());

    assert!(matches!(
        observer.connect().await,
        Err(RippleError::AlreadyConnected)
    ));

    let mut publisher = Publisher::new(config.clone(), "127.0.0.1", "sensor", topics(&["temp"]));
    let id = publisher.register().await.unwrap();
    let snapshot = wait_for(&observer, |s| s.contains(id)).await;
    assert_eq!(snapshot.get(id).unwrap().topics, topics(&["temp"]));

    publisher.update_topics(topics(&["pressure"])).await.unwrap();
    wait_for(&observer, |s| {
        s.get(id).map(|r| r.topics == topics(&["pressure"])).unwrap_or(false)
    })
    .await;

    publisher.deregister().await.unwrap();
    wait_for(&observer, |s| !s.contains(id)).await;

    // Every delivered snapshot is newer than the previous one
    let generations: Vec<u64> = seen.lock().unwrap().iter().map(|s| s.generation).collect();
    assert!(generations.windows(2).all(|w| w[0] < w[1]));
    assert_eq!(
        seen.lock().unwrap().last().map(|s| s.generation),
        observer.snapshot().map(|s| s.generation)
    );

    observer.disconnect().await.unwrap();
    assert!(!observer.is_connected());
    assert!(observer.snapshot().is_none());
    assert!(matches!(
        observer.disconnect().await,
        Err(RippleError::NotConnected)
    ));
}

#[tokio::test]
async fn test_observer_sees_existing_publishers() {
    let (_server, config) = start_server().await;

    let mut publisher = Publisher::new(config.clone(), "127.0.0.1", "sensor", topics(&["temp"]));
    let id = publisher.register().await.unwrap();

    let mut observer = Observer::new(config, |_: &DirectorySnapshot| {});
    observer.connect().await.unwrap();
    let snapshot = observer.snapshot().unwrap();
    assert!(snapshot.contains(id));
    assert_eq!(snapshot.publishers_for_topic("temp").count(), 1);

    observer.disconnect().await.unwrap();
}

#[tokio::test]
async fn test_malformed_frames() {
    let (server, config) = start_server().await;
    let mut client = DirectoryClient::connect(&config).await.unwrap();

    assert_eq!(
        client.send_frame(&[0x7f]).await.unwrap(),
        WireValue::Str("-7".into())
    );
    assert_eq!(
        client.send_frame(&[]).await.unwrap(),
        WireValue::Str("-6".into())
    );
    assert_eq!(
        client.send_frame(&[header::REGISTER, b'{']).await.unwrap(),
        WireValue::Int(-2)
    );
    assert_eq!(
        client
            .send_frame(&[header::DEREGISTER, b'{'])
            .await
            .unwrap(),
        WireValue::Str("-3".into())
    );

    // Still serving
    assert!(client.map().await.unwrap().is_empty());
    assert_eq!(server.broadcast_stats().snapshots_sent, 0);
}

#[tokio::test]
async fn test_concurrent_registrations() {
    let (server, config) = start_server().await;

    let mut handles = Vec::new();
    for i in 0..8 {
        let config = config.clone();
        handles.push(tokio::spawn(async move {
            let mut client = DirectoryClient::connect(&config).await.unwrap();
            let address = format!("tcp://127.0.0.1:{}", 20000 + i);
            let record = PublisherRecord::new(address, "p", vec![]);
            match client.register(&record).await.unwrap() {
                RegisterReply::Registered(id) => id,
                RegisterReply::Failed(code) => panic!("refused: {:?}", code),
            }
        }));
    }

    let mut ids = Vec::new();
    for handle in handles {
        ids.push(handle.await.unwrap());
    }
    ids.sort_unstable();
    ids.dedup();
    assert_eq!(ids.len(), 8);
    assert_eq!(server.publisher_count(), 8);
}

#[tokio::test]
async fn test_server_stop() {
    let (mut server, config) = start_server().await;
    let mut client = DirectoryClient::connect(&config).await.unwrap();
    assert!(server.is_running());

    server.stop().await;
    assert!(!server.is_running());

    let result = tokio::time::timeout(WAIT, client.map()).await.unwrap();
    assert!(result.is_err());
}

#[tokio::test]
async fn test_deregister_after_directory_lost() {
    let (mut server, config) = start_server().await;

    let mut publisher = Publisher::new(config.clone(), "127.0.0.1", "sensor", topics(&["temp"]));
    publisher.register().await.unwrap();
    let record = publisher.record().unwrap();
    server.stop().await;

    let result = publisher.deregister().await;
    assert!(matches!(result, Err(RippleError::Transport(_))));
    assert_eq!(publisher.state(), PublisherState::Deregistered);
    assert_eq!(publisher.id(), None);

    // Resources are gone: later calls do not touch the dead channel
    publisher.deregister().await.unwrap();
    assert!(matches!(
        publisher.update_topics(topics(&["pressure"])).await,
        Err(RippleError::NotRegistered)
    ));
    assert!(matches!(
        publisher.publish("temp", "21.5"),
        Err(RippleError::NotRegistered)
    ));

    // Broadcast endpoint released
    let subscribed = Subscriber::connect(&config, &record, &topics(&["temp"])).await;
    assert!(subscribed.is_err());
}
