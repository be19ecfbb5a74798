use super::*;
use crate::config::EngineBuilder;
use std::time::Duration as StdDuration;

async fn start(options: EngineOptions) -> EngineHandle {
    EngineHandle::start(options).await.unwrap()
}

#[tokio::test]
async fn command_with_ack_resolves_once_the_peer_auto_acks() {
    let a = start(EngineOptions::default()).await;
    let b = start(EngineOptions::default()).await;

    let result = tokio::time::timeout(
        StdDuration::from_secs(2),
        a.send_command(b.local_addr(), Command::from_str("PING").unwrap(), b"hi".to_vec(), true, 2, false),
    )
    .await
    .expect("did not time out");

    result.unwrap();
}

#[tokio::test]
async fn command_without_ack_resolves_immediately_without_a_peer() {
    let a = start(EngineOptions::default()).await;
    let nobody: SocketAddr = "127.0.0.1:1".parse().unwrap();

    a.send_command(nobody, Command::from_str("PING").unwrap(), vec![], false, 0, false)
        .await
        .unwrap();
}

#[tokio::test]
async fn query_resolves_with_the_application_supplied_response() {
    let a = start(EngineOptions::default()).await;
    let b = start(EngineOptions::default()).await;

    let mut incoming = b.subscribe();
    let responder = tokio::spawn({
        let b = b.clone();
        async move {
            let query = incoming.recv().await.unwrap();
            b.send_response_for(&query, b"pong".to_vec(), false).await.unwrap();
        }
    });

    let response = tokio::time::timeout(
        StdDuration::from_secs(2),
        a.send_query(b.local_addr(), Command::from_str("ASKQ").unwrap(), b"ping".to_vec(), false),
    )
    .await
    .expect("did not time out")
    .unwrap();

    assert_eq!(response.payload.as_slice(), b"pong".as_slice());
    responder.await.unwrap();
}

#[tokio::test]
async fn query_with_no_response_times_out() {
    let options = EngineBuilder::new()
        .with_response_forget_timeout(StdDuration::from_millis(100))
        .build();
    let a = start(options).await;
    let nobody: SocketAddr = "127.0.0.1:1".parse().unwrap();

    let err = a
        .send_query(nobody, Command::from_str("ASKQ").unwrap(), vec![], false)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Timeout));
}

#[tokio::test]
async fn large_payload_is_fragmented_and_reassembled_transparently() {
    let options = EngineBuilder::new().with_max_packet_size(64).build();
    let a = start(options.clone()).await;
    let b = start(options).await;

    let mut incoming = b.subscribe();
    let payload = vec![42u8; 500];

    tokio::time::timeout(
        StdDuration::from_secs(2),
        a.send_command(b.local_addr(), Command::from_str("BULK").unwrap(), payload.clone(), true, 1, false),
    )
    .await
    .expect("did not time out")
    .unwrap();

    let got = tokio::time::timeout(StdDuration::from_secs(2), incoming.recv())
        .await
        .expect("did not time out")
        .unwrap();
    assert_eq!(got.payload.as_slice(), payload.as_slice());
    assert!(got.reassembled);
}

#[tokio::test]
async fn compressed_command_round_trips_to_the_original_bytes() {
    let a = start(EngineOptions::default()).await;
    let b = start(EngineOptions::default()).await;

    let mut incoming = b.subscribe();
    let payload = b"the quick brown fox jumps over the lazy dog".repeat(4);

    tokio::time::timeout(
        StdDuration::from_secs(2),
        a.send_command(b.local_addr(), Command::from_str("BULK").unwrap(), payload.clone(), true, 1, true),
    )
    .await
    .expect("did not time out")
    .unwrap();

    let got = tokio::time::timeout(StdDuration::from_secs(2), incoming.recv())
        .await
        .expect("did not time out")
        .unwrap();
    assert_eq!(got.payload.as_slice(), payload.as_slice());
    assert!(got.compressed);
}

#[tokio::test]
async fn typed_inbox_only_receives_its_own_type_and_command() {
    let a = start(EngineOptions::default()).await;
    let b = start(EngineOptions::default()).await;

    let mut pings = b.subscribe_typed(MessageType::Command, Command::from_str("PING").unwrap()).await;
    let mut pongs = b.subscribe_typed(MessageType::Command, Command::from_str("PONG").unwrap()).await;

    tokio::time::timeout(
        StdDuration::from_secs(2),
        a.send_command(b.local_addr(), Command::from_str("PING").unwrap(), vec![], false, 0, false),
    )
    .await
    .expect("did not time out")
    .unwrap();

    tokio::time::timeout(StdDuration::from_secs(2), pings.recv())
        .await
        .expect("did not time out")
        .unwrap();
    assert!(pongs.try_recv().is_err());
}
