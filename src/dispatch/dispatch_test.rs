use super::*;
use crate::message::{Command, MessageType, Payload};
use std::time::Duration;

fn addr() -> std::net::SocketAddr {
    "127.0.0.1:9003".parse().unwrap()
}

fn inbound(typ: MessageType, command: &str, id: u32) -> Message {
    let mut m = Message::new(typ, Command::from_str(command).unwrap(), id);
    m.sender = Some(addr());
    m
}

#[test]
fn an_ack_resolves_the_matching_pending_entry() {
    let mut reliability = ReliabilityEngine::new(Duration::from_millis(200), Duration::from_millis(2000));
    let mut reassembly = ReassemblyEngine::new(Duration::from_millis(2000));

    let id = ack_id(addr(), MessageType::Command, Command::from_str("PING").unwrap(), 1, None);
    let _rx = reliability.register(id, addr(), vec![1], 0, tokio::time::Instant::now());

    let mut ack = inbound(MessageType::Command, "PING", 1);
    ack.is_ack = true;

    assert!(matches!(
        classify(ack, &mut reliability, &mut reassembly, false),
        Dispatched::Ack
    ));
    assert!(reliability.is_empty());
}

#[test]
fn a_stray_ack_is_logged_and_dropped_without_panicking() {
    let mut reliability = ReliabilityEngine::new(Duration::from_millis(200), Duration::from_millis(2000));
    let mut reassembly = ReassemblyEngine::new(Duration::from_millis(2000));

    let mut ack = inbound(MessageType::Command, "PING", 1);
    ack.is_ack = true;

    assert!(matches!(
        classify(ack, &mut reliability, &mut reassembly, false),
        Dispatched::Ack
    ));
}

#[test]
fn an_unfragmented_message_is_complete_immediately_and_requests_an_ack() {
    let mut reliability = ReliabilityEngine::new(Duration::from_millis(200), Duration::from_millis(2000));
    let mut reassembly = ReassemblyEngine::new(Duration::from_millis(2000));

    let mut msg = inbound(MessageType::Command, "PING", 1);
    msg.want_ack = true;

    match classify(msg, &mut reliability, &mut reassembly, false) {
        Dispatched::Complete { ack, .. } => assert!(ack.is_some()),
        _ => panic!("expected Complete"),
    }
}

#[test]
fn ignore_wanted_ack_suppresses_the_ack_even_when_requested() {
    let mut reliability = ReliabilityEngine::new(Duration::from_millis(200), Duration::from_millis(2000));
    let mut reassembly = ReassemblyEngine::new(Duration::from_millis(2000));

    let mut msg = inbound(MessageType::Command, "PING", 1);
    msg.want_ack = true;

    match classify(msg, &mut reliability, &mut reassembly, true) {
        Dispatched::Complete { ack, .. } => assert!(ack.is_none()),
        _ => panic!("expected Complete"),
    }
}

#[test]
fn a_fragment_stays_pending_until_reassembly_completes() {
    let mut reliability = ReliabilityEngine::new(Duration::from_millis(200), Duration::from_millis(2000));
    let mut reassembly = ReassemblyEngine::new(Duration::from_millis(2000));

    let mut first = inbound(MessageType::Command, "BULK", 2);
    first.fragmented = true;
    first.fragment_index = 0;
    first.fragments_total = 2;
    first.payload = Payload::Encoded(bytes::Bytes::from(b"ab".to_vec()));

    assert!(matches!(
        classify(first, &mut reliability, &mut reassembly, false),
        Dispatched::FragmentPending { .. }
    ));

    let mut second = inbound(MessageType::Command, "BULK", 2);
    second.fragmented = true;
    second.fragment_index = 1;
    second.fragments_total = 2;
    second.payload = Payload::Encoded(bytes::Bytes::from(b"cd".to_vec()));

    match classify(second, &mut reliability, &mut reassembly, false) {
        Dispatched::Complete { message, .. } => assert_eq!(message.payload.as_slice(), b"abcd"),
        _ => panic!("expected Complete"),
    }
}

#[test]
fn each_fragment_requesting_an_ack_is_acked_with_its_own_coordinates() {
    let mut reliability = ReliabilityEngine::new(Duration::from_millis(200), Duration::from_millis(2000));
    let mut reassembly = ReassemblyEngine::new(Duration::from_millis(2000));

    let mut first = inbound(MessageType::Command, "BULK", 3);
    first.fragmented = true;
    first.fragment_index = 0;
    first.fragments_total = 2;
    first.want_ack = true;
    first.payload = Payload::Encoded(bytes::Bytes::from(b"ab".to_vec()));

    match classify(first, &mut reliability, &mut reassembly, false) {
        Dispatched::FragmentPending { ack: Some(ack) } => {
            assert!(ack.fragmented);
            assert_eq!(ack.fragment_index, 0);
            assert_eq!(ack.fragments_total, 2);
        }
        _ => panic!("expected FragmentPending with an ack"),
    }

    let mut second = inbound(MessageType::Command, "BULK", 3);
    second.fragmented = true;
    second.fragment_index = 1;
    second.fragments_total = 2;
    second.want_ack = true;
    second.payload = Payload::Encoded(bytes::Bytes::from(b"cd".to_vec()));

    match classify(second, &mut reliability, &mut reassembly, false) {
        Dispatched::Complete { ack: Some(ack), .. } => {
            assert!(ack.fragmented);
            assert_eq!(ack.fragment_index, 1);
            assert_eq!(ack.fragments_total, 2);
        }
        _ => panic!("expected Complete with an ack"),
    }
}
