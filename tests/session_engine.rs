//! End-to-end session engine tests against a scripted mock transport.

mod common;

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use sha2::{Digest, Sha256};

use common::{MockTransport, RecordingEvents};
use rrc_protocol::envelope::{
    encode, Envelope, LimitOverrides, MessageType, Payload, ResourceAnnouncement, WelcomeInfo,
};
use rrc_protocol::prelude::*;

const HUB_HEX: &str = "a1b2c3d4e5f60718293a4b5c6d7e8f90";

fn hub_destination() -> DestinationHash {
    DestinationHash::from_hex(HUB_HEX).unwrap()
}

fn local_identity() -> LocalIdentity {
    LocalIdentity::new(IdentityHash::from_bytes([0x11; 16]))
}

fn hub_source() -> Vec<u8> {
    hub_destination().as_bytes().to_vec()
}

fn engine_with(
    transport: Arc<MockTransport>,
    config: SessionConfig,
) -> (SessionEngine, Arc<RecordingEvents>) {
    let events = Arc::new(RecordingEvents::default());
    let engine = SessionEngine::new(config, transport, local_identity(), events.clone());
    (engine, events)
}

/// Connect, bring the link up, and feed a WELCOME carrying `limits`.
async fn connected_engine(
    limits: Option<LimitOverrides>,
) -> (SessionEngine, Arc<MockTransport>, Arc<RecordingEvents>) {
    let transport = Arc::new(MockTransport::reachable(hub_destination()));
    let (engine, events) = engine_with(transport.clone(), SessionConfig::default());

    engine.connect(hub_destination()).await.unwrap();
    engine.link_established();

    let welcome = Envelope::new(
        hub_source(),
        Payload::Welcome(WelcomeInfo {
            hub_name: Some("testhub".to_string()),
            greeting: Some("hello".to_string()),
            version: None,
            limits,
        }),
    );
    engine.packet_received(&encode(&welcome).unwrap());
    engine.wait_welcome(Duration::from_secs(1)).await.unwrap();

    (engine, transport, events)
}

#[tokio::test]
async fn test_connect_timeout_leaves_no_link() {
    let transport = Arc::new(MockTransport::unreachable());
    let config = SessionConfigBuilder::new()
        .connect_timeout(Duration::from_millis(200))
        .build();
    let (engine, _events) = engine_with(transport.clone(), config);

    let err = engine.connect(hub_destination()).await.unwrap_err();
    assert!(matches!(err, SessionError::Timeout(_)));
    assert_eq!(engine.phase(), SessionPhase::Failed);
    assert!(!engine.is_connected());

    // A path was requested, but no link exists to send on.
    assert!(transport.path_requests.load(Ordering::SeqCst) >= 1);
    assert!(matches!(engine.ping(), Err(SessionError::NotConnected)));
    assert!(transport.link.sent.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_destination_mismatch_is_protocol_error() {
    let transport = Arc::new(MockTransport::reachable(hub_destination()));
    *transport.derived.lock().unwrap() = Some(DestinationHash::from_bytes([0xEE; 16]));
    let (engine, _events) = engine_with(transport, SessionConfig::default());

    let err = engine.connect(hub_destination()).await.unwrap_err();
    assert!(matches!(err, SessionError::ProtocolMismatch(_)));
    assert_eq!(engine.phase(), SessionPhase::Failed);
}

#[tokio::test]
async fn test_welcome_with_no_waiter_is_not_lost() {
    let transport = Arc::new(MockTransport::reachable(hub_destination()));
    let (engine, _events) = engine_with(transport.clone(), SessionConfig::default());

    engine.connect(hub_destination()).await.unwrap();
    engine.link_established();

    // The WELCOME lands while nobody is awaiting it; the flag must stick
    // so a later wait_welcome observes it.
    let welcome = Envelope::new(hub_source(), Payload::Welcome(WelcomeInfo::default()));
    engine.packet_received(&encode(&welcome).unwrap());
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(engine.phase(), SessionPhase::Active);
    engine.wait_welcome(Duration::from_secs(1)).await.unwrap();
}

#[tokio::test]
async fn test_handshake_identifies_and_sends_hello() {
    let transport = Arc::new(MockTransport::reachable(hub_destination()));
    let (engine, events) = engine_with(transport.clone(), SessionConfig::default());

    engine.connect(hub_destination()).await.unwrap();
    engine.link_established();
    assert_eq!(engine.phase(), SessionPhase::Handshaking);
    assert!(transport.link.identified.load(Ordering::SeqCst));

    // The HELLO retry task sends the first greeting.
    tokio::time::sleep(Duration::from_millis(50)).await;
    let sent = transport.link.sent_envelopes();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].kind(), MessageType::Hello);

    // WELCOME completes the handshake exactly once.
    let welcome = Envelope::new(
        hub_source(),
        Payload::Welcome(WelcomeInfo {
            hub_name: Some("testhub".to_string()),
            greeting: None,
            version: None,
            limits: None,
        }),
    );
    let raw = encode(&welcome).unwrap();
    engine.packet_received(&raw);
    engine.packet_received(&raw);

    engine.wait_welcome(Duration::from_secs(1)).await.unwrap();
    assert_eq!(engine.phase(), SessionPhase::Active);
    assert!(engine.is_connected());
    assert_eq!(events.welcomes.lock().unwrap().len(), 1);

    // No further HELLOs after the welcome.
    tokio::time::sleep(Duration::from_millis(200)).await;
    let hellos = transport
        .link
        .sent_envelopes()
        .iter()
        .filter(|e| e.kind() == MessageType::Hello)
        .count();
    assert_eq!(hellos, 1);
}

#[tokio::test]
async fn test_welcome_limits_take_effect() {
    let (engine, _transport, _events) = connected_engine(Some(LimitOverrides {
        max_message_body_bytes: Some(8),
        ..Default::default()
    }))
    .await;

    let limits = engine.limits();
    assert_eq!(limits.max_message_body_bytes, 8);

    // Exactly at the limit passes; one byte over is rejected locally.
    assert!(engine.msg("general", "12345678").is_ok());
    assert!(matches!(
        engine.msg("general", "123456789"),
        Err(SessionError::Validation(ValidationError::MessageTooLong {
            actual: 9,
            limit: 8,
        }))
    ));
}

#[tokio::test]
async fn test_join_and_part_normalize_room_names() {
    let (engine, transport, events) = connected_engine(None).await;

    engine.join("  General ", None).unwrap();
    let sent = transport.link.sent_envelopes();
    let join = sent.last().unwrap();
    assert_eq!(join.kind(), MessageType::Join);
    assert_eq!(join.header.room.as_deref(), Some("general"));

    // Hub confirms with its own casing; membership is still normalized.
    let mut joined = Envelope::new(hub_source(), Payload::Joined(Default::default()));
    joined.header.room = Some("General".to_string());
    engine.packet_received(&encode(&joined).unwrap());

    assert_eq!(engine.rooms(), vec!["general".to_string()]);
    assert_eq!(events.joined.lock().unwrap().as_slice(), &["general"]);

    // Parting is optimistic: membership drops before the hub confirms.
    engine.part("GENERAL").unwrap();
    assert!(engine.rooms().is_empty());
    let part = transport.link.sent_envelopes().pop().unwrap();
    assert_eq!(part.kind(), MessageType::Part);
    assert_eq!(part.header.room.as_deref(), Some("general"));
}

#[tokio::test]
async fn test_join_key_rides_in_body() {
    let (engine, transport, _events) = connected_engine(None).await;

    engine.join("vault", Some("s3cret")).unwrap();
    let join = transport.link.sent_envelopes().pop().unwrap();
    match join.payload {
        Payload::Join { key } => assert_eq!(key.as_deref(), Some("s3cret")),
        other => panic!("expected JOIN, got {other:?}"),
    }

    // Empty keys are dropped.
    engine.join("lobby", Some("")).unwrap();
    let join = transport.link.sent_envelopes().pop().unwrap();
    match join.payload {
        Payload::Join { key } => assert!(key.is_none()),
        other => panic!("expected JOIN, got {other:?}"),
    }
}

#[tokio::test]
async fn test_mdu_guard_refuses_oversized_sends() {
    let (engine, transport, events) = connected_engine(None).await;
    let before = transport.link.sent.lock().unwrap().len();

    transport.link.mdu.store(16, Ordering::SeqCst);
    let err = engine.msg("general", "this will not fit in one packet").unwrap_err();
    assert!(matches!(err, SessionError::MessageTooLarge));

    // Warned, and nothing hit the wire.
    assert_eq!(events.warnings.lock().unwrap().len(), 1);
    assert_eq!(transport.link.sent.lock().unwrap().len(), before);
}

#[tokio::test]
async fn test_echo_confirms_delivery() {
    let (engine, _transport, events) = connected_engine(None).await;

    let id = engine.msg("general", "hello there").unwrap();

    // The hub echoes the message back with our source hash.
    let mut echo = Envelope::new(
        local_identity().hash.as_bytes().to_vec(),
        Payload::Msg("hello there".to_string()),
    )
    .with_room("general");
    echo.header.id = id;
    engine.packet_received(&encode(&echo).unwrap());

    let confirmed = events.confirmed.lock().unwrap();
    assert_eq!(confirmed.as_slice(), &[(id, "general".to_string())]);
    // The echo is still surfaced as a regular message.
    assert_eq!(events.messages.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn test_foreign_message_not_confirmed() {
    let (engine, _transport, events) = connected_engine(None).await;

    engine.msg("general", "mine").unwrap();

    let foreign = Envelope::new(vec![0x99; 16], Payload::Msg("mine".to_string()))
        .with_room("general");
    engine.packet_received(&encode(&foreign).unwrap());

    assert!(events.confirmed.lock().unwrap().is_empty());
    assert_eq!(events.messages.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn test_ping_pong_measures_latency() {
    let (engine, _transport, events) = connected_engine(None).await;

    let id = engine.ping().unwrap();

    let mut pong = Envelope::new(hub_source(), Payload::Pong(None));
    pong.header.id = id;
    engine.packet_received(&encode(&pong).unwrap());

    let pongs = events.pongs.lock().unwrap().clone();
    assert_eq!(pongs.len(), 1);
    assert!(pongs[0].is_some());
    assert!(engine.latency_ms().is_some());
}

#[tokio::test]
async fn test_unsolicited_pong_still_reaches_events() {
    let (engine, _transport, events) = connected_engine(None).await;

    // No outstanding ping with this id, so there is no RTT sample, but
    // the envelope is forwarded regardless.
    let pong = Envelope::new(hub_source(), Payload::Pong(None));
    engine.packet_received(&encode(&pong).unwrap());

    let pongs = events.pongs.lock().unwrap().clone();
    assert_eq!(pongs.len(), 1);
    assert!(pongs[0].is_none());
    assert!(engine.latency_ms().is_none());
}

#[tokio::test]
async fn test_inbound_ping_is_answered() {
    let (engine, transport, _events) = connected_engine(None).await;
    let before = transport.link.sent.lock().unwrap().len();

    let ping = Envelope::new(hub_source(), Payload::Ping(None));
    engine.packet_received(&encode(&ping).unwrap());

    let sent = transport.link.sent_envelopes();
    assert_eq!(sent.len(), before + 1);
    assert_eq!(sent.last().unwrap().kind(), MessageType::Pong);
    assert_eq!(sent.last().unwrap().header.id, ping.header.id);
}

#[tokio::test]
async fn test_motd_resource_yields_one_notice() {
    let (engine, _transport, events) = connected_engine(None).await;

    let body = "welcome to the hub\n".repeat(6);
    let data = body.as_bytes().to_vec();
    assert_eq!(data.len(), 114);
    let digest: [u8; 32] = Sha256::digest(&data).into();

    let announcement = Envelope::new(
        hub_source(),
        Payload::ResourceAnnouncement(ResourceAnnouncement {
            id: vec![0x01],
            kind: "motd".to_string(),
            size: data.len() as u64,
            sha256: Some(digest),
            encoding: Some("utf-8".to_string()),
        }),
    );
    engine.packet_received(&encode(&announcement).unwrap());

    let transfer = TransferId(7);
    assert!(engine.resource_advertised(transfer, data.len() as u64));
    engine.resource_concluded(transfer, TransferStatus::Complete, data.len() as u64, Some(data));

    let notices = events.notices.lock().unwrap();
    assert_eq!(notices.len(), 1);
    match &notices[0].payload {
        Payload::Notice(text) => assert_eq!(text, &body),
        other => panic!("expected NOTICE, got {other:?}"),
    }
}

#[tokio::test]
async fn test_corrupt_resource_is_discarded() {
    let (engine, _transport, events) = connected_engine(None).await;

    let announcement = Envelope::new(
        hub_source(),
        Payload::ResourceAnnouncement(ResourceAnnouncement {
            id: vec![0x02],
            kind: "notice".to_string(),
            size: 5,
            sha256: Some([0xAB; 32]),
            encoding: None,
        }),
    );
    engine.packet_received(&encode(&announcement).unwrap());

    let transfer = TransferId(8);
    assert!(engine.resource_advertised(transfer, 5));
    engine.resource_concluded(
        transfer,
        TransferStatus::Complete,
        5,
        Some(b"hello".to_vec()),
    );

    assert!(events.notices.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_oversized_resource_rejected() {
    let (engine, _transport, _events) = connected_engine(None).await;
    let too_big = rrc_protocol::core::constants::DEFAULT_MAX_RESOURCE_BYTES + 1;
    assert!(!engine.resource_advertised(TransferId(9), too_big));
    assert!(!engine.resource_advertised(TransferId(10), 0));
}

#[tokio::test]
async fn test_close_cancels_active_transfer() {
    let (engine, transport, _events) = connected_engine(None).await;

    let announcement = Envelope::new(
        hub_source(),
        Payload::ResourceAnnouncement(ResourceAnnouncement {
            id: vec![0x03],
            kind: "notice".to_string(),
            size: 64,
            sha256: None,
            encoding: None,
        }),
    );
    engine.packet_received(&encode(&announcement).unwrap());

    let transfer = TransferId(42);
    assert!(engine.resource_advertised(transfer, 64));

    engine.close();

    let cancelled = transport.link.cancelled.lock().unwrap().clone();
    assert_eq!(cancelled, vec![transfer]);
}

#[tokio::test]
async fn test_unechoed_message_times_out() {
    let transport = Arc::new(MockTransport::reachable(hub_destination()));
    let config = SessionConfigBuilder::new()
        .delivery_timeout(Duration::from_millis(0))
        .build();
    let (engine, events) = engine_with(transport.clone(), config);

    engine.connect(hub_destination()).await.unwrap();
    engine.link_established();
    let welcome = Envelope::new(
        hub_source(),
        Payload::Welcome(WelcomeInfo::default()),
    );
    engine.packet_received(&encode(&welcome).unwrap());
    engine.wait_welcome(Duration::from_secs(1)).await.unwrap();

    let id = engine.msg("general", "anyone there?").unwrap();

    // The sweep runs on a one-second cadence; give it one full tick.
    tokio::time::sleep(Duration::from_millis(1300)).await;

    let timed_out = events.timed_out.lock().unwrap().clone();
    assert_eq!(
        timed_out,
        vec![(id, "general".to_string(), "anyone there?".to_string())]
    );
    assert!(events.confirmed.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_close_tears_everything_down() {
    let (engine, transport, events) = connected_engine(None).await;
    engine.join("general", None).unwrap();

    let mut joined = Envelope::new(hub_source(), Payload::Joined(Default::default()));
    joined.header.room = Some("general".to_string());
    engine.packet_received(&encode(&joined).unwrap());
    assert_eq!(engine.rooms().len(), 1);

    engine.close();

    assert_eq!(engine.phase(), SessionPhase::Closed);
    assert!(!engine.is_connected());
    assert!(engine.rooms().is_empty());
    assert!(transport.link.torn_down.load(Ordering::SeqCst));
    assert_eq!(events.closes.load(Ordering::SeqCst), 1);
    assert!(matches!(
        engine.msg("general", "late"),
        Err(SessionError::NotConnected)
    ));
}

#[tokio::test]
async fn test_panicking_callback_does_not_poison_session() {
    struct PanickyEvents;
    impl SessionEvents for PanickyEvents {
        fn on_message(&self, _envelope: &Envelope) {
            panic!("listener bug");
        }
    }

    let transport = Arc::new(MockTransport::reachable(hub_destination()));
    let engine = SessionEngine::new(
        SessionConfig::default(),
        transport,
        local_identity(),
        Arc::new(PanickyEvents),
    );
    engine.connect(hub_destination()).await.unwrap();
    engine.link_established();

    let msg = Envelope::new(vec![0x99; 16], Payload::Msg("boom".to_string())).with_room("general");
    engine.packet_received(&encode(&msg).unwrap());

    // The engine survives and stays usable.
    assert_eq!(engine.phase(), SessionPhase::Handshaking);
    assert!(engine.msg("general", "still alive").is_ok());
}
