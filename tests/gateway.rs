mod common;

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;

use common::chat_stack;
use coursechat::config::ChatConfig;
use coursechat::gateway::{
    ClientChannel, ClientFrame, ConnectionGateway, ErrorKind, GatewayError, ServerFrame,
    SessionAccess,
};
use coursechat::history::InMemoryMessageStore;
use coursechat::message::ChatMessage;
use coursechat::registry::{ConnectionState, SessionRegistry};
use coursechat::router::MessageRouter;
use coursechat::types::{ParticipantId, SessionId};

async fn recv_frame(channel: &ClientChannel) -> ServerFrame {
    timeout(Duration::from_secs(2), channel.recv())
        .await
        .expect("frame within deadline")
        .expect("connection still open")
}

async fn next_delivered(channel: &ClientChannel) -> ChatMessage {
    loop {
        if let ServerFrame::Delivered { message } = recv_frame(channel).await {
            return message;
        }
    }
}

/// Wait until the channel reports closed, discarding queued frames.
async fn drain_to_close(channel: &ClientChannel) {
    timeout(Duration::from_secs(2), async {
        while channel.recv().await.is_some() {}
    })
    .await
    .expect("connection should close");
}

#[tokio::test]
async fn message_frames_echo_back_as_deliveries() {
    let config = ChatConfig::default();
    let stack = chat_stack(&config, None);
    let session = SessionId::new("s1");

    let alice = stack
        .gateway
        .connect(ParticipantId::user("alice"), session.clone(), None)
        .await
        .unwrap();

    alice.send(ClientFrame::Message { body: "hello".into() }).unwrap();
    let message = next_delivered(&alice).await;
    assert_eq!(message.id, 1);
    assert_eq!(message.body, "hello");
    assert_eq!(message.sender, ParticipantId::user("alice"));
}

#[tokio::test]
async fn fresh_join_backfills_existing_history() {
    let config = ChatConfig::default();
    let stack = chat_stack(&config, None);
    let session = SessionId::new("s1");

    let alice = stack
        .gateway
        .connect(ParticipantId::user("alice"), session.clone(), None)
        .await
        .unwrap();
    for body in ["one", "two", "three"] {
        alice.send(ClientFrame::Message { body: body.into() }).unwrap();
        next_delivered(&alice).await;
    }

    let bob = stack
        .gateway
        .connect(ParticipantId::user("bob"), session.clone(), None)
        .await
        .unwrap();
    for expected in 1..=3u64 {
        assert_eq!(next_delivered(&bob).await.id, expected);
    }
}

#[tokio::test]
async fn concurrent_senders_see_one_total_order() {
    let config = ChatConfig::default();
    let stack = chat_stack(&config, None);
    let session = SessionId::new("s1");

    let alice = Arc::new(
        stack
            .gateway
            .connect(ParticipantId::user("alice"), session.clone(), None)
            .await
            .unwrap(),
    );
    let bob = Arc::new(
        stack
            .gateway
            .connect(ParticipantId::user("bob"), session.clone(), None)
            .await
            .unwrap(),
    );

    let a = alice.clone();
    let send_a = tokio::spawn(async move {
        for i in 0..5 {
            a.send(ClientFrame::Message { body: format!("a{i}") }).unwrap();
        }
    });
    let b = bob.clone();
    let send_b = tokio::spawn(async move {
        for i in 0..5 {
            b.send(ClientFrame::Message { body: format!("b{i}") }).unwrap();
        }
    });
    send_a.await.unwrap();
    send_b.await.unwrap();

    let mut alice_ids = Vec::new();
    let mut bob_ids = Vec::new();
    for _ in 0..10 {
        alice_ids.push(next_delivered(&alice).await.id);
        bob_ids.push(next_delivered(&bob).await.id);
    }
    let expected: Vec<u64> = (1..=10).collect();
    assert_eq!(alice_ids, expected, "ids arrive strictly increasing");
    assert_eq!(bob_ids, expected, "both clients observe the same order");
}

#[tokio::test]
async fn resume_replays_exactly_the_missed_messages() {
    let config = ChatConfig::default();
    let stack = chat_stack(&config, None);
    let session = SessionId::new("s1");

    let alice = stack
        .gateway
        .connect(ParticipantId::user("alice"), session.clone(), None)
        .await
        .unwrap();

    let bob = stack
        .gateway
        .connect(ParticipantId::user("bob"), session.clone(), None)
        .await
        .unwrap();

    alice.send(ClientFrame::Message { body: "m1".into() }).unwrap();
    alice.send(ClientFrame::Message { body: "m2".into() }).unwrap();
    let mut last_seen = 0;
    for _ in 0..2 {
        last_seen = next_delivered(&bob).await.id;
    }

    // Bob drops; messages keep flowing while he is away.
    drop(bob);
    for body in ["m3", "m4", "m5"] {
        alice.send(ClientFrame::Message { body: body.into() }).unwrap();
        next_delivered(&alice).await;
    }

    let bob = stack
        .gateway
        .connect(ParticipantId::user("bob"), session.clone(), Some(last_seen))
        .await
        .unwrap();
    // New messages continue to arrive during the resume.
    alice.send(ClientFrame::Message { body: "m6".into() }).unwrap();

    let mut ids = Vec::new();
    for _ in 0..4 {
        ids.push(next_delivered(&bob).await.id);
    }
    assert_eq!(ids, vec![3, 4, 5, 6], "no gap, no duplicate across the handoff");
}

#[tokio::test]
async fn slow_consumer_is_dropped_and_recovers_by_resuming() {
    let config = ChatConfig::default().with_outbound_queue_bound(2);
    let stack = chat_stack(&config, None);
    let session = SessionId::new("s1");

    // The sender bypasses the gateway so only the laggard holds a connection.
    let sender = ParticipantId::user("alice");
    let conn = stack.registry.join(&session, &sender);
    stack.registry.open(conn).unwrap();

    let laggard = stack
        .gateway
        .connect(ParticipantId::user("larry"), session.clone(), None)
        .await
        .unwrap();

    for i in 0..10 {
        stack
            .router
            .submit(&session, &sender, format!("m{i}"))
            .await
            .unwrap();
    }

    // The laggard never drained; its queue overflowed and the gateway
    // dropped the connection.
    drain_to_close(&laggard).await;
    assert!(
        !stack
            .registry
            .members_of(&session)
            .contains(&ParticipantId::user("larry"))
    );

    // Reconnecting with resume backfills everything at the client's pace.
    let recovered = stack
        .gateway
        .connect(ParticipantId::user("larry"), session.clone(), Some(0))
        .await
        .unwrap();
    for expected in 1..=10u64 {
        assert_eq!(next_delivered(&recovered).await.id, expected);
    }
}

#[tokio::test]
async fn missed_heartbeats_close_the_connection() {
    let config = ChatConfig::default().with_heartbeat_timeout(Duration::from_millis(50));
    let stack = chat_stack(&config, None);
    let session = SessionId::new("s1");
    let alice = ParticipantId::user("alice");

    let channel = stack
        .gateway
        .connect(alice.clone(), session.clone(), None)
        .await
        .unwrap();

    // Heartbeats keep the connection alive past several timeout windows.
    for _ in 0..5 {
        channel.send(ClientFrame::Heartbeat).unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(
        stack.registry.connection_state(channel.connection_id),
        Some(ConnectionState::Open)
    );

    // Then silence.
    drain_to_close(&channel).await;
    assert!(!stack.registry.members_of(&session).contains(&alice));
}

#[tokio::test]
async fn join_on_an_established_connection_is_an_error_frame() {
    let config = ChatConfig::default();
    let stack = chat_stack(&config, None);
    let session = SessionId::new("s1");

    let channel = stack
        .gateway
        .connect(ParticipantId::user("alice"), session.clone(), None)
        .await
        .unwrap();
    channel.send(ClientFrame::Join { session_id: session }).unwrap();

    loop {
        match recv_frame(&channel).await {
            ServerFrame::Error { kind, .. } => {
                assert_eq!(kind, ErrorKind::AlreadyJoined);
                break;
            }
            ServerFrame::MemberUpdate { .. } => continue,
            other => panic!("unexpected frame {other:?}"),
        }
    }
}

#[tokio::test]
async fn leaving_publishes_a_member_update() {
    let config = ChatConfig::default();
    let stack = chat_stack(&config, None);
    let session = SessionId::new("s1");
    let bob_id = ParticipantId::user("bob");

    let alice = stack
        .gateway
        .connect(ParticipantId::user("alice"), session.clone(), None)
        .await
        .unwrap();
    let bob = stack
        .gateway
        .connect(bob_id.clone(), session.clone(), None)
        .await
        .unwrap();

    // Wait until alice has seen bob arrive.
    loop {
        if let ServerFrame::MemberUpdate { members } = recv_frame(&alice).await {
            if members.contains(&bob_id) {
                break;
            }
        }
    }

    drop(bob);
    loop {
        if let ServerFrame::MemberUpdate { members } = recv_frame(&alice).await {
            if !members.contains(&bob_id) {
                break;
            }
        }
    }
}

#[tokio::test]
async fn sweep_closes_connections_past_the_heartbeat_window() {
    let config = ChatConfig::default().with_heartbeat_timeout(Duration::from_secs(3600));
    let stack = chat_stack(&config, None);
    let session = SessionId::new("s1");
    let alice = ParticipantId::user("alice");

    let _channel = stack
        .gateway
        .connect(alice.clone(), session.clone(), None)
        .await
        .unwrap();

    assert_eq!(stack.gateway.sweep_idle(chrono::Utc::now()), 0);
    assert!(stack.router.tracks_session(&session));

    let later = chrono::Utc::now() + chrono::Duration::hours(2);
    assert_eq!(stack.gateway.sweep_idle(later), 1);
    assert!(!stack.registry.members_of(&session).contains(&alice));

    // The emptied session went idle long before `later`, so the same sweep
    // reaped it and released its fan-out channel.
    assert!(stack.registry.session_created_at(&session).is_none());
    assert!(!stack.router.tracks_session(&session));
}

#[tokio::test]
async fn steady_message_traffic_defers_expiry() {
    let config = ChatConfig::default().with_heartbeat_timeout(Duration::from_millis(300));
    let stack = chat_stack(&config, None);
    let session = SessionId::new("s1");
    let alice = ParticipantId::user("alice");

    let channel = stack
        .gateway
        .connect(alice.clone(), session.clone(), None)
        .await
        .unwrap();

    // Message frames only, no explicit heartbeats, spanning well past the
    // heartbeat window in total while each gap stays inside it.
    for i in 0..6 {
        channel.send(ClientFrame::Message { body: format!("m{i}") }).unwrap();
        next_delivered(&channel).await;
        tokio::time::sleep(Duration::from_millis(100)).await;
    }

    assert_eq!(stack.gateway.sweep_idle(chrono::Utc::now()), 0);
    assert_eq!(
        stack.registry.connection_state(channel.connection_id),
        Some(ConnectionState::Open)
    );
}

struct DenyList {
    blocked: &'static str,
}

#[async_trait]
impl SessionAccess for DenyList {
    async fn allow(&self, participant: &ParticipantId, _session: &SessionId) -> bool {
        participant.as_str() != self.blocked
    }
}

#[tokio::test]
async fn denied_participants_cannot_connect() {
    let config = ChatConfig::default();
    let registry = Arc::new(SessionRegistry::new(&config));
    let store = Arc::new(InMemoryMessageStore::new());
    let router = Arc::new(MessageRouter::new(registry.clone(), store, &config));
    let gateway = Arc::new(ConnectionGateway::new(
        registry.clone(),
        router,
        Arc::new(DenyList { blocked: "mallory" }),
        &config,
    ));

    let err = gateway
        .connect(ParticipantId::user("mallory"), SessionId::new("s1"), None)
        .await
        .unwrap_err();
    assert!(matches!(err, GatewayError::AccessDenied { .. }));
    assert!(registry.members_of(&SessionId::new("s1")).is_empty());

    // Everyone else still gets in.
    gateway
        .connect(ParticipantId::user("alice"), SessionId::new("s1"), None)
        .await
        .unwrap();
}
