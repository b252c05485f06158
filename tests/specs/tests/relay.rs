// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! End-to-end relay scenarios over real WebSocket connections.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parley_client::{ClientConfig, SocketManager, Status};
use parley_specs::{token_for, TestRelay, WsClient};

const TIMEOUT: Duration = Duration::from_secs(10);

// -- Direct-send dialect ------------------------------------------------------

#[tokio::test]
async fn direct_send_round_trip() -> anyhow::Result<()> {
    let relay = TestRelay::start().await?;
    let mut alice = WsClient::connect(&relay, "u1").await?;
    let mut bob = WsClient::connect(&relay, "u2").await?;

    alice
        .send(&serde_json::json!({
            "event": "sendMessage",
            "receiverId": "u2",
            "content": "hello",
        }))
        .await?;

    let ack = alice.expect_event("messageSent", TIMEOUT).await?;
    assert_eq!(ack["message"]["content"], "hello");
    assert_eq!(ack["message"]["senderId"], "u1");

    let delivery = bob.expect_event("receiveMessage", TIMEOUT).await?;
    assert_eq!(delivery["message"]["id"], ack["message"]["id"]);

    let sender_summary = alice.expect_event("conversationUpdated", TIMEOUT).await?;
    assert_eq!(sender_summary["unreadCount"], 0);
    let receiver_summary = bob.expect_event("conversationUpdated", TIMEOUT).await?;
    assert_eq!(receiver_summary["unreadCount"], 1);
    assert_eq!(receiver_summary["conversation"]["lastMessagePreview"], "hello");

    Ok(())
}

#[tokio::test]
async fn offline_recipient_message_persists_until_fetched() -> anyhow::Result<()> {
    let relay = TestRelay::start().await?;
    let mut alice = WsClient::connect(&relay, "u1").await?;

    // u2 never connects.
    alice
        .send(&serde_json::json!({
            "event": "sendMessage",
            "receiverId": "u2",
            "content": "hello",
        }))
        .await?;
    alice.expect_event("messageSent", TIMEOUT).await?;

    let conversations = relay.state.store.conversations_for_user("u2").await?;
    assert_eq!(conversations.len(), 1);
    assert_eq!(conversations[0].unread_count, 1);

    // Fetching is an implicit read.
    let history = relay.state.relay.fetch_history("u2", &conversations[0].id).await
        .map_err(|e| anyhow::anyhow!("{}: {}", e.code, e.message))?;
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].content, "hello");
    assert!(history[0].read);

    let refreshed = relay.state.store.conversations_for_user("u2").await?;
    assert_eq!(refreshed[0].unread_count, 0);

    Ok(())
}

#[tokio::test]
async fn simultaneous_first_contact_yields_one_conversation() -> anyhow::Result<()> {
    let relay = TestRelay::start().await?;
    let mut alice = WsClient::connect(&relay, "u1").await?;
    let mut bob = WsClient::connect(&relay, "u2").await?;

    let from_alice = serde_json::json!({
        "event": "sendMessage", "receiverId": "u2", "content": "hi from u1",
    });
    let from_bob = serde_json::json!({
        "event": "sendMessage", "receiverId": "u1", "content": "hi from u2",
    });
    let (a, b) = tokio::join!(alice.send(&from_alice), bob.send(&from_bob));
    a?;
    b?;

    alice.expect_event("messageSent", TIMEOUT).await?;
    bob.expect_event("messageSent", TIMEOUT).await?;

    let for_alice = relay.state.store.conversations_for_user("u1").await?;
    assert_eq!(for_alice.len(), 1);
    assert_eq!(for_alice[0].unread_count, 2);

    Ok(())
}

// -- Conversation-centric dialect ---------------------------------------------

#[tokio::test]
async fn conversation_dialect_delivers_to_both_sides() -> anyhow::Result<()> {
    let relay = TestRelay::start().await?;
    let mut alice = WsClient::connect(&relay, "u1").await?;
    let mut bob = WsClient::connect(&relay, "u2").await?;

    alice
        .send(&serde_json::json!({
            "event": "sendMessage", "receiverId": "u2", "content": "opening",
        }))
        .await?;
    alice.expect_event("messageSent", TIMEOUT).await?;
    let conversation_id =
        relay.state.store.conversations_for_user("u1").await?.remove(0).id;

    alice
        .send(&serde_json::json!({
            "event": "newMessage",
            "conversationId": conversation_id,
            "text": "reply",
        }))
        .await?;

    let echo = alice.expect_event("newMessage", TIMEOUT).await?;
    assert_eq!(echo["message"]["content"], "reply");
    let delivery = bob.expect_event("newMessage", TIMEOUT).await?;
    assert_eq!(delivery["message"]["id"], echo["message"]["id"]);

    Ok(())
}

#[tokio::test]
async fn unknown_conversation_returns_error_without_writes() -> anyhow::Result<()> {
    let relay = TestRelay::start().await?;
    let mut alice = WsClient::connect(&relay, "u1").await?;

    alice
        .send(&serde_json::json!({
            "event": "newMessage", "conversationId": "ghost", "text": "hello",
        }))
        .await?;

    let error = alice.expect_event("error", TIMEOUT).await?;
    assert_eq!(error["code"], "NOT_FOUND");

    assert!(relay.state.store.conversations_for_user("u1").await?.is_empty());
    Ok(())
}

#[tokio::test]
async fn malformed_frame_returns_validation_error() -> anyhow::Result<()> {
    let relay = TestRelay::start().await?;
    let mut alice = WsClient::connect(&relay, "u1").await?;

    alice.send(&serde_json::json!({ "event": "warpDrive" })).await?;

    let error = alice.expect_event("error", TIMEOUT).await?;
    assert_eq!(error["code"], "VALIDATION");
    Ok(())
}

// -- Read receipts ------------------------------------------------------------

#[tokio::test]
async fn mark_read_echoes_updated_ids() -> anyhow::Result<()> {
    let relay = TestRelay::start().await?;
    let mut alice = WsClient::connect(&relay, "u1").await?;
    let mut bob = WsClient::connect(&relay, "u2").await?;

    alice
        .send(&serde_json::json!({
            "event": "sendMessage", "receiverId": "u2", "content": "hello",
        }))
        .await?;
    let delivery = bob.expect_event("receiveMessage", TIMEOUT).await?;
    let message_id = delivery["message"]["id"].clone();

    bob.send(&serde_json::json!({
        "event": "markRead",
        "messageIds": [message_id, "ghost"],
    }))
    .await?;

    let receipt = bob.expect_event("messagesRead", TIMEOUT).await?;
    assert_eq!(receipt["messageIds"], serde_json::json!([delivery["message"]["id"]]));
    Ok(())
}

// -- Connection gate ----------------------------------------------------------

#[tokio::test]
async fn handshake_without_token_is_rejected() -> anyhow::Result<()> {
    let relay = TestRelay::start().await?;
    let result = tokio_tungstenite::connect_async(relay.ws_url()).await;
    assert!(result.is_err());
    Ok(())
}

#[tokio::test]
async fn handshake_with_forged_token_is_rejected() -> anyhow::Result<()> {
    let relay = TestRelay::start().await?;
    let forged = parley_relay::auth::sign_token(
        &serde_json::json!({ "id": "u1" }),
        "some-other-secret",
    );
    let url = format!("{}?token={forged}", relay.ws_url());
    assert!(tokio_tungstenite::connect_async(&url).await.is_err());
    Ok(())
}

// -- Socket manager -----------------------------------------------------------

fn manager_config(relay_port: u16, user: &str) -> ClientConfig {
    let mut config = ClientConfig::new(
        vec![
            // Dead candidate first: the probe cycle must fall through to the
            // live one.
            "ws://127.0.0.1:9/ws".to_owned(),
            format!("ws://127.0.0.1:{relay_port}/ws"),
        ],
        token_for(user),
    );
    config.probe_timeout = Duration::from_millis(500);
    config.backoff_base = Duration::from_millis(100);
    config.max_backoff_attempts = 3;
    config
}

async fn wait_for_hits(hits: &AtomicUsize, at_least: usize) -> anyhow::Result<()> {
    let deadline = tokio::time::Instant::now() + TIMEOUT;
    while hits.load(Ordering::SeqCst) < at_least {
        if tokio::time::Instant::now() >= deadline {
            anyhow::bail!("listener never reached {at_least} hits");
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    Ok(())
}

#[tokio::test]
async fn manager_survives_server_restart_with_listeners_intact() -> anyhow::Result<()> {
    let relay = TestRelay::start().await?;
    let port = relay.port();

    let manager = SocketManager::new(manager_config(port, "u2"));
    let hits = Arc::new(AtomicUsize::new(0));
    let counted = Arc::clone(&hits);
    manager.add_listener("receiveMessage", move |_| {
        counted.fetch_add(1, Ordering::SeqCst);
    });

    manager.connect()?;
    let mut status = manager.status();
    status.wait_for(|s| *s == Status::Connected).await?;

    let mut alice = WsClient::connect(&relay, "u1").await?;
    alice
        .send(&serde_json::json!({
            "event": "sendMessage", "receiverId": "u2", "content": "before restart",
        }))
        .await?;
    wait_for_hits(&hits, 1).await?;

    // Kill the server; the manager must fall back to reconnecting.
    relay.stop();
    drop(alice);
    status.wait_for(|s| *s != Status::Connected).await?;

    // Bring a fresh server up on the same port.
    let relay = TestRelay::start_on(port).await?;
    status.wait_for(|s| *s == Status::Connected).await?;

    // The listener registered before the outage still fires.
    let mut alice = WsClient::connect(&relay, "u1").await?;
    alice
        .send(&serde_json::json!({
            "event": "sendMessage", "receiverId": "u2", "content": "after restart",
        }))
        .await?;
    wait_for_hits(&hits, 2).await?;

    manager.close();
    Ok(())
}

#[tokio::test]
async fn manager_emits_without_a_status_watcher() -> anyhow::Result<()> {
    let relay = TestRelay::start().await?;
    let mut bob = WsClient::connect(&relay, "u2").await?;

    // No status() receiver is ever created; the manager's stored state must
    // still advance to Connected so emit works.
    let manager = SocketManager::new(manager_config(relay.port(), "u1"));
    manager.connect()?;

    let frame = serde_json::json!({ "receiverId": "u2", "content": "unwatched" });
    let deadline = tokio::time::Instant::now() + TIMEOUT;
    loop {
        match manager.emit("sendMessage", frame.clone()) {
            Ok(()) => break,
            Err(_) if tokio::time::Instant::now() < deadline => {
                tokio::time::sleep(Duration::from_millis(25)).await;
            }
            Err(e) => return Err(e),
        }
    }

    let delivery = bob.expect_event("receiveMessage", TIMEOUT).await?;
    assert_eq!(delivery["message"]["content"], "unwatched");

    manager.close();
    Ok(())
}

#[tokio::test]
async fn manager_emits_through_the_relay() -> anyhow::Result<()> {
    let relay = TestRelay::start().await?;

    let manager = SocketManager::new(manager_config(relay.port(), "u1"));
    manager.connect()?;
    manager.status().wait_for(|s| *s == Status::Connected).await?;

    let mut bob = WsClient::connect(&relay, "u2").await?;
    manager.emit(
        "sendMessage",
        serde_json::json!({ "receiverId": "u2", "content": "via manager" }),
    )?;

    let delivery = bob.expect_event("receiveMessage", TIMEOUT).await?;
    assert_eq!(delivery["message"]["content"], "via manager");

    manager.close();
    Ok(())
}
