//! Signaling channel against a real websocket endpoint.

use std::time::Duration;

use axum::Router;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::routing::get;
use tokio::net::TcpListener;
use tokio::sync::mpsc;

use cast_proto::SignalingMessage;
use scenecast_core::signaling::{SignalingChannel, SignalingError, SignalingEvent};

async fn spawn_relay() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = Router::new().route("/ws", get(ws_handler));
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("ws://{addr}/ws")
}

async fn ws_handler(ws: WebSocketUpgrade) -> axum::response::Response {
    ws.on_upgrade(relay_script)
}

/// Plays the relay side of one negotiation: ack the registration, slip
/// in a malformed frame, announce the viewer, then answer the offer
/// with an answer plus one candidate and hang up.
async fn relay_script(mut socket: WebSocket) {
    let Some(Ok(Message::Text(registration))) = socket.recv().await else {
        return;
    };
    assert!(registration.contains("gstreamer"), "unexpected registration: {registration}");

    for frame in [
        r#"{"type":"ack","role":"sender"}"#,
        "this is not json",
        r#"{"type":"ready"}"#,
    ] {
        socket.send(Message::Text(frame.to_string())).await.unwrap();
    }

    while let Some(Ok(frame)) = socket.recv().await {
        let Message::Text(text) = frame else { continue };
        if text.contains(r#""offer""#) {
            socket
                .send(Message::Text(r#"{"type":"answer","sdp":"v=0 relay answer"}"#.to_string()))
                .await
                .unwrap();
            socket
                .send(Message::Text(
                    r#"{"type":"ice","sdpMLineIndex":0,"candidate":"candidate:relay 198.51.100.7"}"#
                        .to_string(),
                ))
                .await
                .unwrap();
            break;
        }
    }
    let _ = socket.close().await;
}

async fn next_event(rx: &mut mpsc::UnboundedReceiver<SignalingEvent>) -> SignalingEvent {
    tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("timed out waiting for a signaling event")
        .expect("event channel closed")
}

#[tokio::test]
async fn full_exchange_over_a_real_websocket() {
    let url = spawn_relay().await;
    let mut channel = SignalingChannel::connect(&url).await.unwrap();
    let mut events = channel.events().unwrap();

    channel.send(SignalingMessage::Register).unwrap();
    assert!(matches!(
        next_event(&mut events).await,
        SignalingEvent::Message(SignalingMessage::Ack { .. })
    ));

    // The malformed frame in between is dropped, not fatal.
    assert!(matches!(
        next_event(&mut events).await,
        SignalingEvent::Message(SignalingMessage::Ready)
    ));

    channel
        .send(SignalingMessage::Offer {
            sdp: "v=0 local offer".into(),
        })
        .unwrap();

    match next_event(&mut events).await {
        SignalingEvent::Message(SignalingMessage::Answer { sdp }) => {
            assert_eq!(sdp, "v=0 relay answer");
        }
        other => panic!("expected an answer, got {other:?}"),
    }
    match next_event(&mut events).await {
        SignalingEvent::Message(SignalingMessage::IceCandidate {
            sdp_mline_index,
            candidate,
        }) => {
            assert_eq!(sdp_mline_index, 0);
            assert_eq!(candidate, "candidate:relay 198.51.100.7");
        }
        other => panic!("expected a candidate, got {other:?}"),
    }

    // The relay hangs up; exactly one Closed event follows.
    assert!(matches!(next_event(&mut events).await, SignalingEvent::Closed));
    assert!(events.recv().await.is_none());
}

#[tokio::test]
async fn events_can_only_be_taken_once() {
    let url = spawn_relay().await;
    let mut channel = SignalingChannel::connect(&url).await.unwrap();
    assert!(channel.events().is_some());
    assert!(channel.events().is_none());
}

#[tokio::test]
async fn rejects_non_websocket_schemes() {
    let err = SignalingChannel::connect("https://relay.example.net/ws")
        .await
        .unwrap_err();
    assert!(matches!(err, SignalingError::InvalidUrl { .. }));
}

#[tokio::test]
async fn connect_failure_is_reported() {
    // Port 1 on localhost is not listening.
    let err = SignalingChannel::connect("ws://127.0.0.1:1/ws")
        .await
        .unwrap_err();
    assert!(matches!(err, SignalingError::Connect(_)));
}
