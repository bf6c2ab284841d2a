//! Duplex text-message channel to the signaling relay.
//!
//! One writer task drains an outbound queue, one reader task decodes
//! inbound frames; both hang off the websocket split halves. Malformed
//! inbound JSON is logged and dropped. A close or transport error
//! surfaces exactly one `Closed` event and ends the stream; the channel
//! is not restartable.

use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use url::Url;

use cast_proto::SignalingMessage;

#[derive(Debug)]
pub enum SignalingEvent {
    Message(SignalingMessage),
    Closed,
}

#[derive(Debug, thiserror::Error)]
pub enum SignalingError {
    #[error("invalid signaling url {url}: {reason}")]
    InvalidUrl { url: String, reason: String },
    #[error("websocket connect failed: {0}")]
    Connect(String),
    #[error("signaling channel closed")]
    ChannelClosed,
}

#[derive(Debug)]
pub struct SignalingChannel {
    outbound: mpsc::UnboundedSender<SignalingMessage>,
    events: Option<mpsc::UnboundedReceiver<SignalingEvent>>,
    tasks: Vec<tokio::task::JoinHandle<()>>,
}

impl SignalingChannel {
    pub async fn connect(endpoint: &str) -> Result<Self, SignalingError> {
        let url = Url::parse(endpoint).map_err(|err| SignalingError::InvalidUrl {
            url: endpoint.to_string(),
            reason: err.to_string(),
        })?;
        if !matches!(url.scheme(), "ws" | "wss") {
            return Err(SignalingError::InvalidUrl {
                url: endpoint.to_string(),
                reason: "expected a ws:// or wss:// endpoint".into(),
            });
        }

        let (ws_stream, _) = connect_async(url.as_str())
            .await
            .map_err(|err| SignalingError::Connect(err.to_string()))?;
        tracing::info!(target = "signaling", url = %url, "signaling websocket connected");

        let (mut ws_write, mut ws_read) = ws_stream.split();
        let (outbound, mut outbound_rx) = mpsc::unbounded_channel::<SignalingMessage>();
        let (events_tx, events_rx) = mpsc::unbounded_channel::<SignalingEvent>();

        let writer = tokio::spawn(async move {
            while let Some(message) = outbound_rx.recv().await {
                tracing::trace!(target = "signaling", kind = message.kind(), "sending frame");
                if ws_write.send(Message::Text(message.encode())).await.is_err() {
                    break;
                }
            }
        });

        let reader = tokio::spawn(async move {
            while let Some(frame) = ws_read.next().await {
                let text = match frame {
                    Ok(Message::Text(text)) => text,
                    Ok(Message::Binary(data)) => match String::from_utf8(data) {
                        Ok(text) => text,
                        Err(_) => {
                            tracing::warn!(target = "signaling", "discarding non-utf8 binary frame");
                            continue;
                        }
                    },
                    Ok(Message::Close(_)) => break,
                    Ok(_) => continue,
                    Err(err) => {
                        tracing::warn!(target = "signaling", error = %err, "signaling websocket error");
                        break;
                    }
                };
                match SignalingMessage::decode(&text) {
                    Ok(message) => {
                        tracing::trace!(target = "signaling", kind = message.kind(), "received frame");
                        if events_tx.send(SignalingEvent::Message(message)).is_err() {
                            return;
                        }
                    }
                    Err(err) => {
                        tracing::warn!(target = "signaling", error = %err, "discarding malformed frame");
                    }
                }
            }
            tracing::info!(target = "signaling", "signaling websocket disconnected");
            let _ = events_tx.send(SignalingEvent::Closed);
        });

        Ok(Self {
            outbound,
            events: Some(events_rx),
            tasks: vec![writer, reader],
        })
    }

    /// Outbound queue handle; clones are handed to the control loop.
    pub fn sender(&self) -> mpsc::UnboundedSender<SignalingMessage> {
        self.outbound.clone()
    }

    pub fn send(&self, message: SignalingMessage) -> Result<(), SignalingError> {
        self.outbound
            .send(message)
            .map_err(|_| SignalingError::ChannelClosed)
    }

    /// Inbound event stream; can be taken once.
    pub fn events(&mut self) -> Option<mpsc::UnboundedReceiver<SignalingEvent>> {
        self.events.take()
    }
}

impl Drop for SignalingChannel {
    fn drop(&mut self) {
        for task in self.tasks.drain(..) {
            task.abort();
        }
    }
}
