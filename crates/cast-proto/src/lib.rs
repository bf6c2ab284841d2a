//! Wire-format definitions for the signaling relay protocol.
//! Each message travels as one JSON object per websocket text frame;
//! keeping the types in a dedicated crate lets the browser viewer and
//! any future tooling share a single source of truth.

use serde::{Deserialize, Serialize};

/// Direction of a viewer-issued quality step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QualityAction {
    Lower,
    Raise,
}

/// A single signaling frame. The `type` tag and field names are fixed by
/// the relay and the browser viewer (`sdpMLineIndex` in particular), so
/// renames here are load-bearing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum SignalingMessage {
    /// Sender registration. The relay identifies the media source by the
    /// literal tag `gstreamer`.
    #[serde(rename = "gstreamer")]
    Register,
    /// Relay acknowledgement of a registration. Older relay builds never
    /// send this, so it is advisory.
    Ack {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        role: Option<String>,
    },
    /// Viewer is present and willing to receive an offer.
    Ready,
    Offer {
        sdp: String,
    },
    Answer {
        sdp: String,
    },
    #[serde(rename = "ice")]
    IceCandidate {
        #[serde(rename = "sdpMLineIndex")]
        sdp_mline_index: u32,
        candidate: String,
    },
    #[serde(rename = "quality")]
    QualityRequest { action: QualityAction },
}

#[derive(Debug, thiserror::Error)]
#[error("malformed signaling message: {0}")]
pub struct DecodeError(#[from] serde_json::Error);

impl SignalingMessage {
    pub fn decode(text: &str) -> Result<Self, DecodeError> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn encode(&self) -> String {
        // The union only contains string/int members; serialization
        // cannot fail for values constructed through this type.
        serde_json::to_string(self).expect("signaling message serializes")
    }

    /// Short tag for log lines.
    pub fn kind(&self) -> &'static str {
        match self {
            SignalingMessage::Register => "gstreamer",
            SignalingMessage::Ack { .. } => "ack",
            SignalingMessage::Ready => "ready",
            SignalingMessage::Offer { .. } => "offer",
            SignalingMessage::Answer { .. } => "answer",
            SignalingMessage::IceCandidate { .. } => "ice",
            SignalingMessage::QualityRequest { .. } => "quality",
        }
    }
}
