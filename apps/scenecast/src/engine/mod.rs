//! Adapter contract over the WebRTC engine. The negotiation state
//! machine talks to this trait only; the concrete engine lives in
//! [`webrtc`](self::webrtc) and tests use [`mock`](self::mock).

use async_trait::async_trait;

pub mod mock;
pub mod webrtc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SdpKind {
    Offer,
    Answer,
}

impl SdpKind {
    pub fn as_str(self) -> &'static str {
        match self {
            SdpKind::Offer => "offer",
            SdpKind::Answer => "answer",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionDescription {
    pub kind: SdpKind,
    pub sdp: String,
}

impl SessionDescription {
    pub fn offer(sdp: impl Into<String>) -> Self {
        Self {
            kind: SdpKind::Offer,
            sdp: sdp.into(),
        }
    }

    pub fn answer(sdp: impl Into<String>) -> Self {
        Self {
            kind: SdpKind::Answer,
            sdp: sdp.into(),
        }
    }
}

/// Events the engine pushes at the control loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    /// The engine determined a fresh offer is required (for example
    /// because media parameters changed underneath it).
    NegotiationNeeded,
    /// A local ICE candidate was gathered and should be trickled to the
    /// remote peer.
    IceCandidate {
        sdp_mline_index: u32,
        candidate: String,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("engine setup failed: {0}")]
    Setup(String),
    #[error("negotiation rejected: {0}")]
    Negotiation(String),
    #[error("ice candidate rejected: {0}")]
    Ice(String),
}

/// Narrow interface over the peer connection. All calls complete on the
/// control loop; `create_offer` resolves exactly once per invocation.
#[async_trait]
pub trait TransportEngine: Send + Sync {
    async fn create_offer(&self) -> Result<SessionDescription, EngineError>;
    async fn set_local_description(&self, desc: SessionDescription) -> Result<(), EngineError>;
    async fn set_remote_description(&self, desc: SessionDescription) -> Result<(), EngineError>;
    async fn add_remote_ice_candidate(
        &self,
        sdp_mline_index: u32,
        candidate: &str,
    ) -> Result<(), EngineError>;
}
