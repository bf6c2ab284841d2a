//! `TransportEngine` backed by a `webrtc` crate peer connection.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;
use webrtc::api::APIBuilder;
use webrtc::ice_transport::ice_candidate::{RTCIceCandidate, RTCIceCandidateInit};
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::rtp_transceiver::RTCRtpTransceiverInit;
use webrtc::rtp_transceiver::rtp_codec::RTPCodecType;
use webrtc::rtp_transceiver::rtp_transceiver_direction::RTCRtpTransceiverDirection;

use super::{EngineError, EngineEvent, SdpKind, SessionDescription, TransportEngine};

pub struct WebRtcEngine {
    peer_connection: Arc<RTCPeerConnection>,
}

impl WebRtcEngine {
    /// Build the peer connection and bridge its callbacks into an event
    /// channel consumed by the control loop. The sender side sends only;
    /// a video transceiver is registered up front so the first offer
    /// carries the media section.
    pub async fn new(
        stun_server: Option<&str>,
    ) -> Result<(Arc<Self>, mpsc::UnboundedReceiver<EngineEvent>), EngineError> {
        let api = APIBuilder::new().build();
        let rtc_config = RTCConfiguration {
            ice_servers: stun_server
                .map(|url| {
                    vec![RTCIceServer {
                        urls: vec![url.to_string()],
                        ..Default::default()
                    }]
                })
                .unwrap_or_default(),
            ..Default::default()
        };

        let peer_connection = Arc::new(
            api.new_peer_connection(rtc_config)
                .await
                .map_err(|err| EngineError::Setup(err.to_string()))?,
        );

        peer_connection
            .add_transceiver_from_kind(
                RTPCodecType::Video,
                Some(RTCRtpTransceiverInit {
                    direction: RTCRtpTransceiverDirection::Sendonly,
                    send_encodings: vec![],
                }),
            )
            .await
            .map_err(|err| EngineError::Setup(err.to_string()))?;

        let (events_tx, events_rx) = mpsc::unbounded_channel();

        let ice_tx = events_tx.clone();
        peer_connection.on_ice_candidate(Box::new(move |candidate: Option<RTCIceCandidate>| {
            let ice_tx = ice_tx.clone();
            Box::pin(async move {
                // None marks the end of gathering; there is nothing to trickle.
                let Some(candidate) = candidate else { return };
                match candidate.to_json() {
                    Ok(init) => {
                        let _ = ice_tx.send(EngineEvent::IceCandidate {
                            sdp_mline_index: u32::from(init.sdp_mline_index.unwrap_or(0)),
                            candidate: init.candidate,
                        });
                    }
                    Err(err) => {
                        tracing::warn!(target = "engine", error = %err, "local candidate serialization failed");
                    }
                }
            })
        }));

        let negotiation_tx = events_tx;
        peer_connection.on_negotiation_needed(Box::new(move || {
            let negotiation_tx = negotiation_tx.clone();
            Box::pin(async move {
                let _ = negotiation_tx.send(EngineEvent::NegotiationNeeded);
            })
        }));

        peer_connection.on_peer_connection_state_change(Box::new(
            move |state: RTCPeerConnectionState| {
                Box::pin(async move {
                    tracing::debug!(target = "engine", ?state, "peer connection state changed");
                })
            },
        ));

        Ok((Arc::new(Self { peer_connection }), events_rx))
    }

    pub async fn close(&self) {
        if let Err(err) = self.peer_connection.close().await {
            tracing::debug!(target = "engine", error = %err, "peer connection close failed");
        }
    }
}

fn to_rtc_description(desc: SessionDescription) -> Result<RTCSessionDescription, EngineError> {
    let result = match desc.kind {
        SdpKind::Offer => RTCSessionDescription::offer(desc.sdp),
        SdpKind::Answer => RTCSessionDescription::answer(desc.sdp),
    };
    result.map_err(|err| EngineError::Negotiation(err.to_string()))
}

#[async_trait]
impl TransportEngine for WebRtcEngine {
    async fn create_offer(&self) -> Result<SessionDescription, EngineError> {
        let offer = self
            .peer_connection
            .create_offer(None)
            .await
            .map_err(|err| EngineError::Negotiation(err.to_string()))?;
        Ok(SessionDescription::offer(offer.sdp))
    }

    async fn set_local_description(&self, desc: SessionDescription) -> Result<(), EngineError> {
        let desc = to_rtc_description(desc)?;
        self.peer_connection
            .set_local_description(desc)
            .await
            .map_err(|err| EngineError::Negotiation(err.to_string()))
    }

    async fn set_remote_description(&self, desc: SessionDescription) -> Result<(), EngineError> {
        let desc = to_rtc_description(desc)?;
        self.peer_connection
            .set_remote_description(desc)
            .await
            .map_err(|err| EngineError::Negotiation(err.to_string()))
    }

    async fn add_remote_ice_candidate(
        &self,
        sdp_mline_index: u32,
        candidate: &str,
    ) -> Result<(), EngineError> {
        let init = RTCIceCandidateInit {
            candidate: candidate.to_string(),
            sdp_mid: None,
            sdp_mline_index: Some(sdp_mline_index as u16),
            username_fragment: None,
        };
        self.peer_connection
            .add_ice_candidate(init)
            .await
            .map_err(|err| EngineError::Ice(err.to_string()))
    }
}
