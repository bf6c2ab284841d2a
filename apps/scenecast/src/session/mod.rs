//! Session lifecycle and negotiation state machine.
//!
//! One `Session` exists per process while a viewer is attached. All
//! mutation happens on the control task that drives [`Session::run`],
//! which multiplexes the signaling channel, engine events, offer
//! completions, geometry reports, and the answer-wait deadline through a
//! single `select!` loop. Nothing else touches session state, so there
//! are no locks here.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::Instant;

use cast_proto::SignalingMessage;

use crate::adapt::AdaptivePolicy;
use crate::engine::{EngineError, EngineEvent, SessionDescription, TransportEngine};
use crate::media::Rect;
use crate::signaling::SignalingEvent;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Registering,
    Registered,
    Offering,
    WaitingAnswer,
    Connected,
    Renegotiating,
    Closed,
}

/// Why the control loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    ChannelClosed,
    AnswerTimeout,
}

type OfferOutcome = Result<SessionDescription, EngineError>;

pub struct Session {
    state: SessionState,
    pending_offer_in_flight: bool,
    local_description_set: bool,
    remote_description_set: bool,
    /// Coalesced renegotiation flag: triggers arriving while an offer is
    /// outstanding collapse into at most one follow-up cycle.
    renegotiate_pending: bool,
    /// Candidates received before the remote description exists, in
    /// arrival order.
    buffered_remote_candidates: Vec<(u32, String)>,
    outbound: mpsc::UnboundedSender<SignalingMessage>,
    engine: Arc<dyn TransportEngine>,
    policy: AdaptivePolicy,
    answer_timeout: Duration,
    answer_deadline: Option<Instant>,
    offer_tx: mpsc::UnboundedSender<OfferOutcome>,
    offer_rx: Option<mpsc::UnboundedReceiver<OfferOutcome>>,
}

impl Session {
    pub fn new(
        outbound: mpsc::UnboundedSender<SignalingMessage>,
        engine: Arc<dyn TransportEngine>,
        policy: AdaptivePolicy,
        answer_timeout: Duration,
    ) -> Self {
        let (offer_tx, offer_rx) = mpsc::unbounded_channel();
        Self {
            state: SessionState::Idle,
            pending_offer_in_flight: false,
            local_description_set: false,
            remote_description_set: false,
            renegotiate_pending: false,
            buffered_remote_candidates: Vec::new(),
            outbound,
            engine,
            policy,
            answer_timeout,
            answer_deadline: None,
            offer_tx,
            offer_rx: Some(offer_rx),
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn pending_offer_in_flight(&self) -> bool {
        self.pending_offer_in_flight
    }

    pub fn buffered_candidate_count(&self) -> usize {
        self.buffered_remote_candidates.len()
    }

    /// The signaling channel is up: register with the relay.
    pub fn start(&mut self) {
        debug_assert_eq!(self.state, SessionState::Idle);
        self.state = SessionState::Registering;
        if self.outbound.send(SignalingMessage::Register).is_err() {
            tracing::warn!(target = "negotiate", "signaling outbound queue already closed");
            return;
        }
        tracing::info!(target = "negotiate", "registered with signaling relay; waiting for viewer");
    }

    /// Drive the session until the channel closes or the answer wait
    /// expires. Consumes the receivers; the session is single-use.
    pub async fn run(
        mut self,
        mut signaling_rx: mpsc::UnboundedReceiver<SignalingEvent>,
        mut engine_rx: mpsc::UnboundedReceiver<EngineEvent>,
        mut geometry_rx: mpsc::UnboundedReceiver<Rect>,
    ) -> CloseReason {
        let mut offer_rx = self.offer_rx.take().expect("session can only run once");
        self.start();
        loop {
            let answer_deadline = self.answer_deadline;
            tokio::select! {
                event = signaling_rx.recv() => match event {
                    Some(SignalingEvent::Message(message)) => self.handle_signal(message).await,
                    Some(SignalingEvent::Closed) | None => {
                        tracing::info!(target = "negotiate", "signaling channel closed; ending session");
                        self.state = SessionState::Closed;
                        return CloseReason::ChannelClosed;
                    }
                },
                Some(event) = engine_rx.recv() => self.handle_engine_event(event).await,
                Some(outcome) = offer_rx.recv() => self.handle_offer_ready(outcome).await,
                Some(display) = geometry_rx.recv() => self.handle_geometry(display),
                _ = wait_until(answer_deadline) => {
                    tracing::error!(
                        target = "negotiate",
                        timeout_secs = self.answer_timeout.as_secs(),
                        "timed out waiting for answer"
                    );
                    self.state = SessionState::Closed;
                    return CloseReason::AnswerTimeout;
                }
            }
        }
    }

    pub async fn handle_signal(&mut self, message: SignalingMessage) {
        if self.state == SessionState::Closed {
            return;
        }
        match message {
            SignalingMessage::Ack { role } => {
                if self.state == SessionState::Registering {
                    tracing::debug!(target = "negotiate", ?role, "registration acknowledged");
                    self.state = SessionState::Registered;
                } else {
                    tracing::debug!(target = "negotiate", state = ?self.state, "stray ack ignored");
                }
            }
            SignalingMessage::Ready => {
                // Older relays never ack; a ready implies registration
                // went through.
                if self.state == SessionState::Registering {
                    self.state = SessionState::Registered;
                }
                if self.state == SessionState::Registered {
                    tracing::info!(target = "negotiate", "viewer ready; starting negotiation");
                    self.begin_offer("viewer ready");
                } else {
                    tracing::debug!(target = "negotiate", state = ?self.state, "ready ignored");
                }
            }
            SignalingMessage::Answer { sdp } => self.apply_remote_answer(sdp).await,
            SignalingMessage::IceCandidate {
                sdp_mline_index,
                candidate,
            } => self.accept_remote_candidate(sdp_mline_index, candidate).await,
            SignalingMessage::QualityRequest { action } => {
                // Quality steps are absorbed by the encoder; no
                // renegotiation (see adapt module).
                self.policy.apply_quality(action);
            }
            SignalingMessage::Register | SignalingMessage::Offer { .. } => {
                tracing::warn!(
                    target = "negotiate",
                    kind = message.kind(),
                    "unexpected inbound message ignored"
                );
            }
        }
    }

    pub async fn handle_engine_event(&mut self, event: EngineEvent) {
        if self.state == SessionState::Closed {
            return;
        }
        match event {
            EngineEvent::NegotiationNeeded => {
                // The first offer is gated on viewer readiness; only an
                // established session reacts to the engine's own trigger.
                self.request_renegotiate("engine negotiation-needed");
            }
            EngineEvent::IceCandidate {
                sdp_mline_index,
                candidate,
            } => {
                // Trickle in every state; candidates can be gathered
                // before the offer is even sent.
                tracing::debug!(target = "negotiate", sdp_mline_index, "trickling local candidate");
                let _ = self.outbound.send(SignalingMessage::IceCandidate {
                    sdp_mline_index,
                    candidate,
                });
            }
        }
    }

    /// Completion of an offer requested through [`Self::begin_offer`].
    /// The local description is applied before the offer leaves the
    /// process; the wire must never see an offer the engine does not
    /// hold yet.
    pub async fn handle_offer_ready(&mut self, outcome: OfferOutcome) {
        if self.state == SessionState::Closed {
            return;
        }
        let offer = match outcome {
            Ok(offer) => offer,
            Err(err) => {
                tracing::error!(target = "negotiate", error = %err, "offer creation failed; session stalled");
                self.pending_offer_in_flight = false;
                return;
            }
        };
        if let Err(err) = self.engine.set_local_description(offer.clone()).await {
            tracing::error!(target = "negotiate", error = %err, "local description rejected; session stalled");
            self.pending_offer_in_flight = false;
            return;
        }
        self.local_description_set = true;
        let _ = self.outbound.send(SignalingMessage::Offer { sdp: offer.sdp });
        if self.state == SessionState::Offering {
            self.state = SessionState::WaitingAnswer;
        }
        self.answer_deadline = Some(Instant::now() + self.answer_timeout);
        tracing::info!(target = "negotiate", "offer sent; waiting for answer");
    }

    pub fn handle_geometry(&mut self, display: Rect) {
        if self.state == SessionState::Closed {
            return;
        }
        if self.policy.apply_geometry(display) {
            self.request_renegotiate("display geometry changed");
        }
    }

    fn begin_offer(&mut self, reason: &'static str) {
        if self.pending_offer_in_flight {
            tracing::debug!(target = "negotiate", reason, "offer already in flight; coalescing");
            self.renegotiate_pending = true;
            return;
        }
        self.pending_offer_in_flight = true;
        // The answer gate reopens once this cycle's offer is applied
        // and on the wire.
        self.local_description_set = false;
        if self.state != SessionState::Renegotiating {
            self.state = SessionState::Offering;
        }
        tracing::info!(target = "negotiate", reason, "creating offer");
        let engine = self.engine.clone();
        let offer_tx = self.offer_tx.clone();
        tokio::spawn(async move {
            let _ = offer_tx.send(engine.create_offer().await);
        });
    }

    fn request_renegotiate(&mut self, reason: &'static str) {
        if self.pending_offer_in_flight {
            tracing::debug!(target = "negotiate", reason, "offer in flight; coalescing renegotiation");
            self.renegotiate_pending = true;
            return;
        }
        match self.state {
            SessionState::Connected | SessionState::Renegotiating => {
                self.state = SessionState::Renegotiating;
                self.begin_offer(reason);
            }
            _ => {
                // Pre-connection changes are folded into the eventual
                // first offer; nothing to redo.
                tracing::debug!(target = "negotiate", reason, state = ?self.state, "renegotiation not applicable");
            }
        }
    }

    async fn apply_remote_answer(&mut self, sdp: String) {
        let awaiting = matches!(
            self.state,
            SessionState::WaitingAnswer | SessionState::Renegotiating
        );
        if !awaiting || !self.local_description_set {
            tracing::warn!(
                target = "negotiate",
                state = ?self.state,
                "answer without an outstanding offer; ignored"
            );
            return;
        }
        if let Err(err) = self
            .engine
            .set_remote_description(SessionDescription::answer(sdp))
            .await
        {
            // No retry path; the answer deadline still bounds the stall.
            tracing::error!(target = "negotiate", error = %err, "remote description rejected; negotiation stalled");
            return;
        }
        self.remote_description_set = true;
        self.answer_deadline = None;
        self.pending_offer_in_flight = false;
        self.state = SessionState::Connected;
        tracing::info!(target = "negotiate", "answer applied; session connected");
        self.flush_buffered_candidates().await;
        if self.renegotiate_pending {
            self.renegotiate_pending = false;
            self.request_renegotiate("coalesced trigger");
        }
    }

    async fn accept_remote_candidate(&mut self, sdp_mline_index: u32, candidate: String) {
        if self.remote_description_set {
            if let Err(err) = self
                .engine
                .add_remote_ice_candidate(sdp_mline_index, &candidate)
                .await
            {
                tracing::warn!(target = "negotiate", error = %err, "remote candidate rejected; skipping");
            }
        } else {
            tracing::debug!(
                target = "negotiate",
                sdp_mline_index,
                buffered = self.buffered_remote_candidates.len() + 1,
                "buffering candidate until remote description is set"
            );
            self.buffered_remote_candidates
                .push((sdp_mline_index, candidate));
        }
    }

    async fn flush_buffered_candidates(&mut self) {
        if self.buffered_remote_candidates.is_empty() {
            return;
        }
        let buffered = std::mem::take(&mut self.buffered_remote_candidates);
        tracing::info!(target = "negotiate", count = buffered.len(), "flushing buffered candidates");
        for (sdp_mline_index, candidate) in buffered {
            if let Err(err) = self
                .engine
                .add_remote_ice_candidate(sdp_mline_index, &candidate)
                .await
            {
                tracing::warn!(target = "negotiate", error = %err, "buffered candidate rejected; skipping");
            }
        }
    }
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
