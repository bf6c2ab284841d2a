//! Scripted engine for tests: records every call, lets the test inject
//! engine events, fail specific operations, and hold offer creation to
//! exercise the single-flight discipline.

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use tokio::sync::{mpsc, watch};

use super::{EngineError, EngineEvent, SessionDescription, TransportEngine};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineCall {
    CreateOffer,
    SetLocalDescription(SessionDescription),
    SetRemoteDescription(SessionDescription),
    AddRemoteIceCandidate(u32, String),
}

pub struct MockEngine {
    calls: Mutex<Vec<EngineCall>>,
    offer_seq: AtomicU64,
    fail_remote_description: Mutex<bool>,
    fail_ice: Mutex<bool>,
    hold_offers: watch::Sender<bool>,
    events_tx: mpsc::UnboundedSender<EngineEvent>,
}

impl MockEngine {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<EngineEvent>) {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (hold_offers, _) = watch::channel(false);
        (
            Arc::new(Self {
                calls: Mutex::new(Vec::new()),
                offer_seq: AtomicU64::new(0),
                fail_remote_description: Mutex::new(false),
                fail_ice: Mutex::new(false),
                hold_offers,
                events_tx,
            }),
            events_rx,
        )
    }

    pub fn emit(&self, event: EngineEvent) {
        let _ = self.events_tx.send(event);
    }

    pub fn calls(&self) -> Vec<EngineCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn create_offer_count(&self) -> usize {
        self.calls()
            .iter()
            .filter(|call| matches!(call, EngineCall::CreateOffer))
            .count()
    }

    pub fn applied_remote_candidates(&self) -> Vec<(u32, String)> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                EngineCall::AddRemoteIceCandidate(mline, candidate) => Some((mline, candidate)),
                _ => None,
            })
            .collect()
    }

    pub fn fail_remote_description(&self, fail: bool) {
        *self.fail_remote_description.lock().unwrap() = fail;
    }

    pub fn fail_ice(&self, fail: bool) {
        *self.fail_ice.lock().unwrap() = fail;
    }

    /// While held, `create_offer` blocks until released.
    pub fn hold_offers(&self, hold: bool) {
        // send_replace updates the value even with no subscriber yet.
        self.hold_offers.send_replace(hold);
    }

    fn record(&self, call: EngineCall) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl TransportEngine for MockEngine {
    async fn create_offer(&self) -> Result<SessionDescription, EngineError> {
        self.record(EngineCall::CreateOffer);
        let mut held = self.hold_offers.subscribe();
        while *held.borrow() {
            if held.changed().await.is_err() {
                break;
            }
        }
        let seq = self.offer_seq.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(SessionDescription::offer(format!(
            "v=0\r\no=- {seq} 0 IN IP4 127.0.0.1\r\ns=mock\r\n"
        )))
    }

    async fn set_local_description(&self, desc: SessionDescription) -> Result<(), EngineError> {
        self.record(EngineCall::SetLocalDescription(desc));
        Ok(())
    }

    async fn set_remote_description(&self, desc: SessionDescription) -> Result<(), EngineError> {
        if *self.fail_remote_description.lock().unwrap() {
            return Err(EngineError::Negotiation(
                "remote description rejected by test".into(),
            ));
        }
        self.record(EngineCall::SetRemoteDescription(desc));
        Ok(())
    }

    async fn add_remote_ice_candidate(
        &self,
        sdp_mline_index: u32,
        candidate: &str,
    ) -> Result<(), EngineError> {
        if *self.fail_ice.lock().unwrap() {
            return Err(EngineError::Ice("candidate rejected by test".into()));
        }
        self.record(EngineCall::AddRemoteIceCandidate(
            sdp_mline_index,
            candidate.to_string(),
        ));
        Ok(())
    }
}
