//! Narrow parameter surface over the capture/encode pipeline. The
//! pipeline itself runs on its own execution context and is never driven
//! from here; it observes committed parameters through a watch channel.

use std::sync::Mutex;
use tokio::sync::watch;

pub mod mock;

/// Screen-space rectangle in pixels. Used both for display geometry and
/// for the committed capture region.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl Rect {
    pub const fn new(x: i32, y: i32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

impl std::fmt::Display for Rect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}+{}+{}", self.width, self.height, self.x, self.y)
    }
}

/// One rung of the quality ladder a viewer can step through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QualityPreset {
    pub width: u32,
    pub height: u32,
    pub bitrate_bps: u32,
}

/// Codec parameters negotiated by the transport, surfaced for logging
/// and diagnostics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodecInfo {
    pub name: String,
    pub clock_rate: u32,
    pub payload_type: u8,
}

/// Parameters currently committed to the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MediaParameters {
    pub region: Rect,
    pub bitrate_bps: u32,
    /// Monotonic counter; the pipeline emits a keyframe whenever it
    /// observes an increase.
    pub keyframe_requests: u64,
}

pub const MIN_BITRATE_BPS: u32 = 50_000;
pub const MAX_BITRATE_BPS: u32 = 20_000_000;

#[derive(Debug, thiserror::Error)]
pub enum MediaError {
    #[error("unsupported {parameter}: {detail}")]
    UnsupportedParameter {
        parameter: &'static str,
        detail: String,
    },
    #[error("media pipeline released")]
    Released,
}

/// Synchronous, idempotent setters over the pipeline. Calls are
/// serialized by the control task; implementations must not block.
pub trait MediaControl: Send + Sync {
    fn set_capture_region(&self, region: Rect) -> Result<(), MediaError>;
    fn set_bitrate(&self, bps: u32) -> Result<(), MediaError>;
    fn force_keyframe(&self) -> Result<(), MediaError>;
    fn negotiated_codec(&self) -> Option<CodecInfo>;
}

/// Control-side handle to the pipeline. Committed parameters are
/// published over a watch channel; dropping the handle (or calling
/// [`PipelineHandle::release`]) tears the channel down, which the
/// pipeline treats as a stop signal.
pub struct PipelineHandle {
    state: Mutex<MediaParameters>,
    updates: watch::Sender<MediaParameters>,
    codec: Mutex<Option<CodecInfo>>,
}

impl PipelineHandle {
    pub fn new(initial: MediaParameters) -> (Self, watch::Receiver<MediaParameters>) {
        let (updates, rx) = watch::channel(initial);
        (
            Self {
                state: Mutex::new(initial),
                updates,
                codec: Mutex::new(None),
            },
            rx,
        )
    }

    pub fn parameters(&self) -> MediaParameters {
        *self.state.lock().expect("media state poisoned")
    }

    pub fn record_negotiated_codec(&self, codec: CodecInfo) {
        *self.codec.lock().expect("codec state poisoned") = Some(codec);
    }

    /// Explicit teardown; equivalent to dropping the handle.
    pub fn release(self) {
        tracing::info!(target = "media", "releasing media pipeline");
    }

    fn commit(&self, params: MediaParameters) -> Result<(), MediaError> {
        *self.state.lock().expect("media state poisoned") = params;
        self.updates.send(params).map_err(|_| MediaError::Released)
    }
}

impl MediaControl for PipelineHandle {
    fn set_capture_region(&self, region: Rect) -> Result<(), MediaError> {
        if region.is_empty() {
            return Err(MediaError::UnsupportedParameter {
                parameter: "capture region",
                detail: format!("zero-area rectangle {region}"),
            });
        }
        let mut params = self.parameters();
        params.region = region;
        self.commit(params)?;
        tracing::debug!(target = "media", region = %region, "capture region committed");
        Ok(())
    }

    fn set_bitrate(&self, bps: u32) -> Result<(), MediaError> {
        if !(MIN_BITRATE_BPS..=MAX_BITRATE_BPS).contains(&bps) {
            return Err(MediaError::UnsupportedParameter {
                parameter: "bitrate",
                detail: format!("{bps} bps outside {MIN_BITRATE_BPS}..={MAX_BITRATE_BPS}"),
            });
        }
        let mut params = self.parameters();
        params.bitrate_bps = bps;
        self.commit(params)?;
        tracing::debug!(target = "media", bitrate_bps = bps, "bitrate committed");
        Ok(())
    }

    fn force_keyframe(&self) -> Result<(), MediaError> {
        let mut params = self.parameters();
        params.keyframe_requests += 1;
        self.commit(params)?;
        tracing::debug!(target = "media", "keyframe requested");
        Ok(())
    }

    fn negotiated_codec(&self) -> Option<CodecInfo> {
        self.codec.lock().expect("codec state poisoned").clone()
    }
}
