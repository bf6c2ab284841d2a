//! Recording media surface for tests.

use std::sync::Mutex;

use super::{CodecInfo, MediaControl, MediaError, Rect};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MediaCall {
    SetCaptureRegion(Rect),
    SetBitrate(u32),
    ForceKeyframe,
}

#[derive(Default)]
pub struct MockMedia {
    calls: Mutex<Vec<MediaCall>>,
    reject_bitrate: Mutex<bool>,
}

impl MockMedia {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<MediaCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn region_calls(&self) -> Vec<Rect> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                MediaCall::SetCaptureRegion(rect) => Some(rect),
                _ => None,
            })
            .collect()
    }

    pub fn bitrate_calls(&self) -> Vec<u32> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                MediaCall::SetBitrate(bps) => Some(bps),
                _ => None,
            })
            .collect()
    }

    pub fn keyframe_calls(&self) -> usize {
        self.calls()
            .iter()
            .filter(|call| matches!(call, MediaCall::ForceKeyframe))
            .count()
    }

    /// Make subsequent `set_bitrate` calls fail with `UnsupportedParameter`.
    pub fn reject_bitrate(&self, reject: bool) {
        *self.reject_bitrate.lock().unwrap() = reject;
    }
}

impl MediaControl for MockMedia {
    fn set_capture_region(&self, region: Rect) -> Result<(), MediaError> {
        self.calls
            .lock()
            .unwrap()
            .push(MediaCall::SetCaptureRegion(region));
        Ok(())
    }

    fn set_bitrate(&self, bps: u32) -> Result<(), MediaError> {
        if *self.reject_bitrate.lock().unwrap() {
            return Err(MediaError::UnsupportedParameter {
                parameter: "bitrate",
                detail: format!("{bps} bps rejected by test"),
            });
        }
        self.calls.lock().unwrap().push(MediaCall::SetBitrate(bps));
        Ok(())
    }

    fn force_keyframe(&self) -> Result<(), MediaError> {
        self.calls.lock().unwrap().push(MediaCall::ForceKeyframe);
        Ok(())
    }

    fn negotiated_codec(&self) -> Option<CodecInfo> {
        None
    }
}
