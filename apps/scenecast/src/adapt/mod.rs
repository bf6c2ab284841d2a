//! Adaptive control policy: turns geometry changes and viewer quality
//! requests into media-surface calls, and decides when the session must
//! renegotiate.
//!
//! Policy: a geometry change replaces the capture source, so it requests
//! renegotiation; a quality step only retunes the encoder (bitrate,
//! scaled region, keyframe) and is absorbed without a new offer/answer
//! round.

use std::sync::Arc;

use cast_proto::QualityAction;

use crate::media::{MediaControl, QualityPreset, Rect};

pub struct AdaptivePolicy {
    media: Arc<dyn MediaControl>,
    ladder: Vec<QualityPreset>,
    rung: usize,
    last_display: Option<Rect>,
    last_applied_region: Option<Rect>,
}

impl AdaptivePolicy {
    pub fn new(media: Arc<dyn MediaControl>, ladder: Vec<QualityPreset>) -> Self {
        assert!(!ladder.is_empty(), "quality ladder must have at least one rung");
        Self {
            media,
            ladder,
            rung: 0,
            last_display: None,
            last_applied_region: None,
        }
    }

    /// Handle a geometry report from the environment poller. Returns
    /// true when the capture region actually changed and the session
    /// should renegotiate.
    pub fn apply_geometry(&mut self, display: Rect) -> bool {
        if self.last_display == Some(display) {
            return false;
        }
        self.last_display = Some(display);

        // Capture the whole reported display.
        let region = display;
        if self.last_applied_region == Some(region) {
            return false;
        }
        match self.media.set_capture_region(region) {
            Ok(()) => {
                tracing::info!(target = "adapt", region = %region, "capture region follows display");
                self.last_applied_region = Some(region);
                true
            }
            Err(err) => {
                tracing::warn!(target = "adapt", region = %region, error = %err, "capture region rejected");
                false
            }
        }
    }

    /// Handle a viewer quality request. Steps one rung down or up the
    /// ladder, clamped at the ends, and forces a keyframe so the viewer
    /// recovers immediately at the new settings.
    pub fn apply_quality(&mut self, action: QualityAction) {
        let next = match action {
            QualityAction::Lower => (self.rung + 1).min(self.ladder.len() - 1),
            QualityAction::Raise => self.rung.saturating_sub(1),
        };
        if next == self.rung {
            tracing::debug!(target = "adapt", ?action, rung = self.rung, "already at ladder end");
            return;
        }
        self.rung = next;
        let preset = self.ladder[self.rung];

        let anchor = self.last_display.unwrap_or(Rect::new(0, 0, 0, 0));
        let region = Rect::new(anchor.x, anchor.y, preset.width, preset.height);

        match self.media.set_capture_region(region) {
            Ok(()) => self.last_applied_region = Some(region),
            Err(err) => {
                tracing::warn!(target = "adapt", region = %region, error = %err, "preset region rejected");
            }
        }
        if let Err(err) = self.media.set_bitrate(preset.bitrate_bps) {
            tracing::warn!(target = "adapt", bitrate_bps = preset.bitrate_bps, error = %err, "preset bitrate rejected");
        }
        if let Err(err) = self.media.force_keyframe() {
            tracing::warn!(target = "adapt", error = %err, "keyframe request rejected");
        }
        tracing::info!(
            target = "adapt",
            ?action,
            rung = self.rung,
            region = %region,
            bitrate_bps = preset.bitrate_bps,
            "quality preset applied"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::mock::{MediaCall, MockMedia};

    fn ladder() -> Vec<QualityPreset> {
        vec![
            QualityPreset {
                width: 1920,
                height: 1080,
                bitrate_bps: 2_500_000,
            },
            QualityPreset {
                width: 1280,
                height: 720,
                bitrate_bps: 1_200_000,
            },
            QualityPreset {
                width: 854,
                height: 480,
                bitrate_bps: 600_000,
            },
        ]
    }

    #[test]
    fn identical_geometry_never_reapplies() {
        let media = Arc::new(MockMedia::new());
        let mut policy = AdaptivePolicy::new(media.clone(), ladder());

        assert!(policy.apply_geometry(Rect::new(0, 0, 1920, 1080)));
        assert!(!policy.apply_geometry(Rect::new(0, 0, 1920, 1080)));
        assert_eq!(media.region_calls().len(), 1);

        assert!(policy.apply_geometry(Rect::new(0, 0, 2560, 1440)));
        assert_eq!(media.region_calls().len(), 2);
    }

    #[test]
    fn lower_steps_down_and_forces_a_keyframe() {
        let media = Arc::new(MockMedia::new());
        let mut policy = AdaptivePolicy::new(media.clone(), ladder());
        policy.apply_geometry(Rect::new(0, 0, 1920, 1080));

        policy.apply_quality(QualityAction::Lower);

        assert_eq!(
            media.region_calls().last(),
            Some(&Rect::new(0, 0, 1280, 720))
        );
        assert_eq!(media.bitrate_calls(), vec![1_200_000]);
        assert_eq!(media.keyframe_calls(), 1);
    }

    #[test]
    fn ladder_is_clamped_at_both_ends() {
        let media = Arc::new(MockMedia::new());
        let mut policy = AdaptivePolicy::new(media.clone(), ladder());

        policy.apply_quality(QualityAction::Raise);
        assert_eq!(media.calls(), Vec::<MediaCall>::new());

        policy.apply_quality(QualityAction::Lower);
        policy.apply_quality(QualityAction::Lower);
        policy.apply_quality(QualityAction::Lower);
        // Third lower is clamped; two presets applied in total.
        assert_eq!(media.bitrate_calls(), vec![1_200_000, 600_000]);
        assert_eq!(media.keyframe_calls(), 2);
    }

    #[test]
    fn rejected_bitrate_does_not_block_the_rest_of_the_step() {
        let media = Arc::new(MockMedia::new());
        media.reject_bitrate(true);
        let mut policy = AdaptivePolicy::new(media.clone(), ladder());

        policy.apply_quality(QualityAction::Lower);

        assert_eq!(media.bitrate_calls(), Vec::<u32>::new());
        assert_eq!(media.region_calls().len(), 1);
        assert_eq!(media.keyframe_calls(), 1);
    }
}
