//! Environment poller: samples local display geometry on a fixed
//! interval and reports changes to the control loop.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::media::Rect;

#[derive(Debug, thiserror::Error)]
pub enum DisplayError {
    #[error("display probe failed: {0}")]
    Probe(String),
    #[error("unable to parse display geometry: {0}")]
    Parse(String),
}

#[async_trait]
pub trait DisplayProbe: Send + Sync {
    async fn sample(&self) -> Result<Rect, DisplayError>;
}

/// Probe backed by `xrandr --current`. Connected-output parsing is kept
/// pure so it can be tested without a display server.
pub struct XrandrProbe;

#[async_trait]
impl DisplayProbe for XrandrProbe {
    async fn sample(&self) -> Result<Rect, DisplayError> {
        let output = tokio::process::Command::new("xrandr")
            .arg("--current")
            .output()
            .await
            .map_err(|err| DisplayError::Probe(err.to_string()))?;
        if !output.status.success() {
            return Err(DisplayError::Probe(format!(
                "xrandr exited with {}",
                output.status
            )));
        }
        let text = String::from_utf8_lossy(&output.stdout);
        parse_xrandr(&text)
    }
}

/// Extract the primary connected output's geometry, falling back to the
/// first connected output.
pub fn parse_xrandr(output: &str) -> Result<Rect, DisplayError> {
    let mut fallback = None;
    for line in output.lines() {
        if !line.contains(" connected") {
            continue;
        }
        let Some(rect) = line.split_whitespace().find_map(parse_mode_token) else {
            continue;
        };
        if line.contains(" primary ") {
            return Ok(rect);
        }
        fallback.get_or_insert(rect);
    }
    fallback.ok_or_else(|| DisplayError::Parse("no connected output with a mode".into()))
}

fn parse_mode_token(token: &str) -> Option<Rect> {
    // Geometry tokens look like 1920x1080+0+0.
    let (size, pos) = token.split_once('+')?;
    let (width, height) = size.split_once('x')?;
    let (x, y) = pos.split_once('+')?;
    Some(Rect::new(
        x.parse().ok()?,
        y.parse().ok()?,
        width.parse().ok()?,
        height.parse().ok()?,
    ))
}

/// Sample on a fixed interval; emit one event per observed change. The
/// stored last-reported value is updated on every successful sample, so
/// identical repeats never re-trigger.
pub fn spawn_poller(
    probe: Arc<dyn DisplayProbe>,
    interval: Duration,
    geometry_tx: mpsc::UnboundedSender<Rect>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        let mut last_reported: Option<Rect> = None;
        loop {
            ticker.tick().await;
            let geometry = match probe.sample().await {
                Ok(geometry) => geometry,
                Err(err) => {
                    tracing::debug!(target = "display", error = %err, "geometry sample failed");
                    continue;
                }
            };
            if last_reported != Some(geometry) {
                if last_reported.is_some() {
                    tracing::info!(target = "display", geometry = %geometry, "display geometry changed");
                }
                if geometry_tx.send(geometry).is_err() {
                    break;
                }
            }
            last_reported = Some(geometry);
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    const XRANDR_TWO_OUTPUTS: &str = "\
Screen 0: minimum 320 x 200, current 3840 x 1080, maximum 16384 x 16384
HDMI-1 connected 1920x1080+1920+0 (normal left inverted right x axis y axis) 527mm x 296mm
   1920x1080     60.00+  50.00
eDP-1 connected primary 1920x1080+0+0 (normal left inverted right x axis y axis) 344mm x 194mm
   1920x1080     60.01*+  59.97
DP-1 disconnected (normal left inverted right x axis y axis)
";

    #[test]
    fn prefers_the_primary_output() {
        let rect = parse_xrandr(XRANDR_TWO_OUTPUTS).unwrap();
        assert_eq!(rect, Rect::new(0, 0, 1920, 1080));
    }

    #[test]
    fn falls_back_to_first_connected_output() {
        let stripped = XRANDR_TWO_OUTPUTS.replace(" primary", "");
        let rect = parse_xrandr(&stripped).unwrap();
        assert_eq!(rect, Rect::new(1920, 0, 1920, 1080));
    }

    #[test]
    fn disconnected_outputs_are_not_geometry() {
        let err = parse_xrandr("DP-1 disconnected (normal)\n").unwrap_err();
        assert!(matches!(err, DisplayError::Parse(_)));
    }

    struct ScriptedProbe {
        samples: Mutex<VecDeque<Result<Rect, DisplayError>>>,
    }

    #[async_trait]
    impl DisplayProbe for ScriptedProbe {
        async fn sample(&self) -> Result<Rect, DisplayError> {
            self.samples
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Ok(Rect::new(0, 0, 1920, 1080)))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn poller_reports_each_geometry_once() {
        let probe = Arc::new(ScriptedProbe {
            samples: Mutex::new(VecDeque::from([
                Ok(Rect::new(0, 0, 1920, 1080)),
                Ok(Rect::new(0, 0, 1920, 1080)),
                Err(DisplayError::Probe("flake".into())),
                Ok(Rect::new(0, 0, 1280, 720)),
                Ok(Rect::new(0, 0, 1280, 720)),
            ])),
        });
        let (tx, mut rx) = mpsc::unbounded_channel();
        let handle = spawn_poller(probe, Duration::from_secs(1), tx);

        // Five ticks at t=0s..4s consume the script exactly.
        tokio::time::sleep(Duration::from_millis(4500)).await;
        handle.abort();

        assert_eq!(rx.try_recv().unwrap(), Rect::new(0, 0, 1920, 1080));
        assert_eq!(rx.try_recv().unwrap(), Rect::new(0, 0, 1280, 720));
        assert!(rx.try_recv().is_err(), "identical samples must not re-trigger");
    }
}
