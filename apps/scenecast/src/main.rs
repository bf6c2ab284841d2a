use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio::sync::mpsc;

use scenecast_core::adapt::AdaptivePolicy;
use scenecast_core::cli::Cli;
use scenecast_core::config::Config;
use scenecast_core::display::{XrandrProbe, spawn_poller};
use scenecast_core::engine::webrtc::WebRtcEngine;
use scenecast_core::media::{MediaControl, MediaParameters, PipelineHandle, Rect};
use scenecast_core::session::{CloseReason, Session};
use scenecast_core::signaling::SignalingChannel;
use scenecast_core::telemetry::logging;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    logging::init(&cli.logging.to_config()).context("failed to initialize logging")?;
    let config = Config::from_env();
    tracing::info!(
        target = "scenecast",
        url = %cli.signaling_url,
        poll_interval_ms = config.poll_interval.as_millis() as u64,
        answer_timeout_secs = config.answer_timeout.as_secs(),
        "starting screen-share sender"
    );

    let mut signaling = SignalingChannel::connect(&cli.signaling_url)
        .await
        .context("failed to connect to the signaling relay")?;
    let signaling_rx = signaling
        .events()
        .context("signaling event stream already taken")?;

    let (engine, engine_rx) = WebRtcEngine::new(config.stun_server.as_deref())
        .await
        .context("failed to build the transport engine")?;

    let top = config
        .quality_ladder
        .first()
        .copied()
        .context("quality ladder is empty")?;
    let (pipeline, mut media_rx) = PipelineHandle::new(MediaParameters {
        region: Rect::new(0, 0, top.width, top.height),
        bitrate_bps: top.bitrate_bps,
        keyframe_requests: 0,
    });
    let pipeline: Arc<dyn MediaControl> = Arc::new(pipeline);
    // The external capture pipeline attaches to this watch channel; until
    // it does, committed parameters are only logged.
    tokio::spawn(async move {
        while media_rx.changed().await.is_ok() {
            let params = *media_rx.borrow();
            tracing::debug!(
                target = "media",
                region = %params.region,
                bitrate_bps = params.bitrate_bps,
                keyframe_requests = params.keyframe_requests,
                "pipeline parameters updated"
            );
        }
    });

    let (geometry_tx, geometry_rx) = mpsc::unbounded_channel();
    let poller = spawn_poller(Arc::new(XrandrProbe), config.poll_interval, geometry_tx);

    let policy = AdaptivePolicy::new(pipeline, config.quality_ladder.clone());
    let session = Session::new(
        signaling.sender(),
        engine.clone(),
        policy,
        config.answer_timeout,
    );

    let reason = session.run(signaling_rx, engine_rx, geometry_rx).await;

    poller.abort();
    engine.close().await;
    drop(signaling);

    match reason {
        CloseReason::ChannelClosed => {
            tracing::info!(target = "scenecast", "session ended; relay disconnected");
            Ok(())
        }
        CloseReason::AnswerTimeout => {
            anyhow::bail!("session ended: timed out waiting for an answer")
        }
    }
}
