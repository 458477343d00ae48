//! Capture loop driving inference and reactions at the display refresh cadence.
//!
use std::{future::Future, ops::RangeInclusive, sync::Arc, time::Duration};

use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use webcam::sensors::VideoSource;

use crate::{
    effects::{KNOWN_REGIONS, OVERLAY_SLOTS},
    engine::{EngineConfig, ReactionEngine, ReactionState},
    meter::METER,
    nn::Classifier,
    pubsub::SceneHub,
    surface::SceneSurface,
};

/// Default display refresh rate the loop ticks at.
pub const DEFAULT_REFRESH_HZ: f64 = 60.0;

/// Refresh rates the loop accepts. Anything else falls back to [`DEFAULT_REFRESH_HZ`].
pub const REFRESH_HZ_RANGE: RangeInclusive<f64> = 1.0..=1000.0;

/// Fatal errors while starting a session. Nothing is retried.
#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error("failed to load model: {0:#}")]
    ModelLoad(anyhow::Error),
    #[error("failed to access video device: {0}")]
    Device(webcam::Error),
    #[error("failed to start video stream: {0}")]
    Stream(webcam::Error),
}

/// Settings of a capture session.
#[derive(Clone, Debug)]
pub struct SessionConfig {
    pub engine: EngineConfig,
    pub refresh_hz: f64,
    /// Region ids present on the page.
    pub regions: Vec<String>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            engine: EngineConfig::default(),
            refresh_hz: DEFAULT_REFRESH_HZ,
            regions: KNOWN_REGIONS.iter().map(|id| id.to_string()).collect(),
        }
    }
}

impl SessionConfig {
    fn frame_interval(&self) -> Duration {
        let hz = match REFRESH_HZ_RANGE.contains(&self.refresh_hz) {
            true => self.refresh_hz,
            false => DEFAULT_REFRESH_HZ,
        };
        Duration::from_secs_f64(1.0 / hz)
    }
}

/// What a single tick did.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TickOutcome {
    Reacted(ReactionState),
    /// Capture or inference failed, the presentation was left untouched.
    Skipped,
}

/// Owns the video source, the model and the presentation for as long as the page is shown.
pub struct Session<V, C> {
    video: V,
    classifier: Arc<C>,
    engine: ReactionEngine,
    surface: SceneSurface,
    hub: SceneHub,
    frame_interval: Duration,
}

impl<V: VideoSource, C: Classifier> Session<V, C> {
    /// Load the model, start the video source and prepare one label slot per class.
    pub async fn initialize<F>(
        mut video: V,
        model: F,
        config: SessionConfig,
    ) -> Result<Self, StartupError>
    where
        F: Future<Output = anyhow::Result<C>>,
    {
        let classifier = model.await.map_err(StartupError::ModelLoad)?;
        let class_count = classifier.class_count();
        log::info!("Model ready with {} classes", class_count);

        video.setup().map_err(StartupError::Device)?;
        video.play().map_err(StartupError::Stream)?;

        let surface = SceneSurface::new(
            config.regions.iter().map(String::as_str),
            class_count,
            OVERLAY_SLOTS,
        )
        .with_mirrored(video.mirrored());
        let hub = SceneHub::new(surface.snapshot());

        Ok(Self {
            video,
            classifier: Arc::new(classifier),
            engine: ReactionEngine::new(config.engine),
            surface,
            hub,
            frame_interval: config.frame_interval(),
        })
    }

    pub fn hub(&self) -> SceneHub {
        self.hub.clone()
    }

    pub fn surface(&self) -> &SceneSurface {
        &self.surface
    }

    /// Capture a frame, classify it and redraw the presentation.
    pub async fn tick(&mut self) -> TickOutcome {
        if let Err(err) = self.video.update() {
            log::warn!("Unable to capture frame, trying again... ({err})");
            METER.tick_skipped();
            return TickOutcome::Skipped;
        }
        let Some(frame) = self.video.frame() else {
            log::warn!("Video source has no frame yet");
            METER.tick_skipped();
            return TickOutcome::Skipped;
        };
        METER.tick_captured();

        if let Some(jpeg) = &frame.jpeg {
            self.hub.publish_frame(jpeg);
        }

        let image = frame.image.clone();
        let classifier = Arc::clone(&self.classifier);
        let prediction = match tokio::task::spawn_blocking(move || classifier.predict(&image)).await
        {
            Ok(Ok(prediction)) => prediction,
            Ok(Err(err)) => {
                log::warn!("Inference failed: {err:#}");
                METER.tick_skipped();
                return TickOutcome::Skipped;
            }
            Err(err) => {
                log::error!("Inference task failed: {err}");
                METER.tick_skipped();
                return TickOutcome::Skipped;
            }
        };

        let state = self.engine.react(&prediction, &mut self.surface);
        self.hub.publish_scene(self.surface.snapshot());
        METER.tick_reacted();

        TickOutcome::Reacted(state)
    }

    /// Tick once per refresh interval until `stop` is cancelled.
    ///
    /// A tick always completes before the next one is scheduled; refreshes missed while a tick
    /// was running are skipped.
    pub async fn run(&mut self, stop: CancellationToken) {
        let mut refresh = interval(self.frame_interval);
        refresh.set_missed_tick_behavior(MissedTickBehavior::Skip);

        log::info!(
            "Capture loop running every {:.1}ms",
            self.frame_interval.as_secs_f64() * 1000.0
        );

        loop {
            tokio::select! {
                biased;
                _ = stop.cancelled() => break,
                _ = refresh.tick() => {
                    self.tick().await;
                }
            }
        }

        log::info!("Capture loop stopped");
    }
}
