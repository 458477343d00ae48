use std::{
    collections::VecDeque,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    },
};

use anyhow::{anyhow, Result};
use bytes::Bytes;
use common::protocol::{ClassProbability, Prediction};
use image::RgbImage;
use reaction_server::{
    effects::{ClassSlot, ACTIVE_BACKGROUND, DEFAULT_BACKGROUND},
    engine::ReactionState,
    nn::Classifier,
    session::{Session, SessionConfig, StartupError, TickOutcome},
};
use tokio_util::sync::CancellationToken;
use webcam::{
    sensors::{Frame, VideoSource},
    Error,
};

const LABELS: [&str; 4] = ["name", "date", "location", "websites"];

fn prediction(probabilities: [f32; 4]) -> Prediction {
    LABELS
        .iter()
        .zip(probabilities)
        .map(|(label, p)| ClassProbability::new(*label, p))
        .collect()
}

/// Video source producing blank frames, optionally cancelling a token after some frames.
#[derive(Default)]
struct FakeVideo {
    deny_access: bool,
    fail_updates: bool,
    with_jpeg: bool,
    mirror: bool,
    played: bool,
    frame: Option<Frame>,
    updates: Arc<AtomicUsize>,
    stop_after: Option<(usize, CancellationToken)>,
}

impl VideoSource for FakeVideo {
    fn setup(&mut self) -> Result<(), Error> {
        match self.deny_access {
            true => Err(Error::Device {
                device: "/dev/fake".into(),
                source: std::io::Error::from(std::io::ErrorKind::PermissionDenied),
            }),
            false => Ok(()),
        }
    }

    fn play(&mut self) -> Result<(), Error> {
        self.played = true;
        Ok(())
    }

    fn update(&mut self) -> Result<(), Error> {
        if !self.played || self.fail_updates {
            return Err(Error::NotStreaming);
        }

        let count = self.updates.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some((limit, stop)) = &self.stop_after {
            if count >= *limit {
                stop.cancel();
            }
        }

        self.frame = Some(Frame {
            image: RgbImage::new(4, 4),
            jpeg: self.with_jpeg.then(|| Bytes::from_static(b"jpeg")),
        });
        Ok(())
    }

    fn frame(&self) -> Option<&Frame> {
        self.frame.as_ref()
    }

    fn mirrored(&self) -> bool {
        self.mirror
    }
}

/// Classifier replaying a fixed list of predictions, repeating the last one.
struct ScriptedClassifier {
    script: Mutex<VecDeque<Prediction>>,
    last: Mutex<Prediction>,
    fail: bool,
}

impl ScriptedClassifier {
    fn new(script: Vec<Prediction>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            last: Mutex::new(Prediction::default()),
            fail: false,
        }
    }

    fn failing() -> Self {
        Self {
            fail: true,
            ..Self::new(vec![])
        }
    }
}

impl Classifier for ScriptedClassifier {
    fn class_count(&self) -> usize {
        LABELS.len()
    }

    fn predict(&self, _frame: &RgbImage) -> Result<Prediction> {
        if self.fail {
            return Err(anyhow!("inference exploded"));
        }

        let mut last = self.last.lock().unwrap();
        if let Some(next) = self.script.lock().unwrap().pop_front() {
            *last = next;
        }
        Ok(last.clone())
    }
}

async fn scripted(script: Vec<Prediction>) -> Result<ScriptedClassifier> {
    Ok(ScriptedClassifier::new(script))
}

fn fast_config() -> SessionConfig {
    SessionConfig {
        refresh_hz: 1000.0,
        ..Default::default()
    }
}

#[tokio::test]
async fn model_failure_aborts_startup_before_touching_camera() {
    let video = FakeVideo::default();
    let updates = Arc::clone(&video.updates);

    let model = async { Err::<ScriptedClassifier, _>(anyhow!("model unreachable")) };
    let result = Session::initialize(video, model, fast_config()).await;

    assert!(matches!(result, Err(StartupError::ModelLoad(_))));
    assert_eq!(updates.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn denied_camera_aborts_startup() {
    let video = FakeVideo {
        deny_access: true,
        ..Default::default()
    };

    let model = scripted(vec![]);
    let result = Session::initialize(video, model, fast_config()).await;

    assert!(matches!(result, Err(StartupError::Device(_))));
}

#[tokio::test]
async fn startup_prepares_neutral_scene_with_label_per_class() -> Result<()> {
    let model = scripted(vec![]);
    let session = Session::initialize(FakeVideo::default(), model, fast_config()).await?;

    let scene = session.hub().scene();
    assert_eq!(scene.labels.len(), LABELS.len());
    assert_eq!(scene.regions.len(), 5);
    assert_eq!(scene.active_regions().count(), 0);
    assert_eq!(scene.background, DEFAULT_BACKGROUND);
    assert!(scene.overlays.is_empty());
    assert!(!scene.mirrored);

    Ok(())
}

#[tokio::test]
async fn scene_reports_mirrored_video() -> Result<()> {
    let video = FakeVideo {
        mirror: true,
        ..Default::default()
    };
    let model = scripted(vec![prediction([0.95, 0.02, 0.02, 0.01])]);
    let mut session = Session::initialize(video, model, fast_config()).await?;
    assert!(session.hub().scene().mirrored);

    session.tick().await;
    assert!(session.hub().scene().mirrored);

    Ok(())
}

#[tokio::test]
async fn ticks_follow_the_latest_prediction() -> Result<()> {
    let model = scripted(vec![
        prediction([0.95, 0.02, 0.02, 0.01]),
        prediction([0.5, 0.3, 0.1, 0.1]),
        prediction([0.01, 0.01, 0.01, 0.97]),
    ]);
    let mut session = Session::initialize(FakeVideo::default(), model, fast_config()).await?;

    assert_eq!(
        session.tick().await,
        TickOutcome::Reacted(ReactionState::Active(ClassSlot::Name))
    );
    let scene = session.hub().scene();
    assert_eq!(
        scene.active_regions().collect::<Vec<_>>(),
        vec!["name", "occupation"]
    );
    assert_eq!(scene.background, ACTIVE_BACKGROUND);
    assert_eq!(scene.overlays.len(), 2);
    assert_eq!(scene.labels[0], "name: 0.95");

    assert_eq!(
        session.tick().await,
        TickOutcome::Reacted(ReactionState::Gated)
    );
    let scene = session.hub().scene();
    assert_eq!(scene.active_regions().count(), 0);
    assert_eq!(scene.background, DEFAULT_BACKGROUND);
    assert!(scene.overlays.is_empty());
    assert_eq!(
        scene.labels,
        vec!["name: 0.50", "date: 0.30", "location: 0.10", "websites: 0.10"]
    );

    assert_eq!(
        session.tick().await,
        TickOutcome::Reacted(ReactionState::Active(ClassSlot::Websites))
    );
    assert!(session.surface().is_active("websites"));

    Ok(())
}

#[tokio::test]
async fn run_stops_when_cancelled() -> Result<()> {
    let stop = CancellationToken::new();
    let video = FakeVideo {
        stop_after: Some((5, stop.clone())),
        ..Default::default()
    };
    let updates = Arc::clone(&video.updates);
    let model = scripted(vec![prediction([0.0, 0.99, 0.01, 0.0])]);
    let mut session = Session::initialize(video, model, fast_config()).await?;

    tokio::time::timeout(std::time::Duration::from_secs(5), session.run(stop)).await?;

    assert_eq!(updates.load(Ordering::SeqCst), 5);
    let scene = session.hub().scene();
    assert_eq!(scene.active_regions().collect::<Vec<_>>(), vec!["date"]);
    assert_eq!(scene.detected.as_deref(), Some("date"));

    Ok(())
}

#[tokio::test]
async fn run_returns_immediately_when_already_stopped() -> Result<()> {
    let video = FakeVideo::default();
    let updates = Arc::clone(&video.updates);
    let model = scripted(vec![]);
    let mut session = Session::initialize(video, model, fast_config()).await?;

    let stop = CancellationToken::new();
    stop.cancel();
    session.run(stop).await;

    assert_eq!(updates.load(Ordering::SeqCst), 0);

    Ok(())
}

#[tokio::test]
async fn failed_capture_skips_frame() -> Result<()> {
    let video = FakeVideo {
        fail_updates: true,
        ..Default::default()
    };
    let model = scripted(vec![prediction([0.95, 0.0, 0.0, 0.05])]);
    let mut session = Session::initialize(video, model, fast_config()).await?;
    let before = session.hub().scene();

    assert_eq!(session.tick().await, TickOutcome::Skipped);
    assert_eq!(session.hub().scene(), before);

    Ok(())
}

#[tokio::test]
async fn failed_inference_skips_frame() -> Result<()> {
    let model = async { Ok(ScriptedClassifier::failing()) };
    let mut session = Session::initialize(FakeVideo::default(), model, fast_config()).await?;
    let before = session.hub().scene();

    assert_eq!(session.tick().await, TickOutcome::Skipped);
    assert_eq!(session.hub().scene(), before);

    Ok(())
}

#[tokio::test]
async fn captured_frames_are_streamed() -> Result<()> {
    let video = FakeVideo {
        with_jpeg: true,
        ..Default::default()
    };
    let model = scripted(vec![prediction([0.25; 4])]);
    let mut session = Session::initialize(video, model, fast_config()).await?;
    let mut frames = session.hub().subscribe_frames();

    session.tick().await;

    let item = frames.recv().await?;
    assert!(item.ends_with(b"jpeg\r\n\r\n"));

    Ok(())
}
