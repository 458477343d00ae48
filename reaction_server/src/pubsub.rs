//! Channels from the capture loop to HTTP clients.
//!
use std::sync::Arc;

use bytes::Bytes;
use common::protocol::SceneSnapshot;
use tokio::sync::{broadcast, watch};

/// Number of frames buffered per stream subscriber.
const FRAME_CHANNEL_CAPACITY: usize = 20;

pub type FrameSender = broadcast::Sender<Bytes>;
pub type FrameReceiver = broadcast::Receiver<Bytes>;

/// Publishes the latest scene and the raw webcam frames.
///
/// The capture loop is the only publisher. Cloning the hub hands out another handle to the same
/// channels.
#[derive(Clone)]
pub struct SceneHub {
    scene_tx: Arc<watch::Sender<SceneSnapshot>>,
    frames_tx: FrameSender,
}

impl SceneHub {
    pub fn new(initial: SceneSnapshot) -> Self {
        let (scene_tx, _) = watch::channel(initial);
        let (frames_tx, _) = broadcast::channel(FRAME_CHANNEL_CAPACITY);
        Self {
            scene_tx: Arc::new(scene_tx),
            frames_tx,
        }
    }

    pub fn publish_scene(&self, scene: SceneSnapshot) {
        self.scene_tx.send_replace(scene);
    }

    /// Forward a JPEG frame to all stream subscribers. Frames without subscribers are dropped.
    pub fn publish_frame(&self, jpeg: &[u8]) {
        if self.frames_tx.receiver_count() > 0 {
            self.frames_tx.send(as_jpeg_stream_item(jpeg)).ok();
        }
    }

    pub fn scene(&self) -> SceneSnapshot {
        self.scene_tx.borrow().clone()
    }

    pub fn subscribe_frames(&self) -> FrameReceiver {
        self.frames_tx.subscribe()
    }
}

/// Wrap a JPEG image as one part of a `multipart/x-mixed-replace` stream.
pub fn as_jpeg_stream_item(data: &[u8]) -> Bytes {
    Bytes::copy_from_slice(
        &[
            "--frame\r\nContent-Type: image/jpeg\r\n\r\n".as_bytes(),
            data,
            "\r\n\r\n".as_bytes(),
        ]
        .concat(),
    )
}
