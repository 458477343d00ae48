//! Webcam access for the reaction server.
pub mod sensors;

/// Error type.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The device could not be opened, e.g. because access was denied.
    #[error("unable to open camera {device}: {source}")]
    Device {
        device: String,
        source: std::io::Error,
    },
    #[error("camera is not streaming")]
    NotStreaming,
    #[error("camera negotiation failed: {0}")]
    Negotiation(#[from] simple_error::SimpleError),
    #[error("camera error: {0}")]
    Camera(#[from] rscam::Error),
    #[error("camera I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("unable to capture frame: {0}")]
    Capture(std::io::Error),
    #[error("unable to decode frame: {0}")]
    Decode(#[from] turbojpeg::Error),
}
