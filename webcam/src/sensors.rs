//! Sensors module.
//!
use bytes::Bytes;
use image::RgbImage;
use rscam::{Camera, Config};
use simple_error::simple_error;

use crate::Error;

/// A captured frame.
#[derive(Clone, Debug)]
pub struct Frame {
    /// Decoded (and possibly mirrored) image used for inference.
    pub image: RgbImage,
    /// Encoded frame as delivered by the device, if it was JPEG encoded.
    pub jpeg: Option<Bytes>,
}

/// Source of a continuous stream of frames.
pub trait VideoSource {
    /// Acquire the device. Fails if access is denied or the device does not exist.
    fn setup(&mut self) -> Result<(), Error>;

    /// Start streaming.
    fn play(&mut self) -> Result<(), Error>;

    /// Replace the current frame with a freshly captured one.
    fn update(&mut self) -> Result<(), Error>;

    /// Most recently captured frame.
    fn frame(&self) -> Option<&Frame>;

    /// Whether frames are flipped horizontally relative to the encoded stream.
    fn mirrored(&self) -> bool {
        false
    }
}

/// Settings of a V4L2 webcam.
#[derive(Clone, Debug)]
pub struct WebcamConfig {
    pub device: String,
    pub format: String,
    /// Requested resolution, the highest supported one if `None`.
    pub resolution: Option<(u32, u32)>,
    /// Requested frame interval as `(numerator, denominator)`, the fastest one if `None`.
    pub frame_rate: Option<(u32, u32)>,
    /// Flip frames horizontally so the picture behaves like a mirror.
    pub mirror: bool,
}

impl Default for WebcamConfig {
    fn default() -> Self {
        Self {
            device: "/dev/video0".to_owned(),
            format: "MJPG".to_owned(),
            resolution: Some((640, 480)),
            frame_rate: None,
            mirror: true,
        }
    }
}

/// Webcam on a Linux machine, streaming MJPG frames.
pub struct Webcam {
    config: WebcamConfig,
    camera: Option<Camera>,
    resolution: (u32, u32),
    interval: (u32, u32),
    streaming: bool,
    frame: Option<Frame>,
}

impl Webcam {
    pub fn new(config: WebcamConfig) -> Self {
        Self {
            config,
            camera: None,
            resolution: (0, 0),
            interval: (0, 0),
            streaming: false,
            frame: None,
        }
    }
}

impl VideoSource for Webcam {
    fn setup(&mut self) -> Result<(), Error> {
        let device = &self.config.device;
        let cam = Camera::new(device).map_err(|source| Error::Device {
            device: device.clone(),
            source,
        })?;
        log_supported_formats(&cam, &self.config.format);
        let format = self.config.format.as_bytes();

        log::info!("Using camera {}", device);

        self.resolution = self
            .config
            .resolution
            .map(Ok)
            .unwrap_or_else(|| get_max_resolution(&cam, format))?;

        self.interval = self
            .config
            .frame_rate
            .map(Ok)
            .unwrap_or_else(|| get_max_frame_rate(&cam, format, self.resolution))?;

        self.camera = Some(cam);
        Ok(())
    }

    fn play(&mut self) -> Result<(), Error> {
        let cam = self.camera.as_mut().ok_or(Error::NotStreaming)?;
        cam.start(&Config {
            interval: self.interval,
            resolution: self.resolution,
            format: self.config.format.as_bytes(),
            ..Default::default()
        })?;

        log::info!(
            "Streaming {}x{} at {}/{}s",
            self.resolution.0,
            self.resolution.1,
            self.interval.0,
            self.interval.1
        );
        self.streaming = true;
        Ok(())
    }

    fn update(&mut self) -> Result<(), Error> {
        let cam = match (&self.camera, self.streaming) {
            (Some(cam), true) => cam,
            _ => return Err(Error::NotStreaming),
        };

        let raw = cam.capture().map_err(Error::Capture)?;
        let mut image: RgbImage = turbojpeg::decompress_image(&raw[..])?;
        if self.config.mirror {
            image::imageops::flip_horizontal_in_place(&mut image);
        }

        self.frame = Some(Frame {
            image,
            jpeg: Some(Bytes::copy_from_slice(&raw[..])),
        });
        Ok(())
    }

    fn frame(&self) -> Option<&Frame> {
        self.frame.as_ref()
    }

    fn mirrored(&self) -> bool {
        self.config.mirror
    }
}

/// Get the maximum supported resolution for the given format.
fn get_max_resolution(cam: &Camera, format: &[u8]) -> Result<(u32, u32), Error> {
    let resolution_info = cam.resolutions(format)?;
    log::debug!("Found resolutions: {:?}", &resolution_info);
    match resolution_info {
        rscam::ResolutionInfo::Discretes(resolutions) => resolutions
            .iter()
            // Highest resolution in terms of number of pixels
            .max_by_key(|res| res.0 * res.1)
            .copied(),
        rscam::ResolutionInfo::Stepwise { max, .. } => Some(max),
    }
    .ok_or_else(|| simple_error!("No resolution found").into())
}

/// Get the shortest supported frame interval for the given format and resolution.
fn get_max_frame_rate(
    cam: &Camera,
    format: &[u8],
    resolution: (u32, u32),
) -> Result<(u32, u32), Error> {
    let interval_info = cam.intervals(format, resolution)?;
    log::debug!("Found frame intervals: {:?}", &interval_info);
    match interval_info {
        // Intervals are (numerator, denominator) seconds, compare n1/d1 < n2/d2 without division
        rscam::IntervalInfo::Discretes(intervals) => intervals
            .iter()
            .filter(|(_, denominator)| *denominator > 0)
            .min_by(|a, b| (a.0 as u64 * b.1 as u64).cmp(&(b.0 as u64 * a.1 as u64)))
            .copied(),
        rscam::IntervalInfo::Stepwise { min, .. } => Some(min),
    }
    .ok_or_else(|| simple_error!("No frame rate found").into())
}

fn log_supported_formats(cam: &Camera, format: &str) {
    let formats: Vec<_> = cam.formats().filter_map(Result::ok).collect();
    log::debug!(
        "Supported formats: {:?}, using format {:?}",
        formats,
        format
    );
}
