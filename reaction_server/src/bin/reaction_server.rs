//! Reaction server binary.
//!
use std::{net::SocketAddr, path::PathBuf};

use anyhow::{ensure, Result};
use clap::Parser;
use env_logger::TimestampPrecision;
use reaction_server::{
    effects::{OverlayPolicy, DEFAULT_THRESHOLD},
    endpoints::{app, AssetsDir},
    engine::EngineConfig,
    meter::spawn_meter_logger,
    nn::{ModelLocation, TeachableModel},
    placement::Viewport,
    session::{Session, SessionConfig, DEFAULT_REFRESH_HZ, REFRESH_HZ_RANGE},
};
use tokio_util::sync::CancellationToken;
use webcam::sensors::{Webcam, WebcamConfig};

#[derive(Parser, Debug)]
#[clap(author, version)]
struct Args {
    /// Address to serve the page on
    #[clap(long, default_value = "127.0.0.1:3000")]
    server_address: String,

    /// Model directory or base URL holding `model.onnx` and `metadata.json`
    #[clap(long)]
    model: String,

    /// Video device to capture from
    #[clap(long, default_value = "/dev/video0")]
    device: String,

    /// Capture width
    #[clap(long, default_value_t = 640)]
    width: u32,

    /// Capture height
    #[clap(long, default_value_t = 480)]
    height: u32,

    /// Frames per second requested from the camera, the fastest supported rate if unset
    #[clap(long)]
    frame_rate: Option<u32>,

    /// Classify the picture as captured instead of mirrored
    #[clap(long)]
    no_mirror: bool,

    /// Minimum probability before a class triggers its effect
    #[clap(long, default_value_t = DEFAULT_THRESHOLD)]
    threshold: f64,

    /// Overlay placement: fixed, randomized or none
    #[clap(long, default_value_t = OverlayPolicy::Fixed)]
    overlay_policy: OverlayPolicy,

    /// Display refresh rate the capture loop ticks at
    #[clap(long, default_value_t = DEFAULT_REFRESH_HZ)]
    refresh_hz: f64,

    /// Page width in pixels used to keep random overlays off the center
    #[clap(long, default_value_t = 1920.0)]
    viewport_width: f32,

    /// Page height in pixels used to keep random overlays off the center
    #[clap(long, default_value_t = 1080.0)]
    viewport_height: f32,

    /// Directory with the overlay images
    #[clap(long, default_value = "img")]
    assets_dir: PathBuf,
}

impl Args {
    fn validate(&self) -> Result<()> {
        ensure!(
            (0.0..=1.0).contains(&self.threshold),
            "threshold must be within [0, 1], got {}",
            self.threshold
        );
        ensure!(
            REFRESH_HZ_RANGE.contains(&self.refresh_hz),
            "refresh rate must be within [{}, {}] Hz, got {}",
            REFRESH_HZ_RANGE.start(),
            REFRESH_HZ_RANGE.end(),
            self.refresh_hz
        );
        ensure!(
            self.viewport_width > 0.0 && self.viewport_height > 0.0,
            "viewport must not be empty"
        );
        ensure!(self.width > 0 && self.height > 0, "resolution must not be empty");
        ensure!(self.frame_rate != Some(0), "frame rate must be positive");

        Ok(())
    }

    fn webcam_config(&self) -> WebcamConfig {
        WebcamConfig {
            device: self.device.clone(),
            resolution: Some((self.width, self.height)),
            frame_rate: self.frame_rate.map(|fps| (1, fps)),
            mirror: !self.no_mirror,
            ..Default::default()
        }
    }

    fn session_config(&self) -> SessionConfig {
        SessionConfig {
            engine: EngineConfig {
                threshold: self.threshold,
                overlay_policy: self.overlay_policy,
                viewport: Viewport::new(self.viewport_width, self.viewport_height),
            },
            refresh_hz: self.refresh_hz,
            ..Default::default()
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Setup logger
    env_logger::builder()
        .format_timestamp(Some(TimestampPrecision::Millis))
        .init();

    args.validate()?;

    // Startup failures end the process, there is no retry
    let location = ModelLocation::parse(&args.model);
    let webcam = Webcam::new(args.webcam_config());
    let mut session =
        Session::initialize(webcam, TeachableModel::load(&location), args.session_config())
            .await?;

    spawn_meter_logger();

    let stop = CancellationToken::new();

    // Build HTTP server with endpoints
    let app = app(session.hub(), AssetsDir::new(&args.assets_dir));
    let addr: SocketAddr = args.server_address.parse()?;
    let server = axum::Server::try_bind(&addr)?.serve(app.into_make_service());
    log::info!("Serving page on http://{}", addr);

    let server = {
        let stop = stop.clone();
        tokio::spawn(async move {
            server
                .with_graceful_shutdown(async move { stop.cancelled().await })
                .await
        })
    };

    {
        let stop = stop.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                log::info!("Shutting down");
                stop.cancel();
            }
        });
    }

    session.run(stop).await;
    server.await??;

    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn defaults_reproduce_page_behavior() {
        let args =
            Args::try_parse_from(["reaction_server", "--model", "models/portfolio"]).unwrap();
        args.validate().unwrap();

        let config = args.session_config();
        assert_eq!(config.engine.threshold, 0.9);
        assert_eq!(config.engine.overlay_policy, OverlayPolicy::Fixed);
        assert!(args.webcam_config().mirror);
    }

    #[test]
    fn parses_overlay_policy_and_rejects_bad_values() {
        let args = Args::try_parse_from([
            "reaction_server",
            "--model",
            "m",
            "--overlay-policy",
            "randomized",
            "--frame-rate",
            "30",
        ])
        .unwrap();
        assert_eq!(args.overlay_policy, OverlayPolicy::Randomized);
        assert_eq!(args.webcam_config().frame_rate, Some((1, 30)));

        let wild_policy = ["reaction_server", "--model", "m", "--overlay-policy", "wild"];
        assert!(Args::try_parse_from(wild_policy).is_err());
        assert!(Args::try_parse_from(["reaction_server"]).is_err());

        let args =
            Args::try_parse_from(["reaction_server", "--model", "m", "--threshold", "1.5"]).unwrap();
        assert!(args.validate().is_err());
    }

    #[test]
    fn rejects_refresh_rates_the_loop_cannot_tick_at() {
        for refresh_hz in ["1e-300", "0.5", "0", "-60", "3e9", "inf", "NaN"] {
            let args = Args::try_parse_from([
                "reaction_server",
                "--model",
                "m",
                "--refresh-hz",
                refresh_hz,
            ]);
            if let Ok(args) = args {
                assert!(args.validate().is_err(), "{refresh_hz}");
            }
        }

        for refresh_hz in ["1", "60", "144", "1000"] {
            let args = Args::try_parse_from([
                "reaction_server",
                "--model",
                "m",
                "--refresh-hz",
                refresh_hz,
            ])
            .unwrap();
            args.validate().unwrap();
        }
    }
}
