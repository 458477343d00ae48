//! Random overlay placement that keeps the center of the page free.
//!
use common::protocol::Position;
use rand::Rng;

/// Share of the smaller viewport side that defines the radius kept free around the center.
pub const CENTER_EXCLUSION_RATIO: f32 = 0.18;

/// Candidates drawn before the last one is accepted regardless of its distance to the center.
pub const MAX_PLACEMENT_ATTEMPTS: u32 = 20;

/// Size of the page the overlays are placed on, in pixels.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Viewport {
    pub width: f32,
    pub height: f32,
}

impl Default for Viewport {
    fn default() -> Self {
        Self::new(1920.0, 1080.0)
    }
}

impl Viewport {
    pub const fn new(width: f32, height: f32) -> Self {
        Self { width, height }
    }

    pub fn center(&self) -> (f32, f32) {
        (self.width / 2.0, self.height / 2.0)
    }

    pub fn exclusion_radius(&self, ratio: f32) -> f32 {
        ratio * self.width.min(self.height)
    }

    /// Distance of a pixel coordinate to the viewport center.
    pub fn distance_to_center(&self, x: f32, y: f32) -> f32 {
        let (cx, cy) = self.center();
        (x - cx).hypot(y - cy)
    }

    /// Convert a pixel coordinate into viewport percentages.
    pub fn to_position(&self, x: f32, y: f32) -> Position {
        let percent = |value: f32, extent: f32| match extent > 0.0 {
            true => value / extent * 100.0,
            false => 0.0,
        };
        Position::new(percent(x, self.width), percent(y, self.height))
    }

    /// Convert viewport percentages back into a pixel coordinate.
    pub fn to_pixels(&self, position: Position) -> (f32, f32) {
        (
            position.left_vw / 100.0 * self.width,
            position.top_vh / 100.0 * self.height,
        )
    }
}

/// Outcome of sampling an overlay position.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Placement {
    pub position: Position,
    /// Number of candidates drawn, including the accepted one.
    pub attempts: u32,
    /// No candidate left the exclusion zone and the last one was taken anyway.
    pub exhausted: bool,
}

/// Draw uniform positions in the viewport until one lies at least
/// `exclusion_ratio * min(width, height)` away from the center.
///
/// After `max_attempts` rejected candidates the last one is accepted.
pub fn sample_away_from_center<R: Rng + ?Sized>(
    rng: &mut R,
    viewport: &Viewport,
    exclusion_ratio: f32,
    max_attempts: u32,
) -> Placement {
    let radius = viewport.exclusion_radius(exclusion_ratio);
    let max_attempts = max_attempts.max(1);

    let mut candidate = (0.0, 0.0);
    for attempt in 1..=max_attempts {
        candidate = (
            rng.gen::<f32>() * viewport.width,
            rng.gen::<f32>() * viewport.height,
        );
        if viewport.distance_to_center(candidate.0, candidate.1) >= radius {
            return Placement {
                position: viewport.to_position(candidate.0, candidate.1),
                attempts: attempt,
                exhausted: false,
            };
        }
    }

    Placement {
        position: viewport.to_position(candidate.0, candidate.1),
        attempts: max_attempts,
        exhausted: true,
    }
}
