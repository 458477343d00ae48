//! Reaction engine turning class probabilities into presentation effects.
//!
use common::protocol::Prediction;
use rand::{rngs::StdRng, SeedableRng};

use crate::{
    effects::{
        ClassSlot, EffectDescriptor, OverlayPolicy, DEFAULT_BACKGROUND, DEFAULT_THRESHOLD,
        KNOWN_REGIONS,
    },
    placement::{sample_away_from_center, Viewport, CENTER_EXCLUSION_RATIO, MAX_PLACEMENT_ATTEMPTS},
    surface::{Overlay, PresentationSurface, SurfaceError},
};

/// Settings of the reaction engine.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct EngineConfig {
    /// Compared against probabilities widened to `f64`, so `0.9f32` stays below `0.9`.
    pub threshold: f64,
    pub overlay_policy: OverlayPolicy,
    pub viewport: Viewport,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_THRESHOLD,
            overlay_policy: OverlayPolicy::default(),
            viewport: Viewport::default(),
        }
    }
}

/// Presentation state after a frame.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ReactionState {
    /// No class passed the confidence gate, the page is neutral.
    Gated,
    /// The class passed the gate and its effect is shown.
    Active(ClassSlot),
}

pub struct ReactionEngine {
    config: EngineConfig,
    rng: StdRng,
}

impl ReactionEngine {
    pub fn new(config: EngineConfig) -> Self {
        Self::with_rng(config, StdRng::from_entropy())
    }

    pub fn with_rng(config: EngineConfig, rng: StdRng) -> Self {
        Self { config, rng }
    }

    /// Recompute the whole presentation from the latest prediction.
    ///
    /// All known regions are cleared first. If the most likely class reaches the threshold and
    /// has an entry in the effect table, its effect is drawn, otherwise the page goes neutral.
    /// Labels are refreshed in both cases. Elements missing on the surface are skipped.
    pub fn react<S: PresentationSurface + ?Sized>(
        &mut self,
        prediction: &Prediction,
        surface: &mut S,
    ) -> ReactionState {
        for region in KNOWN_REGIONS {
            tolerate(surface.set_region_active(region, false));
        }

        let state = match prediction.top() {
            Some((index, probability)) if f64::from(probability) >= self.config.threshold => {
                let label = &prediction.classes[index].label;
                match ClassSlot::from_index(index) {
                    Some(slot) => {
                        log::debug!("Detected: {} {:.2}", label, probability);
                        self.activate(slot.effect(), label, surface);
                        ReactionState::Active(slot)
                    }
                    None => {
                        log::debug!("Detected {} at index {} without effect", label, index);
                        neutralize(surface);
                        ReactionState::Gated
                    }
                }
            }
            _ => {
                neutralize(surface);
                ReactionState::Gated
            }
        };

        refresh_labels(prediction, surface);

        state
    }

    fn activate<S: PresentationSurface + ?Sized>(
        &mut self,
        effect: &EffectDescriptor,
        label: &str,
        surface: &mut S,
    ) {
        for region in effect.regions {
            tolerate(surface.set_region_active(region, true));
        }
        surface.set_background(effect.background);
        surface.set_detected(Some(label));
        surface.clear_overlays();

        if self.config.overlay_policy == OverlayPolicy::Disabled {
            return;
        }

        for (slot, image) in effect.overlays.iter().enumerate() {
            let position = match self.config.overlay_policy {
                OverlayPolicy::Randomized => {
                    let placement = sample_away_from_center(
                        &mut self.rng,
                        &self.config.viewport,
                        CENTER_EXCLUSION_RATIO,
                        MAX_PLACEMENT_ATTEMPTS,
                    );
                    if placement.exhausted {
                        log::debug!("No position outside the center found for {}", image.source);
                    }
                    placement.position
                }
                _ => image.fixed_position,
            };

            tolerate(surface.show_overlay(Overlay {
                slot,
                source: image.source.to_owned(),
                position,
            }));
        }
    }
}

fn neutralize<S: PresentationSurface + ?Sized>(surface: &mut S) {
    surface.set_background(DEFAULT_BACKGROUND);
    surface.set_detected(None);
    surface.clear_overlays();
}

fn refresh_labels<S: PresentationSurface + ?Sized>(prediction: &Prediction, surface: &mut S) {
    for (index, class) in prediction.iter().enumerate() {
        let text = format!("{}: {:.2}", class.label, round_half_up(class.probability));
        tolerate(surface.set_label(index, &text));
    }
}

/// Round to two decimals with ties away from zero. Plain `{:.2}` rounds ties to even.
fn round_half_up(probability: f32) -> f64 {
    (f64::from(probability) * 100.0).round() / 100.0
}

fn tolerate(result: Result<(), SurfaceError>) {
    if let Err(err) = result {
        log::debug!("Skipping presentation element: {err}");
    }
}
