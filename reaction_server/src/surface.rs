//! Presentation surface the reaction engine draws on.
//!
use common::protocol::{Color, OverlaySnapshot, Position, RegionSnapshot, SceneSnapshot};

use crate::effects::DEFAULT_BACKGROUND;

/// A presentation element the engine tried to change is not on the page.
#[derive(Debug, Eq, PartialEq, thiserror::Error)]
pub enum SurfaceError {
    #[error("region {0:?} is not present")]
    MissingRegion(String),
    #[error("label slot {0} is not present")]
    MissingLabel(usize),
    #[error("overlay slot {0} is not present")]
    MissingOverlay(usize),
}

/// Image to place over the page.
#[derive(Clone, Debug, PartialEq)]
pub struct Overlay {
    pub slot: usize,
    pub source: String,
    pub position: Position,
}

/// Operations the engine needs from whatever renders the page.
pub trait PresentationSurface {
    fn set_region_active(&mut self, region: &str, active: bool) -> Result<(), SurfaceError>;

    fn set_background(&mut self, color: Color);

    /// Hide every overlay image.
    fn clear_overlays(&mut self);

    fn show_overlay(&mut self, overlay: Overlay) -> Result<(), SurfaceError>;

    fn set_label(&mut self, index: usize, text: &str) -> Result<(), SurfaceError>;

    /// Class currently shown as detected, if any.
    fn set_detected(&mut self, _label: Option<&str>) {}
}

/// In-memory page state, published to the browser as [`SceneSnapshot`].
#[derive(Clone, Debug)]
pub struct SceneSurface {
    regions: Vec<RegionSnapshot>,
    background: Color,
    overlays: Vec<Option<OverlaySnapshot>>,
    labels: Vec<String>,
    detected: Option<String>,
    mirrored: bool,
}

impl SceneSurface {
    /// Surface with the given regions, `label_slots` label lines and `overlay_slots` images.
    pub fn new<'a>(
        regions: impl IntoIterator<Item = &'a str>,
        label_slots: usize,
        overlay_slots: usize,
    ) -> Self {
        Self {
            regions: regions
                .into_iter()
                .map(|id| RegionSnapshot {
                    id: id.to_owned(),
                    active: false,
                })
                .collect(),
            background: DEFAULT_BACKGROUND,
            overlays: vec![None; overlay_slots],
            labels: vec![String::new(); label_slots],
            detected: None,
            mirrored: false,
        }
    }

    /// Tell the page to flip the webcam stream, matching frames mirrored before inference.
    pub fn with_mirrored(mut self, mirrored: bool) -> Self {
        self.mirrored = mirrored;
        self
    }

    pub fn is_active(&self, region: &str) -> bool {
        self.regions
            .iter()
            .any(|candidate| candidate.id == region && candidate.active)
    }

    pub fn background(&self) -> Color {
        self.background
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    pub fn visible_overlays(&self) -> impl Iterator<Item = &OverlaySnapshot> {
        self.overlays.iter().flatten()
    }

    pub fn snapshot(&self) -> SceneSnapshot {
        SceneSnapshot {
            regions: self.regions.clone(),
            background: self.background,
            overlays: self.visible_overlays().cloned().collect(),
            labels: self.labels.clone(),
            detected: self.detected.clone(),
            mirrored: self.mirrored,
        }
    }
}

impl PresentationSurface for SceneSurface {
    fn set_region_active(&mut self, region: &str, active: bool) -> Result<(), SurfaceError> {
        let entry = self
            .regions
            .iter_mut()
            .find(|candidate| candidate.id == region)
            .ok_or_else(|| SurfaceError::MissingRegion(region.to_owned()))?;
        entry.active = active;
        Ok(())
    }

    fn set_background(&mut self, color: Color) {
        self.background = color;
    }

    fn clear_overlays(&mut self) {
        self.overlays.iter_mut().for_each(|slot| *slot = None);
    }

    fn show_overlay(&mut self, overlay: Overlay) -> Result<(), SurfaceError> {
        let slot = self
            .overlays
            .get_mut(overlay.slot)
            .ok_or(SurfaceError::MissingOverlay(overlay.slot))?;
        *slot = Some(OverlaySnapshot {
            slot: overlay.slot,
            source: overlay.source,
            position: overlay.position,
        });
        Ok(())
    }

    fn set_label(&mut self, index: usize, text: &str) -> Result<(), SurfaceError> {
        let label = self
            .labels
            .get_mut(index)
            .ok_or(SurfaceError::MissingLabel(index))?;
        label.clear();
        label.push_str(text);
        Ok(())
    }

    fn set_detected(&mut self, label: Option<&str>) {
        self.detected = label.map(str::to_owned);
    }
}
