//! Types exchanged between the capture loop, the reaction engine and the page.
//!
use std::fmt;

use serde::{Deserialize, Serialize};

/// Probability the classifier assigns to one class.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct ClassProbability {
    pub label: String,
    pub probability: f32,
}

impl ClassProbability {
    pub fn new(label: impl Into<String>, probability: f32) -> Self {
        Self {
            label: label.into(),
            probability,
        }
    }
}

/// Per-frame classifier output, one entry per known class in class order.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
pub struct Prediction {
    pub classes: Vec<ClassProbability>,
}

impl Prediction {
    pub fn new(classes: Vec<ClassProbability>) -> Self {
        Self { classes }
    }

    /// Index and probability of the most likely class.
    ///
    /// Scans left to right and only replaces the current best on a strictly greater probability,
    /// so the lowest index wins ties and `NaN` entries never win. Returns `None` if there is no
    /// entry with a comparable probability.
    pub fn top(&self) -> Option<(usize, f32)> {
        let mut best: Option<(usize, f32)> = None;
        for (index, class) in self.classes.iter().enumerate() {
            let probability = class.probability;
            if probability.is_nan() {
                continue;
            }
            match best {
                Some((_, max)) if probability <= max => (),
                _ => best = Some((index, probability)),
            }
        }

        best
    }

    pub fn iter(&self) -> impl Iterator<Item = &ClassProbability> {
        self.classes.iter()
    }
}

impl FromIterator<ClassProbability> for Prediction {
    fn from_iter<T: IntoIterator<Item = ClassProbability>>(iter: T) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

/// RGB color, serialized as `#rrggbb`.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(into = "String", try_from = "String")]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Color {
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Parse `#rrggbb` (the leading `#` is optional).
    pub fn from_hex(hex: &str) -> Option<Self> {
        let hex = hex.strip_prefix('#').unwrap_or(hex);
        if hex.len() != 6 || !hex.is_ascii() {
            return None;
        }
        let channel = |range: std::ops::Range<usize>| u8::from_str_radix(&hex[range], 16).ok();

        Some(Self::new(channel(0..2)?, channel(2..4)?, channel(4..6)?))
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:02X}{:02X}{:02X}", self.r, self.g, self.b)
    }
}

impl From<Color> for String {
    fn from(color: Color) -> Self {
        color.to_string()
    }
}

impl TryFrom<String> for Color {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Color::from_hex(&value).ok_or_else(|| format!("invalid color {value:?}"))
    }
}

/// Position on the page in percent of the viewport width and height.
#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq, Serialize)]
pub struct Position {
    pub left_vw: f32,
    pub top_vh: f32,
}

impl Position {
    pub const fn new(left_vw: f32, top_vh: f32) -> Self {
        Self { left_vw, top_vh }
    }
}

/// Image shown over the page in one of the overlay slots.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct OverlaySnapshot {
    pub slot: usize,
    pub source: String,
    pub position: Position,
}

/// State of a named page region.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct RegionSnapshot {
    pub id: String,
    pub active: bool,
}

/// Everything the page needs to render one frame.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct SceneSnapshot {
    pub regions: Vec<RegionSnapshot>,
    pub background: Color,
    pub overlays: Vec<OverlaySnapshot>,
    pub labels: Vec<String>,
    /// Label of the class that passed the confidence gate, if any.
    pub detected: Option<String>,
    /// Whether the webcam stream has to be flipped to match what the classifier sees.
    #[serde(default)]
    pub mirrored: bool,
}

impl SceneSnapshot {
    pub fn active_regions(&self) -> impl Iterator<Item = &str> {
        self.regions
            .iter()
            .filter(|region| region.active)
            .map(|region| region.id.as_str())
    }
}
