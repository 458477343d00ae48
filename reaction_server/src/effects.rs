//! Static table of presentation effects per detected class.
//!
use std::{fmt, str::FromStr};

use common::protocol::{Color, Position};

/// Background while no class passes the confidence gate.
pub const DEFAULT_BACKGROUND: Color = Color::new(0xFF, 0x00, 0x00);

/// Background while a class passes the confidence gate.
pub const ACTIVE_BACKGROUND: Color = Color::new(0x03, 0xD5, 0x03);

/// Minimum probability before any effect fires.
pub const DEFAULT_THRESHOLD: f64 = 0.9;

/// Every page region the engine toggles. All of them are cleared on each frame.
pub const KNOWN_REGIONS: [&str; 5] = ["name", "occupation", "date", "location", "websites"];

/// Number of overlay images shown per activation.
pub const OVERLAY_SLOTS: usize = 2;

/// Classes the page reacts to, in the order of the classifier output.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum ClassSlot {
    Name,
    Date,
    Location,
    Websites,
}

impl ClassSlot {
    pub const ALL: [ClassSlot; 4] = [
        ClassSlot::Name,
        ClassSlot::Date,
        ClassSlot::Location,
        ClassSlot::Websites,
    ];

    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn effect(self) -> &'static EffectDescriptor {
        &EFFECTS[self.index()]
    }
}

/// Image shown when a class is detected, with its position for the fixed placement policy.
#[derive(Debug)]
pub struct OverlayImage {
    pub source: &'static str,
    pub fixed_position: Position,
}

/// Everything that changes on the page while a class is active.
#[derive(Debug)]
pub struct EffectDescriptor {
    pub regions: &'static [&'static str],
    pub background: Color,
    pub overlays: [OverlayImage; OVERLAY_SLOTS],
}

/// Effects indexed by [`ClassSlot::index`].
pub static EFFECTS: [EffectDescriptor; 4] = [
    EffectDescriptor {
        regions: &["name", "occupation"],
        background: ACTIVE_BACKGROUND,
        overlays: [
            OverlayImage {
                source: "img/tiri_1.jpg",
                fixed_position: Position::new(16.0, 22.0),
            },
            OverlayImage {
                source: "img/tiri_2.jpg",
                fixed_position: Position::new(88.0, 72.0),
            },
        ],
    },
    EffectDescriptor {
        regions: &["date"],
        background: ACTIVE_BACKGROUND,
        overlays: [
            OverlayImage {
                source: "img/morakana_cumulus.png",
                fixed_position: Position::new(15.0, 18.0),
            },
            OverlayImage {
                source: "img/morakana_deeptalking.jpg",
                fixed_position: Position::new(88.0, 20.0),
            },
        ],
    },
    EffectDescriptor {
        regions: &["location"],
        background: ACTIVE_BACKGROUND,
        overlays: [
            OverlayImage {
                source: "img/tiri_oracle1.jpg",
                fixed_position: Position::new(20.0, 78.0),
            },
            OverlayImage {
                source: "img/tiri_oracle2.jpg",
                fixed_position: Position::new(80.0, 75.0),
            },
        ],
    },
    EffectDescriptor {
        regions: &["websites"],
        background: ACTIVE_BACKGROUND,
        overlays: [
            OverlayImage {
                source: "img/website_1.png",
                fixed_position: Position::new(12.0, 50.0),
            },
            OverlayImage {
                source: "img/website_2.png",
                fixed_position: Position::new(88.0, 35.0),
            },
        ],
    },
];

/// Where overlay images go when a class is activated.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum OverlayPolicy {
    /// Positions from the effect table.
    #[default]
    Fixed,
    /// Positions resampled on every activation, avoiding the center of the viewport.
    Randomized,
    /// No overlays at all.
    Disabled,
}

impl FromStr for OverlayPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "fixed" => Ok(OverlayPolicy::Fixed),
            "randomized" | "random" => Ok(OverlayPolicy::Randomized),
            "none" | "disabled" => Ok(OverlayPolicy::Disabled),
            other => Err(format!(
                "unknown overlay policy {other:?}, expected one of fixed, randomized, none"
            )),
        }
    }
}

impl fmt::Display for OverlayPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OverlayPolicy::Fixed => "fixed",
            OverlayPolicy::Randomized => "randomized",
            OverlayPolicy::Disabled => "none",
        };
        f.write_str(name)
    }
}
