//! Spin speed settings

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Selectable spin speed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SpinSpeed {
    /// Normal speed
    X1,
    /// Twice as fast
    X2,
    /// Four times as fast
    X4,
    /// Eight times as fast
    X8,
}

impl Default for SpinSpeed {
    fn default() -> Self {
        Self::X1
    }
}

impl SpinSpeed {
    /// All speeds, slowest first
    pub const ALL: [SpinSpeed; 4] = [Self::X1, Self::X2, Self::X4, Self::X8];

    /// Speed-up factor
    pub fn multiplier(self) -> u32 {
        match self {
            Self::X1 => 1,
            Self::X2 => 2,
            Self::X4 => 4,
            Self::X8 => 8,
        }
    }

    /// Label shown on the speed selector
    pub fn label(self) -> &'static str {
        match self {
            Self::X1 => "1x",
            Self::X2 => "2x",
            Self::X4 => "4x",
            Self::X8 => "8x",
        }
    }

    /// Parse a selector label ("2x", "4×", "8")
    pub fn from_label(label: &str) -> Option<Self> {
        let digits = label.trim().trim_end_matches(['x', 'X', '×']);
        match digits {
            "1" => Some(Self::X1),
            "2" => Some(Self::X2),
            "4" => Some(Self::X4),
            "8" => Some(Self::X8),
            _ => None,
        }
    }

    /// Animation duration for this speed given the 1× duration
    pub fn duration(self, base_duration_ms: u64) -> Duration {
        Duration::from_millis(base_duration_ms / u64::from(self.multiplier()))
    }
}

impl fmt::Display for SpinSpeed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Which speeds the selector offers, and whether it is shown at all
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpeedSettings {
    /// Speeds the user may pick
    pub enabled: Vec<SpinSpeed>,
    /// Show the selector (hidden selectors still honour the initial speed)
    pub visible: bool,
}

impl SpeedSettings {
    /// All four speeds, selector shown
    pub fn all() -> Self {
        Self {
            enabled: SpinSpeed::ALL.to_vec(),
            visible: true,
        }
    }

    /// A single fixed speed with the selector hidden
    pub fn fixed(speed: SpinSpeed) -> Self {
        Self {
            enabled: vec![speed],
            visible: false,
        }
    }

    pub fn is_enabled(&self, speed: SpinSpeed) -> bool {
        self.enabled.contains(&speed)
    }

    /// (label, duration) pairs for the enabled speeds
    pub fn options(&self, base_duration_ms: u64) -> Vec<(&'static str, Duration)> {
        self.enabled
            .iter()
            .map(|s| (s.label(), s.duration(base_duration_ms)))
            .collect()
    }
}

impl Default for SpeedSettings {
    fn default() -> Self {
        Self::all()
    }
}
