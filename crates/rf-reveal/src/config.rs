//! Reveal engine configuration

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::landing::LandingCalculator;
use crate::resolver::FallbackPolicy;
use crate::speed::{SpeedSettings, SpinSpeed};
use crate::{
    DEFAULT_BASE_DURATION_MS, DEFAULT_EXTRA_LOOPS, DEFAULT_REPEAT_FACTOR,
    DEFAULT_RESOLVER_TIMEOUT_MS, RevealError, RevealResult,
};

/// Upper bound on catalog copies laid out on the reel
pub const MAX_REPEAT_FACTOR: usize = 1024;

/// Upper bound on full catalog passes per spin
pub const MAX_EXTRA_LOOPS: usize = 256;

/// Engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RevealConfig {
    /// Catalog copies laid out on the reel
    pub repeat_factor: usize,

    /// Minimum full catalog passes per spin
    pub extra_loops: usize,

    /// Spin duration at 1× (ms)
    pub base_duration_ms: u64,

    /// Speed selected at construction
    pub initial_speed: SpinSpeed,

    /// Speeds offered by the selector
    pub speeds: SpeedSettings,

    /// Give up on the external resolver after this long (ms), `None` waits forever
    pub resolver_timeout_ms: Option<u64>,

    /// Fallback draw policy
    pub fallback_policy: FallbackPolicy,

    /// Seed for the fallback RNG (`None` = OS entropy)
    pub seed: Option<u64>,
}

impl RevealConfig {
    /// Storefront defaults
    pub fn standard() -> Self {
        Self {
            repeat_factor: DEFAULT_REPEAT_FACTOR,
            extra_loops: DEFAULT_EXTRA_LOOPS,
            base_duration_ms: DEFAULT_BASE_DURATION_MS,
            initial_speed: SpinSpeed::X1,
            speeds: SpeedSettings::all(),
            resolver_timeout_ms: Some(DEFAULT_RESOLVER_TIMEOUT_MS),
            fallback_policy: FallbackPolicy::Uniform,
            seed: None,
        }
    }

    /// Short spins for demos
    pub fn quick() -> Self {
        Self {
            base_duration_ms: 2000,
            ..Self::standard()
        }
    }

    /// Small reel and short, deterministic spins for tests
    pub fn testing() -> Self {
        Self {
            repeat_factor: 8,
            extra_loops: 2,
            base_duration_ms: 800,
            resolver_timeout_ms: Some(1000),
            seed: Some(0x5eed),
            ..Self::standard()
        }
    }

    /// Parse from JSON (missing fields take `standard()` values)
    pub fn from_json(json: &str) -> RevealResult<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a JSON file
    pub fn from_file(path: impl AsRef<Path>) -> RevealResult<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    pub fn to_json(&self) -> RevealResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Check internal consistency
    pub fn validate(&self) -> RevealResult<()> {
        if self.extra_loops == 0 {
            return Err(RevealError::InvalidConfig(
                "extra_loops must be at least 1".into(),
            ));
        }
        if self.extra_loops > MAX_EXTRA_LOOPS {
            return Err(RevealError::InvalidConfig(format!(
                "extra_loops ({}) exceeds {}",
                self.extra_loops, MAX_EXTRA_LOOPS
            )));
        }
        if self.repeat_factor > MAX_REPEAT_FACTOR {
            return Err(RevealError::InvalidConfig(format!(
                "repeat_factor ({}) exceeds {}",
                self.repeat_factor, MAX_REPEAT_FACTOR
            )));
        }
        if self.repeat_factor <= self.extra_loops + 1 {
            return Err(RevealError::InvalidConfig(format!(
                "repeat_factor ({}) must exceed extra_loops + 1 ({})",
                self.repeat_factor,
                self.extra_loops + 1
            )));
        }
        if self.base_duration_ms == 0 {
            return Err(RevealError::InvalidConfig(
                "base_duration_ms must be positive".into(),
            ));
        }
        if self.speeds.enabled.is_empty() {
            return Err(RevealError::InvalidConfig("no speeds enabled".into()));
        }
        if !self.speeds.is_enabled(self.initial_speed) {
            return Err(RevealError::InvalidConfig(format!(
                "initial speed {} is not enabled",
                self.initial_speed
            )));
        }
        if self.resolver_timeout_ms == Some(0) {
            return Err(RevealError::InvalidConfig(
                "resolver_timeout_ms must be positive when set".into(),
            ));
        }
        Ok(())
    }

    pub fn resolver_timeout(&self) -> Option<Duration> {
        self.resolver_timeout_ms.map(Duration::from_millis)
    }

    /// Duration of a spin at `speed`
    pub fn duration_for(&self, speed: SpinSpeed) -> Duration {
        speed.duration(self.base_duration_ms)
    }

    pub fn landing_calculator(&self) -> LandingCalculator {
        LandingCalculator::new(self.extra_loops)
    }
}

impl Default for RevealConfig {
    fn default() -> Self {
        Self::standard()
    }
}
