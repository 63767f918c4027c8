//! # rf-reveal — Reward Reveal Engine
//!
//! Resolves which reward a mystery box produced and drives a slot-style reel
//! so the fixed pointer lands exactly on that reward.
//!
//! ## Features
//!
//! - **Strip Builder**: Expands the reward catalog into a long repeated reel
//! - **Outcome Resolver**: Optional external authority with random fallback
//! - **Landing Calculator**: Slot index and scroll offset under the pointer
//! - **Spin Driver**: Idle → Resolving → Animating → Settled state machine
//! - **Speed Settings**: 1× / 2× / 4× / 8× durations, locked while spinning
//!
//! ## Architecture
//!
//! ```text
//! RewardCatalog ──> RewardStrip (n × repeat_factor slots)
//!       │
//!       v
//! SpinHandle::spin()
//!       │
//!       ├── OutcomeResolver (external resolver | fallback draw)
//!       ├── LandingCalculator (GeometryProvider → LandingTarget)
//!       └── StripSurface (reset → flush → animate)
//!             │
//!             v
//!       settle timer → RevealEvent::Settled
//! ```

pub mod config;
pub mod driver;
pub mod landing;
pub mod resolver;
pub mod reward;
pub mod session;
pub mod speed;
pub mod strip;
pub mod surface;

pub use config::*;
pub use driver::*;
pub use landing::*;
pub use resolver::*;
pub use reward::*;
pub use session::*;
pub use speed::*;
pub use strip::*;
pub use surface::*;

use thiserror::Error;

/// Reveal engine error types
#[derive(Debug, Error)]
pub enum RevealError {
    #[error("Duplicate reward id in catalog: {0}")]
    DuplicateRewardId(String),

    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    #[error("Invalid geometry: {0}")]
    InvalidGeometry(String),

    #[error("Strip too short: target slot {target} but strip has {len} slots")]
    StripTooShort { target: usize, len: usize },

    #[error("Strip of {catalog_len} rewards x {repeat_factor} copies is too long")]
    StripTooLong {
        catalog_len: usize,
        repeat_factor: usize,
    },

    #[error("Reward index {index} out of range for catalog of {len}")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("JSON parse error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type RevealResult<T> = Result<T, RevealError>;

/// Default number of catalog copies laid out on the reel
pub const DEFAULT_REPEAT_FACTOR: usize = 16;

/// Default minimum number of full catalog passes per spin
pub const DEFAULT_EXTRA_LOOPS: usize = 3;

/// Default 1× spin duration (ms)
pub const DEFAULT_BASE_DURATION_MS: u64 = 6000;

/// Default timeout for the external resolver (ms)
pub const DEFAULT_RESOLVER_TIMEOUT_MS: u64 = 10_000;
