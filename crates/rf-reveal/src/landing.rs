//! Landing position math
//!
//! Converts a winning catalog index into the strip slot (and scroll offset)
//! that ends up centered under the fixed pointer.

use serde::{Deserialize, Serialize};

use crate::{RevealError, RevealResult};

/// Largest rest slot the landing math accepts
const MAX_REACHABLE_SLOT: f64 = (1u64 << 32) as f64;

// ═══════════════════════════════════════════════════════════════════════════════
// GEOMETRY
// ═══════════════════════════════════════════════════════════════════════════════

/// Measured strip layout, all values in the same unit (px, cells, ...)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StripGeometry {
    /// Width of one slot
    pub slot_width: f64,
    /// Gap between adjacent slots
    pub slot_gap: f64,
    /// Width of the visible viewport; the pointer sits at its middle
    pub container_width: f64,
    /// Left padding inside the container before slot 0
    pub padding_left: f64,
}

impl StripGeometry {
    pub fn new(slot_width: f64, slot_gap: f64, container_width: f64, padding_left: f64) -> Self {
        Self {
            slot_width,
            slot_gap,
            container_width,
            padding_left,
        }
    }

    /// Distance between the left edges of adjacent slots
    #[inline]
    pub fn pitch(&self) -> f64 {
        self.slot_width + self.slot_gap
    }

    /// Offset that shifts a slot's center from its natural place to the pointer
    #[inline]
    pub fn centering_correction(&self) -> f64 {
        self.container_width / 2.0 - self.padding_left - self.slot_width / 2.0
    }

    /// Reject layouts the landing math cannot use
    pub fn validate(&self) -> RevealResult<()> {
        let values = [
            self.slot_width,
            self.slot_gap,
            self.container_width,
            self.padding_left,
        ];
        if values.iter().any(|v| !v.is_finite()) {
            return Err(RevealError::InvalidGeometry("non-finite measurement".into()));
        }
        if self.slot_width <= 0.0 {
            return Err(RevealError::InvalidGeometry(format!(
                "slot width must be positive, got {}",
                self.slot_width
            )));
        }
        if self.slot_gap < 0.0 {
            return Err(RevealError::InvalidGeometry(format!(
                "slot gap must not be negative, got {}",
                self.slot_gap
            )));
        }
        if self.container_width <= 0.0 {
            return Err(RevealError::InvalidGeometry(format!(
                "container width must be positive, got {}",
                self.container_width
            )));
        }
        Ok(())
    }
}

/// Source of layout measurements, queried at spin time.
///
/// Returns `None` while the layout is not ready (e.g. not mounted yet).
pub trait GeometryProvider: Send + Sync {
    fn measure(&self) -> Option<StripGeometry>;
}

/// Geometry that never changes
#[derive(Debug, Clone, Copy)]
pub struct FixedGeometry(pub StripGeometry);

impl GeometryProvider for FixedGeometry {
    fn measure(&self) -> Option<StripGeometry> {
        Some(self.0)
    }
}

/// Layout that is never ready
#[derive(Debug, Clone, Copy, Default)]
pub struct UnmountedGeometry;

impl GeometryProvider for UnmountedGeometry {
    fn measure(&self) -> Option<StripGeometry> {
        None
    }
}

impl<F> GeometryProvider for F
where
    F: Fn() -> Option<StripGeometry> + Send + Sync,
{
    fn measure(&self) -> Option<StripGeometry> {
        self()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// LANDING CALCULATOR
// ═══════════════════════════════════════════════════════════════════════════════

/// Where one spin lands
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LandingTarget {
    /// Slot under the pointer at rest
    pub base_index: usize,
    /// Slot that will be under the pointer when the spin ends
    pub target_slot_index: usize,
    /// Strip offset that centers `target_slot_index` under the pointer
    pub target_offset: f64,
    /// Offset the strip starts from
    pub rest_offset: f64,
}

impl LandingTarget {
    /// Slots passed between rest and landing
    pub fn travel_slots(&self) -> usize {
        self.target_slot_index - self.base_index
    }

    /// Distance scrolled between rest and landing
    pub fn travel_distance(&self) -> f64 {
        self.target_offset - self.rest_offset
    }
}

/// Landing slot/offset calculator
#[derive(Debug, Clone, Copy)]
pub struct LandingCalculator {
    /// Minimum full catalog passes per spin
    pub extra_loops: usize,
}

impl LandingCalculator {
    pub fn new(extra_loops: usize) -> Self {
        Self { extra_loops }
    }

    /// Rest slot for a catalog of `catalog_len`.
    ///
    /// The first slot showing catalog entry 0 that can sit under the pointer
    /// without exposing empty space left of slot 0.
    pub fn base_index(&self, geometry: &StripGeometry, catalog_len: usize) -> RevealResult<usize> {
        if catalog_len == 0 {
            return Ok(0);
        }
        let first_reachable =
            (geometry.centering_correction().max(0.0) / geometry.pitch()).ceil();
        // `as usize` saturates, so anything past this bound would alias usize::MAX
        if !first_reachable.is_finite() || first_reachable >= MAX_REACHABLE_SLOT {
            return Err(RevealError::InvalidGeometry(format!(
                "pointer sits {} slots into the strip",
                first_reachable
            )));
        }
        (first_reachable as usize)
            .div_ceil(catalog_len)
            .checked_mul(catalog_len)
            .ok_or_else(|| RevealError::InvalidGeometry("rest slot out of range".into()))
    }

    /// Strip offset that centers `slot_index` under the pointer
    pub fn offset_for_slot(&self, geometry: &StripGeometry, slot_index: usize) -> f64 {
        slot_index as f64 * geometry.pitch() - geometry.centering_correction()
    }

    /// Rest position (slot and offset) every spin starts from
    pub fn rest_position(
        &self,
        geometry: &StripGeometry,
        catalog_len: usize,
    ) -> RevealResult<(usize, f64)> {
        geometry.validate()?;
        let base_index = self.base_index(geometry, catalog_len)?;
        Ok((base_index, self.offset_for_slot(geometry, base_index)))
    }

    /// Compute the landing target for a winning catalog index.
    ///
    /// `target = base + catalog_len × extra_loops + winning_index`, so every
    /// spin moves forward at least `extra_loops` whole passes of the catalog
    /// and the target slot always shows the winning reward.
    pub fn plan(
        &self,
        winning_index: usize,
        catalog_len: usize,
        strip_len: usize,
        geometry: &StripGeometry,
    ) -> RevealResult<LandingTarget> {
        if winning_index >= catalog_len {
            return Err(RevealError::IndexOutOfRange {
                index: winning_index,
                len: catalog_len,
            });
        }

        let (base_index, rest_offset) = self.rest_position(geometry, catalog_len)?;
        let target_slot_index = catalog_len
            .checked_mul(self.extra_loops)
            .and_then(|travel| travel.checked_add(base_index))
            .and_then(|slot| slot.checked_add(winning_index))
            .ok_or(RevealError::StripTooShort {
                target: usize::MAX,
                len: strip_len,
            })?;
        if target_slot_index >= strip_len {
            return Err(RevealError::StripTooShort {
                target: target_slot_index,
                len: strip_len,
            });
        }

        Ok(LandingTarget {
            base_index,
            target_slot_index,
            target_offset: self.offset_for_slot(geometry, target_slot_index),
            rest_offset,
        })
    }

    /// Check that every catalog index can land on this strip
    pub fn check_feasible(
        &self,
        catalog_len: usize,
        strip_len: usize,
        geometry: &StripGeometry,
    ) -> RevealResult<()> {
        if catalog_len == 0 {
            return Err(RevealError::IndexOutOfRange { index: 0, len: 0 });
        }
        self.plan(catalog_len - 1, catalog_len, strip_len, geometry)
            .map(|_| ())
    }
}

impl Default for LandingCalculator {
    fn default() -> Self {
        Self::new(crate::DEFAULT_EXTRA_LOOPS)
    }
}
