//! Reel strip built from the reward catalog

use serde::{Deserialize, Serialize};

use crate::reward::{Reward, RewardCatalog};
use crate::{RevealError, RevealResult};

/// Most slots a strip may hold
pub const MAX_STRIP_SLOTS: usize = 1 << 24;

/// One positional occurrence of a reward on the reel
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StripSlot {
    /// Position in the full repeated sequence
    pub slot_index: usize,
    /// Catalog index this slot was copied from
    pub source_reward_index: usize,
    /// Unique key disambiguating repeats (`"{reward_id}#{repeat}"`)
    pub key: String,
}

/// A materialized reel strip
///
/// Derived data: rebuilt whole whenever the catalog changes, never patched.
#[derive(Debug, Clone, Default)]
pub struct RewardStrip {
    slots: Vec<StripSlot>,
    catalog_len: usize,
    catalog_generation: u64,
}

impl RewardStrip {
    /// Lay out `repeat_factor` copies of the catalog, slot `k` showing reward `k mod n`
    pub fn build(catalog: &RewardCatalog, repeat_factor: usize) -> RevealResult<Self> {
        let n = catalog.len();
        let total = n
            .checked_mul(repeat_factor)
            .filter(|&total| total <= MAX_STRIP_SLOTS)
            .ok_or(RevealError::StripTooLong {
                catalog_len: n,
                repeat_factor,
            })?;
        let mut slots = Vec::with_capacity(total);

        for repeat in 0..repeat_factor {
            for (source_reward_index, reward) in catalog.iter().enumerate() {
                slots.push(StripSlot {
                    slot_index: repeat * n + source_reward_index,
                    source_reward_index,
                    key: format!("{}#{}", reward.id, repeat),
                });
            }
        }

        Ok(Self {
            slots,
            catalog_len: n,
            catalog_generation: catalog.generation(),
        })
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn slots(&self) -> &[StripSlot] {
        &self.slots
    }

    pub fn slot(&self, slot_index: usize) -> Option<&StripSlot> {
        self.slots.get(slot_index)
    }

    /// Number of catalog entries per repeat
    pub fn catalog_len(&self) -> usize {
        self.catalog_len
    }

    /// Generation of the catalog this strip was built from
    pub fn catalog_generation(&self) -> u64 {
        self.catalog_generation
    }

    /// Whether this strip still matches the given catalog instance
    pub fn is_built_from(&self, catalog: &RewardCatalog) -> bool {
        self.catalog_generation == catalog.generation()
    }

    /// Reward shown in a slot
    pub fn reward_at<'a>(
        &self,
        catalog: &'a RewardCatalog,
        slot_index: usize,
    ) -> Option<&'a Reward> {
        if !self.is_built_from(catalog) {
            return None;
        }
        self.slot(slot_index)
            .and_then(|slot| catalog.get(slot.source_reward_index))
    }
}
