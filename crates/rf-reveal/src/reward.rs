//! Reward definitions and the immutable reward catalog

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

use crate::{RevealError, RevealResult};

// ═══════════════════════════════════════════════════════════════════════════════
// REWARD
// ═══════════════════════════════════════════════════════════════════════════════

/// Stable reward identifier, the equality key for matching resolver output
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RewardId(pub String);

impl RewardId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RewardId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RewardId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for RewardId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<u64> for RewardId {
    fn from(id: u64) -> Self {
        Self(id.to_string())
    }
}

/// Rarity tier, classified from the free-form tier label
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(u8)]
pub enum RewardTier {
    Common = 0,
    Uncommon = 1,
    Rare = 2,
    Epic = 3,
    Legendary = 4,
    /// Label not recognised
    Unknown = 255,
}

impl RewardTier {
    /// Classify a tier label (case-insensitive)
    pub fn from_label(label: &str) -> Self {
        match label.trim().to_ascii_lowercase().as_str() {
            "common" => Self::Common,
            "uncommon" => Self::Uncommon,
            "rare" => Self::Rare,
            "epic" => Self::Epic,
            "legendary" | "mythic" => Self::Legendary,
            _ => Self::Unknown,
        }
    }
}

/// A reward a user can win
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reward {
    /// Unique within a catalog
    pub id: RewardId,
    /// Display name
    pub name: String,
    /// Tier label as supplied (e.g. "common", "legendary")
    #[serde(default)]
    pub tier_label: String,
    /// Human-readable odds (e.g. "12.5%")
    #[serde(default)]
    pub display_odds: String,
    /// Human-readable value (e.g. "$24.99")
    #[serde(default)]
    pub display_value: String,
    /// Image reference for the presentation layer
    #[serde(default)]
    pub image_ref: String,
}

impl Reward {
    /// Create a reward with only id and name set
    pub fn new(id: impl Into<RewardId>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            tier_label: String::new(),
            display_odds: String::new(),
            display_value: String::new(),
            image_ref: String::new(),
        }
    }

    pub fn with_tier(mut self, tier_label: impl Into<String>) -> Self {
        self.tier_label = tier_label.into();
        self
    }

    pub fn with_odds(mut self, display_odds: impl Into<String>) -> Self {
        self.display_odds = display_odds.into();
        self
    }

    pub fn with_value(mut self, display_value: impl Into<String>) -> Self {
        self.display_value = display_value.into();
        self
    }

    pub fn with_image(mut self, image_ref: impl Into<String>) -> Self {
        self.image_ref = image_ref.into();
        self
    }

    /// Classified tier
    pub fn tier(&self) -> RewardTier {
        RewardTier::from_label(&self.tier_label)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// CATALOG GENERATION
// ═══════════════════════════════════════════════════════════════════════════════

static NEXT_CATALOG_GENERATION: AtomicU64 = AtomicU64::new(1);

#[inline]
fn next_generation() -> u64 {
    NEXT_CATALOG_GENERATION.fetch_add(1, Ordering::Relaxed)
}

// ═══════════════════════════════════════════════════════════════════════════════
// REWARD CATALOG
// ═══════════════════════════════════════════════════════════════════════════════

/// Ordered, immutable list of rewards.
///
/// Cloning shares the same rewards and generation. Each call to
/// [`RewardCatalog::new`] yields a fresh generation, which is how derived
/// data (the reel strip) detects that the caller replaced the catalog.
#[derive(Debug, Clone)]
pub struct RewardCatalog {
    rewards: Arc<[Reward]>,
    generation: u64,
}

impl RewardCatalog {
    /// Build a catalog, rejecting duplicate ids
    pub fn new(rewards: Vec<Reward>) -> RevealResult<Self> {
        let mut seen = HashSet::with_capacity(rewards.len());
        for reward in &rewards {
            if !seen.insert(&reward.id) {
                return Err(RevealError::DuplicateRewardId(reward.id.to_string()));
            }
        }

        Ok(Self {
            rewards: rewards.into(),
            generation: next_generation(),
        })
    }

    /// Catalog with no rewards (never spinnable)
    pub fn empty() -> Self {
        Self {
            rewards: Arc::from(Vec::new()),
            generation: next_generation(),
        }
    }

    /// Parse a JSON array of rewards
    pub fn from_json(json: &str) -> RevealResult<Self> {
        let rewards: Vec<Reward> = serde_json::from_str(json)?;
        Self::new(rewards)
    }

    pub fn len(&self) -> usize {
        self.rewards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rewards.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Reward> {
        self.rewards.get(index)
    }

    /// Catalog position of the reward with this id
    pub fn index_of(&self, id: &RewardId) -> Option<usize> {
        self.rewards.iter().position(|r| &r.id == id)
    }

    pub fn contains(&self, id: &RewardId) -> bool {
        self.index_of(id).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Reward> {
        self.rewards.iter()
    }

    pub fn rewards(&self) -> &[Reward] {
        &self.rewards
    }

    /// Identity of this catalog instance
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Same catalog instance (not merely equal contents)
    pub fn same_as(&self, other: &RewardCatalog) -> bool {
        self.generation == other.generation
    }
}

impl Default for RewardCatalog {
    fn default() -> Self {
        Self::empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn abc() -> Vec<Reward> {
        vec![
            Reward::new(1u64, "A").with_tier("common"),
            Reward::new(2u64, "B").with_tier("Rare"),
            Reward::new(3u64, "C").with_tier("legendary"),
        ]
    }

    #[test]
    fn test_catalog_lookup() {
        let catalog = RewardCatalog::new(abc()).unwrap();
        assert_eq!(catalog.len(), 3);
        assert_eq!(catalog.index_of(&RewardId::from(2u64)), Some(1));
        assert!(catalog.contains(&"3".into()));
        assert!(!catalog.contains(&"99".into()));
        assert_eq!(catalog.get(0).map(|r| r.name.as_str()), Some("A"));
    }

    #[test]
    fn test_duplicate_ids_rejected() {
        let mut rewards = abc();
        rewards.push(Reward::new(2u64, "B again"));
        let err = RewardCatalog::new(rewards).unwrap_err();
        assert!(matches!(err, RevealError::DuplicateRewardId(ref id) if id == "2"));
    }

    #[test]
    fn test_generation_identity() {
        let a = RewardCatalog::new(abc()).unwrap();
        let b = RewardCatalog::new(abc()).unwrap();
        let a2 = a.clone();
        assert!(a.same_as(&a2));
        assert!(!a.same_as(&b));
    }

    #[test]
    fn test_tier_classification() {
        let catalog = RewardCatalog::new(abc()).unwrap();
        let tiers: Vec<_> = catalog.iter().map(Reward::tier).collect();
        assert_eq!(
            tiers,
            vec![RewardTier::Common, RewardTier::Rare, RewardTier::Legendary]
        );
        assert_eq!(RewardTier::from_label("golden"), RewardTier::Unknown);
    }

    #[test]
    fn test_catalog_from_json() {
        let json = r#"[
            {"id": "sneakers", "name": "Sneakers", "tierLabel": "epic",
             "displayOdds": "2.5%", "displayValue": "$180", "imageRef": "img/sneakers.png"},
            {"id": "socks", "name": "Socks"}
        ]"#;
        let catalog = RewardCatalog::from_json(json).unwrap();
        assert_eq!(catalog.len(), 2);
        let first = catalog.get(0).unwrap();
        assert_eq!(first.display_odds, "2.5%");
        assert_eq!(first.tier(), RewardTier::Epic);
        assert_eq!(catalog.get(1).unwrap().display_value, "");
    }
}
