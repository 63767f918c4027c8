//! Outcome resolution
//!
//! Asks the optional external resolver which reward was won, validates the
//! answer against the catalog and falls back to a local draw on any failure.
//! Nothing the external resolver does (error, panic, stall, bogus id) escapes
//! this module.

use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures_util::FutureExt;
use futures_util::future::{self, BoxFuture};
use parking_lot::Mutex;
use rand::distr::Distribution;
use rand::distr::weighted::WeightedIndex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::reward::{Reward, RewardCatalog, RewardId};

// ═══════════════════════════════════════════════════════════════════════════════
// EXTERNAL RESOLVER
// ═══════════════════════════════════════════════════════════════════════════════

/// Error reported by an external resolver
#[derive(Debug, Clone, Error)]
pub enum ResolverError {
    #[error("Resolver failed: {0}")]
    Failed(String),

    #[error("Resolver unavailable")]
    Unavailable,
}

impl From<String> for ResolverError {
    fn from(msg: String) -> Self {
        Self::Failed(msg)
    }
}

impl From<&str> for ResolverError {
    fn from(msg: &str) -> Self {
        Self::Failed(msg.to_string())
    }
}

/// What an external resolver answers: a reward id, or `None` for "no opinion"
pub type ResolverOutput = Result<Option<RewardId>, ResolverError>;

/// Boxed future returned by [`RewardResolver::resolve`]
pub type ResolverFuture<'a> = BoxFuture<'a, ResolverOutput>;

/// External authority for the winning reward (typically a server-side draw)
pub trait RewardResolver: Send + Sync {
    fn resolve(&self) -> ResolverFuture<'_>;
}

/// Adapts an async closure into a [`RewardResolver`]
pub struct FnResolver<F>(pub F);

impl<F, Fut> RewardResolver for FnResolver<F>
where
    F: Fn() -> Fut + Send + Sync,
    Fut: Future<Output = ResolverOutput> + Send + 'static,
{
    fn resolve(&self) -> ResolverFuture<'_> {
        Box::pin((self.0)())
    }
}

/// Adapts a synchronous closure into a [`RewardResolver`]
pub struct SyncResolver<F>(pub F);

impl<F> RewardResolver for SyncResolver<F>
where
    F: Fn() -> ResolverOutput + Send + Sync,
{
    fn resolve(&self) -> ResolverFuture<'_> {
        Box::pin(future::lazy(move |_| (self.0)()))
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// RESOLUTION
// ═══════════════════════════════════════════════════════════════════════════════

/// Why the fallback draw was used
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FallbackReason {
    /// No external resolver configured
    NoResolver,
    /// Resolver answered with no reward
    Empty,
    /// Resolver returned an error
    Failed,
    /// Resolver panicked
    Panicked,
    /// Resolver did not answer in time
    TimedOut,
    /// Resolver named a reward that is not in the catalog
    UnknownReward,
}

impl fmt::Display for FallbackReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::NoResolver => "no resolver",
            Self::Empty => "empty answer",
            Self::Failed => "resolver error",
            Self::Panicked => "resolver panicked",
            Self::TimedOut => "resolver timed out",
            Self::UnknownReward => "unknown reward id",
        };
        f.write_str(s)
    }
}

/// Where the winning reward came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResolutionSource {
    /// External resolver answer, used as-is
    Authoritative,
    /// Local draw
    Fallback(FallbackReason),
}

impl ResolutionSource {
    pub fn is_fallback(&self) -> bool {
        matches!(self, Self::Fallback(_))
    }
}

/// The winning reward of one spin
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    /// Catalog index of the winner
    pub index: usize,
    pub reward: Reward,
    pub source: ResolutionSource,
}

/// How the fallback draw picks a reward
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum FallbackPolicy {
    /// Every catalog entry equally likely
    #[default]
    Uniform,
    /// Weighted by each reward's `display_odds`; uniform if any entry is unparseable
    DisplayOdds,
}

/// Parse human-readable odds ("12.5%", "1/20", "0.05") into a weight
pub fn parse_display_odds(odds: &str) -> Option<f64> {
    let odds = odds.trim();
    let weight = if let Some(pct) = odds.strip_suffix('%') {
        pct.trim().parse::<f64>().ok()? / 100.0
    } else if let Some((num, den)) = odds.split_once('/') {
        let num = num.trim().parse::<f64>().ok()?;
        let den = den.trim().parse::<f64>().ok()?;
        if den == 0.0 {
            return None;
        }
        num / den
    } else {
        odds.parse::<f64>().ok()?
    };

    (weight.is_finite() && weight >= 0.0).then_some(weight)
}

// ═══════════════════════════════════════════════════════════════════════════════
// OUTCOME RESOLVER
// ═══════════════════════════════════════════════════════════════════════════════

/// Resolves the winning reward for a spin
pub struct OutcomeResolver {
    resolver: Option<Arc<dyn RewardResolver>>,
    timeout: Option<Duration>,
    policy: FallbackPolicy,
    rng: Mutex<StdRng>,
}

impl OutcomeResolver {
    /// Local-only resolver seeded from the OS
    pub fn new() -> Self {
        Self {
            resolver: None,
            timeout: None,
            policy: FallbackPolicy::Uniform,
            rng: Mutex::new(StdRng::from_os_rng()),
        }
    }

    /// Use an external resolver
    pub fn with_resolver(mut self, resolver: Arc<dyn RewardResolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    /// Give up on the external resolver after `timeout`
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_policy(mut self, policy: FallbackPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Seed the fallback RNG for reproducible draws
    pub fn with_seed(self, seed: u64) -> Self {
        *self.rng.lock() = StdRng::seed_from_u64(seed);
        self
    }

    pub fn has_resolver(&self) -> bool {
        self.resolver.is_some()
    }

    pub fn policy(&self) -> FallbackPolicy {
        self.policy
    }

    /// Resolve the winner. `None` only for an empty catalog.
    pub async fn resolve(&self, catalog: &RewardCatalog) -> Option<Resolution> {
        if catalog.is_empty() {
            return None;
        }

        match self.query(catalog).await {
            Ok(index) => catalog.get(index).map(|reward| Resolution {
                index,
                reward: reward.clone(),
                source: ResolutionSource::Authoritative,
            }),
            Err(reason) => self.fallback(catalog, reason),
        }
    }

    /// Ask the external resolver; `Err` carries the reason to fall back
    async fn query(&self, catalog: &RewardCatalog) -> Result<usize, FallbackReason> {
        let Some(resolver) = self.resolver.as_ref() else {
            return Err(FallbackReason::NoResolver);
        };

        let call = AssertUnwindSafe(async move { resolver.resolve().await }).catch_unwind();
        let outcome = match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, call).await {
                Ok(outcome) => outcome,
                Err(_) => {
                    log::warn!("[Reveal] Resolver timed out after {:?}, using fallback", limit);
                    return Err(FallbackReason::TimedOut);
                }
            },
            None => call.await,
        };

        match outcome {
            Ok(Ok(Some(id))) => catalog.index_of(&id).ok_or_else(|| {
                log::warn!("[Reveal] Resolver returned unknown reward id {}, using fallback", id);
                FallbackReason::UnknownReward
            }),
            Ok(Ok(None)) => {
                log::warn!("[Reveal] Resolver returned no reward, using fallback");
                Err(FallbackReason::Empty)
            }
            Ok(Err(e)) => {
                log::warn!("[Reveal] {}, using fallback", e);
                Err(FallbackReason::Failed)
            }
            Err(_) => {
                log::error!("[Reveal] Resolver panicked, using fallback");
                Err(FallbackReason::Panicked)
            }
        }
    }

    /// Local draw according to the fallback policy
    pub fn fallback(&self, catalog: &RewardCatalog, reason: FallbackReason) -> Option<Resolution> {
        if catalog.is_empty() {
            return None;
        }

        let index = {
            let mut rng = self.rng.lock();
            match self.policy {
                FallbackPolicy::Uniform => rng.random_range(0..catalog.len()),
                FallbackPolicy::DisplayOdds => match odds_weights(catalog) {
                    Some(weights) => weights.sample(&mut *rng),
                    None => {
                        log::debug!("Display odds not usable as weights, drawing uniformly");
                        rng.random_range(0..catalog.len())
                    }
                },
            }
        };

        catalog.get(index).map(|reward| Resolution {
            index,
            reward: reward.clone(),
            source: ResolutionSource::Fallback(reason),
        })
    }
}

impl Default for OutcomeResolver {
    fn default() -> Self {
        Self::new()
    }
}

fn odds_weights(catalog: &RewardCatalog) -> Option<WeightedIndex<f64>> {
    let weights: Option<Vec<f64>> = catalog
        .iter()
        .map(|r| parse_display_odds(&r.display_odds))
        .collect();
    WeightedIndex::new(weights?).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn abc() -> RewardCatalog {
        RewardCatalog::new(vec![
            Reward::new(1u64, "A").with_odds("70%"),
            Reward::new(2u64, "B").with_odds("25%"),
            Reward::new(3u64, "C").with_odds("5%"),
        ])
        .unwrap()
    }

    fn answering(id: u64) -> Arc<dyn RewardResolver> {
        Arc::new(FnResolver(move || async move { Ok(Some(RewardId::from(id))) }))
    }

    #[test]
    fn test_parse_display_odds() {
        assert_relative_eq!(parse_display_odds("12.5%").unwrap(), 0.125);
        assert_relative_eq!(parse_display_odds(" 1/20 ").unwrap(), 0.05);
        assert_relative_eq!(parse_display_odds("0.3").unwrap(), 0.3);
        assert!(parse_display_odds("rare").is_none());
        assert!(parse_display_odds("1/0").is_none());
        assert!(parse_display_odds("-5%").is_none());
    }

    #[tokio::test]
    async fn test_authoritative_answer() {
        let resolver = OutcomeResolver::new().with_resolver(answering(2));
        let resolution = resolver.resolve(&abc()).await.unwrap();
        assert_eq!(resolution.index, 1);
        assert_eq!(resolution.reward.name, "B");
        assert_eq!(resolution.source, ResolutionSource::Authoritative);
    }

    #[tokio::test]
    async fn test_unknown_id_falls_back() {
        let resolver = OutcomeResolver::new().with_resolver(answering(99)).with_seed(1);
        let catalog = abc();
        for _ in 0..50 {
            let resolution = resolver.resolve(&catalog).await.unwrap();
            assert!(catalog.contains(&resolution.reward.id));
            assert_eq!(
                resolution.source,
                ResolutionSource::Fallback(FallbackReason::UnknownReward)
            );
        }
    }

    #[tokio::test]
    async fn test_error_and_empty_fall_back() {
        let failing = OutcomeResolver::new().with_resolver(Arc::new(SyncResolver(|| {
            Err(ResolverError::from("backend down"))
        })));
        let resolution = failing.resolve(&abc()).await.unwrap();
        assert_eq!(resolution.source, ResolutionSource::Fallback(FallbackReason::Failed));

        let empty = OutcomeResolver::new().with_resolver(Arc::new(SyncResolver(|| Ok(None))));
        let resolution = empty.resolve(&abc()).await.unwrap();
        assert_eq!(resolution.source, ResolutionSource::Fallback(FallbackReason::Empty));
    }

    #[tokio::test]
    async fn test_panicking_resolver_contained() {
        let resolver = OutcomeResolver::new().with_resolver(Arc::new(SyncResolver(
            || -> ResolverOutput { panic!("resolver bug") },
        )));
        let resolution = resolver.resolve(&abc()).await.unwrap();
        assert_eq!(resolution.source, ResolutionSource::Fallback(FallbackReason::Panicked));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stalled_resolver_times_out() {
        let stalled: Arc<dyn RewardResolver> = Arc::new(FnResolver(|| async {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(Some(RewardId::from(1u64)))
        }));
        let resolver = OutcomeResolver::new()
            .with_resolver(stalled)
            .with_timeout(Some(Duration::from_millis(500)));
        let resolution = resolver.resolve(&abc()).await.unwrap();
        assert_eq!(resolution.source, ResolutionSource::Fallback(FallbackReason::TimedOut));
    }

    #[tokio::test]
    async fn test_no_resolver_and_empty_catalog() {
        let resolver = OutcomeResolver::new();
        let resolution = resolver.resolve(&abc()).await.unwrap();
        assert_eq!(resolution.source, ResolutionSource::Fallback(FallbackReason::NoResolver));
        assert!(resolver.resolve(&RewardCatalog::empty()).await.is_none());
    }

    #[test]
    fn test_uniform_fallback_distribution() {
        let resolver = OutcomeResolver::new().with_seed(42);
        let catalog = abc();
        let mut counts = [0usize; 3];
        for _ in 0..3000 {
            let r = resolver.fallback(&catalog, FallbackReason::NoResolver).unwrap();
            counts[r.index] += 1;
        }
        for count in counts {
            assert!((800..=1200).contains(&count), "counts: {:?}", counts);
        }
    }

    #[test]
    fn test_display_odds_fallback_distribution() {
        let resolver = OutcomeResolver::new()
            .with_policy(FallbackPolicy::DisplayOdds)
            .with_seed(7);
        let catalog = abc();
        let mut counts = [0usize; 3];
        for _ in 0..4000 {
            let r = resolver.fallback(&catalog, FallbackReason::NoResolver).unwrap();
            counts[r.index] += 1;
        }
        assert!(counts[0] > counts[1] && counts[1] > counts[2], "counts: {:?}", counts);
    }

    #[test]
    fn test_display_odds_unparseable_degrades_to_uniform() {
        let catalog = RewardCatalog::new(vec![
            Reward::new("x", "X").with_odds("10%"),
            Reward::new("y", "Y").with_odds("very rare"),
        ])
        .unwrap();
        assert!(odds_weights(&catalog).is_none());
        let resolver = OutcomeResolver::new()
            .with_policy(FallbackPolicy::DisplayOdds)
            .with_seed(3);
        let mut seen = [false; 2];
        for _ in 0..200 {
            let r = resolver.fallback(&catalog, FallbackReason::Empty).unwrap();
            seen[r.index] = true;
        }
        assert_eq!(seen, [true, true]);
    }
}
