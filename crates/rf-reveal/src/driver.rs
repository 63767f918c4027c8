//! Spin Driver
//!
//! Owns the Idle → Resolving → Animating → Settled → Idle state machine.
//!
//! - `spin()` is fire-and-forget; outcomes are observed through the
//!   snapshot channel (`subscribe`) and the event stream (`events`)
//! - Triggers while a spin is in flight, while disabled, with an empty catalog
//!   or before layout is measurable are silent no-ops
//! - The settle timer, not any animation callback, decides when a spin ends
//! - `destroy()` (or dropping the engine) cancels the pending timer

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::runtime::Handle;
use tokio::sync::{broadcast, watch};

use crate::config::RevealConfig;
use crate::landing::{GeometryProvider, LandingCalculator, StripGeometry};
use crate::resolver::{
    FnResolver, OutcomeResolver, ResolutionSource, ResolverOutput, RewardResolver,
};
use crate::reward::{Reward, RewardCatalog};
use crate::session::{SessionId, SpinSession, SpinStatus};
use crate::speed::{SpeedSettings, SpinSpeed};
use crate::strip::RewardStrip;
use crate::surface::{NullSurface, StripSurface, drive_to_target};
use crate::RevealResult;

// ═══════════════════════════════════════════════════════════════════════════════
// OBSERVABLE STATE
// ═══════════════════════════════════════════════════════════════════════════════

/// Latest engine state, published on every change
#[derive(Debug, Clone, Default)]
pub struct RevealSnapshot {
    pub status: SpinStatus,
    /// Session in flight (Resolving / Animating)
    pub session_id: Option<SessionId>,
    pub speed: SpinSpeed,
    pub disabled: bool,
    /// Last settled reward, kept until cleared or the next spin
    pub settled_reward: Option<Reward>,
    pub target_slot_index: Option<usize>,
    pub target_offset: Option<f64>,
    pub duration: Option<Duration>,
}

/// Engine events
#[derive(Debug, Clone)]
pub enum RevealEvent {
    /// Status changed
    StatusChanged {
        session_id: SessionId,
        status: SpinStatus,
    },
    /// Spin finished on a reward
    Settled {
        session_id: SessionId,
        reward: Reward,
        index: usize,
        source: ResolutionSource,
    },
    /// Spin abandoned before it settled
    Cancelled { session_id: SessionId },
}

/// Why a trigger was ignored
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IgnoreReason {
    Destroyed,
    Disabled,
    EmptyCatalog,
    Busy,
    LayoutNotReady,
    LayoutUnusable,
    NoRuntime,
}

impl fmt::Display for IgnoreReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Destroyed => "engine destroyed",
            Self::Disabled => "trigger disabled",
            Self::EmptyCatalog => "catalog is empty",
            Self::Busy => "a spin is already in flight",
            Self::LayoutNotReady => "layout not measurable yet",
            Self::LayoutUnusable => "strip too short for the current layout",
            Self::NoRuntime => "no tokio runtime",
        };
        f.write_str(s)
    }
}

/// In-memory counters for the lifetime of one engine
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RevealStats {
    pub spins_accepted: u64,
    pub spins_settled: u64,
    pub spins_cancelled: u64,
    pub fallbacks: u64,
    pub triggers_ignored: u64,
}

impl RevealStats {
    /// Share of settled spins decided by the fallback draw (0.0 - 1.0)
    pub fn fallback_rate(&self) -> f64 {
        if self.spins_settled > 0 {
            self.fallbacks as f64 / self.spins_settled as f64
        } else {
            0.0
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// DRIVER STATE
// ═══════════════════════════════════════════════════════════════════════════════

struct DriverState {
    catalog: RewardCatalog,
    strip: Arc<RewardStrip>,
    status: SpinStatus,
    session: Option<SpinSession>,
    speed: SpinSpeed,
    disabled: bool,
    destroyed: bool,
    /// Where the next spin starts; every reset reads it from here
    rest_offset: f64,
    settled: Option<Reward>,
    next_session_id: SessionId,
    stats: RevealStats,
}

impl DriverState {
    fn is_current(&self, session_id: SessionId) -> bool {
        self.session.as_ref().is_some_and(|s| s.id == session_id)
    }

    fn snapshot(&self) -> RevealSnapshot {
        let session = self.session.as_ref();
        RevealSnapshot {
            status: self.status,
            session_id: session.map(|s| s.id),
            speed: self.speed,
            disabled: self.disabled,
            settled_reward: self.settled.clone(),
            target_slot_index: session.and_then(|s| s.target_slot_index),
            target_offset: session.and_then(|s| s.target_offset),
            duration: session.and_then(|s| s.duration),
        }
    }
}

struct EngineInner {
    config: RevealConfig,
    calculator: LandingCalculator,
    resolver: OutcomeResolver,
    geometry: Arc<dyn GeometryProvider>,
    surface: Arc<dyn StripSurface>,
    state: Mutex<DriverState>,
    snapshot_tx: watch::Sender<RevealSnapshot>,
    event_tx: broadcast::Sender<RevealEvent>,
    shutdown_tx: broadcast::Sender<()>,
}

impl EngineInner {
    fn publish(&self, state: &DriverState) {
        self.snapshot_tx.send_replace(state.snapshot());
    }

    fn emit(&self, event: RevealEvent) {
        let _ = self.event_tx.send(event);
    }

    fn set_status(&self, state: &mut DriverState, session_id: SessionId, status: SpinStatus) {
        log::debug!("Session {}: {:?} -> {:?}", session_id, state.status, status);
        state.status = status;
        self.publish(state);
        self.emit(RevealEvent::StatusChanged { session_id, status });
    }

    fn check_trigger(
        &self,
        state: &DriverState,
        geometry: Option<StripGeometry>,
    ) -> Result<StripGeometry, IgnoreReason> {
        if state.destroyed {
            return Err(IgnoreReason::Destroyed);
        }
        if state.disabled {
            return Err(IgnoreReason::Disabled);
        }
        if state.catalog.is_empty() {
            return Err(IgnoreReason::EmptyCatalog);
        }
        if state.status != SpinStatus::Idle {
            return Err(IgnoreReason::Busy);
        }
        let geometry = geometry.ok_or(IgnoreReason::LayoutNotReady)?;
        self.calculator
            .check_feasible(state.catalog.len(), state.strip.len(), &geometry)
            .map_err(|e| {
                log::warn!("[Reveal] Cannot land on current layout: {}", e);
                IgnoreReason::LayoutUnusable
            })?;
        Ok(geometry)
    }

    /// Recompute the rest offset for the current catalog on `geometry`
    fn refresh_rest_offset(&self, state: &mut DriverState, geometry: Option<&StripGeometry>) {
        let Some(geometry) = geometry else {
            return;
        };
        if state.catalog.is_empty() {
            return;
        }
        match self.calculator.rest_position(geometry, state.catalog.len()) {
            Ok((_, rest_offset)) => state.rest_offset = rest_offset,
            Err(e) => log::debug!("Rest offset unchanged: {}", e),
        }
    }

    fn try_spin(self: &Arc<Self>) -> Result<SessionId, IgnoreReason> {
        let Ok(runtime) = Handle::try_current() else {
            log::warn!("[Reveal] spin() called outside a tokio runtime, ignoring");
            self.state.lock().stats.triggers_ignored += 1;
            return Err(IgnoreReason::NoRuntime);
        };

        let measured = self.geometry.measure();
        let mut state = self.state.lock();
        let geometry = match self.check_trigger(&state, measured) {
            Ok(geometry) => geometry,
            Err(reason) => {
                log::debug!("Spin trigger ignored: {}", reason);
                state.stats.triggers_ignored += 1;
                return Err(reason);
            }
        };
        self.refresh_rest_offset(&mut state, Some(&geometry));

        let session_id = state.next_session_id;
        state.next_session_id += 1;
        state.session = Some(SpinSession::begin(session_id));
        state.settled = None;
        state.stats.spins_accepted += 1;
        self.set_status(&mut state, session_id, SpinStatus::Resolving);

        let catalog = state.catalog.clone();
        let strip = Arc::clone(&state.strip);
        drop(state);

        // Subscribe before spawning so a destroy() right after spin() is not missed
        let shutdown_rx = self.shutdown_tx.subscribe();
        let inner = Arc::clone(self);
        runtime.spawn(async move {
            inner
                .run_session(session_id, catalog, strip, geometry, shutdown_rx)
                .await;
        });
        Ok(session_id)
    }

    async fn run_session(
        self: Arc<Self>,
        session_id: SessionId,
        catalog: RewardCatalog,
        strip: Arc<RewardStrip>,
        geometry: StripGeometry,
        mut shutdown_rx: broadcast::Receiver<()>,
    ) {
        let resolution = tokio::select! {
            resolution = self.resolver.resolve(&catalog) => resolution,
            _ = shutdown_rx.recv() => return,
        };

        let duration = {
            let mut state = self.state.lock();
            if state.destroyed || !state.is_current(session_id) {
                log::debug!("Session {} no longer current after resolving", session_id);
                return;
            }

            let planned = resolution
                .ok_or_else(|| "empty catalog".to_string())
                .and_then(|r| {
                    self.calculator
                        .plan(r.index, catalog.len(), strip.len(), &geometry)
                        .map(|target| (r, target))
                        .map_err(|e| e.to_string())
                });
            let (resolution, target) = match planned {
                Ok(planned) => planned,
                Err(e) => {
                    log::error!("[Reveal] Session {} cannot land: {}", session_id, e);
                    self.cancel_session(&mut state, session_id);
                    return;
                }
            };

            // Captured now; later speed changes do not touch this spin
            let duration = self.config.duration_for(state.speed);
            if resolution.source.is_fallback() {
                state.stats.fallbacks += 1;
            }
            if let Some(session) = state.session.as_mut() {
                session.start_animation(&resolution, &target, duration);
            }
            drive_to_target(
                self.surface.as_ref(),
                state.rest_offset,
                target.target_offset,
                duration,
            );
            self.set_status(&mut state, session_id, SpinStatus::Animating);
            duration
        };

        tokio::select! {
            _ = tokio::time::sleep(duration) => {}
            _ = shutdown_rx.recv() => {
                log::debug!("Session {} torn down before settling", session_id);
                return;
            }
        }

        self.settle(session_id);
    }

    fn settle(&self, session_id: SessionId) {
        let mut state = self.state.lock();
        if state.destroyed || !state.is_current(session_id) {
            return;
        }
        let Some(session) = state.session.as_mut() else {
            return;
        };
        let Some(reward) = session.settle() else {
            return;
        };
        let index = session.winning_index.unwrap_or_default();
        let source = session
            .resolution_source
            .unwrap_or(ResolutionSource::Authoritative);

        log::info!(
            "Session {} settled on {} ({}) via {:?}",
            session_id,
            reward.name,
            reward.id,
            source
        );
        state.settled = Some(reward.clone());
        state.stats.spins_settled += 1;
        self.set_status(&mut state, session_id, SpinStatus::Settled);
        self.surface.settled(&reward);
        self.emit(RevealEvent::Settled {
            session_id,
            reward,
            index,
            source,
        });

        state.session = None;
        self.set_status(&mut state, session_id, SpinStatus::Idle);
    }

    fn cancel_session(&self, state: &mut DriverState, session_id: SessionId) {
        state.session = None;
        state.stats.spins_cancelled += 1;
        self.emit(RevealEvent::Cancelled { session_id });
        self.set_status(state, session_id, SpinStatus::Idle);
    }

    fn destroy(&self) {
        {
            let mut state = self.state.lock();
            if state.destroyed {
                return;
            }
            state.destroyed = true;
            if let Some(session_id) = state.session.as_ref().map(|s| s.id) {
                self.cancel_session(&mut state, session_id);
            }
        }
        let _ = self.shutdown_tx.send(());
        log::debug!("Reveal engine destroyed");
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// PUBLIC API
// ═══════════════════════════════════════════════════════════════════════════════

/// Narrow capability to trigger spins, separate from observation
#[derive(Clone)]
pub struct SpinHandle {
    inner: Arc<EngineInner>,
}

impl SpinHandle {
    /// Start a spin (no-op unless idle, enabled, non-empty and laid out)
    pub fn spin(&self) {
        let _ = self.inner.try_spin();
    }
}

/// Reward Reveal Engine
///
/// Must be driven from inside a tokio runtime. Dropping the engine destroys
/// it; outstanding [`SpinHandle`]s become inert.
pub struct RevealEngine {
    inner: Arc<EngineInner>,
}

impl RevealEngine {
    /// Start building an engine for `catalog`, measuring layout with `geometry`
    pub fn builder(
        catalog: RewardCatalog,
        geometry: impl GeometryProvider + 'static,
    ) -> RevealEngineBuilder {
        RevealEngineBuilder::new(catalog, Arc::new(geometry))
    }

    /// Capability handle for the trigger control
    pub fn handle(&self) -> SpinHandle {
        SpinHandle {
            inner: Arc::clone(&self.inner),
        }
    }

    /// Start a spin
    pub fn spin(&self) {
        let _ = self.inner.try_spin();
    }

    /// Start a spin, reporting why the trigger was ignored.
    ///
    /// Same effect as [`spin`](Self::spin); an `Err` means nothing happened.
    pub fn try_spin(&self) -> Result<SessionId, IgnoreReason> {
        self.inner.try_spin()
    }

    /// Watch the latest state
    pub fn subscribe(&self) -> watch::Receiver<RevealSnapshot> {
        self.inner.snapshot_tx.subscribe()
    }

    /// Event stream
    pub fn events(&self) -> broadcast::Receiver<RevealEvent> {
        self.inner.event_tx.subscribe()
    }

    pub fn snapshot(&self) -> RevealSnapshot {
        self.inner.state.lock().snapshot()
    }

    pub fn status(&self) -> SpinStatus {
        self.inner.state.lock().status
    }

    pub fn settled_reward(&self) -> Option<Reward> {
        self.inner.state.lock().settled.clone()
    }

    pub fn speed(&self) -> SpinSpeed {
        self.inner.state.lock().speed
    }

    pub fn speed_settings(&self) -> &SpeedSettings {
        &self.inner.config.speeds
    }

    pub fn config(&self) -> &RevealConfig {
        &self.inner.config
    }

    pub fn catalog(&self) -> RewardCatalog {
        self.inner.state.lock().catalog.clone()
    }

    /// Strip built from the current catalog
    pub fn strip(&self) -> Arc<RewardStrip> {
        Arc::clone(&self.inner.state.lock().strip)
    }

    /// Offset the next spin resets to before animating
    pub fn rest_offset(&self) -> f64 {
        self.inner.state.lock().rest_offset
    }

    pub fn stats(&self) -> RevealStats {
        self.inner.state.lock().stats.clone()
    }

    /// Select a speed; only accepted while idle and for an enabled speed
    pub fn set_speed(&self, speed: SpinSpeed) -> bool {
        let mut state = self.inner.state.lock();
        if state.destroyed || state.status != SpinStatus::Idle {
            log::debug!("Speed change to {} refused while {:?}", speed, state.status);
            return false;
        }
        if !self.inner.config.speeds.is_enabled(speed) {
            log::debug!("Speed {} is not enabled", speed);
            return false;
        }
        state.speed = speed;
        self.inner.publish(&state);
        true
    }

    pub fn set_disabled(&self, disabled: bool) {
        let mut state = self.inner.state.lock();
        state.disabled = disabled;
        self.inner.publish(&state);
    }

    /// Replace the catalog and rebuild the strip.
    ///
    /// A spin still resolving is cancelled; a spin already animating completes
    /// against the target it computed from the previous catalog.
    ///
    /// Fails (leaving the engine untouched) if the strip cannot be built.
    pub fn set_catalog(&self, catalog: RewardCatalog) -> RevealResult<()> {
        let strip = Arc::new(RewardStrip::build(
            &catalog,
            self.inner.config.repeat_factor,
        )?);
        let measured = self.inner.geometry.measure();

        let mut state = self.inner.state.lock();
        if state.catalog.same_as(&catalog) {
            return Ok(());
        }
        state.strip = strip;
        state.catalog = catalog;
        self.inner.refresh_rest_offset(&mut state, measured.as_ref());

        match state.status {
            SpinStatus::Resolving => {
                if let Some(session_id) = state.session.as_ref().map(|s| s.id) {
                    log::debug!(
                        "Catalog replaced while resolving, cancelling session {}",
                        session_id
                    );
                    self.inner.cancel_session(&mut state, session_id);
                }
            }
            SpinStatus::Animating => {
                log::debug!("Catalog replaced while animating, finishing current spin");
            }
            _ => {}
        }
        self.inner.publish(&state);
        Ok(())
    }

    /// Forget the settled reward shown by the presentation surface
    pub fn clear_settled(&self) {
        let mut state = self.inner.state.lock();
        state.settled = None;
        self.inner.publish(&state);
    }

    /// Tear down: cancel any pending settle and ignore future triggers
    pub fn destroy(&self) {
        self.inner.destroy();
    }

    pub fn is_destroyed(&self) -> bool {
        self.inner.state.lock().destroyed
    }
}

impl Drop for RevealEngine {
    fn drop(&mut self) {
        self.inner.destroy();
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// BUILDER
// ═══════════════════════════════════════════════════════════════════════════════

/// Builder for [`RevealEngine`]
pub struct RevealEngineBuilder {
    catalog: RewardCatalog,
    geometry: Arc<dyn GeometryProvider>,
    config: RevealConfig,
    resolver: Option<Arc<dyn RewardResolver>>,
    surface: Arc<dyn StripSurface>,
    disabled: bool,
}

impl RevealEngineBuilder {
    fn new(catalog: RewardCatalog, geometry: Arc<dyn GeometryProvider>) -> Self {
        Self {
            catalog,
            geometry,
            config: RevealConfig::default(),
            resolver: None,
            surface: Arc::new(NullSurface),
            disabled: false,
        }
    }

    pub fn config(mut self, config: RevealConfig) -> Self {
        self.config = config;
        self
    }

    /// External authority for the winning reward
    pub fn resolver(mut self, resolver: impl RewardResolver + 'static) -> Self {
        self.resolver = Some(Arc::new(resolver));
        self
    }

    /// External authority given as an async closure
    pub fn resolver_fn<F, Fut>(self, f: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = ResolverOutput> + Send + 'static,
    {
        self.resolver(FnResolver(f))
    }

    pub fn surface<S: StripSurface + 'static>(mut self, surface: Arc<S>) -> Self {
        self.surface = surface;
        self
    }

    pub fn disabled(mut self, disabled: bool) -> Self {
        self.disabled = disabled;
        self
    }

    pub fn build(self) -> RevealResult<RevealEngine> {
        self.config.validate()?;

        let mut resolver = OutcomeResolver::new()
            .with_timeout(self.config.resolver_timeout())
            .with_policy(self.config.fallback_policy);
        if let Some(seed) = self.config.seed {
            resolver = resolver.with_seed(seed);
        }
        if let Some(external) = self.resolver {
            resolver = resolver.with_resolver(external);
        }

        let strip = Arc::new(RewardStrip::build(&self.catalog, self.config.repeat_factor)?);
        let calculator = self.config.landing_calculator();
        let rest_offset = self
            .geometry
            .measure()
            .filter(|_| !self.catalog.is_empty())
            .and_then(|g| calculator.rest_position(&g, self.catalog.len()).ok())
            .map_or(0.0, |(_, offset)| offset);

        let state = DriverState {
            catalog: self.catalog,
            strip,
            status: SpinStatus::Idle,
            session: None,
            speed: self.config.initial_speed,
            disabled: self.disabled,
            destroyed: false,
            rest_offset,
            settled: None,
            next_session_id: 1,
            stats: RevealStats::default(),
        };

        let (snapshot_tx, _) = watch::channel(state.snapshot());
        let (event_tx, _) = broadcast::channel(64);
        let (shutdown_tx, _) = broadcast::channel(1);

        Ok(RevealEngine {
            inner: Arc::new(EngineInner {
                calculator,
                config: self.config,
                resolver,
                geometry: self.geometry,
                surface: self.surface,
                state: Mutex::new(state),
                snapshot_tx,
                event_tx,
                shutdown_tx,
            }),
        })
    }
}
