//! Timed Effects
//!
//! An [`Effect`] is a timed attribute modifier with a small lifecycle:
//!
//! ```text
//! Inactive ──activate──▶ Active ──expiry timer──▶ Expired
//!                           └──────deactivate───▶ Deactivated
//! ```
//!
//! Activation applies every modifier once, starts a periodic ticker and, for
//! finite durations, arms a one-shot expiry timer. The two timers are
//! independent tokio tasks: pausing stops the ticker but the expiry clock keeps
//! running.
//!
//! Effects operate on anything implementing [`EffectTarget`]. Targets are
//! shared with other code, so all writes go through the target's
//! [`AttributeSheet`], which clamps every value into `[0, 100]`.

mod builtin;
mod list;

pub use builtin::*;
pub use list::*;

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Weak};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use saga_types::{
    Attribute, AttributeSheet, EffectCategory, EffectSnapshot, Event, ModifierSnapshot,
    PERMANENT_SENTINEL,
};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::bus::EventBus;

/// Tick period used when an effect does not set one
pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_millis(1000);

const MIN_TICK_INTERVAL: Duration = Duration::from_millis(1);

// ─────────────────────────────────────────────────────────────────────────────
// Supporting Types
// ─────────────────────────────────────────────────────────────────────────────

/// How long an effect lasts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EffectDuration {
    Finite(Duration),
    Permanent,
}

impl EffectDuration {
    pub fn from_millis(ms: u64) -> Self {
        Self::Finite(Duration::from_millis(ms))
    }

    pub fn is_permanent(&self) -> bool {
        matches!(self, Self::Permanent)
    }

    /// Milliseconds, or [`PERMANENT_SENTINEL`]
    pub fn as_millis_or_sentinel(&self) -> i64 {
        match self {
            Self::Finite(d) => i64::try_from(d.as_millis()).unwrap_or(i64::MAX),
            Self::Permanent => PERMANENT_SENTINEL,
        }
    }

    /// A finite, non-zero duration; the only kind that arms an expiry timer
    fn expiring(&self) -> Option<Duration> {
        match self {
            Self::Finite(d) if !d.is_zero() => Some(*d),
            _ => None,
        }
    }

    /// A zero duration: the effect lands once and expires on activation
    fn is_instant(&self) -> bool {
        matches!(self, Self::Finite(d) if d.is_zero())
    }
}

/// When modifiers land on the target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ModifierApplication {
    /// Once on activation and again in full on every tick (damage/heal over time)
    #[default]
    EveryTick,
    /// Once on activation only (flat stat changes)
    Once,
}

/// Lifecycle state of an effect
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EffectStatus {
    Inactive,
    Active,
    Expired,
    Deactivated,
}

/// Errors raised by effects
#[derive(Debug, Clone, thiserror::Error)]
pub enum EffectError {
    #[error("Effect '{0}' has already been activated")]
    AlreadyActivated(String),

    #[error("Effect hook failed: {0}")]
    Hook(String),
}

/// Anything effects can be applied to
pub trait EffectTarget: Send + Sync + 'static {
    /// Identifier used in lifecycle events
    fn target_id(&self) -> &str;

    fn attributes(&self) -> &AttributeSheet;
}

/// Optional lifecycle callbacks for an effect
#[async_trait]
pub trait EffectHooks: Send + Sync + 'static {
    async fn on_activate(
        &self,
        _effect: &Effect,
        _target: &dyn EffectTarget,
    ) -> Result<(), EffectError> {
        Ok(())
    }

    async fn on_tick(
        &self,
        _effect: &Effect,
        _target: &dyn EffectTarget,
    ) -> Result<(), EffectError> {
        Ok(())
    }

    async fn on_deactivate(
        &self,
        _effect: &Effect,
        _target: &dyn EffectTarget,
    ) -> Result<(), EffectError> {
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Effect Specification
// ─────────────────────────────────────────────────────────────────────────────

/// Static description of an effect
#[derive(Debug, Clone)]
pub struct EffectSpec {
    pub name: String,
    pub description: String,
    pub duration: EffectDuration,
    pub category: EffectCategory,
    /// Hidden effects are not shown to players
    pub hidden: bool,
    /// Cap on same-named instances in one list
    pub max_stacks: Option<usize>,
    /// Reapplying a unique effect refreshes the existing instance
    pub refreshes: bool,
    /// At most one same-named instance per list
    pub unique: bool,
    pub tick_interval: Duration,
    pub modifiers: Vec<(Attribute, f64)>,
    pub application: ModifierApplication,
    /// Undo the net change this effect applied when it ends
    pub revert_on_deactivate: bool,
}

impl EffectSpec {
    /// Create a permanent, neutral effect with no modifiers
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            duration: EffectDuration::Permanent,
            category: EffectCategory::Neutral,
            hidden: false,
            max_stacks: None,
            refreshes: false,
            unique: false,
            tick_interval: DEFAULT_TICK_INTERVAL,
            modifiers: Vec::new(),
            application: ModifierApplication::EveryTick,
            revert_on_deactivate: false,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = EffectDuration::Finite(duration);
        self
    }

    pub fn permanent(mut self) -> Self {
        self.duration = EffectDuration::Permanent;
        self
    }

    pub fn category(mut self, category: EffectCategory) -> Self {
        self.category = category;
        self
    }

    pub fn hidden(mut self, hidden: bool) -> Self {
        self.hidden = hidden;
        self
    }

    pub fn max_stacks(mut self, max: usize) -> Self {
        self.max_stacks = Some(max);
        self
    }

    pub fn refreshes(mut self, refreshes: bool) -> Self {
        self.refreshes = refreshes;
        self
    }

    pub fn unique(mut self, unique: bool) -> Self {
        self.unique = unique;
        self
    }

    /// Set the tick period (at least 1ms)
    pub fn with_tick_interval(mut self, interval: Duration) -> Self {
        self.tick_interval = interval.max(MIN_TICK_INTERVAL);
        self
    }

    /// Add a signed attribute delta
    pub fn modifier(mut self, attribute: Attribute, delta: f64) -> Self {
        self.modifiers.push((attribute, delta));
        self
    }

    pub fn application(mut self, application: ModifierApplication) -> Self {
        self.application = application;
        self
    }

    pub fn revert_on_deactivate(mut self, revert: bool) -> Self {
        self.revert_on_deactivate = revert;
        self
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Effect
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Clone, Copy, PartialEq, Eq)]
enum Timer {
    Ticker,
    Expiry,
}

tokio::task_local! {
    /// Set inside timer tasks so an effect never aborts the task it runs on
    static CURRENT_TIMER: (usize, Timer);
}

#[derive(Clone, Copy)]
enum HookStage {
    Activate,
    Tick,
    Deactivate,
}

struct EffectState {
    status: EffectStatus,
    elapsed: Duration,
    paused: bool,
    target: Option<Arc<dyn EffectTarget>>,
    bus: Option<Arc<EventBus>>,
    /// Net change that actually landed on the target, per attribute
    applied: BTreeMap<Attribute, f64>,
    ticker: Option<JoinHandle<()>>,
    ticker_generation: u64,
    /// Deadline of the next scheduled tick that has not run yet
    next_tick: Option<Instant>,
    expiry: Option<JoinHandle<()>>,
    expiry_generation: u64,
}

struct EffectInner {
    id: String,
    spec: EffectSpec,
    hooks: Option<Arc<dyn EffectHooks>>,
    state: Mutex<EffectState>,
}

/// A shareable handle to one effect instance.
///
/// Clones refer to the same instance.
#[derive(Clone)]
pub struct Effect {
    inner: Arc<EffectInner>,
}

impl Effect {
    /// Create a detached effect
    pub fn new(spec: EffectSpec) -> Self {
        Self::build(spec, None)
    }

    /// Create a detached effect with lifecycle hooks
    pub fn with_hooks(spec: EffectSpec, hooks: Arc<dyn EffectHooks>) -> Self {
        Self::build(spec, Some(hooks))
    }

    fn build(spec: EffectSpec, hooks: Option<Arc<dyn EffectHooks>>) -> Self {
        Self {
            inner: Arc::new(EffectInner {
                id: uuid::Uuid::new_v4().to_string(),
                spec,
                hooks,
                state: Mutex::new(EffectState {
                    status: EffectStatus::Inactive,
                    elapsed: Duration::ZERO,
                    paused: false,
                    target: None,
                    bus: None,
                    applied: BTreeMap::new(),
                    ticker: None,
                    ticker_generation: 0,
                    next_tick: None,
                    expiry: None,
                    expiry_generation: 0,
                }),
            }),
        }
    }

    pub fn id(&self) -> &str {
        &self.inner.id
    }

    pub fn name(&self) -> &str {
        &self.inner.spec.name
    }

    pub fn spec(&self) -> &EffectSpec {
        &self.inner.spec
    }

    pub fn category(&self) -> EffectCategory {
        self.inner.spec.category
    }

    pub fn is_hidden(&self) -> bool {
        self.inner.spec.hidden
    }

    pub fn status(&self) -> EffectStatus {
        self.inner.state.lock().status
    }

    pub fn is_active(&self) -> bool {
        self.status() == EffectStatus::Active
    }

    pub fn is_paused(&self) -> bool {
        self.inner.state.lock().paused
    }

    pub fn elapsed(&self) -> Duration {
        self.inner.state.lock().elapsed
    }

    /// Id of the bound target, once activated
    pub fn target_id(&self) -> Option<String> {
        self.inner
            .state
            .lock()
            .target
            .as_ref()
            .map(|t| t.target_id().to_string())
    }

    /// True once a finite effect has run for its whole duration or its
    /// expiry timer has fired
    pub fn is_expired(&self) -> bool {
        let state = self.inner.state.lock();
        match self.inner.spec.duration {
            EffectDuration::Finite(duration) => {
                state.status == EffectStatus::Expired || state.elapsed >= duration
            }
            EffectDuration::Permanent => false,
        }
    }

    /// Time left before expiry
    pub fn remaining_time(&self) -> EffectDuration {
        match self.inner.spec.duration {
            EffectDuration::Finite(duration) => {
                EffectDuration::Finite(duration.saturating_sub(self.elapsed()))
            }
            EffectDuration::Permanent => EffectDuration::Permanent,
        }
    }

    // ── Lifecycle ───────────────────────────────────────────────────────────

    /// Bind to `target`, apply modifiers once and start the timers.
    ///
    /// A zero-duration effect expires as soon as it has been applied.
    /// Lifecycle events go to `bus` when one is given.
    pub async fn activate(
        &self,
        target: Arc<dyn EffectTarget>,
        bus: Option<Arc<EventBus>>,
    ) -> Result<(), EffectError> {
        {
            let mut state = self.inner.state.lock();
            if state.status != EffectStatus::Inactive {
                return Err(EffectError::AlreadyActivated(self.inner.id.clone()));
            }

            state.status = EffectStatus::Active;
            state.elapsed = Duration::ZERO;
            state.paused = false;
            state.target = Some(Arc::clone(&target));
            state.bus = bus.clone();

            self.apply_modifiers(&mut state, target.as_ref());
            if !self.inner.spec.duration.is_instant() {
                self.start_ticker(&mut state);
            }
            if let Some(duration) = self.inner.spec.duration.expiring() {
                self.arm_expiry(&mut state, duration);
            }
        }

        tracing::debug!(
            effect = %self.inner.spec.name,
            id = %self.inner.id,
            target_id = target.target_id(),
            "Effect activated"
        );

        self.run_hook(HookStage::Activate, target.as_ref()).await;
        if let Some(bus) = bus {
            bus.emit(Event::EffectActivated {
                target: target.target_id().to_string(),
                effect: self.snapshot(),
            })
            .await;
        }

        if self.inner.spec.duration.is_instant() {
            self.finish(true, None).await;
        }
        Ok(())
    }

    /// End the effect. Returns `false` if it was not active.
    pub async fn deactivate(&self) -> bool {
        self.finish(false, None).await
    }

    /// Advance by one tick interval and re-apply modifiers.
    ///
    /// Does nothing unless active and unpaused. A finite effect never ticks
    /// past its duration.
    pub async fn tick(&self) -> bool {
        self.advance(None).await
    }

    /// Run one tick. `scheduled` is the ticker deadline being served; only
    /// the first caller to claim a deadline runs it.
    async fn advance(&self, scheduled: Option<Instant>) -> bool {
        let period = self.inner.spec.tick_interval.max(MIN_TICK_INTERVAL);
        let (target, bus) = {
            let mut state = self.inner.state.lock();
            if state.status != EffectStatus::Active || state.paused {
                return false;
            }
            if let Some(at) = scheduled {
                if state.next_tick != Some(at) {
                    return false;
                }
                state.next_tick = Some(at + period);
            }
            if let EffectDuration::Finite(duration) = self.inner.spec.duration {
                if state.elapsed + period > duration {
                    return false;
                }
            }
            let Some(target) = state.target.clone() else {
                return false;
            };

            state.elapsed += period;
            if self.inner.spec.application == ModifierApplication::EveryTick {
                self.apply_modifiers(&mut state, target.as_ref());
            }
            (target, state.bus.clone())
        };

        self.run_hook(HookStage::Tick, target.as_ref()).await;
        if let Some(bus) = bus {
            bus.emit(Event::EffectTick {
                target: target.target_id().to_string(),
                effect: self.snapshot(),
            })
            .await;
        }
        true
    }

    /// Stop ticking. The expiry timer keeps running.
    pub fn pause(&self) -> bool {
        let mut state = self.inner.state.lock();
        if state.status != EffectStatus::Active || state.paused {
            return false;
        }
        state.paused = true;
        state.ticker_generation += 1;
        state.next_tick = None;
        let ticker = state.ticker.take();
        self.cancel(ticker, Timer::Ticker);
        true
    }

    /// Restart ticking from the current elapsed time without re-applying
    /// modifiers
    pub fn resume(&self) -> bool {
        let mut state = self.inner.state.lock();
        if state.status != EffectStatus::Active || !state.paused {
            return false;
        }
        state.paused = false;
        self.start_ticker(&mut state);
        true
    }

    /// Reset elapsed time to zero and re-arm the expiry timer for the full
    /// duration. Modifiers are not re-applied.
    ///
    /// Returns `false` (and changes nothing) unless the effect is active.
    pub fn refresh(&self) -> bool {
        let mut state = self.inner.state.lock();
        if state.status != EffectStatus::Active {
            return false;
        }
        state.elapsed = Duration::ZERO;

        if let Some(duration) = self.inner.spec.duration.expiring() {
            let expiry = state.expiry.take();
            self.cancel(expiry, Timer::Expiry);
            self.arm_expiry(&mut state, duration);
        }

        tracing::debug!(effect = %self.inner.spec.name, id = %self.inner.id, "Effect refreshed");
        true
    }

    // ── Serialization ───────────────────────────────────────────────────────

    pub fn snapshot(&self) -> EffectSnapshot {
        let spec = &self.inner.spec;
        let elapsed = self.elapsed();
        let remaining = match spec.duration {
            EffectDuration::Finite(duration) => {
                EffectDuration::Finite(duration.saturating_sub(elapsed))
            }
            EffectDuration::Permanent => EffectDuration::Permanent,
        };

        EffectSnapshot {
            id: self.inner.id.clone(),
            name: spec.name.clone(),
            description: spec.description.clone(),
            category: spec.category,
            duration: spec.duration.as_millis_or_sentinel(),
            remaining: remaining.as_millis_or_sentinel(),
            elapsed: u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
            modifiers: spec
                .modifiers
                .iter()
                .map(|(attribute, value)| ModifierSnapshot {
                    attribute: *attribute,
                    value: *value,
                })
                .collect(),
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self.snapshot()).unwrap_or(serde_json::Value::Null)
    }

    // ── Internals ───────────────────────────────────────────────────────────

    fn apply_modifiers(&self, state: &mut EffectState, target: &dyn EffectTarget) {
        for (attribute, delta) in &self.inner.spec.modifiers {
            let landed = target.attributes().adjust(*attribute, *delta);
            *state.applied.entry(*attribute).or_insert(0.0) += landed;
        }
    }

    fn revert_modifiers(&self, state: &mut EffectState, target: &dyn EffectTarget) {
        for (attribute, landed) in std::mem::take(&mut state.applied) {
            target.attributes().adjust(attribute, -landed);
        }
    }

    fn timer_key(&self) -> usize {
        Arc::as_ptr(&self.inner) as usize
    }

    fn running_on(&self, timer: Timer) -> bool {
        let key = self.timer_key();
        CURRENT_TIMER
            .try_with(|(owner, current)| *owner == key && *current == timer)
            .unwrap_or(false)
    }

    /// Abort a timer task unless we are running on it; a timer that is not
    /// aborted exits on its own once its generation is stale.
    fn cancel(&self, handle: Option<JoinHandle<()>>, timer: Timer) {
        if let Some(handle) = handle {
            if !self.running_on(timer) {
                handle.abort();
            }
        }
    }

    fn start_ticker(&self, state: &mut EffectState) {
        state.ticker_generation += 1;
        let generation = state.ticker_generation;
        let period = self.inner.spec.tick_interval.max(MIN_TICK_INTERVAL);
        let start = Instant::now() + period;
        state.next_tick = Some(start);
        let weak = Arc::downgrade(&self.inner);

        let task = CURRENT_TIMER.scope((self.timer_key(), Timer::Ticker), async move {
            let mut interval = tokio::time::interval_at(start, period);
            loop {
                let at = interval.tick().await;
                let Some(effect) = upgrade(&weak) else {
                    break;
                };
                if effect.inner.state.lock().ticker_generation != generation {
                    break;
                }
                effect.advance(Some(at)).await;
            }
        });
        state.ticker = Some(tokio::spawn(task));
    }

    fn arm_expiry(&self, state: &mut EffectState, duration: Duration) {
        state.expiry_generation += 1;
        let generation = state.expiry_generation;
        let weak = Arc::downgrade(&self.inner);

        let task = CURRENT_TIMER.scope((self.timer_key(), Timer::Expiry), async move {
            tokio::time::sleep(duration).await;
            if let Some(effect) = upgrade(&weak) {
                // A tick due at this same instant lands before the effect ends
                let due = {
                    let state = effect.inner.state.lock();
                    state.next_tick.filter(|_| state.expiry_generation == generation)
                };
                if due.is_some_and(|at| at <= Instant::now()) {
                    effect.advance(due).await;
                }
                effect.finish(true, Some(generation)).await;
            }
        });
        state.expiry = Some(tokio::spawn(task));
    }

    async fn finish(&self, expired: bool, expiry_generation: Option<u64>) -> bool {
        let (target, bus) = {
            let mut state = self.inner.state.lock();
            if state.status != EffectStatus::Active {
                return false;
            }
            if expiry_generation.is_some_and(|g| g != state.expiry_generation) {
                return false;
            }

            state.status = if expired {
                EffectStatus::Expired
            } else {
                EffectStatus::Deactivated
            };

            state.ticker_generation += 1;
            state.next_tick = None;
            state.expiry_generation += 1;
            let ticker = state.ticker.take();
            let expiry = state.expiry.take();
            self.cancel(ticker, Timer::Ticker);
            self.cancel(expiry, Timer::Expiry);

            let Some(target) = state.target.clone() else {
                return false;
            };
            if self.inner.spec.revert_on_deactivate {
                self.revert_modifiers(&mut state, target.as_ref());
            }
            (target, state.bus.clone())
        };

        tracing::debug!(
            effect = %self.inner.spec.name,
            id = %self.inner.id,
            target_id = target.target_id(),
            expired,
            "Effect deactivated"
        );

        self.run_hook(HookStage::Deactivate, target.as_ref()).await;
        if let Some(bus) = bus {
            bus.emit(Event::EffectDeactivated {
                target: target.target_id().to_string(),
                effect: self.snapshot(),
                expired,
            })
            .await;
        }
        true
    }

    async fn run_hook(&self, stage: HookStage, target: &dyn EffectTarget) {
        let Some(hooks) = &self.inner.hooks else {
            return;
        };

        let result = match stage {
            HookStage::Activate => hooks.on_activate(self, target).await,
            HookStage::Tick => hooks.on_tick(self, target).await,
            HookStage::Deactivate => hooks.on_deactivate(self, target).await,
        };

        if let Err(e) = result {
            tracing::warn!(
                effect = %self.inner.spec.name,
                id = %self.inner.id,
                error = %e,
                "Effect hook failed"
            );
        }
    }
}

fn upgrade(weak: &Weak<EffectInner>) -> Option<Effect> {
    weak.upgrade().map(|inner| Effect { inner })
}

impl fmt::Debug for Effect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Effect")
            .field("id", &self.inner.id)
            .field("name", &self.inner.spec.name)
            .field("status", &self.status())
            .field("elapsed", &self.elapsed())
            .finish()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
