// Effect List - The set of effects currently applied to one target
//
// Stacking rules are enforced when an effect is added:
//   unique + refreshes  -> existing instance is refreshed, nothing new added
//   unique              -> rejected while an instance exists
//   max_stacks = n      -> rejected once n same-named instances exist
//
// Only live instances count toward these rules. Expired or ended effects stay
// in the list until cleanup() prunes them, but never block a new application.

use std::sync::Arc;

use parking_lot::Mutex;
use saga_types::EffectCategory;

use super::{Effect, EffectStatus, EffectTarget};
use crate::bus::EventBus;

/// Result of adding an effect to a list
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AddOutcome {
    /// The effect was added and activated
    Applied,
    /// An existing unique instance was refreshed instead
    Refreshed { id: String },
    Rejected(RejectReason),
}

impl AddOutcome {
    pub fn is_rejected(&self) -> bool {
        matches!(self, Self::Rejected(_))
    }
}

/// Why an effect was not added
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    /// A unique effect of this name is already present
    Duplicate,
    /// The stack limit for this name has been reached
    StackLimit,
    /// The effect could not be activated (it was already active elsewhere)
    ActivationFailed,
}

pub struct EffectList {
    owner: Arc<dyn EffectTarget>,
    bus: Option<Arc<EventBus>>,
    effects: Mutex<Vec<Effect>>,
}

impl EffectList {
    /// Create an empty list for `owner`
    pub fn new(owner: Arc<dyn EffectTarget>) -> Self {
        Self {
            owner,
            bus: None,
            effects: Mutex::new(Vec::new()),
        }
    }

    /// Publish effect lifecycle events on `bus`
    pub fn with_bus(mut self, bus: Arc<EventBus>) -> Self {
        self.bus = Some(bus);
        self
    }

    pub fn owner(&self) -> &Arc<dyn EffectTarget> {
        &self.owner
    }

    /// Add and activate an effect, applying the stacking rules
    pub async fn add(&self, effect: Effect) -> AddOutcome {
        let name = effect.name().to_string();
        let spec = effect.spec();

        {
            let mut effects = self.effects.lock();
            let existing: Vec<&Effect> = effects
                .iter()
                .filter(|e| e.name() == name && is_live(e))
                .collect();

            if spec.unique {
                if let Some(current) = existing.first() {
                    if spec.refreshes && current.refresh() {
                        let id = current.id().to_string();
                        tracing::debug!(effect = %name, id = %id, "Refreshed unique effect");
                        return AddOutcome::Refreshed { id };
                    }
                    tracing::debug!(effect = %name, "Rejected duplicate unique effect");
                    return AddOutcome::Rejected(RejectReason::Duplicate);
                }
            }

            if let Some(max) = spec.max_stacks {
                if existing.len() >= max {
                    tracing::debug!(effect = %name, max, "Rejected effect at stack limit");
                    return AddOutcome::Rejected(RejectReason::StackLimit);
                }
            }

            effects.push(effect.clone());
        }

        if let Err(e) = effect
            .activate(Arc::clone(&self.owner), self.bus.clone())
            .await
        {
            tracing::warn!(effect = %name, error = %e, "Effect activation failed");
            self.effects.lock().retain(|x| x.id() != effect.id());
            return AddOutcome::Rejected(RejectReason::ActivationFailed);
        }

        AddOutcome::Applied
    }

    /// Deactivate and remove an effect by id
    pub async fn remove(&self, id: &str) -> bool {
        let removed = {
            let mut effects = self.effects.lock();
            let Some(index) = effects.iter().position(|e| e.id() == id) else {
                return false;
            };
            effects.remove(index)
        };

        removed.deactivate().await;
        true
    }

    /// Deactivate and remove every effect with this name. Returns the count.
    pub async fn remove_by_name(&self, name: &str) -> usize {
        let removed: Vec<Effect> = {
            let mut effects = self.effects.lock();
            let (matching, rest) = std::mem::take(&mut *effects)
                .into_iter()
                .partition(|e| e.name() == name);
            *effects = rest;
            matching
        };

        for effect in &removed {
            effect.deactivate().await;
        }
        removed.len()
    }

    /// Drop every expired or ended effect. Returns how many were removed.
    pub fn cleanup(&self) -> usize {
        let mut effects = self.effects.lock();
        let before = effects.len();
        effects.retain(|e| !e.is_expired() && e.status() == EffectStatus::Active);
        let removed = before - effects.len();

        if removed > 0 {
            tracing::debug!(target_id = self.owner.target_id(), removed, "Cleaned up effects");
        }
        removed
    }

    /// Deactivate and remove all effects
    pub async fn clear(&self) {
        let removed = std::mem::take(&mut *self.effects.lock());
        for effect in &removed {
            effect.deactivate().await;
        }
    }

    pub fn pause_all(&self) {
        for effect in self.effects.lock().iter() {
            effect.pause();
        }
    }

    pub fn resume_all(&self) {
        for effect in self.effects.lock().iter() {
            effect.resume();
        }
    }

    pub fn get(&self, id: &str) -> Option<Effect> {
        self.effects.lock().iter().find(|e| e.id() == id).cloned()
    }

    /// First effect with this name
    pub fn find_by_name(&self, name: &str) -> Option<Effect> {
        self.effects.lock().iter().find(|e| e.name() == name).cloned()
    }

    pub fn has(&self, name: &str) -> bool {
        self.effects.lock().iter().any(|e| e.name() == name)
    }

    pub fn count_by_name(&self, name: &str) -> usize {
        self.effects.lock().iter().filter(|e| e.name() == name).count()
    }

    pub fn get_buffs(&self) -> Vec<Effect> {
        self.by_category(EffectCategory::Buff)
    }

    pub fn get_debuffs(&self) -> Vec<Effect> {
        self.by_category(EffectCategory::Debuff)
    }

    fn by_category(&self, category: EffectCategory) -> Vec<Effect> {
        self.effects
            .lock()
            .iter()
            .filter(|e| e.category() == category)
            .cloned()
            .collect()
    }

    /// All effects, in the order they were added
    pub fn all(&self) -> Vec<Effect> {
        self.effects.lock().clone()
    }

    /// Effects players should see
    pub fn visible(&self) -> Vec<Effect> {
        self.effects
            .lock()
            .iter()
            .filter(|e| !e.is_hidden())
            .cloned()
            .collect()
    }

    pub fn size(&self) -> usize {
        self.len()
    }

    pub fn len(&self) -> usize {
        self.effects.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.effects.lock().is_empty()
    }

    pub fn snapshots(&self) -> Vec<saga_types::EffectSnapshot> {
        self.effects.lock().iter().map(Effect::snapshot).collect()
    }
}

/// Active, or still being activated by a concurrent `add`, and not yet past
/// its duration
fn is_live(effect: &Effect) -> bool {
    matches!(effect.status(), EffectStatus::Active | EffectStatus::Inactive) && !effect.is_expired()
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::effect::tests::Dummy;
    use crate::effect::{poison, regeneration, EffectSpec};
    use saga_types::Attribute;
    use std::time::Duration;

    fn list_for(health: f64) -> (Arc<Dummy>, EffectList) {
        let target = Dummy::new(health);
        let list = EffectList::new(target.clone());
        (target, list)
    }

    #[tokio::test(start_paused = true)]
    async fn test_stack_limit_and_expiry() {
        let (_target, list) = list_for(100.0);

        for _ in 0..3 {
            assert_eq!(list.add(poison()).await, AddOutcome::Applied);
        }
        assert_eq!(
            list.add(poison()).await,
            AddOutcome::Rejected(RejectReason::StackLimit)
        );
        assert_eq!(list.size(), 3);
        assert_eq!(list.count_by_name("poison"), 3);

        tokio::time::sleep(Duration::from_millis(3100)).await;

        assert!(list.all().iter().all(Effect::is_expired));
        assert_eq!(list.cleanup(), 3);
        assert!(list.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stacked_poison_damage() {
        let (target, list) = list_for(100.0);
        for _ in 0..3 {
            list.add(poison()).await;
        }
        assert_eq!(target.attributes().get(Attribute::Health), 94.0);

        tokio::time::sleep(Duration::from_millis(2500)).await;
        assert_eq!(target.attributes().get(Attribute::Health), 82.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unique_refreshes_existing() {
        let (_target, list) = list_for(50.0);

        assert_eq!(list.add(regeneration()).await, AddOutcome::Applied);
        tokio::time::sleep(Duration::from_millis(2500)).await;
        let first = list.find_by_name("regeneration").unwrap();
        assert_eq!(first.elapsed(), Duration::from_millis(2000));

        let outcome = list.add(regeneration()).await;
        assert_eq!(
            outcome,
            AddOutcome::Refreshed {
                id: first.id().to_string()
            }
        );
        assert_eq!(list.size(), 1);
        assert_eq!(first.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_poison_lands_every_tick_before_expiry() {
        let (target, list) = list_for(100.0);
        assert_eq!(list.add(poison()).await, AddOutcome::Applied);

        tokio::time::sleep(Duration::from_millis(4000)).await;

        // Activation hit plus ticks at 1000, 2000 and 3000ms
        assert_eq!(target.attributes().get(Attribute::Health), 92.0);
        let effect = list.find_by_name("poison").unwrap();
        assert_eq!(effect.status(), EffectStatus::Expired);
        assert_eq!(effect.elapsed(), Duration::from_millis(3000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_reapplying_after_expiry_applies_fresh_instance() {
        let (target, list) = list_for(50.0);
        let spec = EffectSpec::new("ward")
            .unique(true)
            .refreshes(true)
            .with_duration(Duration::from_millis(2000))
            .with_tick_interval(Duration::from_millis(1000))
            .modifier(Attribute::Health, 1.0);

        assert_eq!(list.add(Effect::new(spec.clone())).await, AddOutcome::Applied);
        tokio::time::sleep(Duration::from_millis(2500)).await;
        let stale = list.find_by_name("ward").unwrap();
        assert_eq!(stale.status(), EffectStatus::Expired);
        assert_eq!(target.attributes().get(Attribute::Health), 53.0);

        assert_eq!(list.add(Effect::new(spec)).await, AddOutcome::Applied);
        assert_eq!(target.attributes().get(Attribute::Health), 54.0);
        assert!(stale.is_expired());

        assert_eq!(list.cleanup(), 1);
        let fresh = list.find_by_name("ward").unwrap();
        assert_ne!(fresh.id(), stale.id());
        assert!(fresh.is_active());

        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert_eq!(target.attributes().get(Attribute::Health), 55.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_stacks_do_not_count_toward_limit() {
        let (_target, list) = list_for(100.0);
        for _ in 0..3 {
            list.add(poison()).await;
        }
        tokio::time::sleep(Duration::from_millis(3100)).await;

        assert_eq!(list.add(poison()).await, AddOutcome::Applied);
        assert_eq!(list.cleanup(), 3);
        assert_eq!(list.count_by_name("poison"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_duration_effect_is_cleaned_up() {
        let (target, list) = list_for(100.0);
        let spec = EffectSpec::new("jolt")
            .with_duration(Duration::ZERO)
            .modifier(Attribute::Health, -1.0);

        assert_eq!(list.add(Effect::new(spec)).await, AddOutcome::Applied);
        tokio::time::sleep(Duration::from_millis(5500)).await;

        assert_eq!(target.attributes().get(Attribute::Health), 99.0);
        assert_eq!(list.cleanup(), 1);
        assert!(list.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_unique_without_refresh_rejects() {
        let (target, list) = list_for(100.0);
        let spec = EffectSpec::new("ward")
            .unique(true)
            .with_duration(Duration::from_secs(10))
            .modifier(Attribute::Defense, 5.0);

        assert_eq!(list.add(Effect::new(spec.clone())).await, AddOutcome::Applied);
        tokio::time::sleep(Duration::from_millis(1500)).await;
        let first = list.find_by_name("ward").unwrap();
        let elapsed = first.elapsed();
        let defense = target.attributes().get(Attribute::Defense);

        assert_eq!(
            list.add(Effect::new(spec)).await,
            AddOutcome::Rejected(RejectReason::Duplicate)
        );
        assert_eq!(list.size(), 1);
        assert_eq!(first.elapsed(), elapsed);
        assert_eq!(target.attributes().get(Attribute::Defense), defense);
    }

    #[tokio::test(start_paused = true)]
    async fn test_already_active_effect_is_rejected() {
        let (_a, first) = list_for(100.0);
        let (_b, second) = list_for(100.0);
        let effect = poison();

        assert_eq!(first.add(effect.clone()).await, AddOutcome::Applied);
        assert_eq!(
            second.add(effect).await,
            AddOutcome::Rejected(RejectReason::ActivationFailed)
        );
        assert!(second.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_pause_all_and_resume_all() {
        let (target, list) = list_for(50.0);
        list.add(poison()).await;
        list.add(regeneration()).await;

        list.pause_all();
        let health = target.attributes().get(Attribute::Health);
        tokio::time::sleep(Duration::from_millis(2500)).await;
        assert_eq!(target.attributes().get(Attribute::Health), health);
        assert!(list.all().iter().all(|e| e.elapsed() == Duration::ZERO));

        list.resume_all();
        assert_eq!(target.attributes().get(Attribute::Health), health);
        assert!(list.find_by_name("regeneration").unwrap().is_active());
    }

    #[tokio::test(start_paused = true)]
    async fn test_remove_and_queries() {
        let (_target, list) = list_for(100.0);
        list.add(poison()).await;
        list.add(poison()).await;
        list.add(regeneration()).await;

        assert_eq!(list.get_debuffs().len(), 2);
        assert_eq!(list.get_buffs().len(), 1);
        assert!(list.has("regeneration"));

        let regen = list.find_by_name("regeneration").unwrap();
        assert!(list.remove(regen.id()).await);
        assert!(!list.remove(regen.id()).await);
        assert_eq!(regen.status(), EffectStatus::Deactivated);

        assert_eq!(list.remove_by_name("poison").await, 2);
        assert!(list.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cleanup_keeps_live_effects() {
        let (_target, list) = list_for(100.0);
        list.add(poison()).await;
        list.add(regeneration()).await;

        tokio::time::sleep(Duration::from_millis(3100)).await;

        assert_eq!(list.cleanup(), 1);
        assert_eq!(list.size(), 1);
        assert!(list.has("regeneration"));

        list.clear().await;
        assert!(list.is_empty());
    }
}
