// Built-in reference effects

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use saga_types::{Attribute, EffectCategory};

use super::{Effect, EffectError, EffectHooks, EffectSpec, EffectTarget};

/// Damage over time: -2 health per second for 3 seconds, stacks up to 3
pub fn poison_spec() -> EffectSpec {
    EffectSpec::new("poison")
        .with_description("Deals damage over time")
        .category(EffectCategory::Debuff)
        .with_duration(Duration::from_millis(3000))
        .with_tick_interval(Duration::from_millis(1000))
        .modifier(Attribute::Health, -2.0)
        .max_stacks(3)
        .refreshes(true)
}

/// Heal over time: +1 health per second for a minute, one instance per target
pub fn regeneration_spec() -> EffectSpec {
    EffectSpec::new("regeneration")
        .with_description("Restores health over time")
        .category(EffectCategory::Buff)
        .with_duration(Duration::from_secs(60))
        .with_tick_interval(Duration::from_millis(1000))
        .modifier(Attribute::Health, 1.0)
        .unique(true)
        .refreshes(true)
}

pub fn poison() -> Effect {
    Effect::with_hooks(poison_spec(), Arc::new(LoggingHooks))
}

pub fn regeneration() -> Effect {
    Effect::with_hooks(regeneration_spec(), Arc::new(LoggingHooks))
}

/// Build a built-in effect by name
pub fn builtin_effect(name: &str) -> Option<Effect> {
    match name {
        "poison" => Some(poison()),
        "regeneration" => Some(regeneration()),
        _ => None,
    }
}

/// Hooks that trace each lifecycle step
struct LoggingHooks;

#[async_trait]
impl EffectHooks for LoggingHooks {
    async fn on_activate(
        &self,
        effect: &Effect,
        target: &dyn EffectTarget,
    ) -> Result<(), EffectError> {
        tracing::info!(effect = effect.name(), target_id = target.target_id(), "Effect applied");
        Ok(())
    }

    async fn on_tick(
        &self,
        effect: &Effect,
        target: &dyn EffectTarget,
    ) -> Result<(), EffectError> {
        tracing::trace!(
            effect = effect.name(),
            target_id = target.target_id(),
            health = target.attributes().get(Attribute::Health),
            "Effect tick"
        );
        Ok(())
    }

    async fn on_deactivate(
        &self,
        effect: &Effect,
        target: &dyn EffectTarget,
    ) -> Result<(), EffectError> {
        tracing::info!(effect = effect.name(), target_id = target.target_id(), "Effect wore off");
        Ok(())
    }
}
