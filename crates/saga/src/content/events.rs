// Built-in event modules

use std::sync::Arc;

use async_trait::async_trait;
use saga_runtime::{EventBus, handler_fn};
use saga_types::{Event, names};

use crate::package::{EventModule, ModuleError};

/// Logs effect lifecycle transitions
pub struct EffectLog;

#[async_trait]
impl EventModule for EffectLog {
    async fn init(&self, bus: &Arc<EventBus>) -> Result<(), ModuleError> {
        let handler = handler_fn(|event| {
            match event {
                Event::EffectActivated { target, effect } => {
                    tracing::info!(target_id = %target, effect = %effect.name, "Effect started");
                }
                Event::EffectDeactivated {
                    target,
                    effect,
                    expired,
                } => {
                    tracing::info!(
                        target_id = %target,
                        effect = %effect.name,
                        expired,
                        "Effect ended"
                    );
                }
                _ => {}
            }
            Ok(None)
        });

        bus.subscribe(names::EFFECT_ACTIVATED, Arc::clone(&handler), 0);
        bus.subscribe(names::EFFECT_DEACTIVATED, handler, 0);
        Ok(())
    }
}

/// Logs system start and stop
pub struct SessionLog;

#[async_trait]
impl EventModule for SessionLog {
    async fn init(&self, bus: &Arc<EventBus>) -> Result<(), ModuleError> {
        bus.subscribe(
            names::SYSTEM_START,
            handler_fn(|event| {
                if let Event::SystemStart { started_at } = event {
                    tracing::info!(%started_at, "Session started");
                }
                Ok(None)
            }),
            0,
        );
        bus.subscribe(
            names::SYSTEM_STOP,
            handler_fn(|event| {
                if let Event::SystemStop { uptime_ms } = event {
                    tracing::info!(uptime_ms, "Session ended");
                }
                Ok(None)
            }),
            0,
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_modules_subscribe_their_events() {
        let bus = EventBus::new_shared();
        EffectLog.init(&bus).await.unwrap();
        SessionLog.init(&bus).await.unwrap();

        assert_eq!(bus.subscriber_count(names::EFFECT_ACTIVATED), 1);
        assert_eq!(bus.subscriber_count(names::EFFECT_DEACTIVATED), 1);
        assert!(bus.has_subscribers(names::SYSTEM_START));
        assert!(bus.has_subscribers(names::SYSTEM_STOP));

        bus.emit(Event::SystemStop { uptime_ms: 5 }).await;
    }
}
