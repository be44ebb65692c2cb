//! Event Bus
//!
//! Priority-ordered publish/subscribe. Events are dispatched sequentially:
//! first every wildcard (`"*"`) handler in registration order, then the
//! handlers registered for the event's name, highest priority first with ties
//! broken by registration order. Each handler is awaited before the next one
//! runs, so the side effects of one emission happen in a fixed total order.
//!
//! A handler that returns an error or panics is logged and skipped; the rest
//! of the chain still runs.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use futures::FutureExt;
use parking_lot::RwLock;
use saga_types::{Event, names};

// ─────────────────────────────────────────────────────────────────────────────
// Handler
// ─────────────────────────────────────────────────────────────────────────────

/// Error produced by an event handler
#[derive(Debug, Clone, thiserror::Error)]
pub enum HandlerError {
    #[error("{0}")]
    Failed(String),

    #[error("Handler panicked: {0}")]
    Panicked(String),
}

impl HandlerError {
    /// Create a failure with a message
    pub fn new(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }
}

/// Result of a single handler invocation.
///
/// `Some(value)` is collected by [`EventBus::emit_collecting`]; `None` and
/// `Some(Value::Null)` are treated as "no result".
pub type HandlerResult = Result<Option<serde_json::Value>, HandlerError>;

/// Something that reacts to bus events
#[async_trait]
pub trait EventHandler: Send + Sync + 'static {
    async fn handle(&self, event: &Event) -> HandlerResult;
}

/// Handler backed by a synchronous closure
pub struct FnHandler<F>
where
    F: Fn(&Event) -> HandlerResult + Send + Sync + 'static,
{
    func: F,
}

#[async_trait]
impl<F> EventHandler for FnHandler<F>
where
    F: Fn(&Event) -> HandlerResult + Send + Sync + 'static,
{
    async fn handle(&self, event: &Event) -> HandlerResult {
        (self.func)(event)
    }
}

/// Handler backed by a closure returning a future.
///
/// The closure receives an owned copy of the event so the returned future can
/// outlive the dispatch borrow.
pub struct AsyncFnHandler<F> {
    func: F,
}

#[async_trait]
impl<F, Fut> EventHandler for AsyncFnHandler<F>
where
    F: Fn(Event) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    async fn handle(&self, event: &Event) -> HandlerResult {
        (self.func)(event.clone()).await
    }
}

/// Wrap a synchronous closure as a shareable handler
pub fn handler_fn<F>(func: F) -> Arc<dyn EventHandler>
where
    F: Fn(&Event) -> HandlerResult + Send + Sync + 'static,
{
    Arc::new(FnHandler { func })
}

/// Wrap an async closure as a shareable handler
pub fn handler_async<F, Fut>(func: F) -> Arc<dyn EventHandler>
where
    F: Fn(Event) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    Arc::new(AsyncFnHandler { func })
}

fn same_handler(a: &Arc<dyn EventHandler>, b: &Arc<dyn EventHandler>) -> bool {
    // Compare data pointers only; vtable pointers are not guaranteed unique.
    std::ptr::eq(
        Arc::as_ptr(a) as *const (),
        Arc::as_ptr(b) as *const (),
    )
}

// ─────────────────────────────────────────────────────────────────────────────
// Subscription
// ─────────────────────────────────────────────────────────────────────────────

/// Identifier returned by every subscribe call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

#[derive(Clone)]
struct Subscription {
    id: SubscriptionId,
    handler: Arc<dyn EventHandler>,
    priority: i32,
    once: bool,
}

// ─────────────────────────────────────────────────────────────────────────────
// Event Bus
// ─────────────────────────────────────────────────────────────────────────────

/// Shared publish/subscribe hub.
///
/// Create one per system and pass it around as `Arc<EventBus>`.
pub struct EventBus {
    /// Event name -> subscriptions in dispatch order
    subscriptions: RwLock<HashMap<String, Vec<Subscription>>>,

    /// Monotonic id source; doubles as registration order
    next_id: AtomicU64,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    /// Create an empty bus
    pub fn new() -> Self {
        Self {
            subscriptions: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Create a new bus wrapped in an Arc
    pub fn new_shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Register a handler for an event name.
    ///
    /// Registering the same handler twice makes it fire twice. `priority` is
    /// ignored for wildcard subscriptions, which always run in registration
    /// order.
    pub fn subscribe(
        &self,
        event: &str,
        handler: Arc<dyn EventHandler>,
        priority: i32,
    ) -> SubscriptionId {
        self.insert(event, handler, priority, false)
    }

    /// Register a handler that removes itself after its first invocation
    pub fn subscribe_once(
        &self,
        event: &str,
        handler: Arc<dyn EventHandler>,
        priority: i32,
    ) -> SubscriptionId {
        self.insert(event, handler, priority, true)
    }

    fn insert(
        &self,
        event: &str,
        handler: Arc<dyn EventHandler>,
        priority: i32,
        once: bool,
    ) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let subscription = Subscription {
            id,
            handler,
            priority,
            once,
        };

        let mut subscriptions = self.subscriptions.write();
        let list = subscriptions.entry(event.to_string()).or_default();

        if event == names::WILDCARD {
            list.push(subscription);
        } else {
            // Stable insert: after every peer with priority >= ours
            let pos = list
                .iter()
                .position(|s| s.priority < priority)
                .unwrap_or(list.len());
            list.insert(pos, subscription);
        }

        tracing::trace!(event, %id, priority, once, "Subscribed");
        id
    }

    /// Remove the first registration of `handler` for `event`.
    ///
    /// Returns `false` if it was not registered.
    pub fn unsubscribe(&self, event: &str, handler: &Arc<dyn EventHandler>) -> bool {
        let mut subscriptions = self.subscriptions.write();
        let Some(list) = subscriptions.get_mut(event) else {
            return false;
        };

        let Some(pos) = list.iter().position(|s| same_handler(&s.handler, handler)) else {
            return false;
        };
        list.remove(pos);

        if list.is_empty() {
            subscriptions.remove(event);
        }
        true
    }

    /// Remove a registration by the id returned from `subscribe`
    pub fn unsubscribe_id(&self, id: SubscriptionId) -> bool {
        let mut subscriptions = self.subscriptions.write();
        Self::remove_by_id(&mut subscriptions, id)
    }

    fn remove_by_id(
        subscriptions: &mut HashMap<String, Vec<Subscription>>,
        id: SubscriptionId,
    ) -> bool {
        let mut emptied = None;
        let mut found = false;

        for (name, list) in subscriptions.iter_mut() {
            if let Some(pos) = list.iter().position(|s| s.id == id) {
                list.remove(pos);
                found = true;
                if list.is_empty() {
                    emptied = Some(name.clone());
                }
                break;
            }
        }

        if let Some(name) = emptied {
            subscriptions.remove(&name);
        }
        found
    }

    /// Publish an event and wait for every handler to settle
    pub async fn emit(&self, event: Event) {
        self.dispatch(&event, false).await;
    }

    /// Publish an event and collect the non-empty results of the handlers
    /// registered for its name (wildcard handlers never contribute).
    pub async fn emit_collecting(&self, event: Event) -> Vec<serde_json::Value> {
        self.dispatch(&event, true).await
    }

    async fn dispatch(&self, event: &Event, collect: bool) -> Vec<serde_json::Value> {
        let name = event.name();
        let (wildcards, specific) = {
            let subscriptions = self.subscriptions.read();
            let wildcards = subscriptions
                .get(names::WILDCARD)
                .cloned()
                .unwrap_or_default();
            let specific = if name == names::WILDCARD {
                Vec::new()
            } else {
                subscriptions.get(name.as_ref()).cloned().unwrap_or_default()
            };
            (wildcards, specific)
        };

        tracing::trace!(
            event = %name,
            wildcard = wildcards.len(),
            handlers = specific.len(),
            "Dispatching event"
        );

        for subscription in &wildcards {
            if self.claim(subscription) {
                let _ = self.invoke(subscription, event, &name).await;
            }
        }

        let mut results = Vec::new();
        for subscription in &specific {
            if !self.claim(subscription) {
                continue;
            }
            if let Some(value) = self.invoke(subscription, event, &name).await {
                if collect && !value.is_null() {
                    results.push(value);
                }
            }
        }

        results
    }

    /// Once-subscriptions are removed before they run; if another dispatch got
    /// there first the handler is skipped.
    fn claim(&self, subscription: &Subscription) -> bool {
        if !subscription.once {
            return true;
        }
        let mut subscriptions = self.subscriptions.write();
        Self::remove_by_id(&mut subscriptions, subscription.id)
    }

    async fn invoke(
        &self,
        subscription: &Subscription,
        event: &Event,
        name: &str,
    ) -> Option<serde_json::Value> {
        let outcome = AssertUnwindSafe(subscription.handler.handle(event))
            .catch_unwind()
            .await
            .unwrap_or_else(|panic| Err(HandlerError::Panicked(panic_message(panic.as_ref()))));

        match outcome {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!(
                    event = %name,
                    subscription = %subscription.id,
                    error = %e,
                    "Event handler failed"
                );
                None
            }
        }
    }

    /// Whether anything is registered for exactly this name
    pub fn has_subscribers(&self, event: &str) -> bool {
        self.subscriptions
            .read()
            .get(event)
            .is_some_and(|list| !list.is_empty())
    }

    /// Number of registrations for exactly this name
    pub fn subscriber_count(&self, event: &str) -> usize {
        self.subscriptions.read().get(event).map_or(0, Vec::len)
    }

    /// All event names with at least one registration, sorted
    pub fn event_names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.subscriptions.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Drop every registration
    pub fn clear(&self) {
        self.subscriptions.write().clear();
    }
}

pub(crate) fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
