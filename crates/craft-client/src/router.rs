//! Event subscription registry and dispatch.
//!
//! Handlers run synchronously on the dispatching task, in registration
//! order. The registry lock is never held while a handler runs, so handlers
//! may register further handlers.

use std::collections::HashMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{trace, warn};

use crate::events::{ClientEvent, EventKind};

/// A subscriber callback. Returning `false` unsubscribes it.
type Callback = Arc<dyn Fn(&ClientEvent) -> bool + Send + Sync>;

struct Registration {
    id: u64,
    callback: Callback,
    once: bool,
}

#[derive(Default)]
struct Registry {
    next_id: u64,
    handlers: HashMap<EventKind, Vec<Registration>>,
}

/// Ordered handler lists, one per [`EventKind`].
#[derive(Default)]
pub struct EventRouter {
    registry: Mutex<Registry>,
}

impl EventRouter {
    /// Empty router.
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `handler` for every event of `kind`.
    pub fn on(&self, kind: EventKind, handler: impl Fn(&ClientEvent) + Send + Sync + 'static) {
        self.register(
            kind,
            Arc::new(move |event| {
                handler(event);
                true
            }),
            false,
        );
    }

    /// Run `handler` for the next event of `kind` only.
    pub fn once(&self, kind: EventKind, handler: impl Fn(&ClientEvent) + Send + Sync + 'static) {
        self.register(
            kind,
            Arc::new(move |event| {
                handler(event);
                true
            }),
            true,
        );
    }

    /// Run `handler` for every event of `kind` until it returns `false`.
    pub fn on_while(
        &self,
        kind: EventKind,
        handler: impl Fn(&ClientEvent) -> bool + Send + Sync + 'static,
    ) {
        self.register(kind, Arc::new(handler), false);
    }

    fn register(&self, kind: EventKind, callback: Callback, once: bool) {
        let mut registry = self.registry.lock();
        registry.next_id += 1;
        let id = registry.next_id;
        registry
            .handlers
            .entry(kind)
            .or_default()
            .push(Registration { id, callback, once });
    }

    #[cfg(test)]
    pub(crate) fn handler_count(&self, kind: EventKind) -> usize {
        self.registry.lock().handlers.get(&kind).map_or(0, Vec::len)
    }

    /// Invoke every handler for the event's kind.
    ///
    /// A panicking handler is logged and skipped. Returns how many handlers
    /// were invoked.
    pub fn dispatch(&self, event: &ClientEvent) -> usize {
        let kind = event.kind();
        let snapshot: Vec<(u64, Callback)> = {
            let mut registry = self.registry.lock();
            let Some(list) = registry.handlers.get_mut(&kind) else {
                return 0;
            };
            let snapshot = list.iter().map(|r| (r.id, Arc::clone(&r.callback))).collect();
            list.retain(|r| !r.once);
            snapshot
        };

        trace!(event_kind = kind.as_str(), handlers = snapshot.len(), "dispatching event");
        let mut finished = Vec::new();
        for (id, callback) in &snapshot {
            match catch_unwind(AssertUnwindSafe(|| callback(event))) {
                Ok(true) => {}
                Ok(false) => finished.push(*id),
                Err(_) => warn!(event_kind = kind.as_str(), "event handler panicked"),
            }
        }

        if !finished.is_empty() {
            trace!(event_kind = kind.as_str(), removed = finished.len(), "unsubscribing handlers");
            if let Some(list) = self.registry.lock().handlers.get_mut(&kind) {
                list.retain(|r| !finished.contains(&r.id));
            }
        }
        snapshot.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counter() -> (Arc<AtomicUsize>, impl Fn(&ClientEvent) + Send + Sync + 'static) {
        let count = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&count);
        (count, move |_: &ClientEvent| {
            let _ = c.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[test]
    fn dispatch_reaches_only_matching_kind() {
        let router = EventRouter::new();
        let (opens, on_open) = counter();
        let (closes, on_close) = counter();
        router.on(EventKind::Open, on_open);
        router.on(EventKind::Close, on_close);

        assert_eq!(router.dispatch(&ClientEvent::Open), 1);
        assert_eq!(opens.load(Ordering::SeqCst), 1);
        assert_eq!(closes.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn handlers_run_in_registration_order() {
        let router = EventRouter::new();
        let order = Arc::new(Mutex::new(Vec::new()));
        for i in 0..3 {
            let order = Arc::clone(&order);
            router.on(EventKind::Open, move |_| order.lock().push(i));
        }
        let _ = router.dispatch(&ClientEvent::Open);
        assert_eq!(*order.lock(), vec![0, 1, 2]);
    }

    #[test]
    fn once_handlers_fire_a_single_time() {
        let router = EventRouter::new();
        let (count, handler) = counter();
        router.once(EventKind::Close, handler);
        let (count2, handler2) = counter();
        router.once(EventKind::Close, handler2);

        assert_eq!(router.dispatch(&ClientEvent::Close), 2);
        assert_eq!(router.dispatch(&ClientEvent::Close), 0);
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(count2.load(Ordering::SeqCst), 1);
        assert_eq!(router.handler_count(EventKind::Close), 0);
    }

    #[test]
    fn panicking_handler_does_not_stop_later_ones() {
        let (logs, _guard) = craft_core::logging::capture_logs();
        let router = EventRouter::new();
        router.on(EventKind::Open, |_| panic!("boom"));
        let (count, handler) = counter();
        router.on(EventKind::Open, handler);

        assert_eq!(router.dispatch(&ClientEvent::Open), 2);
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert!(logs.has_event(tracing::Level::WARN, "event handler panicked"));
    }

    #[test]
    fn handler_may_register_during_dispatch() {
        let router = Arc::new(EventRouter::new());
        let inner = Arc::clone(&router);
        router.on(EventKind::Open, move |_| inner.on(EventKind::Close, |_| {}));

        let _ = router.dispatch(&ClientEvent::Open);
        assert_eq!(router.handler_count(EventKind::Close), 1);
    }

    #[test]
    fn handler_returning_false_is_removed() {
        let router = EventRouter::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&calls);
        router.on_while(EventKind::Error, move |_| c.fetch_add(1, Ordering::SeqCst) == 0);
        let (others, handler) = counter();
        router.on(EventKind::Error, handler);

        assert_eq!(router.dispatch(&ClientEvent::Error(craft_core::CraftError::NotConnected)), 2);
        assert_eq!(router.dispatch(&ClientEvent::Error(craft_core::CraftError::NotConnected)), 2);
        assert_eq!(router.handler_count(EventKind::Error), 1);
        assert_eq!(router.dispatch(&ClientEvent::Error(craft_core::CraftError::NotConnected)), 1);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(others.load(Ordering::SeqCst), 3);
    }
}
