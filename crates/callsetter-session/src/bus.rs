//! In-process publish/subscribe registry for session events.

use crate::event::{EventKind, SessionEvent};
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex, PoisonError};

/// A subscriber callback.
///
/// Listeners are compared by `Arc` identity, so keep the `Arc` around if you
/// intend to unregister it later.
pub type Listener = Arc<dyn Fn(&SessionEvent) + Send + Sync>;

/// Maps each event kind to an ordered list of listeners.
///
/// Registration order is delivery order. The same listener registered twice
/// is delivered to twice.
#[derive(Default)]
pub struct EventBus {
    listeners: Mutex<HashMap<EventKind, Vec<Listener>>>,
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let listeners = self.listeners.lock().unwrap_or_else(PoisonError::into_inner);
        let counts: HashMap<_, _> = listeners.iter().map(|(k, v)| (*k, v.len())).collect();
        f.debug_struct("EventBus").field("listeners", &counts).finish()
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `listener` to the list for `kind`.
    pub fn on(&self, kind: EventKind, listener: Listener) {
        self.listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(kind)
            .or_default()
            .push(listener);
    }

    /// Removes the first registration of `listener` for `kind`.
    ///
    /// Returns whether anything was removed.
    pub fn off(&self, kind: EventKind, listener: &Listener) -> bool {
        let mut listeners = self.listeners.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(list) = listeners.get_mut(&kind) else {
            return false;
        };
        match list.iter().position(|l| Arc::ptr_eq(l, listener)) {
            Some(index) => {
                list.remove(index);
                true
            }
            None => false,
        }
    }

    /// Delivers `event` to every listener registered for its kind.
    ///
    /// Listeners run synchronously on the caller's task, over a snapshot of
    /// the list taken before the first call, so listeners may register or
    /// unregister (themselves included) without affecting this delivery. A
    /// panicking listener is logged and skipped.
    ///
    /// Returns the number of listeners that completed without panicking.
    pub fn emit(&self, event: &SessionEvent) -> usize {
        let kind = event.kind();
        let snapshot: Vec<Listener> = {
            let listeners = self.listeners.lock().unwrap_or_else(PoisonError::into_inner);
            match listeners.get(&kind) {
                Some(list) => list.clone(),
                None => return 0,
            }
        };

        let mut delivered = 0;
        for (index, listener) in snapshot.iter().enumerate() {
            match catch_unwind(AssertUnwindSafe(|| listener(event))) {
                Ok(()) => delivered += 1,
                Err(panic) => {
                    tracing::error!(
                        event = %kind,
                        listener = index,
                        panic = panic_message(&*panic),
                        "session event listener panicked"
                    );
                }
            }
        }
        delivered
    }

    pub fn listener_count(&self, kind: EventKind) -> usize {
        self.listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&kind)
            .map_or(0, Vec::len)
    }

    /// Drops every registered listener.
    pub fn clear(&self) {
        self.listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> &str {
    if let Some(s) = panic.downcast_ref::<&'static str>() {
        s
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.as_str()
    } else {
        "<non-string panic>"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn recorder(log: &Arc<Mutex<Vec<&'static str>>>, name: &'static str) -> Listener {
        let log = log.clone();
        Arc::new(move |_event: &SessionEvent| log.lock().unwrap().push(name))
    }

    #[test]
    fn emit_calls_listeners_in_registration_order() {
        let bus = EventBus::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        bus.on(EventKind::CallStart, recorder(&log, "a"));
        bus.on(EventKind::CallStart, recorder(&log, "b"));
        bus.on(EventKind::CallEnd, recorder(&log, "other"));

        assert_eq!(bus.emit(&SessionEvent::CallStart), 2);
        assert_eq!(*log.lock().unwrap(), vec!["a", "b"]);
    }

    #[test]
    fn emit_without_listeners_is_a_no_op() {
        let bus = EventBus::new();
        assert_eq!(bus.emit(&SessionEvent::CallEnd), 0);
    }

    #[test]
    fn panicking_listener_does_not_block_the_rest() {
        let bus = EventBus::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        bus.on(EventKind::Error, recorder(&log, "first"));
        bus.on(
            EventKind::Error,
            Arc::new(|_: &SessionEvent| panic!("subscriber bug")),
        );
        bus.on(EventKind::Error, recorder(&log, "third"));

        let delivered = bus.emit(&SessionEvent::Error("x".into()));
        assert_eq!(delivered, 2);
        assert_eq!(*log.lock().unwrap(), vec!["first", "third"]);
    }

    #[test]
    fn duplicate_registration_fires_twice() {
        let bus = EventBus::new();
        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();
        let listener: Listener = Arc::new(move |_: &SessionEvent| {
            c.fetch_add(1, Ordering::SeqCst);
        });
        bus.on(EventKind::SpeechStart, listener.clone());
        bus.on(EventKind::SpeechStart, listener.clone());

        bus.emit(&SessionEvent::SpeechStart);
        assert_eq!(count.load(Ordering::SeqCst), 2);

        // off removes one registration at a time
        assert!(bus.off(EventKind::SpeechStart, &listener));
        bus.emit(&SessionEvent::SpeechStart);
        assert_eq!(count.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn off_prevents_future_delivery_and_tolerates_unknown_listeners() {
        let bus = EventBus::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        let a = recorder(&log, "a");
        bus.on(EventKind::CallEnd, a.clone());

        assert!(bus.off(EventKind::CallEnd, &a));
        assert!(!bus.off(EventKind::CallEnd, &a));
        assert!(!bus.off(EventKind::Message, &a));

        bus.emit(&SessionEvent::CallEnd);
        assert!(log.lock().unwrap().is_empty());
    }

    #[test]
    fn unsubscribing_during_emit_affects_only_the_next_emit() {
        let bus = Arc::new(EventBus::new());
        let first_calls = Arc::new(AtomicUsize::new(0));
        let second_calls = Arc::new(AtomicUsize::new(0));

        let fc = first_calls.clone();
        let first: Listener = Arc::new(move |_: &SessionEvent| {
            fc.fetch_add(1, Ordering::SeqCst);
        });

        let bus_ref = Arc::downgrade(&bus);
        let first_ref = first.clone();
        let sc = second_calls.clone();
        let second: Listener = Arc::new(move |_: &SessionEvent| {
            sc.fetch_add(1, Ordering::SeqCst);
            if let Some(bus) = bus_ref.upgrade() {
                bus.off(EventKind::CallStateChanged, &first_ref);
            }
        });

        bus.on(EventKind::CallStateChanged, first);
        bus.on(EventKind::CallStateChanged, second);

        let event = SessionEvent::CallStateChanged(Default::default());
        assert_eq!(bus.emit(&event), 2);
        assert_eq!(first_calls.load(Ordering::SeqCst), 1);
        assert_eq!(second_calls.load(Ordering::SeqCst), 1);

        assert_eq!(bus.emit(&event), 1);
        assert_eq!(first_calls.load(Ordering::SeqCst), 1);
        assert_eq!(second_calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn clear_drops_everything() {
        let bus = EventBus::new();
        bus.on(EventKind::Message, Arc::new(|_: &SessionEvent| {}));
        bus.on(EventKind::Error, Arc::new(|_: &SessionEvent| {}));
        bus.clear();
        assert_eq!(bus.listener_count(EventKind::Message), 0);
        assert_eq!(bus.listener_count(EventKind::Error), 0);
    }
}
