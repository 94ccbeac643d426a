//! Event stream multiplexer
//!
//! Routes decoded events to the listeners subscribed to their [`ProbeKind`].
//!
//! ## Delivery rules
//!
//! - Listeners are invoked in subscription order, on a snapshot of the
//!   listener list taken when the event is published.
//! - Every event carries a per-kind sequence number assigned when the raw
//!   record arrived. A listener only receives events sequenced after its
//!   subscription, so events already queued when it subscribed never reach it.
//! - Removing a listener is synchronous: once [`Subscription::unsubscribe`]
//!   returns, the listener is not invoked again. Removal from inside any
//!   listener invocation is allowed and does not wait; an invocation of the
//!   removed listener already running on another thread may still finish.
//! - Delivery of one kind is serialized; different kinds never share a lock.
//!
//! A listener that panics is logged and skipped; its co-listeners still see
//! the event.

use std::cell::Cell;
use std::collections::HashMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use tracing::{debug, error};

use crate::probe::{ProbeEvent, ProbeKind};

/// Callback invoked for every event of the subscribed kind
pub type Listener = Box<dyn Fn(&ProbeEvent) + Send + Sync + 'static>;

/// Unique id of one subscription
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// An event stamped with its arrival order
#[derive(Debug, Clone)]
pub struct Envelope {
    pub sequence: u64,
    pub event: ProbeEvent,
}

struct ListenerEntry {
    id: SubscriptionId,
    since: u64,
    active: AtomicBool,
    callback: Listener,
}

#[derive(Default)]
struct KindChannel {
    listeners: Mutex<Vec<Arc<ListenerEntry>>>,
    delivery: Mutex<()>,
    sequence: AtomicU64,
}

thread_local! {
    /// Number of deliveries running on this thread, across all kinds
    static DELIVERY_DEPTH: Cell<usize> = const { Cell::new(0) };
}

/// Marks the current thread as delivering for as long as it lives
struct DeliveryScope;

impl DeliveryScope {
    fn enter() -> Self {
        DELIVERY_DEPTH.with(|depth| depth.set(depth.get() + 1));
        DeliveryScope
    }

    fn active() -> bool {
        DELIVERY_DEPTH.with(|depth| depth.get() > 0)
    }
}

impl Drop for DeliveryScope {
    fn drop(&mut self) {
        DELIVERY_DEPTH.with(|depth| depth.set(depth.get().saturating_sub(1)));
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

struct MuxInner {
    channels: HashMap<ProbeKind, KindChannel>,
    next_id: AtomicU64,
}

impl MuxInner {
    fn channel(&self, kind: ProbeKind) -> &KindChannel {
        &self.channels[&kind]
    }

    fn unsubscribe(&self, kind: ProbeKind, id: SubscriptionId) {
        let channel = self.channel(kind);

        let removed = {
            let mut listeners = lock(&channel.listeners);
            listeners
                .iter()
                .position(|entry| entry.id == id)
                .map(|index| listeners.remove(index))
        };

        let Some(entry) = removed else {
            return;
        };
        entry.active.store(false, Ordering::SeqCst);
        debug!("Unsubscribed listener {:?} from {}", id, kind);

        // Wait out an in-flight delivery so that no call happens after we
        // return. Inside a listener, waiting could close a cycle with another
        // kind's delivery, so the cleared flag has to suffice there.
        if !DeliveryScope::active() {
            drop(lock(&channel.delivery));
        }
    }
}

/// Fan-out of decoded events, keyed by probe kind
///
/// Cloning yields another handle to the same listener lists.
#[derive(Clone)]
pub struct EventMultiplexer {
    inner: Arc<MuxInner>,
}

impl EventMultiplexer {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(MuxInner {
                channels: ProbeKind::ALL
                    .iter()
                    .map(|kind| (*kind, KindChannel::default()))
                    .collect(),
                next_id: AtomicU64::new(1),
            }),
        }
    }

    /// Register a listener for `kind`
    ///
    /// Subscribing before any session of `kind` was started is allowed; the
    /// listener receives events once one is.
    pub fn subscribe<F>(&self, kind: ProbeKind, listener: F) -> Subscription
    where
        F: Fn(&ProbeEvent) + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.inner.next_id.fetch_add(1, Ordering::SeqCst));
        let channel = self.inner.channel(kind);

        {
            let mut listeners = lock(&channel.listeners);
            let since = channel.sequence.load(Ordering::SeqCst);
            listeners.push(Arc::new(ListenerEntry {
                id,
                since,
                active: AtomicBool::new(true),
                callback: Box::new(listener),
            }));
        }
        debug!("Subscribed listener {:?} to {}", id, kind);

        Subscription {
            kind,
            id: Some(id),
            mux: Arc::downgrade(&self.inner),
        }
    }

    /// Remove a listener; idempotent
    pub fn unsubscribe(&self, subscription: &Subscription) {
        subscription.unsubscribe();
    }

    /// Stamp the next arrival for `kind`
    pub fn next_sequence(&self, kind: ProbeKind) -> u64 {
        let channel = self.inner.channel(kind);
        // Taken under the listener lock so a concurrent subscribe sees either
        // the old or the new value, never one in between.
        let _listeners = lock(&channel.listeners);
        channel.sequence.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Deliver an event to the current listeners of `kind`
    ///
    /// Returns the number of listeners invoked.
    pub fn publish(&self, kind: ProbeKind, envelope: &Envelope) -> usize {
        let channel = self.inner.channel(kind);
        let _delivery = lock(&channel.delivery);
        let _scope = DeliveryScope::enter();

        let snapshot: Vec<Arc<ListenerEntry>> = lock(&channel.listeners).clone();
        let mut delivered = 0;

        for entry in snapshot {
            if envelope.sequence <= entry.since || !entry.active.load(Ordering::SeqCst) {
                continue;
            }
            let outcome = catch_unwind(AssertUnwindSafe(|| (entry.callback)(&envelope.event)));
            if outcome.is_err() {
                error!("Listener {:?} for {} panicked; event skipped for it", entry.id, kind);
            }
            delivered += 1;
        }

        delivered
    }

    /// Number of live listeners for `kind`
    pub fn subscriber_count(&self, kind: ProbeKind) -> usize {
        lock(&self.inner.channel(kind).listeners).len()
    }
}

impl Default for EventMultiplexer {
    fn default() -> Self {
        Self::new()
    }
}

/// Caller-held cancellation token for one listener
///
/// Dropping the handle unsubscribes. The handle holds only the kind, the id
/// and a weak reference; it never keeps the multiplexer or a session alive.
#[must_use = "dropping a Subscription removes its listener"]
#[derive(Debug)]
pub struct Subscription {
    kind: ProbeKind,
    id: Option<SubscriptionId>,
    mux: Weak<MuxInner>,
}

impl Subscription {
    /// A handle that was never attached to anything
    ///
    /// Returned when the platform is unsupported; releasing it does nothing.
    pub fn inert(kind: ProbeKind) -> Self {
        Self {
            kind,
            id: None,
            mux: Weak::new(),
        }
    }

    pub fn kind(&self) -> ProbeKind {
        self.kind
    }

    /// Whether this handle was ever attached to a multiplexer
    pub fn is_attached(&self) -> bool {
        self.id.is_some()
    }

    /// Remove the listener; safe to call any number of times
    pub fn unsubscribe(&self) {
        if let (Some(id), Some(mux)) = (self.id, self.mux.upgrade()) {
            mux.unsubscribe(self.kind, id);
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}
