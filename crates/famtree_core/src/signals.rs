//! Synchronous change notification.
//!
//! Subscribers register a callback under a signal name (`person-update`,
//! `family-delete`, ...). [`SignalHub::emit`] calls every callback connected
//! at the moment of emission, in connection order, before returning.

use crate::objects::{ObjectKind, SignalAction};
use crate::Handle;
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;
use tracing::trace;

/// A single emitted notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signal {
    /// Kind of the affected objects.
    pub kind: ObjectKind,
    /// What happened to them.
    pub action: SignalAction,
    /// Affected handles.
    pub handles: Vec<Handle>,
}

impl Signal {
    /// Signal name, e.g. `person-add`.
    pub fn name(&self) -> String {
        self.kind.signal(self.action)
    }
}

/// Identifies one connection, for [`SignalHub::disconnect`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

type Callback = Rc<dyn Fn(&Signal)>;

struct Subscriber {
    id: SubscriptionId,
    name: String,
    callback: Callback,
}

#[derive(Default)]
struct HubInner {
    next_id: u64,
    subscribers: Vec<Subscriber>,
}

/// Publish/subscribe hub shared by a database and its observers.
///
/// Cloning yields another handle to the same hub. Callbacks may connect or
/// disconnect (themselves or others) while a signal is being emitted; a
/// subscriber disconnected mid-emission is not called afterwards.
#[derive(Clone, Default)]
pub struct SignalHub {
    inner: Rc<RefCell<HubInner>>,
}

impl fmt::Debug for SignalHub {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.borrow();
        f.debug_struct("SignalHub")
            .field("subscribers", &inner.subscribers.len())
            .finish()
    }
}

impl SignalHub {
    /// Creates an empty hub.
    pub fn new() -> Self {
        Self::default()
    }

    /// Connects `callback` to the signal called `name`.
    pub fn connect(&self, name: &str, callback: impl Fn(&Signal) + 'static) -> SubscriptionId {
        let mut inner = self.inner.borrow_mut();
        inner.next_id += 1;
        let id = SubscriptionId(inner.next_id);
        inner.subscribers.push(Subscriber {
            id,
            name: name.to_string(),
            callback: Rc::new(callback),
        });
        id
    }

    /// Removes a connection. Returns false if it was already gone.
    pub fn disconnect(&self, id: SubscriptionId) -> bool {
        let mut inner = self.inner.borrow_mut();
        let before = inner.subscribers.len();
        inner.subscribers.retain(|s| s.id != id);
        inner.subscribers.len() != before
    }

    /// True while `id` is connected.
    pub fn is_connected(&self, id: SubscriptionId) -> bool {
        self.inner.borrow().subscribers.iter().any(|s| s.id == id)
    }

    /// Number of callbacks connected to `name`.
    pub fn subscriber_count(&self, name: &str) -> usize {
        self.inner
            .borrow()
            .subscribers
            .iter()
            .filter(|s| s.name == name)
            .count()
    }

    /// Delivers `signal` to every subscriber of its name.
    pub fn emit(&self, signal: &Signal) {
        let name = signal.name();
        // Snapshot first: callbacks are free to borrow the hub again.
        let targets: Vec<(SubscriptionId, Callback)> = self
            .inner
            .borrow()
            .subscribers
            .iter()
            .filter(|s| s.name == name)
            .map(|s| (s.id, Rc::clone(&s.callback)))
            .collect();
        trace!(signal = %name, receivers = targets.len(), "emit");
        for (id, callback) in targets {
            if self.is_connected(id) {
                callback(signal);
            }
        }
    }

    /// Emits `kind-action` for `handles`, skipping empty lists.
    pub fn emit_handles(&self, kind: ObjectKind, action: SignalAction, handles: Vec<Handle>) {
        if handles.is_empty() && action != SignalAction::Rebuild {
            return;
        }
        self.emit(&Signal {
            kind,
            action,
            handles,
        });
    }
}
