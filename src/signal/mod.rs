//! Signals and the name-keyed signal repository.
//!
//! A [`Signal`] dispatches a borrowed argument to every connected slot.
//! Slots may be connected, invoked and disconnected from any thread.
//! Plug-ins share signals by name through a [`Repository`] owned by the
//! viewer.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use tracing::debug;

use crate::error::{Result, VrkitError};

type Slot<A> = Arc<dyn Fn(&A) + Send + Sync>;

struct SignalInner<A> {
    slots: Mutex<Vec<(u64, Slot<A>)>>,
    next_id: AtomicU64,
}

impl<A> SignalInner<A> {
    fn slots(&self) -> MutexGuard<'_, Vec<(u64, Slot<A>)>> {
        // Slot lists stay consistent even if a holder panicked.
        self.slots.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// A multicast callback list.
///
/// Cloning a `Signal` yields another handle to the same slot list.
pub struct Signal<A> {
    inner: Arc<SignalInner<A>>,
}

impl<A: 'static> Signal<A> {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(SignalInner {
                slots: Mutex::new(Vec::new()),
                next_id: AtomicU64::new(0),
            }),
        }
    }

    /// Connects `slot` and returns the connection that can remove it again.
    pub fn connect<F>(&self, slot: F) -> Connection
    where
        F: Fn(&A) + Send + Sync + 'static,
    {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        self.inner.slots().push((id, Arc::new(slot)));

        let weak: Weak<SignalInner<A>> = Arc::downgrade(&self.inner);
        Connection {
            disconnector: Some(Box::new(move || {
                if let Some(inner) = weak.upgrade() {
                    inner.slots().retain(|(slot_id, _)| *slot_id != id);
                }
            })),
        }
    }

    /// Invokes every connected slot with `arg`, in connection order.
    ///
    /// The slot list is snapshotted first, so slots may connect or
    /// disconnect without deadlocking.
    pub fn emit(&self, arg: &A) {
        let slots: Vec<Slot<A>> = self.inner.slots().iter().map(|(_, s)| Arc::clone(s)).collect();
        for slot in slots {
            slot(arg);
        }
    }

    pub fn num_slots(&self) -> usize {
        self.inner.slots().len()
    }

    pub fn disconnect_all(&self) {
        self.inner.slots().clear();
    }
}

impl<A: 'static> Default for Signal<A> {
    fn default() -> Self {
        Self::new()
    }
}

impl<A> Clone for Signal<A> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<A> fmt::Debug for Signal<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let slots = self.inner.slots.lock().map(|s| s.len()).unwrap_or(0);
        f.debug_struct("Signal").field("slots", &slots).finish()
    }
}

/// Handle to one connected slot.
///
/// Dropping a `Connection` leaves the slot connected; call
/// [`Connection::disconnect`] to remove it.
pub struct Connection {
    disconnector: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl Connection {
    pub fn disconnect(&mut self) {
        if let Some(disconnect) = self.disconnector.take() {
            disconnect();
        }
    }

    /// Returns false once [`disconnect`](Self::disconnect) has been called.
    pub fn is_connected(&self) -> bool {
        self.disconnector.is_some()
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("connected", &self.is_connected())
            .finish()
    }
}

/// Name-keyed store of signals of arbitrary argument types.
#[derive(Default)]
pub struct Repository {
    signals: Mutex<HashMap<String, Arc<dyn Any + Send + Sync>>>,
}

impl Repository {
    pub fn new() -> Self {
        Self::default()
    }

    fn signals(&self) -> MutexGuard<'_, HashMap<String, Arc<dyn Any + Send + Sync>>> {
        self.signals.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Registers `signal` under `id`.
    ///
    /// # Errors
    /// `VrkitError::Signal` if a signal is already registered under `id`.
    pub fn add_signal<A>(&self, id: &str, signal: Signal<A>) -> Result<()>
    where
        A: Send + Sync + 'static,
    {
        let mut signals = self.signals();
        if signals.contains_key(id) {
            return Err(VrkitError::Signal(format!(
                "Signal already registered under '{}'",
                id
            )));
        }
        signals.insert(id.to_string(), Arc::new(signal));
        debug!(signal = %id, "Added signal");
        Ok(())
    }

    /// Removes the signal registered under `id`, if any.
    pub fn remove_signal(&self, id: &str) {
        self.signals().remove(id);
    }

    pub fn has_signal(&self, id: &str) -> bool {
        self.signals().contains_key(id)
    }

    /// Returns the signal registered under `id`.
    ///
    /// # Errors
    /// `VrkitError::Signal` if `id` is unknown or the registered signal
    /// takes a different argument type.
    pub fn get_signal<A>(&self, id: &str) -> Result<Signal<A>>
    where
        A: Send + Sync + 'static,
    {
        let signals = self.signals();
        let signal = signals
            .get(id)
            .ok_or_else(|| VrkitError::Signal(format!("Unknown signal identifier {}", id)))?;

        signal.downcast_ref::<Signal<A>>().cloned().ok_or_else(|| {
            VrkitError::Signal(format!(
                "Signal '{}' does not take arguments of type {}",
                id,
                std::any::type_name::<A>()
            ))
        })
    }

    /// Returns the signal registered under `id`, registering a new one if
    /// none exists.
    pub fn get_or_add_signal<A>(&self, id: &str) -> Result<Signal<A>>
    where
        A: Send + Sync + 'static,
    {
        {
            let mut signals = self.signals();
            if !signals.contains_key(id) {
                signals.insert(id.to_string(), Arc::new(Signal::<A>::new()));
                debug!(signal = %id, "Added signal");
            }
        }
        self.get_signal(id)
    }

    /// Identifiers of all registered signals, sorted.
    pub fn signal_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.signals().keys().cloned().collect();
        ids.sort();
        ids
    }
}

impl fmt::Debug for Repository {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Repository")
            .field("signals", &self.signal_ids())
            .finish()
    }
}
