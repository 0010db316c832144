//! Manual callback bridge
//!
//! A [`Bridge`] owns one [`CallbackTable`] and one [`RegistrationHandle`] per
//! [`EventKind`]. Constructing it registers a handler for every kind with the
//! dispatch mechanism; each handler forwards the native payload pointer,
//! untouched, to the matching table slot. Destroying (or dropping) the bridge
//! unregisters every handler.
//!
//! The bridge does no locking, buffering or filtering of its own: delivery
//! happens synchronously on whichever thread pumps the dispatch mechanism.

use std::fmt;
use std::sync::Arc;

use crate::dispatch::{CallbackDispatch, CallbackHandler, CallbackRegistry, RegistrationKey};
use crate::sys;
use crate::types::{EventKind, Result};

/// Receives `PersonaStateChange_t` payloads
pub type PersonaStateChangeFn = unsafe extern "C" fn(*mut sys::PersonaStateChange_t);

/// Receives `SteamShutdown_t` payloads
pub type SteamShutdownFn = unsafe extern "C" fn(*mut sys::SteamShutdown_t);

/// Caller-supplied function pointers, one per supported event kind
///
/// Copied into the bridge at construction and never mutated afterwards. The
/// pointers are called with the payload exactly as the SDK delivered it; the
/// pointee is only valid for the duration of the call.
#[derive(Clone, Copy)]
pub struct CallbackTable {
    pub on_persona_state_changed: PersonaStateChangeFn,
    pub on_steam_shutdown: SteamShutdownFn,
}

impl CallbackTable {
    /// Build the type-erased handler that services `kind`
    fn handler_for(&self, kind: EventKind) -> CallbackHandler {
        match kind {
            EventKind::PersonaStateChange => {
                let forward = self.on_persona_state_changed;
                Arc::new(move |param: *mut u8| unsafe { forward(param.cast()) })
            }
            EventKind::SteamShutdown => {
                let forward = self.on_steam_shutdown;
                Arc::new(move |param: *mut u8| unsafe { forward(param.cast()) })
            }
        }
    }
}

impl fmt::Debug for CallbackTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallbackTable")
            .field(
                "on_persona_state_changed",
                &(self.on_persona_state_changed as *const ()),
            )
            .field("on_steam_shutdown", &(self.on_steam_shutdown as *const ()))
            .finish()
    }
}

/// One active subscription with the dispatch mechanism
#[derive(Debug)]
pub struct RegistrationHandle {
    kind: EventKind,
    key: RegistrationKey,
}

impl RegistrationHandle {
    pub fn kind(&self) -> EventKind {
        self.kind
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BridgeState {
    Registered,
    Unregistered,
}

/// Owns the registrations that route native callbacks into a [`CallbackTable`]
///
/// Must not outlive the SDK session it was registered with, and must not be
/// destroyed from inside one of its own callbacks.
#[derive(Debug)]
pub struct Bridge<D: CallbackDispatch = CallbackRegistry> {
    dispatch: Arc<D>,
    table: CallbackTable,
    handles: Vec<RegistrationHandle>,
    state: BridgeState,
}

impl<D: CallbackDispatch> Bridge<D> {
    /// Register one handler per event kind and return the live bridge
    ///
    /// If any registration fails, the ones already made are removed again
    /// before the error is returned; no partially registered bridge exists.
    pub fn new(dispatch: Arc<D>, table: CallbackTable) -> Result<Self> {
        let mut handles: Vec<RegistrationHandle> = Vec::with_capacity(EventKind::ALL.len());

        for kind in EventKind::ALL {
            match dispatch.register(kind.callback_id(), table.handler_for(kind)) {
                Ok(key) => handles.push(RegistrationHandle { kind, key }),
                Err(e) => {
                    log::warn!(
                        "Registration for {} failed, rolling back {} handle(s): {}",
                        kind,
                        handles.len(),
                        e
                    );
                    for handle in handles.drain(..).rev() {
                        dispatch.unregister(handle.key);
                    }
                    return Err(e);
                }
            }
        }

        log::debug!("Callback bridge registered ({} handles)", handles.len());

        Ok(Self {
            dispatch,
            table,
            handles,
            state: BridgeState::Registered,
        })
    }

    /// The table this bridge forwards into
    pub fn table(&self) -> &CallbackTable {
        &self.table
    }

    /// Unregister every handler and release the bridge
    pub fn destroy(mut self) {
        self.unregister_all();
    }

    fn unregister_all(&mut self) {
        if self.state == BridgeState::Unregistered {
            return;
        }

        for handle in self.handles.drain(..) {
            if !self.dispatch.unregister(handle.key) {
                log::warn!("{} handle was already gone at teardown", handle.kind);
            }
        }
        self.state = BridgeState::Unregistered;
        log::debug!("Callback bridge unregistered");
    }
}

impl<D: CallbackDispatch> Drop for Bridge<D> {
    fn drop(&mut self) {
        self.unregister_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::BridgeError;
    use std::cell::Cell;
    use std::ptr;

    thread_local! {
        static PERSONA_HITS: Cell<usize> = const { Cell::new(0) };
        static SHUTDOWN_HITS: Cell<usize> = const { Cell::new(0) };
    }

    unsafe extern "C" fn count_persona(_: *mut sys::PersonaStateChange_t) {
        PERSONA_HITS.with(|hits| hits.set(hits.get() + 1));
    }

    unsafe extern "C" fn count_shutdown(_: *mut sys::SteamShutdown_t) {
        SHUTDOWN_HITS.with(|hits| hits.set(hits.get() + 1));
    }

    fn counting_table() -> CallbackTable {
        PERSONA_HITS.with(|hits| hits.set(0));
        SHUTDOWN_HITS.with(|hits| hits.set(0));
        CallbackTable {
            on_persona_state_changed: count_persona,
            on_steam_shutdown: count_shutdown,
        }
    }

    /// Accepts a fixed number of registrations, then fails
    struct LimitedDispatch {
        inner: CallbackRegistry,
        remaining: parking_lot::Mutex<usize>,
    }

    impl CallbackDispatch for LimitedDispatch {
        fn register(&self, callback_id: i32, handler: CallbackHandler) -> Result<RegistrationKey> {
            let mut remaining = self.remaining.lock();
            if *remaining == 0 {
                return Err(BridgeError::Registration(format!(
                    "no slot for callback {}",
                    callback_id
                )));
            }
            *remaining -= 1;
            self.inner.register(callback_id, handler)
        }

        fn unregister(&self, key: RegistrationKey) -> bool {
            self.inner.unregister(key)
        }
    }

    #[test]
    fn test_construct_registers_every_kind() {
        let registry = Arc::new(CallbackRegistry::new());
        let bridge = Bridge::new(Arc::clone(&registry), counting_table()).unwrap();

        assert_eq!(registry.registration_count(), EventKind::ALL.len());
        for kind in EventKind::ALL {
            assert_eq!(registry.registrations_for(kind.callback_id()), 1);
        }
        let kinds: Vec<EventKind> = bridge.handles.iter().map(RegistrationHandle::kind).collect();
        assert_eq!(kinds, EventKind::ALL.to_vec());
        assert_eq!(
            bridge.table().on_steam_shutdown as *const (),
            count_shutdown as *const ()
        );

        bridge.destroy();
        assert_eq!(registry.registration_count(), 0);
    }

    #[test]
    fn test_routes_by_kind() {
        let registry = Arc::new(CallbackRegistry::new());
        let _bridge = Bridge::new(Arc::clone(&registry), counting_table()).unwrap();

        unsafe { registry.deliver_raw(sys::SteamShutdown_t::K_ICALLBACK, ptr::null_mut()) };
        assert_eq!(SHUTDOWN_HITS.with(Cell::get), 1);
        assert_eq!(PERSONA_HITS.with(Cell::get), 0);
    }

    #[test]
    fn test_drop_unregisters() {
        let registry = Arc::new(CallbackRegistry::new());
        {
            let _bridge = Bridge::new(Arc::clone(&registry), counting_table()).unwrap();
            assert_eq!(registry.registration_count(), 2);
        }
        assert_eq!(registry.registration_count(), 0);
    }

    #[test]
    fn test_failed_registration_rolls_back() {
        let dispatch = Arc::new(LimitedDispatch {
            inner: CallbackRegistry::new(),
            remaining: parking_lot::Mutex::new(1),
        });

        let result = Bridge::new(Arc::clone(&dispatch), counting_table());
        assert!(matches!(result, Err(BridgeError::Registration(_))));
        assert_eq!(dispatch.inner.registration_count(), 0);
    }

    #[test]
    fn test_closed_dispatch_fails_construction() {
        let registry = Arc::new(CallbackRegistry::new());
        registry.close();

        let result = Bridge::new(Arc::clone(&registry), counting_table());
        assert!(matches!(result, Err(BridgeError::DispatchClosed)));
        assert_eq!(registry.registration_count(), 0);
    }
}
