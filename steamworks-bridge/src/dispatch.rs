//! Callback registration and dispatch
//!
//! With manual dispatch enabled, the SDK stops calling registered C++ objects
//! and instead queues raw `CallbackMsg_t` messages. [`CallbackRegistry`] takes
//! over the registration role: handlers subscribe by callback id, the pump
//! hands each dequeued message to [`CallbackRegistry::deliver`], and handlers
//! unsubscribe with the key they were given.
//!
//! [`CallbackDispatch`] is the seam the bridge registers against, so other
//! registration backends can be substituted.

use parking_lot::{Mutex, ReentrantMutex};
use slotmap::{new_key_type, DenseSlotMap};
use std::fmt;
use std::sync::Arc;

use crate::sys::CallbackMsg_t;
use crate::types::{BridgeError, Result};

new_key_type! {
    /// Identifies one active registration in a dispatch mechanism
    pub struct RegistrationKey;
}

/// A registered handler; receives the raw payload pointer of a message
pub type CallbackHandler = Arc<dyn Fn(*mut u8) + Send + Sync>;

/// Register / unregister half of a callback dispatch mechanism
pub trait CallbackDispatch: Send + Sync {
    /// Subscribe `handler` to every message carrying `callback_id`
    fn register(&self, callback_id: i32, handler: CallbackHandler) -> Result<RegistrationKey>;

    /// Remove a registration. Returns false if the key was not registered.
    fn unregister(&self, key: RegistrationKey) -> bool;
}

struct Registration {
    callback_id: i32,
    handler: CallbackHandler,
}

#[derive(Default)]
struct RegistryInner {
    registrations: DenseSlotMap<RegistrationKey, Registration>,
    closed: bool,
}

/// In-process registration table fed by the manual-dispatch pump
///
/// Delivery is synchronous on the calling thread and holds the delivery gate
/// for its whole duration. `unregister` takes the same gate, so once it
/// returns on another thread the removed handler is not running and will not
/// run again. The gate is reentrant: a handler may unregister itself or
/// others mid-delivery, and a handler removed that way is skipped for the
/// rest of the current delivery.
///
/// A handler must not block on a thread that is waiting in `unregister`.
pub struct CallbackRegistry {
    inner: Mutex<RegistryInner>,
    delivery: ReentrantMutex<()>,
}

impl Default for CallbackRegistry {
    fn default() -> Self {
        Self {
            inner: Mutex::new(RegistryInner::default()),
            delivery: ReentrantMutex::new(()),
        }
    }
}

impl CallbackRegistry {
    /// Create an empty, open registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of active registrations
    pub fn registration_count(&self) -> usize {
        self.inner.lock().registrations.len()
    }

    /// Number of active registrations for one callback id
    pub fn registrations_for(&self, callback_id: i32) -> usize {
        self.inner
            .lock()
            .registrations
            .values()
            .filter(|r| r.callback_id == callback_id)
            .count()
    }

    /// Refuse further registrations (the SDK session is going away)
    ///
    /// Existing registrations stay in place until their owners unregister them.
    pub fn close(&self) {
        self.inner.lock().closed = true;
        log::debug!("Callback registry closed");
    }

    pub fn is_closed(&self) -> bool {
        self.inner.lock().closed
    }

    /// Deliver one dequeued message to every handler registered for its id
    ///
    /// Returns the number of handlers invoked.
    ///
    /// # Safety
    ///
    /// `msg.m_pubParam` must point to a live payload whose layout matches the
    /// struct identified by `msg.m_iCallback`, valid for the whole call.
    pub unsafe fn deliver(&self, msg: &CallbackMsg_t) -> usize {
        let callback_id = msg.m_iCallback;
        let param = msg.m_pubParam;
        self.deliver_raw(callback_id, param)
    }

    /// Deliver a payload pointer to every handler registered for `callback_id`
    ///
    /// # Safety
    ///
    /// Same contract as [`deliver`](Self::deliver).
    pub unsafe fn deliver_raw(&self, callback_id: i32, param: *mut u8) -> usize {
        let _gate = self.delivery.lock();

        let handlers: Vec<(RegistrationKey, CallbackHandler)> = self
            .inner
            .lock()
            .registrations
            .iter()
            .filter(|(_, r)| r.callback_id == callback_id)
            .map(|(key, r)| (key, Arc::clone(&r.handler)))
            .collect();

        if handlers.is_empty() {
            log::trace!("No handlers for callback {}", callback_id);
            return 0;
        }

        log::trace!(
            "Delivering callback {} to {} handler(s)",
            callback_id,
            handlers.len()
        );
        let mut invoked = 0;
        for (key, handler) in &handlers {
            // An earlier handler may have unregistered this one
            if !self.inner.lock().registrations.contains_key(*key) {
                continue;
            }
            handler(param);
            invoked += 1;
        }

        invoked
    }
}

impl CallbackDispatch for CallbackRegistry {
    fn register(&self, callback_id: i32, handler: CallbackHandler) -> Result<RegistrationKey> {
        let mut inner = self.inner.lock();
        if inner.closed {
            return Err(BridgeError::DispatchClosed);
        }

        let key = inner.registrations.insert(Registration {
            callback_id,
            handler,
        });
        log::debug!("Registered handler for callback {} ({:?})", callback_id, key);
        Ok(key)
    }

    fn unregister(&self, key: RegistrationKey) -> bool {
        // Wait out any delivery running on another thread
        let _gate = self.delivery.lock();

        let removed = self.inner.lock().registrations.remove(key);
        match removed {
            Some(registration) => {
                log::debug!(
                    "Unregistered handler for callback {} ({:?})",
                    registration.callback_id,
                    key
                );
                true
            }
            None => {
                log::warn!("Unregister of unknown registration {:?}", key);
                false
            }
        }
    }
}

impl fmt::Debug for CallbackRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("CallbackRegistry")
            .field("registrations", &inner.registrations.len())
            .field("closed", &inner.closed)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ptr;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting_handler(counter: &Arc<AtomicUsize>) -> CallbackHandler {
        let counter = Arc::clone(counter);
        Arc::new(move |_param: *mut u8| {
            counter.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[test]
    fn test_register_and_deliver() {
        let registry = CallbackRegistry::new();
        let counter = Arc::new(AtomicUsize::new(0));

        registry.register(304, counting_handler(&counter)).unwrap();
        assert_eq!(registry.registration_count(), 1);
        assert_eq!(registry.registrations_for(304), 1);

        let invoked = unsafe { registry.deliver_raw(304, ptr::null_mut()) };
        assert_eq!(invoked, 1);
        assert_eq!(counter.load(Ordering::SeqCst), 1);

        // Other ids are not routed to the handler
        let invoked = unsafe { registry.deliver_raw(704, ptr::null_mut()) };
        assert_eq!(invoked, 0);
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_unregister() {
        let registry = CallbackRegistry::new();
        let counter = Arc::new(AtomicUsize::new(0));

        let key = registry.register(304, counting_handler(&counter)).unwrap();
        assert!(registry.unregister(key));
        assert!(!registry.unregister(key));
        assert_eq!(registry.registration_count(), 0);

        unsafe { registry.deliver_raw(304, ptr::null_mut()) };
        assert_eq!(counter.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_closed_registry_refuses_registration() {
        let registry = CallbackRegistry::new();
        let counter = Arc::new(AtomicUsize::new(0));
        let key = registry.register(704, counting_handler(&counter)).unwrap();

        registry.close();
        assert!(registry.is_closed());
        assert!(matches!(
            registry.register(304, counting_handler(&counter)),
            Err(BridgeError::DispatchClosed)
        ));

        // Existing registrations survive close and can still be removed
        assert_eq!(registry.registration_count(), 1);
        assert!(registry.unregister(key));
    }

    #[test]
    fn test_handler_may_unregister_during_delivery() {
        let registry = Arc::new(CallbackRegistry::new());
        let slot: Arc<Mutex<Option<RegistrationKey>>> = Arc::new(Mutex::new(None));

        let handler: CallbackHandler = {
            let registry = Arc::clone(&registry);
            let slot = Arc::clone(&slot);
            Arc::new(move |_param: *mut u8| {
                if let Some(key) = slot.lock().take() {
                    registry.unregister(key);
                }
            })
        };

        let key = registry.register(304, handler).unwrap();
        *slot.lock() = Some(key);

        assert_eq!(unsafe { registry.deliver_raw(304, ptr::null_mut()) }, 1);
        assert_eq!(registry.registration_count(), 0);
        assert_eq!(unsafe { registry.deliver_raw(304, ptr::null_mut()) }, 0);
    }

    #[test]
    fn test_handler_removed_mid_delivery_is_skipped() {
        let registry = Arc::new(CallbackRegistry::new());
        let counter = Arc::new(AtomicUsize::new(0));
        let victim: Arc<Mutex<Option<RegistrationKey>>> = Arc::new(Mutex::new(None));

        let remover: CallbackHandler = {
            let registry = Arc::clone(&registry);
            let victim = Arc::clone(&victim);
            Arc::new(move |_param: *mut u8| {
                if let Some(key) = victim.lock().take() {
                    registry.unregister(key);
                }
            })
        };

        registry.register(304, remover).unwrap();
        let key = registry.register(304, counting_handler(&counter)).unwrap();
        *victim.lock() = Some(key);

        assert_eq!(unsafe { registry.deliver_raw(304, ptr::null_mut()) }, 1);
        assert_eq!(counter.load(Ordering::SeqCst), 0);
        assert_eq!(registry.registrations_for(304), 1);
    }

    #[test]
    fn test_deliver_message() {
        let registry = CallbackRegistry::new();
        let seen = Arc::new(AtomicUsize::new(0));
        let handler: CallbackHandler = {
            let seen = Arc::clone(&seen);
            Arc::new(move |param: *mut u8| {
                let value = unsafe { *(param as *const u32) };
                seen.store(value as usize, Ordering::SeqCst);
            })
        };
        registry.register(704, handler).unwrap();

        let mut payload: u32 = 0xBEEF;
        let msg = CallbackMsg_t {
            m_hSteamUser: 1,
            m_iCallback: 704,
            m_pubParam: &mut payload as *mut u32 as *mut u8,
            m_cubParam: 4,
        };
        assert_eq!(unsafe { registry.deliver(&msg) }, 1);
        assert_eq!(seen.load(Ordering::SeqCst), 0xBEEF);
    }
}
