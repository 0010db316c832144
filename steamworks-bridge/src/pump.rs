//! Manual-dispatch pump
//!
//! Drains the SDK's callback queue and hands each message to a
//! [`CallbackRegistry`]. The session client runs [`ManualDispatchPump::run`]
//! on a dedicated thread, one frame per configured interval.

use crossbeam_channel::{Receiver, RecvTimeoutError};
use std::sync::Arc;
use std::time::Duration;

use crate::dispatch::CallbackRegistry;
use crate::sys::{self, HSteamPipe, SteamApi};

/// Pulls queued callbacks off one Steam pipe
pub struct ManualDispatchPump {
    api: Arc<SteamApi>,
    pipe: HSteamPipe,
}

impl ManualDispatchPump {
    /// # Safety
    ///
    /// `api` must be initialized with manual dispatch enabled, and must stay
    /// initialized for as long as the pump is used.
    pub unsafe fn new(api: Arc<SteamApi>) -> Self {
        let pipe = api.pipe();
        log::debug!("Manual dispatch pump attached to pipe {}", pipe);
        Self { api, pipe }
    }

    /// Run one frame and deliver everything it queued
    ///
    /// Returns the number of handler invocations. Call-result completions are
    /// freed without being delivered.
    pub fn run_frame(&self, registry: &CallbackRegistry) -> usize {
        let mut invoked = 0;
        unsafe {
            self.api.run_frame(self.pipe);
            while let Some(msg) = self.api.next_callback(self.pipe) {
                let callback_id = msg.m_iCallback;
                if callback_id == sys::STEAM_API_CALL_COMPLETED_CALLBACK {
                    log::trace!("Skipping call-result completion");
                } else {
                    invoked += registry.deliver(&msg);
                }
                self.api.free_last_callback(self.pipe);
            }
        }
        invoked
    }

    /// Pump every `interval` until `shutdown` fires or is disconnected
    pub fn run(self, registry: &CallbackRegistry, interval: Duration, shutdown: &Receiver<()>) {
        run_loop(shutdown, interval, || {
            self.run_frame(registry);
        });
    }
}

pub(crate) fn run_loop(shutdown: &Receiver<()>, interval: Duration, mut frame: impl FnMut()) {
    loop {
        match shutdown.recv_timeout(interval) {
            Err(RecvTimeoutError::Timeout) => frame(),
            Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
        }
    }
    log::debug!("Callback pump stopped");
}
