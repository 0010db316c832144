//! Steam session client
//!
//! [`Client::init`] loads steam_api, initializes the SDK in manual-dispatch
//! mode, captures the subsystem interfaces, registers one [`Bridge`] that
//! feeds the async streams, and starts the pump thread. Dropping the last
//! clone tears all of that down in reverse order and ends every open stream.

use crossbeam_channel::Sender;
use futures::Stream;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crate::bridge::Bridge;
use crate::callbacks::{self, PersonaStateChange, SESSION_STREAMS};
use crate::config::BridgeConfig;
use crate::dispatch::CallbackRegistry;
use crate::interfaces::{Interfaces, Subsystem};
use crate::pump::ManualDispatchPump;
use crate::sys::SteamApi;
use crate::types::{AppId, BridgeError, Result};

static STEAM_API_INITIALIZED: AtomicBool = AtomicBool::new(false);

/// An initialized Steamworks session
///
/// A handle that can be cheaply cloned. Only one session may exist per process
/// at a time.
#[derive(Debug, Clone)]
pub struct Client(Arc<ClientInner>);

#[derive(Debug)]
struct ClientInner {
    api: Arc<SteamApi>,
    registry: Arc<CallbackRegistry>,
    bridge: Option<Bridge>,
    interfaces: Interfaces,
    pump_shutdown: Sender<()>,
    pump_thread: Option<JoinHandle<()>>,
}

impl Client {
    /// Initialize the Steamworks API, yielding a `Client`
    ///
    /// Returns an error if a session is already active, if the library cannot
    /// be loaded, or if the SDK refuses to initialize (Steam not running, no
    /// app id, ...).
    ///
    /// When `config.app_id` is set it is written to the process environment,
    /// so in that case call this before starting other threads (in particular
    /// before building a multi-threaded async runtime).
    pub fn init(config: &BridgeConfig) -> Result<Self> {
        if STEAM_API_INITIALIZED.swap(true, Ordering::AcqRel) {
            return Err(BridgeError::AlreadyInitialized);
        }

        Self::start(config).inspect_err(|_| {
            STEAM_API_INITIALIZED.store(false, Ordering::Release);
        })
    }

    fn start(config: &BridgeConfig) -> Result<Self> {
        if let Some(app_id) = config.app_id {
            log::debug!("Exporting SteamAppId={}", app_id);
            std::env::set_var("SteamAppId", app_id.to_string());
        }

        let api = Arc::new(SteamApi::load(config.library())?);
        unsafe {
            api.init()?;
            api.enable_manual_dispatch();
        }
        log::info!("Steamworks API initialized");

        let interfaces = unsafe { Interfaces::resolve(&api) };
        let registry = Arc::new(CallbackRegistry::new());

        let bridge = match Bridge::new(Arc::clone(&registry), callbacks::stream_table()) {
            Ok(bridge) => bridge,
            Err(e) => {
                unsafe { api.shutdown() };
                return Err(e);
            }
        };

        let pump = unsafe { ManualDispatchPump::new(Arc::clone(&api)) };
        let (shutdown_tx, shutdown_rx) = crossbeam_channel::bounded(1);
        let pump_registry = Arc::clone(&registry);
        let interval = config.pump_interval();

        let spawned = thread::Builder::new()
            .name("steam-callback-pump".to_string())
            .spawn(move || pump.run(&pump_registry, interval, &shutdown_rx));

        let pump_thread = match spawned {
            Ok(handle) => handle,
            Err(e) => {
                bridge.destroy();
                unsafe { api.shutdown() };
                return Err(e.into());
            }
        };

        log::info!("Callback pump running every {:?}", interval);

        Ok(Client(Arc::new(ClientInner {
            api,
            registry,
            bridge: Some(bridge),
            interfaces,
            pump_shutdown: shutdown_tx,
            pump_thread: Some(pump_thread),
        })))
    }

    /// <https://partner.steamgames.com/doc/api/ISteamUtils#GetAppID>
    pub fn app_id(&self) -> Result<AppId> {
        let utils = self.0.interfaces.require(Subsystem::Utils)?;
        Ok(unsafe { self.0.api.utils_app_id(utils.as_ptr()) }.into())
    }

    /// Interface handles captured at init
    pub fn interfaces(&self) -> &Interfaces {
        &self.0.interfaces
    }

    /// The session's dispatch mechanism, for registering additional bridges
    ///
    /// Bridges built on it must be destroyed before the last `Client` clone
    /// is dropped.
    pub fn dispatch(&self) -> Arc<CallbackRegistry> {
        Arc::clone(&self.0.registry)
    }

    /// <https://partner.steamgames.com/doc/api/ISteamFriends#PersonaStateChange_t>
    ///
    /// The stream ends once the session is dropped.
    pub fn on_persona_state_changed(&self) -> impl Stream<Item = PersonaStateChange> + Send {
        SESSION_STREAMS.subscribe_persona_state_changes()
    }

    /// <https://partner.steamgames.com/doc/api/ISteamUtils#SteamShutdown_t>
    pub fn on_steam_shutdown(&self) -> impl Stream<Item = ()> + Send {
        SESSION_STREAMS.subscribe_steam_shutdown()
    }
}

impl Drop for ClientInner {
    fn drop(&mut self) {
        // The receiver only disappears if the pump thread already exited
        let _ = self.pump_shutdown.send(());
        if let Some(handle) = self.pump_thread.take() {
            if handle.join().is_err() {
                log::warn!("Callback pump thread panicked");
            }
        }

        if let Some(bridge) = self.bridge.take() {
            bridge.destroy();
        }
        self.registry.close();

        let closed = SESSION_STREAMS.close_all();
        log::debug!("Closed {} session stream(s)", closed);

        unsafe { self.api.shutdown() };
        STEAM_API_INITIALIZED.store(false, Ordering::Release);
        log::info!("Steamworks API shut down");
    }
}
