//! Steamworks Callback Bridge
//!
//! Safe, async-friendly access to a tiny portion of the Steamworks API: the
//! native callback registration/dispatch mechanism, surfaced as a
//! caller-supplied function-pointer table and as `futures` streams.
//!
//! # Architecture
//!
//! - [`CallbackRegistry`] is the dispatch mechanism: handlers register by
//!   callback id and the pump delivers each dequeued SDK message to them.
//! - [`Bridge`] owns one registration per [`EventKind`] and forwards each
//!   native payload, unmodified, to the matching [`CallbackTable`] slot.
//! - [`Client`] initializes the SDK in manual-dispatch mode, runs the pump on
//!   a dedicated thread and exposes the events as streams.
//!
//! The library does NOT wrap SDK functions (leaderboards, UGC queries, remote
//! storage calls). Subsystem interface pointers are handed out as opaque
//! [`NativeInterface`] handles.
//!
//! # Example Usage
//!
//! ```no_run
//! use futures::StreamExt;
//! use steamworks_bridge::{BridgeConfig, Client};
//!
//! let client = Client::init(&BridgeConfig::new().with_app_id(480))?;
//! println!("Running as app {}", client.app_id()?);
//!
//! let mut presence = client.on_persona_state_changed();
//! futures::executor::block_on(async {
//!     while let Some(change) = presence.next().await {
//!         println!("{} changed: {:?}", change.steam_id, change.change_flags);
//!     }
//! });
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! Registering a raw table directly against a dispatch mechanism:
//!
//! ```
//! use std::sync::Arc;
//! use steamworks_bridge::{sys, Bridge, CallbackRegistry, CallbackTable};
//!
//! unsafe extern "C" fn on_presence(_: *mut sys::PersonaStateChange_t) {}
//! unsafe extern "C" fn on_shutdown(_: *mut sys::SteamShutdown_t) {}
//!
//! let registry = Arc::new(CallbackRegistry::new());
//! let bridge = Bridge::new(
//!     Arc::clone(&registry),
//!     CallbackTable {
//!         on_persona_state_changed: on_presence,
//!         on_steam_shutdown: on_shutdown,
//!     },
//! )?;
//! assert_eq!(registry.registration_count(), 2);
//!
//! bridge.destroy();
//! assert_eq!(registry.registration_count(), 0);
//! # Ok::<(), steamworks_bridge::BridgeError>(())
//! ```

// Public modules
pub mod bridge;
pub mod callbacks;
pub mod client;
pub mod config;
pub mod dispatch;
pub mod interfaces;
pub mod pump;
pub mod sys;
pub mod types;

// Re-export main types for convenience
pub use bridge::{Bridge, CallbackTable, PersonaStateChangeFn, RegistrationHandle, SteamShutdownFn};
pub use callbacks::{EventStreams, PersonaStateChange, PersonaStateChangeFlags};
pub use client::Client;
pub use config::BridgeConfig;
pub use dispatch::{CallbackDispatch, CallbackHandler, CallbackRegistry, RegistrationKey};
pub use interfaces::{Interfaces, NativeInterface, Subsystem};
pub use types::{AppId, BridgeError, EventKind, Result, SteamId};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_library_basics() {
        // Smoke test: a fresh registry has nothing registered
        let registry = CallbackRegistry::new();
        assert_eq!(registry.registration_count(), 0);
        assert!(!registry.is_closed());
    }
}
