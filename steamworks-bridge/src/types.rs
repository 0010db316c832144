//! Core types for the Steamworks bridge
//!
//! This module defines the identifiers carried in native callback payloads,
//! the set of event kinds the bridge services, and the crate-wide error type.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::sys;

/// Result type for bridge operations
pub type Result<T> = std::result::Result<T, BridgeError>;

/// A 64-bit Steam account identifier
///
/// <https://partner.steamgames.com/doc/api/steam_api#CSteamID>
#[derive(Debug, Copy, Clone, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SteamId(u64);

impl SteamId {
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// The raw 64-bit value as stored in native payloads
    pub const fn as_u64(self) -> u64 {
        self.0
    }

    /// The 32-bit account number (low bits of the id)
    pub const fn account_id(self) -> u32 {
        (self.0 & 0xFFFF_FFFF) as u32
    }
}

impl From<u64> for SteamId {
    fn from(raw: u64) -> Self {
        Self(raw)
    }
}

impl From<SteamId> for u64 {
    fn from(id: SteamId) -> Self {
        id.0
    }
}

impl fmt::Display for SteamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Steam application identifier
#[derive(Debug, Copy, Clone, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AppId(pub u32);

impl From<u32> for AppId {
    fn from(raw: u32) -> Self {
        Self(raw)
    }
}

impl fmt::Display for AppId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Native event kinds serviced by the bridge
///
/// The set is fixed: one callback table slot and one registration per kind.
#[derive(Debug, Copy, Clone, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub enum EventKind {
    /// `PersonaStateChange_t`: a user's presence or profile changed
    PersonaStateChange,
    /// `SteamShutdown_t`: the Steam client asked the application to exit
    SteamShutdown,
}

impl EventKind {
    /// Every supported kind, in registration order
    pub const ALL: [EventKind; 2] = [EventKind::PersonaStateChange, EventKind::SteamShutdown];

    /// The native callback id (`k_iCallback`) for this kind
    pub const fn callback_id(self) -> i32 {
        match self {
            EventKind::PersonaStateChange => sys::PersonaStateChange_t::K_ICALLBACK,
            EventKind::SteamShutdown => sys::SteamShutdown_t::K_ICALLBACK,
        }
    }

    /// Map a native callback id back to a kind, if the bridge services it
    pub fn from_callback_id(id: i32) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.callback_id() == id)
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventKind::PersonaStateChange => write!(f, "PersonaStateChange"),
            EventKind::SteamShutdown => write!(f, "SteamShutdown"),
        }
    }
}

/// Errors surfaced by the bridge and the session client
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    #[error("Tried to initialize the Steam API while a session is already active")]
    AlreadyInitialized,

    #[error("Failed to load the steam_api library: {0}")]
    LibraryLoad(String),

    #[error("Symbol missing from the steam_api library: {0}")]
    MissingSymbol(String),

    #[error("The Steamworks API failed to initialize: {0}")]
    InitFailed(String),

    #[error("Callback registration failed: {0}")]
    Registration(String),

    #[error("The callback dispatch mechanism has been shut down")]
    DispatchClosed,

    #[error("Steam interface unavailable: {0}")]
    InterfaceUnavailable(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_kind_callback_ids() {
        assert_eq!(EventKind::PersonaStateChange.callback_id(), 304);
        assert_eq!(EventKind::SteamShutdown.callback_id(), 704);
        assert_eq!(EventKind::from_callback_id(304), Some(EventKind::PersonaStateChange));
        assert_eq!(EventKind::from_callback_id(704), Some(EventKind::SteamShutdown));
        assert_eq!(EventKind::from_callback_id(703), None);
    }

    #[test]
    fn test_steam_id_conversions() {
        let id = SteamId::from(76561197960287930);
        assert_eq!(u64::from(id), 76561197960287930);
        assert_eq!(id.account_id(), 22202);
        assert_eq!(id.to_string(), "76561197960287930");
    }

    #[test]
    fn test_error_display() {
        let err = BridgeError::MissingSymbol("SteamAPI_Shutdown".to_string());
        assert_eq!(
            err.to_string(),
            "Symbol missing from the steam_api library: SteamAPI_Shutdown"
        );
    }
}
