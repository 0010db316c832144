//! Capability handles for native subsystem interfaces
//!
//! The SDK's global accessors (`SteamFriends()`, `SteamUGC()`, ...) are called
//! once at session start and the resulting pointers are handed out through
//! [`Interfaces`]. The handles are opaque: this crate adds no logic on top of
//! them.

use std::ffi::c_void;
use std::fmt;
use std::ptr::NonNull;

use crate::sys::SteamApi;
use crate::types::{BridgeError, Result};

/// Native subsystems whose interface pointers are captured at init
#[derive(Debug, Copy, Clone, Hash, Eq, PartialEq)]
pub enum Subsystem {
    Friends,
    RemoteStorage,
    Ugc,
    User,
    UserStats,
    Utils,
}

impl Subsystem {
    pub const ALL: [Subsystem; 6] = [
        Subsystem::Friends,
        Subsystem::RemoteStorage,
        Subsystem::Ugc,
        Subsystem::User,
        Subsystem::UserStats,
        Subsystem::Utils,
    ];

    /// Versioned flat-API accessor exported by steam_api
    pub const fn accessor_symbol(self) -> &'static str {
        match self {
            Subsystem::Friends => "SteamAPI_SteamFriends_v017",
            Subsystem::RemoteStorage => "SteamAPI_SteamRemoteStorage_v016",
            Subsystem::Ugc => "SteamAPI_SteamUGC_v017",
            Subsystem::User => "SteamAPI_SteamUser_v023",
            Subsystem::UserStats => "SteamAPI_SteamUserStats_v012",
            Subsystem::Utils => "SteamAPI_SteamUtils_v010",
        }
    }

    const fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for Subsystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Subsystem::Friends => "ISteamFriends",
            Subsystem::RemoteStorage => "ISteamRemoteStorage",
            Subsystem::Ugc => "ISteamUGC",
            Subsystem::User => "ISteamUser",
            Subsystem::UserStats => "ISteamUserStats",
            Subsystem::Utils => "ISteamUtils",
        };
        write!(f, "{}", name)
    }
}

/// Opaque pointer to one native subsystem interface
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct NativeInterface {
    subsystem: Subsystem,
    ptr: NonNull<c_void>,
}

// The SDK's interface objects are process-wide and callable from any thread.
unsafe impl Send for NativeInterface {}
unsafe impl Sync for NativeInterface {}

impl NativeInterface {
    pub(crate) fn new(subsystem: Subsystem, ptr: NonNull<c_void>) -> Self {
        Self { subsystem, ptr }
    }

    pub fn subsystem(&self) -> Subsystem {
        self.subsystem
    }

    /// Raw pointer for use with the flat API
    pub fn as_ptr(&self) -> *mut c_void {
        self.ptr.as_ptr()
    }
}

/// Interface handles captured once per session
#[derive(Debug, Clone, Default)]
pub struct Interfaces {
    handles: [Option<NativeInterface>; 6],
}

impl Interfaces {
    /// Call every accessor once and keep the non-null results
    ///
    /// # Safety
    ///
    /// The SDK must be initialized.
    pub(crate) unsafe fn resolve(api: &SteamApi) -> Self {
        let mut interfaces = Self::default();
        for subsystem in Subsystem::ALL {
            let symbol = subsystem.accessor_symbol();
            let Some(accessor) = api.interface_accessor(symbol) else {
                log::warn!("{} accessor {} not exported", subsystem, symbol);
                continue;
            };
            match NonNull::new(accessor()) {
                Some(ptr) => interfaces.insert(NativeInterface::new(subsystem, ptr)),
                None => log::warn!("{} returned a null interface", symbol),
            }
        }
        interfaces
    }

    pub(crate) fn insert(&mut self, interface: NativeInterface) {
        self.handles[interface.subsystem.index()] = Some(interface);
    }

    pub fn get(&self, subsystem: Subsystem) -> Option<NativeInterface> {
        self.handles[subsystem.index()]
    }

    /// Like [`get`](Self::get), but an absent interface is an error
    pub fn require(&self, subsystem: Subsystem) -> Result<NativeInterface> {
        self.get(subsystem)
            .ok_or_else(|| BridgeError::InterfaceUnavailable(subsystem.to_string()))
    }

    pub fn friends(&self) -> Option<NativeInterface> {
        self.get(Subsystem::Friends)
    }

    pub fn remote_storage(&self) -> Option<NativeInterface> {
        self.get(Subsystem::RemoteStorage)
    }

    pub fn ugc(&self) -> Option<NativeInterface> {
        self.get(Subsystem::Ugc)
    }

    pub fn user(&self) -> Option<NativeInterface> {
        self.get(Subsystem::User)
    }

    pub fn user_stats(&self) -> Option<NativeInterface> {
        self.get(Subsystem::UserStats)
    }

    pub fn utils(&self) -> Option<NativeInterface> {
        self.get(Subsystem::Utils)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_interfaces() {
        let interfaces = Interfaces::default();
        for subsystem in Subsystem::ALL {
            assert!(interfaces.get(subsystem).is_none());
        }
        let err = interfaces.require(Subsystem::Utils).unwrap_err();
        assert_eq!(err.to_string(), "Steam interface unavailable: ISteamUtils");
    }

    #[test]
    fn test_insert_and_get() {
        let mut interfaces = Interfaces::default();
        let ptr = NonNull::<u64>::dangling().cast::<c_void>();
        interfaces.insert(NativeInterface::new(Subsystem::Friends, ptr));

        let friends = interfaces.friends().unwrap();
        assert_eq!(friends.subsystem(), Subsystem::Friends);
        assert_eq!(friends.as_ptr(), ptr.as_ptr());
        assert!(interfaces.ugc().is_none());
    }

    #[test]
    fn test_accessor_symbols_are_distinct() {
        let mut symbols: Vec<&str> = Subsystem::ALL.iter().map(|s| s.accessor_symbol()).collect();
        symbols.sort();
        symbols.dedup();
        assert_eq!(symbols.len(), Subsystem::ALL.len());
    }
}
