//! Raw bindings to the Steamworks flat API
//!
//! The steam_api library is proprietary and shipped by the application, so it
//! is opened at runtime with `libloading` instead of being linked. This module
//! holds the fixed native payload layouts, the callback ids the bridge cares
//! about, and [`SteamApi`], the table of resolved entry points.
//!
//! Native callback structs use 4-byte packing on Linux/macOS and 8-byte
//! packing on Windows (`VALVE_CALLBACK_PACK_SMALL` / `_LARGE`). Fields of the
//! packed structs must be copied out, never borrowed.

#![allow(non_camel_case_types, non_snake_case)]

use std::ffi::{c_char, c_void, CStr};
use std::path::Path;

use libloading::Library;

use crate::types::{BridgeError, Result};

pub type HSteamPipe = i32;
pub type HSteamUser = i32;

/// `SteamErrMsg` from `steam_api.h`
pub type SteamErrMsg = [c_char; 1024];

const K_I_STEAM_FRIENDS_CALLBACKS: i32 = 300;
const K_I_STEAM_UTILS_CALLBACKS: i32 = 700;

/// Callback id of `SteamAPICallCompleted_t` (call-result completion)
pub const STEAM_API_CALL_COMPLETED_CALLBACK: i32 = K_I_STEAM_UTILS_CALLBACKS + 3;

/// <https://partner.steamgames.com/doc/api/ISteamFriends#PersonaStateChange_t>
#[cfg_attr(target_os = "windows", repr(C, packed(8)))]
#[cfg_attr(not(target_os = "windows"), repr(C, packed(4)))]
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct PersonaStateChange_t {
    pub m_ulSteamID: u64,
    pub m_nChangeFlags: i32,
}

impl PersonaStateChange_t {
    pub const K_ICALLBACK: i32 = K_I_STEAM_FRIENDS_CALLBACKS + 4;
}

/// <https://partner.steamgames.com/doc/api/ISteamUtils#SteamShutdown_t>
///
/// Empty in C++, hence one byte wide.
#[repr(C)]
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct SteamShutdown_t {
    pub _unused: u8,
}

impl SteamShutdown_t {
    pub const K_ICALLBACK: i32 = K_I_STEAM_UTILS_CALLBACKS + 4;
}

/// One message from the manual-dispatch queue
#[cfg_attr(target_os = "windows", repr(C, packed(8)))]
#[cfg_attr(not(target_os = "windows"), repr(C, packed(4)))]
#[derive(Debug, Copy, Clone)]
pub struct CallbackMsg_t {
    pub m_hSteamUser: HSteamUser,
    pub m_iCallback: i32,
    pub m_pubParam: *mut u8,
    pub m_cubParam: i32,
}

// EPersonaChange bits
pub const EPersonaChange_k_EPersonaChangeName: i32 = 0x0001;
pub const EPersonaChange_k_EPersonaChangeStatus: i32 = 0x0002;
pub const EPersonaChange_k_EPersonaChangeComeOnline: i32 = 0x0004;
pub const EPersonaChange_k_EPersonaChangeGoneOffline: i32 = 0x0008;
pub const EPersonaChange_k_EPersonaChangeGamePlayed: i32 = 0x0010;
pub const EPersonaChange_k_EPersonaChangeGameServer: i32 = 0x0020;
pub const EPersonaChange_k_EPersonaChangeAvatar: i32 = 0x0040;
pub const EPersonaChange_k_EPersonaChangeJoinedSource: i32 = 0x0080;
pub const EPersonaChange_k_EPersonaChangeLeftSource: i32 = 0x0100;
pub const EPersonaChange_k_EPersonaChangeRelationshipChanged: i32 = 0x0200;
pub const EPersonaChange_k_EPersonaChangeNameFirstSet: i32 = 0x0400;
pub const EPersonaChange_k_EPersonaChangeBroadcast: i32 = 0x0800;
pub const EPersonaChange_k_EPersonaChangeNickname: i32 = 0x1000;
pub const EPersonaChange_k_EPersonaChangeSteamLevel: i32 = 0x2000;
pub const EPersonaChange_k_EPersonaChangeRichPresence: i32 = 0x4000;

/// `ESteamAPIInitResult`
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ESteamAPIInitResult {
    Ok = 0,
    FailedGeneric = 1,
    NoSteamClient = 2,
    VersionMismatch = 3,
}

impl ESteamAPIInitResult {
    fn from_raw(raw: i32) -> Option<Self> {
        match raw {
            0 => Some(Self::Ok),
            1 => Some(Self::FailedGeneric),
            2 => Some(Self::NoSteamClient),
            3 => Some(Self::VersionMismatch),
            _ => None,
        }
    }
}

type InitFlatFn = unsafe extern "C" fn(*mut SteamErrMsg) -> i32;
type InitLegacyFn = unsafe extern "C" fn() -> bool;
type VoidFn = unsafe extern "C" fn();
type GetPipeFn = unsafe extern "C" fn() -> HSteamPipe;
type PipeFn = unsafe extern "C" fn(HSteamPipe);
type GetNextCallbackFn = unsafe extern "C" fn(HSteamPipe, *mut CallbackMsg_t) -> bool;
type GetAppIdFn = unsafe extern "C" fn(*mut c_void) -> u32;

/// Accessor returning a subsystem interface pointer, e.g. `SteamAPI_SteamFriends_v017`
pub type InterfaceAccessorFn = unsafe extern "C" fn() -> *mut c_void;

/// Newer SDKs export `SteamAPI_InitFlat`; older ones only `SteamAPI_Init`
#[derive(Debug, Clone, Copy)]
enum InitEntry {
    Flat(InitFlatFn),
    Legacy(InitLegacyFn),
}

/// Entry points resolved from a loaded steam_api library
///
/// The function pointers stay valid for as long as the owned [`Library`] is
/// loaded, which is the lifetime of this struct.
pub struct SteamApi {
    init: InitEntry,
    shutdown: VoidFn,
    get_hsteam_pipe: GetPipeFn,
    manual_dispatch_init: VoidFn,
    manual_dispatch_run_frame: PipeFn,
    manual_dispatch_get_next_callback: GetNextCallbackFn,
    manual_dispatch_free_last_callback: PipeFn,
    utils_get_app_id: GetAppIdFn,
    library: Library,
}

impl std::fmt::Debug for SteamApi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SteamApi").field("init", &self.init).finish_non_exhaustive()
    }
}

impl SteamApi {
    /// Open the steam_api library and resolve every required entry point
    pub fn load(path: &Path) -> Result<Self> {
        log::info!("Loading steam_api library: {:?}", path);

        let library = unsafe { Library::new(path) }
            .map_err(|e| BridgeError::LibraryLoad(format!("{}: {}", path.display(), e)))?;

        let init = match optional::<InitFlatFn>(&library, "SteamAPI_InitFlat") {
            Some(init_flat) => InitEntry::Flat(init_flat),
            None => {
                log::debug!("SteamAPI_InitFlat not exported, using SteamAPI_Init");
                InitEntry::Legacy(required(&library, "SteamAPI_Init")?)
            }
        };

        Ok(Self {
            init,
            shutdown: required(&library, "SteamAPI_Shutdown")?,
            get_hsteam_pipe: required(&library, "SteamAPI_GetHSteamPipe")?,
            manual_dispatch_init: required(&library, "SteamAPI_ManualDispatch_Init")?,
            manual_dispatch_run_frame: required(&library, "SteamAPI_ManualDispatch_RunFrame")?,
            manual_dispatch_get_next_callback: required(
                &library,
                "SteamAPI_ManualDispatch_GetNextCallback",
            )?,
            manual_dispatch_free_last_callback: required(
                &library,
                "SteamAPI_ManualDispatch_FreeLastCallback",
            )?,
            utils_get_app_id: required(&library, "SteamAPI_ISteamUtils_GetAppID")?,
            library,
        })
    }

    /// Resolve an optional accessor such as `SteamAPI_SteamUGC_v017`
    pub fn interface_accessor(&self, symbol: &str) -> Option<InterfaceAccessorFn> {
        optional(&self.library, symbol)
    }

    /// Initialize the Steamworks API (`SteamAPI_InitFlat` / `SteamAPI_Init`)
    ///
    /// # Safety
    ///
    /// Must not be called while another session is initialized from this process.
    pub unsafe fn init(&self) -> Result<()> {
        match self.init {
            InitEntry::Flat(init_flat) => {
                let mut message: SteamErrMsg = [0; 1024];
                let raw = init_flat(&mut message);
                match ESteamAPIInitResult::from_raw(raw) {
                    Some(ESteamAPIInitResult::Ok) => Ok(()),
                    result => {
                        let detail = CStr::from_ptr(message.as_ptr()).to_string_lossy();
                        Err(BridgeError::InitFailed(format!(
                            "SteamAPI_InitFlat returned {:?} ({}): {}",
                            result, raw, detail
                        )))
                    }
                }
            }
            InitEntry::Legacy(init) => {
                if init() {
                    Ok(())
                } else {
                    Err(BridgeError::InitFailed(
                        "SteamAPI_Init() returned false".to_string(),
                    ))
                }
            }
        }
    }

    /// # Safety
    ///
    /// Only after a successful [`init`](Self::init), once per session.
    pub unsafe fn shutdown(&self) {
        (self.shutdown)()
    }

    /// # Safety
    ///
    /// Only after a successful [`init`](Self::init).
    pub unsafe fn pipe(&self) -> HSteamPipe {
        (self.get_hsteam_pipe)()
    }

    /// Switch the session to manual dispatch (`SteamAPI_ManualDispatch_Init`)
    ///
    /// # Safety
    ///
    /// Only after a successful [`init`](Self::init).
    pub unsafe fn enable_manual_dispatch(&self) {
        (self.manual_dispatch_init)()
    }

    /// # Safety
    ///
    /// `pipe` must come from [`pipe`](Self::pipe) of the live session.
    pub unsafe fn run_frame(&self, pipe: HSteamPipe) {
        (self.manual_dispatch_run_frame)(pipe)
    }

    /// Pop the next queued callback, if any
    ///
    /// # Safety
    ///
    /// The returned message's payload is valid until
    /// [`free_last_callback`](Self::free_last_callback) is called.
    pub unsafe fn next_callback(&self, pipe: HSteamPipe) -> Option<CallbackMsg_t> {
        let mut msg = std::mem::MaybeUninit::<CallbackMsg_t>::uninit();
        if (self.manual_dispatch_get_next_callback)(pipe, msg.as_mut_ptr()) {
            Some(msg.assume_init())
        } else {
            None
        }
    }

    /// # Safety
    ///
    /// Must follow every message returned by [`next_callback`](Self::next_callback).
    pub unsafe fn free_last_callback(&self, pipe: HSteamPipe) {
        (self.manual_dispatch_free_last_callback)(pipe)
    }

    /// # Safety
    ///
    /// `utils` must be a live `ISteamUtils` interface pointer.
    pub unsafe fn utils_app_id(&self, utils: *mut c_void) -> u32 {
        (self.utils_get_app_id)(utils)
    }
}

fn required<T: Copy>(library: &Library, symbol: &str) -> Result<T> {
    optional(library, symbol).ok_or_else(|| BridgeError::MissingSymbol(symbol.to_string()))
}

fn optional<T: Copy>(library: &Library, symbol: &str) -> Option<T> {
    match unsafe { library.get::<T>(symbol.as_bytes()) } {
        Ok(sym) => Some(*sym),
        Err(e) => {
            log::trace!("Symbol {} not resolved: {}", symbol, e);
            None
        }
    }
}
