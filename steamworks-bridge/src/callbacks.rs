//! Typed callback events and async stream fan-out
//!
//! The session client builds its [`Bridge`](crate::Bridge) with
//! [`stream_table`], whose slots are the forwarders below. Each forwarder maps
//! the native payload to a typed event and sends it to every live stream
//! subscriber. Subscribers whose receiver has been dropped are pruned on the
//! next delivery.

use bitflags::bitflags;
use futures::channel::mpsc::{self, UnboundedReceiver, UnboundedSender};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use slotmap::{DefaultKey, DenseSlotMap};
use std::ptr;
use std::sync::LazyLock;

use crate::bridge::CallbackTable;
use crate::sys;
use crate::types::{EventKind, SteamId};

/// <https://partner.steamgames.com/doc/api/ISteamFriends#PersonaStateChange_t>
#[derive(Debug, Copy, Clone, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub struct PersonaStateChange {
    pub steam_id: SteamId,
    pub change_flags: PersonaStateChangeFlags,
}

bitflags! {
    /// <https://partner.steamgames.com/doc/api/ISteamFriends#EPersonaChange>
    #[derive(Debug, Copy, Clone, Hash, Eq, PartialEq, Serialize, Deserialize)]
    pub struct PersonaStateChangeFlags: u32 {
        const NAME = sys::EPersonaChange_k_EPersonaChangeName as u32;
        const STATUS = sys::EPersonaChange_k_EPersonaChangeStatus as u32;
        const COME_ONLINE = sys::EPersonaChange_k_EPersonaChangeComeOnline as u32;
        const GONE_OFFLINE = sys::EPersonaChange_k_EPersonaChangeGoneOffline as u32;
        const GAME_PLAYED = sys::EPersonaChange_k_EPersonaChangeGamePlayed as u32;
        const GAME_SERVER = sys::EPersonaChange_k_EPersonaChangeGameServer as u32;
        const AVATAR = sys::EPersonaChange_k_EPersonaChangeAvatar as u32;
        const JOINED_SOURCE = sys::EPersonaChange_k_EPersonaChangeJoinedSource as u32;
        const LEFT_SOURCE = sys::EPersonaChange_k_EPersonaChangeLeftSource as u32;
        const RELATIONSHIP_CHANGED = sys::EPersonaChange_k_EPersonaChangeRelationshipChanged as u32;
        const NAME_FIRST_SET = sys::EPersonaChange_k_EPersonaChangeNameFirstSet as u32;
        const BROADCAST = sys::EPersonaChange_k_EPersonaChangeBroadcast as u32;
        const NICKNAME = sys::EPersonaChange_k_EPersonaChangeNickname as u32;
        const STEAM_LEVEL = sys::EPersonaChange_k_EPersonaChangeSteamLevel as u32;
        const RICH_PRESENCE = sys::EPersonaChange_k_EPersonaChangeRichPresence as u32;
    }
}

impl From<sys::PersonaStateChange_t> for PersonaStateChange {
    fn from(raw: sys::PersonaStateChange_t) -> Self {
        let steam_id = raw.m_ulSteamID;
        let change_flags = raw.m_nChangeFlags;
        Self {
            steam_id: steam_id.into(),
            change_flags: PersonaStateChangeFlags::from_bits_truncate(change_flags as u32),
        }
    }
}

type CallbackStorage<T> = Mutex<DenseSlotMap<DefaultKey, UnboundedSender<T>>>;

/// Per-kind subscriber lists
#[derive(Debug, Default)]
pub struct EventStreams {
    persona_state_change: CallbackStorage<PersonaStateChange>,
    steam_shutdown: CallbackStorage<()>,
}

impl EventStreams {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a new stream of presence changes
    pub fn subscribe_persona_state_changes(&self) -> UnboundedReceiver<PersonaStateChange> {
        subscribe(&self.persona_state_change)
    }

    /// Open a new stream of shutdown requests
    pub fn subscribe_steam_shutdown(&self) -> UnboundedReceiver<()> {
        subscribe(&self.steam_shutdown)
    }

    /// Send a presence change to every subscriber; returns how many received it
    pub fn publish_persona_state_change(&self, event: PersonaStateChange) -> usize {
        publish(&self.persona_state_change, event)
    }

    /// Send a shutdown request to every subscriber; returns how many received it
    pub fn publish_steam_shutdown(&self) -> usize {
        publish(&self.steam_shutdown, ())
    }

    /// Drop every sender so all open streams end
    ///
    /// Returns the number of subscribers that were closed. Later subscriptions
    /// start fresh.
    pub fn close_all(&self) -> usize {
        let persona = self.persona_state_change.lock().drain().count();
        let shutdown = self.steam_shutdown.lock().drain().count();
        persona + shutdown
    }

    /// Number of subscribers currently held for `kind` (including ones not yet pruned)
    pub fn subscriber_count(&self, kind: EventKind) -> usize {
        match kind {
            EventKind::PersonaStateChange => self.persona_state_change.lock().len(),
            EventKind::SteamShutdown => self.steam_shutdown.lock().len(),
        }
    }
}

fn subscribe<T>(storage: &CallbackStorage<T>) -> UnboundedReceiver<T> {
    let (tx, rx) = mpsc::unbounded();
    storage.lock().insert(tx);
    rx
}

fn publish<T: Clone>(storage: &CallbackStorage<T>, event: T) -> usize {
    let mut subscribers = storage.lock();
    subscribers.retain(|_key, tx| tx.unbounded_send(event.clone()).is_ok());
    subscribers.len()
}

/// Subscribers of the process-wide Steam session
pub(crate) static SESSION_STREAMS: LazyLock<EventStreams> = LazyLock::new(EventStreams::new);

unsafe extern "C" fn forward_persona_state_changed(raw: *mut sys::PersonaStateChange_t) {
    let raw = ptr::read_unaligned(raw);
    let event = PersonaStateChange::from(raw);
    log::trace!("Persona state change: {} {:?}", event.steam_id, event.change_flags);
    SESSION_STREAMS.publish_persona_state_change(event);
}

unsafe extern "C" fn forward_steam_shutdown(_raw: *mut sys::SteamShutdown_t) {
    log::info!("Steam requested shutdown");
    SESSION_STREAMS.publish_steam_shutdown();
}

/// Callback table that feeds the session's async streams
pub fn stream_table() -> CallbackTable {
    CallbackTable {
        on_persona_state_changed: forward_persona_state_changed,
        on_steam_shutdown: forward_steam_shutdown,
    }
}
