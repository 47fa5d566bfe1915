//! Mutex-guarded map from channel id to live channel.
//!
//! Any thread may look channels up; the lock is held only for the map
//! operation itself, never across a channel call or a callback.

use parking_lot::Mutex;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::channel::Channel;
use crate::error::contract_violation;
use crate::ids::ChannelId;

pub type ChannelMap = HashMap<ChannelId, Arc<dyn Channel>>;

/// Registry of live channels.
///
/// An id is present exactly while its channel is live and not yet handed
/// off for shutdown. Every misuse (invalid or duplicate id on insert,
/// absent id on lookup or removal, dropping a non-empty registry) panics.
#[derive(Default)]
pub struct ChannelRegistry {
    channels: Mutex<ChannelMap>,
}

impl ChannelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    #[track_caller]
    pub fn insert(&self, id: ChannelId, channel: Arc<dyn Channel>) {
        if !id.is_valid() {
            contract_violation(format_args!("cannot register channel under the invalid id"));
        }
        let duplicate = {
            let mut channels = self.channels.lock();
            match channels.entry(id) {
                Entry::Occupied(_) => true,
                Entry::Vacant(slot) => {
                    slot.insert(channel);
                    false
                }
            }
        };
        if duplicate {
            contract_violation(format_args!("channel {id} is already registered"));
        }
    }

    #[track_caller]
    pub fn get(&self, id: ChannelId) -> Arc<dyn Channel> {
        let channel = self.channels.lock().get(&id).cloned();
        match channel {
            Some(channel) => channel,
            None => contract_violation(format_args!("no channel registered for id {id}")),
        }
    }

    /// Remove and return the channel for `id`.
    #[track_caller]
    pub fn remove(&self, id: ChannelId) -> Arc<dyn Channel> {
        let channel = self.channels.lock().remove(&id);
        match channel {
            Some(channel) => channel,
            None => contract_violation(format_args!("no channel registered for id {id}")),
        }
    }

    /// Atomically empty the registry, returning everything it held.
    pub fn take_all(&self) -> ChannelMap {
        std::mem::take(&mut *self.channels.lock())
    }

    pub fn contains(&self, id: ChannelId) -> bool {
        self.channels.lock().contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.channels.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.lock().is_empty()
    }

    /// Snapshot of the registered ids, sorted.
    pub fn ids(&self) -> Vec<ChannelId> {
        let mut ids: Vec<_> = self.channels.lock().keys().copied().collect();
        ids.sort_unstable();
        ids
    }
}

impl Drop for ChannelRegistry {
    fn drop(&mut self) {
        if std::thread::panicking() {
            return;
        }
        let live = self.channels.get_mut().len();
        if live != 0 {
            contract_violation(format_args!(
                "channel registry dropped with {live} live channel(s)"
            ));
        }
    }
}

impl fmt::Debug for ChannelRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChannelRegistry")
            .field("ids", &self.ids())
            .finish()
    }
}
