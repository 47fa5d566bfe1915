//! Channel identifiers.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Identifies one channel within a [`ChannelManager`](crate::ChannelManager).
///
/// Ids are chosen by the caller (or handed out by a [`ChannelIdAllocator`]) and
/// are never reused while the channel they name is live.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChannelId(u64);

impl ChannelId {
    /// Sentinel that never names a channel. Must not be used as a registry key.
    pub const INVALID: ChannelId = ChannelId(0);

    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub const fn get(self) -> u64 {
        self.0
    }

    pub const fn is_valid(self) -> bool {
        self.0 != Self::INVALID.0
    }
}

impl From<u64> for ChannelId {
    fn from(raw: u64) -> Self {
        Self(raw)
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Hands out fresh, valid channel ids from any thread.
#[derive(Debug)]
pub struct ChannelIdAllocator {
    next: AtomicU64,
}

impl ChannelIdAllocator {
    pub const fn new() -> Self {
        Self {
            next: AtomicU64::new(1),
        }
    }

    /// Returns the next unused id. Never returns [`ChannelId::INVALID`].
    pub fn allocate(&self) -> ChannelId {
        let raw = self.next.fetch_add(1, Ordering::Relaxed);
        assert!(raw != 0, "channel id space exhausted");
        ChannelId(raw)
    }
}

impl Default for ChannelIdAllocator {
    fn default() -> Self {
        Self::new()
    }
}
