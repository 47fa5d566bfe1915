//! Channel contract and the default pipe-backed channel.
//!
//! The registry never looks inside a channel. It drives every channel
//! through the same lifecycle:
//!
//! ```text
//! Uninitialized -> Active -> NotifiedShuttingDown -> Shutdown
//! ```
//!
//! `NotifiedShuttingDown` may be skipped (whole-manager teardown goes
//! straight to `Shutdown`), but a channel never moves backwards.

use bytes::Bytes;
use parking_lot::Mutex;
use std::fmt;
use std::os::fd::RawFd;
use std::sync::Arc;

use crate::error::contract_violation;
use crate::manager::{ChannelManager, WeakChannelManager};
use crate::message_pipe::ChannelEndpoint;
use crate::platform::PlatformHandle;

/// Lifecycle state of a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ChannelState {
    Uninitialized,
    Active,
    /// Pre-shutdown notice delivered; still usable.
    NotifiedShuttingDown,
    /// Terminal; no further I/O.
    Shutdown,
}

impl ChannelState {
    /// Move to `next`.
    ///
    /// # Panics
    ///
    /// Panics unless `next` is strictly later in the lifecycle.
    #[track_caller]
    pub fn advance(&mut self, next: ChannelState) {
        if next <= *self {
            contract_violation(format_args!(
                "illegal channel state transition {:?} -> {:?}",
                self, next
            ));
        }
        *self = next;
    }

    /// Record the pre-shutdown notice. Repeating it is allowed.
    ///
    /// # Panics
    ///
    /// Panics once the channel has been shut down.
    #[track_caller]
    pub fn notify_shutting_down(&mut self) {
        if *self != ChannelState::NotifiedShuttingDown {
            self.advance(ChannelState::NotifiedShuttingDown);
        }
    }
}

impl fmt::Display for ChannelState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ChannelState::Uninitialized => "uninitialized",
            ChannelState::Active => "active",
            ChannelState::NotifiedShuttingDown => "shutting-down",
            ChannelState::Shutdown => "shutdown",
        };
        f.write_str(name)
    }
}

/// One logical connection over a native transport handle.
///
/// Channels are shared (`Arc<dyn Channel>`) between the registry and any
/// message pipes riding on them, so every method takes `&self`.
/// [`ChannelManager`] calls `init`, `set_bootstrap_endpoint` and
/// `set_channel_manager` during creation, and `shutdown` exactly once, all
/// on the I/O thread. `will_shutdown_soon` may be called from any thread.
pub trait Channel: Send + Sync {
    /// Bind the transport. Consumes the handle.
    fn init(&self, handle: PlatformHandle);

    /// Take ownership of the bootstrap message pipe endpoint.
    fn set_bootstrap_endpoint(&self, endpoint: ChannelEndpoint);

    fn set_channel_manager(&self, manager: WeakChannelManager);

    /// Pre-shutdown notice: stop accepting new work.
    fn will_shutdown_soon(&self);

    /// Terminal shutdown. Must be called exactly once.
    fn shutdown(&self);

    fn state(&self) -> ChannelState;
}

/// Builds the channels a [`ChannelManager`] registers.
pub trait ChannelFactory: Send + Sync {
    fn create_channel(&self) -> Arc<dyn Channel>;
}

impl<F> ChannelFactory for F
where
    F: Fn() -> Arc<dyn Channel> + Send + Sync,
{
    fn create_channel(&self) -> Arc<dyn Channel> {
        self()
    }
}

/// Factory for [`PipeChannel`]s.
#[derive(Debug, Default, Clone, Copy)]
pub struct PipeChannelFactory;

impl ChannelFactory for PipeChannelFactory {
    fn create_channel(&self) -> Arc<dyn Channel> {
        Arc::new(PipeChannel::new())
    }
}

struct PipeChannelInner {
    state: ChannelState,
    handle: PlatformHandle,
    bootstrap_endpoint: Option<ChannelEndpoint>,
    manager: Option<WeakChannelManager>,
}

/// Default channel: owns the transport handle and the bootstrap endpoint
/// and releases both at shutdown.
pub struct PipeChannel {
    inner: Mutex<PipeChannelInner>,
}

impl PipeChannel {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(PipeChannelInner {
                state: ChannelState::Uninitialized,
                handle: PlatformHandle::invalid(),
                bootstrap_endpoint: None,
                manager: None,
            }),
        }
    }

    pub fn raw_fd(&self) -> Option<RawFd> {
        self.inner.lock().handle.raw_fd()
    }

    pub fn has_bootstrap_endpoint(&self) -> bool {
        self.inner.lock().bootstrap_endpoint.is_some()
    }

    /// Messages the bootstrap pipe's dispatcher has queued for this channel.
    pub fn drain_bootstrap_messages(&self) -> Vec<Bytes> {
        self.inner
            .lock()
            .bootstrap_endpoint
            .as_ref()
            .map(ChannelEndpoint::drain_outgoing)
            .unwrap_or_default()
    }

    /// The manager this channel is bound to, while it is still live and
    /// the channel has not been told to shut down.
    pub fn channel_manager(&self) -> Option<ChannelManager> {
        self.inner.lock().manager.as_ref().and_then(WeakChannelManager::upgrade)
    }
}

impl Default for PipeChannel {
    fn default() -> Self {
        Self::new()
    }
}

impl Channel for PipeChannel {
    fn init(&self, handle: PlatformHandle) {
        if !handle.is_valid() {
            contract_violation(format_args!("channel initialized with an invalid handle"));
        }
        let mut inner = self.inner.lock();
        inner.state.advance(ChannelState::Active);
        inner.handle = handle;
    }

    fn set_bootstrap_endpoint(&self, endpoint: ChannelEndpoint) {
        let mut inner = self.inner.lock();
        if inner.state != ChannelState::Active {
            contract_violation(format_args!(
                "bootstrap endpoint set on {} channel",
                inner.state
            ));
        }
        if inner.bootstrap_endpoint.is_some() {
            contract_violation(format_args!("channel already has a bootstrap endpoint"));
        }
        endpoint.attach();
        inner.bootstrap_endpoint = Some(endpoint);
    }

    fn set_channel_manager(&self, manager: WeakChannelManager) {
        let mut inner = self.inner.lock();
        debug_assert!(inner.manager.is_none(), "channel manager set twice");
        inner.manager = Some(manager);
    }

    fn will_shutdown_soon(&self) {
        let mut inner = self.inner.lock();
        inner.state.notify_shutting_down();
        inner.manager = None;
    }

    fn shutdown(&self) {
        let (handle, endpoint) = {
            let mut inner = self.inner.lock();
            inner.state.advance(ChannelState::Shutdown);
            inner.manager = None;
            (inner.handle.take(), inner.bootstrap_endpoint.take())
        };
        // Closing the descriptor and the pipe happens outside our lock.
        drop(handle);
        if let Some(endpoint) = endpoint {
            endpoint.detach();
        }
    }

    fn state(&self) -> ChannelState {
        self.inner.lock().state
    }
}

impl Drop for PipeChannel {
    fn drop(&mut self) {
        if std::thread::panicking() {
            return;
        }
        let state = self.inner.get_mut().state;
        debug_assert!(
            matches!(state, ChannelState::Uninitialized | ChannelState::Shutdown),
            "channel dropped while {state}"
        );
    }
}

impl fmt::Debug for PipeChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("PipeChannel")
            .field("state", &inner.state)
            .field("fd", &inner.handle.raw_fd())
            .field("bootstrap", &inner.bootstrap_endpoint.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message_pipe::MessagePipeDispatcher;

    #[test]
    fn test_state_advances_monotonically() {
        let mut state = ChannelState::Uninitialized;
        state.advance(ChannelState::Active);
        state.advance(ChannelState::Shutdown);
        assert_eq!(state, ChannelState::Shutdown);
    }

    #[test]
    #[should_panic(expected = "illegal channel state transition")]
    fn test_state_never_regresses() {
        let mut state = ChannelState::NotifiedShuttingDown;
        state.advance(ChannelState::Active);
    }

    #[test]
    fn test_pipe_channel_lifecycle() -> anyhow::Result<()> {
        let (handle, _peer) = PlatformHandle::pair()?;
        let (dispatcher, endpoint) = MessagePipeDispatcher::create_remote_message_pipe();
        dispatcher.write_message(&b"early"[..])?;

        let channel = PipeChannel::new();
        assert_eq!(channel.state(), ChannelState::Uninitialized);

        channel.init(handle);
        assert_eq!(channel.state(), ChannelState::Active);
        assert!(channel.raw_fd().is_some());

        channel.set_bootstrap_endpoint(endpoint);
        assert!(dispatcher.is_attached());
        assert!(channel.has_bootstrap_endpoint());
        assert_eq!(channel.drain_bootstrap_messages(), vec![Bytes::from_static(b"early")]);

        channel.will_shutdown_soon();
        assert_eq!(channel.state(), ChannelState::NotifiedShuttingDown);

        channel.shutdown();
        assert_eq!(channel.state(), ChannelState::Shutdown);
        assert!(channel.raw_fd().is_none());
        assert!(!channel.has_bootstrap_endpoint());
        assert!(dispatcher.is_peer_closed());
        Ok(())
    }

    #[test]
    #[should_panic(expected = "invalid handle")]
    fn test_init_rejects_invalid_handle() {
        PipeChannel::new().init(PlatformHandle::invalid());
    }

    #[test]
    #[should_panic(expected = "illegal channel state transition")]
    fn test_shutdown_twice_panics() {
        let (handle, _peer) = PlatformHandle::pair().unwrap();
        let channel = PipeChannel::new();
        channel.init(handle);
        channel.shutdown();
        channel.shutdown();
    }

    #[test]
    fn test_repeated_shutdown_notice_is_accepted() -> anyhow::Result<()> {
        let (handle, _peer) = PlatformHandle::pair()?;
        let channel = PipeChannel::new();
        channel.init(handle);
        channel.will_shutdown_soon();
        channel.will_shutdown_soon();
        assert_eq!(channel.state(), ChannelState::NotifiedShuttingDown);
        channel.shutdown();
        assert_eq!(channel.state(), ChannelState::Shutdown);
        Ok(())
    }

    #[test]
    #[should_panic(expected = "illegal channel state transition Shutdown -> NotifiedShuttingDown")]
    fn test_shutdown_notice_after_shutdown_panics() {
        let mut state = ChannelState::Shutdown;
        state.notify_shutting_down();
    }

    #[test]
    #[should_panic(expected = "bootstrap endpoint set on uninitialized channel")]
    fn test_bootstrap_requires_active_channel() {
        let (_dispatcher, endpoint) = MessagePipeDispatcher::create_remote_message_pipe();
        PipeChannel::new().set_bootstrap_endpoint(endpoint);
    }

    #[test]
    fn test_closure_factory() {
        let factory = || -> Arc<dyn Channel> { Arc::new(PipeChannel::new()) };
        let channel = ChannelFactory::create_channel(&factory);
        assert_eq!(channel.state(), ChannelState::Uninitialized);
        assert_eq!(PipeChannelFactory.create_channel().state(), ChannelState::Uninitialized);
    }
}
