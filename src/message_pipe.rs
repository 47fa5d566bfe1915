//! Bootstrap message pipes.
//!
//! A remote message pipe has two ends: the [`MessagePipeDispatcher`] handed
//! to the caller, and the [`ChannelEndpoint`] that rides on a channel once
//! the I/O thread has built it. The dispatcher is usable as soon as the pair
//! exists; messages written before the endpoint is attached are queued.

use bytes::Bytes;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;

use crate::error::{contract_violation, ChannelError, Result};

#[derive(Debug, Default)]
struct PipeState {
    attached: bool,
    endpoint_closed: bool,
    dispatcher_closed: bool,
    outgoing: VecDeque<Bytes>,
}

type SharedPipe = Arc<Mutex<PipeState>>;

/// Channel-side end of a remote message pipe.
///
/// Move-only. Ownership passes from the creator into a channel exactly once
/// via [`Channel::set_bootstrap_endpoint`](crate::Channel::set_bootstrap_endpoint).
/// Dropping the endpoint closes the pipe from the channel side.
#[derive(Debug)]
pub struct ChannelEndpoint {
    pipe: SharedPipe,
}

impl ChannelEndpoint {
    /// Mark the endpoint as riding a live channel.
    ///
    /// # Panics
    ///
    /// Panics if the endpoint was already attached.
    pub fn attach(&self) {
        let mut state = self.pipe.lock();
        if state.attached {
            drop(state);
            contract_violation(format_args!("bootstrap endpoint attached twice"));
        }
        state.attached = true;
    }

    pub fn is_attached(&self) -> bool {
        self.pipe.lock().attached
    }

    /// Take every message the dispatcher has queued so far.
    pub fn drain_outgoing(&self) -> Vec<Bytes> {
        self.pipe.lock().outgoing.drain(..).collect()
    }

    /// Whether the dispatcher side has been closed.
    pub fn is_peer_closed(&self) -> bool {
        self.pipe.lock().dispatcher_closed
    }

    /// Close the channel side of the pipe.
    pub fn detach(self) {}
}

impl Drop for ChannelEndpoint {
    fn drop(&mut self) {
        let mut state = self.pipe.lock();
        state.endpoint_closed = true;
        state.outgoing.clear();
    }
}

/// Caller-facing end of a remote message pipe.
#[derive(Debug)]
pub struct MessagePipeDispatcher {
    pipe: SharedPipe,
}

impl MessagePipeDispatcher {
    /// Create a dispatcher paired with the endpoint for its remote side.
    ///
    /// Callable from any thread; never blocks.
    pub fn create_remote_message_pipe() -> (Arc<MessagePipeDispatcher>, ChannelEndpoint) {
        let pipe = SharedPipe::default();
        let dispatcher = Arc::new(MessagePipeDispatcher { pipe: pipe.clone() });
        (dispatcher, ChannelEndpoint { pipe })
    }

    /// Queue a message for the remote side.
    ///
    /// Succeeds before the endpoint is attached; fails once either side
    /// has closed.
    pub fn write_message(&self, message: impl Into<Bytes>) -> Result<()> {
        let mut state = self.pipe.lock();
        if state.endpoint_closed || state.dispatcher_closed {
            return Err(ChannelError::PeerClosed);
        }
        state.outgoing.push_back(message.into());
        Ok(())
    }

    /// Whether the endpoint has been attached to a channel.
    pub fn is_attached(&self) -> bool {
        self.pipe.lock().attached
    }

    pub fn is_peer_closed(&self) -> bool {
        self.pipe.lock().endpoint_closed
    }

    pub fn pending_messages(&self) -> usize {
        self.pipe.lock().outgoing.len()
    }

    pub fn close(&self) {
        let mut state = self.pipe.lock();
        state.dispatcher_closed = true;
        state.outgoing.clear();
    }
}
