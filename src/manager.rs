//! Channel manager: creates, tracks and tears down channels.
//!
//! Channel construction and terminal shutdown always run on the I/O thread.
//! The asynchronous entry points may be called from any thread; they do the
//! parts specified as synchronous on the caller's thread (handing back the
//! message pipe dispatcher, pulling the channel out of the registry, the
//! pre-shutdown notice) and post the rest to the I/O thread as an owned
//! task. Completion callbacks follow [`deliver_callback`]: posted to the
//! given callback runner, or run inline on the I/O thread when there is none.
//!
//! # Usage
//!
//! ```ignore
//! let io = IoThread::spawn(&config.io_thread)?;
//! let manager = ChannelManager::new(io.runner());
//!
//! let dispatcher = manager.create_channel(ChannelId::new(7), handle);
//! dispatcher.write_message(&b"hello"[..])?; // usable before the channel exists
//!
//! manager.shutdown_channel(ChannelId::new(7), || tracing::info!("closed"), None);
//! manager.shutdown(|| tracing::info!("all channels closed"), None);
//! ```

use std::fmt;
use std::sync::{Arc, Weak};

use tracing::{debug, instrument, trace};

use crate::channel::{Channel, ChannelFactory, PipeChannelFactory};
use crate::error::{contract_violation, ChannelError};
use crate::ids::ChannelId;
use crate::message_pipe::{ChannelEndpoint, MessagePipeDispatcher};
use crate::platform::PlatformHandle;
use crate::registry::ChannelRegistry;
use crate::task_runner::{deliver_callback, Callback, TaskRunner};

struct ManagerInner {
    io_runner: TaskRunner,
    factory: Arc<dyn ChannelFactory>,
    channels: ChannelRegistry,
}

/// Owner of every live channel. Cheap to clone; all clones share one registry.
///
/// Every channel must be shut down before the last clone is dropped.
#[derive(Clone)]
pub struct ChannelManager {
    inner: Arc<ManagerInner>,
}

/// Non-owning reference to a [`ChannelManager`], held by channels.
#[derive(Clone, Default)]
pub struct WeakChannelManager {
    inner: Weak<ManagerInner>,
}

impl WeakChannelManager {
    pub fn upgrade(&self) -> Option<ChannelManager> {
        self.inner.upgrade().map(|inner| ChannelManager { inner })
    }
}

impl fmt::Debug for WeakChannelManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WeakChannelManager")
            .field("live", &(self.inner.strong_count() > 0))
            .finish()
    }
}

impl ChannelManager {
    /// Create a manager whose channels live on `io_runner`'s thread.
    pub fn new(io_runner: TaskRunner) -> Self {
        Self::with_factory(io_runner, PipeChannelFactory)
    }

    pub fn with_factory(io_runner: TaskRunner, factory: impl ChannelFactory + 'static) -> Self {
        Self {
            inner: Arc::new(ManagerInner {
                io_runner,
                factory: Arc::new(factory),
                channels: ChannelRegistry::new(),
            }),
        }
    }

    pub fn io_task_runner(&self) -> &TaskRunner {
        &self.inner.io_runner
    }

    pub fn downgrade(&self) -> WeakChannelManager {
        WeakChannelManager {
            inner: Arc::downgrade(&self.inner),
        }
    }

    // ========================================================================
    // Creation
    // ========================================================================

    /// Create a bootstrapped channel while already on the I/O thread.
    ///
    /// The channel is registered by the time this returns.
    pub fn create_channel_on_io_thread(
        &self,
        channel_id: ChannelId,
        handle: PlatformHandle,
    ) -> Arc<MessagePipeDispatcher> {
        self.assert_on_io_thread();
        let (dispatcher, endpoint) = MessagePipeDispatcher::create_remote_message_pipe();
        self.inner
            .create_channel_on_io_thread_helper(channel_id, handle, Some(endpoint));
        dispatcher
    }

    /// Create a channel with no bootstrap pipe while already on the I/O thread.
    pub fn create_channel_without_bootstrap_on_io_thread(
        &self,
        channel_id: ChannelId,
        handle: PlatformHandle,
    ) -> Arc<dyn Channel> {
        self.assert_on_io_thread();
        self.inner
            .create_channel_on_io_thread_helper(channel_id, handle, None)
    }

    /// Create a bootstrapped channel from any thread.
    ///
    /// Returns the dispatcher immediately; the channel itself is built and
    /// registered on the I/O thread later.
    #[instrument(skip_all, fields(channel_id = %channel_id))]
    pub fn create_channel(
        &self,
        channel_id: ChannelId,
        handle: PlatformHandle,
    ) -> Arc<MessagePipeDispatcher> {
        self.post_create_channel(channel_id, handle, None)
    }

    /// Like [`create_channel`](Self::create_channel), then deliver `callback`
    /// once the channel is registered.
    #[instrument(skip_all, fields(channel_id = %channel_id))]
    pub fn create_channel_with_callback<F>(
        &self,
        channel_id: ChannelId,
        handle: PlatformHandle,
        callback: F,
        callback_runner: Option<TaskRunner>,
    ) -> Arc<MessagePipeDispatcher>
    where
        F: FnOnce() + Send + 'static,
    {
        let callback: Callback = Box::new(callback);
        self.post_create_channel(channel_id, handle, Some((callback, callback_runner)))
    }

    fn post_create_channel(
        &self,
        channel_id: ChannelId,
        handle: PlatformHandle,
        completion: Option<(Callback, Option<TaskRunner>)>,
    ) -> Arc<MessagePipeDispatcher> {
        check_creation_args(channel_id, &handle);

        let (dispatcher, endpoint) = MessagePipeDispatcher::create_remote_message_pipe();
        let inner = self.inner.clone();
        self.post_to_io_thread(move || {
            inner.create_channel_on_io_thread_helper(channel_id, handle, Some(endpoint));
            if let Some((callback, callback_runner)) = completion {
                deliver_callback(callback, callback_runner.as_ref());
            }
        });
        dispatcher
    }

    // ========================================================================
    // Lookup
    // ========================================================================

    /// The channel registered under `channel_id`.
    ///
    /// # Panics
    ///
    /// Panics if no such channel is registered. Callers only ask for ids
    /// they know to be live.
    #[track_caller]
    pub fn get_channel(&self, channel_id: ChannelId) -> Arc<dyn Channel> {
        self.inner.channels.get(channel_id)
    }

    pub fn contains_channel(&self, channel_id: ChannelId) -> bool {
        self.inner.channels.contains(channel_id)
    }

    pub fn channel_count(&self) -> usize {
        self.inner.channels.len()
    }

    pub fn channel_ids(&self) -> Vec<ChannelId> {
        self.inner.channels.ids()
    }

    // ========================================================================
    // Shutdown
    // ========================================================================

    /// Deliver the pre-shutdown notice to a registered channel now, on the
    /// calling thread. The channel stays registered.
    #[track_caller]
    pub fn will_shutdown_channel(&self, channel_id: ChannelId) {
        self.get_channel(channel_id).will_shutdown_soon();
    }

    /// Unregister and shut down one channel while on the I/O thread.
    #[track_caller]
    pub fn shutdown_channel_on_io_thread(&self, channel_id: ChannelId) {
        self.assert_on_io_thread();
        let channel = self.inner.channels.remove(channel_id);
        channel.shutdown();
        debug!(%channel_id, "channel shut down");
    }

    /// Shut down one channel from any thread.
    ///
    /// The channel is unregistered and notified before this returns; a
    /// later [`get_channel`](Self::get_channel) for the id panics. Terminal
    /// shutdown runs on the I/O thread, then `callback` is delivered.
    ///
    /// # Panics
    ///
    /// Panics if the id is not registered, including when a shutdown for
    /// it is already in flight.
    #[instrument(skip_all, fields(channel_id = %channel_id))]
    pub fn shutdown_channel<F>(
        &self,
        channel_id: ChannelId,
        callback: F,
        callback_runner: Option<TaskRunner>,
    ) where
        F: FnOnce() + Send + 'static,
    {
        let channel = self.inner.channels.remove(channel_id);
        channel.will_shutdown_soon();
        trace!("channel unregistered, posting shutdown");

        self.post_to_io_thread(move || {
            channel.shutdown();
            debug!(%channel_id, "channel shut down");
            drop(channel);
            deliver_callback(Box::new(callback), callback_runner.as_ref());
        });
    }

    /// Shut down every registered channel while on the I/O thread.
    pub fn shutdown_on_io_thread(&self) {
        self.assert_on_io_thread();
        self.inner.shutdown_on_io_thread();
    }

    /// Shut down every channel from any thread, then deliver `callback`.
    #[instrument(skip_all)]
    pub fn shutdown<F>(&self, callback: F, callback_runner: Option<TaskRunner>)
    where
        F: FnOnce() + Send + 'static,
    {
        let inner = self.inner.clone();
        self.post_to_io_thread(move || {
            inner.shutdown_on_io_thread();
            drop(inner);
            deliver_callback(Box::new(callback), callback_runner.as_ref());
        });
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    #[track_caller]
    fn assert_on_io_thread(&self) {
        debug_assert!(
            self.inner.io_runner.runs_tasks_on_current_thread(),
            "must be called on the I/O thread ({})",
            self.inner.io_runner.name()
        );
    }

    fn post_to_io_thread<F>(&self, task: F)
    where
        F: FnOnce() + Send + 'static,
    {
        if let Err(task) = self.inner.io_runner.try_post(Box::new(task)) {
            // Leaked: it owns channels that were never shut down.
            std::mem::forget(task);
            let e = ChannelError::IoThreadStopped(self.inner.io_runner.name().to_string());
            contract_violation(format_args!("channel manager used after its I/O thread stopped: {e}"));
        }
    }
}

impl ManagerInner {
    fn create_channel_on_io_thread_helper(
        self: &Arc<Self>,
        channel_id: ChannelId,
        handle: PlatformHandle,
        bootstrap_endpoint: Option<ChannelEndpoint>,
    ) -> Arc<dyn Channel> {
        check_creation_args(channel_id, &handle);

        let channel = self.factory.create_channel();
        channel.init(handle);
        if let Some(endpoint) = bootstrap_endpoint {
            channel.set_bootstrap_endpoint(endpoint);
        }

        self.channels.insert(channel_id, channel.clone());
        channel.set_channel_manager(WeakChannelManager {
            inner: Arc::downgrade(self),
        });
        debug!(%channel_id, "channel created");
        channel
    }

    fn shutdown_on_io_thread(&self) {
        let channels = self.channels.take_all();
        debug!(count = channels.len(), "shutting down all channels");
        for (_, channel) in channels {
            channel.shutdown();
        }
    }
}

#[track_caller]
fn check_creation_args(channel_id: ChannelId, handle: &PlatformHandle) {
    if !channel_id.is_valid() {
        contract_violation(format_args!("cannot create a channel with the invalid id"));
    }
    if !handle.is_valid() {
        contract_violation(format_args!(
            "cannot create channel {channel_id} from an invalid platform handle"
        ));
    }
}

impl fmt::Debug for ChannelManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChannelManager")
            .field("io_runner", &self.inner.io_runner)
            .field("channels", &self.inner.channels)
            .finish()
    }
}
