//! Channel lifecycle registry for hyprstream IPC.
//!
//! A [`ChannelManager`] creates, tracks and tears down the channels of one
//! process. Channel objects live on a single dedicated I/O thread
//! ([`IoThread`]); callers on any thread request creation and shutdown,
//! which are marshaled to that thread, and completion is reported back
//! through callbacks, optionally on yet another thread.

pub mod channel;
pub mod config;
pub mod error;
pub mod ids;
pub mod logging;
pub mod manager;
pub mod message_pipe;
pub mod platform;
pub mod registry;
pub mod task_runner;

// Re-export commonly used types
pub use channel::{Channel, ChannelFactory, ChannelState, PipeChannel, PipeChannelFactory};
pub use config::{ChannelsConfig, IoThreadConfig};
pub use error::{ChannelError, Result};
pub use ids::{ChannelId, ChannelIdAllocator};
pub use manager::{ChannelManager, WeakChannelManager};
pub use message_pipe::{ChannelEndpoint, MessagePipeDispatcher};
pub use platform::PlatformHandle;
pub use registry::ChannelRegistry;
pub use task_runner::{deliver_callback, Callback, IoThread, Task, TaskRunner};
