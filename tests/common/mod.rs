//! Shared fixtures for channel manager integration tests

#![allow(dead_code)]

use hyprstream_channels::{
    Channel, ChannelEndpoint, ChannelFactory, ChannelState, IoThread, IoThreadConfig,
    PlatformHandle, TaskRunner, WeakChannelManager,
};
use parking_lot::Mutex;
use std::sync::mpsc;
use std::sync::{Arc, Weak};
use std::time::Duration;

pub const TIMEOUT: Duration = Duration::from_secs(5);

/// One recorded call on a [`RecordingChannel`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Call {
    Init,
    SetBootstrapEndpoint,
    SetChannelManager,
    WillShutdownSoon,
    Shutdown,
    Dropped,
    Callback,
}

#[derive(Debug, Clone)]
pub struct Event {
    /// Serial number of the channel, in creation order (0 for callbacks)
    pub channel: usize,
    pub call: Call,
    pub thread: Option<String>,
}

/// Shared, ordered log of everything the fakes observed.
#[derive(Debug, Clone, Default)]
pub struct CallLog {
    events: Arc<Mutex<Vec<Event>>>,
}

impl CallLog {
    pub fn record(&self, channel: usize, call: Call) {
        self.events.lock().push(Event {
            channel,
            call,
            thread: std::thread::current().name().map(String::from),
        });
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.lock().clone()
    }

    pub fn calls_for(&self, channel: usize) -> Vec<Call> {
        self.events
            .lock()
            .iter()
            .filter(|e| e.channel == channel)
            .map(|e| e.call)
            .collect()
    }

    /// Position of the first matching event in the global order.
    pub fn position(&self, channel: usize, call: Call) -> Option<usize> {
        self.events
            .lock()
            .iter()
            .position(|e| e.channel == channel && e.call == call)
    }

    pub fn thread_of(&self, channel: usize, call: Call) -> Option<String> {
        self.events
            .lock()
            .iter()
            .find(|e| e.channel == channel && e.call == call)
            .and_then(|e| e.thread.clone())
    }

    /// A completion callback that records itself.
    pub fn callback(&self, done: mpsc::Sender<()>) -> impl FnOnce() + Send + 'static {
        let log = self.clone();
        move || {
            log.record(0, Call::Callback);
            let _ = done.send(());
        }
    }
}

/// Channel fake that records the order and thread of every call.
pub struct RecordingChannel {
    serial: usize,
    log: CallLog,
    state: Mutex<ChannelState>,
    handle: Mutex<Option<PlatformHandle>>,
    endpoint: Mutex<Option<ChannelEndpoint>>,
}

impl RecordingChannel {
    pub fn serial(&self) -> usize {
        self.serial
    }

    pub fn bootstrap_messages(&self) -> Vec<bytes::Bytes> {
        self.endpoint
            .lock()
            .as_ref()
            .map(ChannelEndpoint::drain_outgoing)
            .unwrap_or_default()
    }
}

impl Channel for RecordingChannel {
    fn init(&self, handle: PlatformHandle) {
        self.log.record(self.serial, Call::Init);
        *self.handle.lock() = Some(handle);
        self.state.lock().advance(ChannelState::Active);
    }

    fn set_bootstrap_endpoint(&self, endpoint: ChannelEndpoint) {
        self.log.record(self.serial, Call::SetBootstrapEndpoint);
        endpoint.attach();
        *self.endpoint.lock() = Some(endpoint);
    }

    fn set_channel_manager(&self, _manager: WeakChannelManager) {
        self.log.record(self.serial, Call::SetChannelManager);
    }

    fn will_shutdown_soon(&self) {
        self.log.record(self.serial, Call::WillShutdownSoon);
        self.state.lock().notify_shutting_down();
    }

    fn shutdown(&self) {
        self.log.record(self.serial, Call::Shutdown);
        self.state.lock().advance(ChannelState::Shutdown);
        self.handle.lock().take();
        self.endpoint.lock().take();
    }

    fn state(&self) -> ChannelState {
        *self.state.lock()
    }
}

impl Drop for RecordingChannel {
    fn drop(&mut self) {
        self.log.record(self.serial, Call::Dropped);
    }
}

/// Factory producing [`RecordingChannel`]s numbered from 1.
#[derive(Clone, Default)]
pub struct RecordingFactory {
    pub log: CallLog,
    created: Arc<Mutex<Vec<Weak<RecordingChannel>>>>,
}

impl RecordingFactory {
    /// The channel with `serial`, if it is still alive.
    pub fn channel(&self, serial: usize) -> Option<Arc<RecordingChannel>> {
        self.created.lock().get(serial - 1).and_then(Weak::upgrade)
    }

    pub fn created_count(&self) -> usize {
        self.created.lock().len()
    }
}

impl ChannelFactory for RecordingFactory {
    fn create_channel(&self) -> Arc<dyn Channel> {
        let mut created = self.created.lock();
        let channel = Arc::new(RecordingChannel {
            serial: created.len() + 1,
            log: self.log.clone(),
            state: Mutex::new(ChannelState::Uninitialized),
            handle: Mutex::new(None),
            endpoint: Mutex::new(None),
        });
        created.push(Arc::downgrade(&channel));
        channel
    }
}

pub fn spawn_io(name: &str) -> IoThread {
    IoThread::spawn(&IoThreadConfig {
        name: name.to_string(),
        stack_size: None,
    })
    .expect("failed to spawn I/O thread")
}

/// Run `f` on the runner's thread and wait for its result.
pub fn run_on<R, F>(runner: &TaskRunner, f: F) -> R
where
    R: Send + 'static,
    F: FnOnce() -> R + Send + 'static,
{
    let (tx, rx) = mpsc::channel();
    runner
        .post(move || {
            let _ = tx.send(f());
        })
        .expect("runner stopped");
    rx.recv_timeout(TIMEOUT).expect("task did not run")
}

/// Wait until everything posted to `runner` so far has run.
pub fn flush(runner: &TaskRunner) {
    run_on(runner, || ());
}

/// Park the runner's thread until the returned sender is dropped or signalled.
pub fn block(runner: &TaskRunner) -> mpsc::Sender<()> {
    let (tx, rx) = mpsc::channel::<()>();
    runner
        .post(move || {
            let _ = rx.recv();
        })
        .expect("runner stopped");
    tx
}

pub fn handle() -> PlatformHandle {
    let (local, _remote) = PlatformHandle::pair().expect("socketpair failed");
    local
}
