//! I/O-thread executor boundary.
//!
//! All channel construction and terminal shutdown runs on one dedicated
//! thread. Work reaches it as owned closures posted through a [`TaskRunner`];
//! tasks run one at a time, in submission order. The thread drives a
//! current-thread tokio runtime, so a task may `tokio::spawn` transport
//! futures that keep running on the I/O thread between tasks.

use std::sync::Arc;
use std::thread::{self, JoinHandle, ThreadId};

use tokio::sync::mpsc;
use tracing::{debug, trace, warn};

use crate::config::IoThreadConfig;
use crate::error::{contract_violation, ChannelError, Result};

/// Work posted to a [`TaskRunner`].
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// Completion callback accepted by the asynchronous manager entry points.
pub type Callback = Box<dyn FnOnce() + Send + 'static>;

enum Message {
    Run(Task),
    Quit,
}

/// Handle for posting work to an [`IoThread`]. Cheap to clone.
#[derive(Clone)]
pub struct TaskRunner {
    name: Arc<str>,
    thread_id: ThreadId,
    sender: mpsc::UnboundedSender<Message>,
}

impl TaskRunner {
    /// Queue `task` to run on the runner's thread. Never blocks.
    pub fn post<F>(&self, task: F) -> Result<()>
    where
        F: FnOnce() + Send + 'static,
    {
        self.try_post(Box::new(task))
            .map_err(|_| ChannelError::IoThreadStopped(self.name.to_string()))
    }

    /// Like [`post`](Self::post), but hands the task back if the thread
    /// has stopped.
    pub(crate) fn try_post(&self, task: Task) -> std::result::Result<(), Task> {
        trace!(runner = %self.name, "posting task");
        match self.sender.send(Message::Run(task)) {
            Ok(()) => Ok(()),
            Err(mpsc::error::SendError(Message::Run(task))) => Err(task),
            Err(mpsc::error::SendError(Message::Quit)) => unreachable!("only tasks are posted"),
        }
    }

    pub fn runs_tasks_on_current_thread(&self) -> bool {
        thread::current().id() == self.thread_id
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl std::fmt::Debug for TaskRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskRunner")
            .field("name", &self.name)
            .field("thread_id", &self.thread_id)
            .finish()
    }
}

/// A dedicated, named thread that runs posted tasks.
pub struct IoThread {
    runner: TaskRunner,
    handle: Option<JoinHandle<()>>,
}

impl IoThread {
    /// Spawn the thread and its runtime.
    pub fn spawn(config: &IoThreadConfig) -> Result<Self> {
        let (sender, receiver) = mpsc::unbounded_channel();
        let (ready_tx, ready_rx) = std::sync::mpsc::channel();

        let mut builder = thread::Builder::new().name(config.name.clone());
        if let Some(stack_size) = config.stack_size {
            builder = builder.stack_size(stack_size);
        }

        let handle = builder
            .spawn(move || {
                let rt = match tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                {
                    Ok(rt) => rt,
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };
                let _ = ready_tx.send(Ok(()));
                rt.block_on(run_tasks(receiver));
            })
            .map_err(|source| ChannelError::IoThreadSpawn {
                name: config.name.clone(),
                source,
            })?;

        let runner = TaskRunner {
            name: Arc::from(config.name.as_str()),
            thread_id: handle.thread().id(),
            sender,
        };

        match ready_rx.recv() {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                let _ = handle.join();
                return Err(ChannelError::IoRuntime(e));
            }
            Err(_) => {
                let message = join_failure(handle);
                return Err(ChannelError::IoThreadPanicked {
                    name: config.name.clone(),
                    message,
                });
            }
        }

        debug!(thread = %config.name, "I/O thread started");
        Ok(Self {
            runner,
            handle: Some(handle),
        })
    }

    pub fn runner(&self) -> TaskRunner {
        self.runner.clone()
    }

    /// Stop the thread after every task posted so far has run, and join it.
    ///
    /// Tasks posted after this call are rejected with
    /// [`ChannelError::IoThreadStopped`].
    pub fn stop(mut self) -> Result<()> {
        self.stop_and_join()
    }

    fn stop_and_join(&mut self) -> Result<()> {
        let Some(handle) = self.handle.take() else {
            return Ok(());
        };
        // Fails only if the loop is already gone; join tells us why.
        let _ = self.runner.sender.send(Message::Quit);
        match handle.join() {
            Ok(()) => {
                debug!(thread = %self.runner.name, "I/O thread stopped");
                Ok(())
            }
            Err(payload) => Err(ChannelError::IoThreadPanicked {
                name: self.runner.name.to_string(),
                message: panic_message(payload.as_ref()),
            }),
        }
    }
}

impl Drop for IoThread {
    fn drop(&mut self) {
        if self.handle.is_none() || self.runner.runs_tasks_on_current_thread() {
            return;
        }
        if let Err(e) = self.stop_and_join() {
            warn!("{}", e);
        }
    }
}

async fn run_tasks(mut receiver: mpsc::UnboundedReceiver<Message>) {
    while let Some(message) = receiver.recv().await {
        match message {
            Message::Run(task) => task(),
            Message::Quit => break,
        }
    }
}

fn join_failure(handle: JoinHandle<()>) -> String {
    match handle.join() {
        Ok(()) => "thread exited before signalling readiness".to_string(),
        Err(payload) => panic_message(payload.as_ref()),
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

/// Deliver a completion callback.
///
/// With a `callback_runner` the callback is posted there and never runs
/// inline; without one it runs immediately on the current thread.
///
/// # Panics
///
/// Panics if `callback_runner` no longer accepts tasks; a dropped
/// completion is a contract violation.
pub fn deliver_callback(callback: Callback, callback_runner: Option<&TaskRunner>) {
    match callback_runner {
        Some(runner) => {
            if let Err(e) = runner.post(callback) {
                contract_violation(format_args!("failed to deliver completion callback: {e}"));
            }
        }
        None => callback(),
    }
}
