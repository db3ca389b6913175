// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Named worker tasks.
//!
//! A [`Task`] binds a handler to a dedicated OS thread. While running, the
//! thread invokes the handler in a loop; `pause` parks the thread between
//! invocations, `start` resumes it and `stop` ends it. Signalling goes
//! through a monitor with a state predicate, so no wake-up is lost.
//!
//! The handler must be able to return: callers deactivate any blocking
//! queues the handler pops from before pausing or stopping the task.

use std::sync::Arc;
use std::thread::{self, JoinHandle, ThreadId};

use parking_lot::{Condvar, Mutex};
use tracing::{debug, warn};

type Handler = Box<dyn FnMut() + Send>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TaskState {
    Idle,
    Running,
    Paused,
    Stopped,
}

struct Monitor {
    state: TaskState,
    /// Worker sits between handler invocations (or has exited).
    parked: bool,
}

struct TaskInner {
    name: String,
    monitor: Mutex<Monitor>,
    cond: Condvar,
}

/// A named start/pause/stop worker bound to a handler.
pub struct Task {
    inner: Arc<TaskInner>,
    handler: Arc<Mutex<Option<Handler>>>,
    handle: Mutex<Option<JoinHandle<()>>>,
    worker_id: Mutex<Option<ThreadId>>,
}

impl Task {
    /// Create a task that repeatedly invokes `handler` while running.
    pub fn new(name: impl Into<String>, handler: impl FnMut() + Send + 'static) -> Arc<Self> {
        Arc::new(Task {
            inner: Arc::new(TaskInner {
                name: name.into(),
                monitor: Mutex::new(Monitor {
                    state: TaskState::Idle,
                    parked: true,
                }),
                cond: Condvar::new(),
            }),
            handler: Arc::new(Mutex::new(Some(Box::new(handler)))),
            handle: Mutex::new(None),
            worker_id: Mutex::new(None),
        })
    }

    /// Task name, used in the worker thread name and logs.
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Start or resume the worker.
    pub fn start(&self) {
        let mut monitor = self.inner.monitor.lock();
        match monitor.state {
            TaskState::Running => {}
            TaskState::Paused => {
                monitor.state = TaskState::Running;
                self.inner.cond.notify_all();
            }
            TaskState::Idle | TaskState::Stopped => {
                drop(monitor);
                // reap a previous worker so the handler is back in its slot
                if let Some(handle) = self.handle.lock().take() {
                    let _ = handle.join();
                }
                {
                    let mut monitor = self.inner.monitor.lock();
                    monitor.state = TaskState::Running;
                    monitor.parked = false;
                }
                self.spawn_worker();
            }
        }
    }

    /// Pause and wait until the in-flight handler invocation finishes.
    ///
    /// Calling from the worker thread itself degrades to [`Task::pause_async`].
    pub fn pause(&self) {
        self.request_pause();
        if self.on_worker_thread() {
            return;
        }
        let mut monitor = self.inner.monitor.lock();
        while monitor.state == TaskState::Paused && !monitor.parked {
            self.inner.cond.wait(&mut monitor);
        }
    }

    /// Pause without waiting for the worker to park.
    pub fn pause_async(&self) {
        self.request_pause();
    }

    /// Stop and join the worker.
    ///
    /// Calling from the worker thread itself degrades to [`Task::stop_async`].
    pub fn stop(&self) {
        self.request_stop();
        if self.on_worker_thread() {
            return;
        }
        if let Some(handle) = self.handle.lock().take() {
            if handle.join().is_err() {
                warn!("task {} worker panicked", self.inner.name);
            }
        }
    }

    /// Stop without joining; the worker exits after the current invocation.
    pub fn stop_async(&self) {
        self.request_stop();
    }

    /// Whether the worker is currently running (not paused or stopped).
    pub fn is_running(&self) -> bool {
        self.inner.monitor.lock().state == TaskState::Running
    }

    fn request_pause(&self) {
        let mut monitor = self.inner.monitor.lock();
        if monitor.state == TaskState::Running {
            monitor.state = TaskState::Paused;
            self.inner.cond.notify_all();
        }
    }

    fn request_stop(&self) {
        let mut monitor = self.inner.monitor.lock();
        if monitor.state != TaskState::Idle {
            monitor.state = TaskState::Stopped;
            self.inner.cond.notify_all();
        }
    }

    fn on_worker_thread(&self) -> bool {
        *self.worker_id.lock() == Some(thread::current().id())
    }

    fn spawn_worker(&self) {
        let inner = Arc::clone(&self.inner);
        let slot = Arc::clone(&self.handler);
        let handle = thread::Builder::new()
            .name(inner.name.clone())
            .spawn(move || {
                let mut handler = slot
                    .lock()
                    .take()
                    .expect("task worker spawned without a handler");
                debug!("task {} worker started", inner.name);
                loop {
                    {
                        let mut monitor = inner.monitor.lock();
                        while monitor.state == TaskState::Paused {
                            monitor.parked = true;
                            inner.cond.notify_all();
                            inner.cond.wait(&mut monitor);
                        }
                        if monitor.state == TaskState::Stopped {
                            monitor.parked = true;
                            inner.cond.notify_all();
                            break;
                        }
                        monitor.parked = false;
                    }
                    handler();
                }
                *slot.lock() = Some(handler);
                debug!("task {} worker exited", inner.name);
            })
            .expect("spawn task worker");
        *self.worker_id.lock() = Some(handle.thread().id());
        *self.handle.lock() = Some(handle);
    }
}

impl Drop for Task {
    fn drop(&mut self) {
        self.request_stop();
        if !self.on_worker_thread() {
            if let Some(handle) = self.handle.lock().take() {
                let _ = handle.join();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[test]
    fn test_start_runs_handler_repeatedly() {
        let count = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&count);
        let task = Task::new("counter", move || {
            c.fetch_add(1, Ordering::SeqCst);
            thread::sleep(Duration::from_millis(1));
        });
        task.start();
        thread::sleep(Duration::from_millis(50));
        task.stop();
        assert!(count.load(Ordering::SeqCst) > 1);
    }

    #[test]
    fn test_pause_parks_between_invocations() {
        let count = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&count);
        let task = Task::new("pauser", move || {
            c.fetch_add(1, Ordering::SeqCst);
            thread::sleep(Duration::from_millis(1));
        });
        task.start();
        thread::sleep(Duration::from_millis(20));
        task.pause();
        let after_pause = count.load(Ordering::SeqCst);
        thread::sleep(Duration::from_millis(30));
        assert_eq!(count.load(Ordering::SeqCst), after_pause);
        task.start();
        thread::sleep(Duration::from_millis(20));
        assert!(count.load(Ordering::SeqCst) > after_pause);
        task.stop();
    }

    #[test]
    fn test_stop_then_restart() {
        let count = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&count);
        let task = Task::new("restarter", move || {
            c.fetch_add(1, Ordering::SeqCst);
            thread::sleep(Duration::from_millis(1));
        });
        task.start();
        thread::sleep(Duration::from_millis(10));
        task.stop();
        let stopped_at = count.load(Ordering::SeqCst);
        task.start();
        thread::sleep(Duration::from_millis(20));
        assert!(count.load(Ordering::SeqCst) > stopped_at);
        task.stop();
    }

    #[test]
    fn test_stop_is_idempotent() {
        let task = Task::new("stopper", || thread::sleep(Duration::from_millis(1)));
        task.start();
        task.stop();
        task.stop();
        assert!(!task.is_running());
    }
}
