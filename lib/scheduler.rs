// Keyed periodic tasks with drift correction
//
// Each task runs on its own thread. Tick n is aimed at `start + n * interval`
// rather than `previous tick + interval`, so time spent inside the callback
// (usually a blocking send) does not push later ticks back.
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::thread::{self, ThreadId};
use std::time::{Duration, Instant};

use crossbeam::channel::{after, bounded, select, Receiver, Sender};
use once_cell::sync::OnceCell;
use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::error::Result;

struct TaskControl {
    cancelled: AtomicBool,
    wake: Sender<()>,
    // Held while the callback runs; cancel() waits on it
    tick_lock: Mutex<()>,
    thread: OnceCell<ThreadId>,
}

/// Stops one scheduled task. Cheap to clone; cancelling twice is harmless.
#[derive(Clone)]
pub struct CancelHandle {
    control: Arc<TaskControl>,
}

impl CancelHandle {
    /// When this returns the callback is not running and will not run again.
    pub fn cancel(&self) {
        if !self.control.cancelled.swap(true, Ordering::SeqCst) {
            let _ = self.control.wake.try_send(());
        }
        // A callback cancelling its own task already holds the tick lock
        if self.control.thread.get() != Some(&thread::current().id()) {
            drop(self.control.tick_lock.lock());
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.control.cancelled.load(Ordering::SeqCst)
    }
}

pub struct ScheduledTask {
    pub key: String,
    pub interval: Duration,
    pub started_at: Instant,
    id: u64,
    cancel: CancelHandle,
}

impl ScheduledTask {
    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }
}

type TaskMap = HashMap<String, ScheduledTask>;

/// At most one live task per key.
#[derive(Default)]
pub struct Scheduler {
    tasks: Arc<Mutex<TaskMap>>,
    next_id: AtomicU64,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start calling `callback(elapsed)` every `interval`, first call
    /// immediately. The task ends when the callback returns false or the
    /// handle is cancelled. A task already running under `key` is cancelled
    /// first.
    pub fn schedule<F>(&self, key: &str, interval: Duration, callback: F) -> Result<CancelHandle>
    where
        F: FnMut(Duration) -> bool + Send + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (wake_tx, wake_rx) = bounded(1);
        let control = Arc::new(TaskControl {
            cancelled: AtomicBool::new(false),
            wake: wake_tx,
            tick_lock: Mutex::new(()),
            thread: OnceCell::new(),
        });
        let handle = CancelHandle {
            control: Arc::clone(&control),
        };

        // The old callback may touch the task map; wait on it unlocked
        let previous = self.tasks.lock().remove(key);
        if let Some(previous) = previous {
            debug!(key, "replacing scheduled task");
            previous.cancel.cancel();
        }

        let mut tasks = self.tasks.lock();
        let started_at = Instant::now();
        let runner = TaskRunner {
            key: key.to_string(),
            id,
            interval,
            started_at,
            control,
            wake: wake_rx,
            tasks: Arc::downgrade(&self.tasks),
        };
        thread::Builder::new()
            .name(format!("osc-task-{}", id))
            .spawn(move || runner.run(callback))?;

        let displaced = tasks.insert(
            key.to_string(),
            ScheduledTask {
                key: key.to_string(),
                interval,
                started_at,
                id,
                cancel: handle.clone(),
            },
        );
        drop(tasks);
        // Another schedule() on this key may have won the gap above
        if let Some(displaced) = displaced {
            displaced.cancel.cancel();
        }
        debug!(key, ?interval, "task scheduled");
        Ok(handle)
    }

    pub fn cancel(&self, key: &str) -> bool {
        // Unlock before waiting on the task
        let task = self.tasks.lock().remove(key);
        match task {
            Some(task) => {
                task.cancel.cancel();
                debug!(key, "task cancelled");
                true
            }
            None => false,
        }
    }

    pub fn cancel_all(&self) -> usize {
        let drained: Vec<ScheduledTask> = self.tasks.lock().drain().map(|(_, t)| t).collect();
        for task in &drained {
            task.cancel.cancel();
        }
        drained.len()
    }

    pub fn is_active(&self, key: &str) -> bool {
        self.tasks.lock().contains_key(key)
    }

    pub fn active_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.tasks.lock().keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Interval and running time of the task under `key`.
    pub fn task_info(&self, key: &str) -> Option<(Duration, Duration)> {
        self.tasks.lock().get(key).map(|t| (t.interval, t.elapsed()))
    }

    pub fn len(&self) -> usize {
        self.tasks.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.lock().is_empty()
    }
}

struct TaskRunner {
    key: String,
    id: u64,
    interval: Duration,
    started_at: Instant,
    control: Arc<TaskControl>,
    wake: Receiver<()>,
    tasks: Weak<Mutex<TaskMap>>,
}

impl TaskRunner {
    fn run<F>(self, mut callback: F)
    where
        F: FnMut(Duration) -> bool,
    {
        let _ = self.control.thread.set(thread::current().id());
        let mut target = self.started_at;
        let mut ticks = 0u64;

        loop {
            let keep_going = {
                let _tick = self.control.tick_lock.lock();
                if self.control.cancelled.load(Ordering::SeqCst) {
                    break;
                }
                ticks += 1;
                callback(self.started_at.elapsed())
            };
            if !keep_going {
                debug!(key = %self.key, ticks, "task finished");
                break;
            }

            target += self.interval;
            let delay = target.saturating_duration_since(Instant::now());
            trace!(key = %self.key, ?delay, "next tick");

            select! {
                recv(self.wake) -> _ => break,
                recv(after(delay)) -> _ => {}
            }
        }

        // Forget our entry unless a newer task already owns the key
        if let Some(tasks) = self.tasks.upgrade() {
            let mut tasks = tasks.lock();
            if tasks.get(&self.key).is_some_and(|t| t.id == self.id) {
                tasks.remove(&self.key);
            }
        }
    }
}
