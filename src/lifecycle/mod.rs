//! Lifecycle management for localization components

use crate::error::{Error, Result};
use std::any::Any;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Trait for components that follow a lifecycle pattern
pub trait LifecycleNode: Send {
    /// Name used in logs
    fn name(&self) -> &str;

    /// Configure the node
    fn on_configure(&mut self) -> Result<()>;

    /// Activate the node
    fn on_activate(&mut self) -> Result<()>;

    /// Deactivate the node
    fn on_deactivate(&mut self) -> Result<()>;

    /// Clean up the node
    fn on_cleanup(&mut self) -> Result<()>;

    /// Convert to Any for downcasting
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

/// Base implementation for lifecycle nodes
#[derive(Debug)]
pub struct LifecycleNodeBase {
    pub name: String,
    state: State,
}

/// State of a lifecycle node
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Unconfigured,
    Inactive,
    Active,
}

impl LifecycleNodeBase {
    /// Create a new lifecycle node base
    pub fn new(name: &str) -> Self {
        LifecycleNodeBase {
            name: name.to_string(),
            state: State::Unconfigured,
        }
    }

    /// Get the current state
    pub fn get_state(&self) -> State {
        self.state
    }

    /// Set the state
    pub fn set_state(&mut self, state: State) {
        self.state = state;
    }

    /// Fail unless the node is currently in `expected`
    pub fn require(&self, expected: State, transition: &str) -> Result<()> {
        if self.state == expected {
            Ok(())
        } else {
            Err(Error::Lifecycle(format!(
                "{}: cannot {} from {:?}",
                self.name, transition, self.state
            )))
        }
    }
}

/// Work repeated by a dedicated thread
pub trait CycleTask: Send + 'static {
    /// Called once on the worker thread before the first cycle
    fn on_start(&mut self) {}

    /// One unit of work
    fn run_cycle(&mut self);

    /// Fixed cycle period; `None` when the cycle paces itself
    fn period(&self) -> Option<Duration> {
        None
    }
}

/// Lifecycle node that runs a [`CycleTask`] on its own thread while active.
///
/// Deactivation clears the running flag and joins the thread; the task is
/// handed back so the node can be activated again.
pub struct PeriodicWorker<T: CycleTask> {
    base: LifecycleNodeBase,
    task: Option<T>,
    running: Arc<AtomicBool>,
    handle: Option<JoinHandle<T>>,
}

impl<T: CycleTask> PeriodicWorker<T> {
    /// Wrap a task; nothing runs until the node is activated
    pub fn new(name: &str, task: T) -> Self {
        PeriodicWorker {
            base: LifecycleNodeBase::new(name),
            task: Some(task),
            running: Arc::new(AtomicBool::new(false)),
            handle: None,
        }
    }

    /// Current lifecycle state
    pub fn state(&self) -> State {
        self.base.get_state()
    }

    /// Whether the worker thread is currently running
    pub fn is_running(&self) -> bool {
        self.handle.is_some()
    }

    /// Access the task while the worker is stopped
    pub fn task(&self) -> Option<&T> {
        self.task.as_ref()
    }

    fn spawn(&mut self) -> Result<()> {
        let mut task = self
            .task
            .take()
            .ok_or_else(|| Error::Lifecycle(format!("{}: task already running", self.base.name)))?;
        let running = Arc::clone(&self.running);
        running.store(true, Ordering::SeqCst);
        let name = self.base.name.clone();

        let handle = thread::Builder::new()
            .name(name.clone())
            .spawn(move || {
                log::info!("{}: worker thread started", name);
                task.on_start();
                while running.load(Ordering::SeqCst) {
                    let cycle_start = Instant::now();
                    task.run_cycle();
                    if let Some(period) = task.period() {
                        let elapsed = cycle_start.elapsed();
                        if elapsed < period {
                            thread::sleep(period - elapsed);
                        }
                    }
                }
                log::info!("{}: worker thread stopped", name);
                task
            })?;

        self.handle = Some(handle);
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            let task = handle
                .join()
                .map_err(|_| Error::Lifecycle(format!("{}: worker thread panicked", self.base.name)))?;
            self.task = Some(task);
        }
        Ok(())
    }
}

impl<T: CycleTask> LifecycleNode for PeriodicWorker<T> {
    fn name(&self) -> &str {
        &self.base.name
    }

    fn on_configure(&mut self) -> Result<()> {
        self.base.require(State::Unconfigured, "configure")?;
        self.base.set_state(State::Inactive);
        Ok(())
    }

    fn on_activate(&mut self) -> Result<()> {
        self.base.require(State::Inactive, "activate")?;
        self.spawn()?;
        self.base.set_state(State::Active);
        Ok(())
    }

    fn on_deactivate(&mut self) -> Result<()> {
        self.base.require(State::Active, "deactivate")?;
        self.stop()?;
        self.base.set_state(State::Inactive);
        Ok(())
    }

    fn on_cleanup(&mut self) -> Result<()> {
        self.base.require(State::Inactive, "clean up")?;
        self.base.set_state(State::Unconfigured);
        Ok(())
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

impl<T: CycleTask> Drop for PeriodicWorker<T> {
    fn drop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    struct Counter {
        cycles: Arc<AtomicUsize>,
        started: bool,
    }

    impl CycleTask for Counter {
        fn on_start(&mut self) {
            self.started = true;
        }

        fn run_cycle(&mut self) {
            self.cycles.fetch_add(1, Ordering::SeqCst);
        }

        fn period(&self) -> Option<Duration> {
            Some(Duration::from_millis(1))
        }
    }

    #[test]
    fn worker_runs_until_deactivated_and_returns_task() {
        let cycles = Arc::new(AtomicUsize::new(0));
        let mut worker = PeriodicWorker::new(
            "counter",
            Counter {
                cycles: Arc::clone(&cycles),
                started: false,
            },
        );

        worker.on_configure().unwrap();
        worker.on_activate().unwrap();
        assert!(worker.is_running());
        thread::sleep(Duration::from_millis(30));
        worker.on_deactivate().unwrap();

        let seen = cycles.load(Ordering::SeqCst);
        assert!(seen > 0);
        thread::sleep(Duration::from_millis(10));
        assert_eq!(cycles.load(Ordering::SeqCst), seen);
        assert!(worker.task().unwrap().started);
        assert_eq!(worker.state(), State::Inactive);
    }

    #[test]
    fn activation_requires_configuration() {
        let mut worker = PeriodicWorker::new(
            "counter",
            Counter {
                cycles: Arc::new(AtomicUsize::new(0)),
                started: false,
            },
        );
        assert!(matches!(worker.on_activate(), Err(Error::Lifecycle(_))));
    }
}
