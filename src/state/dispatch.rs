//! Line-crossing notification dispatch
//!
//! Listener callbacks never run on the thread that raised the notification.
//! Each callback is handed to the blocking pool of a small private tokio
//! runtime, which caps how many callbacks run at once and queues the rest.
//! The dispatcher counts in-flight callbacks so callers can wait for them.

use crate::config::DispatchConfig;
use crate::error::Result;
use parking_lot::{Condvar, Mutex, RwLock};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::runtime::{Builder, Runtime};

/// A floor-line crossing reported by the floor producer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineCrossing {
    /// Position of this notification in the hub's notification sequence
    pub sequence: u64,
    /// Floor sensor reading at the time of the notification
    pub reading: i32,
}

/// Receiver of line-crossing notifications
pub trait LineCrossingListener: Send + Sync {
    /// Called on a dispatcher thread for every notification
    fn on_line_crossing(&self, event: &LineCrossing);
}

/// Callbacks queued or running, with a wakeup for when the count hits zero
#[derive(Default)]
struct InFlightCount {
    count: Mutex<usize>,
    idle: Condvar,
}

/// Decrements the in-flight counter when a callback finishes or is dropped unrun
struct InFlight(Arc<InFlightCount>);

impl InFlight {
    fn enter(counter: &Arc<InFlightCount>) -> Self {
        *counter.count.lock() += 1;
        InFlight(Arc::clone(counter))
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        let mut count = self.0.count.lock();
        *count -= 1;
        if *count == 0 {
            self.0.idle.notify_all();
        }
    }
}

/// Bounded pool running listener callbacks
pub struct Dispatcher {
    runtime: RwLock<Option<Runtime>>,
    in_flight: Arc<InFlightCount>,
}

impl Dispatcher {
    /// Create a dispatcher with at most `config.workers` concurrent callbacks
    pub fn new(config: &DispatchConfig) -> Result<Self> {
        let runtime = Builder::new_multi_thread()
            .worker_threads(1)
            .max_blocking_threads(config.workers.max(1))
            .thread_name("line-dispatch")
            .build()?;

        log::debug!("Dispatcher: started with {} callback workers", config.workers);

        Ok(Dispatcher {
            runtime: RwLock::new(Some(runtime)),
            in_flight: Arc::new(InFlightCount::default()),
        })
    }

    /// Queue one callback per listener. Returns the number queued.
    pub fn dispatch(&self, listeners: Vec<Arc<dyn LineCrossingListener>>, event: LineCrossing) -> usize {
        let runtime = self.runtime.read();
        let Some(runtime) = runtime.as_ref() else {
            log::warn!("Dispatcher: notification {} dropped after shutdown", event.sequence);
            return 0;
        };

        let queued = listeners.len();
        for listener in listeners {
            let guard = InFlight::enter(&self.in_flight);
            runtime.spawn_blocking(move || {
                let _guard = guard;
                listener.on_line_crossing(&event);
            });
        }
        queued
    }

    /// Number of callbacks queued or running
    pub fn in_flight(&self) -> usize {
        *self.in_flight.count.lock()
    }

    /// Block until no callback is queued or running, or the timeout expires.
    /// Returns true when idle.
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut count = self.in_flight.count.lock();
        while *count > 0 {
            if self.in_flight.idle.wait_until(&mut count, deadline).timed_out() {
                return *count == 0;
            }
        }
        true
    }

    /// Stop accepting notifications and wait up to `timeout` for running callbacks
    pub fn shutdown(&self, timeout: Duration) {
        if let Some(runtime) = self.runtime.write().take() {
            log::debug!("Dispatcher: shutting down ({} in flight)", self.in_flight());
            runtime.shutdown_timeout(timeout);
        }
    }
}

impl Drop for Dispatcher {
    fn drop(&mut self) {
        // May run on a dispatcher thread when a listener holds the last hub reference
        if let Some(runtime) = self.runtime.get_mut().take() {
            runtime.shutdown_background();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    struct Recorder {
        seen: Mutex<Vec<u64>>,
    }

    impl LineCrossingListener for Recorder {
        fn on_line_crossing(&self, event: &LineCrossing) {
            self.seen.lock().push(event.sequence);
        }
    }

    struct Slow;

    impl LineCrossingListener for Slow {
        fn on_line_crossing(&self, _event: &LineCrossing) {
            thread::sleep(Duration::from_millis(20));
        }
    }

    #[test]
    fn callbacks_run_and_drain() {
        let dispatcher = Dispatcher::new(&DispatchConfig::default()).unwrap();
        let recorder = Arc::new(Recorder {
            seen: Mutex::new(Vec::new()),
        });

        for sequence in 1..=3 {
            let queued = dispatcher.dispatch(
                vec![recorder.clone() as Arc<dyn LineCrossingListener>],
                LineCrossing { sequence, reading: 0 },
            );
            assert_eq!(queued, 1);
        }

        assert!(dispatcher.wait_idle(Duration::from_secs(2)));
        let mut seen = recorder.seen.lock().clone();
        seen.sort_unstable();
        assert_eq!(seen, vec![1, 2, 3]);
    }

    #[test]
    fn wait_idle_times_out_while_busy() {
        let dispatcher = Dispatcher::new(&DispatchConfig { workers: 1 }).unwrap();
        let slow: Arc<dyn LineCrossingListener> = Arc::new(Slow);
        dispatcher.dispatch(vec![slow.clone(), slow], LineCrossing { sequence: 1, reading: 0 });

        assert!(!dispatcher.wait_idle(Duration::from_millis(1)));
        assert!(dispatcher.wait_idle(Duration::from_secs(2)));
    }

    #[test]
    fn waiter_wakes_when_last_callback_finishes() {
        let dispatcher = Dispatcher::new(&DispatchConfig { workers: 2 }).unwrap();
        let slow: Arc<dyn LineCrossingListener> = Arc::new(Slow);
        dispatcher.dispatch(vec![slow.clone(), slow], LineCrossing { sequence: 1, reading: 0 });
        assert!(dispatcher.in_flight() > 0);

        let started = Instant::now();
        assert!(dispatcher.wait_idle(Duration::from_secs(10)));
        assert!(started.elapsed() < Duration::from_secs(5));
        assert_eq!(dispatcher.in_flight(), 0);
    }

    #[test]
    fn dispatch_after_shutdown_is_dropped() {
        let dispatcher = Dispatcher::new(&DispatchConfig::default()).unwrap();
        dispatcher.shutdown(Duration::from_millis(100));

        let recorder: Arc<dyn LineCrossingListener> = Arc::new(Recorder {
            seen: Mutex::new(Vec::new()),
        });
        assert_eq!(dispatcher.dispatch(vec![recorder], LineCrossing { sequence: 1, reading: 0 }), 0);
        assert_eq!(dispatcher.in_flight(), 0);
    }
}
