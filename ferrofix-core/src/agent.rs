/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 27/1/26
******************************************************************************/

//! Cooperative duty-cycle agents.
//!
//! Each component of the persistence core (framer, indexer, replayer,
//! archiver) is a single-threaded [`Agent`] whose `do_work` is invoked in a
//! loop by an [`AgentRunner`] on a dedicated thread. An agent never blocks:
//! it returns the amount of work done and the runner's
//! [`BackoffIdleStrategy`] decides how aggressively to spin, yield, or park
//! between unproductive cycles.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

/// A unit of single-threaded cooperative work.
pub trait Agent: Send {
    /// Performs one duty cycle and returns the amount of work done.
    fn do_work(&mut self) -> usize;

    /// Called once on the agent's thread after the final duty cycle.
    fn on_close(&mut self) {}

    /// Name of this agent for diagnostics.
    fn role_name(&self) -> &str;
}

/// Idle strategy that backs off from spinning through yielding to parking.
///
/// Unproductive cycles escalate: `max_spins` busy spins, then `max_yields`
/// thread yields, then parks starting at `min_park` and doubling up to
/// `max_park`. Any productive cycle resets the escalation.
#[derive(Debug, Clone)]
pub struct BackoffIdleStrategy {
    max_spins: u64,
    max_yields: u64,
    min_park: Duration,
    max_park: Duration,
    spins: u64,
    yields: u64,
    park: Duration,
}

impl BackoffIdleStrategy {
    /// Creates a strategy with explicit escalation bounds.
    #[must_use]
    pub fn new(max_spins: u64, max_yields: u64, min_park: Duration, max_park: Duration) -> Self {
        Self {
            max_spins,
            max_yields,
            min_park,
            max_park,
            spins: 0,
            yields: 0,
            park: min_park,
        }
    }

    /// Records the work done by a cycle, idling when it was unproductive.
    pub fn idle(&mut self, work_count: usize) {
        if work_count > 0 {
            self.reset();
        } else {
            self.idle_once();
        }
    }

    /// Performs one step of the backoff escalation.
    pub fn idle_once(&mut self) {
        if self.spins < self.max_spins {
            self.spins += 1;
            std::hint::spin_loop();
        } else if self.yields < self.max_yields {
            self.yields += 1;
            std::thread::yield_now();
        } else {
            std::thread::sleep(self.park);
            self.park = (self.park * 2).min(self.max_park);
        }
    }

    /// Resets the escalation to the spinning stage.
    pub fn reset(&mut self) {
        self.spins = 0;
        self.yields = 0;
        self.park = self.min_park;
    }
}

impl Default for BackoffIdleStrategy {
    fn default() -> Self {
        Self::new(
            10,
            5,
            Duration::from_micros(1),
            Duration::from_millis(1),
        )
    }
}

/// Runs an [`Agent`] on its own thread until closed.
#[derive(Debug)]
pub struct AgentRunner {
    running: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
    role_name: String,
}

impl AgentRunner {
    /// Starts `agent` on a new thread driven by `idle_strategy`.
    #[must_use]
    pub fn start(mut agent: impl Agent + 'static, mut idle_strategy: BackoffIdleStrategy) -> Self {
        let role_name = agent.role_name().to_string();
        let running = Arc::new(AtomicBool::new(true));
        let thread_running = Arc::clone(&running);

        let handle = std::thread::Builder::new()
            .name(role_name.clone())
            .spawn(move || {
                while thread_running.load(Ordering::Acquire) {
                    let work_count = agent.do_work();
                    idle_strategy.idle(work_count);
                }
                agent.on_close();
            })
            .unwrap_or_else(|e| panic!("failed to spawn agent thread: {e}"));

        Self {
            running,
            handle: Some(handle),
            role_name,
        }
    }

    /// Name of the agent this runner drives.
    #[must_use]
    pub fn role_name(&self) -> &str {
        &self.role_name
    }

    /// Signals the agent to stop and joins its thread.
    ///
    /// The agent's `on_close` runs on the agent thread before the join
    /// completes. Closing an already-closed runner is a no-op.
    pub fn close(&mut self) {
        self.running.store(false, Ordering::Release);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for AgentRunner {
    fn drop(&mut self) {
        self.close();
    }
}
