//! ChashDaemon implementation.
//!
//! One background ticker drives the engine's periodic reconciliation;
//! arbitrary caller tasks issue route mutations. Everything funnels
//! through a single lock on the engine, so reconciliation never observes
//! a half-applied mutation. Freeze is a plain flag the engine checks at
//! reconciliation time, not a cancellation primitive.

use chash_types::{Nexthop, Prefix};
use log::info;
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::orch::{ChashError, ChashSnapshot, ConsistentHashOrch};

/// Configuration for the daemon.
#[derive(Debug, Clone)]
pub struct ChashDaemonConfig {
    /// Interval between reconciliation ticks.
    pub tick_interval: Duration,
}

impl Default for ChashDaemonConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_secs(1),
        }
    }
}

/// The consistent-hash manager daemon.
///
/// Owns the engine behind a lock and the ticker task driving it. The
/// daemon runs until stopped; stopping halts the ticker but leaves the
/// engine queryable.
pub struct ChashDaemon {
    engine: Arc<Mutex<ConsistentHashOrch>>,
    config: ChashDaemonConfig,
    running: Arc<AtomicBool>,
    ticker: Option<JoinHandle<()>>,
}

impl ChashDaemon {
    /// Creates a daemon around an engine. The ticker starts on [`run`].
    ///
    /// [`run`]: Self::run
    pub fn new(engine: ConsistentHashOrch, config: ChashDaemonConfig) -> Self {
        Self {
            engine: Arc::new(Mutex::new(engine)),
            config,
            running: Arc::new(AtomicBool::new(false)),
            ticker: None,
        }
    }

    /// Returns a handle to the engine lock, for tests and tooling.
    pub fn engine(&self) -> Arc<Mutex<ConsistentHashOrch>> {
        Arc::clone(&self.engine)
    }

    /// Returns true if the ticker is running.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Starts the periodic ticker. Idempotent.
    pub fn run(&mut self) {
        if self.ticker.is_some() {
            return;
        }
        self.running.store(true, Ordering::SeqCst);

        let engine = Arc::clone(&self.engine);
        let running = Arc::clone(&self.running);
        let tick_interval = self.config.tick_interval;

        self.ticker = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(tick_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if !running.load(Ordering::SeqCst) {
                    break;
                }
                engine.lock().await.periodic_tick();
            }
        }));

        info!("scheduler started ({:?} tick)", self.config.tick_interval);
    }

    /// Stops the ticker. The engine stays queryable.
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(ticker) = self.ticker.take() {
            ticker.abort();
        }
        info!("scheduler stopped");
    }

    /// Adds or changes a route.
    pub async fn add_route(
        &self,
        prefix: Prefix,
        nhset: BTreeSet<Nexthop>,
    ) -> Result<(), ChashError> {
        self.engine.lock().await.add_route(prefix, nhset)
    }

    /// Deletes a route.
    pub async fn del_route(&self, prefix: &Prefix) -> Result<(), ChashError> {
        self.engine.lock().await.del_route(prefix)
    }

    /// Switches the group allocation mode.
    pub async fn set_admin_state(&self, consistent: bool) {
        self.engine.lock().await.set_admin_state(consistent);
    }

    /// Suspends reconciliation; ticks keep firing but do nothing.
    pub async fn freeze(&self) {
        self.engine.lock().await.freeze();
    }

    /// Resumes reconciliation.
    pub async fn unfreeze(&self) {
        self.engine.lock().await.unfreeze();
    }

    /// Takes a snapshot of the engine state.
    pub async fn snapshot(&self) -> ChashSnapshot {
        self.engine.lock().await.snapshot()
    }
}

impl Drop for ChashDaemon {
    fn drop(&mut self) {
        if let Some(ticker) = self.ticker.take() {
            ticker.abort();
        }
    }
}
