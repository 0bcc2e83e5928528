//! Registration expiry
//!
//! Expired registrations are swept either from the host's recurring timer
//! event ([`ExpirySweeper::tick`], every `ticks_per_sweep` ticks) or from a
//! background task running on a fixed period ([`ExpirySweeper::start`]).

use chrono::Utc;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info};

use super::Registrar;

/// Periodic expiry of registrations
pub struct ExpirySweeper {
    registrar: Arc<Registrar>,
    ticks_per_sweep: u32,
    ticks: AtomicU32,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl ExpirySweeper {
    pub fn new(registrar: Arc<Registrar>) -> Self {
        let ticks_per_sweep = registrar.config().ticks_per_sweep.max(1);
        Self {
            registrar,
            ticks_per_sweep,
            ticks: AtomicU32::new(0),
            task: Mutex::new(None),
        }
    }

    /// Count one host timer tick; sweeps on every `ticks_per_sweep`-th
    ///
    /// Returns the number of expired registrations on a sweep tick and
    /// `None` on every other tick.
    pub fn tick(&self) -> Option<usize> {
        let period = self.ticks_per_sweep;
        let previous = self
            .ticks
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| Some((n + 1) % period))
            .unwrap_or_default();
        if (previous + 1) % period != 0 {
            return None;
        }
        Some(self.sweep())
    }

    /// Sweep right now
    pub fn sweep(&self) -> usize {
        let removed = self.registrar.sweep_expired(Utc::now());
        debug!("Expiry sweep removed {} registrations", removed);
        removed
    }

    /// Start sweeping every `period` in a background task
    ///
    /// A sweeper that is already running is left alone.
    pub fn start(self: &Arc<Self>, period: Duration) {
        let mut task = self.task.lock();
        if task.as_ref().is_some_and(|handle| !handle.is_finished()) {
            return;
        }

        info!("Starting registration expiry task with interval: {:?}", period);
        // The task must not keep the sweeper alive, or Drop never aborts it
        let sweeper = Arc::downgrade(self);
        *task = Some(tokio::spawn(async move {
            let mut timer = interval(period);
            timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // the first tick completes immediately
            timer.tick().await;
            loop {
                timer.tick().await;
                let Some(sweeper) = sweeper.upgrade() else {
                    debug!("Expiry sweeper dropped, ending task");
                    break;
                };
                sweeper.sweep();
            }
        }));
    }

    /// Stop the background task, if any
    pub fn stop(&self) {
        if let Some(handle) = self.task.lock().take() {
            handle.abort();
            info!("Stopped registration expiry task");
        }
    }

    pub fn is_running(&self) -> bool {
        self.task
            .lock()
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }
}

impl Drop for ExpirySweeper {
    fn drop(&mut self) {
        if let Some(handle) = self.task.get_mut().take() {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{RegfileConfig, RegfileConfigBuilder};
    use crate::registrar::IdentityDirectory;
    use crate::types::StaticProfile;

    fn registrar(config: RegfileConfig) -> Arc<Registrar> {
        let directory: IdentityDirectory = vec![("alice".to_string(), StaticProfile::default())]
            .into_iter()
            .collect();
        Arc::new(Registrar::new(config, directory))
    }

    #[test]
    fn test_tick_sweeps_every_nth_tick() {
        let registrar = registrar(RegfileConfigBuilder::new().ticks_per_sweep(3).build());
        let past = Utc::now() - chrono::Duration::seconds(120);
        registrar.register("alice", None, "sip:alice@x", 60, past).unwrap();

        let sweeper = ExpirySweeper::new(registrar.clone());
        assert_eq!(sweeper.tick(), None);
        assert_eq!(sweeper.tick(), None);
        assert!(registrar.lookup("alice").is_some());
        assert_eq!(sweeper.tick(), Some(1));
        assert!(registrar.lookup("alice").is_none());

        assert_eq!(sweeper.tick(), None);
        assert_eq!(sweeper.tick(), None);
        assert_eq!(sweeper.tick(), Some(0));
    }

    #[test]
    fn test_single_tick_period_sweeps_each_time() {
        let sweeper = ExpirySweeper::new(registrar(
            RegfileConfigBuilder::new().ticks_per_sweep(1).build(),
        ));
        assert_eq!(sweeper.tick(), Some(0));
        assert_eq!(sweeper.tick(), Some(0));
    }

    #[tokio::test(start_paused = true)]
    async fn test_background_task_sweeps() {
        let registrar = registrar(RegfileConfig::default());
        let past = Utc::now() - chrono::Duration::seconds(120);
        registrar.register("alice", None, "sip:alice@x", 60, past).unwrap();

        let sweeper = Arc::new(ExpirySweeper::new(registrar.clone()));
        sweeper.start(Duration::from_secs(30));
        assert!(sweeper.is_running());

        tokio::time::sleep(Duration::from_secs(31)).await;
        tokio::task::yield_now().await;
        assert!(registrar.lookup("alice").is_none());

        sweeper.stop();
        assert!(!sweeper.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropping_started_sweeper_ends_task() {
        let registrar = registrar(RegfileConfig::default());
        let sweeper = Arc::new(ExpirySweeper::new(registrar.clone()));
        sweeper.start(Duration::from_secs(30));
        assert_eq!(Arc::strong_count(&registrar), 2);

        let weak = Arc::downgrade(&sweeper);
        drop(sweeper);
        assert!(weak.upgrade().is_none());

        tokio::time::sleep(Duration::from_secs(95)).await;
        tokio::task::yield_now().await;
        assert_eq!(Arc::strong_count(&registrar), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_start_is_ignored() {
        let registrar = registrar(RegfileConfig::default());
        let sweeper = Arc::new(ExpirySweeper::new(registrar.clone()));
        sweeper.start(Duration::from_secs(30));
        sweeper.start(Duration::from_secs(30));
        assert!(sweeper.is_running());

        tokio::time::sleep(Duration::from_secs(61)).await;
        tokio::task::yield_now().await;
        // the task holds no reference of its own
        assert_eq!(Arc::strong_count(&registrar), 2);
        drop(sweeper);
        assert_eq!(Arc::strong_count(&registrar), 1);
    }
}
