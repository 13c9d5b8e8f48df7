//! Periodic tick task used to refresh the call duration.

use std::ops::ControlFlow;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

/// Owns at most one running tick task.
///
/// `start` replaces any running task and `stop` aborts it, so both are
/// idempotent and a task can never outlive its owner.
#[derive(Debug, Default)]
pub struct DurationTimer {
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl DurationTimer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts calling `on_tick` every `period`, first after one full period.
    ///
    /// The task ends when `on_tick` returns `ControlFlow::Break`. Returns
    /// `false` without starting anything when called outside a tokio
    /// runtime.
    pub fn start<F>(&self, period: Duration, mut on_tick: F) -> bool
    where
        F: FnMut() -> ControlFlow<()> + Send + 'static,
    {
        let Ok(runtime) = Handle::try_current() else {
            tracing::warn!("no tokio runtime available; duration timer not started");
            return false;
        };
        let task = runtime.spawn(async move {
            let mut ticks = interval_at(Instant::now() + period, period);
            ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticks.tick().await;
                if on_tick().is_break() {
                    break;
                }
            }
        });

        let previous = self
            .handle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(task);
        if let Some(previous) = previous {
            previous.abort();
        }
        true
    }

    /// Aborts the running task, if any. Returns whether one was running.
    pub fn stop(&self) -> bool {
        let handle = self
            .handle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        match handle {
            Some(handle) => {
                handle.abort();
                true
            }
            None => false,
        }
    }

    pub fn is_running(&self) -> bool {
        self.handle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|h| !h.is_finished())
    }
}

impl Drop for DurationTimer {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn counter() -> (Arc<AtomicUsize>, impl FnMut() -> ControlFlow<()> + Send + 'static) {
        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();
        (count, move || {
            c.fetch_add(1, Ordering::SeqCst);
            ControlFlow::Continue(())
        })
    }

    #[tokio::test(start_paused = true)]
    async fn ticks_once_per_period() {
        let timer = DurationTimer::new();
        let (count, tick) = counter();
        assert!(timer.start(Duration::from_secs(1), tick));

        tokio::time::sleep(Duration::from_millis(3_500)).await;
        assert_eq!(count.load(Ordering::SeqCst), 3);
        assert!(timer.is_running());

        assert!(timer.stop());
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(count.load(Ordering::SeqCst), 3);
        assert!(!timer.is_running());
        assert!(!timer.stop());
    }

    #[tokio::test(start_paused = true)]
    async fn restarting_replaces_the_previous_task() {
        let timer = DurationTimer::new();
        let (first, tick_a) = counter();
        let (second, tick_b) = counter();

        timer.start(Duration::from_secs(1), tick_a);
        timer.start(Duration::from_secs(1), tick_b);

        tokio::time::sleep(Duration::from_millis(2_500)).await;
        assert_eq!(first.load(Ordering::SeqCst), 0);
        assert_eq!(second.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn start_outside_a_runtime_is_refused() {
        let timer = DurationTimer::new();
        let (count, tick) = counter();
        assert!(!timer.start(Duration::from_secs(1), tick));
        assert!(!timer.is_running());
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn break_ends_the_task() {
        let timer = DurationTimer::new();
        timer.start(Duration::from_secs(1), || ControlFlow::Break(()));
        tokio::time::sleep(Duration::from_millis(1_500)).await;
        assert!(!timer.is_running());
    }
}
