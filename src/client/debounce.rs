use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;

/// Runs at most the most recently scheduled action once its delay elapses.
/// Rescheduling cancels an action that is still waiting; an action whose
/// timer already fired is left to finish.
#[derive(Debug)]
pub struct Debouncer {
    delay: Duration,
    pending: Option<(JoinHandle<()>, Arc<AtomicBool>)>,
}

impl Debouncer {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            pending: None,
        }
    }

    pub fn schedule<F>(&mut self, action: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.schedule_after(self.delay, action);
    }

    pub fn schedule_after<F>(&mut self, delay: Duration, action: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.cancel();

        let fired = Arc::new(AtomicBool::new(false));
        let flag = fired.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            flag.store(true, Ordering::SeqCst);
            action.await;
        });

        self.pending = Some((handle, fired));
    }

    /// Cancels the waiting action, if any. Returns whether one was cancelled.
    pub fn cancel(&mut self) -> bool {
        match self.pending.take() {
            Some((handle, fired)) if !fired.load(Ordering::SeqCst) => {
                handle.abort();
                true
            }
            _ => false,
        }
    }

    pub fn is_waiting(&self) -> bool {
        self.pending
            .as_ref()
            .is_some_and(|(handle, fired)| !fired.load(Ordering::SeqCst) && !handle.is_finished())
    }
}

impl Drop for Debouncer {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// Monotonic request tickets; only the newest ticket's response counts.
#[derive(Debug, Default)]
pub struct RequestSequencer {
    latest: AtomicU64,
}

impl RequestSequencer {
    pub fn issue(&self) -> u64 {
        self.latest.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn is_latest(&self, ticket: u64) -> bool {
        self.latest.load(Ordering::SeqCst) == ticket
    }

    pub fn latest(&self) -> u64 {
        self.latest.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[tokio::test(start_paused = true)]
    async fn only_the_last_scheduled_action_runs() {
        let runs = Arc::new(Mutex::new(Vec::new()));
        let mut debouncer = Debouncer::new(Duration::from_millis(400));

        for query in ["m", "ma", "mac"] {
            let runs = runs.clone();
            debouncer.schedule(async move {
                runs.lock().unwrap().push(query);
            });
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        assert!(debouncer.is_waiting());

        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(*runs.lock().unwrap(), vec!["mac"]);
        assert!(!debouncer.is_waiting());
    }

    #[tokio::test(start_paused = true)]
    async fn spaced_out_actions_all_run() {
        let runs = Arc::new(AtomicU64::new(0));
        let mut debouncer = Debouncer::new(Duration::from_millis(300));

        for _ in 0..3 {
            let runs = runs.clone();
            debouncer.schedule(async move {
                runs.fetch_add(1, Ordering::SeqCst);
            });
            tokio::time::sleep(Duration::from_millis(350)).await;
        }

        assert_eq!(runs.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_stops_a_waiting_action() {
        let runs = Arc::new(AtomicU64::new(0));
        let mut debouncer = Debouncer::new(Duration::from_millis(300));
        let counter = runs.clone();
        debouncer.schedule(async move {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        assert!(debouncer.cancel());
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 0);
        assert!(!debouncer.cancel());
    }

    #[test]
    fn stale_tickets_are_not_latest() {
        let sequencer = RequestSequencer::default();
        let first = sequencer.issue();
        let second = sequencer.issue();
        assert!(second > first);
        assert!(!sequencer.is_latest(first));
        assert!(sequencer.is_latest(second));
    }
}
