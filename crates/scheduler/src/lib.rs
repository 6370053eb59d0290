//! Cooperative interval-driven worker lifecycle (§4.5).
//!
//! Every long-lived source/destination worker is an [`IntervalWorker`] driven
//! by [`run`]: `prepare()` once, then loop `get_data`/`send_data`, sleeping
//! the remainder of the interval between cycles. Cancellation is cooperative
//! via a pair of terminate flags, checked only inside [`wait`] and never by
//! interrupting in-flight work (the same `Arc<RwLock<bool>>` running-flag
//! idiom used by background task managers elsewhere in this stack).

use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::{info, warn};

/// A settable, shareable termination signal. Workers hold two: one private
/// (their own `stop()`), one shared externally (process-wide shutdown).
#[derive(Clone)]
pub struct TerminateFlag(std::sync::Arc<RwLock<bool>>);

impl TerminateFlag {
    pub fn new() -> Self {
        Self(std::sync::Arc::new(RwLock::new(false)))
    }

    pub async fn is_set(&self) -> bool {
        *self.0.read().await
    }

    pub async fn set(&self) {
        *self.0.write().await = true;
    }
}

impl Default for TerminateFlag {
    fn default() -> Self {
        Self::new()
    }
}

/// Sleeps up to `duration`, checking both flags every second so a shutdown
/// signal interrupts a long wait promptly (§4.5: "sleeps in 1-second
/// slices"). Returns `true` if it was cut short by termination.
pub async fn wait(internal: &TerminateFlag, external: &TerminateFlag, duration: Duration) -> bool {
    let deadline = Instant::now() + duration;
    loop {
        if internal.is_set().await || external.is_set().await {
            return true;
        }
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return false;
        }
        tokio::time::sleep(remaining.min(Duration::from_secs(1))).await;
    }
}

/// One interval-driven work cycle. Implementors supply the hypervisor poll
/// (`get_data`) and datastore write (`send_data`); the loop in [`run`] owns
/// timing, retry, and oneshot semantics (§4.5).
#[async_trait]
pub trait IntervalWorker: Send {
    /// Name used in the `tracing` span scoping every log line this worker
    /// emits (§4.10: "implicitly scoped with the config name").
    fn name(&self) -> &str;

    fn interval(&self) -> Duration;

    fn oneshot(&self) -> bool;

    /// Runs once before the loop starts (adapter connection setup, etc).
    async fn prepare(&mut self) -> Result<(), String> {
        Ok(())
    }

    /// Polls the adapter and produces this cycle's report, if any.
    async fn get_data(&mut self) -> Result<(), String>;

    /// Writes whatever `get_data` produced to the datastore (or submits it,
    /// for destination workers).
    async fn send_data(&mut self) -> Result<(), String>;

    /// Called after a cycle's `get_data`/`send_data` fails, so the worker
    /// can push an `Error` report downstream (§4.5: "emit an Error report
    /// downstream"). Default is a no-op for workers with nothing to report
    /// to (tests, fakes).
    async fn on_cycle_error(&mut self, _err: &str) {}
}

/// Drives `worker` through the run loop described in §4.5 until either
/// terminate flag is set, or (oneshot) one cycle completes.
pub async fn run<W: IntervalWorker>(mut worker: W, internal: TerminateFlag, external: TerminateFlag) {
    let span = tracing::info_span!("worker", name = %worker.name());
    let _enter = span.enter();

    if let Err(e) = worker.prepare().await {
        warn!("prepare failed, worker exiting: {e}");
        return;
    }

    loop {
        if internal.is_set().await || external.is_set().await {
            break;
        }

        let start = Instant::now();
        let cycle_result = async {
            worker.get_data().await?;
            worker.send_data().await?;
            Ok::<(), String>(())
        }
        .await;

        match cycle_result {
            Ok(()) => {
                if worker.oneshot() {
                    info!("oneshot cycle complete, stopping");
                    break;
                }
            }
            Err(e) => {
                warn!("cycle failed: {e}");
                worker.on_cycle_error(&e).await;
                if worker.oneshot() {
                    break;
                }
                wait(&internal, &external, worker.interval()).await;
                continue;
            }
        }

        let elapsed = start.elapsed();
        let interval = worker.interval();
        if elapsed >= interval {
            warn!(
                elapsed_secs = elapsed.as_secs(),
                interval_secs = interval.as_secs(),
                "cycle took longer than interval"
            );
            continue;
        }
        wait(&internal, &external, interval - elapsed).await;
    }

    info!("worker stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct CountingWorker {
        cycles: Arc<AtomicUsize>,
        oneshot: bool,
        fail_first: bool,
    }

    #[async_trait]
    impl IntervalWorker for CountingWorker {
        fn name(&self) -> &str {
            "counting"
        }
        fn interval(&self) -> Duration {
            Duration::from_millis(10)
        }
        fn oneshot(&self) -> bool {
            self.oneshot
        }
        async fn get_data(&mut self) -> Result<(), String> {
            if self.fail_first && self.cycles.load(Ordering::SeqCst) == 0 {
                self.fail_first = false;
                return Err("simulated failure".to_string());
            }
            Ok(())
        }
        async fn send_data(&mut self) -> Result<(), String> {
            self.cycles.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn oneshot_worker_runs_exactly_once() {
        let cycles = Arc::new(AtomicUsize::new(0));
        let worker = CountingWorker {
            cycles: cycles.clone(),
            oneshot: true,
            fail_first: false,
        };
        run(worker, TerminateFlag::new(), TerminateFlag::new()).await;
        assert_eq!(cycles.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn external_flag_stops_continuous_worker() {
        let cycles = Arc::new(AtomicUsize::new(0));
        let worker = CountingWorker {
            cycles: cycles.clone(),
            oneshot: false,
            fail_first: false,
        };
        let external = TerminateFlag::new();
        let external_for_task = external.clone();
        let handle = tokio::spawn(run(worker, TerminateFlag::new(), external_for_task));

        tokio::time::sleep(Duration::from_millis(35)).await;
        external.set().await;
        handle.await.unwrap();

        assert!(cycles.load(Ordering::SeqCst) >= 2);
    }

    #[tokio::test]
    async fn wait_returns_early_on_termination() {
        let internal = TerminateFlag::new();
        let external = TerminateFlag::new();
        internal.set().await;
        let start = Instant::now();
        let cut_short = wait(&internal, &external, Duration::from_secs(5)).await;
        assert!(cut_short);
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn oneshot_worker_stops_after_failure() {
        let cycles = Arc::new(AtomicUsize::new(0));
        let worker = CountingWorker {
            cycles: cycles.clone(),
            oneshot: true,
            fail_first: true,
        };
        run(worker, TerminateFlag::new(), TerminateFlag::new()).await;
        assert_eq!(cycles.load(Ordering::SeqCst), 0);
    }
}
