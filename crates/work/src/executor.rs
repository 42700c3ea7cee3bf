//! Task execution.

use serde::{Deserialize, Serialize};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use taskmon_core::{panic_message, Outcome, TaskError, TaskResult};
use taskmon_progress::{Monitor, MonitorNode};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Executor configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutorConfig {
    /// Turn panics in task bodies into failed outcomes instead of unwinding
    pub catch_panics: bool,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self { catch_panics: true }
    }
}

/// Marks the monitor done when dropped, including during unwinding.
struct FinishGuard<'a> {
    monitor: &'a dyn Monitor,
}

impl Drop for FinishGuard<'_> {
    fn drop(&mut self) {
        self.monitor.done();
    }
}

/// Runs monitored tasks and turns every way they can end into an [`Outcome`].
///
/// The monitor is always marked done before a `run` call returns, whether
/// the task succeeded, failed, was canceled or panicked.
#[derive(Debug, Clone, Default)]
pub struct TaskExecutor {
    config: ExecutorConfig,
}

impl TaskExecutor {
    /// Create an executor with the default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the configuration.
    pub fn with_config(mut self, config: ExecutorConfig) -> Self {
        self.config = config;
        self
    }

    /// Current configuration.
    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    /// Run `task` under `monitor`, or under a fresh [`MonitorNode`] when none
    /// is given.
    pub fn run<T, F>(&self, task: F, monitor: Option<&dyn Monitor>) -> Outcome<T>
    where
        F: FnOnce(&dyn Monitor) -> TaskResult<Outcome<T>>,
    {
        match monitor {
            Some(monitor) => self.execute(task, monitor),
            None => {
                let monitor = MonitorNode::new();
                self.execute(task, &monitor)
            }
        }
    }

    /// Run a task that consumes `input`.
    pub fn run_with<I, R, F>(&self, task: F, input: I, monitor: Option<&dyn Monitor>) -> Outcome<R>
    where
        F: FnOnce(I, &dyn Monitor) -> TaskResult<Outcome<R>>,
    {
        self.run(move |monitor| task(input, monitor), monitor)
    }

    /// Run `task` on tokio's blocking pool.
    ///
    /// Await the result with [`TaskExecutor::join`], which also folds a join
    /// failure into the outcome and finalizes the monitor when the task never
    /// got to run.
    pub fn spawn<T, F>(&self, task: F, monitor: Option<Arc<dyn Monitor>>) -> SpawnedTask<T>
    where
        T: Send + 'static,
        F: FnOnce(&dyn Monitor) -> TaskResult<Outcome<T>> + Send + 'static,
    {
        let executor = self.clone();
        let monitor = monitor.unwrap_or_else(|| Arc::new(MonitorNode::new()));
        let handle = tokio::task::spawn_blocking({
            let monitor = Arc::clone(&monitor);
            move || executor.run(task, Some(monitor.as_ref()))
        });
        SpawnedTask { handle, monitor }
    }

    /// Wait for a spawned task.
    pub async fn join<T>(task: SpawnedTask<T>) -> Outcome<T> {
        match task.handle.await {
            Ok(outcome) => outcome,
            Err(error) => {
                task.monitor.done();
                warn!(%error, "spawned task did not complete");
                Outcome::failure(anyhow::Error::new(error).context("task did not complete"))
            }
        }
    }

    fn execute<T, F>(&self, task: F, monitor: &dyn Monitor) -> Outcome<T>
    where
        F: FnOnce(&dyn Monitor) -> TaskResult<Outcome<T>>,
    {
        let _finish = FinishGuard { monitor };
        let task_name = monitor.task_name();

        let result = if self.config.catch_panics {
            catch_unwind(AssertUnwindSafe(|| task(monitor))).unwrap_or_else(|payload| {
                Err(TaskError::Panicked(panic_message(payload.as_ref())))
            })
        } else {
            task(monitor)
        };

        match result {
            Ok(outcome) => {
                debug!(task = %task_name, success = outcome.is_success(), "task finished");
                outcome
            }
            Err(error) if error.is_canceled() => {
                info!(task = %task_name, "task canceled");
                Outcome::failure(error)
            }
            Err(error) => {
                warn!(task = %task_name, error = %error, "task failed");
                Outcome::failure(error)
            }
        }
    }
}

/// A task running on the blocking pool, together with its monitor.
pub struct SpawnedTask<T> {
    handle: JoinHandle<Outcome<T>>,
    monitor: Arc<dyn Monitor>,
}

impl<T> SpawnedTask<T> {
    /// Monitor the task reports to.
    pub fn monitor(&self) -> &Arc<dyn Monitor> {
        &self.monitor
    }

    /// Drop the task if it has not started yet.
    ///
    /// A task already running is not interrupted; cancel its monitor instead.
    pub fn abort(&self) {
        self.handle.abort();
    }

    /// Whether the task has ended.
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

impl<T> std::fmt::Debug for SpawnedTask<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpawnedTask")
            .field("task_name", &self.monitor.task_name())
            .field("finished", &self.is_finished())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::mpsc;
    use taskmon_core::{Canceled, Problem};
    use taskmon_progress::NullMonitor;

    /// Counts `done` calls on top of a null monitor.
    #[derive(Default)]
    struct CountingMonitor {
        inner: NullMonitor,
        done_calls: AtomicUsize,
    }

    impl CountingMonitor {
        fn done_calls(&self) -> usize {
            self.done_calls.load(Ordering::SeqCst)
        }
    }

    impl Monitor for CountingMonitor {
        fn set_total_work(&self, total: u64) -> Result<(), Canceled> {
            self.inner.set_total_work(total)
        }

        fn step_by(&self, n: u64) -> Result<(), Canceled> {
            self.inner.step_by(n)
        }

        fn uncertain_step_by(&self, n: u64) -> Result<(), Canceled> {
            self.inner.uncertain_step_by(n)
        }

        fn sub_task(&self, weight: u64) -> Arc<dyn Monitor> {
            self.inner.sub_task(weight)
        }

        fn cancel(&self) {
            self.inner.cancel()
        }

        fn is_canceled(&self) -> bool {
            self.inner.is_canceled()
        }

        fn check_cancel(&self) -> Result<(), Canceled> {
            self.inner.check_cancel()
        }

        fn done(&self) {
            self.done_calls.fetch_add(1, Ordering::SeqCst);
            self.inner.done()
        }

        fn is_done(&self) -> bool {
            self.inner.is_done()
        }

        fn work_done(&self) -> f64 {
            self.inner.work_done()
        }

        fn total_work(&self) -> u64 {
            self.inner.total_work()
        }

        fn relative_work_done(&self) -> f64 {
            self.inner.relative_work_done()
        }

        fn task_name(&self) -> String {
            self.inner.task_name()
        }

        fn set_task_name(&self, name: &str) {
            self.inner.set_task_name(name)
        }
    }

    fn count_to(limit: u64, monitor: &dyn Monitor) -> TaskResult<Outcome<u64>> {
        monitor.set_total_work(limit)?;
        let mut sum = 0;
        for i in 1..=limit {
            sum += i;
            monitor.step()?;
        }
        Ok(Outcome::success(sum))
    }

    #[test]
    fn test_run_success_marks_done() {
        let monitor = MonitorNode::named("sum");
        let outcome = TaskExecutor::new().run(|m| count_to(4, m), Some(&monitor));

        assert_eq!(outcome.value(), Some(&10));
        assert!(monitor.is_done());
        assert_eq!(monitor.relative_work_done(), 1.0);
    }

    #[test]
    fn test_run_without_monitor_uses_tree_node() {
        let outcome = TaskExecutor::new().run(
            |monitor| {
                monitor.set_total_work(2)?;
                monitor.step()?;
                // A null monitor would report 0 here.
                Ok(Outcome::success(monitor.relative_work_done()))
            },
            None,
        );
        assert_eq!(outcome.value(), Some(&0.5));
    }

    #[test]
    fn test_run_with_input() {
        let monitor = MonitorNode::new();
        let outcome = TaskExecutor::new().run_with(
            |words: Vec<&str>, monitor| {
                let mut total = 0;
                for word in &words {
                    total += word.len();
                    monitor.uncertain_step()?;
                }
                Ok(Outcome::success(total))
            },
            vec!["alpha", "beta"],
            Some(&monitor),
        );
        assert_eq!(outcome.value(), Some(&9));
        assert_eq!(monitor.total_work(), 2);
        assert!(monitor.is_done());
    }

    #[test]
    fn test_failure_partway_still_marks_done() {
        let monitor = MonitorNode::new();
        let outcome: Outcome<()> = TaskExecutor::new().run(
            |monitor| {
                monitor.set_total_work(10)?;
                monitor.step_by(3)?;
                Err(anyhow::anyhow!("checksum mismatch").into())
            },
            Some(&monitor),
        );

        assert!(outcome.is_failure());
        assert!(!outcome.is_canceled());
        assert_eq!(outcome.cause().unwrap().to_string(), "checksum mismatch");
        assert!(monitor.is_done());
        assert_eq!(monitor.current_work(), 10);
    }

    #[test]
    fn test_cancellation_becomes_canceled_outcome() {
        let root = MonitorNode::new();
        let outcome: Outcome<u64> = TaskExecutor::new().run(
            |monitor| {
                let child = monitor.sub_task(1);
                monitor.cancel();
                count_to(5, child.as_ref())
            },
            Some(&root),
        );

        assert!(outcome.is_failure());
        assert!(outcome.is_canceled());
        assert!(matches!(outcome.cause(), Some(TaskError::Canceled(Canceled))));
        assert!(root.is_done());
    }

    #[test]
    fn test_panic_is_caught() {
        let monitor = MonitorNode::new();
        let outcome: Outcome<()> =
            TaskExecutor::new().run(|_| panic!("unexpected state"), Some(&monitor));

        assert!(outcome.is_failure());
        assert!(matches!(outcome.cause(), Some(TaskError::Panicked(m)) if m == "unexpected state"));
        assert!(monitor.is_done());
    }

    #[test]
    fn test_panic_propagates_when_not_caught_but_monitor_is_done() {
        let monitor = MonitorNode::new();
        let executor = TaskExecutor::new().with_config(ExecutorConfig {
            catch_panics: false,
        });

        let result = catch_unwind(AssertUnwindSafe(|| {
            executor.run::<(), _>(|_| panic!("escaped"), Some(&monitor))
        }));

        assert!(result.is_err());
        assert!(monitor.is_done());
    }

    #[test]
    fn test_task_outcome_with_warnings_is_returned_as_is() {
        let outcome = TaskExecutor::new().run(
            |_| Ok(Outcome::success("ok").with_problem(Problem::warning("retried once"))),
            Some(&NullMonitor::new()),
        );
        assert!(outcome.is_success());
        assert_eq!(outcome.problems().len(), 1);
    }

    #[test]
    fn test_null_monitor_done_after_run() {
        let monitor = NullMonitor::new();
        let _ = TaskExecutor::new().run(|m| count_to(3, m), Some(&monitor));
        assert!(monitor.is_done());
    }

    #[tokio::test]
    async fn test_spawn_and_cancel_from_async_timer() {
        let root = MonitorNode::named("poll");
        let monitor: Arc<dyn Monitor> = Arc::new(root.clone());

        let task = TaskExecutor::new().spawn(
            |monitor| loop {
                monitor.uncertain_step()?;
                std::thread::sleep(std::time::Duration::from_millis(1));
            },
            Some(monitor),
        );

        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        root.cancel();

        let outcome: Outcome<()> = TaskExecutor::join(task).await;
        assert!(outcome.is_canceled());
        assert!(root.is_done());
        assert!(root.total_work() > 0);
    }

    #[tokio::test]
    async fn test_spawn_without_monitor() {
        let task = TaskExecutor::new().spawn(|m| count_to(10, m), None);
        let outcome = TaskExecutor::join(task).await;
        assert_eq!(outcome.value(), Some(&55));
    }

    #[test]
    fn test_done_called_exactly_once_per_run() {
        let executor = TaskExecutor::new();

        let succeeded = CountingMonitor::default();
        let _ = executor.run(|m| count_to(3, m), Some(&succeeded));
        assert_eq!(succeeded.done_calls(), 1);

        let failed = CountingMonitor::default();
        let _: Outcome<()> = executor.run(|_| Err(TaskError::failed("disk full")), Some(&failed));
        assert_eq!(failed.done_calls(), 1);

        let canceled = CountingMonitor::default();
        canceled.cancel();
        let _ = executor.run(|m| count_to(3, m), Some(&canceled));
        assert_eq!(canceled.done_calls(), 1);

        let panicked = CountingMonitor::default();
        let _: Outcome<()> = executor.run(|_| panic!("bad index"), Some(&panicked));
        assert_eq!(panicked.done_calls(), 1);
    }

    #[test]
    fn test_aborted_queued_task_still_marks_done() {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .max_blocking_threads(1)
            .enable_all()
            .build()
            .unwrap();

        runtime.block_on(async {
            let (release, blocked) = mpsc::channel::<()>();
            let blocker = tokio::task::spawn_blocking(move || blocked.recv());

            let ran = Arc::new(AtomicBool::new(false));
            let task_ran = Arc::clone(&ran);
            let monitor = Arc::new(CountingMonitor::default());
            let task = TaskExecutor::new().spawn(
                move |_| {
                    task_ran.store(true, Ordering::SeqCst);
                    Ok(Outcome::success(()))
                },
                Some(monitor.clone() as Arc<dyn Monitor>),
            );
            // The only blocking thread is busy, so the task is still queued.
            task.abort();
            release.send(()).unwrap();

            let outcome = TaskExecutor::join(task).await;
            blocker.await.unwrap().unwrap();

            assert!(outcome.is_failure());
            assert!(!ran.load(Ordering::SeqCst));
            assert!(monitor.is_done());
            assert_eq!(monitor.done_calls(), 1);
        });
    }
}
