//! Task scheduler — async executor using tokio

use std::any::Any;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::{BoxFuture, FutureExt};
use futures::stream::{FuturesUnordered, StreamExt};
use tracing::{debug, instrument};

use crate::error::{Result, TaskError};
use crate::registry::{PlanKind, PlanNode, TaskRegistry};
use crate::reporter::{TaskEvent, TaskReporter};
use crate::task::{Task, TaskBody, TaskContext};

/// Summary of a successful top-level run
#[derive(Debug, Clone)]
pub struct RunSummary {
    /// The task that was run
    pub task: String,
    /// Number of leaf tasks executed
    pub leaves: usize,
    /// Wall-clock time of the run
    pub duration: Duration,
}

/// Options for the task scheduler
#[derive(Debug, Clone)]
pub struct SchedulerOptions {
    /// Working directory root
    pub root_dir: PathBuf,
}

impl Default for SchedulerOptions {
    fn default() -> Self {
        Self {
            root_dir: std::env::current_dir().unwrap_or_default(),
        }
    }
}

/// Task scheduler — resolves a task against the registry and runs the tree.
///
/// Series children run strictly in order and stop at the first failure.
/// Parallel children are all started before any is awaited; every child runs
/// to completion and the first failure observed is returned.
pub struct TaskScheduler {
    registry: Arc<TaskRegistry>,
    reporter: Arc<dyn TaskReporter>,
    context: TaskContext,
}

impl TaskScheduler {
    /// Create a new scheduler
    pub fn new(
        registry: Arc<TaskRegistry>,
        options: SchedulerOptions,
        reporter: Arc<dyn TaskReporter>,
    ) -> Self {
        let context = TaskContext::new(options.root_dir, reporter.clone());
        Self {
            registry,
            reporter,
            context,
        }
    }

    pub fn registry(&self) -> &Arc<TaskRegistry> {
        &self.registry
    }

    pub fn reporter(&self) -> &Arc<dyn TaskReporter> {
        &self.reporter
    }

    /// Resolve a task without running it
    pub fn plan(&self, task: &Task) -> Result<PlanNode> {
        self.registry.resolve(task)
    }

    /// Run a task to completion.
    ///
    /// Name resolution happens first, so an unknown name fails the run
    /// before any task starts.
    #[instrument(skip_all, fields(task = %task))]
    pub async fn run(&self, task: &Task) -> Result<RunSummary> {
        let start = Instant::now();
        let plan = self.registry.resolve(task)?;
        let result = self.run_plan(&plan).await;
        let duration = start.elapsed();

        self.reporter.report(&TaskEvent::AllCompleted {
            task: task.to_string(),
            succeeded: result.is_ok(),
            duration,
        });

        result.map(|()| RunSummary {
            task: task.to_string(),
            leaves: plan.leaf_count(),
            duration,
        })
    }

    /// Run an already resolved plan
    pub async fn run_plan(&self, plan: &PlanNode) -> Result<()> {
        self.execute_node(plan).await
    }

    fn execute_node<'a>(&'a self, node: &'a PlanNode) -> BoxFuture<'a, Result<()>> {
        async move {
            match &node.kind {
                PlanKind::Leaf(body) => self.execute_leaf(&node.label, body.clone()).await,
                PlanKind::Series(children) => {
                    for child in children {
                        self.execute_node(child).await?;
                    }
                    Ok(())
                }
                PlanKind::Parallel(children) => {
                    let mut pending: FuturesUnordered<_> =
                        children.iter().map(|child| self.execute_node(child)).collect();

                    let mut first_failure = None;
                    while let Some(result) = pending.next().await {
                        if let Err(err) = result {
                            if first_failure.is_none() {
                                first_failure = Some(err);
                            } else {
                                debug!(group = %node.label, error = %err, "additional parallel failure");
                            }
                        }
                    }

                    match first_failure {
                        Some(err) => Err(err),
                        None => Ok(()),
                    }
                }
            }
        }
        .boxed()
    }

    async fn execute_leaf(&self, label: &str, body: Arc<dyn TaskBody>) -> Result<()> {
        let start = Instant::now();
        let ctx = self.context.for_task(label);

        self.reporter.report(&TaskEvent::Started {
            task: label.to_string(),
        });

        // Own tokio task so a panicking body becomes an error instead of
        // tearing down the whole tree
        let handle = tokio::spawn(async move { body.run(&ctx).await });

        let outcome = match handle.await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(err)) => Err(TaskError::failed(label, err)),
            Err(join_err) => Err(TaskError::Panicked {
                task: label.to_string(),
                message: if join_err.is_panic() {
                    panic_message(join_err.into_panic())
                } else {
                    "task was cancelled".to_string()
                },
            }),
        };

        let duration = start.elapsed();
        match &outcome {
            Ok(()) => self.reporter.report(&TaskEvent::Completed {
                task: label.to_string(),
                duration,
            }),
            Err(err) => self.reporter.report(&TaskEvent::Failed {
                task: label.to_string(),
                duration,
                error: err.to_string(),
            }),
        }

        outcome
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reporter::CollectingReporter;
    use crate::task::{parallel, series, task_fn};
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Mutex;
    use tokio::sync::{Barrier, Notify};

    fn scheduler() -> (TaskScheduler, Arc<TaskRegistry>, Arc<CollectingReporter>) {
        let registry = Arc::new(TaskRegistry::new());
        let reporter = Arc::new(CollectingReporter::default());
        let options = SchedulerOptions {
            root_dir: std::env::temp_dir(),
        };
        (
            TaskScheduler::new(registry.clone(), options, reporter.clone()),
            registry,
            reporter,
        )
    }

    fn ok_after(ms: u64, done: Arc<AtomicBool>) -> Task {
        task_fn(move |_| {
            let done = done.clone();
            async move {
                tokio::time::sleep(Duration::from_millis(ms)).await;
                done.store(true, Ordering::SeqCst);
                Ok(())
            }
        })
    }

    fn fail_after(ms: u64, message: &'static str) -> Task {
        task_fn(move |_| async move {
            tokio::time::sleep(Duration::from_millis(ms)).await;
            Err(TaskError::other(message))
        })
    }

    fn log_task(log: Arc<Mutex<Vec<String>>>, name: &'static str, ms: u64) -> Task {
        task_fn(move |_| {
            let log = log.clone();
            async move {
                log.lock().unwrap().push(format!("{name}:start"));
                tokio::time::sleep(Duration::from_millis(ms)).await;
                log.lock().unwrap().push(format!("{name}:end"));
                Ok(())
            }
        })
    }

    #[tokio::test]
    async fn test_series_failure_stops_later_children() {
        let (scheduler, registry, reporter) = scheduler();
        let b_ran = Arc::new(AtomicBool::new(false));
        registry.register("a", fail_after(0, "a broke"));
        registry.register("b", ok_after(0, b_ran.clone()));

        let err = scheduler.run(&series(["a", "b"])).await.unwrap_err();

        assert!(!b_ran.load(Ordering::SeqCst));
        assert_eq!(reporter.started(), vec!["a".to_string()]);
        match err {
            TaskError::Failed { task, error } => {
                assert_eq!(task, "a");
                assert_eq!(error.to_string(), "a broke");
            }
            other => panic!("expected task failure, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_series_runs_in_declared_order() {
        let (scheduler, registry, _) = scheduler();
        let log = Arc::new(Mutex::new(Vec::new()));
        registry.register("a", log_task(log.clone(), "a", 30));
        registry.register("b", log_task(log.clone(), "b", 30));
        registry.register("c", log_task(log.clone(), "c", 0));

        let summary = scheduler.run(&series(["a", "b", "c"])).await.unwrap();

        assert_eq!(summary.leaves, 3);
        assert_eq!(
            *log.lock().unwrap(),
            vec!["a:start", "a:end", "b:start", "b:end", "c:start", "c:end"]
        );
    }

    #[tokio::test]
    async fn test_series_completes_after_last_child() {
        let (scheduler, registry, _) = scheduler();
        let a_done = Arc::new(AtomicBool::new(false));
        let b_done = Arc::new(AtomicBool::new(false));
        registry.register("a", ok_after(0, a_done.clone()));
        registry.register("b", ok_after(50, b_done.clone()));

        scheduler.run(&series(["a", "b"])).await.unwrap();

        assert!(a_done.load(Ordering::SeqCst));
        assert!(b_done.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_parallel_starts_all_children_before_awaiting() {
        let (scheduler, registry, _) = scheduler();
        let barrier = Arc::new(Barrier::new(3));
        for name in ["a", "b", "c"] {
            let barrier = barrier.clone();
            registry.register(
                name,
                task_fn(move |_| {
                    let barrier = barrier.clone();
                    async move {
                        barrier.wait().await;
                        Ok(())
                    }
                }),
            );
        }

        // Deadlocks unless every child is running at the same time
        let tree = parallel(["a", "b", "c"]);
        let run = scheduler.run(&tree);
        tokio::time::timeout(Duration::from_secs(5), run)
            .await
            .expect("parallel children did not overlap")
            .unwrap();
    }

    #[tokio::test]
    async fn test_parallel_verdict_independent_of_order() {
        let orders: [[&str; 3]; 6] = [
            ["ok1", "ok2", "bad"],
            ["ok1", "bad", "ok2"],
            ["ok2", "ok1", "bad"],
            ["ok2", "bad", "ok1"],
            ["bad", "ok1", "ok2"],
            ["bad", "ok2", "ok1"],
        ];

        for order in orders {
            let (scheduler, registry, _) = scheduler();
            registry.register("ok1", ok_after(10, Arc::new(AtomicBool::new(false))));
            registry.register("ok2", ok_after(0, Arc::new(AtomicBool::new(false))));
            registry.register("bad", fail_after(5, "bad"));

            let err = scheduler.run(&parallel(order)).await.unwrap_err();
            assert_eq!(err.failed_task(), Some("bad"));

            let all_ok = parallel(order.iter().filter(|n| **n != "bad").copied());
            assert!(scheduler.run(&all_ok).await.is_ok());
        }
    }

    #[tokio::test]
    async fn test_parallel_failure_waits_for_siblings() {
        let (scheduler, registry, reporter) = scheduler();
        let slow_done = Arc::new(AtomicBool::new(false));
        registry.register("fast-fail", fail_after(0, "boom"));
        registry.register("slow-ok", ok_after(80, slow_done.clone()));

        let err = scheduler
            .run(&parallel(["fast-fail", "slow-ok"]))
            .await
            .unwrap_err();

        assert_eq!(err.failed_task(), Some("fast-fail"));
        assert!(slow_done.load(Ordering::SeqCst));

        let completed = reporter
            .events()
            .iter()
            .any(|e| matches!(e, TaskEvent::Completed { task, .. } if task == "slow-ok"));
        assert!(completed);
    }

    #[tokio::test]
    async fn test_parallel_reports_first_observed_failure() {
        let (scheduler, registry, _) = scheduler();
        registry.register("late", fail_after(80, "late"));
        registry.register("early", fail_after(0, "early"));

        let err = scheduler.run(&parallel(["late", "early"])).await.unwrap_err();
        assert_eq!(err.failed_task(), Some("early"));
    }

    #[tokio::test]
    async fn test_nested_composites() {
        let (scheduler, registry, _) = scheduler();
        let log = Arc::new(Mutex::new(Vec::new()));
        registry.register("js", log_task(log.clone(), "js", 20));
        registry.register("css", log_task(log.clone(), "css", 10));
        registry.register("test", log_task(log.clone(), "test", 0));
        registry.register("default", series([parallel(["js", "css"]), "test".into()]));

        scheduler.run(&Task::from("default")).await.unwrap();

        let log = log.lock().unwrap();
        let test_start = log.iter().position(|e| e == "test:start").unwrap();
        let js_end = log.iter().position(|e| e == "js:end").unwrap();
        let css_end = log.iter().position(|e| e == "css:end").unwrap();
        assert!(test_start > js_end);
        assert!(test_start > css_end);
    }

    #[tokio::test]
    async fn test_unknown_reference_fails_before_anything_runs() {
        let (scheduler, registry, reporter) = scheduler();
        let ran = Arc::new(AtomicBool::new(false));
        registry.register("a", ok_after(0, ran.clone()));

        let err = scheduler
            .run(&parallel(["a", "missing"]))
            .await
            .unwrap_err();

        assert!(matches!(err, TaskError::UnknownTask(ref name) if name == "missing"));
        assert!(!ran.load(Ordering::SeqCst));
        assert!(reporter.events().is_empty());
    }

    #[tokio::test]
    async fn test_reregistration_affects_only_later_runs() {
        let (scheduler, registry, _) = scheduler();
        let scheduler = Arc::new(scheduler);
        let release = Arc::new(Notify::new());
        let old_runs = Arc::new(AtomicUsize::new(0));
        let new_runs = Arc::new(AtomicUsize::new(0));

        {
            let release = release.clone();
            let old_runs = old_runs.clone();
            registry.register(
                "step",
                task_fn(move |_| {
                    let release = release.clone();
                    let old_runs = old_runs.clone();
                    async move {
                        release.notified().await;
                        old_runs.fetch_add(1, Ordering::SeqCst);
                        Ok(())
                    }
                }),
            );
        }

        let in_flight = {
            let scheduler = scheduler.clone();
            tokio::spawn(async move { scheduler.run(&Task::from("step")).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        {
            let new_runs = new_runs.clone();
            registry.register(
                "step",
                task_fn(move |_| {
                    let new_runs = new_runs.clone();
                    async move {
                        new_runs.fetch_add(1, Ordering::SeqCst);
                        Ok(())
                    }
                }),
            );
        }

        release.notify_one();
        in_flight.await.unwrap().unwrap();
        assert_eq!(old_runs.load(Ordering::SeqCst), 1);
        assert_eq!(new_runs.load(Ordering::SeqCst), 0);

        scheduler.run(&Task::from("step")).await.unwrap();
        assert_eq!(old_runs.load(Ordering::SeqCst), 1);
        assert_eq!(new_runs.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_panicking_body_becomes_error() {
        let (scheduler, registry, _) = scheduler();
        registry.register(
            "explode",
            task_fn(|_| async {
                if true {
                    panic!("kaboom");
                }
                Ok(())
            }),
        );

        let err = scheduler.run(&Task::from("explode")).await.unwrap_err();
        match err {
            TaskError::Panicked { task, message } => {
                assert_eq!(task, "explode");
                assert_eq!(message, "kaboom");
            }
            other => panic!("expected panic error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_events_for_successful_run() {
        let (scheduler, registry, reporter) = scheduler();
        registry.register("js", ok_after(0, Arc::new(AtomicBool::new(false))));

        scheduler.run(&Task::from("js")).await.unwrap();

        let events = reporter.events();
        assert!(matches!(events.first(), Some(TaskEvent::Started { task }) if task == "js"));
        assert!(matches!(
            events.last(),
            Some(TaskEvent::AllCompleted { succeeded: true, .. })
        ));
    }

    #[test]
    fn test_plan_does_not_run() {
        let (scheduler, registry, _) = scheduler();
        registry.register("js", fail_after(0, "never"));
        let plan = scheduler.plan(&series(["js"])).unwrap();
        assert_eq!(plan.leaf_count(), 1);
    }
}
