//! Stagehand Tasks - Task orchestration engine
//!
//! This crate provides the named task registry with `series`/`parallel`
//! combinators, the scheduler that runs resolved task trees, file watchers
//! that re-run tasks on change, and the browser test suite aggregator.

pub mod error;
pub mod pipeline;
pub mod registry;
pub mod reporter;
pub mod scheduler;
pub mod server;
pub mod task;
pub mod testing;
pub mod watch;

pub use error::{Result, TaskError};
pub use pipeline::{binding_task, build_registry, step_to_task};
pub use registry::{PlanKind, PlanNode, TaskRegistry};
pub use reporter::{
    CollectingReporter, TaskEvent, TaskReporter, TaskReporterRegistry, TracingReporter,
};
pub use scheduler::{RunSummary, SchedulerOptions, TaskScheduler};
pub use server::{StaticServer, TestServer};
pub use task::{parallel, series, task_fn, ShellTask, Task, TaskBody, TaskContext};
pub use testing::{
    discover_targets, CommandPageRunner, FailedAssertion, PageRunner, PageStats, RecordStatus,
    SuiteResult, TestAggregator, TestRunRecord, TestSuiteTask, TestTarget,
};
pub use watch::{Snapshot, WatchBinding, WatchOptions, Watcher};
