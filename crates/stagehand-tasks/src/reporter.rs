//! Task execution reporting

use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::testing::{SuiteResult, TestRunRecord};

/// Events emitted while tasks, watchers and test suites run
#[derive(Debug, Clone)]
pub enum TaskEvent {
    /// A leaf task is starting
    Started { task: String },
    /// A task produced output
    Output {
        task: String,
        line: String,
        is_stderr: bool,
    },
    /// A leaf task completed successfully
    Completed { task: String, duration: Duration },
    /// A leaf task failed
    Failed {
        task: String,
        duration: Duration,
        error: String,
    },
    /// A test target finished (streamed as soon as it is known)
    TargetCompleted { record: TestRunRecord },
    /// All test targets finished
    SuiteCompleted { result: SuiteResult },
    /// A watch binding saw changes and is re-running its task
    WatchTriggered { task: String, changed: Vec<PathBuf> },
    /// A top-level run finished
    AllCompleted {
        task: String,
        succeeded: bool,
        duration: Duration,
    },
}

/// Trait for reporting task execution progress
pub trait TaskReporter: Send + Sync {
    /// Handle a task event
    fn report(&self, event: &TaskEvent);
}

/// Simple reporter that logs to tracing
#[derive(Debug, Default)]
pub struct TracingReporter;

impl TaskReporter for TracingReporter {
    fn report(&self, event: &TaskEvent) {
        match event {
            TaskEvent::Started { task } => {
                tracing::info!("Starting {}", task);
            }
            TaskEvent::Output {
                task,
                line,
                is_stderr,
            } => {
                if *is_stderr {
                    tracing::warn!("[{}] {}", task, line);
                } else {
                    tracing::debug!("[{}] {}", task, line);
                }
            }
            TaskEvent::Completed { task, duration } => {
                tracing::info!("{} completed in {:.1}s", task, duration.as_secs_f64());
            }
            TaskEvent::Failed {
                task,
                duration,
                error,
            } => {
                tracing::error!("{} failed after {:.1}s: {}", task, duration.as_secs_f64(), error);
            }
            TaskEvent::TargetCompleted { record } => {
                if record.is_passed() {
                    tracing::info!(
                        "{} [{}/{}] in {}ms",
                        record.target,
                        record.passed,
                        record.total,
                        record.duration.as_millis()
                    );
                } else {
                    tracing::error!(
                        "{} [{}/{}] in {}ms{}",
                        record.target,
                        record.passed,
                        record.total,
                        record.duration.as_millis(),
                        record
                            .error
                            .as_ref()
                            .map(|e| format!(": {}", e))
                            .unwrap_or_default()
                    );
                }
            }
            TaskEvent::SuiteCompleted { result } => {
                if result.is_success() {
                    tracing::info!("Passed {} tests", result.total);
                } else {
                    tracing::error!("{}/{} tests failed", result.failed, result.total);
                }
            }
            TaskEvent::WatchTriggered { task, changed } => {
                tracing::info!("{} changed file(s), re-running {}", changed.len(), task);
            }
            TaskEvent::AllCompleted {
                task,
                succeeded,
                duration,
            } => {
                tracing::info!(
                    "{} {} in {:.1}s",
                    task,
                    if *succeeded { "succeeded" } else { "failed" },
                    duration.as_secs_f64()
                );
            }
        }
    }
}

/// Reporter that collects events for later inspection (useful for testing)
#[derive(Debug, Default)]
pub struct CollectingReporter {
    events: Mutex<Vec<TaskEvent>>,
}

impl CollectingReporter {
    /// Get all collected events
    pub fn events(&self) -> Vec<TaskEvent> {
        self.events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Names of the tasks that started, in the order they started
    pub fn started(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                TaskEvent::Started { task } => Some(task),
                _ => None,
            })
            .collect()
    }
}

impl TaskReporter for CollectingReporter {
    fn report(&self, event: &TaskEvent) {
        self.events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(event.clone());
    }
}

/// Registry of task reporters; broadcasts every event to all of them
pub struct TaskReporterRegistry {
    reporters: Vec<Arc<dyn TaskReporter>>,
}

impl TaskReporterRegistry {
    pub fn new() -> Self {
        Self {
            reporters: vec![Arc::new(TracingReporter)],
        }
    }

    pub fn empty() -> Self {
        Self {
            reporters: Vec::new(),
        }
    }

    pub fn register<R: TaskReporter + 'static>(&mut self, reporter: R) {
        self.reporters.push(Arc::new(reporter));
    }

    pub fn register_shared(&mut self, reporter: Arc<dyn TaskReporter>) {
        self.reporters.push(reporter);
    }

    pub fn all(&self) -> &[Arc<dyn TaskReporter>] {
        &self.reporters
    }

    /// Broadcast an event to all registered reporters
    pub fn broadcast(&self, event: &TaskEvent) {
        for reporter in &self.reporters {
            reporter.report(event);
        }
    }
}

impl TaskReporter for TaskReporterRegistry {
    fn report(&self, event: &TaskEvent) {
        self.broadcast(event);
    }
}

impl Default for TaskReporterRegistry {
    fn default() -> Self {
        Self::new()
    }
}
