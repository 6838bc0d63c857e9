//! Browser test suite: target discovery, per-page runs and aggregation

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures::stream::{FuturesUnordered, StreamExt};
use serde::{Deserialize, Serialize};
use stagehand_core::config::TestConfig;
use stagehand_core::{ConfigError, StagehandError};
use tracing::{debug, info, instrument, warn};

use crate::error::{Result, TaskError};
use crate::reporter::{TaskEvent, TaskReporter};
use crate::server::{StaticServer, TestServer};
use crate::task::{resolve_path, run_shell_command, TaskBody, TaskContext};

/// Default time a single page may take
pub const DEFAULT_TARGET_TIMEOUT: Duration = Duration::from_secs(20);

/// One test page, relative to the project root
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct TestTarget {
    /// `/`-separated path relative to the root
    pub path: String,
}

impl TestTarget {
    pub fn new(path: impl Into<String>) -> Self {
        Self { path: path.into() }
    }
}

/// Find every file under `root` matching `pattern`, sorted
pub fn discover_targets(root: &Path, pattern: &str) -> Result<Vec<TestTarget>> {
    let full = format!(
        "{}/{}",
        glob::Pattern::escape(&root.to_string_lossy()),
        pattern.trim_start_matches("./")
    );
    let paths = glob::glob(&full).map_err(|err| {
        TaskError::Config(StagehandError::Config(ConfigError::InvalidValue {
            field: "test.pattern".to_string(),
            message: format!("'{}': {}", pattern, err),
        }))
    })?;

    let mut targets = Vec::new();
    for entry in paths {
        let path = entry.map_err(|err| TaskError::Io(err.into()))?;
        if !path.is_file() {
            continue;
        }
        let relative = path.strip_prefix(root).unwrap_or(&path);
        let relative = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        targets.push(TestTarget::new(relative));
    }
    targets.sort();

    debug!(pattern, count = targets.len(), "discovered test targets");
    Ok(targets)
}

/// A failing assertion reported by a page
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FailedAssertion {
    pub module: String,
    pub name: String,
    pub message: String,
}

/// Counts reported by one page run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PageStats {
    pub passed: usize,
    pub failed: usize,
    pub total: usize,
    /// Runtime reported by the page, in milliseconds
    #[serde(default)]
    pub runtime: u64,
    #[serde(default)]
    pub failures: Vec<FailedAssertion>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum StatsLine {
    Nested {
        stats: PageStats,
        #[serde(default)]
        failures: Vec<FailedAssertion>,
    },
    Flat(PageStats),
}

impl PageStats {
    pub fn new(passed: usize, failed: usize, total: usize) -> Self {
        Self {
            passed,
            failed,
            total,
            ..Self::default()
        }
    }

    /// Parse the last JSON stats line of a harness's stdout.
    ///
    /// Accepts `{"passed":..,"failed":..,"total":..}` or the same object under
    /// `"stats"`, optionally with a sibling `"failures"` list.
    pub fn parse(stdout: &str) -> Option<Self> {
        stdout.lines().rev().map(str::trim).find_map(|line| {
            if !line.starts_with('{') {
                return None;
            }
            match serde_json::from_str::<StatsLine>(line).ok()? {
                StatsLine::Nested {
                    mut stats,
                    failures,
                } => {
                    if !failures.is_empty() {
                        stats.failures = failures;
                    }
                    Some(stats)
                }
                StatsLine::Flat(stats) => Some(stats),
            }
        })
    }
}

/// Lifecycle of one target in a suite run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordStatus {
    Pending,
    Running,
    Passed,
    Failed,
}

/// Outcome of running one test target
#[derive(Debug, Clone)]
pub struct TestRunRecord {
    pub target: String,
    pub status: RecordStatus,
    pub passed: usize,
    pub failed: usize,
    pub total: usize,
    pub duration: Duration,
    /// Why the target could not report results (timeout, harness error)
    pub error: Option<String>,
    pub failures: Vec<FailedAssertion>,
}

impl TestRunRecord {
    pub fn pending(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            status: RecordStatus::Pending,
            passed: 0,
            failed: 0,
            total: 0,
            duration: Duration::ZERO,
            error: None,
            failures: Vec::new(),
        }
    }

    pub fn start(&mut self) {
        self.status = RecordStatus::Running;
    }

    /// Record the stats a page reported
    pub fn finish(&mut self, stats: PageStats, duration: Duration) {
        self.status = if stats.failed == 0 {
            RecordStatus::Passed
        } else {
            RecordStatus::Failed
        };
        self.passed = stats.passed;
        self.failed = stats.failed;
        self.total = stats.total;
        self.failures = stats.failures;
        self.duration = duration;
    }

    /// Record a target that never reported results. Counted as one failed test.
    pub fn fail(&mut self, error: impl Into<String>, duration: Duration) {
        self.status = RecordStatus::Failed;
        self.passed = 0;
        self.failed = 1;
        self.total = 1;
        self.error = Some(error.into());
        self.duration = duration;
    }

    /// A failed record for a target that exceeded `after`
    pub fn timed_out(target: impl Into<String>, after: Duration) -> Self {
        let mut record = Self::pending(target);
        let error = TaskError::Timeout {
            target: record.target.clone(),
            after,
        };
        record.fail(error.to_string(), after);
        record
    }

    pub fn is_passed(&self) -> bool {
        self.status == RecordStatus::Passed
    }
}

/// Totals across every target of a suite run
#[derive(Debug, Clone, Default)]
pub struct SuiteResult {
    /// Records sorted by target
    pub records: Vec<TestRunRecord>,
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub duration: Duration,
}

impl SuiteResult {
    pub fn from_records(records: Vec<TestRunRecord>) -> Self {
        let total = records.iter().map(|r| r.total).sum();
        let passed = records.iter().map(|r| r.passed).sum();
        let failed = records.iter().map(|r| r.failed).sum();
        Self {
            records,
            total,
            passed,
            failed,
            duration: Duration::ZERO,
        }
    }

    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = duration;
        self
    }

    pub fn is_success(&self) -> bool {
        self.failed == 0
    }

    pub fn failed_targets(&self) -> Vec<&TestRunRecord> {
        self.records.iter().filter(|r| !r.is_passed()).collect()
    }
}

/// Loads one test page and reports its stats
#[async_trait]
pub trait PageRunner: Send + Sync {
    async fn run_page(&self, url: &str) -> Result<PageStats>;
}

/// Environment variable holding the page URL while a harness runs
pub const URL_ENV: &str = "STAGEHAND_URL";

/// Runs a headless harness command per page.
///
/// `{url}` in the template is replaced by the page URL as a single quoted
/// shell word; the URL is also exported as `STAGEHAND_URL`. The harness prints
/// its stats as a JSON line on stdout; they are used even when it exits
/// non-zero, since harnesses commonly signal failing assertions that way.
pub struct CommandPageRunner {
    template: String,
    ctx: TaskContext,
}

impl CommandPageRunner {
    pub fn new(template: impl Into<String>, ctx: TaskContext) -> Self {
        Self {
            template: template.into(),
            ctx,
        }
    }

    fn command_for(&self, url: &str) -> String {
        self.template.replace("{url}", &shell_quote(url))
    }
}

/// Quote `value` as one POSIX shell word
fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}

#[async_trait]
impl PageRunner for CommandPageRunner {
    async fn run_page(&self, url: &str) -> Result<PageStats> {
        let command = self.command_for(url);
        let env = HashMap::from([(URL_ENV.to_string(), url.to_string())]);
        let output = run_shell_command(&self.ctx, &command, &env).await?;

        if let Some(stats) = PageStats::parse(&output.stdout) {
            return Ok(stats);
        }
        output.into_result(&command)?;
        Err(TaskError::other(format!(
            "`{}` did not print test results",
            command
        )))
    }
}

/// Stops the server when dropped, unless released first
struct ServerGuard {
    server: Option<Arc<dyn TestServer>>,
}

impl ServerGuard {
    fn new(server: Arc<dyn TestServer>) -> Self {
        Self {
            server: Some(server),
        }
    }

    fn url_for(&self, relative: &str) -> String {
        self.server
            .as_ref()
            .map(|server| server.url_for(relative))
            .unwrap_or_default()
    }

    fn release(mut self) {
        if let Some(server) = self.server.take() {
            server.stop();
        }
    }
}

impl Drop for ServerGuard {
    fn drop(&mut self) {
        if let Some(server) = self.server.take() {
            server.stop();
        }
    }
}

/// Runs every target of a suite against one shared server
pub struct TestAggregator {
    runner: Arc<dyn PageRunner>,
    reporter: Arc<dyn TaskReporter>,
    timeout: Duration,
}

impl TestAggregator {
    pub fn new(runner: Arc<dyn PageRunner>, reporter: Arc<dyn TaskReporter>) -> Self {
        Self {
            runner,
            reporter,
            timeout: DEFAULT_TARGET_TIMEOUT,
        }
    }

    /// Per-target time limit
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Run all targets concurrently and aggregate their stats.
    ///
    /// Takes ownership of the server for the run and stops it exactly once,
    /// whether the run completes or the future is dropped.
    #[instrument(skip_all, fields(targets = targets.len()))]
    pub async fn run_suite(
        &self,
        server: Arc<dyn TestServer>,
        targets: &[TestTarget],
    ) -> SuiteResult {
        let guard = ServerGuard::new(server);
        let started = Instant::now();

        let mut running: FuturesUnordered<_> = targets
            .iter()
            .map(|target| self.run_target(&target.path, guard.url_for(&target.path)))
            .collect();

        let mut records = Vec::with_capacity(targets.len());
        while let Some(record) = running.next().await {
            self.reporter.report(&TaskEvent::TargetCompleted {
                record: record.clone(),
            });
            records.push(record);
        }
        drop(running);
        guard.release();

        records.sort_by(|a, b| a.target.cmp(&b.target));
        let result = SuiteResult::from_records(records).with_duration(started.elapsed());
        info!(
            total = result.total,
            failed = result.failed,
            "test suite finished"
        );
        self.reporter.report(&TaskEvent::SuiteCompleted {
            result: result.clone(),
        });
        result
    }

    async fn run_target(&self, target: &str, url: String) -> TestRunRecord {
        let mut record = TestRunRecord::pending(target);
        record.start();
        debug!(target, %url, "running test target");

        let started = Instant::now();
        match tokio::time::timeout(self.timeout, self.runner.run_page(&url)).await {
            Ok(Ok(stats)) => record.finish(stats, started.elapsed()),
            Ok(Err(err)) => {
                warn!(target, error = %err, "test target errored");
                record.fail(err.to_string(), started.elapsed());
            }
            Err(_) => {
                warn!(target, timeout_ms = self.timeout.as_millis() as u64, "test target timed out");
                record = TestRunRecord::timed_out(target, self.timeout);
            }
        }
        record
    }
}

/// Task body that runs the browser test suite described by `[test]`
#[derive(Debug, Clone)]
pub struct TestSuiteTask {
    config: TestConfig,
}

impl TestSuiteTask {
    pub fn new(config: TestConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &TestConfig {
        &self.config
    }
}

#[async_trait]
impl TaskBody for TestSuiteTask {
    async fn run(&self, ctx: &TaskContext) -> Result<()> {
        let root = match &self.config.root {
            Some(root) => resolve_path(&ctx.root_dir, root),
            None => ctx.root_dir.clone(),
        };
        let targets = discover_targets(&root, &self.config.pattern)?;
        if targets.is_empty() {
            warn!(pattern = %self.config.pattern, "no test targets found");
            return Ok(());
        }

        let server: Arc<dyn TestServer> = Arc::new(
            StaticServer::start(
                "test server",
                &root,
                &self.config.host,
                self.config.port,
            )
            .await?,
        );
        let runner = Arc::new(CommandPageRunner::new(&self.config.runner, ctx.clone()));
        let result = TestAggregator::new(runner, ctx.reporter.clone())
            .with_timeout(self.config.timeout())
            .run_suite(server, &targets)
            .await;

        if result.is_success() {
            Ok(())
        } else {
            Err(TaskError::TestsFailed {
                failed: result.failed,
                total: result.total,
            })
        }
    }

    fn describe(&self) -> String {
        format!("test pages {}", self.config.pattern)
    }
}
