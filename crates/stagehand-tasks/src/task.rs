//! Task types, task bodies and the series/parallel combinators

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;

use crate::error::{Result, TaskError};
use crate::reporter::{TaskEvent, TaskReporter};

/// Everything a task body gets when it is invoked
#[derive(Clone)]
pub struct TaskContext {
    /// Directory commands run in
    pub root_dir: PathBuf,
    /// Name (or label) of the task being run
    pub task_name: String,
    /// Where progress events go
    pub reporter: Arc<dyn TaskReporter>,
}

impl TaskContext {
    /// Create a context rooted at `root_dir`
    pub fn new(root_dir: impl Into<PathBuf>, reporter: Arc<dyn TaskReporter>) -> Self {
        Self {
            root_dir: root_dir.into(),
            task_name: String::new(),
            reporter,
        }
    }

    /// Same context, scoped to another task
    pub fn for_task(&self, task_name: impl Into<String>) -> Self {
        Self {
            root_dir: self.root_dir.clone(),
            task_name: task_name.into(),
            reporter: self.reporter.clone(),
        }
    }

    /// Emit an event to the reporter
    pub fn report(&self, event: &TaskEvent) {
        self.reporter.report(event);
    }
}

impl fmt::Debug for TaskContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskContext")
            .field("root_dir", &self.root_dir)
            .field("task_name", &self.task_name)
            .finish_non_exhaustive()
    }
}

/// A unit of work. Synchronous work simply completes its future immediately.
#[async_trait]
pub trait TaskBody: Send + Sync {
    /// Run the work, reporting success or the error that made it fail
    async fn run(&self, ctx: &TaskContext) -> Result<()>;

    /// Short human-readable description, used in plans
    fn describe(&self) -> String {
        "<anonymous>".to_string()
    }
}

/// A task reference: by name, by value, or a composite of other tasks.
///
/// Building a `Task` has no side effects; names are only looked up when the
/// task is resolved against a registry.
#[derive(Clone)]
pub enum Task {
    /// Reference to a task registered under this name
    Named(String),
    /// Anonymous task body
    Inline(Arc<dyn TaskBody>),
    /// Children run one after another, stopping at the first failure
    Series(Vec<Task>),
    /// Children run concurrently; fails if any child fails
    Parallel(Vec<Task>),
}

impl Task {
    /// Wrap a body as an anonymous task
    pub fn inline<B: TaskBody + 'static>(body: B) -> Self {
        Self::Inline(Arc::new(body))
    }
}

impl fmt::Display for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (kind, children) = match self {
            Self::Named(name) => return f.write_str(name),
            Self::Inline(body) => return f.write_str(&body.describe()),
            Self::Series(children) => ("series", children),
            Self::Parallel(children) => ("parallel", children),
        };
        write!(f, "{}(", kind)?;
        for (i, child) in children.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}", child)?;
        }
        f.write_str(")")
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Task({})", self)
    }
}

impl From<&str> for Task {
    fn from(name: &str) -> Self {
        Self::Named(name.to_string())
    }
}

impl From<String> for Task {
    fn from(name: String) -> Self {
        Self::Named(name)
    }
}

impl From<Arc<dyn TaskBody>> for Task {
    fn from(body: Arc<dyn TaskBody>) -> Self {
        Self::Inline(body)
    }
}

/// Compose tasks to run one after another
pub fn series<I, T>(children: I) -> Task
where
    I: IntoIterator<Item = T>,
    T: Into<Task>,
{
    Task::Series(children.into_iter().map(Into::into).collect())
}

/// Compose tasks to run concurrently
pub fn parallel<I, T>(children: I) -> Task
where
    I: IntoIterator<Item = T>,
    T: Into<Task>,
{
    Task::Parallel(children.into_iter().map(Into::into).collect())
}

/// Anonymous task from an async closure
pub fn task_fn<F, Fut>(f: F) -> Task
where
    F: Fn(TaskContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    Task::inline(FnTask::new(f))
}

/// Task body backed by a closure returning a future
pub struct FnTask<F> {
    f: F,
}

impl<F> FnTask<F> {
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

#[async_trait]
impl<F, Fut> TaskBody for FnTask<F>
where
    F: Fn(TaskContext) -> Fut + Send + Sync,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    async fn run(&self, ctx: &TaskContext) -> Result<()> {
        (self.f)(ctx.clone()).await
    }
}

/// Task body that runs a shell command in the context's root directory
#[derive(Debug, Clone)]
pub struct ShellTask {
    command: String,
    env: HashMap<String, String>,
}

impl ShellTask {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            env: HashMap::new(),
        }
    }

    /// Set environment variables for the command
    pub fn with_env(mut self, env: HashMap<String, String>) -> Self {
        self.env = env;
        self
    }

    pub fn command(&self) -> &str {
        &self.command
    }
}

#[async_trait]
impl TaskBody for ShellTask {
    async fn run(&self, ctx: &TaskContext) -> Result<()> {
        run_shell_command(ctx, &self.command, &self.env)
            .await?
            .into_result(&self.command)
            .map(|_| ())
    }

    fn describe(&self) -> String {
        self.command.clone()
    }
}

/// Captured result of a finished shell command
#[derive(Debug, Clone)]
pub(crate) struct CommandOutput {
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    /// Stdout on success, a `Command` error otherwise
    pub fn into_result(self, command: &str) -> Result<String> {
        if self.success() {
            Ok(self.stdout)
        } else {
            Err(TaskError::Command {
                command: command.to_string(),
                code: self.code.unwrap_or(-1),
                stderr: self.stderr,
            })
        }
    }
}

/// Run a shell command, streaming its output as events.
///
/// Only spawn and wait failures are errors; the exit status is left to the
/// caller.
pub(crate) async fn run_shell_command(
    ctx: &TaskContext,
    cmd: &str,
    env: &HashMap<String, String>,
) -> Result<CommandOutput> {
    let mut child = Command::new("sh")
        .arg("-c")
        .arg(cmd)
        .current_dir(&ctx.root_dir)
        .envs(env)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()?;

    let stdout = child.stdout.take();
    let stderr = child.stderr.take();

    // Both pipes are drained together so neither can fill up and stall the child
    let (stdout_lines, stderr_lines) = tokio::join!(
        read_lines(ctx, stdout, false),
        read_lines(ctx, stderr, true)
    );

    let status = child.wait().await?;

    Ok(CommandOutput {
        code: status.code(),
        stdout: stdout_lines.join("\n"),
        stderr: stderr_lines.join("\n"),
    })
}

async fn read_lines<R>(ctx: &TaskContext, pipe: Option<R>, is_stderr: bool) -> Vec<String>
where
    R: AsyncRead + Unpin,
{
    let mut collected = Vec::new();
    let Some(pipe) = pipe else {
        return collected;
    };

    let mut lines = BufReader::new(pipe).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        ctx.report(&TaskEvent::Output {
            task: ctx.task_name.clone(),
            line: line.clone(),
            is_stderr,
        });
        collected.push(line);
    }
    collected
}

/// Resolve `path` against the context root unless it is already absolute
pub fn resolve_path(root: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        root.join(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reporter::CollectingReporter;

    fn context() -> (TaskContext, Arc<CollectingReporter>) {
        let reporter = Arc::new(CollectingReporter::default());
        let ctx = TaskContext::new(std::env::temp_dir(), reporter.clone()).for_task("shell");
        (ctx, reporter)
    }

    #[test]
    fn test_combinator_display() {
        let task = series([parallel(["js", "css", "plugins"]), "test".into()]);
        assert_eq!(task.to_string(), "series(parallel(js, css, plugins), test)");
    }

    #[test]
    fn test_inline_describe() {
        let task = Task::inline(ShellTask::new("echo hi"));
        assert_eq!(task.to_string(), "echo hi");
        assert_eq!(task_fn(|_| async { Ok(()) }).to_string(), "<anonymous>");
    }

    #[test]
    fn test_resolve_path() {
        let root = Path::new("/project");
        assert_eq!(resolve_path(root, Path::new("dist")), PathBuf::from("/project/dist"));
        assert_eq!(resolve_path(root, Path::new("/tmp")), PathBuf::from("/tmp"));
    }

    #[tokio::test]
    async fn test_shell_task_success_streams_output() {
        let (ctx, reporter) = context();
        ShellTask::new("echo hello && echo oops >&2")
            .run(&ctx)
            .await
            .unwrap();

        let outputs: Vec<_> = reporter
            .events()
            .into_iter()
            .filter_map(|e| match e {
                TaskEvent::Output { line, is_stderr, .. } => Some((line, is_stderr)),
                _ => None,
            })
            .collect();
        assert!(outputs.contains(&("hello".to_string(), false)));
        assert!(outputs.contains(&("oops".to_string(), true)));
    }

    #[tokio::test]
    async fn test_shell_task_failure() {
        let (ctx, _) = context();
        let err = ShellTask::new("echo broken >&2; exit 3")
            .run(&ctx)
            .await
            .unwrap_err();

        match err {
            TaskError::Command { code, stderr, .. } => {
                assert_eq!(code, 3);
                assert_eq!(stderr, "broken");
            }
            other => panic!("expected command error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_shell_task_env() {
        let (ctx, _) = context();
        let mut env = HashMap::new();
        env.insert("STAGEHAND_FLAG".to_string(), "on".to_string());
        let out = run_shell_command(&ctx, "echo $STAGEHAND_FLAG", &env)
            .await
            .unwrap();
        assert!(out.success());
        assert_eq!(out.stdout, "on");
    }

    #[tokio::test]
    async fn test_failed_command_keeps_stdout() {
        let (ctx, _) = context();
        let out = run_shell_command(&ctx, "echo partial; exit 1", &HashMap::new())
            .await
            .unwrap();
        assert!(!out.success());
        assert_eq!(out.stdout, "partial");
        assert!(out.into_result("x").is_err());
    }
}
