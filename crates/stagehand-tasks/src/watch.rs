//! Change-triggered task runs for serve mode
//!
//! Each binding polls the files matching its globs and re-runs its task when
//! anything is added, modified or removed. Bindings run on their own tokio
//! tasks, so a slow rebuild in one never delays another.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use globset::{GlobBuilder, GlobSet, GlobSetBuilder};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};
use walkdir::WalkDir;

use crate::error::{Result, TaskError};
use crate::reporter::TaskEvent;
use crate::scheduler::TaskScheduler;
use crate::task::Task;

/// Directories never scanned for changes
const IGNORED_DIRS: &[&str] = &[".git", "node_modules", "target"];

/// Watcher timing options
#[derive(Debug, Clone)]
pub struct WatchOptions {
    /// Directory the globs are relative to
    pub root_dir: PathBuf,
    /// Time between scans
    pub poll_interval: Duration,
    /// After a change, keep folding further changes into the same run until
    /// a scan this long after the last one finds nothing new. Zero disables it.
    pub debounce: Duration,
}

impl Default for WatchOptions {
    fn default() -> Self {
        Self {
            root_dir: PathBuf::from("."),
            poll_interval: Duration::from_millis(250),
            debounce: Duration::from_millis(100),
        }
    }
}

/// A compiled glob set and the task it triggers
#[derive(Debug, Clone)]
pub struct WatchBinding {
    patterns: Vec<String>,
    globs: GlobSet,
    task: Task,
}

impl WatchBinding {
    /// Compile `patterns`; `*` does not cross directory separators, `**` does
    pub fn new<I, S>(patterns: I, task: impl Into<Task>) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let patterns: Vec<String> = patterns.into_iter().map(Into::into).collect();
        let mut builder = GlobSetBuilder::new();
        for pattern in &patterns {
            let glob = GlobBuilder::new(pattern)
                .literal_separator(true)
                .build()
                .map_err(|source| TaskError::InvalidGlob {
                    pattern: pattern.clone(),
                    source,
                })?;
            builder.add(glob);
        }
        let globs = builder.build().map_err(|source| TaskError::InvalidGlob {
            pattern: patterns.join(", "),
            source,
        })?;

        Ok(Self {
            patterns,
            globs,
            task: task.into(),
        })
    }

    pub fn patterns(&self) -> &[String] {
        &self.patterns
    }

    pub fn task(&self) -> &Task {
        &self.task
    }

    /// Whether a root-relative path is watched by this binding
    pub fn matches(&self, relative: &Path) -> bool {
        self.globs.is_match(relative)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FileStamp {
    modified: Option<SystemTime>,
    len: u64,
}

/// Modification stamps of every watched file at one point in time
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    files: HashMap<PathBuf, FileStamp>,
}

impl Snapshot {
    /// Scan `root` for files matching `globs` (paths stored root-relative)
    pub fn capture(root: &Path, globs: &GlobSet) -> Self {
        let mut files = HashMap::new();

        let walker = WalkDir::new(root).into_iter().filter_entry(|entry| {
            entry.depth() == 0
                || !entry.file_type().is_dir()
                || !IGNORED_DIRS
                    .iter()
                    .any(|ignored| entry.file_name() == *ignored)
        });

        for entry in walker.filter_map(|e| e.ok()) {
            if !entry.file_type().is_file() {
                continue;
            }
            let Ok(relative) = entry.path().strip_prefix(root) else {
                continue;
            };
            if !globs.is_match(relative) {
                continue;
            }
            if let Ok(metadata) = entry.metadata() {
                files.insert(
                    relative.to_path_buf(),
                    FileStamp {
                        modified: metadata.modified().ok(),
                        len: metadata.len(),
                    },
                );
            }
        }

        Self { files }
    }

    /// Paths added, modified or removed in `newer`, sorted
    pub fn changes(&self, newer: &Snapshot) -> Vec<PathBuf> {
        let mut changed: Vec<PathBuf> = newer
            .files
            .iter()
            .filter(|(path, stamp)| self.files.get(*path) != Some(*stamp))
            .map(|(path, _)| path.clone())
            .chain(
                self.files
                    .keys()
                    .filter(|path| !newer.files.contains_key(*path))
                    .cloned(),
            )
            .collect();
        changed.sort();
        changed
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

/// Runs bound tasks when watched files change
pub struct Watcher {
    scheduler: Arc<TaskScheduler>,
    options: WatchOptions,
    bindings: Vec<WatchBinding>,
}

impl Watcher {
    pub fn new(scheduler: Arc<TaskScheduler>, options: WatchOptions) -> Self {
        Self {
            scheduler,
            options,
            bindings: Vec::new(),
        }
    }

    /// Bind `patterns` to `task`.
    ///
    /// Globs are compiled and task names resolved right away, so mistakes
    /// surface at startup rather than on the first change.
    pub fn watch<I, S>(&mut self, patterns: I, task: impl Into<Task>) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let binding = WatchBinding::new(patterns, task)?;
        self.scheduler.registry().validate(binding.task())?;
        debug!(patterns = ?binding.patterns(), task = %binding.task(), "watch binding added");
        self.bindings.push(binding);
        Ok(())
    }

    pub fn bindings(&self) -> &[WatchBinding] {
        &self.bindings
    }

    /// Watch until `shutdown` is cancelled
    #[instrument(skip_all, fields(bindings = self.bindings.len()))]
    pub async fn run(self, shutdown: CancellationToken) {
        if self.bindings.is_empty() {
            warn!("no watch bindings configured");
        }

        let handles: Vec<_> = self
            .bindings
            .into_iter()
            .map(|binding| {
                tokio::spawn(watch_binding(
                    self.scheduler.clone(),
                    binding,
                    self.options.clone(),
                    shutdown.clone(),
                ))
            })
            .collect();

        for handle in handles {
            if let Err(err) = handle.await {
                warn!(error = %err, "watch loop ended abnormally");
            }
        }
        info!("watchers stopped");
    }
}

async fn scan(root: &Path, globs: &GlobSet) -> Option<Snapshot> {
    let root = root.to_path_buf();
    let globs = globs.clone();
    match tokio::task::spawn_blocking(move || Snapshot::capture(&root, &globs)).await {
        Ok(snapshot) => Some(snapshot),
        Err(err) => {
            warn!(error = %err, "file scan failed");
            None
        }
    }
}

async fn watch_binding(
    scheduler: Arc<TaskScheduler>,
    binding: WatchBinding,
    options: WatchOptions,
    shutdown: CancellationToken,
) {
    let root = options.root_dir.as_path();
    let Some(mut snapshot) = scan(root, &binding.globs).await else {
        return;
    };
    debug!(task = %binding.task, files = snapshot.len(), "watching");

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => return,
            _ = tokio::time::sleep(options.poll_interval) => {}
        }

        let Some(current) = scan(root, &binding.globs).await else {
            continue;
        };
        let mut changed = snapshot.changes(&current);
        if changed.is_empty() {
            continue;
        }
        snapshot = current;

        if !options.debounce.is_zero() {
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => return,
                    _ = tokio::time::sleep(options.debounce) => {}
                }
                let Some(next) = scan(root, &binding.globs).await else {
                    break;
                };
                let more = snapshot.changes(&next);
                if more.is_empty() {
                    break;
                }
                changed.extend(more);
                snapshot = next;
            }
            changed.sort();
            changed.dedup();
        }

        scheduler.reporter().report(&TaskEvent::WatchTriggered {
            task: binding.task.to_string(),
            changed,
        });

        tokio::select! {
            _ = shutdown.cancelled() => return,
            result = scheduler.run(&binding.task) => {
                if let Err(err) = result {
                    warn!(task = %binding.task, error = %err, "watch-triggered run failed");
                }
            }
        }
    }
}
