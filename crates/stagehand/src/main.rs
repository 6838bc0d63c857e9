//! Stagehand - build, test and watch pipeline runner

mod cli;
mod exit_codes;

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use stagehand_core::StagehandError;
use stagehand_tasks::TaskError;

use cli::{output, Cli, Interrupted};

fn main() {
    let cli = Cli::parse();
    let guard = init_tracing(cli.verbose);

    let code = match cli.execute() {
        Ok(()) => exit_codes::SUCCESS,
        Err(err) => {
            output::error(&error_message(&err));
            exit_code(&err)
        }
    };

    // Flush the file log before exiting
    drop(guard);
    std::process::exit(code);
}

/// The message printed for a failed invocation, with its cause chain.
///
/// Causes already spelled out by an outer message are skipped.
fn error_message(err: &anyhow::Error) -> String {
    let mut message = err.to_string();
    for cause in err.chain().skip(1) {
        let cause = cause.to_string();
        if !message.contains(&cause) {
            message.push_str(": ");
            message.push_str(&cause);
        }
    }
    message
}

/// Map an error to the process exit code
fn exit_code(err: &anyhow::Error) -> i32 {
    if err.downcast_ref::<Interrupted>().is_some() {
        return exit_codes::CANCELLED;
    }
    if let Some(err) = err.downcast_ref::<TaskError>() {
        return if err.is_test_failure() {
            exit_codes::TEST_FAILURE
        } else if err.is_config() {
            exit_codes::CONFIG_ERROR
        } else {
            exit_codes::ERROR
        };
    }
    match err.downcast_ref::<StagehandError>() {
        Some(err) if err.is_config() => exit_codes::CONFIG_ERROR,
        _ => exit_codes::ERROR,
    }
}

/// Set up tracing with two layers:
/// - Console: controlled by RUST_LOG (default: warn, or info with --verbose)
/// - File: always debug-level JSON to ~/.stagehand/logs/
fn init_tracing(verbose: bool) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let default_level = if verbose { "info" } else { "warn" };
    let console_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    if let Some(log_dir) = log_directory() {
        let file_appender = tracing_appender::rolling::daily(&log_dir, "stagehand.log");
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

        tracing_subscriber::registry()
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(false)
                    .with_writer(std::io::stderr)
                    .with_filter(console_filter),
            )
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(non_blocking)
                    .with_target(true)
                    .with_filter(EnvFilter::new("debug")),
            )
            .init();

        return Some(guard);
    }

    // Fallback: console only
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr)
                .with_filter(console_filter),
        )
        .init();

    None
}

/// Returns the log directory path, creating it if needed.
fn log_directory() -> Option<std::path::PathBuf> {
    let log_dir = dirs::home_dir()?.join(".stagehand").join("logs");
    std::fs::create_dir_all(&log_dir).ok()?;
    Some(log_dir)
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;
    use stagehand_core::ConfigError;

    #[test]
    fn test_error_message_prints_each_cause_once() {
        let tests_failed = anyhow::Error::from(TaskError::failed(
            "qunit",
            TaskError::TestsFailed {
                failed: 2,
                total: 3,
            },
        ));
        assert_eq!(
            error_message(&tests_failed),
            "Task 'qunit' failed: 2/3 tests failed"
        );

        let load = Err::<(), _>(StagehandError::from(ConfigError::MissingField(
            "test.runner".to_string(),
        )))
        .context("Failed to load stagehand.toml")
        .unwrap_err();
        assert_eq!(
            error_message(&load),
            "Failed to load stagehand.toml: Missing required configuration field: test.runner"
        );

        let io = anyhow::Error::from(TaskError::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "no such file",
        )));
        assert_eq!(error_message(&io), "IO error: no such file");
    }

    #[test]
    fn test_exit_codes() {
        let tests_failed = anyhow::Error::from(TaskError::failed(
            "qunit",
            TaskError::TestsFailed {
                failed: 1,
                total: 11,
            },
        ));
        assert_eq!(exit_code(&tests_failed), exit_codes::TEST_FAILURE);

        let unknown = anyhow::Error::from(TaskError::UnknownTask("nope".to_string()));
        assert_eq!(exit_code(&unknown), exit_codes::CONFIG_ERROR);

        let command = anyhow::Error::from(TaskError::failed(
            "js",
            TaskError::Command {
                command: "npx rollup".to_string(),
                code: 1,
                stderr: String::new(),
            },
        ));
        assert_eq!(exit_code(&command), exit_codes::ERROR);

        let config = anyhow::Error::from(StagehandError::from(ConfigError::MissingField(
            "watch.bindings[0].run".to_string(),
        )));
        assert_eq!(exit_code(&config), exit_codes::CONFIG_ERROR);

        assert_eq!(
            exit_code(&anyhow::Error::from(Interrupted)),
            exit_codes::CANCELLED
        );
    }
}
