use std::fmt::{Display, Formatter};
use std::process::{Command, Stdio};
use std::sync::Arc;

use anyhow::Context;

/// A program and its arguments.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
}

impl CommandSpec {
    pub fn new<I, S>(program: &str, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.to_string(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }
}

impl Display for CommandSpec {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            if arg.is_empty() || arg.contains(char::is_whitespace) {
                write!(f, " \"{}\"", arg)?;
            } else {
                write!(f, " {}", arg)?;
            }
        }
        Ok(())
    }
}

/// Captured result of a finished command.
#[derive(Clone, Debug, Default)]
pub struct CommandOutput {
    /// `None` when the process was terminated by a signal.
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

/// Runs a command to completion, capturing its output.
pub trait CommandExecutor: Send + Sync {
    fn execute(&self, spec: &CommandSpec) -> anyhow::Result<CommandOutput>;
}

/// [`CommandExecutor`] that spawns real processes.
#[derive(Default)]
pub struct SystemCommands;

impl CommandExecutor for SystemCommands {
    fn execute(&self, spec: &CommandSpec) -> anyhow::Result<CommandOutput> {
        let output = Command::new(&spec.program)
            .args(&spec.args)
            .stdin(Stdio::null())
            .output()
            .with_context(|| format!("Failed to execute {}", spec.program))?;

        Ok(CommandOutput {
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum CommandOutcome {
    Succeeded,
    /// Exited with a non-zero status, or was killed (`code` is `None`).
    Failed { code: Option<i32> },
    SpawnFailed { error: String },
}

impl Display for CommandOutcome {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            CommandOutcome::Succeeded => write!(f, "succeeded"),
            CommandOutcome::Failed { code: Some(code) } => write!(f, "exited with status {}", code),
            CommandOutcome::Failed { code: None } => write!(f, "terminated by signal"),
            CommandOutcome::SpawnFailed { error } => write!(f, "failed to start: {}", error),
        }
    }
}

/// What happened to one configuration step.
#[derive(Clone, Debug)]
pub struct CommandReport {
    pub spec: CommandSpec,
    pub outcome: CommandOutcome,
    pub stdout: String,
    pub stderr: String,
}

impl CommandReport {
    pub fn succeeded(&self) -> bool {
        self.outcome == CommandOutcome::Succeeded
    }
}

/// Executes one-shot configuration commands.
///
/// Failures are logged and reported, never returned as errors: a failing step must not abort
/// the remaining ones.
#[derive(Clone)]
pub struct CommandRunner {
    executor: Arc<dyn CommandExecutor>,
}

impl CommandRunner {
    pub fn new(executor: Arc<dyn CommandExecutor>) -> Self {
        Self { executor }
    }

    /// Runs the command, blocking until it exits.
    pub fn run(&self, spec: &CommandSpec) -> CommandReport {
        debug!("Executing: {}", spec);

        let report = match self.executor.execute(spec) {
            Ok(output) => {
                let outcome = match output.code {
                    Some(0) => CommandOutcome::Succeeded,
                    code => CommandOutcome::Failed { code },
                };
                CommandReport {
                    spec: spec.clone(),
                    outcome,
                    stdout: output.stdout,
                    stderr: output.stderr,
                }
            }
            Err(e) => CommandReport {
                spec: spec.clone(),
                outcome: CommandOutcome::SpawnFailed {
                    error: format!("{:#}", e),
                },
                stdout: String::new(),
                stderr: String::new(),
            },
        };

        let stdout = report.stdout.trim();
        if !stdout.is_empty() {
            debug!("{}", stdout);
        }
        let stderr = report.stderr.trim();
        if !stderr.is_empty() {
            warn!("{}: {}", spec.program, stderr);
        }

        if report.succeeded() {
            info!("Executed command: {}", spec);
        } else {
            warn!("Command `{}` {}", spec, report.outcome);
        }
        report
    }
}
