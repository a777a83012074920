//! Structured subprocess invocation.
//!
//! Every external command (git, the package manager) goes through
//! [`CommandRunner`] as an explicit argument vector with an explicit working
//! directory and environment delta. Nothing is ever passed through a shell.
//!
//! `TokioRunner` spawns real processes; `MockRunner` records invocations and
//! replays scripted results in tests.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::error::{GraftError, Result};

/// One command to run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: PathBuf,
    /// Variables set for the child only.
    pub env: BTreeMap<String, String>,
    /// Host variables removed from the child's environment.
    pub env_remove: Vec<String>,
}

impl Invocation {
    pub fn new(program: impl Into<String>, cwd: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: cwd.into(),
            env: BTreeMap::new(),
            env_remove: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn env_remove(mut self, key: impl Into<String>) -> Self {
        self.env_remove.push(key.into());
        self
    }

    /// Human-readable command line for logs and error messages.
    pub fn display(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Captured result of a finished command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit code; `None` when killed by a signal.
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(stdout: impl Into<String>) -> Self {
        Self {
            code: Some(0),
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    pub fn failure(code: i32, stderr: impl Into<String>) -> Self {
        Self {
            code: Some(code),
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.code == Some(0)
    }

    /// stdout followed by stderr, trimmed.
    pub fn combined(&self) -> String {
        let out = self.stdout.trim();
        let err = self.stderr.trim();
        match (out.is_empty(), err.is_empty()) {
            (true, _) => err.to_string(),
            (false, true) => out.to_string(),
            (false, false) => format!("{}\n{}", out, err),
        }
    }

    pub fn status_label(&self) -> String {
        match self.code {
            Some(code) => format!("exit status {}", code),
            None => "signal".to_string(),
        }
    }
}

/// Runs invocations to completion. Spawn failures are `Err`; non-zero exits
/// are `Ok` with the code recorded, so callers decide what is fatal.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(&self, invocation: &Invocation) -> Result<CommandOutput>;
}

/// Runner that spawns real processes with `tokio::process`.
pub struct TokioRunner;

#[async_trait]
impl CommandRunner for TokioRunner {
    async fn run(&self, invocation: &Invocation) -> Result<CommandOutput> {
        let mut cmd = tokio::process::Command::new(&invocation.program);
        cmd.args(&invocation.args)
            .current_dir(&invocation.cwd)
            .stdin(std::process::Stdio::null());
        for key in &invocation.env_remove {
            cmd.env_remove(key);
        }
        cmd.envs(&invocation.env);

        let output = cmd.output().await.map_err(|e| {
            GraftError::Process(format!("failed to run `{}`: {}", invocation.display(), e))
        })?;

        Ok(CommandOutput {
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        })
    }
}

/// Side effect a mock can apply to the filesystem when a matching command
/// runs (e.g. materialize a fake clone).
pub type MockEffect = Box<dyn Fn(&Invocation) -> std::io::Result<()> + Send + Sync>;

struct MockRule {
    program: String,
    first_arg: Option<String>,
    output: CommandOutput,
    effect: Option<MockEffect>,
}

/// Scripted runner for tests: matches on program and first argument, records
/// every invocation, succeeds with empty output when no rule matches.
#[derive(Default)]
pub struct MockRunner {
    rules: std::sync::Mutex<Vec<MockRule>>,
    calls: std::sync::Mutex<Vec<Invocation>>,
}

impl MockRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Respond to `program first_arg ...` with `output`.
    pub fn on(self, program: &str, first_arg: Option<&str>, output: CommandOutput) -> Self {
        self.push_rule(program, first_arg, output, None)
    }

    /// Like [`MockRunner::on`], also running `effect` before responding.
    pub fn on_with(
        self,
        program: &str,
        first_arg: Option<&str>,
        output: CommandOutput,
        effect: MockEffect,
    ) -> Self {
        self.push_rule(program, first_arg, output, Some(effect))
    }

    fn push_rule(
        self,
        program: &str,
        first_arg: Option<&str>,
        output: CommandOutput,
        effect: Option<MockEffect>,
    ) -> Self {
        if let Ok(mut rules) = self.rules.lock() {
            rules.push(MockRule {
                program: program.to_string(),
                first_arg: first_arg.map(str::to_string),
                output,
                effect,
            });
        }
        self
    }

    /// Every invocation seen so far, in order.
    pub fn calls(&self) -> Vec<Invocation> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl CommandRunner for MockRunner {
    async fn run(&self, invocation: &Invocation) -> Result<CommandOutput> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(invocation.clone());
        }
        let rules = self
            .rules
            .lock()
            .map_err(|_| GraftError::Process("mock runner poisoned".to_string()))?;
        let rule = rules.iter().find(|r| {
            r.program == invocation.program
                && r.first_arg
                    .as_deref()
                    .map_or(true, |a| invocation.args.first().map(String::as_str) == Some(a))
        });
        match rule {
            Some(rule) => {
                if let Some(effect) = &rule.effect {
                    effect(invocation)?;
                }
                Ok(rule.output.clone())
            }
            None => Ok(CommandOutput::success("")),
        }
    }
}

/// Resolve `path` against `base` unless it is already absolute.
pub fn resolve_in(base: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}
