//! Child-process plumbing shared by the audio and video hand-off paths.
//!
//! Commands are described as argv vectors (no shell) and executed through
//! injectable runners so tests can stub the host binaries.

use std::fmt;
use std::process::{Command, ExitStatus, Stdio};
use std::sync::Arc;

use anyhow::{Context, Result, anyhow};

/// An argv vector: program followed by its arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<String>,
}

impl Invocation {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
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

    /// Build from a template, substituting `{name}` placeholders.
    pub fn from_template(template: &[String], substitutions: &[(&str, &str)]) -> Result<Self> {
        let mut parts = template.iter().map(|part| {
            substitutions
                .iter()
                .fold(part.clone(), |acc, (name, value)| {
                    acc.replace(&format!("{{{name}}}"), value)
                })
        });
        let program = parts
            .next()
            .filter(|p| !p.trim().is_empty())
            .ok_or_else(|| anyhow!("command template is empty"))?;
        Ok(Self {
            program,
            args: parts.collect(),
        })
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args);
        cmd
    }
}

impl fmt::Display for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.program)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

#[derive(Debug)]
pub struct CommandOutput {
    pub status: ExitStatus,
    pub stdout: String,
    pub stderr: String,
}

/// Outcome of a short-lived helper command, kept for logging.
#[derive(Debug, Clone)]
pub struct CommandExecution {
    pub command: String,
    pub success: bool,
    pub exit_code: Option<i32>,
    pub stderr: String,
}

/// Runs a short command to completion and captures its output.
pub type CommandRunner = Arc<dyn Fn(&Invocation) -> Result<CommandOutput> + Send + Sync>;

/// Runs a long-lived child to completion. The callback fires once the
/// process has been spawned, before waiting on it.
pub type ChildRunner =
    Arc<dyn Fn(&Invocation, &mut dyn FnMut()) -> Result<ExitStatus> + Send + Sync>;

pub fn default_runner() -> CommandRunner {
    Arc::new(run_captured)
}

pub fn default_child_runner() -> ChildRunner {
    Arc::new(run_child)
}

pub fn execute(runner: &CommandRunner, invocation: &Invocation) -> CommandExecution {
    let command = invocation.to_string();
    match runner(invocation) {
        Ok(output) => CommandExecution {
            command,
            success: output.status.success(),
            exit_code: output.status.code(),
            stderr: output.stderr,
        },
        Err(err) => CommandExecution {
            command,
            success: false,
            exit_code: None,
            stderr: format!("{err:#}"),
        },
    }
}

fn run_captured(invocation: &Invocation) -> Result<CommandOutput> {
    let output = invocation
        .command()
        .stdin(Stdio::null())
        .output()
        .with_context(|| format!("failed to spawn {}", invocation.program))?;

    Ok(CommandOutput {
        status: output.status,
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
    })
}

fn run_child(invocation: &Invocation, on_spawned: &mut dyn FnMut()) -> Result<ExitStatus> {
    let mut child = invocation
        .command()
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::inherit())
        .spawn()
        .with_context(|| format!("failed to spawn {}", invocation.program))?;
    on_spawned();
    child
        .wait()
        .with_context(|| format!("failed to wait for {}", invocation.program))
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn template_substitutes_placeholders() {
        let template = vec![
            "aplay".to_string(),
            "-q".to_string(),
            "{file}".to_string(),
        ];
        let inv = Invocation::from_template(&template, &[("file", "/s/n.wav")]).unwrap();
        assert_eq!(inv.to_string(), "aplay -q /s/n.wav");
    }

    #[test]
    fn empty_template_is_rejected() {
        assert!(Invocation::from_template(&[], &[]).is_err());
    }

    #[test]
    fn stub_failure_is_reported_as_execution() {
        let stub = testing::StubRunner::default();
        stub.respond("amixer sset Master 50% unmute", 1);
        let runner = stub.into_runner();
        let inv = Invocation::new("amixer").args(["sset", "Master", "50%", "unmute"]);
        let first = execute(&runner, &inv);
        assert!(!first.success);
        assert_eq!(first.exit_code, Some(1));
        let second = execute(&runner, &inv);
        assert!(second.exit_code.is_none());
        assert!(second.stderr.contains("no more stubbed responses"));
    }
}
