use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;

use crate::error::{AppError, Result};

const TAIL_LINES: usize = 20;

/// One external command in the build plan.
#[derive(Debug, Clone)]
pub struct BuildStep {
    pub name: String,
    pub program: String,
    pub args: Vec<String>,
    pub dir: PathBuf,
    pub env: Vec<(String, String)>,
    pub timeout: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepStatus {
    Succeeded,
    Failed { status: String, stderr_tail: String },
}

impl BuildStep {
    /// Build a step from an argv, substituting `{name}` placeholders in every argument.
    pub fn from_argv(
        name: &str,
        argv: &[String],
        vars: &[(&str, &str)],
        dir: PathBuf,
        timeout: Duration,
    ) -> Result<Self> {
        let mut argv = argv.iter().map(|arg| substitute(arg, vars));
        let program = argv
            .next()
            .ok_or_else(|| AppError::Config(format!("Build step `{name}` has an empty command")))?;

        Ok(Self {
            name: name.to_string(),
            program,
            args: argv.collect(),
            dir,
            env: Vec::new(),
            timeout,
        })
    }

    pub fn with_env(mut self, env: Vec<(String, String)>) -> Self {
        self.env = env;
        self
    }

    pub fn display(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Run the step to completion. Any non-zero exit, spawn failure or timeout is a failure.
    pub async fn run(&self) -> Result<StepStatus> {
        tracing::info!(step = %self.name, command = %self.display(), "Running build step");

        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .current_dir(&self.dir)
            .envs(self.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => {
                return Ok(StepStatus::Failed {
                    status: format!("failed to spawn {}: {e}", self.program),
                    stderr_tail: String::new(),
                });
            }
        };

        let output = match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(output) => output?,
            Err(_) => {
                return Ok(StepStatus::Failed {
                    status: format!("timed out after {}s", self.timeout.as_secs()),
                    stderr_tail: String::new(),
                });
            }
        };

        let stdout_tail = tail(&output.stdout, TAIL_LINES);
        if !stdout_tail.is_empty() {
            tracing::debug!(step = %self.name, output = %stdout_tail, "Build step stdout");
        }

        if output.status.success() {
            return Ok(StepStatus::Succeeded);
        }

        let status = output
            .status
            .code()
            .map_or_else(|| "killed by signal".to_string(), |c| format!("exit code {c}"));

        Ok(StepStatus::Failed {
            status,
            stderr_tail: tail(&output.stderr, TAIL_LINES),
        })
    }
}

pub fn substitute(template: &str, vars: &[(&str, &str)]) -> String {
    vars.iter().fold(template.to_string(), |acc, (name, value)| {
        acc.replace(&format!("{{{name}}}"), value)
    })
}

fn tail(bytes: &[u8], lines: usize) -> String {
    let text = String::from_utf8_lossy(bytes);
    let all: Vec<&str> = text.lines().collect();
    all[all.len().saturating_sub(lines)..].join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sh(script: &str, timeout: Duration) -> BuildStep {
        BuildStep::from_argv(
            "test",
            &["sh".to_string(), "-c".to_string(), script.to_string()],
            &[],
            std::env::temp_dir(),
            timeout,
        )
        .unwrap()
    }

    #[test]
    fn test_substitute_placeholders() {
        assert_eq!(
            substitute(
                "hugo_extended_{version}_{os}-{arch}.deb",
                &[("version", "0.135.0"), ("os", "linux"), ("arch", "amd64")]
            ),
            "hugo_extended_0.135.0_linux-amd64.deb"
        );
    }

    #[test]
    fn test_empty_argv_is_rejected() {
        let err = BuildStep::from_argv("build", &[], &[], PathBuf::from("."), Duration::ZERO);
        assert!(err.is_err());
    }

    #[test]
    fn test_tail_keeps_last_lines() {
        assert_eq!(tail(b"a\nb\nc\n", 2), "b\nc");
        assert_eq!(tail(b"", 2), "");
    }

    #[tokio::test]
    async fn test_successful_step() {
        let status = sh("exit 0", Duration::from_secs(10)).run().await.unwrap();
        assert_eq!(status, StepStatus::Succeeded);
    }

    #[tokio::test]
    async fn test_failing_step_reports_code_and_stderr() {
        let status = sh("echo broken template >&2; exit 3", Duration::from_secs(10))
            .run()
            .await
            .unwrap();
        match status {
            StepStatus::Failed { status, stderr_tail } => {
                assert_eq!(status, "exit code 3");
                assert_eq!(stderr_tail, "broken template");
            }
            StepStatus::Succeeded => panic!("step should fail"),
        }
    }

    #[tokio::test]
    async fn test_env_is_passed_to_step() {
        let step = sh("test \"$HUGO_VERSION\" = 0.135.0", Duration::from_secs(10))
            .with_env(vec![("HUGO_VERSION".to_string(), "0.135.0".to_string())]);
        assert_eq!(step.run().await.unwrap(), StepStatus::Succeeded);
    }

    #[tokio::test]
    async fn test_timeout_fails_step() {
        let status = sh("sleep 5", Duration::from_millis(100)).run().await.unwrap();
        assert!(matches!(status, StepStatus::Failed { .. }));
    }

    #[tokio::test]
    async fn test_missing_program_fails_step() {
        let step = BuildStep::from_argv(
            "build",
            &["definitely-not-a-real-binary-pinsync".to_string()],
            &[],
            std::env::temp_dir(),
            Duration::from_secs(1),
        )
        .unwrap();
        assert!(matches!(step.run().await.unwrap(), StepStatus::Failed { .. }));
    }
}
