pub mod artifact;
pub mod step;

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;

use crate::config::BuildConfig;
use crate::error::Result;
use crate::pin::version::Version;
use step::{BuildStep, StepStatus};

/// Result of verifying a candidate version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildReport {
    Passed {
        steps: Vec<String>,
    },
    Failed {
        step: String,
        status: String,
        stderr_tail: String,
    },
}

impl BuildReport {
    pub fn passed(&self) -> bool {
        matches!(self, BuildReport::Passed { .. })
    }
}

#[async_trait]
pub trait Verifier: Send + Sync {
    /// Install `version` and build the site with it.
    async fn verify(&self, version: &Version) -> Result<BuildReport>;
}

/// Installs the candidate release, fetches submodules, and runs the site build.
pub struct BuildVerifier {
    config: BuildConfig,
    repo_dir: PathBuf,
    client: Client,
}

impl BuildVerifier {
    pub fn new(config: &BuildConfig, repo_dir: &Path) -> Result<Self> {
        Ok(Self {
            config: config.clone(),
            repo_dir: repo_dir.to_path_buf(),
            client: Client::builder().build()?,
        })
    }

    fn step_env(&self, version: &str) -> Vec<(String, String)> {
        let mut env: Vec<(String, String)> = self
            .config
            .env
            .iter()
            .map(|v| (v.name.clone(), v.value.clone()))
            .collect();
        env.push((self.config.version_env.clone(), version.to_string()));
        env
    }

    /// The ordered steps for `version`. `artifact` is the downloaded package, if any.
    pub fn plan(&self, version: &Version, artifact: Option<&Path>) -> Result<Vec<BuildStep>> {
        let timeout = Duration::from_secs(self.config.step_timeout_secs);
        let version_str = version.to_string();
        let env = self.step_env(&version_str);
        let mut steps = Vec::new();

        if let Some(artifact) = artifact {
            let artifact = artifact.to_string_lossy();
            steps.push(
                BuildStep::from_argv(
                    "install",
                    &self.config.install_command,
                    &[("artifact", &*artifact), ("version", version_str.as_str())],
                    self.repo_dir.clone(),
                    timeout,
                )?
                .with_env(env.clone()),
            );
        }

        if self.config.submodules {
            let argv = ["git", "submodule", "update", "--init", "--recursive"]
                .map(String::from);
            steps.push(
                BuildStep::from_argv("submodules", &argv, &[], self.repo_dir.clone(), timeout)?
                    .with_env(env.clone()),
            );
        }

        steps.push(
            BuildStep::from_argv(
                "build",
                &self.config.command,
                &[("version", version_str.as_str())],
                self.repo_dir.clone(),
                timeout,
            )?
            .with_env(env),
        );

        Ok(steps)
    }

    async fn run_steps(&self, version: &Version, scratch: &Path) -> Result<BuildReport> {
        let artifact = match &self.config.artifact_url {
            Some(template) => {
                let os = artifact::runner_os(self.config.os.as_deref());
                let arch = artifact::runner_arch(self.config.arch.as_deref());
                let url = artifact::artifact_url(template, version, &os, &arch);
                Some(artifact::download(&self.client, &url, scratch).await?)
            }
            None => None,
        };

        let mut completed = Vec::new();
        for step in self.plan(version, artifact.as_deref())? {
            match step.run().await? {
                StepStatus::Succeeded => completed.push(step.name),
                StepStatus::Failed {
                    status,
                    stderr_tail,
                } => {
                    return Ok(BuildReport::Failed {
                        step: step.name,
                        status,
                        stderr_tail,
                    });
                }
            }
        }

        Ok(BuildReport::Passed { steps: completed })
    }
}

#[async_trait]
impl Verifier for BuildVerifier {
    async fn verify(&self, version: &Version) -> Result<BuildReport> {
        let scratch = std::env::temp_dir().join(format!(
            "pinsync-{version}-{}",
            std::process::id()
        ));

        let report = self.run_steps(version, &scratch).await;

        if scratch.exists() {
            if let Err(e) = tokio::fs::remove_dir_all(&scratch).await {
                tracing::warn!(path = %scratch.display(), error = %e, "Failed to remove scratch dir");
            }
        }

        match &report {
            Ok(BuildReport::Passed { steps }) => {
                tracing::info!(version = %version, steps = ?steps, "Build verification passed");
            }
            Ok(BuildReport::Failed { step, status, stderr_tail }) => {
                tracing::error!(
                    version = %version,
                    step = %step,
                    status = %status,
                    stderr = %stderr_tail,
                    "Build verification failed"
                );
            }
            Err(e) => {
                tracing::error!(version = %version, error = %e, "Build verification could not run");
            }
        }

        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EnvVar;

    fn sh(script: &str) -> Vec<String> {
        vec!["sh".into(), "-c".into(), script.into()]
    }

    fn verifier(config: BuildConfig) -> BuildVerifier {
        BuildVerifier::new(&config, &std::env::temp_dir()).unwrap()
    }

    #[test]
    fn test_plan_orders_install_submodules_build() {
        let v = verifier(BuildConfig::default());
        let steps = v
            .plan(&Version::new(0, 135, 0), Some(Path::new("/tmp/hugo.deb")))
            .unwrap();
        let names: Vec<_> = steps.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["install", "submodules", "build"]);
        assert_eq!(steps[0].display(), "dpkg -i /tmp/hugo.deb");
        assert_eq!(steps[2].display(), "hugo --gc --minify");
        assert!(steps[2]
            .env
            .contains(&("HUGO_VERSION".to_string(), "0.135.0".to_string())));
    }

    #[test]
    fn test_plan_without_artifact_or_submodules() {
        let v = verifier(BuildConfig {
            submodules: false,
            ..BuildConfig::default()
        });
        let steps = v.plan(&Version::new(0, 135, 0), None).unwrap();
        assert_eq!(steps.len(), 1);
        assert_eq!(steps[0].name, "build");
    }

    #[tokio::test]
    async fn test_verify_passes_with_version_env() {
        let v = verifier(BuildConfig {
            submodules: false,
            command: sh("test \"$HUGO_VERSION\" = 0.135.0 && test \"$HUGO_ENV\" = production"),
            env: vec![EnvVar {
                name: "HUGO_ENV".into(),
                value: "production".into(),
            }],
            ..BuildConfig::default()
        });
        let report = v.verify(&Version::new(0, 135, 0)).await.unwrap();
        assert_eq!(
            report,
            BuildReport::Passed {
                steps: vec!["build".to_string()]
            }
        );
    }

    #[tokio::test]
    async fn test_verify_reports_failing_step() {
        let v = verifier(BuildConfig {
            submodules: false,
            command: sh("echo 'template error' >&2; exit 1"),
            ..BuildConfig::default()
        });
        let report = v.verify(&Version::new(0, 135, 0)).await.unwrap();
        assert!(!report.passed());
        match report {
            BuildReport::Failed { step, stderr_tail, .. } => {
                assert_eq!(step, "build");
                assert!(stderr_tail.contains("template error"));
            }
            BuildReport::Passed { .. } => unreachable!(),
        }
    }
}
