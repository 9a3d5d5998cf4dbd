use serde::Deserialize;
use std::path::PathBuf;

use crate::error::{AppError, Result};

#[derive(Debug, Deserialize, Clone, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub target: TargetConfig,
    #[serde(default)]
    pub upstream: UpstreamConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub build: BuildConfig,
    #[serde(default)]
    pub git: GitConfig,
    #[serde(default)]
    pub publish: PublishConfig,
    #[serde(default)]
    pub github: GitHubConfig,
    #[serde(default)]
    pub state: StateConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub schedule: ScheduleConfig,
}

/// The file and key holding the pinned version.
#[derive(Debug, Deserialize, Clone)]
pub struct TargetConfig {
    #[serde(default = "default_tool")]
    pub tool: String,
    /// Path of the pinned file, relative to `git.repo_dir`.
    #[serde(default = "default_target_file")]
    pub file: PathBuf,
    #[serde(default = "default_target_key")]
    pub key: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct UpstreamConfig {
    /// `owner/name` of the repository publishing releases.
    #[serde(default = "default_upstream_repo")]
    pub repo: String,
    #[serde(default = "default_api_base")]
    pub api_base: String,
    /// Environment variable holding an API token for the release lookup.
    #[serde(default)]
    pub token_env: Option<String>,
    #[serde(default)]
    pub allow_prerelease: bool,
    #[serde(default = "default_request_timeout")]
    pub timeout_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetryConfig {
    /// Total tries per release lookup, including the first.
    #[serde(default = "default_retry_attempts")]
    pub attempts: u32,
    #[serde(default = "default_retry_base_delay")]
    pub base_delay_ms: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct BuildConfig {
    /// Release artifact URL template. `{version}`, `{os}` and `{arch}` are substituted.
    #[serde(default)]
    pub artifact_url: Option<String>,
    #[serde(default = "default_install_command")]
    pub install_command: Vec<String>,
    #[serde(default)]
    pub os: Option<String>,
    #[serde(default)]
    pub arch: Option<String>,
    #[serde(default = "default_true")]
    pub submodules: bool,
    #[serde(default = "default_build_command")]
    pub command: Vec<String>,
    /// Environment variable exposing the candidate version to every step.
    #[serde(default = "default_version_env")]
    pub version_env: String,
    #[serde(default)]
    pub env: Vec<EnvVar>,
    #[serde(default = "default_step_timeout")]
    pub step_timeout_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct EnvVar {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct GitConfig {
    #[serde(default = "default_repo_dir")]
    pub repo_dir: PathBuf,
    #[serde(default = "default_remote")]
    pub remote: String,
    /// Branch to publish to. Defaults to the checked-out branch.
    #[serde(default)]
    pub branch: Option<String>,
    #[serde(default = "default_true")]
    pub pull_before_run: bool,
    #[serde(default = "default_author_name")]
    pub author_name: String,
    #[serde(default = "default_author_email")]
    pub author_email: String,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum PublishMode {
    /// Commit on the target branch and push it.
    #[default]
    Push,
    /// Push a dedicated branch and open a pull request against the target branch.
    PullRequest,
}

#[derive(Debug, Deserialize, Clone)]
pub struct PublishConfig {
    #[serde(default)]
    pub mode: PublishMode,
    #[serde(default = "default_commit_message")]
    pub commit_message: String,
    #[serde(default = "default_branch_prefix")]
    pub branch_prefix: String,
    #[serde(default = "default_pr_title")]
    pub pr_title: String,
    #[serde(default)]
    pub label: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct GitHubConfig {
    /// Environment variable holding the elevated push token.
    #[serde(default = "default_token_env")]
    pub token_env: String,
    #[serde(default)]
    pub app: Option<GitHubAppConfig>,
    /// `owner/name` of the repository being updated. Derived from the remote URL if unset.
    #[serde(default)]
    pub repo: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct GitHubAppConfig {
    pub app_id: u64,
    pub private_key_path: PathBuf,
    pub installation_id: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StateConfig {
    #[serde(default = "default_state_dir")]
    pub dir: PathBuf,
    /// Refuse to run when the pinned file disagrees with the last verified version.
    #[serde(default)]
    pub enforce_invariant: bool,
}

#[derive(Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub webhook_secret: Option<String>,
}

// Manual Debug impl to avoid leaking the webhook secret
impl std::fmt::Debug for ServerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field(
                "webhook_secret",
                &self.webhook_secret.as_ref().map(|_| "[REDACTED]"),
            )
            .finish()
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ScheduleConfig {
    #[serde(default = "default_interval")]
    pub interval_secs: u64,
    #[serde(default)]
    pub run_on_startup: bool,
}

fn default_tool() -> String {
    "hugo".to_string()
}

fn default_target_file() -> PathBuf {
    PathBuf::from(".github/workflows/hugo.yml")
}

fn default_target_key() -> String {
    "HUGO_VERSION".to_string()
}

fn default_upstream_repo() -> String {
    "gohugoio/hugo".to_string()
}

fn default_api_base() -> String {
    "https://api.github.com".to_string()
}

fn default_request_timeout() -> u64 {
    30
}

fn default_retry_attempts() -> u32 {
    3
}

fn default_retry_base_delay() -> u64 {
    500
}

fn default_install_command() -> Vec<String> {
    vec!["dpkg".into(), "-i".into(), "{artifact}".into()]
}

fn default_build_command() -> Vec<String> {
    vec!["hugo".into(), "--gc".into(), "--minify".into()]
}

fn default_version_env() -> String {
    "HUGO_VERSION".to_string()
}

fn default_step_timeout() -> u64 {
    15 * 60
}

fn default_true() -> bool {
    true
}

fn default_repo_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_remote() -> String {
    "origin".to_string()
}

fn default_author_name() -> String {
    "pinsync[bot]".to_string()
}

fn default_author_email() -> String {
    "pinsync[bot]@users.noreply.github.com".to_string()
}

fn default_commit_message() -> String {
    "chore(deps): bump {tool} to {to}".to_string()
}

fn default_branch_prefix() -> String {
    "pinsync/".to_string()
}

fn default_pr_title() -> String {
    "Bump {tool} from {from} to {to}".to_string()
}

fn default_token_env() -> String {
    "PINSYNC_PUSH_TOKEN".to_string()
}

fn default_state_dir() -> PathBuf {
    PathBuf::from(".pinsync")
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_interval() -> u64 {
    7 * 24 * 60 * 60 // weekly
}

impl Default for TargetConfig {
    fn default() -> Self {
        Self {
            tool: default_tool(),
            file: default_target_file(),
            key: default_target_key(),
        }
    }
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            repo: default_upstream_repo(),
            api_base: default_api_base(),
            token_env: None,
            allow_prerelease: false,
            timeout_secs: default_request_timeout(),
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            attempts: default_retry_attempts(),
            base_delay_ms: default_retry_base_delay(),
        }
    }
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            artifact_url: None,
            install_command: default_install_command(),
            os: None,
            arch: None,
            submodules: true,
            command: default_build_command(),
            version_env: default_version_env(),
            env: Vec::new(),
            step_timeout_secs: default_step_timeout(),
        }
    }
}

impl Default for GitConfig {
    fn default() -> Self {
        Self {
            repo_dir: default_repo_dir(),
            remote: default_remote(),
            branch: None,
            pull_before_run: true,
            author_name: default_author_name(),
            author_email: default_author_email(),
        }
    }
}

impl Default for PublishConfig {
    fn default() -> Self {
        Self {
            mode: PublishMode::default(),
            commit_message: default_commit_message(),
            branch_prefix: default_branch_prefix(),
            pr_title: default_pr_title(),
            label: None,
        }
    }
}

impl Default for GitHubConfig {
    fn default() -> Self {
        Self {
            token_env: default_token_env(),
            app: None,
            repo: None,
        }
    }
}

impl Default for StateConfig {
    fn default() -> Self {
        Self {
            dir: default_state_dir(),
            enforce_invariant: false,
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            webhook_secret: None,
        }
    }
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval(),
            run_on_startup: false,
        }
    }
}

impl AppConfig {
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        Self::load_with_env(config_path, None)
    }

    /// `env` replaces the process environment as the override source when given.
    fn load_with_env(
        config_path: Option<&str>,
        env: Option<config::Map<String, String>>,
    ) -> Result<Self> {
        let mut builder = config::Config::builder();

        // Load from file if specified
        if let Some(path) = config_path {
            builder = builder.add_source(config::File::with_name(path));
        } else {
            builder = builder.add_source(config::File::with_name("pinsync").required(false));
        }

        // Environment overrides: PINSYNC_<SECTION>__<KEY>, e.g. PINSYNC_SERVER__WEBHOOK_SECRET
        builder = builder.add_source(
            config::Environment::with_prefix("PINSYNC")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true)
                .source(env),
        );

        let config: AppConfig = builder
            .build()
            .map_err(|e| AppError::Config(e.to_string()))?
            .try_deserialize()
            .map_err(|e| AppError::Config(e.to_string()))?;

        config.validate()?;
        Ok(config)
    }

    /// Reject settings that would only fail halfway through a run.
    pub fn validate(&self) -> Result<()> {
        if self.target.key.trim().is_empty() {
            return Err(AppError::Config("target.key must not be empty".to_string()));
        }
        if self.target.file.is_absolute() {
            return Err(AppError::Config(format!(
                "target.file must be relative to git.repo_dir, got {}",
                self.target.file.display()
            )));
        }
        if self.upstream.repo.split('/').filter(|s| !s.is_empty()).count() != 2 {
            return Err(AppError::Config(format!(
                "upstream.repo must be owner/name, got {}",
                self.upstream.repo
            )));
        }
        if self.build.command.is_empty() {
            return Err(AppError::Config("build.command must not be empty".to_string()));
        }
        if self.build.artifact_url.is_some() && self.build.install_command.is_empty() {
            return Err(AppError::Config(
                "build.install_command is required when build.artifact_url is set".to_string(),
            ));
        }
        if self.retry.attempts == 0 {
            return Err(AppError::Config("retry.attempts must be at least 1".to_string()));
        }
        Ok(())
    }

    pub fn webhook_secret(&self) -> Option<&str> {
        self.server.webhook_secret.as_deref()
    }

    /// Location of the pinned file on disk.
    pub fn target_path(&self) -> PathBuf {
        self.git.repo_dir.join(&self.target.file)
    }
}
