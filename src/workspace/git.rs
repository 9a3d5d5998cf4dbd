use std::cell::RefCell;
use std::path::{Path, PathBuf};

use git2::{
    build::CheckoutBuilder, BranchType, Cred, ErrorCode, FetchOptions, Oid, PushOptions,
    RemoteCallbacks, Repository, ResetType, Signature, Status,
};

use crate::error::{AppError, Result};

/// Commit author used for version bumps.
#[derive(Debug, Clone)]
pub struct Author {
    pub name: String,
    pub email: String,
}

/// Validate a branch name to prevent argument injection.
/// Rejects names starting with `-` as defence in depth.
fn validate_branch_name(name: &str) -> Result<()> {
    if name.starts_with('-') {
        return Err(AppError::Git(format!(
            "Invalid branch name (starts with '-'): {name}"
        )));
    }
    Ok(())
}

/// Remote callbacks that authenticate with `token` when one is available.
/// The token is captured by the closure and never written to disk.
fn make_callbacks(token: Option<&str>) -> RemoteCallbacks<'_> {
    let mut callbacks = RemoteCallbacks::new();
    if let Some(token) = token {
        callbacks.credentials(move |_url, _username_from_url, _allowed_types| {
            Cred::userpass_plaintext("x-access-token", token)
        });
    }
    callbacks
}

fn is_non_fast_forward(e: &git2::Error) -> bool {
    let message = e.message().to_ascii_lowercase();
    e.code() == ErrorCode::NotFastForward
        || message.contains("non-fast-forward")
        || message.contains("non-fastforward")
        || message.contains("fastforwardable")
}

/// Name of the checked-out branch.
pub async fn current_branch(dir: &Path) -> Result<String> {
    let dir = dir.to_path_buf();

    tokio::task::spawn_blocking(move || {
        let repo = Repository::open(&dir)?;
        let head = repo.head()?;
        if !head.is_branch() {
            return Err(AppError::Git("HEAD is detached; set git.branch".to_string()));
        }
        head.shorthand()
            .map(str::to_string)
            .map_err(|_| AppError::Git("Branch name is not valid UTF-8".to_string()))
    })
    .await
    .map_err(|e| AppError::Git(format!("Current-branch task panicked: {e}")))?
}

/// Id of the commit HEAD points at.
pub async fn head_commit(dir: &Path) -> Result<String> {
    let dir = dir.to_path_buf();

    tokio::task::spawn_blocking(move || {
        let repo = Repository::open(&dir)?;
        let commit = repo.head()?.peel_to_commit()?;
        Ok(commit.id().to_string())
    })
    .await
    .map_err(|e| AppError::Git(format!("Head-commit task panicked: {e}")))?
}

/// URL of the named remote.
pub async fn remote_url(dir: &Path, remote: &str) -> Result<String> {
    let dir = dir.to_path_buf();
    let remote = remote.to_string();

    tokio::task::spawn_blocking(move || {
        let repo = Repository::open(&dir)?;
        let remote = repo.find_remote(&remote)?;
        remote
            .url()
            .map(str::to_string)
            .map_err(|_| AppError::Git("Remote URL is not valid UTF-8".to_string()))
    })
    .await
    .map_err(|e| AppError::Git(format!("Remote-url task panicked: {e}")))?
}

/// Fetch `branch` from `remote` and fast-forward the local branch to it.
///
/// A local branch that is ahead is left alone; a diverged one is an error.
pub async fn fast_forward(dir: &Path, remote: &str, branch: &str, token: Option<&str>) -> Result<()> {
    validate_branch_name(branch)?;

    let dir = dir.to_path_buf();
    let remote_name = remote.to_string();
    let branch = branch.to_string();
    let token = token.map(str::to_string);

    tokio::task::spawn_blocking(move || {
        let repo = Repository::open(&dir)?;
        let mut remote = repo.find_remote(&remote_name)?;

        let refspec = format!("+refs/heads/{branch}:refs/remotes/{remote_name}/{branch}");
        let mut fetch_opts = FetchOptions::new();
        fetch_opts.remote_callbacks(make_callbacks(token.as_deref()));
        remote.fetch(&[refspec.as_str()], Some(&mut fetch_opts), None)?;

        let upstream = repo
            .find_reference(&format!("refs/remotes/{remote_name}/{branch}"))?
            .peel_to_commit()?
            .id();
        let local_ref_name = format!("refs/heads/{branch}");
        let mut local_ref = repo.find_reference(&local_ref_name)?;
        let local = local_ref.peel_to_commit()?.id();

        if local == upstream || repo.graph_descendant_of(local, upstream)? {
            return Ok(());
        }
        if !repo.graph_descendant_of(upstream, local)? {
            return Err(AppError::Git(format!(
                "Local {branch} has diverged from {remote_name}/{branch}"
            )));
        }

        local_ref.set_target(upstream, "pinsync: fast-forward")?;
        let on_branch = repo
            .head()
            .ok()
            .and_then(|h| h.name().ok().map(|n| n == local_ref_name))
            .unwrap_or(false);
        if on_branch {
            repo.checkout_head(Some(CheckoutBuilder::new().force()))?;
        }

        tracing::info!(branch = %branch, commit = %upstream, "Fast-forwarded to remote");
        Ok(())
    })
    .await
    .map_err(|e| AppError::Git(format!("Fast-forward task panicked: {e}")))?
}

/// Whether `path` (relative to the work tree) differs from HEAD or the index.
pub async fn is_path_dirty(dir: &Path, path: &Path) -> Result<bool> {
    let dir = dir.to_path_buf();
    let path = path.to_path_buf();

    tokio::task::spawn_blocking(move || {
        let repo = Repository::open(&dir)?;
        let status = repo.status_file(&path)?;
        Ok(status != Status::CURRENT)
    })
    .await
    .map_err(|e| AppError::Git(format!("Status task panicked: {e}")))?
}

/// Stage a single path.
pub async fn add_path(dir: &Path, path: &Path) -> Result<()> {
    let dir = dir.to_path_buf();
    let path = path.to_path_buf();

    tokio::task::spawn_blocking(move || {
        let repo = Repository::open(&dir)?;
        let mut index = repo.index()?;
        index.add_path(&path)?;
        index.write()?;
        Ok(())
    })
    .await
    .map_err(|e| AppError::Git(format!("Add task panicked: {e}")))?
}

/// Reset the index entry for `path` to HEAD, keeping the work tree.
pub async fn unstage(dir: &Path, path: &Path) -> Result<()> {
    let dir = dir.to_path_buf();
    let path: PathBuf = path.to_path_buf();

    tokio::task::spawn_blocking(move || {
        let repo = Repository::open(&dir)?;
        let head = repo.head()?.peel(git2::ObjectType::Commit)?;
        repo.reset_default(Some(&head), [path.as_path()])?;
        Ok(())
    })
    .await
    .map_err(|e| AppError::Git(format!("Unstage task panicked: {e}")))?
}

/// Commit the index with a message. Returns the new commit id.
pub async fn commit(dir: &Path, message: &str, author: &Author) -> Result<String> {
    let dir = dir.to_path_buf();
    let message = message.to_string();
    let author = author.clone();

    tokio::task::spawn_blocking(move || {
        let repo = Repository::open(&dir)?;
        let sig = Signature::now(&author.name, &author.email)?;
        let mut index = repo.index()?;
        let tree_oid = index.write_tree()?;
        let tree = repo.find_tree(tree_oid)?;
        let head = repo.head()?;
        let parent = head.peel_to_commit()?;
        let oid = repo.commit(Some("HEAD"), &sig, &sig, &message, &tree, &[&parent])?;
        Ok(oid.to_string())
    })
    .await
    .map_err(|e| AppError::Git(format!("Commit task panicked: {e}")))?
}

/// Move HEAD back to `commit`, keeping index and work tree.
pub async fn reset_soft(dir: &Path, commit: &str) -> Result<()> {
    let dir = dir.to_path_buf();
    let commit = commit.to_string();

    tokio::task::spawn_blocking(move || {
        let repo = Repository::open(&dir)?;
        let target = repo.find_object(Oid::from_str(&commit)?, None)?;
        repo.reset(&target, ResetType::Soft, None)?;
        Ok(())
    })
    .await
    .map_err(|e| AppError::Git(format!("Reset task panicked: {e}")))?
}

/// Create and checkout a new branch.
pub async fn create_branch(dir: &Path, branch_name: &str) -> Result<()> {
    validate_branch_name(branch_name)?;

    let dir = dir.to_path_buf();
    let branch_name = branch_name.to_string();

    tokio::task::spawn_blocking(move || {
        let repo = Repository::open(&dir)?;
        let head = repo.head()?;
        let commit = head.peel_to_commit()?;
        repo.branch(&branch_name, &commit, false)?;
        // Branch and HEAD point at the same commit, so the work tree stays as is.
        repo.set_head(&format!("refs/heads/{branch_name}"))?;
        Ok(())
    })
    .await
    .map_err(|e| AppError::Git(format!("Create-branch task panicked: {e}")))?
}

/// Checkout an existing branch.
pub async fn checkout(dir: &Path, branch_name: &str) -> Result<()> {
    validate_branch_name(branch_name)?;

    let dir = dir.to_path_buf();
    let branch_name = branch_name.to_string();

    tokio::task::spawn_blocking(move || {
        let repo = Repository::open(&dir)?;
        let obj = repo.revparse_single(&format!("refs/heads/{branch_name}"))?;
        repo.checkout_tree(&obj, None)?;
        repo.set_head(&format!("refs/heads/{branch_name}"))?;
        Ok(())
    })
    .await
    .map_err(|e| AppError::Git(format!("Checkout task panicked: {e}")))?
}

/// Switch HEAD back to `base` and delete `branch`. Both must point at the same commit.
pub async fn abandon_branch(dir: &Path, base: &str, branch: &str) -> Result<()> {
    validate_branch_name(base)?;
    validate_branch_name(branch)?;

    let dir = dir.to_path_buf();
    let base = base.to_string();
    let branch = branch.to_string();

    tokio::task::spawn_blocking(move || {
        let repo = Repository::open(&dir)?;
        repo.set_head(&format!("refs/heads/{base}"))?;
        repo.find_branch(&branch, BranchType::Local)?.delete()?;
        Ok(())
    })
    .await
    .map_err(|e| AppError::Git(format!("Abandon-branch task panicked: {e}")))?
}

/// Whether `branch` exists locally or on `remote`.
pub async fn branch_exists(
    dir: &Path,
    remote: &str,
    branch: &str,
    token: Option<&str>,
) -> Result<bool> {
    validate_branch_name(branch)?;

    let dir = dir.to_path_buf();
    let remote_name = remote.to_string();
    let branch = branch.to_string();
    let token = token.map(str::to_string);

    tokio::task::spawn_blocking(move || {
        let repo = Repository::open(&dir)?;
        if repo.find_branch(&branch, BranchType::Local).is_ok() {
            return Ok(true);
        }

        let mut remote = repo.find_remote(&remote_name)?;
        let connection = remote.connect_auth(
            git2::Direction::Fetch,
            Some(make_callbacks(token.as_deref())),
            None,
        )?;
        let wanted = format!("refs/heads/{branch}");
        let found = connection.list()?.iter().any(|head| head.name() == wanted);
        Ok(found)
    })
    .await
    .map_err(|e| AppError::Git(format!("Branch lookup task panicked: {e}")))?
}

/// Push `branch` to `remote`. Never forced: a non-fast-forward update is rejected.
pub async fn push(dir: &Path, remote: &str, branch_name: &str, token: Option<&str>) -> Result<()> {
    validate_branch_name(branch_name)?;

    let dir = dir.to_path_buf();
    let remote = remote.to_string();
    let branch_name = branch_name.to_string();
    let token = token.map(str::to_string);

    tokio::task::spawn_blocking(move || {
        let repo = Repository::open(&dir)?;
        let mut remote = repo.find_remote(&remote)?;
        let refspec = format!("refs/heads/{branch_name}:refs/heads/{branch_name}");

        let rejected: RefCell<Option<String>> = RefCell::new(None);
        {
            let mut callbacks = make_callbacks(token.as_deref());
            callbacks.push_update_reference(|refname, status| {
                if let Some(message) = status {
                    *rejected.borrow_mut() = Some(format!("{refname}: {message}"));
                }
                Ok(())
            });
            let mut push_opts = PushOptions::new();
            push_opts.remote_callbacks(callbacks);

            remote
                .push(&[refspec.as_str()], Some(&mut push_opts))
                .map_err(|e| {
                    if is_non_fast_forward(&e) {
                        AppError::PushRejected(e.message().to_string())
                    } else {
                        AppError::from(e)
                    }
                })?;
        }

        match rejected.into_inner() {
            Some(reason) => Err(AppError::PushRejected(reason)),
            None => Ok(()),
        }
    })
    .await
    .map_err(|e| AppError::Git(format!("Push task panicked: {e}")))?
}
