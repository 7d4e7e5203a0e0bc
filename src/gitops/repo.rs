//! Local repository operations over libgit2.
//!
//! Each operation re-opens the repository inside `spawn_blocking`, so the
//! wrapper itself stays `Send + Sync` and cheap to clone. The one network
//! operation, `push`, shells out to the `git` binary — credential helpers
//! and remote transports stay the user's configuration, not ours.

use std::path::{Path, PathBuf};

use git2::build::CheckoutBuilder;
use git2::{BranchType, IndexAddOption, Repository, StatusOptions};

use crate::error::GitError;

/// Handle on the repository the agent operates in.
#[derive(Clone)]
pub struct GitRepo {
    path: PathBuf,
    author_name: String,
    author_email: String,
}

impl GitRepo {
    /// Open the repository at `path`, verifying it exists.
    pub fn open(path: impl Into<PathBuf>, author_name: &str) -> Result<Self, GitError> {
        let path = path.into();
        Repository::open(&path).map_err(|e| GitError::Open {
            path: path.clone(),
            reason: e.message().to_string(),
        })?;
        Ok(Self {
            path,
            author_name: author_name.to_string(),
            author_email: format!("{author_name}@local"),
        })
    }

    /// Repository root path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn with_repo<T, F>(&self, operation: &'static str, f: F) -> Result<T, GitError>
    where
        T: Send + 'static,
        F: FnOnce(&Repository) -> Result<T, git2::Error> + Send + 'static,
    {
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || {
            let repo = Repository::open(&path)?;
            f(&repo)
        })
        .await
        .map_err(|e| GitError::Operation {
            operation: operation.to_string(),
            reason: format!("blocking task failed: {e}"),
        })?
        .map_err(|e| GitError::Operation {
            operation: operation.to_string(),
            reason: e.message().to_string(),
        })
    }

    /// Name of the currently checked-out branch (short SHA when detached).
    pub async fn current_branch(&self) -> Result<String, GitError> {
        self.with_repo("current-branch", |repo| {
            let head = repo.head()?;
            if head.is_branch() {
                Ok(head.shorthand().unwrap_or("HEAD").to_string())
            } else {
                let oid = head.peel_to_commit()?.id();
                Ok(format!("{:.7}", oid))
            }
        })
        .await
    }

    /// Whether the working tree has no changes, untracked files included.
    pub async fn is_clean(&self) -> Result<bool, GitError> {
        self.with_repo("status", |repo| {
            let mut opts = StatusOptions::new();
            opts.include_untracked(true)
                .include_ignored(false)
                .recurse_untracked_dirs(true);
            let statuses = repo.statuses(Some(&mut opts))?;
            Ok(statuses.is_empty())
        })
        .await
    }

    /// Stage every change in the working tree.
    pub async fn add_all(&self) -> Result<(), GitError> {
        self.with_repo("add-all", |repo| {
            let mut index = repo.index()?;
            index.add_all(["*"].iter(), IndexAddOption::DEFAULT, None)?;
            index.update_all(["*"].iter(), None)?;
            index.write()
        })
        .await
    }

    /// Commit the staged index to HEAD.
    pub async fn commit(&self, message: &str) -> Result<(), GitError> {
        let message = message.to_string();
        let name = self.author_name.clone();
        let email = self.author_email.clone();
        let commit_message = message.clone();
        self.with_repo("commit", move |repo| {
            let sig = git2::Signature::now(&name, &email)?;
            let mut index = repo.index()?;
            let tree_id = index.write_tree()?;
            let tree = repo.find_tree(tree_id)?;
            let parent = repo.head().ok().and_then(|h| h.peel_to_commit().ok());
            let parents: Vec<&git2::Commit> = parent.iter().collect();
            repo.commit(Some("HEAD"), &sig, &sig, &commit_message, &tree, &parents)?;
            Ok(())
        })
        .await?;
        tracing::info!("Commit created: {}", message);
        Ok(())
    }

    /// Create a branch at HEAD and switch to it.
    pub async fn create_and_checkout_branch(&self, branch: &str) -> Result<(), GitError> {
        let name = branch.to_string();
        self.with_repo("create-branch", move |repo| {
            let head_commit = repo.head()?.peel_to_commit()?;
            repo.branch(&name, &head_commit, false)?;
            repo.set_head(&format!("refs/heads/{name}"))?;
            repo.checkout_head(Some(CheckoutBuilder::new().safe()))
        })
        .await?;
        tracing::info!(branch, "Created and checked out branch");
        Ok(())
    }

    /// Switch to an existing branch, refusing to clobber local changes.
    pub async fn checkout_branch(&self, branch: &str) -> Result<(), GitError> {
        self.checkout(branch, false).await
    }

    /// Switch to an existing branch, discarding local changes. Used by the
    /// self-improvement rollback, whose contract is to restore the exact
    /// pre-attempt state.
    pub async fn hard_checkout_branch(&self, branch: &str) -> Result<(), GitError> {
        self.checkout(branch, true).await
    }

    async fn checkout(&self, branch: &str, force: bool) -> Result<(), GitError> {
        let name = branch.to_string();
        let missing = self
            .with_repo("checkout", move |repo| {
                if repo.find_branch(&name, BranchType::Local).is_err() {
                    return Ok(true);
                }
                let mut builder = CheckoutBuilder::new();
                if force {
                    builder.force().remove_untracked(true);
                } else {
                    builder.safe();
                }
                repo.set_head(&format!("refs/heads/{name}"))?;
                repo.checkout_head(Some(&mut builder))?;
                Ok(false)
            })
            .await?;
        if missing {
            return Err(GitError::BranchNotFound {
                branch: branch.to_string(),
            });
        }
        tracing::info!(branch, "Checked out branch");
        Ok(())
    }

    /// Delete a local branch.
    pub async fn delete_branch(&self, branch: &str) -> Result<(), GitError> {
        let name = branch.to_string();
        let missing = self
            .with_repo("delete-branch", move |repo| {
                match repo.find_branch(&name, BranchType::Local) {
                    Ok(mut b) => {
                        b.delete()?;
                        Ok(false)
                    }
                    Err(_) => Ok(true),
                }
            })
            .await?;
        if missing {
            return Err(GitError::BranchNotFound {
                branch: branch.to_string(),
            });
        }
        tracing::info!(branch, "Deleted branch");
        Ok(())
    }

    /// Push a branch to `origin` via the `git` binary.
    pub async fn push(&self, branch: &str) -> Result<(), GitError> {
        let output = tokio::process::Command::new("git")
            .args(["push", "origin", branch])
            .current_dir(&self.path)
            .output()
            .await
            .map_err(|e| GitError::PushFailed {
                branch: branch.to_string(),
                reason: e.to_string(),
            })?;
        if !output.status.success() {
            return Err(GitError::PushFailed {
                branch: branch.to_string(),
                reason: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        tracing::info!(branch, "Pushed branch to origin");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Init a repo with one commit on `main`.
    fn init_repo(dir: &Path) -> Repository {
        let repo = Repository::init_opts(
            dir,
            git2::RepositoryInitOptions::new().initial_head("main"),
        )
        .unwrap();
        {
            std::fs::write(dir.join("README.md"), "# test\n").unwrap();
            let mut index = repo.index().unwrap();
            index
                .add_all(["*"].iter(), IndexAddOption::DEFAULT, None)
                .unwrap();
            index.write().unwrap();
            let tree_id = index.write_tree().unwrap();
            let tree = repo.find_tree(tree_id).unwrap();
            let sig = git2::Signature::now("test", "test@local").unwrap();
            repo.commit(Some("HEAD"), &sig, &sig, "initial", &tree, &[])
                .unwrap();
        }
        repo
    }

    #[tokio::test]
    async fn branch_lifecycle() {
        let dir = tempfile::tempdir().unwrap();
        init_repo(dir.path());
        let git = GitRepo::open(dir.path(), "autodev").unwrap();

        assert_eq!(git.current_branch().await.unwrap(), "main");
        assert!(git.is_clean().await.unwrap());

        git.create_and_checkout_branch("feature-x").await.unwrap();
        assert_eq!(git.current_branch().await.unwrap(), "feature-x");

        git.checkout_branch("main").await.unwrap();
        git.delete_branch("feature-x").await.unwrap();
        assert!(matches!(
            git.checkout_branch("feature-x").await,
            Err(GitError::BranchNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn commit_cleans_the_tree() {
        let dir = tempfile::tempdir().unwrap();
        init_repo(dir.path());
        let git = GitRepo::open(dir.path(), "autodev").unwrap();

        std::fs::write(dir.path().join("new_file.txt"), "contents\n").unwrap();
        assert!(!git.is_clean().await.unwrap());

        git.add_all().await.unwrap();
        git.commit("add new file").await.unwrap();
        assert!(git.is_clean().await.unwrap());
    }

    #[tokio::test]
    async fn hard_checkout_discards_changes() {
        let dir = tempfile::tempdir().unwrap();
        init_repo(dir.path());
        let git = GitRepo::open(dir.path(), "autodev").unwrap();

        git.create_and_checkout_branch("scratch").await.unwrap();
        std::fs::write(dir.path().join("junk.txt"), "uncommitted\n").unwrap();

        git.hard_checkout_branch("main").await.unwrap();
        assert_eq!(git.current_branch().await.unwrap(), "main");
        assert!(git.is_clean().await.unwrap());
        assert!(!dir.path().join("junk.txt").exists());
    }

    #[tokio::test]
    async fn open_rejects_non_repositories() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            GitRepo::open(dir.path(), "autodev"),
            Err(GitError::Open { .. })
        ));
    }
}
