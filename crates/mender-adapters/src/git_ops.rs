//! Git operations used at commit and rollback time.

use crate::util::resolve_repo_path_allow_new;
use anyhow::{Context, Result};
use git2::{IndexAddOption, Repository, Signature, StatusOptions};
use mender_core::VersionControl;
use std::path::{Path, PathBuf};

const FALLBACK_NAME: &str = "mender";
const FALLBACK_EMAIL: &str = "mender@local";

pub(crate) fn open_repo_discover(repo_path: &Path) -> Result<Repository> {
    Repository::discover(repo_path).with_context(|| {
        format!(
            "Failed to open repository from path '{}'",
            repo_path.display()
        )
    })
}

fn is_unborn(err: &git2::Error) -> bool {
    matches!(
        err.code(),
        git2::ErrorCode::UnbornBranch | git2::ErrorCode::NotFound
    )
}

/// Stage every working-tree change, including deletions and new files.
/// Ignored paths stay out.
pub fn stage_all(repo_path: &Path) -> Result<()> {
    let repo = open_repo_discover(repo_path)?;
    let mut index = repo.index()?;
    index
        .add_all(["*"].iter(), IndexAddOption::DEFAULT, None)
        .context("Failed to stage new and modified files")?;
    index
        .update_all(["*"].iter(), None)
        .context("Failed to stage deletions")?;
    index.write()?;
    Ok(())
}

/// Commit the index. Author comes from git config, falling back to the
/// agent's own identity.
pub fn commit(repo_path: &Path, message: &str) -> Result<String> {
    let repo = open_repo_discover(repo_path)?;
    let mut index = repo.index()?;

    let tree_id = index.write_tree()?;
    let tree = repo.find_tree(tree_id)?;

    let parent = match repo.head().and_then(|head| head.peel_to_commit()) {
        Ok(commit) => Some(commit),
        Err(err) if is_unborn(&err) => None,
        Err(err) => return Err(err.into()),
    };

    let config = repo.config()?;
    let name = config
        .get_string("user.name")
        .unwrap_or_else(|_| FALLBACK_NAME.to_string());
    let email = config
        .get_string("user.email")
        .unwrap_or_else(|_| FALLBACK_EMAIL.to_string());
    let sig = Signature::now(&name, &email)?;

    let parents: Vec<&git2::Commit<'_>> = parent.iter().collect();
    let oid = repo
        .commit(Some("HEAD"), &sig, &sig, message, &tree, &parents)
        .context("Failed to create commit")?;
    Ok(oid.to_string())
}

/// Current HEAD commit id, or `None` on an unborn branch.
pub fn head_revision(repo_path: &Path) -> Result<Option<String>> {
    let repo = open_repo_discover(repo_path)?;
    let revision = match repo.head() {
        Ok(head) => head.target().map(|oid| oid.to_string()),
        Err(err) if is_unborn(&err) => None,
        Err(err) => return Err(err.into()),
    };
    Ok(revision)
}

/// Restore a file to HEAD. Files that HEAD does not know are removed.
pub fn restore_file(repo_path: &Path, file_path: &Path) -> Result<()> {
    let resolved = resolve_repo_path_allow_new(repo_path, file_path)
        .map_err(|e| anyhow::anyhow!("Invalid path '{}': {}", file_path.display(), e))?;

    let repo = open_repo_discover(repo_path)?;
    let tree = repo.head()?.peel_to_commit()?.tree()?;
    let mut index = repo.index()?;

    match tree.get_path(&resolved.relative) {
        Ok(entry) => {
            let blob = repo.find_blob(entry.id())?;
            std::fs::write(&resolved.absolute, blob.content())
                .with_context(|| format!("Failed to restore {}", file_path.display()))?;
            index.add_path(&resolved.relative)?;
        }
        Err(_) => {
            if resolved.absolute.exists() {
                std::fs::remove_file(&resolved.absolute).with_context(|| {
                    format!("Failed to remove new file {}", file_path.display())
                })?;
            }
            let _ = index.remove_path(&resolved.relative);
        }
    }
    index.write()?;
    Ok(())
}

/// Any tracked change or untracked file, ignoring gitignored paths.
pub fn is_dirty(repo_path: &Path) -> Result<bool> {
    let repo = open_repo_discover(repo_path)?;
    let mut opts = StatusOptions::new();
    opts.include_untracked(true);
    opts.recurse_untracked_dirs(false);
    opts.include_ignored(false);
    opts.exclude_submodules(true);
    let statuses = repo.statuses(Some(&mut opts))?;
    Ok(!statuses.is_empty())
}

/// The version-control surface backed by a repository on disk.
#[derive(Debug, Clone)]
pub struct GitRepo {
    root: PathBuf,
}

impl GitRepo {
    pub fn open(root: &Path) -> Result<Self> {
        let repo = open_repo_discover(root)?;
        let workdir = repo
            .workdir()
            .context("Bare repositories are not supported")?
            .to_path_buf();
        Ok(Self { root: workdir })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl VersionControl for GitRepo {
    fn stage_all(&self) -> Result<()> {
        stage_all(&self.root)
    }

    fn commit(&self, message: &str) -> Result<String> {
        commit(&self.root, message)
    }

    fn head_revision(&self) -> Result<Option<String>> {
        head_revision(&self.root)
    }

    fn discard_file(&self, file: &Path) -> Result<()> {
        restore_file(&self.root, file)
    }

    fn is_dirty(&self) -> Result<bool> {
        is_dirty(&self.root)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Helper to create a temporary git repo for testing
    fn create_temp_repo() -> (tempfile::TempDir, PathBuf) {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let repo_path = temp_dir.path().to_path_buf();

        let repo = Repository::init(&repo_path).expect("Failed to init repo");
        let mut config = repo.config().unwrap();
        config.set_str("user.name", "Test User").unwrap();
        config.set_str("user.email", "test@example.com").unwrap();

        let sig = Signature::now("Test User", "test@example.com").unwrap();
        let tree_id = repo.index().unwrap().write_tree().unwrap();
        let tree = repo.find_tree(tree_id).unwrap();
        repo.commit(Some("HEAD"), &sig, &sig, "Initial commit", &tree, &[])
            .unwrap();

        (temp_dir, repo_path)
    }

    fn commit_test_file(repo_path: &Path, rel_path: &str, content: &str) {
        let full_path = repo_path.join(rel_path);
        if let Some(parent) = full_path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(&full_path, content).unwrap();
        stage_all(repo_path).unwrap();
        commit(repo_path, &format!("add {}", rel_path)).unwrap();
    }

    #[test]
    fn test_clean_repo_is_not_dirty() {
        let (_dir, repo_path) = create_temp_repo();
        assert!(!is_dirty(&repo_path).unwrap());
        std::fs::write(repo_path.join("new.ts"), "x").unwrap();
        assert!(is_dirty(&repo_path).unwrap());
    }

    #[test]
    fn test_stage_all_and_commit_moves_head() {
        let (_dir, repo_path) = create_temp_repo();
        let before = head_revision(&repo_path).unwrap();
        commit_test_file(&repo_path, "src/app.ts", "export const a = 1;\n");
        let after = head_revision(&repo_path).unwrap();
        assert!(after.is_some());
        assert_ne!(before, after);
        assert!(!is_dirty(&repo_path).unwrap());

        let repo = Repository::open(&repo_path).unwrap();
        let head = repo.head().unwrap().peel_to_commit().unwrap();
        assert_eq!(head.author().name(), Some("Test User"));
    }

    #[test]
    fn test_stage_all_includes_deletions() {
        let (_dir, repo_path) = create_temp_repo();
        commit_test_file(&repo_path, "old.ts", "gone soon");
        std::fs::remove_file(repo_path.join("old.ts")).unwrap();
        stage_all(&repo_path).unwrap();
        commit(&repo_path, "remove old").unwrap();
        assert!(!is_dirty(&repo_path).unwrap());
    }

    #[test]
    fn test_commit_on_unborn_branch() {
        let temp_dir = tempfile::tempdir().unwrap();
        Repository::init(temp_dir.path()).unwrap();
        assert_eq!(head_revision(temp_dir.path()).unwrap(), None);
        std::fs::write(temp_dir.path().join("a.ts"), "a").unwrap();
        stage_all(temp_dir.path()).unwrap();
        let id = commit(temp_dir.path(), "first").unwrap();
        assert_eq!(head_revision(temp_dir.path()).unwrap(), Some(id));
    }

    #[test]
    fn test_restore_file_reverts_modification() {
        let (_dir, repo_path) = create_temp_repo();
        commit_test_file(&repo_path, "src/a.ts", "original content");
        std::fs::write(repo_path.join("src/a.ts"), "patched content").unwrap();
        restore_file(&repo_path, Path::new("src/a.ts")).unwrap();
        assert_eq!(
            std::fs::read_to_string(repo_path.join("src/a.ts")).unwrap(),
            "original content"
        );
    }

    #[test]
    fn test_restore_file_removes_new_file() {
        let (_dir, repo_path) = create_temp_repo();
        std::fs::write(repo_path.join("fresh.ts"), "new").unwrap();
        restore_file(&repo_path, Path::new("fresh.ts")).unwrap();
        assert!(!repo_path.join("fresh.ts").exists());
    }

    #[test]
    fn test_git_repo_opens_from_subdirectory() {
        let (_dir, repo_path) = create_temp_repo();
        std::fs::create_dir_all(repo_path.join("src/deep")).unwrap();
        let git = GitRepo::open(&repo_path.join("src/deep")).unwrap();
        assert_eq!(
            git.root().canonicalize().unwrap(),
            repo_path.canonicalize().unwrap()
        );
    }
}
