use std::path::{Path, PathBuf};
use std::process::Command;

const EXCLUDE_STATE_DIR: &str = ":(exclude).rollout";

/// Writes a zip archive of the committed `HEAD` tree to `out_path`.
///
/// `git archive` honours `.gitignore` implicitly, since only committed files
/// are included. Uncommitted edits are not part of the archive; callers guard
/// against that with [`is_dirty`].
pub fn create_source_archive(project_dir: &Path, out_path: &Path) -> Result<PathBuf, BundleError> {
    if let Some(parent) = out_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| BundleError::Create {
            path: parent.to_path_buf(),
            source: e,
        })?;
    }

    let output = Command::new("git")
        .arg("archive")
        .arg("--format=zip")
        .arg("--output")
        .arg(out_path)
        .arg("HEAD")
        .current_dir(project_dir)
        .output()
        .map_err(|e| BundleError::GitCommand {
            detail: "failed to execute git archive".to_owned(),
            source: e,
        })?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(BundleError::GitFailed {
            detail: format!(
                "git archive exited with {}: {}",
                output.status,
                stderr.trim()
            ),
        });
    }

    tracing::debug!(path = %out_path.display(), "source archive written");
    Ok(out_path.to_path_buf())
}

/// Checks whether the git working tree has uncommitted changes.
///
/// rollout's own state directory is not part of the tree.
pub fn is_dirty(project_dir: &Path) -> Result<bool, BundleError> {
    let output = Command::new("git")
        .args(["status", "--porcelain", "--", ".", EXCLUDE_STATE_DIR])
        .current_dir(project_dir)
        .output()
        .map_err(|e| BundleError::GitCommand {
            detail: "failed to execute git status".to_owned(),
            source: e,
        })?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(BundleError::GitFailed {
            detail: format!(
                "git status exited with {}: {}",
                output.status,
                stderr.trim()
            ),
        });
    }

    Ok(!output.stdout.is_empty())
}

#[derive(Debug, thiserror::Error)]
pub enum BundleError {
    #[error("failed to create directory {path}")]
    Create {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("git command failed: {detail}")]
    GitCommand {
        detail: String,
        source: std::io::Error,
    },
    #[error("git failed: {detail}")]
    GitFailed { detail: String },
}
