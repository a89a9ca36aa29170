//! Archival of checkpoints into durable storage.
//!
//! Archival is best-effort: callers log an [`ArchiveError`] and move on.

use async_trait::async_trait;
use cobuild_core::ArchiveError;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

/// Durable, versioned sink for checkpoint blobs.
#[async_trait]
pub trait Archiver: Send + Sync {
    /// Persist `blob` under `key`.
    async fn save(&self, key: &str, blob: &[u8]) -> Result<(), ArchiveError>;
}

/// Archiver used when no durable backend is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopArchiver;

#[async_trait]
impl Archiver for NoopArchiver {
    async fn save(&self, key: &str, blob: &[u8]) -> Result<(), ArchiveError> {
        tracing::debug!(key, bytes = blob.len(), "Archiving disabled, checkpoint kept locally");
        Ok(())
    }
}

/// Settings for [`GitArchiver`].
#[derive(Debug, Clone)]
pub struct GitArchiverConfig {
    pub repo_dir: PathBuf,
    pub remote: String,
    pub branch: String,
    pub author_name: String,
    pub author_email: String,
    /// Upper bound for each git invocation.
    pub command_timeout: Duration,
}

impl Default for GitArchiverConfig {
    fn default() -> Self {
        Self {
            repo_dir: PathBuf::from("."),
            remote: "origin".to_string(),
            branch: "main".to_string(),
            author_name: "AI-Builder".to_string(),
            author_email: "bot@example.com".to_string(),
            command_timeout: Duration::from_secs(60),
        }
    }
}

/// Commits and pushes `{key}.json` in a git working copy.
#[derive(Debug, Clone)]
pub struct GitArchiver {
    config: GitArchiverConfig,
}

impl GitArchiver {
    pub fn new(config: GitArchiverConfig) -> Self {
        Self { config }
    }

    fn file_name(key: &str) -> String {
        format!("{}.json", key)
    }

    async fn git(&self, key: &str, args: &[&str]) -> Result<(), ArchiveError> {
        let failed = |reason: String| ArchiveError::SaveFailed {
            key: key.to_string(),
            reason,
        };

        let child = Command::new("git")
            .args(args)
            .current_dir(&self.config.repo_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| failed(format!("git {}: {}", args.join(" "), e)))?;

        let output = tokio::time::timeout(self.config.command_timeout, child.wait_with_output())
            .await
            .map_err(|_| {
                failed(format!(
                    "git {} timed out after {:?}",
                    args.join(" "),
                    self.config.command_timeout
                ))
            })?
            .map_err(|e| failed(format!("git {}: {}", args.join(" "), e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let stdout = String::from_utf8_lossy(&output.stdout);
            let detail = if stderr.trim().is_empty() {
                stdout.trim().to_string()
            } else {
                stderr.trim().to_string()
            };
            return Err(failed(format!(
                "git {} exited with {}: {}",
                args.join(" "),
                output.status,
                detail
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl Archiver for GitArchiver {
    async fn save(&self, key: &str, blob: &[u8]) -> Result<(), ArchiveError> {
        let file_name = Self::file_name(key);
        let path = self.config.repo_dir.join(&file_name);
        tokio::fs::write(&path, blob)
            .await
            .map_err(|e| ArchiveError::SaveFailed {
                key: key.to_string(),
                reason: format!("write {}: {}", path.display(), e),
            })?;

        let message = format!("Auto-save {}", key);
        self.git(key, &["config", "user.name", &self.config.author_name])
            .await?;
        self.git(key, &["config", "user.email", &self.config.author_email])
            .await?;
        self.git(key, &["add", &file_name]).await?;
        self.git(key, &["commit", "-m", &message]).await?;
        self.git(key, &["push", &self.config.remote, &self.config.branch])
            .await?;

        tracing::info!(key, remote = %self.config.remote, branch = %self.config.branch, "Checkpoint archived");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_noop_archiver_accepts_everything() {
        assert_eq!(NoopArchiver.save("progress_p1", b"{}").await, Ok(()));
    }

    #[tokio::test]
    async fn test_git_archiver_outside_repository_fails_softly() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;
        let archiver = GitArchiver::new(GitArchiverConfig {
            repo_dir: dir.path().to_path_buf(),
            command_timeout: Duration::from_secs(10),
            ..GitArchiverConfig::default()
        });

        let result = archiver.save("progress_p1", br#"{"pair":1}"#).await;
        assert!(matches!(result, Err(ArchiveError::SaveFailed { ref key, .. }) if key == "progress_p1"));
        // The blob is on disk even though the commit could not happen.
        assert!(dir.path().join("progress_p1.json").exists());
        Ok(())
    }

    #[tokio::test]
    async fn test_git_archiver_missing_directory_fails_softly() {
        let archiver = GitArchiver::new(GitArchiverConfig {
            repo_dir: PathBuf::from("/nonexistent/cobuild/repo"),
            ..GitArchiverConfig::default()
        });
        let result = archiver.save("progress_p9", b"{}").await;
        assert!(matches!(result, Err(ArchiveError::SaveFailed { .. })));
    }
}
