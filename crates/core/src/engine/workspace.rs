//! Per-request temporary workspaces with guaranteed cleanup.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

/// Longest label kept in a workspace directory name.
const MAX_LABEL_CHARS: usize = 48;

/// Creates workspaces under a shared root.
#[derive(Debug, Clone)]
pub struct ResourceScope {
    root: PathBuf,
}

impl ResourceScope {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Runs `f` with a fresh workspace and removes the workspace afterwards.
    ///
    /// Removal also happens if `f` panics or the returned future is dropped.
    pub async fn with_scope<F, Fut, T>(&self, label: &str, f: F) -> std::io::Result<T>
    where
        F: FnOnce(Workspace) -> Fut,
        Fut: Future<Output = T>,
    {
        let workspace = self.create(label).await?;
        let result = f(workspace.clone()).await;
        workspace.close().await;
        Ok(result)
    }

    async fn create(&self, label: &str) -> std::io::Result<Workspace> {
        let label: String = label
            .chars()
            .filter(|c| !matches!(c, '/' | '\\'))
            .take(MAX_LABEL_CHARS)
            .collect();
        let path = self
            .root
            .join(format!("{}-{}", label, uuid::Uuid::new_v4()));
        tokio::fs::create_dir_all(&path).await?;
        debug!("Created workspace {:?}", path);
        Ok(Workspace {
            guard: Arc::new(WorkspaceGuard {
                path,
                removed: AtomicBool::new(false),
            }),
        })
    }
}

/// A directory exclusively owned by one request.
#[derive(Debug, Clone)]
pub struct Workspace {
    guard: Arc<WorkspaceGuard>,
}

impl Workspace {
    pub fn path(&self) -> &Path {
        &self.guard.path
    }

    /// Creates a fresh directory for one backend attempt.
    pub async fn attempt_dir(&self, index: usize, backend_id: &str) -> std::io::Result<PathBuf> {
        let dir = self.guard.path.join(format!("{:02}-{}", index, backend_id));
        tokio::fs::create_dir_all(&dir).await?;
        Ok(dir)
    }

    async fn close(&self) {
        if self.guard.removed.swap(true, Ordering::SeqCst) {
            return;
        }
        match tokio::fs::remove_dir_all(&self.guard.path).await {
            Ok(()) => debug!("Removed workspace {:?}", self.guard.path),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!("Failed to remove workspace {:?}: {}", self.guard.path, e),
        }
    }
}

#[derive(Debug)]
struct WorkspaceGuard {
    path: PathBuf,
    removed: AtomicBool,
}

impl Drop for WorkspaceGuard {
    fn drop(&mut self) {
        if self.removed.load(Ordering::SeqCst) {
            return;
        }
        match std::fs::remove_dir_all(&self.path) {
            Ok(()) => debug!("Removed abandoned workspace {:?}", self.path),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!("Failed to remove workspace {:?}: {}", self.path, e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::time::Duration;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_workspace_removed_after_success() {
        let root = TempDir::new().unwrap();
        let scope = ResourceScope::new(root.path());

        let seen = scope
            .with_scope("report", |ws| async move {
                let attempt = ws.attempt_dir(0, "native").await.unwrap();
                std::fs::write(attempt.join("out.txt"), "data").unwrap();
                assert!(ws.path().file_name().unwrap().to_string_lossy().starts_with("report-"));
                ws.path().to_path_buf()
            })
            .await
            .unwrap();

        assert!(!seen.exists());
        assert_eq!(std::fs::read_dir(root.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_workspace_removed_after_panic() {
        let root = TempDir::new().unwrap();
        let scope = ResourceScope::new(root.path());
        let seen = Arc::new(Mutex::new(None));

        let seen_clone = Arc::clone(&seen);
        let handle = tokio::spawn(async move {
            scope
                .with_scope("boom", |ws| async move {
                    *seen_clone.lock().unwrap() = Some(ws.path().to_path_buf());
                    panic!("backend exploded");
                })
                .await
        });
        assert!(handle.await.is_err());

        let path = seen.lock().unwrap().clone().unwrap();
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_workspace_removed_on_cancellation() {
        let root = TempDir::new().unwrap();
        let scope = ResourceScope::new(root.path());

        let result = tokio::time::timeout(
            Duration::from_millis(50),
            scope.with_scope("slow", |_ws| async move {
                tokio::time::sleep(Duration::from_secs(30)).await;
            }),
        )
        .await;

        assert!(result.is_err());
        assert_eq!(std::fs::read_dir(root.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_labels_are_unique() {
        let root = TempDir::new().unwrap();
        let scope = ResourceScope::new(root.path());
        let a = scope.create("same").await.unwrap();
        let b = scope.create("same").await.unwrap();
        assert_ne!(a.path(), b.path());
    }
}
