//! Process-wide output directory.

use once_cell::sync::OnceCell;
use std::path::{Path, PathBuf};
use tracing::info;

/// Resolves and lazily creates the directory converted files are placed in.
#[derive(Debug)]
pub struct OutputRoot {
    configured: PathBuf,
    resolved: OnceCell<PathBuf>,
}

impl OutputRoot {
    pub fn new(configured: impl Into<PathBuf>) -> Self {
        Self {
            configured: configured.into(),
            resolved: OnceCell::new(),
        }
    }

    /// Returns the absolute output directory, creating it on first use.
    pub fn get(&self) -> std::io::Result<&Path> {
        self.resolved
            .get_or_try_init(|| {
                let path = if self.configured.is_absolute() {
                    self.configured.clone()
                } else {
                    std::env::current_dir()?.join(&self.configured)
                };
                std::fs::create_dir_all(&path)?;
                info!("Output directory ready at {:?}", path);
                Ok(path)
            })
            .map(PathBuf::as_path)
    }

    /// Resolves a (sanitized) file name inside the output directory.
    pub fn file(&self, name: &str) -> std::io::Result<PathBuf> {
        Ok(self.get()?.join(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_creates_directory_lazily() {
        let temp = TempDir::new().unwrap();
        let target = temp.path().join("nested").join("converted");
        let root = OutputRoot::new(&target);

        assert!(!target.exists());
        let resolved = root.get().unwrap().to_path_buf();
        assert_eq!(resolved, target);
        assert!(target.is_dir());

        // Second call returns the cached path.
        assert_eq!(root.get().unwrap(), resolved.as_path());
        assert_eq!(root.file("a.pdf").unwrap(), target.join("a.pdf"));
    }
}
