//! Directory-backed [`ArtifactStore`].

use std::path::{Path, PathBuf};

use super::ArtifactStore;

/// Writes each artifact as a file in one directory
///
/// The directory is created on first save.
#[derive(Clone, Debug)]
pub struct DirStore {
    dir: PathBuf,
}

impl DirStore {
    /// Store rooted at `dir`
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Destination directory
    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

#[async_trait::async_trait]
impl ArtifactStore for DirStore {
    async fn save(&self, name: &str, bytes: &[u8]) -> std::io::Result<()> {
        // Names come from item ids; refuse anything that would leave the directory
        if name.is_empty() || name.contains(['/', '\\']) || name == "." || name == ".." {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("invalid artifact name {name:?}"),
            ));
        }
        tokio::fs::create_dir_all(&self.dir).await?;
        tokio::fs::write(self.dir.join(name), bytes).await
    }
}
