use std::path::{Path, PathBuf};

use uuid::Uuid;

use crate::pipeline::import::sanitize_filename;

/// One upload partition on disk (`<root>/<id>/<filename>`).
#[derive(Debug, Clone)]
pub struct UploadDir {
    root: PathBuf,
}

impl UploadDir {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Write the bytes and return the path relative to the root.
    pub fn save(&self, id: &Uuid, filename: &str, bytes: &[u8]) -> std::io::Result<String> {
        let dir = self.root.join(id.to_string());
        std::fs::create_dir_all(&dir)?;

        let name = sanitize_filename(filename);
        std::fs::write(dir.join(&name), bytes)?;

        Ok(format!("{id}/{name}"))
    }

    pub fn read(&self, relative: &str) -> std::io::Result<Vec<u8>> {
        std::fs::read(self.full_path(relative))
    }

    /// Full path for a stored relative path. Parent components are dropped.
    pub fn full_path(&self, relative: &str) -> PathBuf {
        relative
            .split('/')
            .filter(|part| !part.is_empty() && *part != "..")
            .fold(self.root.clone(), |path, part| path.join(part))
    }

    /// Remove one upload's directory. Missing directories are fine.
    pub fn remove(&self, id: &Uuid) -> std::io::Result<()> {
        match std::fs::remove_dir_all(self.root.join(id.to_string())) {
            Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(e),
            _ => Ok(()),
        }
    }

    /// Remove every upload in this partition.
    pub fn clear(&self) -> std::io::Result<()> {
        match std::fs::remove_dir_all(&self.root) {
            Err(e) if e.kind() != std::io::ErrorKind::NotFound => return Err(e),
            _ => {}
        }
        std::fs::create_dir_all(&self.root)
    }
}
