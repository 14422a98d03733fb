//! Local filesystem map.

use crate::map::{EntryInfo, FileOpenMode, FileSystemMap, FsError, ReadWriteSeek, Result};
use std::collections::VecDeque;
use std::fs;
use std::path::{Path, PathBuf};

/// Map over `std::fs`, rooted at explicit directories (defaults to the
/// platform roots).
pub struct LocalMap {
    roots: Vec<PathBuf>,
}

impl Default for LocalMap {
    fn default() -> Self {
        Self::new()
    }
}

impl LocalMap {
    pub fn new() -> Self {
        #[cfg(windows)]
        let roots = vec![PathBuf::from("C:\\")];
        #[cfg(not(windows))]
        let roots = vec![PathBuf::from("/")];
        Self { roots }
    }

    pub fn with_roots(roots: Vec<PathBuf>) -> Self {
        Self { roots }
    }

    fn entry(path: &Path) -> Result<EntryInfo> {
        let meta = fs::metadata(path)?;
        Ok(EntryInfo {
            path: path.to_path_buf(),
            is_dir: meta.is_dir(),
            size: meta.len(),
        })
    }
}

impl FileSystemMap for LocalMap {
    fn roots(&self) -> Vec<PathBuf> {
        self.roots.clone()
    }

    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn list(&self, path: &Path, recursive: bool) -> Result<Vec<EntryInfo>> {
        if !path.exists() {
            return Err(FsError::NotFound(path.to_path_buf()));
        }
        let mut out = Vec::new();
        let mut queue: VecDeque<PathBuf> = VecDeque::new();
        queue.push_back(path.to_path_buf());
        while let Some(dir) = queue.pop_front() {
            let read = match fs::read_dir(&dir) {
                Ok(r) => r,
                Err(e) => {
                    // Unreadable subdirectories are skipped, not fatal.
                    tracing::debug!(target: "fsmap.local", dir = %dir.display(), error = %e, "skipping");
                    continue;
                }
            };
            for entry in read.flatten() {
                let p = entry.path();
                if let Ok(info) = Self::entry(&p) {
                    let is_dir = info.is_dir;
                    out.push(info);
                    if recursive && is_dir {
                        queue.push_back(p);
                    }
                }
            }
        }
        Ok(out)
    }

    fn create_dir(&self, path: &Path) -> Result<()> {
        fs::create_dir_all(path)?;
        Ok(())
    }

    fn remove(&self, path: &Path) -> Result<()> {
        if !path.exists() {
            return Err(FsError::NotFound(path.to_path_buf()));
        }
        if path.is_dir() {
            fs::remove_dir_all(path)?;
        } else {
            fs::remove_file(path)?;
        }
        Ok(())
    }

    fn rename(&self, from: &Path, to: &Path) -> Result<()> {
        fs::rename(from, to)?;
        Ok(())
    }

    fn copy(&self, from: &Path, to: &Path) -> Result<()> {
        if from.is_dir() {
            self.create_dir(to)?;
            for info in self.list(from, false)? {
                let name = info.path.file_name().map(PathBuf::from).unwrap_or_default();
                self.copy(&info.path, &to.join(name))?;
            }
        } else {
            fs::copy(from, to)?;
        }
        Ok(())
    }

    fn open(&self, path: &Path, mode: FileOpenMode) -> Result<Box<dyn ReadWriteSeek>> {
        let file = match mode {
            FileOpenMode::Read => fs::OpenOptions::new().read(true).open(path)?,
            FileOpenMode::Write => fs::OpenOptions::new()
                .read(true)
                .write(true)
                .create(true)
                .truncate(true)
                .open(path)?,
            FileOpenMode::Append => fs::OpenOptions::new().append(true).open(path)?,
        };
        Ok(Box::new(file))
    }
}
