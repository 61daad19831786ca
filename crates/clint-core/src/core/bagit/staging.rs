use std::fs;
use std::path::{Path, PathBuf};
use std::process;

use tracing::debug;
use walkdir::WalkDir;

use super::PackagingError;

/// A working copy of a bag directory, built beside it so a rebuild can fail
/// without touching the original. Dropped copies are removed.
#[derive(Debug)]
pub struct StagedBag {
    original: PathBuf,
    path: PathBuf,
    kept: bool,
}

impl StagedBag {
    /// Copies `original` next to itself. Payload files under `data/` are
    /// hard-linked where the filesystem allows it; files at the bag root are
    /// always copied, since packaging rewrites them.
    pub fn create(original: &Path) -> Result<Self, PackagingError> {
        let path = sibling(original, "stage")?;
        let staged = Self {
            original: original.to_path_buf(),
            path,
            kept: false,
        };
        fs::create_dir(&staged.path).map_err(PackagingError::io(&staged.path))?;
        for entry in WalkDir::new(original).min_depth(1).sort_by_file_name() {
            let entry = entry.map_err(|err| PackagingError::Io {
                path: err
                    .path()
                    .map_or_else(|| original.to_path_buf(), Path::to_path_buf),
                source: err.into(),
            })?;
            let relative = entry
                .path()
                .strip_prefix(original)
                .unwrap_or(entry.path());
            let target = staged.path.join(relative);
            if entry.file_type().is_dir() {
                fs::create_dir_all(&target).map_err(PackagingError::io(&target))?;
            } else if entry.depth() > 1 && fs::hard_link(entry.path(), &target).is_ok() {
                continue;
            } else {
                fs::copy(entry.path(), &target).map_err(PackagingError::io(&target))?;
            }
        }
        debug!(
            original = %original.display(),
            staged = %staged.path.display(),
            "staged bag"
        );
        Ok(staged)
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Swaps the staged copy in for the original. The original is only
    /// removed once the staged copy is in place; a failed swap puts it back.
    pub fn replace_original(mut self) -> Result<(), PackagingError> {
        let retired = sibling(&self.original, "old")?;
        fs::rename(&self.original, &retired).map_err(PackagingError::io(&self.original))?;
        if let Err(source) = fs::rename(&self.path, &self.original) {
            let _ = fs::rename(&retired, &self.original);
            return Err(PackagingError::Io {
                path: self.original.clone(),
                source,
            });
        }
        self.kept = true;
        fs::remove_dir_all(&retired).map_err(PackagingError::io(&retired))
    }
}

impl Drop for StagedBag {
    fn drop(&mut self) {
        if !self.kept && self.path.exists() {
            let _ = fs::remove_dir_all(&self.path);
        }
    }
}

fn sibling(original: &Path, suffix: &str) -> Result<PathBuf, PackagingError> {
    let name = original
        .file_name()
        .ok_or_else(|| PackagingError::NotADirectory {
            path: original.to_path_buf(),
        })?
        .to_string_lossy()
        .to_string();
    let parent = match original.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    Ok(parent.join(format!(".{name}.clint-{suffix}-{}", process::id())))
}
