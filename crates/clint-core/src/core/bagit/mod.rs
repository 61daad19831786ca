//! On-disk bag packaging.
//!
//! The lifecycle controller only sees the [`Packager`] trait; the default
//! implementation writes BagIt 0.97 directories with SHA-256 manifests.

mod packager;
mod staging;
mod tags;

use std::io;
use std::path::{Path, PathBuf};

use clint_domain::PayloadFile;
use indexmap::IndexMap;
use serde::Serialize;
use thiserror::Error;

pub use packager::BagItPackager;
pub(crate) use staging::StagedBag;
pub use tags::{BAG_ID_TAG, ITEM_ID_TAG};
pub(crate) use tags::find as find_tag;

pub type Tags = IndexMap<String, String>;

#[derive(Debug, Error)]
pub enum PackagingError {
    #[error("{} is not a readable directory", path.display())]
    NotADirectory { path: PathBuf },
    #[error("{} is already a bag", path.display())]
    AlreadyPackaged { path: PathBuf },
    #[error("{} is not a bag", path.display())]
    NotAPackage { path: PathBuf },
    #[error("malformed {}: {reason}", path.display())]
    Malformed { path: PathBuf, reason: String },
    #[error("I/O error on {}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl PackagingError {
    pub(crate) fn io(path: &Path) -> impl FnOnce(io::Error) -> Self + '_ {
        move |source| Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ManifestEntry {
    /// Path relative to the bag root, always under `data/`.
    pub path: String,
    pub digest: String,
    pub bytes: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Manifest {
    pub root: PathBuf,
    pub algorithm: &'static str,
    pub entries: Vec<ManifestEntry>,
}

impl Manifest {
    #[must_use]
    pub fn total_bytes(&self) -> u64 {
        self.entries.iter().map(|entry| entry.bytes).sum()
    }

    /// `bytes.count`, as written to `Payload-Oxum`.
    #[must_use]
    pub fn oxum(&self) -> String {
        format!("{}.{}", self.total_bytes(), self.entries.len())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ValidationReport {
    pub problems: Vec<String>,
}

impl ValidationReport {
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.problems.is_empty()
    }
}

#[derive(Debug, Clone, Default)]
pub struct PackageParams {
    /// Operator tags written to `bag-info.txt` next to the generated ones.
    pub tags: Tags,
    /// Re-package a directory that is already a bag.
    pub force: bool,
}

pub trait Packager: Send + Sync {
    /// Whether `path` already has bag structure. Says nothing about fixity.
    fn is_package(&self, path: &Path) -> bool;

    fn make_package(&self, path: &Path, params: &PackageParams)
        -> Result<Manifest, PackagingError>;

    /// Checks structure, completeness, `Payload-Oxum` and every checksum.
    fn validate(&self, path: &Path) -> Result<ValidationReport, PackagingError>;

    fn read_manifest(&self, path: &Path) -> Result<Manifest, PackagingError>;

    fn read_tags(&self, path: &Path) -> Result<Tags, PackagingError>;

    /// Merges `updates` into `bag-info.txt`, replacing existing labels.
    fn write_tags(&self, path: &Path, updates: &Tags) -> Result<(), PackagingError>;

    /// Strips manifest and tag files and moves the payload back to the
    /// directory root. Returns the operator tags that were present.
    fn unpackage(&self, path: &Path) -> Result<Tags, PackagingError>;

    fn payload_files(&self, manifest: &Manifest) -> Vec<PayloadFile> {
        manifest
            .entries
            .iter()
            .map(|entry| PayloadFile::new(entry.path.clone(), entry.bytes))
            .collect()
    }
}
