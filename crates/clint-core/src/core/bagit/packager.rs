use std::collections::BTreeSet;
use std::fs::{self, File};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process;

use sha2::{Digest, Sha256};
use time::{macros::format_description, OffsetDateTime};
use tracing::{debug, info};
use walkdir::WalkDir;

use super::tags::{self, BAGGING_DATE, PAYLOAD_OXUM};
use super::{
    Manifest, ManifestEntry, PackageParams, Packager, PackagingError, Tags, ValidationReport,
};

const PAYLOAD_DIR: &str = "data";
const DECLARATION: &str = "bagit.txt";
const BAG_INFO: &str = "bag-info.txt";
const MANIFEST: &str = "manifest-sha256.txt";
const TAG_MANIFEST: &str = "tagmanifest-sha256.txt";
const ALGORITHM: &str = "sha256";

/// BagIt 0.97 directories with SHA-256 payload and tag manifests.
#[derive(Debug, Clone, Copy, Default)]
pub struct BagItPackager;

impl Packager for BagItPackager {
    fn is_package(&self, path: &Path) -> bool {
        path.join(DECLARATION).is_file() && path.join(PAYLOAD_DIR).is_dir()
    }

    fn make_package(
        &self,
        path: &Path,
        params: &PackageParams,
    ) -> Result<Manifest, PackagingError> {
        if !path.is_dir() {
            return Err(PackagingError::NotADirectory {
                path: path.to_path_buf(),
            });
        }
        let carried = if self.is_package(path) {
            if !params.force {
                return Err(PackagingError::AlreadyPackaged {
                    path: path.to_path_buf(),
                });
            }
            debug!(path = %path.display(), "re-packaging existing bag");
            self.unpackage(path)?
        } else {
            Tags::new()
        };

        move_payload_into_data(path)?;
        let manifest = Manifest {
            root: path.to_path_buf(),
            algorithm: ALGORITHM,
            entries: hash_payload(path)?,
        };
        write_manifest(path, &manifest)?;
        write_file(
            &path.join(DECLARATION),
            "BagIt-Version: 0.97\nTag-File-Character-Encoding: UTF-8\n",
        )?;

        let mut bag_info = Tags::new();
        if let Ok(date) = OffsetDateTime::now_utc().format(format_description!("[year]-[month]-[day]"))
        {
            bag_info.insert(BAGGING_DATE.to_string(), date);
        }
        bag_info.insert(PAYLOAD_OXUM.to_string(), manifest.oxum());
        for (label, value) in carried.iter().chain(params.tags.iter()) {
            merge_tag(&mut bag_info, label, value);
        }
        write_file(&path.join(BAG_INFO), &tags::render(&bag_info))?;
        write_tag_manifest(path)?;

        info!(
            path = %path.display(),
            files = manifest.entries.len(),
            bytes = manifest.total_bytes(),
            "packaged bag"
        );
        Ok(manifest)
    }

    fn validate(&self, path: &Path) -> Result<ValidationReport, PackagingError> {
        if !self.is_package(path) {
            return Err(PackagingError::NotAPackage {
                path: path.to_path_buf(),
            });
        }
        let mut report = ValidationReport::default();
        if !path.join(MANIFEST).is_file() {
            report.problems.push(format!("{MANIFEST} is missing"));
            return Ok(report);
        }

        let listed = match parse_manifest(path, MANIFEST) {
            Ok(listed) => listed,
            Err(reason) => {
                report.problems.push(reason);
                return Ok(report);
            }
        };
        let mut names = BTreeSet::new();
        for (digest, name) in &listed {
            names.insert(name.clone());
            let file = path.join(name);
            if !file.is_file() {
                report.problems.push(format!("{name} is listed but missing"));
                continue;
            }
            if file_digest(&file)? != *digest {
                report.problems.push(format!("checksum mismatch for {name}"));
            }
        }

        let actual = hash_payload_sizes(path)?;
        for (name, _) in &actual {
            if !names.contains(name) {
                report.problems.push(format!("{name} is not in the manifest"));
            }
        }

        let tags = self.read_tags(path)?;
        if let Some(recorded) = tags::find(&tags, PAYLOAD_OXUM) {
            let bytes: u64 = actual.iter().map(|(_, bytes)| bytes).sum();
            let computed = format!("{bytes}.{}", actual.len());
            if recorded != computed {
                report.problems.push(format!(
                    "Payload-Oxum is {recorded} but the payload is {computed}"
                ));
            }
        }

        if path.join(TAG_MANIFEST).is_file() {
            match parse_manifest(path, TAG_MANIFEST) {
                Ok(tag_files) => {
                    for (digest, name) in tag_files {
                        let file = path.join(&name);
                        if !file.is_file() || file_digest(&file)? != digest {
                            report
                                .problems
                                .push(format!("tag file {name} does not match {TAG_MANIFEST}"));
                        }
                    }
                }
                Err(reason) => report.problems.push(reason),
            }
        }

        debug!(
            path = %path.display(),
            problems = report.problems.len(),
            "validated bag"
        );
        Ok(report)
    }

    fn read_manifest(&self, path: &Path) -> Result<Manifest, PackagingError> {
        if !self.is_package(path) {
            return Err(PackagingError::NotAPackage {
                path: path.to_path_buf(),
            });
        }
        let listed = parse_manifest(path, MANIFEST).map_err(|reason| PackagingError::Malformed {
            path: path.join(MANIFEST),
            reason,
        })?;
        let mut entries = Vec::with_capacity(listed.len());
        for (digest, name) in listed {
            let file = path.join(&name);
            let bytes = fs::metadata(&file)
                .map_err(PackagingError::io(&file))?
                .len();
            entries.push(ManifestEntry {
                path: name,
                digest,
                bytes,
            });
        }
        Ok(Manifest {
            root: path.to_path_buf(),
            algorithm: ALGORITHM,
            entries,
        })
    }

    fn read_tags(&self, path: &Path) -> Result<Tags, PackagingError> {
        let file = path.join(BAG_INFO);
        if !file.is_file() {
            return Ok(Tags::new());
        }
        let contents = fs::read_to_string(&file).map_err(PackagingError::io(&file))?;
        tags::parse(&contents).map_err(|reason| PackagingError::Malformed { path: file, reason })
    }

    fn write_tags(&self, path: &Path, updates: &Tags) -> Result<(), PackagingError> {
        if !self.is_package(path) {
            return Err(PackagingError::NotAPackage {
                path: path.to_path_buf(),
            });
        }
        let mut bag_info = self.read_tags(path)?;
        for (label, value) in updates {
            merge_tag(&mut bag_info, label, value);
        }
        write_file(&path.join(BAG_INFO), &tags::render(&bag_info))?;
        write_tag_manifest(path)
    }

    fn unpackage(&self, path: &Path) -> Result<Tags, PackagingError> {
        if !self.is_package(path) {
            return Err(PackagingError::NotAPackage {
                path: path.to_path_buf(),
            });
        }
        let mut operator = self.read_tags(path)?;
        operator.retain(|label, _| !tags::is_generated(label));

        for entry in fs::read_dir(path).map_err(PackagingError::io(path))? {
            let entry = entry.map_err(PackagingError::io(path))?;
            let name = entry.file_name().to_string_lossy().to_string();
            if is_tag_file(&name) && entry.path().is_file() {
                fs::remove_file(entry.path()).map_err(PackagingError::io(&entry.path()))?;
            }
        }

        let staging = staging_dir(path);
        let payload = path.join(PAYLOAD_DIR);
        fs::rename(&payload, &staging).map_err(PackagingError::io(&payload))?;
        for entry in fs::read_dir(&staging).map_err(PackagingError::io(&staging))? {
            let entry = entry.map_err(PackagingError::io(&staging))?;
            let target = path.join(entry.file_name());
            if target.exists() {
                return Err(PackagingError::Malformed {
                    path: target,
                    reason: "payload entry would overwrite a file at the bag root".to_string(),
                });
            }
            fs::rename(entry.path(), &target).map_err(PackagingError::io(&target))?;
        }
        fs::remove_dir(&staging).map_err(PackagingError::io(&staging))?;
        debug!(path = %path.display(), tags = operator.len(), "unpackaged bag");
        Ok(operator)
    }
}

fn is_tag_file(name: &str) -> bool {
    name == DECLARATION
        || name == BAG_INFO
        || (name.ends_with(".txt")
            && (name.starts_with("manifest-") || name.starts_with("tagmanifest-")))
}

fn staging_dir(root: &Path) -> PathBuf {
    root.join(format!(".clint-payload-{}", process::id()))
}

fn merge_tag(tags: &mut Tags, label: &str, value: &str) {
    let existing = tags
        .keys()
        .find(|candidate| candidate.eq_ignore_ascii_case(label))
        .cloned();
    match existing {
        Some(key) => {
            tags.insert(key, value.to_string());
        }
        None => {
            tags.insert(label.to_string(), value.to_string());
        }
    }
}

fn move_payload_into_data(root: &Path) -> Result<(), PackagingError> {
    let staging = staging_dir(root);
    fs::create_dir(&staging).map_err(PackagingError::io(&staging))?;
    for entry in fs::read_dir(root).map_err(PackagingError::io(root))? {
        let entry = entry.map_err(PackagingError::io(root))?;
        let source = entry.path();
        if source == staging {
            continue;
        }
        let target = staging.join(entry.file_name());
        fs::rename(&source, &target).map_err(PackagingError::io(&source))?;
    }
    let payload = root.join(PAYLOAD_DIR);
    fs::rename(&staging, &payload).map_err(PackagingError::io(&payload))
}

fn relative_name(root: &Path, path: &Path) -> String {
    path.strip_prefix(root)
        .unwrap_or(path)
        .components()
        .map(|component| component.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

fn payload_files(root: &Path) -> Result<Vec<PathBuf>, PackagingError> {
    let mut files = Vec::new();
    for entry in WalkDir::new(root.join(PAYLOAD_DIR)).sort_by_file_name() {
        let entry = entry.map_err(|err| PackagingError::Io {
            path: err
                .path()
                .map_or_else(|| root.to_path_buf(), Path::to_path_buf),
            source: err.into(),
        })?;
        if entry.file_type().is_file() {
            files.push(entry.into_path());
        }
    }
    Ok(files)
}

fn hash_payload(root: &Path) -> Result<Vec<ManifestEntry>, PackagingError> {
    payload_files(root)?
        .into_iter()
        .map(|file| {
            let bytes = fs::metadata(&file).map_err(PackagingError::io(&file))?.len();
            Ok(ManifestEntry {
                path: relative_name(root, &file),
                digest: file_digest(&file)?,
                bytes,
            })
        })
        .collect()
}

fn hash_payload_sizes(root: &Path) -> Result<Vec<(String, u64)>, PackagingError> {
    payload_files(root)?
        .into_iter()
        .map(|file| {
            let bytes = fs::metadata(&file).map_err(PackagingError::io(&file))?.len();
            Ok((relative_name(root, &file), bytes))
        })
        .collect()
}

fn file_digest(path: &Path) -> Result<String, PackagingError> {
    let mut file = File::open(path).map_err(PackagingError::io(path))?;
    let mut hasher = Sha256::new();
    let mut buffer = vec![0_u8; 64 * 1024];
    loop {
        let read = file.read(&mut buffer).map_err(PackagingError::io(path))?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }
    Ok(hex::encode(hasher.finalize()))
}

/// `(digest, relative name)` pairs; names may contain spaces.
fn parse_manifest(root: &Path, name: &str) -> Result<Vec<(String, String)>, String> {
    let file = root.join(name);
    let contents = fs::read_to_string(&file).map_err(|err| format!("{name}: {err}"))?;
    contents
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(index, line)| {
            let (digest, path) = line
                .split_once(char::is_whitespace)
                .ok_or_else(|| format!("{name} line {}: expected 'digest path'", index + 1))?;
            Ok((digest.to_ascii_lowercase(), path.trim_start().to_string()))
        })
        .collect()
}

fn write_manifest(root: &Path, manifest: &Manifest) -> Result<(), PackagingError> {
    let contents: String = manifest
        .entries
        .iter()
        .map(|entry| format!("{}  {}\n", entry.digest, entry.path))
        .collect();
    write_file(&root.join(MANIFEST), &contents)
}

fn write_tag_manifest(root: &Path) -> Result<(), PackagingError> {
    let mut contents = String::new();
    for name in [DECLARATION, BAG_INFO, MANIFEST] {
        let file = root.join(name);
        if file.is_file() {
            contents.push_str(&format!("{}  {name}\n", file_digest(&file)?));
        }
    }
    write_file(&root.join(TAG_MANIFEST), &contents)
}

fn write_file(path: &Path, contents: &str) -> Result<(), PackagingError> {
    fs::write(path, contents).map_err(PackagingError::io(path))
}
