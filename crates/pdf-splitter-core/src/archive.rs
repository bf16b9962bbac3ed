//! ZIP packaging of split artifacts.
//!
//! Archives are flat: every entry is stored under its base file name, no
//! matter how deep it sat in the artifact directory. The archive is written
//! next to its final path and renamed into place once complete.

use std::collections::HashSet;
use std::fs::File;
use std::io::{BufWriter, Seek, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, info};
use zip::ZipWriter;
use zip::write::SimpleFileOptions;

use crate::error::{Error, Result};
use crate::pdf::SplitArtifact;

/// A written archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveBundle {
    pub path: PathBuf,
    /// Entry names in archive order
    pub entries: Vec<String>,
}

/// Zip every regular file under `artifact_dir` (recursively) into `archive_path`.
///
/// If `archive_path` itself lies inside `artifact_dir` it is skipped. Two
/// files with the same base name are an error since the archive is flat.
pub fn package(artifact_dir: impl AsRef<Path>, archive_path: impl AsRef<Path>) -> Result<ArchiveBundle> {
    let artifact_dir = artifact_dir.as_ref();
    let archive_path = archive_path.as_ref();

    let mut files = collect_files(artifact_dir)?;
    files.retain(|path| !is_same_file(path, archive_path));
    files.sort_by(|a, b| entry_order(a).cmp(&entry_order(b)));

    let mut seen = HashSet::new();
    let mut entries = Vec::with_capacity(files.len());
    for path in &files {
        let name = base_name(path)?;
        if !seen.insert(name.clone()) {
            return Err(Error::Archive(format!(
                "Two files named {name} under {}",
                artifact_dir.display()
            )));
        }
        entries.push((name, path.as_path()));
    }

    write_archive(archive_path, entries.iter().map(|(name, path)| {
        std::fs::read(path)
            .map(|bytes| (name.clone(), bytes))
            .map_err(|e| Error::Archive(format!("Failed to read {}: {e}", path.display())))
    }))
}

/// Zip in-memory artifacts as `1.pdf` .. `N.pdf`.
pub fn package_artifacts(artifacts: &[SplitArtifact], archive_path: impl AsRef<Path>) -> Result<ArchiveBundle> {
    write_archive(
        archive_path.as_ref(),
        artifacts.iter().map(|a| Ok((a.file_name(), a.bytes.clone()))),
    )
}

fn write_archive(
    archive_path: &Path,
    entries: impl Iterator<Item = Result<(String, Vec<u8>)>>,
) -> Result<ArchiveBundle> {
    if let Some(parent) = archive_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .map_err(|e| Error::Archive(format!("Failed to create {}: {e}", parent.display())))?;
    }

    let partial = partial_path(archive_path);
    let result = File::create(&partial)
        .map_err(|e| Error::Archive(format!("Failed to create {}: {e}", partial.display())))
        .and_then(|file| write_entries(BufWriter::new(file), entries));

    let names = match result {
        Ok(names) => names,
        Err(e) => {
            let _ = std::fs::remove_file(&partial);
            return Err(e);
        }
    };

    std::fs::rename(&partial, archive_path).map_err(|e| {
        let _ = std::fs::remove_file(&partial);
        Error::Archive(format!("Failed to move archive into {}: {e}", archive_path.display()))
    })?;

    info!("Wrote {} entries to {}", names.len(), archive_path.display());

    Ok(ArchiveBundle {
        path: archive_path.to_path_buf(),
        entries: names,
    })
}

fn write_entries<W: Write + Seek>(
    writer: W,
    entries: impl Iterator<Item = Result<(String, Vec<u8>)>>,
) -> Result<Vec<String>> {
    let mut zip = ZipWriter::new(writer);
    let options = SimpleFileOptions::default()
        .compression_method(zip::CompressionMethod::Deflated)
        .unix_permissions(0o644);

    let mut names = Vec::new();
    for entry in entries {
        let (name, bytes) = entry?;
        zip.start_file(name.as_str(), options)
            .map_err(|e| Error::Archive(format!("Failed to create entry {name}: {e}")))?;
        zip.write_all(&bytes)
            .map_err(|e| Error::Archive(format!("Failed to write entry {name}: {e}")))?;
        debug!("Archived {} ({} bytes)", name, bytes.len());
        names.push(name);
    }

    let mut writer = zip
        .finish()
        .map_err(|e| Error::Archive(format!("Failed to finalize archive: {e}")))?;
    writer
        .flush()
        .map_err(|e| Error::Archive(format!("Failed to flush archive: {e}")))?;

    Ok(names)
}

/// Regular files under `dir`, at any depth.
fn collect_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    let mut pending = vec![dir.to_path_buf()];

    while let Some(current) = pending.pop() {
        let listing = std::fs::read_dir(&current)
            .map_err(|e| Error::Archive(format!("Failed to list {}: {e}", current.display())))?;
        for entry in listing {
            let entry = entry.map_err(|e| Error::Archive(format!("Failed to list {}: {e}", current.display())))?;
            let file_type = entry
                .file_type()
                .map_err(|e| Error::Archive(format!("Failed to stat {}: {e}", entry.path().display())))?;
            if file_type.is_dir() {
                pending.push(entry.path());
            } else if file_type.is_file() {
                files.push(entry.path());
            }
        }
    }

    Ok(files)
}

fn base_name(path: &Path) -> Result<String> {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(str::to_string)
        .ok_or_else(|| Error::Archive(format!("Unusable file name: {}", path.display())))
}

/// Numbered artifacts sort numerically (`2.pdf` before `10.pdf`), the rest by name.
fn entry_order(path: &Path) -> (u8, u64, String) {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let number = path
        .file_stem()
        .and_then(|s| s.to_str())
        .and_then(|s| s.parse::<u64>().ok());
    match number {
        Some(n) => (0, n, name),
        None => (1, 0, name),
    }
}

fn is_same_file(a: &Path, b: &Path) -> bool {
    match (a.canonicalize(), b.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => a == b,
    }
}

fn partial_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(ToOwned::to_owned).unwrap_or_default();
    name.push(".part");
    path.with_file_name(name)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::io::Read;

    use super::*;

    fn entry_names(path: &Path) -> Vec<String> {
        let archive = zip::ZipArchive::new(File::open(path).unwrap()).unwrap();
        archive.file_names().map(str::to_string).collect::<Vec<_>>()
    }

    #[test]
    fn test_flat_names_from_nested_dirs() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("a/b")).unwrap();
        std::fs::write(dir.path().join("1.pdf"), b"%PDF-one").unwrap();
        std::fs::write(dir.path().join("a/b/2.pdf"), b"%PDF-two").unwrap();

        let out = dir.path().join("out.zip");
        let bundle = package(dir.path(), &out).unwrap();

        assert_eq!(bundle.entries, ["1.pdf", "2.pdf"]);
        let mut names = entry_names(&out);
        names.sort();
        assert_eq!(names, ["1.pdf", "2.pdf"]);
    }

    #[test]
    fn test_numeric_order() {
        let dir = tempfile::tempdir().unwrap();
        for n in [10, 2, 1] {
            std::fs::write(dir.path().join(format!("{n}.pdf")), b"x").unwrap();
        }
        let bundle = package(dir.path(), dir.path().join("out.zip")).unwrap();
        assert_eq!(bundle.entries, ["1.pdf", "2.pdf", "10.pdf"]);
    }

    #[test]
    fn test_skips_itself_on_repackage() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("1.pdf"), b"x").unwrap();
        let out = dir.path().join("out.zip");

        package(dir.path(), &out).unwrap();
        let second = package(dir.path(), &out).unwrap();
        assert_eq!(second.entries, ["1.pdf"]);
    }

    #[test]
    fn test_duplicate_base_names_rejected() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("x")).unwrap();
        std::fs::write(dir.path().join("1.pdf"), b"a").unwrap();
        std::fs::write(dir.path().join("x/1.pdf"), b"b").unwrap();

        let out = dir.path().join("out.zip");
        assert!(matches!(package(dir.path(), &out), Err(Error::Archive(_))));
        assert!(!out.exists());
        assert!(!partial_path(&out).exists());
    }

    #[test]
    fn test_missing_dir() {
        let dir = tempfile::tempdir().unwrap();
        let result = package(dir.path().join("nope"), dir.path().join("out.zip"));
        assert!(matches!(result, Err(Error::Archive(_))));
    }

    #[test]
    fn test_package_artifacts_contents() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("nested/pages.zip");
        let artifacts = vec![
            SplitArtifact { number: 1, bytes: b"%PDF-1".to_vec() },
            SplitArtifact { number: 2, bytes: b"%PDF-2".to_vec() },
        ];

        let bundle = package_artifacts(&artifacts, &out).unwrap();
        assert_eq!(bundle.path, out);

        let mut archive = zip::ZipArchive::new(File::open(&out).unwrap()).unwrap();
        let mut body = String::new();
        archive.by_name("2.pdf").unwrap().read_to_string(&mut body).unwrap();
        assert_eq!(body, "%PDF-2");
    }
}
