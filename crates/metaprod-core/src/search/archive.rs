//! Search output archive
//!
//! The search front end packs every engine's result into one zip file. Only
//! entry basenames matter: engines write flat, but some front end versions
//! nest entries under a data folder.

use crate::error::{PipelineError, Result};
use std::collections::BTreeSet;
use std::fs::File;
use std::path::{Path, PathBuf};
use tracing::debug;
use zip::ZipArchive;

fn open(path: &Path) -> Result<ZipArchive<File>> {
    let file = File::open(path).map_err(|e| PipelineError::file(path, e))?;
    Ok(ZipArchive::new(file)?)
}

fn basename(name: &str) -> &str {
    name.rsplit('/').next().unwrap_or(name)
}

/// Basenames of the file entries in an archive.
pub fn entry_names(path: &Path) -> Result<BTreeSet<String>> {
    let mut archive = open(path)?;
    let mut names = BTreeSet::new();
    for i in 0..archive.len() {
        let entry = archive.by_index(i)?;
        if entry.is_dir() {
            continue;
        }
        names.insert(basename(entry.name()).to_string());
    }
    Ok(names)
}

/// Extract every file entry of `path` flat into `dest`, overwriting files of
/// the same name. Returns the written paths.
pub fn extract_flat(path: &Path, dest: &Path) -> Result<Vec<PathBuf>> {
    std::fs::create_dir_all(dest).map_err(|e| PipelineError::file(dest, e))?;

    let mut archive = open(path)?;
    let mut written = Vec::with_capacity(archive.len());
    for i in 0..archive.len() {
        let mut entry = archive.by_index(i)?;
        if entry.is_dir() {
            continue;
        }
        // enclosed_name rejects absolute paths and `..` components
        let Some(enclosed) = entry.enclosed_name() else {
            return Err(PipelineError::parse(format!(
                "{}: unsafe entry name '{}'",
                path.display(),
                entry.name()
            )));
        };
        let Some(name) = enclosed.file_name() else {
            continue;
        };

        let target = dest.join(name);
        let mut out = File::create(&target).map_err(|e| PipelineError::file(&target, e))?;
        let bytes = std::io::copy(&mut entry, &mut out).map_err(|e| PipelineError::file(&target, e))?;
        debug!(entry = %target.display(), bytes, "Extracted search output");
        written.push(target);
    }
    Ok(written)
}


#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::test_support::write_archive;
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_entry_names_use_basenames() {
        let dir = TempDir::new().unwrap();
        let archive = dir.path().join("searchgui_out.zip");
        write_archive(
            &archive,
            &["run01.t.xml.gz".to_string(), "data/run01.sage.tsv.gz".to_string()],
        );

        let names = entry_names(&archive).unwrap();
        assert!(names.contains("run01.t.xml.gz"));
        assert!(names.contains("run01.sage.tsv.gz"));
        assert_eq!(names.len(), 2);
    }

    #[test]
    fn test_extract_accumulates() {
        let dir = TempDir::new().unwrap();
        let dest = dir.path().join("search");
        let first = dir.path().join("first.zip");
        let second = dir.path().join("second.zip");
        write_archive(&first, &["run01.comet.pep.xml.gz".to_string()]);
        write_archive(&second, &["data/run01.omx.gz".to_string()]);

        extract_flat(&first, &dest).unwrap();
        let written = extract_flat(&second, &dest).unwrap();

        assert_eq!(written, vec![dest.join("run01.omx.gz")]);
        assert!(dest.join("run01.comet.pep.xml.gz").exists());
    }

    #[test]
    fn test_corrupt_archive_is_item_fault() {
        let dir = TempDir::new().unwrap();
        let archive = dir.path().join("searchgui_out.zip");
        std::fs::write(&archive, b"not a zip").unwrap();

        assert!(entry_names(&archive).unwrap_err().is_item_fault());
    }
}
