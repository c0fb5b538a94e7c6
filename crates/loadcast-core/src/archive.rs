use std::fs::File;
use std::path::{Path, PathBuf};

use thiserror::Error;
use zip::result::ZipError;
use zip::ZipArchive;

#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("failed to open archive {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to extract archive {path}: {source}")]
    Extract {
        path: PathBuf,
        #[source]
        source: ZipError,
    },
}

/// Extracts every entry of the zip archive at `archive` into `dest`, returning the number of
/// entries.
pub fn extract_zip(archive: &Path, dest: &Path) -> Result<usize, ArchiveError> {
    let file = File::open(archive).map_err(|source| ArchiveError::Open {
        path: archive.to_path_buf(),
        source,
    })?;
    let extract_err = |source| ArchiveError::Extract {
        path: archive.to_path_buf(),
        source,
    };
    let mut zip = ZipArchive::new(file).map_err(extract_err)?;
    let entries = zip.len();
    zip.extract(dest).map_err(extract_err)?;
    Ok(entries)
}
