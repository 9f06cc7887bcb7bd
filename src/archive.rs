//! Unpacking downloaded artifact archives.

use std::fs::File;
use std::path::Path;

use tracing::debug;

use crate::error::{HistoryError, HistoryResult};

/// Unpacks an archive file into a directory.
pub trait ArchiveExtractor: Send + Sync {
    /// Extract `archive` into `dest`, creating `dest` if needed and
    /// overwriting files that already exist there.
    fn extract(&self, archive: &Path, dest: &Path) -> HistoryResult<()>;
}

/// Zip extractor. Entries whose path would land outside `dest` are rejected.
#[derive(Debug, Clone, Copy, Default)]
pub struct ZipExtractor;

impl ArchiveExtractor for ZipExtractor {
    fn extract(&self, archive: &Path, dest: &Path) -> HistoryResult<()> {
        let corrupt = |message: String| HistoryError::Archive {
            path: archive.to_path_buf(),
            message,
        };

        let file = File::open(archive).map_err(|e| HistoryError::io(archive, e))?;
        let mut zip = zip::ZipArchive::new(file).map_err(|e| corrupt(e.to_string()))?;

        std::fs::create_dir_all(dest).map_err(|e| HistoryError::io(dest, e))?;

        for i in 0..zip.len() {
            let mut entry = zip.by_index(i).map_err(|e| corrupt(e.to_string()))?;
            let Some(relative) = entry.enclosed_name() else {
                return Err(corrupt(format!("unsafe entry path: {}", entry.name())));
            };
            let out = dest.join(relative);

            if entry.is_dir() {
                std::fs::create_dir_all(&out).map_err(|e| HistoryError::io(&out, e))?;
                continue;
            }

            if let Some(parent) = out.parent() {
                std::fs::create_dir_all(parent).map_err(|e| HistoryError::io(parent, e))?;
            }
            let mut target = File::create(&out).map_err(|e| HistoryError::io(&out, e))?;
            std::io::copy(&mut entry, &mut target)
                .map_err(|e| corrupt(format!("{}: {}", out.display(), e)))?;
            debug!(path = %out.display(), "extracted");
        }

        Ok(())
    }
}
