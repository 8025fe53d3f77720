//! Zip packaging of a job's CSV directory.
//!
//! Entries are written as `csv/<table>.csv`. Reading also accepts archives
//! that keep the CSV files at the root.

use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};

use tracing::debug;
use walkdir::WalkDir;
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use super::error::Result;

/// Directory inside the archive holding the CSV files.
pub const CSV_DIR: &str = "csv";

pub fn csv_file_name(table: &str) -> String {
    format!("{table}.csv")
}

/// Compresses every `.csv` file under `csv_dir` into `archive_path`.
///
/// Returns the number of entries written.
pub fn compress_dir(csv_dir: &Path, archive_path: &Path) -> Result<usize> {
    let file = File::create(archive_path)?;
    let mut zip = ZipWriter::new(file);
    let options = FileOptions::default().compression_method(CompressionMethod::Deflated);

    let mut entries: Vec<PathBuf> = WalkDir::new(csv_dir)
        .min_depth(1)
        .max_depth(1)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .filter(|path| path.extension().is_some_and(|ext| ext == "csv"))
        .collect();
    entries.sort();

    for path in &entries {
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        zip.start_file(format!("{CSV_DIR}/{name}"), options)?;
        let mut source = File::open(path)?;
        io::copy(&mut source, &mut zip)?;
    }

    zip.finish()?;
    debug!(entries = entries.len(), archive = %archive_path.display(), "Archive written");
    Ok(entries.len())
}

/// Unpacks `archive_path` into `dest`. Entry names escaping `dest` are rejected by the zip reader.
pub fn extract(archive_path: &Path, dest: &Path) -> Result<()> {
    let file = File::open(archive_path)?;
    let mut archive = ZipArchive::new(file)?;
    archive.extract(dest)?;
    debug!(entries = archive.len(), dest = %dest.display(), "Archive extracted");
    Ok(())
}

/// Location of a table's CSV inside an extracted archive, if present.
pub fn locate_csv(extract_root: &Path, table: &str) -> Option<PathBuf> {
    let name = csv_file_name(table);
    [extract_root.join(CSV_DIR).join(&name), extract_root.join(&name)]
        .into_iter()
        .find(|candidate| candidate.is_file())
}
