use std::fs::File;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use thiserror::Error;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

#[derive(Debug, Error)]
pub enum PackageError {
    #[error("package root has no mimetype file: {0}")]
    MissingMimetype(PathBuf),
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("zip error: {0}")]
    Zip(#[from] zip::result::ZipError),
}

/// Walk the finished package directory and write the `.epub` container.
///
/// `mimetype` must be the first entry in the zip and stored uncompressed;
/// everything else is deflated. Entry order for the rest is the sorted
/// package-relative path, so repeated packaging of the same tree gives the
/// same entry sequence.
pub fn package_epub(package_root: &Path, output: &Path) -> Result<(), PackageError> {
    let mimetype_path = package_root.join("mimetype");
    if !mimetype_path.is_file() {
        return Err(PackageError::MissingMimetype(package_root.to_path_buf()));
    }

    let file = File::create(output)?;
    let mut zip = ZipWriter::new(file);
    let stored = SimpleFileOptions::default().compression_method(CompressionMethod::Stored);
    let deflated = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    zip.start_file("mimetype", stored)?;
    zip.write_all(&std::fs::read(&mimetype_path)?)?;

    let mut entries = Vec::new();
    collect_files(package_root, package_root, &mut entries)?;
    entries.sort();
    for relative in entries {
        if relative == Path::new("mimetype") {
            continue;
        }
        let name = zip_entry_name(&relative);
        zip.start_file(name, deflated)?;
        zip.write_all(&std::fs::read(package_root.join(&relative))?)?;
    }

    zip.finish()?;
    Ok(())
}

fn collect_files(root: &Path, dir: &Path, out: &mut Vec<PathBuf>) -> io::Result<()> {
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            collect_files(root, &path, out)?;
        } else if let Ok(relative) = path.strip_prefix(root) {
            out.push(relative.to_path_buf());
        }
    }
    Ok(())
}

/// Zip entry names use forward slashes regardless of platform.
fn zip_entry_name(relative: &Path) -> String {
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join("/")
}
